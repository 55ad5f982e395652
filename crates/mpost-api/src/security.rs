//! Input validation helpers for request boundaries.

/// Maximum accepted length of a job id path segment.
const MAX_JOB_ID_LENGTH: usize = 64;

/// Maximum length of free-form strings echoed back to clients or logs.
pub const MAX_FIELD_LENGTH: usize = 256;

/// Whether a path segment can be a job id.
///
/// Ids are UUIDs today; anything outside `[A-Za-z0-9_-]` is rejected
/// before it reaches the registry or the filesystem.
pub fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_JOB_ID_LENGTH
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Strip control characters and cap length.
pub fn sanitize_string(input: &str, max_len: usize) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .take(max_len)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_validation() {
        assert!(is_valid_job_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_valid_job_id("job_1"));
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("../etc/passwd"));
        assert!(!is_valid_job_id("a b"));
        assert!(!is_valid_job_id(&"a".repeat(65)));
    }

    #[test]
    fn test_sanitize_string() {
        assert_eq!(sanitize_string("  pro\n\u{0}  ", 10), "pro");
        assert_eq!(sanitize_string("abcdef", 3), "abc");
    }
}
