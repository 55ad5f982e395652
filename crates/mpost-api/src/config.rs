//! API configuration.

use std::time::Duration;

/// Identity provider settings used to validate bearer tokens.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Base URL of the auth service (same project as the ledger)
    pub supabase_url: Option<String>,
    /// Public anon key sent as `apikey`
    pub anon_key: Option<String>,
    /// Accept `demo*` tokens without contacting the auth service
    pub demo_mode: bool,
}

/// Payment processor settings.
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    /// Secret API key. Checkout is disabled without it.
    pub secret_key: Option<String>,
    /// Webhook signing secret
    pub webhook_secret: Option<String>,
    /// API base URL
    pub api_base: String,
    /// Accepted clock skew for webhook signatures
    pub webhook_tolerance: Duration,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            webhook_secret: None,
            api_base: "https://api.stripe.com".to_string(),
            webhook_tolerance: Duration::from_secs(300),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Per-IP rate limit, requests per second
    pub rate_limit_rps: u32,
    /// Per-user limit on upload and process calls, requests per minute
    pub user_rate_limit_per_minute: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Frontend base URL for checkout redirects
    pub frontend_url: String,
    /// Serve Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8002,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 20,
            user_rate_limit_per_minute: 30,
            max_body_size: 512 * 1024 * 1024,
            environment: "development".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            metrics_enabled: true,
            auth: AuthConfig {
                demo_mode: true,
                ..AuthConfig::default()
            },
            payments: PaymentsConfig::default(),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let production = environment.to_lowercase() == "production";

        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8002),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            user_rate_limit_per_minute: std::env::var("USER_RATE_LIMIT_PER_MINUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(512 * 1024 * 1024),
            frontend_url: std::env::var("FRONTEND_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            metrics_enabled: flag("METRICS_ENABLED").unwrap_or(true),
            auth: AuthConfig {
                supabase_url: non_empty("SUPABASE_URL")
                    .map(|u| u.trim_end_matches('/').to_string()),
                anon_key: non_empty("SUPABASE_ANON_KEY"),
                demo_mode: flag("DEMO_MODE").unwrap_or(!production),
            },
            payments: PaymentsConfig {
                secret_key: non_empty("STRIPE_SECRET_KEY"),
                webhook_secret: non_empty("STRIPE_WEBHOOK_SECRET"),
                api_base: std::env::var("STRIPE_API_BASE")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
                webhook_tolerance: Duration::from_secs(
                    std::env::var("STRIPE_WEBHOOK_TOLERANCE_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(300),
                ),
            },
            environment,
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
