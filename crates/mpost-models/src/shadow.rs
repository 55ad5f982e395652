//! Shadow settings forwarded to the background-removal service.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Shadow style applied after background removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShadowType {
    #[default]
    Drop,
    Reflection,
    Natural,
    None,
}

impl ShadowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShadowType::Drop => "drop",
            ShadowType::Reflection => "reflection",
            ShadowType::Natural => "natural",
            ShadowType::None => "none",
        }
    }
}

impl FromStr for ShadowType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(ShadowType::Drop),
            "reflection" => Ok(ShadowType::Reflection),
            "natural" => Ok(ShadowType::Natural),
            "none" => Ok(ShadowType::None),
            _ => Err(ModelError::UnknownShadowType(s.to_string())),
        }
    }
}

/// Per-job shadow configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShadowSettings {
    #[serde(default)]
    pub shadow_type: ShadowType,
    #[serde(default = "default_enabled")]
    pub enable_shadows: bool,
    #[serde(default = "default_intensity")]
    pub shadow_intensity: f32,
}

fn default_enabled() -> bool {
    true
}

fn default_intensity() -> f32 {
    0.5
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            shadow_type: ShadowType::default(),
            enable_shadows: default_enabled(),
            shadow_intensity: default_intensity(),
        }
    }
}

impl ShadowSettings {
    /// Reject intensities outside `0.0..=1.0` (NaN included).
    pub fn validate(&self) -> ModelResult<()> {
        if !(0.0..=1.0).contains(&self.shadow_intensity) {
            return Err(ModelError::ShadowIntensityOutOfRange(self.shadow_intensity));
        }
        Ok(())
    }

    /// The shadow style that will actually be rendered.
    pub fn effective_type(&self) -> ShadowType {
        if self.enable_shadows {
            self.shadow_type
        } else {
            ShadowType::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let settings: ShadowSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ShadowSettings::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_intensity_bounds() {
        let mut settings = ShadowSettings::default();
        settings.shadow_intensity = 0.0;
        assert!(settings.validate().is_ok());
        settings.shadow_intensity = 1.0;
        assert!(settings.validate().is_ok());
        settings.shadow_intensity = 1.5;
        assert_eq!(
            settings.validate(),
            Err(ModelError::ShadowIntensityOutOfRange(1.5))
        );
        settings.shadow_intensity = f32::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_disabled_shadows_render_none() {
        let settings = ShadowSettings {
            shadow_type: ShadowType::Reflection,
            enable_shadows: false,
            shadow_intensity: 0.3,
        };
        assert_eq!(settings.effective_type(), ShadowType::None);
    }

    #[test]
    fn test_unknown_shadow_type_rejected() {
        assert!(serde_json::from_str::<ShadowSettings>(r#"{"shadow_type":"glow"}"#).is_err());
        assert!("glow".parse::<ShadowType>().is_err());
    }
}
