//! Output pipelines.
//!
//! A pipeline is a named preset of marketplace output rules. For the premium
//! tier each pipeline maps to a fixed instruction sent to the image-edit API.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

const AMAZON_PROMPT: &str = "Remove the background completely from this product image and replace it with pure white (RGB 255, 255, 255).
Keep ONLY the main product, remove everything else.
Preserve all product details with maximum precision.
Ensure the product covers exactly 85% of the image area.
Remove ALL shadows, reflections, and background elements.";

const EBAY_PROMPT: &str = "Remove the background completely and replace with pure white (RGB 255, 255, 255).
Preserve MAXIMUM detail quality for zoom inspection.
Keep all fine details: textures, engravings, small text.
Remove all background shadows and elements.";

const INSTAGRAM_PROMPT: &str = "Remove the background completely and replace with pure white (RGB 255, 255, 255).
Create a visually appealing, social-media ready image.
Enhance colors while maintaining natural look.
Remove all background elements.";

const GENERIC_PROMPT: &str = "Remove the background completely from this product image.
Replace the background with pure white (RGB 255, 255, 255).
Keep the main product with all details preserved.
Remove ALL shadows, reflections, and background elements.
Maintain original product colors.";

/// Marketplace output preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    #[default]
    Amazon,
    Ebay,
    Instagram,
    None,
}

impl Pipeline {
    pub const ALL: [Pipeline; 4] = [
        Pipeline::Amazon,
        Pipeline::Ebay,
        Pipeline::Instagram,
        Pipeline::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Amazon => "amazon",
            Pipeline::Ebay => "ebay",
            Pipeline::Instagram => "instagram",
            Pipeline::None => "none",
        }
    }

    /// Instruction sent to the image-edit API for this pipeline.
    pub fn prompt(&self) -> &'static str {
        match self {
            Pipeline::Amazon => AMAZON_PROMPT,
            Pipeline::Ebay => EBAY_PROMPT,
            Pipeline::Instagram => INSTAGRAM_PROMPT,
            Pipeline::None => GENERIC_PROMPT,
        }
    }

    /// Catalog entry shown by `GET /pipelines`.
    pub fn describe(&self) -> PipelineInfo {
        let (name, description, features): (&str, &str, &[&str]) = match self {
            Pipeline::Amazon => (
                "Amazon Compliant",
                "White background, 1000x1000px, 85% product coverage",
                &[
                    "White background removal",
                    "Square format",
                    "Product centering",
                    "Quality optimization",
                ],
            ),
            Pipeline::Ebay => (
                "eBay Optimized",
                "1600x1600px high resolution for detailed product view",
                &[
                    "High resolution",
                    "Detail enhancement",
                    "Multiple angle support",
                    "Zoom optimization",
                ],
            ),
            Pipeline::Instagram => (
                "Instagram Ready",
                "1080x1080px square format with color enhancement",
                &[
                    "Square crop",
                    "Color boost",
                    "Contrast enhancement",
                    "Social media optimization",
                ],
            ),
            Pipeline::None => (
                "Background Only",
                "Background removal without marketplace sizing rules",
                &["White background removal"],
            ),
        };

        PipelineInfo {
            id: self.as_str().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl FromStr for Pipeline {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amazon" => Ok(Pipeline::Amazon),
            "ebay" => Ok(Pipeline::Ebay),
            "instagram" => Ok(Pipeline::Instagram),
            "none" => Ok(Pipeline::None),
            _ => Err(ModelError::UnknownPipeline(s.to_string())),
        }
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Public description of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub features: Vec<String>,
}
