//! Tier to editor routing.

use std::sync::Arc;

use mpost_imaging::ImageEditor;
use mpost_models::ProcessingTier;

use crate::error::{WorkerError, WorkerResult};

/// The editors available to the executor.
///
/// Basic jobs use background removal; premium jobs use the image-edit
/// model. A premium failure does not fall back to the basic editor.
#[derive(Clone)]
pub struct EditorSet {
    basic: Arc<dyn ImageEditor>,
    premium: Option<Arc<dyn ImageEditor>>,
}

impl EditorSet {
    pub fn new(basic: Arc<dyn ImageEditor>) -> Self {
        Self {
            basic,
            premium: None,
        }
    }

    pub fn with_premium(mut self, premium: Arc<dyn ImageEditor>) -> Self {
        self.premium = Some(premium);
        self
    }

    pub fn supports(&self, tier: ProcessingTier) -> bool {
        match tier {
            ProcessingTier::Basic => true,
            ProcessingTier::Premium => self.premium.is_some(),
        }
    }

    pub fn for_tier(&self, tier: ProcessingTier) -> WorkerResult<Arc<dyn ImageEditor>> {
        match tier {
            ProcessingTier::Basic => Ok(Arc::clone(&self.basic)),
            ProcessingTier::Premium => self
                .premium
                .clone()
                .ok_or(WorkerError::EditorUnavailable(tier)),
        }
    }
}
