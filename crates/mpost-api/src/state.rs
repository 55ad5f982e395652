//! Application state.

use std::sync::Arc;

use mpost_imaging::UploadLimits;
use mpost_ledger::Ledger;
use mpost_models::{CreditPack, PackType};
use mpost_queue::{InMemoryJobStore, JobStore};
use mpost_worker::{EditorSet, ExecutorHandle, JobExecutor, ProcessingContext, WorkerConfig};

use crate::auth::AuthService;
use crate::config::ApiConfig;
use crate::middleware::RateLimiterCache;
use crate::services::{PaymentError, PaymentsClient};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub worker: WorkerConfig,
    pub upload_limits: UploadLimits,
    pub store: Arc<dyn JobStore>,
    pub ledger: Arc<dyn Ledger>,
    pub editors: EditorSet,
    pub executor: ExecutorHandle,
    pub auth: Arc<AuthService>,
    /// `None` when no processor secret key is configured
    pub payments: Option<Arc<PaymentsClient>>,
    pub packs: Arc<Vec<CreditPack>>,
    /// Per-user limiter for upload and process calls
    pub user_limiter: Arc<RateLimiterCache<String>>,
}

impl AppState {
    /// Create application state and start the job executor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: ApiConfig,
        worker: WorkerConfig,
        ledger: Arc<dyn Ledger>,
        editors: EditorSet,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());

        let auth = AuthService::new(config.auth.clone())?;

        let payments = match PaymentsClient::new(&config.payments) {
            Ok(client) => Some(Arc::new(client)),
            Err(PaymentError::NotConfigured) => None,
            Err(e) => return Err(e.into()),
        };

        let packs = CreditPack::catalog(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        let user_limiter = RateLimiterCache::per_minute(config.user_rate_limit_per_minute);

        let executor = JobExecutor::spawn(ProcessingContext {
            config: worker.clone(),
            store: Arc::clone(&store),
            ledger: Arc::clone(&ledger),
            editors: editors.clone(),
        });

        Ok(Self {
            config,
            worker,
            upload_limits: UploadLimits::from_env(),
            store,
            ledger,
            editors,
            executor,
            auth: Arc::new(auth),
            payments,
            packs: Arc::new(packs),
            user_limiter: Arc::new(user_limiter),
        })
    }

    /// Override the upload limits.
    pub fn with_upload_limits(mut self, limits: UploadLimits) -> Self {
        self.upload_limits = limits;
        self
    }

    /// Override the credit pack catalog.
    pub fn with_packs(mut self, packs: Vec<CreditPack>) -> Self {
        self.packs = Arc::new(packs);
        self
    }

    /// Catalog entry for a pack.
    pub fn pack(&self, pack_type: PackType) -> Option<&CreditPack> {
        self.packs.iter().find(|p| p.pack_type == pack_type)
    }
}
