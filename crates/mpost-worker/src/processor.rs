//! Per-job processing.
//!
//! Files are edited one at a time in file-name order. A failing file is
//! counted and skipped; counts are written to the registry after every file.
//! Cancellation is not polled mid-job: a job cancelled while running keeps
//! going, its counts keep updating, and its final status stays `cancelled`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use mpost_imaging::{list_images, EditRequest, ImageEditor};
use mpost_ledger::{deduct_credits_with_retry, DeductionOutcome, DeductionRequest, Ledger};
use mpost_models::{Job, JobId, JobStatus, JobUpdate};
use mpost_queue::{JobStore, QueueError, QueuedJob};

use crate::config::WorkerConfig;
use crate::editors::EditorSet;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Everything a job needs while it runs.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn JobStore>,
    pub ledger: Arc<dyn Ledger>,
    pub editors: EditorSet,
}

/// Summary of one executed job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub processed: u32,
    pub failed: u32,
    /// `None` when the job was skipped before any file was attempted.
    pub billing: Option<DeductionOutcome>,
}

impl JobReport {
    fn skipped(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            processed: job.processed_files,
            failed: job.failed_files,
            billing: None,
        }
    }
}

/// Run one dequeued job to completion, then bill it.
pub async fn process_job(ctx: &ProcessingContext, queued: &QueuedJob) -> WorkerResult<JobReport> {
    let logger = JobLogger::new(&queued.job_id, &queued.user_id, queued.tier);
    let span = logger.create_span();
    run_job(ctx, queued, &logger).instrument(span).await
}

async fn run_job(
    ctx: &ProcessingContext,
    queued: &QueuedJob,
    logger: &JobLogger,
) -> WorkerResult<JobReport> {
    let job = match ctx
        .store
        .transition(
            &queued.job_id,
            &[JobStatus::Uploaded, JobStatus::Processing],
            JobUpdate::default().status(JobStatus::Processing),
        )
        .await
    {
        Ok(job) => job,
        Err(QueueError::InvalidTransition { status, .. }) => {
            logger.log_warning(&format!("Skipping job in status {}", status));
            let job = ctx
                .store
                .get(&queued.job_id)
                .await
                .ok_or_else(|| QueueError::not_found(queued.job_id.as_str()))?;
            return Ok(JobReport::skipped(&job));
        }
        Err(e) => return Err(e.into()),
    };

    let start = Instant::now();
    let job = match run_files(ctx, queued, &job, logger).await {
        Ok(job) => job,
        Err(e) => {
            logger.log_error(&e.to_string());
            fail_job(ctx, &queued.job_id, &e.job_message()).await;
            metrics::record_job(
                JobStatus::Failed.as_str(),
                queued.tier.as_str(),
                start.elapsed().as_secs_f64(),
            );
            return Err(e);
        }
    };

    metrics::record_job(
        job.status.as_str(),
        queued.tier.as_str(),
        start.elapsed().as_secs_f64(),
    );
    logger.log_completion(job.status.as_str(), job.processed_files, job.failed_files);

    let request = DeductionRequest::new(
        queued.user_id.clone(),
        queued.job_id.clone(),
        job.total_files,
        queued.tier,
    )
    .with_succeeded(job.processed_files);
    let billing = deduct_credits_with_retry(ctx.ledger.as_ref(), &request, &ctx.config.retry).await;
    logger.log_billing(&billing);

    Ok(JobReport {
        job_id: job.id.clone(),
        status: job.status,
        processed: job.processed_files,
        failed: job.failed_files,
        billing: Some(billing),
    })
}

/// The per-file loop. Returns the finalized job.
async fn run_files(
    ctx: &ProcessingContext,
    queued: &QueuedJob,
    job: &Job,
    logger: &JobLogger,
) -> WorkerResult<Job> {
    let editor = ctx.editors.for_tier(queued.tier)?;

    let mut files = list_images(&ctx.config.input_dir(&job.id)).await?;
    let total = job.total_files as usize;
    if files.len() != total {
        logger.log_warning(&format!(
            "Found {} files for a job of {}",
            files.len(),
            total
        ));
        files.truncate(total);
    }

    let output_dir = ctx.config.output_dir(&job.id);
    tokio::fs::create_dir_all(&output_dir).await?;

    logger.log_start(files.len(), queued.pipeline.as_str());

    let mut processed = 0u32;
    let mut failed = 0u32;
    // Inputs like `shoe.jpg` and `shoe.png` share a stem
    let mut written = HashSet::new();

    for (i, path) in files.iter().enumerate() {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        match process_file(editor.as_ref(), queued, path, &filename, &output_dir, &mut written).await {
            Ok(output) => {
                processed += 1;
                metrics::record_file(editor.name(), true);
                logger.log_file(i + 1, files.len(), &filename, Ok(output.as_str()));
            }
            Err(e) => {
                failed += 1;
                metrics::record_file(editor.name(), false);
                let reason = e.to_string();
                logger.log_file(i + 1, files.len(), &filename, Err(reason.as_str()));
            }
        }

        ctx.store
            .update(&job.id, JobUpdate::default().counts(processed, failed))
            .await?;

        if i + 1 < files.len() && !ctx.config.inter_file_delay.is_zero() {
            tokio::time::sleep(ctx.config.inter_file_delay).await;
        }
    }

    // Files that vanished between upload and processing count as failed.
    let missing = (total - files.len()) as u32;
    let latest = ctx
        .store
        .update(&job.id, JobUpdate::default().counts(processed, failed + missing))
        .await?;

    match ctx
        .store
        .transition(&job.id, &[JobStatus::Processing], latest.completion())
        .await
    {
        Ok(job) => Ok(job),
        Err(QueueError::InvalidTransition { status, .. }) => {
            logger.log_warning(&format!("Job ended in status {}, keeping it", status));
            Ok(latest)
        }
        Err(e) => Err(e.into()),
    }
}

/// Edit one file and write the result under a name no earlier file used.
/// Returns the output file name.
async fn process_file(
    editor: &dyn ImageEditor,
    queued: &QueuedJob,
    path: &Path,
    filename: &str,
    output_dir: &Path,
    written: &mut HashSet<String>,
) -> WorkerResult<String> {
    let bytes = tokio::fs::read(path).await?;

    let edited = editor
        .edit(EditRequest {
            image: &bytes,
            filename,
            pipeline: queued.pipeline,
            shadow: queued.settings,
        })
        .await?;

    let mut output_name = edited.output_name(filename);
    let mut n = 2;
    while written.contains(&output_name) {
        output_name = edited.numbered_output_name(filename, n);
        n += 1;
    }

    tokio::fs::write(output_dir.join(&output_name), &edited.bytes).await?;
    written.insert(output_name.clone());
    Ok(output_name)
}

/// Mark a job failed unless it already reached a terminal status.
async fn fail_job(ctx: &ProcessingContext, job_id: &JobId, message: &str) {
    let update = JobUpdate::default()
        .status(JobStatus::Failed)
        .error_message(message);
    if let Err(e) = ctx
        .store
        .transition(job_id, &[JobStatus::Uploaded, JobStatus::Processing], update)
        .await
    {
        tracing::warn!(job_id = %job_id, "Could not mark job failed: {}", e);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use mpost_imaging::{EditedImage, ImagingError, ImagingResult};
    use mpost_ledger::{
        AddCreditsReceipt, CreditBalance, LedgerError, LedgerResult, TransactionPage,
        UseCreditsReceipt,
    };
    use mpost_models::{CreditTransaction, Pipeline, ProcessingTier, ShadowSettings};
    use mpost_queue::InMemoryJobStore;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    /// Editor that fails for the listed file names and records every call.
    #[derive(Default)]
    pub struct ScriptedEditor {
        pub failing: HashSet<String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedEditor {
        pub fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|n| n.to_string()).collect(),
                calls: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl ImageEditor for ScriptedEditor {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn edit(&self, request: EditRequest<'_>) -> ImagingResult<EditedImage> {
            self.calls.lock().unwrap().push(request.filename.to_string());
            if self.failing.contains(request.filename) {
                return Err(ImagingError::request_failed("vendor rejected image"));
            }
            Ok(EditedImage::from_bytes(PNG.to_vec()))
        }
    }

    #[derive(Default)]
    pub struct RecordingLedger {
        pub debits: Mutex<Vec<CreditTransaction>>,
    }

    #[async_trait]
    impl Ledger for RecordingLedger {
        async fn get_balance(&self, _user_id: &str) -> LedgerResult<CreditBalance> {
            Ok(CreditBalance {
                credits: 100,
                updated_at: None,
            })
        }

        async fn use_credits(&self, tx: &CreditTransaction) -> LedgerResult<UseCreditsReceipt> {
            self.debits.lock().unwrap().push(tx.clone());
            Ok(UseCreditsReceipt {
                success: true,
                credits_remaining: 100 - tx.credits(),
                message: None,
            })
        }

        async fn add_credits(&self, _tx: &CreditTransaction) -> LedgerResult<AddCreditsReceipt> {
            Err(LedgerError::rejected("not used"))
        }

        async fn transaction_history(
            &self,
            _user_id: &str,
            _limit: u32,
            _offset: u32,
        ) -> LedgerResult<TransactionPage> {
            Ok(TransactionPage::default())
        }
    }

    pub struct Harness {
        pub dir: tempfile::TempDir,
        pub store: Arc<InMemoryJobStore>,
        pub ledger: Arc<RecordingLedger>,
        pub editor: Arc<ScriptedEditor>,
    }

    impl Harness {
        pub fn new(editor: ScriptedEditor) -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                store: Arc::new(InMemoryJobStore::new()),
                ledger: Arc::new(RecordingLedger::default()),
                editor: Arc::new(editor),
            }
        }

        pub fn config(&self) -> WorkerConfig {
            WorkerConfig {
                inter_file_delay: Duration::ZERO,
                upload_dir: self.dir.path().join("uploads"),
                processed_dir: self.dir.path().join("processed"),
                retry: mpost_ledger::RetryPolicy::once(),
                ..WorkerConfig::default()
            }
        }

        pub fn context(&self) -> ProcessingContext {
            ProcessingContext {
                config: self.config(),
                store: self.store.clone(),
                ledger: self.ledger.clone(),
                editors: EditorSet::new(self.editor.clone()),
            }
        }

        /// Create an uploaded job with the given files and queue it.
        pub async fn job(&self, files: &[&str], tier: ProcessingTier) -> QueuedJob {
            let job = Job::new("user-1", files.len() as u32);
            let input = self.config().input_dir(&job.id);
            tokio::fs::create_dir_all(&input).await.unwrap();
            for name in files {
                tokio::fs::write(input.join(name), PNG).await.unwrap();
            }
            let mut queued = QueuedJob::from_job(&job);
            queued.tier = tier;
            queued.pipeline = Pipeline::Amazon;
            queued.settings = ShadowSettings::default();
            self.store.put(job).await;
            queued
        }
    }

    #[tokio::test]
    async fn test_all_files_succeed() {
        let h = Harness::new(ScriptedEditor::default());
        let queued = h.job(&["b.png", "a.png", "c.png"], ProcessingTier::Basic).await;

        let report = process_job(&h.context(), &queued).await.unwrap();
        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.billing.as_ref().unwrap().credits_charged(), 3);

        assert_eq!(*h.editor.calls.lock().unwrap(), vec!["a.png", "b.png", "c.png"]);

        let output = h.config().output_dir(&queued.job_id);
        assert!(output.join("a_processed.png").exists());
        assert!(output.join("c_processed.png").exists());

        let job = h.store.get(&queued.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_files, 3);
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn test_shared_stems_keep_every_output() {
        let h = Harness::new(ScriptedEditor::default());
        let queued = h.job(&["shoe.jpg", "shoe.png", "shoe.webp"], ProcessingTier::Basic).await;

        let report = process_job(&h.context(), &queued).await.unwrap();
        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.processed, 3);
        assert_eq!(report.billing.as_ref().unwrap().credits_charged(), 3);

        let output = h.config().output_dir(&queued.job_id);
        let mut names: Vec<String> = std::fs::read_dir(&output)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len() as u32, report.processed);
        assert_eq!(
            names,
            vec!["shoe_processed.png", "shoe_processed_2.png", "shoe_processed_3.png"]
        );
    }

    #[tokio::test]
    async fn test_single_failure_fails_job_without_charge() {
        let h = Harness::new(ScriptedEditor::failing(&["only.png"]));
        let queued = h.job(&["only.png"], ProcessingTier::Basic).await;

        let report = process_job(&h.context(), &queued).await.unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.billing, Some(DeductionOutcome::NoSuccessfulImages));
        assert!(h.ledger.debits.lock().unwrap().is_empty());

        let job = h.store.get(&queued.job_id).await.unwrap();
        assert_eq!(job.processed_files, 0);
        assert_eq!(job.failed_files, 1);
        assert_eq!(job.error_message.as_deref(), Some("All files failed to process"));
    }

    #[tokio::test]
    async fn test_partial_failure_charges_successes_only() {
        let h = Harness::new(ScriptedEditor::failing(&["b.png"]));
        let queued = h.job(&["a.png", "b.png", "c.png"], ProcessingTier::Premium).await;

        let mut ctx = h.context();
        ctx.editors = EditorSet::new(h.editor.clone()).with_premium(h.editor.clone());
        let report = process_job(&ctx, &queued).await.unwrap();

        assert_eq!(report.status, JobStatus::CompletedWithErrors);
        let debits = h.ledger.debits.lock().unwrap();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].credits(), 6);

        let job = h.store.get(&queued.job_id).await.unwrap();
        assert_eq!(job.error_message.as_deref(), Some("Processed 2 files, 1 failed"));
        assert!(job.processed_files + job.failed_files <= job.total_files);
    }

    #[tokio::test]
    async fn test_premium_without_editor_fails_job() {
        let h = Harness::new(ScriptedEditor::default());
        let queued = h.job(&["a.png"], ProcessingTier::Premium).await;

        let err = process_job(&h.context(), &queued).await.unwrap_err();
        assert!(matches!(err, WorkerError::EditorUnavailable(ProcessingTier::Premium)));

        let job = h.store.get(&queued.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("premium processing is not available"));
        assert!(h.editor.calls.lock().unwrap().is_empty());
        assert!(h.ledger.debits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_skipped() {
        let h = Harness::new(ScriptedEditor::default());
        let queued = h.job(&["a.png"], ProcessingTier::Basic).await;
        mpost_queue::cancel_job(h.store.as_ref(), &queued.job_id).await.unwrap();

        let report = process_job(&h.context(), &queued).await.unwrap();
        assert_eq!(report.status, JobStatus::Cancelled);
        assert!(report.billing.is_none());
        assert!(h.editor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_run_keeps_status() {
        struct CancellingEditor {
            store: Arc<InMemoryJobStore>,
            job_id: JobId,
        }

        #[async_trait]
        impl ImageEditor for CancellingEditor {
            fn name(&self) -> &'static str {
                "cancelling"
            }

            async fn edit(&self, _request: EditRequest<'_>) -> ImagingResult<EditedImage> {
                let _ = mpost_queue::cancel_job(self.store.as_ref(), &self.job_id).await;
                Ok(EditedImage::from_bytes(PNG.to_vec()))
            }
        }

        let h = Harness::new(ScriptedEditor::default());
        let queued = h.job(&["a.png", "b.png"], ProcessingTier::Basic).await;
        let mut ctx = h.context();
        ctx.editors = EditorSet::new(Arc::new(CancellingEditor {
            store: h.store.clone(),
            job_id: queued.job_id.clone(),
        }));

        let report = process_job(&ctx, &queued).await.unwrap();
        assert_eq!(report.status, JobStatus::Cancelled);
        assert_eq!(report.processed, 2);
        assert_eq!(report.billing.unwrap().credits_charged(), 2);
    }

    #[tokio::test]
    async fn test_missing_files_count_as_failed() {
        let h = Harness::new(ScriptedEditor::default());
        let queued = h.job(&["a.png", "b.png"], ProcessingTier::Basic).await;
        tokio::fs::remove_file(h.config().input_dir(&queued.job_id).join("b.png"))
            .await
            .unwrap();

        let report = process_job(&h.context(), &queued).await.unwrap();
        assert_eq!(report.status, JobStatus::CompletedWithErrors);
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
    }
}
