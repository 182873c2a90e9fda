//! Partition exporter
//!
//! Drains a queue of manifest partitions with a fixed pool of workers. Each
//! worker claims one partition at a time, fetches its documents sorted by the
//! ordering field and hands the pages to the [`PartitionWriter`].
//!
//! Two signals govern a job:
//! - the abort token, owned by the caller (Ctrl+C), which writers observe
//!   between pages
//! - a stop token derived from it, set by the first failing worker, after
//!   which no worker claims another partition
//!
//! Partitions already in flight when a worker fails run to completion.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{FetchRequest, IndexClient, IndexSchema, Projection};
use crate::error::{ConfigError, ExecutionError, Result};
use crate::partition::{Partition, PartitionManifest};

use super::progress::{ProgressTracker, TrackedPages};
use super::writers::PartitionWriter;

/// Export job settings.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Number of workers
    pub concurrency: usize,
    /// Documents per result page
    pub page_size: u32,
    /// Export only these partition ids, in this order
    pub include_ids: Vec<usize>,
    /// Skip these partition ids
    pub exclude_ids: Vec<usize>,
    /// Request only these fields
    pub include_fields: Vec<String>,
    /// Do not request these fields
    pub exclude_fields: Vec<String>,
    /// Display a progress bar
    pub show_progress: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            page_size: 1000,
            include_ids: Vec::new(),
            exclude_ids: Vec::new(),
            include_fields: Vec::new(),
            exclude_fields: Vec::new(),
            show_progress: false,
        }
    }
}

/// A queued partition and its manifest position.
#[derive(Debug, Clone)]
pub struct PartitionToExport {
    pub id: usize,
    pub partition: Partition,
}

/// Outcome of a successful export job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub partitions_exported: usize,
    pub documents_exported: u64,
    pub elapsed_ms: u64,
}

/// Concurrent exporter of manifest partitions.
pub struct PartitionExporter {
    client: Arc<dyn IndexClient>,
    writer: Arc<dyn PartitionWriter>,
    schema: IndexSchema,
    cancel_token: CancellationToken,
}

/// State shared by the workers of one job.
struct ExportJob {
    queue: Mutex<VecDeque<PartitionToExport>>,
    stop: CancellationToken,
    abort: CancellationToken,
    failures: Mutex<Vec<(usize, String)>>,
    partitions_exported: AtomicU64,
    documents_exported: AtomicU64,
    field_name: String,
    projection: Projection,
    page_size: u32,
    tracker: Arc<ProgressTracker>,
}

impl ExportJob {
    /// Claim the next partition unless the job is stopping.
    ///
    /// The stop token is read under the queue lock, which `fail` also holds
    /// while cancelling, so no claim succeeds after a recorded failure.
    fn claim(&self) -> Option<PartitionToExport> {
        let mut queue = self.queue.lock().ok()?;
        if self.stop.is_cancelled() {
            return None;
        }
        queue.pop_front()
    }

    fn fail(&self, id: usize, message: String) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((id, message));
        }
        let _queue = self.queue.lock();
        self.stop.cancel();
    }

    fn take_failures(&self) -> Vec<(usize, String)> {
        self.failures
            .lock()
            .map(|mut f| std::mem::take(&mut *f))
            .unwrap_or_default()
    }
}

impl PartitionExporter {
    /// Create a new exporter
    ///
    /// # Arguments
    /// * `client` - Index to fetch from, usually behind a retry policy
    /// * `writer` - Destination of the exported pages
    /// * `schema` - Known fields of the index, used for projections
    pub fn new(
        client: Arc<dyn IndexClient>,
        writer: Arc<dyn PartitionWriter>,
        schema: IndexSchema,
    ) -> Self {
        Self {
            client,
            writer,
            schema,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Set the abort token for export jobs
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Partitions to export, in queue order
    ///
    /// A non-empty include list selects exactly those ids in the given order;
    /// otherwise every partition not excluded is selected in manifest order.
    pub fn select(
        manifest: &PartitionManifest,
        options: &ExportOptions,
    ) -> Result<Vec<PartitionToExport>> {
        for &id in options.include_ids.iter().chain(&options.exclude_ids) {
            manifest.partition(id)?;
        }

        let selected = if options.include_ids.is_empty() {
            let excluded: BTreeSet<usize> = options.exclude_ids.iter().copied().collect();
            manifest
                .partitions
                .iter()
                .enumerate()
                .filter(|(id, _)| !excluded.contains(id))
                .map(|(id, p)| PartitionToExport {
                    id,
                    partition: p.clone(),
                })
                .collect()
        } else {
            let mut seen = BTreeSet::new();
            options
                .include_ids
                .iter()
                .filter(|id| seen.insert(**id))
                .map(|&id| PartitionToExport {
                    id,
                    partition: manifest.partitions[id].clone(),
                })
                .collect()
        };
        Ok(selected)
    }

    /// Export the selected partitions of a manifest
    ///
    /// Fails as a whole if any partition fails; partitions written before the
    /// failure stay on the writer's side.
    ///
    /// # Returns
    /// * `Result<ExportSummary>` - Totals of the job or the aggregated failure
    pub async fn export(
        &self,
        manifest: &PartitionManifest,
        options: &ExportOptions,
    ) -> Result<ExportSummary> {
        let start_time = Instant::now();

        if options.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "export.concurrency".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if options.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "export.page_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let projection =
            Projection::resolve(&self.schema, &options.include_fields, &options.exclude_fields)?;
        let selected = Self::select(manifest, options)?;
        let selected_documents: u64 = selected.iter().map(|p| p.partition.document_count).sum();

        info!(
            "Exporting {} of {} partitions ({} documents) with {} workers",
            selected.len(),
            manifest.partitions.len(),
            selected_documents,
            options.concurrency
        );

        let workers = options.concurrency.min(selected.len());
        let job = Arc::new(ExportJob {
            queue: Mutex::new(selected.into()),
            stop: self.cancel_token.child_token(),
            abort: self.cancel_token.clone(),
            failures: Mutex::new(Vec::new()),
            partitions_exported: AtomicU64::new(0),
            documents_exported: AtomicU64::new(0),
            field_name: manifest.field_name.clone(),
            projection,
            page_size: options.page_size,
            tracker: Arc::new(ProgressTracker::new(
                Some(selected_documents),
                options.show_progress,
            )),
        });

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let job = job.clone();
                let client = self.client.clone();
                let writer = self.writer.clone();
                tokio::spawn(async move { run_worker(worker, job, client, writer).await })
            })
            .collect();

        let mut worker_failure = None;
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Export worker ended abnormally: {}", e);
                job.stop.cancel();
                worker_failure.get_or_insert(e.to_string());
            }
        }
        job.tracker.finish();

        let failures = job.take_failures();
        if !failures.is_empty() {
            return Err(ExecutionError::PartitionsFailed { failures }.into());
        }
        if let Some(message) = worker_failure {
            return Err(ExecutionError::WorkerFailed(message).into());
        }
        if job.abort.is_cancelled() {
            return Err(ExecutionError::Cancelled.into());
        }

        let summary = ExportSummary {
            partitions_exported: job.partitions_exported.load(Ordering::SeqCst) as usize,
            documents_exported: job.documents_exported.load(Ordering::SeqCst),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };
        info!(
            "Export completed: {} partitions, {} documents, {} ms",
            summary.partitions_exported, summary.documents_exported, summary.elapsed_ms
        );
        Ok(summary)
    }
}

async fn run_worker(
    worker: usize,
    job: Arc<ExportJob>,
    client: Arc<dyn IndexClient>,
    writer: Arc<dyn PartitionWriter>,
) {
    debug!("Worker {} started", worker);
    while let Some(item) = job.claim() {
        let id = item.id;
        info!("Starting partition {}", id);

        match export_partition(&job, client.as_ref(), writer.as_ref(), item).await {
            Ok(written) => {
                job.partitions_exported.fetch_add(1, Ordering::SeqCst);
                job.documents_exported.fetch_add(written, Ordering::SeqCst);
                info!("Ended partition {} ({} documents)", id, written);
            }
            Err(e) if e.is_cancelled() => {
                info!("Partition {} cancelled", id);
                job.stop.cancel();
            }
            Err(e) => {
                error!("Partition {} failed: {}", id, e);
                job.fail(id, e.to_string());
            }
        }
    }
    debug!("Worker {} finished", worker);
}

/// Fetch one partition and hand its pages to the writer
async fn export_partition(
    job: &ExportJob,
    client: &dyn IndexClient,
    writer: &dyn PartitionWriter,
    item: PartitionToExport,
) -> Result<u64> {
    let window = client.max_result_window();
    let expected = item.partition.document_count;
    if expected > window {
        warn!(
            "Partition {} holds {} documents but at most {} can be retrieved; the export will be truncated",
            item.id, expected, window
        );
    }

    let request = FetchRequest {
        filter: item.partition.filter,
        sort_field: job.field_name.clone(),
        projection: job.projection.clone(),
        max_results: expected.min(window),
        page_size: job.page_size,
    };

    let pages = client.paged_fetch(request).await?;
    let pages = Box::new(TrackedPages::new(pages, job.tracker.clone()));
    let written = writer
        .write_partition(item.id, pages, &job.abort, Some(job.page_size))
        .await?;

    if written != expected {
        debug!(
            "Partition {} wrote {} documents, manifest recorded {}",
            item.id, written, expected
        );
    }
    Ok(written)
}
