//! The synchronization engine.
//!
//! One engine owns one connector/store pair and runs sync jobs against
//! them. Runs for the same data source are serialized; different sources
//! run in parallel. Within a run, batches execute in sequence and the
//! per-record writes inside a batch run concurrently up to
//! `config.concurrency`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use accord_connector::error::StoreError;
use accord_connector::filter::{DataFilter, FetchQuery, PageRequest};
use accord_connector::ids::{ConflictId, DataSourceId, JobId};
use accord_connector::record::DataRecord;
use accord_connector::resilience::RetryExecutor;
use accord_connector::traits::{Connector, LocalStore};
use accord_connector::value::FieldMap;
use accord_transform::executor::{TransformExecutor, TransformOutcome};
use accord_transform::types::TransformationPipeline;

use crate::change::ChangeEvent;
use crate::config::{SyncConfig, SyncOptions};
use crate::conflict::{
    Conflict, ConflictDetector, ConflictRegistry, ConflictResolver, ResolutionAction,
};
use crate::error::{EngineResult, SyncError};
use crate::job::{SyncJob, SyncResult};
use crate::progress::SyncProgressEvent;
use crate::rate_limiter::TokenBucket;
use crate::stats::RunStats;
use crate::types::{ChangeKind, ConflictKind, ResolutionStrategy, SyncErrorKind, SyncType};

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// A store write planned for one record.
enum WriteOp {
    Create(DataRecord),
    Update(DataRecord),
    Delete(DataRecord),
}

/// Removes the data source from the running set when the run ends.
struct SourceGuard<'a> {
    running: &'a StdMutex<HashSet<DataSourceId>>,
    source: DataSourceId,
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.source);
        }
    }
}

/// Orchestrates sync runs over an injected connector and local store.
///
/// The engine keeps a snapshot of every job it has run, a registry of
/// every conflict it has detected, and a broadcast channel of progress
/// events. Wrap it in an [`Arc`] to drive it from several tasks; every
/// method takes `&self`.
pub struct SyncEngine<C, S> {
    connector: Arc<C>,
    store: Arc<S>,
    config: SyncConfig,
    executor: TransformExecutor,
    registry: ConflictRegistry,
    jobs: RwLock<HashMap<JobId, SyncJob>>,
    cancels: StdMutex<HashMap<JobId, Arc<AtomicBool>>>,
    running: StdMutex<HashSet<DataSourceId>>,
    progress: broadcast::Sender<SyncProgressEvent>,
}

impl<C, S> SyncEngine<C, S>
where
    C: Connector + 'static,
    S: LocalStore + 'static,
{
    /// Create an engine over the given collaborators.
    ///
    /// `config` is the engine-wide default; [`SyncEngine::options`] seeds
    /// per-run options from it, and a caller-built [`SyncOptions`] can
    /// override any of it for one run.
    #[must_use]
    pub fn new(connector: Arc<C>, store: Arc<S>, config: SyncConfig) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            connector,
            store,
            config,
            executor: TransformExecutor::new(),
            registry: ConflictRegistry::new(),
            jobs: RwLock::new(HashMap::new()),
            cancels: StdMutex::new(HashMap::new()),
            running: StdMutex::new(HashSet::new()),
            progress,
        }
    }

    /// Run options for one record type, seeded with the engine default
    /// configuration.
    #[must_use]
    pub fn options(&self, data_type: impl Into<String>) -> SyncOptions {
        SyncOptions::new(data_type).with_config(self.config.clone())
    }

    /// Subscribe to progress events. Sends are best-effort; a lagging
    /// receiver never blocks a run.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncProgressEvent> {
        self.progress.subscribe()
    }

    /// Snapshot of a job, running or finished.
    pub async fn sync_status(&self, job_id: JobId) -> Option<SyncJob> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    /// Snapshots of all jobs that have not reached a terminal status.
    pub async fn active_syncs(&self) -> Vec<SyncJob> {
        let jobs = self.jobs.read().await;
        let mut active: Vec<SyncJob> = jobs
            .values()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|j| j.created_at);
        active
    }

    /// Request cooperative cancellation of a running job.
    ///
    /// The run observes the request between batches: the current batch
    /// finishes, no further fetches or writes are issued, and the job
    /// lands in `cancelled` with the counters gathered so far.
    pub async fn stop_sync(&self, job_id: JobId) -> EngineResult<()> {
        let status = self
            .jobs
            .read()
            .await
            .get(&job_id)
            .map(|j| j.status)
            .ok_or(SyncError::JobNotFound { job_id })?;
        if !status.can_cancel() {
            return Err(SyncError::NotCancellable { job_id, status });
        }
        let flag = self
            .cancels
            .lock()
            .map_err(|_| SyncError::internal("cancel registry poisoned"))?
            .get(&job_id)
            .cloned()
            .ok_or(SyncError::JobNotFound { job_id })?;
        info!(job_id = %job_id, "Cancellation requested");
        flag.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Unresolved conflicts, oldest first. `None` spans all data sources.
    pub async fn conflicts(&self, source: Option<DataSourceId>) -> Vec<Conflict> {
        self.registry.unresolved(source).await
    }

    /// Look up one conflict, resolved or not.
    pub async fn conflict(&self, id: ConflictId) -> Option<Conflict> {
        self.registry.get(id).await
    }

    /// Apply an out-of-band resolution to a queued conflict.
    ///
    /// `resolution_data` overrides the written field map when given.
    /// Resolution is terminal: a second call for the same conflict fails
    /// with [`SyncError::ConflictAlreadyResolved`], and the resolution
    /// write stamps `synced_at`, so later runs do not re-detect it.
    #[instrument(skip(self, resolution_data), fields(conflict_id = %conflict_id))]
    pub async fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        resolution: ResolutionStrategy,
        resolution_data: Option<FieldMap>,
    ) -> EngineResult<()> {
        if resolution == ResolutionStrategy::Manual {
            return Err(SyncError::invalid_resolution(
                "'manual' queues a conflict; it cannot settle one",
            ));
        }
        let conflict = self
            .registry
            .get(conflict_id)
            .await
            .ok_or(SyncError::ConflictNotFound { conflict_id })?;
        if conflict.resolved {
            return Err(SyncError::ConflictAlreadyResolved { conflict_id });
        }

        let merged = self
            .apply_resolution(&conflict, resolution, resolution_data)
            .await?;
        self.registry
            .mark_resolved(conflict_id, resolution, merged)
            .await?;
        info!(resolution = %resolution, "Conflict resolved");
        Ok(())
    }

    /// Perform the write a resolution calls for. Returns the field map
    /// stored on the conflict for merge-style resolutions.
    async fn apply_resolution(
        &self,
        conflict: &Conflict,
        resolution: ResolutionStrategy,
        resolution_data: Option<FieldMap>,
    ) -> EngineResult<Option<FieldMap>> {
        let now = Utc::now();
        if conflict.kind == ConflictKind::Delete {
            // Nothing remote to merge with: a delete conflict is settled
            // by keeping the local record, applying the delete, or
            // writing explicit replacement fields.
            return match (resolution, resolution_data) {
                (ResolutionStrategy::UseLocal, _) => Ok(None),
                (ResolutionStrategy::UseRemote, _) => {
                    self.store.delete_record(conflict.local.id).await?;
                    Ok(None)
                }
                (ResolutionStrategy::Merge, Some(fields)) => {
                    let mut record = conflict.local.clone();
                    record.apply_update(fields.clone(), now);
                    self.store.update_record(record).await?;
                    Ok(Some(fields))
                }
                (ResolutionStrategy::Merge, None) => Err(SyncError::invalid_resolution(
                    "a delete conflict needs resolution_data to merge",
                )),
                (ResolutionStrategy::Manual, _) => unreachable!("rejected above"),
            };
        }

        let fields = match resolution {
            ResolutionStrategy::UseLocal => return Ok(None),
            ResolutionStrategy::UseRemote => resolution_data
                .unwrap_or_else(|| conflict.transformed.clone()),
            ResolutionStrategy::Merge => resolution_data.unwrap_or_else(|| {
                crate::conflict::merge_fields(&conflict.local.fields, &conflict.remote)
            }),
            ResolutionStrategy::Manual => unreachable!("rejected above"),
        };
        let mut record = conflict.local.clone();
        record.apply_update(fields.clone(), now);
        self.store.update_record(record).await?;
        let merged = (resolution == ResolutionStrategy::Merge).then_some(fields);
        Ok(merged)
    }

    /// Run one pull sync and return its result.
    ///
    /// Returns `Err` only when the run could not start or failed before
    /// any record was processed; every later failure is recorded on the
    /// job and reported through an `Ok` result with accurate partial
    /// counters.
    #[instrument(skip(self, options), fields(data_source_id = %data_source_id, sync_type = %sync_type))]
    pub async fn start_sync(
        &self,
        data_source_id: DataSourceId,
        sync_type: SyncType,
        options: SyncOptions,
    ) -> EngineResult<SyncResult> {
        if !sync_type.is_pull() {
            return Err(SyncError::invalid_config(
                "real_time and webhook syncs take events; use process_events",
            ));
        }
        self.run(data_source_id, sync_type, options, Vec::new()).await
    }

    /// Apply externally pushed change events through the reconciliation
    /// path.
    ///
    /// Events are chunked into batches of `batch_size`. The remote-absence
    /// delete pass never runs here: a batch of events says nothing about
    /// records it does not mention.
    #[instrument(skip(self, events, options), fields(data_source_id = %data_source_id, events = events.len()))]
    pub async fn process_events(
        &self,
        data_source_id: DataSourceId,
        sync_type: SyncType,
        events: Vec<ChangeEvent>,
        options: SyncOptions,
    ) -> EngineResult<SyncResult> {
        if !sync_type.is_event_driven() {
            return Err(SyncError::invalid_config(
                "full and incremental syncs pull pages; use start_sync",
            ));
        }
        self.run(data_source_id, sync_type, options, events).await
    }

    /// Shared run skeleton for pull and event-driven syncs.
    async fn run(
        &self,
        source: DataSourceId,
        sync_type: SyncType,
        options: SyncOptions,
        events: Vec<ChangeEvent>,
    ) -> EngineResult<SyncResult> {
        options.config.validate()?;

        let _guard = self.claim_source(source)?;

        let mut job = SyncJob::new(source, sync_type);
        job.metadata
            .insert("connector".into(), self.connector.name().to_string());
        job.metadata
            .insert("data_type".into(), options.data_type.clone());
        let job_id = job.id;
        let cancel = Arc::new(AtomicBool::new(false));
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.insert(job_id, Arc::clone(&cancel));
        }

        job.mark_running();
        let run_start = job.started_at.unwrap_or_else(Utc::now);
        self.save_job(&job).await;
        self.emit(SyncProgressEvent::Started {
            job_id,
            data_source_id: source,
            sync_type,
        });

        let stats = Arc::new(RunStats::new());
        let body = async {
            if sync_type.is_pull() {
                self.connector.test_connection().await?;
                self.run_pull(&mut job, &options, &stats, &cancel).await
            } else {
                self.run_events(&mut job, &options, events, &stats, &cancel)
                    .await
            }
        };
        let outcome = tokio::time::timeout(options.config.timeout(), body)
            .await
            .unwrap_or(Err(SyncError::Timeout {
                elapsed_ms: options.config.timeout_ms,
            }));

        job.counters = stats.counters();
        job.errors = stats.errors();

        match outcome {
            Ok(()) if cancel.load(Ordering::SeqCst) => {
                job.mark_cancelled();
                self.emit(SyncProgressEvent::Cancelled { job_id });
                info!(job_id = %job_id, "Sync cancelled");
                Ok(self.finish_job(job).await)
            }
            Ok(()) => {
                let mut late_failure = None;
                if sync_type == SyncType::Incremental {
                    if let Err(e) = self.store.update_last_sync_time(source, run_start).await {
                        late_failure = Some(SyncError::from(e));
                    }
                }
                match late_failure {
                    None => {
                        job.mark_completed();
                        self.emit(SyncProgressEvent::Completed {
                            job_id,
                            counters: job.counters,
                        });
                        info!(
                            job_id = %job_id,
                            processed = job.counters.processed,
                            created = job.counters.created,
                            updated = job.counters.updated,
                            deleted = job.counters.deleted,
                            skipped = job.counters.skipped,
                            conflicts = job.counters.conflicts,
                            "Sync completed"
                        );
                        Ok(self.finish_job(job).await)
                    }
                    Some(error) => self.fail_job(job, error).await,
                }
            }
            Err(error) => self.fail_job(job, error).await,
        }
    }

    /// Mark a job failed.
    ///
    /// A failure before the first processed record propagates as `Err`;
    /// anything later is recorded on the job and returned as an `Ok`
    /// result with partial counters.
    async fn fail_job(&self, mut job: SyncJob, error: SyncError) -> EngineResult<SyncResult> {
        warn!(job_id = %job.id, error = %error, "Sync run failed");
        let nothing_processed = job.counters == crate::job::SyncCounters::default();
        job.record_error(error.kind(), error.to_string());
        job.mark_failed();
        self.emit(SyncProgressEvent::Failed {
            job_id: job.id,
            message: error.to_string(),
        });
        let result = self.finish_job(job).await;
        if nothing_processed {
            Err(error)
        } else {
            Ok(result)
        }
    }

    /// Store the final snapshot and drop the cancel flag.
    async fn finish_job(&self, job: SyncJob) -> SyncResult {
        let result = job.result();
        self.save_job(&job).await;
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.remove(&job.id);
        }
        result
    }

    /// The paginated fetch-and-reconcile loop, plus the delete pass.
    async fn run_pull(
        &self,
        job: &mut SyncJob,
        options: &SyncOptions,
        stats: &Arc<RunStats>,
        cancel: &Arc<AtomicBool>,
    ) -> EngineResult<()> {
        let config = &options.config;
        let mut filters = options.filters.clone();
        if job.sync_type == SyncType::Incremental {
            if let Some(watermark) = self.store.last_sync_time(job.data_source_id).await? {
                filters.push(DataFilter::greater_than(
                    "updated_at",
                    watermark.to_rfc3339(),
                ));
            }
        }

        let locals = self.load_locals(job.data_source_id, &options.data_type).await?;
        let mut seen: HashSet<String> = HashSet::new();
        let limiter = config
            .rate_limit_per_minute
            .map(|per_minute| TokenBucket::per_minute(u64::from(per_minute)));
        let retry = RetryExecutor::new(config.retry_policy());
        let semaphore = Arc::new(Semaphore::new(config.concurrency));

        let page_size = u32::try_from(config.batch_size).unwrap_or(u32::MAX);
        let mut page = PageRequest::first(page_size);
        let mut batch: u32 = 0;
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Ok(());
            }
            if let Some(bucket) = &limiter {
                bucket.acquire().await;
            }

            let query = FetchQuery::new(options.data_type.clone(), page)
                .with_filters(filters.clone());
            let remote = retry
                .execute(|| self.connector.fetch_page(&query))
                .await?;
            let short_page = remote.len() < config.batch_size;
            if cancel.load(Ordering::SeqCst) {
                // Cancelled while the fetch was in flight; the page is
                // discarded without writes.
                return Ok(());
            }

            if !remote.is_empty() {
                batch += 1;
                let count = remote.len() as u64;
                let ops = self
                    .plan_batch(job, options, &locals, &mut seen, remote, stats)
                    .await;
                self.apply_ops(ops, &retry, &semaphore, stats).await;
                stats.add_processed(count);
                self.snapshot_progress(job, batch, stats).await;
            }

            if short_page {
                break;
            }
            page = page.next();
        }

        self.delete_pass(config.batch_size, &locals, &seen, &retry, &semaphore, stats, cancel)
            .await;
        Ok(())
    }

    /// Reconcile one fetched page into planned writes.
    ///
    /// Synchronous bookkeeping: lookup, transformation, diffing, and
    /// conflict decisions happen here; the returned ops carry the I/O.
    async fn plan_batch(
        &self,
        job: &SyncJob,
        options: &SyncOptions,
        locals: &HashMap<String, DataRecord>,
        seen: &mut HashSet<String>,
        remote: Vec<DataRecord>,
        stats: &Arc<RunStats>,
    ) -> Vec<WriteOp> {
        let mut ops = Vec::with_capacity(remote.len());
        for record in remote {
            seen.insert(record.external_id.clone());
            let Some(fields) =
                self.transform(options.pipeline.as_ref(), &record, stats)
            else {
                continue;
            };
            let op = self
                .reconcile_one(job, options, locals.get(&record.external_id), &record, fields, stats)
                .await;
            if let Some(op) = op {
                ops.push(op);
            }
        }
        ops
    }

    /// Route one remote record to create, update, skip, or conflict.
    async fn reconcile_one(
        &self,
        job: &SyncJob,
        options: &SyncOptions,
        local: Option<&DataRecord>,
        remote: &DataRecord,
        transformed: FieldMap,
        stats: &Arc<RunStats>,
    ) -> Option<WriteOp> {
        let now = Utc::now();
        let Some(local) = local else {
            let created = DataRecord::new(
                job.data_source_id,
                options.data_type.clone(),
                remote.external_id.clone(),
                transformed,
            )
            .with_origin(self.connector.name());
            // synced_at must equal updated_at exactly, or the next run
            // reads the creation as a local edit and raises a conflict.
            let at = created.updated_at;
            return Some(WriteOp::Create(created.synced(at)));
        };

        if !local.deleted && local.same_fields(&transformed) {
            stats.record_skipped();
            return None;
        }

        let detector = ConflictDetector::new(options.config.conflict_skew());
        match detector.check_update(local, remote.updated_at) {
            None => {
                let mut updated = local.clone();
                updated.apply_update(transformed, now);
                Some(WriteOp::Update(updated))
            }
            Some(kind) => {
                self.handle_conflict(
                    job,
                    options,
                    kind,
                    local,
                    remote.fields.clone(),
                    transformed,
                    stats,
                )
                .await
            }
        }
    }

    /// Store a conflict and translate the run's strategy into a write.
    #[allow(clippy::too_many_arguments)]
    async fn handle_conflict(
        &self,
        job: &SyncJob,
        options: &SyncOptions,
        kind: ConflictKind,
        local: &DataRecord,
        remote: FieldMap,
        transformed: FieldMap,
        stats: &Arc<RunStats>,
    ) -> Option<WriteOp> {
        stats.record_conflict();
        let strategy = options.effective_resolution();
        let reason = match kind {
            ConflictKind::Create => "record diverged before its first successful sync",
            ConflictKind::Update => "both sides modified since the last sync",
            ConflictKind::Delete => "remote deleted a record modified locally",
        };
        let mut conflict = Conflict::new(job.id, kind, local.clone(), remote, transformed, reason);
        debug!(
            external_id = %conflict.external_id,
            kind = %kind,
            strategy = %strategy,
            "Conflict detected"
        );

        let action = if kind == ConflictKind::Delete {
            // Merge has no remote fields to union with on a delete.
            match strategy {
                ResolutionStrategy::UseLocal => ResolutionAction::KeepLocal,
                ResolutionStrategy::UseRemote => {
                    ResolutionAction::WriteRemote(FieldMap::new())
                }
                ResolutionStrategy::Merge | ResolutionStrategy::Manual => ResolutionAction::Queue,
            }
        } else {
            ConflictResolver::decide(
                strategy,
                &conflict.local.fields,
                &conflict.remote,
                &conflict.transformed,
            )
        };

        let now = Utc::now();
        let op = match action {
            ResolutionAction::KeepLocal => {
                conflict.resolved = true;
                conflict.resolution = Some(strategy);
                conflict.resolved_at = Some(now);
                None
            }
            ResolutionAction::WriteRemote(fields) => {
                conflict.resolved = true;
                conflict.resolution = Some(strategy);
                conflict.resolved_at = Some(now);
                if kind == ConflictKind::Delete {
                    Some(WriteOp::Delete(conflict.local.clone()))
                } else {
                    let mut updated = conflict.local.clone();
                    updated.apply_update(fields, now);
                    Some(WriteOp::Update(updated))
                }
            }
            ResolutionAction::WriteMerged(fields) => {
                conflict.resolved = true;
                conflict.resolution = Some(strategy);
                conflict.merged = Some(fields.clone());
                conflict.resolved_at = Some(now);
                let mut updated = conflict.local.clone();
                updated.apply_update(fields, now);
                Some(WriteOp::Update(updated))
            }
            ResolutionAction::Queue => None,
        };

        self.emit(SyncProgressEvent::ConflictDetected {
            job_id: job.id,
            conflict_id: conflict.id,
            external_id: conflict.external_id.clone(),
        });
        self.registry.insert(conflict).await;
        op
    }

    /// Soft-delete local records the remote side no longer has.
    #[allow(clippy::too_many_arguments)]
    async fn delete_pass(
        &self,
        batch_size: usize,
        locals: &HashMap<String, DataRecord>,
        seen: &HashSet<String>,
        retry: &RetryExecutor,
        semaphore: &Arc<Semaphore>,
        stats: &Arc<RunStats>,
        cancel: &Arc<AtomicBool>,
    ) {
        let mut vanished: Vec<&DataRecord> = locals
            .values()
            .filter(|r| !r.deleted && !seen.contains(&r.external_id))
            .collect();
        vanished.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        if vanished.is_empty() {
            return;
        }

        let mut batch = 0u32;
        for chunk in vanished.chunks(batch_size.max(1)) {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            batch += 1;
            let ops = chunk
                .iter()
                .map(|r| WriteOp::Delete((*r).clone()))
                .collect();
            self.apply_ops(ops, retry, semaphore, stats).await;
            debug!(batch, deleted = chunk.len(), "Delete pass batch applied");
        }
    }

    /// Apply change events through the same per-record reconciliation.
    async fn run_events(
        &self,
        job: &mut SyncJob,
        options: &SyncOptions,
        events: Vec<ChangeEvent>,
        stats: &Arc<RunStats>,
        cancel: &Arc<AtomicBool>,
    ) -> EngineResult<()> {
        let config = &options.config;
        let locals = self.load_locals(job.data_source_id, &options.data_type).await?;
        let retry = RetryExecutor::new(config.retry_policy());
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        let detector = ConflictDetector::new(config.conflict_skew());

        let mut batch: u32 = 0;
        for chunk in events.chunks(config.batch_size) {
            if cancel.load(Ordering::SeqCst) {
                return Ok(());
            }
            batch += 1;
            let mut ops = Vec::with_capacity(chunk.len());
            for event in chunk {
                if let Some(op) = self
                    .plan_event(job, options, &detector, &locals, event, stats)
                    .await
                {
                    ops.push(op);
                }
            }
            self.apply_ops(ops, &retry, &semaphore, stats).await;
            stats.add_processed(chunk.len() as u64);
            self.snapshot_progress(job, batch, stats).await;
        }
        Ok(())
    }

    /// Route one pushed event to a write, a skip, or a conflict.
    async fn plan_event(
        &self,
        job: &SyncJob,
        options: &SyncOptions,
        detector: &ConflictDetector,
        locals: &HashMap<String, DataRecord>,
        event: &ChangeEvent,
        stats: &Arc<RunStats>,
    ) -> Option<WriteOp> {
        let local = locals.get(&event.external_id);
        match event.kind {
            ChangeKind::Create | ChangeKind::Update => {
                let Some(record) = &event.record else {
                    stats.record_error(
                        SyncErrorKind::Validation,
                        format!(
                            "{} event for '{}' carries no record payload",
                            event.kind, event.external_id
                        ),
                    );
                    return None;
                };
                let fields = self.transform(options.pipeline.as_ref(), record, stats)?;
                self.reconcile_one(job, options, local, record, fields, stats)
                    .await
            }
            ChangeKind::Delete => {
                let local = match local {
                    Some(l) if !l.deleted => l,
                    // Already gone or never seen: nothing to do.
                    _ => {
                        stats.record_skipped();
                        return None;
                    }
                };
                match detector.check_delete(local) {
                    None => Some(WriteOp::Delete(local.clone())),
                    Some(kind) => {
                        self.handle_conflict(
                            job,
                            options,
                            kind,
                            local,
                            FieldMap::new(),
                            FieldMap::new(),
                            stats,
                        )
                        .await
                    }
                }
            }
        }
    }

    /// Run the pipeline over one record's fields.
    ///
    /// Returns `None` when the record is excluded from this run: dropped
    /// by a filtering step (a skip) or failed by a step (recorded as a
    /// job error).
    fn transform(
        &self,
        pipeline: Option<&TransformationPipeline>,
        record: &DataRecord,
        stats: &Arc<RunStats>,
    ) -> Option<FieldMap> {
        let Some(pipeline) = pipeline else {
            return Some(record.fields.clone());
        };
        let outcome: TransformOutcome = self.executor.execute(pipeline, &record.fields);
        for warning in outcome.warnings() {
            debug!(external_id = %record.external_id, warning, "Pipeline warning");
        }
        if let Some(failure) = outcome.failure() {
            let kind = match failure.kind {
                accord_transform::types::StepKind::Validation => SyncErrorKind::Validation,
                _ => SyncErrorKind::Transform,
            };
            stats.record_error(
                kind,
                format!(
                    "record '{}' failed pipeline step '{}': {}",
                    record.external_id,
                    failure.step_name,
                    failure.error.as_deref().unwrap_or("unknown error")
                ),
            );
            return None;
        }
        match outcome.output {
            Some(fields) => Some(fields),
            None => {
                // Dropped by a filtering step: not an error, no write.
                stats.record_skipped();
                None
            }
        }
    }

    /// Execute planned writes concurrently, bounded by the semaphore.
    ///
    /// A failed write is recorded on the run and counts toward no
    /// counter; it never aborts the batch.
    async fn apply_ops(
        &self,
        ops: Vec<WriteOp>,
        retry: &RetryExecutor,
        semaphore: &Arc<Semaphore>,
        stats: &Arc<RunStats>,
    ) {
        let mut tasks: JoinSet<()> = JoinSet::new();
        for op in ops {
            let store = Arc::clone(&self.store);
            let stats = Arc::clone(stats);
            let retry = retry.clone();
            let semaphore = Arc::clone(semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                match op {
                    WriteOp::Create(record) => {
                        let external_id = record.external_id.clone();
                        match retry.execute(|| store.create_record(record.clone())).await {
                            Ok(_) => stats.record_created(),
                            Err(e) => record_write_error(&stats, &e, "create", &external_id),
                        }
                    }
                    WriteOp::Update(record) => {
                        let external_id = record.external_id.clone();
                        match retry.execute(|| store.update_record(record.clone())).await {
                            Ok(_) => stats.record_updated(),
                            Err(e) => record_write_error(&stats, &e, "update", &external_id),
                        }
                    }
                    WriteOp::Delete(record) => {
                        match retry.execute(|| store.delete_record(record.id)).await {
                            Ok(true) => stats.record_deleted(),
                            Ok(false) => {}
                            Err(e) => {
                                record_write_error(&stats, &e, "delete", &record.external_id);
                            }
                        }
                    }
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Record apply task panicked");
                stats.record_error(SyncErrorKind::Internal, format!("apply task failed: {e}"));
            }
        }
    }

    /// Local records for one (source, data type), keyed by external id.
    ///
    /// Soft-deleted records are included, so a remote reappearance is an
    /// update that resurrects the record instead of a duplicate create.
    async fn load_locals(
        &self,
        source: DataSourceId,
        data_type: &str,
    ) -> EngineResult<HashMap<String, DataRecord>> {
        let records = self.store.records(source).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.data_type == data_type)
            .map(|r| (r.external_id.clone(), r))
            .collect())
    }

    /// Claim exclusive use of a data source for the duration of a run.
    fn claim_source(&self, source: DataSourceId) -> EngineResult<SourceGuard<'_>> {
        let mut running = self
            .running
            .lock()
            .map_err(|_| SyncError::internal("running-source registry poisoned"))?;
        if !running.insert(source) {
            return Err(SyncError::AlreadyRunning {
                data_source_id: source,
            });
        }
        Ok(SourceGuard {
            running: &self.running,
            source,
        })
    }

    /// Snapshot the job after a batch and publish a progress event.
    async fn snapshot_progress(&self, job: &mut SyncJob, batch: u32, stats: &Arc<RunStats>) {
        job.counters = stats.counters();
        job.errors = stats.errors();
        self.save_job(job).await;
        self.emit(SyncProgressEvent::BatchCompleted {
            job_id: job.id,
            batch,
            counters: job.counters,
        });
    }

    async fn save_job(&self, job: &SyncJob) {
        self.jobs.write().await.insert(job.id, job.clone());
    }

    fn emit(&self, event: SyncProgressEvent) {
        // Best-effort: no receivers is fine.
        let _ = self.progress.send(event);
    }
}

fn record_write_error(stats: &RunStats, error: &StoreError, verb: &str, external_id: &str) {
    stats.record_error(
        SyncErrorKind::Store,
        format!("failed to {verb} record '{external_id}': {error}"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryStore};
    use accord_connector::value::field_map_from_json;

    fn remote_record(source: DataSourceId, external_id: &str, name: &str) -> DataRecord {
        DataRecord::new(
            source,
            "user",
            external_id,
            field_map_from_json(serde_json::json!({"name": name})),
        )
    }

    fn engine(
        connector: Arc<MemoryConnector>,
        store: Arc<MemoryStore>,
    ) -> SyncEngine<MemoryConnector, MemoryStore> {
        let config = SyncConfig {
            batch_size: 2,
            retry_delay_ms: 5,
            ..SyncConfig::default()
        };
        SyncEngine::new(connector, store, config)
    }

    #[tokio::test]
    async fn test_full_sync_creates_all_remote_records() {
        let connector = Arc::new(MemoryConnector::new("memory"));
        let store = Arc::new(MemoryStore::new());
        let source = DataSourceId::new();
        for i in 0..5 {
            connector
                .push_record(remote_record(source, &format!("u-{i}"), "Ada"))
                .await;
        }

        let engine = engine(Arc::clone(&connector), Arc::clone(&store));
        let options = engine.options("user");
        let result = engine
            .start_sync(source, SyncType::Full, options)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.records_created, 5);
        assert_eq!(result.records_processed, 5);
        assert_eq!(result.errors.len(), 0);
        // 5 records at batch size 2: pages of 2, 2, 1; the short page ends
        // pagination.
        assert_eq!(connector.fetch_calls(), 3);

        let created = store.lookup(source, "user", "u-3").await.unwrap();
        assert!(created.synced_at.is_some());
        assert_eq!(created.metadata.origin.as_deref(), Some("memory"));
    }

    #[tokio::test]
    async fn test_second_sync_is_idempotent() {
        let connector = Arc::new(MemoryConnector::new("memory"));
        let store = Arc::new(MemoryStore::new());
        let source = DataSourceId::new();
        for i in 0..4 {
            connector
                .push_record(remote_record(source, &format!("u-{i}"), "Ada"))
                .await;
        }

        let engine = engine(connector, store);
        let options = engine.options("user");
        engine
            .start_sync(source, SyncType::Full, options.clone())
            .await
            .unwrap();
        let second = engine
            .start_sync(source, SyncType::Full, options)
            .await
            .unwrap();

        assert_eq!(second.records_created, 0);
        assert_eq!(second.records_updated, 0);
        assert_eq!(second.records_deleted, 0);
        assert_eq!(second.records_skipped, 4);
    }

    #[tokio::test]
    async fn test_start_sync_rejects_event_types() {
        let engine = engine(
            Arc::new(MemoryConnector::new("memory")),
            Arc::new(MemoryStore::new()),
        );
        let options = engine.options("user");
        let err = engine
            .start_sync(DataSourceId::new(), SyncType::RealTime, options)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_connector_fails_before_processing() {
        let connector = Arc::new(MemoryConnector::new("memory"));
        connector.set_healthy(false);
        let engine = engine(connector, Arc::new(MemoryStore::new()));
        let options = engine.options("user");
        let err = engine
            .start_sync(DataSourceId::new(), SyncType::Full, options)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Connector(_)));
    }

    #[tokio::test]
    async fn test_stop_sync_unknown_job() {
        let engine = engine(
            Arc::new(MemoryConnector::new("memory")),
            Arc::new(MemoryStore::new()),
        );
        let err = engine.stop_sync(JobId::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_stop_sync_rejects_terminal_job() {
        let connector = Arc::new(MemoryConnector::new("memory"));
        let store = Arc::new(MemoryStore::new());
        let source = DataSourceId::new();
        let engine = engine(connector, store);
        let options = engine.options("user");
        let result = engine
            .start_sync(source, SyncType::Full, options)
            .await
            .unwrap();

        let err = engine.stop_sync(result.job_id).await.unwrap_err();
        assert!(matches!(err, SyncError::NotCancellable { .. }));
    }

    #[tokio::test]
    async fn test_sync_status_and_active_syncs() {
        let connector = Arc::new(MemoryConnector::new("memory"));
        let store = Arc::new(MemoryStore::new());
        let source = DataSourceId::new();
        connector.push_record(remote_record(source, "u-1", "Ada")).await;

        let engine = engine(connector, store);
        let options = engine.options("user");
        let result = engine
            .start_sync(source, SyncType::Full, options)
            .await
            .unwrap();

        let job = engine.sync_status(result.job_id).await.unwrap();
        assert_eq!(job.status, crate::types::JobStatus::Completed);
        assert_eq!(job.counters.created, 1);
        assert_eq!(job.metadata.get("connector").map(String::as_str), Some("memory"));
        assert!(engine.active_syncs().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_pass_only_for_pull_syncs() {
        let connector = Arc::new(MemoryConnector::new("memory"));
        let store = Arc::new(MemoryStore::new());
        let source = DataSourceId::new();
        connector.push_record(remote_record(source, "u-1", "Ada")).await;

        let engine = engine(Arc::clone(&connector), Arc::clone(&store));
        engine
            .start_sync(source, SyncType::Full, engine.options("user"))
            .await
            .unwrap();

        // An event batch that does not mention u-1 must not delete it.
        let event = ChangeEvent::created(remote_record(source, "u-2", "Grace"));
        let result = engine
            .process_events(source, SyncType::RealTime, vec![event], engine.options("user"))
            .await
            .unwrap();
        assert_eq!(result.records_created, 1);
        assert_eq!(result.records_deleted, 0);
        assert!(!store.lookup(source, "user", "u-1").await.unwrap().deleted);

        // A full sync in which u-2 vanished remotely does delete it.
        let result = engine
            .start_sync(source, SyncType::Full, engine.options("user"))
            .await
            .unwrap();
        assert_eq!(result.records_deleted, 1);
        assert!(store.lookup(source, "user", "u-2").await.unwrap().deleted);
    }

    #[tokio::test]
    async fn test_process_events_rejects_pull_types() {
        let engine = engine(
            Arc::new(MemoryConnector::new("memory")),
            Arc::new(MemoryStore::new()),
        );
        let err = engine
            .process_events(
                DataSourceId::new(),
                SyncType::Full,
                Vec::new(),
                engine.options("user"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig { .. }));
    }
}
