//! # Batch Download Orchestrator
//!
//! Drives the end-to-end sequence for a selection of catalog items: resolve
//! candidate paths, probe for files already on disk, acquire a session
//! credential, fetch the remainder one at a time, classify and retry
//! authorization failures once, record every outcome in the queue ledger,
//! report aggregate progress, and optionally emit a playlist manifest.
//!
//! ## Per-item state machine
//!
//! ```text
//! pending → (existence-checked) → skipped
//!                              ↘ downloading → succeeded
//!                                     ↓    ↖ (one forced-refresh retry
//!                                   failed     on authorization errors)
//! ```
//!
//! ## Execution model
//!
//! Items are processed sequentially, never concurrently: the fetch service
//! and the credential refresh share one mutable credential and one progress
//! counter, and an item's path must reflect its fixed submission index
//! regardless of the others. Cancellation is cooperative — polled at the top
//! of each iteration, never aborting an in-flight fetch — so the latency to
//! honor it is bounded by one item's fetch duration.

use crate::batch::{BatchRunState, BatchSummary, CurrentDownload, TrackOutcome};
use crate::config::DownloadOptions;
use crate::error::{DownloadError, Result};
use crate::item::{CatalogItem, CollectionContext};
use crate::paths::{resolve_item_path, sanitize_component, ResolveContext, ResolvedPath};
use bridge_traits::fetch::{FetchReceipt, FetchRequest, FetchService};
use bridge_traits::ledger::{LedgerEntryId, QueueLedger};
use bridge_traits::manifest::ManifestWriter;
use bridge_traits::metadata::MetadataSource;
use bridge_traits::probe::{ExistenceProbe, ProbeHit, ProbeQuery};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_session::{SessionError, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// An eligible item with its fixed position and resolved candidate path.
struct PlannedItem {
    item: CatalogItem,
    catalog_id: String,
    /// Index within the submitted batch (0-based), fixed at submission.
    submit_index: usize,
    /// 1-based position used for numbering and naming.
    position: u32,
    resolved: ResolvedPath,
}

/// Batch download orchestrator.
///
/// All collaborators are explicit handles; the orchestrator holds no ambient
/// state beyond the current run's bookkeeping.
pub struct DownloadOrchestrator {
    options: DownloadOptions,
    session: Arc<SessionManager>,
    fetch: Arc<dyn FetchService>,
    probe: Arc<dyn ExistenceProbe>,
    ledger: Arc<dyn QueueLedger>,
    metadata: Option<Arc<dyn MetadataSource>>,
    manifest: Option<Arc<dyn ManifestWriter>>,
    event_bus: EventBus,
    state: Mutex<BatchRunState>,
    cancel: Mutex<CancellationToken>,
}

impl DownloadOrchestrator {
    pub fn new(
        options: DownloadOptions,
        session: Arc<SessionManager>,
        fetch: Arc<dyn FetchService>,
        probe: Arc<dyn ExistenceProbe>,
        ledger: Arc<dyn QueueLedger>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            options,
            session,
            fetch,
            probe,
            ledger,
            metadata: None,
            manifest: None,
            event_bus,
            state: Mutex::new(BatchRunState::new()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Wire the canonical metadata source used to correct cached release
    /// dates and ordinals before path resolution.
    pub fn with_metadata_source(mut self, metadata: Arc<dyn MetadataSource>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Wire the playlist manifest writer used after collection batches.
    pub fn with_manifest_writer(mut self, manifest: Arc<dyn ManifestWriter>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Request cooperative cancellation of the current run.
    ///
    /// The in-flight item finishes; no further fetches are issued. The next
    /// run starts with a fresh flag.
    pub async fn request_cancel(&self) {
        info!("cancellation requested, stopping after the current item");
        self.cancel.lock().await.cancel();
    }

    /// Discard all per-item outcome marks and progress.
    pub async fn reset_history(&self) {
        self.state.lock().await.reset();
    }

    /// Snapshot of the current run state for observers.
    pub async fn state_snapshot(&self) -> BatchRunState {
        self.state.lock().await.clone()
    }

    /// Run a batch over `items`, in submission order.
    ///
    /// Returns the aggregate summary; per-item transitions and progress are
    /// published on the event bus as they happen.
    ///
    /// # Errors
    ///
    /// Aborts with a [`SessionError`] when no credential can be acquired at
    /// all (the distinct issuing-environment failure is user-actionable).
    /// Per-item fetch failures never abort the batch.
    #[instrument(skip_all, fields(total = items.len()))]
    pub async fn run_batch(
        &self,
        items: &[CatalogItem],
        collection: Option<CollectionContext>,
    ) -> Result<BatchSummary> {
        let total = items.len();
        let cancel = self.begin_run().await;

        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::BatchStarted {
                total: total as u64,
                collection: collection.as_ref().map(|c| c.name.clone()),
            }))
            .ok();
        info!(total, "batch download started");

        let mut completed = 0usize;
        let mut ineligible = 0usize;

        // Phase 1: eligibility, metadata correction, path resolution.
        // Positions are assigned from submission order before anything is
        // partitioned away.
        let mut planned: Vec<PlannedItem> = Vec::with_capacity(total);
        for (submit_index, item) in items.iter().enumerate() {
            let Some(catalog_id) = item.catalog_id.clone().filter(|id| !id.is_empty()) else {
                warn!(title = %item.title, "item has no catalog identifier, marking failed");
                ineligible += 1;
                completed += 1;
                self.event_bus
                    .emit(CoreEvent::Download(DownloadEvent::TrackFailed {
                        catalog_id: None,
                        message: DownloadError::MissingCatalogId.to_string(),
                    }))
                    .ok();
                self.emit_progress(completed, total).await;
                continue;
            };

            let item = self.corrected(item, &catalog_id).await;
            let ctx = ResolveContext {
                collection: collection.as_ref(),
                position: Some(submit_index as u32 + 1),
                first_artist_only: self.options.use_first_artist_only,
            };
            let resolved = resolve_item_path(&item, &self.options.templates, &ctx, self.options.target_os);

            planned.push(PlannedItem {
                item,
                catalog_id,
                submit_index,
                position: submit_index as u32 + 1,
                resolved,
            });
        }

        // Phase 2: one batched existence probe for every eligible item. The
        // probe is a cost-avoidance pre-filter; a probe failure only means
        // nothing gets skipped up front.
        let collection_dir = self.collection_dir(collection.as_ref());
        let hits = self.probe_existing(&collection_dir, &planned).await;

        // Resolved file locations of succeeded/skipped items, in submission
        // order, for the manifest.
        let mut manifest_paths: Vec<Option<PathBuf>> = vec![None; total];

        let mut to_fetch: Vec<PlannedItem> = Vec::with_capacity(planned.len());
        for (planned_item, hit) in planned.into_iter().zip(hits) {
            if hit.exists {
                let file_path = hit.file_path.unwrap_or_else(|| {
                    self.options
                        .base_dir
                        .join(planned_item.resolved.relative_path(self.options.format))
                });
                debug!(catalog_id = %planned_item.catalog_id, path = %file_path.display(),
                    "already on disk, skipping");

                self.record_skip(&planned_item, &file_path, collection.as_ref())
                    .await;
                manifest_paths[planned_item.submit_index] = Some(file_path);
                completed += 1;
                self.emit_progress(completed, total).await;
            } else {
                to_fetch.push(planned_item);
            }
        }

        // Phase 3: acquire a credential, but only when something is left to
        // fetch. Pre-satisfied batches never touch the issuer.
        if !to_fetch.is_empty() {
            self.session.ensure_valid(false).await?;
        }

        // Phase 4: sequential fetch loop.
        let fetch_total = to_fetch.len();
        let mut cancelled = false;
        let mut remaining = 0usize;

        for (loop_index, planned_item) in to_fetch.into_iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                remaining = fetch_total - loop_index;
                info!(completed, remaining, "batch cancelled");
                break;
            }

            {
                let mut state = self.state.lock().await;
                state.set_current(CurrentDownload {
                    catalog_id: planned_item.catalog_id.clone(),
                    title: planned_item.item.title.clone(),
                    artist: planned_item.item.artists.clone(),
                });
            }
            self.event_bus
                .emit(CoreEvent::Download(DownloadEvent::TrackStarted {
                    catalog_id: planned_item.catalog_id.clone(),
                    title: planned_item.item.title.clone(),
                    artist: planned_item.item.artists.clone(),
                }))
                .ok();

            let entry_id = self
                .enqueue_entry(&planned_item, collection.as_ref(), true)
                .await;

            let outcome = self
                .fetch_with_auth_retry(self.build_request(&planned_item))
                .await;

            match outcome {
                Ok(receipt) => {
                    // The receipt is ground truth: a file the probe missed
                    // still counts as a skip when the service found it.
                    let file_path = receipt.file_path.clone();
                    if receipt.already_exists {
                        self.finish_skipped(&planned_item.catalog_id, entry_id, &file_path)
                            .await;
                    } else {
                        self.finish_succeeded(&planned_item.catalog_id, entry_id, &file_path)
                            .await;
                    }
                    manifest_paths[planned_item.submit_index] = Some(file_path);
                }
                Err(DownloadError::Session(SessionError::IssuerUnavailable(message))) => {
                    // The issuing environment is gone for every remaining
                    // item; finalize this entry and abort the batch.
                    if let Some(id) = entry_id {
                        if let Err(e) = self.ledger.mark_failed(id, &message).await {
                            warn!("failed to record ledger failure: {}", e);
                        }
                    }
                    return Err(SessionError::IssuerUnavailable(message).into());
                }
                Err(error) => {
                    let reason = error.to_string();
                    self.finish_failed(&planned_item.catalog_id, entry_id, &reason)
                        .await;
                }
            }

            completed += 1;
            self.emit_progress(completed, total).await;
            self.state.lock().await.clear_current();
        }

        {
            let mut state = self.state.lock().await;
            state.clear_current();
        }

        // Phase 5: summary.
        let (succeeded, skipped, failed) = {
            let state = self.state.lock().await;
            (
                state.downloaded().len(),
                state.skipped().len(),
                state.failed().len() + ineligible,
            )
        };
        let summary = BatchSummary {
            total,
            succeeded,
            skipped,
            failed,
            completed,
            remaining,
            cancelled,
        };

        if cancelled {
            self.event_bus
                .emit(CoreEvent::Download(DownloadEvent::BatchCancelled {
                    completed: completed as u64,
                    remaining: remaining as u64,
                }))
                .ok();
        } else {
            self.event_bus
                .emit(CoreEvent::Download(DownloadEvent::BatchCompleted {
                    succeeded: succeeded as u64,
                    skipped: skipped as u64,
                    failed: failed as u64,
                    message: summary.message(),
                }))
                .ok();
        }
        info!(succeeded, skipped, failed, cancelled, "batch finished");

        // Phase 6: playlist manifest, best effort, completion only.
        if !cancelled {
            self.emit_manifest(collection.as_ref(), &collection_dir, manifest_paths)
                .await;
        }

        Ok(summary)
    }

    /// Download a single item outside any batch.
    ///
    /// No position is assigned and no existence probe runs; the fetch
    /// service's own early-exists check covers the dedup path.
    #[instrument(skip_all, fields(catalog_id = ?item.catalog_id))]
    pub async fn run_one(&self, item: &CatalogItem) -> TrackOutcome {
        let Some(catalog_id) = item.catalog_id.clone().filter(|id| !id.is_empty()) else {
            warn!(title = %item.title, "item has no catalog identifier");
            let reason = DownloadError::MissingCatalogId.to_string();
            self.event_bus
                .emit(CoreEvent::Download(DownloadEvent::TrackFailed {
                    catalog_id: None,
                    message: reason.clone(),
                }))
                .ok();
            return TrackOutcome::Failed { reason };
        };

        let item = self.corrected(item, &catalog_id).await;
        let ctx = ResolveContext {
            collection: None,
            position: None,
            first_artist_only: self.options.use_first_artist_only,
        };
        let resolved = resolve_item_path(&item, &self.options.templates, &ctx, self.options.target_os);
        let planned_item = PlannedItem {
            catalog_id: catalog_id.clone(),
            item,
            submit_index: 0,
            position: 0,
            resolved,
        };

        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::TrackStarted {
                catalog_id: catalog_id.clone(),
                title: planned_item.item.title.clone(),
                artist: planned_item.item.artists.clone(),
            }))
            .ok();
        let entry_id = self.enqueue_entry(&planned_item, None, true).await;

        let mut request = self.build_request(&planned_item);
        request.position = None;

        match self.fetch_with_auth_retry(request).await {
            Ok(receipt) => {
                let file_path = receipt.file_path.clone();
                if receipt.already_exists {
                    self.finish_skipped(&catalog_id, entry_id, &file_path).await;
                    TrackOutcome::Skipped {
                        file_path: Some(file_path),
                    }
                } else {
                    self.finish_succeeded(&catalog_id, entry_id, &file_path).await;
                    TrackOutcome::Succeeded { file_path }
                }
            }
            Err(error) => {
                let reason = error.to_string();
                self.finish_failed(&catalog_id, entry_id, &reason).await;
                TrackOutcome::Failed { reason }
            }
        }
    }

    /// Fetch one item, retrying exactly once on an authorization failure
    /// after forcing a credential refresh. An explicit loop with a fixed
    /// budget, so termination is structural.
    async fn fetch_with_auth_retry(&self, request: FetchRequest) -> Result<FetchReceipt> {
        let mut force_refresh = false;
        let mut auth_retried = false;

        loop {
            let credential = self.session.ensure_valid(force_refresh).await?;
            let mut attempt = request.clone();
            attempt.credential = credential.token;

            match self.fetch.fetch_track(attempt).await {
                Ok(receipt) => return Ok(receipt),
                Err(error) => {
                    let message = error.to_string();
                    if !auth_retried && is_authorization_failure(&message) {
                        warn!(
                            catalog_id = %request.catalog_id,
                            "authorization failure, retrying once with a forced refresh"
                        );
                        auth_retried = true;
                        force_refresh = true;
                        continue;
                    }
                    return Err(DownloadError::Fetch(message));
                }
            }
        }
    }

    /// Replace locally cached release date and ordinal with canonical values
    /// when a metadata source is wired. Lookup failures keep the cached
    /// values.
    async fn corrected(&self, item: &CatalogItem, catalog_id: &str) -> CatalogItem {
        let mut item = item.clone();
        if !self.options.correct_metadata {
            return item;
        }
        let Some(source) = &self.metadata else {
            return item;
        };
        match source.canonical_details(catalog_id).await {
            Ok(details) => {
                if let Some(release_date) = details.release_date {
                    item.release_date = Some(release_date);
                }
                if let Some(track_number) = details.track_number {
                    item.track_number = Some(track_number);
                }
            }
            Err(e) => debug!(catalog_id, "canonical metadata lookup failed: {}", e),
        }
        item
    }

    /// Issue the batched existence probe. Failures degrade to "nothing
    /// matched" so a broken probe can only cost redundant fetch calls.
    async fn probe_existing(&self, collection_dir: &PathBuf, planned: &[PlannedItem]) -> Vec<ProbeHit> {
        if planned.is_empty() {
            return Vec::new();
        }
        let album_layout = self.options.templates.is_album_layout();
        let queries: Vec<ProbeQuery> = planned
            .iter()
            .map(|p| ProbeQuery {
                catalog_id: p.catalog_id.clone(),
                title: p.item.title.clone(),
                artist: p.item.artists.clone(),
                album: p.item.album.clone(),
                track_number: p.item.track_number,
                position: Some(p.position),
                use_album_track_number: album_layout,
                relative_path: p.resolved.relative_path(self.options.format),
            })
            .collect();

        match self
            .probe
            .probe_batch(collection_dir, &self.options.base_dir, self.options.format, &queries)
            .await
        {
            Ok(hits) if hits.len() == queries.len() => hits,
            Ok(hits) => {
                warn!(
                    expected = queries.len(),
                    got = hits.len(),
                    "existence probe returned a mismatched result set, ignoring it"
                );
                vec![ProbeHit::default(); queries.len()]
            }
            Err(e) => {
                warn!("existence probe failed, treating all items as missing: {}", e);
                vec![ProbeHit::default(); queries.len()]
            }
        }
    }

    fn collection_dir(&self, collection: Option<&CollectionContext>) -> PathBuf {
        match collection {
            Some(c) => {
                let segment = sanitize_component(&c.name, self.options.target_os);
                if segment.is_empty() {
                    self.options.base_dir.clone()
                } else {
                    self.options.base_dir.join(segment)
                }
            }
            None => self.options.base_dir.clone(),
        }
    }

    fn build_request(&self, planned: &PlannedItem) -> FetchRequest {
        let item = &planned.item;
        let output_dir = self
            .options
            .base_dir
            .join(planned.resolved.folder_segments.iter().collect::<PathBuf>());
        FetchRequest {
            catalog_id: planned.catalog_id.clone(),
            title: item.title.clone(),
            artist: item.artists.clone(),
            album: item.album.clone(),
            album_artist: item.album_artist.clone(),
            release_date: item.release_date.clone(),
            artwork_url: item.artwork_url.clone(),
            track_number: item.track_number,
            disc_number: item.disc_number,
            output_dir,
            format: self.options.format,
            filename_template: self.options.templates.filename_template.clone(),
            position: Some(planned.position),
            use_album_track_number: self.options.templates.is_album_layout(),
            credential: String::new(),
        }
    }

    /// Record a ledger entry for an item entering the pipeline. Ledger
    /// trouble is logged, never fatal: the audit trail must not take the
    /// batch down with it.
    async fn enqueue_entry(
        &self,
        planned: &PlannedItem,
        collection: Option<&CollectionContext>,
        downloading: bool,
    ) -> Option<LedgerEntryId> {
        let entry_id = match self
            .ledger
            .enqueue(
                &planned.catalog_id,
                &planned.item.title,
                &planned.item.artists,
                collection.map(|c| c.name.as_str()),
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!("failed to record queue entry: {}", e);
                return None;
            }
        };
        if downloading {
            if let Err(e) = self.ledger.mark_downloading(entry_id).await {
                warn!("failed to mark queue entry downloading: {}", e);
            }
        }
        Some(entry_id)
    }

    async fn record_skip(
        &self,
        planned: &PlannedItem,
        file_path: &PathBuf,
        collection: Option<&CollectionContext>,
    ) {
        if let Some(entry_id) = self.enqueue_entry(planned, collection, false).await {
            if let Err(e) = self.ledger.mark_skipped(entry_id, file_path).await {
                warn!("failed to mark queue entry skipped: {}", e);
            }
        }
        self.state.lock().await.mark_skipped(&planned.catalog_id);
        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::TrackSkipped {
                catalog_id: planned.catalog_id.clone(),
                file_path: Some(file_path.display().to_string()),
            }))
            .ok();
    }

    async fn finish_succeeded(
        &self,
        catalog_id: &str,
        entry_id: Option<LedgerEntryId>,
        file_path: &PathBuf,
    ) {
        if let Some(id) = entry_id {
            if let Err(e) = self.ledger.mark_succeeded(id, file_path).await {
                warn!("failed to mark queue entry succeeded: {}", e);
            }
        }
        self.state.lock().await.mark_downloaded(catalog_id);
        info!(catalog_id, path = %file_path.display(), "track downloaded");
        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::TrackSucceeded {
                catalog_id: catalog_id.to_string(),
                file_path: file_path.display().to_string(),
            }))
            .ok();
    }

    async fn finish_skipped(
        &self,
        catalog_id: &str,
        entry_id: Option<LedgerEntryId>,
        file_path: &PathBuf,
    ) {
        if let Some(id) = entry_id {
            if let Err(e) = self.ledger.mark_skipped(id, file_path).await {
                warn!("failed to mark queue entry skipped: {}", e);
            }
        }
        self.state.lock().await.mark_skipped(catalog_id);
        info!(catalog_id, path = %file_path.display(), "track already present");
        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::TrackSkipped {
                catalog_id: catalog_id.to_string(),
                file_path: Some(file_path.display().to_string()),
            }))
            .ok();
    }

    /// Finalize a terminal failure: the ledger entry is marked failed before
    /// the in-memory outcome, keeping the durable record ahead of transient
    /// state.
    async fn finish_failed(&self, catalog_id: &str, entry_id: Option<LedgerEntryId>, reason: &str) {
        if let Some(id) = entry_id {
            if let Err(e) = self.ledger.mark_failed(id, reason).await {
                warn!("failed to mark queue entry failed: {}", e);
            }
        }
        self.state.lock().await.mark_failed(catalog_id);
        warn!(catalog_id, "track failed: {}", reason);
        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::TrackFailed {
                catalog_id: Some(catalog_id.to_string()),
                message: reason.to_string(),
            }))
            .ok();
    }

    async fn emit_progress(&self, completed: usize, total: usize) {
        let percent = self.state.lock().await.record_progress(completed, total);
        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::Progress {
                completed: completed as u64,
                total: total as u64,
                percent,
            }))
            .ok();
    }

    async fn emit_manifest(
        &self,
        collection: Option<&CollectionContext>,
        collection_dir: &PathBuf,
        manifest_paths: Vec<Option<PathBuf>>,
    ) {
        if !self.options.write_manifest {
            return;
        }
        let Some(collection) = collection else {
            return;
        };
        let Some(writer) = &self.manifest else {
            debug!("manifest requested but no writer wired");
            return;
        };

        let paths: Vec<PathBuf> = manifest_paths.into_iter().flatten().collect();
        if paths.is_empty() {
            return;
        }

        match writer.write(&collection.name, collection_dir, &paths).await {
            Ok(()) => {
                info!(collection = %collection.name, entries = paths.len(), "playlist manifest written");
                self.event_bus
                    .emit(CoreEvent::Download(DownloadEvent::ManifestWritten {
                        collection: collection.name.clone(),
                        entries: paths.len() as u64,
                    }))
                    .ok();
            }
            Err(e) => {
                // Already-finalized item outcomes stand.
                warn!(collection = %collection.name, "playlist manifest failed: {}", e);
                self.event_bus
                    .emit(CoreEvent::Download(DownloadEvent::ManifestFailed {
                        collection: collection.name.clone(),
                        message: e.to_string(),
                    }))
                    .ok();
            }
        }
    }

    async fn begin_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().await = token.clone();
        self.state.lock().await.reset();
        token
    }
}

/// Whether a fetch error message indicates an expired or rejected
/// credential.
fn is_authorization_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("unauthorized") || lower.contains("403")
}
