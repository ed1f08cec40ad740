//! Feed entity reconciliation engine
//!
//! This crate provides the `FeedEntityManager`, which polls a record source
//! on a timer, diffs the fetched record set against the set of currently
//! managed entities, and drives create / update / remove instructions
//! through the per-id signal dispatcher. Each external record maps to at
//! most one live entity at any time.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use geofeed_core::{EntityId, ExternalId, ExternalRecord, FeedConfig};
use geofeed_dispatch::{SignalDispatcher, SignalKind};
use geofeed_entity::{EntityHost, GeoEventEntity, HostError};
use geofeed_filter::accepts_record;
use geofeed_source::{FeedFetch, FeedSnapshot, RecordSource};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Entity registration was rejected by the host. Inside a
    /// reconciliation pass this means the at-most-one-entity-per-id
    /// invariant was broken and is a bug, not an operational condition.
    #[error(transparent)]
    Host(#[from] HostError),
}

/// How a tick resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// Records were fetched and fully reconciled
    Reconciled,
    /// The feed declined to report; nothing was touched
    NoData,
    /// The fetch failed; managed entities were cleared (by default)
    FetchError,
}

/// Instruction counts for one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub status: TickStatus,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

impl TickOutcome {
    fn no_data() -> Self {
        Self {
            status: TickStatus::NoData,
            created: 0,
            updated: 0,
            removed: 0,
        }
    }

    fn errored(removed: usize) -> Self {
        Self {
            status: TickStatus::FetchError,
            created: 0,
            updated: 0,
            removed,
        }
    }
}

/// Pick an entity id for a new external id, avoiding live collisions
///
/// Slug derivation is lossy ("fire-1" and "fire.1" both become "fire_1"),
/// so distinct external ids can want the same entity id. The later arrival
/// gets the first free numeric suffix; the id is released when the entity
/// is removed from the managed set.
fn unique_entity_id(managed: &HashMap<ExternalId, ManagedEntity>, id: &ExternalId) -> EntityId {
    let taken = |candidate: &EntityId| managed.values().any(|m| &m.entity_id == candidate);
    let base = EntityId::geo_location(id);
    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = base.with_suffix(n);
        if !taken(&candidate) {
            debug!(external_id = %id, entity_id = %candidate, "Slug collision, using suffixed entity id");
            return candidate;
        }
        n += 1;
    }
}

/// One live entity owned by the manager
///
/// The handle holds the proxy's task so removal can be awaited to
/// completion; destruction itself always goes through the host.
struct ManagedEntity {
    entity_id: EntityId,
    task: JoinHandle<()>,
}

/// The reconciliation engine for one feed
///
/// Owns the authoritative managed-entity set and the current feed
/// snapshot. Both are scoped to this instance and mutated only inside a
/// reconciliation pass; entity proxies read the snapshot through its
/// lookup and never touch either structure directly.
pub struct FeedEntityManager<S: RecordSource> {
    source: S,
    config: Arc<FeedConfig>,
    host: Arc<dyn EntityHost>,
    dispatcher: Arc<SignalDispatcher>,
    snapshot: Arc<FeedSnapshot>,
    managed: Mutex<HashMap<ExternalId, ManagedEntity>>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl<S: RecordSource + 'static> FeedEntityManager<S> {
    pub fn new(source: S, config: FeedConfig, host: Arc<dyn EntityHost>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            source,
            config: Arc::new(config),
            host,
            dispatcher: Arc::new(SignalDispatcher::new()),
            snapshot: Arc::new(FeedSnapshot::new()),
            managed: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// The per-id signal dispatcher used by this manager's entities
    pub fn dispatcher(&self) -> Arc<SignalDispatcher> {
        self.dispatcher.clone()
    }

    /// The current feed snapshot
    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.snapshot.clone()
    }

    /// Ids of all currently managed entities
    pub async fn managed_ids(&self) -> HashSet<ExternalId> {
        self.managed.lock().await.keys().cloned().collect()
    }

    /// Number of currently managed entities
    pub async fn entity_count(&self) -> usize {
        self.managed.lock().await.len()
    }

    /// Run one poll-and-reconcile cycle
    ///
    /// The fetch is the only suspension point talking to the outside; the
    /// diff itself runs under the managed-set lock, so two passes can never
    /// interleave even if the caller ignores the scheduler.
    pub async fn tick(&self) -> Result<TickOutcome, ManagerError> {
        match self.source.fetch().await {
            Ok(FeedFetch::Records(records)) => self.reconcile(records).await,
            Ok(FeedFetch::NoData) => {
                debug!("Feed reported no data, keeping current entities");
                Ok(TickOutcome::no_data())
            }
            Err(error) => {
                warn!(%error, "Feed fetch failed");
                if self.config.clear_on_error {
                    let removed = self.clear_all().await;
                    Ok(TickOutcome::errored(removed))
                } else {
                    debug!("clear_on_error disabled, keeping last known entities");
                    Ok(TickOutcome::errored(0))
                }
            }
        }
    }

    /// Diff a fetched record set against the managed entities
    ///
    /// Order inside a pass: removes are issued and awaited first, then the
    /// snapshot is swapped, then update signals go out (so subscribers
    /// always observe the new data), then creates run.
    async fn reconcile(&self, records: Vec<ExternalRecord>) -> Result<TickOutcome, ManagerError> {
        let filtered: Vec<ExternalRecord> = records
            .into_iter()
            .filter(|r| accepts_record(r, &self.config))
            .collect();

        let mut managed = self.managed.lock().await;

        let incoming: HashSet<ExternalId> =
            filtered.iter().map(|r| r.external_id.clone()).collect();

        // Entities whose record disappeared (or newly fails a filter)
        let to_remove: Vec<ExternalId> = managed
            .keys()
            .filter(|id| !incoming.contains(*id))
            .cloned()
            .collect();

        let mut remove_tasks = Vec::with_capacity(to_remove.len());
        for id in &to_remove {
            if let Some(entity) = managed.remove(id) {
                debug!(external_id = %id, entity_id = %entity.entity_id, "Removing managed entity");
                self.dispatcher.send(SignalKind::Deleted, id);
                remove_tasks.push(entity.task);
            }
        }
        let removed = remove_tasks.len();
        for result in futures::future::join_all(remove_tasks).await {
            if let Err(join_error) = result {
                warn!(%join_error, "Entity proxy task ended abnormally during removal");
            }
        }

        // New data must be visible before any update signal goes out
        self.snapshot.replace(filtered.iter().cloned());

        let mut updated = 0;
        for id in incoming.iter().filter(|id| managed.contains_key(*id)) {
            let reached = self.dispatcher.send(SignalKind::Updated, id);
            if reached == 0 {
                // A managed entity with no live subscriber would be a bug
                warn!(external_id = %id, "Update signal for managed entity reached no subscriber");
            }
            updated += 1;
        }

        let mut created = 0;
        for id in incoming {
            if managed.contains_key(&id) {
                continue;
            }
            let entity_id = unique_entity_id(&managed, &id);
            let entity = GeoEventEntity::new(
                id.clone(),
                self.snapshot.clone(),
                self.host.clone(),
                self.dispatcher.clone(),
                self.config.clone(),
            )
            .with_entity_id(entity_id.clone());

            // Subscribe before registering so no signal can be missed
            let updated_rx = self.dispatcher.connect(SignalKind::Updated, &id);
            let deleted_rx = self.dispatcher.connect(SignalKind::Deleted, &id);

            if let Err(err) = entity.register() {
                self.dispatcher.disconnect(SignalKind::Updated, &id);
                self.dispatcher.disconnect(SignalKind::Deleted, &id);
                error!(
                    external_id = %id,
                    entity_id = %entity_id,
                    %err,
                    "Entity registration rejected, reconciliation invariant violated"
                );
                return Err(err.into());
            }

            debug!(external_id = %id, entity_id = %entity_id, "Created managed entity");
            let task = entity.spawn(updated_rx, deleted_rx);
            managed.insert(id, ManagedEntity { entity_id, task });
            created += 1;
        }

        debug!(created, updated, removed, "Reconciliation pass complete");
        Ok(TickOutcome {
            status: TickStatus::Reconciled,
            created,
            updated,
            removed,
        })
    }

    /// Remove every managed entity and clear the snapshot
    async fn clear_all(&self) -> usize {
        let mut managed = self.managed.lock().await;

        let mut remove_tasks = Vec::with_capacity(managed.len());
        for (id, entity) in managed.drain() {
            debug!(external_id = %id, entity_id = %entity.entity_id, "Clearing managed entity");
            self.dispatcher.send(SignalKind::Deleted, &id);
            remove_tasks.push(entity.task);
        }
        let removed = remove_tasks.len();
        for result in futures::future::join_all(remove_tasks).await {
            if let Err(join_error) = result {
                warn!(%join_error, "Entity proxy task ended abnormally during teardown");
            }
        }

        self.snapshot.clear();
        removed
    }

    /// Start the poll scheduler
    ///
    /// Ticks once immediately, then on every interval. The loop awaits each
    /// pass to completion before the next interval fire is honored, so two
    /// passes for this manager never run concurrently; a fire that lands
    /// mid-pass just queues behind it.
    pub fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Feed manager already running");
            return;
        }

        info!(interval = ?self.config.update_interval, "Starting feed manager");

        let manager = self;
        let mut shutdown_rx = manager.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.config.update_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // Shutdown wins over a simultaneously ready interval fire,
                // so no pass can start once teardown has begun
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        if let Err(error) = manager.tick().await {
                            error!(%error, "Reconciliation pass failed");
                        }
                    }
                }
            }

            manager.running.store(false, Ordering::SeqCst);
            info!("Feed manager scheduler stopped");
        });
    }

    /// Stop the scheduler and tear down every remaining entity
    ///
    /// Explicit teardown: the host requires every registered entity to be
    /// unregistered, so each remaining entry's removal path is invoked
    /// rather than relying on drop order.
    pub async fn stop(&self) {
        if self.running.load(Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }
        let removed = self.clear_all().await;
        info!(removed, "Feed manager torn down");
    }
}
