//! Tokio driver
//!
//! Runs the effect scheduler on a background task instead of the caller's
//! thread. Engine operations still happen synchronously under a write lock;
//! saves and combinatorics runs move to blocking workers so a slow gateway
//! or a large enumeration never stalls the async executor.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::scheduler::{DueWork, EffectScheduler};
use super::session::{load_engine, PreviewRequest, SessionEvent};
use crate::engine::{Engine, Outcome, StoreKind, Transition};
use crate::error::ForgeError;
use crate::model::SetId;
use crate::persistence::{self, PersistenceGateway};
use crate::settings::EngineSettings;

const EVENT_CAPACITY: usize = 64;

/// Shared handle to an engine driven by tokio. Cloning the handle is cheap;
/// every clone drives the same engine.
pub struct AsyncSession<G> {
    engine: Arc<RwLock<Engine>>,
    gateway: Arc<G>,
    scheduler: Arc<Mutex<EffectScheduler>>,
    events: broadcast::Sender<SessionEvent>,
    previews: Arc<watch::Sender<Option<PreviewRequest>>>,
    preview_generation: Arc<AtomicU64>,
    /// Set while a combinatorics run is executing on a blocking worker.
    computing: Arc<AtomicBool>,
    /// Held while due work runs, so saves of one store land in order.
    run_guard: Arc<Mutex<()>>,
    wake: Arc<Notify>,
    shutdown: Arc<Notify>,
}

impl<G> Clone for AsyncSession<G> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            gateway: Arc::clone(&self.gateway),
            scheduler: Arc::clone(&self.scheduler),
            events: self.events.clone(),
            previews: Arc::clone(&self.previews),
            preview_generation: Arc::clone(&self.preview_generation),
            computing: Arc::clone(&self.computing),
            run_guard: Arc::clone(&self.run_guard),
            wake: Arc::clone(&self.wake),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<G> AsyncSession<G>
where
    G: PersistenceGateway + Send + Sync + 'static,
{
    pub fn load(gateway: G, settings: EngineSettings) -> Self {
        let engine = load_engine(&gateway, settings);
        Self::with_engine(engine, gateway)
    }

    pub fn with_engine(engine: Engine, gateway: G) -> Self {
        let scheduler = EffectScheduler::new(engine.settings().clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (previews, _) = watch::channel(None);
        Self {
            engine: Arc::new(RwLock::new(engine)),
            gateway: Arc::new(gateway),
            scheduler: Arc::new(Mutex::new(scheduler)),
            events,
            previews: Arc::new(previews),
            preview_generation: Arc::new(AtomicU64::new(0)),
            computing: Arc::new(AtomicBool::new(false)),
            run_guard: Arc::new(Mutex::new(())),
            wake: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Latest preview request. Older requests are overwritten.
    pub fn previews(&self) -> watch::Receiver<Option<PreviewRequest>> {
        self.previews.subscribe()
    }

    /// Run an engine operation and schedule its effects.
    pub async fn apply<O, F>(&self, op: F) -> O::Output
    where
        O: Outcome,
        F: FnOnce(&mut Engine) -> O,
    {
        let (output, transition) = {
            let mut engine = self.engine.write().await;
            op(&mut *engine).split()
        };
        self.schedule(transition, Instant::now()).await;
        output
    }

    /// Read from the engine.
    pub async fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Engine) -> R,
    {
        let engine = self.engine.read().await;
        f(&*engine)
    }

    /// Start the background task that runs effects as they come due.
    pub fn spawn(&self) -> JoinHandle<()> {
        let driver = self.clone();
        tokio::spawn(async move { driver.run_loop().await })
    }

    /// Stop the background task. Pending effects are left in place and can
    /// still be flushed.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run every pending effect now.
    pub async fn flush(&self) {
        for _ in 0..3 {
            let _running = self.run_guard.lock().await;
            let due = {
                let mut scheduler = self.scheduler.lock().await;
                if scheduler.is_idle() {
                    break;
                }
                scheduler.flush()
            };
            self.run(due, Instant::now()).await;
        }
    }

    async fn schedule(&self, transition: Transition, now: Instant) {
        if transition.is_noop() {
            return;
        }
        self.scheduler.lock().await.schedule(transition, now);
        self.wake.notify_one();
    }

    async fn run_loop(self) {
        debug!("effect driver started");
        loop {
            let deadline = self.scheduler.lock().await.next_deadline();
            let sleep = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = self.wake.notified() => {}
                _ = sleep => {}
            }

            let _running = self.run_guard.lock().await;
            let now = Instant::now();
            let due = self.scheduler.lock().await.poll(now);
            if !due.is_empty() {
                self.run(due, now).await;
            }
        }
        debug!("effect driver stopped");
    }

    async fn run(&self, due: DueWork, now: Instant) {
        for set_id in due.recompute {
            self.recompute(set_id, now).await;
        }
        for store in due.saves {
            self.save(store).await;
        }
        if due.notify_sets {
            let event = {
                let engine = self.engine.read().await;
                SessionEvent::SetsChanged {
                    active_set_id: engine.active_set_id().map(str::to_string),
                    set_ids: engine.sets().iter().map(|s| s.id.clone()).collect(),
                }
            };
            let _ = self.events.send(event);
        }
        if let Some(set_id) = due.preview {
            let generation = self.preview_generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.previews
                .send_replace(Some(PreviewRequest { set_id, generation }));
        }
    }

    async fn recompute(&self, set_id: SetId, now: Instant) {
        if self.computing.swap(true, Ordering::SeqCst) {
            debug!(set_id = %set_id, "combinatorics busy, re-arming");
            self.schedule(Transition::none().recompute(&set_id), now)
                .await;
            return;
        }

        self.scheduler.lock().await.begin_recompute(&set_id);
        let snapshot = {
            let engine = self.engine.read().await;
            Engine::from_state(engine.state().clone(), engine.settings().clone())
        };
        let id = set_id.clone();
        let result =
            tokio::task::spawn_blocking(move || snapshot.calculate_possible_combinations(&id))
                .await;

        self.scheduler
            .lock()
            .await
            .finish_recompute(&set_id, Instant::now());
        self.computing.store(false, Ordering::SeqCst);

        match result {
            Ok(Some(report)) => {
                let transition = self
                    .engine
                    .write()
                    .await
                    .record_combinations(&set_id, &report);
                self.schedule(transition, Instant::now()).await;
                let _ = self
                    .events
                    .send(SessionEvent::CombinationsUpdated { set_id, report });
            }
            Ok(None) => debug!(set_id = %set_id, "set deleted before combinatorics ran"),
            Err(e) => warn!(set_id = %set_id, "combinatorics task failed: {}", e),
        }
    }

    async fn save(&self, store: StoreKind) {
        let payload = {
            let engine = self.engine.read().await;
            persistence::store_payload(engine.state(), store)
        };

        let result = match payload {
            Ok(payload) => {
                let gateway = Arc::clone(&self.gateway);
                tokio::task::spawn_blocking(move || gateway.save_raw(store, &payload))
                    .await
                    .unwrap_or_else(|e| {
                        Err(ForgeError::Backend {
                            reason: e.to_string(),
                        })
                    })
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!(store = store.name(), code = e.error_code(), "save failed: {}", e);
            let _ = self.events.send(SessionEvent::SaveFailed {
                store,
                error: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryGateway;
    use std::time::Duration;

    fn fast_settings() -> EngineSettings {
        EngineSettings {
            combinations_debounce_ms: 5,
            rarity_save_debounce_ms: 10,
            layer_order_save_debounce_ms: 10,
            constraint_save_debounce_ms: 10,
            filter_save_debounce_ms: 10,
            ..EngineSettings::default()
        }
    }

    async fn session() -> AsyncSession<MemoryGateway> {
        let session = AsyncSession::load(MemoryGateway::new(), fast_settings());
        session
            .apply(|e| e.register_layer("bg", vec!["a".into(), "b".into()]))
            .await;
        session
            .apply(|e| e.register_layer("eyes", vec!["x".into(), "y".into()]))
            .await;
        session.flush().await;
        session
    }

    #[tokio::test]
    async fn test_flush_runs_saves_and_combinatorics() {
        let session = session().await;
        assert_eq!(session.gateway().save_count(StoreKind::RarityConfig), 1);

        let combos = session
            .read(|e| e.set("set1").map(|s| s.possible_combinations))
            .await;
        assert_eq!(combos, Some(4));
    }

    #[tokio::test]
    async fn test_background_driver_saves_after_debounce() {
        let session = session().await;
        let mut events = session.subscribe();
        let handle = session.spawn();

        session
            .apply(|e| e.add_incompatibility("bg", "a", "eyes", "x"))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(SessionEvent::CombinationsUpdated { report, .. }) = events.recv().await {
                    return report;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event.constrained, 3);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(session.gateway().save_count(StoreKind::Incompatibilities) >= 1);

        session.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_flushes_store_the_latest_weights() {
        let session = session().await;
        let handle = session.spawn();

        for _ in 0..25 {
            session.apply(|e| e.randomize_layer("bg")).await;
            tokio::join!(session.flush(), session.flush());
        }
        session.flush().await;

        let expected = session
            .read(|e| persistence::store_payload(e.state(), StoreKind::RarityConfig))
            .await
            .unwrap();
        assert_eq!(session.gateway().stored(StoreKind::RarityConfig), Some(expected));

        session.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_preview_channel_keeps_latest() {
        let session = session().await;
        let previews = session.previews();

        let set2 = session.apply(|e| e.add_set()).await;
        session.apply(|e| e.select_set(&set2)).await;
        session.flush().await;

        let latest = previews.borrow().clone().unwrap();
        assert_eq!(latest.set_id, set2);
    }

    #[tokio::test]
    async fn test_save_failure_is_broadcast() {
        let session = session().await;
        let mut events = session.subscribe();
        session.gateway().set_fail_saves(true);

        session.apply(|e| e.equalize_layer("bg")).await;
        session.flush().await;

        let mut failed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::SaveFailed { store, .. } = event {
                failed.push(store);
            }
        }
        assert_eq!(failed, vec![StoreKind::RarityConfig]);
    }
}
