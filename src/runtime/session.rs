//! Session
//!
//! Owns an [`Engine`], a gateway and the scheduler, and runs due effects:
//! saves through the gateway, combinatorics runs, "sets changed"
//! notifications and preview requests. All of it happens on the caller's
//! thread when [`Session::poll`] or [`Session::flush`] is called.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::history::{History, HistoryEntry};
use super::scheduler::{DueWork, EffectScheduler};
use crate::combinatorics::CombinationReport;
use crate::engine::{Engine, Outcome, StoreKind, Transition};
use crate::error::Result;
use crate::model::SetId;
use crate::persistence::{self, PersistenceGateway};
use crate::settings::EngineSettings;

/// Something listeners may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Set membership, naming, order or the active set changed.
    SetsChanged {
        active_set_id: Option<SetId>,
        set_ids: Vec<SetId>,
    },
    /// A combinatorics run finished.
    CombinationsUpdated {
        set_id: SetId,
        report: CombinationReport,
    },
    /// A store could not be saved. The in-memory state is unaffected.
    SaveFailed { store: StoreKind, error: String },
}

/// A preview the renderer should produce. Requests carry an increasing
/// generation; a renderer may drop any request older than the newest it has
/// seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    pub set_id: SetId,
    pub generation: u64,
}

/// External preview renderer. Requests are fire-and-forget.
pub trait PreviewRenderer {
    fn request_preview(&mut self, request: PreviewRequest);
}

type Listener = Box<dyn FnMut(&SessionEvent) + Send>;

/// Build an engine from whatever the gateway can load. Failed stores are
/// logged and left at their defaults.
pub(crate) fn load_engine<G>(gateway: &G, settings: EngineSettings) -> Engine
where
    G: PersistenceGateway + ?Sized,
{
    let (state, failures) = persistence::load_state(gateway);
    for (store, error) in &failures {
        warn!(
            store = store.name(),
            code = error.error_code(),
            "failed to load store, using defaults: {}",
            error
        );
    }

    let engine = Engine::from_state(state, settings);
    info!(
        sets = engine.sets().len(),
        layers = engine.rarity().layers.len(),
        "engine state loaded"
    );
    engine
}

pub struct Session<G: PersistenceGateway> {
    engine: Engine,
    gateway: G,
    scheduler: EffectScheduler,
    history: History,
    listeners: Vec<Listener>,
    renderer: Option<Box<dyn PreviewRenderer + Send>>,
    preview_generation: u64,
}

impl<G: PersistenceGateway> Session<G> {
    /// Load every store through the gateway. Stores that fail to load are
    /// logged and start from defaults.
    pub fn load(gateway: G, settings: EngineSettings) -> Self {
        let engine = load_engine(&gateway, settings);
        Self::with_engine(engine, gateway)
    }

    pub fn with_engine(engine: Engine, gateway: G) -> Self {
        let settings = engine.settings().clone();
        Self {
            scheduler: EffectScheduler::new(settings.clone()),
            history: History::new(settings.history_limit),
            engine,
            gateway,
            listeners: Vec::new(),
            renderer: None,
            preview_generation: 0,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn into_parts(self) -> (Engine, G) {
        (self.engine, self.gateway)
    }

    pub fn scheduler(&self) -> &EffectScheduler {
        &self.scheduler
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn set_renderer<R>(&mut self, renderer: R)
    where
        R: PreviewRenderer + Send + 'static,
    {
        self.renderer = Some(Box::new(renderer));
    }

    /// Run an engine operation and schedule its effects.
    pub fn apply<O, F>(&mut self, op: F) -> O::Output
    where
        O: Outcome,
        F: FnOnce(&mut Engine) -> O,
    {
        self.apply_at(Instant::now(), op)
    }

    pub fn apply_at<O, F>(&mut self, now: Instant, op: F) -> O::Output
    where
        O: Outcome,
        F: FnOnce(&mut Engine) -> O,
    {
        let (output, transition) = op(&mut self.engine).split();
        self.scheduler.schedule(transition, now);
        output
    }

    /// Like [`Session::apply`], and record the change for undo if it
    /// changed any persisted state.
    pub fn record<O, F>(&mut self, description: &str, op: F) -> O::Output
    where
        O: Outcome,
        F: FnOnce(&mut Engine) -> O,
    {
        self.record_at(Instant::now(), description, op)
    }

    pub fn record_at<O, F>(&mut self, now: Instant, description: &str, op: F) -> O::Output
    where
        O: Outcome,
        F: FnOnce(&mut Engine) -> O,
    {
        let before = self.engine.state().clone();
        let (output, transition) = op(&mut self.engine).split();

        let changed = StoreKind::ALL.iter().any(|store| transition.persists(*store));
        if changed && self.engine.state() != &before {
            let after = self.engine.state().clone();
            self.history.push(HistoryEntry::new(description, before, after));
        }

        self.scheduler.schedule(transition, now);
        output
    }

    /// Restore the state before the last recorded change.
    pub fn undo(&mut self) -> Result<String> {
        let entry = self.history.undo()?;
        let transition = self.engine.restore(entry.state_before);
        self.scheduler.schedule(transition, Instant::now());
        debug!(id = %entry.id, description = %entry.description, "undo");
        Ok(entry.description)
    }

    /// Re-apply the last undone change.
    pub fn redo(&mut self) -> Result<String> {
        let entry = self.history.redo()?;
        let transition = self.engine.restore(entry.state_after);
        self.scheduler.schedule(transition, Instant::now());
        debug!(id = %entry.id, description = %entry.description, "redo");
        Ok(entry.description)
    }

    /// Run whatever is due at `now`.
    pub fn poll(&mut self, now: Instant) {
        let due = self.scheduler.poll(now);
        self.run(due, now);
    }

    /// Run every pending effect immediately, including saves produced by
    /// the combinatorics runs themselves.
    pub fn flush(&mut self) {
        // A combinatorics run may schedule one more layer order save.
        for _ in 0..3 {
            if self.scheduler.is_idle() {
                break;
            }
            let due = self.scheduler.flush();
            self.run(due, Instant::now());
        }
    }

    /// Drop pending timers without running them.
    pub fn reset(&mut self) {
        self.scheduler.cancel_all();
    }

    fn run(&mut self, due: DueWork, now: Instant) {
        for set_id in &due.recompute {
            self.recompute(set_id, now);
        }
        for store in &due.saves {
            self.save(*store);
        }
        if due.notify_sets {
            let event = SessionEvent::SetsChanged {
                active_set_id: self.engine.active_set_id().map(str::to_string),
                set_ids: self.engine.sets().iter().map(|s| s.id.clone()).collect(),
            };
            self.emit(&event);
        }
        if let Some(set_id) = due.preview {
            self.request_preview(set_id);
        }
    }

    fn recompute(&mut self, set_id: &str, now: Instant) {
        self.scheduler.begin_recompute(set_id);
        let report = self.engine.calculate_possible_combinations(set_id);
        self.scheduler.finish_recompute(set_id, now);

        let Some(report) = report else {
            debug!(set_id, "set deleted before combinatorics ran");
            return;
        };
        let transition: Transition = self.engine.record_combinations(set_id, &report);
        self.scheduler.schedule(transition, now);
        self.emit(&SessionEvent::CombinationsUpdated {
            set_id: set_id.to_string(),
            report,
        });
    }

    fn save(&mut self, store: StoreKind) {
        let result = persistence::store_payload(self.engine.state(), store)
            .and_then(|payload| self.gateway.save_raw(store, &payload));
        if let Err(e) = result {
            warn!(store = store.name(), code = e.error_code(), "save failed: {}", e);
            self.emit(&SessionEvent::SaveFailed {
                store,
                error: e.to_string(),
            });
        }
    }

    fn request_preview(&mut self, set_id: SetId) {
        self.preview_generation += 1;
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.request_preview(PreviewRequest {
                set_id,
                generation: self.preview_generation,
            });
        }
    }

    fn emit(&mut self, event: &SessionEvent) {
        for listener in self.listeners.iter_mut() {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryGateway;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn session() -> Session<Arc<MemoryGateway>> {
        let mut session = Session::load(Arc::new(MemoryGateway::new()), EngineSettings::default());
        session.apply(|e| e.register_layer("bg", vec!["a".into(), "b".into()]));
        session.apply(|e| {
            e.register_layer("eyes", ["w", "x", "y", "z"].map(String::from).to_vec())
        });
        session.flush();
        session
    }

    struct Recorder(Arc<Mutex<Vec<PreviewRequest>>>);

    impl PreviewRenderer for Recorder {
        fn request_preview(&mut self, request: PreviewRequest) {
            self.0.lock().unwrap().push(request);
        }
    }

    #[test]
    fn test_saves_are_debounced() {
        let mut session = session();
        let gateway = Arc::clone(session.gateway());
        let before = gateway.save_count(StoreKind::RarityConfig);

        let start = Instant::now();
        for _ in 0..5 {
            session.apply_at(start, |e| e.randomize_layer("bg"));
        }
        session.poll(start + Duration::from_millis(100));
        assert_eq!(gateway.save_count(StoreKind::RarityConfig), before);

        session.poll(start + Duration::from_millis(600));
        assert_eq!(gateway.save_count(StoreKind::RarityConfig), before + 1);
    }

    #[test]
    fn test_combinations_are_cached_on_the_set() {
        let mut session = session();
        assert_eq!(session.engine().set("set1").unwrap().possible_combinations, 8);

        session
            .apply(|e| e.add_incompatibility("bg", "a", "eyes", "x"))
            .unwrap();
        session.flush();
        assert_eq!(session.engine().set("set1").unwrap().possible_combinations, 7);
    }

    #[test]
    fn test_sets_changed_event() {
        let mut session = session();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        session.subscribe(move |event| {
            if let SessionEvent::SetsChanged { set_ids, .. } = event {
                sink.lock().unwrap().push(set_ids.clone());
            }
        });

        let set_id = session.apply(|e| e.add_set());
        session.flush();
        assert_eq!(set_id, "set2");
        assert_eq!(events.lock().unwrap().last().unwrap(), &vec!["set1", "set2"]);
    }

    #[test]
    fn test_latest_preview_request_wins() {
        let mut session = session();
        let requests = Arc::new(Mutex::new(Vec::new()));
        session.set_renderer(Recorder(Arc::clone(&requests)));

        let set2 = session.apply(|e| e.add_set());
        session.apply(|e| e.equalize_layer("bg"));
        session.apply(|e| e.select_set(&set2));
        session.flush();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].set_id, "set2");
    }

    #[test]
    fn test_save_failure_keeps_state() {
        let mut session = session();
        session.gateway().set_fail_saves(true);

        session.apply(|e| e.update_trait_weight("bg", "a", 80.0)).unwrap();
        session.flush();
        assert_eq!(
            session.engine().rarity().trait_set("bg", "a", "set1").unwrap().value,
            80.0
        );

        session.gateway().set_fail_saves(false);
        session.apply(|e| e.equalize_layer("bg"));
        session.flush();
        let saved = session.gateway().load_rarity_config().unwrap().unwrap();
        assert_eq!(saved.layer("bg"), session.engine().rarity().layer("bg"));
    }

    #[test]
    fn test_reset_cancels_pending_saves() {
        let mut session = session();
        let before = session.gateway().save_count(StoreKind::RarityConfig);

        session.apply(|e| e.randomize_layer("bg"));
        session.reset();
        session.flush();
        assert_eq!(session.gateway().save_count(StoreKind::RarityConfig), before);
    }

    #[test]
    fn test_undo_and_redo() {
        let mut session = session();
        session
            .record("weight", |e| e.update_trait_weight("bg", "a", 90.0))
            .unwrap();
        let value = |s: &Session<Arc<MemoryGateway>>| {
            s.engine().rarity().trait_set("bg", "a", "set1").unwrap().value
        };
        assert_eq!(value(&session), 90.0);

        assert_eq!(session.undo().unwrap(), "weight");
        assert_eq!(value(&session), 50.0);
        session.redo().unwrap();
        assert_eq!(value(&session), 90.0);
    }

    #[test]
    fn test_load_restores_saved_state() {
        let mut session = session();
        session.apply(|e| e.toggle_trait_enabled("bg", "b"));
        session.flush();
        let (engine, gateway) = session.into_parts();

        let reloaded = Session::load(gateway, EngineSettings::default());
        assert_eq!(reloaded.engine().state(), engine.state());
    }
}
