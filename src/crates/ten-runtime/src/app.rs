//! `App`: process-level root. One runloop, one URI, N engines,
//! orphan-connections, addon stores, predefined-graph descriptors.
//!
//! Grounded on `core/include_internal/ten_runtime/app/app.h` for the
//! attribute set and `app/metric.c` for the per-app message counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::addon::AddonRegistry;
use crate::engine::Engine;
use crate::error::{Result, TenError};
use crate::extension_thread::ThreadOutbound;
use crate::location::{Location, LOCALHOST};
use crate::msg::{Message, CLOSE_APP};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Init,
    OnConfigure,
    OnConfigureDone,
    OnInit,
    OnInitDone,
    Closing,
    OnDeinitDone,
}

/// One predefined graph the app knows how to start by name, without a
/// client having to supply the full declaration over the wire.
pub struct PredefinedGraphInfo {
    pub name: String,
    pub graph: crate::graph_def::GraphDecl,
    pub auto_start: bool,
}

/// A cheap atomic counter, load-bearing for close-flow gating rather than
/// telemetry export (exporting it anywhere stays out of scope here).
#[derive(Default)]
pub struct AppMetrics {
    pub messages_processed: AtomicU64,
}

impl AppMetrics {
    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }
}

pub struct App {
    pub uri: String,
    pub state: AppState,
    pub engines: HashMap<String, Engine>,
    pub orphan_connections: Vec<Arc<dyn crate::addon::Protocol>>,
    pub addons: Arc<AddonRegistry>,
    pub predefined_graph_infos: Vec<PredefinedGraphInfo>,
    pub metrics: AppMetrics,
    pub in_msgs: mpsc::UnboundedReceiver<Message>,
    pub in_msgs_tx: mpsc::UnboundedSender<Message>,
}

impl App {
    pub fn new(uri: impl Into<String>) -> Self {
        let (in_msgs_tx, in_msgs) = mpsc::unbounded_channel();
        Self {
            uri: uri.into(),
            state: AppState::Init,
            engines: HashMap::new(),
            orphan_connections: Vec::new(),
            addons: Arc::new(AddonRegistry::new()),
            predefined_graph_infos: Vec::new(),
            metrics: AppMetrics::default(),
            in_msgs,
            in_msgs_tx,
        }
    }

    pub fn handle(&self) -> mpsc::UnboundedSender<Message> {
        self.in_msgs_tx.clone()
    }

    /// Rewrite `"localhost"` in `loc` to this app's real URI. Called at
    /// every app-boundary crossing, never at construction time.
    pub fn normalize_loc(&self, loc: &mut Location) {
        if loc.app_uri == LOCALHOST {
            loc.app_uri = self.uri.clone();
        }
    }

    pub fn engine_for_graph(&self, graph_id: &str) -> Option<&Engine> {
        self.engines.get(graph_id)
    }

    pub fn engine_for_graph_mut(&mut self, graph_id: &str) -> Option<&mut Engine> {
        self.engines.get_mut(graph_id)
    }

    /// `App.on_start_graph`: create an engine for the graph if one doesn't
    /// already exist for this `predefined_graph` name, returning its id.
    pub fn get_or_create_engine(&mut self, extension_msgs: mpsc::UnboundedReceiver<ThreadOutbound>) -> String {
        let engine = Engine::new(self.uri.clone(), extension_msgs);
        let graph_id = engine.graph_id.clone();
        self.engines.insert(graph_id.clone(), engine);
        graph_id
    }

    pub fn destroy_engine(&mut self, graph_id: &str) -> Option<Engine> {
        self.engines.remove(graph_id)
    }

    /// A message handed back to the app (wrong/empty graph_id) re-dispatches
    /// by finding the right engine, or is dropped with a log if no engine
    /// claims it.
    pub fn route_in_msg(&mut self, mut msg: Message) -> Result<()> {
        self.metrics.record_processed();
        let dest = msg.sole_dest()?.clone();
        self.normalize_loc(&mut msg.dest[0]);

        if msg.name == CLOSE_APP {
            self.begin_close();
            return Ok(());
        }

        match self.engines.get(&dest.graph_id) {
            Some(_) => Ok(()),
            None => Err(TenError::not_found(format!("no engine for graph_id '{}'", dest.graph_id))),
        }
    }

    /// `close_app` is the one trigger that overrides every engine's
    /// `long_running_mode` unconditionally (see `DESIGN.md`'s pinned open
    /// question).
    pub fn begin_close(&mut self) {
        self.state = AppState::Closing;
        for engine in self.engines.values() {
            engine.begin_close();
        }
    }

    pub fn all_engines_closed(&self) -> bool {
        self.engines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_is_rewritten_to_app_uri_only_on_crossing() {
        let app = App::new("app://me");
        let mut loc = Location::for_app(LOCALHOST);
        app.normalize_loc(&mut loc);
        assert_eq!(loc.app_uri, "app://me");

        let mut other = Location::for_app("app://elsewhere");
        app.normalize_loc(&mut other);
        assert_eq!(other.app_uri, "app://elsewhere");
    }

    #[test]
    fn close_app_flips_every_engine_to_closing() {
        let mut app = App::new("app://me");
        let (_tx, rx) = mpsc::unbounded_channel();
        let id = app.get_or_create_engine(rx);
        app.begin_close();
        assert!(app.engines[&id].is_closing());
    }

    #[test]
    fn metrics_counter_increments_on_route() {
        let mut app = App::new("app://me");
        let (_tx, rx) = mpsc::unbounded_channel();
        let id = app.get_or_create_engine(rx);
        let mut msg = Message::cmd("ping");
        msg.clear_and_set_dest(Location::for_engine("app://me", &id));
        app.route_in_msg(msg).unwrap();
        assert_eq!(app.metrics.stats(), 1);
    }
}
