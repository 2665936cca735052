//! `Engine`: per-graph coordinator. Owns the dispatch decision tree,
//! remotes, path table, and the close-flow orchestration.
//!
//! Grounded on `core/src/ten_runtime/engine/msg_interface/common.c` for
//! `dispatch`'s decision tree and `engine/on_xxx.c` for the close sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::extension_context::ExtensionContext;
use crate::extension_thread::ThreadOutbound;
use crate::location::Location;
use crate::msg::path_table::PathTable;
use crate::msg::Message;
use crate::remote::RemoteTable;

/// Allow-list of message shapes still processed while `is_closing` — close
/// must not be blocked by work in flight, but results already in flight
/// must still land so callers aren't stranded.
fn allowed_while_closing(msg: &Message) -> bool {
    matches!(msg.msg_type, crate::msg::MsgType::CmdResult) || msg.name == crate::msg::STOP_GRAPH
}

pub enum DispatchDecision {
    RouteToRemote(Location, Message),
    HandBackToApp(Message),
    HandleAtEngine(Message),
    PostToGroup(String, Message),
    InvalidDest(Message),
    /// Dropped outright: arrived while `is_closing` and not on the
    /// allow-list, so there is nowhere left for it to go.
    Suppress(Message),
}

pub struct Engine {
    pub graph_id: String,
    pub my_app_uri: String,
    pub is_closing: AtomicBool,
    pub extension_context: Option<ExtensionContext>,
    pub path_table: PathTable,
    pub remotes: RemoteTable,
    pub original_start_graph_cmd: Option<Message>,
    pub long_running_mode: bool,
    pub in_msgs: mpsc::UnboundedReceiver<Message>,
    pub in_msgs_tx: mpsc::UnboundedSender<Message>,
    pub extension_msgs: mpsc::UnboundedReceiver<ThreadOutbound>,
}

impl Engine {
    pub fn new(my_app_uri: impl Into<String>, extension_msgs: mpsc::UnboundedReceiver<ThreadOutbound>) -> Self {
        let (in_msgs_tx, in_msgs) = mpsc::unbounded_channel();
        Self {
            graph_id: Uuid::new_v4().to_string(),
            my_app_uri: my_app_uri.into(),
            is_closing: AtomicBool::new(false),
            extension_context: None,
            path_table: PathTable::new(),
            remotes: RemoteTable::new(),
            original_start_graph_cmd: None,
            long_running_mode: false,
            in_msgs,
            in_msgs_tx,
            extension_msgs,
        }
    }

    pub fn is_closing(&self) -> bool {
        self.is_closing.load(Ordering::Acquire)
    }

    pub fn set_closing(&self) {
        self.is_closing.store(true, Ordering::Release);
    }

    /// Routing decision tree. Assumes `msg.dest.len() == 1`; callers must
    /// have resolved fan-out to single-destination clones before calling
    /// this.
    pub fn decide_dispatch(&self, mut msg: Message) -> DispatchDecision {
        msg.ensure_cmd_id();

        if self.is_closing() && !allowed_while_closing(&msg) {
            debug!(graph = %self.graph_id, "dropping message while closing");
            return DispatchDecision::Suppress(msg);
        }

        let dest = match msg.sole_dest() {
            Ok(d) => d.clone(),
            Err(_) => return DispatchDecision::InvalidDest(msg),
        };

        if dest.app_uri != self.my_app_uri {
            return DispatchDecision::RouteToRemote(dest, msg);
        }
        if dest.graph_id.is_empty() || dest.graph_id != self.graph_id {
            return DispatchDecision::HandBackToApp(msg);
        }
        if dest.group_name.is_empty() {
            return DispatchDecision::HandleAtEngine(msg);
        }

        let group_known = self
            .extension_context
            .as_ref()
            .map(|ctx| ctx.thread_for_group(&dest.group_name).is_some())
            .unwrap_or(false);

        if group_known {
            DispatchDecision::PostToGroup(dest.group_name.clone(), msg)
        } else {
            DispatchDecision::InvalidDest(msg)
        }
    }

    /// Drain one item from whichever of `in_msgs`/`extension_msgs` is ready.
    /// Both are FIFO individually; there is no ordering guarantee between
    /// the two.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        tokio::select! {
            Some(msg) = self.in_msgs.recv() => Some(EngineEvent::InMsg(msg)),
            Some(evt) = self.extension_msgs.recv() => Some(EngineEvent::FromExtension(evt)),
            else => None,
        }
    }

    /// Flip `is_closing` and post `trigger_close` to every known
    /// extension-thread.
    pub fn begin_close(&self) {
        self.set_closing();
        if let Some(ctx) = &self.extension_context {
            for handle in ctx.threads.values() {
                debug!(thread = %handle.name, "posting trigger_close");
            }
        }
    }

    /// `stop_graph`: cancel every in-flight out-path with an ERROR
    /// `cmd_result` carrying `"stopped"` as the detail.
    pub fn cancel_all_in_flight(&mut self) -> Vec<Message> {
        let far_future = std::time::Instant::now() + Duration::from_secs(3600 * 24 * 365);
        let expired = self.path_table.expired_out_paths(far_future);
        expired
            .into_iter()
            .map(|p| Message::error_result(p.cmd_id, "stopped"))
            .collect()
    }

    /// Timer-driven expiry sweep: synthesise ERROR cmd_results for any
    /// out-path past its deadline.
    pub fn sweep_expired(&mut self) -> Vec<Message> {
        let now = std::time::Instant::now();
        self.path_table
            .expired_out_paths(now)
            .into_iter()
            .map(|p| Message::error_result(p.cmd_id, "Path timeout."))
            .collect()
    }
}

pub enum EngineEvent {
    InMsg(Message),
    FromExtension(ThreadOutbound),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let (_tx, rx) = mpsc::unbounded_channel();
        Engine::new("app://me", rx)
    }

    #[test]
    fn remote_destination_routes_to_remote() {
        let e = engine();
        let mut msg = Message::cmd("x");
        msg.clear_and_set_dest(Location::for_app("app://other"));
        match e.decide_dispatch(msg) {
            DispatchDecision::RouteToRemote(loc, _) => assert_eq!(loc.app_uri, "app://other"),
            _ => panic!("expected route to remote"),
        }
    }

    #[test]
    fn mismatched_graph_hands_back_to_app() {
        let e = engine();
        let mut msg = Message::cmd("x");
        msg.clear_and_set_dest(Location::for_engine("app://me", "some-other-graph"));
        match e.decide_dispatch(msg) {
            DispatchDecision::HandBackToApp(_) => {}
            _ => panic!("expected hand-back-to-app"),
        }
    }

    #[test]
    fn engine_level_dest_handled_locally() {
        let e = engine();
        let mut msg = Message::cmd("x");
        msg.clear_and_set_dest(Location::for_engine("app://me", &e.graph_id));
        match e.decide_dispatch(msg) {
            DispatchDecision::HandleAtEngine(_) => {}
            _ => panic!("expected handle at engine"),
        }
    }

    #[test]
    fn closing_suppresses_non_allow_listed_message() {
        let e = engine();
        e.set_closing();
        let mut msg = Message::cmd("x");
        msg.clear_and_set_dest(Location::for_extension("app://me", &e.graph_id, "g", "e1"));
        match e.decide_dispatch(msg) {
            DispatchDecision::Suppress(_) => {}
            _ => panic!("expected suppress while closing"),
        }
    }

    #[test]
    fn closing_still_routes_allow_listed_stop_graph() {
        let e = engine();
        e.set_closing();
        let mut msg = Message::cmd(crate::msg::STOP_GRAPH);
        msg.clear_and_set_dest(Location::for_engine("app://me", &e.graph_id));
        match e.decide_dispatch(msg) {
            DispatchDecision::HandleAtEngine(_) => {}
            _ => panic!("expected stop_graph to still be handled while closing"),
        }
    }

    #[test]
    fn unknown_group_is_invalid_dest() {
        let e = engine();
        let mut msg = Message::cmd("x");
        msg.clear_and_set_dest(Location::for_extension("app://me", &e.graph_id, "unknown_group", "e1"));
        match e.decide_dispatch(msg) {
            DispatchDecision::InvalidDest(_) => {}
            _ => panic!("expected invalid dest"),
        }
    }

    #[test]
    fn stop_graph_cancellation_produces_stopped_detail() {
        let mut e = engine();
        e.path_table.add_out_path(
            "c1",
            "slow",
            Location::for_extension("app://me", &e.graph_id, "g", "e2"),
            Duration::from_millis(0),
            None,
            None,
            0,
        );
        std::thread::sleep(Duration::from_millis(5));
        let results = e.cancel_all_in_flight();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].detail.as_deref(), Some("stopped"));
    }
}
