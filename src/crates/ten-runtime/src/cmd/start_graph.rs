//! `start_graph` handling: the state machine from `App.on_start_graph` down
//! through `enable_extension_system`.
//!
//! Grounded on `core/src/ten_runtime/engine/msg_interface/start_graph.c`.

use crate::error::Result;
use crate::extension_context::ExtensionContext;
use crate::graph_def::{GraphDecl, ParsedGraph};
use crate::location::Location;
use crate::msg::path_table::GroupPolicy;
use crate::msg::Message;

/// Apps directly reachable one hop away per the graph's extension nodes
/// (excluding our own app).
pub fn immediate_connectable_apps(parsed: &ParsedGraph, my_app_uri: &str) -> Vec<String> {
    let mut apps: Vec<String> = parsed
        .extensions_info
        .iter()
        .map(|e| e.app_uri.clone())
        .filter(|uri| uri != my_app_uri)
        .collect();
    apps.sort();
    apps.dedup();
    apps
}

/// Outcome of handling an inbound `start_graph` command, driving what the
/// caller (the engine's owner) must do next.
pub enum StartGraphOutcome {
    /// No remote apps involved: proceed straight to
    /// `enable_extension_system` and answer the original cmd once it
    /// completes.
    EnableLocally { parsed: ParsedGraph },
    /// At least one remote app is involved: spawn a child `start_graph` per
    /// app, register an out-path per child (grouped under
    /// `FirstErrorOrLastOk`), and hold the original cmd as an in-path until
    /// every child resolves.
    FanOutToRemotes { parsed: ParsedGraph, target_apps: Vec<String> },
}

pub fn handle_start_graph(json: &serde_json::Value, my_app_uri: &str) -> Result<StartGraphOutcome> {
    let decl = GraphDecl::parse(json)?;
    let parsed = decl.validate_and_lower()?;
    let apps = immediate_connectable_apps(&parsed, my_app_uri);

    if apps.is_empty() {
        Ok(StartGraphOutcome::EnableLocally { parsed })
    } else {
        tracing::debug!(target_apps = ?apps, "start_graph fans out to remote apps");
        Ok(StartGraphOutcome::FanOutToRemotes { parsed, target_apps: apps })
    }
}

/// Connect a child `start_graph` fan-out to every target app, reporting the
/// elapsed time for the whole batch the way `ExtensionThread::handle_start`
/// times its own startup phase.
pub async fn connect_fan_out<F, Fut>(original: &Message, target_apps: &[String], mut send: F) -> Result<()>
where
    F: FnMut(Message) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    tooling::logging::timed("start_graph::connect_fan_out", async {
        for app in target_apps {
            let child = build_child_start_graph(original, app);
            send(child).await?;
        }
        Ok(())
    })
    .await
}

/// `enable_extension_system`: build the `ExtensionContext` from the
/// parsed graph snapshot. Extension-thread creation/startup itself is
/// driven by the caller (it needs the addon registry and OS-thread
/// spawning, which this pure function deliberately does not own).
pub fn enable_extension_system(parsed: ParsedGraph) -> ExtensionContext {
    ExtensionContext::new(parsed.extensions_info, parsed.extension_groups_info)
}

/// Build a child `start_graph` command to send to `target_app`: same
/// extensions/connections, `predefined_graph` cleared so the receiving app
/// treats it as an anonymous ad hoc graph rather than re-resolving a name.
pub fn build_child_start_graph(original: &Message, target_app: &str) -> Message {
    let mut child = original.clone_for_fanout();
    child.clear_and_set_dest(Location::for_app(target_app));
    if let Ok(Some(_)) = child.properties.peek("predefined_graph") {
        let _ = child.properties.set("predefined_graph", crate::value::Value::String(String::new()));
    }
    child
}

pub const FAN_OUT_GROUP_POLICY: GroupPolicy = GroupPolicy::FirstErrorOrLastOk;
