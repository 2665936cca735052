//! End-to-end scenarios exercising the pieces together the way a running
//! app would wire them: a graph declaration loaded and lowered, extension
//! threads started from the addon registry, messages routed across the
//! pieces the engine and app own individually.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ten_runtime::addon::{AddonRegistry, ExtensionFactory};
use ten_runtime::cmd::start_graph::{build_child_start_graph, handle_start_graph, immediate_connectable_apps, StartGraphOutcome};
use ten_runtime::error::Result;
use ten_runtime::extension::{Extension, ExtensionCtx};
use ten_runtime::extension_group::{ExtensionGroup, ExtensionGroupHost, ExtensionSpec};
use ten_runtime::extension_thread::{ExtensionThread, ThreadOutbound};
use ten_runtime::graph_def::{lower_conversion_rules, ConversionRuleDecl};
use ten_runtime::location::Location;
use ten_runtime::msg::conversion::{ConversionContext, ConversionTable};
use ten_runtime::msg::path_table::{GroupPolicy, PathTable, ResolvedResult};
use ten_runtime::msg::Message;
use ten_runtime::remote::{Remote, RemoteTable, TieBreakOutcome};
use ten_runtime::value::Value;

struct Echo;

#[async_trait]
impl Extension for Echo {
    async fn on_cmd(&mut self, ctx: &mut ExtensionCtx, cmd: Message) -> Result<()> {
        let id = cmd.cmd_id.clone().unwrap_or_default();
        ctx.return_result(Message::ok_result(id, "pong"));
        Ok(())
    }
}

struct EchoFactory;

#[async_trait]
impl ExtensionFactory for EchoFactory {
    async fn on_create_instance(&self, _instance_name: &str) -> Result<Box<dyn Extension>> {
        Ok(Box::new(Echo))
    }
}

struct OneExtensionGroup {
    instance_name: String,
}

#[async_trait]
impl ExtensionGroup for OneExtensionGroup {
    fn extension_specs(&self) -> Vec<ExtensionSpec> {
        vec![ExtensionSpec { addon_name: "echo".into(), instance_name: self.instance_name.clone() }]
    }
}

async fn start_one_extension_thread(
    thread_name: &str,
    instance_name: &str,
    graph_id: &str,
) -> (ten_runtime::extension_thread::ExtensionThreadHandle, mpsc::UnboundedReceiver<ThreadOutbound>, ExtensionThread) {
    let registry = AddonRegistry::new();
    registry.register_extension("echo", Arc::new(EchoFactory));
    let group = ExtensionGroupHost::new("g", Box::new(OneExtensionGroup { instance_name: instance_name.to_string() }));
    let (handle, outbound_rx, mut thread) = ExtensionThread::spawn(thread_name, group);
    let graph_id = graph_id.to_string();
    thread
        .handle_start(&registry, move |name| Location::for_extension("app://me", &graph_id, "g", name))
        .await
        .unwrap();
    (handle, outbound_rx, thread)
}

/// Scenario 1: single-app, single-extension start/stop.
#[tokio::test]
async fn single_app_single_extension_start_then_stop() {
    let json = serde_json::json!({
        "nodes": [{"type": "extension", "name": "e1", "addon": "echo", "extension_group": "g", "app": "app://me"}],
        "connections": [],
    });
    let outcome = handle_start_graph(&json, "app://me").unwrap();
    let StartGraphOutcome::EnableLocally { parsed } = outcome else {
        panic!("expected local enable for a single-app graph");
    };
    assert_eq!(parsed.extensions_info.len(), 1);

    let (_handle, mut outbound_rx, mut thread) = start_one_extension_thread("t1", "e1", "g1").await;

    let mut ping = Message::cmd("ping");
    ping.ensure_cmd_id();
    let ping_id = ping.cmd_id.clone().unwrap();
    ping.clear_and_set_dest(Location::for_extension("app://me", "g1", "g", "e1"));
    thread.handle_inbound(ping).await.unwrap();

    match outbound_rx.recv().await.unwrap() {
        ThreadOutbound::Route { msg, .. } => {
            assert_eq!(msg.cmd_id.as_deref(), Some(ping_id.as_str()));
            assert_eq!(msg.detail.as_deref(), Some("pong"));
        }
        ThreadOutbound::Closed { .. } => panic!("unexpected close before stop_graph"),
    }

    thread.trigger_close().await.unwrap();
    assert_eq!(thread.extensions["e1"].state, ten_runtime::extension::ExtensionState::OnDeinitDone);
    match outbound_rx.recv().await.unwrap() {
        ThreadOutbound::Closed { thread_name } => assert_eq!(thread_name, "t1"),
        ThreadOutbound::Route { .. } => panic!("expected close notification"),
    }
}

/// Scenario 2: two-extension chain with a `from_original` conversion.
#[tokio::test]
async fn two_extension_chain_applies_conversion() {
    let e1_loc = Location::for_extension("app://me", "g1", "g", "e1");
    let e2_loc = Location::for_extension("app://me", "g1", "g", "e2");

    let mut table = ConversionTable::new();
    let rules = lower_conversion_rules(&[ConversionRuleDecl {
        path: "y".into(),
        conversion_mode: "from_original".into(),
        original_path: Some("a".into()),
        value: None,
    }])
    .unwrap();
    table.register(ConversionContext {
        src_loc: e1_loc.clone(),
        msg_name: "x".into(),
        dest: e2_loc.clone(),
        conversion: rules,
    });

    let mut inbound = Message::cmd("x");
    inbound.ensure_cmd_id();
    let inbound_id = inbound.cmd_id.clone().unwrap();
    inbound.src = e1_loc;
    inbound.properties.set("a", Value::Int(42)).unwrap();

    let converted = table.convert(&inbound);
    assert_eq!(converted.len(), 1);
    let (dest, msg, _result_conversion) = &converted[0];
    assert_eq!(*dest, e2_loc);
    assert_eq!(msg.properties.get("y").unwrap(), Value::Int(42));
    assert_eq!(msg.properties.get("a").unwrap(), Value::Int(42), "from_original copies, it does not move");
    assert_ne!(msg.cmd_id, Some(inbound_id.clone()));
    assert_eq!(msg.parent_cmd_id, Some(inbound_id));
}

/// Scenario 3: a command that never gets a reply expires out of the path
/// table with an ERROR result carrying `"Path timeout."`.
#[tokio::test]
async fn unanswered_command_times_out() {
    let mut table = PathTable::new();
    let dest = Location::for_extension("app://me", "g1", "g", "e2");
    table.add_out_path("slow-cmd", "slow", dest, Duration::from_millis(50), None, None, 0);

    tokio::time::sleep(Duration::from_millis(75)).await;
    let expired = table.expired_out_paths(std::time::Instant::now());
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].cmd_id, "slow-cmd");

    let timeout_result = Message::error_result(expired[0].cmd_id.clone(), "Path timeout.");
    assert_eq!(timeout_result.status, Some(ten_runtime::msg::StatusCode::Error));
    assert_eq!(timeout_result.detail.as_deref(), Some("Path timeout."));
    assert_eq!(timeout_result.cmd_id.as_deref(), Some("slow-cmd"));
}

/// Scenario 4: a command addressed to an extension that isn't in the group
/// gets an ERROR cmd_result synthesised and routed back to the sender.
#[tokio::test]
async fn invalid_destination_synthesises_error_result() {
    let (_handle, mut outbound_rx, mut thread) = start_one_extension_thread("t1", "e1", "g1").await;

    let mut q = Message::cmd("q");
    q.ensure_cmd_id();
    q.src = Location::for_extension("app://me", "g1", "g", "sender");
    q.clear_and_set_dest(Location::for_extension("app://me", "g1", "g", "missing"));
    thread.handle_inbound(q).await.unwrap();

    match outbound_rx.recv().await.unwrap() {
        ThreadOutbound::Route { msg, dest } => {
            assert_eq!(msg.detail.as_deref(), Some("The extension[missing] is invalid."));
            assert_eq!(dest.extension_name, "sender");
        }
        ThreadOutbound::Closed { .. } => panic!("unexpected close"),
    }
}

/// Scenario 5: cross-app fan-out. `immediate_connectable_apps` surfaces the
/// foreign app a child `start_graph` must go to, and the child command
/// chains back to the original via `parent_cmd_id`.
#[tokio::test]
async fn cross_app_graph_fans_out_a_child_start_graph() {
    let json = serde_json::json!({
        "nodes": [
            {"type": "extension", "name": "e1", "addon": "echo", "extension_group": "g", "app": "app://a"},
            {"type": "extension", "name": "e2", "addon": "echo", "extension_group": "g", "app": "app://b"},
        ],
        "connections": [],
    });
    let outcome = handle_start_graph(&json, "app://a").unwrap();
    let StartGraphOutcome::FanOutToRemotes { parsed, target_apps } = outcome else {
        panic!("expected a fan-out outcome for a cross-app graph");
    };
    assert_eq!(target_apps, vec!["app://b".to_string()]);
    assert_eq!(immediate_connectable_apps(&parsed, "app://a"), vec!["app://b".to_string()]);

    let mut original = Message::cmd("start_graph");
    original.ensure_cmd_id();
    let original_id = original.cmd_id.clone().unwrap();

    let child = build_child_start_graph(&original, "app://b");
    assert_eq!(child.parent_cmd_id, Some(original_id));
    assert_eq!(child.dest[0].app_uri, "app://b");
}

/// Scenario 6: two apps simultaneously register remotes for each other;
/// the tie-break rule must leave exactly one winner per side, and it must
/// be the same rule both directions (lower uri loses its own remote).
#[tokio::test]
async fn duplicate_cross_registration_breaks_tied_deterministically() {
    let mut table_a = RemoteTable::new();
    let remote_b_seen_by_a = Remote::new("app://b", ten_runtime::remote::LoopbackProtocol::new("app://b"));
    table_a.add_weak(remote_b_seen_by_a, "app://a");
    assert_eq!(table_a.len(), 1);

    let mut table_b = RemoteTable::new();
    let remote_a_seen_by_b = Remote::new("app://a", ten_runtime::remote::LoopbackProtocol::new("app://a"));
    let outcome = table_b.add_weak(remote_a_seen_by_b, "app://b");
    assert!(matches!(outcome, TieBreakOutcome::Registered));

    assert!(table_a.get("app://b").is_some());
    assert!(table_b.get("app://a").is_some());
    assert_eq!(table_a.len(), 1);
    assert_eq!(table_b.len(), 1);
}

/// `stop_graph` and `FirstErrorOrLastOk` group resolution interacting
/// across a two-member fan-out, rounding out scenario 5/6's cleanup path.
#[tokio::test]
async fn fan_out_group_policy_matches_cmd_start_graph_default() {
    assert_eq!(ten_runtime::cmd::start_graph::FAN_OUT_GROUP_POLICY, GroupPolicy::FirstErrorOrLastOk);

    let mut table = PathTable::new();
    let dest = Location::for_app("app://b");
    table.add_out_path("child-1", "start_graph", dest, Duration::from_secs(5), Some("parent".into()), Some(GroupPolicy::FirstErrorOrLastOk), 0);

    let resolved = table.resolve_out_path("child-1", ResolvedResult::Ok { detail: Some("started".into()) });
    assert_eq!(resolved, Some(("parent".to_string(), ResolvedResult::Ok { detail: Some("started".into()) })));
}
