//! `stop_graph` handling: cancel in-flight commands, begin the close flow.
//!
//! Grounded on `core/src/ten_runtime/cmd_base/cmd/stop_graph/field/
//! graph_name.c` for the payload and `engine/on_xxx.c` for the close
//! orchestration this triggers.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TenError};
use crate::msg::Message;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StopGraphPayload {
    pub graph_name: String,
}

pub fn parse_stop_graph(json: &serde_json::Value) -> Result<StopGraphPayload> {
    serde_json::from_value(json.clone()).map_err(TenError::from)
}

/// `stop_graph` cancels all in-flight commands in the engine's path table
/// by generating ERROR cmd_results with `"stopped"` detail, ahead of
/// handing the engine through the close sequence.
pub fn build_stopped_results(cmd_ids: impl IntoIterator<Item = String>) -> Vec<Message> {
    cmd_ids.into_iter().map(|id| Message::error_result(id, "stopped")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_graph_name_payload() {
        let json = serde_json::json!({ "graph_name": "g1" });
        let parsed = parse_stop_graph(&json).unwrap();
        assert_eq!(parsed.graph_name, "g1");
    }

    #[test]
    fn stopped_results_carry_stopped_detail() {
        let results = build_stopped_results(vec!["c1".to_string(), "c2".to_string()]);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|m| m.detail.as_deref() == Some("stopped")));
    }
}
