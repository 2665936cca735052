//! Graph declaration parsing: nodes, connections, and the invariants
//! enforced at parse time.
//!
//! Grounded on `core/src/ten_runtime/msg/cmd_base/cmd/start_graph/cmd.c` for
//! the payload shape, and `extension/extension_info/extension_info.c` for
//! the duplicate-node-must-agree-on-addon rule (same `addon`, possibly
//! different `extension_group`).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TenError};
use crate::msg::conversion::{ConversionMode, ConversionRule, MsgConversion};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionInfo {
    pub name: String,
    pub addon_name: String,
    pub group_name: String,
    pub app_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionGroupInfo {
    pub name: String,
    pub addon_name: String,
}

/// The addon name synthesised groups are given.
pub const DEFAULT_EXTENSION_GROUP_ADDON: &str = "default_extension_group";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDecl {
    Extension {
        name: String,
        addon: String,
        extension_group: String,
        #[serde(default)]
        app: String,
        #[serde(default)]
        graph: String,
        #[serde(default)]
        property: serde_json::Value,
    },
    ExtensionGroup {
        name: String,
        addon: String,
        #[serde(default)]
        app: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionRuleDecl {
    pub path: String,
    pub conversion_mode: String,
    #[serde(default)]
    pub original_path: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DestDecl {
    pub extension: String,
    #[serde(default)]
    pub extension_group: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub msg_conversion: Vec<ConversionRuleDecl>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MsgFlowDecl {
    #[serde(default)]
    pub cmd: HashMap<String, Vec<DestDecl>>,
    #[serde(default)]
    pub data: HashMap<String, Vec<DestDecl>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionDecl {
    pub extension: String,
    #[serde(default)]
    pub extension_group: String,
    #[serde(flatten)]
    pub flows: MsgFlowDecl,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphDecl {
    #[serde(default)]
    pub long_running_mode: bool,
    #[serde(default)]
    pub predefined_graph: String,
    pub nodes: Vec<NodeDecl>,
    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,
}

pub struct ParsedGraph {
    pub extensions_info: Vec<ExtensionInfo>,
    pub extension_groups_info: Vec<ExtensionGroupInfo>,
    pub connections: Vec<ConnectionDecl>,
    pub long_running_mode: bool,
    pub predefined_graph: String,
}

impl GraphDecl {
    pub fn parse(json: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(json.clone()).map_err(TenError::from)
    }

    /// Validate and lower into the runtime's internal graph-snapshot shape,
    /// synthesising default extension-groups as needed.
    pub fn validate_and_lower(self) -> Result<ParsedGraph> {
        let mut extensions_info = Vec::new();
        let mut declared_groups: HashMap<String, ExtensionGroupInfo> = HashMap::new();
        let mut seen_node_addons: HashMap<String, String> = HashMap::new();
        let mut mentioned_groups: HashSet<String> = HashSet::new();

        for node in &self.nodes {
            match node {
                NodeDecl::ExtensionGroup { name, addon, .. } => {
                    declared_groups.insert(
                        name.clone(),
                        ExtensionGroupInfo { name: name.clone(), addon_name: addon.clone() },
                    );
                }
                NodeDecl::Extension { name, addon, extension_group, app, .. } => {
                    if let Some(prev_addon) = seen_node_addons.get(name) {
                        if prev_addon != addon {
                            return Err(TenError::invalid_graph(format!(
                                "node '{name}' redeclared with a different addon ('{prev_addon}' vs '{addon}')"
                            )));
                        }
                        continue;
                    }
                    seen_node_addons.insert(name.clone(), addon.clone());
                    mentioned_groups.insert(extension_group.clone());
                    extensions_info.push(ExtensionInfo {
                        name: name.clone(),
                        addon_name: addon.clone(),
                        group_name: extension_group.clone(),
                        app_uri: if app.is_empty() { "localhost".to_string() } else { app.clone() },
                    });
                }
            }
        }

        // Synthesise a default_extension_group entry for any group name
        // mentioned by an extension node but not declared explicitly.
        for group_name in &mentioned_groups {
            declared_groups.entry(group_name.clone()).or_insert_with(|| ExtensionGroupInfo {
                name: group_name.clone(),
                addon_name: DEFAULT_EXTENSION_GROUP_ADDON.to_string(),
            });
        }

        let declared_names: HashSet<&str> = extensions_info.iter().map(|e| e.name.as_str()).collect();
        for conn in &self.connections {
            if !declared_names.contains(conn.extension.as_str()) {
                return Err(TenError::invalid_graph(format!(
                    "connection references undeclared node '{}'",
                    conn.extension
                )));
            }
            for dests in conn.flows.cmd.values().chain(conn.flows.data.values()) {
                for dest in dests {
                    if !declared_names.contains(dest.extension.as_str()) {
                        return Err(TenError::invalid_graph(format!(
                            "connection destination references undeclared node '{}'",
                            dest.extension
                        )));
                    }
                }
            }
        }

        Ok(ParsedGraph {
            extensions_info,
            extension_groups_info: declared_groups.into_values().collect(),
            connections: self.connections,
            long_running_mode: self.long_running_mode,
            predefined_graph: self.predefined_graph,
        })
    }
}

pub fn lower_conversion_rules(decls: &[ConversionRuleDecl]) -> Result<MsgConversion> {
    let mut rules = Vec::new();
    for decl in decls {
        let mode = match decl.conversion_mode.as_str() {
            "from_original" => ConversionMode::FromOriginal {
                original_path: decl
                    .original_path
                    .clone()
                    .ok_or_else(|| TenError::invalid_graph("from_original conversion missing original_path"))?,
            },
            "fixed_value" => ConversionMode::FixedValue {
                value: decl
                    .value
                    .as_ref()
                    .map(Value::from_json)
                    .ok_or_else(|| TenError::invalid_graph("fixed_value conversion missing value"))?,
            },
            other => return Err(TenError::invalid_graph(format!("unknown conversion mode '{other}'"))),
        };
        rules.push(ConversionRule { path: decl.path.clone(), mode });
    }
    Ok(MsgConversion { rules, result_conversion: None })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, addon: &str, group: &str) -> NodeDecl {
        NodeDecl::Extension {
            name: name.into(),
            addon: addon.into(),
            extension_group: group.into(),
            app: String::new(),
            graph: String::new(),
            property: serde_json::json!({}),
        }
    }

    #[test]
    fn synthesises_default_group_for_undeclared_group_names() {
        let decl = GraphDecl {
            long_running_mode: false,
            predefined_graph: String::new(),
            nodes: vec![node("e1", "echo", "g1")],
            connections: vec![],
        };
        let parsed = decl.validate_and_lower().unwrap();
        assert_eq!(parsed.extension_groups_info.len(), 1);
        assert_eq!(parsed.extension_groups_info[0].addon_name, DEFAULT_EXTENSION_GROUP_ADDON);
    }

    #[test]
    fn duplicate_node_must_agree_on_addon() {
        let decl = GraphDecl {
            long_running_mode: false,
            predefined_graph: String::new(),
            nodes: vec![node("e1", "echo", "g1"), node("e1", "different_addon", "g2")],
            connections: vec![],
        };
        assert!(decl.validate_and_lower().is_err());
    }

    #[test]
    fn duplicate_node_may_redeclare_a_different_group() {
        let decl = GraphDecl {
            long_running_mode: false,
            predefined_graph: String::new(),
            nodes: vec![node("e1", "echo", "g1"), node("e1", "echo", "g2")],
            connections: vec![],
        };
        assert!(decl.validate_and_lower().is_ok());
    }

    #[test]
    fn connection_to_undeclared_node_is_rejected() {
        let decl = GraphDecl {
            long_running_mode: false,
            predefined_graph: String::new(),
            nodes: vec![node("e1", "echo", "g1")],
            connections: vec![ConnectionDecl {
                extension: "missing".into(),
                extension_group: "g1".into(),
                flows: MsgFlowDecl::default(),
            }],
        };
        assert!(decl.validate_and_lower().is_err());
    }
}
