//! `ExtensionContext`: per-engine registry of extension-threads and the
//! graph-declaration snapshots that drive dest-resolution.
//!
//! Grounded on `core/src/ten_runtime/extension_context/extension_context.c`
//! and `internal/add_extension.c`/`del_extension.c` for the gating-counter
//! shape used to know when every extension-thread has reported a phase.

use std::collections::HashMap;

use crate::extension_thread::ExtensionThreadHandle;
use crate::graph_def::{ExtensionGroupInfo, ExtensionInfo};

/// Counters gating multi-extension-thread phase transitions. Each counts
/// how many extension-threads have reported the corresponding phase;
/// compared against `extension_groups_info.len()` to detect "all done."
#[derive(Debug, Default, Clone, Copy)]
pub struct PhaseCounters {
    pub inited: usize,
    pub all_added_to_engine: usize,
    pub stopped: usize,
    pub closing_flag_set: usize,
    pub closed: usize,
}

pub struct ExtensionContext {
    pub threads: HashMap<String, ExtensionThreadHandle>,
    pub counters: PhaseCounters,
    pub extensions_info_from_graph: Vec<ExtensionInfo>,
    pub extension_groups_info_from_graph: Vec<ExtensionGroupInfo>,
}

impl ExtensionContext {
    pub fn new(
        extensions_info: Vec<ExtensionInfo>,
        extension_groups_info: Vec<ExtensionGroupInfo>,
    ) -> Self {
        Self {
            threads: HashMap::new(),
            counters: PhaseCounters::default(),
            extensions_info_from_graph: extensions_info,
            extension_groups_info_from_graph: extension_groups_info,
        }
    }

    pub fn expected_group_count(&self) -> usize {
        self.extension_groups_info_from_graph.len()
    }

    pub fn register_thread(&mut self, group_name: impl Into<String>, handle: ExtensionThreadHandle) {
        self.threads.insert(group_name.into(), handle);
    }

    pub fn note_inited(&mut self) -> bool {
        self.counters.inited += 1;
        self.counters.inited >= self.expected_group_count()
    }

    pub fn note_stopped(&mut self) -> bool {
        self.counters.stopped += 1;
        self.counters.stopped >= self.expected_group_count()
    }

    pub fn note_closed(&mut self) -> bool {
        self.counters.closed += 1;
        self.counters.closed >= self.expected_group_count()
    }

    /// Resolve the extension-thread (by group name) that owns `extension_name`,
    /// per the graph snapshot.
    pub fn group_owning(&self, extension_name: &str) -> Option<&str> {
        self.extensions_info_from_graph
            .iter()
            .find(|e| e.name == extension_name)
            .map(|e| e.group_name.as_str())
    }

    pub fn thread_for_group(&self, group_name: &str) -> Option<&ExtensionThreadHandle> {
        self.threads.get(group_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_counters_report_done_once_every_group_reports() {
        let groups = vec![
            ExtensionGroupInfo { name: "g1".into(), addon_name: "default_extension_group".into() },
            ExtensionGroupInfo { name: "g2".into(), addon_name: "default_extension_group".into() },
        ];
        let mut ctx = ExtensionContext::new(vec![], groups);
        assert!(!ctx.note_inited());
        assert!(ctx.note_inited());
    }

    #[test]
    fn group_owning_resolves_by_graph_snapshot() {
        let infos = vec![ExtensionInfo {
            name: "e1".into(),
            addon_name: "echo".into(),
            group_name: "g1".into(),
            app_uri: "app://me".into(),
        }];
        let ctx = ExtensionContext::new(infos, vec![]);
        assert_eq!(ctx.group_owning("e1"), Some("g1"));
        assert_eq!(ctx.group_owning("missing"), None);
    }
}
