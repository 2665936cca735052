//! In/out path tables: command correlation and expiry.
//!
//! Grounded on `path_timer.c`'s expiry-driven synthesis of an `ERROR`
//! `cmd_result` on behalf of a responder that never answered, and on
//! `parent_child.rs`'s parent-chain correlation idea (a result is matched to
//! its caller by walking `parent_cmd_id` links, not by re-deriving identity
//! from the message payload).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::location::Location;

/// Fan-out result policy for a group of out-paths that share one in-path.
/// Pinned in `DESIGN.md`: "last" means the out-path registered last in
/// declaration order, not whichever result arrives last in wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPolicy {
    FirstErrorOrLastOk,
}

/// A command received from `source`, awaiting the extension's own result.
#[derive(Debug, Clone)]
pub struct InPath {
    pub cmd_id: String,
    pub cmd_name: String,
    pub source: Location,
    pub expires_at: Instant,
}

/// A command forwarded to `target`, awaiting its result.
#[derive(Debug, Clone)]
pub struct OutPath {
    pub cmd_id: String,
    pub cmd_name: String,
    pub target: Location,
    pub expires_at: Instant,
    /// Path the inbound command arrived on, if this out-path was opened in
    /// response to one (forms the correlation chain back to the caller).
    pub parent_in_path_cmd_id: Option<String>,
    pub group_policy: Option<GroupPolicy>,
    /// Declaration order within the fan-out group this out-path belongs to;
    /// used by `FirstErrorOrLastOk`'s "originally-declared-last" semantics.
    pub group_seq: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedResult {
    Ok { detail: Option<String> },
    Error { detail: Option<String> },
}

#[derive(Debug, Default)]
pub struct PathTable {
    in_paths: HashMap<String, InPath>,
    out_paths: HashMap<String, OutPath>,
    /// Per-group accumulated results, keyed by the parent in-path's cmd_id.
    group_results: HashMap<String, Vec<(u32, ResolvedResult)>>,
    /// Total out-paths expected per group, so a group can be judged
    /// "settled" only once every member has reported.
    group_expected: HashMap<String, usize>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_in_path(&mut self, cmd_id: impl Into<String>, cmd_name: impl Into<String>, source: Location, ttl: Duration) {
        let cmd_id = cmd_id.into();
        self.in_paths.insert(
            cmd_id.clone(),
            InPath {
                cmd_id,
                cmd_name: cmd_name.into(),
                source,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn take_in_path(&mut self, cmd_id: &str) -> Option<InPath> {
        self.in_paths.remove(cmd_id)
    }

    pub fn peek_in_path(&self, cmd_id: &str) -> Option<&InPath> {
        self.in_paths.get(cmd_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_out_path(
        &mut self,
        cmd_id: impl Into<String>,
        cmd_name: impl Into<String>,
        target: Location,
        ttl: Duration,
        parent_in_path_cmd_id: Option<String>,
        group_policy: Option<GroupPolicy>,
        group_seq: u32,
    ) {
        let cmd_id = cmd_id.into();
        if let Some(parent) = &parent_in_path_cmd_id {
            *self.group_expected.entry(parent.clone()).or_insert(0) += 1;
        }
        self.out_paths.insert(
            cmd_id.clone(),
            OutPath {
                cmd_id,
                cmd_name: cmd_name.into(),
                target,
                expires_at: Instant::now() + ttl,
                parent_in_path_cmd_id,
                group_policy,
                group_seq,
            },
        );
    }

    pub fn take_out_path(&mut self, cmd_id: &str) -> Option<OutPath> {
        self.out_paths.remove(cmd_id)
    }

    pub fn peek_out_path(&self, cmd_id: &str) -> Option<&OutPath> {
        self.out_paths.get(cmd_id)
    }

    pub fn expired_out_paths(&self, now: Instant) -> Vec<OutPath> {
        self.out_paths
            .values()
            .filter(|p| p.expires_at <= now)
            .cloned()
            .collect()
    }

    pub fn expired_in_paths(&self, now: Instant) -> Vec<InPath> {
        self.in_paths
            .values()
            .filter(|p| p.expires_at <= now)
            .cloned()
            .collect()
    }

    pub fn pending_out_path_count(&self) -> usize {
        self.out_paths.len()
    }

    /// Record a resolved out-path's result under its fan-out group (if any),
    /// consuming the out-path. Returns the group's resolved verdict once
    /// every expected member has reported, per `group_policy`.
    pub fn resolve_out_path(&mut self, cmd_id: &str, result: ResolvedResult) -> Option<(String, ResolvedResult)> {
        let path = self.out_paths.remove(cmd_id)?;
        let parent = path.parent_in_path_cmd_id?;
        let policy = path.group_policy.unwrap_or(GroupPolicy::FirstErrorOrLastOk);

        let entries = self.group_results.entry(parent.clone()).or_default();
        entries.push((path.group_seq, result.clone()));

        if matches!(result, ResolvedResult::Error { .. }) && policy == GroupPolicy::FirstErrorOrLastOk {
            let out = entries.iter().find(|(_, r)| matches!(r, ResolvedResult::Error { .. })).cloned();
            self.group_results.remove(&parent);
            self.group_expected.remove(&parent);
            return out.map(|(_, r)| (parent, r));
        }

        let expected = self.group_expected.get(&parent).copied().unwrap_or(0);
        if entries.len() >= expected {
            entries.sort_by_key(|(seq, _)| *seq);
            let verdict = entries
                .iter()
                .rev()
                .find(|(_, r)| matches!(r, ResolvedResult::Ok { .. }))
                .or_else(|| entries.last())
                .map(|(_, r)| r.clone());
            self.group_results.remove(&parent);
            self.group_expected.remove(&parent);
            verdict.map(|r| (parent, r))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn loc() -> Location {
        Location::for_extension("app://me", "g1", "grp", "e1")
    }

    #[test]
    fn expiry_reports_only_expired_entries() {
        let mut t = PathTable::new();
        t.add_out_path("c1", "ping", loc(), Duration::from_millis(0), None, None, 0);
        t.add_out_path("c2", "ping", loc(), Duration::from_secs(60), None, None, 0);
        std::thread::sleep(Duration::from_millis(5));
        let expired = t.expired_out_paths(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].cmd_id, "c1");
    }

    #[test]
    fn first_error_short_circuits_group() {
        let mut t = PathTable::new();
        t.add_out_path("c1", "x", loc(), Duration::from_secs(5), Some("parent".into()), Some(GroupPolicy::FirstErrorOrLastOk), 0);
        t.add_out_path("c2", "x", loc(), Duration::from_secs(5), Some("parent".into()), Some(GroupPolicy::FirstErrorOrLastOk), 1);

        assert!(t
            .resolve_out_path("c1", ResolvedResult::Ok { detail: None })
            .is_none());
        let (parent, verdict) = t
            .resolve_out_path("c2", ResolvedResult::Error { detail: Some("boom".into()) })
            .unwrap();
        assert_eq!(parent, "parent");
        assert_eq!(verdict, ResolvedResult::Error { detail: Some("boom".into()) });
    }

    #[test]
    fn last_ok_resolves_by_declaration_order_not_arrival_order() {
        let mut t = PathTable::new();
        t.add_out_path("c1", "x", loc(), Duration::from_secs(5), Some("parent".into()), Some(GroupPolicy::FirstErrorOrLastOk), 0);
        t.add_out_path("c2", "x", loc(), Duration::from_secs(5), Some("parent".into()), Some(GroupPolicy::FirstErrorOrLastOk), 1);

        // c2 (declared last) arrives first, but its result must still win.
        assert!(t
            .resolve_out_path("c2", ResolvedResult::Ok { detail: Some("second".into()) })
            .is_none());
        let (_, verdict) = t
            .resolve_out_path("c1", ResolvedResult::Ok { detail: Some("first".into()) })
            .unwrap();
        assert_eq!(verdict, ResolvedResult::Ok { detail: Some("second".into()) });
    }
}
