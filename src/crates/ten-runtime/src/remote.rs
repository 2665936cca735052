//! The remote layer: creation, connection, duplicate tie-break, and teardown
//! of inter-app message channels.
//!
//! Grounded almost verbatim on `core/src/ten_runtime/engine/internal/
//! remote_interface.c`: weak-remote staging before a duplicate is resolved,
//! and the tie-break rule `ten_c_string_is_equal_or_smaller` — the remote
//! whose local app's URI is lexicographically *smaller or equal* loses.

use std::collections::HashMap;
use std::sync::Arc;

use crate::addon::Protocol;
use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Connecting,
    Connected,
    Closing,
    Closed,
}

pub struct Remote {
    pub uri: String,
    pub connection: Arc<dyn Protocol>,
    pub state: RemoteState,
    /// Pins all inbound messages on this channel to a specific destination,
    /// bypassing normal dest resolution. Rarely used; mirrors the original's
    /// `explicit_dest_loc`.
    pub explicit_dest_loc: Option<Location>,
}

impl Remote {
    pub fn new(uri: impl Into<String>, connection: Arc<dyn Protocol>) -> Self {
        Self {
            uri: uri.into(),
            connection,
            state: RemoteState::Connecting,
            explicit_dest_loc: None,
        }
    }
}

/// Two-state registration table: model weak/strong as one table with a
/// flag, not two parallel collections that can silently drift apart.
struct Entry {
    remote: Remote,
    weak: bool,
}

#[derive(Default)]
pub struct RemoteTable {
    entries: HashMap<String, Entry>,
}

impl RemoteTable {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Register `remote` as weak (not yet the committed channel for its
    /// URI). Returns `Err` describing the tie-break outcome if a remote for
    /// the same URI already exists.
    pub fn add_weak(&mut self, remote: Remote, own_app_uri: &str) -> TieBreakOutcome {
        let uri = remote.uri.clone();
        if let Some(existing) = self.entries.get(&uri) {
            return self.resolve_duplicate(existing.weak, &uri, remote, own_app_uri);
        }
        self.entries.insert(uri, Entry { remote, weak: true });
        TieBreakOutcome::Registered
    }

    fn resolve_duplicate(&mut self, _existing_weak: bool, uri: &str, incoming: Remote, own_app_uri: &str) -> TieBreakOutcome {
        // The remote whose local app's URI is lexicographically
        // smaller-or-equal to the peer's loses. `own_app_uri` is always the
        // "local" side here; `uri` is the peer's URI.
        if own_app_uri <= uri {
            TieBreakOutcome::IncomingLoses(incoming)
        } else {
            let existing = self.entries.remove(uri).expect("checked present").remote;
            self.entries.insert(uri.to_string(), Entry { remote: incoming, weak: true });
            TieBreakOutcome::ExistingLoses(existing)
        }
    }

    /// Move a weak remote to strong, keyed by URI — the normal state for a
    /// settled connection.
    pub fn upgrade_weak_to_normal(&mut self, uri: &str) {
        if let Some(entry) = self.entries.get_mut(uri) {
            entry.weak = false;
        }
    }

    pub fn get(&self, uri: &str) -> Option<&Remote> {
        self.entries.get(uri).map(|e| &e.remote)
    }

    pub fn is_weak(&self, uri: &str) -> Option<bool> {
        self.entries.get(uri).map(|e| e.weak)
    }

    pub fn remove(&mut self, uri: &str) -> Option<Remote> {
        self.entries.remove(uri).map(|e| e.remote)
    }

    pub fn strong_uris(&self) -> Vec<String> {
        self.entries.iter().filter(|(_, e)| !e.weak).map(|(u, _)| u.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub enum TieBreakOutcome {
    Registered,
    /// The newly-arriving remote loses; it must still be answered OK to
    /// unblock the peer's flow, then destroyed.
    IncomingLoses(Remote),
    /// The already-registered remote loses to the incoming one.
    ExistingLoses(Remote),
}

/// In-process loopback `Protocol`, used only to exercise the remote layer's
/// tests without a real wire codec.
pub struct LoopbackProtocol {
    uri: String,
    sent: parking_lot::Mutex<Vec<Vec<u8>>>,
}

impl LoopbackProtocol {
    pub fn new(uri: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { uri: uri.into(), sent: parking_lot::Mutex::new(Vec::new()) })
    }

    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl Protocol for LoopbackProtocol {
    async fn send_bytes(&self, bytes: Vec<u8>) -> crate::error::Result<()> {
        self.sent.lock().push(bytes);
        Ok(())
    }

    fn uri(&self) -> &str {
        &self.uri
    }
}
