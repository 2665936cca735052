//! `Location` — `(app_uri, graph_id, group_name, extension_name)`.
//!
//! An empty segment is a wildcard: an empty `extension_name` addresses the
//! engine or app, an empty `graph_id` addresses the app. `"localhost"` in
//! `app_uri` is rewritten to the owning app's real URI the moment a message
//! crosses into that app's dispatch path (see `App::normalize_loc`), not at
//! construction time — so a `Location` built before the app is known is a
//! perfectly valid intermediate value.

use serde::{Deserialize, Serialize};

pub const LOCALHOST: &str = "localhost";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub graph_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty", rename = "extension_group")]
    pub group_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty", rename = "extension")]
    pub extension_name: String,
}

impl Location {
    pub fn new(
        app_uri: impl Into<String>,
        graph_id: impl Into<String>,
        group_name: impl Into<String>,
        extension_name: impl Into<String>,
    ) -> Self {
        Self {
            app_uri: app_uri.into(),
            graph_id: graph_id.into(),
            group_name: group_name.into(),
            extension_name: extension_name.into(),
        }
    }

    /// A location that addresses only an app (everything below it is a
    /// wildcard).
    pub fn for_app(app_uri: impl Into<String>) -> Self {
        Self::new(app_uri, "", "", "")
    }

    /// A location that addresses an engine (graph) within an app.
    pub fn for_engine(app_uri: impl Into<String>, graph_id: impl Into<String>) -> Self {
        Self::new(app_uri, graph_id, "", "")
    }

    pub fn for_extension(
        app_uri: impl Into<String>,
        graph_id: impl Into<String>,
        group_name: impl Into<String>,
        extension_name: impl Into<String>,
    ) -> Self {
        Self::new(app_uri, graph_id, group_name, extension_name)
    }

    pub fn is_empty(&self) -> bool {
        self.app_uri.is_empty()
            && self.graph_id.is_empty()
            && self.group_name.is_empty()
            && self.extension_name.is_empty()
    }

    /// Whether this location addresses the app itself (no graph specified).
    pub fn is_app_level(&self) -> bool {
        self.graph_id.is_empty()
    }

    /// Whether this location addresses the engine itself (graph specified,
    /// no extension group).
    pub fn is_engine_level(&self) -> bool {
        !self.graph_id.is_empty() && self.group_name.is_empty()
    }

    /// Rewrite `"localhost"` to `real_uri` if this location's `app_uri` is
    /// `"localhost"`. Called once per app-boundary crossing, never at
    /// construction time.
    pub fn normalize_localhost(&mut self, real_uri: &str) {
        if self.app_uri == LOCALHOST {
            self.app_uri = real_uri.to_string();
        }
    }

    pub fn with_localhost_normalized(mut self, real_uri: &str) -> Self {
        self.normalize_localhost(real_uri);
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.app_uri, self.graph_id, self.group_name, self.extension_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards() {
        let app = Location::for_app("app://me");
        assert!(app.is_app_level());
        assert!(!app.is_engine_level());

        let engine = Location::for_engine("app://me", "g1");
        assert!(!engine.is_app_level());
        assert!(engine.is_engine_level());

        let ext = Location::for_extension("app://me", "g1", "grp", "e1");
        assert!(!ext.is_engine_level());
    }

    #[test]
    fn localhost_rewrite_only_touches_localhost() {
        let mut loc = Location::for_extension("app://other", "g1", "grp", "e1");
        loc.normalize_localhost("app://me");
        assert_eq!(loc.app_uri, "app://other");

        let mut loc = Location::for_extension(LOCALHOST, "g1", "grp", "e1");
        loc.normalize_localhost("app://me");
        assert_eq!(loc.app_uri, "app://me");
    }

    #[test]
    fn empty_is_wildcard_everything() {
        assert!(Location::default().is_empty());
    }
}
