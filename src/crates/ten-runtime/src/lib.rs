//! `ten-runtime` — the in-process graph scheduler and message router: the
//! App → Engine → ExtensionContext → ExtensionThread → Extension lifecycle
//! hierarchy, the message dispatcher, the remote layer, and the addon
//! registry that instantiates the leaves the scheduler composes.
//!
//! Any particular wire codec, language binding, schema language, or
//! telemetry sink is an external collaborator; this crate defines the
//! trait surface they plug into and nothing more.

pub mod addon;
pub mod app;
pub mod cmd;
pub mod engine;
pub mod error;
pub mod extension;
pub mod extension_context;
pub mod extension_group;
pub mod extension_thread;
pub mod graph_def;
pub mod location;
pub mod msg;
pub mod remote;
pub mod runloop;
pub mod thread_check;
pub mod value;

pub use error::{Result, TenError};
pub use location::Location;
pub use msg::{Message, MsgType, StatusCode};
pub use value::Value;
