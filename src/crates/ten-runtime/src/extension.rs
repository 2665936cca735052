//! `Extension`: the user's message-handling unit.
//!
//! Grounded on `core/include_internal/ten_runtime/extension/msg_handling.h`
//! for the `on_<kind>` callback shape and on an owned-state-per-node
//! pattern: an extension owns its property bag, schema store, and path
//! table outright, for its whole lifetime except the narrow instantiation
//! handoff.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::location::Location;
use crate::msg::conversion::ConversionTable;
use crate::msg::path_table::PathTable;
use crate::msg::Message;
use crate::thread_check::{ThreadChecked, ThreadCheck};
use crate::value::schema::SchemaStore;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionState {
    Init,
    OnConfigure,
    OnConfigureDone,
    OnInit,
    OnInitDone,
    OnStart,
    OnStartDone,
    OnStop,
    OnStopDone,
    OnDeinit,
    OnDeinitDone,
    Closing,
}

/// Per-extension outbound mailbox and state, handed to every `on_*`
/// callback so the extension can reply or forward without holding a
/// reference back into its owning `ExtensionThread`.
pub struct ExtensionCtx {
    pub name: String,
    pub loc: Location,
    pub properties: Value,
    pub schema_store: SchemaStore,
    pub path_table: PathTable,
    pub conversions: ConversionTable,
    pub default_cmd_ttl: Duration,
    outbox: Vec<OutboundMessage>,
}

/// A message an extension wants sent somewhere, queued during an `on_*`
/// call and drained by the owning `ExtensionThread` afterward.
pub enum OutboundMessage {
    ToDest(Message),
}

impl ExtensionCtx {
    pub fn new(name: impl Into<String>, loc: Location) -> Self {
        Self {
            name: name.into(),
            loc,
            properties: Value::object(),
            schema_store: SchemaStore::new(),
            path_table: PathTable::new(),
            conversions: ConversionTable::new(),
            default_cmd_ttl: Duration::from_secs(10),
            outbox: Vec::new(),
        }
    }

    /// Queue `result` for delivery back along the command's path.
    pub fn return_result(&mut self, result: Message) {
        self.outbox.push(OutboundMessage::ToDest(result));
    }

    /// Queue `msg` to be routed to `dest` by the extension thread.
    pub fn send_to(&mut self, dest: Location, mut msg: Message) {
        msg.clear_and_set_dest(dest);
        self.outbox.push(OutboundMessage::ToDest(msg));
    }

    pub fn drain_outbox(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.outbox)
    }
}

/// The callbacks an extension implements. Every method has a default no-op
/// so an implementor only overrides what it needs, matching how lightly
/// most graph nodes in the corpus implement their lifecycle hooks.
#[async_trait]
pub trait Extension: Send {
    async fn on_configure(&mut self, _ctx: &mut ExtensionCtx) -> Result<()> {
        Ok(())
    }
    async fn on_init(&mut self, _ctx: &mut ExtensionCtx) -> Result<()> {
        Ok(())
    }
    async fn on_start(&mut self, _ctx: &mut ExtensionCtx) -> Result<()> {
        Ok(())
    }
    async fn on_stop(&mut self, _ctx: &mut ExtensionCtx) -> Result<()> {
        Ok(())
    }
    async fn on_deinit(&mut self, _ctx: &mut ExtensionCtx) -> Result<()> {
        Ok(())
    }

    async fn on_cmd(&mut self, _ctx: &mut ExtensionCtx, _cmd: Message) -> Result<()> {
        Ok(())
    }
    async fn on_cmd_result(&mut self, _ctx: &mut ExtensionCtx, _result: Message) -> Result<()> {
        Ok(())
    }
    async fn on_data(&mut self, _ctx: &mut ExtensionCtx, _data: Message) -> Result<()> {
        Ok(())
    }
    async fn on_audio_frame(&mut self, _ctx: &mut ExtensionCtx, _frame: Message) -> Result<()> {
        Ok(())
    }
    async fn on_video_frame(&mut self, _ctx: &mut ExtensionCtx, _frame: Message) -> Result<()> {
        Ok(())
    }
}

/// Owns one `Extension` plus its state machine, property/schema/path
/// context, and thread-ownership binding. Lives entirely on one
/// `ExtensionThread` except during creation.
pub struct ExtensionHost {
    pub instance: Box<dyn Extension>,
    pub ctx: ExtensionCtx,
    pub state: ExtensionState,
    thread_check: ThreadCheck,
}

impl ExtensionHost {
    pub fn new(name: impl Into<String>, loc: Location, instance: Box<dyn Extension>) -> Self {
        Self {
            instance,
            ctx: ExtensionCtx::new(name, loc),
            state: ExtensionState::Init,
            thread_check: ThreadCheck::new_unbound(),
        }
    }

    pub async fn dispatch(&mut self, msg: Message) -> Result<()> {
        self.check_integrity()?;
        match msg.msg_type {
            crate::msg::MsgType::Cmd => self.instance.on_cmd(&mut self.ctx, msg).await,
            crate::msg::MsgType::CmdResult => self.instance.on_cmd_result(&mut self.ctx, msg).await,
            crate::msg::MsgType::Data => self.instance.on_data(&mut self.ctx, msg).await,
            crate::msg::MsgType::AudioFrame => self.instance.on_audio_frame(&mut self.ctx, msg).await,
            crate::msg::MsgType::VideoFrame => self.instance.on_video_frame(&mut self.ctx, msg).await,
        }
    }
}

impl ThreadChecked for ExtensionHost {
    fn thread_check(&self) -> &ThreadCheck {
        &self.thread_check
    }
}
