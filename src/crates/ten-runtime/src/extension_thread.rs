//! `ExtensionThread`: one OS thread, one runloop, one extension-group
//! instance, and 0..N extensions of that group.
//!
//! Grounded on `core/src/ten_runtime/extension_thread/extension_thread.c`
//! and its `on_xxx.c` siblings for the state machine and the
//! `handle_start_msg_task`/close sequencing; the bounded-queue drops the
//! oldest data-like message under backpressure rather than blocking.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::addon::AddonRegistry;
use crate::error::Result;
use crate::extension::{Extension, ExtensionHost, ExtensionState};
use crate::extension_group::{ExtensionGroupHost, ExtensionGroupState};
use crate::location::Location;
use crate::msg::Message;

/// Bounded in-queue capacity. Overfull: data-like messages are dropped
/// with a warning; commands/cmd_results are never dropped.
pub const IN_QUEUE_CAPACITY: usize = 12_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionThreadState {
    Init,
    CreatingExtensions,
    Normal,
    PrepareToClose,
    Closed,
}

/// Outcome of a single dispatched message, reported to whoever drains the
/// thread's outbox (normally the `Engine`/`ExtensionContext`).
pub enum ThreadOutbound {
    /// An extension wants `msg` routed to `dest`; the thread itself only
    /// decides same-group-vs-elsewhere, leaving the actual cross-group/
    /// cross-engine/cross-app routing to the caller.
    Route { dest: Location, msg: Message },
    Closed { thread_name: String },
}

pub struct ExtensionThreadHandle {
    pub in_tx: mpsc::Sender<Message>,
    pub name: String,
}

impl ExtensionThreadHandle {
    /// Enqueue `msg`. Data-like messages are dropped (with a warning) if the
    /// bounded queue is full; commands/cmd_results block the caller briefly
    /// via `send` rather than being silently lost.
    pub async fn post(&self, msg: Message) {
        if msg.is_data_like() {
            if let Err(mpsc::error::TrySendError::Full(_)) = self.in_tx.try_send(msg) {
                warn!(thread = %self.name, "in-queue full, dropping data-like message");
            }
        } else {
            let name = self.name.clone();
            if self.in_tx.send(msg).await.is_err() {
                warn!(thread = %name, "in-queue closed, command message lost");
            }
        }
    }
}

/// The group plus its extensions, run on a dedicated runloop.
pub struct ExtensionThread {
    pub name: String,
    pub state: ExtensionThreadState,
    pub group: ExtensionGroupHost,
    pub extensions: HashMap<String, ExtensionHost>,
    pending_msgs: Vec<Message>,
    pub lock_mode_lock: Arc<Mutex<()>>,
    in_rx: mpsc::Receiver<Message>,
    outbound_tx: mpsc::UnboundedSender<ThreadOutbound>,
}

impl ExtensionThread {
    pub fn spawn(
        name: impl Into<String>,
        group: ExtensionGroupHost,
    ) -> (ExtensionThreadHandle, mpsc::UnboundedReceiver<ThreadOutbound>, Self) {
        let name = name.into();
        let (in_tx, in_rx) = mpsc::channel(IN_QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let thread = Self {
            name: name.clone(),
            state: ExtensionThreadState::Init,
            group,
            extensions: HashMap::new(),
            pending_msgs: Vec::new(),
            lock_mode_lock: Arc::new(Mutex::new(())),
            in_rx,
            outbound_tx,
        };
        (ExtensionThreadHandle { in_tx, name }, outbound_rx, thread)
    }

    /// `handle_start_msg_task`: load manifest/property, init the group,
    /// instantiate its extensions via the registry, run each extension's
    /// configure/init/start in order, then drain whatever arrived while we
    /// were still starting.
    pub async fn handle_start(&mut self, registry: &AddonRegistry, loc_for: impl Fn(&str) -> Location) -> Result<()> {
        let _guard = tooling::logging::LogGuard::new(format!("extension_thread[{}]::start", self.name));
        self.state = ExtensionThreadState::CreatingExtensions;

        self.group
            .instance
            .on_configure(&self.group.manifest, &self.group.property)
            .await?;
        self.group.state = ExtensionGroupState::Init;
        self.group.instance.on_init().await?;

        for spec in self.group.instance.extension_specs() {
            let instance: Box<dyn Extension> = registry
                .create_extension_instance(&spec.addon_name, &spec.instance_name)
                .await?;
            let loc = loc_for(&spec.instance_name);
            let mut host = ExtensionHost::new(spec.instance_name.clone(), loc, instance);

            host.state = ExtensionState::OnConfigure;
            host.instance.on_configure(&mut host.ctx).await?;
            host.state = ExtensionState::OnConfigureDone;

            host.state = ExtensionState::OnInit;
            host.instance.on_init(&mut host.ctx).await?;
            host.state = ExtensionState::OnInitDone;

            host.state = ExtensionState::OnStart;
            host.instance.on_start(&mut host.ctx).await?;
            host.state = ExtensionState::OnStartDone;

            self.extensions.insert(spec.instance_name, host);
        }

        self.state = ExtensionThreadState::Normal;
        self.replay_pending().await?;
        Ok(())
    }

    async fn replay_pending(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_msgs);
        for msg in pending {
            self.handle_inbound(msg).await?;
        }
        Ok(())
    }

    /// Route a single inbound message.
    pub async fn handle_inbound(&mut self, msg: Message) -> Result<()> {
        match self.state {
            ExtensionThreadState::Init | ExtensionThreadState::CreatingExtensions => {
                self.pending_msgs.push(msg);
                return Ok(());
            }
            ExtensionThreadState::Closed => {
                debug!(thread = %self.name, "dropping message, thread closed");
                return Ok(());
            }
            ExtensionThreadState::Normal | ExtensionThreadState::PrepareToClose => {}
        }

        let dest = msg.sole_dest()?;
        let target_name = dest.extension_name.clone();

        let Some(host) = self.extensions.get_mut(&target_name) else {
            if msg.is_command_like() {
                let cmd_id = msg.cmd_id.clone().unwrap_or_default();
                let err = Message::error_result(cmd_id, format!("The extension[{target_name}] is invalid."));
                let _ = self.outbound_tx.send(ThreadOutbound::Route { dest: msg.src.clone(), msg: err });
            }
            return Ok(());
        };

        host.dispatch(msg).await?;
        for out in host.ctx.drain_outbox() {
            let crate::extension::OutboundMessage::ToDest(m) = out;
            let dest = m.sole_dest()?.clone();
            self.route_outbound(dest, m);
        }
        Ok(())
    }

    /// Outbound-routing table: same group dispatches inline (handled by the
    /// caller re-feeding `handle_inbound`); everything else is reported
    /// upward via `outbound_tx` for the engine/app to route.
    fn route_outbound(&mut self, dest: Location, msg: Message) {
        let _ = self.outbound_tx.send(ThreadOutbound::Route { dest, msg });
    }

    /// Enter `PrepareToClose`, stop every extension, then deinit the group
    /// and report closed.
    pub async fn trigger_close(&mut self) -> Result<()> {
        self.state = ExtensionThreadState::PrepareToClose;
        for host in self.extensions.values_mut() {
            host.state = ExtensionState::OnStop;
            host.instance.on_stop(&mut host.ctx).await?;
            host.state = ExtensionState::OnStopDone;
        }
        for host in self.extensions.values_mut() {
            host.state = ExtensionState::OnDeinit;
            host.instance.on_deinit(&mut host.ctx).await?;
            host.state = ExtensionState::OnDeinitDone;
        }

        self.group.state = ExtensionGroupState::Deiniting;
        self.group.instance.on_deinit().await?;
        self.group.state = ExtensionGroupState::Deinitted;

        self.state = ExtensionThreadState::Closed;
        let _ = self.outbound_tx.send(ThreadOutbound::Closed { thread_name: self.name.clone() });
        Ok(())
    }

    /// Drive the thread's own runloop: receive from the in-queue until the
    /// channel closes (dropped handle) or close has completed.
    pub async fn run(&mut self) {
        while let Some(msg) = self.in_rx.recv().await {
            if let Err(e) = self.handle_inbound(msg).await {
                warn!(thread = %self.name, error = %e, "error handling inbound message");
            }
            if self.state == ExtensionThreadState::Closed {
                break;
            }
        }
    }
}
