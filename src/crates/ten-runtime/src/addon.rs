//! Addon registry: four name-keyed factory stores used to instantiate the
//! leaf objects the scheduler composes.
//!
//! Grounded on `core/include_internal/ten_runtime/addon/addon.h`,
//! `addon/common/store.h` (the generic name→factory store shape reused
//! across all four kinds), and `addon_loader/addon_loader.h` (the fallback
//! chain consulted when a direct lookup misses).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Result, TenError};
use crate::extension::Extension;
use crate::extension_group::ExtensionGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Extension,
    ExtensionGroup,
    Protocol,
    AddonLoader,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Extension => "extension",
            StoreKind::ExtensionGroup => "extension_group",
            StoreKind::Protocol => "protocol",
            StoreKind::AddonLoader => "addon_loader",
        }
    }
}

/// A connection-protocol object, produced by a protocol addon. Kept
/// deliberately minimal: the wire codec itself is an external collaborator;
/// this trait is only the shape the remote layer needs.
#[async_trait]
pub trait Protocol: Send + Sync {
    async fn send_bytes(&self, bytes: Vec<u8>) -> Result<()>;
    fn uri(&self) -> &str;
}

/// Produces extension instances by addon name.
#[async_trait]
pub trait ExtensionFactory: Send + Sync {
    async fn on_create_instance(&self, instance_name: &str) -> Result<Box<dyn Extension>>;
    fn on_destroy_instance(&self, _instance: Box<dyn Extension>) {}
}

#[async_trait]
pub trait ExtensionGroupFactory: Send + Sync {
    async fn on_create_instance(&self, instance_name: &str) -> Result<Box<dyn ExtensionGroup>>;
    fn on_destroy_instance(&self, _instance: Box<dyn ExtensionGroup>) {}
}

#[async_trait]
pub trait ProtocolFactory: Send + Sync {
    async fn on_create_instance(&self, uri: &str) -> Result<Arc<dyn Protocol>>;
}

/// Consulted when a direct addon lookup misses, in registration order.
#[async_trait]
pub trait AddonLoader: Send + Sync {
    /// Attempt to materialize and register the named addon of `kind` on
    /// demand (e.g. a dynamic-library loader). Returns `Ok(true)` if it did.
    async fn try_load(&self, kind: StoreKind, addon_name: &str) -> Result<bool>;
}

struct Store<F: ?Sized> {
    factories: HashMap<String, Arc<F>>,
}

impl<F: ?Sized> Store<F> {
    fn new() -> Self {
        Self { factories: HashMap::new() }
    }
}

/// The registry: one name-keyed store per kind.
pub struct AddonRegistry {
    extensions: RwLock<Store<dyn ExtensionFactory>>,
    extension_groups: RwLock<Store<dyn ExtensionGroupFactory>>,
    protocols: RwLock<Store<dyn ProtocolFactory>>,
    loaders: RwLock<Vec<Arc<dyn AddonLoader>>>,
}

impl AddonRegistry {
    pub fn new() -> Self {
        Self {
            extensions: RwLock::new(Store::new()),
            extension_groups: RwLock::new(Store::new()),
            protocols: RwLock::new(Store::new()),
            loaders: RwLock::new(Vec::new()),
        }
    }

    /// Registration is idempotent per name: a second registration for the
    /// same name replaces the first.
    pub fn register_extension(&self, name: impl Into<String>, factory: Arc<dyn ExtensionFactory>) {
        self.extensions.write().factories.insert(name.into(), factory);
    }

    pub fn register_extension_group(&self, name: impl Into<String>, factory: Arc<dyn ExtensionGroupFactory>) {
        self.extension_groups.write().factories.insert(name.into(), factory);
    }

    pub fn register_protocol(&self, name: impl Into<String>, factory: Arc<dyn ProtocolFactory>) {
        self.protocols.write().factories.insert(name.into(), factory);
    }

    pub fn register_addon_loader(&self, loader: Arc<dyn AddonLoader>) {
        self.loaders.write().push(loader);
    }

    pub fn unregister_extension(&self, name: &str) {
        self.extensions.write().factories.remove(name);
    }

    pub fn unregister_extension_group(&self, name: &str) {
        self.extension_groups.write().factories.remove(name);
    }

    pub fn unregister_protocol(&self, name: &str) {
        self.protocols.write().factories.remove(name);
    }

    pub fn find_extension(&self, name: &str) -> Option<Arc<dyn ExtensionFactory>> {
        self.extensions.read().factories.get(name).cloned()
    }

    pub fn find_extension_group(&self, name: &str) -> Option<Arc<dyn ExtensionGroupFactory>> {
        self.extension_groups.read().factories.get(name).cloned()
    }

    pub fn find_protocol(&self, name: &str) -> Option<Arc<dyn ProtocolFactory>> {
        self.protocols.read().factories.get(name).cloned()
    }

    pub fn del_all(&self) {
        self.extensions.write().factories.clear();
        self.extension_groups.write().factories.clear();
        self.protocols.write().factories.clear();
        self.loaders.write().clear();
    }

    /// Consult registered addon-loaders, in order, for `addon_name` of
    /// `kind` not found by direct lookup.
    async fn try_loaders(&self, kind: StoreKind, addon_name: &str) -> Result<bool> {
        let loaders: Vec<_> = self.loaders.read().clone();
        for loader in loaders {
            if loader.try_load(kind, addon_name).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Asynchronous instantiation for an extension addon: direct lookup,
    /// then addon-loader fallback, surfacing an error if both miss.
    pub async fn create_extension_instance(
        &self,
        addon_name: &str,
        instance_name: &str,
    ) -> Result<Box<dyn Extension>> {
        if self.find_extension(addon_name).is_none() && !self.try_loaders(StoreKind::Extension, addon_name).await? {
            return Err(TenError::AddonNotFound(addon_name.to_string(), "extension"));
        }
        let factory = self
            .find_extension(addon_name)
            .ok_or_else(|| TenError::AddonNotFound(addon_name.to_string(), "extension"))?;
        factory.on_create_instance(instance_name).await
    }

    pub async fn create_extension_group_instance(
        &self,
        addon_name: &str,
        instance_name: &str,
    ) -> Result<Box<dyn ExtensionGroup>> {
        if self.find_extension_group(addon_name).is_none()
            && !self.try_loaders(StoreKind::ExtensionGroup, addon_name).await?
        {
            return Err(TenError::AddonNotFound(addon_name.to_string(), "extension_group"));
        }
        let factory = self
            .find_extension_group(addon_name)
            .ok_or_else(|| TenError::AddonNotFound(addon_name.to_string(), "extension_group"))?;
        factory.on_create_instance(instance_name).await
    }

    pub async fn create_protocol_instance(&self, addon_name: &str, uri: &str) -> Result<Arc<dyn Protocol>> {
        if self.find_protocol(addon_name).is_none() && !self.try_loaders(StoreKind::Protocol, addon_name).await? {
            return Err(TenError::AddonNotFound(addon_name.to_string(), "protocol"));
        }
        let factory = self
            .find_protocol(addon_name)
            .ok_or_else(|| TenError::AddonNotFound(addon_name.to_string(), "protocol"))?;
        factory.on_create_instance(uri).await
    }
}

impl Default for AddonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{Extension, ExtensionCtx};
    use crate::msg::Message;

    struct EchoExtension;

    #[async_trait]
    impl Extension for EchoExtension {
        async fn on_cmd(&mut self, ctx: &mut ExtensionCtx, cmd: Message) -> Result<()> {
            let cmd_id = cmd.cmd_id.clone().unwrap_or_default();
            ctx.return_result(Message::ok_result(cmd_id, "pong"));
            Ok(())
        }
    }

    struct EchoFactory;

    #[async_trait]
    impl ExtensionFactory for EchoFactory {
        async fn on_create_instance(&self, _instance_name: &str) -> Result<Box<dyn Extension>> {
            Ok(Box::new(EchoExtension))
        }
    }

    #[tokio::test]
    async fn registers_and_instantiates_by_name() {
        let registry = AddonRegistry::new();
        registry.register_extension("echo", Arc::new(EchoFactory));
        let instance = registry.create_extension_instance("echo", "e1").await;
        assert!(instance.is_ok());
    }

    #[tokio::test]
    async fn missing_addon_surfaces_not_found_after_loader_fallback() {
        let registry = AddonRegistry::new();
        let err = registry.create_extension_instance("missing", "e1").await.unwrap_err();
        assert!(matches!(err, TenError::AddonNotFound(_, "extension")));
    }

    #[test]
    fn re_registering_same_name_replaces_factory() {
        let registry = AddonRegistry::new();
        registry.register_extension("echo", Arc::new(EchoFactory));
        registry.register_extension("echo", Arc::new(EchoFactory));
        assert!(registry.find_extension("echo").is_some());
    }
}
