//! `ExtensionGroup`: metadata and factory hooks that produce the set of
//! extensions belonging to one `ExtensionThread`.
//!
//! Grounded on `core/include_internal/ten_runtime/extension_group/
//! extension_group.h`.

use async_trait::async_trait;

use crate::error::Result;
use crate::extension::Extension;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionGroupState {
    Init,
    Deiniting,
    Deinitted,
}

/// One named extension spec the group is asked to instantiate: the addon
/// name to look up in the registry, and the instance name it should be
/// given.
#[derive(Debug, Clone)]
pub struct ExtensionSpec {
    pub addon_name: String,
    pub instance_name: String,
}

#[async_trait]
pub trait ExtensionGroup: Send {
    async fn on_configure(&mut self, _manifest: &Value, _property: &Value) -> Result<()> {
        Ok(())
    }
    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_deinit(&mut self) -> Result<()> {
        Ok(())
    }

    /// The extensions this group composes. Returning the `ExtensionSpec`
    /// list (rather than instantiating directly) lets the caller go through
    /// the addon registry's async instantiation path uniformly.
    fn extension_specs(&self) -> Vec<ExtensionSpec>;

    fn on_destroy_extensions(&mut self, _extensions: Vec<Box<dyn Extension>>) {}
}

pub struct ExtensionGroupHost {
    pub name: String,
    pub instance: Box<dyn ExtensionGroup>,
    pub state: ExtensionGroupState,
    pub manifest: Value,
    pub property: Value,
}

impl ExtensionGroupHost {
    pub fn new(name: impl Into<String>, instance: Box<dyn ExtensionGroup>) -> Self {
        Self {
            name: name.into(),
            instance,
            state: ExtensionGroupState::Init,
            manifest: Value::object(),
            property: Value::object(),
        }
    }
}
