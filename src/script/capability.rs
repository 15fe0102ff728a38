//! Host capability registration contract
//!
//! A capability installs host functions and constants into a session's
//! global namespace. Capabilities are independent of each other, so the
//! order they are registered in must not matter; claiming a name that
//! another capability already owns is a registration error.

use rhai::{Dynamic, Engine, Scope};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::context::SessionContext;

/// Capability registration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("capability '{capability}' cannot claim '{name}': already registered by '{owner}'")]
    NameConflict {
        capability: String,
        name: String,
        owner: String,
    },

    #[error("capability '{capability}' failed to register: {reason}")]
    Registration { capability: String, reason: String },
}

impl CapabilityError {
    pub fn registration(capability: impl Into<String>, reason: impl ToString) -> Self {
        CapabilityError::Registration {
            capability: capability.into(),
            reason: reason.to_string(),
        }
    }
}

/// A host capability exposed to scripts
pub trait Capability: Send + Sync {
    /// Unique capability name
    fn name(&self) -> &'static str;

    /// Global names this capability installs, for listings and conflicts
    fn exports(&self) -> &'static [&'static str];

    /// Install the capability into the namespace
    fn register(&self, ns: &mut Namespace<'_>) -> Result<(), CapabilityError>;
}

/// Mutable view of one session's global namespace
pub struct Namespace<'a> {
    engine: &'a mut Engine,
    scope: &'a mut Scope<'static>,
    context: &'a SessionContext,
    owners: &'a mut HashMap<String, String>,
    current: String,
}

impl<'a> Namespace<'a> {
    pub(crate) fn new(
        engine: &'a mut Engine,
        scope: &'a mut Scope<'static>,
        context: &'a SessionContext,
        owners: &'a mut HashMap<String, String>,
    ) -> Self {
        Self {
            engine,
            scope,
            context,
            owners,
            current: String::new(),
        }
    }

    pub(crate) fn set_owner(&mut self, owner: &str) {
        self.current = owner.to_string();
    }

    /// Reserve global names for the capability being registered
    pub fn claim(&mut self, names: &[&str]) -> Result<(), CapabilityError> {
        for name in names {
            match self.owners.get(*name) {
                Some(owner) if *owner != self.current => {
                    return Err(CapabilityError::NameConflict {
                        capability: self.current.clone(),
                        name: (*name).to_string(),
                        owner: owner.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    self.owners.insert((*name).to_string(), self.current.clone());
                }
            }
        }
        Ok(())
    }

    pub fn engine(&mut self) -> &mut Engine {
        self.engine
    }

    /// Define a read-only global visible to top-level script statements
    pub fn set_constant(
        &mut self,
        name: &str,
        value: impl Into<Dynamic>,
    ) -> Result<(), CapabilityError> {
        self.claim(&[name])?;
        self.scope.push_constant_dynamic(name.to_string(), value.into());
        Ok(())
    }

    pub fn context(&self) -> &SessionContext {
        self.context
    }
}

/// Injected set of capabilities installed into every session
#[derive(Clone, Default)]
pub struct CapabilitySet {
    items: Vec<Arc<dyn Capability>>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: impl Capability + 'static) -> Self {
        self.items.push(Arc::new(capability));
        self
    }

    pub fn push(&mut self, capability: Arc<dyn Capability>) {
        self.items.push(capability);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Capability>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Register every capability into the namespace, stopping at the first
    /// failure.
    pub fn register_all(&self, ns: &mut Namespace<'_>) -> Result<(), CapabilityError> {
        for capability in &self.items {
            ns.set_owner(capability.name());
            ns.claim(capability.exports())?;
            capability.register(ns)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.items.iter().map(|c| c.name()))
            .finish()
    }
}
