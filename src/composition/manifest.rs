//! The capability manifest.
//!
//! The manifest is the explicit registration table the application author
//! writes at startup: every capability implementation and ambient service is
//! declared here, keyed by contract identity. It replaces any scanning of
//! the live process image; what the hosting runtime would enumerate by
//! introspection, the author states once, ahead of composition.
//!
//! Family modules extend `Manifest` with typed registration methods
//! (`command_handler`, `query_handler`, `step`, `unit_of_work`, `cache`);
//! this module owns only the erased entry model.

use std::fmt;
use std::sync::Arc;

use crate::composition::container::{Provider, ResolveError, Scope, Shared};
use crate::contract::{CapabilityDescriptor, ImplId, Lifetime};

use super::container::ServiceKey;

/// Closes an open wrapper type over one discovered implementation.
///
/// Arguments are the resolved raw implementation, the scope it was resolved
/// from, and whether transactions are enabled for it.
pub type BindFn = Arc<dyn Fn(Shared, &Scope, bool) -> Result<Shared, ResolveError> + Send + Sync>;

/// Decorator metadata and binding for one capability family.
///
/// The `decorator` flag is the wrapper's metadata; the composer refuses to
/// apply a binding whose wrapper is not marked as a decorator.
#[derive(Clone)]
pub struct DecoratorBinder {
    pub(crate) wrapper: ImplId,
    pub(crate) decorator: bool,
    pub(crate) bind: BindFn,
}

impl DecoratorBinder {
    /// Bind `wrapper` with the given metadata and closing function.
    pub fn new(wrapper: ImplId, decorator: bool, bind: BindFn) -> Self {
        Self {
            wrapper,
            decorator,
            bind,
        }
    }

    /// The wrapper's implementation identity.
    pub fn wrapper(&self) -> ImplId {
        self.wrapper
    }

    /// The same binding with the decorator flag cleared.
    pub fn unannotated(self) -> Self {
        Self {
            decorator: false,
            ..self
        }
    }
}

/// One declared capability implementation.
pub struct CapabilityEntry {
    pub(crate) descriptor: CapabilityDescriptor,
    pub(crate) provider: Provider,
    pub(crate) binder: Option<DecoratorBinder>,
}

impl CapabilityEntry {
    /// The entry's descriptor.
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }
}

impl fmt::Debug for CapabilityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// One ambient (non-capability) service registration, e.g. the unit of work
/// or a cache.
pub(crate) struct ServiceEntry {
    pub(crate) key: ServiceKey,
    pub(crate) lifetime: Lifetime,
    pub(crate) provider: Provider,
}

/// The startup-time registration table.
#[derive(Default)]
pub struct Manifest {
    pub(crate) capabilities: Vec<CapabilityEntry>,
    pub(crate) services: Vec<ServiceEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a capability implementation.
    ///
    /// Family modules provide typed front-ends for this; it is public so
    /// applications with unusual wiring can declare entries directly.
    pub fn capability(
        &mut self,
        descriptor: CapabilityDescriptor,
        provider: Provider,
        binder: Option<DecoratorBinder>,
    ) -> &mut Self {
        tracing::debug!(
            contract = %descriptor.contract,
            implementation = %descriptor.implementation,
            decorator = descriptor.decorator,
            "declared capability"
        );
        self.capabilities.push(CapabilityEntry {
            descriptor,
            provider,
            binder,
        });
        self
    }

    /// Declare an ambient service under an explicit key.
    pub fn service(&mut self, key: ServiceKey, lifetime: Lifetime, provider: Provider) -> &mut Self {
        tracing::debug!(key = %key, "declared service");
        self.services.push(ServiceEntry {
            key,
            lifetime,
            provider,
        });
        self
    }

    /// Declared capability entries, in declaration order.
    pub fn capabilities(&self) -> impl Iterator<Item = &CapabilityEntry> {
        self.capabilities.iter()
    }

    /// Whether an ambient service is declared under `key`.
    pub fn has_service(&self, key: &ServiceKey) -> bool {
        self.services.iter().any(|s| &s.key == key)
    }
}
