//! Decorator composer.
//!
//! Takes the manifest, runs the scanner, and builds the container. For each
//! contract family marked as decorated, every discovered implementation is
//! bound to wrapper-of-implementation: the raw implementation is registered
//! under its own identity, and the contract identity is registered with a
//! factory that resolves the raw implementation and hands it to the wrapper
//! as its inner dependency. Callers resolving the contract therefore always
//! get the wrapper, never the raw implementation.
//!
//! Composition runs once, single-threaded, before request processing. All
//! composition failures abort startup; nothing degrades silently.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::composition::container::{Container, ContainerBuilder, Provider, ServiceKey};
use crate::composition::manifest::Manifest;
use crate::composition::scanner::scan;
use crate::contract::OpenContract;
use crate::uow::{unit_of_work_contract, TransactionPolicy};

/// Startup-fatal composition failures.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    /// Two implementations close the same single-bound contract.
    #[error("ambiguous contract {contract}: both {first} and {second} implement it")]
    AmbiguousContract {
        contract: String,
        first: &'static str,
        second: &'static str,
    },

    /// The wrapper configured for a contract is not marked as a decorator.
    #[error("{wrapper} must be annotated as a decorator to wrap {contract}")]
    NotADecorator {
        wrapper: &'static str,
        contract: String,
    },

    /// A decorated contract has an implementation with no wrapper binding.
    #[error("no decorator binding declared for {contract}")]
    MissingBinding { contract: String },

    /// Decorated capabilities need a unit of work, but none is registered.
    #[error("decorating {contract} requires a unit-of-work registration")]
    MissingUnitOfWork { contract: String },
}

/// Startup-time composition of the manifest into a container.
pub struct Composer {
    manifest: Manifest,
    policy: TransactionPolicy,
    decorated: HashSet<OpenContract>,
}

impl Composer {
    /// Compose `manifest` under the given transaction policy.
    pub fn new(manifest: Manifest, policy: TransactionPolicy) -> Self {
        Self {
            manifest,
            policy,
            decorated: HashSet::new(),
        }
    }

    /// Mark every implementation of `contract` for transactional wrapping.
    pub fn decorate(mut self, contract: OpenContract) -> Self {
        self.decorated.insert(contract);
        self
    }

    /// Run the scanner and build the container.
    pub fn compose(self) -> Result<Arc<Container>, CompositionError> {
        let discovered = scan(&self.manifest)?;
        let mut builder = ContainerBuilder::new();

        for service in &self.manifest.services {
            builder.register(
                service.key.clone(),
                service.lifetime,
                Arc::clone(&service.provider),
            );
        }
        let has_unit_of_work =
            builder.contains(&ServiceKey::Contract(unit_of_work_contract()));

        for entry in discovered {
            let descriptor = entry.descriptor();
            let impl_key = ServiceKey::Impl(descriptor.implementation);
            builder.register(
                impl_key.clone(),
                descriptor.lifetime,
                Arc::clone(&entry.provider),
            );

            let contract_key = ServiceKey::Contract(descriptor.contract.clone());
            if !self.decorated.contains(&descriptor.contract.open()) {
                builder.register(contract_key, descriptor.lifetime, Arc::clone(&entry.provider));
                continue;
            }

            let binder = entry.binder.clone().ok_or_else(|| {
                CompositionError::MissingBinding {
                    contract: descriptor.contract.to_string(),
                }
            })?;
            if !binder.decorator {
                return Err(CompositionError::NotADecorator {
                    wrapper: binder.wrapper.name(),
                    contract: descriptor.contract.to_string(),
                });
            }
            if !has_unit_of_work {
                return Err(CompositionError::MissingUnitOfWork {
                    contract: descriptor.contract.to_string(),
                });
            }

            let enabled = self.policy.is_enabled(&descriptor.implementation);
            info!(
                contract = %descriptor.contract,
                implementation = %descriptor.implementation,
                wrapper = %binder.wrapper,
                transaction_enabled = enabled,
                "composed decorated capability"
            );

            let bind = Arc::clone(&binder.bind);
            let inner_key = impl_key.clone();
            let provider: Provider = Arc::new(move |scope| {
                let inner = scope.resolve_shared(&inner_key)?;
                bind(inner, scope, enabled)
            });
            builder.register(contract_key, descriptor.lifetime, provider);
        }

        Ok(Arc::new(builder.build()))
    }
}
