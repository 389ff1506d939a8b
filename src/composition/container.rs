//! Registration container with identity-keyed resolution.
//!
//! The container is the narrow surface the composition layer needs: register
//! by identity, resolve by identity, scoped construction. It is deliberately
//! not a general DI container; there is no cyclic-resolution detection and no
//! disposal graph.
//!
//! After [`ContainerBuilder::build`] the registration table is immutable and
//! safe for concurrent resolution from any number of scopes.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::contract::{ContractId, ImplId, Lifetime};

/// A type-erased service instance.
///
/// The erased value is the service handle itself (e.g. an
/// `Arc<dyn CommandHandler<C>>`), so resolution clones the handle rather
/// than the service.
pub type Shared = Arc<dyn Any + Send + Sync>;

/// Builds one service instance within a scope.
pub type Provider = Arc<dyn Fn(&Scope) -> Result<Shared, ResolveError> + Send + Sync>;

/// Identity a registration is stored under.
///
/// Contract keys are the visible surface: dispatch and pipelines resolve
/// through them. Implementation keys exist so a decorator's factory can
/// reach the raw implementation it wraps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    Contract(ContractId),
    Impl(ImplId),
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKey::Contract(id) => write!(f, "{id}"),
            ServiceKey::Impl(id) => write!(f, "{id}"),
        }
    }
}

/// Resolution failures.
///
/// These are operation-fatal configuration errors, distinct from any error
/// a resolved service later produces.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no registration for {0}")]
    Unregistered(String),

    #[error("registration for {key} is not the requested type (expected {expected})")]
    TypeMismatch {
        key: String,
        expected: &'static str,
    },
}

struct Registration {
    lifetime: Lifetime,
    provider: Provider,
}

/// Mutable registration table used during composition.
#[derive(Default)]
pub struct ContainerBuilder {
    registrations: HashMap<ServiceKey, Vec<Registration>>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration under `key`. Multiple registrations under one
    /// key form a multi-binding resolved with [`Scope::resolve_all`].
    pub fn register(&mut self, key: ServiceKey, lifetime: Lifetime, provider: Provider) {
        self.registrations
            .entry(key)
            .or_default()
            .push(Registration { lifetime, provider });
    }

    /// Whether any registration exists under `key`.
    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.registrations.contains_key(key)
    }

    /// Freeze the table.
    pub fn build(self) -> Container {
        Container {
            registrations: self.registrations,
            singletons: Mutex::new(HashMap::new()),
        }
    }
}

/// Immutable registration table, shared by all scopes.
pub struct Container {
    registrations: HashMap<ServiceKey, Vec<Registration>>,
    singletons: Mutex<HashMap<ServiceKey, Vec<Shared>>>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.registrations.len())
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Whether any registration exists under `key`.
    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.registrations.contains_key(key)
    }

    /// Open a new scope for one logical operation.
    pub fn scope(self: &Arc<Self>) -> Scope {
        Scope {
            container: Arc::clone(self),
            scoped: Mutex::new(HashMap::new()),
        }
    }
}

/// Resolution scope for one logical operation.
///
/// Scoped services are constructed once per scope; a scope must not be
/// shared across concurrent operations.
pub struct Scope {
    container: Arc<Container>,
    scoped: Mutex<HashMap<ServiceKey, Vec<Shared>>>,
}

impl Scope {
    /// Resolve the single service registered under `key`.
    pub fn resolve<T>(&self, key: &ServiceKey) -> Result<T, ResolveError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let shared = self.resolve_shared(key)?;
        downcast::<T>(key, &shared)
    }

    /// Resolve every service registered under `key`, in registration order.
    ///
    /// An absent key yields an empty vector: a contract with no
    /// implementations is not an error for multi-bound families.
    pub fn resolve_all<T>(&self, key: &ServiceKey) -> Result<Vec<T>, ResolveError>
    where
        T: Clone + Send + Sync + 'static,
    {
        if !self.container.contains(key) {
            return Ok(Vec::new());
        }
        self.resolve_all_shared(key)?
            .iter()
            .map(|shared| downcast::<T>(key, shared))
            .collect()
    }

    /// Resolve the single registration under `key` without downcasting.
    pub fn resolve_shared(&self, key: &ServiceKey) -> Result<Shared, ResolveError> {
        self.resolve_all_shared(key)?
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::Unregistered(key.to_string()))
    }

    fn resolve_all_shared(&self, key: &ServiceKey) -> Result<Vec<Shared>, ResolveError> {
        let regs = self
            .container
            .registrations
            .get(key)
            .ok_or_else(|| ResolveError::Unregistered(key.to_string()))?;

        // Lifetime caches are checked and released before providers run so a
        // provider may itself resolve other services from the same scope.
        let lifetime = regs.first().map(|r| r.lifetime).unwrap_or_default();
        match lifetime {
            Lifetime::Transient => self.build_all(key, regs),
            Lifetime::Scoped => {
                if let Some(cached) = lock(&self.scoped).get(key) {
                    return Ok(cached.clone());
                }
                let built = self.build_all(key, regs)?;
                lock(&self.scoped)
                    .entry(key.clone())
                    .or_insert_with(|| built.clone());
                Ok(built)
            }
            Lifetime::Singleton => {
                if let Some(cached) = lock(&self.container.singletons).get(key) {
                    return Ok(cached.clone());
                }
                let built = self.build_all(key, regs)?;
                Ok(lock(&self.container.singletons)
                    .entry(key.clone())
                    .or_insert_with(|| built.clone())
                    .clone())
            }
        }
    }

    fn build_all(
        &self,
        key: &ServiceKey,
        regs: &[Registration],
    ) -> Result<Vec<Shared>, ResolveError> {
        tracing::trace!(key = %key, count = regs.len(), "building registrations");
        regs.iter().map(|r| (r.provider)(self)).collect()
    }
}

fn downcast<T>(key: &ServiceKey, shared: &Shared) -> Result<T, ResolveError>
where
    T: Clone + Send + Sync + 'static,
{
    shared
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| ResolveError::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
        })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
