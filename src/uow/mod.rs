//! Unit of work.
//!
//! A unit of work is scoped to exactly one logical operation. It owns at
//! most one open transaction against the datastore and a cache of one
//! record handle per entity type, created lazily on first request and
//! released when the unit of work is dropped.
//!
//! State machine: `Idle -> start -> InTransaction -> (commit | rollback)
//! -> Idle`. Start is idempotent; commit and rollback are no-ops when idle.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::composition::{
    Manifest, Provider, ResolveError, Scope, ServiceKey, Shared,
};
use crate::contract::{Cardinality, ContractId, Lifetime, OpenContract};
use crate::data::{Datastore, Entity, RecordStore, Repository, Result, StoreTransaction};

pub mod decorators;
mod policy;

pub use policy::TransactionPolicy;

/// Open contract for the unit of work itself.
pub const UNIT_OF_WORK: OpenContract = OpenContract::new("UnitOfWork", 0, Cardinality::Single);

/// The closed unit-of-work contract.
pub fn unit_of_work_contract() -> ContractId {
    ContractId::close(UNIT_OF_WORK, Vec::new())
}

/// Transaction-scoped session with per-entity-type repository caching.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Open a transaction if none is open. Idempotent.
    async fn start_transaction(&self) -> Result<()>;

    /// Commit the open transaction and release it. No-op when idle.
    async fn commit_transaction(&self) -> Result<()>;

    /// Roll back the open transaction and release it. No-op when idle.
    async fn rollback_transaction(&self) -> Result<()>;

    /// Whether a transaction is currently open.
    async fn in_transaction(&self) -> bool;

    /// The cached record handle for an entity type, created on first use.
    fn record_store(&self, entity: TypeId, kind: &'static str) -> Arc<dyn RecordStore>;
}

/// Typed repository access for any unit of work.
pub trait UnitOfWorkExt {
    /// The repository for entity `E`, backed by the cached per-entity-type
    /// record handle. Calling this twice in one unit of work yields
    /// repositories over the identical handle.
    fn repository<E: Entity>(&self) -> Repository<E>;
}

impl<U: UnitOfWork + ?Sized> UnitOfWorkExt for U {
    fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.record_store(TypeId::of::<E>(), E::KIND))
    }
}

type TransactionSlot = Arc<Mutex<Option<Box<dyn StoreTransaction>>>>;

/// Unit of work over a [`Datastore`] collaborator.
///
/// Each unit of work exclusively owns its transaction handle; two units of
/// work over the same datastore never share one. Dropping it releases any
/// open transaction resource unconditionally; whether that discards the
/// writes is the backend's drop semantics.
pub struct StoreUnitOfWork {
    store: Arc<dyn Datastore>,
    transaction: TransactionSlot,
    repositories: StdMutex<HashMap<TypeId, Arc<dyn RecordStore>>>,
}

impl StoreUnitOfWork {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self {
            store,
            transaction: Arc::new(Mutex::new(None)),
            repositories: StdMutex::new(HashMap::new()),
        }
    }
}

impl Drop for StoreUnitOfWork {
    fn drop(&mut self) {
        // A scoped unit of work is never contended at drop time.
        if let Ok(mut slot) = self.transaction.try_lock() {
            slot.take();
        }
    }
}

/// Record store cached by the unit of work: routes each operation through
/// the unit of work's open transaction, or directly to the datastore when
/// idle. The handle itself stays stable for the unit of work's lifetime.
struct RoutedRecords {
    kind: String,
    store: Arc<dyn Datastore>,
    transaction: TransactionSlot,
}

impl RoutedRecords {
    async fn target(&self) -> Arc<dyn RecordStore> {
        let slot = self.transaction.lock().await;
        match slot.as_ref() {
            Some(tx) => tx.records(&self.kind),
            None => self.store.records(&self.kind),
        }
    }
}

#[async_trait]
impl RecordStore for RoutedRecords {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.target().await.get(key).await
    }

    async fn put(&self, key: &str, record: Value) -> Result<()> {
        self.target().await.put(key, record).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.target().await.delete(key).await
    }

    async fn list(&self) -> Result<Vec<Value>> {
        self.target().await.list().await
    }

    async fn count(&self) -> Result<u64> {
        self.target().await.count().await
    }
}

#[async_trait]
impl UnitOfWork for StoreUnitOfWork {
    async fn start_transaction(&self) -> Result<()> {
        let mut slot = self.transaction.lock().await;
        if slot.is_none() {
            debug!("starting transaction");
            *slot = Some(self.store.begin().await?);
        }
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        if let Some(tx) = self.transaction.lock().await.take() {
            debug!("committing transaction");
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        if let Some(tx) = self.transaction.lock().await.take() {
            debug!("rolling back transaction");
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn in_transaction(&self) -> bool {
        self.transaction.lock().await.is_some()
    }

    fn record_store(&self, entity: TypeId, kind: &'static str) -> Arc<dyn RecordStore> {
        let mut repositories = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(repositories.entry(entity).or_insert_with(|| {
            Arc::new(RoutedRecords {
                kind: kind.to_string(),
                store: Arc::clone(&self.store),
                transaction: Arc::clone(&self.transaction),
            })
        }))
    }
}

impl Manifest {
    /// Register the scoped unit of work over `store`.
    pub fn unit_of_work(&mut self, store: Arc<dyn Datastore>) -> &mut Self {
        self.unit_of_work_factory(move |_scope| {
            Ok(Arc::new(StoreUnitOfWork::new(Arc::clone(&store))) as Arc<dyn UnitOfWork>)
        })
    }

    /// Register a scoped unit of work built by `factory`.
    pub fn unit_of_work_factory<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn(&Scope) -> std::result::Result<Arc<dyn UnitOfWork>, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        let provider: Provider = Arc::new(move |scope| {
            let unit_of_work = factory(scope)?;
            Ok(Arc::new(unit_of_work) as Shared)
        });
        self.service(
            ServiceKey::Contract(unit_of_work_contract()),
            Lifetime::Scoped,
            provider,
        )
    }
}

impl Scope {
    /// The scope's unit of work.
    pub fn unit_of_work(&self) -> std::result::Result<Arc<dyn UnitOfWork>, ResolveError> {
        self.resolve(&ServiceKey::Contract(unit_of_work_contract()))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::data::MemoryDatastore;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Customer {
        id: String,
    }

    impl Entity for Customer {
        type Key = String;
        const KIND: &'static str = "customers";

        fn key(&self) -> String {
            self.id.clone()
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Invoice {
        id: u64,
    }

    impl Entity for Invoice {
        type Key = u64;
        const KIND: &'static str = "invoices";

        fn key(&self) -> u64 {
            self.id
        }
    }

    fn unit_of_work() -> StoreUnitOfWork {
        StoreUnitOfWork::new(Arc::new(MemoryDatastore::new()))
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let uow = unit_of_work();
        assert!(!uow.in_transaction().await);
        uow.start_transaction().await.unwrap();
        uow.start_transaction().await.unwrap();
        assert!(uow.in_transaction().await);
    }

    #[tokio::test]
    async fn commit_resets_to_idle() {
        let uow = unit_of_work();
        uow.start_transaction().await.unwrap();
        uow.commit_transaction().await.unwrap();
        assert!(!uow.in_transaction().await);
    }

    #[tokio::test]
    async fn rollback_resets_to_idle() {
        let uow = unit_of_work();
        uow.start_transaction().await.unwrap();
        uow.rollback_transaction().await.unwrap();
        assert!(!uow.in_transaction().await);
    }

    #[tokio::test]
    async fn commit_and_rollback_while_idle_are_no_ops() {
        let uow = unit_of_work();
        uow.commit_transaction().await.unwrap();
        uow.rollback_transaction().await.unwrap();
        assert!(!uow.in_transaction().await);
    }

    #[tokio::test]
    async fn units_of_work_do_not_share_transaction_state() {
        let store = Arc::new(MemoryDatastore::new());
        let first = StoreUnitOfWork::new(store.clone());
        let second = StoreUnitOfWork::new(store);

        first.start_transaction().await.unwrap();
        assert!(first.in_transaction().await);
        assert!(!second.in_transaction().await);

        second.commit_transaction().await.unwrap();
        assert!(first.in_transaction().await);
    }

    #[tokio::test]
    async fn repository_handle_is_cached_per_entity_type() {
        let uow = unit_of_work();
        let first = uow.repository::<Customer>();
        let second = uow.repository::<Customer>();
        assert!(Arc::ptr_eq(first.records(), second.records()));

        let other = uow.repository::<Invoice>();
        assert!(!Arc::ptr_eq(first.records(), other.records()));
    }

    #[tokio::test]
    async fn rollback_discards_repository_writes() {
        let uow = unit_of_work();
        uow.start_transaction().await.unwrap();
        uow.repository::<Customer>()
            .add(&Customer { id: "c1".into() })
            .await
            .unwrap();
        uow.rollback_transaction().await.unwrap();

        let count = uow.repository::<Customer>().count(None).await.unwrap();
        assert_eq!(count, 0);
    }
}
