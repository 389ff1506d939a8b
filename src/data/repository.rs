//! Typed repositories over erased record stores.

use std::marker::PhantomData;
use std::sync::Arc;

use super::store::{RecordStore, Result};
use super::Entity;

/// In-process predicate over decoded entities.
pub type Predicate<E> = dyn Fn(&E) -> bool + Send + Sync;

/// Typed CRUD access for one entity type.
///
/// A repository is a thin serde adapter over the unit of work's cached
/// [`RecordStore`] handle; constructing one is free and does not touch the
/// store.
pub struct Repository<E: Entity> {
    records: Arc<dyn RecordStore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub(crate) fn new(records: Arc<dyn RecordStore>) -> Self {
        Self {
            records,
            _entity: PhantomData,
        }
    }

    /// The underlying erased record handle.
    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Fetch the entity with the given key.
    pub async fn get(&self, key: &E::Key) -> Result<Option<E>> {
        match self.records.get(&key.to_string()).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Fetch entities, optionally filtered and limited.
    pub async fn get_all(
        &self,
        predicate: Option<&Predicate<E>>,
        take: Option<usize>,
    ) -> Result<Vec<E>> {
        let mut out = Vec::new();
        for value in self.records.list().await? {
            let entity: E = serde_json::from_value(value)?;
            if predicate.map_or(true, |p| p(&entity)) {
                out.push(entity);
                if take.is_some_and(|n| out.len() >= n) {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Project entities through `selector`, optionally filtered and limited.
    pub async fn select<T>(
        &self,
        predicate: Option<&Predicate<E>>,
        selector: impl Fn(&E) -> T,
        take: Option<usize>,
    ) -> Result<Vec<T>> {
        let entities = self.get_all(predicate, take).await?;
        Ok(entities.iter().map(selector).collect())
    }

    /// Insert or replace one entity.
    pub async fn add(&self, entity: &E) -> Result<()> {
        self.records
            .put(&entity.key().to_string(), serde_json::to_value(entity)?)
            .await
    }

    /// Insert or replace a batch of entities.
    pub async fn add_range(&self, entities: &[E]) -> Result<()> {
        for entity in entities {
            self.add(entity).await?;
        }
        Ok(())
    }

    /// Replace one entity; last write wins.
    pub async fn update(&self, entity: &E) -> Result<()> {
        self.add(entity).await
    }

    /// Insert-or-replace a batch of entities.
    pub async fn upsert_range(&self, entities: &[E]) -> Result<()> {
        self.add_range(entities).await
    }

    /// Delete the entity with the given key.
    pub async fn delete(&self, key: &E::Key) -> Result<()> {
        self.records.delete(&key.to_string()).await
    }

    /// Delete every entity matching `predicate`.
    pub async fn delete_where(&self, predicate: &Predicate<E>) -> Result<()> {
        for value in self.records.list().await? {
            let entity: E = serde_json::from_value(value)?;
            if predicate(&entity) {
                self.records.delete(&entity.key().to_string()).await?;
            }
        }
        Ok(())
    }

    /// Count entities, optionally filtered.
    pub async fn count(&self, predicate: Option<&Predicate<E>>) -> Result<u64> {
        match predicate {
            None => self.records.count().await,
            Some(p) => {
                let mut n = 0u64;
                for value in self.records.list().await? {
                    let entity: E = serde_json::from_value(value)?;
                    if p(&entity) {
                        n += 1;
                    }
                }
                Ok(n)
            }
        }
    }
}
