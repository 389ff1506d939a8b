//! SQLite datastore over sqlx.
//!
//! Records are JSON documents in a single `records` table keyed by
//! (kind, id). Each [`Datastore::begin`] call checks out its own pool
//! connection and returns a handle that exclusively owns that transaction;
//! record stores obtained from the handle execute on it, record stores
//! obtained from the datastore execute directly on the pool. Dropping an
//! uncommitted handle rolls the transaction back (sqlx drop semantics).

use std::sync::Arc;

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use serde_json::Value;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use super::schema::{Records, CREATE_RECORDS_TABLE};
use super::store::{Datastore, RecordStore, Result, StoreTransaction};

type TxSlot = Arc<Mutex<Option<Transaction<'static, Sqlite>>>>;

/// SQLite implementation of [`Datastore`].
pub struct SqliteDatastore {
    pool: SqlitePool,
}

impl SqliteDatastore {
    /// Create a new SQLite datastore.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_RECORDS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Datastore for SqliteDatastore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        debug!("sqlite transaction started");
        Ok(Box::new(SqliteTransactionHandle {
            pool: self.pool.clone(),
            slot: Arc::new(Mutex::new(Some(tx))),
        }))
    }

    fn records(&self, kind: &str) -> Arc<dyn RecordStore> {
        Arc::new(SqliteRecords {
            kind: kind.to_string(),
            pool: self.pool.clone(),
            transaction: None,
        })
    }
}

struct SqliteTransactionHandle {
    pool: SqlitePool,
    slot: TxSlot,
}

#[async_trait]
impl StoreTransaction for SqliteTransactionHandle {
    async fn commit(self: Box<Self>) -> Result<()> {
        if let Some(tx) = self.slot.lock().await.take() {
            tx.commit().await?;
            debug!("sqlite transaction committed");
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        if let Some(tx) = self.slot.lock().await.take() {
            tx.rollback().await?;
            debug!("sqlite transaction rolled back");
        }
        Ok(())
    }

    fn records(&self, kind: &str) -> Arc<dyn RecordStore> {
        Arc::new(SqliteRecords {
            kind: kind.to_string(),
            pool: self.pool.clone(),
            transaction: Some(Arc::clone(&self.slot)),
        })
    }
}

struct SqliteRecords {
    kind: String,
    pool: SqlitePool,
    transaction: Option<TxSlot>,
}

impl SqliteRecords {
    /// Execute a statement on the owning transaction if it is still open,
    /// otherwise directly on the pool.
    async fn execute(&self, sql: &str) -> Result<()> {
        if let Some(slot) = &self.transaction {
            let mut guard = slot.lock().await;
            if let Some(tx) = guard.as_mut() {
                sqlx::query(sql).execute(&mut **tx).await?;
                return Ok(());
            }
        }
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_bodies(&self, sql: &str) -> Result<Vec<String>> {
        let rows = if let Some(slot) = &self.transaction {
            let mut guard = slot.lock().await;
            match guard.as_mut() {
                Some(tx) => sqlx::query(sql).fetch_all(&mut **tx).await?,
                None => sqlx::query(sql).fetch_all(&self.pool).await?,
            }
        } else {
            sqlx::query(sql).fetch_all(&self.pool).await?
        };
        Ok(rows.iter().map(|row| row.get::<String, _>(0)).collect())
    }

    async fn fetch_count(&self, sql: &str) -> Result<i64> {
        let row = if let Some(slot) = &self.transaction {
            let mut guard = slot.lock().await;
            match guard.as_mut() {
                Some(tx) => sqlx::query(sql).fetch_one(&mut **tx).await?,
                None => sqlx::query(sql).fetch_one(&self.pool).await?,
            }
        } else {
            sqlx::query(sql).fetch_one(&self.pool).await?
        };
        Ok(row.get(0))
    }
}

#[async_trait]
impl RecordStore for SqliteRecords {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let sql = Query::select()
            .column(Records::Body)
            .from(Records::Table)
            .and_where(Expr::col(Records::Kind).eq(self.kind.as_str()))
            .and_where(Expr::col(Records::Id).eq(key))
            .to_string(SqliteQueryBuilder);

        let bodies = self.fetch_bodies(&sql).await?;
        match bodies.first() {
            Some(body) => Ok(Some(serde_json::from_str(body)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, record: Value) -> Result<()> {
        let body = serde_json::to_string(&record)?;
        let sql = Query::insert()
            .into_table(Records::Table)
            .columns([Records::Kind, Records::Id, Records::Body])
            .values_panic([self.kind.as_str().into(), key.into(), body.into()])
            .on_conflict(
                OnConflict::columns([Records::Kind, Records::Id])
                    .update_column(Records::Body)
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        self.execute(&sql).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let sql = Query::delete()
            .from_table(Records::Table)
            .and_where(Expr::col(Records::Kind).eq(self.kind.as_str()))
            .and_where(Expr::col(Records::Id).eq(key))
            .to_string(SqliteQueryBuilder);

        self.execute(&sql).await
    }

    async fn list(&self) -> Result<Vec<Value>> {
        let sql = Query::select()
            .column(Records::Body)
            .from(Records::Table)
            .and_where(Expr::col(Records::Kind).eq(self.kind.as_str()))
            .order_by(Records::Id, sea_query::Order::Asc)
            .to_string(SqliteQueryBuilder);

        let bodies = self.fetch_bodies(&sql).await?;
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(Into::into))
            .collect()
    }

    async fn count(&self) -> Result<u64> {
        let sql = Query::select()
            .expr(Expr::col(Records::Id).count())
            .from(Records::Table)
            .and_where(Expr::col(Records::Kind).eq(self.kind.as_str()))
            .to_string(SqliteQueryBuilder);

        let n = self.fetch_count(&sql).await?;
        Ok(n as u64)
    }
}
