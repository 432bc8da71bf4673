//! `ad-store`: the transactional store over MySQL.
//!
//! Two session flavours, mirrored from the service layer that uses them:
//! [`Store::acquire`] hands out an autocommit connection for reads, and
//! [`Store::begin`] opens a transaction for every multi-row mutation.
//! Repository methods take `&mut MySqlConnection` so the same code runs
//! in either flavour.

pub mod audits;
pub mod chats;
pub mod entities;
pub mod history;
pub mod paginator;
pub mod tasks;
pub mod units;
pub mod workspace;

pub use entities::*;
pub use paginator::{Page, PageRequest};

use sqlx::mysql::{MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{MySql, Transaction};

use ad_domain::config::DatabaseConfig;
use ad_domain::{Error, Result};

pub fn from_sql(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::RowNotFound => Error::NotFound("row not found".into()),
        other => Error::Store(other.to_string()),
    }
}

#[derive(Clone)]
pub struct Store {
    pool: MySqlPool,
}

impl Store {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(cfg.acquire_timeout_secs))
            .connect(&cfg.dsn)
            .await
            .map_err(from_sql)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Read-only flavour: an autocommit pooled connection.
    pub async fn acquire(&self) -> Result<PoolConnection<MySql>> {
        self.pool.acquire().await.map_err(from_sql)
    }

    /// Transactional flavour: commits only if the caller commits.
    pub async fn begin(&self) -> Result<Transaction<'static, MySql>> {
        self.pool.begin().await.map_err(from_sql)
    }
}

/// Fetch the id of the row just inserted on this connection.
/// `LAST_INSERT_ID()` comes back as BIGINT UNSIGNED.
pub(crate) async fn last_insert_id(conn: &mut MySqlConnection) -> Result<i64> {
    let (id,): (u64,) = sqlx::query_as("SELECT LAST_INSERT_ID()")
        .fetch_one(conn)
        .await
        .map_err(from_sql)?;
    Ok(id as i64)
}
