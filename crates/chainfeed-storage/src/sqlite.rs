//! SQLite store backend.
//!
//! Persists transactions and the chain table to a single SQLite file using
//! `sqlx` with WAL mode for concurrent read performance. Duplicate
//! absorption and the monotone status rule are pushed into the upsert's
//! `ON CONFLICT` clause, so racing sessions never observe a constraint
//! violation.
//!
//! # Usage
//! ```rust,no_run
//! use chainfeed_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./chainfeed.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use chainfeed_core::error::StoreError;
use chainfeed_core::{ChainConfig, PendingTx, TxStatus};

use crate::{OrderBy, Page, SenderCount, SortOrder, TxAggregates, TxQuery, TxStore};

/// SQLite-backed transaction store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./chainfeed.db"`) or a full
    /// SQLite URL (`"sqlite:./chainfeed.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        // An in-memory database must stay on a single connection; a pool of
        // them would give every connection its own empty database.
        if path.contains(":memory:") {
            return Self::in_memory().await;
        }

        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database. All data is lost when the pool is
    /// dropped; a single connection keeps the database alive across calls.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transactions (
                hash                     TEXT    PRIMARY KEY,
                chain_id                 INTEGER NOT NULL,
                from_addr                TEXT    NOT NULL,
                to_addr                  TEXT,
                value                    TEXT    NOT NULL,
                gas_price                TEXT    NOT NULL,
                gas_limit                TEXT    NOT NULL,
                max_fee_per_gas          TEXT,
                max_priority_fee_per_gas TEXT,
                input                    TEXT    NOT NULL,
                nonce                    INTEGER NOT NULL,
                tx_type                  INTEGER NOT NULL,
                timestamp                TEXT    NOT NULL,
                status                   TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chains (
                id      INTEGER PRIMARY KEY,
                name    TEXT    NOT NULL,
                ws_url  TEXT    NOT NULL,
                rpc_url TEXT
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        // Indexes for the paginated query and the aggregate windows.
        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_tx_chain_time ON transactions (chain_id, timestamp DESC);",
            "CREATE INDEX IF NOT EXISTS idx_tx_time ON transactions (timestamp);",
            "CREATE INDEX IF NOT EXISTS idx_tx_status ON transactions (status);",
            "CREATE INDEX IF NOT EXISTS idx_tx_from ON transactions (from_addr);",
        ] {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    /// The underlying pool, for custom queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_tx(row: &SqliteRow) -> Result<PendingTx, StoreError> {
    let status_raw: String = row.get("status");
    let status = TxStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Storage(format!("unknown status '{status_raw}'")))?;

    Ok(PendingTx {
        hash: row.get("hash"),
        chain_id: row.get::<i64, _>("chain_id") as u64,
        from: row.get("from_addr"),
        to: row.get("to_addr"),
        value: row.get("value"),
        gas_price: row.get("gas_price"),
        gas_limit: row.get("gas_limit"),
        max_fee_per_gas: row.get("max_fee_per_gas"),
        max_priority_fee_per_gas: row.get("max_priority_fee_per_gas"),
        input: row.get("input"),
        nonce: row.get::<i64, _>("nonce") as u64,
        tx_type: row.get::<i64, _>("tx_type") as u8,
        timestamp: row.get("timestamp"),
        status,
    })
}

/// Append the WHERE clause for a [`TxQuery`] (shared by page + count).
fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &TxQuery) {
    let mut sep = " WHERE ";
    if let Some(chain_id) = query.chain_id {
        qb.push(sep).push("chain_id = ").push_bind(chain_id as i64);
        sep = " AND ";
    }
    if let Some(prefix) = &query.from_prefix {
        qb.push(sep)
            .push("from_addr LIKE ")
            .push_bind(format!("{}%", prefix.to_ascii_lowercase()));
        sep = " AND ";
    }
    if let Some(prefix) = &query.to_prefix {
        qb.push(sep)
            .push("to_addr LIKE ")
            .push_bind(format!("{}%", prefix.to_ascii_lowercase()));
        sep = " AND ";
    }
    if let Some(status) = query.status {
        qb.push(sep).push("status = ").push_bind(status.as_str());
    }
}

const TX_COLUMNS: &str = "hash, chain_id, from_addr, to_addr, value, gas_price, gas_limit, \
     max_fee_per_gas, max_priority_fee_per_gas, input, nonce, tx_type, timestamp, status";

#[async_trait]
impl TxStore for SqliteStore {
    async fn upsert(&self, tx: &PendingTx) -> Result<(), StoreError> {
        // Conflict on hash updates only the status, and only along the
        // pending -> confirmed edge. Anything else is a silent no-op.
        sqlx::query(
            "INSERT INTO transactions (hash, chain_id, from_addr, to_addr, value, gas_price, \
             gas_limit, max_fee_per_gas, max_priority_fee_per_gas, input, nonce, tx_type, \
             timestamp, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(hash) DO UPDATE SET status = excluded.status
             WHERE transactions.status = 'pending' AND excluded.status = 'confirmed'",
        )
        .bind(&tx.hash)
        .bind(tx.chain_id as i64)
        .bind(&tx.from)
        .bind(&tx.to)
        .bind(&tx.value)
        .bind(&tx.gas_price)
        .bind(&tx.gas_limit)
        .bind(&tx.max_fee_per_gas)
        .bind(&tx.max_priority_fee_per_gas)
        .bind(&tx.input)
        .bind(tx.nonce as i64)
        .bind(tx.tx_type as i64)
        .bind(tx.timestamp)
        .bind(tx.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn find(&self, hash: &str) -> Result<Option<PendingTx>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE hash = ?"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        row.as_ref().map(row_to_tx).transpose()
    }

    async fn find_page(&self, query: &TxQuery) -> Result<Page<PendingTx>, StoreError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) AS cnt FROM transactions");
        push_filters(&mut count_qb, query);
        let total: i64 = count_qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
            .get("cnt");

        let mut qb = QueryBuilder::new(format!("SELECT {TX_COLUMNS} FROM transactions"));
        push_filters(&mut qb, query);

        let dir = match query.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        qb.push(" ORDER BY ");
        match query.order_by {
            OrderBy::Timestamp => {
                qb.push(format!("timestamp {dir}"));
            }
            // Decimal strings carry no leading zeros, so length-then-lex is
            // numeric order.
            OrderBy::Value => {
                qb.push(format!("LENGTH(value) {dir}, value {dir}"));
            }
            OrderBy::GasPrice => {
                qb.push(format!("LENGTH(gas_price) {dir}, gas_price {dir}"));
            }
            OrderBy::Nonce => {
                qb.push(format!("nonce {dir}"));
            }
        }
        qb.push(format!(", hash {dir}"));
        qb.push(" LIMIT ")
            .push_bind(query.effective_limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let rows = rows
            .iter()
            .map(row_to_tx)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page { rows, total: total as u64 })
    }

    async fn aggregate(&self, chain_id: Option<u64>) -> Result<TxAggregates, StoreError> {
        let now = Utc::now();
        let mut agg = TxAggregates::default();

        let mut qb = QueryBuilder::new("SELECT status, COUNT(*) AS cnt FROM transactions");
        if let Some(id) = chain_id {
            qb.push(" WHERE chain_id = ").push_bind(id as i64);
        }
        qb.push(" GROUP BY status");
        for row in qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            let status: String = row.get("status");
            agg.by_status.insert(status, row.get::<i64, _>("cnt") as u64);
        }

        let mut qb = QueryBuilder::new("SELECT chain_id, COUNT(*) AS cnt FROM transactions");
        if let Some(id) = chain_id {
            qb.push(" WHERE chain_id = ").push_bind(id as i64);
        }
        qb.push(" GROUP BY chain_id");
        for row in qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            agg.by_chain.insert(
                row.get::<i64, _>("chain_id") as u64,
                row.get::<i64, _>("cnt") as u64,
            );
        }

        let mut qb = QueryBuilder::new("SELECT from_addr, COUNT(*) AS cnt FROM transactions");
        qb.push(" WHERE timestamp >= ")
            .push_bind(now - Duration::hours(1));
        if let Some(id) = chain_id {
            qb.push(" AND chain_id = ").push_bind(id as i64);
        }
        qb.push(" GROUP BY from_addr ORDER BY cnt DESC, from_addr ASC LIMIT 10");
        for row in qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            agg.top_senders_last_hour.push(SenderCount {
                address: row.get("from_addr"),
                count: row.get::<i64, _>("cnt") as u64,
            });
        }

        let mut qb = QueryBuilder::new("SELECT COUNT(*) AS cnt FROM transactions");
        qb.push(" WHERE timestamp >= ")
            .push_bind(now - Duration::minutes(5));
        if let Some(id) = chain_id {
            qb.push(" AND chain_id = ").push_bind(id as i64);
        }
        agg.count_last_5min = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
            .get::<i64, _>("cnt") as u64;

        Ok(agg)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM transactions WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        debug!(deleted = result.rows_affected(), "retention sweep");
        Ok(result.rows_affected())
    }

    async fn upsert_chain(&self, chain: &ChainConfig) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO chains (id, name, ws_url, rpc_url) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name   = excluded.name,
                ws_url = excluded.ws_url,
                rpc_url = excluded.rpc_url",
        )
        .bind(chain.id as i64)
        .bind(&chain.name)
        .bind(&chain.ws_url)
        .bind(&chain.rpc_url)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn chains(&self) -> Result<Vec<ChainConfig>, StoreError> {
        let rows = sqlx::query("SELECT id, name, ws_url, rpc_url FROM chains ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| ChainConfig {
                id: row.get::<i64, _>("id") as u64,
                name: row.get("name"),
                ws_url: row.get("ws_url"),
                rpc_url: row.get("rpc_url"),
            })
            .collect())
    }
}
