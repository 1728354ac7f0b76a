use crate::adapters::select_page_sql;
use crate::domain::model::{Quote, QuoteId};
use crate::domain::ports::{ChunkTransaction, Projection, QuoteFilter, QuoteQuery, QuoteStore};
use crate::utils::error::{BatchError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;

const UPDATE_OPT_IN_SQL: &str = "UPDATE quote SET opt_in = ? WHERE id = ?";
const DELETE_SQL: &str = "DELETE FROM quote WHERE id = ?";

fn placeholder(_: usize) -> String {
    "?".to_string()
}

/// SQLite 上的 `quote` 資料表
///
/// `created_time` 以 RFC 3339 (UTC, `+00:00`) 文字儲存，字典序即時間順序。
/// 其他工具寫入的列必須使用同一格式，`schema/sqlite.sql` 以 CHECK 限制。
#[derive(Clone)]
pub struct SqliteQuoteStore {
    pool: SqlitePool,
}

impl SqliteQuoteStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // 記憶體資料庫只存在於單一連線
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn map_row(row: &SqliteRow, projection: Projection) -> Result<Quote> {
        let id: i64 = row.try_get("id")?;
        if projection == Projection::KeyOnly {
            return Ok(Quote::key_only(id));
        }
        Ok(Quote {
            id,
            quote_id: row.try_get("quote_id")?,
            basic_quote_id: row.try_get("basic_quote_id")?,
            customer_name: row.try_get("customer_name")?,
            customer_email: row.try_get("customer_email")?,
            customer_phone: row.try_get("customer_phone")?,
            request_text: row.try_get("request_text")?,
            created_time: row.try_get("created_time")?,
            opt_in: row.try_get("opt_in")?,
        })
    }
}

#[async_trait]
impl QuoteStore for SqliteQuoteStore {
    async fn fetch_page(
        &self,
        query: &QuoteQuery,
        after: Option<QuoteId>,
        limit: u32,
    ) -> Result<Vec<Quote>> {
        let sql = select_page_sql(query, placeholder);
        let mut select = sqlx::query(&sql);
        select = match query.filter {
            QuoteFilter::CreatedBetween { from, to, opt_in } => {
                select.bind(from).bind(to).bind(opt_in)
            }
            QuoteFilter::CreatedBefore { cutoff } => select.bind(cutoff),
        };
        let rows = select
            .bind(after.unwrap_or(i64::MIN))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Self::map_row(row, query.projection))
            .collect()
    }

    async fn begin(&self) -> Result<Box<dyn ChunkTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteChunkTransaction { tx: Some(tx) }))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

pub struct SqliteChunkTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteChunkTransaction {
    fn active(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        self.tx
            .as_mut()
            .ok_or_else(|| BatchError::StorageUnavailableError {
                message: "transaction already finished".to_string(),
            })
    }
}

#[async_trait]
impl ChunkTransaction for SqliteChunkTransaction {
    async fn update_opt_in(&mut self, id: QuoteId, opt_in: bool) -> Result<u64> {
        let tx = self.active()?;
        let result = sqlx::query(UPDATE_OPT_IN_SQL)
            .bind(opt_in)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&mut self, id: QuoteId) -> Result<u64> {
        let tx = self.active()?;
        let result = sqlx::query(DELETE_SQL).bind(id).execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
