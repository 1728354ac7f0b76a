use crate::adapters::select_page_sql;
use crate::domain::model::{Quote, QuoteId};
use crate::domain::ports::{ChunkTransaction, Projection, QuoteFilter, QuoteQuery, QuoteStore};
use crate::utils::error::{BatchError, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

const UPDATE_OPT_IN_SQL: &str = "UPDATE quote SET opt_in = $1 WHERE id = $2";
const DELETE_SQL: &str = "DELETE FROM quote WHERE id = $1";

fn placeholder(n: usize) -> String {
    format!("${}", n)
}

/// PostgreSQL 上的 `quote` 資料表
#[derive(Clone)]
pub struct PgQuoteStore {
    pool: PgPool,
}

impl PgQuoteStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow, projection: Projection) -> Result<Quote> {
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
impl QuoteStore for PgQuoteStore {
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
        Ok(Box::new(PgChunkTransaction { tx: Some(tx) }))
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

/// drop 時若仍持有交易，sqlx 會自動回滾
pub struct PgChunkTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgChunkTransaction {
    fn active(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| BatchError::StorageUnavailableError {
                message: "transaction already finished".to_string(),
            })
    }
}

#[async_trait]
impl ChunkTransaction for PgChunkTransaction {
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
