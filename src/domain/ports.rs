use crate::domain::model::{JobExecution, Quote, QuoteId, StepExecution};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 讀取時要取回的欄位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// 全部九個欄位
    Full,
    /// 只取 `id`
    KeyOnly,
}

/// 讀取條件
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteFilter {
    /// `created_time BETWEEN from AND to AND opt_in = opt_in` (含兩端)
    CreatedBetween {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        opt_in: bool,
    },
    /// `created_time < cutoff`
    CreatedBefore { cutoff: DateTime<Utc> },
}

impl QuoteFilter {
    pub fn matches(&self, quote: &Quote) -> bool {
        let Some(created) = quote.created_time else {
            // SQL 中 NULL 比較結果不成立
            return false;
        };
        match self {
            QuoteFilter::CreatedBetween { from, to, opt_in } => {
                created >= *from && created <= *to && quote.opt_in == *opt_in
            }
            QuoteFilter::CreatedBefore { cutoff } => created < *cutoff,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteQuery {
    pub filter: QuoteFilter,
    pub projection: Projection,
}

/// 儲存層：分頁查詢 + 每個 chunk 一個交易
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// 依 `id` 遞增排序，回傳 `id > after` 的前 `limit` 筆
    async fn fetch_page(
        &self,
        query: &QuoteQuery,
        after: Option<QuoteId>,
        limit: u32,
    ) -> Result<Vec<Quote>>;

    async fn begin(&self) -> Result<Box<dyn ChunkTransaction>>;

    fn name(&self) -> &str;
}

/// 單一 chunk 的交易範圍
///
/// 未 commit 就被 drop 的交易一律回滾。
#[async_trait]
pub trait ChunkTransaction: Send {
    /// 回傳受影響的列數
    async fn update_opt_in(&mut self, id: QuoteId, opt_in: bool) -> Result<u64>;

    /// 回傳受影響的列數；不存在的 id 回傳 0
    async fn delete(&mut self, id: QuoteId) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

#[async_trait]
pub trait ItemReader: Send + Sync {
    /// 下一筆；序列結束時回傳 `None`
    async fn read(&mut self) -> Result<Option<Quote>>;

    /// 回到序列開頭
    fn reset(&mut self);
}

pub trait ItemProcessor: Send + Sync {
    /// 回傳 `None` 代表略過此筆
    fn process(&self, item: Quote) -> Result<Option<Quote>>;
}

#[async_trait]
pub trait ItemWriter: Send + Sync {
    async fn write(&self, tx: &mut dyn ChunkTransaction, items: &[Quote]) -> Result<()>;
}

pub trait StepListener: Send + Sync {
    fn before_step(&self, _execution: &StepExecution) {}

    fn after_step(&self, execution: &StepExecution);
}

pub trait JobListener: Send + Sync {
    fn before_job(&self, _execution: &JobExecution) {}

    fn after_job(&self, execution: &JobExecution);
}

/// 每次觸發時依 `now` 建立新的 Job 實例
pub trait JobFactory: Send + Sync {
    fn job_name(&self) -> &str;

    fn create_job(&self, now: DateTime<Utc>) -> Result<crate::core::job::Job>;
}
