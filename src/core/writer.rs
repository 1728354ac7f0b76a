use crate::domain::model::Quote;
use crate::domain::ports::{ChunkTransaction, ItemWriter};
use crate::utils::error::Result;
use async_trait::async_trait;

/// `UPDATE quote SET opt_in = :opt_in WHERE id = :id`
#[derive(Debug, Clone, Copy, Default)]
pub struct OptInUpdateWriter;

#[async_trait]
impl ItemWriter for OptInUpdateWriter {
    async fn write(&self, tx: &mut dyn ChunkTransaction, items: &[Quote]) -> Result<()> {
        let mut affected = 0;
        for item in items {
            affected += tx.update_opt_in(item.id, item.opt_in).await?;
        }
        tracing::debug!("Updated opt_in for {}/{} quotes", affected, items.len());
        Ok(())
    }
}

/// `DELETE FROM quote WHERE id = :id`，已不存在的 id 視為成功
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteWriter;

#[async_trait]
impl ItemWriter for DeleteWriter {
    async fn write(&self, tx: &mut dyn ChunkTransaction, items: &[Quote]) -> Result<()> {
        let mut affected = 0;
        for item in items {
            affected += tx.delete(item.id).await?;
        }
        if affected < items.len() as u64 {
            tracing::debug!(
                "{} quotes were already gone before delete",
                items.len() as u64 - affected
            );
        }
        Ok(())
    }
}

/// 記錄即將被刪除的 quote
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingItemWriter;

#[async_trait]
impl ItemWriter for LoggingItemWriter {
    async fn write(&self, _tx: &mut dyn ChunkTransaction, items: &[Quote]) -> Result<()> {
        for quote in items {
            tracing::info!(
                "Deleting Quote - ID: {}, Quote ID: {:?}, Created Time: {:?}",
                quote.id,
                quote.quote_id,
                quote.created_time
            );
        }
        Ok(())
    }
}

/// 依宣告順序把同一個 chunk 交給每個 delegate，全部共用同一個交易
///
/// 任何 delegate 失敗時後面的 delegate 不會執行。
pub struct CompositeItemWriter {
    delegates: Vec<Box<dyn ItemWriter>>,
}

impl CompositeItemWriter {
    pub fn new(delegates: Vec<Box<dyn ItemWriter>>) -> Self {
        Self { delegates }
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

#[async_trait]
impl ItemWriter for CompositeItemWriter {
    async fn write(&self, tx: &mut dyn ChunkTransaction, items: &[Quote]) -> Result<()> {
        for delegate in &self.delegates {
            delegate.write(&mut *tx, items).await?;
        }
        Ok(())
    }
}
