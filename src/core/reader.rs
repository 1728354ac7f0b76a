use crate::domain::model::{Page, Quote, QuoteId};
use crate::domain::ports::{ItemReader, QuoteQuery, QuoteStore};
use crate::utils::error::{BatchError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

/// Keyset 分頁讀取器
///
/// 每一頁以上一頁最後一筆的 `id` 作為下界 (`id > after`)，
/// 因此同一個 Job 在讀取過程中刪除已讀取的列，也不會造成漏讀或重複。
pub struct PagingQuoteReader {
    name: String,
    store: Arc<dyn QuoteStore>,
    query: QuoteQuery,
    page_size: u32,
    after: Option<QuoteId>,
    exhausted: bool,
    buffer: VecDeque<Quote>,
    pages_read: u64,
}

impl PagingQuoteReader {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn QuoteStore>,
        query: QuoteQuery,
        page_size: u32,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            query,
            page_size: page_size.max(1),
            after: None,
            exhausted: false,
            buffer: VecDeque::new(),
            pages_read: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }

    /// 讀取 `after` 之後的一頁
    pub async fn next_page(&self, after: Option<QuoteId>) -> Result<Page<Quote>> {
        let items = self
            .store
            .fetch_page(&self.query, after, self.page_size)
            .await?;

        // 排序鍵必須嚴格遞增，否則 keyset 分頁會失準
        let mut last = after;
        for item in &items {
            if let Some(prev) = last {
                if item.id <= prev {
                    return Err(BatchError::StepError {
                        step: self.name.clone(),
                        details: format!(
                            "page out of order: id {} returned after {}",
                            item.id, prev
                        ),
                    });
                }
            }
            last = Some(item.id);
        }

        let has_more = items.len() as u64 == u64::from(self.page_size);
        Ok(Page {
            next_after: last,
            has_more,
            items,
        })
    }
}

#[async_trait]
impl ItemReader for PagingQuoteReader {
    async fn read(&mut self) -> Result<Option<Quote>> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = self.next_page(self.after).await?;
            self.pages_read += 1;
            tracing::debug!(
                "📥 {}: page {} fetched {} records (after: {:?})",
                self.name,
                self.pages_read,
                page.items.len(),
                self.after
            );
            self.after = page.next_after;
            self.exhausted = !page.has_more;
            self.buffer.extend(page.items);
        }

        Ok(self.buffer.pop_front())
    }

    fn reset(&mut self) {
        self.after = None;
        self.exhausted = false;
        self.buffer.clear();
        self.pages_read = 0;
    }
}
