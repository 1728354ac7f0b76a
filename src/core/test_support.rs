//! In-memory store used by the unit tests of the reader, writers, step and job.

use crate::domain::model::{Quote, QuoteId};
use crate::domain::ports::{ChunkTransaction, Projection, QuoteQuery, QuoteStore};
use crate::utils::error::{BatchError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Update(QuoteId, bool),
    Delete(QuoteId),
}

#[derive(Default)]
struct Inner {
    rows: Mutex<BTreeMap<QuoteId, Quote>>,
    rejected: Mutex<HashSet<QuoteId>>,
    committed: Mutex<Vec<Op>>,
    page_fetches: AtomicUsize,
    rollbacks: AtomicUsize,
    unavailable: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn with_rows(rows: Vec<Quote>) -> Self {
        let store = Self::default();
        {
            let mut map = store.inner.rows.lock().unwrap();
            for row in rows {
                map.insert(row.id, row);
            }
        }
        store
    }

    /// 對此 id 的寫入一律失敗
    pub fn reject_writes_for(&self, id: QuoteId) {
        self.inner.rejected.lock().unwrap().insert(id);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn get(&self, id: QuoteId) -> Option<Quote> {
        self.inner.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.rows.lock().unwrap().len()
    }

    /// 模擬其他程序的並行刪除
    pub fn remove(&self, id: QuoteId) {
        self.inner.rows.lock().unwrap().remove(&id);
    }

    pub fn committed_ops(&self) -> Vec<Op> {
        self.inner.committed.lock().unwrap().clone()
    }

    pub fn page_fetches(&self) -> usize {
        self.inner.page_fetches.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteStore for MemoryStore {
    async fn fetch_page(
        &self,
        query: &QuoteQuery,
        after: Option<QuoteId>,
        limit: u32,
    ) -> Result<Vec<Quote>> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(BatchError::StorageUnavailableError {
                message: "memory store offline".to_string(),
            });
        }
        self.inner.page_fetches.fetch_add(1, Ordering::SeqCst);

        let rows = self.inner.rows.lock().unwrap();
        let lower = after.unwrap_or(QuoteId::MIN);
        Ok(rows
            .range((std::ops::Bound::Excluded(lower), std::ops::Bound::Unbounded))
            .map(|(_, quote)| quote)
            .filter(|quote| query.filter.matches(quote))
            .take(limit as usize)
            .map(|quote| match query.projection {
                Projection::Full => quote.clone(),
                Projection::KeyOnly => Quote::key_only(quote.id),
            })
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn ChunkTransaction>> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(BatchError::StorageUnavailableError {
                message: "memory store offline".to_string(),
            });
        }
        Ok(Box::new(MemoryTransaction {
            inner: self.inner.clone(),
            staged: Vec::new(),
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemoryTransaction {
    inner: Arc<Inner>,
    staged: Vec<Op>,
}

impl MemoryTransaction {
    fn check(&self, id: QuoteId) -> Result<u64> {
        if self.inner.rejected.lock().unwrap().contains(&id) {
            return Err(BatchError::StorageUnavailableError {
                message: format!("write rejected for quote {}", id),
            });
        }
        let exists = self.inner.rows.lock().unwrap().contains_key(&id);
        Ok(u64::from(exists))
    }
}

#[async_trait]
impl ChunkTransaction for MemoryTransaction {
    async fn update_opt_in(&mut self, id: QuoteId, opt_in: bool) -> Result<u64> {
        let affected = self.check(id)?;
        self.staged.push(Op::Update(id, opt_in));
        Ok(affected)
    }

    async fn delete(&mut self, id: QuoteId) -> Result<u64> {
        let affected = self.check(id)?;
        self.staged.push(Op::Delete(id));
        Ok(affected)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut rows = self.inner.rows.lock().unwrap();
        let mut committed = self.inner.committed.lock().unwrap();
        for op in self.staged.drain(..) {
            match &op {
                Op::Update(id, opt_in) => {
                    if let Some(row) = rows.get_mut(id) {
                        row.opt_in = *opt_in;
                    }
                }
                Op::Delete(id) => {
                    rows.remove(id);
                }
            }
            committed.push(op);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn quote(id: QuoteId, created_time: DateTime<Utc>, opt_in: bool) -> Quote {
    Quote {
        id,
        quote_id: Some(format!("Q{}", id)),
        basic_quote_id: Some(format!("B{}", id)),
        customer_name: Some(format!("Customer {}", id)),
        customer_email: Some(format!("customer{}@example.com", id)),
        customer_phone: Some("+44 20 7946 0000".to_string()),
        request_text: Some("Please call back".to_string()),
        created_time: Some(created_time),
        opt_in,
    }
}
