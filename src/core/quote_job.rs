use crate::core::job::{Job, LoggingJobListener};
use crate::core::processor::OptOutProcessor;
use crate::core::reader::PagingQuoteReader;
use crate::core::step::{ChunkStep, LoggingStepListener};
use crate::core::writer::{CompositeItemWriter, DeleteWriter, LoggingItemWriter, OptInUpdateWriter};
use crate::domain::ports::{JobFactory, Projection, QuoteFilter, QuoteQuery, QuoteStore};
use crate::domain::retention::RetentionPeriod;
use crate::utils::error::{BatchError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const JOB_NAME: &str = "processQuotesJob";
pub const UPDATE_STEP: &str = "updateOptInStep";
pub const DELETE_STEP: &str = "deleteOldQuotesStep";

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteJobSettings {
    pub chunk_size: usize,
    pub page_size: u32,
    pub stale_after: RetentionPeriod,
    pub delete_after: RetentionPeriod,
}

impl Default for QuoteJobSettings {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            page_size: 50,
            stale_after: RetentionPeriod::Months(1),
            delete_after: RetentionPeriod::Years(2),
        }
    }
}

/// 兩個時間切點，皆由同一個 `now` 算出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutoffs {
    pub stale: DateTime<Utc>,
    pub delete: DateTime<Utc>,
}

/// 報價維護 Job：
/// 1. `updateOptInStep`：把建立超過 `stale_after` 的 opt-in 報價改為 opt-out
/// 2. `deleteOldQuotesStep`：刪除建立超過 `delete_after` 的報價
pub struct QuoteMaintenanceJob {
    store: Arc<dyn QuoteStore>,
    settings: QuoteJobSettings,
}

impl QuoteMaintenanceJob {
    pub fn new(store: Arc<dyn QuoteStore>, settings: QuoteJobSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &QuoteJobSettings {
        &self.settings
    }

    pub fn cutoffs(&self, now: DateTime<Utc>) -> Result<Cutoffs> {
        let stale = self.settings.stale_after.cutoff(now)?;
        let delete = self.settings.delete_after.cutoff(now)?;
        if delete > stale {
            return Err(BatchError::RetentionError {
                details: format!(
                    "delete cutoff {} is after stale cutoff {}",
                    delete, stale
                ),
            });
        }
        Ok(Cutoffs { stale, delete })
    }

    fn update_step(&self, cutoffs: Cutoffs) -> Result<ChunkStep> {
        let reader = PagingQuoteReader::new(
            "quoteReaderForUpdate",
            self.store.clone(),
            QuoteQuery {
                filter: QuoteFilter::CreatedBetween {
                    from: cutoffs.delete,
                    to: cutoffs.stale,
                    opt_in: true,
                },
                projection: Projection::Full,
            },
            self.settings.page_size,
        );

        ChunkStep::builder(UPDATE_STEP, self.store.clone())
            .chunk_size(self.settings.chunk_size)
            .reader(reader)
            .processor(OptOutProcessor::with_cutoff(cutoffs.stale))
            .writer(OptInUpdateWriter)
            .listener(Arc::new(LoggingStepListener))
            .build()
    }

    fn delete_step(&self, cutoffs: Cutoffs) -> Result<ChunkStep> {
        let reader = PagingQuoteReader::new(
            "quoteReaderForDelete",
            self.store.clone(),
            QuoteQuery {
                filter: QuoteFilter::CreatedBefore {
                    cutoff: cutoffs.delete,
                },
                projection: Projection::KeyOnly,
            },
            self.settings.page_size,
        );

        ChunkStep::builder(DELETE_STEP, self.store.clone())
            .chunk_size(self.settings.chunk_size)
            .reader(reader)
            .writer(CompositeItemWriter::new(vec![
                Box::new(LoggingItemWriter),
                Box::new(DeleteWriter),
            ]))
            .listener(Arc::new(LoggingStepListener))
            .build()
    }
}

impl JobFactory for QuoteMaintenanceJob {
    fn job_name(&self) -> &str {
        JOB_NAME
    }

    fn create_job(&self, now: DateTime<Utc>) -> Result<Job> {
        let cutoffs = self.cutoffs(now)?;
        tracing::debug!(
            "[{}] stale cutoff {}, delete cutoff {}",
            JOB_NAME,
            cutoffs.stale,
            cutoffs.delete
        );

        Ok(Job::new(JOB_NAME)
            .start(self.update_step(cutoffs)?)
            .next(self.delete_step(cutoffs)?)
            .listener(Arc::new(LoggingJobListener)))
    }
}
