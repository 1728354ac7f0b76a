use crate::domain::model::Quote;
use crate::domain::ports::ItemProcessor;
use crate::domain::retention::RetentionPeriod;
use crate::utils::error::{BatchError, Result};
use chrono::{DateTime, Utc};

/// 同意過期轉換：`created_time < now - stale_after` 時把 `opt_in` 設為 false
///
/// 比較是嚴格小於，剛好落在邊界上的記錄不算過期。
#[derive(Debug, Clone)]
pub struct OptOutProcessor {
    cutoff: DateTime<Utc>,
}

impl OptOutProcessor {
    pub fn new(now: DateTime<Utc>, stale_after: RetentionPeriod) -> Result<Self> {
        Ok(Self {
            cutoff: stale_after.cutoff(now)?,
        })
    }

    pub fn with_cutoff(cutoff: DateTime<Utc>) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }
}

impl ItemProcessor for OptOutProcessor {
    fn process(&self, item: Quote) -> Result<Option<Quote>> {
        let created_time = item.created_time.ok_or(BatchError::NullInputError {
            field: "created_time",
            id: item.id,
        })?;

        if created_time < self.cutoff {
            tracing::debug!("Updating opt_in to false for quote {}", item.id);
            return Ok(Some(Quote {
                opt_in: false,
                ..item
            }));
        }

        Ok(Some(item))
    }
}

/// 不做任何轉換 (刪除步驟使用)
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughProcessor;

impl ItemProcessor for PassThroughProcessor {
    fn process(&self, item: Quote) -> Result<Option<Quote>> {
        Ok(Some(item))
    }
}
