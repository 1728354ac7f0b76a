use crate::utils::error::{BatchError, Result};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 格里曆 400 年週期的天數與月數
const DAYS_PER_CYCLE: u64 = 146_097;
const MONTHS_PER_CYCLE: u64 = 4_800;
const CALENDAR_SLACK_DAYS: u64 = 3;

/// 保留期限，以日曆計算 (`now - period`)
///
/// TOML 寫法：`stale_after = { months = 1 }`、`delete_after = { years = 2 }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPeriod {
    Days(u32),
    Months(u32),
    Years(u32),
}

impl RetentionPeriod {
    /// 回傳 `now` 往前推算此期限的時間點
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let cutoff = match *self {
            RetentionPeriod::Days(days) => now.checked_sub_signed(Duration::days(i64::from(days))),
            RetentionPeriod::Months(months) => now.checked_sub_months(Months::new(months)),
            RetentionPeriod::Years(years) => years
                .checked_mul(12)
                .and_then(|months| now.checked_sub_months(Months::new(months))),
        };

        cutoff.ok_or_else(|| BatchError::RetentionError {
            details: format!("{} before {} is not representable", self, now),
        })
    }

    /// 以月為單位的期限 (年 = 12 個月)；以天為單位時為 `None`
    fn total_months(&self) -> Option<u64> {
        match *self {
            RetentionPeriod::Days(_) => None,
            RetentionPeriod::Months(months) => Some(u64::from(months)),
            RetentionPeriod::Years(years) => Some(u64::from(years) * 12),
        }
    }

    /// 此期限在任何日期下可能涵蓋的天數範圍
    ///
    /// 連續 N 個月的天數與平均值 (146097 / 4800 天) 的差距不超過 3 天，
    /// 月底對齊的情況也包含在內。
    fn day_bounds(&self) -> (u64, u64) {
        match (self, self.total_months()) {
            (RetentionPeriod::Days(days), _) => (u64::from(*days), u64::from(*days)),
            (_, Some(months)) => {
                let floor = months * DAYS_PER_CYCLE / MONTHS_PER_CYCLE;
                let ceil = (months * DAYS_PER_CYCLE).div_ceil(MONTHS_PER_CYCLE);
                (floor.saturating_sub(CALENDAR_SLACK_DAYS), ceil + CALENDAR_SLACK_DAYS)
            }
            (_, None) => (0, u64::MAX),
        }
    }

    /// 在任何 `now` 下，此期限的切點都嚴格晚於 `other` 的切點
    ///
    /// 同為月/年時精確比較月數；混用天數時只接受天數範圍不重疊的組合。
    pub fn is_always_shorter_than(&self, other: &RetentionPeriod) -> bool {
        match (self.total_months(), other.total_months()) {
            (Some(mine), Some(theirs)) => mine < theirs,
            _ => self.day_bounds().1 < other.day_bounds().0,
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            RetentionPeriod::Days(n) | RetentionPeriod::Months(n) | RetentionPeriod::Years(n) => {
                n == 0
            }
        }
    }
}

impl fmt::Display for RetentionPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionPeriod::Days(n) => write!(f, "{} day(s)", n),
            RetentionPeriod::Months(n) => write!(f, "{} month(s)", n),
            RetentionPeriod::Years(n) => write!(f, "{} year(s)", n),
        }
    }
}
