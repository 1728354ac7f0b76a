use crate::utils::error::{BatchError, Result};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// 往後搜尋的上限 (約五年)，避免像 2 月 30 日這種永遠不會成立的表達式無限迴圈
const MAX_SEARCH_STEPS: usize = 5 * 366 * 24;

/// Cron 欄位：允許值的 bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronField {
    bits: u64,
}

impl CronField {
    fn parse(
        expression: &str,
        raw: &str,
        min: u32,
        max: u32,
        names: &[&str],
        name_offset: u32,
    ) -> Result<Self> {
        let invalid = |reason: String| BatchError::CronError {
            expression: expression.to_string(),
            reason,
        };

        let mut bits = 0u64;
        for part in raw.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step
                        .parse()
                        .map_err(|_| invalid(format!("invalid step '{}'", step)))?;
                    if step == 0 {
                        return Err(invalid("step must be at least 1".to_string()));
                    }
                    (range, Some(step))
                }
                None => (part, None),
            };

            let (start, end) = if range == "*" || range == "?" {
                (min, max)
            } else if let Some((lo, hi)) = range.split_once('-') {
                (
                    parse_value(lo, names, name_offset)
                        .ok_or_else(|| invalid(format!("invalid value '{}'", lo)))?,
                    parse_value(hi, names, name_offset)
                        .ok_or_else(|| invalid(format!("invalid value '{}'", hi)))?,
                )
            } else {
                let value = parse_value(range, names, name_offset)
                    .ok_or_else(|| invalid(format!("invalid value '{}'", range)))?;
                // `5/15` 表示從 5 開始到最大值
                (value, if step.is_some() { max } else { value })
            };

            if start < min || end > max || start > end {
                return Err(invalid(format!("'{}' is outside {}-{}", part, min, max)));
            }

            let step = step.unwrap_or(1);
            let mut value = start;
            while value <= end {
                bits |= 1 << value;
                value += step;
            }
        }

        Ok(Self { bits })
    }

    pub fn contains(&self, value: u32) -> bool {
        value <= 63 && self.bits & (1 << value) != 0
    }
}

fn parse_value(raw: &str, names: &[&str], name_offset: u32) -> Option<u32> {
    if let Ok(value) = raw.parse::<u32>() {
        return Some(value);
    }
    let upper = raw.to_ascii_uppercase();
    names
        .iter()
        .position(|name| *name == upper)
        .map(|index| index as u32 + name_offset)
}

/// Spring 風格的 cron 表達式：`秒 分 時 日 月 星期`
///
/// 也接受五個欄位 (秒數固定為 0)。日與星期兩個欄位必須同時成立；
/// 星期的 0 與 7 都代表星期日。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    seconds: CronField,
    minutes: CronField,
    hours: CronField,
    days_of_month: CronField,
    months: CronField,
    days_of_week: CronField,
}

impl CronExpr {
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let fields: Vec<&str> = match fields.len() {
            6 => fields,
            5 => std::iter::once("0").chain(fields).collect(),
            n => {
                return Err(BatchError::CronError {
                    expression: expression.to_string(),
                    reason: format!("expected 5 or 6 fields, found {}", n),
                })
            }
        };

        let mut days_of_week = CronField::parse(expression, fields[5], 0, 7, &DAY_NAMES, 0)?;
        if days_of_week.contains(7) {
            days_of_week.bits |= 1;
            days_of_week.bits &= !(1 << 7);
        }

        Ok(Self {
            source: expression.to_string(),
            seconds: CronField::parse(expression, fields[0], 0, 59, &[], 0)?,
            minutes: CronField::parse(expression, fields[1], 0, 59, &[], 0)?,
            hours: CronField::parse(expression, fields[2], 0, 23, &[], 0)?,
            days_of_month: CronField::parse(expression, fields[3], 1, 31, &[], 0)?,
            months: CronField::parse(expression, fields[4], 1, 12, &MONTH_NAMES, 1)?,
            days_of_week,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, time: DateTime<Utc>) -> bool {
        self.seconds.contains(time.second())
            && self.minutes.contains(time.minute())
            && self.hours.contains(time.hour())
            && self.day_matches(time)
    }

    fn day_matches(&self, time: DateTime<Utc>) -> bool {
        self.months.contains(time.month())
            && self.days_of_month.contains(time.day())
            && self.days_of_week.contains(time.weekday().num_days_from_sunday())
    }

    /// 嚴格晚於 `after` 的下一個觸發時間 (整秒)
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = after.with_nanosecond(0)? + Duration::seconds(1);

        for _ in 0..MAX_SEARCH_STEPS {
            if !self.day_matches(t) {
                // 跳到隔天 00:00:00
                let next_day = t.date_naive().succ_opt()?;
                t = Utc.from_utc_datetime(&next_day.and_hms_opt(0, 0, 0)?);
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.with_minute(0)?.with_second(0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t = t.with_second(0)? + Duration::minutes(1);
                continue;
            }
            match (t.second()..60).find(|s| self.seconds.contains(*s)) {
                Some(second) => return t.with_second(second),
                None => {
                    t = t.with_second(0)? + Duration::minutes(1);
                }
            }
        }

        None
    }
}

impl FromStr for CronExpr {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
