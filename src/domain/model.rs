use crate::utils::error::{BatchError, FaultKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type QuoteId = i64;

/// quote 資料表中的一筆記錄
///
/// `created_time` 為 `None` 代表資料庫中的 NULL，或是只投影主鍵的讀取結果。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub quote_id: Option<String>,
    pub basic_quote_id: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub request_text: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub opt_in: bool,
}

impl Quote {
    /// 只帶主鍵的記錄 (刪除步驟使用)
    pub fn key_only(id: QuoteId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// 一頁讀取結果：keyset 分頁，`next_after` 是下一頁的下界
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_after: Option<QuoteId>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BatchStatus::Created => "CREATED",
            BatchStatus::Running => "RUNNING",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// 每次觸發的執行識別碼
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunToken {
    pub run_id: u64,
    pub timestamp: DateTime<Utc>,
}

impl RunToken {
    pub fn new(run_id: u64, timestamp: DateTime<Utc>) -> Self {
        Self { run_id, timestamp }
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}@{}", self.run_id, self.timestamp.timestamp_millis())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FaultKind,
    pub message: String,
}

impl From<&BatchError> for StepFailure {
    fn from(error: &BatchError) -> Self {
        Self {
            kind: error.fault_kind(),
            message: error.to_string(),
        }
    }
}

/// 單一 Step 的執行紀錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_name: String,
    pub status: BatchStatus,
    pub read_count: u64,
    pub filter_count: u64,
    pub write_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub failure: Option<StepFailure>,
}

impl StepExecution {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: BatchStatus::Created,
            read_count: 0,
            filter_count: 0,
            write_count: 0,
            commit_count: 0,
            rollback_count: 0,
            started_at: None,
            ended_at: None,
            failure: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == BatchStatus::Completed
    }
}

/// 一次 Job 執行的紀錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub job_name: String,
    pub run_token: RunToken,
    pub status: BatchStatus,
    pub step_executions: Vec<StepExecution>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobExecution {
    pub fn new(job_name: impl Into<String>, run_token: RunToken) -> Self {
        Self {
            job_name: job_name.into(),
            run_token,
            status: BatchStatus::Created,
            step_executions: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepExecution> {
        self.step_executions.iter().find(|s| s.step_name == name)
    }

    pub fn total_write_count(&self) -> u64 {
        self.step_executions.iter().map(|s| s.write_count).sum()
    }

    /// 執行摘要 (JSON)
    pub fn summary(&self) -> serde_json::Value {
        let duration_ms = match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0),
            _ => 0,
        };

        serde_json::json!({
            "job": self.job_name,
            "run_token": self.run_token.to_string(),
            "status": self.status,
            "duration_ms": duration_ms,
            "total_writes": self.total_write_count(),
            "steps": self
                .step_executions
                .iter()
                .map(|s| serde_json::json!({
                    "name": s.step_name,
                    "status": s.status,
                    "read": s.read_count,
                    "written": s.write_count,
                    "commits": s.commit_count,
                    "rollbacks": s.rollback_count,
                }))
                .collect::<Vec<_>>(),
        })
    }
}
