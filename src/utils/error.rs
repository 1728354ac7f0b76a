use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Storage fault: {0}")]
    StorageError(#[from] sqlx::Error),

    #[error("Storage unavailable: {message}")]
    StorageUnavailableError { message: String },

    #[error("Required field '{field}' is missing on quote {id}")]
    NullInputError { field: &'static str, id: i64 },

    #[error("Chunk {chunk} of step '{step}' rolled back: {source}")]
    TransactionError {
        step: String,
        chunk: u64,
        #[source]
        source: Box<BatchError>,
    },

    #[error("Step '{step}' failed: {details}")]
    StepError { step: String, details: String },

    #[error("Retention period out of range: {details}")]
    RetentionError { details: String },

    #[error("Invalid cron expression '{expression}': {reason}")]
    CronError { expression: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration field '{field}' failed validation: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field '{field}'")]
    MissingConfigError { field: String },
}

pub type Result<T> = std::result::Result<T, BatchError>;

/// 批次處理中的故障類型，供 step/job 執行紀錄使用
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Storage,
    NullInput,
    Transaction,
    Step,
    Configuration,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Storage,
    Data,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl BatchError {
    /// 對應到故障分類 (StorageFault / NullInputFault / TransactionFault ...)
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
            BatchError::StorageError(_) => FaultKind::Storage,
            BatchError::StorageUnavailableError { .. } => FaultKind::Storage,
            BatchError::NullInputError { .. } => FaultKind::NullInput,
            BatchError::TransactionError { .. } => FaultKind::Transaction,
            BatchError::StepError { .. } => FaultKind::Step,
            BatchError::RetentionError { .. }
            | BatchError::CronError { .. }
            | BatchError::ConfigError { .. }
            | BatchError::ConfigValidationError { .. }
            | BatchError::InvalidConfigValueError { .. }
            | BatchError::MissingConfigError { .. } => FaultKind::Configuration,
            BatchError::IoError(_) => FaultKind::Other,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.fault_kind() {
            FaultKind::Storage | FaultKind::Transaction => ErrorCategory::Storage,
            FaultKind::NullInput | FaultKind::Step => ErrorCategory::Data,
            FaultKind::Configuration => ErrorCategory::Configuration,
            FaultKind::Other => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BatchError::NullInputError { .. } | BatchError::StepError { .. } => {
                ErrorSeverity::High
            }
            BatchError::TransactionError { .. } => ErrorSeverity::Medium,
            BatchError::IoError(_) => ErrorSeverity::Critical,
            _ => match self.category() {
                // 下一次排程會重新嘗試
                ErrorCategory::Storage => ErrorSeverity::Medium,
                ErrorCategory::Configuration => ErrorSeverity::Critical,
                _ => ErrorSeverity::High,
            },
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.fault_kind() {
            FaultKind::Storage => {
                "Check the database URL and that the database is reachable; the next scheduled run retries automatically"
            }
            FaultKind::Transaction => {
                "The chunk was rolled back; inspect the failing row and the table constraints or triggers"
            }
            FaultKind::NullInput => {
                "Ensure created_time is populated for every quote row"
            }
            FaultKind::Step => "Inspect the step log for the underlying fault",
            FaultKind::Configuration => {
                "Review the configuration file and environment variables"
            }
            FaultKind::Other => "Check file permissions and disk space",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.fault_kind() {
            FaultKind::Storage => format!("Database problem: {}", self),
            FaultKind::Transaction => format!("A batch write was rolled back: {}", self),
            FaultKind::NullInput => format!("Invalid quote data: {}", self),
            FaultKind::Step => format!("Maintenance step failed: {}", self),
            FaultKind::Configuration => format!("Configuration problem: {}", self),
            FaultKind::Other => format!("Unexpected error: {}", self),
        }
    }
}
