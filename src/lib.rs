pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;
pub use config::AppConfig;

pub use core::job::Job;
pub use core::quote_job::{QuoteJobSettings, QuoteMaintenanceJob};
pub use core::scheduler::{JobLauncher, Scheduler, Trigger};
pub use domain::model::{BatchStatus, JobExecution, Quote, RunToken, StepExecution};
pub use utils::error::{BatchError, Result};
