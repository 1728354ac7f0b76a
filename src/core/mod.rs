pub mod cron;
pub mod job;
pub mod processor;
pub mod quote_job;
pub mod reader;
pub mod scheduler;
pub mod step;
pub mod writer;

#[cfg(test)]
pub mod test_support;

pub use crate::domain::model::{BatchStatus, JobExecution, Quote, RunToken, StepExecution};
pub use crate::domain::ports::{ChunkTransaction, ItemProcessor, ItemReader, ItemWriter, QuoteStore};
pub use crate::utils::error::Result;
