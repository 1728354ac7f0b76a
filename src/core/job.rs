use crate::core::step::ChunkStep;
use crate::domain::model::{BatchStatus, JobExecution, RunToken};
use crate::domain::ports::JobListener;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;

/// 記錄每次 Job 執行的識別碼與最終狀態
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingJobListener;

impl JobListener for LoggingJobListener {
    fn before_job(&self, execution: &JobExecution) {
        tracing::info!(
            "🚀 Job [{}] starting ({})",
            execution.job_name,
            execution.run_token
        );
    }

    fn after_job(&self, execution: &JobExecution) {
        match execution.status {
            BatchStatus::Completed => tracing::info!(
                "✅ Job [{}] {} finished with status {} ({} items written)",
                execution.job_name,
                execution.run_token,
                execution.status,
                execution.total_write_count()
            ),
            _ => tracing::error!(
                "❌ Job [{}] {} finished with status {}",
                execution.job_name,
                execution.run_token,
                execution.status
            ),
        }
    }
}

/// 依序執行的 Step 清單；任一 Step 失敗即停止，不執行後續 Step
pub struct Job {
    name: String,
    steps: Vec<ChunkStep>,
    listeners: Vec<Arc<dyn JobListener>>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn start(mut self, step: ChunkStep) -> Self {
        self.steps.clear();
        self.steps.push(step);
        self
    }

    pub fn next(mut self, step: ChunkStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// 執行整個 Job；已完成的 Step 不會因後續 Step 失敗而被補償
    pub async fn run(mut self, run_token: RunToken) -> JobExecution {
        let mut execution = JobExecution::new(self.name.clone(), run_token);
        execution.started_at = Some(Utc::now());
        execution.status = BatchStatus::Running;

        for listener in &self.listeners {
            listener.before_job(&execution);
        }

        let mut status = BatchStatus::Completed;
        for step in self.steps.iter_mut() {
            let step_execution = step.execute().await;
            let completed = step_execution.is_completed();
            execution.step_executions.push(step_execution);

            if !completed {
                tracing::warn!(
                    "⏭️ Job [{}] stopping after failed step [{}]",
                    self.name,
                    step.name()
                );
                status = BatchStatus::Failed;
                break;
            }
        }

        execution.status = status;
        execution.ended_at = Some(Utc::now());

        for listener in &self.listeners {
            listener.after_job(&execution);
        }

        execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reader::PagingQuoteReader;
    use crate::core::test_support::{quote, MemoryStore, Op};
    use crate::core::writer::{DeleteWriter, OptInUpdateWriter};
    use crate::core::processor::OptOutProcessor;
    use crate::domain::ports::{Projection, QuoteFilter, QuoteQuery, QuoteStore};
    use crate::utils::error::FaultKind;
    use chrono::{DateTime, Duration};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingJobListener {
        finished: Mutex<Vec<(RunToken, BatchStatus)>>,
    }

    impl JobListener for CapturingJobListener {
        fn after_job(&self, execution: &JobExecution) {
            self.finished
                .lock()
                .unwrap()
                .push((execution.run_token, execution.status));
        }
    }

    fn build_job(store: &MemoryStore, now: DateTime<Utc>) -> Job {
        let shared: Arc<dyn QuoteStore> = Arc::new(store.clone());
        let update = ChunkStep::builder("updateOptInStep", shared.clone())
            .chunk_size(2)
            .reader(PagingQuoteReader::new(
                "quoteReaderForUpdate",
                shared.clone(),
                QuoteQuery {
                    filter: QuoteFilter::CreatedBetween {
                        from: now - Duration::days(730),
                        to: now - Duration::days(30),
                        opt_in: true,
                    },
                    projection: Projection::Full,
                },
                2,
            ))
            .processor(OptOutProcessor::with_cutoff(now - Duration::days(30)))
            .writer(OptInUpdateWriter)
            .build()
            .unwrap();
        let delete = ChunkStep::builder("deleteOldQuotesStep", shared.clone())
            .chunk_size(2)
            .reader(PagingQuoteReader::new(
                "quoteReaderForDelete",
                shared,
                QuoteQuery {
                    filter: QuoteFilter::CreatedBefore {
                        cutoff: now - Duration::days(730),
                    },
                    projection: Projection::KeyOnly,
                },
                2,
            ))
            .writer(DeleteWriter)
            .build()
            .unwrap();

        Job::new("processQuotesJob").start(update).next(delete)
    }

    fn seed(now: DateTime<Utc>) -> MemoryStore {
        MemoryStore::with_rows(vec![
            quote(1, now - Duration::days(60), true),
            quote(2, now - Duration::days(1100), true),
            quote(3, now - Duration::days(10), true),
            quote(4, now - Duration::days(90), true),
            quote(5, now - Duration::days(900), false),
            quote(6, now - Duration::days(200), true),
        ])
    }

    #[tokio::test]
    async fn test_job_runs_steps_in_order() {
        let now = Utc::now();
        let store = seed(now);
        let job = build_job(&store, now);
        assert_eq!(job.step_names(), vec!["updateOptInStep", "deleteOldQuotesStep"]);

        let execution = job.run(RunToken::new(1, now)).await;

        assert_eq!(execution.status, BatchStatus::Completed);
        assert_eq!(execution.step_executions.len(), 2);
        assert_eq!(execution.step("updateOptInStep").unwrap().write_count, 3);
        assert_eq!(execution.step("deleteOldQuotesStep").unwrap().write_count, 2);

        assert!(!store.get(1).unwrap().opt_in);
        assert!(store.get(3).unwrap().opt_in);
        assert!(!store.get(4).unwrap().opt_in);
        assert!(!store.get(6).unwrap().opt_in);
        assert!(store.get(2).is_none());
        assert!(store.get(5).is_none());

        // 第二步的任何刪除都發生在第一步全部提交之後
        let ops = store.committed_ops();
        let last_update = ops.iter().rposition(|op| matches!(op, Op::Update(..))).unwrap();
        let first_delete = ops.iter().position(|op| matches!(op, Op::Delete(_))).unwrap();
        assert!(last_update < first_delete);
    }

    #[tokio::test]
    async fn test_failed_first_step_skips_second_step() {
        let now = Utc::now();
        let store = seed(now);
        store.reject_writes_for(4);
        let listener = Arc::new(CapturingJobListener::default());
        let job = build_job(&store, now).listener(listener.clone());

        let token = RunToken::new(7, now);
        let execution = job.run(token).await;

        assert_eq!(execution.status, BatchStatus::Failed);
        assert_eq!(execution.step_executions.len(), 1);
        let failed = execution.step("updateOptInStep").unwrap();
        assert_eq!(failed.failure.as_ref().unwrap().kind, FaultKind::Transaction);
        assert!(execution.step("deleteOldQuotesStep").is_none());

        // 刪除步驟未執行
        assert!(store.get(2).is_some());
        assert!(store.committed_ops().iter().all(|op| !matches!(op, Op::Delete(_))));
        assert_eq!(*listener.finished.lock().unwrap(), vec![(token, BatchStatus::Failed)]);
    }

    #[tokio::test]
    async fn test_failed_second_step_keeps_first_step_commits() {
        let now = Utc::now();
        let store = seed(now);
        store.reject_writes_for(5);

        let execution = build_job(&store, now).run(RunToken::new(2, now)).await;

        assert_eq!(execution.status, BatchStatus::Failed);
        assert!(execution.step("updateOptInStep").unwrap().is_completed());
        assert_eq!(
            execution.step("deleteOldQuotesStep").unwrap().status,
            BatchStatus::Failed
        );
        // 第一步的結果不會被回復
        assert!(!store.get(1).unwrap().opt_in);
        // 刪除步驟的 chunk (2,5) 整個回滾
        assert!(store.get(2).is_some());
        assert!(store.get(5).is_some());
        assert_eq!(execution.step("deleteOldQuotesStep").unwrap().rollback_count, 1);
        assert_eq!(execution.summary()["steps"][1]["rollbacks"], 1);
    }

    #[test]
    fn test_job_debug_lists_step_names() {
        let now = Utc::now();
        let job = build_job(&seed(now), now);
        let rendered = format!("{:?}", job);
        assert!(rendered.contains("processQuotesJob"));
        assert!(rendered.contains("\"updateOptInStep\", \"deleteOldQuotesStep\""));
    }
}
