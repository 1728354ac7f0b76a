use crate::core::cron::CronExpr;
use crate::domain::model::{JobExecution, RunToken};
use crate::domain::ports::{JobFactory, JobListener};
use crate::utils::error::{BatchError, Result};
use crate::utils::monitor::SystemMonitor;
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// 觸發 Job 的時間規則
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// 啟動後立即觸發一次，之後每隔固定時間觸發
    FixedRate(Duration),
    /// 在每個符合 cron 表達式的時間點觸發
    Cron(CronExpr),
}

impl Trigger {
    /// 固定頻率觸發器；間隔必須大於零
    pub fn fixed_rate(period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(BatchError::InvalidConfigValueError {
                field: "schedule.fixed_rate_ms".to_string(),
                value: "0".to_string(),
                reason: "Fixed-rate period must be longer than zero".to_string(),
            });
        }
        Ok(Trigger::FixedRate(period))
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::FixedRate(period) => write!(f, "fixed-rate {}ms", period.as_millis()),
            Trigger::Cron(expr) => write!(f, "cron '{}'", expr),
        }
    }
}

/// 每次觸發時建立新的 Job 並執行
///
/// 錯誤一律在此記錄，不會傳回給觸發器，下一次觸發照常進行。
pub struct JobLauncher {
    factory: Arc<dyn JobFactory>,
    last_run_id: AtomicU64,
    monitor: Option<SystemMonitor>,
    listeners: Vec<Arc<dyn JobListener>>,
}

impl JobLauncher {
    pub fn new(factory: Arc<dyn JobFactory>) -> Self {
        Self {
            factory,
            last_run_id: AtomicU64::new(0),
            monitor: None,
            listeners: Vec::new(),
        }
    }

    pub fn with_monitor(mut self, monitor: SystemMonitor) -> Self {
        if monitor.is_enabled() {
            self.monitor = Some(monitor);
        }
        self
    }

    pub fn listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn job_name(&self) -> &str {
        self.factory.job_name()
    }

    pub fn monitor(&self) -> Option<&SystemMonitor> {
        self.monitor.as_ref()
    }

    /// 目前為止已配發的 run id 數量
    pub fn launched(&self) -> u64 {
        self.last_run_id.load(Ordering::SeqCst)
    }

    pub async fn launch(&self) -> Option<JobExecution> {
        let now = Utc::now();
        let run_token = RunToken::new(self.last_run_id.fetch_add(1, Ordering::SeqCst) + 1, now);

        let job = match self.factory.create_job(now) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    "❌ Could not create job [{}] for {}: {} (Category: {:?}, Severity: {:?})",
                    self.factory.job_name(),
                    run_token,
                    e,
                    e.category(),
                    e.severity()
                );
                tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
                return None;
            }
        };
        let job = self
            .listeners
            .iter()
            .fold(job, |job, listener| job.listener(listener.clone()));

        if let Some(monitor) = &self.monitor {
            monitor.run_started(&run_token);
        }

        let execution = job.run(run_token).await;

        if let Some(monitor) = &self.monitor {
            monitor.run_finished(&run_token);
        }
        tracing::debug!("📋 Job summary: {}", execution.summary());

        Some(execution)
    }
}

/// 擁有所有觸發器；每個觸發器一個 tokio task，彼此獨立，可能重疊執行
pub struct Scheduler {
    launcher: Arc<JobLauncher>,
    triggers: Vec<Trigger>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(launcher: Arc<JobLauncher>) -> Self {
        Self {
            launcher,
            triggers: Vec::new(),
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn start(&mut self) {
        if self.is_running() {
            tracing::warn!("Scheduler already started");
            return;
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        for trigger in &self.triggers {
            if matches!(trigger, Trigger::FixedRate(period) if period.is_zero()) {
                tracing::error!("❌ Ignoring {}: period must be longer than zero", trigger);
                continue;
            }
            tracing::info!(
                "⏰ Scheduling job [{}] with {}",
                self.launcher.job_name(),
                trigger
            );
            let launcher = self.launcher.clone();
            let cancel = self.cancel.child_token();
            let handle = match trigger.clone() {
                Trigger::FixedRate(period) => {
                    tokio::spawn(run_fixed_rate(period, launcher, cancel))
                }
                Trigger::Cron(expr) => tokio::spawn(run_cron(expr, launcher, cancel)),
            };
            self.handles.push(handle);
        }
    }

    /// 停止所有觸發器；進行中的 Job 會執行完畢後才返回
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!("Trigger task ended abnormally: {}", e);
            }
        }
        tracing::info!("🛑 Scheduler stopped");
    }
}

async fn run_fixed_rate(period: Duration, launcher: Arc<JobLauncher>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        launcher.launch().await;
    }
}

async fn run_cron(expr: CronExpr, launcher: Arc<JobLauncher>, cancel: CancellationToken) {
    loop {
        let now = Utc::now();
        let Some(next) = expr.next_after(now) else {
            tracing::warn!("Cron '{}' has no future fire time; trigger stopped", expr);
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!("Next cron firing at {} (in {:?})", next, wait);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }
        launcher.launch().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::Job;
    use crate::domain::model::BatchStatus;
    use chrono::DateTime;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
        nows: Mutex<Vec<DateTime<Utc>>>,
        fail: bool,
    }

    impl JobFactory for CountingFactory {
        fn job_name(&self) -> &str {
            "noopJob"
        }

        fn create_job(&self, now: DateTime<Utc>) -> Result<Job> {
            self.created.fetch_add(1, Ordering::SeqCst);
            self.nows.lock().unwrap().push(now);
            if self.fail {
                return Err(BatchError::RetentionError {
                    details: "cutoff out of range".to_string(),
                });
            }
            Ok(Job::new("noopJob"))
        }
    }

    #[tokio::test]
    async fn test_launcher_assigns_increasing_run_tokens() {
        let factory = Arc::new(CountingFactory::default());
        let launcher = JobLauncher::new(factory.clone());

        let first = launcher.launch().await.unwrap();
        let second = launcher.launch().await.unwrap();

        assert_eq!(first.run_token.run_id, 1);
        assert_eq!(second.run_token.run_id, 2);
        assert!(second.run_token.timestamp >= first.run_token.timestamp);
        assert_eq!(first.status, BatchStatus::Completed);
        assert_eq!(launcher.launched(), 2);

        // 每次觸發都以當下時間建立新的 Job
        let nows = factory.nows.lock().unwrap();
        assert_eq!(nows.len(), 2);
        assert_eq!(nows[0], first.run_token.timestamp);
    }

    #[tokio::test]
    async fn test_launcher_swallows_factory_errors() {
        let factory = Arc::new(CountingFactory {
            fail: true,
            ..Default::default()
        });
        let launcher = JobLauncher::new(factory.clone());

        assert!(launcher.launch().await.is_none());
        assert!(launcher.launch().await.is_none());
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fixed_rate_fires_immediately_and_repeats_until_stopped() {
        let factory = Arc::new(CountingFactory::default());
        let launcher = Arc::new(JobLauncher::new(factory.clone()));
        let mut scheduler =
            Scheduler::new(launcher).trigger(Trigger::FixedRate(Duration::from_millis(40)));

        scheduler.start();
        assert!(scheduler.is_running());
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());

        let fired = factory.created.load(Ordering::SeqCst);
        assert!(fired >= 2, "expected at least two firings, got {}", fired);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(factory.created.load(Ordering::SeqCst), fired);
    }

    #[tokio::test]
    async fn test_cron_and_fixed_rate_triggers_are_independent() {
        let factory = Arc::new(CountingFactory::default());
        let launcher = Arc::new(JobLauncher::new(factory.clone()));
        let mut scheduler = Scheduler::new(launcher.clone())
            .trigger(Trigger::FixedRate(Duration::from_secs(3600)))
            .trigger(Trigger::Cron(CronExpr::parse("* * * * * *").unwrap()));
        assert_eq!(scheduler.triggers().len(), 2);

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(2200)).await;
        scheduler.stop().await;

        // 固定頻率只觸發啟動時那一次，其餘來自 cron
        let fired = factory.created.load(Ordering::SeqCst);
        assert!(fired >= 2, "expected fixed-rate and cron firings, got {}", fired);
        assert_eq!(launcher.launched() as usize, fired);
    }

    #[tokio::test]
    async fn test_zero_fixed_rate_is_rejected() {
        assert!(matches!(
            Trigger::fixed_rate(Duration::ZERO),
            Err(BatchError::InvalidConfigValueError { .. })
        ));
        assert_eq!(
            Trigger::fixed_rate(Duration::from_secs(1)).unwrap(),
            Trigger::FixedRate(Duration::from_secs(1))
        );

        // 直接建構的零間隔觸發器不會啟動
        let factory = Arc::new(CountingFactory::default());
        let mut scheduler = Scheduler::new(Arc::new(JobLauncher::new(factory.clone())))
            .trigger(Trigger::FixedRate(Duration::ZERO));
        scheduler.start();
        assert!(!scheduler.is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(
            Trigger::FixedRate(Duration::from_millis(6_000_000)).to_string(),
            "fixed-rate 6000000ms"
        );
        let cron = Trigger::Cron(CronExpr::parse("0 * * * * SUN").unwrap());
        assert_eq!(cron.to_string(), "cron '0 * * * * SUN'");
    }
}
