use crate::domain::model::RunToken;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// 單次 Job 執行期間的資源使用量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunUsage {
    pub run_id: u64,
    pub duration: Duration,
    pub start_memory_kb: u64,
    pub end_memory_kb: u64,
    pub peak_memory_kb: u64,
}

impl RunUsage {
    /// 結束時與開始時的記憶體差 (KB)，可能為負
    pub fn memory_delta_kb(&self) -> i64 {
        self.end_memory_kb as i64 - self.start_memory_kb as i64
    }
}

impl fmt::Display for RunUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run-{} took {:?}, memory {:.1}MB -> {:.1}MB ({:+.1}MB, peak {:.1}MB)",
            self.run_id,
            self.duration,
            kb_to_mb(self.start_memory_kb),
            kb_to_mb(self.end_memory_kb),
            self.memory_delta_kb() as f64 / 1024.0,
            kb_to_mb(self.peak_memory_kb)
        )
    }
}

fn kb_to_mb(kb: u64) -> f64 {
    kb as f64 / 1024.0
}

#[derive(Debug, Clone, Copy)]
struct OpenRun {
    started: Instant,
    start_memory_kb: u64,
    peak_memory_kb: u64,
}

/// 依 run id 記錄進行中的執行；觸發器重疊時各自獨立計算
#[derive(Debug, Default)]
pub struct RunLedger {
    open: HashMap<u64, OpenRun>,
    finished_runs: u64,
    longest_run: Option<Duration>,
    process_peak_kb: u64,
}

impl RunLedger {
    pub fn start(&mut self, run_id: u64, memory_kb: u64, at: Instant) {
        self.observe(memory_kb);
        self.open.insert(
            run_id,
            OpenRun {
                started: at,
                start_memory_kb: memory_kb,
                peak_memory_kb: memory_kb,
            },
        );
    }

    /// 一次取樣會更新所有進行中執行的峰值
    pub fn observe(&mut self, memory_kb: u64) {
        self.process_peak_kb = self.process_peak_kb.max(memory_kb);
        for run in self.open.values_mut() {
            run.peak_memory_kb = run.peak_memory_kb.max(memory_kb);
        }
    }

    pub fn finish(&mut self, run_id: u64, memory_kb: u64, at: Instant) -> Option<RunUsage> {
        self.observe(memory_kb);
        let run = self.open.remove(&run_id)?;
        let duration = at.saturating_duration_since(run.started);

        self.finished_runs += 1;
        self.longest_run = Some(self.longest_run.map_or(duration, |d| d.max(duration)));

        Some(RunUsage {
            run_id,
            duration,
            start_memory_kb: run.start_memory_kb,
            end_memory_kb: memory_kb,
            peak_memory_kb: run.peak_memory_kb,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.open.len()
    }

    pub fn finished_runs(&self) -> u64 {
        self.finished_runs
    }

    pub fn longest_run(&self) -> Option<Duration> {
        self.longest_run
    }

    pub fn process_peak_kb(&self) -> u64 {
        self.process_peak_kb
    }
}

/// 每次 Job 執行前後取樣本行程的 CPU 與記憶體
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    ledger: Mutex<RunLedger>,
    enabled: bool,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy)]
struct ProcessSample {
    cpu_usage: f32,
    memory_kb: u64,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        // 取不到 PID 的平台上直接停用監控
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                if enabled {
                    tracing::warn!("System monitoring disabled: {}", e);
                }
                None
            }
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
            started: Instant::now(),
            ledger: Mutex::new(RunLedger::default()),
            enabled: enabled && pid.is_some(),
        }
    }

    fn sample(&self) -> Option<ProcessSample> {
        if !self.enabled {
            return None;
        }
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        let process = system.process(pid)?;

        Some(ProcessSample {
            cpu_usage: process.cpu_usage(),
            memory_kb: process.memory() / 1024,
        })
    }

    pub fn run_started(&self, run_token: &RunToken) {
        let Some(sample) = self.sample() else {
            return;
        };
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.start(run_token.run_id, sample.memory_kb, Instant::now());
            tracing::info!(
                "📊 {} start - CPU: {:.1}%, Memory: {:.1}MB, runs in flight: {}",
                run_token,
                sample.cpu_usage,
                kb_to_mb(sample.memory_kb),
                ledger.in_flight()
            );
        }
    }

    pub fn run_finished(&self, run_token: &RunToken) -> Option<RunUsage> {
        let sample = self.sample()?;
        let usage = self
            .ledger
            .lock()
            .ok()?
            .finish(run_token.run_id, sample.memory_kb, Instant::now())?;
        tracing::info!("📊 {} - CPU: {:.1}%", usage, sample.cpu_usage);
        Some(usage)
    }

    pub fn log_final_stats(&self) {
        if !self.enabled {
            return;
        }
        if let Some(sample) = self.sample() {
            if let Ok(mut ledger) = self.ledger.lock() {
                ledger.observe(sample.memory_kb);
            }
        }
        if let Ok(ledger) = self.ledger.lock() {
            tracing::info!(
                "📊 Final Stats - Uptime: {:?}, runs measured: {}, longest run: {:?}, process peak memory: {:.1}MB",
                self.started.elapsed(),
                ledger.finished_runs(),
                ledger.longest_run().unwrap_or_default(),
                kb_to_mb(ledger.process_peak_kb())
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// 未啟用 cli feature 時不量測
#[cfg(not(feature = "cli"))]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn run_started(&self, _run_token: &RunToken) {}

    pub fn run_finished(&self, _run_token: &RunToken) -> Option<RunUsage> {
        None
    }

    pub fn log_final_stats(&self) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}
