use crate::core::processor::PassThroughProcessor;
use crate::domain::model::{BatchStatus, Quote, StepExecution, StepFailure};
use crate::domain::ports::{ItemProcessor, ItemReader, ItemWriter, QuoteStore, StepListener};
use crate::utils::error::{BatchError, Result};
use chrono::Utc;
use std::sync::Arc;

/// 記錄每個 Step 的處理筆數
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingStepListener;

impl StepListener for LoggingStepListener {
    fn after_step(&self, execution: &StepExecution) {
        tracing::info!(
            "Step [{}] processed {} items.",
            execution.step_name,
            execution.write_count
        );
        if let Some(failure) = &execution.failure {
            tracing::warn!(
                "Step [{}] ended {} ({:?}): {}",
                execution.step_name,
                execution.status,
                failure.kind,
                failure.message
            );
        }
    }
}

/// Chunk 導向的 Step：讀取 → 轉換 → 寫入，每個 chunk 一個交易
///
/// 狀態轉移：`CREATED → RUNNING → {COMPLETED, FAILED}`。
pub struct ChunkStep {
    name: String,
    chunk_size: usize,
    store: Arc<dyn QuoteStore>,
    reader: Box<dyn ItemReader>,
    processor: Box<dyn ItemProcessor>,
    writer: Box<dyn ItemWriter>,
    listeners: Vec<Arc<dyn StepListener>>,
    status: BatchStatus,
}

impl ChunkStep {
    pub fn builder(name: impl Into<String>, store: Arc<dyn QuoteStore>) -> ChunkStepBuilder {
        ChunkStepBuilder {
            name: name.into(),
            store,
            chunk_size: 50,
            reader: None,
            processor: None,
            writer: None,
            listeners: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 執行 Step；失敗不會以 `Err` 回傳，而是記錄在 `StepExecution.failure`
    pub async fn execute(&mut self) -> StepExecution {
        let mut execution = StepExecution::new(self.name.clone());
        execution.started_at = Some(Utc::now());

        if self.status.is_terminal() {
            self.reader.reset();
        }
        self.status = BatchStatus::Running;
        execution.status = BatchStatus::Running;

        for listener in &self.listeners {
            listener.before_step(&execution);
        }

        tracing::info!("▶️ Executing step: [{}]", self.name);

        let outcome = self.process_chunks(&mut execution).await;

        self.status = match &outcome {
            Ok(()) => BatchStatus::Completed,
            Err(e) => {
                tracing::error!("❌ Step [{}] failed: {}", self.name, e);
                execution.failure = Some(StepFailure::from(e));
                BatchStatus::Failed
            }
        };
        execution.status = self.status;
        execution.ended_at = Some(Utc::now());

        for listener in &self.listeners {
            listener.after_step(&execution);
        }

        execution
    }

    async fn process_chunks(&mut self, execution: &mut StepExecution) -> Result<()> {
        let mut chunk_number: u64 = 0;

        loop {
            let items = self.read_chunk().await?;
            if items.is_empty() {
                return Ok(());
            }
            chunk_number += 1;
            execution.read_count += items.len() as u64;

            // 轉換失敗時整個 chunk 不會寫入
            let mut outputs = Vec::with_capacity(items.len());
            for item in items {
                match self.processor.process(item)? {
                    Some(output) => outputs.push(output),
                    None => execution.filter_count += 1,
                }
            }

            if outputs.is_empty() {
                continue;
            }

            self.write_chunk(execution, chunk_number, &outputs).await?;
            execution.write_count += outputs.len() as u64;
            execution.commit_count += 1;

            tracing::debug!(
                "💾 [{}] chunk {} committed ({} items)",
                self.name,
                chunk_number,
                outputs.len()
            );
        }
    }

    async fn read_chunk(&mut self) -> Result<Vec<Quote>> {
        let mut items = Vec::with_capacity(self.chunk_size);
        while items.len() < self.chunk_size {
            match self.reader.read().await? {
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(items)
    }

    async fn write_chunk(
        &self,
        execution: &mut StepExecution,
        chunk_number: u64,
        outputs: &[Quote],
    ) -> Result<()> {
        let mut tx = self.store.begin().await?;

        let written = match self.writer.write(tx.as_mut(), outputs).await {
            Ok(()) => tx.commit().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            execution.rollback_count += 1;
            // 交易在 drop 時也會回滾，這裡明確回滾以便記錄
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(
                    "[{}] rollback of chunk {} reported: {}",
                    self.name,
                    chunk_number,
                    rollback_err
                );
            }
            return Err(BatchError::TransactionError {
                step: self.name.clone(),
                chunk: chunk_number,
                source: Box::new(e),
            });
        }

        Ok(())
    }
}

pub struct ChunkStepBuilder {
    name: String,
    store: Arc<dyn QuoteStore>,
    chunk_size: usize,
    reader: Option<Box<dyn ItemReader>>,
    processor: Option<Box<dyn ItemProcessor>>,
    writer: Option<Box<dyn ItemWriter>>,
    listeners: Vec<Arc<dyn StepListener>>,
}

impl ChunkStepBuilder {
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn reader(mut self, reader: impl ItemReader + 'static) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    pub fn processor(mut self, processor: impl ItemProcessor + 'static) -> Self {
        self.processor = Some(Box::new(processor));
        self
    }

    pub fn writer(mut self, writer: impl ItemWriter + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    pub fn listener(mut self, listener: Arc<dyn StepListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> Result<ChunkStep> {
        if self.chunk_size == 0 {
            return Err(BatchError::InvalidConfigValueError {
                field: format!("{}.chunk_size", self.name),
                value: "0".to_string(),
                reason: "Chunk size must be at least 1".to_string(),
            });
        }
        let reader = self.reader.ok_or_else(|| BatchError::MissingConfigError {
            field: format!("{}.reader", self.name),
        })?;
        let writer = self.writer.ok_or_else(|| BatchError::MissingConfigError {
            field: format!("{}.writer", self.name),
        })?;
        let processor = self
            .processor
            .unwrap_or_else(|| Box::new(PassThroughProcessor) as Box<dyn ItemProcessor>);

        Ok(ChunkStep {
            name: self.name,
            chunk_size: self.chunk_size,
            store: self.store,
            reader,
            processor,
            writer,
            listeners: self.listeners,
            status: BatchStatus::Created,
        })
    }
}
