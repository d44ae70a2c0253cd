use std::sync::Mutex;

use async_trait::async_trait;
use jobcore_core::{CoreError, CoreResult};

/// 作业运行时可用的上下文
#[async_trait]
pub trait JobContext: Send + Sync {
    /// 向核心上报进度，内容原样存入任务的 check-in 字段
    async fn check_in(&self, message: &str) -> CoreResult<()>;

    /// 是否收到了停止信号
    fn is_stopped(&self) -> bool {
        false
    }
}

/// 把 check-in 记录在内存中的上下文
#[derive(Debug, Default)]
pub struct RecordingContext {
    check_ins: Mutex<Vec<String>>,
    stopped: Mutex<bool>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        if let Ok(mut stopped) = self.stopped.lock() {
            *stopped = true;
        }
    }

    pub fn check_ins(&self) -> Vec<String> {
        self.check_ins
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobContext for RecordingContext {
    async fn check_in(&self, message: &str) -> CoreResult<()> {
        self.check_ins
            .lock()
            .map_err(|_| CoreError::Internal("check-in 记录锁已损坏".to_string()))?
            .push(message.to_string());
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.stopped.lock().map(|s| *s).unwrap_or(false)
    }
}
