//! 诊断信息通道 - 适配器边界吞掉的错误在这里留痕

use log::{error, warn};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decode,
    Recognition,
    Sampling,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// 一条面向用户的诊断（人类可读，不含调用栈）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    /// 视频帧序号（单帧识别失败时）
    pub frame_index: Option<u64>,
    pub message: String,
}

/// 线程安全的诊断收集器，并行识别时多个 worker 共用
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self, stage: Stage, frame_index: Option<u64>, message: impl Into<String>) {
        let message = message.into();
        error!("❌ [{:?}] {}", stage, message);
        self.push(Diagnostic {
            stage,
            severity: Severity::Error,
            frame_index,
            message,
        });
    }

    pub fn warn(&self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        warn!("⚠️ [{:?}] {}", stage, message);
        self.push(Diagnostic {
            stage,
            severity: Severity::Warning,
            frame_index: None,
            message,
        });
    }

    // 某个 worker panic 后锁会中毒，已收集的条目仍然有效
    fn entries(&self) -> MutexGuard<'_, Vec<Diagnostic>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, diagnostic: Diagnostic) {
        self.entries().push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries().clone()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_in_order() {
        let diagnostics = Diagnostics::new();
        diagnostics.error(Stage::Recognition, Some(2), "engine crashed");
        diagnostics.warn(Stage::Sampling, "stream ended early");

        let entries = diagnostics.into_vec();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].frame_index, Some(2));
        assert_eq!(entries[0].severity, Severity::Error);
        assert_eq!(entries[1].stage, Stage::Sampling);
    }
    #[test]
    fn test_poisoned_lock_keeps_reports() {
        let diagnostics = std::sync::Arc::new(Diagnostics::new());
        diagnostics.warn(Stage::Sampling, "before");

        let poisoner = diagnostics.clone();
        let joined = std::thread::spawn(move || {
            let _guard = poisoner.entries.lock().unwrap();
            panic!("worker crashed while holding the lock");
        })
        .join();
        assert!(joined.is_err());
        assert!(diagnostics.entries.is_poisoned());

        diagnostics.error(Stage::Recognition, Some(4), "after");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.snapshot()[1].message, "after");
    }
}
