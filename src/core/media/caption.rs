//! 外部图像描述进程
//!
//! 加载时启动一个常驻 worker：`<cmd> --model <id>`。worker 载入模型后在 stdout
//! 输出一行 `ready`，之后每从 stdin 读到一行图片路径，就在 stdout 回一行描述。
//! 模型权重只在 worker 启动时加载一次；worker 意外退出后下一次调用会重启它。

use image::DynamicImage;
use log::{info, warn};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

use super::describer::{CaptionModel, ModelLoader};
use super::error::ModelError;
use crate::core::process::StderrLog;

pub const DEFAULT_CAPTION_MODEL: &str = "Salesforce/blip-image-captioning-base";

/// worker 完成模型加载后输出的握手行
pub const READY_LINE: &str = "ready";

pub struct CommandCaptionLoader {
    executable: PathBuf,
    model_id: String,
}

impl CommandCaptionLoader {
    pub fn new(executable: impl Into<PathBuf>, model_id: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            model_id: model_id.into(),
        }
    }
}

impl ModelLoader for CommandCaptionLoader {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn load(&self) -> Result<Arc<dyn CaptionModel>, ModelError> {
        let worker = CaptionWorker::spawn(&self.executable, &self.model_id)?;
        Ok(Arc::new(CommandCaptionModel {
            executable: self.executable.clone(),
            model_id: self.model_id.clone(),
            worker: Mutex::new(Some(worker)),
        }))
    }
}

pub struct CommandCaptionModel {
    executable: PathBuf,
    model_id: String,
    // worker 一次只处理一张图
    worker: Mutex<Option<CaptionWorker>>,
}

impl CaptionModel for CommandCaptionModel {
    fn caption(&self, image: &DynamicImage) -> Result<String, ModelError> {
        let staged = NamedTempFile::with_suffix(".png")?;
        image
            .save(staged.path())
            .map_err(|e| ModelError::Inference(format!("failed to stage image: {}", e)))?;

        let mut slot = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        let mut worker = match slot.take() {
            Some(worker) => worker,
            None => {
                warn!("🔄 Restarting caption worker for {}", self.model_id);
                CaptionWorker::spawn(&self.executable, &self.model_id)?
            }
        };

        // 失败的 worker 不放回，drop 时结束进程
        let result = worker.request(staged.path());
        if result.is_ok() {
            *slot = Some(worker);
        }
        result
    }
}

struct CaptionWorker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: StderrLog,
    served: u64,
}

impl CaptionWorker {
    fn spawn(executable: &Path, model_id: &str) -> Result<Self, ModelError> {
        info!("🔧 Starting caption worker {} ({})", executable.display(), model_id);
        let stderr = StderrLog::new()?;
        let mut child = Command::new(executable)
            .arg("--model")
            .arg(model_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr.stdio()?)
            .spawn()
            .map_err(|e| {
                ModelError::LoadFailed(format!(
                    "failed to launch caption command {}: {}",
                    executable.display(),
                    e
                ))
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ModelError::LoadFailed(
                    "caption worker pipes unavailable".to_string(),
                ));
            }
        };

        let mut worker = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr,
            served: 0,
        };
        match worker.read_line()? {
            Some(line) if line.trim() == READY_LINE => Ok(worker),
            Some(line) => Err(ModelError::LoadFailed(format!(
                "unexpected handshake from caption worker: {}",
                line
            ))),
            None => Err(ModelError::LoadFailed(format!(
                "caption worker exited during load: {}",
                worker.exit_detail()
            ))),
        }
    }

    fn request(&mut self, image: &Path) -> Result<String, ModelError> {
        let sent = writeln!(self.stdin, "{}", image.display()).and_then(|_| self.stdin.flush());
        if let Err(e) = sent {
            return Err(ModelError::Inference(format!(
                "caption worker not accepting input ({}): {}",
                e,
                self.exit_detail()
            )));
        }

        match self.read_line()? {
            Some(caption) => {
                self.served += 1;
                Ok(caption)
            }
            None => Err(ModelError::Inference(format!(
                "caption worker stopped: {}",
                self.exit_detail()
            ))),
        }
    }

    fn read_line(&mut self) -> Result<Option<String>, ModelError> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
    }

    fn exit_detail(&mut self) -> String {
        let status = match self.child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            _ => "output closed".to_string(),
        };
        match self.stderr.tail() {
            detail if detail.is_empty() => status,
            detail => format!("{}: {}", status, detail),
        }
    }
}

impl Drop for CaptionWorker {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.kill() {
                warn!("Failed to stop caption worker: {}", e);
            }
        }
        let _ = self.child.wait();
        info!("🗑️ Caption worker released after {} captions", self.served);
    }
}
