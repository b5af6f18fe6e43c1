//! 外部进程的 stderr 落到临时文件，进程异常退出时取末尾作为错误信息

use std::io::{Read, Seek, SeekFrom};
use std::process::Stdio;
use tempfile::NamedTempFile;

const TAIL_BYTES: u64 = 4096;

pub struct StderrLog {
    file: NamedTempFile,
}

impl StderrLog {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            file: NamedTempFile::new()?,
        })
    }

    /// 交给 `Command::stderr`，每次调用都是新句柄
    pub fn stdio(&self) -> std::io::Result<Stdio> {
        Ok(Stdio::from(self.file.reopen()?))
    }

    /// 最后 4KB 输出，去掉首尾空白
    pub fn tail(&self) -> String {
        let Ok(mut file) = self.file.reopen() else {
            return String::new();
        };
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        if len > TAIL_BYTES && file.seek(SeekFrom::Start(len - TAIL_BYTES)).is_err() {
            return String::new();
        }
        let mut buf = Vec::new();
        if file.read_to_end(&mut buf).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&buf).trim().to_string()
    }
}
