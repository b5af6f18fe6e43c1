use image::GrayImage;
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

use super::error::EngineError;
use super::recognizer::TextRecognizer;

/// 默认自动分页（psm 3），与 tesseract 命令行默认一致
pub const DEFAULT_PSM: u8 = 3;

#[derive(Debug, Clone)]
pub struct TesseractConfig {
    pub executable: PathBuf,
    pub tessdata_dir: Option<PathBuf>,
    pub psm: u8,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            executable: std::env::var_os("TESSERACT_CMD")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tesseract")),
            tessdata_dir: std::env::var_os("TESSDATA_PREFIX").map(PathBuf::from),
            psm: DEFAULT_PSM,
        }
    }
}

/// 通过命令行调用 Tesseract：灰度图落临时 PNG，结果从 stdout 读取
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self::with_config(TesseractConfig::default())
    }

    pub fn with_config(config: TesseractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TesseractConfig {
        &self.config
    }

    fn check_language(&self, language_code: &str) -> Result<(), EngineError> {
        if let Some(dir) = &self.config.tessdata_dir {
            if !traineddata_path(dir, language_code).exists() {
                return Err(EngineError::MissingLanguage(format!(
                    "{}.traineddata not found in {}",
                    language_code,
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    fn command(&self, input: &Path, language_code: &str) -> Command {
        let mut cmd = Command::new(&self.config.executable);
        cmd.arg(input).arg("stdout");
        if let Some(dir) = &self.config.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.arg("-l")
            .arg(language_code)
            .arg("--psm")
            .arg(self.config.psm.to_string());
        cmd
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for TesseractEngine {
    fn recognize(&self, image: &GrayImage, language_code: &str) -> Result<String, EngineError> {
        self.check_language(language_code)?;

        let temp_input = NamedTempFile::with_suffix(".png")?;
        image.save(temp_input.path())?;

        let output = self
            .command(temp_input.path(), language_code)
            .output()
            .map_err(|source| EngineError::Spawn {
                cmd: self.config.executable.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed(stderr.trim().to_string()));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!("Tesseract returned {} bytes", text.len());
        Ok(text)
    }
}

pub fn traineddata_path(tessdata_dir: &Path, language_code: &str) -> PathBuf {
    tessdata_dir.join(format!("{}.traineddata", language_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_traineddata_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(traineddata_path(dir.path(), "eng"), b"stub").unwrap();

        let engine = TesseractEngine::with_config(TesseractConfig {
            executable: PathBuf::from("tesseract"),
            tessdata_dir: Some(dir.path().to_path_buf()),
            psm: DEFAULT_PSM,
        });

        assert!(engine.check_language("eng").is_ok());
        assert!(matches!(
            engine.check_language("jpn"),
            Err(EngineError::MissingLanguage(_))
        ));
    }

    #[test]
    fn test_unlaunchable_executable_is_spawn_error() {
        let engine = TesseractEngine::with_config(TesseractConfig {
            executable: PathBuf::from("/nonexistent/tesseract-binary"),
            tessdata_dir: None,
            psm: DEFAULT_PSM,
        });

        let img = GrayImage::from_pixel(4, 4, image::Luma([255]));
        let result = engine.recognize(&img, "eng");
        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }

    #[test]
    fn test_command_arguments() {
        let engine = TesseractEngine::with_config(TesseractConfig {
            executable: PathBuf::from("tesseract"),
            tessdata_dir: Some(PathBuf::from("/opt/tessdata")),
            psm: 6,
        });
        let cmd = engine.command(Path::new("/tmp/in.png"), "deu");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec!["/tmp/in.png", "stdout", "--tessdata-dir", "/opt/tessdata", "-l", "deu", "--psm", "6"]
        );
    }
}
