//! 视频解码源
//!
//! `FfmpegVideoSource` 通过 ffprobe 读取尺寸与帧数，再从 ffmpeg 子进程的 stdout
//! 顺序读取 rgb24 原始帧。子进程与临时文件在 `Drop` 中释放，任何退出路径都
//! 不会泄漏句柄。stdout 读尽后检查 ffmpeg 退出码，非零退出是读帧错误而不是
//! 流结束。

use image::DynamicImage;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::VecDeque;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

use super::frame::frame_from_rgb24;
use crate::core::media::{DecodeError, MediaInput, MediaKind, MediaSource};
use crate::core::process::StderrLog;

/// 顺序、有状态的帧读取，不可并发共享
pub trait VideoSource {
    /// 容器上报的总帧数，可能不准
    fn frame_count_hint(&self) -> Option<u64>;

    /// `Ok(None)` 表示流结束
    fn read_frame(&mut self) -> Result<Option<DynamicImage>, DecodeError>;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn frame_count_hint(&self) -> Option<u64> {
        (**self).frame_count_hint()
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>, DecodeError> {
        (**self).read_frame()
    }
}

pub trait VideoOpener: Send + Sync {
    fn open(&self, media: &MediaInput) -> Result<Box<dyn VideoSource>, DecodeError>;
}

/// 内存中的帧序列，可注入读取失败
pub struct MemoryVideoSource {
    frames: VecDeque<DynamicImage>,
    position: u64,
    fail_at: Option<u64>,
    reported_total: Option<u64>,
    released: Arc<AtomicBool>,
}

impl MemoryVideoSource {
    pub fn new(frames: Vec<DynamicImage>) -> Self {
        let total = frames.len() as u64;
        Self {
            frames: frames.into(),
            position: 0,
            fail_at: None,
            reported_total: Some(total),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 读到第 `index` 帧时返回错误
    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// 模拟容器错报帧数
    pub fn with_reported_total(mut self, total: Option<u64>) -> Self {
        self.reported_total = total;
        self
    }

    /// drop 之后变为 true
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

impl VideoSource for MemoryVideoSource {
    fn frame_count_hint(&self) -> Option<u64> {
        self.reported_total
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>, DecodeError> {
        if self.fail_at == Some(self.position) {
            return Err(DecodeError::Stream(format!(
                "failed to read frame {}",
                self.position
            )));
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }
}

impl Drop for MemoryVideoSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    #[serde(default)]
    tags: ProbeTags,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

/// 旧容器把旋转写在 `rotate` 标签里
#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

/// 新版 ffprobe 的 Display Matrix
#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    fn rotation(&self) -> i32 {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| {
                self.tags
                    .rotate
                    .as_deref()
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .map(|r| (r.round() as i64).rem_euclid(360) as i32)
            .unwrap_or(0)
    }
}

/// `width`/`height` 是 ffmpeg 自动旋转后实际输出的帧尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: Option<u64>,
    /// 顺时针角度，归一化到 [0, 360)
    pub rotation: i32,
}

/// 解析 `ffprobe -of json` 输出；`nb_frames` 缺失或为 "N/A" 时帧数未知。
/// 旋转 90/270 度的流宽高互换，与 ffmpeg 的输出一致
pub fn parse_probe_output(json: &str) -> Result<StreamInfo, DecodeError> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| DecodeError::Probe("no video stream".to_string()))?;

    let rotation = stream.rotation();
    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            let (width, height) = if rotation % 180 == 90 {
                (height, width)
            } else {
                (width, height)
            };
            Ok(StreamInfo {
                width,
                height,
                frame_count: stream
                    .nb_frames
                    .as_deref()
                    .and_then(|n| n.trim().parse::<u64>().ok())
                    .filter(|&n| n > 0),
                rotation,
            })
        }
        _ => Err(DecodeError::Probe("video stream has no dimensions".to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

pub struct FfmpegVideoSource {
    info: StreamInfo,
    child: Child,
    stdout: BufReader<ChildStdout>,
    frame_size: usize,
    frames_read: u64,
    stderr: StderrLog,
    // 内存上传的数据落盘后的临时文件，随 source 一起释放
    _staged: Option<NamedTempFile>,
}

impl FfmpegVideoSource {
    pub fn open(path: &Path, config: &FfmpegConfig) -> Result<Self, DecodeError> {
        Self::open_inner(path, config, None)
    }

    /// 先把字节写入带扩展名的临时文件再交给 ffmpeg
    pub fn open_bytes(bytes: &[u8], extension: &str, config: &FfmpegConfig) -> Result<Self, DecodeError> {
        let mut staged = NamedTempFile::with_suffix(format!(".{}", extension))?;
        staged.write_all(bytes)?;
        staged.flush()?;
        let path = staged.path().to_path_buf();
        Self::open_inner(&path, config, Some(staged))
    }

    fn open_inner(
        path: &Path,
        config: &FfmpegConfig,
        staged: Option<NamedTempFile>,
    ) -> Result<Self, DecodeError> {
        let info = probe(path, &config.ffprobe)?;
        info!(
            "🎬 Opening video {} ({}x{}, rotation {}, ~{:?} frames)",
            path.display(),
            info.width,
            info.height,
            info.rotation,
            info.frame_count
        );

        let stderr = StderrLog::new()?;
        let mut child = Command::new(&config.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args([
                "-map", "0:v:0", "-vsync", "0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(stderr.stdio()?)
            .spawn()
            .map_err(|e| DecodeError::Probe(format!("failed to launch ffmpeg: {}", e)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DecodeError::Stream("ffmpeg stdout unavailable".to_string()));
            }
        };

        Ok(Self {
            frame_size: (info.width as usize) * (info.height as usize) * 3,
            info,
            child,
            stdout: BufReader::new(stdout),
            frames_read: 0,
            stderr,
            _staged: staged,
        })
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    /// stdout 已读尽：回收子进程，非零退出码转成读帧错误
    fn finish_decoder(&mut self) -> Result<(), DecodeError> {
        let status = self.child.wait()?;
        if status.success() {
            return Ok(());
        }
        let detail = self.stderr.tail();
        Err(DecodeError::Stream(if detail.is_empty() {
            format!("ffmpeg {} after {} frames", status, self.frames_read)
        } else {
            format!("ffmpeg {} after {} frames: {}", status, self.frames_read, detail)
        }))
    }
}

impl VideoSource for FfmpegVideoSource {
    fn frame_count_hint(&self) -> Option<u64> {
        self.info.frame_count
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>, DecodeError> {
        let mut buf = vec![0u8; self.frame_size];
        let filled = read_full(&mut self.stdout, &mut buf)?;

        if filled == 0 {
            self.finish_decoder()?;
            debug!("End of stream after {} frames", self.frames_read);
            return Ok(None);
        }
        if filled < self.frame_size {
            self.finish_decoder()?;
            return Err(DecodeError::Stream(format!(
                "truncated frame {}: {} of {} bytes",
                self.frames_read, filled, self.frame_size
            )));
        }

        self.frames_read += 1;
        frame_from_rgb24(self.info.width, self.info.height, buf).map(Some)
    }
}

impl Drop for FfmpegVideoSource {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.kill() {
                warn!("Failed to stop ffmpeg: {}", e);
            }
        }
        let _ = self.child.wait();
        info!("🗑️ FfmpegVideoSource: released after {} frames", self.frames_read);
    }
}

fn probe(path: &Path, ffprobe: &Path) -> Result<StreamInfo, DecodeError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,nb_frames:stream_tags=rotate:stream_side_data=rotation",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| DecodeError::Probe(format!("failed to launch ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DecodeError::Probe(stderr.trim().to_string()));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// 读满缓冲区或遇到 EOF，返回实际读取字节数
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, DecodeError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

pub struct FfmpegOpener {
    config: FfmpegConfig,
}

impl FfmpegOpener {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self::new(FfmpegConfig::default())
    }
}

impl VideoOpener for FfmpegOpener {
    fn open(&self, media: &MediaInput) -> Result<Box<dyn VideoSource>, DecodeError> {
        if media.kind() != MediaKind::Video {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{} is not a video",
                media.extension()
            )));
        }
        let source = match media.source() {
            MediaSource::File(path) => FfmpegVideoSource::open(path, &self.config)?,
            MediaSource::Bytes(bytes) => {
                FfmpegVideoSource::open_bytes(bytes, media.extension(), &self.config)?
            }
        };
        Ok(Box::new(source))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media::recognizer::marker_frame;
    use std::io::Cursor;

    #[test]
    fn test_probe_parses_frame_count() {
        let json = r#"{"programs":[],"streams":[{"width":640,"height":360,"nb_frames":"250"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(
            info,
            StreamInfo {
                width: 640,
                height: 360,
                frame_count: Some(250),
                rotation: 0,
            }
        );
    }

    #[test]
    fn test_probe_unknown_frame_count() {
        let na = r#"{"streams":[{"width":640,"height":360,"nb_frames":"N/A"}]}"#;
        assert_eq!(parse_probe_output(na).unwrap().frame_count, None);

        let missing = r#"{"streams":[{"width":640,"height":360}]}"#;
        assert_eq!(parse_probe_output(missing).unwrap().frame_count, None);

        let zero = r#"{"streams":[{"width":640,"height":360,"nb_frames":"0"}]}"#;
        assert_eq!(parse_probe_output(zero).unwrap().frame_count, None);
    }

    #[test]
    fn test_probe_without_stream_is_error() {
        assert!(matches!(
            parse_probe_output(r#"{"streams":[]}"#),
            Err(DecodeError::Probe(_))
        ));
        assert!(matches!(
            parse_probe_output("not json"),
            Err(DecodeError::ProbeJson(_))
        ));
    }

    #[test]
    fn test_read_full_reports_short_read() {
        let mut reader = Cursor::new(vec![1u8; 5]);
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 5);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_memory_source_failure_and_release() {
        let frames = (0..3).map(marker_frame).collect();
        let mut source = MemoryVideoSource::new(frames).failing_at(1);
        let released = source.release_flag();

        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().is_err());
        assert!(!released.load(Ordering::SeqCst));

        drop(source);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_opener_rejects_images() {
        let png = {
            let mut buf = Cursor::new(Vec::new());
            marker_frame(0)
                .write_to(&mut buf, image::ImageOutputFormat::Png)
                .unwrap();
            buf.into_inner()
        };
        let media = MediaInput::from_bytes(png, "still.png").unwrap();
        assert!(matches!(
            FfmpegOpener::default().open(&media),
            Err(DecodeError::UnsupportedFormat(_))
        ));
    }
    #[test]
    fn test_probe_rotation_swaps_dimensions() {
        let side_data = r#"{"streams":[{"width":1920,"height":1080,"nb_frames":"90",
            "side_data_list":[{"side_data_type":"Display Matrix","rotation":-90}]}]}"#;
        let info = parse_probe_output(side_data).unwrap();
        assert_eq!((info.width, info.height, info.rotation), (1080, 1920, 270));

        let tag = r#"{"streams":[{"width":1920,"height":1080,"tags":{"rotate":"90"}}]}"#;
        let info = parse_probe_output(tag).unwrap();
        assert_eq!((info.width, info.height, info.rotation), (1080, 1920, 90));

        let upside_down = r#"{"streams":[{"width":1920,"height":1080,"tags":{"rotate":"180"}}]}"#;
        let info = parse_probe_output(upside_down).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
    }

    #[cfg(unix)]
    mod ffmpeg {
        use super::super::testing::{emit_frames, fake_ffmpeg};
        use super::*;

        fn open(body: &str) -> (tempfile::TempDir, FfmpegVideoSource) {
            let dir = tempfile::tempdir().unwrap();
            let config = fake_ffmpeg(dir.path(), body);
            let source = FfmpegVideoSource::open(&dir.path().join("clip.mp4"), &config).unwrap();
            (dir, source)
        }

        #[test]
        fn test_clean_exit_ends_stream() {
            let (_dir, mut source) = open(&emit_frames(3, "", 0));
            assert_eq!(source.frame_count_hint(), Some(10));
            for _ in 0..3 {
                let frame = source.read_frame().unwrap().unwrap();
                assert_eq!((frame.width(), frame.height()), (2, 2));
            }
            assert!(source.read_frame().unwrap().is_none());
        }

        #[test]
        fn test_decoder_failure_is_stream_error() {
            let (_dir, mut source) = open("echo 'Decoder not found' >&2\nexit 1");
            match source.read_frame() {
                Err(DecodeError::Stream(message)) => {
                    assert!(message.contains("Decoder not found"), "{}", message)
                }
                other => panic!("expected stream error, got {:?}", other.map(|f| f.is_some())),
            }
        }

        #[test]
        fn test_decoder_dying_mid_stream_is_read_error() {
            let (_dir, mut source) = open(&emit_frames(2, "corrupt packet", 1));
            assert!(source.read_frame().unwrap().is_some());
            assert!(source.read_frame().unwrap().is_some());
            let err = source.read_frame().unwrap_err();
            assert!(err.to_string().contains("corrupt packet"));
        }

        #[test]
        fn test_truncated_frame_reports_decoder_error() {
            let (_dir, mut source) = open("head -c 5 /dev/zero\necho 'invalid data' >&2\nexit 1");
            let err = source.read_frame().unwrap_err();
            assert!(err.to_string().contains("invalid data"));
        }
    }
}
