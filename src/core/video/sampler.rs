//! 帧采样器 - 顺序解码，每 N 帧产出一帧
//!
//! 采样器按值持有视频源：序列结束（流尽、读失败、取消）时立即释放源，
//! 采样器被提前丢弃时源随之释放。迭代器消费后不可重启。

use log::{debug, info, warn};
use std::num::NonZeroU32;

use super::frame::{FrameSample, ProgressState};
use super::source::VideoSource;
use crate::core::cancel::CancelToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplerEnd {
    Running,
    /// 源报告流结束
    Exhausted,
    /// 中途读帧失败，已产出的帧仍然有效
    ReadFailed(String),
    Cancelled,
}

pub struct FrameSampler<'a, S: VideoSource> {
    source: Option<S>,
    stride: u64,
    next_index: u64,
    progress: ProgressState,
    end: SamplerEnd,
    cancel: Option<CancelToken>,
    observer: Option<Box<dyn FnMut(&ProgressState) + 'a>>,
}

impl<'a, S: VideoSource> FrameSampler<'a, S> {
    pub fn new(source: S, stride: NonZeroU32) -> Self {
        let progress = ProgressState::new(source.frame_count_hint());
        Self {
            source: Some(source),
            stride: u64::from(stride.get()),
            next_index: 0,
            progress,
            end: SamplerEnd::Running,
            cancel: None,
            observer: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 每解码一帧（无论是否被选中）回调一次
    pub fn with_progress<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&ProgressState) + 'a,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    pub fn end(&self) -> &SamplerEnd {
        &self.end
    }

    pub fn is_source_released(&self) -> bool {
        self.source.is_none()
    }

    fn finish(&mut self, end: SamplerEnd) {
        self.end = end;
        // 释放解码句柄
        self.source = None;
        debug!(
            "Sampler finished after {} frames: {:?}",
            self.progress.current, self.end
        );
    }
}

impl<S: VideoSource> Iterator for FrameSampler<'_, S> {
    type Item = FrameSample;

    fn next(&mut self) -> Option<FrameSample> {
        loop {
            if self.end != SamplerEnd::Running {
                return None;
            }

            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                info!("⏹️ Sampling cancelled at frame {}", self.next_index);
                self.finish(SamplerEnd::Cancelled);
                return None;
            }

            let read = match self.source.as_mut() {
                Some(source) => source.read_frame(),
                None => return None,
            };

            match read {
                Ok(Some(image)) => {
                    let index = self.next_index;
                    self.next_index += 1;
                    self.progress.advance();
                    if let Some(observer) = self.observer.as_mut() {
                        observer(&self.progress);
                    }

                    if index % self.stride == 0 {
                        return Some(FrameSample::new(index, image));
                    }
                }
                Ok(None) => {
                    self.finish(SamplerEnd::Exhausted);
                    return None;
                }
                Err(e) => {
                    warn!("⚠️ Frame read failed at {}: {}", self.next_index, e);
                    self.finish(SamplerEnd::ReadFailed(e.to_string()));
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media::recognizer::marker_frame;
    use crate::core::video::source::MemoryVideoSource;
    use std::sync::atomic::Ordering;

    fn stride(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn video(frames: u8) -> MemoryVideoSource {
        MemoryVideoSource::new((0..frames).map(marker_frame).collect())
    }

    #[test]
    fn test_stride_one_samples_every_frame() {
        let indices: Vec<u64> = FrameSampler::new(video(5), stride(1))
            .map(|s| s.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_stride_selects_multiples() {
        let indices: Vec<u64> = FrameSampler::new(video(10), stride(3))
            .map(|s| s.index)
            .collect();
        assert_eq!(indices, vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_samples_carry_their_own_frame() {
        for sample in FrameSampler::new(video(9), stride(4)) {
            assert_eq!(sample.image.to_luma8().get_pixel(0, 0)[0] as u64, sample.index);
        }
    }

    #[test]
    fn test_stride_larger_than_video() {
        let indices: Vec<u64> = FrameSampler::new(video(5), stride(60))
            .map(|s| s.index)
            .collect();
        assert_eq!(indices, vec![0]);
    }

    #[test]
    fn test_progress_reported_for_skipped_frames() {
        let mut seen = Vec::new();
        {
            let sampler = FrameSampler::new(video(4), stride(3))
                .with_progress(|p| seen.push((p.current, p.fraction())));
            assert_eq!(sampler.count(), 2);
        }
        assert_eq!(
            seen,
            vec![(1, Some(0.25)), (2, Some(0.5)), (3, Some(0.75)), (4, Some(1.0))]
        );
    }

    #[test]
    fn test_unknown_total_is_indeterminate() {
        let source = video(3).with_reported_total(None);
        let mut fractions = Vec::new();
        FrameSampler::new(source, stride(1))
            .with_progress(|p| fractions.push(p.fraction()))
            .for_each(drop);
        assert_eq!(fractions, vec![None, None, None]);
    }

    #[test]
    fn test_underreported_total_clamps() {
        let source = video(8).with_reported_total(Some(2));
        let mut sampler = FrameSampler::new(source, stride(2));
        let emitted = sampler.by_ref().count();
        assert_eq!(emitted, 4);
        assert_eq!(sampler.progress().current, 8);
        assert_eq!(sampler.progress().fraction(), Some(1.0));
    }

    #[test]
    fn test_read_failure_ends_early_and_releases() {
        let source = video(6).failing_at(4);
        let released = source.release_flag();
        let mut sampler = FrameSampler::new(source, stride(1));

        let indices: Vec<u64> = sampler.by_ref().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(matches!(sampler.end(), SamplerEnd::ReadFailed(_)));
        assert!(released.load(Ordering::SeqCst));
        assert!(sampler.next().is_none());
    }

    #[test]
    fn test_exhausted_releases_source() {
        let source = video(2);
        let released = source.release_flag();
        let mut sampler = FrameSampler::new(source, stride(1));
        sampler.by_ref().for_each(drop);
        assert_eq!(sampler.end(), &SamplerEnd::Exhausted);
        assert!(sampler.is_source_released());
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_stops_reads() {
        let token = CancelToken::new();
        let source = video(10);
        let released = source.release_flag();
        let mut sampler = FrameSampler::new(source, stride(1)).with_cancel(token.clone());

        assert_eq!(sampler.next().map(|s| s.index), Some(0));
        assert_eq!(sampler.next().map(|s| s.index), Some(1));
        token.cancel();
        assert!(sampler.next().is_none());
        assert_eq!(sampler.end(), &SamplerEnd::Cancelled);
        assert_eq!(sampler.progress().current, 2);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropping_sampler_releases_source() {
        let source = video(10);
        let released = source.release_flag();
        let mut sampler = FrameSampler::new(source, stride(1));
        sampler.next();
        assert!(!released.load(Ordering::SeqCst));
        drop(sampler);
        assert!(released.load(Ordering::SeqCst));
    }
    #[test]
    fn test_zero_frame_video() {
        let mut sampler = FrameSampler::new(MemoryVideoSource::new(Vec::new()), stride(1));
        assert!(sampler.next().is_none());
        assert_eq!(sampler.end(), &SamplerEnd::Exhausted);
        assert!(sampler.progress().is_indeterminate());
        assert_eq!(sampler.progress().fraction(), None);
        assert!(sampler.is_source_released());
    }
}
