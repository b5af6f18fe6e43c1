//! 视频文字聚合 - 采样、逐帧识别、过滤空结果、按帧序拼接

use log::info;
use rayon::prelude::*;
use std::num::NonZeroU32;

use super::frame::FrameSample;
use super::sampler::{FrameSampler, SamplerEnd};
use super::source::VideoSource;
use crate::core::media::{Diagnostics, Language, RecognitionAdapter, RecognitionResult, Stage};

#[derive(Debug, Clone)]
pub struct AggregationOptions {
    /// 与上一条保留文本完全相同时丢弃（长时间停留的字幕）
    pub collapse_repeats: bool,
    /// 按批并行识别，拼接前按帧序排序
    pub parallel: bool,
    pub batch_size: usize,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            collapse_repeats: false,
            parallel: false,
            batch_size: num_cpus::get().max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoTranscript {
    pub text: String,
    pub frames_decoded: u64,
    pub frames_sampled: u64,
    pub units_kept: usize,
    pub end: SamplerEnd,
}

impl VideoTranscript {
    pub fn is_cancelled(&self) -> bool {
        self.end == SamplerEnd::Cancelled
    }
}

pub struct VideoAggregator {
    adapter: RecognitionAdapter,
    options: AggregationOptions,
}

impl VideoAggregator {
    pub fn new(adapter: RecognitionAdapter) -> Self {
        Self::with_options(adapter, AggregationOptions::default())
    }

    pub fn with_options(adapter: RecognitionAdapter, options: AggregationOptions) -> Self {
        Self { adapter, options }
    }

    pub fn extract_video_text<S: VideoSource>(
        &self,
        source: S,
        stride: NonZeroU32,
        language: Language,
        diagnostics: &Diagnostics,
    ) -> VideoTranscript {
        self.extract_with(FrameSampler::new(source, stride), language, diagnostics)
    }

    /// 使用调用方配置好的采样器（进度回调、取消信号）
    pub fn extract_with<S: VideoSource>(
        &self,
        mut sampler: FrameSampler<'_, S>,
        language: Language,
        diagnostics: &Diagnostics,
    ) -> VideoTranscript {
        let mut units = TranscriptBuilder::new(self.options.collapse_repeats);
        let mut frames_sampled = 0u64;

        if self.options.parallel {
            let batch_size = self.options.batch_size.max(1);
            loop {
                let batch: Vec<FrameSample> = sampler.by_ref().take(batch_size).collect();
                if batch.is_empty() {
                    break;
                }
                frames_sampled += batch.len() as u64;

                let mut results: Vec<(u64, RecognitionResult)> = batch
                    .par_iter()
                    .map(|sample| (sample.index, self.recognize(sample, language, diagnostics)))
                    .collect();
                results.sort_by_key(|(index, _)| *index);

                for (_, result) in results {
                    units.push(result);
                }
            }
        } else {
            for sample in sampler.by_ref() {
                frames_sampled += 1;
                units.push(self.recognize(&sample, language, diagnostics));
            }
        }

        let end = sampler.end().clone();
        if let SamplerEnd::ReadFailed(reason) = &end {
            diagnostics.warn(
                Stage::Sampling,
                format!(
                    "Video ended early after {} frames: {}",
                    sampler.progress().current,
                    reason
                ),
            );
        }

        let transcript = VideoTranscript {
            units_kept: units.len(),
            text: units.finish(),
            frames_decoded: sampler.progress().current,
            frames_sampled,
            end,
        };
        info!(
            "🎯 Video processed: {} frames decoded, {} sampled, {} with text",
            transcript.frames_decoded, transcript.frames_sampled, transcript.units_kept
        );
        transcript
    }

    fn recognize(
        &self,
        sample: &FrameSample,
        language: Language,
        diagnostics: &Diagnostics,
    ) -> RecognitionResult {
        self.adapter
            .recognize_unit(&sample.image, language, Some(sample.index), diagnostics)
    }
}

struct TranscriptBuilder {
    lines: Vec<String>,
    collapse_repeats: bool,
}

impl TranscriptBuilder {
    fn new(collapse_repeats: bool) -> Self {
        Self {
            lines: Vec::new(),
            collapse_repeats,
        }
    }

    fn push(&mut self, result: RecognitionResult) {
        if result.is_failure() || result.is_empty() {
            return;
        }
        let text = result.text.trim();
        if self.collapse_repeats && self.lines.last().is_some_and(|last| last == text) {
            return;
        }
        self.lines.push(text.to_string());
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    fn finish(self) -> String {
        self.lines.join("\n")
    }
}
