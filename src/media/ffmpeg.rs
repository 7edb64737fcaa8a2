// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::settings::FfmpegSettings;

/// FFmpeg 执行错误
#[derive(Error, Debug)]
pub enum FfmpegError {
    /// 进程启动失败
    #[error("ffmpeg 启动失败: {0}")]
    Spawn(#[from] std::io::Error),

    /// 进程返回非零状态
    #[error("ffmpeg 执行失败 (exit {code:?}): {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// 输出文件缺失或为空
    #[error("ffmpeg 输出为空: {0}")]
    EmptyOutput(PathBuf),
}

/// FFmpeg 命令封装
///
/// 所有媒体处理都通过外部 ffmpeg 进程完成；每个调用点固定其
/// 输出格式参数，错误时携带 stderr 便于定位
#[derive(Clone)]
pub struct Ffmpeg {
    path: String,
    denoise_filter: String,
}

impl Ffmpeg {
    /// 创建新的 FFmpeg 封装
    pub fn new(settings: &FfmpegSettings) -> Self {
        Self {
            path: settings.path.clone(),
            denoise_filter: settings.denoise_filter.clone(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<(), FfmpegError> {
        debug!(ffmpeg = %self.path, ?args, "Running ffmpeg");
        let output = Command::new(&self.path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(FfmpegError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    fn check_output(path: &Path) -> Result<(), FfmpegError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(FfmpegError::EmptyOutput(path.to_path_buf())),
        }
    }

    /// 从视频提取单声道 16kHz 16bit PCM WAV（ASR 要求的格式）
    pub async fn extract_audio(&self, video: &Path, audio_out: &Path) -> Result<(), FfmpegError> {
        let video = video.to_string_lossy();
        let audio_out_str = audio_out.to_string_lossy();
        self.run(&[
            "-i",
            &video,
            "-vn", // No video
            "-acodec",
            "pcm_s16le", // PCM 16-bit
            "-ar",
            "16000", // Sample rate (ASR recommended)
            "-ac",
            "1", // Mono
            "-y", // Overwrite
            &audio_out_str,
        ])
        .await?;
        Self::check_output(audio_out)
    }

    /// 从源音频截取 prompt 片段（单声道 16kHz）
    pub async fn cut_clip(
        &self,
        source: &Path,
        clip_out: &Path,
        start_ms: i32,
        duration_ms: i32,
    ) -> Result<(), FfmpegError> {
        let start = format!("{:.3}", f64::from(start_ms) / 1000.0);
        let duration = format!("{:.3}", f64::from(duration_ms) / 1000.0);
        let source = source.to_string_lossy();
        let clip_out_str = clip_out.to_string_lossy();
        self.run(&[
            "-ss",
            &start,
            "-t",
            &duration,
            "-i",
            &source,
            "-ac",
            "1",
            "-ar",
            "16000",
            "-y",
            &clip_out_str,
        ])
        .await?;
        Self::check_output(clip_out)
    }

    /// 顺序拼接分段 WAV 为统一格式的配音轨（PCM 16bit / 22050Hz / 单声道）
    ///
    /// # 参数
    ///
    /// * `segment_paths` - 按 idx 升序排列的分段文件
    /// * `concat_list` - concat 清单文件的写入路径
    /// * `audio_out` - 输出文件路径
    pub async fn concat_wavs(
        &self,
        segment_paths: &[PathBuf],
        concat_list: &Path,
        audio_out: &Path,
    ) -> Result<(), FfmpegError> {
        let mut list = String::new();
        for path in segment_paths {
            list.push_str(&format!("file '{}'\n", path.display()));
        }
        tokio::fs::write(concat_list, list).await?;

        let concat_list_str = concat_list.to_string_lossy();
        let audio_out_str = audio_out.to_string_lossy();
        self.run(&[
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
            &concat_list_str,
            // Re-encode to ensure a valid WAV container after concatenation
            "-c:a",
            "pcm_s16le",
            "-ar",
            "22050",
            "-ac",
            "1",
            "-y",
            &audio_out_str,
        ])
        .await?;
        Self::check_output(audio_out)
    }

    /// 将配音轨合入源视频
    ///
    /// 无字幕时视频流直拷；烧录字幕需要重编码。音频统一转 AAC，
    /// 配置了降噪滤镜时应用之，`-shortest` 以较短流为准
    pub async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        subtitles_srt: Option<&Path>,
        video_out: &Path,
    ) -> Result<(), FfmpegError> {
        let video = video.to_string_lossy();
        let audio = audio.to_string_lossy();
        let video_out_str = video_out.to_string_lossy();

        let mut args: Vec<String> = vec![
            "-i".into(),
            video.into_owned(),
            "-i".into(),
            audio.into_owned(),
        ];

        match subtitles_srt {
            Some(srt) => {
                // Burning subtitles requires video re-encoding.
                // Note: /tmp paths have no spaces, so escaping is minimal.
                let filter = format!(
                    "subtitles={}:force_style='FontName=Arial,FontSize=24,Outline=2,Shadow=1'",
                    srt.display()
                );
                args.extend([
                    "-vf".into(),
                    filter,
                    "-c:v".into(),
                    "libx264".into(),
                    "-preset".into(),
                    "veryfast".into(),
                    "-crf".into(),
                    "23".into(),
                    "-pix_fmt".into(),
                    "yuv420p".into(),
                ]);
            }
            None => {
                args.extend(["-c:v".into(), "copy".into()]);
            }
        }

        args.extend(["-c:a".into(), "aac".into()]);
        if !self.denoise_filter.is_empty() {
            args.extend(["-af".into(), self.denoise_filter.clone()]);
        }
        args.extend([
            "-map".into(),
            "0:v:0".into(), // Use video from first input
            "-map".into(),
            "1:a:0".into(), // Use audio from second input
            "-shortest".into(),
            "-y".into(),
            video_out_str.into_owned(),
        ]);

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).await?;
        Self::check_output(video_out)
    }
}
