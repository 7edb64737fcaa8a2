// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::models::message::{MuxVideoPayload, TaskMessage};
use crate::domain::models::step::StepKind;
use crate::media::subtitles::vtt_to_srt;
use crate::media::TempFile;
use crate::utils::errors::StepError;
use crate::workers::steps::{tmp_path, StepDeps, StepProcessor};

/// 视频合成步骤（流水线终点）
///
/// 下载源视频与配音轨，存在字幕时转 SRT 并烧录，混流上传后
/// 将任务置为 done。不再发布任何消息
pub struct MuxVideoStep {
    deps: StepDeps,
}

impl MuxVideoStep {
    /// 创建新的视频合成步骤
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }

    /// 下载可选字幕并转换为 SRT
    async fn prepare_subtitles(&self, task_id: Uuid) -> Result<Option<TempFile>, StepError> {
        let subtitle_key = format!("subs/{task_id}/subtitles.vtt");
        if !self.deps.storage.exists(&subtitle_key).await? {
            return Ok(None);
        }

        let vtt_bytes = self.deps.storage.get_bytes(&subtitle_key).await?;
        let vtt = String::from_utf8_lossy(&vtt_bytes);
        let srt = vtt_to_srt(&vtt);
        if srt.is_empty() {
            return Ok(None);
        }

        let srt_file = TempFile::new(tmp_path(task_id, "subtitles.srt"));
        tokio::fs::write(srt_file.path(), srt)
            .await
            .map_err(|err| StepError::Transient(err.to_string()))?;
        Ok(Some(srt_file))
    }
}

#[async_trait]
impl StepProcessor for MuxVideoStep {
    fn kind(&self) -> StepKind {
        StepKind::MuxVideo
    }

    async fn process(&self, task_id: Uuid, msg: &TaskMessage) -> Result<(), StepError> {
        let payload: MuxVideoPayload = msg.payload_as()?;

        info!(
            task_id = %task_id,
            source_video_key = %payload.source_video_key,
            tts_audio_key = %payload.tts_audio_key,
            "Processing video muxing"
        );

        let video_file = TempFile::new(tmp_path(task_id, "source.mp4"));
        self.deps
            .storage
            .get_to_file(&payload.source_video_key, video_file.path())
            .await?;

        let audio_file = TempFile::new(tmp_path(task_id, "dub.wav"));
        self.deps
            .storage
            .get_to_file(&payload.tts_audio_key, audio_file.path())
            .await?;

        let subtitles = self.prepare_subtitles(task_id).await?;

        let output_file = TempFile::new(tmp_path(task_id, "final.mp4"));
        self.deps
            .ffmpeg
            .mux(
                video_file.path(),
                audio_file.path(),
                subtitles.as_ref().map(|f| f.path()),
                output_file.path(),
            )
            .await?;

        self.deps
            .storage
            .put_file(&payload.output_video_key, output_file.path(), "video/mp4")
            .await?;

        info!(
            task_id = %task_id,
            output_video_key = %payload.output_video_key,
            "Video muxing completed"
        );

        self.deps
            .tasks
            .mark_done(task_id, &payload.output_video_key)
            .await?;

        Ok(())
    }
}
