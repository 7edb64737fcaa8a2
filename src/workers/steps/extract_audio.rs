// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::models::message::{AsrPayload, ExtractAudioPayload, TaskMessage};
use crate::domain::models::step::StepKind;
use crate::media::TempFile;
use crate::utils::errors::StepError;
use crate::workers::steps::{tmp_path, StepDeps, StepProcessor};

/// 音频提取步骤
///
/// 下载源视频，用 ffmpeg 抽出单声道 16kHz PCM WAV 并上传，
/// 然后发布 asr 消息
pub struct ExtractAudioStep {
    deps: StepDeps,
}

impl ExtractAudioStep {
    /// 创建新的音频提取步骤
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl StepProcessor for ExtractAudioStep {
    fn kind(&self) -> StepKind {
        StepKind::ExtractAudio
    }

    async fn process(&self, task_id: Uuid, msg: &TaskMessage) -> Result<(), StepError> {
        let payload: ExtractAudioPayload = msg.payload_as()?;

        info!(
            task_id = %task_id,
            source_video_key = %payload.source_video_key,
            output_audio_key = %payload.output_audio_key,
            "Extracting audio"
        );

        let video_file = TempFile::new(tmp_path(task_id, "video.mp4"));
        self.deps
            .storage
            .get_to_file(&payload.source_video_key, video_file.path())
            .await?;

        let audio_file = TempFile::new(tmp_path(task_id, "audio.wav"));
        self.deps
            .ffmpeg
            .extract_audio(video_file.path(), audio_file.path())
            .await?;

        self.deps
            .storage
            .put_file(&payload.output_audio_key, audio_file.path(), "audio/wav")
            .await?;

        let task = self
            .deps
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| StepError::Permanent(format!("task {task_id} not found")))?;

        let asr_payload = AsrPayload {
            audio_key: payload.output_audio_key,
            language: task.source_language,
            output_key: format!("asr/{task_id}/asr.json"),
        };
        let next = TaskMessage::new(
            task_id,
            StepKind::Asr,
            serde_json::to_value(asr_payload)
                .map_err(|err| StepError::Permanent(err.to_string()))?,
        );
        self.deps
            .publisher
            .publish(&StepKind::Asr.routing_key(), &next)
            .await?;

        Ok(())
    }
}
