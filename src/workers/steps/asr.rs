// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::clients::asr::AsrClient;
use crate::domain::models::message::{AsrPayload, TaskMessage, TranslatePayload};
use crate::domain::models::step::StepKind;
use crate::domain::repositories::NewSegment;
use crate::utils::errors::StepError;
use crate::workers::steps::{StepDeps, StepProcessor};

/// 预签名音频 URL 的有效期；ASR 服务需要在轮询窗口内能拉取音频
const AUDIO_URL_TTL: Duration = Duration::from_secs(3600);

/// 语音识别步骤
///
/// 解析有效配置并校验凭证，签发音频 URL 交给 ASR 服务识别，
/// 将有序分段落库后发布单条 translate 消息
pub struct AsrStep {
    deps: StepDeps,
}

impl AsrStep {
    /// 创建新的语音识别步骤
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl StepProcessor for AsrStep {
    fn kind(&self) -> StepKind {
        StepKind::Asr
    }

    async fn process(&self, task_id: Uuid, msg: &TaskMessage) -> Result<(), StepError> {
        let payload: AsrPayload = msg.payload_as()?;

        info!(
            task_id = %task_id,
            audio_key = %payload.audio_key,
            language = %payload.language,
            "Processing ASR"
        );

        let effective = self.deps.resolver.resolve(Some(task_id)).await?;
        effective.validate_for_asr()?;

        let client = AsrClient::new(effective.asr);

        // ASR 服务从外部拉取音频，必须使用公网可达的签名 URL
        let audio_url = self
            .deps
            .storage
            .presigned_get_url(&payload.audio_key, AUDIO_URL_TTL)
            .await?;

        let result = client
            .recognize(&audio_url, &payload.language)
            .await
            .map_err(|err| StepError::Transient(err.to_string()))?;

        info!(
            task_id = %task_id,
            segment_count = result.segments.len(),
            duration_ms = result.duration_ms,
            "ASR completed"
        );

        if result.segments.is_empty() {
            return Err(StepError::Permanent(
                "ASR returned no segments".to_string(),
            ));
        }

        // 原始识别结果归档，便于排查与重放
        let raw = serde_json::to_vec(&result)
            .map_err(|err| StepError::Permanent(err.to_string()))?;
        self.deps
            .storage
            .put_bytes(&payload.output_key, raw, "application/json")
            .await?;

        let new_segments: Vec<NewSegment> = result
            .segments
            .iter()
            .map(|seg| NewSegment {
                idx: seg.idx,
                start_ms: seg.start_ms,
                end_ms: seg.end_ms,
                src_text: seg.text.clone(),
                speaker_id: seg.speaker_id.clone(),
                emotion: seg.emotion.clone(),
                gender: seg.gender.clone(),
            })
            .collect();
        self.deps.segments.upsert_many(task_id, &new_segments).await?;

        let task = self
            .deps
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| StepError::Permanent(format!("task {task_id} not found")))?;

        let segment_ids = self
            .deps
            .segments
            .list_for_task(task_id)
            .await?
            .iter()
            .map(|seg| format!("seg-{}", seg.idx))
            .collect();

        let translate_payload = TranslatePayload {
            task_id: task_id.to_string(),
            segment_ids,
            source_language: task.source_language,
            target_language: task.target_language,
            batch_size: None,
        };
        let next = TaskMessage::new(
            task_id,
            StepKind::Translate,
            serde_json::to_value(translate_payload)
                .map_err(|err| StepError::Permanent(err.to_string()))?,
        );
        self.deps
            .publisher
            .publish(&StepKind::Translate.routing_key(), &next)
            .await?;

        Ok(())
    }
}
