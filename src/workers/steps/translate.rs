// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::translate::{create_translator, split_text, Translator};
use crate::domain::models::message::{TaskMessage, TranslatePayload, TtsPayload};
use crate::domain::models::segment::Segment;
use crate::domain::models::step::StepKind;
use crate::utils::errors::StepError;
use crate::workers::steps::{StepDeps, StepProcessor};

/// 文本翻译步骤
///
/// 按批调用翻译器；整批失败时退化为逐条重试（超长文本按句子
/// 边界切块），全部落库后发布单条 tts 驱动消息
pub struct TranslateStep {
    deps: StepDeps,
}

impl TranslateStep {
    /// 创建新的文本翻译步骤
    pub fn new(deps: StepDeps) -> Self {
        Self { deps }
    }

    fn batch_size(&self, payload: &TranslatePayload) -> usize {
        payload
            .batch_size
            .filter(|size| *size > 0)
            .unwrap_or(self.deps.settings.processing.translate.batch_size.max(1))
    }

    async fn translate_batches(
        &self,
        task_id: Uuid,
        payload: &TranslatePayload,
        segments: &[Segment],
        translator: Arc<dyn Translator>,
    ) -> Result<(), StepError> {
        let batch_size = self.batch_size(payload);
        let item_retries = self.deps.settings.processing.translate.item_max_retries;
        let max_text_length = self.deps.settings.processing.translate.max_text_length.max(1);

        for batch in segments.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|seg| seg.src_text.clone()).collect();

            match translator
                .translate(&texts, &payload.source_language, &payload.target_language)
                .await
            {
                Ok(translations) if translations.len() == batch.len() => {
                    for (seg, translation) in batch.iter().zip(translations.iter()) {
                        self.deps
                            .segments
                            .update_translation(task_id, seg.idx, translation)
                            .await?;
                    }
                }
                result => {
                    if let Err(err) = result {
                        warn!(
                            task_id = %task_id,
                            error = %err,
                            "Batch translation failed, falling back to per-segment retry"
                        );
                    }
                    for seg in batch {
                        let translation = self
                            .translate_single_with_retry(
                                translator.as_ref(),
                                payload,
                                &seg.src_text,
                                item_retries,
                                max_text_length,
                            )
                            .await
                            .map_err(|err| {
                                StepError::Transient(format!(
                                    "failed to translate segment {}: {err}",
                                    seg.idx
                                ))
                            })?;
                        self.deps
                            .segments
                            .update_translation(task_id, seg.idx, &translation)
                            .await?;
                    }
                }
            }
        }

        info!(
            task_id = %task_id,
            translated_count = segments.len(),
            "Translation completed"
        );
        Ok(())
    }

    async fn translate_single_with_retry(
        &self,
        translator: &dyn Translator,
        payload: &TranslatePayload,
        text: &str,
        max_retries: u32,
        max_length: usize,
    ) -> Result<String, crate::clients::translate::TranslateError> {
        let mut last_err = None;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
            }
            match self
                .translate_single(translator, payload, text, max_length)
                .await
            {
                Ok(translation) => return Ok(translation),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.expect("at least one attempt"))
    }

    /// 翻译单条文本；超过长度上限时按句子边界切块后逐块翻译
    async fn translate_single(
        &self,
        translator: &dyn Translator,
        payload: &TranslatePayload,
        text: &str,
        max_length: usize,
    ) -> Result<String, crate::clients::translate::TranslateError> {
        if text.chars().count() <= max_length {
            let result = translator
                .translate(
                    std::slice::from_ref(&text.to_string()),
                    &payload.source_language,
                    &payload.target_language,
                )
                .await?;
            return Ok(result.into_iter().next().unwrap_or_default());
        }

        let chunks = split_text(text, max_length);
        let mut translated = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let result = translator
                .translate(
                    std::slice::from_ref(&chunk),
                    &payload.source_language,
                    &payload.target_language,
                )
                .await?;
            translated.push(result.into_iter().next().unwrap_or_default());
        }
        Ok(translated.join(" "))
    }
}

#[async_trait]
impl StepProcessor for TranslateStep {
    fn kind(&self) -> StepKind {
        StepKind::Translate
    }

    async fn process(&self, task_id: Uuid, msg: &TaskMessage) -> Result<(), StepError> {
        let payload: TranslatePayload = msg.payload_as()?;

        info!(
            task_id = %task_id,
            segment_count = payload.segment_ids.len(),
            source_language = %payload.source_language,
            target_language = %payload.target_language,
            batch_size = self.batch_size(&payload),
            "Processing translation"
        );

        let all_segments = self.deps.segments.list_for_task(task_id).await?;
        if all_segments.is_empty() {
            return Err(StepError::Permanent(
                "no segments to translate for task".to_string(),
            ));
        }

        // 重复投递时仅翻译仍缺译文的分段
        let pending = self.deps.segments.list_untranslated(task_id).await?;
        if !pending.is_empty() {
            let effective = self.deps.resolver.resolve(Some(task_id)).await?;
            effective.validate_for_translate()?;
            let translator = create_translator("glm", &effective.translate)
                .map_err(|err| StepError::Transient(err.to_string()))?;

            self.translate_batches(task_id, &payload, &pending, translator)
                .await?;
        } else {
            info!(task_id = %task_id, "All segments already translated, skipping");
        }

        let tts_settings = &self.deps.settings.processing.tts;
        let tts_payload = TtsPayload {
            task_id: task_id.to_string(),
            batch_size: Some(tts_settings.batch_size),
            max_concurrency: Some(tts_settings.max_concurrency),
            max_retries: Some(tts_settings.max_retries),
            retry_delay_sec: Some(tts_settings.retry_delay.as_secs_f64()),
            ..Default::default()
        };
        let next = TaskMessage::new(
            task_id,
            StepKind::Tts,
            serde_json::to_value(tts_payload)
                .map_err(|err| StepError::Permanent(err.to_string()))?,
        );
        self.deps
            .publisher
            .publish(&StepKind::Tts.routing_key(), &next)
            .await?;

        Ok(())
    }
}
