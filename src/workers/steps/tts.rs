// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::tts::{create_synthesizer, SpeechSynthesizer, SynthesisRequest, TtsError};
use crate::domain::models::message::{
    MuxVideoPayload, TaskMessage, TtsCompensationPayload, TtsPayload,
    TTS_COMPENSATION_ROUTING_KEY,
};
use crate::domain::models::segment::Segment;
use crate::domain::models::step::StepKind;
use crate::domain::models::task::Task;
use crate::media::{TempDir, TempFile};
use crate::utils::errors::StepError;
use crate::workers::steps::{tmp_path, StepDeps, StepProcessor};

const MIN_PROMPT_DURATION_MS: i32 = 3_000;
const PREFERRED_MAX_PROMPT_DURATION_MS: i32 = 8_000;
const HARD_MAX_PROMPT_DURATION_MS: i32 = 10_000;

/// prompt 音频签名 URL 的有效期
const PROMPT_URL_TTL: Duration = Duration::from_secs(24 * 3600);

/// 分段缺少时长信息时的合成时长兜底
const FALLBACK_TARGET_DURATION_MS: i32 = 1500;

/// 语音合成步骤（兼汇合点）
///
/// 每次投递处理一批缺少合成音频的分段：有界并发合成、分段级重试、
/// 失败补偿。批后仍有剩余则重新发布驱动消息；观测到零剩余的投递
/// 执行合并并发布唯一一条 mux_video 消息
pub struct TtsStep {
    deps: StepDeps,
    synthesizer_override: Option<Arc<dyn SpeechSynthesizer>>,
}

/// 音色克隆参考音频信息
#[derive(Debug, Clone)]
struct PromptInfo {
    key: String,
    url: String,
    segment_idx: Option<i32>,
    duration_ms: Option<i32>,
}

/// prompt 候选分段
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PromptCandidate {
    pub idx: i32,
    pub start_ms: i32,
    pub end_ms: i32,
}

impl PromptCandidate {
    fn duration(&self) -> i32 {
        self.end_ms - self.start_ms
    }
}

impl TtsStep {
    /// 创建新的语音合成步骤
    pub fn new(deps: StepDeps) -> Self {
        Self {
            deps,
            synthesizer_override: None,
        }
    }

    /// 使用固定合成器创建（跳过按配置选择后端）
    pub fn with_synthesizer(deps: StepDeps, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            deps,
            synthesizer_override: Some(synthesizer),
        }
    }

    fn resolve_batch_size(&self, payload: &TtsPayload) -> usize {
        payload
            .batch_size
            .filter(|v| *v > 0)
            .unwrap_or(self.deps.settings.processing.tts.batch_size.max(1))
    }

    fn resolve_concurrency(&self, payload: &TtsPayload) -> usize {
        payload
            .max_concurrency
            .filter(|v| *v > 0)
            .unwrap_or(self.deps.settings.processing.tts.max_concurrency)
            .max(1)
    }

    fn resolve_max_retries(&self, payload: &TtsPayload) -> u32 {
        payload
            .max_retries
            .unwrap_or(self.deps.settings.processing.tts.max_retries)
    }

    fn resolve_retry_delay(&self, payload: &TtsPayload) -> Duration {
        payload
            .retry_delay_sec
            .filter(|v| *v > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(self.deps.settings.processing.tts.retry_delay)
    }

    /// 拉取本次投递要处理的分段批次
    ///
    /// 批量驱动为主；旧的单段消息退化为大小为 1 的批次
    async fn load_pending_batch(
        &self,
        task_id: Uuid,
        payload: &TtsPayload,
    ) -> Result<Vec<Segment>, StepError> {
        let batch_size = self.resolve_batch_size(payload) as u64;
        let segments = self
            .deps
            .segments
            .list_pending_tts(task_id, batch_size)
            .await?;
        if !segments.is_empty() {
            return Ok(segments);
        }

        if let Some(idx) = payload.segment_idx {
            if let Some(seg) = self.deps.segments.find_by_idx(task_id, idx).await? {
                if !seg.has_tts_audio() {
                    return Ok(vec![seg]);
                }
            } else if let Some(text) = payload.text.as_deref().filter(|t| !t.trim().is_empty()) {
                // 旧消息指向的行不存在时仍按消息内容合成，行更新自然落空
                return Ok(vec![Segment {
                    id: Uuid::new_v4(),
                    task_id,
                    idx,
                    start_ms: 0,
                    end_ms: payload.target_duration_ms.unwrap_or(FALLBACK_TARGET_DURATION_MS),
                    duration_ms: payload
                        .target_duration_ms
                        .unwrap_or(FALLBACK_TARGET_DURATION_MS),
                    src_text: text.to_string(),
                    mt_text: None,
                    tts_params: None,
                    tts_audio_key: None,
                    speaker_id: payload.speaker_id.clone(),
                    emotion: None,
                    gender: None,
                }]);
            }
        }

        Ok(Vec::new())
    }

    /// 确保本地存在任务的源音频（prompt 截取的素材）
    async fn ensure_source_audio(&self, task_id: Uuid) -> Result<PathBuf, StepError> {
        let path = tmp_path(task_id, "source.wav");
        if path.exists() {
            return Ok(path);
        }

        let source_audio_key = format!("audios/{task_id}/source.wav");
        self.deps
            .storage
            .get_to_file(&source_audio_key, &path)
            .await?;
        Ok(path)
    }

    /// 构建或复用任务的 prompt 音频
    ///
    /// 依次尝试：分段参数里记录过的 prompt、推导出的对象键；
    /// 都不存在时从源音频截取新 prompt。已存在的 prompt 一律重新
    /// 签名，避免使用过期 URL
    async fn ensure_prompt_audio(
        &self,
        task_id: Uuid,
        speaker_id: Option<&str>,
    ) -> Result<PromptInfo, StepError> {
        let preferred_key = prompt_key_for_task(task_id, speaker_id);

        let mut candidates: Vec<String> = Vec::new();
        if let Some(params) = self
            .deps
            .segments
            .find_prompt_params(task_id, speaker_id)
            .await?
        {
            if let Some(key) = params.get("prompt_key").and_then(|k| k.as_str()) {
                candidates.push(key.to_string());
            }
        }
        candidates.push(preferred_key.clone());
        if speaker_id.is_some() {
            candidates.push(prompt_key_for_task(task_id, None));
        }
        candidates.dedup();

        for key in candidates {
            if key.is_empty() {
                continue;
            }
            if self.deps.storage.exists(&key).await? {
                let url = self
                    .deps
                    .storage
                    .presigned_get_url(&key, PROMPT_URL_TTL)
                    .await?;
                return Ok(PromptInfo {
                    key,
                    url,
                    segment_idx: None,
                    duration_ms: None,
                });
            }
        }

        let segments = self.deps.segments.list_for_task(task_id).await?;
        let candidates: Vec<PromptCandidate> = segments
            .iter()
            .map(|seg| PromptCandidate {
                idx: seg.idx,
                start_ms: seg.start_ms,
                end_ms: seg.end_ms,
            })
            .collect();

        let segment = select_prompt_segment(&candidates).ok_or_else(|| {
            StepError::Permanent("no valid segment found to build prompt".to_string())
        })?;

        info!(
            task_id = %task_id,
            segment_idx = segment.idx,
            start_ms = segment.start_ms,
            end_ms = segment.end_ms,
            prompt_key = %preferred_key,
            speaker_id = speaker_id.unwrap_or(""),
            "Selected prompt segment"
        );

        let cut_duration = segment.duration().min(HARD_MAX_PROMPT_DURATION_MS);
        let source_path = self.ensure_source_audio(task_id).await?;

        let prompt_file = TempFile::new(tmp_path(
            task_id,
            &format!(
                "prompt_{}.wav",
                sanitize_speaker_id(speaker_id.unwrap_or(""))
            ),
        ));
        self.deps
            .ffmpeg
            .cut_clip(&source_path, prompt_file.path(), segment.start_ms, cut_duration)
            .await?;

        self.deps
            .storage
            .put_file(&preferred_key, prompt_file.path(), "audio/wav")
            .await?;
        let url = self
            .deps
            .storage
            .presigned_get_url(&preferred_key, PROMPT_URL_TTL)
            .await?;

        Ok(PromptInfo {
            key: preferred_key,
            url,
            segment_idx: Some(segment.idx),
            duration_ms: Some(cut_duration),
        })
    }

    /// 带重试地合成单个分段
    async fn synthesize_segment_with_retry(
        &self,
        task_id: Uuid,
        segment: &Segment,
        target_lang: &str,
        payload: &TtsPayload,
        prompt: &PromptInfo,
        synthesizer: &dyn SpeechSynthesizer,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<(), StepError> {
        // 重复投递的并发保护：行里已有音频则直接跳过
        if let Some(existing) = self.deps.segments.find_by_idx(task_id, segment.idx).await? {
            if existing.has_tts_audio() {
                info!(
                    task_id = %task_id,
                    segment_idx = segment.idx,
                    "Segment already synthesized, skipping"
                );
                return Ok(());
            }
        }

        let mut last_err: Option<StepError> = None;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay).await;
            }
            match self
                .synthesize_one(task_id, segment, target_lang, payload, prompt, synthesizer)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        task_id = %task_id,
                        segment_idx = segment.idx,
                        attempt = attempt + 1,
                        error = %err,
                        "Segment TTS attempt failed"
                    );
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.expect("at least one attempt"))
    }

    async fn synthesize_one(
        &self,
        task_id: Uuid,
        segment: &Segment,
        target_lang: &str,
        payload: &TtsPayload,
        prompt: &PromptInfo,
        synthesizer: &dyn SpeechSynthesizer,
    ) -> Result<(), StepError> {
        let text = segment.synthesis_text().trim().to_string();
        if text.is_empty() {
            return Err(StepError::Permanent(format!(
                "segment {} has empty text",
                segment.idx
            )));
        }

        let speaker_id = payload
            .speaker_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "default".to_string());
        let target_duration_ms = if segment.duration_ms > 0 {
            segment.duration_ms
        } else {
            FALLBACK_TARGET_DURATION_MS
        };

        let request = SynthesisRequest {
            text,
            speaker_id: speaker_id.clone(),
            prompt_audio_url: Some(prompt.url.clone()),
            target_duration_ms,
            language: target_lang.to_string(),
            prosody_control: payload.prosody_control.clone(),
            output_format: "wav".to_string(),
            sample_rate: 22050,
        };

        let audio = synthesizer.synthesize(&request).await.map_err(|err| match err {
            TtsError::MissingConfig(field) => StepError::ConfigMissing(field.to_string()),
            other => StepError::Transient(other.to_string()),
        })?;

        let audio_key = format!("tts/{task_id}/segment_{}.wav", segment.idx);
        self.deps
            .storage
            .put_bytes(&audio_key, audio, "audio/wav")
            .await?;

        let params = serde_json::json!({
            "speaker_id": speaker_id,
            "target_duration_ms": target_duration_ms,
            "prosody_control": payload.prosody_control,
            "prompt_speaker_id": speaker_id,
            "prompt_key": prompt.key,
            "prompt_url": prompt.url,
            "prompt_segment_idx": prompt.segment_idx,
            "prompt_duration_ms": prompt.duration_ms,
        });
        self.deps
            .segments
            .update_tts_audio(task_id, segment.idx, &audio_key, &params)
            .await?;

        info!(
            task_id = %task_id,
            segment_idx = segment.idx,
            audio_key = %audio_key,
            "TTS completed"
        );
        Ok(())
    }

    async fn publish_compensation(&self, task_id: Uuid, segment_idx: i32, reason: &str) {
        let payload = TtsCompensationPayload {
            task_id: task_id.to_string(),
            segment_idx,
            error: reason.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            routing_key: StepKind::Tts.routing_key(),
        };
        let Ok(payload) = serde_json::to_value(payload) else {
            return;
        };
        let message = TaskMessage::new(task_id, StepKind::Tts, payload);
        if let Err(err) = self
            .deps
            .publisher
            .publish(TTS_COMPENSATION_ROUTING_KEY, &message)
            .await
        {
            error!(
                task_id = %task_id,
                segment_idx,
                error = %err,
                "Failed to publish tts compensation"
            );
        }
    }

    /// 汇合点：零剩余时把全部分段音频拼成配音轨并发布 mux_video
    async fn finalize(&self, task_id: Uuid, task: &Task) -> Result<(), StepError> {
        let pending = self.deps.segments.count_pending_tts(task_id).await?;
        if pending > 0 {
            return Err(StepError::Permanent(format!(
                "pending segments remain: {pending}"
            )));
        }

        self.merge_segment_audios(task_id).await?;

        let mux_payload = MuxVideoPayload {
            task_id: task_id.to_string(),
            source_video_key: task.source_video_key.clone(),
            tts_audio_key: format!("tts/{task_id}/dub.wav"),
            output_video_key: format!("outputs/{task_id}/final.mp4"),
        };
        let next = TaskMessage::new(
            task_id,
            StepKind::MuxVideo,
            serde_json::to_value(mux_payload)
                .map_err(|err| StepError::Permanent(err.to_string()))?,
        );
        self.deps
            .publisher
            .publish(&StepKind::MuxVideo.routing_key(), &next)
            .await?;

        // 缓存的源音频到此不再需要
        let _ = tokio::fs::remove_file(tmp_path(task_id, "source.wav")).await;

        Ok(())
    }

    /// 按 idx 顺序拼接全部分段音频为 dub.wav（PCM 16bit / 22050Hz / 单声道）
    async fn merge_segment_audios(&self, task_id: Uuid) -> Result<(), StepError> {
        info!(task_id = %task_id, "Merging segment audios");

        let segments = self.deps.segments.list_for_task(task_id).await?;
        if segments.is_empty() {
            return Err(StepError::Permanent("no segments found".to_string()));
        }

        let merge_dir = TempDir::create(tmp_path(task_id, "merge"))
            .map_err(|err| StepError::Transient(err.to_string()))?;

        let mut segment_paths = Vec::with_capacity(segments.len());
        for seg in &segments {
            let audio_key = seg.tts_audio_key.as_deref().filter(|k| !k.is_empty()).ok_or_else(
                || StepError::Permanent(format!("segment {} has no TTS audio", seg.idx)),
            )?;
            let path = merge_dir.path().join(format!("segment_{}.wav", seg.idx));
            self.deps.storage.get_to_file(audio_key, &path).await?;
            segment_paths.push(path);
        }

        let dub_file = TempFile::new(tmp_path(task_id, "dub.wav"));
        self.deps
            .ffmpeg
            .concat_wavs(
                &segment_paths,
                &merge_dir.path().join("concat.txt"),
                dub_file.path(),
            )
            .await?;

        let dub_key = format!("tts/{task_id}/dub.wav");
        self.deps
            .storage
            .put_file(&dub_key, dub_file.path(), "audio/wav")
            .await?;

        info!(
            task_id = %task_id,
            dub_key = %dub_key,
            segment_count = segments.len(),
            "Segment audios merged"
        );
        Ok(())
    }
}

#[async_trait]
impl StepProcessor for TtsStep {
    fn kind(&self) -> StepKind {
        StepKind::Tts
    }

    async fn process(&self, task_id: Uuid, msg: &TaskMessage) -> Result<(), StepError> {
        let payload: TtsPayload = msg.payload_as()?;

        let concurrency = self.resolve_concurrency(&payload);
        let max_retries = self.resolve_max_retries(&payload);
        let retry_delay = self.resolve_retry_delay(&payload);

        info!(
            task_id = %task_id,
            batch_size = self.resolve_batch_size(&payload),
            max_concurrency = concurrency,
            max_retries,
            "Processing TTS"
        );

        let effective = self.deps.resolver.resolve(Some(task_id)).await?;
        effective.validate_for_tts()?;

        let synthesizer = match &self.synthesizer_override {
            Some(synth) => synth.clone(),
            None => create_synthesizer(&effective.tts).map_err(|err| match err {
                TtsError::MissingConfig(field) => StepError::ConfigMissing(field.to_string()),
                other => StepError::Transient(other.to_string()),
            })?,
        };

        let task = self
            .deps
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| StepError::Permanent(format!("task {task_id} not found")))?;

        let pending = self.load_pending_batch(task_id, &payload).await?;
        if pending.is_empty() {
            info!(task_id = %task_id, "No pending TTS segments");
            return self.finalize(task_id, &task).await;
        }

        let prompt = self
            .ensure_prompt_audio(task_id, payload.speaker_id.as_deref().filter(|s| !s.is_empty()))
            .await?;

        let first_error: Mutex<Option<String>> = Mutex::new(None);

        futures::stream::iter(&pending)
            .for_each_concurrent(concurrency, |segment| {
                let payload = &payload;
                let prompt = &prompt;
                let first_error = &first_error;
                let synthesizer = synthesizer.as_ref();
                let target_lang = task.target_language.as_str();
                async move {
                    if let Err(err) = self
                        .synthesize_segment_with_retry(
                            task_id,
                            segment,
                            target_lang,
                            payload,
                            prompt,
                            synthesizer,
                            max_retries,
                            retry_delay,
                        )
                        .await
                    {
                        error!(
                            task_id = %task_id,
                            segment_idx = segment.idx,
                            error = %err,
                            "TTS segment failed after retries"
                        );
                        self.publish_compensation(task_id, segment.idx, &err.to_string())
                            .await;
                        let mut slot = first_error.lock().await;
                        if slot.is_none() {
                            *slot = Some(format!("segment {}: {err}", segment.idx));
                        }
                    }
                }
            })
            .await;

        if let Some(err) = first_error.into_inner() {
            let remaining = self.deps.segments.count_pending_tts(task_id).await?;
            return Err(StepError::Permanent(format!(
                "pending segments remain: {remaining}; first segment error: {err}"
            )));
        }

        let remaining = self.deps.segments.count_pending_tts(task_id).await?;
        if remaining > 0 {
            info!(
                task_id = %task_id,
                remaining,
                "Pending segments remain, requeueing tts"
            );
            let driver = TtsPayload {
                task_id: task_id.to_string(),
                batch_size: Some(self.resolve_batch_size(&payload)),
                max_concurrency: Some(concurrency),
                max_retries: Some(max_retries),
                retry_delay_sec: Some(retry_delay.as_secs_f64()),
                speaker_id: payload.speaker_id.clone(),
                ..Default::default()
            };
            let next = TaskMessage::new(
                task_id,
                StepKind::Tts,
                serde_json::to_value(driver)
                    .map_err(|err| StepError::Permanent(err.to_string()))?,
            );
            self.deps
                .publisher
                .publish(&StepKind::Tts.routing_key(), &next)
                .await?;
            return Ok(());
        }

        self.finalize(task_id, &task).await
    }
}

/// 清洗说话人标识用于对象键
pub(crate) fn sanitize_speaker_id(speaker_id: &str) -> String {
    let cleaned: String = speaker_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_').to_string();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

/// 任务（与可选说话人）的 prompt 对象键
pub(crate) fn prompt_key_for_task(task_id: Uuid, speaker_id: Option<&str>) -> String {
    match speaker_id {
        None | Some("") | Some("default") => format!("tts/{task_id}/prompt.wav"),
        Some(speaker) => format!(
            "tts/{task_id}/speakers/{}/prompt.wav",
            sanitize_speaker_id(speaker)
        ),
    }
}

/// 选择 prompt 分段
///
/// 优先 [3s, 8s] 内最长者，其次 (8s, 10s]，最后任何 ≥3s 的最长者；
/// 不足 3s 的分段永远不会入选
pub(crate) fn select_prompt_segment(candidates: &[PromptCandidate]) -> Option<PromptCandidate> {
    let mut preferred: Option<PromptCandidate> = None;
    let mut within_hard_max: Option<PromptCandidate> = None;
    let mut longest_valid: Option<PromptCandidate> = None;

    for seg in candidates {
        let duration = seg.duration();
        if duration < MIN_PROMPT_DURATION_MS {
            continue;
        }

        if longest_valid.is_none_or(|best| duration > best.duration()) {
            longest_valid = Some(*seg);
        }

        if duration <= PREFERRED_MAX_PROMPT_DURATION_MS {
            if preferred.is_none_or(|best| duration > best.duration()) {
                preferred = Some(*seg);
            }
            continue;
        }

        if duration <= HARD_MAX_PROMPT_DURATION_MS
            && within_hard_max.is_none_or(|best| duration > best.duration())
        {
            within_hard_max = Some(*seg);
        }
    }

    preferred.or(within_hard_max).or(longest_valid)
}
