// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::segment::Segment;
use crate::domain::repositories::task_repository::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 新建分段数据
///
/// ASR 步骤批量落库时使用；`(task_id, idx)` 冲突时按 UPSERT 覆盖，
/// 因此 asr 步骤的重复投递是幂等的
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub idx: i32,
    pub start_ms: i32,
    pub end_ms: i32,
    pub src_text: String,
    pub speaker_id: Option<String>,
    pub emotion: Option<String>,
    pub gender: Option<String>,
}

/// 分段仓库特质
#[async_trait]
pub trait SegmentRepository: Send + Sync {
    /// 批量 UPSERT 分段（按 `(task_id, idx)` 冲突覆盖）
    async fn upsert_many(
        &self,
        task_id: Uuid,
        segments: &[NewSegment],
    ) -> Result<(), RepositoryError>;

    /// 读取任务的全部分段（按 idx 升序）
    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Segment>, RepositoryError>;

    /// 读取尚无译文的分段（按 idx 升序）
    async fn list_untranslated(&self, task_id: Uuid) -> Result<Vec<Segment>, RepositoryError>;

    /// 读取尚无合成音频的分段（按 idx 升序，最多 limit 条）
    async fn list_pending_tts(
        &self,
        task_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Segment>, RepositoryError>;

    /// 按任务内序号读取单个分段
    async fn find_by_idx(
        &self,
        task_id: Uuid,
        idx: i32,
    ) -> Result<Option<Segment>, RepositoryError>;

    /// 写入分段译文
    async fn update_translation(
        &self,
        task_id: Uuid,
        idx: i32,
        mt_text: &str,
    ) -> Result<(), RepositoryError>;

    /// 写入分段合成音频键与合成参数
    async fn update_tts_audio(
        &self,
        task_id: Uuid,
        idx: i32,
        tts_audio_key: &str,
        tts_params: &serde_json::Value,
    ) -> Result<(), RepositoryError>;

    /// 统计尚无合成音频的分段数（tts 汇合点判定）
    async fn count_pending_tts(&self, task_id: Uuid) -> Result<u64, RepositoryError>;

    /// 查找已记录 prompt 信息的分段合成参数
    ///
    /// 指定 speaker_id 时优先匹配相同说话人的记录
    async fn find_prompt_params(
        &self,
        task_id: Uuid,
        speaker_id: Option<&str>,
    ) -> Result<Option<serde_json::Value>, RepositoryError>;
}
