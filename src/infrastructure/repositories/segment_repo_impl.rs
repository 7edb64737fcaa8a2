// Copyright 2025 dubrs contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::segment::Segment;
use crate::domain::repositories::{NewSegment, RepositoryError, SegmentRepository};
use crate::infrastructure::database::entities::segment as segment_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 分段仓库实现
#[derive(Clone)]
pub struct SegmentRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl SegmentRepositoryImpl {
    /// 创建新的分段仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<segment_entity::Model> for Segment {
    fn from(model: segment_entity::Model) -> Self {
        Self {
            id: model.id,
            task_id: model.task_id,
            idx: model.idx,
            start_ms: model.start_ms,
            end_ms: model.end_ms,
            duration_ms: model.duration_ms,
            src_text: model.src_text,
            mt_text: model.mt_text,
            tts_params: model.tts_params_json,
            tts_audio_key: model.tts_audio_key,
            speaker_id: model.speaker_id,
            emotion: model.emotion,
            gender: model.gender,
        }
    }
}

/// 尚无合成音频的过滤条件（NULL 或空串都算待合成）
fn pending_tts_condition() -> Condition {
    Condition::any()
        .add(segment_entity::Column::TtsAudioKey.is_null())
        .add(segment_entity::Column::TtsAudioKey.eq(""))
}

#[async_trait]
impl SegmentRepository for SegmentRepositoryImpl {
    async fn upsert_many(
        &self,
        task_id: Uuid,
        segments: &[NewSegment],
    ) -> Result<(), RepositoryError> {
        if segments.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let models: Vec<segment_entity::ActiveModel> = segments
            .iter()
            .map(|seg| segment_entity::ActiveModel {
                id: Set(Uuid::new_v4()),
                task_id: Set(task_id),
                idx: Set(seg.idx),
                start_ms: Set(seg.start_ms),
                end_ms: Set(seg.end_ms),
                duration_ms: Set(seg.end_ms - seg.start_ms),
                src_text: Set(seg.src_text.clone()),
                mt_text: Set(None),
                tts_params_json: Set(None),
                tts_audio_key: Set(None),
                speaker_id: Set(seg.speaker_id.clone()),
                emotion: Set(seg.emotion.clone()),
                gender: Set(seg.gender.clone()),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            })
            .collect();

        // 重复投递时按 (task_id, idx) 覆盖时间戳与文本，保持 asr 幂等
        segment_entity::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    segment_entity::Column::TaskId,
                    segment_entity::Column::Idx,
                ])
                .update_columns([
                    segment_entity::Column::StartMs,
                    segment_entity::Column::EndMs,
                    segment_entity::Column::DurationMs,
                    segment_entity::Column::SrcText,
                    segment_entity::Column::SpeakerId,
                    segment_entity::Column::Emotion,
                    segment_entity::Column::Gender,
                    segment_entity::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Segment>, RepositoryError> {
        let models = segment_entity::Entity::find()
            .filter(segment_entity::Column::TaskId.eq(task_id))
            .order_by_asc(segment_entity::Column::Idx)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn list_untranslated(&self, task_id: Uuid) -> Result<Vec<Segment>, RepositoryError> {
        let models = segment_entity::Entity::find()
            .filter(segment_entity::Column::TaskId.eq(task_id))
            .filter(
                Condition::any()
                    .add(segment_entity::Column::MtText.is_null())
                    .add(segment_entity::Column::MtText.eq("")),
            )
            .order_by_asc(segment_entity::Column::Idx)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn list_pending_tts(
        &self,
        task_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Segment>, RepositoryError> {
        let models = segment_entity::Entity::find()
            .filter(segment_entity::Column::TaskId.eq(task_id))
            .filter(pending_tts_condition())
            .order_by_asc(segment_entity::Column::Idx)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn find_by_idx(
        &self,
        task_id: Uuid,
        idx: i32,
    ) -> Result<Option<Segment>, RepositoryError> {
        let model = segment_entity::Entity::find()
            .filter(segment_entity::Column::TaskId.eq(task_id))
            .filter(segment_entity::Column::Idx.eq(idx))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn update_translation(
        &self,
        task_id: Uuid,
        idx: i32,
        mt_text: &str,
    ) -> Result<(), RepositoryError> {
        segment_entity::Entity::update_many()
            .col_expr(
                segment_entity::Column::MtText,
                Expr::value(mt_text.to_string()),
            )
            .col_expr(segment_entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(segment_entity::Column::TaskId.eq(task_id))
            .filter(segment_entity::Column::Idx.eq(idx))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn update_tts_audio(
        &self,
        task_id: Uuid,
        idx: i32,
        tts_audio_key: &str,
        tts_params: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        segment_entity::Entity::update_many()
            .col_expr(
                segment_entity::Column::TtsAudioKey,
                Expr::value(tts_audio_key.to_string()),
            )
            .col_expr(
                segment_entity::Column::TtsParamsJson,
                Expr::value(tts_params.clone()),
            )
            .col_expr(segment_entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(segment_entity::Column::TaskId.eq(task_id))
            .filter(segment_entity::Column::Idx.eq(idx))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn count_pending_tts(&self, task_id: Uuid) -> Result<u64, RepositoryError> {
        let count = segment_entity::Entity::find()
            .filter(segment_entity::Column::TaskId.eq(task_id))
            .filter(pending_tts_condition())
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    async fn find_prompt_params(
        &self,
        task_id: Uuid,
        speaker_id: Option<&str>,
    ) -> Result<Option<serde_json::Value>, RepositoryError> {
        let mut query = segment_entity::Entity::find()
            .filter(segment_entity::Column::TaskId.eq(task_id))
            .filter(Expr::cust("tts_params_json->>'prompt_key' IS NOT NULL"));

        if let Some(speaker) = speaker_id {
            query = query.filter(Expr::cust_with_values(
                "tts_params_json->>'prompt_speaker_id' = ? OR tts_params_json->>'speaker_id' = ?",
                [speaker, speaker],
            ));
        }

        let model = query.one(self.db.as_ref()).await?;
        Ok(model.and_then(|m| m.tts_params_json))
    }
}
