// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

use dubrs::domain::models::segment::Segment;
use dubrs::domain::models::setting::Setting;
use dubrs::domain::models::step::{StepKind, StepMetrics, StepStatus, TaskStep};
use dubrs::domain::models::task::{Task, TaskStatus};
use dubrs::domain::repositories::{
    NewSegment, RepositoryError, SegmentRepository, SettingRepository, SettingUpsert,
    StepRepository, TaskRepository,
};

/// 内存任务仓库
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<Vec<Task>>,
}

impl InMemoryTaskRepository {
    /// 直接插入任务（测试数据准备）
    pub fn insert(&self, task: Task) {
        self.tasks.lock().unwrap().push(task);
    }

    /// 读取当前任务快照
    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: &Task) -> Result<Task, RepositoryError> {
        self.insert(task.clone());
        Ok(task.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, RepositoryError> {
        Ok(self.get(id))
    }

    async fn mark_running_if_queued(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            if matches!(task.status, TaskStatus::Created | TaskStatus::Queued) {
                task.status = TaskStatus::Running;
                task.updated_at = Utc::now().into();
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.status = TaskStatus::Failed;
            task.error = Some(error.to_string());
            task.updated_at = Utc::now().into();
        }
        Ok(())
    }

    async fn mark_done(&self, id: Uuid, output_video_key: &str) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.status = TaskStatus::Done;
            task.output_video_key = Some(output_video_key.to_string());
            task.progress = 100;
            task.updated_at = Utc::now().into();
        }
        Ok(())
    }

    async fn set_progress(&self, id: Uuid, progress: i32) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.progress = progress;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.tasks.lock().unwrap().retain(|t| t.id != id);
        Ok(())
    }
}

/// 内存步骤仓库
#[derive(Default)]
pub struct InMemoryStepRepository {
    rows: Mutex<Vec<TaskStep>>,
}

impl InMemoryStepRepository {
    /// 预置一行步骤记录
    pub fn seed(&self, row: TaskStep) {
        self.rows.lock().unwrap().push(row);
    }

    /// 读取全部步骤行
    pub fn all(&self) -> Vec<TaskStep> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepRepository for InMemoryStepRepository {
    async fn latest_attempt(
        &self,
        task_id: Uuid,
        step: StepKind,
    ) -> Result<Option<TaskStep>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.task_id == task_id && row.step == step)
            .max_by_key(|row| row.attempt)
            .cloned())
    }

    async fn upsert_attempt(
        &self,
        task_id: Uuid,
        step: StepKind,
        attempt: i32,
        status: StepStatus,
        error: Option<&str>,
        metrics: Option<&StepMetrics>,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|row| row.task_id == task_id && row.step == step && row.attempt == attempt)
        {
            Some(row) => {
                row.status = status;
                row.error = error.map(str::to_string);
                if metrics.is_some() {
                    row.metrics = metrics.cloned();
                }
                if matches!(status, StepStatus::Succeeded | StepStatus::Failed) {
                    row.ended_at = Some(now.into());
                }
            }
            None => rows.push(TaskStep {
                id: Uuid::new_v4(),
                task_id,
                step,
                status,
                attempt,
                started_at: Some(now.into()),
                ended_at: match status {
                    StepStatus::Succeeded | StepStatus::Failed => Some(now.into()),
                    _ => None,
                },
                error: error.map(str::to_string),
                metrics: metrics.cloned(),
            }),
        }
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<TaskStep>, RepositoryError> {
        let mut rows: Vec<TaskStep> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.task_id == task_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.step.as_str(), row.attempt));
        Ok(rows)
    }

    async fn count_succeeded(&self, task_id: Uuid) -> Result<u64, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut steps: Vec<StepKind> = rows
            .iter()
            .filter(|row| row.task_id == task_id && row.status == StepStatus::Succeeded)
            .map(|row| row.step)
            .collect();
        steps.sort_by_key(|s| s.as_str());
        steps.dedup();
        Ok(steps.len() as u64)
    }
}

/// 内存分段仓库
#[derive(Default)]
pub struct InMemorySegmentRepository {
    rows: Mutex<Vec<Segment>>,
}

impl InMemorySegmentRepository {
    /// 预置一条分段
    pub fn seed(&self, segment: Segment) {
        self.rows.lock().unwrap().push(segment);
    }

    /// 读取任务的分段快照（按 idx 排序）
    pub fn snapshot(&self, task_id: Uuid) -> Vec<Segment> {
        let mut rows: Vec<Segment> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|seg| seg.task_id == task_id)
            .cloned()
            .collect();
        rows.sort_by_key(|seg| seg.idx);
        rows
    }
}

fn is_pending_tts(segment: &Segment) -> bool {
    !segment.has_tts_audio()
}

#[async_trait]
impl SegmentRepository for InMemorySegmentRepository {
    async fn upsert_many(
        &self,
        task_id: Uuid,
        segments: &[NewSegment],
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        for seg in segments {
            match rows
                .iter_mut()
                .find(|row| row.task_id == task_id && row.idx == seg.idx)
            {
                Some(row) => {
                    row.start_ms = seg.start_ms;
                    row.end_ms = seg.end_ms;
                    row.duration_ms = seg.end_ms - seg.start_ms;
                    row.src_text = seg.src_text.clone();
                    row.speaker_id = seg.speaker_id.clone();
                    row.emotion = seg.emotion.clone();
                    row.gender = seg.gender.clone();
                }
                None => rows.push(Segment {
                    id: Uuid::new_v4(),
                    task_id,
                    idx: seg.idx,
                    start_ms: seg.start_ms,
                    end_ms: seg.end_ms,
                    duration_ms: seg.end_ms - seg.start_ms,
                    src_text: seg.src_text.clone(),
                    mt_text: None,
                    tts_params: None,
                    tts_audio_key: None,
                    speaker_id: seg.speaker_id.clone(),
                    emotion: seg.emotion.clone(),
                    gender: seg.gender.clone(),
                }),
            }
        }
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Segment>, RepositoryError> {
        Ok(self.snapshot(task_id))
    }

    async fn list_untranslated(&self, task_id: Uuid) -> Result<Vec<Segment>, RepositoryError> {
        Ok(self
            .snapshot(task_id)
            .into_iter()
            .filter(|seg| seg.mt_text.as_deref().unwrap_or("").is_empty())
            .collect())
    }

    async fn list_pending_tts(
        &self,
        task_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Segment>, RepositoryError> {
        Ok(self
            .snapshot(task_id)
            .into_iter()
            .filter(is_pending_tts)
            .take(limit as usize)
            .collect())
    }

    async fn find_by_idx(
        &self,
        task_id: Uuid,
        idx: i32,
    ) -> Result<Option<Segment>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|seg| seg.task_id == task_id && seg.idx == idx)
            .cloned())
    }

    async fn update_translation(
        &self,
        task_id: Uuid,
        idx: i32,
        mt_text: &str,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(seg) = rows
            .iter_mut()
            .find(|seg| seg.task_id == task_id && seg.idx == idx)
        {
            seg.mt_text = Some(mt_text.to_string());
        }
        Ok(())
    }

    async fn update_tts_audio(
        &self,
        task_id: Uuid,
        idx: i32,
        tts_audio_key: &str,
        tts_params: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(seg) = rows
            .iter_mut()
            .find(|seg| seg.task_id == task_id && seg.idx == idx)
        {
            seg.tts_audio_key = Some(tts_audio_key.to_string());
            seg.tts_params = Some(tts_params.clone());
        }
        Ok(())
    }

    async fn count_pending_tts(&self, task_id: Uuid) -> Result<u64, RepositoryError> {
        Ok(self
            .snapshot(task_id)
            .iter()
            .filter(|seg| is_pending_tts(seg))
            .count() as u64)
    }

    async fn find_prompt_params(
        &self,
        task_id: Uuid,
        speaker_id: Option<&str>,
    ) -> Result<Option<serde_json::Value>, RepositoryError> {
        Ok(self
            .snapshot(task_id)
            .into_iter()
            .filter_map(|seg| seg.tts_params)
            .find(|params| {
                if params.get("prompt_key").and_then(|k| k.as_str()).is_none() {
                    return false;
                }
                match speaker_id {
                    None => true,
                    Some(speaker) => {
                        let matches = |field: &str| {
                            params.get(field).and_then(|v| v.as_str()) == Some(speaker)
                        };
                        matches("prompt_speaker_id") || matches("speaker_id")
                    }
                }
            }))
    }
}

/// 内存设置仓库
#[derive(Default)]
pub struct InMemorySettingRepository {
    rows: Mutex<Vec<Setting>>,
}

impl InMemorySettingRepository {
    /// 写入一条设置
    pub fn set(&self, category: &str, key: &str, value: &str) {
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|row| row.category == category && row.key == key)
        {
            Some(row) => row.value = value.to_string(),
            None => rows.push(Setting {
                id: Uuid::new_v4(),
                category: category.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                is_sensitive: false,
                updated_at: Utc::now().into(),
            }),
        }
    }

    /// 删除一条设置
    pub fn remove(&self, category: &str, key: &str) {
        self.rows
            .lock()
            .unwrap()
            .retain(|row| !(row.category == category && row.key == key));
    }
}

#[async_trait]
impl SettingRepository for InMemorySettingRepository {
    async fn load_all(&self) -> Result<Vec<Setting>, RepositoryError> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn find(&self, category: &str, key: &str) -> Result<Option<Setting>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.category == category && row.key == key)
            .cloned())
    }

    async fn upsert_many(&self, settings: &[SettingUpsert]) -> Result<(), RepositoryError> {
        for item in settings {
            self.set(&item.category, &item.key, &item.value);
        }
        Ok(())
    }

    async fn delete(&self, category: &str, key: &str) -> Result<(), RepositoryError> {
        self.remove(category, key);
        Ok(())
    }
}
