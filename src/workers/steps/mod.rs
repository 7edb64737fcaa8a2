// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// asr 步骤
pub mod asr;

/// extract_audio 步骤
pub mod extract_audio;

/// mux_video 步骤
pub mod mux_video;

/// translate 步骤
pub mod translate;

/// tts 步骤
pub mod tts;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::resolver::ConfigResolver;
use crate::config::settings::Settings;
use crate::domain::models::message::TaskMessage;
use crate::domain::models::step::StepKind;
use crate::domain::repositories::{ObjectStorage, SegmentRepository, TaskRepository};
use crate::media::ffmpeg::Ffmpeg;
use crate::queue::Publisher;
use crate::utils::errors::StepError;

pub use asr::AsrStep;
pub use extract_audio::ExtractAudioStep;
pub use mux_video::MuxVideoStep;
pub use translate::TranslateStep;
pub use tts::TtsStep;

/// 步骤处理器特质
///
/// 每个步骤的可观测契约是固定的：给定输入工件产出输出工件并发布
/// 后继消息；处理器必须幂等，普通失败以错误返回而非 panic
#[async_trait]
pub trait StepProcessor: Send + Sync {
    /// 步骤种类
    fn kind(&self) -> StepKind;

    /// 处理一条已解码的任务消息
    ///
    /// 引擎在外层施加步骤级超时；实现中的每个外呼都随本 future
    /// 一起被取消
    async fn process(&self, task_id: Uuid, msg: &TaskMessage) -> Result<(), StepError>;
}

/// 步骤处理器共享依赖
#[derive(Clone)]
pub struct StepDeps {
    pub tasks: Arc<dyn TaskRepository>,
    pub segments: Arc<dyn SegmentRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub publisher: Arc<dyn Publisher>,
    pub resolver: Arc<ConfigResolver>,
    pub settings: Arc<Settings>,
    pub ffmpeg: Ffmpeg,
}

/// 任务作用域的临时文件路径
pub(crate) fn tmp_path(task_id: Uuid, suffix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{task_id}_{suffix}"))
}

impl From<crate::config::resolver::ConfigError> for StepError {
    fn from(err: crate::config::resolver::ConfigError) -> Self {
        match err {
            crate::config::resolver::ConfigError::MissingField(field) => {
                StepError::ConfigMissing(field.to_string())
            }
            other => StepError::Transient(other.to_string()),
        }
    }
}

impl From<crate::media::ffmpeg::FfmpegError> for StepError {
    fn from(err: crate::media::ffmpeg::FfmpegError) -> Self {
        StepError::Permanent(err.to_string())
    }
}

impl From<crate::domain::models::message::MessageError> for StepError {
    fn from(err: crate::domain::models::message::MessageError) -> Self {
        StepError::Malformed(err.to_string())
    }
}
