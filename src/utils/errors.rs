// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// 步骤执行错误类型
///
/// 区分错误类别便于日志与补偿处理；重试与否由引擎按照重试计数统一决定
#[derive(Error, Debug)]
pub enum StepError {
    /// 消息格式错误（直接丢弃，不重试）
    #[error("消息格式错误: {0}")]
    Malformed(String),

    /// 有效配置缺少必需字段
    #[error("配置缺失: {0}")]
    ConfigMissing(String),

    /// 瞬时错误（网络、超时、限流、外部服务 5xx）
    #[error("瞬时错误: {0}")]
    Transient(String),

    /// 永久错误（不变量被破坏、外部服务 4xx、前置条件缺失）
    #[error("永久错误: {0}")]
    Permanent(String),

    /// 步骤超时
    #[error("步骤 {step} 执行超时 ({timeout_secs}s)")]
    Timeout { step: String, timeout_secs: u64 },
}

impl StepError {
    /// 判断该错误是否应被直接丢弃而非进入重试流程
    pub fn is_discard(&self) -> bool {
        matches!(self, StepError::Malformed(_))
    }
}

impl From<crate::domain::repositories::RepositoryError> for StepError {
    fn from(err: crate::domain::repositories::RepositoryError) -> Self {
        StepError::Transient(err.to_string())
    }
}

impl From<crate::domain::repositories::StorageError> for StepError {
    fn from(err: crate::domain::repositories::StorageError) -> Self {
        StepError::Transient(err.to_string())
    }
}

impl From<crate::queue::QueueError> for StepError {
    fn from(err: crate::queue::QueueError) -> Self {
        StepError::Transient(err.to_string())
    }
}

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("队列错误: {0}")]
    QueueError(String),

    #[error("仓库错误: {0}")]
    RepositoryError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}
