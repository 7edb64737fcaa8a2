// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::settings::StepTimeouts;
use crate::domain::models::message::TaskMessage;
use crate::domain::models::step::{StepKind, StepMetrics, StepStatus};
use crate::domain::repositories::{StepRepository, TaskRepository};
use crate::queue::Publisher;
use crate::utils::errors::StepError;
use crate::utils::retry_policy::engine_backoff;
use crate::workers::steps::StepProcessor;

/// 流水线总步骤数（进度展示的分母）
const TOTAL_STEPS: u64 = 5;

/// 步骤状态机执行器
///
/// 对每条投递执行：幂等短路 → 标记 running → 带超时调用处理器 →
/// 落终态。失败时在重试预算内以 `2^(attempt-1)` 秒退避重新发布同一
/// 信封；预算耗尽则将任务置为 failed
pub struct StepRunner {
    tasks: Arc<dyn TaskRepository>,
    steps: Arc<dyn StepRepository>,
    publisher: Arc<dyn Publisher>,
    timeouts: StepTimeouts,
    max_retries: i32,
}

impl StepRunner {
    /// 创建新的状态机执行器
    ///
    /// # 参数
    ///
    /// * `tasks` - 任务仓库
    /// * `steps` - 步骤仓库
    /// * `publisher` - 重试消息发布器
    /// * `timeouts` - 各步骤超时
    /// * `max_retries` - 消息级最大重试次数
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        steps: Arc<dyn StepRepository>,
        publisher: Arc<dyn Publisher>,
        timeouts: StepTimeouts,
        max_retries: i32,
    ) -> Self {
        Self {
            tasks,
            steps,
            publisher,
            timeouts,
            max_retries,
        }
    }

    /// 执行一条投递的完整状态机
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 正向确认（成功、幂等跳过、或已重新入队重试）
    /// * `Err(StepError)` - 终态失败，调用方负向确认且不重新入队
    pub async fn run_step_with_status(
        &self,
        processor: &dyn StepProcessor,
        task_id: Uuid,
        msg: &TaskMessage,
    ) -> Result<(), StepError> {
        let kind = processor.kind();
        let step_name = kind.as_str();

        info!(
            step = step_name,
            task_id = %task_id,
            attempt = msg.attempt,
            trace_id = %msg.trace_id,
            "Processing message"
        );

        // 幂等短路：最新尝试已成功则不写库、不调用、不再发布
        if let Some(latest) = self.steps.latest_attempt(task_id, kind).await? {
            if latest.status == StepStatus::Succeeded {
                info!(
                    step = step_name,
                    task_id = %task_id,
                    "Step already succeeded, skipping"
                );
                counter!("dubrs.steps.skipped", "step" => step_name).increment(1);
                return Ok(());
            }
        }

        self.steps
            .upsert_attempt(task_id, kind, msg.attempt, StepStatus::Running, None, None)
            .await?;
        self.tasks.mark_running_if_queued(task_id).await?;

        let started = Instant::now();
        let result = match self.timeouts.for_step(kind) {
            Some(timeout) => match tokio::time::timeout(timeout, processor.process(task_id, msg))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(StepError::Timeout {
                    step: step_name.to_string(),
                    timeout_secs: timeout.as_secs(),
                }),
            },
            None => processor.process(task_id, msg).await,
        };
        let duration = started.elapsed();

        histogram!("dubrs.step.duration_seconds", "step" => step_name)
            .record(duration.as_secs_f64());

        match result {
            Ok(()) => {
                let metrics = StepMetrics {
                    duration_ms: duration.as_millis() as i64,
                    task_id: task_id.to_string(),
                    step: step_name.to_string(),
                    trace_id: msg.trace_id.clone(),
                };
                self.steps
                    .upsert_attempt(
                        task_id,
                        kind,
                        msg.attempt,
                        StepStatus::Succeeded,
                        None,
                        Some(&metrics),
                    )
                    .await?;
                self.update_progress(task_id).await;

                counter!("dubrs.steps.succeeded", "step" => step_name).increment(1);
                info!(
                    step = step_name,
                    task_id = %task_id,
                    duration_ms = duration.as_millis() as u64,
                    "Step completed"
                );
                Ok(())
            }
            Err(err) => {
                let err_text = err.to_string();
                if let Err(update_err) = self
                    .steps
                    .upsert_attempt(
                        task_id,
                        kind,
                        msg.attempt,
                        StepStatus::Failed,
                        Some(&err_text),
                        None,
                    )
                    .await
                {
                    error!(
                        step = step_name,
                        task_id = %task_id,
                        error = %update_err,
                        "Failed to record step failure"
                    );
                }
                counter!("dubrs.steps.failed", "step" => step_name).increment(1);

                if msg.attempt < self.max_retries {
                    self.retry_message(kind, msg).await?;
                    return Ok(());
                }

                // 重试预算耗尽，任务进入终态
                if let Err(task_err) = self.tasks.mark_failed(task_id, &err_text).await {
                    error!(
                        step = step_name,
                        task_id = %task_id,
                        error = %task_err,
                        "Failed to mark task failed"
                    );
                }
                error!(
                    step = step_name,
                    task_id = %task_id,
                    attempt = msg.attempt,
                    error = %err_text,
                    "Step failed after all attempts"
                );
                Err(err)
            }
        }
    }

    /// 以指数退避重新发布同一信封（attempt 加一）
    async fn retry_message(&self, kind: StepKind, msg: &TaskMessage) -> Result<(), StepError> {
        let retry = msg.next_attempt();
        let delay = engine_backoff(retry.attempt);

        warn!(
            step = kind.as_str(),
            task_id = %msg.task_id,
            attempt = retry.attempt,
            delay_secs = delay.as_secs(),
            "Retrying message"
        );
        counter!("dubrs.steps.retried", "step" => kind.as_str()).increment(1);

        tokio::time::sleep(delay).await;
        self.publisher.publish(&kind.routing_key(), &retry).await?;
        Ok(())
    }

    /// 将任务进度更新为 已成功步骤数/总步骤数（仅供展示，失败忽略）
    async fn update_progress(&self, task_id: Uuid) {
        let Ok(succeeded) = self.steps.count_succeeded(task_id).await else {
            return;
        };
        let progress = ((succeeded.min(TOTAL_STEPS) * 100) / TOTAL_STEPS) as i32;
        if let Err(err) = self.tasks.set_progress(task_id, progress).await {
            warn!(task_id = %task_id, error = %err, "Failed to update task progress");
        }
    }
}
