// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use dubrs::domain::models::message::TaskMessage;
use dubrs::domain::models::step::{StepKind, StepStatus};
use dubrs::domain::models::task::TaskStatus;
use dubrs::domain::repositories::TaskRepository;
use dubrs::queue::Publisher;
use dubrs::utils::errors::StepError;
use dubrs::workers::steps::StepProcessor;
use dubrs::workers::{StepRegistry, StepRunner};

use super::helpers::{MockPublisher, TestHarness};

/// 发布后继消息的链式处理器
///
/// 模拟真实步骤的编排行为：成功后发布 next(step) 的消息，
/// mux_video 把任务置为 done
struct ChainProcessor {
    kind: StepKind,
    harness_tasks: Arc<super::helpers::InMemoryTaskRepository>,
    publisher: Arc<MockPublisher>,
}

#[async_trait]
impl StepProcessor for ChainProcessor {
    fn kind(&self) -> StepKind {
        self.kind
    }

    async fn process(&self, task_id: Uuid, _msg: &TaskMessage) -> Result<(), StepError> {
        match self.kind.next() {
            Some(next) => {
                let msg = TaskMessage::new(task_id, next, serde_json::json!({}));
                self.publisher.publish(&next.routing_key(), &msg).await?;
            }
            None => {
                self.harness_tasks
                    .mark_done(task_id, &format!("outputs/{task_id}/final.mp4"))
                    .await?;
            }
        }
        Ok(())
    }
}

fn build_registry(harness: &TestHarness) -> StepRegistry {
    let mut registry = StepRegistry::new();
    for kind in StepKind::all() {
        registry.register(Arc::new(ChainProcessor {
            kind,
            harness_tasks: harness.tasks.clone(),
            publisher: harness.publisher.clone(),
        }));
    }
    registry
}

/// 把消息在内存总线与注册表之间循环投递，直至没有新消息
async fn drain_bus(harness: &TestHarness, registry: &StepRegistry, runner: &StepRunner) {
    loop {
        let batch = harness.publisher.drain();
        if batch.is_empty() {
            return;
        }
        for (routing_key, msg) in batch {
            let step_name = routing_key.strip_prefix("task.").unwrap_or(&routing_key);
            let kind = StepKind::from_str(step_name).expect("known step");
            let processor = registry.get(kind).expect("registered step");
            let task_id = Uuid::parse_str(&msg.task_id).unwrap();
            runner
                .run_step_with_status(processor.as_ref(), task_id, &msg)
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn test_pipeline_progresses_through_all_steps() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    let registry = build_registry(&harness);
    let runner = StepRunner::new(
        harness.tasks.clone(),
        harness.steps.clone(),
        harness.publisher.clone(),
        harness.settings.timeouts.clone(),
        harness.settings.worker.max_retries,
    );

    // 上游发布首条 extract_audio 消息
    let first = TaskMessage::new(task.id, StepKind::ExtractAudio, serde_json::json!({}));
    harness
        .publisher
        .publish(&StepKind::ExtractAudio.routing_key(), &first)
        .await
        .unwrap();

    drain_bus(&harness, &registry, &runner).await;

    // 每个步骤恰好一行 succeeded
    let rows = harness.steps.all();
    assert_eq!(rows.len(), 5);
    for kind in StepKind::all() {
        let matching: Vec<_> = rows
            .iter()
            .filter(|row| row.step == kind && row.status == StepStatus::Succeeded)
            .collect();
        assert_eq!(matching.len(), 1, "step {kind} should succeed exactly once");
    }

    let stored = harness.tasks.get(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Done);
    assert_eq!(stored.progress, 100);
    assert!(stored.output_video_key.is_some());
}

#[tokio::test]
async fn test_redelivered_terminal_message_does_not_duplicate_done() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    let registry = build_registry(&harness);
    let runner = StepRunner::new(
        harness.tasks.clone(),
        harness.steps.clone(),
        harness.publisher.clone(),
        harness.settings.timeouts.clone(),
        harness.settings.worker.max_retries,
    );

    let first = TaskMessage::new(task.id, StepKind::ExtractAudio, serde_json::json!({}));
    harness
        .publisher
        .publish(&StepKind::ExtractAudio.routing_key(), &first)
        .await
        .unwrap();
    drain_bus(&harness, &registry, &runner).await;

    // 终点消息重复投递：幂等短路，不新增任何行
    let rows_before = harness.steps.all().len();
    let stale = TaskMessage::new(task.id, StepKind::MuxVideo, serde_json::json!({}));
    let processor = registry.get(StepKind::MuxVideo).unwrap();
    runner
        .run_step_with_status(processor.as_ref(), task.id, &stale)
        .await
        .unwrap();

    assert_eq!(harness.steps.all().len(), rows_before);
    assert!(harness.publisher.is_empty());
    assert_eq!(harness.tasks.get(task.id).unwrap().status, TaskStatus::Done);
}
