// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use dubrs::domain::models::message::TaskMessage;
use dubrs::domain::models::step::{StepKind, StepStatus};
use dubrs::domain::models::task::TaskStatus;
use dubrs::utils::errors::StepError;
use dubrs::workers::steps::StepProcessor;
use dubrs::workers::StepRunner;

use super::helpers::TestHarness;

/// 每次调用按脚本返回结果的处理器
struct ScriptedProcessor {
    kind: StepKind,
    script: Mutex<VecDeque<Result<(), String>>>,
    calls: AtomicUsize,
    hang: bool,
}

impl ScriptedProcessor {
    fn succeeding(kind: StepKind) -> Self {
        Self::with_script(kind, VecDeque::new())
    }

    fn failing(kind: StepKind, message: &str) -> Self {
        let mut script = VecDeque::new();
        script.push_back(Err(message.to_string()));
        Self::with_script(kind, script)
    }

    fn hanging(kind: StepKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            hang: true,
        }
    }

    fn with_script(kind: StepKind, script: VecDeque<Result<(), String>>) -> Self {
        Self {
            kind,
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            hang: false,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepProcessor for ScriptedProcessor {
    fn kind(&self) -> StepKind {
        self.kind
    }

    async fn process(&self, _task_id: Uuid, _msg: &TaskMessage) -> Result<(), StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        match self.script.lock().unwrap().pop_front() {
            None => Ok(()),
            Some(Ok(())) => Ok(()),
            Some(Err(message)) => Err(StepError::Transient(message)),
        }
    }
}

fn runner(harness: &TestHarness, max_retries: i32) -> StepRunner {
    StepRunner::new(
        harness.tasks.clone(),
        harness.steps.clone(),
        harness.publisher.clone(),
        harness.settings.timeouts.clone(),
        max_retries,
    )
}

fn envelope(task_id: Uuid, kind: StepKind, attempt: i32) -> TaskMessage {
    let mut msg = TaskMessage::new(task_id, kind, serde_json::json!({}));
    msg.attempt = attempt;
    msg
}

#[tokio::test]
async fn test_success_records_step_and_progress() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    let runner = runner(&harness, 3);
    let processor = ScriptedProcessor::succeeding(StepKind::ExtractAudio);

    let msg = envelope(task.id, StepKind::ExtractAudio, 1);
    runner
        .run_step_with_status(&processor, task.id, &msg)
        .await
        .unwrap();

    let rows = harness.steps.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, StepStatus::Succeeded);
    assert_eq!(rows[0].attempt, 1);
    assert!(rows[0].ended_at.is_some());
    let metrics = rows[0].metrics.as_ref().unwrap();
    assert_eq!(metrics.step, "extract_audio");
    assert_eq!(metrics.trace_id, msg.trace_id);

    let stored = harness.tasks.get(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
    assert_eq!(stored.progress, 20); // 1/5 步骤完成
}

#[tokio::test]
async fn test_idempotency_short_circuit_performs_no_writes() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    let runner = runner(&harness, 3);
    let processor = ScriptedProcessor::succeeding(StepKind::Asr);

    // 第一次成功执行
    let msg = envelope(task.id, StepKind::Asr, 1);
    runner
        .run_step_with_status(&processor, task.id, &msg)
        .await
        .unwrap();
    assert_eq!(processor.calls(), 1);
    let rows_before = harness.steps.all();

    // 重复投递：不调用处理器、不新增行、不发布消息
    runner
        .run_step_with_status(&processor, task.id, &msg)
        .await
        .unwrap();
    assert_eq!(processor.calls(), 1);
    assert_eq!(harness.steps.all().len(), rows_before.len());
    assert!(harness.publisher.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failure_republishes_with_incremented_attempt() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    let runner = runner(&harness, 3);
    let processor = ScriptedProcessor::failing(StepKind::Asr, "asr service 503");

    let msg = envelope(task.id, StepKind::Asr, 1);
    runner
        .run_step_with_status(&processor, task.id, &msg)
        .await
        .unwrap();

    // 失败尝试落库
    let rows = harness.steps.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, StepStatus::Failed);
    assert!(rows[0].error.as_deref().unwrap().contains("asr service 503"));

    // 同一信封以 attempt+1 重新发布
    let retries = harness.publisher.published_to("task.asr");
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].attempt, 2);
    assert_eq!(retries[0].trace_id, msg.trace_id);

    // 任务未进入终态
    assert_eq!(
        harness.tasks.get(task.id).unwrap().status,
        TaskStatus::Running
    );
}

#[tokio::test]
async fn test_exhausted_retries_mark_task_failed() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    let runner = runner(&harness, 3);
    let processor = ScriptedProcessor::failing(StepKind::Tts, "tts credentials missing");

    let msg = envelope(task.id, StepKind::Tts, 3);
    let err = runner
        .run_step_with_status(&processor, task.id, &msg)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("tts credentials missing"));

    let stored = harness.tasks.get(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.error.unwrap().contains("tts credentials missing"));
    assert!(harness.publisher.is_empty());
}

#[tokio::test]
async fn test_zero_max_retries_fails_immediately() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    let runner = runner(&harness, 0);
    let processor = ScriptedProcessor::failing(StepKind::ExtractAudio, "boom");

    let msg = envelope(task.id, StepKind::ExtractAudio, 1);
    assert!(runner
        .run_step_with_status(&processor, task.id, &msg)
        .await
        .is_err());

    assert_eq!(
        harness.tasks.get(task.id).unwrap().status,
        TaskStatus::Failed
    );
    assert!(harness.publisher.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_reported_and_counts_as_attempt() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    let runner = runner(&harness, 3);
    let processor = ScriptedProcessor::hanging(StepKind::ExtractAudio);

    let msg = envelope(task.id, StepKind::ExtractAudio, 1);
    runner
        .run_step_with_status(&processor, task.id, &msg)
        .await
        .unwrap();

    let rows = harness.steps.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, StepStatus::Failed);
    assert_eq!(rows[0].attempt, 1);
    assert!(rows[0].error.as_deref().unwrap().contains("执行超时"));

    // 超时同样进入重试流程
    let retries = harness.publisher.published_to("task.extract_audio");
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].attempt, 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempts_then_success() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    let runner = runner(&harness, 3);

    let mut script = VecDeque::new();
    script.push_back(Err("asr 503".to_string()));
    script.push_back(Err("asr 503".to_string()));
    script.push_back(Ok(()));
    let processor = ScriptedProcessor::with_script(StepKind::Asr, script);

    // 模拟两次失败投递与最终成功的第三次投递
    for attempt in 1..=3 {
        let msg = envelope(task.id, StepKind::Asr, attempt);
        runner
            .run_step_with_status(&processor, task.id, &msg)
            .await
            .unwrap();
    }

    let rows = harness.steps.all();
    assert_eq!(rows.len(), 3);
    let statuses: Vec<StepStatus> = rows.iter().map(|row| row.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Failed, StepStatus::Failed, StepStatus::Succeeded]
    );
    assert_ne!(
        harness.tasks.get(task.id).unwrap().status,
        TaskStatus::Failed
    );
}

#[tokio::test]
async fn test_succeeded_rows_never_revert() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    let runner = runner(&harness, 3);
    let processor = Arc::new(ScriptedProcessor::succeeding(StepKind::MuxVideo));

    let msg = envelope(task.id, StepKind::MuxVideo, 1);
    runner
        .run_step_with_status(processor.as_ref(), task.id, &msg)
        .await
        .unwrap();

    // 旧的重试消息（更高 attempt）迟到也不会改写已成功的行
    let stale = envelope(task.id, StepKind::MuxVideo, 2);
    runner
        .run_step_with_status(processor.as_ref(), task.id, &stale)
        .await
        .unwrap();

    let rows = harness.steps.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, StepStatus::Succeeded);
    assert_eq!(processor.calls(), 1);
}
