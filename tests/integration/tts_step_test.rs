// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use uuid::Uuid;

use dubrs::domain::models::message::{TaskMessage, TtsPayload, TTS_COMPENSATION_ROUTING_KEY};
use dubrs::domain::models::segment::Segment;
use dubrs::domain::models::step::StepKind;
use dubrs::domain::repositories::SegmentRepository;
use dubrs::workers::steps::{StepProcessor, TtsStep};

use super::helpers::{ScriptedSynthesizer, TestHarness};

fn seed_segment(harness: &TestHarness, task_id: Uuid, idx: i32, mt_text: &str) -> Segment {
    let segment = Segment {
        id: Uuid::new_v4(),
        task_id,
        idx,
        start_ms: idx * 4_000,
        end_ms: (idx + 1) * 4_000,
        duration_ms: 4_000,
        src_text: format!("源文本{idx}"),
        mt_text: Some(mt_text.to_string()),
        tts_params: None,
        tts_audio_key: None,
        speaker_id: Some("speaker_1".to_string()),
        emotion: None,
        gender: None,
    };
    harness.segments.seed(segment.clone());
    segment
}

fn seed_prompt(harness: &TestHarness, task_id: Uuid) {
    harness
        .storage
        .seed(&format!("tts/{task_id}/prompt.wav"), b"prompt-bytes");
}

fn driver_message(task_id: Uuid, payload: TtsPayload) -> TaskMessage {
    TaskMessage::new(
        task_id,
        StepKind::Tts,
        serde_json::to_value(payload).unwrap(),
    )
}

#[tokio::test]
async fn test_batch_synthesis_and_drive_loop() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    seed_prompt(&harness, task.id);
    for idx in 0..3 {
        seed_segment(&harness, task.id, idx, &format!("translated {idx}"));
    }

    let synth = Arc::new(ScriptedSynthesizer::new());
    let step = TtsStep::with_synthesizer(harness.step_deps(), synth.clone());

    let payload = TtsPayload {
        task_id: task.id.to_string(),
        batch_size: Some(2),
        ..Default::default()
    };
    step.process(task.id, &driver_message(task.id, payload))
        .await
        .unwrap();

    // 批内前两段已合成并落库
    let segments = harness.segments.snapshot(task.id);
    assert!(segments[0].has_tts_audio());
    assert!(segments[1].has_tts_audio());
    assert!(!segments[2].has_tts_audio());
    assert_eq!(
        segments[0].tts_audio_key.as_deref(),
        Some(format!("tts/{}/segment_0.wav", task.id).as_str())
    );
    let params = segments[0].tts_params.as_ref().unwrap();
    assert!(params["prompt_key"]
        .as_str()
        .unwrap()
        .contains("prompt.wav"));

    // 音色参考来自已存在的 prompt 对象
    for request in synth.requests() {
        assert!(request
            .prompt_audio_url
            .as_deref()
            .unwrap()
            .contains("prompt.wav"));
    }

    // 仍有剩余：重新发布驱动消息，不发布 mux_video
    let drivers = harness.publisher.published_to("task.tts");
    assert_eq!(drivers.len(), 1);
    assert_eq!(drivers[0].attempt, 1);
    let driver_payload: TtsPayload = drivers[0].payload_as().unwrap();
    assert_eq!(driver_payload.batch_size, Some(2));
    assert!(harness.publisher.published_to("task.mux_video").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_permanent_segment_failure_emits_compensation() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    seed_prompt(&harness, task.id);
    seed_segment(&harness, task.id, 0, "good segment");
    seed_segment(&harness, task.id, 1, "bad segment");

    let synth = Arc::new(ScriptedSynthesizer::failing_on(&["bad segment"]));
    let step = TtsStep::with_synthesizer(harness.step_deps(), synth.clone());

    let payload = TtsPayload {
        task_id: task.id.to_string(),
        max_retries: Some(3),
        retry_delay_sec: Some(2.0),
        ..Default::default()
    };
    let err = step
        .process(task.id, &driver_message(task.id, payload))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("pending segments remain"));

    // 失败分段重试 3 次（共 4 次尝试）后放弃
    assert_eq!(synth.attempts_for("bad segment"), 4);

    // 兄弟分段不受影响
    let segments = harness.segments.snapshot(task.id);
    assert!(segments[0].has_tts_audio());
    assert!(!segments[1].has_tts_audio());

    // 恰好一条补偿消息，指向失败的分段
    let compensations = harness.publisher.published_to(TTS_COMPENSATION_ROUTING_KEY);
    assert_eq!(compensations.len(), 1);
    assert_eq!(compensations[0].payload["segment_idx"], 1);
    assert!(compensations[0].payload["error"]
        .as_str()
        .unwrap()
        .contains("synthesis exploded"));

    // 失败批次不得触达汇合点
    assert!(harness.publisher.published_to("task.mux_video").is_empty());
}

#[tokio::test]
async fn test_redelivery_skips_already_synthesized_segments() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    seed_prompt(&harness, task.id);

    for idx in 0..4 {
        seed_segment(&harness, task.id, idx, &format!("text {idx}"));
    }
    // 崩溃前已完成的分段：重投递后必须跳过
    harness
        .segments
        .update_tts_audio(
            task.id,
            1,
            &format!("tts/{}/segment_1.wav", task.id),
            &serde_json::json!({"speaker_id": "speaker_1"}),
        )
        .await
        .unwrap();

    let synth = Arc::new(ScriptedSynthesizer::new());
    let step = TtsStep::with_synthesizer(harness.step_deps(), synth.clone());

    let payload = TtsPayload {
        task_id: task.id.to_string(),
        batch_size: Some(2),
        ..Default::default()
    };
    step.process(task.id, &driver_message(task.id, payload))
        .await
        .unwrap();

    // 已合成的 idx=1 不再请求合成
    assert_eq!(synth.attempts_for("text 1"), 0);
    assert_eq!(synth.attempts_for("text 0"), 1);
    assert_eq!(synth.attempts_for("text 2"), 1);

    // 批后仍有 idx=3 待处理，驱动循环继续
    assert_eq!(harness.publisher.published_to("task.tts").len(), 1);
    assert!(harness.publisher.published_to("task.mux_video").is_empty());
}

#[tokio::test]
async fn test_legacy_single_segment_message_is_accepted() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;
    seed_prompt(&harness, task.id);

    // 旧格式：库中无分段行，消息自带文本
    let legacy = serde_json::json!({
        "task_id": task.id.to_string(),
        "segment_id": "seg-5",
        "segment_idx": 5,
        "text": "legacy text",
        "target_duration_ms": 1800,
        "speaker_id": "speaker_1",
    });
    let msg = TaskMessage::new(task.id, StepKind::Tts, legacy);

    let synth = Arc::new(ScriptedSynthesizer::new());
    let step = TtsStep::with_synthesizer(harness.step_deps(), synth.clone());

    // 合成与上传发生；任务没有任何分段行，汇合点因而报错
    let err = step.process(task.id, &msg).await.unwrap_err();
    assert!(err.to_string().contains("no segments found"));

    assert_eq!(synth.attempts_for("legacy text"), 1);
    assert!(harness
        .storage
        .get(&format!("tts/{}/segment_5.wav", task.id))
        .is_some());
}

#[tokio::test]
async fn test_no_prompt_candidate_fails_with_explicit_error() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;

    // 所有分段都短于 3 秒，不能作为音色参考
    let segment = Segment {
        id: Uuid::new_v4(),
        task_id: task.id,
        idx: 0,
        start_ms: 0,
        end_ms: 2_000,
        duration_ms: 2_000,
        src_text: "短".to_string(),
        mt_text: Some("short".to_string()),
        tts_params: None,
        tts_audio_key: None,
        speaker_id: None,
        emotion: None,
        gender: None,
    };
    harness.segments.seed(segment);

    let synth = Arc::new(ScriptedSynthesizer::new());
    let step = TtsStep::with_synthesizer(harness.step_deps(), synth.clone());

    let payload = TtsPayload {
        task_id: task.id.to_string(),
        ..Default::default()
    };
    let err = step
        .process(task.id, &driver_message(task.id, payload))
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("no valid segment found to build prompt"));
    assert!(synth.requests().is_empty());
}
