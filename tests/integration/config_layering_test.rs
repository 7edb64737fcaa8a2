// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dubrs::domain::models::task::Task;
use dubrs::domain::repositories::TaskRepository;

use super::helpers::TestHarness;

/// 环境默认 < 设置表 < 任务覆盖 的分层解析
#[tokio::test]
async fn test_effective_config_layering() {
    let harness = TestHarness::new();

    // 第一层：环境默认值
    let effective = harness.resolver.resolve(None).await.unwrap();
    let env_model = effective.translate.glm_model.clone();
    assert!(!env_model.is_empty());

    // 第二层：设置表覆盖环境
    harness.setting_rows.set("translate", "glm_model", "model-B");
    let effective = harness.resolver.resolve(None).await.unwrap();
    assert_eq!(effective.translate.glm_model, "model-B");

    // 第三层：任务覆盖优先于设置表
    let mut task = Task::new(
        "videos/t/source.mp4".to_string(),
        "zh".to_string(),
        "en".to_string(),
    );
    task.overrides.glm_model = Some("model-C".to_string());
    harness.tasks.insert(task.clone());

    let effective = harness.resolver.resolve(Some(task.id)).await.unwrap();
    assert_eq!(effective.translate.glm_model, "model-C");

    // 清空任务覆盖后回落到设置表的值
    let mut cleared = harness.tasks.get(task.id).unwrap();
    cleared.overrides.glm_model = None;
    harness.tasks.delete(task.id).await.unwrap();
    harness.tasks.insert(cleared);

    let effective = harness.resolver.resolve(Some(task.id)).await.unwrap();
    assert_eq!(effective.translate.glm_model, "model-B");

    // 删除设置行后回落到环境默认值
    harness.setting_rows.remove("translate", "glm_model");
    let effective = harness.resolver.resolve(Some(task.id)).await.unwrap();
    assert_eq!(effective.translate.glm_model, env_model);
}

/// 解析是确定性的：同一输入多次解析结果一致
#[tokio::test]
async fn test_resolution_is_deterministic() {
    let harness = TestHarness::new();
    harness.setting_rows.set("tts", "backend", "gradio");
    harness
        .setting_rows
        .set("tts", "service_url", "http://tts.internal:7860");

    let task = harness.seed_task().await;

    let first = harness.resolver.resolve(Some(task.id)).await.unwrap();
    let second = harness.resolver.resolve(Some(task.id)).await.unwrap();
    assert_eq!(first.tts.backend, second.tts.backend);
    assert_eq!(first.tts.service_url, second.tts.service_url);
    assert_eq!(first.tts.backend, "gradio");
}

/// 空的覆盖值不生效
#[tokio::test]
async fn test_empty_override_does_not_shadow() {
    let harness = TestHarness::new();
    harness.setting_rows.set("translate", "glm_model", "model-B");

    let mut task = Task::new(
        "videos/t/source.mp4".to_string(),
        "zh".to_string(),
        "en".to_string(),
    );
    task.overrides.glm_model = Some(String::new());
    harness.tasks.insert(task.clone());

    let effective = harness.resolver.resolve(Some(task.id)).await.unwrap();
    assert_eq!(effective.translate.glm_model, "model-B");
}

/// 校验器指出缺失字段的名字
#[tokio::test]
async fn test_validator_names_missing_field() {
    let harness = TestHarness::new();
    let task = harness.seed_task().await;

    // 默认环境下 ASR 凭证为空
    let effective = harness.resolver.resolve(Some(task.id)).await.unwrap();
    let err = effective.validate_for_asr().unwrap_err();
    assert!(err.to_string().contains("asr.app_key"));

    // 设置表补齐后校验通过
    harness.setting_rows.set("asr", "app_key", "app");
    harness.setting_rows.set("asr", "access_key", "token");
    let effective = harness.resolver.resolve(Some(task.id)).await.unwrap();
    assert!(effective.validate_for_asr().is_ok());
}
