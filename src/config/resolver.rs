// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::settings::{
    AsrSettings, OssSettings, Settings, StorageSettings, TranslateSettings, TtsSettings,
};
use crate::domain::models::task::TaskOverrides;
use crate::domain::repositories::{
    RepositoryError, SettingRepository, TaskRepository,
};

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 缺少必需的配置字段
    #[error("缺少必需的配置字段: {0}")]
    MissingField(&'static str),

    /// 读取配置层失败
    #[error("读取配置失败: {0}")]
    Load(#[from] RepositoryError),

    /// 任务不存在
    #[error("任务不存在: {0}")]
    TaskNotFound(Uuid),
}

/// 单次步骤执行的有效配置
///
/// 三层合并的结果：环境默认值 < 设置表 < 任务级覆盖。
/// 解析是确定性的、无副作用的，每次步骤执行调用一次即可
/// 捕获存储侧的配置变更而无需重启
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub storage: StorageSettings,
    pub asr: AsrSettings,
    pub tts: TtsSettings,
    pub translate: TranslateSettings,
}

impl EffectiveConfig {
    /// 校验 ASR 所需凭证是否齐备
    pub fn validate_for_asr(&self) -> Result<(), ConfigError> {
        if self.asr.app_key.is_empty() {
            return Err(ConfigError::MissingField("asr.app_key"));
        }
        if self.asr.access_key.is_empty() {
            return Err(ConfigError::MissingField("asr.access_key"));
        }
        if self.asr.resource_id.is_empty() {
            return Err(ConfigError::MissingField("asr.resource_id"));
        }
        Ok(())
    }

    /// 校验 TTS 所需配置是否齐备
    pub fn validate_for_tts(&self) -> Result<(), ConfigError> {
        if self.tts.service_url.is_empty() {
            return Err(ConfigError::MissingField("tts.service_url"));
        }
        Ok(())
    }

    /// 校验翻译所需凭证是否齐备
    pub fn validate_for_translate(&self) -> Result<(), ConfigError> {
        if self.translate.glm_api_key.is_empty() {
            return Err(ConfigError::MissingField("translate.glm_api_key"));
        }
        if self.translate.glm_api_url.is_empty() {
            return Err(ConfigError::MissingField("translate.glm_api_url"));
        }
        Ok(())
    }
}

/// 有效配置解析器
///
/// 合并优先级：任务级覆盖 > 设置表 > 环境变量；
/// 后层的值仅在非空时生效，清空任务覆盖即回落到全局值
pub struct ConfigResolver {
    base: Settings,
    settings_repo: Arc<dyn SettingRepository>,
    task_repo: Arc<dyn TaskRepository>,
}

impl ConfigResolver {
    /// 创建新的配置解析器
    ///
    /// # 参数
    ///
    /// * `base` - 进程启动时加载的环境配置
    /// * `settings_repo` - 设置仓库
    /// * `task_repo` - 任务仓库
    pub fn new(
        base: Settings,
        settings_repo: Arc<dyn SettingRepository>,
        task_repo: Arc<dyn TaskRepository>,
    ) -> Self {
        Self {
            base,
            settings_repo,
            task_repo,
        }
    }

    /// 解析某个任务的有效配置
    ///
    /// # 参数
    ///
    /// * `task_id` - 任务ID；为 None 时仅合并环境与设置表（进程级配置）
    ///
    /// # 返回值
    ///
    /// * `Ok(EffectiveConfig)` - 合并后的有效配置
    /// * `Err(ConfigError)` - 读取配置层失败
    pub async fn resolve(&self, task_id: Option<Uuid>) -> Result<EffectiveConfig, ConfigError> {
        let mut effective = EffectiveConfig {
            storage: self.base.storage.clone(),
            asr: self.base.asr.clone(),
            tts: self.base.tts.clone(),
            translate: self.base.translate.clone(),
        };

        let rows = self.settings_repo.load_all().await?;
        for row in &rows {
            apply_setting(&mut effective, &row.category, &row.key, &row.value);
        }

        if let Some(task_id) = task_id {
            let task = self
                .task_repo
                .find_by_id(task_id)
                .await?
                .ok_or(ConfigError::TaskNotFound(task_id))?;
            apply_task_overrides(&mut effective, &task.overrides);
        }

        Ok(effective)
    }
}

fn set_if_not_empty(target: &mut String, value: &str) {
    if !value.is_empty() {
        *target = value.to_string();
    }
}

/// 将单条设置行合并进有效配置
///
/// 未识别的 `(category, key)` 被忽略
fn apply_setting(effective: &mut EffectiveConfig, category: &str, key: &str, value: &str) {
    match category {
        "storage" => {
            let oss: &mut OssSettings = &mut effective.storage.oss;
            match key {
                "backend" => set_if_not_empty(&mut effective.storage.backend, value),
                "oss_endpoint" => set_if_not_empty(&mut oss.endpoint, value),
                "oss_bucket" => set_if_not_empty(&mut oss.bucket, value),
                "oss_access_key_id" => set_if_not_empty(&mut oss.access_key_id, value),
                "oss_access_key_secret" => set_if_not_empty(&mut oss.access_key_secret, value),
                "oss_public_domain" => set_if_not_empty(&mut oss.public_domain, value),
                "oss_prefix" => set_if_not_empty(&mut oss.prefix, value),
                "oss_use_ssl" => oss.use_ssl = value == "true",
                _ => {}
            }
        }
        "asr" => match key {
            "app_key" => set_if_not_empty(&mut effective.asr.app_key, value),
            "access_key" => set_if_not_empty(&mut effective.asr.access_key, value),
            "resource_id" => set_if_not_empty(&mut effective.asr.resource_id, value),
            "enable_speaker_info" => effective.asr.enable_speaker_info = value == "true",
            "enable_emotion" => effective.asr.enable_emotion = value == "true",
            "enable_gender" => effective.asr.enable_gender = value == "true",
            "enable_punc" => effective.asr.enable_punc = value == "true",
            "enable_itn" => effective.asr.enable_itn = value == "true",
            _ => {}
        },
        "tts" => match key {
            "service_url" => set_if_not_empty(&mut effective.tts.service_url, value),
            "api_key" => set_if_not_empty(&mut effective.tts.api_key, value),
            "backend" => set_if_not_empty(&mut effective.tts.backend, value),
            _ => {}
        },
        "translate" => match key {
            "glm_api_key" => set_if_not_empty(&mut effective.translate.glm_api_key, value),
            "glm_api_url" => set_if_not_empty(&mut effective.translate.glm_api_url, value),
            "glm_model" => set_if_not_empty(&mut effective.translate.glm_model, value),
            _ => {}
        },
        _ => {}
    }
}

/// 将任务级覆盖合并进有效配置（非空才生效）
fn apply_task_overrides(effective: &mut EffectiveConfig, overrides: &TaskOverrides) {
    let fields = [
        (&overrides.asr_app_key, &mut effective.asr.app_key),
        (&overrides.asr_access_key, &mut effective.asr.access_key),
        (&overrides.asr_resource_id, &mut effective.asr.resource_id),
        (
            &overrides.glm_api_key,
            &mut effective.translate.glm_api_key,
        ),
        (
            &overrides.glm_api_url,
            &mut effective.translate.glm_api_url,
        ),
        (&overrides.glm_model, &mut effective.translate.glm_model),
        (&overrides.tts_backend, &mut effective.tts.backend),
        (
            &overrides.tts_service_url,
            &mut effective.tts.service_url,
        ),
        (&overrides.tts_api_key, &mut effective.tts.api_key),
    ];
    for (source, target) in fields {
        if let Some(value) = source.as_deref() {
            set_if_not_empty(target, value);
        }
    }
}
