// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::settings::AsrSettings;
use crate::domain::models::segment::{AsrResult, AsrSegment};

const SUBMIT_URL: &str = "https://openspeech.bytedance.com/api/v3/auc/bigmodel/submit";
const QUERY_URL: &str = "https://openspeech.bytedance.com/api/v3/auc/bigmodel/query";

// Status codes
const STATUS_SUCCESS: i64 = 20000000;
const STATUS_PROCESSING: i64 = 20000001;
const STATUS_QUEUED: i64 = 20000002;
const STATUS_SILENCE: i64 = 20000003;

/// 无说话人信息时的默认说话人，触发后续的音色克隆
const DEFAULT_SPEAKER_ID: &str = "speaker_1";

/// ASR 错误类型
#[derive(Error, Debug)]
pub enum AsrError {
    /// HTTP请求失败
    #[error("ASR 请求失败: {0}")]
    Request(String),

    /// 提交任务被拒绝
    #[error("ASR 任务提交失败，状态 {status}: {message}")]
    SubmitRejected { status: String, message: String },

    /// 服务端返回失败状态码
    #[error("ASR 识别失败，状态码 {0}")]
    Failed(i64),

    /// 轮询超时
    #[error("ASR 轮询超时 ({0:?})")]
    PollTimeout(Duration),

    /// 响应解析失败
    #[error("ASR 响应解析失败: {0}")]
    Parse(String),
}

/// ASR 客户端
///
/// 提交-轮询式批量识别：提交音频 URL 后按固定间隔查询，
/// 直至成功、失败或超出轮询时限
pub struct AsrClient {
    settings: AsrSettings,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    user: SubmitUser,
    audio: SubmitAudio<'a>,
    request: SubmitOptions,
}

#[derive(Serialize)]
struct SubmitUser {
    uid: String,
}

#[derive(Serialize)]
struct SubmitAudio<'a> {
    format: &'static str,
    url: &'a str,
    rate: i32,
    channel: i32,
}

#[derive(Serialize)]
struct SubmitOptions {
    model_name: &'static str,
    model_version: &'static str,
    enable_itn: bool,
    enable_punc: bool,
    enable_speaker_info: bool,
    enable_emotion_detection: bool,
    enable_gender_detection: bool,
    show_utterances: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    audio_info: AudioInfo,
    #[serde(default)]
    result: QueryResult,
}

#[derive(Deserialize, Default)]
struct AudioInfo {
    #[serde(default)]
    duration: i32,
}

#[derive(Deserialize, Default)]
struct QueryResult {
    #[serde(default)]
    utterances: Vec<Utterance>,
}

#[derive(Deserialize)]
struct Utterance {
    #[serde(default)]
    text: String,
    #[serde(default)]
    start_time: i32,
    #[serde(default)]
    end_time: i32,
    #[serde(default)]
    additions: Option<Additions>,
}

#[derive(Deserialize)]
struct Additions {
    #[serde(default)]
    speaker_id: Option<String>,
    #[serde(default)]
    emotion: Option<String>,
    #[serde(default)]
    gender: Option<String>,
}

impl AsrClient {
    /// 创建新的 ASR 客户端
    ///
    /// # 参数
    ///
    /// * `settings` - 合并后的 ASR 配置（含特性开关与轮询参数）
    pub fn new(settings: AsrSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30)) // Per-request timeout
                .build()
                .unwrap_or_default(),
        }
    }

    /// 识别音频
    ///
    /// # 参数
    ///
    /// * `audio_url` - 可公网访问的音频预签名 URL
    /// * `language` - 源语言标签
    ///
    /// # 返回值
    ///
    /// * `Ok(AsrResult)` - 有序分段列表、语言与总时长
    /// * `Err(AsrError)` - 提交、轮询或解析失败
    pub async fn recognize(
        &self,
        audio_url: &str,
        language: &str,
    ) -> Result<AsrResult, AsrError> {
        let request_id = Uuid::new_v4().to_string();

        info!(
            request_id = %request_id,
            language,
            "Submitting ASR task"
        );

        self.submit_task(&request_id, audio_url).await?;
        self.poll_result(&request_id, language).await
    }

    async fn submit_task(&self, request_id: &str, audio_url: &str) -> Result<(), AsrError> {
        let body = SubmitRequest {
            user: SubmitUser {
                uid: request_id.to_string(),
            },
            audio: SubmitAudio {
                format: "wav",
                url: audio_url,
                rate: 16000,
                channel: 1,
            },
            request: SubmitOptions {
                model_name: "bigmodel",
                model_version: "400",
                enable_itn: self.settings.enable_itn,
                enable_punc: self.settings.enable_punc,
                enable_speaker_info: self.settings.enable_speaker_info,
                enable_emotion_detection: self.settings.enable_emotion,
                enable_gender_detection: self.settings.enable_gender,
                show_utterances: true,
            },
        };

        let resp = self
            .request(SUBMIT_URL, request_id)
            .json(&body)
            .send()
            .await
            .map_err(|err| AsrError::Request(err.to_string()))?;

        let status = header_value(&resp, "X-Api-Status-Code");
        if status != STATUS_SUCCESS.to_string() {
            let message = header_value(&resp, "X-Api-Message");
            return Err(AsrError::SubmitRejected { status, message });
        }

        info!(request_id, "ASR task submitted");
        Ok(())
    }

    async fn poll_result(&self, request_id: &str, language: &str) -> Result<AsrResult, AsrError> {
        let interval = Duration::from_secs(self.settings.poll_interval_seconds.max(1));
        let timeout = if self.settings.poll_timeout_seconds > 0 {
            Duration::from_secs(self.settings.poll_timeout_seconds)
        } else {
            Duration::from_secs(900)
        };

        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(AsrError::PollTimeout(timeout));
            }
            tokio::time::sleep(interval).await;

            let (result, status) = self.query_task(request_id, language).await?;
            match status {
                STATUS_SUCCESS => {
                    let result = result.ok_or_else(|| {
                        AsrError::Parse("success status without body".to_string())
                    })?;
                    info!(
                        request_id,
                        segment_count = result.segments.len(),
                        "ASR task completed"
                    );
                    return Ok(result);
                }
                STATUS_PROCESSING | STATUS_QUEUED => {
                    debug!(request_id, status, "ASR task still processing");
                }
                STATUS_SILENCE => {
                    warn!(request_id, "ASR detected silence audio");
                    return Ok(AsrResult {
                        segments: Vec::new(),
                        language: language.to_string(),
                        duration_ms: 0,
                    });
                }
                other => return Err(AsrError::Failed(other)),
            }
        }
    }

    async fn query_task(
        &self,
        request_id: &str,
        language: &str,
    ) -> Result<(Option<AsrResult>, i64), AsrError> {
        let resp = self
            .request(QUERY_URL, request_id)
            .body("{}")
            .send()
            .await
            .map_err(|err| AsrError::Request(err.to_string()))?;

        let status_str = header_value(&resp, "X-Api-Status-Code");
        let status: i64 = status_str
            .parse()
            .map_err(|_| AsrError::Parse(format!("bad status code header: {status_str}")))?;

        if matches!(status, STATUS_PROCESSING | STATUS_QUEUED | STATUS_SILENCE) {
            return Ok((None, status));
        }
        if status != STATUS_SUCCESS {
            return Ok((None, status));
        }

        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|err| AsrError::Parse(err.to_string()))?;

        Ok((Some(convert_result(body, language)), status))
    }

    fn request(&self, url: &str, request_id: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Api-App-Key", &self.settings.app_key)
            .header("X-Api-Access-Key", &self.settings.access_key)
            .header("X-Api-Resource-Id", &self.settings.resource_id)
            .header("X-Api-Request-Id", request_id)
            .header("X-Api-Sequence", "-1")
    }
}

fn header_value(resp: &reqwest::Response, name: &str) -> String {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// 将服务端响应转换为内部 ASR 结果
///
/// utterance 缺少说话人信息时补默认说话人，保证音色克隆可用
fn convert_result(resp: QueryResponse, language: &str) -> AsrResult {
    let segments = resp
        .result
        .utterances
        .into_iter()
        .enumerate()
        .map(|(idx, utt)| {
            let (speaker_id, emotion, gender) = match utt.additions {
                Some(add) => (add.speaker_id, add.emotion, add.gender),
                None => (None, None, None),
            };
            AsrSegment {
                idx: idx as i32,
                start_ms: utt.start_time,
                end_ms: utt.end_time,
                text: utt.text,
                speaker_id: Some(
                    speaker_id
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| DEFAULT_SPEAKER_ID.to_string()),
                ),
                emotion,
                gender,
            }
        })
        .collect();

    AsrResult {
        segments,
        language: language.to_string(),
        duration_ms: resp.audio_info.duration,
    }
}
