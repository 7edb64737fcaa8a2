// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::settings::TtsSettings;

/// TTS 错误类型
#[derive(Error, Debug)]
pub enum TtsError {
    /// 缺少配置
    #[error("TTS 配置缺失: {0}")]
    MissingConfig(&'static str),

    /// HTTP请求失败
    #[error("TTS 请求失败: {0}")]
    Request(String),

    /// 服务端返回非 200
    #[error("TTS 服务返回状态 {status}: {body}")]
    Status { status: u16, body: String },

    /// 响应解析失败
    #[error("TTS 响应解析失败: {0}")]
    Parse(String),

    /// 响应不含音频
    #[error("TTS 响应不含音频数据")]
    EmptyAudio,
}

/// 语音合成请求
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub speaker_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_audio_url: Option<String>,
    pub target_duration_ms: i32,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prosody_control: Option<serde_json::Value>,
    pub output_format: String,
    pub sample_rate: i32,
}

/// 语音合成器特质
///
/// 契约：给定文本与音色参考，返回完整的 WAV 字节
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + std::fmt::Debug {
    /// 合成一段语音
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, TtsError>;
}

/// 根据配置选择合成器后端
///
/// backend 为空时按 URL 特征自动探测 Gradio；其余默认 vllm
///
/// # 参数
///
/// * `settings` - 合并后的 TTS 配置
///
/// # 返回值
///
/// * `Ok(Arc<dyn SpeechSynthesizer>)` - 合成器实例
/// * `Err(TtsError)` - 服务 URL 缺失
pub fn create_synthesizer(
    settings: &TtsSettings,
) -> Result<Arc<dyn SpeechSynthesizer>, TtsError> {
    if settings.service_url.is_empty() {
        return Err(TtsError::MissingConfig("tts.service_url"));
    }

    match settings.backend.as_str() {
        "legacy" | "local" => {
            info!(url = %settings.service_url, "Using legacy TTS client");
            Ok(Arc::new(LegacyClient::new(settings.clone())))
        }
        "gradio" => {
            info!(url = %settings.service_url, "Using Gradio TTS client");
            Ok(Arc::new(GradioClient::new(settings.clone())))
        }
        "" if is_gradio_service(&settings.service_url) => {
            info!(url = %settings.service_url, "Detected Gradio TTS service");
            Ok(Arc::new(GradioClient::new(settings.clone())))
        }
        backend => {
            info!(url = %settings.service_url, backend, "Using vLLM TTS client");
            Ok(Arc::new(VllmClient::new(settings.clone())))
        }
    }
}

/// 按 URL 特征判断是否为 Gradio 服务
///
/// 仅在 backend 未显式配置时用于自动探测
fn is_gradio_service(url: &str) -> bool {
    const INDICATORS: [&str; 4] = [
        ".gradio.live", // Gradio sharing URLs
        ".gradio.app",  // Gradio official app domain
        "/gradio/",     // URL path contains gradio
        ":7860",        // Default Gradio port
    ];
    INDICATORS.iter().any(|needle| url.contains(needle))
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()
        .unwrap_or_default()
}

async fn read_error_body(resp: reqwest::Response) -> TtsError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    TtsError::Status { status, body }
}

/// index-tts-vllm 后端客户端
///
/// 原生 /tts 接口：携带音色参考 URL，返回 base64 音频或音频链接
#[derive(Debug)]
pub struct VllmClient {
    settings: TtsSettings,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct VllmRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    spk_audio_path: Option<&'a str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    speaker_id: &'a str,
    sample_rate: i32,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct VllmResponse {
    #[serde(default)]
    audio: Option<String>, // Base64 encoded audio
    #[serde(default)]
    audio_url: Option<String>,
}

impl VllmClient {
    pub fn new(settings: TtsSettings) -> Self {
        Self {
            settings,
            client: http_client(),
        }
    }

    async fn download_audio(&self, audio_url: &str) -> Result<Vec<u8>, TtsError> {
        let url = if audio_url.starts_with('/') {
            format!(
                "{}{}",
                self.settings.service_url.trim_end_matches('/'),
                audio_url
            )
        } else {
            audio_url.to_string()
        };

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| TtsError::Request(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(read_error_body(resp).await);
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| TtsError::Request(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for VllmClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, TtsError> {
        let url = format!("{}/tts", self.settings.service_url.trim_end_matches('/'));
        let body = VllmRequest {
            text: &request.text,
            spk_audio_path: request.prompt_audio_url.as_deref(),
            speaker_id: &request.speaker_id,
            sample_rate: request.sample_rate,
            response_format: &request.output_format,
        };

        let mut builder = self.client.post(&url).json(&body);
        if !self.settings.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.settings.api_key));
        }

        let resp = builder
            .send()
            .await
            .map_err(|err| TtsError::Request(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(read_error_body(resp).await);
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        // 服务可能直接回音频字节，也可能回 JSON
        if content_type.starts_with("audio/") {
            let bytes = resp
                .bytes()
                .await
                .map_err(|err| TtsError::Request(err.to_string()))?;
            return Ok(bytes.to_vec());
        }

        let parsed: VllmResponse = resp
            .json()
            .await
            .map_err(|err| TtsError::Parse(err.to_string()))?;

        if let Some(encoded) = parsed.audio.filter(|a| !a.is_empty()) {
            return BASE64
                .decode(encoded.as_bytes())
                .map_err(|err| TtsError::Parse(format!("bad base64 audio: {err}")));
        }
        if let Some(audio_url) = parsed.audio_url.filter(|u| !u.is_empty()) {
            return self.download_audio(&audio_url).await;
        }
        Err(TtsError::EmptyAudio)
    }
}

/// Gradio 后端客户端
///
/// 两段式调用：POST /call/<api> 取 event_id，再 GET 事件流取文件地址
#[derive(Debug)]
pub struct GradioClient {
    settings: TtsSettings,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct GradioCallResponse {
    event_id: String,
}

impl GradioClient {
    pub fn new(settings: TtsSettings) -> Self {
        Self {
            settings,
            client: http_client(),
        }
    }

    fn base_url(&self) -> &str {
        self.settings.service_url.trim_end_matches('/')
    }

    /// 从事件流文本中提取生成文件的 URL
    fn extract_file_url(&self, stream_body: &str) -> Option<String> {
        for line in stream_body.lines() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let parsed: serde_json::Value = serde_json::from_str(data.trim()).ok()?;
            let entry = parsed.as_array()?.first()?;
            if let Some(url) = entry.get("url").and_then(|u| u.as_str()) {
                return Some(url.to_string());
            }
            if let Some(path) = entry.get("path").and_then(|p| p.as_str()) {
                return Some(format!("{}/gradio_api/file={}", self.base_url(), path));
            }
        }
        None
    }
}

#[async_trait]
impl SpeechSynthesizer for GradioClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, TtsError> {
        let call_url = format!("{}/gradio_api/call/gen_single", self.base_url());
        let body = serde_json::json!({
            "data": [
                request.prompt_audio_url,
                request.text,
            ],
        });

        let resp = self
            .client
            .post(&call_url)
            .json(&body)
            .send()
            .await
            .map_err(|err| TtsError::Request(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(read_error_body(resp).await);
        }
        let call: GradioCallResponse = resp
            .json()
            .await
            .map_err(|err| TtsError::Parse(err.to_string()))?;

        let stream_url = format!(
            "{}/gradio_api/call/gen_single/{}",
            self.base_url(),
            call.event_id
        );
        let resp = self
            .client
            .get(&stream_url)
            .send()
            .await
            .map_err(|err| TtsError::Request(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(read_error_body(resp).await);
        }
        let stream_body = resp
            .text()
            .await
            .map_err(|err| TtsError::Request(err.to_string()))?;

        let file_url = self
            .extract_file_url(&stream_body)
            .ok_or(TtsError::EmptyAudio)?;

        let resp = self
            .client
            .get(&file_url)
            .send()
            .await
            .map_err(|err| TtsError::Request(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(read_error_body(resp).await);
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| TtsError::Request(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// 旧版 tts_service 客户端（向后兼容）
#[derive(Debug)]
pub struct LegacyClient {
    settings: TtsSettings,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct LegacyResponse {
    #[serde(default)]
    audio_url: Option<String>,
}

impl LegacyClient {
    pub fn new(settings: TtsSettings) -> Self {
        Self {
            settings,
            client: http_client(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for LegacyClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, TtsError> {
        let url = format!(
            "{}/synthesize",
            self.settings.service_url.trim_end_matches('/')
        );

        let mut last_err = None;
        for attempt in 0..3 {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
            }

            let result = self
                .client
                .post(&url)
                .header("Accept", "application/json")
                .json(request)
                .send()
                .await;

            let resp = match result {
                Ok(resp) if resp.status().is_success() => resp,
                Ok(resp) => {
                    last_err = Some(read_error_body(resp).await);
                    continue;
                }
                Err(err) => {
                    last_err = Some(TtsError::Request(err.to_string()));
                    continue;
                }
            };

            let parsed: LegacyResponse = resp
                .json()
                .await
                .map_err(|err| TtsError::Parse(err.to_string()))?;

            let Some(audio_url) = parsed.audio_url.filter(|u| !u.is_empty()) else {
                return Err(TtsError::EmptyAudio);
            };

            let audio_url = if audio_url.starts_with('/') {
                format!(
                    "{}{}",
                    self.settings.service_url.trim_end_matches('/'),
                    audio_url
                )
            } else {
                audio_url
            };

            let audio_resp = self
                .client
                .get(&audio_url)
                .send()
                .await
                .map_err(|err| TtsError::Request(err.to_string()))?;
            if !audio_resp.status().is_success() {
                return Err(read_error_body(audio_resp).await);
            }
            let bytes = audio_resp
                .bytes()
                .await
                .map_err(|err| TtsError::Request(err.to_string()))?;
            return Ok(bytes.to_vec());
        }

        Err(last_err.unwrap_or(TtsError::EmptyAudio))
    }
}
