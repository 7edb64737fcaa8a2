// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::settings::TranslateSettings;
use crate::utils::rate_limiter::TokenBucket;

/// 翻译错误类型
#[derive(Error, Debug)]
pub enum TranslateError {
    /// 缺少凭证
    #[error("翻译配置缺失: {0}")]
    MissingConfig(&'static str),

    /// HTTP请求失败
    #[error("翻译请求失败: {0}")]
    Request(String),

    /// 服务端返回非 200
    #[error("翻译服务返回状态 {status}: {body}")]
    Status { status: u16, body: String },

    /// 响应内容无法解析
    #[error("翻译响应解析失败: {0}")]
    Parse(String),

    /// 返回数量与输入不一致
    #[error("翻译数量不匹配: 期望 {expected}，实际 {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// 不支持的提供商
    #[error("不支持的翻译提供商: {0}")]
    UnsupportedProvider(String),
}

/// 翻译器特质
///
/// 纯函数式契约：`(texts, src, tgt) → translations`，输出与输入等长同序
#[async_trait]
pub trait Translator: Send + Sync + std::fmt::Debug {
    /// 批量翻译文本
    async fn translate(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>, TranslateError>;
}

/// 根据提供商创建翻译器
///
/// 提供商为空时默认使用 GLM
///
/// # 参数
///
/// * `provider` - 提供商标识（glm 或空）
/// * `settings` - 合并后的翻译配置
///
/// # 返回值
///
/// * `Ok(Arc<dyn Translator>)` - 翻译器实例
/// * `Err(TranslateError)` - 凭证缺失或提供商不支持
pub fn create_translator(
    provider: &str,
    settings: &TranslateSettings,
) -> Result<Arc<dyn Translator>, TranslateError> {
    match provider {
        "glm" | "" => {
            if settings.glm_api_key.is_empty() {
                return Err(TranslateError::MissingConfig("translate.glm_api_key"));
            }
            info!(
                model = %settings.glm_model,
                api_url = %settings.glm_api_url,
                "Creating GLM translator"
            );
            Ok(Arc::new(GlmClient::new(settings.clone())))
        }
        other => Err(TranslateError::UnsupportedProvider(other.to_string())),
    }
}

/// GLM（智谱）翻译客户端
///
/// 通过 chat-completions 接口批量翻译；提示词强制模型输出与输入
/// 等长同序的 JSON 字符串数组
#[derive(Debug)]
pub struct GlmClient {
    settings: TranslateSettings,
    client: reqwest::Client,
    limiter: TokenBucket,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: serde_json::Value,
}

impl GlmClient {
    /// 创建新的 GLM 翻译客户端
    pub fn new(settings: TranslateSettings) -> Self {
        let limiter = TokenBucket::new(settings.glm_rps);
        Self {
            settings,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            limiter,
        }
    }

    async fn call_api(&self, body: &serde_json::Value) -> Result<String, TranslateError> {
        let max_retries = 3;
        let mut last_err = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
            }
            self.limiter.acquire().await;

            let result = self
                .client
                .post(&self.settings.glm_api_url)
                .header("Content-Type", "application/json")
                .header(
                    "Authorization",
                    format!("Bearer {}", self.settings.glm_api_key),
                )
                .json(body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: ChatResponse = resp
                        .json()
                        .await
                        .map_err(|err| TranslateError::Parse(err.to_string()))?;
                    let choice = parsed
                        .choices
                        .into_iter()
                        .next()
                        .ok_or_else(|| TranslateError::Parse("no choices".to_string()))?;
                    return decode_content_text(&choice.message.content);
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    last_err = Some(TranslateError::Status { status, body });
                }
                Err(err) => {
                    last_err = Some(TranslateError::Request(err.to_string()));
                }
            }
            warn!(attempt = attempt + 1, "GLM request failed, retrying");
        }

        Err(last_err.unwrap_or_else(|| TranslateError::Request("unreachable".to_string())))
    }
}

#[async_trait]
impl Translator for GlmClient {
    async fn translate(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>, TranslateError> {
        if self.settings.glm_api_key.is_empty() {
            return Err(TranslateError::MissingConfig("translate.glm_api_key"));
        }
        if self.settings.glm_api_url.is_empty() {
            return Err(TranslateError::MissingConfig("translate.glm_api_url"));
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // 提示词保持最小化以降低 token 消耗与失败率
        let input_json = serde_json::to_string(texts)
            .map_err(|err| TranslateError::Parse(err.to_string()))?;
        let system_prompt = "你是一个翻译引擎。只输出 JSON 数组（string[]），不要输出任何解释或额外字符。";
        let user_prompt = format!(
            "把下面 JSON 数组中的每个元素从 {source_lang} 翻译成 {target_lang}，保持顺序与数量一致，只输出 JSON 数组：\n{input_json}"
        );

        let body = serde_json::json!({
            "model": self.settings.glm_model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": 0.2,
        });

        let content = self.call_api(&body).await?;
        parse_translations(&content, texts.len())
    }
}

/// 解码 chat 响应的 content 字段
///
/// 兼容 string 与 `{type, text}` 两种形式
fn decode_content_text(raw: &serde_json::Value) -> Result<String, TranslateError> {
    if let Some(text) = raw.as_str() {
        return Ok(text.to_string());
    }
    if let Some(text) = raw.get("text").and_then(|t| t.as_str()) {
        if !text.is_empty() {
            return Ok(text.to_string());
        }
    }
    Err(TranslateError::Parse(
        "unsupported content format".to_string(),
    ))
}

/// 从模型输出解析译文数组并校验数量
pub(crate) fn parse_translations(
    content: &str,
    expected: usize,
) -> Result<Vec<String>, TranslateError> {
    let content = content.trim();

    let parsed: Vec<String> = match serde_json::from_str(content) {
        Ok(out) => out,
        Err(_) => {
            // 模型偶尔会用 ``` 围栏包裹 JSON
            let stripped = strip_code_fences(content);
            if stripped != content {
                serde_json::from_str(&stripped).map_err(|_| {
                    TranslateError::Parse(format!(
                        "expected JSON string array, got: {}",
                        truncate(content, 300)
                    ))
                })?
            } else {
                return Err(TranslateError::Parse(format!(
                    "expected JSON string array, got: {}",
                    truncate(content, 300)
                )));
            }
        }
    };

    if parsed.len() != expected {
        return Err(TranslateError::CountMismatch {
            expected,
            actual: parsed.len(),
        });
    }
    Ok(parsed)
}

/// 去除模型输出中的 ``` 代码围栏
pub(crate) fn strip_code_fences(s: &str) -> String {
    let mut trimmed = s.trim();
    if trimmed.starts_with("```") {
        trimmed = trimmed.trim_start_matches("```").trim_start();
        // 可能的语言标记行
        if let Some(pos) = trimmed.find('\n') {
            let first_line = trimmed[..pos].trim();
            if first_line.is_empty() || first_line.len() <= 10 {
                trimmed = &trimmed[pos + 1..];
            }
        }
        if let Some(pos) = trimmed.rfind("```") {
            trimmed = &trimmed[..pos];
        }
    }
    trimmed.trim().to_string()
}

fn truncate(s: &str, n: usize) -> String {
    if s.len() <= n {
        s.to_string()
    } else {
        let mut end = n;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// 按最大长度拆分文本，尽量在句子边界处断开
pub fn split_text(text: &str, max_length: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_length {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + max_length).min(chars.len());
        // try to split at sentence boundary
        if end < chars.len() {
            for i in (start + 1..end).rev() {
                if matches!(chars[i], '。' | '.' | '!' | '?' | '！' | '？') {
                    end = i + 1;
                    break;
                }
            }
        }
        chunks.push(chars[start..end].iter().collect());
        start = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_translations_plain_array() {
        let out = parse_translations(r#"["Hello", "World"]"#, 2).unwrap();
        assert_eq!(out, vec!["Hello", "World"]);
    }

    #[test]
    fn test_parse_translations_fenced() {
        let content = "```json\n[\"Hello\"]\n```";
        let out = parse_translations(content, 1).unwrap();
        assert_eq!(out, vec!["Hello"]);
    }

    #[test]
    fn test_parse_translations_count_mismatch() {
        let err = parse_translations(r#"["Hello"]"#, 2).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_parse_translations_garbage() {
        let err = parse_translations("对不起，我无法翻译", 1).unwrap_err();
        assert!(matches!(err, TranslateError::Parse(_)));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("[1]"), "[1]");
    }

    #[test]
    fn test_decode_content_string_and_object() {
        assert_eq!(
            decode_content_text(&serde_json::json!("hello")).unwrap(),
            "hello"
        );
        assert_eq!(
            decode_content_text(&serde_json::json!({"type": "text", "text": "hi"})).unwrap(),
            "hi"
        );
        assert!(decode_content_text(&serde_json::json!(42)).is_err());
    }

    #[test]
    fn test_split_text_short_passthrough() {
        assert_eq!(split_text("hello", 10), vec!["hello"]);
    }

    #[test]
    fn test_split_text_sentence_boundary() {
        let text = "第一句话。第二句话。第三句话。";
        let chunks = split_text(text, 8);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with('。'));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_text_no_boundary() {
        let text = "a".repeat(25);
        let chunks = split_text(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_create_translator_requires_key() {
        let settings = TranslateSettings {
            glm_api_key: String::new(),
            glm_api_url: "https://example".to_string(),
            glm_model: "glm-4-flash".to_string(),
            glm_rps: 5.0,
        };
        assert!(create_translator("glm", &settings).is_err());
        assert!(matches!(
            create_translator("baidu", &settings).unwrap_err(),
            TranslateError::UnsupportedProvider(_)
        ));
    }
}
