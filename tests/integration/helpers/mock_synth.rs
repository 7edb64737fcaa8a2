// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use dubrs::clients::tts::{SpeechSynthesizer, SynthesisRequest, TtsError};

/// 脚本化语音合成器
///
/// 记录全部请求；文本命中失败名单的请求始终失败，其余返回固定字节
#[derive(Default, Debug)]
pub struct ScriptedSynthesizer {
    failing_texts: HashSet<String>,
    requests: Mutex<Vec<SynthesisRequest>>,
}

impl ScriptedSynthesizer {
    /// 创建总是成功的合成器
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定永远合成失败的文本
    pub fn failing_on(texts: &[&str]) -> Self {
        Self {
            failing_texts: texts.iter().map(|t| t.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的全部请求
    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// 某文本被请求的次数
    pub fn attempts_for(&self, text: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|req| req.text == text)
            .count()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, TtsError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing_texts.contains(&request.text) {
            return Err(TtsError::Status {
                status: 500,
                body: "synthesis exploded".to_string(),
            });
        }
        Ok(format!("WAV:{}", request.text).into_bytes())
    }
}
