// Copyright 2025 dubrs contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 音频分段实体
///
/// ASR 产出的带时间戳转写单元，也是翻译与合成的基本单位。
/// 同一任务内 idx 稠密无间隙，且 `end_ms > start_ms`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// 分段唯一标识符
    pub id: Uuid,
    /// 所属任务ID
    pub task_id: Uuid,
    /// 任务内序号（从 0 开始，稠密）
    pub idx: i32,
    /// 起始时间（毫秒）
    pub start_ms: i32,
    /// 结束时间（毫秒）
    pub end_ms: i32,
    /// 时长（毫秒），恒等于 end_ms - start_ms
    pub duration_ms: i32,
    /// 源语言文本
    pub src_text: String,
    /// 翻译文本
    pub mt_text: Option<String>,
    /// 合成参数快照
    pub tts_params: Option<serde_json::Value>,
    /// 合成音频对象键
    pub tts_audio_key: Option<String>,
    /// 说话人标识
    pub speaker_id: Option<String>,
    /// 情绪标签
    pub emotion: Option<String>,
    /// 性别标签
    pub gender: Option<String>,
}

impl Segment {
    /// 该分段是否已有合成音频
    pub fn has_tts_audio(&self) -> bool {
        self.tts_audio_key
            .as_deref()
            .is_some_and(|k| !k.is_empty())
    }

    /// 合成输入文本：优先使用译文，其次原文
    pub fn synthesis_text(&self) -> &str {
        match self.mt_text.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => &self.src_text,
        }
    }
}

/// ASR 识别结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrResult {
    pub segments: Vec<AsrSegment>,
    pub language: String,
    pub duration_ms: i32,
}

/// ASR 单个分段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrSegment {
    pub idx: i32,
    pub start_ms: i32,
    pub end_ms: i32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>, // 说话人标识
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>, // 情绪: angry, happy, neutral, sad, surprise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>, // 性别: male, female
}
