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

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 系统设置实体
///
/// `(category, key)` 唯一；value 为不透明字符串，由配置解析器
/// 在合并时按字段类型解释
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    /// 设置唯一标识符
    pub id: Uuid,
    /// 分类（storage / asr / tts / translate）
    pub category: String,
    /// 键名
    pub key: String,
    /// 值
    pub value: String,
    /// 是否敏感（读取展示时脱敏）
    pub is_sensitive: bool,
    /// 更新时间
    pub updated_at: DateTime<FixedOffset>,
}

impl Setting {
    /// 返回展示用的值，敏感项脱敏
    pub fn display_value(&self) -> String {
        if self.is_sensitive && !self.value.is_empty() {
            "******".to_string()
        } else {
            self.value.clone()
        }
    }
}
