// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::step::StepKind;

/// 消息解码错误
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("消息格式错误: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("无效的任务ID: {0}")]
    InvalidTaskId(String),
}

/// 任务消息信封
///
/// 所有步骤共享的外层结构；payload 因步骤而异
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: String,
    pub step: String,
    pub attempt: i32,
    pub trace_id: String,
    pub created_at: String,
    pub payload: serde_json::Value,
}

impl TaskMessage {
    /// 创建首次投递的消息（attempt=1，新 trace_id）
    pub fn new(task_id: Uuid, step: StepKind, payload: serde_json::Value) -> Self {
        Self {
            task_id: task_id.to_string(),
            step: step.as_str().to_string(),
            attempt: 1,
            trace_id: Uuid::new_v4().to_string(),
            created_at: Utc::now().to_rfc3339(),
            payload,
        }
    }

    /// 从消息体解码信封并解析任务ID
    ///
    /// # 返回值
    ///
    /// * `Ok((TaskMessage, Uuid))` - 解码成功
    /// * `Err(MessageError)` - 消息格式错误或任务ID无效
    pub fn decode(body: &[u8]) -> Result<(TaskMessage, Uuid), MessageError> {
        let msg: TaskMessage = serde_json::from_slice(body)?;
        let task_id = Uuid::parse_str(&msg.task_id)
            .map_err(|_| MessageError::InvalidTaskId(msg.task_id.clone()))?;
        Ok((msg, task_id))
    }

    /// 将 payload 解析为具体的步骤负载
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// 生成重试消息：attempt 加一，其余字段原样保留
    pub fn next_attempt(&self) -> TaskMessage {
        TaskMessage {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// extract_audio 步骤负载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractAudioPayload {
    pub source_video_key: String,
    pub output_audio_key: String,
}

/// asr 步骤负载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrPayload {
    pub audio_key: String,
    pub language: String,
    pub output_key: String,
}

/// translate 步骤负载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatePayload {
    pub task_id: String,
    #[serde(default)]
    pub segment_ids: Vec<String>,
    pub source_language: String,
    pub target_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

/// tts 步骤负载
///
/// 批量驱动形式为主；旧的单段形式（segment_id/segment_idx/text 等字段）
/// 也必须被接受，退化为大小为 1 的批次
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TtsPayload {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,

    // 旧的单段形式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_idx: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_duration_ms: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prosody_control: Option<serde_json::Value>,
}

/// mux_video 步骤负载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxVideoPayload {
    pub task_id: String,
    pub source_video_key: String,
    pub tts_audio_key: String,
    pub output_video_key: String,
}

/// tts 补偿消息负载（仅发出，不消费）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsCompensationPayload {
    pub task_id: String,
    pub segment_idx: i32,
    pub error: String,
    pub created_at: String,
    pub routing_key: String,
}

/// 补偿消息的路由键
pub const TTS_COMPENSATION_ROUTING_KEY: &str = "task.tts_compensation";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_round_trip() {
        let task_id = Uuid::new_v4();
        let msg = TaskMessage::new(
            task_id,
            StepKind::Asr,
            serde_json::json!({"audio_key": "a", "language": "zh", "output_key": "o"}),
        );
        let body = serde_json::to_vec(&msg).unwrap();
        let (decoded, parsed_id) = TaskMessage::decode(&body).unwrap();
        assert_eq!(parsed_id, task_id);
        assert_eq!(decoded.step, "asr");
        assert_eq!(decoded.attempt, 1);

        let payload: AsrPayload = decoded.payload_as().unwrap();
        assert_eq!(payload.audio_key, "a");
    }

    #[test]
    fn test_decode_rejects_bad_task_id() {
        let body = serde_json::json!({
            "task_id": "not-a-uuid",
            "step": "asr",
            "attempt": 1,
            "trace_id": "t",
            "created_at": "now",
            "payload": {},
        });
        let err = TaskMessage::decode(&serde_json::to_vec(&body).unwrap()).unwrap_err();
        assert!(matches!(err, MessageError::InvalidTaskId(_)));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let err = TaskMessage::decode(b"{nope").unwrap_err();
        assert!(matches!(err, MessageError::Malformed(_)));
    }

    #[test]
    fn test_next_attempt_increments() {
        let msg = TaskMessage::new(Uuid::new_v4(), StepKind::Tts, serde_json::json!({}));
        let retry = msg.next_attempt();
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.trace_id, msg.trace_id);
    }

    #[test]
    fn test_tts_payload_accepts_legacy_form() {
        let legacy = serde_json::json!({
            "task_id": Uuid::new_v4().to_string(),
            "segment_id": "seg-3",
            "segment_idx": 3,
            "text": "hello world",
            "target_duration_ms": 2100,
            "speaker_id": "speaker_1",
            "prosody_control": {"rate": 1.1},
        });
        let payload: TtsPayload = serde_json::from_value(legacy).unwrap();
        assert_eq!(payload.segment_idx, Some(3));
        assert_eq!(payload.text.as_deref(), Some("hello world"));
        assert!(payload.batch_size.is_none());
    }

    #[test]
    fn test_tts_payload_accepts_batch_form() {
        let batch = serde_json::json!({
            "task_id": Uuid::new_v4().to_string(),
            "batch_size": 20,
            "max_concurrency": 4,
            "max_retries": 3,
            "retry_delay_sec": 2.0,
        });
        let payload: TtsPayload = serde_json::from_value(batch).unwrap();
        assert_eq!(payload.batch_size, Some(20));
        assert!(payload.segment_idx.is_none());
    }
}
