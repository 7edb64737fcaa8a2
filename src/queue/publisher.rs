// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::BasicPublishOptions;
use lapin::BasicProperties;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::domain::models::message::TaskMessage;
use crate::queue::connection::{BusConnection, EXCHANGE_NAME};

/// 发布超时
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// AMQP错误
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// 消息序列化错误
    #[error("Message serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// 发布超时
    #[error("Publish to {routing_key} timed out after {timeout_secs}s")]
    Timeout {
        routing_key: String,
        timeout_secs: u64,
    },
}

/// 消息发布特质
///
/// 步骤处理器发布后继消息的最小接口
#[async_trait]
pub trait Publisher: Send + Sync {
    /// 发布任务消息到指定路由键
    async fn publish(&self, routing_key: &str, message: &TaskMessage) -> Result<(), QueueError>;
}

/// RabbitMQ 消息发布器
pub struct RabbitPublisher {
    conn: Arc<BusConnection>,
}

impl RabbitPublisher {
    /// 创建新的发布器
    ///
    /// # 参数
    ///
    /// * `conn` - 总线连接
    pub fn new(conn: Arc<BusConnection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Publisher for RabbitPublisher {
    /// 发布持久化 JSON 消息
    ///
    /// 每次发布在新通道上进行并声明交换机；5 秒内未完成视为超时
    async fn publish(&self, routing_key: &str, message: &TaskMessage) -> Result<(), QueueError> {
        let body = serde_json::to_vec(message)?;

        let publish = async {
            let channel = self.conn.channel().await?;
            let confirm = channel
                .basic_publish(
                    EXCHANGE_NAME,
                    routing_key,
                    BasicPublishOptions::default(),
                    &body,
                    BasicProperties::default()
                        .with_content_type("application/json".into())
                        .with_delivery_mode(2) // persistent
                        .with_timestamp(Utc::now().timestamp() as u64),
                )
                .await?;
            confirm.await?;
            Ok::<(), QueueError>(())
        };

        tokio::time::timeout(PUBLISH_TIMEOUT, publish)
            .await
            .map_err(|_| QueueError::Timeout {
                routing_key: routing_key.to_string(),
                timeout_secs: PUBLISH_TIMEOUT.as_secs(),
            })??;

        debug!(routing_key, task_id = %message.task_id, attempt = message.attempt, "Message published");
        Ok(())
    }
}
