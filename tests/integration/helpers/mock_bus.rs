// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Mutex;

use dubrs::domain::models::message::TaskMessage;
use dubrs::queue::{Publisher, QueueError};

/// 记录式发布器
///
/// 收集全部发布的消息供断言；不做任何网络操作
#[derive(Default)]
pub struct MockPublisher {
    messages: Mutex<Vec<(String, TaskMessage)>>,
}

impl MockPublisher {
    /// 取出全部已发布消息（清空内部缓冲）
    pub fn drain(&self) -> Vec<(String, TaskMessage)> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }

    /// 按路由键筛选已发布消息
    pub fn published_to(&self, routing_key: &str) -> Vec<TaskMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key == routing_key)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// 已发布消息总数
    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    /// 是否没有发布过消息
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, routing_key: &str, message: &TaskMessage) -> Result<(), QueueError> {
        self.messages
            .lock()
            .unwrap()
            .push((routing_key.to_string(), message.clone()));
        Ok(())
    }
}
