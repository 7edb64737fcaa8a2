// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, BasicRejectOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::models::message::TaskMessage;
use crate::queue::connection::{BusConnection, EXCHANGE_NAME};
use crate::utils::errors::WorkerError;
use crate::workers::runner::StepRunner;
use crate::workers::steps::StepProcessor;

/// 单个步骤的消费者
///
/// 声明并绑定 `task.<step>` 队列（prefetch=1，手动确认），对每条
/// 投递解码信封后进入状态机：成功正向确认；格式错误直接丢弃；
/// 其余负向确认且不重新入队——重投递只经由引擎的重试发布
pub struct StepConsumer {
    conn: Arc<BusConnection>,
    runner: Arc<StepRunner>,
    processor: Arc<dyn StepProcessor>,
}

impl StepConsumer {
    /// 创建新的步骤消费者
    ///
    /// # 参数
    ///
    /// * `conn` - 总线连接
    /// * `runner` - 状态机执行器
    /// * `processor` - 步骤处理器
    pub fn new(
        conn: Arc<BusConnection>,
        runner: Arc<StepRunner>,
        processor: Arc<dyn StepProcessor>,
    ) -> Self {
        Self {
            conn,
            runner,
            processor,
        }
    }

    /// 运行消费循环直至收到关闭信号
    ///
    /// 关闭信号只在两条投递之间被观察，进行中的投递会处理完毕
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        let kind = self.processor.kind();
        let queue_name = kind.routing_key();

        let channel = self
            .conn
            .channel()
            .await
            .map_err(|err| WorkerError::QueueError(err.to_string()))?;

        channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| WorkerError::QueueError(err.to_string()))?;

        channel
            .queue_bind(
                &queue_name,
                EXCHANGE_NAME,
                &kind.routing_key(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| WorkerError::QueueError(err.to_string()))?;

        // 一次只处理一条消息
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|err| WorkerError::QueueError(err.to_string()))?;

        let mut consumer = channel
            .basic_consume(
                &queue_name,
                &format!("dubrs-{}", kind.as_str()),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| WorkerError::QueueError(err.to_string()))?;

        info!(step = kind.as_str(), queue = %queue_name, "Started consumer");

        loop {
            tokio::select! {
                delivery = consumer.next() => {
                    let Some(delivery) = delivery else {
                        return Err(WorkerError::QueueError(
                            "consumer channel closed".to_string(),
                        ));
                    };
                    let delivery = match delivery {
                        Ok(delivery) => delivery,
                        Err(err) => {
                            error!(step = kind.as_str(), error = %err, "Delivery error");
                            continue;
                        }
                    };

                    let (msg, task_id) = match TaskMessage::decode(&delivery.data) {
                        Ok(decoded) => decoded,
                        Err(err) => {
                            // 无法解码的消息不可恢复，丢弃且不重新入队
                            warn!(
                                step = kind.as_str(),
                                error = %err,
                                "Discarding malformed message"
                            );
                            let _ = delivery
                                .reject(BasicRejectOptions { requeue: false })
                                .await;
                            continue;
                        }
                    };

                    match self
                        .runner
                        .run_step_with_status(self.processor.as_ref(), task_id, &msg)
                        .await
                    {
                        Ok(()) => {
                            let _ = delivery.ack(BasicAckOptions::default()).await;
                        }
                        Err(err) => {
                            error!(
                                step = kind.as_str(),
                                task_id = %task_id,
                                error = %err,
                                "Failed to process message"
                            );
                            let _ = delivery
                                .nack(BasicNackOptions {
                                    requeue: false,
                                    ..Default::default()
                                })
                                .await;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!(step = kind.as_str(), "Stopping consumer");
                    return Ok(());
                }
            }
        }
    }
}
