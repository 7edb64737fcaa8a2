// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use lapin::options::ExchangeDeclareOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};

use crate::config::settings::RabbitMqSettings;

/// 任务交换机名称（topic 类型，持久化）
pub const EXCHANGE_NAME: &str = "task_exchange";

/// RabbitMQ 连接封装
///
/// 进程内唯一的总线连接；发布与消费各自在其上开通道
pub struct BusConnection {
    conn: Connection,
}

impl BusConnection {
    /// 建立新的 RabbitMQ 连接
    ///
    /// # 参数
    ///
    /// * `settings` - RabbitMQ 配置
    ///
    /// # 返回值
    ///
    /// * `Ok(BusConnection)` - 连接成功
    /// * `Err(lapin::Error)` - 连接失败
    pub async fn connect(settings: &RabbitMqSettings) -> Result<Self, lapin::Error> {
        let conn = Connection::connect(&settings.url, ConnectionProperties::default()).await?;
        Ok(Self { conn })
    }

    /// 开启新通道并声明任务交换机
    pub async fn channel(&self) -> Result<Channel, lapin::Error> {
        let channel = self.conn.create_channel().await?;
        declare_exchange(&channel).await?;
        Ok(channel)
    }

    /// 关闭连接
    pub async fn close(&self) -> Result<(), lapin::Error> {
        self.conn.close(200, "shutdown").await
    }
}

/// 声明持久化 topic 交换机
pub async fn declare_exchange(channel: &Channel) -> Result<(), lapin::Error> {
    channel
        .exchange_declare(
            EXCHANGE_NAME,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
}
