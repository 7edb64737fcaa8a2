// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// RabbitMQ 连接管理
pub mod connection;

/// 消息发布
pub mod publisher;

pub use connection::{BusConnection, EXCHANGE_NAME};
pub use publisher::{Publisher, QueueError, RabbitPublisher};
