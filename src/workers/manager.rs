// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::queue::connection::BusConnection;
use crate::workers::consumer::StepConsumer;
use crate::workers::registry::StepRegistry;
use crate::workers::runner::StepRunner;

/// 进行中投递的收尾宽限
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 工作管理器
///
/// 为每个已注册步骤启动一个专属消费者任务；收到关闭信号后通知
/// 消费者停止接收新投递，等待宽限期后强制终止残留任务
pub struct WorkerManager {
    conn: Arc<BusConnection>,
    runner: Arc<StepRunner>,
    registry: Arc<StepRegistry>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerManager {
    /// 创建新的工作管理器
    ///
    /// # 参数
    ///
    /// * `conn` - 总线连接
    /// * `runner` - 状态机执行器
    /// * `registry` - 步骤注册表
    pub fn new(
        conn: Arc<BusConnection>,
        runner: Arc<StepRunner>,
        registry: Arc<StepRegistry>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            conn,
            runner,
            registry,
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// 为每个已注册步骤启动一个消费者
    pub fn start_consumers(&mut self) {
        for kind in self.registry.kinds() {
            let Some(processor) = self.registry.get(kind) else {
                continue;
            };
            let consumer =
                StepConsumer::new(self.conn.clone(), self.runner.clone(), processor);
            let shutdown_rx = self.shutdown_tx.subscribe();

            let handle = tokio::spawn(async move {
                if let Err(err) = consumer.run(shutdown_rx).await {
                    error!(step = kind.as_str(), error = %err, "Consumer failed");
                }
            });
            self.handles.push(handle);
        }
        info!(consumer_count = self.handles.len(), "All consumers started");
    }

    /// 等待关闭信号并优雅停机
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        info!("Shutting down consumers...");
        let _ = self.shutdown_tx.send(true);

        // 给进行中的投递收尾的时间，然后强制终止
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        for handle in &self.handles {
            handle.abort();
        }

        info!("Consumers shut down");
    }
}
