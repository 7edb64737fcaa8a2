// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use dubrs::clients::tts::create_synthesizer;
use dubrs::config::resolver::ConfigResolver;
use dubrs::config::settings::Settings;
use dubrs::infrastructure::database::connection;
use dubrs::infrastructure::repositories::{
    SegmentRepositoryImpl, SettingRepositoryImpl, StepRepositoryImpl, TaskRepositoryImpl,
};
use dubrs::infrastructure::storage;
use dubrs::media::ffmpeg::Ffmpeg;
use dubrs::queue::{BusConnection, RabbitPublisher};
use dubrs::utils::telemetry;
use dubrs::workers::steps::{
    AsrStep, ExtractAudioStep, MuxVideoStep, StepDeps, TranslateStep, TtsStep,
};
use dubrs::workers::{StepRegistry, StepRunner, WorkerManager};
use migration::{Migrator, MigratorTrait};
use tracing::info;

/// 主函数
///
/// 工作进程入口点，负责初始化所有组件并启动步骤消费者
///
/// # 返回值
///
/// 返回 `anyhow::Result<()>`，成功时返回 Ok(())，失败时返回错误
///
/// # 功能
///
/// 1. 初始化日志系统
/// 2. 加载环境配置
/// 3. 建立数据库连接并运行迁移
/// 4. 解析启动期有效配置并构建对象存储网关
/// 5. 建立 RabbitMQ 连接
/// 6. 注册五个步骤处理器并启动消费者
/// 7. 等待关闭信号后优雅退出
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 初始化日志系统
    telemetry::init_telemetry();
    info!("Starting dubrs worker...");

    // 2. 加载环境配置
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    // 3. 建立数据库连接并运行迁移
    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Database connection established");

    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. 初始化仓库与配置解析器
    let task_repo = Arc::new(TaskRepositoryImpl::new(db.clone()));
    let step_repo = Arc::new(StepRepositoryImpl::new(db.clone()));
    let segment_repo = Arc::new(SegmentRepositoryImpl::new(db.clone()));
    let setting_repo = Arc::new(SettingRepositoryImpl::new(db.clone()));

    let resolver = Arc::new(ConfigResolver::new(
        settings.as_ref().clone(),
        setting_repo.clone(),
        task_repo.clone(),
    ));

    // 存储后端按 环境+设置表 的合并结果选择
    let boot_config = resolver.resolve(None).await?;
    let object_storage = storage::from_config(&boot_config)?;
    info!(backend = %boot_config.storage.backend, "Object storage initialized");

    // TTS 后端在启动时探测一次便于发现配置问题，实际合成仍按任务解析
    if let Err(err) = create_synthesizer(&boot_config.tts) {
        info!(error = %err, "TTS backend not yet configured");
    }

    // 5. 建立 RabbitMQ 连接
    let bus = Arc::new(BusConnection::connect(&settings.rabbitmq).await?);
    let publisher = Arc::new(RabbitPublisher::new(bus.clone()));
    info!("RabbitMQ connected");

    // 6. 注册步骤处理器
    let deps = StepDeps {
        tasks: task_repo.clone(),
        segments: segment_repo,
        storage: object_storage,
        publisher: publisher.clone(),
        resolver,
        settings: settings.clone(),
        ffmpeg: Ffmpeg::new(&settings.ffmpeg),
    };

    let mut registry = StepRegistry::new();
    registry.register(Arc::new(ExtractAudioStep::new(deps.clone())));
    registry.register(Arc::new(AsrStep::new(deps.clone())));
    registry.register(Arc::new(TranslateStep::new(deps.clone())));
    registry.register(Arc::new(TtsStep::new(deps.clone())));
    registry.register(Arc::new(MuxVideoStep::new(deps)));

    let runner = Arc::new(StepRunner::new(
        task_repo,
        step_repo,
        publisher,
        settings.timeouts.clone(),
        settings.worker.max_retries,
    ));

    // 7. 启动消费者并等待关闭信号
    let mut manager = WorkerManager::new(bus.clone(), runner, Arc::new(registry));
    manager.start_consumers();
    manager.wait_for_shutdown().await;

    bus.close().await.ok();
    info!("Worker service exited");
    Ok(())
}
