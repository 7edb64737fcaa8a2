// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod memory_repos;
pub mod mock_bus;
pub mod mock_storage;
pub mod mock_synth;

use std::sync::Arc;

use dubrs::config::resolver::ConfigResolver;
use dubrs::config::settings::Settings;
use dubrs::domain::models::task::Task;
use dubrs::media::ffmpeg::Ffmpeg;
use dubrs::workers::steps::StepDeps;

pub use memory_repos::{
    InMemorySegmentRepository, InMemorySettingRepository, InMemoryStepRepository,
    InMemoryTaskRepository,
};
pub use mock_bus::MockPublisher;
pub use mock_storage::InMemoryStorage;
pub use mock_synth::ScriptedSynthesizer;

/// 测试用的组件集合
pub struct TestHarness {
    pub settings: Arc<Settings>,
    pub tasks: Arc<InMemoryTaskRepository>,
    pub steps: Arc<InMemoryStepRepository>,
    pub segments: Arc<InMemorySegmentRepository>,
    pub setting_rows: Arc<InMemorySettingRepository>,
    pub storage: Arc<InMemoryStorage>,
    pub publisher: Arc<MockPublisher>,
    pub resolver: Arc<ConfigResolver>,
}

impl TestHarness {
    /// 构建全内存的测试环境
    pub fn new() -> Self {
        let settings = Arc::new(Settings::new().expect("default settings load"));
        let tasks = Arc::new(InMemoryTaskRepository::default());
        let steps = Arc::new(InMemoryStepRepository::default());
        let segments = Arc::new(InMemorySegmentRepository::default());
        let setting_rows = Arc::new(InMemorySettingRepository::default());
        let storage = Arc::new(InMemoryStorage::default());
        let publisher = Arc::new(MockPublisher::default());

        let resolver = Arc::new(ConfigResolver::new(
            settings.as_ref().clone(),
            setting_rows.clone(),
            tasks.clone(),
        ));

        Self {
            settings,
            tasks,
            steps,
            segments,
            setting_rows,
            storage,
            publisher,
            resolver,
        }
    }

    /// 组装步骤依赖
    pub fn step_deps(&self) -> StepDeps {
        StepDeps {
            tasks: self.tasks.clone(),
            segments: self.segments.clone(),
            storage: self.storage.clone(),
            publisher: self.publisher.clone(),
            resolver: self.resolver.clone(),
            settings: self.settings.clone(),
            ffmpeg: Ffmpeg::new(&self.settings.ffmpeg),
        }
    }

    /// 插入一条处于 queued 状态的任务并返回
    pub async fn seed_task(&self) -> Task {
        let task = Task::new(
            "videos/test/source.mp4".to_string(),
            "zh".to_string(),
            "en".to_string(),
        )
        .enqueue()
        .expect("enqueue");
        self.tasks.insert(task.clone());
        task
    }
}
