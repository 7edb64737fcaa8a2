// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::step::StepKind;
use crate::workers::steps::StepProcessor;

/// 步骤注册表
///
/// 进程级的步骤名到处理器映射，启动时构建；新增步骤只需注册
/// 一个新的处理器类型
#[derive(Default)]
pub struct StepRegistry {
    processors: HashMap<StepKind, Arc<dyn StepProcessor>>,
}

impl StepRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个步骤处理器
    pub fn register(&mut self, processor: Arc<dyn StepProcessor>) {
        self.processors.insert(processor.kind(), processor);
    }

    /// 按步骤种类查找处理器
    pub fn get(&self, kind: StepKind) -> Option<Arc<dyn StepProcessor>> {
        self.processors.get(&kind).cloned()
    }

    /// 返回已注册的步骤（按流水线顺序）
    pub fn kinds(&self) -> Vec<StepKind> {
        StepKind::all()
            .into_iter()
            .filter(|kind| self.processors.contains_key(kind))
            .collect()
    }
}
