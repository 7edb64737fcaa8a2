// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 有效配置解析器
pub mod resolver;

/// 应用程序配置设置
pub mod settings;

pub use resolver::{ConfigError, ConfigResolver, EffectiveConfig};
pub use settings::Settings;
