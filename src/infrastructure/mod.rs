// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 数据库连接与实体
pub mod database;

/// 仓库实现
pub mod repositories;

/// 对象存储实现
pub mod storage;
