// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DbBackend;

/// 数据库初始模式迁移
///
/// 创建配音流水线的四张核心表：tasks、task_steps、segments、settings
#[derive(DeriveMigrationName)]
pub struct Migration;

fn uuid_pk(manager: &SchemaManager, name: impl IntoIden) -> ColumnDef {
    let mut col = ColumnDef::new(name);
    col.uuid().not_null().primary_key();
    if manager.get_database_backend() == DbBackend::Postgres {
        col.default(Expr::cust("gen_random_uuid()"));
    }
    col
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    /// 应用数据库迁移
    ///
    /// # 参数
    ///
    /// * `manager` - 数据库模式管理器
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 迁移成功
    /// * `Err(DbErr)` - 迁移失败
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. Create tasks table (no dependencies)
        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(uuid_pk(manager, Tasks::Id))
                    .col(
                        ColumnDef::new(Tasks::Status)
                            .string()
                            .not_null()
                            .default("created"),
                    )
                    .col(
                        ColumnDef::new(Tasks::Progress)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Tasks::Error).text().null())
                    .col(ColumnDef::new(Tasks::SourceVideoKey).string().not_null())
                    .col(ColumnDef::new(Tasks::OutputVideoKey).string().null())
                    .col(ColumnDef::new(Tasks::SourceLanguage).string().not_null())
                    .col(ColumnDef::new(Tasks::TargetLanguage).string().not_null())
                    // Per-task credential overrides; NULL means "no override"
                    .col(ColumnDef::new(Tasks::AsrAppKey).string().null())
                    .col(ColumnDef::new(Tasks::AsrAccessKey).string().null())
                    .col(ColumnDef::new(Tasks::AsrResourceId).string().null())
                    .col(ColumnDef::new(Tasks::GlmApiKey).string().null())
                    .col(ColumnDef::new(Tasks::GlmApiUrl).string().null())
                    .col(ColumnDef::new(Tasks::GlmModel).string().null())
                    .col(ColumnDef::new(Tasks::TtsBackend).string().null())
                    .col(ColumnDef::new(Tasks::TtsServiceUrl).string().null())
                    .col(ColumnDef::new(Tasks::TtsApiKey).string().null())
                    .col(
                        ColumnDef::new(Tasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Tasks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_status")
                    .table(Tasks::Table)
                    .col(Tasks::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_created_at")
                    .table(Tasks::Table)
                    .col(Tasks::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // 2. Create task_steps table (depends on Tasks)
        manager
            .create_table(
                Table::create()
                    .table(TaskSteps::Table)
                    .if_not_exists()
                    .col(uuid_pk(manager, TaskSteps::Id))
                    .col(ColumnDef::new(TaskSteps::TaskId).uuid().not_null())
                    .col(ColumnDef::new(TaskSteps::Step).string().not_null())
                    .col(
                        ColumnDef::new(TaskSteps::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(TaskSteps::Attempt)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(TaskSteps::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TaskSteps::EndedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(TaskSteps::Error).text().null())
                    .col(ColumnDef::new(TaskSteps::MetricsJson).json().null())
                    .col(
                        ColumnDef::new(TaskSteps::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TaskSteps::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_steps_task")
                            .from(TaskSteps::Table, TaskSteps::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per attempt; latest attempt is authoritative
        manager
            .create_index(
                Index::create()
                    .name("uq_task_steps_task_step_attempt")
                    .table(TaskSteps::Table)
                    .col(TaskSteps::TaskId)
                    .col(TaskSteps::Step)
                    .col(TaskSteps::Attempt)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_task_steps_task_id")
                    .table(TaskSteps::Table)
                    .col(TaskSteps::TaskId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_task_steps_status")
                    .table(TaskSteps::Table)
                    .col(TaskSteps::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_task_steps_step")
                    .table(TaskSteps::Table)
                    .col(TaskSteps::Step)
                    .to_owned(),
            )
            .await?;

        // 3. Create segments table (depends on Tasks)
        manager
            .create_table(
                Table::create()
                    .table(Segments::Table)
                    .if_not_exists()
                    .col(uuid_pk(manager, Segments::Id))
                    .col(ColumnDef::new(Segments::TaskId).uuid().not_null())
                    .col(ColumnDef::new(Segments::Idx).integer().not_null())
                    .col(ColumnDef::new(Segments::StartMs).integer().not_null())
                    .col(ColumnDef::new(Segments::EndMs).integer().not_null())
                    .col(ColumnDef::new(Segments::DurationMs).integer().not_null())
                    .col(ColumnDef::new(Segments::SrcText).text().not_null())
                    .col(ColumnDef::new(Segments::MtText).text().null())
                    .col(ColumnDef::new(Segments::TtsParamsJson).json().null())
                    .col(ColumnDef::new(Segments::TtsAudioKey).string().null())
                    .col(ColumnDef::new(Segments::SpeakerId).string().null())
                    .col(ColumnDef::new(Segments::Emotion).string().null())
                    .col(ColumnDef::new(Segments::Gender).string().null())
                    .col(
                        ColumnDef::new(Segments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Segments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_segments_task")
                            .from(Segments::Table, Segments::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_segments_task_idx")
                    .table(Segments::Table)
                    .col(Segments::TaskId)
                    .col(Segments::Idx)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_segments_task_id")
                    .table(Segments::Table)
                    .col(Segments::TaskId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_segments_task_speaker")
                    .table(Segments::Table)
                    .col(Segments::TaskId)
                    .col(Segments::SpeakerId)
                    .to_owned(),
            )
            .await?;

        // 4. Create settings table (no dependencies)
        manager
            .create_table(
                Table::create()
                    .table(Settings::Table)
                    .if_not_exists()
                    .col(uuid_pk(manager, Settings::Id))
                    .col(ColumnDef::new(Settings::Category).string().not_null())
                    .col(ColumnDef::new(Settings::Key).string().not_null())
                    .col(ColumnDef::new(Settings::Value).text().not_null())
                    .col(
                        ColumnDef::new(Settings::IsSensitive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Settings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_settings_category_key")
                    .table(Settings::Table)
                    .col(Settings::Category)
                    .col(Settings::Key)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_settings_category")
                    .table(Settings::Table)
                    .col(Settings::Category)
                    .to_owned(),
            )
            .await
    }

    /// 回滚数据库迁移
    ///
    /// # 参数
    ///
    /// * `manager` - 数据库模式管理器
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 回滚成功
    /// * `Err(DbErr)` - 回滚失败
    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Settings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Segments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaskSteps::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
    Status,
    Progress,
    Error,
    SourceVideoKey,
    OutputVideoKey,
    SourceLanguage,
    TargetLanguage,
    AsrAppKey,
    AsrAccessKey,
    AsrResourceId,
    GlmApiKey,
    GlmApiUrl,
    GlmModel,
    TtsBackend,
    TtsServiceUrl,
    TtsApiKey,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TaskSteps {
    Table,
    Id,
    TaskId,
    Step,
    Status,
    Attempt,
    StartedAt,
    EndedAt,
    Error,
    MetricsJson,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Segments {
    Table,
    Id,
    TaskId,
    Idx,
    StartMs,
    EndMs,
    DurationMs,
    SrcText,
    MtText,
    TtsParamsJson,
    TtsAudioKey,
    SpeakerId,
    Emotion,
    Gender,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Settings {
    Table,
    Id,
    Category,
    Key,
    Value,
    IsSensitive,
    UpdatedAt,
}
