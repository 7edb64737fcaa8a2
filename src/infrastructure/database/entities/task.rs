// Copyright 2025 dubrs contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub status: String,
    pub progress: i32,
    pub error: Option<String>,
    pub source_video_key: String,
    pub output_video_key: Option<String>,
    pub source_language: String,
    pub target_language: String,
    pub asr_app_key: Option<String>,
    pub asr_access_key: Option<String>,
    pub asr_resource_id: Option<String>,
    pub glm_api_key: Option<String>,
    pub glm_api_url: Option<String>,
    pub glm_model: Option<String>,
    pub tts_backend: Option<String>,
    pub tts_service_url: Option<String>,
    pub tts_api_key: Option<String>,
    pub created_at: ChronoDateTimeWithTimeZone,
    pub updated_at: ChronoDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::task_step::Entity")]
    TaskSteps,
    #[sea_orm(has_many = "super::segment::Entity")]
    Segments,
}

impl Related<super::task_step::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskSteps.def()
    }
}

impl Related<super::segment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Segments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
