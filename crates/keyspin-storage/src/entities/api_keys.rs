use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub key_value: String,
    pub is_active: bool,
    pub proxy_config_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::proxy_configs::Entity",
        from = "Column::ProxyConfigId",
        to = "super::proxy_configs::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    ProxyConfig,
}

impl Related<super::proxy_configs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProxyConfig.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
