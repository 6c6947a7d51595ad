use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::Deserialize;

use keyspin_common::{ApiKey, KeyLocation, ServiceConfig, ServiceKind};

use crate::entities::{api_keys, proxy_configs, ApiKeys, ProxyConfigs};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewServiceConfig {
    pub name: String,
    pub slug: String,
    pub kind: String,
    #[serde(default)]
    pub api_key_location: Option<String>,
    #[serde(default)]
    pub api_key_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub target_base_url: Option<String>,
    #[serde(default)]
    pub api_format: Option<String>,
    #[serde(default)]
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfigPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub kind: Option<String>,
    pub api_key_location: Option<String>,
    pub api_key_name: Option<String>,
    pub is_active: Option<bool>,
    pub method: Option<String>,
    pub target_url: Option<String>,
    pub target_base_url: Option<String>,
    pub api_format: Option<String>,
    pub output_format: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Read/write surface over the persisted configs. The request path only
/// ever calls [`ConfigStore::lookup`]; everything else serves the admin
/// routes and tests.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load an active config by slug and kind, keys preloaded in the
    /// same round-trip.
    async fn lookup(&self, slug: &str, kind: ServiceKind) -> StoreResult<Option<ServiceConfig>>;

    async fn list(&self) -> StoreResult<Vec<ServiceConfig>>;
    async fn get(&self, id: i32) -> StoreResult<Option<ServiceConfig>>;
    async fn create(&self, config: NewServiceConfig) -> StoreResult<ServiceConfig>;
    async fn update(&self, id: i32, patch: ServiceConfigPatch) -> StoreResult<Option<ServiceConfig>>;
    /// Deletes the config and, transitively, its keys.
    async fn delete(&self, id: i32) -> StoreResult<bool>;

    async fn list_keys(&self, config_id: i32) -> StoreResult<Vec<ApiKey>>;
    async fn add_key(&self, config_id: i32, value: &str, is_active: bool) -> StoreResult<ApiKey>;
    async fn set_key_active(&self, key_id: i32, is_active: bool) -> StoreResult<bool>;
    async fn delete_key(&self, key_id: i32) -> StoreResult<bool>;
}

pub struct SeaOrmConfigStore {
    db: DatabaseConnection,
}

impl SeaOrmConfigStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_domain(row: proxy_configs::Model, keys: Vec<api_keys::Model>) -> ServiceConfig {
    ServiceConfig {
        id: row.id,
        name: row.name,
        slug: row.slug,
        kind: ServiceKind::parse(&row.kind).unwrap_or(ServiceKind::Generic),
        api_key_location: row
            .api_key_location
            .as_deref()
            .map(KeyLocation::parse)
            .unwrap_or_default(),
        api_key_name: row.api_key_name.filter(|name| !name.is_empty()),
        is_active: row.is_active,
        method: row.method,
        target_url: row.target_url,
        target_base_url: row.target_base_url,
        api_format: row
            .api_format
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "openai_compatible".to_string()),
        output_format: row
            .output_format
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "none".to_string()),
        keys: keys.into_iter().map(to_domain_key).collect(),
    }
}

fn to_domain_key(row: api_keys::Model) -> ApiKey {
    ApiKey {
        id: row.id,
        value: row.key_value,
        is_active: row.is_active,
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_ascii_lowercase()).filter(|v| !v.is_empty())
}

#[async_trait]
impl ConfigStore for SeaOrmConfigStore {
    async fn lookup(&self, slug: &str, kind: ServiceKind) -> StoreResult<Option<ServiceConfig>> {
        let mut rows = ProxyConfigs::find()
            .filter(proxy_configs::Column::Slug.eq(slug))
            .filter(proxy_configs::Column::IsActive.eq(true))
            .filter(proxy_configs::Column::Kind.eq(kind.as_str()))
            .find_with_related(ApiKeys)
            .all(&self.db)
            .await?;

        Ok(rows.pop().map(|(row, keys)| to_domain(row, keys)))
    }

    async fn list(&self) -> StoreResult<Vec<ServiceConfig>> {
        let rows = ProxyConfigs::find()
            .order_by_asc(proxy_configs::Column::Id)
            .find_with_related(ApiKeys)
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(row, keys)| to_domain(row, keys))
            .collect())
    }

    async fn get(&self, id: i32) -> StoreResult<Option<ServiceConfig>> {
        let mut rows = ProxyConfigs::find_by_id(id)
            .find_with_related(ApiKeys)
            .all(&self.db)
            .await?;
        Ok(rows.pop().map(|(row, keys)| to_domain(row, keys)))
    }

    async fn create(&self, config: NewServiceConfig) -> StoreResult<ServiceConfig> {
        let now = chrono::Utc::now();
        let row = proxy_configs::ActiveModel {
            name: Set(config.name.trim().to_string()),
            slug: Set(config.slug.trim().to_string()),
            kind: Set(config.kind.trim().to_ascii_lowercase()),
            api_key_location: Set(normalize(config.api_key_location)),
            api_key_name: Set(config.api_key_name.filter(|n| !n.is_empty())),
            is_active: Set(config.is_active),
            method: Set(config.method.map(|m| m.to_ascii_uppercase())),
            target_url: Set(config.target_url),
            target_base_url: Set(config.target_base_url),
            api_format: Set(normalize(config.api_format)),
            output_format: Set(normalize(config.output_format)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        Ok(to_domain(row, Vec::new()))
    }

    async fn update(&self, id: i32, patch: ServiceConfigPatch) -> StoreResult<Option<ServiceConfig>> {
        let Some(row) = ProxyConfigs::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut active: proxy_configs::ActiveModel = row.into();
        if let Some(name) = patch.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(slug) = patch.slug {
            active.slug = Set(slug.trim().to_string());
        }
        if let Some(kind) = patch.kind {
            active.kind = Set(kind.trim().to_ascii_lowercase());
        }
        if patch.api_key_location.is_some() {
            active.api_key_location = Set(normalize(patch.api_key_location));
        }
        if patch.api_key_name.is_some() {
            active.api_key_name = Set(patch.api_key_name.filter(|n| !n.is_empty()));
        }
        if let Some(is_active) = patch.is_active {
            active.is_active = Set(is_active);
        }
        if patch.method.is_some() {
            active.method = Set(patch.method.map(|m| m.to_ascii_uppercase()));
        }
        if patch.target_url.is_some() {
            active.target_url = Set(patch.target_url);
        }
        if patch.target_base_url.is_some() {
            active.target_base_url = Set(patch.target_base_url);
        }
        if patch.api_format.is_some() {
            active.api_format = Set(normalize(patch.api_format));
        }
        if patch.output_format.is_some() {
            active.output_format = Set(normalize(patch.output_format));
        }
        active.updated_at = Set(chrono::Utc::now());
        active.update(&self.db).await?;

        self.get(id).await
    }

    async fn delete(&self, id: i32) -> StoreResult<bool> {
        // Cascade explicitly so the behaviour doesn't depend on the
        // backend honouring FK pragmas.
        ApiKeys::delete_many()
            .filter(api_keys::Column::ProxyConfigId.eq(id))
            .exec(&self.db)
            .await?;
        let result = ProxyConfigs::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn list_keys(&self, config_id: i32) -> StoreResult<Vec<ApiKey>> {
        let rows = ApiKeys::find()
            .filter(api_keys::Column::ProxyConfigId.eq(config_id))
            .order_by_asc(api_keys::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(to_domain_key).collect())
    }

    async fn add_key(&self, config_id: i32, value: &str, is_active: bool) -> StoreResult<ApiKey> {
        let row = api_keys::ActiveModel {
            key_value: Set(value.to_string()),
            is_active: Set(is_active),
            proxy_config_id: Set(config_id),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(to_domain_key(row))
    }

    async fn set_key_active(&self, key_id: i32, is_active: bool) -> StoreResult<bool> {
        let Some(row) = ApiKeys::find_by_id(key_id).one(&self.db).await? else {
            return Ok(false);
        };
        let mut active: api_keys::ActiveModel = row.into();
        active.is_active = Set(is_active);
        active.update(&self.db).await?;
        Ok(true)
    }

    async fn delete_key(&self, key_id: i32) -> StoreResult<bool> {
        let result = ApiKeys::delete_by_id(key_id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }
}
