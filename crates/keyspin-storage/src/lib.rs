//! Persistence for proxy configs and their key pools.
//!
//! The request path reads through [`ConfigStore::lookup`] only; admin
//! mutations go through the same trait. Schema is created at bootstrap
//! from the entities.

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};

pub mod entities;
mod store;

pub use store::{
    ConfigStore, NewServiceConfig, SeaOrmConfigStore, ServiceConfigPatch, StoreError, StoreResult,
};

pub async fn connect(dsn: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = sea_orm::ConnectOptions::new(dsn.to_string());
    if dsn.starts_with("sqlite") {
        // SQLite writes serialise anyway; one pooled connection also
        // keeps `sqlite::memory:` databases from splitting per handle.
        options.max_connections(1);
    }
    Database::connect(options).await
}

/// Create the two tables if they don't exist yet.
pub async fn sync_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut configs = schema.create_table_from_entity(entities::ProxyConfigs);
    configs.if_not_exists();
    db.execute(backend.build(&configs)).await?;

    let mut keys = schema.create_table_from_entity(entities::ApiKeys);
    keys.if_not_exists();
    db.execute(backend.build(&keys)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspin_common::ServiceKind;

    async fn memory_store() -> SeaOrmConfigStore {
        let db = connect("sqlite::memory:").await.unwrap();
        sync_schema(&db).await.unwrap();
        SeaOrmConfigStore::new(db)
    }

    fn demo_config(slug: &str, kind: &str) -> NewServiceConfig {
        NewServiceConfig {
            name: format!("demo {slug}"),
            slug: slug.to_string(),
            kind: kind.to_string(),
            api_key_location: None,
            api_key_name: None,
            is_active: true,
            method: None,
            target_url: None,
            target_base_url: Some("https://api.example.com".to_string()),
            api_format: Some("openai_compatible".to_string()),
            output_format: None,
        }
    }

    #[tokio::test]
    async fn lookup_preloads_keys_and_filters_kind() {
        let store = memory_store().await;
        let config = store.create(demo_config("demo", "LLM")).await.unwrap();
        store.add_key(config.id, "k1", true).await.unwrap();
        store.add_key(config.id, "k2", false).await.unwrap();

        // Mixed-case kind is normalised on write, so the lowercase
        // filter matches.
        let found = store.lookup("demo", ServiceKind::Llm).await.unwrap().unwrap();
        assert_eq!(found.keys.len(), 2);
        assert_eq!(found.active_keys().len(), 1);
        assert_eq!(found.api_format, "openai_compatible");
        assert_eq!(found.output_format, "none");

        assert!(store
            .lookup("demo", ServiceKind::Generic)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn inactive_configs_are_invisible_to_lookup() {
        let store = memory_store().await;
        let config = store.create(demo_config("dark", "llm")).await.unwrap();
        store
            .update(
                config.id,
                ServiceConfigPatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(store.lookup("dark", ServiceKind::Llm).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades_to_keys() {
        let store = memory_store().await;
        let config = store.create(demo_config("gone", "generic")).await.unwrap();
        let key = store.add_key(config.id, "k1", true).await.unwrap();

        assert!(store.delete(config.id).await.unwrap());
        assert!(store.list_keys(config.id).await.unwrap().is_empty());
        assert!(!store.delete_key(key.id).await.unwrap());
    }

    #[tokio::test]
    async fn key_toggle_round_trips() {
        let store = memory_store().await;
        let config = store.create(demo_config("toggle", "llm")).await.unwrap();
        let key = store.add_key(config.id, "k1", true).await.unwrap();

        assert!(store.set_key_active(key.id, false).await.unwrap());
        let keys = store.list_keys(config.id).await.unwrap();
        assert!(!keys[0].is_active);
    }
}
