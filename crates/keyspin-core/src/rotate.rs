use std::sync::Arc;

use tracing::{info, warn};

use keyspin_cache::Counter;
use keyspin_common::{mask_key, ServiceConfig};

use crate::error::ProxyError;

/// Round-robin selection over a config's active keys, fair across
/// concurrent requests because the counter increment is atomic.
pub struct KeyRotator {
    counter: Arc<dyn Counter>,
}

impl KeyRotator {
    pub fn new(counter: Arc<dyn Counter>) -> Self {
        Self { counter }
    }

    pub async fn next_key(&self, config: &ServiceConfig) -> Result<String, ProxyError> {
        let active = config.active_keys();
        if active.is_empty() {
            warn!(
                event = "rotation_failed",
                slug = %config.slug,
                "service has no active API keys"
            );
            return Err(ProxyError::NoActiveKeys);
        }

        let counter_key = format!("proxy_config:{}:key_index", config.id);
        let n = self
            .counter
            .incr(&counter_key)
            .await
            .map_err(ProxyError::CounterUnavailable)?;

        // The modulus floats with the active set: deactivating a key
        // shifts later selections but never yields an inactive key.
        let index = (n - 1).rem_euclid(active.len() as i64) as usize;
        let selected = active[index].value.clone();

        info!(
            event = "key_rotated",
            slug = %config.slug,
            key = %mask_key(&selected),
            sequence = n,
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspin_cache::MemoryCache;
    use keyspin_common::{ApiKey, KeyLocation, ServiceKind};

    fn config_with_keys(keys: Vec<(&str, bool)>) -> ServiceConfig {
        ServiceConfig {
            id: 7,
            name: "demo".into(),
            slug: "demo".into(),
            kind: ServiceKind::Llm,
            api_key_location: KeyLocation::Header,
            api_key_name: None,
            is_active: true,
            method: None,
            target_url: None,
            target_base_url: Some("https://api.example.com".into()),
            api_format: "openai_compatible".into(),
            output_format: "none".into(),
            keys: keys
                .into_iter()
                .enumerate()
                .map(|(i, (value, is_active))| ApiKey {
                    id: i as i32 + 1,
                    value: value.to_string(),
                    is_active,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn cycles_through_active_keys_in_order() {
        let rotator = KeyRotator::new(Arc::new(MemoryCache::new()));
        let config = config_with_keys(vec![("k1", true), ("k2", true), ("k3", false)]);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rotator.next_key(&config).await.unwrap());
        }
        assert_eq!(seen, vec!["k1", "k2", "k1", "k2"]);
    }

    #[tokio::test]
    async fn inactive_keys_are_never_selected() {
        let rotator = KeyRotator::new(Arc::new(MemoryCache::new()));
        let config = config_with_keys(vec![("k1", false), ("k2", true), ("k3", false)]);

        for _ in 0..10 {
            assert_eq!(rotator.next_key(&config).await.unwrap(), "k2");
        }
    }

    #[tokio::test]
    async fn no_active_keys_is_an_error() {
        let rotator = KeyRotator::new(Arc::new(MemoryCache::new()));
        let config = config_with_keys(vec![("k1", false)]);
        assert!(matches!(
            rotator.next_key(&config).await,
            Err(ProxyError::NoActiveKeys)
        ));
    }

    #[tokio::test]
    async fn counter_survives_key_list_shrinking() {
        let rotator = KeyRotator::new(Arc::new(MemoryCache::new()));
        let mut config = config_with_keys(vec![("k1", true), ("k2", true), ("k3", true)]);

        rotator.next_key(&config).await.unwrap();
        rotator.next_key(&config).await.unwrap();

        // Operator deactivates a key mid-sequence; the counter is not
        // reset and the modulus floats.
        config.keys[2].is_active = false;
        for _ in 0..6 {
            let key = rotator.next_key(&config).await.unwrap();
            assert_ne!(key, "k3");
        }
    }
}
