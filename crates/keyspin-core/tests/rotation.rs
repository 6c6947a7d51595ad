use std::collections::HashMap;
use std::sync::Arc;

use keyspin_cache::MemoryCache;
use keyspin_common::{ApiKey, KeyLocation, ServiceConfig, ServiceKind};
use keyspin_core::KeyRotator;

fn config(keys: Vec<(&str, bool)>) -> ServiceConfig {
    ServiceConfig {
        id: 1,
        name: "demo".into(),
        slug: "demo".into(),
        kind: ServiceKind::Llm,
        api_key_location: KeyLocation::Header,
        api_key_name: None,
        is_active: true,
        method: None,
        target_url: None,
        target_base_url: Some("https://upstream.example.com".into()),
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
async fn concurrent_rotations_stay_within_fairness_bounds() {
    const TASKS: usize = 12;
    const PER_TASK: usize = 25;
    const TOTAL: usize = TASKS * PER_TASK;

    let rotator = Arc::new(KeyRotator::new(Arc::new(MemoryCache::new())));
    let config = Arc::new(config(vec![("K1", true), ("K2", true), ("K3", true)]));

    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let rotator = Arc::clone(&rotator);
        let config = Arc::clone(&config);
        handles.push(tokio::spawn(async move {
            let mut picked = Vec::with_capacity(PER_TASK);
            for _ in 0..PER_TASK {
                picked.push(rotator.next_key(&config).await.unwrap());
            }
            picked
        }));
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for handle in handles {
        for key in handle.await.unwrap() {
            *counts.entry(key).or_default() += 1;
        }
    }

    assert_eq!(counts.values().sum::<usize>(), TOTAL);
    let active = 3;
    let floor = TOTAL / active;
    let ceil = TOTAL.div_ceil(active);
    for (key, count) in &counts {
        assert!(
            (floor..=ceil).contains(count),
            "{key} selected {count} times, expected within [{floor}, {ceil}]"
        );
    }
}

#[tokio::test]
async fn no_key_repeats_back_to_back_with_multiple_active_keys() {
    let rotator = KeyRotator::new(Arc::new(MemoryCache::new()));
    let config = config(vec![("K1", true), ("K2", true)]);

    let mut previous = String::new();
    for _ in 0..20 {
        let key = rotator.next_key(&config).await.unwrap();
        assert_ne!(key, previous);
        previous = key;
    }
}
