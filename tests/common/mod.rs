//! Shared fixtures for the integration tests

#![allow(dead_code)]

use post_curator::config::{Config, StateBackend, StateConfig};
use post_curator::models::{
    FeatureValue, FilterResult, Item, ModuleSetting, NamedFeature, PredictedClass,
};
use post_curator::pipeline::CuratorService;
use post_curator::state::{create_stores, Stores};
use serde_json::json;
use std::path::Path;
use uuid::Uuid;

/// Embedded defaults with an in-memory backend and a fixed training seed
pub fn test_config() -> Config {
    let mut config = Config::embedded_defaults().expect("embedded defaults parse");
    config.state = StateConfig {
        backend: StateBackend::Memory,
        path: None,
    };
    config.server.public_base_url = "http://curator.test".to_string();
    config.training.seed = Some(7);
    config
}

pub fn memory_service() -> CuratorService {
    let config = test_config();
    let stores = create_stores(&config.state).unwrap();
    CuratorService::new(stores, &config).unwrap()
}

pub fn sled_stores(path: &Path) -> Stores {
    create_stores(&StateConfig {
        backend: StateBackend::Sled,
        path: Some(path.to_path_buf()),
    })
    .unwrap()
}

/// Accepted item carrying a scalar `score` feature
pub fn accepted_item(topic_id: Uuid, id: &str, score: f64) -> Item {
    let mut item = Item::new(id, topic_id, format!("post {}", id));
    item.predicted_class = PredictedClass::Accept;
    item.filters_result = vec![FilterResult {
        filter_id: "fixture".to_string(),
        values: vec![NamedFeature {
            name: "score".to_string(),
            title: "Score".to_string(),
            value: FeatureValue::Scalar(score),
        }],
        summary: String::new(),
    }];
    item
}

pub fn threshold(id: &str, min: f64) -> ModuleSetting {
    ModuleSetting::new("filter_threshold", id)
        .with_setting("feature", json!("score"))
        .with_setting("min", json!(min))
}

pub fn wait(id: &str, seconds: u64) -> ModuleSetting {
    ModuleSetting::new("wait", id).with_setting("seconds", json!(seconds))
}

pub fn notify(id: &str, url: &str) -> ModuleSetting {
    ModuleSetting::new("notify", id).with_setting("webhook_url", json!(url))
}

pub fn approval(id: &str, url: &str) -> ModuleSetting {
    ModuleSetting::new("approval", id).with_setting("webhook_url", json!(url))
}
