use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::credentials::is_encrypted;
use crate::provider::detect_pattern;
use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary; never echoes credentials.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "thinkgate is running",
        "config": {
            "upstream": {
                "name": config.upstream.name,
                "base_url": config.upstream.base_url,
                "api_key_encrypted": is_encrypted(&config.upstream.api_key),
                "reasoning_pattern": format!("{:?}", detect_pattern(&config.upstream.base_url)),
                "reasoning_models_count": config.upstream.reasoning_models.len(),
            },
            "features": {
                "log_level": config.features.log_level,
                "reasoning_effort": config.features.reasoning_effort,
            }
        }
    }))
}
