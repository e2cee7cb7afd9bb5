use crate::actions::registry::ActionInfo;
use crate::actions::{ActionRegistry, Decision};
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::filters::registry::FilterInfo;
use crate::filters::FilterRegistry;
use crate::metrics::UPTIME_SECONDS;
use crate::models::{ActionState, FilterResult, Item, PredictedClass};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let uptime_seconds = state.started_at.elapsed().as_secs();
    UPTIME_SECONDS.set(uptime_seconds as f64);

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Prometheus metrics endpoint
///
/// Returns metrics in Prometheus text exposition format
pub async fn metrics() -> (StatusCode, String) {
    (StatusCode::OK, crate::metrics::gather_metrics())
}

pub async fn list_filter_modules() -> Json<Vec<FilterInfo>> {
    Json(FilterRegistry::describe())
}

pub async fn list_action_modules() -> Json<Vec<ActionInfo>> {
    Json(ActionRegistry::describe())
}

/// Path of a single item within a topic
#[derive(Debug, Deserialize)]
pub struct ItemPath {
    pub topic_id: Uuid,
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Get an item's pipeline record
pub async fn get_item(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
) -> Result<Json<ItemResponse>> {
    let topic = state.service.get_topic(&path.topic_id).await?;
    let item = state.service.get_item(&path.topic_id, &path.item_id).await?;
    Ok(Json(ItemResponse::from_item(item, topic.num_actions())))
}

/// Accept link: completes the action the token is bound to
pub async fn accept_item(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<DecisionResponse>> {
    decide(state, path, query, Decision::Accept).await
}

/// Reject link: freezes the chain at the action the token is bound to
pub async fn reject_item(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<DecisionResponse>> {
    decide(state, path, query, Decision::Reject).await
}

async fn decide(
    state: AppState,
    path: ItemPath,
    query: TokenQuery,
    decision: Decision,
) -> Result<Json<DecisionResponse>> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::InvalidToken("missing token".to_string()))?;

    let item = state
        .service
        .apply_decision(&path.topic_id, &path.item_id, &token, decision)
        .await?;

    Ok(Json(DecisionResponse {
        item_id: item.id_str,
        decision,
        complete_action_index: item.complete_action_index,
        last_action_index: item.last_action_index,
        last_action_error: item.last_action_error,
        rejected_action_index: item.rejected_action_index,
    }))
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub item_id: String,
    pub decision: Decision,
    pub complete_action_index: i32,
    pub last_action_index: i32,
    pub last_action_error: Option<String>,
    pub rejected_action_index: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub id_str: String,
    pub topic_id: Uuid,
    pub text: String,
    pub predicted_class: PredictedClass,
    pub filters_result: Vec<FilterResult>,
    pub complete_action_index: i32,
    pub last_action_index: i32,
    pub last_action_executed_at: Option<DateTime<Utc>>,
    pub last_action_error: Option<String>,
    pub rejected_action_index: Option<i32>,
    pub classification_error: Option<String>,
    pub action_state: ActionState,
}

impl ItemResponse {
    fn from_item(item: Item, num_actions: usize) -> Self {
        let action_state = item.action_state(num_actions);
        Self {
            id_str: item.id_str,
            topic_id: item.topic_id,
            text: item.text,
            predicted_class: item.predicted_class,
            filters_result: item.filters_result,
            complete_action_index: item.complete_action_index,
            last_action_index: item.last_action_index,
            last_action_executed_at: item.last_action_executed_at,
            last_action_error: item.last_action_error,
            rejected_action_index: item.rejected_action_index,
            classification_error: item.classification_error,
            action_state,
        }
    }
}
