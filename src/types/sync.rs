//! Wire types for the push/pull sync protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Entity kinds that participate in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    PreOrder,
    PreOrderFlow,
}

impl EntityType {
    /// Discriminator string stored in the operation log.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::PreOrder => "pre_order",
            EntityType::PreOrderFlow => "pre_order_flow",
        }
    }

    /// Human-readable name used in result messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            EntityType::PreOrder => "PreOrder",
            EntityType::PreOrderFlow => "PreOrderFlow",
        }
    }
}

/// Mutation kinds recorded in the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "CREATE",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
        }
    }
}

/// Per-operation outcome reported back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushResultStatus {
    Success,
    Conflict,
    Error,
}

/// Which side a field-level LWW resolution favored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictWinner {
    Client,
    Server,
}

/// One operation in a client push batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushOperationRequest {
    /// Client-chosen id used to correlate the result.
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation_type: OperationType,
    /// CREATE: full record; UPDATE: changed fields only; DELETE: empty.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Version the client believed it was editing; absent skips the
    /// optimistic check.
    #[serde(default)]
    pub expected_version: Option<i64>,
    /// Client wall-clock time of the mutation, ISO-8601.
    pub timestamp: String,
}

/// Push request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub operations: Vec<PushOperationRequest>,
}

/// A field conflict resolved via last-writer-wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFieldConflict {
    pub field: String,
    pub client_value: Value,
    pub server_value: Value,
    pub winner: ConflictWinner,
}

/// Result of a single push operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushOperationResult {
    pub operation_id: String,
    pub status: PushResultStatus,
    pub sync_id: Option<i64>,
    pub new_version: Option<i64>,
    pub message: Option<String>,
    pub conflicts: Option<Vec<ResolvedFieldConflict>>,
}

impl PushOperationResult {
    /// Error result with a diagnostic message.
    pub fn error(operation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            status: PushResultStatus::Error,
            sync_id: None,
            new_version: None,
            message: Some(message.into()),
            conflicts: None,
        }
    }
}

/// Push response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub results: Vec<PushOperationResult>,
}

/// One row of the operation log, as served to pulling clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub sync_id: i64,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub operation_type: String,
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Pull response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub operations: Vec<LogEntry>,
    pub has_more: bool,
}

/// Post-commit change notification fanned out to stream subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub sync_id: i64,
}

impl ChangeEvent {
    pub fn entity_changed(entity_type: EntityType, entity_id: Uuid, sync_id: i64) -> Self {
        Self {
            event: "entity_changed".to_string(),
            entity_type,
            entity_id: entity_id.to_string(),
            sync_id,
        }
    }
}
