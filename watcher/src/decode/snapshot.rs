//! Deployment record decoding

use serde_json::Value;

use explorer_api::models::DeploymentRecord;

use crate::decode::variant::{is_tag, tag_of, try_dispatch, Handlers};
use crate::errors::DecodeError;
use crate::models::deployment::{
    DeploymentSnapshot, DeploymentStatus, IdentifierTree, PhaseStep, Timestamp, UnitRole,
};

type StatusResult = Result<DeploymentStatus, DecodeError>;

/// Record-level values some variants fall back to
struct RecordContext<'a> {
    created_at: Option<Timestamp>,
    canister_ids: &'a Value,
}

/// Decode a raw deployment record into a snapshot
pub fn decode_record(
    dao_id: &str,
    record: &DeploymentRecord,
) -> Result<DeploymentSnapshot, DecodeError> {
    let created_at = optional_timestamp(&record.created_at, "createdAt")?;
    let ctx = RecordContext {
        created_at,
        canister_ids: &record.canister_ids,
    };
    let status = decode_status(&record.status, &ctx, true)?;

    Ok(DeploymentSnapshot {
        dao_id: dao_id.to_string(),
        created_at,
        status,
    })
}

/// Decode a bare status variant.
///
/// Identifiers for `deployed` must then be carried in the payload's
/// `canisterIds`.
pub fn decode_status_value(value: &Value) -> Result<DeploymentStatus, DecodeError> {
    let ctx = RecordContext {
        created_at: None,
        canister_ids: &Value::Null,
    };
    decode_status(value, &ctx, true)
}

fn decode_status(
    value: &Value,
    ctx: &RecordContext<'_>,
    allow_failed: bool,
) -> StatusResult {
    if !allow_failed && is_tag(value, "failed") {
        return Err(DecodeError::NestedFailure);
    }

    let handlers = Handlers::new()
        .on("queued", |payload: &Value| -> StatusResult {
            let queued_at = match field(payload, "queuedAt") {
                Some(v) => Some(timestamp(v, "queuedAt")?),
                None => ctx.created_at,
            };
            Ok(DeploymentStatus::Queued {
                queued_at: queued_at.ok_or(DecodeError::MissingField("queuedAt"))?,
            })
        })
        .on("deploying", |payload: &Value| -> StatusResult {
            Ok(DeploymentStatus::Deploying {
                started_at: required_timestamp(payload, "startedAt")?,
                step: decode_step(required(payload, "step")?)?,
            })
        })
        .on("deployed", |payload: &Value| -> StatusResult {
            let identifiers: IdentifierTree = field(payload, "canisterIds")
                .unwrap_or(ctx.canister_ids)
                .clone();
            Ok(DeploymentStatus::Deployed {
                deployed_at: required_timestamp(payload, "deployedAt")?,
                identifiers,
            })
        })
        .on("failed", |payload: &Value| -> StatusResult {
            let error_message = required(payload, "errorMessage")?
                .as_str()
                .ok_or_else(|| DecodeError::InvalidField {
                    field: "errorMessage",
                    reason: "expected a string".to_string(),
                })?
                .to_string();
            let last_status = decode_status(required(payload, "lastStatus")?, ctx, false)?;
            Ok(DeploymentStatus::Failed {
                failed_at: required_timestamp(payload, "failedAt")?,
                error_message,
                last_status: Box::new(last_status),
            })
        });

    try_dispatch(value, &handlers)?
}

fn decode_step(value: &Value) -> Result<PhaseStep, DecodeError> {
    let handlers = Handlers::new()
        .on("creating_canister", |payload: &Value| {
            decode_role(payload).map(PhaseStep::CreatingUnit)
        })
        .on("installing_code", |payload: &Value| {
            decode_role(payload).map(PhaseStep::InstallingCode)
        });

    try_dispatch(value, &handlers)?
}

fn decode_role(value: &Value) -> Result<UnitRole, DecodeError> {
    let tag = tag_of(value).ok_or_else(|| DecodeError::NotAVariant(value.to_string()))?;
    UnitRole::from_tag(tag).ok_or_else(|| DecodeError::UnhandledTag(tag.to_string()))
}

fn field<'v>(payload: &'v Value, name: &str) -> Option<&'v Value> {
    payload.get(name).filter(|v| !v.is_null())
}

fn required<'v>(payload: &'v Value, name: &'static str) -> Result<&'v Value, DecodeError> {
    field(payload, name).ok_or(DecodeError::MissingField(name))
}

fn required_timestamp(payload: &Value, name: &'static str) -> Result<Timestamp, DecodeError> {
    timestamp(required(payload, name)?, name)
}

fn optional_timestamp(value: &Value, name: &'static str) -> Result<Option<Timestamp>, DecodeError> {
    if value.is_null() {
        return Ok(None);
    }
    timestamp(value, name).map(Some)
}

/// Timestamps are nanosecond integers; large values arrive as strings
fn timestamp(value: &Value, name: &'static str) -> Result<Timestamp, DecodeError> {
    let nanos = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    };
    nanos.map(Timestamp).ok_or_else(|| DecodeError::InvalidField {
        field: name,
        reason: format!("expected a nanosecond timestamp, got {value}"),
    })
}
