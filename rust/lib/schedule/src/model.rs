//! Wire-compatible board types.
//!
//! Field names are camelCase on the wire (`workCenterId`, `workOrderNo`),
//! timestamps are RFC 3339 strings.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ModelError;

// ── WorkCenter ──────────────────────────────────────────────────────

/// A resource row on the board (a machine, a line, a QC station).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkCenter {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl WorkCenter {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
        }
    }
}

// ── OperationStatus ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Planned,
    InProgress,
    Paused,
    Completed,
    Canceled,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Planned => "planned",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Paused => "paused",
            OperationStatus::Completed => "completed",
            OperationStatus::Canceled => "canceled",
        }
    }
}

/// Servers send `"status": null` for operations that were never started.
fn status_or_planned<'de, D>(deserializer: D) -> Result<OperationStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<OperationStatus>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Operation ───────────────────────────────────────────────────────

/// A scheduled span of work for one work order on one work center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    #[serde(default, alias = "workOrderNumber")]
    pub work_order_no: String,
    pub work_center_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, deserialize_with = "status_or_planned")]
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Operation {
    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms() - self.start_ms()
    }

    /// Overwrite the fields present in `patch`. Returns true if anything changed.
    ///
    /// Pure field overwrite: applying the same patch twice is the same as
    /// applying it once.
    pub fn apply(&mut self, patch: &OperationPatch) -> bool {
        let mut changed = false;
        if let Some(start) = patch.start {
            changed |= self.start != start;
            self.start = start;
        }
        if let Some(end) = patch.end {
            changed |= self.end != end;
            self.end = end;
        }
        if let Some(ref wc) = patch.work_center_id {
            changed |= &self.work_center_id != wc;
            self.work_center_id = wc.clone();
        }
        if let Some(status) = patch.status {
            changed |= self.status != status;
            self.status = status;
        }
        changed
    }
}

// ── OperationPatch ──────────────────────────────────────────────────

/// Partial operation update.
///
/// Used for live deltas, local gesture commits, and server reconciliation.
/// Absent fields mean "keep the current value".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_center_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OperationStatus>,
}

impl OperationPatch {
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.work_center_id.is_none()
            && self.status.is_none()
    }

    /// Every mutable field of `op`, used to re-apply a server-returned
    /// operation on top of an optimistic value.
    pub fn from_operation(op: &Operation) -> Self {
        Self {
            start: Some(op.start),
            end: Some(op.end),
            work_center_id: Some(op.work_center_id.clone()),
            status: Some(op.status),
        }
    }

    /// The client never writes status; strip it before sending an update.
    pub fn without_status(&self) -> Self {
        Self {
            status: None,
            ..self.clone()
        }
    }
}

// ── Board ───────────────────────────────────────────────────────────

/// One planning view: ordered work-center rows plus their operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub work_centers: Vec<WorkCenter>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl Board {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            work_centers: Vec::new(),
            operations: Vec::new(),
        }
    }

    pub fn operation(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.id == id)
    }

    /// Collect consistency problems. An empty result means the board is clean.
    pub fn validate(&self) -> Vec<ModelError> {
        let mut problems = Vec::new();

        let mut wc_ids = HashSet::new();
        for wc in &self.work_centers {
            if !wc_ids.insert(wc.id.as_str()) {
                problems.push(ModelError::DuplicateWorkCenter(wc.id.clone()));
            }
        }

        let mut op_ids = HashSet::new();
        for op in &self.operations {
            if !op_ids.insert(op.id.as_str()) {
                problems.push(ModelError::DuplicateOperation(op.id.clone()));
            }
            if !wc_ids.contains(op.work_center_id.as_str()) {
                problems.push(ModelError::UnknownWorkCenter {
                    operation_id: op.id.clone(),
                    work_center_id: op.work_center_id.clone(),
                });
            }
            if op.end <= op.start {
                problems.push(ModelError::NonPositiveDuration(op.id.clone()));
            }
            if op.quantity.is_some_and(|q| q < 0.0) {
                problems.push(ModelError::NegativeQuantity(op.id.clone()));
            }
        }

        problems
    }
}
