//! Inbound payload-status messages.
//!
//! Producers publish one JSON object per status transition. The raw shape is
//! permissive; [`StatusMessage::into_update`] trims, normalizes and validates
//! it into a [`StatusUpdate`] the write path can trust.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::types::PayloadFields;

/// A status message as it appears on the topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusMessage {
    pub service: Option<String>,
    pub source: Option<String>,
    pub account: Option<String>,
    pub org_id: Option<String>,
    pub request_id: Option<String>,
    pub inventory_id: Option<String>,
    pub system_id: Option<String>,
    pub status: Option<String>,
    pub status_msg: Option<String>,
    pub date: Option<String>,
}

/// A sanitized, validated status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub request_id: String,
    pub status: String,
    pub service: String,
    pub source: Option<String>,
    pub status_msg: Option<String>,
    pub date: DateTime<Utc>,
    pub fields: PayloadFields,
}

impl StatusMessage {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| TrackerError::InvalidMessage(format!("undecodable JSON: {e}")))
    }

    pub fn into_update(self) -> Result<StatusUpdate> {
        let request_id = trimmed(self.request_id)
            .ok_or_else(|| TrackerError::InvalidMessage("missing request_id".into()))?;
        let status = dimension_name(self.status)
            .ok_or_else(|| TrackerError::InvalidMessage("missing status".into()))?;
        let service = dimension_name(self.service)
            .ok_or_else(|| TrackerError::InvalidMessage("missing service".into()))?;
        let raw_date = trimmed(self.date)
            .ok_or_else(|| TrackerError::InvalidMessage("missing date".into()))?;
        let date = parse_date(&raw_date)?;

        Ok(StatusUpdate {
            request_id,
            status,
            service,
            source: dimension_name(self.source),
            status_msg: trimmed(self.status_msg),
            date,
            fields: PayloadFields {
                account: trimmed(self.account),
                org_id: trimmed(self.org_id),
                inventory_id: trimmed(self.inventory_id),
                system_id: trimmed(self.system_id),
            },
        })
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Dimension names are case-insensitive on the wire.
fn dimension_name(value: Option<String>) -> Option<String> {
    trimmed(value).map(|v| v.to_lowercase())
}

/// RFC 3339, or an ISO 8601 timestamp without offset (taken as UTC).
fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| TrackerError::InvalidMessage(format!("unparseable date {raw:?}")))
}
