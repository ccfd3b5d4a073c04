use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Dimensions ---

/// The three named lookup tables a status event references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Status,
    Service,
    Source,
}

impl DimensionKind {
    pub const ALL: [DimensionKind; 3] = [Self::Status, Self::Service, Self::Source];

    pub fn table(&self) -> &'static str {
        match self {
            Self::Status => "statuses",
            Self::Service => "services",
            Self::Source => "sources",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Service => "service",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from `statuses`, `services` or `sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DimensionRow {
    pub id: i64,
    pub name: String,
}

// --- Payloads ---

/// The mutable, mergeable columns of a payload.
///
/// `None` and `Some("")` both mean "not supplied": an upsert never clears a
/// stored value with an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFields {
    pub account: Option<String>,
    pub org_id: Option<String>,
    pub inventory_id: Option<String>,
    pub system_id: Option<String>,
}

impl PayloadFields {
    /// Columns carrying a non-empty value, in table order.
    pub fn supplied(&self) -> Vec<(&'static str, &str)> {
        [
            ("account", &self.account),
            ("org_id", &self.org_id),
            ("inventory_id", &self.inventory_id),
            ("system_id", &self.system_id),
        ]
        .into_iter()
        .filter_map(|(column, value)| non_empty(value).map(|v| (column, v)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.supplied().is_empty()
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_inventory_id(mut self, inventory_id: impl Into<String>) -> Self {
        self.inventory_id = Some(inventory_id.into());
        self
    }

    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }
}

/// A stored payload row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payload {
    pub id: i64,
    pub request_id: String,
    pub account: Option<String>,
    pub org_id: Option<String>,
    pub inventory_id: Option<String>,
    pub system_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payload {
    pub fn fields(&self) -> PayloadFields {
        PayloadFields {
            account: self.account.clone(),
            org_id: self.org_id.clone(),
            inventory_id: self.inventory_id.clone(),
            system_id: self.system_id.clone(),
        }
    }
}

/// A payload to insert as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayload {
    pub request_id: String,
    pub fields: PayloadFields,
}

impl NewPayload {
    pub fn new(request_id: impl Into<String>, fields: PayloadFields) -> Self {
        Self {
            request_id: request_id.into(),
            fields,
        }
    }
}

// --- Status events ---

/// A status transition to append to `payload_statuses`.
///
/// `source_id` is `None` when the event named no source or the source could not
/// be resolved; the column is then left out of the insert entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayloadStatus {
    pub payload_id: i64,
    pub status_id: i64,
    pub service_id: i64,
    pub source_id: Option<i64>,
    pub status_msg: Option<String>,
    pub date: DateTime<Utc>,
    /// Denormalized payload columns as seen at event time.
    pub fields: PayloadFields,
}

/// A stored status event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PayloadStatus {
    pub id: i64,
    pub payload_id: i64,
    pub status_id: i64,
    pub service_id: i64,
    pub source_id: Option<i64>,
    pub status_msg: Option<String>,
    pub date: DateTime<Utc>,
    pub account: Option<String>,
    pub org_id: Option<String>,
    pub inventory_id: Option<String>,
    pub system_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supplied_skips_missing_and_empty_columns() {
        let fields = PayloadFields {
            account: Some("acct".into()),
            org_id: Some(String::new()),
            inventory_id: None,
            system_id: Some("sys".into()),
        };

        assert_eq!(
            fields.supplied(),
            vec![("account", "acct"), ("system_id", "sys")]
        );
    }

    #[test]
    fn empty_strings_count_as_empty() {
        let fields = PayloadFields::default().with_account("");
        assert!(fields.is_empty());
    }

    #[test]
    fn dimension_tables() {
        assert_eq!(DimensionKind::Status.table(), "statuses");
        assert_eq!(DimensionKind::Service.table(), "services");
        assert_eq!(DimensionKind::Source.table(), "sources");
    }
}
