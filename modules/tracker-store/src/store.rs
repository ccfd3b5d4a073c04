//! Storage traits.

use async_trait::async_trait;
use tracker_common::{
    DimensionKind, DimensionRow, NewPayload, NewPayloadStatus, Payload, PayloadFields, Result,
};

/// Named dimension rows (`statuses`, `services`, `sources`).
#[async_trait]
pub trait DimensionStore: Send + Sync {
    /// Look a row up by its unique name. A miss is `Ok(None)`, not an error.
    async fn find_by_name(&self, kind: DimensionKind, name: &str) -> Result<Option<DimensionRow>>;

    /// Insert a new row. If another writer created the same name first, the
    /// existing row is returned instead of failing.
    async fn insert(&self, kind: DimensionKind, name: &str) -> Result<DimensionRow>;
}

/// The payload write path. Every method is one store statement; nothing here
/// wraps calls in a transaction.
#[async_trait]
pub trait PayloadWriter: Send + Sync {
    /// Insert the payload, or merge into the row with the same `request_id`.
    ///
    /// On conflict only non-empty incoming columns are written, so a stored
    /// value is never cleared. Returns the row id, new or existing.
    async fn upsert_payload(&self, request_id: &str, fields: &PayloadFields) -> Result<i64>;

    /// Update the supplied columns of an existing payload. `request_id` and
    /// `id` are never touched. Returns the number of rows changed.
    async fn update_payload(&self, payload_id: i64, updates: &PayloadFields) -> Result<u64>;

    /// Plain insert. Fails if the request id already exists.
    async fn create_payload(&self, payload: &NewPayload) -> Result<Payload>;

    /// Plain insert of a dimension row; a duplicate name is benign.
    async fn create_dimension(&self, kind: DimensionKind, name: &str) -> Result<DimensionRow>;

    async fn create_status(&self, name: &str) -> Result<DimensionRow> {
        self.create_dimension(DimensionKind::Status, name).await
    }

    async fn create_service(&self, name: &str) -> Result<DimensionRow> {
        self.create_dimension(DimensionKind::Service, name).await
    }

    async fn create_source(&self, name: &str) -> Result<DimensionRow> {
        self.create_dimension(DimensionKind::Source, name).await
    }

    /// Append a status event. With no `source_id` the column is left out of
    /// the statement. Returns the new row id.
    async fn insert_payload_status(&self, event: &NewPayloadStatus) -> Result<i64>;
}
