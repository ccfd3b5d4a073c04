//! Postgres storage for payloads, status events and dimension rows.
//!
//! Tables: `payloads` (unique `request_id`), `statuses` / `services` /
//! `sources` (unique `name`), and `payload_statuses` with foreign keys to all
//! four. Schema migrations are owned by the deployment, not this crate.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use tracker_common::{
    non_empty, DimensionKind, DimensionRow, NewPayload, NewPayloadStatus, Payload, PayloadFields,
    PayloadStatus, Result, TrackerError,
};

use crate::store::{DimensionStore, PayloadWriter};

const PAYLOAD_COLUMNS: &str = "id, request_id, account, org_id, inventory_id, system_id, created_at";

const STATUS_COLUMNS: &str = "id, payload_id, status_id, service_id, source_id, status_msg, date, \
     account, org_id, inventory_id, system_id, created_at";

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn payload_by_request_id(&self, request_id: &str) -> Result<Option<Payload>> {
        let row = sqlx::query_as::<_, Payload>(&format!(
            "SELECT {PAYLOAD_COLUMNS} FROM payloads WHERE request_id = $1"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// All status events for a payload, oldest first.
    pub async fn statuses_for_payload(&self, payload_id: i64) -> Result<Vec<PayloadStatus>> {
        let rows = sqlx::query_as::<_, PayloadStatus>(&format!(
            "SELECT {STATUS_COLUMNS} FROM payload_statuses WHERE payload_id = $1 ORDER BY date ASC, id ASC"
        ))
        .bind(payload_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// DimensionStore
// ---------------------------------------------------------------------------

#[async_trait]
impl DimensionStore for PgStore {
    async fn find_by_name(&self, kind: DimensionKind, name: &str) -> Result<Option<DimensionRow>> {
        let row = sqlx::query_as::<_, DimensionRow>(&format!(
            "SELECT id, name FROM {} WHERE name = $1",
            kind.table()
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert(&self, kind: DimensionKind, name: &str) -> Result<DimensionRow> {
        let inserted = sqlx::query_as::<_, DimensionRow>(&format!(
            "INSERT INTO {} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id, name",
            kind.table()
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(row);
        }

        // Lost a race with another writer; their row is as good as ours.
        debug!(kind = %kind, name, "Dimension already exists, reusing");
        self.find_by_name(kind, name)
            .await?
            .ok_or(TrackerError::Database(sqlx::Error::RowNotFound))
    }
}

// ---------------------------------------------------------------------------
// PayloadWriter
// ---------------------------------------------------------------------------

#[async_trait]
impl PayloadWriter for PgStore {
    async fn upsert_payload(&self, request_id: &str, fields: &PayloadFields) -> Result<i64> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO payloads (request_id, account, org_id, inventory_id, system_id) VALUES (",
        );
        qb.push_bind(request_id)
            .push(", ")
            .push_bind(non_empty(&fields.account))
            .push(", ")
            .push_bind(non_empty(&fields.org_id))
            .push(", ")
            .push_bind(non_empty(&fields.inventory_id))
            .push(", ")
            .push_bind(non_empty(&fields.system_id))
            .push(") ON CONFLICT (request_id) DO UPDATE SET request_id = EXCLUDED.request_id");

        // Column names come from PayloadFields::supplied, never from input.
        for (column, _) in fields.supplied() {
            qb.push(format!(", {column} = EXCLUDED.{column}"));
        }
        qb.push(" RETURNING id");

        let (id,): (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(id)
    }

    async fn update_payload(&self, payload_id: i64, updates: &PayloadFields) -> Result<u64> {
        let supplied = updates.supplied();
        if supplied.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE payloads SET ");
        {
            let mut set = qb.separated(", ");
            for (column, value) in supplied {
                set.push(format!("{column} = "));
                set.push_bind_unseparated(value);
            }
        }
        qb.push(" WHERE id = ").push_bind(payload_id);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn create_payload(&self, payload: &NewPayload) -> Result<Payload> {
        let row = sqlx::query_as::<_, Payload>(&format!(
            r#"
            INSERT INTO payloads (request_id, account, org_id, inventory_id, system_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PAYLOAD_COLUMNS}
            "#
        ))
        .bind(&payload.request_id)
        .bind(non_empty(&payload.fields.account))
        .bind(non_empty(&payload.fields.org_id))
        .bind(non_empty(&payload.fields.inventory_id))
        .bind(non_empty(&payload.fields.system_id))
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn create_dimension(&self, kind: DimensionKind, name: &str) -> Result<DimensionRow> {
        DimensionStore::insert(self, kind, name).await
    }

    async fn insert_payload_status(&self, event: &NewPayloadStatus) -> Result<i64> {
        let fields = &event.fields;

        let (id,): (i64,) = match event.source_id {
            Some(source_id) => {
                sqlx::query_as::<_, (i64,)>(
                    r#"
                    INSERT INTO payload_statuses
                        (payload_id, status_id, service_id, source_id, status_msg, date,
                         account, org_id, inventory_id, system_id)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    RETURNING id
                    "#,
                )
                .bind(event.payload_id)
                .bind(event.status_id)
                .bind(event.service_id)
                .bind(source_id)
                .bind(&event.status_msg)
                .bind(event.date)
                .bind(non_empty(&fields.account))
                .bind(non_empty(&fields.org_id))
                .bind(non_empty(&fields.inventory_id))
                .bind(non_empty(&fields.system_id))
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, (i64,)>(
                    r#"
                    INSERT INTO payload_statuses
                        (payload_id, status_id, service_id, status_msg, date,
                         account, org_id, inventory_id, system_id)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING id
                    "#,
                )
                .bind(event.payload_id)
                .bind(event.status_id)
                .bind(event.service_id)
                .bind(&event.status_msg)
                .bind(event.date)
                .bind(non_empty(&fields.account))
                .bind(non_empty(&fields.org_id))
                .bind(non_empty(&fields.inventory_id))
                .bind(non_empty(&fields.system_id))
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(id)
    }
}
