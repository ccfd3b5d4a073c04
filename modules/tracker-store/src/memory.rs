//! In-memory DimensionStore and PayloadWriter for tests.
//!
//! Mirrors the Postgres constraints that matter to callers: unique request ids,
//! unique dimension names, and foreign keys from status events. Also counts
//! name lookups so cache behavior can be asserted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracker_common::{
    non_empty, DimensionKind, DimensionRow, NewPayload, NewPayloadStatus, Payload, PayloadFields,
    PayloadStatus, Result, TrackerError,
};

use crate::store::{DimensionStore, PayloadWriter};

#[derive(Default)]
struct State {
    next_id: i64,
    payloads: Vec<Payload>,
    statuses: Vec<PayloadStatus>,
    dimensions: HashMap<DimensionKind, Vec<DimensionRow>>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn dimension_exists(&self, kind: DimensionKind, id: i64) -> bool {
        self.dimensions
            .get(&kind)
            .is_some_and(|rows| rows.iter().any(|row| row.id == id))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    lookups: [AtomicUsize; 3],
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_by_name` calls for `kind` so far.
    pub fn lookups(&self, kind: DimensionKind) -> usize {
        self.lookups[slot(kind)].load(Ordering::SeqCst)
    }

    /// While set, every operation fails as if the database were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Seed a dimension row directly, bypassing the lookup counters.
    pub fn seed(&self, kind: DimensionKind, name: &str) -> DimensionRow {
        insert_dimension(&mut self.lock(), kind, name)
    }

    pub fn payloads(&self) -> Vec<Payload> {
        self.lock().payloads.clone()
    }

    pub fn payload_by_request_id(&self, request_id: &str) -> Option<Payload> {
        self.lock()
            .payloads
            .iter()
            .find(|p| p.request_id == request_id)
            .cloned()
    }

    pub fn statuses(&self) -> Vec<PayloadStatus> {
        self.lock().statuses.clone()
    }

    pub fn dimensions(&self, kind: DimensionKind) -> Vec<DimensionRow> {
        self.lock().dimensions.get(&kind).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TrackerError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

fn slot(kind: DimensionKind) -> usize {
    match kind {
        DimensionKind::Status => 0,
        DimensionKind::Service => 1,
        DimensionKind::Source => 2,
    }
}

fn insert_dimension(state: &mut State, kind: DimensionKind, name: &str) -> DimensionRow {
    if let Some(existing) = state
        .dimensions
        .get(&kind)
        .and_then(|rows| rows.iter().find(|row| row.name == name))
    {
        return existing.clone();
    }
    let row = DimensionRow {
        id: state.next_id(),
        name: name.to_string(),
    };
    state.dimensions.entry(kind).or_default().push(row.clone());
    row
}

fn merge(target: &mut Payload, fields: &PayloadFields) {
    for (column, value) in fields.supplied() {
        let cell = match column {
            "account" => &mut target.account,
            "org_id" => &mut target.org_id,
            "inventory_id" => &mut target.inventory_id,
            _ => &mut target.system_id,
        };
        *cell = Some(value.to_string());
    }
}

fn owned(value: &Option<String>) -> Option<String> {
    non_empty(value).map(str::to_string)
}

fn constraint_violation(message: String) -> TrackerError {
    TrackerError::Database(sqlx::Error::Protocol(message))
}

#[async_trait]
impl DimensionStore for MemoryStore {
    async fn find_by_name(&self, kind: DimensionKind, name: &str) -> Result<Option<DimensionRow>> {
        self.lookups[slot(kind)].fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        Ok(self
            .lock()
            .dimensions
            .get(&kind)
            .and_then(|rows| rows.iter().find(|row| row.name == name))
            .cloned())
    }

    async fn insert(&self, kind: DimensionKind, name: &str) -> Result<DimensionRow> {
        self.check_available()?;
        Ok(insert_dimension(&mut self.lock(), kind, name))
    }
}

#[async_trait]
impl PayloadWriter for MemoryStore {
    async fn upsert_payload(&self, request_id: &str, fields: &PayloadFields) -> Result<i64> {
        self.check_available()?;
        let mut state = self.lock();

        if let Some(existing) = state
            .payloads
            .iter_mut()
            .find(|p| p.request_id == request_id)
        {
            merge(existing, fields);
            return Ok(existing.id);
        }

        let id = state.next_id();
        state.payloads.push(Payload {
            id,
            request_id: request_id.to_string(),
            account: owned(&fields.account),
            org_id: owned(&fields.org_id),
            inventory_id: owned(&fields.inventory_id),
            system_id: owned(&fields.system_id),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update_payload(&self, payload_id: i64, updates: &PayloadFields) -> Result<u64> {
        self.check_available()?;
        if updates.is_empty() {
            return Ok(0);
        }

        let mut state = self.lock();
        match state.payloads.iter_mut().find(|p| p.id == payload_id) {
            Some(payload) => {
                merge(payload, updates);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn create_payload(&self, payload: &NewPayload) -> Result<Payload> {
        self.check_available()?;
        let mut state = self.lock();

        if state
            .payloads
            .iter()
            .any(|p| p.request_id == payload.request_id)
        {
            return Err(constraint_violation(format!(
                "duplicate request_id {}",
                payload.request_id
            )));
        }

        let row = Payload {
            id: state.next_id(),
            request_id: payload.request_id.clone(),
            account: owned(&payload.fields.account),
            org_id: owned(&payload.fields.org_id),
            inventory_id: owned(&payload.fields.inventory_id),
            system_id: owned(&payload.fields.system_id),
            created_at: Utc::now(),
        };
        state.payloads.push(row.clone());
        Ok(row)
    }

    async fn create_dimension(&self, kind: DimensionKind, name: &str) -> Result<DimensionRow> {
        DimensionStore::insert(self, kind, name).await
    }

    async fn insert_payload_status(&self, event: &NewPayloadStatus) -> Result<i64> {
        self.check_available()?;
        let mut state = self.lock();

        if !state.payloads.iter().any(|p| p.id == event.payload_id) {
            return Err(constraint_violation(format!(
                "payload {} does not exist",
                event.payload_id
            )));
        }
        let references = [
            (DimensionKind::Status, Some(event.status_id)),
            (DimensionKind::Service, Some(event.service_id)),
            (DimensionKind::Source, event.source_id),
        ];
        for (kind, id) in references {
            if let Some(id) = id {
                if !state.dimension_exists(kind, id) {
                    return Err(constraint_violation(format!("{kind} {id} does not exist")));
                }
            }
        }

        let id = state.next_id();
        state.statuses.push(PayloadStatus {
            id,
            payload_id: event.payload_id,
            status_id: event.status_id,
            service_id: event.service_id,
            source_id: event.source_id,
            status_msg: event.status_msg.clone(),
            date: event.date,
            account: owned(&event.fields.account),
            org_id: owned(&event.fields.org_id),
            inventory_id: owned(&event.fields.inventory_id),
            system_id: owned(&event.fields.system_id),
            created_at: Utc::now(),
        });
        Ok(id)
    }
}
