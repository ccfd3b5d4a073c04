//! Status message → database rows.

use std::sync::Arc;

use tracing::{debug, info};
use tracker_common::{
    DimensionKind, DimensionRow, NewPayloadStatus, Result, StatusMessage, StatusUpdate,
};
use tracker_store::{DimensionResolver, PayloadWriter};

/// Ids written for one status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    pub payload_id: i64,
    pub status_event_id: i64,
}

pub struct MessageHandler {
    resolver: Arc<dyn DimensionResolver>,
    writer: Arc<dyn PayloadWriter>,
}

impl MessageHandler {
    pub fn new(writer: Arc<dyn PayloadWriter>, resolver: Arc<dyn DimensionResolver>) -> Self {
        Self { resolver, writer }
    }

    /// Decode, validate and record one raw message.
    pub async fn on_message(&self, payload: &[u8]) -> Result<Recorded> {
        let update = StatusMessage::from_slice(payload)?.into_update()?;
        self.record(&update).await
    }

    /// Resolve the update's dimensions, merge the payload and append the
    /// status event. Not transactional: a failure part-way leaves earlier
    /// writes in place, and a redelivery converges on the same rows.
    pub async fn record(&self, update: &StatusUpdate) -> Result<Recorded> {
        let status = self.dimension(DimensionKind::Status, &update.status).await?;
        let service = self
            .dimension(DimensionKind::Service, &update.service)
            .await?;
        let source = match &update.source {
            Some(name) => Some(self.dimension(DimensionKind::Source, name).await?),
            None => None,
        };

        let payload_id = self
            .writer
            .upsert_payload(&update.request_id, &update.fields)
            .await?;

        let status_event_id = self
            .writer
            .insert_payload_status(&NewPayloadStatus {
                payload_id,
                status_id: status.id,
                service_id: service.id,
                source_id: source.map(|s| s.id),
                status_msg: update.status_msg.clone(),
                date: update.date,
                fields: update.fields.clone(),
            })
            .await?;

        debug!(
            request_id = update.request_id.as_str(),
            status = update.status.as_str(),
            service = update.service.as_str(),
            payload_id,
            "Recorded payload status"
        );

        Ok(Recorded {
            payload_id,
            status_event_id,
        })
    }

    /// Resolve a name, creating the row the first time it is seen.
    async fn dimension(&self, kind: DimensionKind, name: &str) -> Result<DimensionRow> {
        if let Some(row) = self.resolver.resolve(kind, name).await? {
            return Ok(row);
        }
        info!(kind = %kind, name, "New dimension name, creating");
        let row = self.writer.create_dimension(kind, name).await?;
        self.resolver.remember(kind, &row);
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tracker_common::{
        DimensionKind, NewPayload, Payload, PayloadFields, ResolverKind, TrackerError,
    };
    use tracker_store::{build_resolver, CachedLookup, DirectLookup, MemoryStore};

    /// Counts dimension creates on the way through to a [`MemoryStore`].
    struct CountingWriter {
        store: Arc<MemoryStore>,
        creates: AtomicUsize,
    }

    #[async_trait]
    impl PayloadWriter for CountingWriter {
        async fn upsert_payload(&self, request_id: &str, fields: &PayloadFields) -> Result<i64> {
            self.store.upsert_payload(request_id, fields).await
        }

        async fn update_payload(&self, payload_id: i64, updates: &PayloadFields) -> Result<u64> {
            self.store.update_payload(payload_id, updates).await
        }

        async fn create_payload(&self, payload: &NewPayload) -> Result<Payload> {
            self.store.create_payload(payload).await
        }

        async fn create_dimension(&self, kind: DimensionKind, name: &str) -> Result<DimensionRow> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.store.create_dimension(kind, name).await
        }

        async fn insert_payload_status(&self, event: &NewPayloadStatus) -> Result<i64> {
            self.store.insert_payload_status(event).await
        }
    }

    fn handler(store: &Arc<MemoryStore>) -> MessageHandler {
        let resolver = Arc::new(CachedLookup::new(Arc::new(DirectLookup::new(store.clone()))));
        MessageHandler::new(store.clone(), resolver)
    }

    const RECEIVED: &[u8] = br#"{
        "service": "ingress",
        "account": "000001",
        "org_id": "1234",
        "request_id": "req-1",
        "status": "received",
        "date": "2024-03-01T12:00:00Z"
    }"#;

    #[tokio::test]
    async fn first_sighting_creates_dimensions_and_payload() {
        let store = Arc::new(MemoryStore::new());

        let recorded = handler(&store).on_message(RECEIVED).await.unwrap();

        let payload = store.payload_by_request_id("req-1").unwrap();
        assert_eq!(payload.id, recorded.payload_id);
        assert_eq!(payload.account.as_deref(), Some("000001"));
        assert_eq!(store.dimensions(DimensionKind::Status).len(), 1);
        assert_eq!(store.dimensions(DimensionKind::Service).len(), 1);
        assert!(store.dimensions(DimensionKind::Source).is_empty());

        let statuses = store.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].source_id, None);
        assert_eq!(statuses[0].org_id.as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn later_event_merges_into_existing_payload() {
        let store = Arc::new(MemoryStore::new());
        let handler = handler(&store);

        handler.on_message(RECEIVED).await.unwrap();
        handler
            .on_message(
                br#"{"service":"puptoo","source":"Satellite","request_id":"req-1",
                     "inventory_id":"inv-9","account":"","status":"processing",
                     "date":"2024-03-01T12:00:05Z"}"#,
            )
            .await
            .unwrap();

        let payloads = store.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].account.as_deref(), Some("000001"));
        assert_eq!(payloads[0].inventory_id.as_deref(), Some("inv-9"));

        let source = &store.dimensions(DimensionKind::Source)[0];
        assert_eq!(source.name, "satellite");
        let statuses = store.statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[1].source_id, Some(source.id));
    }

    #[tokio::test]
    async fn known_dimensions_are_reused() {
        let store = Arc::new(MemoryStore::new());
        let received = store.seed(DimensionKind::Status, "received");
        let ingress = store.seed(DimensionKind::Service, "ingress");

        handler(&store).on_message(RECEIVED).await.unwrap();

        let statuses = store.statuses();
        assert_eq!(statuses[0].status_id, received.id);
        assert_eq!(statuses[0].service_id, ingress.id);
        assert_eq!(store.dimensions(DimensionKind::Status), vec![received]);
    }

    #[tokio::test]
    async fn cached_resolver_creates_each_new_name_once() {
        let store = Arc::new(MemoryStore::new());
        let writer = Arc::new(CountingWriter {
            store: store.clone(),
            creates: AtomicUsize::new(0),
        });
        let handler = MessageHandler::new(
            writer.clone(),
            build_resolver(ResolverKind::Cached, store.clone()),
        );

        for i in 0..10 {
            let body = format!(
                r#"{{"service":"ingress","request_id":"req-{i}","status":"received",
                    "date":"2024-03-01T12:00:00Z"}}"#
            );
            handler.on_message(body.as_bytes()).await.unwrap();
        }

        assert_eq!(writer.creates.load(Ordering::SeqCst), 2);
        assert_eq!(store.lookups(DimensionKind::Status), 1);
        assert_eq!(store.lookups(DimensionKind::Service), 1);
        assert_eq!(store.statuses().len(), 10);
    }

    #[tokio::test]
    async fn invalid_message_writes_nothing() {
        let store = Arc::new(MemoryStore::new());

        let err = handler(&store)
            .on_message(br#"{"service":"ingress","status":"received"}"#)
            .await
            .unwrap_err();

        assert!(matches!(err, TrackerError::InvalidMessage(_)));
        assert!(store.payloads().is_empty());
        assert_eq!(store.lookups(DimensionKind::Status), 0);
    }

    #[tokio::test]
    async fn store_failure_is_returned() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);

        let err = handler(&store).on_message(RECEIVED).await.unwrap_err();

        assert!(matches!(err, TrackerError::Database(_)));
    }
}
