use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Error};
use chrono::Utc;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use crate::config::config::StoreConfig;
use crate::modules::event::{Event, StoredEvent};
use crate::utils::utils::{object_id, parse_timestamp};

/// EventBackend is the persistence seam behind the event store. Implementations
/// may fail or hang; the store bounds and absorbs both.
pub trait EventBackend {
    fn ping(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// insert persists an event whose timestamp is already set and returns its id.
    fn insert(&self, event: Event) -> impl Future<Output = Result<String, Error>> + Send;

    /// list returns events newest first. `limit` and `offset` are already clamped.
    fn list(&self, limit: usize, offset: usize) -> impl Future<Output = Result<Vec<StoredEvent>, Error>> + Send;

    fn list_by_gesture(&self, gesture: &str, limit: usize) -> impl Future<Output = Result<Vec<StoredEvent>, Error>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Result<Option<StoredEvent>, Error>> + Send;

    /// clear deletes every event and returns how many were removed.
    fn clear(&self) -> impl Future<Output = Result<u64, Error>> + Send;
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    event: StoredEvent,
}

/// In-process backend. Ids are 24 hex chars like a document database would issue.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_seq: u64,
    entries: Vec<Entry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, Error> {
        self.inner.lock().map_err(|_| Error::msg("memory backend lock poisoned"))
    }

    /// newest_first orders by parsed timestamp, then by insertion order.
    fn newest_first(entries: &[Entry]) -> Vec<&Entry> {
        let mut sorted: Vec<&Entry> = entries.iter().collect();
        sorted.sort_by(|a, b| {
            let ta = parse_timestamp(&a.event.timestamp);
            let tb = parse_timestamp(&b.event.timestamp);
            tb.cmp(&ta).then(b.seq.cmp(&a.seq))
        });
        sorted
    }
}

impl EventBackend for MemoryBackend {
    async fn ping(&self) -> Result<(), Error> {
        self.lock().map(|_| ())
    }

    async fn insert(&self, event: Event) -> Result<String, Error> {
        let mut inner = self.lock()?;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let id = object_id(Utc::now().timestamp() as u32, seq);
        inner.entries.push(Entry { seq, event: StoredEvent::from_event(id.clone(), event) });
        Ok(id)
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<StoredEvent>, Error> {
        let inner = self.lock()?;
        Ok(MemoryBackend::newest_first(&inner.entries)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| e.event.clone())
            .collect())
    }

    async fn list_by_gesture(&self, gesture: &str, limit: usize) -> Result<Vec<StoredEvent>, Error> {
        let inner = self.lock()?;
        Ok(MemoryBackend::newest_first(&inner.entries)
            .into_iter()
            .filter(|e| e.event.gesture == gesture)
            .take(limit)
            .map(|e| e.event.clone())
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredEvent>, Error> {
        let inner = self.lock()?;
        Ok(inner.entries.iter().find(|e| e.event.id == id).map(|e| e.event.clone()))
    }

    async fn clear(&self) -> Result<u64, Error> {
        let mut inner = self.lock()?;
        let deleted = inner.entries.len() as u64;
        inner.entries.clear();
        Ok(deleted)
    }
}

pub mod proto {
    //! Wire messages of the `gesture.events.v1.EventStore` service.

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct EventRecord {
        #[prost(string, tag = "1")]
        pub id: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub gesture: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub expression: ::prost::alloc::string::String,
        #[prost(float, tag = "4")]
        pub confidence: f32,
        #[prost(string, tag = "5")]
        pub timestamp: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PingRequest {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PingReply {
        #[prost(bool, tag = "1")]
        pub ok: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct InsertRequest {
        #[prost(message, optional, tag = "1")]
        pub event: ::core::option::Option<EventRecord>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct InsertReply {
        #[prost(string, tag = "1")]
        pub id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListRequest {
        #[prost(int64, tag = "1")]
        pub limit: i64,
        #[prost(int64, tag = "2")]
        pub offset: i64,
        #[prost(string, optional, tag = "3")]
        pub gesture: ::core::option::Option<::prost::alloc::string::String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListReply {
        #[prost(message, repeated, tag = "1")]
        pub events: ::prost::alloc::vec::Vec<EventRecord>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetRequest {
        #[prost(string, tag = "1")]
        pub id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetReply {
        #[prost(message, optional, tag = "1")]
        pub event: ::core::option::Option<EventRecord>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ClearRequest {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ClearReply {
        #[prost(uint64, tag = "1")]
        pub deleted: u64,
    }
}

const DATABASE_METADATA_KEY: &str = "x-event-database";

impl From<proto::EventRecord> for StoredEvent {
    fn from(record: proto::EventRecord) -> Self {
        StoredEvent {
            id: record.id,
            gesture: record.gesture,
            expression: record.expression,
            confidence: record.confidence,
            timestamp: record.timestamp,
        }
    }
}

/// Remote backend speaking `gesture.events.v1.EventStore` over a tonic channel.
#[derive(Debug, Clone)]
pub struct GrpcBackend {
    channel: Channel,
    database: MetadataValue<Ascii>,
}

impl GrpcBackend {
    /// connect opens the channel to `config.uri`. Every request carries
    /// `config.database` and is bounded by `config.op_timeout()`.
    ///
    /// # Arguments
    /// * `config` - &StoreConfig
    ///
    /// # Returns
    /// * `Result<GrpcBackend, Error>`
    pub async fn connect(config: &StoreConfig) -> Result<Self, Error> {
        let database = config.database.parse::<MetadataValue<Ascii>>()?;
        let channel = Endpoint::from_shared(config.uri.clone())?
            .connect_timeout(config.connect_timeout())
            .timeout(config.op_timeout())
            .connect()
            .await?;
        Ok(GrpcBackend { channel, database })
    }

    /// lazy builds the backend without dialing; the first call connects.
    pub fn lazy(uri: &str, database: &str, op_timeout: Duration) -> Result<Self, Error> {
        let database = database.parse::<MetadataValue<Ascii>>()?;
        let channel = Endpoint::from_shared(uri.to_string())?
            .timeout(op_timeout)
            .connect_lazy();
        Ok(GrpcBackend { channel, database })
    }

    async fn unary<Req, Resp>(&self, method: &'static str, message: Req) -> Result<Resp, Error>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unknown(format!("event store not ready: {}", e)))?;

        let mut request = Request::new(message);
        request.metadata_mut().insert(DATABASE_METADATA_KEY, self.database.clone());

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc.unary(request, PathAndQuery::from_static(method), codec).await?;
        Ok(response.into_inner())
    }
}

impl EventBackend for GrpcBackend {
    async fn ping(&self) -> Result<(), Error> {
        let reply: proto::PingReply = self.unary("/gesture.events.v1.EventStore/Ping", proto::PingRequest {}).await?;
        if !reply.ok {
            return Err(anyhow!("event store reported not ready"))
        }
        Ok(())
    }

    async fn insert(&self, event: Event) -> Result<String, Error> {
        let record = proto::EventRecord {
            id: String::new(),
            gesture: event.gesture,
            expression: event.expression,
            confidence: event.confidence,
            timestamp: event.timestamp.unwrap_or_default(),
        };
        let reply: proto::InsertReply = self
            .unary("/gesture.events.v1.EventStore/Insert", proto::InsertRequest { event: Some(record) })
            .await?;
        if reply.id.trim().is_empty() {
            return Err(Error::msg("event store returned an empty id"))
        }
        Ok(reply.id)
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<StoredEvent>, Error> {
        let request = proto::ListRequest { limit: limit as i64, offset: offset as i64, gesture: None };
        let reply: proto::ListReply = self.unary("/gesture.events.v1.EventStore/List", request).await?;
        Ok(reply.events.into_iter().map(StoredEvent::from).collect())
    }

    async fn list_by_gesture(&self, gesture: &str, limit: usize) -> Result<Vec<StoredEvent>, Error> {
        let request = proto::ListRequest { limit: limit as i64, offset: 0, gesture: Some(gesture.to_string()) };
        let reply: proto::ListReply = self.unary("/gesture.events.v1.EventStore/List", request).await?;
        Ok(reply.events.into_iter().map(StoredEvent::from).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredEvent>, Error> {
        let reply: proto::GetReply = self
            .unary("/gesture.events.v1.EventStore/Get", proto::GetRequest { id: id.to_string() })
            .await?;
        Ok(reply.event.map(StoredEvent::from))
    }

    async fn clear(&self) -> Result<u64, Error> {
        let reply: proto::ClearReply = self.unary("/gesture.events.v1.EventStore/Clear", proto::ClearRequest {}).await?;
        Ok(reply.deleted)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use prost::Message;
    use crate::modules::event::Event;
    use crate::modules::event_backend::fixtures::{spawn_event_server, EventServer, ServerState};
    use crate::modules::event_backend::*;
    use crate::utils::utils::is_object_id;

    #[tokio::test]
    async fn test_memory_backend_orders_newest_first() {
        let backend = MemoryBackend::new();
        backend.insert(Event::new("Hello", "Happy", 0.9).with_timestamp("2024-05-01T10:00:00+00:00")).await.unwrap();
        backend.insert(Event::new("Stop", "Neutral", 0.6).with_timestamp("2024-05-01T12:00:00+00:00")).await.unwrap();
        backend.insert(Event::new("Yes", "Sad", 0.7).with_timestamp("2024-05-01T11:00:00+00:00")).await.unwrap();

        let gestures: Vec<String> = backend.list(10, 0).await.unwrap().into_iter().map(|e| e.gesture).collect();
        assert_eq!(gestures, vec!["Stop", "Yes", "Hello"]);

        let page = backend.list(1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].gesture, "Yes");
    }

    #[tokio::test]
    async fn test_memory_backend_ids_and_lookup() {
        let backend = MemoryBackend::new();
        let ts = "2024-05-01T10:00:00+00:00";
        let a = backend.insert(Event::new("Hello", "Happy", 0.9).with_timestamp(ts)).await.unwrap();
        let b = backend.insert(Event::new("Hello", "Happy", 0.9).with_timestamp(ts)).await.unwrap();
        assert!(is_object_id(&a));
        assert_ne!(a, b);

        let found = backend.get(&a).await.unwrap().unwrap();
        assert_eq!(found.id, a);
        assert_eq!(found.timestamp, ts);
        assert!(backend.get("000000000000000000000000").await.unwrap().is_none());

        // same timestamp falls back to insertion order
        assert_eq!(backend.list(1, 0).await.unwrap()[0].id, b);
    }

    #[tokio::test]
    async fn test_memory_backend_filter_and_clear() {
        let backend = MemoryBackend::new();
        for gesture in ["Hello", "Stop", "Hello", "Yes", "Hello"] {
            backend.insert(Event::new(gesture, "Neutral", 0.5).stamped()).await.unwrap();
        }
        assert_eq!(backend.list_by_gesture("Hello", 10).await.unwrap().len(), 3);
        assert_eq!(backend.list_by_gesture("Hello", 2).await.unwrap().len(), 2);
        assert!(backend.list_by_gesture("Help", 10).await.unwrap().is_empty());

        assert_eq!(backend.clear().await.unwrap(), 5);
        assert!(backend.list(10, 0).await.unwrap().is_empty());
    }

    #[test]
    fn test_record_wire_round_trip() {
        let record = proto::EventRecord {
            id: "665000000000000000000007".to_string(),
            gesture: "Help".to_string(),
            expression: "Sad".to_string(),
            confidence: 0.5,
            timestamp: "2024-05-01T10:00:00+00:00".to_string(),
        };
        let reply = proto::ListReply { events: vec![record.clone()] };
        let decoded = proto::ListReply::decode(reply.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, reply);

        let stored = StoredEvent::from(record);
        assert_eq!(stored.gesture, "Help");
        assert_eq!(stored.confidence, 0.5);
    }

    async fn served(state: ServerState) -> (GrpcBackend, EventServer) {
        let server = EventServer { state: Arc::new(Mutex::new(state)) };
        let uri = spawn_event_server(server.clone()).await;
        let config = StoreConfig { uri, database: "gesture_test".to_string(), ..StoreConfig::default() };
        (GrpcBackend::connect(&config).await.unwrap(), server)
    }

    #[tokio::test]
    async fn test_grpc_backend_round_trip() {
        let (backend, server) = served(ServerState::default()).await;
        backend.ping().await.unwrap();

        let ts = "2024-05-01T10:22:31.123456+00:00";
        let first = backend.insert(Event::new("Hello", "Happy", 0.92).with_timestamp(ts)).await.unwrap();
        let second = backend.insert(Event::new("Stop", "Neutral", 0.55).with_timestamp(ts)).await.unwrap();
        assert!(is_object_id(&first));
        assert_ne!(first, second);

        let latest = backend.list(1, 0).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, second);
        assert_eq!(latest[0].gesture, "Stop");
        assert_eq!(latest[0].confidence, 0.55);
        assert_eq!(latest[0].timestamp, ts);
        assert_eq!(backend.list(10, 1).await.unwrap()[0].id, first);

        let hello = backend.list_by_gesture("Hello", 10).await.unwrap();
        assert_eq!(hello.len(), 1);
        assert_eq!(hello[0].expression, "Happy");

        assert_eq!(backend.get(&first).await.unwrap().unwrap().gesture, "Hello");
        assert!(backend.get("665000000000000000000099").await.unwrap().is_none());

        assert_eq!(backend.clear().await.unwrap(), 2);
        assert!(backend.list(10, 0).await.unwrap().is_empty());

        let state = server.state.lock().unwrap();
        assert!(!state.databases.is_empty());
        assert!(state.databases.iter().all(|db| db == "gesture_test"));
    }

    #[tokio::test]
    async fn test_grpc_backend_not_ready_and_blank_ids() {
        let (backend, _server) = served(ServerState { ping_ok: false, blank_ids: true, ..ServerState::default() }).await;
        assert!(backend.ping().await.is_err());
        assert!(backend.insert(Event::new("Yes", "Sad", 0.6).stamped()).await.is_err());
    }

    #[tokio::test]
    async fn test_grpc_backend_unreachable() {
        let config = StoreConfig {
            uri: "http://127.0.0.1:1".to_string(),
            connect_timeout_ms: 500,
            ..StoreConfig::default()
        };
        assert!(GrpcBackend::connect(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_grpc_backend_rejects_bad_database_name() {
        assert!(GrpcBackend::lazy("http://127.0.0.1:1", "bad\nname", Duration::from_millis(100)).is_err());
    }
}
