//! Batched transport to a remote object store.
//!
//! `put` calls accumulate in a buffer that is uploaded as one batch once it
//! reaches the configured object or byte bound, and on `flush`. Batches are
//! uploaded strictly in the order their objects were put, so a writer that
//! puts children before parents keeps that order on the remote side.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use kiln_protocol::{validate_stream_id, ObjectEntry, UploadRequest};
use kiln_types::ObjectId;

use crate::api::{ApiError, ObjectApi};
use crate::config::RemoteContext;
use crate::error::{TransportError, TransportResult};
use crate::http::HttpObjectApi;
use crate::traits::Transport;

#[derive(Default)]
struct PutBuffer {
    pending: Vec<ObjectEntry>,
    pending_bytes: usize,
    /// Ids already uploaded by this transport.
    flushed: HashSet<ObjectId>,
}

impl PutBuffer {
    fn pending_payload(&self, id: &ObjectId) -> Option<String> {
        self.pending
            .iter()
            .find(|e| e.id == *id)
            .map(|e| e.payload.clone())
    }

    fn knows(&self, id: &ObjectId) -> bool {
        self.flushed.contains(id) || self.pending.iter().any(|e| e.id == *id)
    }
}

/// Transport backed by a remote store reached through an [`ObjectApi`].
pub struct RemoteTransport {
    name: String,
    context: RemoteContext,
    api: Arc<dyn ObjectApi>,
    buffer: Mutex<PutBuffer>,
}

impl RemoteTransport {
    /// Create a transport over an arbitrary client.
    pub fn new(context: RemoteContext, api: Arc<dyn ObjectApi>) -> TransportResult<Self> {
        validate_stream_id(&context.stream_id)
            .map_err(|e| TransportError::Config(e.to_string()))?;
        if context.batching.max_batch_objects == 0 {
            return Err(TransportError::Config(
                "max_batch_objects must be at least 1".into(),
            ));
        }
        let name = format!(
            "remote:{}/{}",
            context.account.server_url.trim_end_matches('/'),
            context.stream_id
        );
        Ok(Self {
            name,
            context,
            api,
            buffer: Mutex::new(PutBuffer::default()),
        })
    }

    /// Create a transport speaking the Kiln HTTP protocol.
    pub fn http(context: RemoteContext) -> TransportResult<Self> {
        let api = HttpObjectApi::new(context.account.clone(), &context.batching)
            .map_err(|e| TransportError::Config(e.to_string()))?;
        Self::new(context, Arc::new(api))
    }

    pub fn context(&self) -> &RemoteContext {
        &self.context
    }

    /// Number of objects accepted but not yet uploaded.
    pub async fn pending_len(&self) -> usize {
        self.buffer.lock().await.pending.len()
    }

    fn stream(&self) -> &str {
        &self.context.stream_id
    }

    fn read_error(&self, id: ObjectId, source: ApiError) -> TransportError {
        TransportError::Read {
            transport: self.name.clone(),
            id,
            source,
        }
    }

    /// Upload everything pending. The buffer is only cleared once the batch
    /// has been accepted, so a failed flush can be retried by flushing again.
    async fn flush_locked(&self, buffer: &mut PutBuffer) -> TransportResult<()> {
        if buffer.pending.is_empty() {
            return Ok(());
        }
        let batch = UploadRequest {
            objects: buffer.pending.clone(),
        };
        let first = batch.objects[0].id;
        let batching = &self.context.batching;

        let mut attempt = 0;
        let stored = loop {
            match self.api.upload(self.stream(), &batch).await {
                Ok(stored) => break stored,
                Err(e) if e.is_transient() && attempt < batching.max_retries => {
                    let delay = batching.backoff(attempt);
                    warn!(
                        transport = %self.name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "batch upload failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(TransportError::Write {
                        transport: self.name.clone(),
                        id: first,
                        source,
                    })
                }
            }
        };

        debug!(
            transport = %self.name,
            objects = batch.objects.len(),
            bytes = buffer.pending_bytes,
            stored,
            "uploaded batch"
        );
        for entry in buffer.pending.drain(..) {
            buffer.flushed.insert(entry.id);
        }
        buffer.pending_bytes = 0;
        Ok(())
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, id: ObjectId, payload: String) -> TransportResult<()> {
        let mut buffer = self.buffer.lock().await;
        if buffer.knows(&id) {
            return Ok(());
        }
        buffer.pending_bytes += payload.len();
        buffer.pending.push(ObjectEntry::new(id, payload));

        let batching = &self.context.batching;
        if buffer.pending.len() >= batching.max_batch_objects
            || buffer.pending_bytes >= batching.max_batch_bytes
        {
            self.flush_locked(&mut buffer).await?;
        }
        Ok(())
    }

    async fn get(&self, id: &ObjectId) -> TransportResult<Option<String>> {
        if let Some(payload) = self.buffer.lock().await.pending_payload(id) {
            return Ok(Some(payload));
        }
        self.api
            .download(self.stream(), id)
            .await
            .map_err(|e| self.read_error(*id, e))
    }

    async fn has(&self, id: &ObjectId) -> TransportResult<bool> {
        if self.buffer.lock().await.knows(id) {
            return Ok(true);
        }
        let present = self
            .api
            .exists(self.stream(), std::slice::from_ref(id))
            .await
            .map_err(|e| self.read_error(*id, e))?;
        Ok(present.contains(id))
    }

    async fn get_many(&self, ids: &[ObjectId]) -> TransportResult<Vec<Option<String>>> {
        let mut out: Vec<Option<String>> = Vec::with_capacity(ids.len());
        let mut remote: Vec<ObjectId> = Vec::new();
        {
            let buffer = self.buffer.lock().await;
            for id in ids {
                let local = buffer.pending_payload(id);
                if local.is_none() {
                    remote.push(*id);
                }
                out.push(local);
            }
        }

        let mut fetched = std::collections::HashMap::with_capacity(remote.len());
        for group in remote.chunks(self.context.batching.max_batch_objects) {
            let entries = self
                .api
                .download_many(self.stream(), group)
                .await
                .map_err(|e| self.read_error(group[0], e))?;
            for entry in entries {
                fetched.insert(entry.id, entry.payload);
            }
        }

        for (slot, id) in out.iter_mut().zip(ids) {
            if slot.is_none() {
                *slot = fetched.get(id).cloned();
            }
        }
        Ok(out)
    }

    async fn has_many(&self, ids: &[ObjectId]) -> TransportResult<Vec<bool>> {
        let mut known = HashSet::new();
        let mut remote = Vec::new();
        {
            let buffer = self.buffer.lock().await;
            for id in ids {
                if buffer.knows(id) {
                    known.insert(*id);
                } else {
                    remote.push(*id);
                }
            }
        }
        for group in remote.chunks(self.context.batching.max_batch_objects) {
            let present = self
                .api
                .exists(self.stream(), group)
                .await
                .map_err(|e| self.read_error(group[0], e))?;
            known.extend(present);
        }
        Ok(ids.iter().map(|id| known.contains(id)).collect())
    }

    async fn flush(&self) -> TransportResult<()> {
        let mut buffer = self.buffer.lock().await;
        let count = buffer.pending.len();
        self.flush_locked(&mut buffer).await?;
        if count > 0 {
            info!(transport = %self.name, objects = count, "flushed pending objects");
        }
        Ok(())
    }
}

impl std::fmt::Debug for RemoteTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTransport")
            .field("name", &self.name)
            .field("batching", &self.context.batching)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use kiln_protocol::AuthMethod;

    use crate::api::ApiResult;
    use crate::config::{Account, BatchConfig};

    /// In-process store that records every uploaded batch and can be told
    /// to fail the next few uploads.
    #[derive(Default)]
    struct FakeApi {
        objects: StdMutex<HashMap<ObjectId, String>>,
        batches: StdMutex<Vec<Vec<ObjectId>>>,
        failures: StdMutex<Vec<ApiError>>,
        downloads: StdMutex<usize>,
    }

    impl FakeApi {
        fn fail_next(&self, errors: Vec<ApiError>) {
            *self.failures.lock().unwrap() = errors;
        }

        fn batches(&self) -> Vec<Vec<ObjectId>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectApi for FakeApi {
        async fn upload(&self, _stream: &str, batch: &UploadRequest) -> ApiResult<usize> {
            if let Some(err) = self.failures.lock().unwrap().pop() {
                return Err(err);
            }
            self.batches
                .lock()
                .unwrap()
                .push(batch.objects.iter().map(|o| o.id).collect());
            let mut objects = self.objects.lock().unwrap();
            let mut stored = 0;
            for entry in &batch.objects {
                if !objects.contains_key(&entry.id) {
                    objects.insert(entry.id, entry.payload.clone());
                    stored += 1;
                }
            }
            Ok(stored)
        }

        async fn download(&self, _stream: &str, id: &ObjectId) -> ApiResult<Option<String>> {
            *self.downloads.lock().unwrap() += 1;
            Ok(self.objects.lock().unwrap().get(id).cloned())
        }

        async fn download_many(&self, _stream: &str, ids: &[ObjectId]) -> ApiResult<Vec<ObjectEntry>> {
            *self.downloads.lock().unwrap() += 1;
            let objects = self.objects.lock().unwrap();
            Ok(ids
                .iter()
                .filter_map(|id| objects.get(id).map(|p| ObjectEntry::new(*id, p.clone())))
                .collect())
        }

        async fn exists(&self, _stream: &str, ids: &[ObjectId]) -> ApiResult<Vec<ObjectId>> {
            let objects = self.objects.lock().unwrap();
            Ok(ids.iter().filter(|id| objects.contains_key(id)).copied().collect())
        }
    }

    fn id(n: u32) -> ObjectId {
        ObjectId::from_bytes(&n.to_be_bytes())
    }

    fn transport(api: &Arc<FakeApi>, batching: BatchConfig) -> RemoteTransport {
        let context = RemoteContext::new(
            Account::new("http://store.test", AuthMethod::Bearer("secret".into())),
            "stream-1",
        )
        .with_batching(batching);
        RemoteTransport::new(context, Arc::clone(api) as Arc<dyn ObjectApi>).unwrap()
    }

    fn fast_retries() -> BatchConfig {
        BatchConfig {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Batching
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn puts_are_buffered_until_flush() {
        let api = Arc::new(FakeApi::default());
        let remote = transport(&api, BatchConfig::default());
        remote.put(id(1), "a".into()).await.unwrap();
        remote.put(id(2), "b".into()).await.unwrap();
        assert!(api.batches().is_empty());
        assert_eq!(remote.pending_len().await, 2);

        remote.flush().await.unwrap();
        assert_eq!(api.batches(), vec![vec![id(1), id(2)]]);
        assert_eq!(remote.pending_len().await, 0);
    }

    #[tokio::test]
    async fn object_bound_triggers_flush_in_put_order() {
        let api = Arc::new(FakeApi::default());
        let remote = transport(
            &api,
            BatchConfig {
                max_batch_objects: 2,
                ..Default::default()
            },
        );
        for n in 1..=5 {
            remote.put(id(n), format!("p{n}")).await.unwrap();
        }
        remote.flush().await.unwrap();
        assert_eq!(
            api.batches(),
            vec![vec![id(1), id(2)], vec![id(3), id(4)], vec![id(5)]]
        );
    }

    #[tokio::test]
    async fn byte_bound_triggers_flush() {
        let api = Arc::new(FakeApi::default());
        let remote = transport(
            &api,
            BatchConfig {
                max_batch_bytes: 10,
                ..Default::default()
            },
        );
        remote.put(id(1), "x".repeat(6)).await.unwrap();
        assert!(api.batches().is_empty());
        remote.put(id(2), "y".repeat(6)).await.unwrap();
        assert_eq!(api.batches().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_puts_are_dropped() {
        let api = Arc::new(FakeApi::default());
        let remote = transport(&api, BatchConfig::default());
        remote.put(id(1), "a".into()).await.unwrap();
        remote.put(id(1), "a".into()).await.unwrap();
        remote.flush().await.unwrap();
        remote.put(id(1), "a".into()).await.unwrap();
        remote.flush().await.unwrap();
        assert_eq!(api.batches(), vec![vec![id(1)]]);
    }

    #[tokio::test]
    async fn empty_flush_is_a_no_op() {
        let api = Arc::new(FakeApi::default());
        let remote = transport(&api, BatchConfig::default());
        remote.flush().await.unwrap();
        assert!(api.batches().is_empty());
    }

    // -----------------------------------------------------------------------
    // Retry
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let api = Arc::new(FakeApi::default());
        api.fail_next(vec![
            ApiError::Network("reset".into()),
            ApiError::Status {
                status: 503,
                message: "busy".into(),
            },
        ]);
        let remote = transport(&api, fast_retries());
        remote.put(id(1), "a".into()).await.unwrap();
        remote.flush().await.unwrap();
        assert_eq!(api.batches(), vec![vec![id(1)]]);
    }

    #[tokio::test]
    async fn exhausted_retries_are_reported() {
        let api = Arc::new(FakeApi::default());
        api.fail_next(vec![ApiError::Network("down".into()); 4]);
        let remote = transport(&api, fast_retries());
        remote.put(id(7), "a".into()).await.unwrap();
        let err = remote.flush().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Write { ref transport, id: failed, .. }
                if failed == id(7) && transport == "remote:http://store.test/stream-1"
        ));
        // Still pending: a later flush can succeed.
        assert_eq!(remote.pending_len().await, 1);
        remote.flush().await.unwrap();
        assert_eq!(api.batches(), vec![vec![id(7)]]);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let api = Arc::new(FakeApi::default());
        api.fail_next(vec![
            ApiError::Network("would succeed later".into()),
            ApiError::Unauthorized("bad token".into()),
        ]);
        let remote = transport(&api, fast_retries());
        remote.put(id(1), "a".into()).await.unwrap();
        let err = remote.flush().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Write {
                source: ApiError::Unauthorized(_),
                ..
            }
        ));
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn reads_see_pending_writes() {
        let api = Arc::new(FakeApi::default());
        let remote = transport(&api, BatchConfig::default());
        remote.put(id(1), "pending".into()).await.unwrap();
        assert_eq!(remote.get(&id(1)).await.unwrap().as_deref(), Some("pending"));
        assert!(remote.has(&id(1)).await.unwrap());
        assert_eq!(*api.downloads.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn reads_go_to_the_store() {
        let api = Arc::new(FakeApi::default());
        let writer = transport(&api, BatchConfig::default());
        writer.put(id(1), "one".into()).await.unwrap();
        writer.put(id(2), "two".into()).await.unwrap();
        writer.flush().await.unwrap();

        let reader = transport(&api, BatchConfig::default());
        assert_eq!(reader.get(&id(1)).await.unwrap().as_deref(), Some("one"));
        assert!(reader.get(&id(3)).await.unwrap().is_none());
        let many = reader.get_many(&[id(2), id(3), id(1)]).await.unwrap();
        assert_eq!(many, vec![Some("two".into()), None, Some("one".into())]);
        let present = reader.has_many(&[id(1), id(3)]).await.unwrap();
        assert_eq!(present, vec![true, false]);
        assert!(!reader.has(&id(3)).await.unwrap());
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn rejects_invalid_stream_ids() {
        let api: Arc<dyn ObjectApi> = Arc::new(FakeApi::default());
        let context = RemoteContext::new(
            Account::new("http://store.test", AuthMethod::Anonymous),
            "../etc",
        );
        assert!(matches!(
            RemoteTransport::new(context, api),
            Err(TransportError::Config(_))
        ));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let api: Arc<dyn ObjectApi> = Arc::new(FakeApi::default());
        let context = RemoteContext::new(
            Account::new("http://store.test", AuthMethod::Anonymous),
            "s",
        )
        .with_batching(BatchConfig {
            max_batch_objects: 0,
            ..Default::default()
        });
        assert!(RemoteTransport::new(context, api).is_err());
    }

    #[test]
    fn http_constructor_names_transport() {
        let context = RemoteContext::new(
            Account::new("http://store.test/", AuthMethod::Anonymous),
            "s1",
        );
        let remote = RemoteTransport::http(context).unwrap();
        assert_eq!(remote.name(), "remote:http://store.test/s1");
    }
}
