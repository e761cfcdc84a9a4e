use serde::{Deserialize, Serialize};

use kiln_types::ObjectId;

use crate::error::{ProtocolError, ProtocolResult};

pub const PROTOCOL_VERSION: u32 = 1;
/// Default ceiling on the summed payload size of one upload batch.
pub const MAX_BATCH_BYTES: usize = 16 * 1024 * 1024;

/// One stored chunk on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub id: ObjectId,
    pub payload: String,
}

impl ObjectEntry {
    pub fn new(id: ObjectId, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// Body of a batched upload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub objects: Vec<ObjectEntry>,
}

impl UploadRequest {
    /// Summed payload bytes of the batch.
    pub fn payload_bytes(&self) -> usize {
        self.objects.iter().map(|o| o.payload.len()).sum()
    }

    /// Reject batches above `max` payload bytes.
    pub fn check_size(&self, max: usize) -> ProtocolResult<()> {
        let size = self.payload_bytes();
        if size > max {
            return Err(ProtocolError::BatchTooLarge { size, max });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Objects that were not already present.
    pub stored: usize,
}

/// Body of a multi-get or existence query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<ObjectId>,
}

/// Multi-get result. Absent ids are omitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub objects: Vec<ObjectEntry>,
}

/// Existence query result: the subset of requested ids that are stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub present: Vec<ObjectId>,
}

/// Error body returned with any non-2xx status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_request_wire_shape() {
        let id = ObjectId::from_bytes(b"a");
        let req = UploadRequest {
            objects: vec![ObjectEntry::new(id, "{}")],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            format!(r#"{{"objects":[{{"id":"{}","payload":"{{}}"}}]}}"#, id.to_hex())
        );
    }

    #[test]
    fn batch_size_limit() {
        let req = UploadRequest {
            objects: vec![
                ObjectEntry::new(ObjectId::from_bytes(b"a"), "12345"),
                ObjectEntry::new(ObjectId::from_bytes(b"b"), "678"),
            ],
        };
        assert_eq!(req.payload_bytes(), 8);
        assert!(req.check_size(8).is_ok());
        assert!(matches!(
            req.check_size(7),
            Err(ProtocolError::BatchTooLarge { size: 8, max: 7 })
        ));
    }

    #[test]
    fn ids_request_parses() {
        let id = ObjectId::from_bytes(b"z");
        let parsed: IdsRequest =
            serde_json::from_str(&format!(r#"{{"ids":["{}"]}}"#, id.to_hex())).unwrap();
        assert_eq!(parsed.ids, vec![id]);
    }
}
