use serde::{Deserialize, Serialize};

use crate::types::FileId;

/// MIME type used in the data URI wrapping each chunk.
pub const CHUNK_MIME: &str = "application/octet-stream";

/// One chunk upload request, sent as form fields.
///
/// `data` travels as `data:<mime>;base64,<payload>`; the endpoint strips
/// everything up to `base64,` and appends the decoded bytes to the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    pub file_id: FileId,
    pub retries: u32,
    pub file_name: String,
    /// 1-based index of the part being sent.
    pub current_part: u64,
    pub total_parts: u64,
    #[serde(with = "data_uri")]
    pub data: Vec<u8>,
}

/// Inbound cancellation request (`fileupload.cancel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub file_id: FileId,
}

/// Encodes `data` as a base64 data URI with the given MIME type.
pub fn encode_data_uri(mime: &str, data: &[u8]) -> String {
    use base64::{Engine, engine::general_purpose::STANDARD};
    format!("data:{mime};base64,{}", STANDARD.encode(data))
}

/// Decodes the payload of a base64 data URI.
///
/// Anything before `base64,` is ignored, mirroring how the endpoint reads it.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::{Engine, engine::general_purpose::STANDARD};
    let payload = match uri.find("base64,") {
        Some(idx) => &uri[idx + "base64,".len()..],
        None => uri,
    };
    STANDARD.decode(payload)
}

mod data_uri {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        super::encode_data_uri(super::CHUNK_MIME, data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_data_uri(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_request_field_names() {
        let req = ChunkRequest {
            file_id: 7,
            retries: 1,
            file_name: "photo.jpg".into(),
            current_part: 2,
            total_parts: 3,
            data: b"hi".to_vec(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["fileId"], 7);
        assert_eq!(json["retries"], 1);
        assert_eq!(json["fileName"], "photo.jpg");
        assert_eq!(json["currentPart"], 2);
        assert_eq!(json["totalParts"], 3);
        assert_eq!(json["data"], "data:application/octet-stream;base64,aGk=");
    }

    #[test]
    fn decode_ignores_prefix() {
        assert_eq!(decode_data_uri("data:image/jpeg;base64,aGk=").unwrap(), b"hi");
        assert_eq!(decode_data_uri("aGk=").unwrap(), b"hi");
    }

    #[test]
    fn cancel_request_parses() {
        let req: CancelRequest = serde_json::from_str(r#"{"fileId":12}"#).unwrap();
        assert_eq!(req.file_id, 12);
    }

    #[test]
    fn empty_chunk_encodes() {
        assert_eq!(
            encode_data_uri(CHUNK_MIME, &[]),
            "data:application/octet-stream;base64,"
        );
    }
}
