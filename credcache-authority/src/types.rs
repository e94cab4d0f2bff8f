//! Authority wire types.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use credcache_core::{AuthorityError, CredentialDescriptor, Payload};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexVersionResponse {
    pub version: i64,
}

/// One payload as sent over the wire, with base64 content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadRecord {
    pub id: String,
    pub payload: String,
}

impl TryFrom<PayloadRecord> for Payload {
    type Error = AuthorityError;

    fn try_from(record: PayloadRecord) -> Result<Self, Self::Error> {
        let bytes = STANDARD
            .decode(record.payload.as_bytes())
            .map_err(|e| AuthorityError::InvalidResponse {
                reason: format!("payload {} is not valid base64: {}", record.id, e),
            })?;
        Ok(Payload::new(record.id, bytes))
    }
}

/// Decode index records one at a time.
///
/// A record that fails to decode is skipped so the rest of the index stays
/// usable.
pub fn decode_index(records: Vec<serde_json::Value>) -> Vec<CredentialDescriptor> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(position, record)| {
            match serde_json::from_value::<CredentialDescriptor>(record) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    tracing::warn!(position, error = %e, "Skipping malformed index record");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_record_decodes_base64() -> Result<(), AuthorityError> {
        let payload = Payload::try_from(PayloadRecord {
            id: "p12".to_string(),
            payload: "3q2+7w==".to_string(),
        })?;
        assert_eq!(payload.payload, vec![0xde, 0xad, 0xbe, 0xef]);
        Ok(())
    }

    #[test]
    fn test_decode_index_skips_malformed_records() {
        let records = vec![
            serde_json::json!({ "type": "probe", "name": "alice", "end": "v1", "host": "h", "port": "22" }),
            serde_json::json!({ "type": "probe", "name": "bob", "end": "v2" }),
            serde_json::json!("not an object"),
            serde_json::json!({ "type": "vpn-service", "name": "gw-1", "end": "v3", "host": "h" }),
        ];

        let index = decode_index(records);
        let names: Vec<_> = index.iter().filter_map(|d| d.name()).collect();
        assert_eq!(names, vec!["alice", "gw-1"]);
    }

    #[test]
    fn test_payload_record_rejects_bad_base64() {
        let err = Payload::try_from(PayloadRecord {
            id: "p12".to_string(),
            payload: "***".to_string(),
        })
        .expect_err("invalid base64 should fail");
        assert!(matches!(err, AuthorityError::InvalidResponse { .. }));
    }
}
