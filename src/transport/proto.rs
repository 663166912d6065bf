//! Sync wire messages
//!
//! Protobuf-encoded with `prost`. Records travel as
//! [`StorageRecord`](crate::record::StorageRecord), whose payload is already
//! encrypted by the agent; the server never sees plaintext.
//!
//! ```text
//! message StorageRecord { int64 id = 1; string data = 2; bool deleted = 3; int64 updated_at = 4;
//!                         string origin = 5; }
//! message BinaryChunk   { string content_key = 1; string data = 2; }
//! message IdMapping     { int64 local_id = 1; int64 server_id = 2; }
//! message PushAck       { uint32 accepted = 1; repeated IdMapping mappings = 2; }
//! message Empty         {}
//! ```

/// Encrypted attachment in transit: content key plus stored ciphertext
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct BinaryChunk {
    #[prost(string, tag = "1")]
    pub content_key: String,
    #[prost(string, tag = "2")]
    pub data: String,
}

/// Server id assigned to a record pushed with a local (negative) id
#[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
pub struct IdMapping {
    #[prost(int64, tag = "1")]
    pub local_id: i64,
    #[prost(int64, tag = "2")]
    pub server_id: i64,
}

/// Acknowledgement of a record push
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct PushAck {
    /// Records stored by the server
    #[prost(uint32, tag = "1")]
    pub accepted: u32,
    /// Local ids re-keyed by the server
    #[prost(message, repeated, tag = "2")]
    pub mappings: Vec<IdMapping>,
}

/// Empty request/response body
#[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StorageRecord;
    use prost::Message;

    #[test]
    fn test_push_ack_wire_format() {
        let ack = PushAck {
            accepted: 2,
            mappings: vec![IdMapping {
                local_id: -1,
                server_id: 40,
            }],
        };
        let bytes = ack.encode_to_vec();
        let decoded = PushAck::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, ack);
    }

    #[test]
    fn test_storage_record_length_delimited_stream() {
        let records = vec![
            StorageRecord {
                id: -1,
                data: "AAAA".to_string(),
                deleted: false,
                updated_at: 10,
                origin: String::new(),
            },
            StorageRecord {
                id: 7,
                data: "BBBB".to_string(),
                deleted: true,
                updated_at: 20,
                origin: String::new(),
            },
        ];

        let mut buf = Vec::new();
        for record in &records {
            record.encode_length_delimited(&mut buf).unwrap();
        }

        let mut cursor = buf.as_slice();
        let mut decoded = Vec::new();
        while !cursor.is_empty() {
            decoded.push(StorageRecord::decode_length_delimited(&mut cursor).unwrap());
        }
        assert_eq!(decoded, records);
    }
}
