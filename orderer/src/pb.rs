//! Wire types for the `orderer.AtomicBroadcastAPI` gRPC service
//!
//! Generated from `proto/orderer.proto` by `build.rs`.

#![allow(missing_docs, clippy::all)]

tonic::include_proto!("orderer");

impl BroadcastResponse {
    /// Response carrying `status` and an explanation
    pub fn with_status(status: Status, info: impl Into<String>) -> Self {
        Self {
            status: status as i32,
            info: info.into(),
        }
    }
}

impl DeliverResponse {
    /// Status response
    pub fn with_status(status: Status) -> Self {
        Self {
            r#type: Some(deliver_response::Type::Status(status as i32)),
        }
    }

    /// Ordered transaction id response
    pub fn with_txid(txid: Vec<u8>) -> Self {
        Self {
            r#type: Some(deliver_response::Type::Txid(txid)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_broadcast_request_encoding() {
        let request = BroadcastRequest {
            payload: b"a".to_vec(),
            signature: Vec::new(),
        };
        assert_eq!(request.encode_to_vec(), vec![0x0a, 0x01, b'a']);

        let request = BroadcastRequest {
            payload: b"a".to_vec(),
            signature: vec![0xff],
        };
        assert_eq!(request.encode_to_vec(), vec![0x0a, 0x01, b'a', 0x12, 0x01, 0xff]);
    }

    #[test]
    fn test_broadcast_response_encoding() {
        let response = BroadcastResponse::with_status(Status::Success, "ok");
        assert_eq!(response.encode_to_vec(), vec![0x08, 0x01, 0x12, 0x02, b'o', b'k']);
        assert_eq!(response.status(), Status::Success);

        // Default enum value is omitted
        let response = BroadcastResponse::with_status(Status::Invalid, "");
        assert!(response.encode_to_vec().is_empty());
        assert_eq!(response.status(), Status::Invalid);
    }

    #[test]
    fn test_deliver_response_oneof_encoding() {
        let response = DeliverResponse::with_txid(vec![0xab, 0xcd]);
        assert_eq!(response.encode_to_vec(), vec![0x12, 0x02, 0xab, 0xcd]);

        // Oneof members are always written, even at their default value
        let response = DeliverResponse::with_status(Status::Invalid);
        assert_eq!(response.encode_to_vec(), vec![0x08, 0x00]);

        let decoded = DeliverResponse::decode(&[0x08, 0x01][..]).unwrap();
        assert_eq!(decoded, DeliverResponse::with_status(Status::Success));
    }

    #[test]
    fn test_deliver_request_decodes_broadcast_bytes() {
        let bytes = BroadcastRequest {
            payload: b"tx".to_vec(),
            signature: b"sig".to_vec(),
        }
        .encode_to_vec();

        let request = DeliverRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(request.payload, b"tx");
        assert_eq!(request.signature, b"sig");
    }

    #[test]
    fn test_status_names() {
        assert_eq!(Status::Success.as_str_name(), "STATUS_SUCCESS");
        assert_eq!(Status::from_str_name("STATUS_INVALID"), Some(Status::Invalid));
        assert_eq!(Status::from_str_name("STATUS_UNKNOWN"), None);
        assert_eq!(Status::try_from(1).ok(), Some(Status::Success));
    }
}
