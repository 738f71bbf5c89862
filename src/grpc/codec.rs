//! Passthrough codec for the gRPC transport.
//!
//! The gateway never knows the message types of the services it fronts, so
//! the codec works on bytes: pre-encoded messages and raw payloads go on the
//! wire untouched, anything else is JSON-encoded. Decoding hands back the raw
//! message bytes for the header bundle.

use bytes::{Buf, BufMut, Bytes};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

/// Content subtype announced in `application/grpc+json`.
pub const CONTENT_SUBTYPE: &str = "json";

/// A message that already knows its wire form.
pub trait WireEncoded: Send + Sync {
    fn wire_bytes(&self) -> Result<Bytes, String>;
}

/// What the encoder accepts.
pub enum Payload {
    Encoded(Box<dyn WireEncoded>),
    Bytes(Bytes),
    Json(serde_json::Value),
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Encoded(_) => f.write_str("Payload::Encoded"),
            Payload::Bytes(b) => write!(f, "Payload::Bytes({} bytes)", b.len()),
            Payload::Json(v) => write!(f, "Payload::Json({v})"),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

/// Turn a payload into wire bytes.
pub fn marshal(payload: Payload) -> Result<Bytes, Status> {
    match payload {
        Payload::Encoded(message) => message.wire_bytes().map_err(Status::internal),
        Payload::Bytes(bytes) => Ok(bytes),
        Payload::Json(value) => serde_json::to_vec(&value)
            .map(Bytes::from)
            .map_err(|e| Status::internal(format!("json encode: {e}"))),
    }
}

/// Take every remaining byte of a message.
pub fn unmarshal<B: Buf>(src: &mut B) -> Bytes {
    src.copy_to_bytes(src.remaining())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayCodec;

impl Codec for GatewayCodec {
    type Encode = Payload;
    type Decode = Bytes;
    type Encoder = PayloadEncoder;
    type Decoder = BytesDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        PayloadEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        BytesDecoder
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadEncoder;

impl Encoder for PayloadEncoder {
    type Item = Payload;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        let bytes = marshal(item)?;
        dst.put(bytes);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BytesDecoder;

impl Decoder for BytesDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        Ok(Some(unmarshal(src)))
    }
}
