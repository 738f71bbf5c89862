//! gRPC client side of the gateway: metadata bridging, passthrough codec,
//! channel pool and the transport that ties them together.

pub mod codec;
pub mod metadata;
pub mod pool;
pub mod transport;

pub use codec::{GatewayCodec, Payload, WireEncoded};
pub use metadata::{HTTP_HEADER_KEY, HTTP_QUERY_KEY};
pub use pool::{ChannelSource, ConnPool, Dialer, TonicDialer};
pub use transport::GrpcTransport;
