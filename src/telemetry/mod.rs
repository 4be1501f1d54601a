//! Occupancy telemetry: payload encoding and the rate-limited UDP transport
//! that delivers it to the dashboard bridge.

pub mod encoder;
pub mod transport;

pub use encoder::{encode, Payload, WireFormat};
pub use transport::{
    DatagramChannel, SendPolicy, TelemetrySink, ThrottledTransport, TransportStats, UdpChannel,
};
