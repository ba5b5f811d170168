//! Outbound mail transport
//!
//! One operation: send a single message to the provider API with a bearer
//! token. MIME assembly and HTTP mapping live here; everything above this
//! module deals in [`OutboundMessage`] and [`TransportError`].

pub mod http;
pub mod mime;
pub mod provider;

pub use http::HttpMailTransport;
pub use provider::{MailTransport, OutboundMessage, SendReceipt, TransportError};
