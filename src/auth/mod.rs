//! Handshake authentication
//!
//! The service authenticates the WebSocket upgrade request through query
//! parameters: an HMAC-SHA256 signature over `host`, `date` and the request
//! line, keyed with the application's api secret.

mod credentials;
mod signer;

pub use credentials::Credentials;
pub use signer::{build_handshake_url, build_handshake_url_at, format_date, signature, SigningError};
