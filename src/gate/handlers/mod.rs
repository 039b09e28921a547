pub mod health;
pub use self::health::health;

pub mod passcode;
pub use self::passcode::{add_passcode, check_passcode};

pub mod root;
pub use self::root::root;


// common functions for the handlers
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::net::SocketAddr;

/// How the client key for attempt tracking is derived from a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientAddressing {
    trust_forwarded: bool,
}

impl ClientAddressing {
    /// Only the TCP peer address identifies a client.
    #[must_use]
    pub const fn peer() -> Self {
        Self {
            trust_forwarded: false,
        }
    }

    /// Prefer `X-Forwarded-For` / `X-Real-IP`; use behind a trusted reverse proxy only.
    #[must_use]
    pub const fn forwarded() -> Self {
        Self {
            trust_forwarded: true,
        }
    }

    #[must_use]
    pub fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        if self.trust_forwarded {
            if let Some(ip) = forwarded_client_ip(headers) {
                return ip;
            }
        }

        peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
    }
}

/// Extract a client IP from common proxy headers.
///
/// Proxies append to `X-Forwarded-For`, so only the rightmost entry was written
/// by the trusted proxy; anything to its left is client supplied.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .rsplit(',')
                .map(str::trim)
                .find(|entry| !entry.is_empty())
        });
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// The token from an `Authorization: Bearer <token>` header, if present.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}
