//! # Passgate (single-passcode door gateway)
//!
//! `passgate` holds exactly one shared passcode, checks client-submitted codes
//! against it and, on a match, fires an outbound webhook that drives a door
//! relay.
//!
//! ## Lockout
//!
//! Failed attempts are tracked per client address. After `max_attempts`
//! consecutive failures the client is locked out for `lockout` seconds; while
//! locked, requests are rejected without touching the database or the relay.
//! Tracking is per client rather than system-wide so that one misbehaving
//! client cannot lock every legitimate user out of the door.
//!
//! ## Administration
//!
//! `POST /add_passcode` replaces the active passcode. It is gated by a static
//! bearer secret and never resets anyone's failure count.

pub mod cli;
pub mod gate;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
