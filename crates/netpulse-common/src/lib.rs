//! Shared model for the netpulse agent.
//!
//! [`types::Measurement`] is the typed snapshot every collector returns, and
//! [`types::WireRecord`] is the tagged/fielded unit it converts into before
//! [`line_protocol::encode`] renders it for the time-series store.

pub mod error;
pub mod line_protocol;
pub mod rate;
pub mod types;
