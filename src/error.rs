//! Error types for the simulator.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

use std::net::Ipv4Addr;

use crate::dhcp::ClientId;

/// Errors that can occur while building or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system I/O error (config, trace, or layout files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config or trace files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid scenario configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate) when the
    /// configuration contains invalid values (e.g., range_start > range_end).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An address is not reserved for the client that tried to commit it.
    ///
    /// Raised when a Request references an address that lapsed, was never
    /// offered, or is held by a different client. The server answers Nak.
    #[error("Address {addr} is not reserved for {client}")]
    Conflict { addr: Ipv4Addr, client: ClientId },

    /// The address lies outside the configured allocation range.
    #[error("Address {0} is outside the configured allocation range")]
    AddressOutOfRange(Ipv4Addr),

    /// A static reservation falls inside the dynamic allocation range.
    ///
    /// Fatal at setup: starting anyway would risk a live double-allocation.
    #[error("Static reservation {0} collides with the dynamic pool range")]
    ReservationCollision(Ipv4Addr),

    /// An interface address is already assigned elsewhere in the topology.
    #[error("Address {0} is already assigned to another interface")]
    AddressInUse(Ipv4Addr),

    /// Malformed topology (bad node/interface/channel reference).
    #[error("Topology error: {0}")]
    Topology(String),
}

/// A specialized Result type for simulator operations.
pub type Result<T> = std::result::Result<T, Error>;
