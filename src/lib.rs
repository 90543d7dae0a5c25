//! `simlan` is a discrete-event simulator for small IPv4 networks with a
//! DHCP-style address-allocation core.
//!
//! Everything runs on a simulated clock: nodes, shared segments, and
//! point-to-point links form a [`net::Network`], applications installed on
//! nodes react to packets and timers through the [`sim::Simulation`] event
//! loop, and the [`dhcp`] module provides a complete allocation protocol
//! with a pooled server, client state machines, and static reservations.
//! The [`scenarios`] module wires these into three canned topologies driven
//! by the JSON [`config::Config`].

pub mod apps;
pub mod config;
pub mod dhcp;
pub mod error;
pub mod net;
pub mod scenarios;
pub mod sim;
pub mod trace;

pub use config::Config;
pub use dhcp::{AddressPool, DhcpClient, DhcpServer, LeaseTable};
pub use error::{Error, Result};
pub use net::Network;
pub use sim::Simulation;
