//! Dynamic address allocation: messages, the server-side pool and lease
//! table, the client and server state machines, and static reservations.

pub mod client;
pub mod lease;
pub mod message;
pub mod pool;
pub mod reservation;
pub mod server;

pub use client::{BoundLease, DhcpClient, DhcpState};
pub use lease::{LeaseRecord, LeaseState, LeaseTable};
pub use message::{ClientId, DhcpMessage, DHCP_WIRE_SIZE};
pub use pool::AddressPool;
pub use reservation::StaticReservation;
pub use server::{DhcpServer, ServerConfig};
