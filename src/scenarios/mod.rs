//! Canned topologies built from the configuration surface.

pub mod bus;
pub mod dhcp;
pub mod star;

pub use bus::BusReport;
pub use dhcp::{ClientSummary, DhcpReport};
pub use star::{SpokeSummary, StarReport};
