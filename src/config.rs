use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::dhcp::AddressPool;
use crate::error::{Error, Result};

/// Per-scenario knobs, one section per scenario, written out as JSON on
/// first run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub dhcp: DhcpScenarioConfig,
    pub bus: BusScenarioConfig,
    pub star: StarScenarioConfig,
}

/// The bus-with-allocation scenario: clients and routers on a shared
/// segment, a point-to-point tail to a remote host, one DHCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpScenarioConfig {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub pool_start: Ipv4Addr,
    pub pool_end: Ipv4Addr,
    pub server_ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// Extra addresses the pool must never hand out.
    pub exclusions: Vec<Ipv4Addr>,
    /// Fixed address on the forwarding router.
    pub reserved_ip: Ipv4Addr,
    pub lease_duration_seconds: u64,
    pub clients: usize,
    pub client_start_seconds: f64,
    pub bus_delay_ns: u64,
    pub p2p_network: Ipv4Addr,
    pub p2p_mask: Ipv4Addr,
    pub p2p_delay_ms: u64,
    pub echo_packets: u32,
    pub echo_interval_seconds: f64,
    pub echo_packet_size: usize,
    pub echo_start_seconds: f64,
    pub stop_seconds: f64,
}

impl Default for DhcpScenarioConfig {
    fn default() -> Self {
        Self {
            network: Ipv4Addr::new(10, 0, 0, 0),
            mask: Ipv4Addr::new(255, 0, 0, 0),
            pool_start: Ipv4Addr::new(10, 0, 0, 1),
            pool_end: Ipv4Addr::new(10, 0, 0, 15),
            server_ip: Ipv4Addr::new(10, 0, 0, 12),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            exclusions: Vec::new(),
            reserved_ip: Ipv4Addr::new(10, 0, 0, 17),
            lease_duration_seconds: 8,
            clients: 3,
            client_start_seconds: 1.0,
            bus_delay_ns: 6_560,
            p2p_network: Ipv4Addr::new(20, 0, 0, 0),
            p2p_mask: Ipv4Addr::new(255, 0, 0, 0),
            p2p_delay_ms: 2,
            echo_packets: 5,
            echo_interval_seconds: 1.0,
            echo_packet_size: 1024,
            echo_start_seconds: 10.0,
            stop_seconds: 20.0,
        }
    }
}

/// The plain bus scenario: a point-to-point pair feeding a shared segment,
/// echo traffic end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusScenarioConfig {
    pub csma_nodes: usize,
    pub p2p_network: Ipv4Addr,
    pub csma_network: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub p2p_delay_ms: u64,
    pub csma_delay_ns: u64,
    pub echo_packets: u32,
    pub echo_interval_seconds: f64,
    pub echo_packet_size: usize,
    pub stop_seconds: f64,
}

impl Default for BusScenarioConfig {
    fn default() -> Self {
        Self {
            csma_nodes: 3,
            p2p_network: Ipv4Addr::new(10, 1, 1, 0),
            csma_network: Ipv4Addr::new(10, 1, 2, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            p2p_delay_ms: 2,
            csma_delay_ns: 6_560,
            echo_packets: 2,
            echo_interval_seconds: 1.0,
            echo_packet_size: 1024,
            stop_seconds: 10.0,
        }
    }
}

/// The star scenario: a hub sink fed by constant-rate on/off spokes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarScenarioConfig {
    pub spokes: usize,
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub p2p_delay_ms: u64,
    pub packet_size: usize,
    pub data_rate_bps: u64,
    pub on_seconds: f64,
    pub off_seconds: f64,
    pub start_seconds: f64,
    pub stop_seconds: f64,
}

impl Default for StarScenarioConfig {
    fn default() -> Self {
        Self {
            spokes: 8,
            network: Ipv4Addr::new(10, 1, 1, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            p2p_delay_ms: 2,
            packet_size: 137,
            data_rate_bps: 14_000,
            on_seconds: 1.0,
            off_seconds: 0.0,
            start_seconds: 1.0,
            stop_seconds: 10.0,
        }
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.dhcp.validate()?;
        self.bus.validate()?;
        self.star.validate()?;
        Ok(())
    }
}

impl DhcpScenarioConfig {
    pub fn validate(&self) -> Result<()> {
        let start = u32::from(self.pool_start);
        let end = u32::from(self.pool_end);

        if start > end {
            return Err(Error::InvalidConfig(
                "pool_start must be less than or equal to pool_end".to_string(),
            ));
        }

        let mask = u32::from(self.mask);
        let network = u32::from(self.network) & mask;
        for bound in [self.pool_start, self.pool_end] {
            if u32::from(bound) & mask != network {
                return Err(Error::InvalidConfig(format!(
                    "pool bound {bound} is outside network {}",
                    self.network
                )));
            }
        }

        // A reservation inside the dynamic range would let the pool hand
        // out a fixed address.
        let reserved = u32::from(self.reserved_ip);
        if reserved >= start && reserved <= end {
            return Err(Error::ReservationCollision(self.reserved_ip));
        }

        if self.lease_duration_seconds == 0 {
            return Err(Error::InvalidConfig(
                "lease_duration_seconds must be greater than 0".to_string(),
            ));
        }

        if self.clients == 0 {
            return Err(Error::InvalidConfig(
                "dhcp scenario needs at least one client".to_string(),
            ));
        }

        Ok(())
    }

    /// Everything the pool must never allocate: the configured exclusions
    /// plus the server's own address, the gateway, and the network and
    /// broadcast addresses.
    pub fn effective_exclusions(&self) -> BTreeSet<Ipv4Addr> {
        let mask = u32::from(self.mask);
        let network = u32::from(self.network) & mask;
        let broadcast = network | !mask;

        let mut excluded: BTreeSet<Ipv4Addr> = self.exclusions.iter().copied().collect();
        excluded.insert(self.server_ip);
        excluded.insert(self.gateway);
        excluded.insert(Ipv4Addr::from(network));
        excluded.insert(Ipv4Addr::from(broadcast));
        excluded
    }

    /// Builds the server's pool from this section.
    pub fn build_pool(&self) -> Result<AddressPool> {
        AddressPool::new(
            self.network,
            self.mask,
            self.pool_start,
            self.pool_end,
            self.effective_exclusions(),
        )
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_seconds)
    }
}

impl BusScenarioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.csma_nodes == 0 {
            return Err(Error::InvalidConfig(
                "bus scenario needs at least one shared-segment node".to_string(),
            ));
        }
        if self.echo_packet_size == 0 {
            return Err(Error::InvalidConfig(
                "echo_packet_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl StarScenarioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.spokes == 0 {
            return Err(Error::InvalidConfig(
                "star scenario needs at least one spoke".to_string(),
            ));
        }
        if self.data_rate_bps == 0 || self.packet_size == 0 {
            return Err(Error::InvalidConfig(
                "data_rate_bps and packet_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
