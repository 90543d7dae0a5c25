//! Packet tracing and topology layout output.
//!
//! The tracer is the counterpart of pcap capture in the reference scripts:
//! every transmit, receive, forward, and drop is recorded with its simulated
//! timestamp and can be dumped to a JSON file after the run. [`Layout`] holds
//! the node positions the animation output needs.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::net::packet::Packet;
use crate::net::NodeId;
use crate::sim::time::SimTime;

/// One recorded packet event.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub at_secs: f64,
    pub node: NodeId,
    /// One of `tx`, `rx`, `fwd`, `drop`.
    pub event: &'static str,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub kind: &'static str,
    pub size: usize,
}

/// Records packet events when enabled; a disabled tracer costs nothing.
#[derive(Debug, Default)]
pub struct Tracer {
    enabled: bool,
    events: Vec<TraceEvent>,
}

impl Tracer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: Vec::new(),
        }
    }

    pub fn record(&mut self, at: SimTime, node: NodeId, event: &'static str, packet: &Packet) {
        if !self.enabled {
            return;
        }
        self.events.push(TraceEvent {
            at_secs: at.as_secs_f64(),
            node,
            event,
            src: packet.src,
            dst: packet.dst,
            kind: packet.payload.kind(),
            size: packet.size,
        });
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Number of recorded events of one kind (`tx`, `rx`, `fwd`, `drop`).
    pub fn count(&self, event: &str) -> usize {
        self.events.iter().filter(|e| e.event == event).count()
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.events)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Node positions for animation output.
#[derive(Debug, Default, Serialize)]
pub struct Layout {
    positions: BTreeMap<NodeId, (f64, f64)>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&mut self, node: NodeId, x: f64, y: f64) {
        self.positions.insert(node, (x, y));
    }

    pub fn position(&self, node: NodeId) -> Option<(f64, f64)> {
        self.positions.get(&node).copied()
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
