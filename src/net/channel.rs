//! Simulated channels: shared-medium segments and point-to-point links.

use std::time::Duration;

use crate::net::NodeId;

/// An attachment point: one interface of one node on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tap {
    pub node: NodeId,
    pub iface: usize,
}

/// A transmission medium connecting interfaces.
#[derive(Debug)]
pub enum Channel {
    /// A bus: every attached tap hears every transmission (CSMA-style).
    Shared { delay: Duration, taps: Vec<Tap> },
    /// A link with exactly two ends.
    PointToPoint { delay: Duration, ends: [Tap; 2] },
}

impl Channel {
    pub fn delay(&self) -> Duration {
        match self {
            Channel::Shared { delay, .. } | Channel::PointToPoint { delay, .. } => *delay,
        }
    }

    /// All taps attached to this channel.
    pub fn taps(&self) -> &[Tap] {
        match self {
            Channel::Shared { taps, .. } => taps,
            Channel::PointToPoint { ends, .. } => ends,
        }
    }
}
