//! Traffic applications: echo request/reply and rate-paced on/off streams.

pub mod echo;
pub mod onoff;

pub use echo::{EchoClient, EchoServer};
pub use onoff::{OnOffSender, PacketSink};
