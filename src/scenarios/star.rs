//! The star scenario.
//!
//! A hub node terminates one point-to-point link per spoke. Every spoke
//! runs a constant-rate on/off sender toward the hub, where a single sink
//! counts what arrives.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::apps::{OnOffSender, PacketSink};
use crate::config::StarScenarioConfig;
use crate::error::Result;
use crate::sim::time::SimTime;
use crate::sim::Simulation;

#[derive(Debug, Clone)]
pub struct SpokeSummary {
    pub sent_packets: u64,
    pub sent_bytes: u64,
}

#[derive(Debug)]
pub struct StarReport {
    pub spokes: Vec<SpokeSummary>,
    pub sink_packets: u64,
    pub sink_bytes: u64,
}

pub fn run(config: &StarScenarioConfig, trace_out: Option<&Path>) -> Result<StarReport> {
    config.validate()?;

    let mut sim = Simulation::with_trace(trace_out.is_some());
    let delay = Duration::from_millis(config.p2p_delay_ms);

    let hub = sim.net.add_node("hub");
    let spokes: Vec<_> = (0..config.spokes)
        .map(|i| sim.net.add_node(&format!("spoke{i}")))
        .collect();

    // One link per spoke, two consecutive addresses per link, hub side
    // first. All links share one network; unicast resolution is per
    // channel, so the overlap is harmless.
    let base = u32::from(config.network);
    let mut hub_addrs = Vec::with_capacity(config.spokes);
    for (k, &spoke) in spokes.iter().enumerate() {
        let link = sim.net.add_p2p_link(hub, spoke, delay);
        let hub_addr = Ipv4Addr::from(base + 2 * k as u32 + 1);
        sim.net.assign_sequential(link, hub_addr, config.mask)?;
        hub_addrs.push(hub_addr);
    }

    let sink_app = sim.install_app(hub, Box::new(PacketSink::new()));
    sim.schedule_start(sink_app, SimTime::ZERO);

    let start = SimTime::from_secs_f64(config.start_seconds);
    let stop = SimTime::from_secs_f64(config.stop_seconds);
    let sender_apps: Vec<_> = spokes
        .iter()
        .enumerate()
        .map(|(k, &spoke)| {
            let app = sim.install_app(
                spoke,
                Box::new(OnOffSender::new(
                    0,
                    hub_addrs[k],
                    config.packet_size,
                    config.data_rate_bps,
                    Duration::from_secs_f64(config.on_seconds),
                    Duration::from_secs_f64(config.off_seconds),
                )),
            );
            sim.schedule_start(app, start);
            sim.schedule_stop(app, stop);
            app
        })
        .collect();

    // Let the last in-flight packets land after the senders stop.
    sim.run_until(stop + Duration::from_secs(1));

    if let Some(path) = trace_out {
        sim.trace.write_json(path)?;
    }

    let spoke_summaries: Vec<SpokeSummary> = sender_apps
        .iter()
        .map(|&app| {
            let sender = sim
                .app(app)
                .as_any()
                .downcast_ref::<OnOffSender>()
                .ok_or_else(|| crate::error::Error::Topology("sender app type".to_string()))?;
            Ok(SpokeSummary {
                sent_packets: sender.sent_packets(),
                sent_bytes: sender.sent_bytes(),
            })
        })
        .collect::<Result<_>>()?;

    let sink = sim
        .app(sink_app)
        .as_any()
        .downcast_ref::<PacketSink>()
        .ok_or_else(|| crate::error::Error::Topology("sink app type".to_string()))?;

    info!(
        "star run complete: sink took {} packets, {} bytes",
        sink.packets(),
        sink.bytes()
    );

    Ok(StarReport {
        spokes: spoke_summaries,
        sink_packets: sink.packets(),
        sink_bytes: sink.bytes(),
    })
}
