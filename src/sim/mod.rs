//! The simulation engine.
//!
//! A [`Simulation`] owns the event queue, the network, the installed
//! applications, and the packet tracer. Execution is single-threaded and
//! event-driven: every state transition in the system happens inside an
//! application callback invoked at a specific simulated timestamp, and every
//! wait is an armed, cancellable timer. Applications receive an explicit
//! [`Context`] rather than touching any shared state directly.

pub mod event;
pub mod time;

use std::any::Any;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::net::channel::Tap;
use crate::net::node::InterfaceConfig;
use crate::net::packet::Packet;
use crate::net::{Network, NodeId};
use crate::sim::event::{EventKind, EventQueue, TimerHandle};
use crate::sim::time::SimTime;
use crate::trace::Tracer;
use crate::Result;

pub type AppId = usize;

/// A simulated application installed on a node.
///
/// All callbacks run to completion before the next event fires; nothing here
/// may block or busy-wait.
pub trait Application {
    fn start(&mut self, ctx: &mut Context<'_>);

    fn stop(&mut self, _ctx: &mut Context<'_>) {}

    /// An armed timer fired. The token is whatever the application passed
    /// when arming it.
    fn on_timer(&mut self, _ctx: &mut Context<'_>, _token: u64) {}

    /// A packet addressed to this node (or broadcast) arrived.
    fn on_packet(&mut self, _ctx: &mut Context<'_>, _packet: &Packet) {}

    /// Downcast support for post-run inspection.
    fn as_any(&self) -> &dyn Any;
}

/// The view an application gets while handling an event.
pub struct Context<'a> {
    queue: &'a mut EventQueue,
    pub net: &'a mut Network,
    pub trace: &'a mut Tracer,
    app: AppId,
    node: NodeId,
}

impl Context<'_> {
    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    /// The node this application is installed on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Arms a timer that fires after `delay` with the given token.
    pub fn arm_timer_in(&mut self, delay: Duration, token: u64) -> TimerHandle {
        let app = self.app;
        self.queue.schedule_in(delay, EventKind::Timer { app, token })
    }

    /// Arms a timer at an absolute simulated time.
    pub fn arm_timer_at(&mut self, at: SimTime, token: u64) -> TimerHandle {
        let app = self.app;
        self.queue.schedule_at(at, EventKind::Timer { app, token })
    }

    pub fn cancel_timer(&mut self, handle: TimerHandle) {
        self.queue.cancel(handle);
    }

    /// Transmits on a specific interface, resolving the destination on that
    /// channel (broadcast reaches every other tap).
    pub fn send_on(&mut self, iface: usize, packet: Packet) {
        let from = Tap {
            node: self.node,
            iface,
        };
        self.net.transmit(self.queue, self.trace, from, packet, None);
    }

    /// Replies straight to a tap on the given interface's channel, for peers
    /// that do not have an address yet.
    pub fn reply_to(&mut self, iface: usize, to: Tap, packet: Packet) {
        let from = Tap {
            node: self.node,
            iface,
        };
        self.net.transmit_to(self.queue, self.trace, from, to, packet);
    }

    /// Routes a packet toward its destination. Returns false when the node
    /// has no viable route (the packet is dropped and traced).
    pub fn send_routed(&mut self, packet: Packet) -> bool {
        self.net
            .route_and_send(self.queue, self.trace, self.node, packet)
    }

    /// Applies address/mask/gateway to an interface of this node in one step.
    pub fn assign_address(&mut self, iface: usize, config: InterfaceConfig) -> Result<()> {
        self.net.assign(self.node, iface, config)
    }

    pub fn clear_address(&mut self, iface: usize) {
        self.net.clear(self.node, iface);
    }

    pub fn iface_addr(&self, iface: usize) -> Option<Ipv4Addr> {
        self.net.nodes[self.node].addr(iface)
    }
}

/// The world: event queue, network, applications, tracer.
pub struct Simulation {
    queue: EventQueue,
    pub net: Network,
    pub trace: Tracer,
    apps: Vec<Option<Box<dyn Application>>>,
    app_nodes: Vec<NodeId>,
}

impl Simulation {
    pub fn new() -> Self {
        Self::with_trace(false)
    }

    pub fn with_trace(trace: bool) -> Self {
        Self {
            queue: EventQueue::new(),
            net: Network::new(),
            trace: Tracer::new(trace),
            apps: Vec::new(),
            app_nodes: Vec::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    /// Installs an application on a node and returns its id.
    pub fn install_app(&mut self, node: NodeId, app: Box<dyn Application>) -> AppId {
        let id = self.apps.len();
        self.apps.push(Some(app));
        self.app_nodes.push(node);
        self.net.nodes[node].apps.push(id);
        id
    }

    pub fn schedule_start(&mut self, app: AppId, at: SimTime) {
        self.queue.schedule_at(at, EventKind::Start { app });
    }

    pub fn schedule_stop(&mut self, app: AppId, at: SimTime) {
        self.queue.schedule_at(at, EventKind::Stop { app });
    }

    /// Runs until the event queue drains.
    pub fn run(&mut self) {
        while let Some((_, kind)) = self.queue.pop_due(None) {
            self.dispatch(kind);
        }
    }

    /// Runs every event scheduled at or before `until`, then advances the
    /// clock to exactly `until`.
    pub fn run_until(&mut self, until: SimTime) {
        while let Some((_, kind)) = self.queue.pop_due(Some(until)) {
            self.dispatch(kind);
        }
        self.queue.advance_to(until);
    }

    /// Borrow an application for inspection (panics on a bad id).
    pub fn app(&self, id: AppId) -> &dyn Application {
        self.apps[id]
            .as_deref()
            .expect("application is not mid-dispatch")
    }

    fn dispatch(&mut self, kind: EventKind) {
        match kind {
            EventKind::Start { app } => self.with_app(app, |app, ctx| app.start(ctx)),
            EventKind::Stop { app } => self.with_app(app, |app, ctx| app.stop(ctx)),
            EventKind::Timer { app, token } => {
                self.with_app(app, |app, ctx| app.on_timer(ctx, token));
            }
            EventKind::Deliver { node, packet } => self.deliver(node, packet),
        }
    }

    fn deliver(&mut self, node: NodeId, packet: Packet) {
        self.trace.record(self.queue.now(), node, "rx", &packet);
        if self.net.local_delivery(node, &packet) {
            let apps = self.net.nodes[node].apps.clone();
            for app in apps {
                self.with_app(app, |app, ctx| app.on_packet(ctx, &packet));
            }
        } else if self.net.nodes[node].forwarding {
            self.trace.record(self.queue.now(), node, "fwd", &packet);
            self.net
                .route_and_send(&mut self.queue, &mut self.trace, node, packet);
        } else {
            self.trace.record(self.queue.now(), node, "drop", &packet);
        }
    }

    fn with_app<F>(&mut self, app: AppId, f: F)
    where
        F: FnOnce(&mut dyn Application, &mut Context<'_>),
    {
        let Some(mut boxed) = self.apps[app].take() else {
            return;
        };
        let mut ctx = Context {
            queue: &mut self.queue,
            net: &mut self.net,
            trace: &mut self.trace,
            app,
            node: self.app_nodes[app],
        };
        f(boxed.as_mut(), &mut ctx);
        self.apps[app] = Some(boxed);
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::packet::Payload;
    use std::time::Duration;

    /// Counts its own timer fires and received packets.
    struct Probe {
        fires: u32,
        packets: u32,
        started_at: Option<SimTime>,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                fires: 0,
                packets: 0,
                started_at: None,
            }
        }
    }

    impl Application for Probe {
        fn start(&mut self, ctx: &mut Context<'_>) {
            self.started_at = Some(ctx.now());
            ctx.arm_timer_in(Duration::from_secs(1), 7);
        }

        fn on_timer(&mut self, _ctx: &mut Context<'_>, token: u64) {
            assert_eq!(token, 7);
            self.fires += 1;
        }

        fn on_packet(&mut self, _ctx: &mut Context<'_>, _packet: &Packet) {
            self.packets += 1;
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_start_and_timer_dispatch() {
        let mut sim = Simulation::new();
        let n0 = sim.net.add_node("n0");
        sim.net.add_shared_segment(Duration::from_millis(2), &[n0]);
        let app = sim.install_app(n0, Box::new(Probe::new()));
        sim.schedule_start(app, SimTime::from_secs(2));
        sim.run();

        let probe = sim.app(app).as_any().downcast_ref::<Probe>().unwrap();
        assert_eq!(probe.started_at, Some(SimTime::from_secs(2)));
        assert_eq!(probe.fires, 1);
        assert_eq!(sim.now(), SimTime::from_secs(3));
    }

    #[test]
    fn test_broadcast_delivery_to_apps() {
        let mut sim = Simulation::new();
        let n0 = sim.net.add_node("n0");
        let n1 = sim.net.add_node("n1");
        let n2 = sim.net.add_node("n2");
        sim.net
            .add_shared_segment(Duration::from_millis(2), &[n0, n1, n2]);
        let a1 = sim.install_app(n1, Box::new(Probe::new()));
        let a2 = sim.install_app(n2, Box::new(Probe::new()));

        let packet = Packet::broadcast(Payload::EchoRequest { seq: 0 }, 64);
        sim.net.transmit(
            &mut sim.queue,
            &mut sim.trace,
            Tap { node: n0, iface: 0 },
            packet,
            None,
        );
        sim.run();

        for app in [a1, a2] {
            let probe = sim.app(app).as_any().downcast_ref::<Probe>().unwrap();
            assert_eq!(probe.packets, 1);
        }
    }

    #[test]
    fn test_run_until_stops_the_clock() {
        let mut sim = Simulation::new();
        let n0 = sim.net.add_node("n0");
        sim.net.add_shared_segment(Duration::from_millis(2), &[n0]);
        let app = sim.install_app(n0, Box::new(Probe::new()));
        sim.schedule_start(app, SimTime::from_secs(10));
        sim.run_until(SimTime::from_secs(5));

        assert_eq!(sim.now(), SimTime::from_secs(5));
        let probe = sim.app(app).as_any().downcast_ref::<Probe>().unwrap();
        assert!(probe.started_at.is_none());
    }
}
