//! Client side of the compute channel.
//!
//! The channel multiplexes every layer over one link to the heat-map service.
//! It owns the routing table (`LayerId -> layer`), gates outbound traffic on
//! service readiness, and retries held commands on an injected clock.
//!
//! Routing of inbound envelopes, first match wins:
//! 1. the id names a live layer: deliver to it;
//! 2. service scope with a lifecycle command: handle here;
//! 3. service scope with anything else: broadcast to every layer;
//! 4. otherwise the message is unroutable and dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use foundation::{LayerId, Time};
use parking_lot::{Mutex, RwLock};
use runtime::{Event, EventBus, Metrics, MetricsSnapshot};
use streaming::{Envelope, InboundCommand, OutboundCommand};
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::pending::{CommandState, Deferred, PendingCommand, PendingQueue};
use crate::transport::Transport;

/// Receives inbound commands addressed to one layer (or broadcast to all).
pub trait CommandSink: Send + Sync {
    fn handle(&self, command: InboundCommand, now: Time);
}

/// How an inbound envelope was dispatched.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered(LayerId),
    Control,
    Broadcast(usize),
    Unroutable(LayerId),
    Malformed,
}

pub struct ComputeChannel {
    config: ChannelConfig,
    transport: Arc<dyn Transport>,
    ready: AtomicBool,
    next_layer: AtomicU64,
    next_seq: AtomicU64,
    layers: RwLock<BTreeMap<LayerId, Weak<dyn CommandSink>>>,
    pending: Mutex<PendingQueue>,
    events: Mutex<EventBus>,
    metrics: Mutex<Metrics>,
}

impl std::fmt::Debug for ComputeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeChannel")
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .field("layers", &self.layer_ids())
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl ComputeChannel {
    pub fn new(config: ChannelConfig, transport: Arc<dyn Transport>) -> Self {
        let pending = PendingQueue::new(&config);
        let events = EventBus::with_capacity(config.event_capacity);
        Self {
            config,
            transport,
            ready: AtomicBool::new(false),
            next_layer: AtomicU64::new(1),
            next_seq: AtomicU64::new(0),
            layers: RwLock::new(BTreeMap::new()),
            pending: Mutex::new(pending),
            events: Mutex::new(events),
            metrics: Mutex::new(Metrics::new()),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Reserves a fresh layer id. Ids start at 1; 0 is the service scope.
    pub fn allocate_id(&self) -> LayerId {
        LayerId(self.next_layer.fetch_add(1, Ordering::Relaxed))
    }

    pub fn register(&self, id: LayerId, sink: Weak<dyn CommandSink>) {
        self.layers.write().insert(id, sink);
        debug!(layer = %id, "layer registered");
    }

    pub fn unregister(&self, id: LayerId) -> bool {
        let removed = self.layers.write().remove(&id).is_some();
        if removed {
            debug!(layer = %id, "layer unregistered");
        }
        removed
    }

    pub fn is_registered(&self, id: LayerId) -> bool {
        self.live_sink(id).is_some()
    }

    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.layers.read().keys().copied().collect()
    }

    /// Sends `command` for `layer_id`, or holds it for retry while the service
    /// is not ready. Never blocks and never reports failure to the caller
    /// beyond the returned state.
    pub fn send(&self, layer_id: LayerId, command: OutboundCommand, now: Time) -> CommandState {
        let cmd = PendingCommand {
            layer_id,
            command,
            attempt: 1,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        if self.is_ready() {
            return self.dispatch(cmd);
        }
        self.metrics.lock().inc_counter("channel.not_ready", 1);
        self.defer(cmd, now)
    }

    /// Re-attempts every held command whose delay has elapsed at `now`.
    /// Returns how many were looked at.
    pub fn pump(&self, now: Time) -> usize {
        let due = self.pending.lock().take_due(now);
        let n = due.len();
        for mut cmd in due {
            cmd.attempt += 1;
            if self.is_ready() {
                self.dispatch(cmd);
            } else {
                self.metrics.lock().inc_counter("channel.not_ready", 1);
                self.defer(cmd, now);
            }
        }
        self.update_pending_gauge();
        n
    }

    /// Parses and routes one JSON-encoded envelope.
    pub fn route_text(&self, text: &str, now: Time) -> RouteOutcome {
        match Envelope::from_json(text) {
            Ok(envelope) => self.route(envelope, now),
            Err(err) => {
                warn!(error = %err, "dropping inbound message");
                self.report("malformed_payload", err.to_string());
                RouteOutcome::Malformed
            }
        }
    }

    pub fn route(&self, envelope: Envelope, now: Time) -> RouteOutcome {
        let Envelope {
            layer_id,
            command,
            payload,
        } = envelope;
        self.metrics.lock().inc_counter("channel.received", 1);

        let command = match InboundCommand::decode(&command, payload) {
            Ok(command) => command,
            Err(err) => {
                warn!(layer = %layer_id, error = %err, "dropping inbound message");
                self.report("malformed_payload", format!("layer {layer_id}: {err}"));
                return RouteOutcome::Malformed;
            }
        };

        // The routing lock is released before any handler runs, so handlers
        // may send or register freely.
        if let Some(sink) = self.live_sink(layer_id) {
            sink.handle(command, now);
            return RouteOutcome::Delivered(layer_id);
        }

        if layer_id.is_service() {
            if command.is_service_control() {
                self.handle_control(command);
                return RouteOutcome::Control;
            }
            let sinks = self.live_sinks();
            for sink in &sinks {
                sink.handle(command.clone(), now);
            }
            debug!(command = command.name(), layers = sinks.len(), "broadcast");
            return RouteOutcome::Broadcast(sinks.len());
        }

        error!(layer = %layer_id, command = command.name(), "no layer for message");
        self.report(
            "unroutable",
            format!("{} addressed to unknown layer {layer_id}", command.name()),
        );
        RouteOutcome::Unroutable(layer_id)
    }

    /// Records a diagnostic on the channel's event bus. The bus keeps the most
    /// recent `event_capacity` events; long-running callers drain it.
    pub fn report(&self, kind: &'static str, message: impl Into<String>) {
        self.events.lock().emit(kind, message);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().events().cloned().collect()
    }

    pub fn event_count(&self, kind: &str) -> usize {
        self.events.lock().count(kind)
    }

    pub fn drain_events(&self) -> Vec<Event> {
        self.events.lock().drain()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.metrics.lock().counter(name)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.lock().snapshot()
    }

    fn handle_control(&self, command: InboundCommand) {
        match command {
            InboundCommand::WorkerLoaded => {
                if !self.ready.swap(true, Ordering::AcqRel) {
                    info!("compute service ready");
                }
                let held = self.pending.lock().take_all();
                if !held.is_empty() {
                    debug!(count = held.len(), "flushing held commands");
                }
                for cmd in held {
                    self.dispatch(cmd);
                }
                self.update_pending_gauge();
            }
            InboundCommand::Debug(payload) => debug!(%payload, "service debug"),
            InboundCommand::Error(payload) => {
                error!(%payload, "service error");
                self.report("service_error", payload.to_string());
            }
            other => debug!(command = other.name(), "ignoring control message"),
        }
    }

    fn dispatch(&self, cmd: PendingCommand) -> CommandState {
        let name = cmd.command.name();
        match self.transport.send(cmd.command.into_envelope(cmd.layer_id)) {
            Ok(()) => {
                self.metrics.lock().inc_counter("channel.sent", 1);
                CommandState::Sent
            }
            Err(err) => {
                error!(layer = %cmd.layer_id, command = name, error = %err, "send failed");
                self.report("transport_closed", format!("{name} for layer {}: {err}", cmd.layer_id));
                CommandState::Abandoned
            }
        }
    }

    fn defer(&self, cmd: PendingCommand, now: Time) -> CommandState {
        let outcome = self.pending.lock().defer(cmd, now);
        self.update_pending_gauge();
        match outcome {
            Deferred::Waiting { attempt, due } => {
                debug!(attempt, due = due.seconds(), "service not ready; command held");
                CommandState::Waiting { attempt }
            }
            Deferred::Abandoned(cmd) => {
                let name = cmd.command.name();
                error!(
                    layer = %cmd.layer_id,
                    command = name,
                    attempts = cmd.attempt,
                    "service never became ready; command abandoned"
                );
                self.metrics.lock().inc_counter("channel.abandoned", 1);
                self.report(
                    "command_timeout",
                    format!("{name} for layer {} after {} attempts", cmd.layer_id, cmd.attempt),
                );
                CommandState::Abandoned
            }
        }
    }

    fn update_pending_gauge(&self) {
        let len = self.pending.lock().len();
        self.metrics.lock().set_gauge("channel.pending", len as i64);
    }

    fn live_sink(&self, id: LayerId) -> Option<Arc<dyn CommandSink>> {
        self.layers.read().get(&id).and_then(Weak::upgrade)
    }

    fn live_sinks(&self) -> Vec<Arc<dyn CommandSink>> {
        self.layers.read().values().filter_map(Weak::upgrade).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Weak};

    use super::{CommandSink, ComputeChannel, RouteOutcome};
    use crate::config::ChannelConfig;
    use crate::pending::CommandState;
    use crate::transport::RecordingTransport;
    use foundation::{LayerId, Time};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use runtime::Frame;
    use serde_json::json;
    use streaming::{Envelope, InboundCommand, OutboundCommand};

    #[derive(Default)]
    struct Recorder {
        got: Mutex<Vec<String>>,
    }

    impl CommandSink for Recorder {
        fn handle(&self, command: InboundCommand, _now: Time) {
            self.got.lock().push(command.name().to_string());
        }
    }

    fn channel() -> (Arc<RecordingTransport>, ComputeChannel) {
        let transport = Arc::new(RecordingTransport::new());
        let channel = ComputeChannel::new(ChannelConfig::default(), transport.clone());
        (transport, channel)
    }

    fn attach(channel: &ComputeChannel) -> (LayerId, Arc<Recorder>) {
        let sink = Arc::new(Recorder::default());
        let id = channel.allocate_id();
        let weak: Weak<dyn CommandSink> = Arc::downgrade(&sink) as Weak<dyn CommandSink>;
        channel.register(id, weak);
        (id, sink)
    }

    fn loaded() -> Envelope {
        InboundCommand::WorkerLoaded.into_envelope(LayerId::SERVICE)
    }

    #[test]
    fn ids_start_after_service_scope() {
        let (_, channel) = channel();
        assert_eq!(channel.allocate_id(), LayerId(1));
        assert_eq!(channel.allocate_id(), LayerId(2));
    }

    #[test]
    fn never_ready_gives_up_after_exactly_ten_attempts() {
        let (transport, channel) = channel();
        let state = channel.send(LayerId(1), OutboundCommand::SetZoom(5), Time::ZERO);
        assert_eq!(state, CommandState::Waiting { attempt: 1 });

        let mut frame = Frame::first(1.0 / 60.0);
        for _ in 0..600 {
            channel.pump(frame.time);
            frame = frame.next();
        }

        assert_eq!(channel.counter("channel.not_ready"), 10);
        assert_eq!(channel.counter("channel.abandoned"), 1);
        assert_eq!(channel.event_count("command_timeout"), 1);
        assert_eq!(channel.pending_len(), 0);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn retry_limit_of_one_abandons_immediately() {
        let transport = Arc::new(RecordingTransport::new());
        let channel = ComputeChannel::new(
            ChannelConfig {
                retry_limit: 1,
                ..ChannelConfig::default()
            },
            transport,
        );
        let state = channel.send(LayerId(1), OutboundCommand::SetRadius(4.0), Time::ZERO);
        assert_eq!(state, CommandState::Abandoned);
        assert_eq!(channel.event_count("command_timeout"), 1);
    }

    #[test]
    fn ready_flushes_held_commands_in_order() {
        let (transport, channel) = channel();
        channel.send(LayerId(1), OutboundCommand::SetZoom(3), Time::ZERO);
        channel.send(LayerId(1), OutboundCommand::SetRadius(9.0), Time(0.1));
        channel.pump(Time(0.35));
        assert!(transport.sent().is_empty());

        assert_eq!(channel.route(loaded(), Time(0.4)), RouteOutcome::Control);
        assert!(channel.is_ready());
        assert_eq!(transport.commands(), vec!["setZoom", "setRadius"]);
        assert_eq!(channel.pending_len(), 0);

        let state = channel.send(LayerId(1), OutboundCommand::SetZoom(4), Time(0.5));
        assert_eq!(state, CommandState::Sent);
        assert_eq!(transport.sent().len(), 3);
    }

    #[test]
    fn addressed_message_reaches_only_its_layer() {
        let (_, channel) = channel();
        let (a, sink_a) = attach(&channel);
        let (_, sink_b) = attach(&channel);

        let env = Envelope::new(a, "zoomSeted", json!({"zoom": 7}));
        assert_eq!(channel.route(env, Time::ZERO), RouteOutcome::Delivered(a));
        assert_eq!(*sink_a.got.lock(), vec!["zoomSeted"]);
        assert!(sink_b.got.lock().is_empty());
    }

    #[test]
    fn service_scope_non_control_is_broadcast_once_each() {
        let (_, channel) = channel();
        let sinks: Vec<_> = (0..3).map(|_| attach(&channel).1).collect();

        let env = Envelope::new(LayerId::SERVICE, "somethingNew", json!(null));
        assert_eq!(channel.route(env, Time::ZERO), RouteOutcome::Broadcast(3));
        for sink in &sinks {
            assert_eq!(*sink.got.lock(), vec!["somethingNew"]);
        }
    }

    #[test]
    fn unknown_layer_is_unroutable() {
        let (_, channel) = channel();
        let env = Envelope::new(LayerId(99), "zoomSeted", json!({"zoom": 1}));
        assert_eq!(channel.route(env, Time::ZERO), RouteOutcome::Unroutable(LayerId(99)));
        assert_eq!(channel.event_count("unroutable"), 1);
    }

    #[test]
    fn unregistered_and_dropped_layers_are_unroutable() {
        let (_, channel) = channel();
        let (a, sink_a) = attach(&channel);
        let (b, _) = attach(&channel);
        drop(sink_a);
        assert!(channel.unregister(b));
        assert!(!channel.is_registered(a));

        for id in [a, b] {
            let env = Envelope::new(id, "info", json!("x"));
            assert_eq!(channel.route(env, Time::ZERO), RouteOutcome::Unroutable(id));
        }
        assert_eq!(channel.event_count("unroutable"), 2);
    }

    #[test]
    fn service_error_is_reported_not_broadcast() {
        let (_, channel) = channel();
        let (_, sink) = attach(&channel);
        let env = Envelope::new(LayerId::SERVICE, "error", json!("boom"));
        assert_eq!(channel.route(env, Time::ZERO), RouteOutcome::Control);
        assert_eq!(channel.event_count("service_error"), 1);
        assert!(sink.got.lock().is_empty());
    }

    #[test]
    fn malformed_traffic_is_dropped() {
        let (_, channel) = channel();
        let (a, sink) = attach(&channel);
        let env = Envelope::new(a, "zoomSeted", json!("high"));
        assert_eq!(channel.route(env, Time::ZERO), RouteOutcome::Malformed);
        assert_eq!(channel.route_text("not json", Time::ZERO), RouteOutcome::Malformed);
        assert_eq!(channel.event_count("malformed_payload"), 2);
        assert!(sink.got.lock().is_empty());
    }

    #[test]
    fn json_envelopes_route_like_values() {
        let (transport, channel) = channel();
        channel.send(LayerId(1), OutboundCommand::SetZoom(2), Time::ZERO);
        assert_eq!(
            channel.route_text(r#"[0,"workerLoaded",null]"#, Time::ZERO),
            RouteOutcome::Control
        );
        assert_eq!(transport.commands(), vec!["setZoom"]);
    }

    struct Echo {
        id: LayerId,
        channel: Arc<ComputeChannel>,
    }

    impl CommandSink for Echo {
        fn handle(&self, _command: InboundCommand, now: Time) {
            self.channel.send(self.id, OutboundCommand::SetZoom(1), now);
        }
    }

    #[test]
    fn handlers_may_send_while_being_routed() {
        let transport = Arc::new(RecordingTransport::new());
        let channel = Arc::new(ComputeChannel::new(ChannelConfig::default(), transport.clone()));
        channel.route(loaded(), Time::ZERO);

        let id = channel.allocate_id();
        let echo = Arc::new(Echo {
            id,
            channel: channel.clone(),
        });
        let weak: Weak<dyn CommandSink> = Arc::downgrade(&echo) as Weak<dyn CommandSink>;
        channel.register(id, weak);

        channel.route(Envelope::new(id, "info", json!(1)), Time::ZERO);
        channel.route(Envelope::new(LayerId::SERVICE, "info", json!(2)), Time::ZERO);
        assert_eq!(transport.commands(), vec!["setZoom", "setZoom"]);
    }

    #[test]
    fn event_log_keeps_only_the_newest_entries() {
        let transport = Arc::new(RecordingTransport::new());
        let channel = ComputeChannel::new(
            ChannelConfig {
                event_capacity: 3,
                ..ChannelConfig::default()
            },
            transport,
        );
        for id in 10..15 {
            channel.route(Envelope::new(LayerId(id), "info", json!(null)), Time::ZERO);
        }
        let events = channel.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].seq, 2);
        assert!(events[2].message.contains("unknown layer 14"));
    }
}
