//! Layer, channel and service wired together in-process.

use std::sync::Arc;

use compute::{ChannelConfig, ComputeChannel, RecordingTransport};
use foundation::{LayerId, Time};
use gpu::RecordingBackend;
use layers::{HeatMapConfig, HeatMapLayer, Layer};
use pretty_assertions::assert_eq;
use scene::{Camera, SurfaceSize};
use streaming::{Envelope, HeatPoint, TileState};
use worker::HeatmapService;

struct Harness {
    transport: Arc<RecordingTransport>,
    channel: Arc<ComputeChannel>,
    service: HeatmapService,
}

impl Harness {
    fn new() -> Self {
        let transport = Arc::new(RecordingTransport::new());
        let channel = Arc::new(ComputeChannel::new(ChannelConfig::default(), transport.clone()));
        Self {
            transport,
            channel,
            service: HeatmapService::new(),
        }
    }

    /// Runs requests through the service until no more traffic is produced.
    fn settle(&mut self, now: Time) {
        loop {
            let requests = self.transport.take();
            if requests.is_empty() {
                break;
            }
            for request in requests {
                for reply in self.service.handle(request) {
                    self.channel.route(reply, now);
                }
            }
        }
    }

    /// Service replies for the outstanding requests, without routing them.
    fn replies(&mut self) -> Vec<Envelope> {
        self.transport
            .take()
            .into_iter()
            .flat_map(|r| self.service.handle(r))
            .collect()
    }
}

fn points() -> Vec<HeatPoint> {
    vec![
        HeatPoint::new(39.904, 116.404, 1.0),
        HeatPoint::new(39.906, 116.406, 4.0),
        HeatPoint::new(31.23, 121.47, 2.0),
    ]
}

fn config() -> HeatMapConfig {
    HeatMapConfig {
        tile_size: 8,
        radius: 4.0,
        ..HeatMapConfig::default()
    }
}

#[test]
fn commands_sent_before_ready_are_delivered_after_load() {
    let mut h = Harness::new();
    let layer = HeatMapLayer::new(h.channel.clone(), config(), 8, Time::ZERO).unwrap();
    layer.add_points(&points(), Time::ZERO);
    assert!(h.transport.sent().is_empty());
    assert_eq!(h.channel.pending_len(), 2);

    h.channel.route(HeatmapService::loaded(), Time(0.1));
    assert_eq!(h.transport.commands(), vec!["initHeatMapMiddleware", "addPoints"]);
    h.settle(Time(0.1));

    let coords = layer.tile_coords();
    assert_eq!(coords.len(), 2);
    assert!(coords.iter().all(|c| layer.tile_state(*c) == Some(TileState::Decoded)));

    let mut backend = RecordingBackend::new();
    let uniforms = Camera::wgs84().uniforms(SurfaceSize::new(8.0, 8.0));
    assert_eq!(layer.render(&mut backend, &uniforms), 2);
    assert!(h.channel.events().is_empty());
}

#[test]
fn init_stays_first_when_its_retry_falls_behind_later_sends() {
    let mut h = Harness::new();
    let layer = HeatMapLayer::new(h.channel.clone(), config(), 8, Time::ZERO).unwrap();
    layer.add_points(&points(), Time(0.1));

    // Init is re-deferred to 0.65, behind addPoints at 0.4.
    h.channel.pump(Time(0.35));
    assert!(h.transport.sent().is_empty());

    h.channel.route(HeatmapService::loaded(), Time(0.4));
    assert_eq!(h.transport.commands(), vec!["initHeatMapMiddleware", "addPoints"]);
    h.settle(Time(0.4));

    assert_eq!(layer.tile_coords().len(), 2);
    assert_eq!(h.channel.event_count("service_error"), 0);
    assert!(h.channel.events().is_empty());
}

#[test]
fn responses_from_a_previous_zoom_are_discarded() {
    let mut h = Harness::new();
    h.channel.route(HeatmapService::loaded(), Time::ZERO);
    let layer = HeatMapLayer::new(h.channel.clone(), config(), 8, Time::ZERO).unwrap();
    layer.add_points(&points(), Time::ZERO);
    h.settle(Time::ZERO);

    // Ask for a redraw at zoom 8, but hold the service's answers back.
    layer.set_radius(6.0, Time(1.0));
    let radius_confirmed = h.replies();
    for reply in radius_confirmed {
        h.channel.route(reply, Time(1.0));
    }
    let old_tiles = h.replies();
    assert_eq!(old_tiles.len(), 2);

    // The camera moves on before those tiles are delivered.
    layer.update(8, Time(1.1));
    layer.update(9, Time(1.2));
    h.settle(Time(1.2));
    assert_eq!(layer.zoom(), 9);

    for reply in old_tiles {
        h.channel.route(reply, Time(1.3));
    }
    assert!(layer.tile_coords().iter().all(|c| c.zoom == 9));
    assert!(
        layer
            .tile_coords()
            .iter()
            .all(|c| layer.tile_state(*c) == Some(TileState::Decoded))
    );
    assert!(h.channel.events().is_empty());
}

#[test]
fn two_layers_share_one_service() {
    let mut h = Harness::new();
    h.channel.route(HeatmapService::loaded(), Time::ZERO);
    let a = HeatMapLayer::new(h.channel.clone(), config(), 6, Time::ZERO).unwrap();
    let b = HeatMapLayer::new(h.channel.clone(), config(), 6, Time::ZERO).unwrap();
    assert_eq!((a.id(), b.id()), (LayerId(1), LayerId(2)));

    a.add_points(&points()[..1], Time::ZERO);
    b.add_points(&points(), Time::ZERO);
    h.settle(Time::ZERO);

    assert_eq!(h.service.layer_count(), 2);
    assert_eq!(a.tile_coords().len(), 1);
    assert_eq!(b.tile_coords().len(), 2);
}
