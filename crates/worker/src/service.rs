//! Reference heat-map compute service.
//!
//! Speaks the compute-channel protocol from the service side: one state per
//! layer id, every setter confirmed, tiles rendered on request. Failures are
//! reported as `error` messages on the service scope.

use std::collections::BTreeMap;

use foundation::LayerId;
use serde_json::Value;
use streaming::{
    Envelope, GradientSet, HeatPoint, InboundCommand, MaxIntensitySet, OutboundCommand,
    PointsAdded, RadiusSet, TileCoord, TileImage, ZoomSet,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::raster::HeatParams;

#[derive(Debug, Clone)]
struct LayerState {
    params: HeatParams,
    points: Vec<HeatPoint>,
}

#[derive(Debug, Default)]
pub struct HeatmapService {
    layers: BTreeMap<LayerId, LayerState>,
}

impl HeatmapService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announcement sent once the service can take commands.
    pub fn loaded() -> Envelope {
        InboundCommand::WorkerLoaded.into_envelope(LayerId::SERVICE)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Handles one command and returns the replies, in order.
    pub fn handle(&mut self, envelope: Envelope) -> Vec<Envelope> {
        let Envelope {
            layer_id,
            command,
            payload,
        } = envelope;
        let command = match OutboundCommand::decode(&command, payload) {
            Ok(command) => command,
            Err(err) => return vec![service_error(format!("layer {layer_id}: {err}"))],
        };

        if let OutboundCommand::InitHeatMapMiddleware(init) = command {
            if init.gradient.is_empty() {
                return vec![service_error(format!("layer {layer_id}: empty gradient"))];
            }
            debug!(layer = %layer_id, zoom = init.zoom, "layer initialized");
            self.layers.insert(
                layer_id,
                LayerState {
                    params: init.into(),
                    points: Vec::new(),
                },
            );
            return Vec::new();
        }

        let Some(state) = self.layers.get_mut(&layer_id) else {
            return vec![service_error(format!(
                "{} for uninitialized layer {layer_id}",
                command.name()
            ))];
        };

        let reply = match command {
            OutboundCommand::InitHeatMapMiddleware(_) => return Vec::new(),
            OutboundCommand::SetRadius(radius) => {
                state.params.radius = radius;
                InboundCommand::RadiusSet(RadiusSet { radius })
            }
            OutboundCommand::SetMaxIntensity(max_intensity) => {
                state.params.max_intensity = max_intensity;
                InboundCommand::MaxIntensitySet(MaxIntensitySet { max_intensity })
            }
            OutboundCommand::SetZoom(zoom) => {
                state.params.zoom = zoom;
                InboundCommand::ZoomSet(ZoomSet { zoom })
            }
            OutboundCommand::SetGradient(stops) => {
                if stops.is_empty() {
                    return vec![service_error(format!("layer {layer_id}: empty gradient"))];
                }
                let length = stops.len();
                state.params.gradient = stops;
                InboundCommand::GradientSet(GradientSet { length })
            }
            OutboundCommand::AddPoints(points) => {
                let heater = state.params.heater(&points);
                state.points = points;
                info!(layer = %layer_id, points = state.points.len(), heater, "points replaced");
                InboundCommand::PointsAdded(PointsAdded {
                    points_length: state.points.len(),
                    heater,
                })
            }
            OutboundCommand::CreateTile(t) => {
                let last = TileCoord::tiles_per_axis(state.params.zoom);
                if t.x >= last || t.y >= last {
                    return vec![service_error(format!(
                        "layer {layer_id}: tile {},{} outside zoom {}",
                        t.x, t.y, state.params.zoom
                    ))];
                }
                let coord = TileCoord::new(state.params.zoom, t.y, t.x);
                let rgba = state.params.render_tile(&state.points, t.x, t.y);
                InboundCommand::TileCreated(TileImage::encode(coord, &rgba))
            }
        };
        vec![reply.into_envelope(layer_id)]
    }

    /// Serves requests until either end of the link closes.
    pub async fn run(
        mut self,
        mut requests: UnboundedReceiver<Envelope>,
        replies: UnboundedSender<Envelope>,
    ) {
        if replies.send(Self::loaded()).is_err() {
            return;
        }
        info!("heat map service started");
        while let Some(envelope) = requests.recv().await {
            for reply in self.handle(envelope) {
                if replies.send(reply).is_err() {
                    warn!("reply channel closed; stopping heat map service");
                    return;
                }
            }
        }
        info!("heat map service stopped");
    }
}

fn service_error(message: String) -> Envelope {
    warn!(%message, "heat map service error");
    InboundCommand::Error(Value::String(message)).into_envelope(LayerId::SERVICE)
}
