//! Heat-map layer.
//!
//! Points live here; pixels are produced by the heat-map compute service. The
//! layer keeps a [`TileRegistry`] for its points at the current zoom, asks the
//! service for every tile whenever a visual parameter changes, and draws the
//! tiles whose imagery has arrived.

use std::sync::{Arc, Weak};

use compute::{CommandSink, ComputeChannel};
use foundation::{LayerId, MeshHandle, TextureHandle, Time};
use gpu::RenderBackend;
use parking_lot::Mutex;
use scene::CameraUniforms;
use serde::{Deserialize, Serialize};
use streaming::{
    ApplyOutcome, CreateTile, HeatPoint, InboundCommand, InitPayload, OutboundCommand, TileCoord,
    TileImage, TileRegistry, TileState, UNBOUNDED_INTENSITY,
};
use tracing::{debug, error, info, warn};

use crate::gradient::{ColorSpec, Gradient, GradientError, default_gradient};
use crate::layer::Layer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeatMapConfig {
    /// Influence radius of each point, in tile pixels.
    pub radius: f64,
    /// Tile edge length in pixels.
    pub tile_size: u32,
    pub gradient: Vec<ColorSpec>,
    /// Value mapped to the hottest color; `<= 0` means "scale to the data".
    pub max_intensity: f64,
}

impl Default for HeatMapConfig {
    fn default() -> Self {
        Self {
            radius: 25.0,
            tile_size: 256,
            gradient: default_gradient(),
            max_intensity: UNBOUNDED_INTENSITY,
        }
    }
}

/// Non-positive (or NaN) intensities become the unbounded sentinel.
pub fn normalize_max_intensity(value: f64) -> f64 {
    if value > 0.0 { value } else { UNBOUNDED_INTENSITY }
}

#[derive(Debug)]
struct State {
    points: Vec<HeatPoint>,
    radius: f64,
    tile_size: u32,
    gradient: Gradient,
    max_intensity: f64,
    registry: TileRegistry,
    /// Zoom last told to the service.
    last_zoom: u8,
    /// Handles of evicted tiles, released on the next render.
    retired: Vec<(Option<MeshHandle>, Option<TextureHandle>)>,
}

impl State {
    fn rebuild(&mut self, zoom: u8) {
        let evicted = self.registry.rebuild(&self.points, zoom);
        self.retired.extend(evicted.iter().map(|tile| tile.handles()));
    }

    fn tile_requests(&self) -> Vec<OutboundCommand> {
        self.registry
            .coords()
            .map(|c| OutboundCommand::CreateTile(CreateTile { x: c.col, y: c.row }))
            .collect()
    }
}

/// A heat map over weighted points, rendered tile by tile.
///
/// Created behind an `Arc` so the compute channel can route replies back to
/// it; dropping the last handle removes it from the routing table.
#[derive(Debug)]
pub struct HeatMapLayer {
    id: LayerId,
    channel: Arc<ComputeChannel>,
    state: Mutex<State>,
}

impl HeatMapLayer {
    /// Registers a new layer and sends the service its initial parameters.
    ///
    /// `zoom` is the camera's current level.
    pub fn new(
        channel: Arc<ComputeChannel>,
        config: HeatMapConfig,
        zoom: u8,
        now: Time,
    ) -> Result<Arc<Self>, GradientError> {
        let gradient = Gradient::parse(&config.gradient)?;
        let max_intensity = normalize_max_intensity(config.max_intensity);
        let init = InitPayload {
            radius: config.radius,
            tile_size: config.tile_size,
            gradient: gradient.stops().to_vec(),
            max_intensity,
            zoom,
        };

        let id = channel.allocate_id();
        let layer = Arc::new(Self {
            id,
            channel: channel.clone(),
            state: Mutex::new(State {
                points: Vec::new(),
                radius: config.radius,
                tile_size: config.tile_size,
                gradient,
                max_intensity,
                registry: TileRegistry::new(zoom),
                last_zoom: zoom,
                retired: Vec::new(),
            }),
        });
        let weak = Arc::downgrade(&layer);
        let sink: Weak<dyn CommandSink> = weak;
        channel.register(id, sink);
        info!(layer = %id, zoom, "heat map layer created");

        layer.send(OutboundCommand::InitHeatMapMiddleware(init), now);
        Ok(layer)
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Appends `points` and sends the service the full point list.
    pub fn add_points(&self, points: &[HeatPoint], now: Time) {
        let all = {
            let mut state = self.state.lock();
            state.points.extend_from_slice(points);
            let zoom = state.registry.zoom();
            state.rebuild(zoom);
            state.points.clone()
        };
        self.send(OutboundCommand::AddPoints(all), now);
    }

    pub fn set_radius(&self, radius: f64, now: Time) {
        self.state.lock().radius = radius;
        self.send(OutboundCommand::SetRadius(radius), now);
    }

    pub fn set_max_intensity(&self, max_intensity: f64, now: Time) {
        let value = normalize_max_intensity(max_intensity);
        self.state.lock().max_intensity = value;
        self.send(OutboundCommand::SetMaxIntensity(value), now);
    }

    /// Replaces the color ramp. A malformed ramp leaves the current one in
    /// place and sends nothing.
    pub fn set_gradient(&self, gradient: &[ColorSpec], now: Time) -> Result<(), GradientError> {
        let parsed = Gradient::parse(gradient)?;
        let stops = parsed.stops().to_vec();
        self.state.lock().gradient = parsed;
        self.send(OutboundCommand::SetGradient(stops), now);
        Ok(())
    }

    pub fn points_len(&self) -> usize {
        self.state.lock().points.len()
    }

    pub fn radius(&self) -> f64 {
        self.state.lock().radius
    }

    pub fn max_intensity(&self) -> f64 {
        self.state.lock().max_intensity
    }

    pub fn gradient(&self) -> Gradient {
        self.state.lock().gradient.clone()
    }

    /// Zoom the tile registry is built for.
    pub fn zoom(&self) -> u8 {
        self.state.lock().registry.zoom()
    }

    pub fn tile_coords(&self) -> Vec<TileCoord> {
        self.state.lock().registry.coords().collect()
    }

    pub fn tile_state(&self, coord: TileCoord) -> Option<TileState> {
        self.state.lock().registry.get(coord.key()).map(|t| t.state())
    }

    /// Releases every GPU resource held by the layer's tiles.
    pub fn release_resources(&self, backend: &mut dyn RenderBackend) {
        let mut state = self.state.lock();
        let mut handles: Vec<_> = state.retired.drain(..).collect();
        for (_, tile) in state.registry.iter_mut() {
            handles.push((tile.mesh.take(), tile.texture.take()));
        }
        drop(state);
        release(backend, handles);
    }

    fn send(&self, command: OutboundCommand, now: Time) {
        self.channel.send(self.id, command, now);
    }

    fn send_all(&self, commands: Vec<OutboundCommand>, now: Time) {
        for command in commands {
            self.send(command, now);
        }
    }

    /// Asks the service for every tile currently in the registry.
    fn refresh_tiles(&self, now: Time) {
        let requests = self.state.lock().tile_requests();
        debug!(layer = %self.id, tiles = requests.len(), "requesting tiles");
        self.send_all(requests, now);
    }

    fn apply_tile(&self, image: TileImage) {
        let outcome = self.state.lock().registry.apply_image(&image);
        match outcome {
            Ok(ApplyOutcome::Applied(key)) => {
                debug!(layer = %self.id, tile = %key, "tile imagery received");
            }
            Ok(ApplyOutcome::Stale(key)) => {
                debug!(layer = %self.id, tile = %key, "discarding stale tile");
            }
            Err(err) => {
                warn!(layer = %self.id, error = %err, "dropping tile");
                self.channel
                    .report("malformed_payload", format!("layer {}: {err}", self.id));
            }
        }
    }
}

impl CommandSink for HeatMapLayer {
    fn handle(&self, command: InboundCommand, now: Time) {
        match command {
            InboundCommand::PointsAdded(p) => {
                info!(layer = %self.id, points = p.points_length, heater = p.heater, "points added");
                self.refresh_tiles(now);
            }
            InboundCommand::GradientSet(g) => {
                info!(layer = %self.id, stops = g.length, "gradient updated");
                self.refresh_tiles(now);
            }
            InboundCommand::ZoomSet(z) => {
                info!(layer = %self.id, zoom = z.zoom, "service zoom updated");
                self.state.lock().rebuild(z.zoom);
                self.refresh_tiles(now);
            }
            InboundCommand::MaxIntensitySet(m) => {
                info!(layer = %self.id, max_intensity = m.max_intensity, "max intensity updated");
                self.refresh_tiles(now);
            }
            InboundCommand::RadiusSet(r) => {
                info!(layer = %self.id, radius = r.radius, "radius updated");
                self.refresh_tiles(now);
            }
            InboundCommand::TileCreated(image) => self.apply_tile(image),
            InboundCommand::Debug(payload) => debug!(layer = %self.id, %payload, "service debug"),
            InboundCommand::Info(payload) => info!(layer = %self.id, %payload, "service info"),
            InboundCommand::Error(payload) => {
                error!(layer = %self.id, %payload, "service error");
                self.channel
                    .report("service_error", format!("layer {}: {payload}", self.id));
            }
            other @ (InboundCommand::WorkerLoaded | InboundCommand::Unknown { .. }) => {
                error!(layer = %self.id, command = other.name(), "no handler for command");
                self.channel.report(
                    "unknown_command",
                    format!("layer {}: {}", self.id, other.name()),
                );
            }
        }
    }
}

impl Layer for HeatMapLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    /// Tells the service about zoom changes. Only a change between two
    /// consecutive frames sends anything.
    fn update(&self, level: u8, now: Time) {
        let changed = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.last_zoom, level) != level
        };
        if changed {
            debug!(layer = %self.id, level, "camera zoom changed");
            self.send(OutboundCommand::SetZoom(level), now);
        }
    }

    fn render(&self, backend: &mut dyn RenderBackend, camera: &CameraUniforms) -> usize {
        let mut state = self.state.lock();
        let retired: Vec<_> = state.retired.drain(..).collect();
        release(backend, retired);

        let tile_size = state.tile_size;
        let mut draws = 0;
        for (key, tile) in state.registry.iter_mut() {
            if let Some(pixels) = tile.take_pixels() {
                match backend.upload_texture(&pixels, tile_size) {
                    Ok(texture) => {
                        if let Some(old) = tile.texture.replace(texture) {
                            backend.release_texture(old);
                        }
                    }
                    Err(err) => warn!(layer = %self.id, tile = %key, error = %err, "texture upload failed"),
                }
            }
            // Tiles still waiting for imagery are skipped.
            let Some(texture) = tile.texture else {
                continue;
            };
            let coord = tile.coord;
            let mesh = *tile
                .mesh
                .get_or_insert_with(|| backend.create_tile_mesh(coord));
            backend.draw(mesh, texture, camera);
            draws += 1;
        }
        draws
    }
}

impl Drop for HeatMapLayer {
    fn drop(&mut self) {
        self.channel.unregister(self.id);
    }
}

fn release(
    backend: &mut dyn RenderBackend,
    handles: Vec<(Option<MeshHandle>, Option<TextureHandle>)>,
) {
    for (mesh, texture) in handles {
        if let Some(mesh) = mesh {
            backend.release_mesh(mesh);
        }
        if let Some(texture) = texture {
            backend.release_texture(texture);
        }
    }
}
