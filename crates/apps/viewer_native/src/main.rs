//! Headless globe with one heat-map layer.
//!
//! Runs the heat-map service on its own task, flies the camera from orbit
//! down to street level over Beijing, and renders into a recording backend.

use std::sync::Arc;

use clap::Parser;
use compute::{ChannelConfig, ComputeChannel};
use foundation::math::{Geodetic, Vec3, WGS84_A, geodetic_to_ecef, geographic_to_right};
use gpu::RecordingBackend;
use layers::{HeatMapConfig, HeatMapLayer, Layer, default_gradient};
use runtime::Frame;
use scene::components::{Transform, look_rotation};
use scene::{Camera, SurfaceSize};
use streaming::{Envelope, HeatPoint};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use worker::HeatmapService;

const CENTER_LAT: f64 = 39.90;
const CENTER_LON: f64 = 116.40;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless heat-map globe demo")]
struct Args {
    /// Frames to simulate
    #[arg(long, env = "HEATMAP_FRAMES", default_value_t = 240)]
    frames: u64,

    /// Fixed frame time in seconds
    #[arg(long, env = "HEATMAP_FRAME_DT", default_value_t = 1.0 / 60.0)]
    dt: f64,

    /// Dispatch attempts before a command is abandoned
    #[arg(long, env = "HEATMAP_RETRY_LIMIT", default_value_t = 10)]
    retry_limit: u32,

    /// Seconds between attempts while the service is starting
    #[arg(long, env = "HEATMAP_RETRY_DELAY_S", default_value_t = 0.3)]
    retry_delay_s: f64,

    /// Point influence radius in pixels
    #[arg(long, env = "HEATMAP_RADIUS", default_value_t = 25.0)]
    radius: f64,

    /// Tile edge length in pixels
    #[arg(long, env = "HEATMAP_TILE_SIZE", default_value_t = 64)]
    tile_size: u32,

    /// Intensity mapped to the hottest color (<= 0 scales to the data)
    #[arg(long, env = "HEATMAP_MAX_INTENSITY", default_value_t = 0.0)]
    max_intensity: f64,

    /// Camera altitude on the first frame, in meters
    #[arg(long, env = "HEATMAP_START_ALT_M", default_value_t = 8_000_000.0)]
    start_altitude_m: f64,

    /// Camera altitude on the last frame, in meters
    #[arg(long, env = "HEATMAP_END_ALT_M", default_value_t = 500.0)]
    end_altitude_m: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    info!(?args, "starting viewer");

    let (request_tx, request_rx) = mpsc::unbounded_channel::<Envelope>();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Envelope>();
    let service = tokio::spawn(HeatmapService::new().run(request_rx, reply_tx));

    let channel = Arc::new(ComputeChannel::new(
        ChannelConfig {
            retry_limit: args.retry_limit,
            retry_delay_s: args.retry_delay_s,
            ..ChannelConfig::default()
        },
        Arc::new(request_tx),
    ));

    let mut camera = Camera::wgs84();
    camera.near = 1.0;
    camera.far = 4.0 * WGS84_A;
    place_camera(&mut camera, args.start_altitude_m);
    let surface = SurfaceSize::new(1280.0, 720.0);

    let mut frame = Frame::first(args.dt);
    let config = HeatMapConfig {
        radius: args.radius,
        tile_size: args.tile_size,
        gradient: default_gradient(),
        max_intensity: args.max_intensity,
    };
    let layer = HeatMapLayer::new(channel.clone(), config, camera.level(), frame.time)?;
    layer.add_points(&sample_points(), frame.time);

    let mut backend = RecordingBackend::new();
    let mut last_level = None;
    for i in 0..args.frames {
        while let Ok(envelope) = reply_rx.try_recv() {
            channel.route(envelope, frame.time);
        }
        channel.pump(frame.time);

        place_camera(&mut camera, altitude_at(&args, i));
        let level = camera.level();
        layer.update(level, frame.time);

        backend.take_commands();
        let draws = layer.render(&mut backend, &camera.uniforms(surface));
        if last_level != Some(level) {
            info!(frame = frame.index, level, tiles = layer.tile_coords().len(), draws, "zoom level");
            last_level = Some(level);
        }
        debug!(frame = frame.index, level, draws, "frame rendered");

        frame = frame.next();
        tokio::task::yield_now().await;
    }

    layer.release_resources(&mut backend);
    drop(layer);

    for event in channel.drain_events() {
        warn!(kind = event.kind, message = %event.message, "channel event");
    }
    let metrics = channel.metrics();
    info!(counters = ?metrics.counters, gauges = ?metrics.gauges, "done");

    // Dropping the channel closes the request stream and stops the service.
    drop(channel);
    service.await?;
    Ok(())
}

/// Puts the camera `altitude_m` above the sample area, looking at the planet
/// center.
fn place_camera(camera: &mut Camera, altitude_m: f64) {
    let geographic = geodetic_to_ecef(Geodetic::from_degrees(CENTER_LAT, CENTER_LON, altitude_m));
    let position = geographic_to_right(geographic);
    camera.transform = Transform::translate(position).with_rotation(look_rotation(Vec3::ZERO - position));
}

/// Exponential descent, so every zoom band gets screen time.
fn altitude_at(args: &Args, i: u64) -> f64 {
    let steps = args.frames.saturating_sub(1).max(1) as f64;
    let t = i as f64 / steps;
    args.start_altitude_m * (args.end_altitude_m / args.start_altitude_m).powf(t)
}

/// A 20 x 20 grid of weighted points around the city center.
fn sample_points() -> Vec<HeatPoint> {
    let mut points = Vec::with_capacity(400);
    for i in 0..20 {
        for j in 0..20 {
            let lat = CENTER_LAT + (i as f64 - 10.0) * 0.01;
            let lon = CENTER_LON + (j as f64 - 10.0) * 0.01;
            let weight = ((i * 7 + j * 3) % 5 + 1) as f64;
            points.push(HeatPoint::new(lat, lon, weight));
        }
    }
    points
}
