//! Compute-channel wire protocol.
//!
//! Every message in either direction is a 3-tuple `[layerId, command, payload]`
//! (serialized as a JSON array). `layerId` 0 is the service scope: lifecycle
//! messages from the service and broadcasts to every layer.
//!
//! Command names are fixed strings shared with the heat-map service; the
//! payloads are JSON values whose shape depends on the command.

use base64::Engine as _;
use foundation::LayerId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tile::{MAX_ZOOM, TileCoord};

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    MalformedEnvelope(String),
    MalformedPayload { command: String, reason: String },
    UnknownCommand(String),
    InvalidImage(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::MalformedEnvelope(msg) => write!(f, "malformed envelope: {msg}"),
            ProtocolError::MalformedPayload { command, reason } => {
                write!(f, "malformed payload for {command}: {reason}")
            }
            ProtocolError::UnknownCommand(name) => write!(f, "unknown command {name:?}"),
            ProtocolError::InvalidImage(msg) => write!(f, "invalid tile image: {msg}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// One message on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(u64, String, Value)", into = "(u64, String, Value)")]
pub struct Envelope {
    pub layer_id: LayerId,
    pub command: String,
    pub payload: Value,
}

impl From<(u64, String, Value)> for Envelope {
    fn from((id, command, payload): (u64, String, Value)) -> Self {
        Self {
            layer_id: LayerId(id),
            command,
            payload,
        }
    }
}

impl From<Envelope> for (u64, String, Value) {
    fn from(e: Envelope) -> Self {
        (e.layer_id.0, e.command, e.payload)
    }
}

impl Envelope {
    pub fn new(layer_id: LayerId, command: impl Into<String>, payload: Value) -> Self {
        Self {
            layer_id,
            command: command.into(),
            payload,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        // (u64, String, Value) always serializes.
        serde_json::to_string(&(self.layer_id.0, &self.command, &self.payload))
            .unwrap_or_default()
    }
}

/// Input datum: latitude/longitude in degrees plus a weight.
///
/// On the wire a point is `[lat, lng, weight]`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct HeatPoint {
    pub lat: f64,
    pub lng: f64,
    pub weight: f64,
}

impl HeatPoint {
    pub fn new(lat: f64, lng: f64, weight: f64) -> Self {
        Self { lat, lng, weight }
    }
}

impl From<[f64; 3]> for HeatPoint {
    fn from([lat, lng, weight]: [f64; 3]) -> Self {
        Self { lat, lng, weight }
    }
}

impl From<HeatPoint> for [f64; 3] {
    fn from(p: HeatPoint) -> Self {
        [p.lat, p.lng, p.weight]
    }
}

/// Sentinel `maxIntensity` meaning "normalize against the data".
pub const UNBOUNDED_INTENSITY: f64 = -1.0;

/// Payload of `initHeatMapMiddleware`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub radius: f64,
    pub tile_size: u32,
    pub gradient: Vec<[u8; 3]>,
    pub max_intensity: f64,
    pub zoom: u8,
}

/// Payload of `createTile`: `x` is the column, `y` the row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTile {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsAdded {
    pub points_length: usize,
    pub heater: f64,
}

/// Rendered tile returned by the service. `image_data` is base64 RGBA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileImage {
    pub level: u8,
    pub row: u32,
    pub col: u32,
    #[serde(alias = "base64")]
    pub image_data: String,
}

impl TileImage {
    pub fn encode(coord: TileCoord, rgba: &[u8]) -> Self {
        Self {
            level: coord.zoom,
            row: coord.row,
            col: coord.col,
            image_data: base64::engine::general_purpose::STANDARD.encode(rgba),
        }
    }

    pub fn coord(&self) -> TileCoord {
        TileCoord::new(self.level, self.row, self.col)
    }

    pub fn decode_pixels(&self) -> Result<Vec<u8>, ProtocolError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.image_data)
            .map_err(|e| ProtocolError::InvalidImage(e.to_string()))
    }
}

// Confirmations arrive either as the bare value or as an object naming it.

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "GradientSetWire")]
pub struct GradientSet {
    pub length: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GradientSetWire {
    Bare(usize),
    Object { length: usize },
}

impl From<GradientSetWire> for GradientSet {
    fn from(wire: GradientSetWire) -> Self {
        match wire {
            GradientSetWire::Bare(length) | GradientSetWire::Object { length } => Self { length },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ZoomSetWire")]
pub struct ZoomSet {
    pub zoom: u8,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ZoomSetWire {
    Bare(u8),
    Object { zoom: u8 },
}

impl From<ZoomSetWire> for ZoomSet {
    fn from(wire: ZoomSetWire) -> Self {
        match wire {
            ZoomSetWire::Bare(zoom) | ZoomSetWire::Object { zoom } => Self { zoom },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "MaxIntensitySetWire")]
pub struct MaxIntensitySet {
    pub max_intensity: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaxIntensitySetWire {
    Bare(f64),
    Object {
        #[serde(rename = "maxIntensity")]
        max_intensity: f64,
    },
}

impl From<MaxIntensitySetWire> for MaxIntensitySet {
    fn from(wire: MaxIntensitySetWire) -> Self {
        match wire {
            MaxIntensitySetWire::Bare(max_intensity)
            | MaxIntensitySetWire::Object { max_intensity } => Self { max_intensity },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RadiusSetWire")]
pub struct RadiusSet {
    pub radius: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RadiusSetWire {
    Bare(f64),
    Object { radius: f64 },
}

impl From<RadiusSetWire> for RadiusSet {
    fn from(wire: RadiusSetWire) -> Self {
        match wire {
            RadiusSetWire::Bare(radius) | RadiusSetWire::Object { radius } => Self { radius },
        }
    }
}

/// Commands a layer sends to the service.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    InitHeatMapMiddleware(InitPayload),
    SetRadius(f64),
    SetMaxIntensity(f64),
    SetZoom(u8),
    SetGradient(Vec<[u8; 3]>),
    /// Always the full point list; the service keeps no history between batches.
    AddPoints(Vec<HeatPoint>),
    CreateTile(CreateTile),
}

impl OutboundCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitHeatMapMiddleware(_) => "initHeatMapMiddleware",
            Self::SetRadius(_) => "setRadius",
            Self::SetMaxIntensity(_) => "setMaxIntensity",
            Self::SetZoom(_) => "setZoom",
            Self::SetGradient(_) => "setGradient",
            Self::AddPoints(_) => "addPoints",
            Self::CreateTile(_) => "createTile",
        }
    }

    pub fn payload(&self) -> Value {
        let value = match self {
            Self::InitHeatMapMiddleware(p) => serde_json::to_value(p),
            Self::SetRadius(r) => serde_json::to_value(r),
            Self::SetMaxIntensity(m) => serde_json::to_value(m),
            Self::SetZoom(z) => serde_json::to_value(z),
            Self::SetGradient(g) => serde_json::to_value(g),
            Self::AddPoints(points) => serde_json::to_value(points),
            Self::CreateTile(t) => serde_json::to_value(t),
        };
        // Plain structs of numbers; a non-finite float is the only failure and
        // maps to null like JSON.stringify would.
        value.unwrap_or(Value::Null)
    }

    pub fn into_envelope(self, layer_id: LayerId) -> Envelope {
        Envelope::new(layer_id, self.name(), self.payload())
    }

    /// Service-side decoding of an incoming command.
    pub fn decode(command: &str, payload: Value) -> Result<Self, ProtocolError> {
        Ok(match command {
            "initHeatMapMiddleware" => {
                let init: InitPayload = parse(command, payload)?;
                check_zoom(command, init.zoom)?;
                Self::InitHeatMapMiddleware(init)
            }
            "setRadius" => Self::SetRadius(parse(command, payload)?),
            "setMaxIntensity" => Self::SetMaxIntensity(parse(command, payload)?),
            "setZoom" => Self::SetZoom(check_zoom(command, parse(command, payload)?)?),
            "setGradient" => Self::SetGradient(parse(command, payload)?),
            "addPoints" => Self::AddPoints(parse(command, payload)?),
            "createTile" => Self::CreateTile(parse(command, payload)?),
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        })
    }
}

/// Commands the service sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
    /// Service finished initializing. Service scope only.
    WorkerLoaded,
    Debug(Value),
    Info(Value),
    Error(Value),
    PointsAdded(PointsAdded),
    GradientSet(GradientSet),
    ZoomSet(ZoomSet),
    MaxIntensitySet(MaxIntensitySet),
    RadiusSet(RadiusSet),
    TileCreated(TileImage),
    /// Anything else; kept so handlers can report it instead of dropping it.
    Unknown { command: String, payload: Value },
}

impl InboundCommand {
    pub fn name(&self) -> &str {
        match self {
            Self::WorkerLoaded => "workerLoaded",
            Self::Debug(_) => "debug",
            Self::Info(_) => "info",
            Self::Error(_) => "error",
            Self::PointsAdded(_) => "pointsAdded",
            Self::GradientSet(_) => "gradientSeted",
            Self::ZoomSet(_) => "zoomSeted",
            Self::MaxIntensitySet(_) => "maxIntensitySeted",
            Self::RadiusSet(_) => "radiusSeted",
            Self::TileCreated(_) => "tileCreated",
            Self::Unknown { command, .. } => command,
        }
    }

    /// Lifecycle commands handled by the channel itself when sent on the
    /// service scope.
    pub fn is_service_control(&self) -> bool {
        matches!(self, Self::WorkerLoaded | Self::Debug(_) | Self::Error(_))
    }

    pub fn payload(&self) -> Value {
        let value = match self {
            Self::WorkerLoaded => Ok(Value::Null),
            Self::Debug(v) | Self::Info(v) | Self::Error(v) => Ok(v.clone()),
            Self::PointsAdded(p) => serde_json::to_value(p),
            Self::GradientSet(p) => serde_json::to_value(p),
            Self::ZoomSet(p) => serde_json::to_value(p),
            Self::MaxIntensitySet(p) => serde_json::to_value(p),
            Self::RadiusSet(p) => serde_json::to_value(p),
            Self::TileCreated(p) => serde_json::to_value(p),
            Self::Unknown { payload, .. } => Ok(payload.clone()),
        };
        value.unwrap_or(Value::Null)
    }

    pub fn into_envelope(self, layer_id: LayerId) -> Envelope {
        let payload = self.payload();
        Envelope::new(layer_id, self.name().to_string(), payload)
    }

    /// Client-side decoding. Unrecognized names become [`InboundCommand::Unknown`];
    /// only a recognized name with a bad payload is an error.
    pub fn decode(command: &str, payload: Value) -> Result<Self, ProtocolError> {
        Ok(match command {
            "workerLoaded" => Self::WorkerLoaded,
            "debug" => Self::Debug(payload),
            "info" => Self::Info(payload),
            "error" => Self::Error(payload),
            "pointsAdded" => Self::PointsAdded(parse(command, payload)?),
            "gradientSeted" => Self::GradientSet(parse(command, payload)?),
            "zoomSeted" => {
                let set: ZoomSet = parse(command, payload)?;
                check_zoom(command, set.zoom)?;
                Self::ZoomSet(set)
            }
            "maxIntensitySeted" => Self::MaxIntensitySet(parse(command, payload)?),
            "radiusSeted" => Self::RadiusSet(parse(command, payload)?),
            "tileCreated" => {
                let image: TileImage = parse(command, payload)?;
                let coord = image.coord();
                if !coord.is_valid() {
                    return Err(malformed(command, format!("tile {coord} outside the grid")));
                }
                Self::TileCreated(image)
            }
            other => Self::Unknown {
                command: other.to_string(),
                payload,
            },
        })
    }
}

fn parse<T: DeserializeOwned>(command: &str, payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|e| malformed(command, e.to_string()))
}

fn check_zoom(command: &str, zoom: u8) -> Result<u8, ProtocolError> {
    if zoom > MAX_ZOOM {
        return Err(malformed(command, format!("zoom {zoom} above {MAX_ZOOM}")));
    }
    Ok(zoom)
}

fn malformed(command: &str, reason: String) -> ProtocolError {
    ProtocolError::MalformedPayload {
        command: command.to_string(),
        reason,
    }
}
