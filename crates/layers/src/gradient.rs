//! Color ramps for heat maps.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradientError {
    /// A stop that is neither a 3/6-digit hex string nor an RGB byte triple.
    InvalidColor(String),
    Empty,
}

impl std::fmt::Display for GradientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GradientError::InvalidColor(c) => write!(f, "invalid color format ({c})"),
            GradientError::Empty => write!(f, "gradient has no color stops"),
        }
    }
}

impl std::error::Error for GradientError {}

/// One gradient stop as written by the user: `"#f80"`, `"ff8800"`, or
/// `[255, 136, 0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Hex(String),
    Rgb(Vec<f64>),
}

impl ColorSpec {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        ColorSpec::Rgb(vec![r as f64, g as f64, b as f64])
    }

    pub fn parse(&self) -> Result<[u8; 3], GradientError> {
        match self {
            ColorSpec::Hex(s) => parse_hex(s),
            ColorSpec::Rgb(channels) => parse_triple(channels),
        }
    }
}

impl From<&str> for ColorSpec {
    fn from(s: &str) -> Self {
        ColorSpec::Hex(s.to_string())
    }
}

impl From<[u8; 3]> for ColorSpec {
    fn from([r, g, b]: [u8; 3]) -> Self {
        ColorSpec::rgb(r, g, b)
    }
}

/// Parsed color ramp, coldest stop first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gradient {
    stops: Vec<[u8; 3]>,
}

impl Gradient {
    /// Validates every stop. The first bad stop fails the whole ramp.
    pub fn parse(specs: &[ColorSpec]) -> Result<Self, GradientError> {
        if specs.is_empty() {
            return Err(GradientError::Empty);
        }
        let stops = specs
            .iter()
            .map(ColorSpec::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stops })
    }

    pub fn stops(&self) -> &[[u8; 3]] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

/// Blue to red through cyan, green and yellow.
pub fn default_gradient() -> Vec<ColorSpec> {
    ["#0000ff", "#00ffff", "#00ff00", "#ffff00", "#ff0000"]
        .into_iter()
        .map(ColorSpec::from)
        .collect()
}

fn parse_hex(s: &str) -> Result<[u8; 3], GradientError> {
    let invalid = || GradientError::InvalidColor(s.to_string());
    let digits = s.strip_prefix('#').unwrap_or(s);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return Err(invalid()),
    };
    let mut out = [0u8; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u8::from_str_radix(&expanded[2 * i..2 * i + 2], 16).map_err(|_| invalid())?;
    }
    Ok(out)
}

fn parse_triple(channels: &[f64]) -> Result<[u8; 3], GradientError> {
    let invalid = || GradientError::InvalidColor(format!("{channels:?}"));
    let [r, g, b] = channels else {
        return Err(invalid());
    };
    let byte = |v: f64| {
        if v.fract() == 0.0 && (0.0..=255.0).contains(&v) {
            Some(v as u8)
        } else {
            None
        }
    };
    match (byte(*r), byte(*g), byte(*b)) {
        (Some(r), Some(g), Some(b)) => Ok([r, g, b]),
        _ => Err(invalid()),
    }
}
