//! Builds the canonical `setPattern` command sent to the controller.
//!
//! Every function here is pure: the same inputs always produce the same
//! [`CanonicalCommand`].

use crate::error::{LightError, LightResult};
use crate::lights::presets::PatternDefinition;
use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use url::form_urlencoded;

/// Wire protocol limit on color triples per command.
pub const MAX_COLORS: usize = 20;
pub const MAX_SPEED: u8 = 100;
pub const MAX_GAP: u8 = 100;

pub const PATTERN_TYPE_CUSTOM: &str = "custom";
pub const PATTERN_TYPE_OFF: &str = "off";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn scale(self, factor: f64) -> Self {
        Self {
            r: scale_channel(self.r, factor),
            g: scale_channel(self.g, factor),
            b: scale_channel(self.b, factor),
        }
    }

    fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::WHITE
    }
}

/// One channel of a user supplied color, before integer coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ChannelValue {
    fn coerce(&self) -> Option<i64> {
        match self {
            ChannelValue::Integer(v) => Some(*v),
            ChannelValue::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            ChannelValue::Float(_) => None,
            ChannelValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<i64> for ChannelValue {
    fn from(value: i64) -> Self {
        ChannelValue::Integer(value)
    }
}

impl From<&str> for ChannelValue {
    fn from(value: &str) -> Self {
        ChannelValue::Text(value.to_string())
    }
}

/// A user supplied color: at least three channels, only the first three are used.
pub type ColorInput = Vec<ChannelValue>;

/// The fully resolved parameter set of a `setPattern` request.
///
/// `direction`, `other` and `pause` are fixed on the wire and therefore not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalCommand {
    pub pattern_type: String,
    pub zones: Vec<u8>,
    /// Flattened `R,G,B,R,G,B,...` values, at most [`MAX_COLORS`] triples.
    pub colors: Vec<u8>,
    pub speed: u8,
    pub gap: u8,
}

impl CanonicalCommand {
    fn new(pattern_type: &str, zones: &[u8], colors: &[Rgb], speed: u8, gap: u8) -> Self {
        Self {
            pattern_type: pattern_type.to_string(),
            zones: zones.to_vec(),
            colors: colors
                .iter()
                .take(MAX_COLORS)
                .flat_map(|c| c.channels())
                .collect(),
            speed,
            gap,
        }
    }

    pub fn num_colors(&self) -> usize {
        self.colors.len() / 3
    }

    pub fn first_color(&self) -> Option<Rgb> {
        match self.colors.as_slice() {
            [r, g, b, ..] => Some(Rgb::new(*r, *g, *b)),
            _ => None,
        }
    }

    pub fn is_off(&self) -> bool {
        self.pattern_type == PATTERN_TYPE_OFF
    }

    /// Renders the `setPattern` query string.
    pub fn to_query(&self) -> String {
        let pattern_type: String =
            form_urlencoded::byte_serialize(self.pattern_type.as_bytes()).collect();
        format!(
            "patternType={}&num_zones={}&zones={}&num_colors={}&colors={}&direction=F&speed={}&gap={}&other=0&pause=0",
            pattern_type,
            self.zones.len(),
            join(&self.zones),
            self.num_colors(),
            join(&self.colors),
            self.speed,
            self.gap,
        )
    }

    /// Parses a query string produced by [`CanonicalCommand::to_query`].
    ///
    /// A full `http://host/setPattern?...` URL is accepted as well.
    pub fn from_query(query: &str) -> anyhow::Result<Self> {
        let query = query.split_once('?').map_or(query, |(_, q)| q);
        let mut pattern_type = None;
        let mut zones = None;
        let mut colors = None;
        let mut speed = 0;
        let mut gap = 0;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "patternType" => pattern_type = Some(value.into_owned()),
                "zones" => zones = Some(split_numbers(&value).context("invalid zones")?),
                "colors" => colors = Some(split_numbers(&value).context("invalid colors")?),
                "speed" => speed = value.parse().context("invalid speed")?,
                "gap" => gap = value.parse().context("invalid gap")?,
                _ => {}
            }
        }
        let pattern_type = pattern_type.context("missing patternType")?;
        let zones = zones.context("missing zones")?;
        let colors: Vec<u8> = colors.context("missing colors")?;
        if zones.is_empty() {
            bail!("command has no zones");
        }
        if colors.is_empty() || colors.len() % 3 != 0 || colors.len() > MAX_COLORS * 3 {
            bail!("command has {} color values", colors.len());
        }
        Ok(Self {
            pattern_type,
            zones,
            colors,
            speed,
            gap,
        })
    }
}

impl Display for CanonicalCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_query())
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn split_numbers(value: &str) -> anyhow::Result<Vec<u8>> {
    value
        .split(',')
        .filter(|part| !part.is_empty())
        .map(|part| part.trim().parse::<u8>().map_err(anyhow::Error::from))
        .collect()
}

fn scale_channel(value: u8, factor: f64) -> u8 {
    (f64::from(value) * factor).round().clamp(0.0, 255.0) as u8
}

pub fn brightness_factor(brightness: u8) -> f64 {
    f64::from(brightness) / 255.0
}

/// Checks a speed/gap style value against `0..=max`.
pub fn validate_percent(name: &'static str, value: i64, max: u8) -> LightResult<u8> {
    if (0..=i64::from(max)).contains(&value) {
        Ok(value as u8)
    } else {
        Err(LightError::InvalidRange {
            name,
            value,
            max: i64::from(max),
        })
    }
}

/// Builds a command from a preset. Overrides only apply when supplied.
pub fn build_from_preset(
    definition: &PatternDefinition,
    zones: &[u8],
    speed_override: Option<u8>,
    gap_override: Option<u8>,
    brightness_factor: f64,
) -> CanonicalCommand {
    let scaled: Vec<Rgb> = definition
        .colors
        .iter()
        .map(|c| c.scale(brightness_factor))
        .collect();
    CanonicalCommand::new(
        definition.pattern_type,
        zones,
        &scaled,
        speed_override.unwrap_or(definition.speed),
        gap_override.unwrap_or(definition.gap),
    )
}

/// Builds a command from explicit colors.
///
/// Every entry must coerce to integers in `0..=255`; a single bad entry rejects
/// the whole list. Entries past [`MAX_COLORS`] are dropped.
pub fn build_from_custom(
    pattern_type: &str,
    colors: &[ColorInput],
    zones: &[u8],
    speed: u8,
    gap: u8,
) -> LightResult<CanonicalCommand> {
    if colors.is_empty() {
        return Err(LightError::MissingColors);
    }
    if zones.is_empty() {
        return Err(LightError::NoZones);
    }
    validate_percent("speed", i64::from(speed), MAX_SPEED)?;
    validate_percent("gap", i64::from(gap), MAX_GAP)?;
    let validated = colors
        .iter()
        .enumerate()
        .map(|(i, color)| validate_color(i, color))
        .collect::<LightResult<Vec<Rgb>>>()?;
    Ok(CanonicalCommand::new(pattern_type, zones, &validated, speed, gap))
}

fn validate_color(index: usize, color: &ColorInput) -> LightResult<Rgb> {
    if color.len() < 3 {
        return Err(LightError::InvalidColors(format!(
            "color {} has {} channels, expected 3",
            index,
            color.len()
        )));
    }
    let mut channels = [0u8; 3];
    for (slot, value) in channels.iter_mut().zip(color.iter()) {
        *slot = value
            .coerce()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| {
                LightError::InvalidColors(format!(
                    "color {} has invalid channel {:?}",
                    index, value
                ))
            })?;
    }
    Ok(Rgb::new(channels[0], channels[1], channels[2]))
}

/// A single solid color at the given brightness.
pub fn solid(rgb: Rgb, zones: &[u8], brightness_factor: f64) -> CanonicalCommand {
    CanonicalCommand::new(PATTERN_TYPE_CUSTOM, zones, &[rgb.scale(brightness_factor)], 0, 0)
}

pub fn off(zones: &[u8]) -> CanonicalCommand {
    CanonicalCommand::new(PATTERN_TYPE_OFF, zones, &[Rgb::BLACK], 0, 0)
}

/// Applies `brightness_factor` to the already flattened colors of `command`.
pub fn rescale(command: &CanonicalCommand, brightness_factor: f64) -> CanonicalCommand {
    CanonicalCommand {
        colors: command
            .colors
            .iter()
            .map(|v| scale_channel(*v, brightness_factor))
            .collect(),
        ..command.clone()
    }
}
