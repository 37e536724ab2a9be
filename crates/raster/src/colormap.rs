//! Color ramps for value → RGBA mapping.
//!
//! A [`Colormap`] is a list of stops over the normalized range `[0, 1]` with
//! linear interpolation between them. Built-in ramps are available through
//! [`Colormap::named`]; custom ramps can be loaded from JSON, where colors are
//! written as `"#RRGGBB"` or `"#RRGGBBAA"`.

use serde::{Deserialize, Serialize};

use crate::{RasterError, RasterResult};

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn transparent() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        let a = if hex.len() == 8 { byte(6)? } else { 255 };
        Some(Self::new(byte(0)?, byte(2)?, byte(4)?, a))
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color '{}'", value))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Linear color interpolation
pub fn interpolate_color(color1: Color, color2: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let t_inv = 1.0 - t;
    let mix = |a: u8, b: u8| ((a as f32 * t_inv) + (b as f32 * t)).round() as u8;

    Color::new(
        mix(color1.r, color2.r),
        mix(color1.g, color2.g),
        mix(color1.b, color2.b),
        mix(color1.a, color2.a),
    )
}

/// A color at a normalized position in the ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub position: f32,
    pub color: Color,
}

impl ColorStop {
    pub const fn new(position: f32, color: Color) -> Self {
        Self { position, color }
    }
}

/// Continuous color ramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Colormap {
    pub name: String,
    pub stops: Vec<ColorStop>,
}

/// Names accepted by [`Colormap::named`].
pub const BUILTIN_COLORMAPS: &[&str] = &["viridis", "magma", "greys", "terrain", "ndvi"];

impl Colormap {
    /// Build and validate a colormap.
    pub fn new(name: impl Into<String>, stops: Vec<ColorStop>) -> RasterResult<Self> {
        let cmap = Self {
            name: name.into(),
            stops,
        };
        cmap.validate()?;
        Ok(cmap)
    }

    /// Parse and validate a JSON colormap definition.
    pub fn from_json(json: &str) -> RasterResult<Self> {
        let cmap: Colormap =
            serde_json::from_str(json).map_err(|e| RasterError::InvalidColormap(e.to_string()))?;
        cmap.validate()?;
        Ok(cmap)
    }

    /// Requires ≥2 stops with non-decreasing positions inside `[0, 1]`.
    pub fn validate(&self) -> RasterResult<()> {
        if self.stops.len() < 2 {
            return Err(RasterError::InvalidColormap(format!(
                "'{}' needs at least 2 color stops",
                self.name
            )));
        }
        for pair in self.stops.windows(2) {
            if pair[1].position < pair[0].position {
                return Err(RasterError::InvalidColormap(format!(
                    "'{}' stop positions must be non-decreasing",
                    self.name
                )));
            }
        }
        if self
            .stops
            .iter()
            .any(|s| !(0.0..=1.0).contains(&s.position))
        {
            return Err(RasterError::InvalidColormap(format!(
                "'{}' stop positions must lie in [0, 1]",
                self.name
            )));
        }
        Ok(())
    }

    /// Look up one of the built-in ramps.
    pub fn named(name: &str) -> RasterResult<Self> {
        let stops: &[(f32, Color)] = match name.to_ascii_lowercase().as_str() {
            "viridis" => &[
                (0.0, Color::rgb(68, 1, 84)),
                (0.25, Color::rgb(59, 82, 139)),
                (0.5, Color::rgb(33, 145, 140)),
                (0.75, Color::rgb(94, 201, 98)),
                (1.0, Color::rgb(253, 231, 37)),
            ],
            "magma" => &[
                (0.0, Color::rgb(0, 0, 4)),
                (0.25, Color::rgb(81, 18, 124)),
                (0.5, Color::rgb(183, 55, 121)),
                (0.75, Color::rgb(252, 137, 97)),
                (1.0, Color::rgb(252, 253, 191)),
            ],
            "greys" => &[
                (0.0, Color::rgb(0, 0, 0)),
                (1.0, Color::rgb(255, 255, 255)),
            ],
            "terrain" => &[
                (0.0, Color::rgb(51, 51, 153)),
                (0.15, Color::rgb(0, 153, 255)),
                (0.25, Color::rgb(0, 204, 102)),
                (0.5, Color::rgb(255, 255, 153)),
                (0.75, Color::rgb(128, 92, 84)),
                (1.0, Color::rgb(255, 255, 255)),
            ],
            "ndvi" => &[
                (0.0, Color::rgb(165, 0, 38)),
                (0.3, Color::rgb(244, 109, 67)),
                (0.5, Color::rgb(255, 255, 191)),
                (0.7, Color::rgb(102, 189, 99)),
                (1.0, Color::rgb(0, 104, 55)),
            ],
            _ => return Err(RasterError::UnknownColormap(name.to_string())),
        };

        Ok(Self {
            name: name.to_ascii_lowercase(),
            stops: stops
                .iter()
                .map(|(p, c)| ColorStop::new(*p, *c))
                .collect(),
        })
    }

    /// Color for a normalized value; clamps outside `[0, 1]`.
    ///
    /// A colormap without stops maps everything to transparent.
    pub fn color_at(&self, t: f32) -> Color {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return Color::transparent();
        };
        if t.is_nan() {
            return Color::transparent();
        }
        if t <= first.position {
            return first.color;
        }
        if t >= last.position {
            return last.color;
        }

        for pair in self.stops.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if t <= hi.position {
                let span = hi.position - lo.position;
                if span <= f32::EPSILON {
                    return hi.color;
                }
                return interpolate_color(lo.color, hi.color, (t - lo.position) / span);
            }
        }
        last.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_parsing() {
        assert_eq!(Color::from_hex("#ff8000"), Some(Color::rgb(255, 128, 0)));
        assert_eq!(
            Color::from_hex("00000080"),
            Some(Color::new(0, 0, 0, 128))
        );
        assert_eq!(Color::from_hex("#ff80"), None);
        assert_eq!(Color::from_hex("#gg0000"), None);
        assert_eq!(Color::rgb(1, 2, 3).to_hex(), "#010203");
    }

    #[test]
    fn test_interpolate_midpoint() {
        let c = interpolate_color(Color::rgb(0, 0, 0), Color::rgb(255, 255, 255), 0.5);
        assert_eq!(c, Color::rgb(128, 128, 128));
    }

    #[test]
    fn test_color_at_endpoints_and_clamp() {
        let cmap = Colormap::named("greys").unwrap();
        assert_eq!(cmap.color_at(0.0), Color::rgb(0, 0, 0));
        assert_eq!(cmap.color_at(1.0), Color::rgb(255, 255, 255));
        assert_eq!(cmap.color_at(-3.0), Color::rgb(0, 0, 0));
        assert_eq!(cmap.color_at(7.0), Color::rgb(255, 255, 255));
        assert_eq!(cmap.color_at(f32::NAN).a, 0);
    }

    #[test]
    fn test_all_builtins_valid() {
        for name in BUILTIN_COLORMAPS {
            Colormap::named(name).unwrap().validate().unwrap();
        }
        assert!(matches!(
            Colormap::named("rainbow"),
            Err(RasterError::UnknownColormap(_))
        ));
    }

    #[test]
    fn test_from_json() {
        let json = r##"{"name":"custom","stops":[
            {"position":0.0,"color":"#000000"},
            {"position":1.0,"color":"#ff000080"}]}"##;
        let cmap = Colormap::from_json(json).unwrap();
        assert_eq!(cmap.stops[1].color, Color::new(255, 0, 0, 128));
    }

    #[test]
    fn test_rejects_decreasing_stops() {
        let stops = vec![
            ColorStop::new(0.8, Color::rgb(0, 0, 0)),
            ColorStop::new(0.2, Color::rgb(1, 1, 1)),
        ];
        assert!(matches!(
            Colormap::new("bad", stops),
            Err(RasterError::InvalidColormap(_))
        ));
    }

    #[test]
    fn test_empty_colormap_is_transparent() {
        let cmap = Colormap {
            name: "empty".into(),
            stops: Vec::new(),
        };
        assert_eq!(cmap.color_at(0.5), Color::transparent());
        assert!(cmap.validate().is_err());
    }
}
