use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::constants::DEFAULT_POINT_RADIUS;
use crate::prelude::HashMap;

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parses `#rgb`, `#rrggbb`, `#rrggbbaa` or a basic color name
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix('#') {
            return Self::parse_hex(hex);
        }
        let color = match text.to_ascii_lowercase().as_str() {
            "black" => Self::rgb(0, 0, 0),
            "white" => Self::rgb(255, 255, 255),
            "red" => Self::rgb(255, 0, 0),
            "green" => Self::rgb(0, 128, 0),
            "blue" => Self::rgb(0, 0, 255),
            "yellow" => Self::rgb(255, 255, 0),
            "orange" => Self::rgb(255, 165, 0),
            "purple" => Self::rgb(128, 0, 128),
            "gray" | "grey" => Self::rgb(128, 128, 128),
            "transparent" => Self::new(0, 0, 0, 0),
            _ => return None,
        };
        Some(color)
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            3 => {
                let digits: Vec<u8> = hex
                    .chars()
                    .map(|c| c.to_digit(16).map(|d| d as u8 * 17))
                    .collect::<Option<_>>()?;
                Some(Self::rgb(digits[0], digits[1], digits[2]))
            }
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }
}

/// Drawing options of a feature
///
/// A closed set: any other property is plain data. Recognised keys are
/// `radius`, `fill` (or `color`), `outline`, `width`, `label` and
/// `opacity` (or `alpha`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureStyle {
    /// Point marker radius in pixels, also the point hit radius
    pub radius: f64,
    pub fill: Option<Color>,
    pub outline: Option<Color>,
    pub outline_width: f64,
    pub label: Option<String>,
    /// 0.0 (transparent) to 1.0 (opaque)
    pub opacity: f64,
}

impl Default for FeatureStyle {
    fn default() -> Self {
        Self {
            radius: DEFAULT_POINT_RADIUS,
            fill: None,
            outline: None,
            outline_width: 1.0,
            label: None,
            opacity: 1.0,
        }
    }
}

impl FeatureStyle {
    /// Reads the style keys out of a property map; malformed values keep the default
    pub fn from_properties(properties: &HashMap<String, Value>) -> Self {
        let mut style = Self::default();

        if let Some(value) = properties.get("radius") {
            match value.as_f64() {
                Some(r) if r.is_finite() && r >= 0.0 => style.radius = r,
                _ => log::debug!("ignoring invalid radius {}", value),
            }
        }

        let fill = properties.get("fill").or_else(|| properties.get("color"));
        if let Some(value) = fill {
            style.fill = parse_color(value);
        }
        if let Some(value) = properties.get("outline") {
            style.outline = parse_color(value);
        }

        if let Some(value) = properties.get("width") {
            match value.as_f64() {
                Some(w) if w.is_finite() && w >= 0.0 => style.outline_width = w,
                _ => log::debug!("ignoring invalid outline width {}", value),
            }
        }

        if let Some(value) = properties.get("label") {
            style.label = value_to_label(value);
        }

        let opacity = properties.get("opacity").or_else(|| properties.get("alpha"));
        if let Some(value) = opacity {
            match value.as_f64() {
                Some(o) if o.is_finite() => style.opacity = o.clamp(0.0, 1.0),
                _ => log::debug!("ignoring invalid opacity {}", value),
            }
        }

        style
    }
}

fn parse_color(value: &Value) -> Option<Color> {
    let color = value.as_str().and_then(Color::parse);
    if color.is_none() {
        log::debug!("ignoring invalid color {}", value);
    }
    color
}

/// Renders a property value as label text; objects and arrays have no label form
pub(crate) fn value_to_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_color_parsing() {
        assert_eq!(Color::parse("#f00"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::parse("#00ff7f"), Some(Color::rgb(0, 255, 127)));
        assert_eq!(Color::parse("#00000080"), Some(Color::new(0, 0, 0, 128)));
        assert_eq!(Color::parse("Blue"), Some(Color::rgb(0, 0, 255)));
        assert_eq!(Color::parse("#12"), None);
        assert_eq!(Color::parse("#gg0000"), None);
        assert_eq!(Color::parse("chartreuse-ish"), None);
    }

    #[test]
    fn test_style_from_properties() {
        let style = FeatureStyle::from_properties(&props(json!({
            "radius": 7,
            "color": "#0000ff",
            "outline": "black",
            "label": "Pentagon",
            "alpha": 0.25,
            "population": 12000
        })));
        assert_eq!(style.radius, 7.0);
        assert_eq!(style.fill, Some(Color::rgb(0, 0, 255)));
        assert_eq!(style.outline, Some(Color::rgb(0, 0, 0)));
        assert_eq!(style.label.as_deref(), Some("Pentagon"));
        assert_eq!(style.opacity, 0.25);
    }

    #[test]
    fn test_fill_takes_precedence_over_color() {
        let style = FeatureStyle::from_properties(&props(json!({
            "fill": "red",
            "color": "blue"
        })));
        assert_eq!(style.fill, Some(Color::rgb(255, 0, 0)));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let style = FeatureStyle::from_properties(&props(json!({
            "radius": "big",
            "opacity": 4.5,
            "fill": 12,
            "label": { "nested": true }
        })));
        assert_eq!(style.radius, DEFAULT_POINT_RADIUS);
        assert_eq!(style.opacity, 1.0);
        assert_eq!(style.fill, None);
        assert_eq!(style.label, None);
    }
}
