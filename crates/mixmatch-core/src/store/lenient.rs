//! Forgiving field decoders for hand-edited library files
//!
//! A field holding the wrong JSON type decodes as missing instead of
//! failing the whole track record.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{Contour, TrackFeatures};

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Any string or number as text, anything else as ""
pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(text(&Value::deserialize(d)?).unwrap_or_default())
}

/// Non-blank string, anything else as `None`
pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}

/// Finite number, or a string that parses as one
pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(number(&Value::deserialize(d)?))
}

pub fn opt_f32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f32>, D::Error> {
    Ok(number(&Value::deserialize(d)?).map(|n| n as f32))
}

/// A list of tags; a bare string counts as one tag
pub fn tags<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// Contour samples; non-numeric entries become 0 so timing is kept
pub fn samples<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f32>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.iter().map(|v| number(v).unwrap_or(0.0) as f32).collect(),
        _ => Vec::new(),
    })
}

pub fn opt_contour<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Contour>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

pub fn features<'de, D: Deserializer<'de>>(d: D) -> Result<TrackFeatures, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
        _ => TrackFeatures::default(),
    })
}
