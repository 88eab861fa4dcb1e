//! Numeric field codec
//!
//! Values travel as a fixed five-character field: digits plus one decimal
//! point. The field is produced by rendering three decimals and cutting the
//! text to five characters, so precision is lost by truncation of the
//! rendered string, not by rounding to fit. `2.1` becomes `"2.100"`,
//! `12.345` becomes `"12.34"`, `1200.2` becomes `"1200."`.
//!
//! Confirmation queries compare against [`wire_value`], never against the
//! caller's original float.

use crate::protocol::{PumpError, Result};

/// Width of every numeric field on the wire
pub const FIELD_WIDTH: usize = 5;

/// Largest value (exclusive) the field can carry
pub const FIELD_MAX: f64 = 9999.0;

/// Encode `value` into the five-character wire field
pub fn encode_field(value: f64) -> Result<String> {
    if !(0.0..FIELD_MAX).contains(&value) {
        return Err(PumpError::InvalidArgument(format!(
            "{} is out of range for encoding, must be in [0, {})",
            value, FIELD_MAX
        )));
    }
    // -0.0 passes the range check but would render a sign
    let value = if value == 0.0 { 0.0 } else { value };

    let rendered = format!("{:.3}", value);
    let mut field: String = rendered.chars().take(FIELD_WIDTH).collect();
    while field.len() < FIELD_WIDTH {
        field.push('0');
    }
    Ok(field)
}

/// Strictly parse a numeric field taken from a reply
pub fn decode_field(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(PumpError::Decode(text.to_string())),
    }
}

/// The value the pump will actually hold after `value` is encoded
pub fn wire_value(value: f64) -> Result<f64> {
    decode_field(&encode_field(value)?)
}
