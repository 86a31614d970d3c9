use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MIN_RATE: f64 = 0.01;
pub const MAX_SNIFFED_RATE: f64 = 0.99;

/// A number as entered by a user: a JSON number, the text of a form field, or any
/// other JSON value, which always coerces to the caller's fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
    Other(Value),
}

impl From<f64> for RawNumber {
    fn from(value: f64) -> Self {
        RawNumber::Number(value)
    }
}

impl From<&str> for RawNumber {
    fn from(value: &str) -> Self {
        RawNumber::Text(value.to_string())
    }
}

/// Explicitly scaled rate. Callers pick the scale; nothing is inferred from magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rate {
    Percent(f64),
    Fraction(f64),
}

impl Rate {
    pub fn to_fraction(self, fallback: f64) -> f64 {
        let fraction = match self {
            Rate::Percent(percent) => percent / 100.0,
            Rate::Fraction(fraction) => fraction,
        };
        if !fraction.is_finite() || fraction <= 0.0 {
            return fallback;
        }
        fraction.clamp(MIN_RATE, 1.0)
    }
}

/// Wire form of a conversion rate: `{"percent": 25}`, `{"fraction": 0.25}` or a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateValue {
    Tagged(Rate),
    Raw(RawNumber),
}

impl RateValue {
    pub fn resolve(&self, fallback: f64) -> f64 {
        match self {
            RateValue::Tagged(rate) => rate.to_fraction(fallback),
            RateValue::Raw(raw) => ensure_rate(Some(raw), fallback),
        }
    }
}

impl From<f64> for RateValue {
    fn from(value: f64) -> Self {
        RateValue::Raw(RawNumber::Number(value))
    }
}

impl From<Rate> for RateValue {
    fn from(value: Rate) -> Self {
        RateValue::Tagged(value)
    }
}

pub fn resolve_rate(value: Option<&RateValue>, fallback: f64) -> f64 {
    match value {
        Some(value) => value.resolve(fallback),
        None => ensure_rate(None, fallback),
    }
}

pub fn to_number(value: Option<&RawNumber>, fallback: f64) -> f64 {
    let parsed = match value {
        Some(RawNumber::Number(number)) => Some(*number),
        Some(RawNumber::Text(text)) => parse_leading_float(text),
        Some(RawNumber::Other(_)) | None => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(fallback)
}

/// Untagged rate input: values in (1, 100] are percentages, anything else is a fraction.
/// Always lands in (0, 1].
pub fn ensure_rate(value: Option<&RawNumber>, fallback: f64) -> f64 {
    let num = to_number(value, fallback);
    if num <= 0.0 {
        return fallback;
    }
    if num > 1.0 && num <= 100.0 {
        return num / 100.0;
    }
    num.clamp(MIN_RATE, MAX_SNIFFED_RATE)
}

pub fn clamp_rate(value: Option<&RawNumber>) -> f64 {
    let num = to_number(value, 0.0);
    if num > 1.0 {
        num.clamp(1.0, 99.0)
    } else {
        num.clamp(MIN_RATE, MAX_SNIFFED_RATE)
    }
}

// Longest numeric prefix, so "12.5k" reads as 12.5 the way form fields did in the browser.
fn parse_leading_float(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        let frac_start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        mantissa_digits += end - frac_start;
    }
    if mantissa_digits == 0 {
        return None;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    trimmed[..end].parse::<f64>().ok()
}
