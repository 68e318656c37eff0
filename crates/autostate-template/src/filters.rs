//! Custom filters for autostate expressions

use minijinja::value::Value;
use minijinja::{Error, ErrorKind};
use std::convert::TryFrom;

/// Helper to convert Value to f64
pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    f64::try_from(value.clone())
        .ok()
        .or_else(|| value.as_i64().map(|i| i as f64))
}

/// Convert a value to a boolean the way item values are interpreted
pub fn to_bool(value: Value, default: Option<bool>) -> bool {
    if let Ok(b) = bool::try_from(value.clone()) {
        return b;
    }
    if let Some(n) = value_to_f64(&value) {
        return n != 0.0;
    }
    if let Some(s) = value.as_str() {
        match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => return true,
            "false" | "no" | "off" | "0" | "" => return false,
            _ => {}
        }
    }
    default.unwrap_or(false)
}

/// Clamp a number into `[min, max]`
pub fn clamp(value: Value, min: f64, max: f64) -> Result<f64, Error> {
    if min > max {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("clamp: min {} is greater than max {}", min, max),
        ));
    }
    let n = value_to_f64(&value).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("clamp: '{}' is not a number", value),
        )
    })?;
    Ok(n.clamp(min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_bool() {
        assert!(to_bool(Value::from("on"), None));
        assert!(!to_bool(Value::from(0), None));
        assert!(to_bool(Value::from("maybe"), Some(true)));
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(Value::from(120), 0.0, 100.0).unwrap(), 100.0);
        assert_eq!(clamp(Value::from(-3.5), 0.0, 100.0).unwrap(), 0.0);
        assert!(clamp(Value::from("x"), 0.0, 1.0).is_err());
        assert!(clamp(Value::from(1), 2.0, 1.0).is_err());
    }
}
