//! Cast functions applied to configured values

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::Value;

/// Error raised when a value can not be converted
#[derive(Debug, Clone, Error, PartialEq)]
#[error("can not cast '{value}' ({from}) to {to}")]
pub struct CastError {
    pub value: String,
    pub from: &'static str,
    pub to: Cast,
}

/// Result type for cast operations
pub type CastResult<T> = Result<T, CastError>;

/// Type coercion attached to a value once its binding is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cast {
    Num,
    Str,
    Bool,
    Time,
    List,
}

impl Cast {
    /// Map an item `type` attribute to its cast
    pub fn from_type_name(name: &str) -> Option<Cast> {
        match name {
            "num" => Some(Cast::Num),
            "str" => Some(Cast::Str),
            "bool" => Some(Cast::Bool),
            "time" => Some(Cast::Time),
            "list" => Some(Cast::List),
            _ => None,
        }
    }

    /// Apply the cast
    ///
    /// Lists are cast element-wise for every cast but `List`, so a configured
    /// enumeration keeps its shape.
    pub fn apply(self, value: Value) -> CastResult<Value> {
        match (self, value) {
            (Cast::List, Value::List(l)) => Ok(Value::List(l)),
            (Cast::List, Value::Null) => Ok(Value::List(Vec::new())),
            (Cast::List, v) => Ok(Value::List(vec![v])),
            (cast, Value::List(l)) => l
                .into_iter()
                .map(|v| cast.apply(v))
                .collect::<CastResult<Vec<_>>>()
                .map(Value::List),
            (Cast::Num, v) => cast_num(v),
            (Cast::Str, v) => cast_str(v),
            (Cast::Bool, v) => cast_bool(v),
            (Cast::Time, v) => cast_time(v),
        }
    }

    fn error(self, value: &Value) -> CastError {
        CastError {
            value: value.to_string(),
            from: value.type_name(),
            to: self,
        }
    }
}

impl fmt::Display for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cast::Num => "num",
            Cast::Str => "str",
            Cast::Bool => "bool",
            Cast::Time => "time",
            Cast::List => "list",
        };
        write!(f, "{}", name)
    }
}

fn cast_num(value: Value) -> CastResult<Value> {
    match value {
        Value::Num(n) => Ok(Value::Num(n)),
        Value::Bool(b) => Ok(Value::Num(if b { 1.0 } else { 0.0 })),
        Value::Str(ref s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(Value::Num(0.0));
            }
            s.replace(',', ".")
                .parse::<f64>()
                .map(Value::Num)
                .map_err(|_| Cast::Num.error(&value))
        }
        v => Err(Cast::Num.error(&v)),
    }
}

fn cast_str(value: Value) -> CastResult<Value> {
    match value {
        Value::Str(s) => Ok(Value::Str(s)),
        Value::Null => Err(Cast::Str.error(&Value::Null)),
        v => Ok(Value::Str(v.to_string())),
    }
}

fn cast_bool(value: Value) -> CastResult<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(b)),
        Value::Num(n) if n == 0.0 => Ok(Value::Bool(false)),
        Value::Num(n) if n == 1.0 => Ok(Value::Bool(true)),
        Value::Str(ref s) => match s.trim().to_lowercase().as_str() {
            "0" | "false" | "no" | "off" | "" => Ok(Value::Bool(false)),
            "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
            _ => Err(Cast::Bool.error(&value)),
        },
        v => Err(Cast::Bool.error(&v)),
    }
}

fn cast_time(value: Value) -> CastResult<Value> {
    match value {
        Value::Time(t) => Ok(Value::Time(t)),
        Value::Str(ref s) => parse_time(s.trim())
            .map(Value::Time)
            .ok_or_else(|| Cast::Time.error(&value)),
        v => Err(Cast::Time.error(&v)),
    }
}

/// Parse `HH:MM:SS` or `HH:MM`
fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_num() {
        assert_eq!(Cast::Num.apply(Value::from("4,5")), Ok(Value::Num(4.5)));
        assert_eq!(Cast::Num.apply(Value::from("")), Ok(Value::Num(0.0)));
        assert_eq!(Cast::Num.apply(Value::Bool(true)), Ok(Value::Num(1.0)));
        assert!(Cast::Num.apply(Value::from("abc")).is_err());
    }

    #[test]
    fn test_cast_bool() {
        assert_eq!(Cast::Bool.apply(Value::from("on")), Ok(Value::Bool(true)));
        assert_eq!(Cast::Bool.apply(Value::Num(0.0)), Ok(Value::Bool(false)));
        assert!(Cast::Bool.apply(Value::Num(2.0)).is_err());
    }

    #[test]
    fn test_cast_time() {
        let t = NaiveTime::from_hms_opt(6, 30, 0).unwrap();
        assert_eq!(Cast::Time.apply(Value::from("06:30")), Ok(Value::Time(t)));
        assert_eq!(
            Cast::Time.apply(Value::from("06:30:00")),
            Ok(Value::Time(t))
        );
        assert!(Cast::Time.apply(Value::Num(6.0)).is_err());
    }

    #[test]
    fn test_cast_list_element_wise() {
        let v = Value::List(vec![Value::from("1"), Value::from("2")]);
        assert_eq!(
            Cast::Num.apply(v),
            Ok(Value::List(vec![Value::Num(1.0), Value::Num(2.0)]))
        );
    }

    #[test]
    fn test_cast_str() {
        assert_eq!(Cast::Str.apply(Value::Num(3.0)), Ok(Value::from("3")));
        assert!(Cast::Str.apply(Value::Null).is_err());
    }
}
