//! Latitude/longitude pairs to GeoJSON points.

use std::str::FromStr;
use serde_json::{json, Value};

use crate::error::RuleError;
use crate::record::number_from;

/// Default number of decimals kept for each coordinate.
pub const DEFAULT_DIGITS: u32 = 5;

/// Pre-scaling applied to each coordinate before rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleOperator {
    /// `divide_<N>`
    Divide(f64),
}

impl ScaleOperator {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            ScaleOperator::Divide(divisor) => value / divisor,
        }
    }
}

impl FromStr for ScaleOperator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let divisor = s
            .strip_prefix("divide_")
            .and_then(|n| n.parse::<f64>().ok())
            .filter(|n| *n != 0.0 && n.is_finite())
            .ok_or_else(|| RuleError::UnknownScaleOperator(s.to_string()))?;

        Ok(ScaleOperator::Divide(divisor))
    }
}

/// Build `{"type": "Point", "coordinates": [lon, lat]}`.
///
/// Both coordinates must read as numbers (numeric strings are accepted),
/// otherwise the result is `None`.
pub fn lat_lon_to_geojson_point(
    lat: Option<&Value>,
    lon: Option<&Value>,
    operator: Option<&ScaleOperator>,
    digits: u32,
) -> Option<Value> {
    let lat = coordinate(lat?, operator, digits)?;
    let lon = coordinate(lon?, operator, digits)?;

    Some(json!({
        "type": "Point",
        "coordinates": [lon, lat],
    }))
}

fn coordinate(value: &Value, operator: Option<&ScaleOperator>, digits: u32) -> Option<f64> {
    let raw = number_from(value)?;
    let scaled = operator.map_or(raw, |op| op.apply(raw));
    Some(super::round_to(scaled, digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: Value, lon: Value, operator: Option<&str>, digits: u32) -> Option<Value> {
        let op = operator.map(|o| o.parse::<ScaleOperator>().unwrap());
        lat_lon_to_geojson_point(Some(&lat), Some(&lon), op.as_ref(), digits)
    }

    #[test]
    fn test_basic_conversion() {
        let result = point(json!(52.37403), json!(4.88969), None, DEFAULT_DIGITS);
        assert_eq!(
            result,
            Some(json!({"type": "Point", "coordinates": [4.88969, 52.37403]}))
        );
    }

    #[test]
    fn test_with_divide_operator() {
        let result = point(json!(52374), json!(4889), Some("divide_1000"), DEFAULT_DIGITS).unwrap();
        assert_eq!(result["type"], json!("Point"));
        assert_eq!(result["coordinates"], json!([4.889, 52.374]));
    }

    #[test]
    fn test_invalid_lat_lon_strings() {
        assert_eq!(point(json!("abc"), json!("def"), None, DEFAULT_DIGITS), None);
    }

    #[test]
    fn test_none_coordinates() {
        assert_eq!(point(Value::Null, json!(4.88969), None, DEFAULT_DIGITS), None);
        assert_eq!(point(json!(52.37403), Value::Null, None, DEFAULT_DIGITS), None);
        assert_eq!(lat_lon_to_geojson_point(None, Some(&json!(4.8)), None, 5), None);
    }

    #[test]
    fn test_custom_digits() {
        let result = point(json!(52.123456789), json!(4.123456789), None, 3).unwrap();
        assert_eq!(result["coordinates"], json!([4.123, 52.123]));
    }

    #[test]
    fn test_string_numeric_values() {
        let result = point(json!("52.37403"), json!("4.88969"), None, DEFAULT_DIGITS);
        assert_eq!(
            result,
            Some(json!({"type": "Point", "coordinates": [4.88969, 52.37403]}))
        );
    }

    #[test]
    fn test_operate_divide() {
        let op: ScaleOperator = "divide_10".parse().unwrap();
        assert_eq!(op.apply(1000.0), 100.0);
    }

    #[test]
    fn test_unknown_operator() {
        let err = "multiply_10".parse::<ScaleOperator>().unwrap_err();
        assert!(matches!(err, RuleError::UnknownScaleOperator(op) if op == "multiply_10"));
        assert!("divide_0".parse::<ScaleOperator>().is_err());
    }
}
