//! Date normalization: rewrite one field from a declared source format to
//! a canonical `YYYY-MM-DD` string.
//!
//! ```yaml
//! $format_date_delivery:
//!   date_field: order.delivery_date
//!   format: DD-MM-YYYY
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::Value;

use crate::conditions::Condition;
use crate::error::RuleError;
use crate::extraction::FieldPath;
use crate::record::{number_from, Record};
use crate::rules::{body_map, optional_path, required_path};

/// Canonical output format.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d";

/// Epoch values at or above this magnitude are read as milliseconds.
const MILLISECOND_THRESHOLD: f64 = 1e11;

/// Year, month and day separated by `_`, `-` or `/`.
static YEAR_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[_\-/](\d{1,2})[_\-/](\d{1,2})$").expect("valid date regex")
});

/// Same as [`YEAR_FIRST`] with an optional time part after `T`, a space or `:`.
static YEAR_FIRST_WITH_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[_\-/](\d{1,2})[_\-/](\d{1,2})(?:[T :].*)?$").expect("valid date regex")
});

/// Source date formats understood by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `YYYY-MM-DD`
    YearMonthDay,
    /// `YYYYMMDD`
    Compact,
    /// `DD-MM-YYYY`
    DayMonthYearDashed,
    /// `DD.MM.YYYY`
    DayMonthYearDotted,
    /// `DD/MM/YYYY`
    DayMonthYearSlashed,
    /// `YYYY_MM_DD`: any of `_`, `-`, `/` as separator
    YearMonthDayAnySeparator,
    /// `YYYY_MM_DD:Time` / `YYYY-MM-DD:Time`
    YearMonthDayWithTime,
    /// `UNIX_DT_STAMP`: seconds (or milliseconds) since the epoch, UTC
    UnixTimestamp,
}

impl FromStr for DateFormat {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YYYY-MM-DD" => Ok(DateFormat::YearMonthDay),
            "YYYYMMDD" => Ok(DateFormat::Compact),
            "DD-MM-YYYY" => Ok(DateFormat::DayMonthYearDashed),
            "DD.MM.YYYY" => Ok(DateFormat::DayMonthYearDotted),
            "DD/MM/YYYY" => Ok(DateFormat::DayMonthYearSlashed),
            "YYYY_MM_DD" => Ok(DateFormat::YearMonthDayAnySeparator),
            "YYYY_MM_DD:Time" | "YYYY-MM-DD:Time" => Ok(DateFormat::YearMonthDayWithTime),
            "UNIX_DT_STAMP" | "UNIX_TIMESTAMP" => Ok(DateFormat::UnixTimestamp),
            other => Err(RuleError::FormatNotImplemented(other.to_string())),
        }
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DateFormat::YearMonthDay => "YYYY-MM-DD",
            DateFormat::Compact => "YYYYMMDD",
            DateFormat::DayMonthYearDashed => "DD-MM-YYYY",
            DateFormat::DayMonthYearDotted => "DD.MM.YYYY",
            DateFormat::DayMonthYearSlashed => "DD/MM/YYYY",
            DateFormat::YearMonthDayAnySeparator => "YYYY_MM_DD",
            DateFormat::YearMonthDayWithTime => "YYYY_MM_DD:Time",
            DateFormat::UnixTimestamp => "UNIX_DT_STAMP",
        };
        write!(f, "{}", name)
    }
}

impl DateFormat {
    /// Parse a raw field value in this format.
    ///
    /// Returns `None` for anything that is not a valid calendar date in this
    /// format.
    pub fn parse(&self, value: &Value) -> Option<NaiveDate> {
        if let DateFormat::UnixTimestamp = self {
            return from_epoch(number_from(value)?);
        }

        let text = value.as_str()?.trim();
        match self {
            DateFormat::YearMonthDay => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
            DateFormat::Compact => NaiveDate::parse_from_str(text, "%Y%m%d").ok(),
            DateFormat::DayMonthYearDashed => NaiveDate::parse_from_str(text, "%d-%m-%Y").ok(),
            DateFormat::DayMonthYearDotted => NaiveDate::parse_from_str(text, "%d.%m.%Y").ok(),
            DateFormat::DayMonthYearSlashed => NaiveDate::parse_from_str(text, "%d/%m/%Y").ok(),
            DateFormat::YearMonthDayAnySeparator => from_captures(&YEAR_FIRST, text),
            DateFormat::YearMonthDayWithTime => from_captures(&YEAR_FIRST_WITH_TIME, text),
            DateFormat::UnixTimestamp => None,
        }
    }

    /// Parse and render as `YYYY-MM-DD`.
    pub fn normalize(&self, value: &Value) -> Option<String> {
        self.parse(value)
            .map(|date| date.format(CANONICAL_FORMAT).to_string())
    }
}

fn from_captures(pattern: &Regex, text: &str) -> Option<NaiveDate> {
    let caps = pattern.captures(text)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let day = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn from_epoch(stamp: f64) -> Option<NaiveDate> {
    let seconds = if stamp.abs() >= MILLISECOND_THRESHOLD {
        stamp / 1000.0
    } else {
        stamp
    };
    DateTime::from_timestamp(seconds.floor() as i64, 0).map(|dt| dt.date_naive())
}

/// A date rule: normalize `date_field` from `format` when `condition` holds.
#[derive(Debug, Clone)]
pub struct DateRule {
    pub date_field: FieldPath,
    pub format: DateFormat,
    pub condition: Condition,
    /// Field the condition is evaluated against; defaults to `date_field`
    pub condition_field: Option<FieldPath>,
}

impl DateRule {
    /// Parse the body of a `$format_date` rule.
    ///
    /// An unknown `format` fails with [`RuleError::FormatNotImplemented`].
    pub fn from_value(key: &str, value: &Value) -> Result<Self, RuleError> {
        let body = body_map(key, value)?;

        let format = match body.get("format") {
            Some(Value::String(name)) => name.parse::<DateFormat>()?,
            Some(other) => return Err(RuleError::FormatNotImplemented(other.to_string())),
            None => {
                return Err(RuleError::MissingField {
                    key: key.to_string(),
                    field: "format".to_string(),
                })
            }
        };

        Ok(Self {
            date_field: required_path(key, body, "date_field")?,
            format,
            condition: Condition::from_value(body.get("condition"))?,
            condition_field: optional_path(key, body, "condition_field")?,
        })
    }

    /// Rewrite the date field in place.
    ///
    /// A missing or `null` date is left as it is. A value that does not parse
    /// in the declared format becomes `null`.
    pub fn normalize(&self, mut record: Record) -> Record {
        let condition_field = self.condition_field.as_ref().unwrap_or(&self.date_field);
        if !self.condition.evaluate(condition_field.resolve(&record)) {
            tracing::debug!("Condition not met, leaving date '{}' unchanged", self.date_field);
            return record;
        }

        let normalized = match self.date_field.resolve(&record) {
            None | Some(Value::Null) => return record,
            Some(raw) => match self.format.normalize(raw) {
                Some(date) => Value::String(date),
                None => {
                    tracing::debug!(
                        "Value {} at '{}' is not a {} date",
                        raw,
                        self.date_field,
                        self.format
                    );
                    Value::Null
                }
            },
        };

        if !self.date_field.set(&mut record, normalized) {
            tracing::debug!("No parent for date field '{}', nothing written", self.date_field);
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test fixture must be an object"),
        }
    }

    fn format_date_field(data: Value, rule: Value) -> Record {
        DateRule::from_value("$format_date", &rule)
            .unwrap()
            .normalize(record(data))
    }

    fn convert(date: Value, format: &str) -> Value {
        let result = format_date_field(
            json!({"date": date}),
            json!({"date_field": "date", "format": format}),
        );
        result["date"].clone()
    }

    #[test]
    fn test_convert_yyyy_mm_dd() {
        assert_eq!(convert(json!("2021-02-21"), "YYYY-MM-DD"), json!("2021-02-21"));
    }

    #[test]
    fn test_convert_compact() {
        assert_eq!(convert(json!("20210221"), "YYYYMMDD"), json!("2021-02-21"));
    }

    #[test]
    fn test_convert_dd_mm_yyyy() {
        assert_eq!(convert(json!("21-02-2021"), "DD-MM-YYYY"), json!("2021-02-21"));
    }

    #[test]
    fn test_convert_dd_mm_yyyy_dotted() {
        assert_eq!(convert(json!("21.02.2021"), "DD.MM.YYYY"), json!("2021-02-21"));
    }

    #[test]
    fn test_convert_dd_mm_yyyy_slashed() {
        assert_eq!(convert(json!("21/02/2021"), "DD/MM/YYYY"), json!("2021-02-21"));
    }

    #[test]
    fn test_convert_yyyy_mm_dd_underscore() {
        assert_eq!(convert(json!("2021_02_21"), "YYYY_MM_DD"), json!("2021-02-21"));
        assert_eq!(convert(json!("2021/2/21"), "YYYY_MM_DD"), json!("2021-02-21"));
    }

    #[test]
    fn test_convert_yyyy_mm_dd_time() {
        assert_eq!(
            convert(json!("2021-02-21T08:00:00Z"), "YYYY_MM_DD:Time"),
            json!("2021-02-21")
        );
        assert_eq!(
            convert(json!("2021_02_21 23:59:59"), "YYYY-MM-DD:Time"),
            json!("2021-02-21")
        );
        assert_eq!(convert(json!("2021-02-21"), "YYYY_MM_DD:Time"), json!("2021-02-21"));
    }

    #[test]
    fn test_convert_unix_date_time_stamp() {
        // 2021-02-21T12:00:00Z
        assert_eq!(convert(json!(1613908800), "UNIX_DT_STAMP"), json!("2021-02-21"));
        assert_eq!(convert(json!("1613908800"), "UNIX_DT_STAMP"), json!("2021-02-21"));
        assert_eq!(convert(json!(1613908800000i64), "UNIX_TIMESTAMP"), json!("2021-02-21"));
    }

    #[test]
    fn test_convert_no_date_field() {
        assert_eq!(convert(Value::Null, "DD-MM-YYYY"), Value::Null);

        let untouched = format_date_field(
            json!({"other": 1}),
            json!({"date_field": "date", "format": "DD-MM-YYYY"}),
        );
        assert_eq!(Value::Object(untouched), json!({"other": 1}));
    }

    #[test]
    fn test_unparsable_date_becomes_null() {
        assert_eq!(convert(json!("31-02-2021"), "DD-MM-YYYY"), Value::Null);
        assert_eq!(convert(json!("not a date"), "YYYY-MM-DD"), Value::Null);
        assert_eq!(convert(json!([2021, 2, 21]), "YYYY-MM-DD"), Value::Null);
    }

    #[test]
    fn test_nested_convert_dd_mm_yyyy() {
        let result = format_date_field(
            json!({"date": {"nested_date": "21-02-2021"}}),
            json!({"date_field": "date.nested_date", "format": "DD-MM-YYYY"}),
        );
        assert_eq!(result["date"]["nested_date"], json!("2021-02-21"));
    }

    #[test]
    fn test_format_date_field_with_condition() {
        let result = format_date_field(
            json!({"date": "21-02-2021"}),
            json!({
                "date_field": "date",
                "format": "DD-MM-YYYY",
                "condition": {"field_does_exist": null}
            }),
        );
        assert_eq!(result["date"], json!("2021-02-21"));
    }

    #[test]
    fn test_format_date_field_with_false_condition() {
        let result = format_date_field(
            json!({"date": "21-02-2021"}),
            json!({
                "date_field": "date",
                "format": "DD-MM-YYYY",
                "condition": {"equals": "other_value"}
            }),
        );
        assert_eq!(result["date"], json!("21-02-2021"));
    }

    #[test]
    fn test_condition_on_other_field() {
        let rule = json!({
            "date_field": "date",
            "format": "DD-MM-YYYY",
            "condition": {"equals": "eu"},
            "condition_field": "region"
        });

        let applied =
            format_date_field(json!({"region": "eu", "date": "21-02-2021"}), rule.clone());
        assert_eq!(applied["date"], json!("2021-02-21"));

        let skipped = format_date_field(json!({"region": "us", "date": "21-02-2021"}), rule);
        assert_eq!(skipped["date"], json!("21-02-2021"));
    }

    #[test]
    fn test_missing_parent_is_noop() {
        let result = format_date_field(
            json!({"other_field": "value"}),
            json!({"date_field": "missing_parent.date", "format": "YYYY-MM-DD"}),
        );
        assert_eq!(Value::Object(result), json!({"other_field": "value"}));
    }

    #[test]
    fn test_unsupported_date_format_raises_error() {
        let err = DateRule::from_value(
            "$format_date",
            &json!({"date_field": "date", "format": "UNSUPPORTED_FORMAT"}),
        )
        .unwrap_err();

        assert!(matches!(err, RuleError::FormatNotImplemented(ref f) if f == "UNSUPPORTED_FORMAT"));
        assert!(err.to_string().contains("UNSUPPORTED_FORMAT"));
    }

    #[test]
    fn test_format_names_round_trip() {
        let names = [
            "YYYY-MM-DD",
            "YYYYMMDD",
            "DD-MM-YYYY",
            "DD.MM.YYYY",
            "DD/MM/YYYY",
            "YYYY_MM_DD",
        ];
        for name in names {
            let format: DateFormat = name.parse().unwrap();
            assert_eq!(format.to_string(), name);
        }
    }
}
