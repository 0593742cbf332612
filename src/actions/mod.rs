//! Field actions: ordered, named value transformations applied to one field.
//!
//! A field-action rule names a field and a list of actions:
//!
//! ```yaml
//! $convert_price:
//!   fieldname: price
//!   actions:
//!     - divide_by: 100
//!     - round: 2
//! ```
//!
//! Actions run left to right, each receiving the value produced by the
//! previous one. Every action is total over data: values of the wrong shape
//! turn into `null` (or an empty container where noted) instead of failing.
//! Only malformed rules (unknown action, missing argument) are errors, and
//! those are reported when the rule set is loaded.

pub mod geo;
pub mod html;

use serde_json::{Map, Value};

use crate::conditions::Condition;
use crate::error::{kind_of, RuleError};
use crate::extraction::FieldPath;
use crate::record::{number_from, number_value, Record};
use crate::rules::{body_map, optional_path, required_path};
use geo::{ScaleOperator, DEFAULT_DIGITS};

/// One parsed field action.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAction {
    /// Merge the mapping found at another field into this one
    AddDataFromDict(FieldPath),
    /// Fold a sequence of mappings into one mapping
    AddDataFromListOfDict { key_key: String, value_key: String },
    /// Text nodes of an HTML fragment as a sequence of strings
    ConvertDataFromHtmlFragmentToList,
    DivideBy(f64),
    MultiplyBy(f64),
    /// Round to N decimals; 0 gives an integer
    Round(u32),
    /// Parse a string-encoded mapping
    StrToDict,
    RemoveParamsFromUrl,
    /// First N characters
    StringBegin(usize),
    ToInt,
    ToFloat,
    ToStr,
    ToLowerCase,
    ToUpperCase,
    FixedValue(Value),
    LatLonToGeojsonPoint(GeoPointArgs),
}

/// Arguments of the `lat_lon_to_geojson_point` action.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPointArgs {
    pub lat: FieldPath,
    pub lon: FieldPath,
    pub operator: Option<ScaleOperator>,
    pub digits: u32,
}

impl FieldAction {
    /// Parse one action from its name and argument.
    pub fn parse(name: &str, argument: &Value) -> Result<Self, RuleError> {
        let action = match name {
            "add_data_from_dict" => {
                let source = argument
                    .as_str()
                    .ok_or_else(|| invalid(name, "expected a field name"))?;
                FieldAction::AddDataFromDict(FieldPath::from_dotted(source))
            }
            "add_data_from_list_of_dict" => {
                let args = argument.as_object().ok_or_else(|| {
                    invalid(name, "expected a mapping with 'key_key' and 'value_key'")
                })?;
                FieldAction::AddDataFromListOfDict {
                    key_key: string_argument(name, args, "key_key")?,
                    value_key: string_argument(name, args, "value_key")?,
                }
            }
            "convert_data_from_html_fragment_to_list" => {
                FieldAction::ConvertDataFromHtmlFragmentToList
            }
            "divide_by" => {
                let divisor =
                    number_from(argument).ok_or_else(|| invalid(name, "expected a number"))?;
                if divisor == 0.0 {
                    return Err(invalid(name, "cannot divide by zero"));
                }
                FieldAction::DivideBy(divisor)
            }
            "multiply_by" => {
                let factor =
                    number_from(argument).ok_or_else(|| invalid(name, "expected a number"))?;
                FieldAction::MultiplyBy(factor)
            }
            "round" => FieldAction::Round(match argument {
                Value::Null => 0,
                other => digits_argument(name, other)?,
            }),
            "str_to_dict" => FieldAction::StrToDict,
            "remove_params_from_url" => FieldAction::RemoveParamsFromUrl,
            "string_begin" => FieldAction::StringBegin(count_argument(name, argument)?),
            "to_int" => FieldAction::ToInt,
            "to_float" => FieldAction::ToFloat,
            "to_str" => FieldAction::ToStr,
            "to_lower_case" => FieldAction::ToLowerCase,
            "to_upper_case" => FieldAction::ToUpperCase,
            "fixed_value" => FieldAction::FixedValue(argument.clone()),
            "lat_lon_to_geojson_point" => {
                FieldAction::LatLonToGeojsonPoint(GeoPointArgs::parse(name, argument)?)
            }
            other => return Err(RuleError::UnsupportedAction(other.to_string())),
        };

        Ok(action)
    }

    /// Parse an action list entry: `{name: argument}` or a bare `name`.
    pub fn from_entry(entry: &Value) -> Result<Self, RuleError> {
        match entry {
            Value::String(name) => Self::parse(name, &Value::Null),
            Value::Object(map) if map.len() == 1 => {
                let (name, argument) = map
                    .iter()
                    .next()
                    .ok_or_else(|| invalid("actions", "empty action"))?;
                Self::parse(name, argument)
            }
            other => Err(RuleError::InvalidRule {
                key: "actions".to_string(),
                reason: format!(
                    "each action must be a single-entry mapping, found {}",
                    kind_of(other)
                ),
            }),
        }
    }

    /// Apply this action to the current field value.
    ///
    /// `record` is the working record, used by actions that read other fields.
    pub fn apply(&self, value: Value, record: &Record) -> Value {
        match self {
            FieldAction::AddDataFromDict(source) => {
                let mut target = match value {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                if let Some(Value::Object(extra)) = source.resolve(record) {
                    for (k, v) in extra {
                        target.insert(k.clone(), v.clone());
                    }
                }
                Value::Object(target)
            }
            FieldAction::AddDataFromListOfDict { key_key, value_key } => match value {
                Value::Array(items) => Value::Object(fold_list_of_dict(&items, key_key, value_key)),
                _ => Value::Null,
            },
            FieldAction::ConvertDataFromHtmlFragmentToList => match value {
                Value::Null => Value::Array(Vec::new()),
                Value::String(fragment) => Value::Array(
                    html::html_fragment_to_list(&fragment)
                        .into_iter()
                        .map(Value::String)
                        .collect(),
                ),
                _ => Value::Null,
            },
            FieldAction::DivideBy(divisor) => {
                number_from(&value).map_or(Value::Null, |n| number_value(n / divisor))
            }
            FieldAction::MultiplyBy(factor) => {
                number_from(&value).map_or(Value::Null, |n| number_value(n * factor))
            }
            FieldAction::Round(digits) => match number_from(&value) {
                Some(n) if *digits == 0 => integer_value(n.round_ties_even()),
                Some(n) => number_value(round_to(n, *digits)),
                None => Value::Null,
            },
            FieldAction::StrToDict => str_to_dict(value),
            FieldAction::RemoveParamsFromUrl => match value {
                Value::String(url) => Value::String(remove_params_from_url(&url)),
                _ => Value::Null,
            },
            FieldAction::StringBegin(n) => match value {
                Value::String(s) => Value::String(s.chars().take(*n).collect()),
                _ => Value::Null,
            },
            FieldAction::ToInt => {
                number_from(&value).map_or(Value::Null, |n| integer_value(n.trunc()))
            }
            FieldAction::ToFloat => number_from(&value).map_or(Value::Null, number_value),
            FieldAction::ToStr => match value {
                Value::Null => Value::Null,
                Value::String(s) => Value::String(s),
                other => Value::String(other.to_string()),
            },
            FieldAction::ToLowerCase => match value {
                Value::String(s) => Value::String(s.to_lowercase()),
                _ => Value::Null,
            },
            FieldAction::ToUpperCase => match value {
                Value::String(s) => Value::String(s.to_uppercase()),
                _ => Value::Null,
            },
            FieldAction::FixedValue(fixed) => fixed.clone(),
            FieldAction::LatLonToGeojsonPoint(args) => geo::lat_lon_to_geojson_point(
                args.lat.resolve(record),
                args.lon.resolve(record),
                args.operator.as_ref(),
                args.digits,
            )
            .unwrap_or(Value::Null),
        }
    }
}

impl GeoPointArgs {
    fn parse(name: &str, argument: &Value) -> Result<Self, RuleError> {
        let args = argument
            .as_object()
            .ok_or_else(|| invalid(name, "expected a mapping with 'lat' and 'lon'"))?;

        let operator = match args.get("operator") {
            None | Some(Value::Null) => None,
            Some(Value::String(op)) => Some(op.parse::<ScaleOperator>()?),
            Some(other) => {
                return Err(invalid(
                    name,
                    &format!("operator must be a string, found {}", kind_of(other)),
                ))
            }
        };

        let digits = match args.get("digits") {
            None | Some(Value::Null) => DEFAULT_DIGITS,
            Some(d) => digits_argument(name, d)?,
        };

        Ok(Self {
            lat: FieldPath::from_dotted(&string_argument(name, args, "lat")?),
            lon: FieldPath::from_dotted(&string_argument(name, args, "lon")?),
            operator,
            digits,
        })
    }
}

/// A field-action rule: run `actions` on `fieldname` when `condition` holds.
#[derive(Debug, Clone)]
pub struct FieldActionRule {
    pub fieldname: FieldPath,
    pub condition: Condition,
    /// Field the condition is evaluated against; defaults to `fieldname`
    pub condition_field: Option<FieldPath>,
    pub actions: Vec<FieldAction>,
}

impl FieldActionRule {
    /// Parse the body of a `$convert` rule.
    pub fn from_value(key: &str, value: &Value) -> Result<Self, RuleError> {
        let body = body_map(key, value)?;

        let actions = match body.get("actions") {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(FieldAction::from_entry)
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(RuleError::InvalidRule {
                    key: key.to_string(),
                    reason: format!("'actions' must be a sequence, found {}", kind_of(other)),
                })
            }
        };

        Ok(Self {
            fieldname: required_path(key, body, "fieldname")?,
            condition: Condition::from_value(body.get("condition"))?,
            condition_field: optional_path(key, body, "condition_field")?,
            actions,
        })
    }

    /// Run the actions and write the result back into the record.
    ///
    /// A missing field starts the pipeline with `null`. When the field's parent
    /// does not exist the result is discarded.
    pub fn apply(&self, mut record: Record) -> Record {
        let condition_field = self.condition_field.as_ref().unwrap_or(&self.fieldname);
        if !self.condition.evaluate(condition_field.resolve(&record)) {
            tracing::debug!("Condition not met, leaving '{}' unchanged", self.fieldname);
            return record;
        }

        let current = self.fieldname.resolve(&record).cloned().unwrap_or(Value::Null);
        let result = self.actions.iter().fold(current, |value, action| {
            tracing::trace!("Applying {:?} to '{}'", action, self.fieldname);
            action.apply(value, &record)
        });

        if !self.fieldname.set(&mut record, result) {
            tracing::debug!("No parent for '{}', field action result dropped", self.fieldname);
        }

        record
    }
}

/// Round to `digits` decimals, ties to even.
///
/// Integral values and digit counts beyond `f64` precision come back
/// unchanged, as do values too large to scale.
pub(crate) fn round_to(value: f64, digits: u32) -> f64 {
    if digits > f64::DIGITS || value.fract() == 0.0 {
        return value;
    }

    let factor = 10f64.powi(digits as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }

    scaled.round_ties_even() / factor
}

/// An integral number as a JSON integer, or as a float outside the `i64` range.
fn integer_value(n: f64) -> Value {
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

    if (-I64_BOUND..I64_BOUND).contains(&n) {
        Value::from(n as i64)
    } else {
        number_value(n)
    }
}

fn fold_list_of_dict(items: &[Value], key_key: &str, value_key: &str) -> Map<String, Value> {
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            let key = match item.get(key_key)? {
                Value::String(s) => s.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            Some((key, item.get(value_key).cloned().unwrap_or(Value::Null)))
        })
        .collect()
}

fn str_to_dict(value: Value) -> Value {
    match value {
        Value::Null => Value::Object(Map::new()),
        Value::Object(map) => Value::Object(map),
        Value::String(s) => {
            let parsed = serde_json::from_str::<Value>(&s)
                .ok()
                .filter(Value::is_object)
                .or_else(|| serde_yaml::from_str::<Value>(&s).ok().filter(Value::is_object));
            parsed.unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn remove_params_from_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

fn string_argument(
    action: &str,
    args: &Map<String, Value>,
    name: &str,
) -> Result<String, RuleError> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(invalid(
            action,
            &format!("'{}' must be a string, found {}", name, kind_of(other)),
        )),
        None => Err(RuleError::MissingActionArgument {
            action: action.to_string(),
            argument: name.to_string(),
        }),
    }
}

fn count_argument(action: &str, argument: &Value) -> Result<usize, RuleError> {
    argument
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid(action, "expected a non-negative integer"))
}

fn digits_argument(action: &str, argument: &Value) -> Result<u32, RuleError> {
    argument
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| invalid(action, "expected a digit count between 0 and 4294967295"))
}

fn invalid(action: &str, reason: &str) -> RuleError {
    RuleError::InvalidActionArgument {
        action: action.to_string(),
        reason: reason.to_string(),
    }
}
