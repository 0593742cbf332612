//! Integration tests for the recast rule engine

use std::fs;
use std::sync::Arc;

use recast::{
    CatalogueError, ConvertError, LoadError, MethodTable, Outcome, Record, RuleEngine, RuleError,
    RuleSet, RuleSource, Structured, TypeCatalogue,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => panic!("test fixture must be an object"),
    }
}

fn engine(rules: Value) -> RuleEngine {
    RuleEngine::new(RuleSet::from_value(&rules).unwrap())
}

#[test]
fn test_skip_semantics() {
    let engine = engine(json!({
        "$skip": {"fieldname": "f", "condition": {"does_not_equal": "x"}}
    }));

    assert_eq!(engine.process(record(json!({"f": "y"}))).unwrap(), Outcome::Dropped);
    assert_eq!(engine.convert(record(json!({"f": "y"}))).unwrap(), Record::new());

    assert_eq!(
        engine.process(record(json!({"f": "x"}))).unwrap(),
        Outcome::Converted(record(json!({"f": "x"})))
    );
}

#[test]
fn test_skip_on_missing_field() {
    let engine = engine(json!({
        "$skip": {"fieldname": "order.id", "condition": {"field_does_not_exist": null}}
    }));

    assert_eq!(engine.process(record(json!({"order": {}}))).unwrap(), Outcome::Dropped);
    assert!(matches!(
        engine.process(record(json!({"order": {"id": 7}}))).unwrap(),
        Outcome::Converted(_)
    ));
}

#[test]
fn test_output_reflects_every_applied_rule() {
    let engine = engine(json!({
        "$convert_price": {"fieldname": "price", "actions": [{"divide_by": 100}, {"round": 2}]},
        "$convert_name": {"fieldname": "name", "actions": ["to_upper_case"]},
        "$format_date_created": {"date_field": "meta.created", "format": "DD.MM.YYYY"},
        "$format_date_shipped": {"date_field": "shipped", "format": "UNIX_DT_STAMP"}
    }));

    let converted = engine
        .convert(record(json!({
            "price": 12345,
            "name": "widget",
            "meta": {"created": "21.02.2021"},
            "shipped": 1613908800,
            "untouched": true
        })))
        .unwrap();

    assert_eq!(
        Value::Object(converted),
        json!({
            "price": 123.45,
            "name": "WIDGET",
            "meta": {"created": "2021-02-21"},
            "shipped": "2021-02-21",
            "untouched": true
        })
    );
}

#[test]
fn test_independent_rules_commute() {
    let forward = engine(json!({
        "$convert_a": {"fieldname": "a", "actions": [{"multiply_by": 3}]},
        "$convert_b": {"fieldname": "b", "actions": ["to_lower_case"]}
    }));
    let backward = engine(json!({
        "$convert_b": {"fieldname": "b", "actions": ["to_lower_case"]},
        "$convert_a": {"fieldname": "a", "actions": [{"multiply_by": 3}]}
    }));

    let input = record(json!({"a": 2, "b": "MiXeD"}));
    let left = forward.convert(input.clone()).unwrap();
    let right = backward.convert(input).unwrap();

    assert_eq!(left["a"], right["a"]);
    assert_eq!(left["b"], right["b"]);
    assert_eq!(left["a"], json!(6.0));
    assert_eq!(left["b"], json!("mixed"));
}

#[test]
fn test_same_field_last_rule_wins() {
    let scale_then_round = engine(json!({
        "$convert_1": {"fieldname": "v", "actions": [{"divide_by": 3}]},
        "$convert_2": {"fieldname": "v", "actions": [{"round": 0}]}
    }));
    let round_then_scale = engine(json!({
        "$convert_2": {"fieldname": "v", "actions": [{"round": 0}]},
        "$convert_1": {"fieldname": "v", "actions": [{"divide_by": 3}]}
    }));

    let input = record(json!({"v": 10}));
    assert_eq!(scale_then_round.convert(input.clone()).unwrap()["v"], json!(3));
    assert_eq!(round_then_scale.convert(input).unwrap()["v"], json!(10.0 / 3.0));

    let fixed_twice = engine(json!({
        "$convert_first": {"fieldname": "v", "actions": [{"fixed_value": "first"}]},
        "$convert_second": {"fieldname": "v", "actions": [{"fixed_value": "second"}]}
    }));
    assert_eq!(fixed_twice.convert(Record::new()).unwrap()["v"], json!("second"));
}

#[test]
fn test_later_rules_see_earlier_changes() {
    let engine = engine(json!({
        "$convert_status": {"fieldname": "status", "actions": ["to_lower_case"]},
        "$skip": {"fieldname": "status", "condition": {"equals": "cancelled"}}
    }));

    assert_eq!(
        engine.process(record(json!({"status": "CANCELLED"}))).unwrap(),
        Outcome::Dropped
    );
}

#[test]
fn test_data_errors_stay_inside_their_field() {
    let engine = engine(json!({
        "$convert_bad": {"fieldname": "bad", "actions": [{"divide_by": 10}]},
        "$format_date_broken": {"date_field": "when", "format": "YYYY-MM-DD"},
        "$convert_good": {"fieldname": "good", "actions": [{"string_begin": 3}]}
    }));

    let converted = engine
        .convert(record(json!({"bad": [1, 2], "when": "yesterday", "good": "abcdef"})))
        .unwrap();

    assert_eq!(converted["bad"], Value::Null);
    assert_eq!(converted["when"], Value::Null);
    assert_eq!(converted["good"], json!("abc"));
}

#[test]
fn test_add_data_from_list_of_dict_through_engine() {
    let engine = engine(json!({
        "$convert": {
            "fieldname": "items",
            "actions": [{"add_data_from_list_of_dict": {"key_key": "name", "value_key": "val"}}]
        }
    }));

    let items = json!({"items": [{"name": "width", "val": 100}, {"name": "height", "val": 200}]});
    let converted = engine.convert(record(items)).unwrap();
    assert_eq!(Value::Object(converted), json!({"items": {"width": 100, "height": 200}}));

    let empty = engine.convert(record(json!({"items": []}))).unwrap();
    assert_eq!(Value::Object(empty), json!({"items": {}}));
}

#[test]
fn test_html_and_large_numbers_through_engine() {
    let engine = engine(json!({
        "$convert_description": {
            "fieldname": "description",
            "actions": ["convert_data_from_html_fragment_to_list"]
        },
        "$convert_views": {"fieldname": "views", "actions": [{"round": 0}]}
    }));

    let converted = engine
        .convert(record(json!({
            "description": "<p>Fish & chips<br>from 5&euro;<p>Open < 22:00",
            "views": 1e20
        })))
        .unwrap();

    assert_eq!(
        converted["description"],
        json!(["Fish & chips", "from 5€", "Open < 22:00"])
    );
    assert_eq!(converted["views"], json!(1e20));
}

#[test]
fn test_unsupported_date_format_names_format() {
    let err = RuleSet::from_value(&json!({
        "$format_date": {"date_field": "d", "format": "QUARTER-YYYY"}
    }))
    .unwrap_err();

    assert!(matches!(err, RuleError::FormatNotImplemented(ref f) if f == "QUARTER-YYYY"));
    assert!(err.to_string().contains("QUARTER-YYYY"));
}

#[test]
fn test_unsupported_action_fails_at_load() {
    let err = RuleSet::from_value(&json!({
        "$convert": {"fieldname": "a", "actions": [{"teleport": 1}]}
    }))
    .unwrap_err();
    assert!(matches!(err, RuleError::UnsupportedAction(ref name) if name == "teleport"));
}

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    id: String,
    total: f64,
    #[serde(default)]
    lines: Vec<OrderLine>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OrderLine {
    sku: String,
    quantity: i64,
}

fn add_line(order: &mut Order, args: Record) -> Result<(), String> {
    let line: OrderLine = serde_json::from_value(Value::Object(args)).map_err(|e| e.to_string())?;
    order.lines.push(line);
    Ok(())
}

impl Structured for Order {
    const NAME: &'static str = "Order";

    fn methods() -> MethodTable<Self> {
        MethodTable::new().with("add_line", add_line)
    }
}

fn order_catalogue() -> Arc<TypeCatalogue> {
    let mut catalogue = TypeCatalogue::new();
    catalogue.register::<Order>().unwrap();
    Arc::new(catalogue)
}

/// Serializes to a bare string, so it cannot be flattened into a record
#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent)]
struct Sku(String);

impl Structured for Sku {
    const NAME: &'static str = "Sku";
}

#[test]
fn test_registering_non_mapping_type_fails() {
    let mut catalogue = TypeCatalogue::new();
    let err = catalogue.register::<Sku>().unwrap_err();

    assert!(matches!(err, CatalogueError::NotStructured { ref type_name } if type_name == "Sku"));
    assert!(!catalogue.contains("sku"));
}

#[test]
fn test_materialization_with_per_item_methods() {
    let engine = engine(json!({
        "$convert_total": {"fieldname": "total_cents", "actions": [{"divide_by": 100}]},
        "$object_order": {
            "type_name": "order",
            "fieldname": "order",
            "params": {
                "$select": {"fieldname": "header"}
            },
            "methods": [
                {"add_line": {"$select_lines": {"fieldname": "lines"}}}
            ]
        }
    }))
    .with_catalogue(order_catalogue());

    let converted = engine
        .convert(record(json!({
            "header": {"id": "A-1", "total": 9.5},
            "total_cents": 950,
            "lines": [{"sku": "X", "quantity": 2}, {"sku": "Y", "quantity": 1}]
        })))
        .unwrap();

    assert_eq!(converted["total_cents"], json!(9.5));
    assert_eq!(
        converted["order"],
        json!({
            "id": "A-1",
            "total": 9.5,
            "lines": [{"sku": "X", "quantity": 2}, {"sku": "Y", "quantity": 1}]
        })
    );
}

#[test]
fn test_object_without_fieldname_replaces_record() {
    let engine = engine(json!({
        "$object": {"type_name": "order", "params": {}}
    }))
    .with_catalogue(order_catalogue());

    let converted = engine
        .convert(record(json!({"id": "B-2", "total": 1, "source": "feed"})))
        .unwrap();
    assert_eq!(Value::Object(converted), json!({"id": "B-2", "total": 1.0, "lines": []}));
}

#[test]
fn test_unknown_type_fails_conversion() {
    let engine =
        engine(json!({"$object": {"type_name": "invoice"}})).with_catalogue(order_catalogue());

    let err = engine.convert(Record::new()).unwrap_err();
    assert!(matches!(err, ConvertError::UnknownType(ref name) if name == "invoice"));
}

#[test]
fn test_failed_constructor_aborts_conversion() {
    let engine =
        engine(json!({"$object": {"type_name": "order"}})).with_catalogue(order_catalogue());

    let err = engine.convert(record(json!({"id": "C-3"}))).unwrap_err();
    assert!(matches!(err, ConvertError::Construction { .. }));
}

#[test]
fn test_engine_shared_across_threads() {
    let engine = Arc::new(
        engine(json!({"$convert": {"fieldname": "n", "actions": [{"multiply_by": 2}]}}))
            .with_catalogue(order_catalogue()),
    );

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.convert(record(json!({"n": i}))).unwrap())
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap()["n"], json!((i * 2) as f64));
    }
}

#[test]
fn test_yaml_rule_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("orders.yaml");
    fs::write(
        &path,
        r#"
description: orders feed
$skip:
  fieldname: status
  condition:
    equals: test
$convert_url:
  fieldname: link
  actions:
    - remove_params_from_url: null
$convert_location:
  fieldname: location
  actions:
    - lat_lon_to_geojson_point:
        lat: geo.lat
        lon: geo.lon
        operator: divide_1000
$format_date_created:
  date_field: created
  format: YYYY_MM_DD:Time
"#,
    )
    .unwrap();

    let rules = RuleSource::from_file(&path).rules().unwrap();
    assert_eq!(rules.len(), 5);

    let engine = RuleEngine::new(rules);
    let converted = engine
        .convert(record(json!({
            "status": "live",
            "link": "https://shop.example.com/item/7?ref=mail#reviews",
            "geo": {"lat": 52374, "lon": 4889},
            "created": "2021-02-21T08:00:00Z"
        })))
        .unwrap();

    assert_eq!(converted["link"], json!("https://shop.example.com/item/7"));
    assert_eq!(converted["location"], json!({"type": "Point", "coordinates": [4.889, 52.374]}));
    assert_eq!(converted["created"], json!("2021-02-21"));

    assert_eq!(
        engine.process(record(json!({"status": "test"}))).unwrap(),
        Outcome::Dropped
    );
}

#[test]
fn test_missing_rule_file() {
    let err = RuleSource::from_file("/nonexistent/rules.yaml").rules().unwrap_err();
    assert!(matches!(err, LoadError::FileNotFound(_)));
}
