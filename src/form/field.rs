//! Per-kind cleaning of raw strings into stored values.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::schema::{FieldKind, FieldMeta};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

pub fn invalid_list_choice(value: &str) -> String {
    format!("Select a valid choice. {} is not one of the available choices.", value)
}

/// Clean the raw values submitted for `field`. Existence of related ids is
/// checked by the form, not here.
pub fn clean(field: &FieldMeta, raw: &[String]) -> Result<Value, String> {
    if field.is_multivalued_relation() {
        return clean_id_list(field, raw);
    }

    let value = raw.last().map(|s| s.trim()).unwrap_or("");
    if value.is_empty() {
        return match field.kind {
            _ if field.is_required() => Err(REQUIRED.to_string()),
            FieldKind::Boolean if !field.nullable => Ok(Value::Bool(false)),
            _ => Ok(Value::Null),
        };
    }

    match &field.kind {
        FieldKind::Integer => {
            let number = value.parse::<i64>().map_err(|_| "Enter a whole number.".to_string())?;
            let (min, max) = integer_bounds(&field.db_type);
            if number > max {
                return Err(format!("Ensure this value is less than or equal to {}.", max));
            }
            if number < min {
                return Err(format!("Ensure this value is greater than or equal to {}.", min));
            }
            Ok(Value::from(number))
        }
        FieldKind::Float => value
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| "Enter a number.".to_string()),
        FieldKind::Decimal => Decimal::from_str(value)
            .map(|d| Value::String(d.to_string()))
            .map_err(|_| "Enter a number.".to_string()),
        FieldKind::Boolean => match value.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" | "yes" => Ok(Value::Bool(true)),
            "off" | "false" | "0" | "no" => Ok(Value::Bool(false)),
            _ => Err("Enter a valid boolean.".to_string()),
        },
        FieldKind::Text => {
            let length = value.chars().count();
            match field.max_length {
                Some(max) if length > max => Err(format!(
                    "Ensure this value has at most {} characters (it has {}).",
                    max, length
                )),
                _ => Ok(Value::String(value.to_string())),
            }
        }
        FieldKind::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| "Enter a valid date.".to_string()),
        FieldKind::DateTime => parse_datetime(value)
            .map(Value::String)
            .ok_or_else(|| "Enter a valid date/time.".to_string()),
        FieldKind::Uuid => Uuid::parse_str(value)
            .map(|u| Value::String(u.hyphenated().to_string()))
            .map_err(|_| "Enter a valid UUID.".to_string()),
        FieldKind::Json => serde_json::from_str::<Value>(value).map_err(|_| "Enter a valid JSON.".to_string()),
        FieldKind::ForeignKey { .. } => value
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| INVALID_CHOICE.to_string()),
        FieldKind::ManyToMany { .. } => clean_id_list(field, raw),
    }
}

/// Repeated values or comma-separated ids, deduplicated in submission order
fn clean_id_list(field: &FieldMeta, raw: &[String]) -> Result<Value, String> {
    let mut ids: Vec<i64> = Vec::new();
    for part in raw.iter().flat_map(|s| s.split(',')).map(str::trim).filter(|s| !s.is_empty()) {
        let id = part.parse::<i64>().map_err(|_| invalid_list_choice(part))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    if ids.is_empty() && field.is_required() {
        return Err(REQUIRED.to_string());
    }
    Ok(Value::Array(ids.into_iter().map(Value::from).collect()))
}

fn parse_datetime(value: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.to_rfc3339());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc().to_rfc3339())
}

/// Ids held by a cleaned many-to-many value
pub fn cleaned_ids(value: &Value) -> Vec<i64> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

/// Range accepted by the column's integer type
fn integer_bounds(db_type: &str) -> (i64, i64) {
    match db_type.to_ascii_lowercase().as_str() {
        "int2" | "smallint" => (i16::MIN.into(), i16::MAX.into()),
        "int4" | "integer" | "serial" => (i32::MIN.into(), i32::MAX.into()),
        _ => (i64::MIN, i64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::ColumnInfo;
    use crate::schema::{ModelSchema, RelationSpec};
    use serde_json::json;

    fn schema() -> ModelSchema {
        let columns = vec![
            ColumnInfo::primary_key("id"),
            ColumnInfo::new("qty", "int4"),
            ColumnInfo::new("rank", "int2").nullable(),
            ColumnInfo::new("views", "int8").nullable(),
            ColumnInfo::new("ratio", "float8").nullable(),
            ColumnInfo::new("price", "numeric").nullable(),
            ColumnInfo::new("active", "bool"),
            ColumnInfo::new("title", "varchar").max_length(5),
            ColumnInfo::new("released", "date").nullable(),
            ColumnInfo::new("seen_at", "timestamptz").nullable(),
            ColumnInfo::new("token", "uuid").nullable(),
            ColumnInfo::new("meta", "jsonb").nullable(),
            ColumnInfo::new("owner_id", "int8").references("auth_user"),
        ];
        let relations = vec![RelationSpec {
            name: "tags".to_string(),
            target: "shop_tag".to_string(),
            through: "shop_item_tags".to_string(),
            source_column: "item_id".to_string(),
            target_column: "tag_id".to_string(),
            required: true,
        }];
        ModelSchema::from_columns("shop_item", columns, &relations, &[]).unwrap()
    }

    fn run(field: &str, raw: &[&str]) -> Result<Value, String> {
        let schema = schema();
        let raw: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
        clean(schema.field(field).unwrap(), &raw)
    }

    #[test]
    fn cleans_numbers() {
        assert_eq!(run("qty", &[" 42 "]), Ok(json!(42)));
        assert_eq!(run("qty", &["4.2"]), Err("Enter a whole number.".to_string()));
        assert_eq!(run("qty", &[""]), Err(REQUIRED.to_string()));
        assert_eq!(run("ratio", &["0.25"]), Ok(json!(0.25)));
        assert_eq!(run("ratio", &[""]), Ok(Value::Null));
        assert_eq!(run("price", &["12.50"]), Ok(json!("12.50")));
        assert_eq!(run("price", &["abc"]), Err("Enter a number.".to_string()));
    }

    #[test]
    fn integers_respect_the_column_range() {
        assert_eq!(run("qty", &["2147483647"]), Ok(json!(2147483647)));
        assert_eq!(
            run("qty", &["2147483648"]),
            Err("Ensure this value is less than or equal to 2147483647.".to_string())
        );
        assert_eq!(
            run("qty", &["-2147483649"]),
            Err("Ensure this value is greater than or equal to -2147483648.".to_string())
        );
        assert_eq!(
            run("rank", &["40000"]),
            Err("Ensure this value is less than or equal to 32767.".to_string())
        );
        assert_eq!(run("views", &["2147483648"]), Ok(json!(2147483648i64)));
    }

    #[test]
    fn cleans_booleans_and_text() {
        assert_eq!(run("active", &["on"]), Ok(json!(true)));
        assert_eq!(run("active", &[]), Ok(json!(false)));
        assert_eq!(run("active", &["maybe"]), Err("Enter a valid boolean.".to_string()));
        assert_eq!(run("title", &["abc"]), Ok(json!("abc")));
        assert_eq!(
            run("title", &["abcdefg"]),
            Err("Ensure this value has at most 5 characters (it has 7).".to_string())
        );
    }

    #[test]
    fn cleans_temporal_and_structured_values() {
        assert_eq!(run("released", &["2024-02-29"]), Ok(json!("2024-02-29")));
        assert_eq!(run("released", &["2023-02-29"]), Err("Enter a valid date.".to_string()));
        assert_eq!(run("seen_at", &["2024-01-02 03:04"]), Ok(json!("2024-01-02T03:04:00+00:00")));
        assert_eq!(run("seen_at", &["yesterday"]), Err("Enter a valid date/time.".to_string()));
        assert!(run("token", &["67e55044-10b1-426f-9247-bb680e5fe0c8"]).is_ok());
        assert_eq!(run("token", &["nope"]), Err("Enter a valid UUID.".to_string()));
        assert_eq!(run("meta", &["{\"a\": 1}"]), Ok(json!({ "a": 1 })));
        assert_eq!(run("meta", &["{"]), Err("Enter a valid JSON.".to_string()));
    }

    #[test]
    fn cleans_relations() {
        assert_eq!(run("owner_id", &["3"]), Ok(json!(3)));
        assert_eq!(run("owner_id", &["x"]), Err(INVALID_CHOICE.to_string()));
        assert_eq!(run("tags", &["1", "2,3", "2"]), Ok(json!([1, 2, 3])));
        assert_eq!(run("tags", &["1", "x"]), Err(invalid_list_choice("x")));
        assert_eq!(run("tags", &[]), Err(REQUIRED.to_string()));
        assert_eq!(cleaned_ids(&json!([4, 5])), vec![4, 5]);
    }
}
