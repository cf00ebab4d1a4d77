use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo, SqlResult};

/// Renders the JSON where-clause language to parameterized SQL, and evaluates
/// the same clause against an in-memory row.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    /// Generate a WHERE fragment whose placeholders start after `starting_param_index`
    pub fn generate(where_data: &Value, starting_param_index: usize) -> Result<SqlResult, FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        let query = filter_where.build_clause(where_data)?;
        Ok(SqlResult { query, params: filter_where.param_values })
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null => Ok(()),
            Value::Object(_) => Self::generate(where_data, 0).map(|_| ()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn build_clause(&mut self, where_data: &Value) -> Result<String, FilterError> {
        let obj = match where_data {
            Value::Null => return Ok("1=1".to_string()),
            Value::Object(obj) => obj,
            _ => return Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        };

        let mut sql_conditions = vec![];
        for (key, value) in obj {
            if key.starts_with('$') {
                sql_conditions.push(self.build_logical(key, value)?);
            } else {
                for condition in Self::parse_field_condition(key, value)? {
                    sql_conditions.push(self.build_sql_condition(&condition)?);
                }
            }
        }

        if sql_conditions.is_empty() {
            Ok("1=1".to_string())
        } else {
            Ok(sql_conditions.join(" AND "))
        }
    }

    fn build_logical(&mut self, op: &str, value: &Value) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    return Ok(if op == "$and" { "1=1" } else { "1=0" }.to_string());
                }
                let mut sql_parts = Vec::with_capacity(arr.len());
                for v in arr {
                    sql_parts.push(format!("({})", self.build_clause(v)?));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", sql_parts.join(joiner)))
            }
            "$not" => Ok(format!("NOT ({})", self.build_clause(value)?)),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<Vec<FilterWhereInfo>, FilterError> {
        validate_column(field)?;

        match value {
            Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() => {
                let mut conditions = Vec::with_capacity(obj.len());
                for (op_key, op_val) in obj {
                    let operator = FilterOp::parse(op_key)
                        .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    conditions.push(FilterWhereInfo {
                        column: field.to_string(),
                        operator,
                        data: op_val.clone(),
                    });
                }
                Ok(conditions)
            }
            // Implicit equality: { field: value }
            _ => Ok(vec![FilterWhereInfo {
                column: field.to_string(),
                operator: FilterOp::Eq,
                data: value.clone(),
            }]),
        }
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let quoted_column = format!("\"{}\"", condition.column);
        let data = &condition.data;
        match condition.operator {
            FilterOp::Eq => {
                if data.is_null() { Ok(format!("{} IS NULL", quoted_column)) }
                else { Ok(format!("{} = {}", quoted_column, self.param(data.clone()))) }
            }
            FilterOp::Ne => {
                if data.is_null() { Ok(format!("{} IS NOT NULL", quoted_column)) }
                else { Ok(format!("{} <> {}", quoted_column, self.param(data.clone()))) }
            }
            FilterOp::Gt => Ok(format!("{} > {}", quoted_column, self.param(data.clone()))),
            FilterOp::Gte => Ok(format!("{} >= {}", quoted_column, self.param(data.clone()))),
            FilterOp::Lt => Ok(format!("{} < {}", quoted_column, self.param(data.clone()))),
            FilterOp::Lte => Ok(format!("{} <= {}", quoted_column, self.param(data.clone()))),
            FilterOp::Like => Ok(format!("{} LIKE {}", quoted_column, self.param(data.clone()))),
            FilterOp::ILike => Ok(format!("{} ILIKE {}", quoted_column, self.param(data.clone()))),
            FilterOp::In | FilterOp::NIn => {
                let values = match data {
                    Value::Array(values) => values.clone(),
                    other => vec![other.clone()],
                };
                let negate = condition.operator == FilterOp::NIn;
                if values.is_empty() {
                    return Ok(if negate { "1=1" } else { "1=0" }.to_string());
                }
                let params: Vec<String> = values.into_iter().map(|v| self.param(v)).collect();
                let keyword = if negate { "NOT IN" } else { "IN" };
                Ok(format!("{} {} ({})", quoted_column, keyword, params.join(", ")))
            }
            FilterOp::Between => {
                let values = between_bounds(data)?;
                Ok(format!(
                    "{} BETWEEN {} AND {}",
                    quoted_column,
                    self.param(values.0.clone()),
                    self.param(values.1.clone())
                ))
            }
            FilterOp::Null => match data.as_bool() {
                Some(true) => Ok(format!("{} IS NULL", quoted_column)),
                Some(false) => Ok(format!("{} IS NOT NULL", quoted_column)),
                None => Err(FilterError::InvalidOperatorData("$null requires a boolean".to_string())),
            },
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }

    // ========================================
    // In-memory evaluation
    // ========================================

    /// Evaluate a where clause against a row
    pub fn matches(where_data: &Value, row: &Map<String, Value>) -> Result<bool, FilterError> {
        let obj = match where_data {
            Value::Null => return Ok(true),
            Value::Object(obj) => obj,
            _ => return Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        };

        for (key, value) in obj {
            let matched = match key.as_str() {
                "$and" => {
                    let arr = value
                        .as_array()
                        .ok_or_else(|| FilterError::InvalidOperatorData("$and requires array".to_string()))?;
                    let mut all = true;
                    for v in arr {
                        all &= Self::matches(v, row)?;
                    }
                    all
                }
                "$or" => {
                    let arr = value
                        .as_array()
                        .ok_or_else(|| FilterError::InvalidOperatorData("$or requires array".to_string()))?;
                    let mut any = false;
                    for v in arr {
                        any |= Self::matches(v, row)?;
                    }
                    any
                }
                "$not" => !Self::matches(value, row)?,
                other if other.starts_with('$') => {
                    return Err(FilterError::UnsupportedOperator(other.to_string()))
                }
                field => {
                    let mut all = true;
                    for condition in Self::parse_field_condition(field, value)? {
                        all &= Self::evaluate(&condition, row.get(field).unwrap_or(&Value::Null))?;
                    }
                    all
                }
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn evaluate(condition: &FilterWhereInfo, actual: &Value) -> Result<bool, FilterError> {
        let data = &condition.data;
        Ok(match condition.operator {
            FilterOp::Eq => {
                if data.is_null() { actual.is_null() } else { compare(actual, data) == Some(Ordering::Equal) }
            }
            FilterOp::Ne => {
                if data.is_null() { !actual.is_null() } else { !actual.is_null() && compare(actual, data) != Some(Ordering::Equal) }
            }
            FilterOp::Gt => compare(actual, data) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(compare(actual, data), Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => compare(actual, data) == Some(Ordering::Less),
            FilterOp::Lte => matches!(compare(actual, data), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Like | FilterOp::ILike => {
                let (Some(text), Some(pattern)) = (actual.as_str(), data.as_str()) else {
                    return Ok(false);
                };
                if condition.operator == FilterOp::ILike {
                    like_match(&text.to_lowercase(), &pattern.to_lowercase())
                } else {
                    like_match(text, pattern)
                }
            }
            FilterOp::In | FilterOp::NIn => {
                let found = match data {
                    Value::Array(values) => values.iter().any(|v| compare(actual, v) == Some(Ordering::Equal)),
                    other => compare(actual, other) == Some(Ordering::Equal),
                };
                if condition.operator == FilterOp::In { found } else { !actual.is_null() && !found }
            }
            FilterOp::Between => {
                let (low, high) = between_bounds(data)?;
                matches!(compare(actual, low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(actual, high), Some(Ordering::Less | Ordering::Equal))
            }
            FilterOp::Null => match data.as_bool() {
                Some(true) => actual.is_null(),
                Some(false) => !actual.is_null(),
                None => return Err(FilterError::InvalidOperatorData("$null requires a boolean".to_string())),
            },
        })
    }
}

fn validate_column(column: &str) -> Result<(), FilterError> {
    let mut chars = column.chars();
    let valid_start = chars.next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false);
    if !valid_start || !column.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", column)));
    }
    Ok(())
}

fn between_bounds(data: &Value) -> Result<(&Value, &Value), FilterError> {
    match data {
        Value::Array(values) if values.len() == 2 => Ok((&values[0], &values[1])),
        _ => Err(FilterError::InvalidOperatorData("$between requires array with 2 values".to_string())),
    }
}

/// SQL-like comparison; None when the values are not comparable (including NULL)
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        // Numeric strings compare against numbers the way a text-cast column would
        (Value::String(a), Value::Number(b)) => a.parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        (Value::Number(a), Value::String(b)) => a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?),
        _ => (left == right).then_some(Ordering::Equal),
    }
}

/// SQL LIKE with `%` and `_` wildcards
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }
    p == pattern.len()
}
