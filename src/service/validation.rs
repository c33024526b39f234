//! Payload checks against a resource's column definitions.

use crate::error::AppError;
use crate::registry::{ColumnInfo, Resource};
use crate::schema::ColumnType;
use serde_json::{Map, Value};

/// `label` is stored as varchar(255); PostgreSQL truncates an explicit cast silently.
const LABEL_MAX_CHARS: usize = 255;

pub struct RequestValidator;

impl RequestValidator {
    /// Every key must be a column, every value must fit its column, and required columns must be present.
    pub fn validate_create(resource: &Resource, body: &Map<String, Value>) -> Result<(), AppError> {
        Self::validate_fields(resource, body)?;
        for c in resource.columns.iter().filter(|c| c.required()) {
            match body.get(&c.name) {
                None | Some(Value::Null) => {
                    return Err(AppError::Validation(format!("{} is required", c.name)));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Only the fields present are checked (PATCH).
    pub fn validate_update(resource: &Resource, body: &Map<String, Value>) -> Result<(), AppError> {
        if body.contains_key(&resource.pk_column) {
            return Err(AppError::Validation(format!("{} cannot be changed", resource.pk_column)));
        }
        Self::validate_fields(resource, body)
    }

    /// Typed value for a `?column=raw` list filter. A value that cannot fit the column is a bad request.
    pub fn filter_value(column: &ColumnInfo, raw: &str) -> Result<Value, AppError> {
        let value = match column.column_type {
            ColumnType::Json => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
            ColumnType::Truefalse => match raw.parse::<bool>() {
                Ok(b) => Value::Bool(b),
                Err(_) => Value::String(raw.to_string()),
            },
            _ => Value::String(raw.to_string()),
        };
        validate_field(column, &value).map_err(|e| match e {
            AppError::Validation(msg) => AppError::BadRequest(format!("filter {}", msg)),
            other => other,
        })?;
        Ok(value)
    }

    fn validate_fields(resource: &Resource, body: &Map<String, Value>) -> Result<(), AppError> {
        for (name, v) in body {
            let column = resource
                .column(name)
                .ok_or_else(|| AppError::Validation(format!("{} has no column {}", resource.name, name)))?;
            validate_field(column, v)?;
        }
        Ok(())
    }
}

fn validate_field(column: &ColumnInfo, v: &Value) -> Result<(), AppError> {
    let col = &column.name;
    if v.is_null() {
        if column.nullable || column.has_default {
            return Ok(());
        }
        return Err(AppError::Validation(format!("{} cannot be null", col)));
    }
    let fits = match column.column_type {
        ColumnType::Label => v.as_str().map(|s| s.chars().count() <= LABEL_MAX_CHARS).unwrap_or(false),
        ColumnType::Text => v.is_string(),
        ColumnType::Email => v.as_str().map(|s| s.len() >= 3 && s.contains('@')).unwrap_or(false),
        ColumnType::Integer | ColumnType::Bigint => {
            v.as_i64().is_some() || v.as_str().map(|s| s.parse::<i64>().is_ok()).unwrap_or(false)
        }
        ColumnType::Measurement => v.is_number() || v.as_str().map(|s| s.parse::<f64>().is_ok()).unwrap_or(false),
        ColumnType::Truefalse => v.is_boolean(),
        ColumnType::Datetime => v
            .as_str()
            .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
        ColumnType::Date => v
            .as_str()
            .map(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
            .unwrap_or(false),
        ColumnType::Json => true,
        ColumnType::Uuid => v.as_str().map(|s| uuid::Uuid::parse_str(s).is_ok()).unwrap_or(false),
    };
    if fits {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} must be a valid {}",
            col,
            column.column_type.name()
        )))
    }
}
