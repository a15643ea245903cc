use deadpool_sqlite::rusqlite::types::Value;

use crate::error::RelayError;
use crate::types::{ParamValue, Parameter};

/// Convert one bound value to the nearest native SQLite type.
///
/// # Errors
/// Returns `RelayError::UnsupportedParameterType` for values SQLite cannot
/// represent faithfully (non-finite floats would silently become NULL).
pub(crate) fn to_sql_value(value: &ParamValue) -> Result<Value, RelayError> {
    match value {
        ParamValue::Int(i) => Ok(Value::Integer(*i)),
        ParamValue::Float(f) => {
            if f.is_finite() {
                Ok(Value::Real(*f))
            } else {
                Err(RelayError::UnsupportedParameterType(format!(
                    "non-finite float {f} has no SQLite representation"
                )))
            }
        }
        ParamValue::Text(s) => Ok(Value::Text(s.clone())),
        ParamValue::Bool(b) => Ok(Value::Integer(i64::from(*b))),
        ParamValue::Timestamp(dt) => Ok(Value::Text(dt.format("%F %T%.f").to_string())),
        ParamValue::Json(json) => Ok(Value::Text(json.to_string())),
        ParamValue::Blob(bytes) => Ok(Value::Blob(bytes.clone())),
        ParamValue::Null => Ok(Value::Null),
    }
}

/// Lay a batch out positionally: slot `i` holds the value bound at placeholder
/// `i + 1`. Every placeholder must be covered exactly once.
///
/// # Errors
/// Returns `RelayError::Parameter` for duplicate, missing, or out-of-range
/// positions, and `RelayError::UnsupportedParameterType` from value conversion.
/// All of these fail the batch before any database call.
pub(crate) fn bind_positional(
    parameters: &[Parameter],
    placeholder_count: usize,
) -> Result<Vec<Value>, RelayError> {
    let mut slots: Vec<Option<Value>> = vec![None; placeholder_count];
    for parameter in parameters {
        let position = parameter.position();
        if position == 0 || position > placeholder_count {
            return Err(RelayError::Parameter(format!(
                "parameter position {position} out of range for {placeholder_count} placeholder(s)"
            )));
        }
        let slot = &mut slots[position - 1];
        if slot.is_some() {
            return Err(RelayError::Parameter(format!(
                "duplicate value bound at position {position}"
            )));
        }
        *slot = Some(to_sql_value(parameter.value())?);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                RelayError::Parameter(format!("no value bound at position {}", index + 1))
            })
        })
        .collect()
}

/// Read a native value back out of a row.
pub(crate) fn from_sql_value(value: Value) -> ParamValue {
    match value {
        Value::Null => ParamValue::Null,
        Value::Integer(i) => ParamValue::Int(i),
        Value::Real(f) => ParamValue::Float(f),
        Value::Text(s) => ParamValue::Text(s),
        Value::Blob(b) => ParamValue::Blob(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_values_by_position() {
        let batch = vec![
            Parameter::new(2, ParamValue::Text("a".into())),
            Parameter::new(1, ParamValue::Int(7)),
        ];
        let values = bind_positional(&batch, 2).unwrap();
        assert_eq!(values[0], Value::Integer(7));
        assert_eq!(values[1], Value::Text("a".into()));
    }

    #[test]
    fn rejects_duplicate_positions() {
        let batch = vec![
            Parameter::new(1, ParamValue::Int(1)),
            Parameter::new(1, ParamValue::Int(2)),
        ];
        assert!(matches!(
            bind_positional(&batch, 2),
            Err(RelayError::Parameter(_))
        ));
    }

    #[test]
    fn rejects_non_finite_floats() {
        let batch = vec![Parameter::new(1, ParamValue::Float(f64::NAN))];
        assert!(matches!(
            bind_positional(&batch, 1),
            Err(RelayError::UnsupportedParameterType(_))
        ));
    }
}
