//! Typed attribute evaluators.
//!
//! Each data type compares a desired value (`want`, textual as stored on the
//! rule) with an actual value (also textual, from an attribute bag) under an
//! operator. Dispatch is a match over the closed [`DataType`] enum.

use chrono::{Datelike, Duration, TimeZone, Utc};
use serde_json::Value;

use super::types::{DataType, Operator};
use crate::errors::ApsisError;

/// Entry point: select the evaluator for `data_type` and run it.
pub fn evaluate(
    data_type: DataType,
    want: &str,
    actual: &str,
    op: Operator,
) -> Result<bool, ApsisError> {
    match data_type {
        DataType::String => evaluate_string(want, actual, op),
        DataType::Number => evaluate_number(want, actual, op),
        DataType::Boolean => evaluate_boolean(want, actual, op),
        DataType::Float => evaluate_float(want, actual, op),
        DataType::Datetime => evaluate_datetime(want, actual, op),
        DataType::Array => evaluate_array(want, actual, op),
    }
}

fn unknown_op(op: Operator, data_type: DataType) -> ApsisError {
    ApsisError::UnknownOperator {
        op: op.as_str().to_string(),
        data_type: data_type.as_str().to_string(),
    }
}

fn decode_err(what: &str, raw: &str) -> ApsisError {
    ApsisError::DecodeError(format!("{what}: {raw:?}"))
}

fn decode_json_list(raw: &str) -> Result<Vec<Value>, ApsisError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => Ok(items),
        _ => Err(decode_err("expected JSON list", raw)),
    }
}

/// Decode a side that may be either a JSON list or a bare scalar; scalars
/// become singletons so set operators work on single-valued attributes.
fn decode_list_or_singleton(raw: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(scalar) => vec![scalar],
        Err(_) => vec![Value::String(raw.to_string())],
    }
}

fn evaluate_string(want: &str, actual: &str, op: Operator) -> Result<bool, ApsisError> {
    match op {
        Operator::Eq => Ok(want == actual),
        Operator::Ne => Ok(want != actual),
        Operator::In | Operator::NotIn => {
            let list = decode_json_list(want)?;
            let hit = list.iter().any(|v| v.as_str() == Some(actual));
            Ok(if op == Operator::In { hit } else { !hit })
        }
        Operator::Any | Operator::All => {
            let want_list = decode_json_list(want)?;
            let actual_list = decode_list_or_singleton(actual);
            Ok(set_compare(&want_list, &actual_list, op))
        }
        other => Err(unknown_op(other, DataType::String)),
    }
}

fn evaluate_boolean(want: &str, actual: &str, op: Operator) -> Result<bool, ApsisError> {
    let parse = |raw: &str| -> Result<bool, ApsisError> {
        match raw {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(decode_err("boolean", raw)),
        }
    };
    match op {
        Operator::Eq => Ok(parse(want)? == parse(actual)?),
        Operator::Ne => Ok(parse(want)? != parse(actual)?),
        Operator::In | Operator::NotIn => {
            let actual = parse(actual)?;
            let list = decode_json_list(want)?;
            let hit = list.iter().any(|v| v.as_bool() == Some(actual));
            Ok(if op == Operator::In { hit } else { !hit })
        }
        Operator::Any | Operator::All => {
            let want_list = decode_json_list(want)?;
            let actual_list = decode_list_or_singleton(actual);
            Ok(set_compare(&want_list, &actual_list, op))
        }
        other => Err(unknown_op(other, DataType::Boolean)),
    }
}

fn evaluate_number(want: &str, actual: &str, op: Operator) -> Result<bool, ApsisError> {
    let actual: i64 = actual.parse().map_err(|_| decode_err("integer", actual))?;
    match op {
        Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            let want: i64 = want.parse().map_err(|_| decode_err("integer", want))?;
            Ok(ordered_compare(actual, want, op))
        }
        Operator::In | Operator::NotIn => {
            let list = decode_json_list(want)?;
            let hit = list.iter().any(|v| v.as_i64() == Some(actual));
            Ok(if op == Operator::In { hit } else { !hit })
        }
        other => Err(unknown_op(other, DataType::Number)),
    }
}

fn evaluate_float(want: &str, actual: &str, op: Operator) -> Result<bool, ApsisError> {
    let actual: f64 = actual.parse().map_err(|_| decode_err("float", actual))?;
    match op {
        Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            let want: f64 = want.parse().map_err(|_| decode_err("float", want))?;
            Ok(match op {
                Operator::Eq => actual == want,
                Operator::Ne => actual != want,
                Operator::Lt => actual < want,
                Operator::Le => actual <= want,
                Operator::Gt => actual > want,
                Operator::Ge => actual >= want,
                _ => unreachable!(),
            })
        }
        Operator::In | Operator::NotIn => {
            let list = decode_json_list(want)?;
            let hit = list.iter().any(|v| v.as_f64() == Some(actual));
            Ok(if op == Operator::In { hit } else { !hit })
        }
        other => Err(unknown_op(other, DataType::Float)),
    }
}

fn evaluate_array(want: &str, actual: &str, op: Operator) -> Result<bool, ApsisError> {
    match op {
        Operator::Any | Operator::All => {
            let want_list = decode_json_list(want)?;
            let actual_list = decode_json_list(actual)?;
            Ok(set_compare(&want_list, &actual_list, op))
        }
        other => Err(unknown_op(other, DataType::Array)),
    }
}

/// ANY = non-empty intersection; ALL = every actual element is in want.
fn set_compare(want: &[Value], actual: &[Value], op: Operator) -> bool {
    match op {
        Operator::Any => actual.iter().any(|a| want.contains(a)),
        Operator::All => !actual.is_empty() && actual.iter().all(|a| want.contains(a)),
        _ => false,
    }
}

fn ordered_compare<T: PartialOrd>(actual: T, want: T, op: Operator) -> bool {
    match op {
        Operator::Eq => actual == want,
        Operator::Ne => actual != want,
        Operator::Lt => actual < want,
        Operator::Le => actual <= want,
        Operator::Gt => actual > want,
        Operator::Ge => actual >= want,
        _ => false,
    }
}

fn evaluate_datetime(want: &str, actual: &str, op: Operator) -> Result<bool, ApsisError> {
    if !matches!(op, Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge) {
        return Err(unknown_op(op, DataType::Datetime));
    }
    let actual_ms: i64 = actual.parse().map_err(|_| decode_err("datetime millis", actual))?;
    let target_ms = resolve_time_pattern(want, actual_ms)?;
    Ok(ordered_compare(actual_ms, target_ms, op))
}

/// Resolves the want side of a datetime rule to an absolute instant.
///
/// `@time(<ms>)` is absolute; `@day(HH:MM)`, `@week(<wd>,HH:MM)` (Sunday=0)
/// and `@month(<d>,HH:MM)` derive a target from the actual instant's UTC
/// date. A bare integer is taken as absolute milliseconds.
fn resolve_time_pattern(want: &str, actual_ms: i64) -> Result<i64, ApsisError> {
    let Some(rest) = want.strip_prefix('@') else {
        return want.parse().map_err(|_| decode_err("datetime millis", want));
    };
    let (kind, inner) = rest
        .split_once('(')
        .and_then(|(kind, tail)| tail.strip_suffix(')').map(|inner| (kind, inner)))
        .ok_or_else(|| decode_err("time pattern", want))?;

    let actual = Utc
        .timestamp_millis_opt(actual_ms)
        .single()
        .ok_or_else(|| decode_err("datetime millis", &actual_ms.to_string()))?;

    match kind {
        "time" => inner.parse().map_err(|_| decode_err("@time millis", inner)),
        "day" => {
            let (hour, minute) = parse_hhmm(inner)?;
            at_time(actual.date_naive(), hour, minute, want)
        }
        "week" => {
            let (wd_raw, hhmm) = inner.split_once(',').ok_or_else(|| decode_err("@week", inner))?;
            let wd: i64 = wd_raw.trim().parse().map_err(|_| decode_err("@week weekday", wd_raw))?;
            if !(0..=6).contains(&wd) {
                return Err(decode_err("@week weekday", wd_raw));
            }
            let (hour, minute) = parse_hhmm(hhmm)?;
            // Weeks start on Sunday (wd = 0).
            let today = actual.weekday().num_days_from_sunday() as i64;
            let date = actual.date_naive() + Duration::days(wd - today);
            at_time(date, hour, minute, want)
        }
        "month" => {
            let (d_raw, hhmm) = inner.split_once(',').ok_or_else(|| decode_err("@month", inner))?;
            let day: u32 = d_raw.trim().parse().map_err(|_| decode_err("@month day", d_raw))?;
            if !(1..=31).contains(&day) {
                return Err(decode_err("@month day", d_raw));
            }
            let (hour, minute) = parse_hhmm(hhmm)?;
            let date = actual
                .date_naive()
                .with_day(day)
                .ok_or_else(|| decode_err("@month day out of range for month", d_raw))?;
            at_time(date, hour, minute, want)
        }
        _ => Err(decode_err("time pattern kind", kind)),
    }
}

fn parse_hhmm(raw: &str) -> Result<(u32, u32), ApsisError> {
    let (h, m) = raw.trim().split_once(':').ok_or_else(|| decode_err("HH:MM", raw))?;
    let hour: u32 = h.parse().map_err(|_| decode_err("HH:MM hour", raw))?;
    let minute: u32 = m.parse().map_err(|_| decode_err("HH:MM minute", raw))?;
    if hour > 23 || minute > 59 {
        return Err(decode_err("HH:MM", raw));
    }
    Ok((hour, minute))
}

fn at_time(date: chrono::NaiveDate, hour: u32, minute: u32, want: &str) -> Result<i64, ApsisError> {
    date.and_hms_opt(hour, minute, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| decode_err("time pattern", want))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-06-01 is a Sunday; 12:00:00 UTC.
    const SUNDAY_NOON_MS: i64 = 1748779200000;

    #[test]
    fn string_eq_ne() {
        assert!(evaluate(DataType::String, "a", "a", Operator::Eq).unwrap());
        assert!(!evaluate(DataType::String, "a", "b", Operator::Eq).unwrap());
        assert!(evaluate(DataType::String, "a", "b", Operator::Ne).unwrap());
    }

    #[test]
    fn string_in_not_in() {
        assert!(evaluate(DataType::String, r#"["a","b"]"#, "a", Operator::In).unwrap());
        assert!(!evaluate(DataType::String, r#"["a","b"]"#, "c", Operator::In).unwrap());
        assert!(evaluate(DataType::String, r#"["a","b"]"#, "c", Operator::NotIn).unwrap());
    }

    #[test]
    fn string_in_wants_json_list() {
        let err = evaluate(DataType::String, "not-a-list", "a", Operator::In).unwrap_err();
        assert!(matches!(err, ApsisError::DecodeError(_)));
    }

    #[test]
    fn string_rejects_ordering_ops() {
        let err = evaluate(DataType::String, "a", "b", Operator::Lt).unwrap_err();
        assert!(matches!(err, ApsisError::UnknownOperator { .. }));
    }

    #[test]
    fn number_ordering() {
        assert!(evaluate(DataType::Number, "20", "25", Operator::Ge).unwrap());
        assert!(evaluate(DataType::Number, "30", "25", Operator::Le).unwrap());
        assert!(!evaluate(DataType::Number, "30", "31", Operator::Le).unwrap());
        assert!(evaluate(DataType::Number, "5", "5", Operator::Eq).unwrap());
    }

    #[test]
    fn number_in() {
        assert!(evaluate(DataType::Number, "[1,2,3]", "2", Operator::In).unwrap());
        assert!(evaluate(DataType::Number, "[1,2,3]", "9", Operator::NotIn).unwrap());
    }

    #[test]
    fn number_decode_error() {
        let err = evaluate(DataType::Number, "10", "not-a-number", Operator::Eq).unwrap_err();
        assert!(matches!(err, ApsisError::DecodeError(_)));
    }

    #[test]
    fn float_ordering() {
        assert!(evaluate(DataType::Float, "1.5", "2.5", Operator::Gt).unwrap());
        assert!(evaluate(DataType::Float, "2.5", "2.5", Operator::Eq).unwrap());
    }

    #[test]
    fn boolean_literals() {
        assert!(evaluate(DataType::Boolean, "true", "true", Operator::Eq).unwrap());
        assert!(evaluate(DataType::Boolean, "true", "false", Operator::Ne).unwrap());
        assert!(evaluate(DataType::Boolean, "yes", "true", Operator::Eq).is_err());
    }

    #[test]
    fn array_any_all() {
        assert!(evaluate(DataType::Array, "[1,2]", "[2,9]", Operator::Any).unwrap());
        assert!(!evaluate(DataType::Array, "[1,2]", "[8,9]", Operator::Any).unwrap());
        assert!(evaluate(DataType::Array, "[1,2,3]", "[1,3]", Operator::All).unwrap());
        assert!(!evaluate(DataType::Array, "[1,2,3]", "[1,4]", Operator::All).unwrap());
    }

    #[test]
    fn datetime_absolute() {
        assert!(evaluate(DataType::Datetime, "@time(1000)", "2000", Operator::Ge).unwrap());
        assert!(evaluate(DataType::Datetime, "1000", "500", Operator::Lt).unwrap());
    }

    #[test]
    fn datetime_day_window() {
        // @day(09:00) on 2025-06-01 = 09:00 that day; noon is past it.
        let actual = SUNDAY_NOON_MS.to_string();
        assert!(evaluate(DataType::Datetime, "@day(09:00)", &actual, Operator::Ge).unwrap());
        assert!(evaluate(DataType::Datetime, "@day(18:00)", &actual, Operator::Le).unwrap());
        assert!(!evaluate(DataType::Datetime, "@day(09:00)", &actual, Operator::Le).unwrap());
    }

    #[test]
    fn datetime_week_target() {
        // Actual is Sunday (wd=0); @week(3,..) is the same week's Wednesday.
        let actual = SUNDAY_NOON_MS.to_string();
        assert!(evaluate(DataType::Datetime, "@week(3,00:00)", &actual, Operator::Le).unwrap());
        assert!(!evaluate(DataType::Datetime, "@week(0,09:00)", &actual, Operator::Le).unwrap());
    }

    #[test]
    fn datetime_month_target() {
        let actual = SUNDAY_NOON_MS.to_string();
        // 2025-06-15 00:00 is after 2025-06-01 12:00.
        assert!(evaluate(DataType::Datetime, "@month(15,00:00)", &actual, Operator::Le).unwrap());
        assert!(evaluate(DataType::Datetime, "@month(1,09:00)", &actual, Operator::Ge).unwrap());
    }

    #[test]
    fn datetime_rejects_equality() {
        let err = evaluate(DataType::Datetime, "@day(09:00)", "1000", Operator::Eq).unwrap_err();
        assert!(matches!(err, ApsisError::UnknownOperator { .. }));
    }

    #[test]
    fn datetime_bad_pattern() {
        let err = evaluate(DataType::Datetime, "@week(9,09:00)", "1000", Operator::Ge).unwrap_err();
        assert!(matches!(err, ApsisError::DecodeError(_)));
    }

    #[test]
    fn equals_roundtrip_per_type() {
        assert!(evaluate(DataType::String, "x", "x", Operator::Eq).unwrap());
        assert!(evaluate(DataType::Number, "7", "7", Operator::Eq).unwrap());
        assert!(evaluate(DataType::Float, "7.5", "7.5", Operator::Eq).unwrap());
        assert!(evaluate(DataType::Boolean, "false", "false", Operator::Eq).unwrap());
    }
}
