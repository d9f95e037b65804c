// ABOUTME: Recency decision - decides whether a source row should overwrite the target
// ABOUTME: Compares last-modified values lexically by default, optionally as timestamps

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use clap::ValueEnum;

use super::row::{Row, Value};

/// How last-modified values are ordered.
///
/// `Lexical` is the committed contract: textual values are compared byte by
/// byte, which is only correct for fixed-width, zero-padded encodings such as
/// ISO-8601. `Temporal` parses both sides as timestamps first and falls back
/// to the lexical order when either side does not parse.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum ComparisonMode {
    #[default]
    Lexical,
    Temporal,
}

/// Why a row is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteReason {
    /// No target row shares the primary key.
    Missing,
    /// The source row's last-modified value sorts strictly after the target's.
    Newer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Write(WriteReason),
}

/// The last-modified values of a matched pair cannot be ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incomparable {
    pub reason: String,
}

impl Incomparable {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Decide whether `source` must be written over `target`.
///
/// An absent target always means a write. Otherwise the row is written only
/// when the source's `column` value sorts strictly greater; equal values skip,
/// which keeps repeated runs idempotent.
pub fn decide(
    source: &Row,
    target: Option<&Row>,
    column: &str,
    mode: ComparisonMode,
) -> Result<Decision, Incomparable> {
    let Some(target) = target else {
        return Ok(Decision::Write(WriteReason::Missing));
    };

    let source_value = last_modified(source, column, "source")?;
    let target_value = last_modified(target, column, "target")?;

    let ordering = match mode {
        ComparisonMode::Lexical => compare_lexical(source_value, target_value)?,
        ComparisonMode::Temporal => compare_temporal(source_value, target_value)?,
    };

    Ok(if ordering == Ordering::Greater {
        Decision::Write(WriteReason::Newer)
    } else {
        Decision::Skip
    })
}

fn last_modified<'r>(row: &'r Row, column: &str, side: &str) -> Result<&'r Value, Incomparable> {
    match row.get(column) {
        None => Err(Incomparable::new(format!("{} row has no such column", side))),
        Some(Value::Null) => Err(Incomparable::new(format!("{} value is NULL", side))),
        Some(value) => Ok(value),
    }
}

/// Byte-wise order for textual values, numeric order for numbers.
pub fn compare_lexical(a: &Value, b: &Value) -> Result<Ordering, Incomparable> {
    use Value::*;

    match (a, b) {
        (Int(x), Int(y)) => Ok(x.cmp(y)),
        (UInt(x), UInt(y)) => Ok(x.cmp(y)),
        (Int(x), UInt(y)) => Ok(i128::from(*x).cmp(&i128::from(*y))),
        (UInt(x), Int(y)) => Ok(i128::from(*x).cmp(&i128::from(*y))),
        (Float(_), Int(_) | UInt(_) | Float(_)) | (Int(_) | UInt(_), Float(_)) => {
            let (x, y) = (as_f64(a), as_f64(b));
            x.partial_cmp(&y)
                .ok_or_else(|| Incomparable::new(format!("cannot order {} and {}", x, y)))
        }
        _ => match (a.as_bytes(), b.as_bytes()) {
            (Some(x), Some(y)) => Ok(x.cmp(y)),
            _ => Err(Incomparable::new(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::UInt(u) => *u as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

/// Order two values as instants when both parse as timestamps.
pub fn compare_temporal(a: &Value, b: &Value) -> Result<Ordering, Incomparable> {
    match (a.as_str().and_then(parse_timestamp), b.as_str().and_then(parse_timestamp)) {
        (Some(x), Some(y)) => Ok(x.cmp(&y)),
        _ => compare_lexical(a, b),
    }
}

/// Parse the timestamp encodings commonly stored in last-modified columns.
///
/// Values with an offset are normalised to UTC; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMN: &str = "last_modified";

    fn row(id: i64, last_modified: Value) -> Row {
        Row::from_iter([
            ("id", Value::Int(id)),
            (COLUMN, last_modified),
            ("body", Value::from("b")),
        ])
    }

    fn text(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    #[test]
    fn test_missing_target_is_written() {
        let source = row(1, text("2018-04-19"));
        let decision = decide(&source, None, COLUMN, ComparisonMode::Lexical).unwrap();
        assert_eq!(decision, Decision::Write(WriteReason::Missing));
    }

    #[test]
    fn test_newer_source_is_written() {
        let source = row(2, text("2018-04-25T00:04:22.814Z"));
        let target = row(2, text("2018-04-20T13:04:42.814Z"));
        let decision = decide(&source, Some(&target), COLUMN, ComparisonMode::Lexical).unwrap();
        assert_eq!(decision, Decision::Write(WriteReason::Newer));
    }

    #[test]
    fn test_older_source_is_skipped() {
        let source = row(3, text("2018-04-07T11:50:46.112Z"));
        let target = row(3, text("2018-04-10T20:51:43.142Z"));
        let decision = decide(&source, Some(&target), COLUMN, ComparisonMode::Lexical).unwrap();
        assert_eq!(decision, Decision::Skip);
    }

    #[test]
    fn test_equal_values_are_skipped() {
        let source = row(4, text("2018-04-19"));
        let target = row(4, Value::from("2018-04-19"));
        let decision = decide(&source, Some(&target), COLUMN, ComparisonMode::Lexical).unwrap();
        assert_eq!(decision, Decision::Skip);
    }

    #[test]
    fn test_null_last_modified_is_reported() {
        let source = row(5, text("2018-04-19"));
        let target = row(5, Value::Null);
        let err = decide(&source, Some(&target), COLUMN, ComparisonMode::Lexical).unwrap_err();
        assert_eq!(err.reason, "target value is NULL");
    }

    #[test]
    fn test_missing_column_is_reported() {
        let source = Row::from_iter([("id", Value::Int(1))]);
        let target = row(1, text("2018-04-19"));
        let err = decide(&source, Some(&target), COLUMN, ComparisonMode::Lexical).unwrap_err();
        assert_eq!(err.reason, "source row has no such column");
    }

    #[test]
    fn test_lexical_order_is_format_sensitive() {
        // Not zero-padded: "2018-4-9" sorts after "2018-04-10" byte-wise.
        let ordering = compare_lexical(&text("2018-4-9"), &text("2018-04-10")).unwrap();
        assert_eq!(ordering, Ordering::Greater);
    }

    #[test]
    fn test_integers_compare_numerically() {
        assert_eq!(
            compare_lexical(&Value::Int(9), &Value::Int(10)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_lexical(&Value::UInt(u64::MAX), &Value::Int(-1)).unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            compare_lexical(&Value::Float(1.5), &Value::Int(1)).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_mixed_text_and_number_is_incomparable() {
        let err = compare_lexical(&Value::Int(1), &text("2018")).unwrap_err();
        assert_eq!(err.reason, "cannot compare integer with bytes");
    }

    #[test]
    fn test_temporal_mode_normalises_offsets() {
        // 01:00+02:00 is 23:00 UTC the previous day, earlier than 23:30Z.
        let a = Value::from("2018-04-20T01:00:00+02:00");
        let b = Value::from("2018-04-19T23:30:00Z");
        assert_eq!(compare_lexical(&a, &b).unwrap(), Ordering::Greater);
        assert_eq!(compare_temporal(&a, &b).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_temporal_mode_mixes_date_and_datetime() {
        let a = Value::from("2018-04-19");
        let b = Value::from("2018-04-19 00:00:00");
        assert_eq!(compare_temporal(&a, &b).unwrap(), Ordering::Equal);
        assert_eq!(compare_lexical(&a, &b).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_temporal_mode_falls_back_to_lexical() {
        let a = Value::from("v2");
        let b = Value::from("v10");
        assert_eq!(compare_temporal(&a, &b).unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2018-04-19T12:54:46.814Z").is_some());
        assert!(parse_timestamp("2018-04-19 12:54:46").is_some());
        assert!(parse_timestamp("2018-04-19 12:54:46.123456").is_some());
        assert!(parse_timestamp("2018-04-19").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
