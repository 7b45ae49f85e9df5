//! JSON I/O handling for the CLI
//!
//! - Rows: one JSON object per line, `{"tid": 5, "key": ["A"]}`
//! - Queries: a single JSON object
//! - Output: a single JSON object on stdout
//! - UTF-8 only

use std::io::{BufRead, Write};
use std::ops::Bound;

use serde_json::Value;

use super::errors::{CliError, CliResult};
use crate::lov::{IndexSchema, LovKey, ScanPredicate};
use crate::tid::Tid;

/// One input row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub tid: Tid,
    pub key: LovKey,
}

/// Reads rows until end of input. Blank lines are skipped.
pub fn read_rows<'a, R: BufRead + 'a>(
    input: R,
    schema: &'a IndexSchema,
) -> impl Iterator<Item = CliResult<Row>> + 'a {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty()))
        .map(move |(n, line)| {
            let line = line.map_err(CliError::from)?;
            parse_row(&line, n + 1, schema)
        })
}

pub fn parse_row(line: &str, line_no: usize, schema: &IndexSchema) -> CliResult<Row> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| CliError::bad_input(line_no, format!("invalid JSON: {}", e)))?;
    let tid = value
        .get("tid")
        .and_then(Value::as_u64)
        .ok_or_else(|| CliError::bad_input(line_no, "missing or non-integer \"tid\""))?;
    let key = value
        .get("key")
        .ok_or_else(|| CliError::bad_input(line_no, "missing \"key\""))?;
    Ok(Row {
        tid,
        key: parse_key(key, line_no, schema)?,
    })
}

fn parse_key(value: &Value, line_no: usize, schema: &IndexSchema) -> CliResult<LovKey> {
    let key = LovKey::from_json(value).map_err(|e| CliError::bad_input(line_no, e.to_string()))?;
    Ok(schema.coerce_key(key))
}

/// Query forms:
/// - `{"eq": key}`
/// - `{"in": [key, ...]}`
/// - `{"all": [key, ...]}`, rows holding every key
/// - `{"range": {"gte"|"gt": key, "lte"|"lt": key}}`
/// - `{"is_null": true}`
pub fn parse_query(value: &Value, schema: &IndexSchema) -> CliResult<ScanPredicate> {
    let obj = value
        .as_object()
        .ok_or_else(|| CliError::bad_input(1, "query must be a JSON object"))?;

    if let Some(key) = obj.get("eq") {
        return Ok(ScanPredicate::Eq(parse_key(key, 1, schema)?));
    }
    if let Some(keys) = obj.get("in") {
        return Ok(ScanPredicate::In(parse_keys("in", keys, schema)?));
    }
    if let Some(keys) = obj.get("all") {
        return Ok(ScanPredicate::All(parse_keys("all", keys, schema)?));
    }
    if let Some(range) = obj.get("range") {
        let bound = |incl: &str, excl: &str| -> CliResult<Bound<LovKey>> {
            match (range.get(incl), range.get(excl)) {
                (Some(_), Some(_)) => Err(CliError::bad_input(
                    1,
                    format!("range takes only one of \"{}\" and \"{}\"", incl, excl),
                )),
                (Some(k), None) => Ok(Bound::Included(parse_key(k, 1, schema)?)),
                (None, Some(k)) => Ok(Bound::Excluded(parse_key(k, 1, schema)?)),
                (None, None) => Ok(Bound::Unbounded),
            }
        };
        return Ok(ScanPredicate::Range {
            lower: bound("gte", "gt")?,
            upper: bound("lte", "lt")?,
        });
    }
    if obj.get("is_null").and_then(Value::as_bool) == Some(true) {
        return Ok(ScanPredicate::IsNull);
    }
    Err(CliError::bad_input(
        1,
        "query needs one of \"eq\", \"in\", \"all\", \"range\", \"is_null\"",
    ))
}

fn parse_keys(field: &str, value: &Value, schema: &IndexSchema) -> CliResult<Vec<LovKey>> {
    value
        .as_array()
        .ok_or_else(|| CliError::bad_input(1, format!("\"{}\" takes an array of keys", field)))?
        .iter()
        .map(|k| parse_key(k, 1, schema))
        .collect()
}

/// Reads the whole input as one JSON value.
pub fn read_request<R: BufRead>(mut input: R) -> CliResult<Value> {
    let mut text = String::new();
    input.read_to_string(&mut text)?;
    if text.trim().is_empty() {
        return Err(CliError::io_error("Empty input"));
    }
    Ok(serde_json::from_str(&text)?)
}

pub fn write_response<W: Write>(output: &mut W, data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    serde_json::to_writer(&mut *output, &response)?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

pub fn write_error<W: Write>(output: &mut W, code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    serde_json::to_writer(&mut *output, &response)?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lov::{AttributeType, IndexKey};
    use serde_json::json;

    fn schema() -> IndexSchema {
        IndexSchema::new(vec![AttributeType::Float]).unwrap()
    }

    #[test]
    fn test_rows_skip_blank_lines() {
        let input = "{\"tid\": 1, \"key\": [2]}\n\n{\"tid\": 3, \"key\": 2.5}\n";
        let rows: Vec<Row> = read_rows(input.as_bytes(), &schema())
            .collect::<CliResult<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, LovKey::single(IndexKey::from_float(2.0)));
        assert_eq!(rows[1].tid, 3);
    }

    #[test]
    fn test_bad_row_reports_line() {
        let input = "{\"tid\": 1, \"key\": [2]}\n{\"key\": [2]}\n";
        let err = read_rows(input.as_bytes(), &schema())
            .collect::<CliResult<Vec<_>>>()
            .unwrap_err();
        assert_eq!(err.code_str(), "AERO_CLI_BAD_INPUT");
        assert!(err.message().starts_with("line 2"));
    }

    #[test]
    fn test_parse_range_query() {
        let predicate = parse_query(&json!({"range": {"gte": 1, "lt": 4}}), &schema()).unwrap();
        assert_eq!(
            predicate,
            ScanPredicate::Range {
                lower: Bound::Included(LovKey::single(IndexKey::from_float(1.0))),
                upper: Bound::Excluded(LovKey::single(IndexKey::from_float(4.0))),
            }
        );
        assert!(parse_query(&json!({"range": {"gt": 1, "gte": 2}}), &schema()).is_err());
        assert!(parse_query(&json!({"nothing": 1}), &schema()).is_err());
    }

    #[test]
    fn test_parse_all_query() {
        let predicate = parse_query(&json!({"all": [[1], 2]}), &schema()).unwrap();
        assert_eq!(
            predicate,
            ScanPredicate::All(vec![
                LovKey::single(IndexKey::from_float(1.0)),
                LovKey::single(IndexKey::from_float(2.0)),
            ])
        );
        assert!(parse_query(&json!({"all": 2}), &schema()).is_err());
    }

    #[test]
    fn test_write_response_envelope() {
        let mut out = Vec::new();
        write_response(&mut out, json!({"count": 2})).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["data"]["count"], 2);
    }
}
