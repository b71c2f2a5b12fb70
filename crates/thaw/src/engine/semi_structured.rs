//! Newline-delimited JSON decoding.
//!
//! Records from every object of a read are decoded together so the whole
//! read shares one inferred schema.

use std::sync::Arc;

use arrow::error::ArrowError;
use arrow::json::ReaderBuilder;
use arrow::json::reader::infer_json_schema_from_iterator;
use serde_json::Value;
use snafu::prelude::*;

use super::Table;
use super::flatten::flatten_item;
use crate::config::SemiStructuredFormat;
use crate::error::{
    EngineError, FlattenSnafu, JsonDecodeSnafu, JsonParseSnafu, MalformedRecordSnafu,
};

/// Parse the records of one uncompressed object, flattening them as `format` requires.
///
/// Blank lines are skipped.
pub fn parse_records(
    data: &[u8],
    path: &str,
    format: SemiStructuredFormat,
) -> Result<Vec<Value>, EngineError> {
    let mut records = Vec::new();

    for (index, line) in data.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let line_number = index + 1;

        let record: Value = serde_json::from_slice(line).context(JsonParseSnafu {
            path,
            line: line_number,
        })?;

        let record = match format {
            SemiStructuredFormat::Json if record.is_object() => record,
            SemiStructuredFormat::Json => {
                return MalformedRecordSnafu {
                    path,
                    line: line_number,
                    message: "record is not a JSON object",
                }
                .fail();
            }
            SemiStructuredFormat::DynamoDbJson => flatten_item(record).context(FlattenSnafu {
                path,
                line: line_number,
            })?,
        };
        records.push(record);
    }

    Ok(records)
}

/// Build a table from plain JSON records, inferring the schema from all of them.
///
/// No records decode to a table without columns.
pub fn records_to_table(
    records: &[Value],
    path: &str,
    batch_size: usize,
) -> Result<Table, EngineError> {
    if records.is_empty() {
        return Ok(Table::empty());
    }

    let schema = infer_json_schema_from_iterator(records.iter().map(Ok::<_, ArrowError>))
        .context(JsonDecodeSnafu { path })?;
    let schema = Arc::new(schema);
    if schema.fields().is_empty() {
        return Ok(Table::empty());
    }

    let mut decoder = ReaderBuilder::new(schema.clone())
        .with_batch_size(batch_size)
        .with_coerce_primitive(true)
        .build_decoder()
        .context(JsonDecodeSnafu { path })?;

    let mut batches = Vec::new();
    for chunk in records.chunks(batch_size) {
        decoder.serialize(chunk).context(JsonDecodeSnafu { path })?;
        if let Some(batch) = decoder.flush().context(JsonDecodeSnafu { path })? {
            batches.push(batch);
        }
    }

    Ok(Table::new(schema, batches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{DataType, Int64Type};

    const DDB_LINES: &str = concat!(
        r#"{"Item":{"pk":{"S":"session#1"},"turns":{"N":"3"}}}"#,
        "\n\n",
        r#"{"Item":{"pk":{"S":"session#2"},"turns":{"N":"5"},"grade":{"S":"A"}}}"#,
        "\n",
    );

    #[test]
    fn test_parse_dynamodb_lines() {
        let records =
            parse_records(DDB_LINES.as_bytes(), "data/x.json", SemiStructuredFormat::DynamoDbJson)
                .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["grade"], "A");
        assert_eq!(records[0]["turns"], 3);
    }

    #[test]
    fn test_parse_reports_line_numbers() {
        let data = b"{\"a\": 1}\n{not json}\n";
        let err = parse_records(data, "data/x.json", SemiStructuredFormat::Json).unwrap_err();
        assert!(matches!(err, EngineError::JsonParse { line: 2, .. }));

        let err = parse_records(b"[1]\n", "data/x.json", SemiStructuredFormat::Json).unwrap_err();
        assert!(matches!(err, EngineError::MalformedRecord { line: 1, .. }));

        let data = b"{\"Item\": {\"id\": {\"S\": \"a\"}}}\n\n{\"Item\": {\"id\": \"plain\"}}\n";
        let err =
            parse_records(data, "data/x.json", SemiStructuredFormat::DynamoDbJson).unwrap_err();
        assert!(matches!(err, EngineError::Flatten { line: 3, .. }));
        assert!(err.to_string().contains("attribute 'id'"));
    }

    #[test]
    fn test_records_share_one_schema() {
        let records =
            parse_records(DDB_LINES.as_bytes(), "data/x.json", SemiStructuredFormat::DynamoDbJson)
                .unwrap();
        let table = records_to_table(&records, "data/", 1).unwrap();

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.batches.len(), 2);
        assert_eq!(table.schema.fields().len(), 3);

        let turns_idx = table.schema.index_of("turns").unwrap();
        assert_eq!(table.schema.field(turns_idx).data_type(), &DataType::Int64);
        let turns = table.batches[1].column(turns_idx).as_primitive::<Int64Type>();
        assert_eq!(turns.value(0), 5);

        let grade_idx = table.schema.index_of("grade").unwrap();
        assert!(table.batches[0].column(grade_idx).is_null(0));
    }

    #[test]
    fn test_conflicting_scalars_become_strings() {
        let records = vec![
            serde_json::json!({"v": 1}),
            serde_json::json!({"v": "one"}),
        ];
        let table = records_to_table(&records, "data/", 16).unwrap();
        assert_eq!(table.schema.field(0).data_type(), &DataType::Utf8);
        let values = table.batches[0].column(0).as_string::<i32>();
        assert_eq!(values.value(0), "1");
        assert_eq!(values.value(1), "one");
    }

    #[test]
    fn test_no_records_no_columns() {
        assert!(records_to_table(&[], "data/", 16).unwrap().has_no_columns());
    }
}
