//! Delimited text decoding.
//!
//! Quoted fields may span lines. Columns whose type cannot be inferred
//! (no non-empty value anywhere) are read as strings.

use std::io::Cursor;
use std::sync::Arc;

use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use snafu::prelude::*;

use super::Table;
use crate::config::DelimitedOptions;
use crate::error::{DelimitedSnafu, EngineError};

fn format_for(options: &DelimitedOptions) -> Format {
    let format = Format::default()
        .with_header(options.header)
        .with_delimiter(options.delimiter as u8)
        .with_quote(options.quote as u8);

    match options.escape {
        Some(escape) => format.with_escape(escape as u8),
        None => format,
    }
}

/// Schema used to decode: inferred types, or every column as a string.
fn decode_schema(inferred: &Schema, infer_types: bool) -> Schema {
    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|field| {
            let data_type = match field.data_type() {
                DataType::Null => DataType::Utf8,
                _ if !infer_types => DataType::Utf8,
                other => other.clone(),
            };
            Field::new(field.name(), data_type, true)
        })
        .collect();
    Schema::new(fields)
}

/// Decode one uncompressed delimited object.
///
/// An object with no content decodes to a table without columns.
pub fn decode_delimited(
    data: &[u8],
    path: &str,
    options: &DelimitedOptions,
    batch_size: usize,
) -> Result<Table, EngineError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Table::empty());
    }

    let format = format_for(options);
    let (inferred, _) = format
        .infer_schema(Cursor::new(data), None)
        .context(DelimitedSnafu { path })?;

    let schema = Arc::new(decode_schema(&inferred, options.infer_schema));
    if schema.fields().is_empty() {
        return Ok(Table::empty());
    }

    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .with_batch_size(batch_size)
        .build(Cursor::new(data))
        .context(DelimitedSnafu { path })?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context(DelimitedSnafu { path })?;

    Ok(Table::new(schema, batches))
}
