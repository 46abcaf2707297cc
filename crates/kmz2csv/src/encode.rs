//! CSV rendering of geometry records.

use std::io::Write;

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::error::{ConvertError, Result};
use crate::extract::GeometryRecord;

/// Fixed header row.
pub const HEADER: [&str; 8] = [
    "Type",
    "Name",
    "Description",
    "Latitude",
    "Longitude",
    "Altitude",
    "GroupID",
    "VertexIndex",
];

/// MIME type of the encoded output.
pub const CSV_MIME: &str = "text/csv";

/// Encode records into CSV text.
///
/// Text fields are quoted only when they contain a comma, a double quote, or
/// a line break; inner quotes are doubled. Rows are joined by a single `\n`
/// with no terminator after the last row.
pub fn encode_csv(records: &[GeometryRecord]) -> Result<String> {
    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(64 * (records.len() + 1)));

    wtr.write_record(HEADER)?;
    for record in records {
        wtr.write_record(&row(record))?;
    }

    let mut buf = wtr
        .into_inner()
        .map_err(|err| ConvertError::Io(err.into_error()))?;
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|err| {
        ConvertError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    })
}

/// Write the encoded CSV text to `writer`.
pub fn write_csv<W: Write>(mut writer: W, records: &[GeometryRecord]) -> Result<()> {
    writer.write_all(encode_csv(records)?.as_bytes())?;
    writer.flush()?;
    Ok(())
}

fn row(record: &GeometryRecord) -> [String; 8] {
    [
        record.kind.as_str().to_owned(),
        record.name.clone(),
        record.description.clone(),
        record.latitude.to_string(),
        record.longitude.to_string(),
        record.altitude.to_string(),
        record.group_id.to_string(),
        record
            .vertex_index
            .map(|idx| idx.to_string())
            .unwrap_or_default(),
    ]
}
