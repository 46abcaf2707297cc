#![warn(missing_docs)]

//! Flatten KML and KMZ geometry into CSV.
//!
//! Every placemark's points, line strings, and polygon outer boundaries
//! become rows of a single table:
//!
//! ```text
//! Type,Name,Description,Latitude,Longitude,Altitude,GroupID,VertexIndex
//! ```
//!
//! `GroupID` ties together the vertices of one geometry instance and
//! `VertexIndex` orders them, so shapes can be rebuilt from the flat rows.
//!
//! # Example
//!
//! ```
//! use kmz2csv::convert_kml_str;
//!
//! let kml = r#"<kml><Placemark><name>A</name>
//!     <Point><coordinates>-122.08,37.42</coordinates></Point>
//! </Placemark></kml>"#;
//!
//! let csv = convert_kml_str(kml).unwrap();
//! assert_eq!(csv.lines().nth(1), Some("Point,A,,37.42,-122.08,0,0,"));
//! ```

pub mod convert;
pub mod coords;
pub mod encode;
pub mod error;
pub mod extract;
pub mod kmz;
pub mod xml;

pub use convert::{
    convert_kml_str, output_name, Conversion, Converter, SaveSink, Source, SourceKind, Status,
    StatusLevel, StatusSink,
};
pub use coords::{parse_coordinates, CoordinateTriple};
pub use encode::{encode_csv, write_csv, CSV_MIME, HEADER};
pub use error::{ConvertError, Result};
pub use extract::{extract_placemark, extract_placemarks, GeometryKind, GeometryRecord, GroupCounter};
pub use kmz::read_kml_member;
pub use xml::Document;
