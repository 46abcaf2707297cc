//! Conversion orchestration: source bytes to a saved CSV file.
//!
//! A request runs start to finish through [`Converter::convert`]: resolve the
//! KML text (unpacking KMZ if needed), parse, extract, encode, save. Progress
//! is reported through a [`StatusSink`]; output is handed to a [`SaveSink`]
//! only once everything before it has succeeded.

use std::fmt;
use std::path::Path;

use tracing::{info, warn};

use crate::encode::{encode_csv, CSV_MIME};
use crate::error::{ConvertError, Result};
use crate::extract::extract_placemarks;
use crate::kmz::read_kml_member;
use crate::xml::Document;

/// Input container format, decided by file name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Plain KML text.
    Kml,
    /// Zip archive holding a KML member.
    Kmz,
}

impl SourceKind {
    /// Classify a file name by its `.kml`/`.kmz` suffix, ignoring case.
    pub fn from_name(name: &str) -> Result<Self> {
        match suffix(name).map(str::to_ascii_lowercase).as_deref() {
            Some(".kml") => Ok(Self::Kml),
            Some(".kmz") => Ok(Self::Kmz),
            _ => Err(ConvertError::UnrecognizedExtension(name.to_owned())),
        }
    }
}

fn suffix(name: &str) -> Option<&str> {
    name.len().checked_sub(4).and_then(|start| name.get(start..))
}

/// Suggested output name: the `.kml`/`.kmz` suffix replaced by `.csv`.
pub fn output_name(name: &str) -> String {
    match SourceKind::from_name(name) {
        Ok(_) => format!("{}.csv", &name[..name.len() - 4]),
        Err(_) => format!("{name}.csv"),
    }
}

/// A selected input file.
#[derive(Debug, Clone)]
pub struct Source {
    name: String,
    kind: SourceKind,
    bytes: Vec<u8>,
}

impl Source {
    /// Wrap in-memory bytes. Rejects names without a recognized suffix.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let kind = SourceKind::from_name(&name)?;
        Ok(Self { name, kind, bytes })
    }

    /// Read a file from disk. The suffix is checked before any I/O.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = SourceKind::from_name(&name)?;
        let bytes = std::fs::read(path)?;
        Ok(Self { name, kind, bytes })
    }

    /// File name as selected.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container format.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Suggested CSV file name.
    pub fn output_name(&self) -> String {
        output_name(&self.name)
    }

    /// The KML text, unpacked from the archive for KMZ sources.
    pub fn kml_text(&self) -> Result<String> {
        match self.kind {
            SourceKind::Kmz => read_kml_member(&self.bytes),
            SourceKind::Kml => Ok(String::from_utf8_lossy(&self.bytes).into_owned()),
        }
    }
}

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    /// Idle, waiting for the user.
    Idle,
    /// Work in progress.
    Processing,
    /// Conversion finished.
    Success,
    /// Request rejected or failed.
    Error,
}

/// User-facing status transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// A valid file is selected.
    Ready,
    /// A selected file was rejected; carries the message.
    Rejected(String),
    /// Unpacking a KMZ archive.
    Unzipping,
    /// Reading KML text.
    Reading,
    /// Parsing the XML tree.
    Parsing,
    /// Extraction produced this many records.
    Found(usize),
    /// Output saved with this many records.
    Done(usize),
    /// Conversion aborted; carries the message.
    Failed(String),
}

impl Status {
    /// Severity of this status.
    pub fn level(&self) -> StatusLevel {
        match self {
            Self::Ready => StatusLevel::Idle,
            Self::Unzipping | Self::Reading | Self::Parsing | Self::Found(_) => {
                StatusLevel::Processing
            }
            Self::Done(_) => StatusLevel::Success,
            Self::Rejected(_) | Self::Failed(_) => StatusLevel::Error,
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready to convert"),
            Self::Rejected(msg) => write!(f, "{msg}"),
            Self::Unzipping => write!(f, "Unzipping KMZ..."),
            Self::Reading => write!(f, "Reading KML..."),
            Self::Parsing => write!(f, "Parsing KML..."),
            Self::Found(n) => write!(f, "Found {n} coordinate{}...", plural(*n)),
            Self::Done(n) => write!(f, "Done! Downloaded {n} coordinate{}", plural(*n)),
            Self::Failed(msg) => write!(f, "Error: {msg}"),
        }
    }
}

/// Receiver of status transitions.
pub trait StatusSink {
    /// A new status message.
    fn update(&mut self, status: &Status);

    /// The converter became busy or idle.
    fn set_busy(&mut self, _busy: bool) {}
}

impl<F: FnMut(&Status)> StatusSink for F {
    fn update(&mut self, status: &Status) {
        self(status)
    }
}

/// Destination for finished CSV output.
pub trait SaveSink {
    /// Persist `bytes` under `suggested_name`.
    fn save(&mut self, bytes: &[u8], suggested_name: &str, mime: &str) -> Result<()>;
}

/// Summary of a finished conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// Name the CSV was saved under.
    pub output_name: String,
    /// Number of rows written, header excluded.
    pub records: usize,
}

/// Runs one conversion request at a time.
#[derive(Debug, Default)]
pub struct Converter {
    busy: bool,
}

impl Converter {
    /// Create an idle converter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a request is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Validate a selected file name before any processing.
    pub fn select(&self, name: &str, status: &mut impl StatusSink) -> Result<SourceKind> {
        match SourceKind::from_name(name) {
            Ok(kind) => {
                status.update(&Status::Ready);
                Ok(kind)
            }
            Err(err) => {
                status.update(&Status::Rejected(err.to_string()));
                Err(err)
            }
        }
    }

    /// Convert `source` and hand the CSV to `save`.
    ///
    /// On failure a single [`Status::Failed`] is emitted and nothing is saved.
    /// The busy flag is cleared on every exit path.
    pub fn convert(
        &mut self,
        source: &Source,
        status: &mut impl StatusSink,
        save: &mut impl SaveSink,
    ) -> Result<Conversion> {
        self.busy = true;
        status.set_busy(true);

        let result = run(source, status, save);
        if let Err(err) = &result {
            warn!(source = source.name(), "conversion failed: {err:?}");
            status.update(&Status::Failed(err.to_string()));
        }

        self.busy = false;
        status.set_busy(false);
        result
    }
}

fn run(
    source: &Source,
    status: &mut impl StatusSink,
    save: &mut impl SaveSink,
) -> Result<Conversion> {
    status.update(&match source.kind {
        SourceKind::Kmz => Status::Unzipping,
        SourceKind::Kml => Status::Reading,
    });
    let text = source.kml_text()?;

    status.update(&Status::Parsing);
    let doc = Document::parse(&text)?;
    let records = extract_placemarks(&doc)?;
    status.update(&Status::Found(records.len()));

    let csv = encode_csv(&records)?;
    let output_name = source.output_name();
    save.save(csv.as_bytes(), &output_name, CSV_MIME)?;

    info!(
        source = source.name(),
        output = %output_name,
        records = records.len(),
        "converted"
    );
    status.update(&Status::Done(records.len()));

    Ok(Conversion {
        output_name,
        records: records.len(),
    })
}

/// Convert KML text straight to CSV text.
pub fn convert_kml_str(text: &str) -> Result<String> {
    let doc = Document::parse(text)?;
    let records = extract_placemarks(&doc)?;
    encode_csv(&records)
}
