//! KMZ archive unpacking.

use std::io::{Cursor, Read, Seek};

use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{ConvertError, Result};

/// Read the text of the first `.kml` member of a KMZ archive.
///
/// Members are scanned in archive order and matched case-insensitively on the
/// `.kml` suffix. Non-UTF-8 bytes are replaced rather than rejected.
pub fn read_kml_member(bytes: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ConvertError::archive(format!("failed to open KMZ archive: {e}")))?;

    let index = find_kml_member(&mut archive).ok_or(ConvertError::MissingKmlMember)?;

    let mut member = archive
        .by_index(index)
        .map_err(|e| ConvertError::archive(format!("failed to read KML from KMZ: {e}")))?;
    debug!(member = member.name(), size = member.size(), "reading KML member");

    let mut raw = Vec::with_capacity(initial_capacity(member.size()));
    member.read_to_end(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOC: u64 = 1 << 20;

/// The declared size comes from the archive header and is not trusted.
fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOC)).unwrap_or(0)
}

fn find_kml_member<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Option<usize> {
    for i in 0..archive.len() {
        let entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(index = i, "skipping unreadable archive entry: {e}");
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        if entry.name().to_lowercase().ends_with(".kml") {
            return Some(i);
        }
    }
    None
}
