//! Flat CSV export of the catalog.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::catalog::{Catalog, CatalogRecord, COLUMNS};
use crate::error::Result;

/// Write records as CSV with a header row, in [`COLUMNS`] order.
///
/// Returns the number of data rows written.
pub fn write_csv<W: Write>(records: &[CatalogRecord], writer: W) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(COLUMNS)?;
    for record in records {
        csv.write_record(record.to_row_strings())?;
    }
    csv.flush()?;
    Ok(records.len())
}

/// Export every catalog record to `path`, creating parent directories.
pub fn export_csv(catalog: &Catalog, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let records = catalog.records()?;
    let written = write_csv(&records, File::create(path)?)?;
    tracing::info!(path = %path.display(), rows = written, "Exported catalog");
    Ok(written)
}
