//! `.zip` output for packages that opt out of the `.sar` container.
//!
//! Bodies arrive fully cooked (locale substitution, JSON cook/minify
//! already applied); the zip layer only decides between deflate and
//! stored per the package's compression flag. Obfuscation, delta skips,
//! dictionaries, and overflow do not apply to zip packages.

use std::io::{Seek, Write};
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::config::PackageConfig;
use crate::error::{CookError, Result};

/// Write one zip archive from cooked `(entry name, body)` pairs and
/// return the total byte size.
pub fn write_zip_archive<W: Write + Seek>(
    writer: W,
    pkg: &PackageConfig,
    entries: &[(String, Vec<u8>)],
    label: &Path,
) -> Result<u64> {
    let method = if pkg.compress_files {
        zip::CompressionMethod::Deflated
    } else {
        zip::CompressionMethod::Stored
    };
    let options = SimpleFileOptions::default().compression_method(method);

    let zip_error = |e: zip::result::ZipError| CookError::Archive {
        path: label.to_path_buf(),
        reason: format!("zip write failed: {e}"),
    };

    let mut zip = ZipWriter::new(writer);
    for (name, body) in entries {
        zip.start_file(name, options).map_err(zip_error)?;
        zip.write_all(body).map_err(|e| CookError::io(label, e))?;
    }
    let mut writer = zip.finish().map_err(zip_error)?;
    writer.stream_position().map_err(|e| CookError::io(label, e))
}
