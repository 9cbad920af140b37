//! Fallback detection through the kernel's single-character FIPS flag.

use crate::diagnostics::Diagnostics;
use crate::error::StatusFileError;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Kernel pseudo-file exposing the FIPS flag.
pub const FIPS_ENABLED_PATH: &str = "/proc/sys/crypto/fips_enabled";

/// Read the first byte of `path`: `'1'` is enabled, anything else disabled.
/// A missing, unreadable or empty file is an error.
pub fn read_status(path: &Path, diagnostics: &Diagnostics) -> Result<bool, StatusFileError> {
    diagnostics.render(
        format_args!("status: reading {}", path.display()),
        "status: reading fips status file",
    );

    let mut file = File::open(path).map_err(|source| StatusFileError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let flag = first_byte(&mut file).map_err(|source| StatusFileError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    drop(file);

    diagnostics.render(
        format_args!("status: read character is '{}'", flag.escape_ascii()),
        "status: cannot render read character",
    );
    Ok(flag == b'1')
}

/// `Err(None)` means end-of-stream before any byte arrived.
fn first_byte<R: Read>(reader: &mut R) -> Result<u8, Option<io::Error>> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Err(None),
            Ok(_) => return Ok(buf[0]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(Some(err)),
        }
    }
}
