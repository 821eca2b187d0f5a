// Byte decoding for spreadsheet exports of unknown provenance.

use std::io::Read;
use std::path::Path;

/// Decode raw bytes as UTF-8, falling back to Windows-1252 when the bytes
/// are not valid UTF-8 (common for Excel-exported CSVs with accented names).
pub fn decode_bytes(bytes: Vec<u8>) -> String {
    // Try UTF-8 first; on failure, recover the buffer from the error
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    }
}

/// Read a file and decode it via [`decode_bytes`].
pub fn read_file(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    Ok(decode_bytes(bytes))
}
