//! Chunked reads from disk and HTTP with progress reporting.

use std::io::Read;
use std::path::Path;

use crate::error::LoadError;

/// Read granularity; progress is reported once per chunk
pub const CHUNK_SIZE: usize = 64 * 1024;

pub(crate) fn read_file(path: &Path, progress: &mut dyn FnMut(u64, Option<u64>)) -> Result<Vec<u8>, LoadError> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::FileNotFound(path.to_path_buf()),
        _ => LoadError::Io(e),
    })?;
    let total = file.metadata().ok().map(|m| m.len());
    tracing::debug!("reading {:?} ({:?} bytes)", path, total);
    Ok(read_chunks(file, total, progress)?)
}

pub(crate) fn fetch_url(url: &str, progress: &mut dyn FnMut(u64, Option<u64>)) -> Result<Vec<u8>, LoadError> {
    let http_error = |message: String| LoadError::Http {
        url: url.to_string(),
        message,
    };
    let response = ureq::get(url).call().map_err(|e| http_error(e.to_string()))?;
    let total = response
        .header("Content-Length")
        .and_then(|v| v.trim().parse::<u64>().ok());
    tracing::debug!("GET {} -> {} ({:?} bytes)", url, response.status(), total);
    read_chunks(response.into_reader(), total, progress).map_err(|e| http_error(e.to_string()))
}

fn read_chunks(
    mut reader: impl Read,
    total: Option<u64>,
    progress: &mut dyn FnMut(u64, Option<u64>),
) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(total.unwrap_or(0).min(1 << 30) as usize);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    progress(0, total);
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.extend_from_slice(&chunk[..n]);
        progress(out.len() as u64, total);
    }
    Ok(out)
}
