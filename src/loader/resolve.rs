//! Resolution of buffer and image URIs relative to the asset location.

use std::path::PathBuf;

use base64::Engine;

use super::{fetch, AssetSource};
use crate::error::LoadError;

/// Location external references are resolved against
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Base {
    Dir(PathBuf),
    Url(String),
    /// In-memory asset; only `data:` URIs resolve
    Detached,
}

impl Base {
    pub fn of(source: &AssetSource) -> Self {
        match source {
            AssetSource::Path(p) => Base::Dir(p.parent().map(PathBuf::from).unwrap_or_default()),
            AssetSource::Url(u) => Base::Url(u.clone()),
            AssetSource::Bytes { .. } => Base::Detached,
        }
    }

    pub fn resolve(&self, uri: &str) -> Result<Vec<u8>, LoadError> {
        if uri.starts_with("data:") {
            return decode_data_uri(uri).map(|(_, bytes)| bytes);
        }
        match self {
            Base::Dir(dir) => {
                let name = String::from_utf8_lossy(&percent_decode(uri)).into_owned();
                fetch::read_file(&dir.join(name), &mut |_, _| {})
            }
            Base::Url(base) => fetch::fetch_url(&join_url(base, uri), &mut |_, _| {}),
            Base::Detached => Err(LoadError::MissingData(format!(
                "external reference '{}' in a dropped file",
                uri
            ))),
        }
    }
}

/// Decode a `data:[<mime>][;base64],<payload>` URI into (mime, bytes)
pub fn decode_data_uri(uri: &str) -> Result<(Option<String>, Vec<u8>), LoadError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| LoadError::DataUri("missing 'data:' prefix".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| LoadError::DataUri("missing ','".into()))?;

    let mut parts = header.split(';');
    let mime = parts.next().filter(|m| !m.is_empty()).map(str::to_string);
    let is_base64 = parts.any(|p| p == "base64");

    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| LoadError::DataUri(e.to_string()))?
    } else {
        percent_decode(payload)
    };
    Ok((mime, bytes))
}

fn join_url(base: &str, relative: &str) -> String {
    if relative.contains("://") {
        return relative.to_string();
    }
    let base = base.split(['?', '#']).next().unwrap_or(base);
    if let Some(path) = relative.strip_prefix('/') {
        // Keep scheme://host
        let origin_end = base
            .find("://")
            .and_then(|i| base[i + 3..].find('/').map(|j| i + 3 + j))
            .unwrap_or(base.len());
        return format!("{}/{}", &base[..origin_end], path);
    }
    match base.rfind('/') {
        Some(i) if i > base.find("://").map_or(0, |s| s + 2) => format!("{}{}", &base[..=i], relative),
        _ => format!("{}/{}", base, relative),
    }
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(v) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri_base64() {
        let (mime, bytes) = decode_data_uri("data:application/octet-stream;base64,AAECAw==").unwrap();
        assert_eq!(mime.as_deref(), Some("application/octet-stream"));
        assert_eq!(bytes, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_data_uri_errors() {
        assert!(matches!(decode_data_uri("data:;base64"), Err(LoadError::DataUri(_))));
        assert!(matches!(decode_data_uri("data:;base64,@@@"), Err(LoadError::DataUri(_))));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://host.org/models/duck.gltf", "duck0.bin"),
            "https://host.org/models/duck0.bin"
        );
        assert_eq!(
            join_url("https://host.org/models/duck.gltf?v=2", "tex/a.png"),
            "https://host.org/models/tex/a.png"
        );
        assert_eq!(join_url("https://host.org/models/duck.gltf", "/b.bin"), "https://host.org/b.bin");
        assert_eq!(join_url("https://host.org", "b.bin"), "https://host.org/b.bin");
        assert_eq!(join_url("https://a.org/x.gltf", "https://b.org/y.bin"), "https://b.org/y.bin");
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("my%20model.bin"), b"my model.bin");
        assert_eq!(percent_decode("100%"), b"100%");
        assert_eq!(percent_decode("%FF%00a"), [0xff, 0x00, b'a']);
    }

    #[test]
    fn test_data_uri_binary_escapes() {
        let (mime, bytes) = decode_data_uri("data:application/octet-stream,%FF%FE%80").unwrap();
        assert_eq!(mime.as_deref(), Some("application/octet-stream"));
        assert_eq!(bytes, [0xff, 0xfe, 0x80]);
    }

    #[test]
    fn test_detached_rejects_external() {
        assert!(matches!(Base::Detached.resolve("a.bin"), Err(LoadError::MissingData(_))));
        assert_eq!(Base::Detached.resolve("data:,hi").unwrap(), b"hi");
    }
}
