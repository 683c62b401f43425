//! glTF 2.0 asset loading.
//!
//! Turns a path, URL or in-memory file into a [`Subtree`]. Loading is
//! blocking and runs on the asset worker thread; progress is reported as
//! `(loaded, total)` byte counts while the main file is fetched.

pub mod accessor;
mod fetch;
mod gltf_scene;
pub mod ktx2;
pub mod meshopt;
mod resolve;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::error::LoadError;
use crate::scene::{CompressionFamily, SceneStats, Subtree};

pub use fetch::CHUNK_SIZE;
pub use resolve::decode_data_uri;

/// Where a model comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetSource {
    Path(PathBuf),
    Url(String),
    /// File contents already in memory (dropped or picked file)
    Bytes { name: String, bytes: Vec<u8> },
}

impl AssetSource {
    /// `http(s)://` strings become URLs, everything else a path
    pub fn parse(s: &str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            AssetSource::Url(s.to_string())
        } else {
            AssetSource::Path(PathBuf::from(s))
        }
    }

    /// Short name for status messages
    pub fn label(&self) -> String {
        match self {
            AssetSource::Path(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string()),
            AssetSource::Url(u) => u
                .split(['?', '#'])
                .next()
                .and_then(|s| s.trim_end_matches('/').rsplit('/').next())
                .filter(|s| !s.is_empty())
                .unwrap_or(u.as_str())
                .to_string(),
            AssetSource::Bytes { name, .. } => name.clone(),
        }
    }
}

impl From<&Path> for AssetSource {
    fn from(path: &Path) -> Self {
        AssetSource::Path(path.to_path_buf())
    }
}

/// Whether the user explicitly asked for this model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOrigin {
    /// Startup or "Load default"; failure is not an error
    Default,
    Explicit,
}

/// Decoders available on this host.
///
/// Mesh decompression is always available in software. Compressed texture
/// payloads are only usable when the GPU supports the block format family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecoderCaps {
    pub meshopt: bool,
    pub ktx2: bool,
    pub bc: bool,
    pub etc2: bool,
    pub astc: bool,
}

impl DecoderCaps {
    /// No GPU block compression; everything else in software
    pub fn software() -> Self {
        Self {
            meshopt: true,
            ktx2: true,
            bc: false,
            etc2: false,
            astc: false,
        }
    }

    pub fn supports_family(&self, family: CompressionFamily) -> bool {
        match family {
            CompressionFamily::Bc => self.bc,
            CompressionFamily::Etc2 => self.etc2,
            CompressionFamily::Astc => self.astc,
        }
    }

    /// Whether an extension listed in `extensionsRequired` can be honored
    pub fn supports_extension(&self, name: &str) -> bool {
        match name {
            "KHR_materials_unlit" | "KHR_mesh_quantization" => true,
            meshopt::EXT_NAME | meshopt::KHR_NAME => self.meshopt,
            // Basis Universal payloads need a transcoder; only a fallback
            // image or a native-format KTX2 can be used
            "KHR_texture_basisu" => false,
            _ => false,
        }
    }
}

impl Default for DecoderCaps {
    fn default() -> Self {
        Self::software()
    }
}

/// A decoded model ready for installation
#[derive(Debug)]
pub struct LoadedAsset {
    pub subtree: Subtree,
    pub stats: SceneStats,
    /// Size of the main file
    pub bytes: usize,
}

/// Fetch and decode `source` (blocking).
pub fn load(
    source: &AssetSource,
    caps: &DecoderCaps,
    progress: &mut dyn FnMut(u64, Option<u64>),
) -> Result<LoadedAsset, LoadError> {
    let _span = tracing::info_span!("load_asset", source = %source.label()).entered();

    let bytes = match source {
        AssetSource::Path(path) => fetch::read_file(path, progress)?,
        AssetSource::Url(url) => fetch::fetch_url(url, progress)?,
        AssetSource::Bytes { bytes, .. } => {
            let total = bytes.len() as u64;
            progress(total, Some(total));
            bytes.clone()
        }
    };
    let size = bytes.len();
    let base = resolve::Base::of(source);

    // A decoder bug on one asset must not take the calling thread down
    let mut subtree = panic::catch_unwind(AssertUnwindSafe(|| gltf_scene::convert(&bytes, &base, caps)))
        .map_err(|payload| LoadError::Panicked(panic_message(payload.as_ref())))??;
    subtree.name = source.label();
    let stats = subtree.stats();
    tracing::info!("Loaded {}: {}", subtree.name, stats);

    Ok(LoadedAsset {
        subtree,
        stats,
        bytes: size,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert_eq!(
            AssetSource::parse("https://example.com/models/duck.glb?x=1"),
            AssetSource::Url("https://example.com/models/duck.glb?x=1".into())
        );
        assert_eq!(AssetSource::parse("assets/model.glb"), AssetSource::Path("assets/model.glb".into()));
    }

    #[test]
    fn test_labels() {
        assert_eq!(AssetSource::parse("https://example.com/models/duck.glb?x=1").label(), "duck.glb");
        assert_eq!(AssetSource::parse("/tmp/a/helmet.gltf").label(), "helmet.gltf");
        let dropped = AssetSource::Bytes { name: "drop.glb".into(), bytes: vec![] };
        assert_eq!(dropped.label(), "drop.glb");
    }

    #[test]
    fn test_extension_negotiation() {
        let caps = DecoderCaps::software();
        assert!(caps.supports_extension("EXT_meshopt_compression"));
        assert!(caps.supports_extension("KHR_meshopt_compression"));
        assert!(caps.supports_extension("KHR_materials_unlit"));
        assert!(!caps.supports_extension("KHR_draco_mesh_compression"));
        assert!(!caps.supports_extension("KHR_texture_basisu"));

        let no_meshopt = DecoderCaps { meshopt: false, ..caps };
        assert!(!no_meshopt.supports_extension("EXT_meshopt_compression"));
    }
}
