//! Error types for asset loading, environments and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while fetching or decoding a model.
#[derive(Error, Debug)]
pub enum LoadError {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed (unreachable host, non-2xx status)
    #[error("HTTP request for {url} failed: {message}")]
    Http { url: String, message: String },

    /// glTF JSON or GLB container is malformed
    #[error("Invalid glTF: {0}")]
    Gltf(#[from] gltf::Error),

    /// Document parses but references objects that do not exist
    #[error("Invalid glTF: {0}")]
    Validation(String),

    /// A required extension has no decoder on this host
    #[error("Unsupported extension: {0}")]
    UnsupportedExtension(String),

    /// Compressed buffer view could not be decoded
    #[error("Mesh decompression failed: {0}")]
    MeshCodec(String),

    /// KTX2 container is invalid or its payload cannot be used
    #[error("Texture codec error: {0}")]
    TextureCodec(String),

    /// Image decode error
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// Malformed data URI
    #[error("Invalid data URI: {0}")]
    DataUri(String),

    /// Referenced buffer, view or accessor data is absent or out of range
    #[error("Missing data: {0}")]
    MissingData(String),

    /// The asset contains no scene to display
    #[error("Asset contains no scene")]
    NoScene,

    /// The decoder panicked on this asset
    #[error("Decoder crashed: {0}")]
    Panicked(String),

    #[error(transparent)]
    Worker(#[from] WorkerStopped),
}

/// Failure while switching or decoding an environment preset.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    /// Preset name not present in the preset table
    #[error("Unknown environment preset: {0}")]
    UnknownPreset(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Panorama decode error
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// Panorama decoded to zero pixels
    #[error("Panorama {0} is empty")]
    EmptyPanorama(PathBuf),

    #[error(transparent)]
    Worker(#[from] WorkerStopped),
}

/// The background thread a request was sent to has exited.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Background worker stopped")]
pub struct WorkerStopped;

/// Failure while reading the viewer configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse error
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}
