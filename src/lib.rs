//! # model-viewer
//!
//! Interactive glTF 2.0 viewer with image-based lighting presets.
//!
//! The crate is split into a device-independent core and an optional window:
//!
//! - [`loader`] - glTF/GLB decoding from paths, URLs or memory, with meshopt
//!   and KTX2 support negotiated against [`loader::DecoderCaps`]
//! - [`scene`] - the decoded subtree: nodes, primitives, textures and the
//!   closed [`scene::Material`] enum
//! - [`lifecycle`] - uploading a subtree to a [`backend::RenderBackend`] and
//!   releasing every resource it owns
//! - [`environment`] - lighting presets, the reflection-map cache and request
//!   tokens for in-flight decodes
//! - [`prefilter`] - equirectangular panorama decoding and roughness mips
//! - [`framing`] / [`camera`] - fitting the camera to a subtree; dolly orbit rig
//! - [`controller`] - the [`controller::Viewer`] tying it all together
//! - [`worker`] / [`render_loop`] - background threads
//! - `viewer` - the egui/wgpu window (feature `viewer`)
//!
//! ## Example
//!
//! ```ignore
//! use model_viewer::backend::HeadlessBackend;
//! use model_viewer::config::ViewerConfig;
//! use model_viewer::controller::Viewer;
//! use model_viewer::loader::{AssetSource, DecoderCaps, LoadOrigin};
//!
//! let mut viewer = Viewer::new(HeadlessBackend::new(), ViewerConfig::default(), DecoderCaps::software());
//! viewer.load_blocking(AssetSource::parse("model.glb"), LoadOrigin::Explicit);
//! println!("{}", viewer.status());
//! ```

pub mod backend;
pub mod camera;
pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod framing;
pub mod lifecycle;
pub mod loader;
pub mod prefilter;
pub mod render_loop;
pub mod scene;
pub mod worker;

// Window (optional, enabled with "viewer" feature)
#[cfg(feature = "viewer")]
pub mod viewer;

pub use controller::Viewer;
pub use error::{ConfigError, EnvironmentError, LoadError};
