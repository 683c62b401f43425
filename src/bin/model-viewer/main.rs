//! model-viewer - open glTF models in a window, or inspect them headlessly.

use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

use model_viewer::backend::HeadlessBackend;
use model_viewer::config::ViewerConfig;
use model_viewer::controller::Viewer;
use model_viewer::loader::{AssetSource, DecoderCaps, LoadOrigin};
use model_viewer::scene::{Material, TextureFormat};

/// Verbosity level (thread-safe)
const LOG_QUIET: u8 = 0;
const LOG_INFO: u8 = 1;
const LOG_DEBUG: u8 = 2;
const LOG_TRACE: u8 = 3;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LOG_INFO);

#[inline]
fn log_level() -> u8 {
    LOG_LEVEL.load(Ordering::Relaxed)
}

#[inline]
fn set_log_level(level: u8) {
    LOG_LEVEL.store(level, Ordering::Relaxed);
}

macro_rules! info {
    ($($arg:tt)*) => {
        if log_level() >= LOG_INFO {
            println!("[INFO] {}", format!($($arg)*));
        }
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        if log_level() >= LOG_DEBUG {
            println!("[DEBUG] {}", format!($($arg)*));
        }
    };
}

/// Parsed command line
#[derive(Debug, Default)]
struct Args {
    command: Option<String>,
    model: Option<String>,
    config: Option<String>,
    environment: Option<String>,
}

fn main() {
    let raw: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(Some(args)) => args,
        Ok(None) => return,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            eprintln!();
            print_help();
            std::process::exit(2);
        }
    };

    // `RUST_LOG` wins over the verbosity flags
    if env::var_os("RUST_LOG").is_none() {
        let filter = match log_level() {
            LOG_QUIET => "model_viewer=error",
            LOG_INFO => "model_viewer=info",
            LOG_DEBUG => "model_viewer=debug",
            _ => "model_viewer=trace",
        };
        env::set_var("RUST_LOG", filter);
    }

    // The windowed viewer sets up its own subscriber
    if args.command.as_deref() == Some("info") {
        init_tracing();
    }

    let config = match &args.config {
        Some(path) => match ViewerConfig::load(Path::new(path)) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to read config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => ViewerConfig::default(),
    };
    debug!("presets: {}", config.presets.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", "));

    match (args.command.as_deref(), args.model.as_deref()) {
        (Some("info"), Some(model)) => cmd_info(model, config),
        _ => cmd_view(args, config),
    }
}

/// `Ok(None)` when the command line was fully handled (help, version)
fn parse_args(raw: &[String]) -> Result<Option<Args>, String> {
    let mut args = Args::default();
    let mut positional: Vec<&str> = Vec::new();
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => set_log_level(LOG_DEBUG),
            "-vv" | "--trace" => set_log_level(LOG_TRACE),
            "-q" | "--quiet" => set_log_level(LOG_QUIET),
            "-h" | "--help" | "help" => {
                print_help();
                return Ok(None);
            }
            "-V" | "--version" => {
                println!(
                    "model-viewer {} ({})",
                    env!("CARGO_PKG_VERSION"),
                    env!("MODEL_VIEWER_BUILD_DATE")
                );
                return Ok(None);
            }
            "-m" | "--model" => {
                args.model = Some(iter.next().ok_or("--model needs a path or URL")?.clone());
            }
            "-c" | "--config" => {
                args.config = Some(iter.next().ok_or("--config needs a file")?.clone());
            }
            "-e" | "--env" => {
                args.environment = Some(iter.next().ok_or("--env needs a preset name")?.clone());
            }
            s if s.starts_with('-') && s.len() > 1 => return Err(format!("unknown option {}", s)),
            s => positional.push(s),
        }
    }

    // `info`/`i` is a command only when a model comes with it, so a file
    // named `i` still opens
    match (positional.as_slice(), args.model.is_some()) {
        ([], _) => {}
        (["info" | "i", model], false) => {
            args.command = Some("info".into());
            args.model = Some(model.to_string());
        }
        (["info" | "i"], true) => args.command = Some("info".into()),
        ([model], false) => args.model = Some(model.to_string()),
        ([.., extra], _) => return Err(format!("unexpected argument {}", extra)),
    }
    Ok(Some(args))
}

#[cfg(feature = "viewer")]
fn cmd_view(args: Args, config: ViewerConfig) {
    info!("Starting viewer");
    let options = model_viewer::viewer::LaunchOptions {
        config,
        model: args.model,
        environment: args.environment,
    };
    if let Err(e) = model_viewer::viewer::run(options) {
        eprintln!("Viewer error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "viewer"))]
fn cmd_view(_args: Args, _config: ViewerConfig) {
    eprintln!("Viewer not available. Rebuild with: cargo build --features viewer");
    std::process::exit(1);
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load without a window and print what the viewer would show
fn cmd_info(model: &str, config: ViewerConfig) {
    info!("Loading {}", model);
    let mut viewer = Viewer::new(HeadlessBackend::new(), config, DecoderCaps::software());
    viewer.load_blocking(AssetSource::parse(model), LoadOrigin::Explicit);

    let (Some(subtree), Some(stats)) = (viewer.subtree(), viewer.stats()) else {
        eprintln!("{}", viewer.status());
        std::process::exit(1);
    };

    println!("Model: {}", model);
    println!("Nodes:     {}", stats.nodes);
    println!("Meshes:    {} ({} vertices, {} triangles)", stats.meshes, stats.vertices, stats.triangles);
    println!("Materials: {}", stats.materials);
    for slot in &subtree.materials {
        let kind = match &slot.material {
            Material::Standard(_) => "standard",
            Material::Unlit(_) => "unlit",
        };
        println!("  {:<24} {}", slot.material.name(), kind);
    }
    println!("Textures:  {}", stats.textures);
    for texture in &subtree.textures {
        let data = &texture.data;
        let format = match data.format {
            TextureFormat::Rgba8 { srgb: true } => "rgba8 srgb".to_string(),
            TextureFormat::Rgba8 { srgb: false } => "rgba8".to_string(),
            TextureFormat::Compressed(c) => format!("{:?}", c),
        };
        println!(
            "  {:<24} {}x{} {} ({} levels)",
            texture.name,
            data.width,
            data.height,
            format,
            data.levels.len()
        );
    }

    let bounds = subtree.world_bounds();
    if bounds.is_valid() {
        let size = bounds.size();
        println!("Bounds:    {:.3} x {:.3} x {:.3}", size.x, size.y, size.z);
    }
    let camera = viewer.camera();
    debug!("framed at distance {:.3}, target {:?}", camera.distance(), camera.target());
}

fn print_help() {
    println!("model-viewer - glTF 2.0 viewer with image-based lighting");
    println!();
    println!("USAGE:");
    println!("    model-viewer [OPTIONS] [MODEL]");
    println!("    model-viewer [OPTIONS] info <MODEL>");
    println!();
    println!("MODEL is a .glb/.gltf path or an http(s) URL.");
    println!();
    println!("COMMANDS:");
    println!("    i, info <model>        Load headlessly and print scene statistics");
    println!();
    println!("OPTIONS:");
    println!("    -m, --model <path|url> Model to open (same as the positional MODEL)");
    println!("    -c, --config <file>    JSON config (presets, default model, camera)");
    println!("    -e, --env <preset>     Initial environment preset");
    println!("    -v, --verbose          Show debug output");
    println!("    -vv, --trace           Show trace output (very verbose)");
    println!("    -q, --quiet            Errors only");
    println!("    -V, --version          Print version");
    println!("    -h, --help             Show this help");
    println!();
    println!("KEYS:");
    println!("    F                      Frame the model");
    println!("    H                      Reset the camera");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG               Log filter (overrides -v/-q)");
    println!("    MODEL_VIEWER_TRACE=1   Write a Chrome trace to trace.json");
}
