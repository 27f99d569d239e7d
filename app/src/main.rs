//! Main application entry point for the NAS image gallery server.

use analyzer::{ImageAnalyzer, PlaceholderModel};
use catalog::Catalog;
use clap::Parser;
use face_grouping::{FaceGrouper, PlaceholderEncoder};
use indexer::{Indexer, ScanEvent};
use scanner::FileScanner;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser)]
#[command(name = "naspicz", author, version, about = "NAS Image Gallery Server")]
struct Cli {
    /// Directory tree to scan (e.g. a NAS mount)
    #[arg(long)]
    root: Option<PathBuf>,
    /// Port for the gallery server
    #[arg(long)]
    port: Option<u16>,
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override log level (e.g. info, debug)
    #[arg(long)]
    log_level: Option<String>,
    /// Override stat retry attempts
    #[arg(long)]
    retry_attempts: Option<u32>,
    /// Override stat retry delay in seconds
    #[arg(long)]
    retry_delay: Option<f64>,
    /// Override classifier confidence threshold
    #[arg(long)]
    confidence_threshold: Option<f32>,
    /// Override face grouping tolerance
    #[arg(long)]
    face_tolerance: Option<f32>,
    /// Skip the automatic scan at startup
    #[arg(long)]
    no_scan: bool,
    /// Enable tracing spans instrumentation
    #[arg(long)]
    trace_spans: bool,
}

#[cfg_attr(feature = "trace-spans", tracing::instrument)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = config::AppConfigOverrides {
        root: cli.root.clone(),
        port: cli.port,
        log_level: cli.log_level.clone(),
        retry_attempts: cli.retry_attempts,
        retry_delay: cli.retry_delay,
        confidence_threshold: cli.confidence_threshold,
        face_tolerance: cli.face_tolerance,
        no_scan: cli.no_scan,
        trace_spans: cli.trace_spans,
    };
    let cfg = config::AppConfig::load_from(cli.config.clone()).apply_overrides(&overrides);

    println!("🚀 Starting NAS Image Gallery");

    if !cfg.root_path.is_dir() {
        eprintln!(
            "❌ Error: root path {:?} does not exist or is not a directory",
            cfg.root_path
        );
        eprintln!("💡 Pass --root or set root_path in the config file.");
        std::process::exit(1);
    }

    let (log_dir, log_prefix) = match cfg.log_file.clone() {
        Some(path) => {
            let prefix = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "naspicz.log".to_string());
            let dir = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            (dir, prefix)
        }
        None => (
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("naspicz")
                .join("logs"),
            "naspicz.log".to_string(),
        ),
    };
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = rolling::daily(&log_dir, log_prefix);
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cfg.log_level.clone()))
        .with_writer(std::io::stdout.and(file_writer))
        .init();

    tracing::info!(
        "Scanning {} with {} retry attempts, confidence threshold {}, face tolerance {}",
        cfg.root_path.display(),
        cfg.retry_attempts,
        cfg.confidence_threshold,
        cfg.face_tolerance
    );

    let mut scanner = FileScanner::new(&cfg.root_path).with_retry(
        cfg.retry_attempts,
        Duration::from_secs_f64(cfg.retry_delay_secs),
    );
    if !cfg.image_extensions.is_empty() {
        scanner = scanner.with_image_extensions(cfg.image_extensions.iter().cloned().collect());
    }
    let analyzer = ImageAnalyzer::new(Box::new(PlaceholderModel::new()))
        .with_confidence_threshold(cfg.confidence_threshold);
    let grouper =
        FaceGrouper::new(Box::new(PlaceholderEncoder::new())).with_tolerance(cfg.face_tolerance);
    let indexer = Arc::new(Indexer::new(
        scanner,
        analyzer,
        grouper,
        Arc::new(Catalog::new()),
    ));

    if cfg.scan_on_start {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    ScanEvent::Started => println!("Scan started"),
                    ScanEvent::Walked { files, errors } => {
                        println!("Walked {} files ({} errors)", files, errors)
                    }
                    ScanEvent::ImageAnalyzed(n) => println!("Analyzed {} images...", n),
                    ScanEvent::Finished {
                        files,
                        images,
                        groups,
                    } => println!(
                        "Finished scan: {} files, {} images, {} face groups",
                        files, images, groups
                    ),
                    ScanEvent::Failed(message) => eprintln!("❌ Scan failed: {}", message),
                }
            }
        });
        indexer.spawn_scan(Some(tx))?;
    } else {
        println!("⏭️ Skipping startup scan (--no-scan)");
    }

    server::serve(Arc::clone(&indexer), cfg.port).await?;

    Ok(())
}
