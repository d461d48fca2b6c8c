//! vendor-ocr - extract payee names, phone numbers or free text from an image
//!
//! Runs one extraction and prints the outcome as JSON. With `--stdin`, reads
//! `{"imageData": "data:...", "options": {...}}` requests line by line instead.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vendor_ocr::config::{default_config_path, load_config, FileSettingsProvider};
use vendor_ocr::vision::{Rect, Size};
use vendor_ocr::{AppConfig, CapturedRegion, FieldType, ImagePayload, Mode, OcrOptions, OcrPipeline, OcrRequest};

/// Field extraction via a hosted vision model
#[derive(Parser, Debug)]
#[command(name = "vendor-ocr")]
#[command(about = "Extract payee names, phone numbers or text from a captured image")]
struct Args {
    /// Image file to read
    #[arg(required_unless_present = "stdin")]
    image: Option<PathBuf>,

    /// Read JSON requests from stdin, one per line
    #[arg(long, conflicts_with = "image")]
    stdin: bool,

    /// Field to extract (free-text, phone-number, payee-name, phonetic, clipboard)
    #[arg(short, long, default_value = "free-text")]
    field: FieldType,

    /// Recognition language, overrides settings
    #[arg(short, long)]
    language: Option<String>,

    /// fast or accurate, overrides settings
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Model name, overrides settings
    #[arg(long)]
    model: Option<String>,

    /// Clockwise rotation in degrees
    #[arg(short, long, allow_hyphen_values = true)]
    rotation: Option<f64>,

    /// Selection as x,y,width,height in display coordinates
    #[arg(long, value_parser = parse_rect)]
    region: Option<Rect>,

    /// Displayed image bounds as x,y,width,height (defaults to natural size)
    #[arg(long, value_parser = parse_rect, requires = "region")]
    display: Option<Rect>,

    /// Session identifier; concurrent requests in one session are refused
    #[arg(long)]
    session: Option<String>,

    /// Config file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{}: {}", p.trim(), e)))
        .collect::<Result<Vec<_>, _>>()?;

    match parts.as_slice() {
        [x, y, width, height] => Ok(Rect::new(*x, *y, *width, *height)),
        _ => Err("expected x,y,width,height".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = if config_path.exists() {
        load_config(&config_path)?
    } else {
        warn!("No config at {}, using defaults", config_path.display());
        AppConfig::default()
    };
    info!("Settings from {}", config_path.display());

    let settings = Arc::new(FileSettingsProvider::new(&config_path));
    let pipeline = OcrPipeline::from_config(&config, settings)?;

    if args.stdin {
        return serve_stdin(&pipeline).await;
    }

    let path = args.image.as_deref().context("no image given")?;
    let request = build_request(&args, path)?;
    let outcome = pipeline.handle(&request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}

fn build_request(args: &Args, path: &Path) -> Result<OcrRequest> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mime_type = image::ImageFormat::from_path(path)
        .with_context(|| format!("Unknown image type: {}", path.display()))?
        .to_mime_type();
    let image = ImagePayload::from_bytes(&bytes, mime_type);

    let mut options = OcrOptions::new(args.field);
    options.language = args.language.clone();
    options.mode = args.mode;
    options.model = args.model.clone();
    options.rotation = args.rotation;

    if let Some(selection) = args.region {
        let (width, height) = image::image_dimensions(path)
            .with_context(|| format!("Failed to read dimensions of {}", path.display()))?;
        let natural = Size::new(f64::from(width), f64::from(height));
        let display = args
            .display
            .unwrap_or_else(|| Rect::new(0.0, 0.0, natural.width, natural.height));
        options.region = Some(CapturedRegion::new(selection, display, natural, args.rotation.unwrap_or(0.0)));
    }

    Ok(OcrRequest {
        image_data: image.to_data_uri(),
        options,
        session: args.session.clone(),
    })
}

/// Answer newline-delimited JSON requests until stdin closes
async fn serve_stdin(pipeline: &OcrPipeline) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<OcrRequest>(&line) {
            Ok(request) => serde_json::to_string(&pipeline.handle(&request).await)?,
            Err(e) => {
                warn!("Malformed request: {}", e);
                serde_json::json!({ "success": false, "error": format!("malformed request: {}", e) }).to_string()
            }
        };
        println!("{}", response);
    }

    info!("Input closed, shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rect() {
        assert_eq!(parse_rect("1, 2,30,40.5"), Ok(Rect::new(1.0, 2.0, 30.0, 40.5)));
        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "vendor-ocr",
            "shot.png",
            "--field",
            "phone",
            "--mode",
            "fast",
            "--region",
            "10,10,50,20",
        ])
        .unwrap();
        assert_eq!(args.field, FieldType::PhoneNumber);
        assert_eq!(args.mode, Some(Mode::Fast));
        assert_eq!(args.region, Some(Rect::new(10.0, 10.0, 50.0, 20.0)));

        assert!(Args::try_parse_from(["vendor-ocr"]).is_err());
        assert!(Args::try_parse_from(["vendor-ocr", "--stdin"]).is_ok());
    }
}
