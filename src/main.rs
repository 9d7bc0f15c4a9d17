use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use screenlog::source::synthetic::SyntheticAcquirer;
use screenlog::{
    CaptureConfig, CaptureController, ControllerEvent, DiskScreenshotStore, HttpFrameAnalyzer,
    HttpScreenshotStore, SourceAcquirer, SourceKind,
};

/// Periodic screenshot logger: previews a capture source, then saves a
/// compressed screenshot on a fixed interval, with optional vision-model
/// descriptions per shot.
#[derive(Parser, Debug)]
#[command(name = "screenlog")]
#[command(about = "📸 Capture timestamped screenshots of your screen on an interval")]
#[command(
    long_about = "Capture timestamped, size-bounded screenshots of your screen on a fixed \
interval for activity documentation. Screenshots go to a local directory (JPEG + manifest) \
or to a REST backend, optionally described in real time by a vision model endpoint."
)]
struct Args {
    /// What to capture
    #[arg(short, long, default_value = "screen",
          help = "Capture source kind: screen, window, tab, element")]
    source: String,

    /// Seconds between screenshots
    #[arg(short, long, default_value = "10s",
          help = "Capture interval: 5s, 30s, 1m (bounded to 1-60 seconds)")]
    interval: String,

    /// How long to run before stopping
    #[arg(short, long, default_value = "2m",
          help = "Total run time: 90s, 5m, 1h")]
    duration: String,

    /// Byte budget per compressed screenshot
    #[arg(short, long, default_value = "400k",
          help = "Target size per screenshot: 200k, 1m (bytes accepted too)")]
    target_size: String,

    /// In-memory cache capacity (screenshot count)
    #[arg(long, default_value_t = 30,
          help = "How many screenshots to keep in the in-memory cache")]
    cache: usize,

    /// Directory for JPEGs and the manifest
    #[arg(short, long, default_value = "./screenshots",
          help = "Output directory (ignored when --api-url is set)")]
    output: String,

    /// Save to a REST backend instead of disk
    #[arg(long, help = "Backend base URL, e.g. http://localhost:8001/api")]
    api_url: Option<String>,

    /// Describe each screenshot via a vision model endpoint
    #[arg(long, help = "Vision model endpoint, e.g. http://localhost:8001/v1/responses")]
    analyze_url: Option<String>,

    /// Use the synthetic test pattern instead of the live display
    #[arg(long, help = "Capture a synthetic test pattern (no display needed)")]
    synthetic: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let source_kind: SourceKind = args.source.parse()?;
    let run_for = parse_duration(&args.duration)?;
    let config = CaptureConfig {
        interval_secs: parse_duration(&args.interval)?,
        source_kind,
        target_bytes: parse_size(&args.target_size)?,
        cache_capacity: args.cache,
        realtime_analysis: args.analyze_url.is_some(),
        ..CaptureConfig::default()
    };

    let acquirer: Arc<dyn SourceAcquirer> = if args.synthetic {
        Arc::new(SyntheticAcquirer::default())
    } else {
        screenlog::default_acquirer()
    };

    let mut builder = CaptureController::builder()
        .with_config(config)
        .with_acquirer(acquirer);
    builder = match &args.api_url {
        Some(url) => builder.with_store(Arc::new(HttpScreenshotStore::new(url))),
        None => builder.with_store(Arc::new(DiskScreenshotStore::create(&args.output)?)),
    };
    if let Some(url) = &args.analyze_url {
        builder = builder.with_analyzer(Arc::new(HttpFrameAnalyzer::new(url)));
    }
    let mut controller = builder.build()?;
    let mut events = controller.take_events().expect("fresh controller");

    if let Some(requested) = controller.select_source().await? {
        eprintln!(
            "note: {} capture is not available here, capturing the screen instead",
            requested
        );
    }
    controller.start_capture()?;
    println!("Capturing every {} for {}s …", args.interval, run_for);

    let deadline = tokio::time::sleep(std::time::Duration::from_secs(run_for as u64));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(ControllerEvent::ScreenshotCaptured { id, index, description, .. }) => {
                    match description {
                        Some(text) => println!("#{} saved (id {}): {}", index, id, text),
                        None => println!("#{} saved (id {})", index, id),
                    }
                }
                Some(ControllerEvent::SourceEnded) => {
                    eprintln!("capture source ended externally, stopping");
                    controller.handle_source_ended().await;
                    break;
                }
                Some(ControllerEvent::Error(message)) => eprintln!("warning: {}", message),
                Some(ControllerEvent::PreviewFrame(_)) => {}
                None => break,
            }
        }
    }

    controller.teardown().await;
    println!("Done: {} screenshots captured", controller.screenshot_count());
    Ok(())
}

/// Parse a duration like "30s", "2m", "1h" (bare numbers are seconds).
fn parse_duration(duration: &str) -> Result<u32> {
    if let Ok(seconds) = duration.parse::<u32>() {
        return Ok(seconds);
    }
    let len = duration.len();
    if len < 2 {
        return Err(anyhow::anyhow!("Invalid duration format: {}", duration));
    }
    let (num_str, unit) = duration.split_at(len - 1);
    let num: u32 = num_str
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid number in duration: {}", num_str))?;
    match unit {
        "s" => Ok(num),
        "m" => Ok(num * 60),
        "h" => Ok(num * 3600),
        _ => Err(anyhow::anyhow!(
            "Invalid duration unit: {}. Use 's' for seconds, 'm' for minutes, 'h' for hours",
            unit
        )),
    }
}

/// Parse a byte size like "400k", "2m" (bare numbers are bytes).
fn parse_size(size: &str) -> Result<usize> {
    if let Ok(bytes) = size.parse::<usize>() {
        return Ok(bytes);
    }
    let len = size.len();
    if len < 2 {
        return Err(anyhow::anyhow!("Invalid size format: {}", size));
    }
    let (num_str, unit) = size.split_at(len - 1);
    let num: usize = num_str
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid number in size: {}", num_str))?;
    match unit.to_lowercase().as_str() {
        "k" => Ok(num * 1024),
        "m" => Ok(num * 1024 * 1024),
        _ => Err(anyhow::anyhow!(
            "Invalid size unit: {}. Use 'k' for KiB or 'm' for MiB",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formats() {
        assert_eq!(parse_duration("30").unwrap(), 30);
        assert_eq!(parse_duration("30s").unwrap(), 30);
        assert_eq!(parse_duration("2m").unwrap(), 120);
        assert_eq!(parse_duration("1h").unwrap(), 3600);
        assert!(parse_duration("5x").is_err());
    }

    #[test]
    fn size_formats() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("400k").unwrap(), 400 * 1024);
        assert_eq!(parse_size("2m").unwrap(), 2 * 1024 * 1024);
        assert!(parse_size("3g").is_err());
    }
}
