use anyhow::{bail, Result};
use logoscout::{config::Config, pipeline::LogoPipeline};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logoscout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Logoscout Region Detection Engine");

    let config = Config::from_env()?;
    info!("Configuration loaded");

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: logoscout <image> [image...]");
    }

    let pipeline = LogoPipeline::new(config);

    for path in &paths {
        let image = match image::open(path) {
            Ok(img) => img.to_rgba8(),
            Err(e) => {
                warn!("Skipping {}: {}", path, e);
                continue;
            }
        };

        match pipeline.detect(&image).await {
            Ok(report) => {
                info!(
                    "Detection for {}: {} regions kept",
                    path,
                    report.detections.len()
                );
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Err(e) => {
                warn!("Detection failed for {}: {}", path, e);
            }
        }
    }

    Ok(())
}
