use std::path::PathBuf;
use log::info;

use crate::app_context::AppContext;
use crate::ingestor::SampleIngestor;
use crate::location::LocationProvider;
use crate::location::replay::ReplayProvider;
use crate::location::serial::SerialGpsProvider;
use crate::settings::{LocationSource, Settings};

mod app_context;
mod consts;
mod estimator;
mod geo;
mod ingestor;
mod location;
mod readout;
mod settings;
mod units;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load_or_default()?;
    info!("Settings file: {}", Settings::path().display());

    // `gps-speedo <script.json>` replays a recorded drive instead of opening the receiver
    let source = match std::env::args().nth(1) {
        Some(script) => LocationSource::Replay {
            path: PathBuf::from(script),
            speedup: 1.0,
        },
        None => settings.source.clone(),
    };

    let provider: Box<dyn LocationProvider> = match &source {
        LocationSource::Serial { port, baud_rate } => Box::new(SerialGpsProvider::new(port, *baud_rate)),
        LocationSource::Replay { path, speedup } => Box::new(ReplayProvider::from_file(path, *speedup)),
    };
    let source_name = provider.name();
    info!("Location source: {}", source_name);

    let ingestor = SampleIngestor::new(provider, settings.watch_options(), settings.buffer_capacity);

    let window_size = [300.0, 340.0];
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(&window_size)
            .with_min_inner_size(window_size),
        ..Default::default()
    };

    let context = AppContext::new(settings, ingestor, source_name);

    eframe::run_native(
        "GPS Speedo",
        options,
        Box::new(|_ctx| {
            Ok(Box::new(context))
        })
    ).map_err(|e| anyhow::anyhow!("{:?}", e))?;

    Ok(())
}
