mod app;
mod canvas;
mod overlays;
mod textures;

use std::sync::Arc;
use timewalk::credentials::ApiKeyStore;
use timewalk::orchestrator::Orchestrator;
use timewalk_model_provider::{GeminiConfig, JourneyGateway, gemini::GeminiModel};
use tracing_subscriber::EnvFilter;

fn main() -> timewalk_types::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("timewalk=info,timewalk_desktop=info")),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let credentials = ApiKeyStore::open_default()?;
    let model = GeminiModel::new(&GeminiConfig::default());
    let gateway = Arc::new(JourneyGateway::new(Arc::new(model)));
    let orchestrator = Orchestrator::new(gateway, credentials, runtime.handle().clone());

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("Timewalk")
            .with_inner_size([1440.0, 900.0]),
        ..Default::default()
    };
    eframe::run_native(
        "timewalk",
        options,
        Box::new(move |cc| Ok(Box::new(app::TimewalkApp::new(cc, orchestrator)))),
    )
    .map_err(|err| timewalk_types::anyhow!("failed to run the desktop shell: {err}"))?;

    runtime.shutdown_timeout(std::time::Duration::from_secs(2));
    Ok(())
}
