use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use postpilot::automation::core::browser::{build_browser_config, get_page, BrowserActor, BrowserCommand};
use postpilot::automation::core::PageDriver;
use postpilot::automation::state::CoordinatorClient;
use postpilot::automation::workflows::BotContext;
use postpilot::automation::Orchestrator;
use postpilot::config::BotConfig;
use postpilot::generator::ContentGenerator;
use postpilot::history::HistoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Anything that fails from here to the orchestrator start is fatal:
    // there is no point running the loops without a browser or a session.
    let config = Arc::new(BotConfig::from_env()?);
    info!("starting postpilot as {}", config.username);

    let store = Arc::new(HistoryStore::new(&config.data_dir)?);

    let profile_dir = config.data_dir.join("browser_profile");
    let browser_config = build_browser_config(
        &profile_dir.display().to_string(),
        config.headless,
    )?;
    let (browser_tx, browser_rx) = mpsc::channel(32);
    let actor = BrowserActor::new(browser_config, config.base_url.clone(), browser_rx).await?;
    tokio::spawn(actor.run());

    let page = get_page(&browser_tx).await?;
    let driver = Arc::new(PageDriver::new(
        page,
        config.username.clone(),
        config.base_url.clone(),
        config.data_dir.clone(),
    ));
    driver.login(&config.password).await?;
    info!("session established");

    let ctx = BotContext {
        coordinator: CoordinatorClient::spawn(),
        driver,
        generator: Arc::new(ContentGenerator::new(&config)),
        store,
        config: config.clone(),
    };

    let orchestrator = Orchestrator::new(ctx, browser_tx.clone());
    tokio::select! {
        _ = orchestrator.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested, closing browser");
            let _ = browser_tx.send(BrowserCommand::Close).await;
        }
    }

    Ok(())
}
