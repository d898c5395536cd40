use std::path::PathBuf;

use chromiumoxide::browser::HeadlessMode;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug)]
pub enum BrowserCommand {
    /// Hands out a clone of the single shared tab, creating it on first use.
    Page {
        reply: oneshot::Sender<Result<Page, String>>,
    },
    Ping {
        reply: oneshot::Sender<bool>,
    },
    Close,
}

pub fn build_browser_config(data_dir: &str, headless: bool) -> Result<BrowserConfig, String> {
    let mode = if headless {
        HeadlessMode::New
    } else {
        HeadlessMode::False
    };
    BrowserConfig::builder()
        .user_data_dir(PathBuf::from(data_dir))
        .headless_mode(mode)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-session-crashed-bubble")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--no-sandbox")
        .window_size(1280, 800)
        .build()
}

/// Owns the Chromium process and the one tab every workflow shares. The
/// bot deliberately never opens a second tab; serialization of page access
/// is the coordinator's job, this actor only makes the sharing possible.
pub struct BrowserActor {
    browser: Browser,
    handler: Option<JoinHandle<()>>,
    page: Option<Page>,
    base_url: String,
    rx: mpsc::Receiver<BrowserCommand>,
}

impl BrowserActor {
    pub async fn new(
        config: BrowserConfig,
        base_url: String,
        rx: mpsc::Receiver<BrowserCommand>,
    ) -> Result<Self, String> {
        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| e.to_string())?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("browser handler error: {}", e);
                    break;
                }
            }
            info!("browser handler ended");
        });

        Ok(Self {
            browser,
            handler: Some(handler_task),
            page: None,
            base_url,
            rx,
        })
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                BrowserCommand::Page { reply } => {
                    let result = match &self.page {
                        Some(page) => Ok(page.clone()),
                        None => match self.browser.new_page(self.base_url.as_str()).await {
                            Ok(page) => {
                                self.page = Some(page.clone());
                                Ok(page)
                            }
                            Err(e) => Err(e.to_string()),
                        },
                    };
                    let _ = reply.send(result);
                }
                BrowserCommand::Ping { reply } => {
                    let healthy = self.browser.version().await.is_ok();
                    let _ = reply.send(healthy);
                }
                BrowserCommand::Close => {
                    let _ = self.browser.close().await;
                    if let Some(h) = self.handler.take() {
                        h.abort();
                    }
                    break;
                }
            }
        }
    }
}

pub async fn get_page(
    browser_tx: &mpsc::Sender<BrowserCommand>,
) -> Result<Page, Box<dyn std::error::Error + Send + Sync>> {
    let (tx, rx) = oneshot::channel();
    browser_tx.send(BrowserCommand::Page { reply: tx }).await?;
    rx.await
        .map_err(|_| "browser actor dropped reply")?
        .map_err(|e| e.into())
}

pub async fn ping(browser_tx: &mpsc::Sender<BrowserCommand>) -> bool {
    let (tx, rx) = oneshot::channel();
    if browser_tx.send(BrowserCommand::Ping { reply: tx }).await.is_err() {
        return false;
    }
    rx.await.unwrap_or(false)
}
