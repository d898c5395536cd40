pub mod commenting;
pub mod posting;

use std::sync::Arc;

use crate::automation::state::CoordinatorClient;
use crate::config::BotConfig;
use crate::automation::core::PageDriver;
use crate::generator::ContentGenerator;
use crate::history::HistoryStore;

pub type WorkflowResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Everything a workflow needs to run one cycle. Cheap to clone; both timer
/// loops hold their own copy.
#[derive(Clone)]
pub struct BotContext {
    pub coordinator: CoordinatorClient,
    pub driver: Arc<PageDriver>,
    pub generator: Arc<ContentGenerator>,
    pub store: Arc<HistoryStore>,
    pub config: Arc<BotConfig>,
}
