use std::path::PathBuf;

use chrono::Local;
use rand::Rng;
use tracing::{info, warn};

use crate::automation::workflows::{BotContext, WorkflowResult};
use crate::history::content_hash;
use crate::models::PersistedPost;

const HISTORY_WINDOW: usize = 20;
const MAX_GENERATION_RETRIES: usize = 3;

/// One posting cycle. Acquires the page with preemption rights, publishes a
/// freshly generated post and records it. The guard releases the busy state
/// on every exit path; errors beyond that are logged by the caller and the
/// cycle simply retries on the next timer tick.
pub async fn run_posting_cycle(ctx: &BotContext) -> WorkflowResult<()> {
    let guard = ctx.coordinator.acquire_posting().await;
    info!("posting cycle granted ({})", guard.kind());

    let result = execute(ctx).await;
    if result.is_err() {
        // Best-effort page recovery so the next cycle starts from a known
        // place. A failed recovery must never hold the lock hostage.
        if let Err(nav) = ctx.driver.navigate_home().await {
            warn!("post-failure recovery navigation failed: {}", nav);
        }
    }
    drop(guard);
    result
}

async fn execute(ctx: &BotContext) -> WorkflowResult<()> {
    ctx.driver.navigate_home().await?;

    let guidelines = ctx.store.analyze_history(HISTORY_WINDOW);

    // Regenerate on exact repeats; give up after a few attempts rather than
    // looping on a backend that keeps serving the same text.
    let mut category = String::new();
    let mut text = String::new();
    let mut hash = String::new();
    for attempt in 0..MAX_GENERATION_RETRIES {
        let (cat, candidate) = ctx.generator.generate_post(&guidelines).await;
        let candidate_hash = content_hash(&candidate);
        if !ctx.store.is_duplicate_content(&candidate_hash) {
            category = cat;
            text = candidate;
            hash = candidate_hash;
            break;
        }
        warn!("generated duplicate content (attempt {})", attempt + 1);
    }
    if text.is_empty() {
        return Err("could not generate non-duplicate content".into());
    }

    let image = pick_image(ctx);
    info!(
        "publishing {} post ({} chars, image: {})",
        category,
        text.chars().count(),
        image.is_some()
    );
    ctx.driver.create_post(&text, image.as_deref()).await?;

    ctx.store.record_post(&PersistedPost {
        content: text,
        content_hash: hash,
        image_path: image.map(|p| p.display().to_string()),
        post_type: category,
        posted_at: Local::now().to_rfc3339(),
    });

    info!("posting cycle complete");
    Ok(())
}

/// Random image from the configured directory, if any.
fn pick_image(ctx: &BotContext) -> Option<PathBuf> {
    let dir = ctx.config.images_dir.as_ref()?;
    let images: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("jpg" | "jpeg" | "png")
            )
        })
        .collect();
    if images.is_empty() {
        return None;
    }
    let mut rng = rand::rng();
    let idx = rng.random_range(0..images.len());
    Some(images[idx].clone())
}
