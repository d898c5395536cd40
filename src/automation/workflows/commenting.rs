use chrono::Local;
use rand::Rng;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::automation::workflows::{BotContext, WorkflowResult};
use crate::history::content_hash;
use crate::models::{ActivityKind, FeedPost, PersistedComment};

const STOP_SLICE: Duration = Duration::from_millis(500);

/// What the walk does with one feed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementPlan {
    /// Already engaged with; leave it alone.
    Skip,
    /// Our own post, or one whose author could not be resolved: a like is
    /// fine, a comment is not.
    LikeOnly,
    LikeAndComment,
}

/// Pure per-post decision, separated from the page driving so the
/// like-only and skip rules stay checkable without a browser.
pub fn engagement_plan(post: &FeedPost, already_engaged: bool) -> EngagementPlan {
    if already_engaged {
        EngagementPlan::Skip
    } else if post.is_own_post || post.author == "unknown" {
        EngagementPlan::LikeOnly
    } else {
        EngagementPlan::LikeAndComment
    }
}

/// One feed-walk cycle: like and comment on visible posts until the feed is
/// exhausted or a Posting request preempts. The stop signal is polled at
/// every check-point; a pending Posting must be observed within one poll
/// interval, never mid-DOM-mutation.
pub async fn run_feed_walk_cycle(ctx: &BotContext) -> WorkflowResult<()> {
    let guard = match ctx.coordinator.try_acquire(ActivityKind::Commenting).await {
        Some(g) => g,
        None => {
            debug!("page busy, skipping feed walk this cycle");
            return Ok(());
        }
    };

    let result = walk(ctx).await;
    drop(guard);
    result
}

async fn walk(ctx: &BotContext) -> WorkflowResult<()> {
    ctx.driver.navigate_home().await?;

    // Check-point: before extracting any post data.
    if ctx.coordinator.stop_requested().await {
        info!("feed walk yielding to posting before extraction");
        return Ok(());
    }

    let posts = ctx.driver.list_visible_posts(ctx.config.feed_limit).await?;
    info!("feed walk found {} visible posts", posts.len());

    for (index, post) in posts.iter().enumerate() {
        // Check-point: before touching this post at all.
        if ctx.coordinator.stop_requested().await {
            info!("feed walk yielding to posting at post {}", index);
            return Ok(());
        }

        // Second chance on a murky header: a focused re-extraction sometimes
        // resolves an author the bulk pass missed.
        let post = if post.author == "unknown" {
            let author = ctx.driver.identify_author(index).await;
            let is_own_post = ctx.driver.is_self(&author);
            FeedPost {
                author,
                is_own_post,
                ..post.clone()
            }
        } else {
            post.clone()
        };

        let plan = engagement_plan(&post, ctx.store.has_engaged_with(&post.post_id));
        if plan == EngagementPlan::Skip {
            debug!("already engaged with {} by {}", post.post_id, post.author);
            continue;
        }

        match ctx.driver.like_post(index).await {
            Ok(true) => debug!("liked post {} by {}", index, post.author),
            Ok(false) => debug!("skipped like on post {} (already liked or gone)", index),
            Err(e) => {
                // Transient page error: skip this item, advance.
                warn!("like failed on post {}: {}", index, e);
                continue;
            }
        }

        if plan == EngagementPlan::LikeOnly {
            if post.is_own_post {
                debug!("post {} is ours, liking only", index);
            } else {
                debug!("post {} has no resolvable author, skipping comment", index);
            }
            continue;
        }

        // Check-point: before spending a generation call.
        if ctx.coordinator.stop_requested().await {
            info!("feed walk yielding to posting before comment generation");
            return Ok(());
        }
        let comment_text = ctx.generator.generate_comment(&post).await;

        // Check-point: before the final submission.
        if ctx.coordinator.stop_requested().await {
            info!("feed walk yielding to posting before comment submission");
            return Ok(());
        }
        match ctx.driver.comment_on_post(index, &comment_text).await {
            Ok(true) => {
                ctx.store.record_comment(&PersistedComment {
                    post_id: post.post_id.clone(),
                    post_url: post.url.clone(),
                    author: post.author.clone(),
                    comment_text: comment_text.clone(),
                    comment_hash: content_hash(&comment_text),
                    commented_at: Local::now().to_rfc3339(),
                    is_own_post: post.is_own_post,
                });
                info!("commented on post by {}", post.author);
            }
            Ok(false) => debug!("comment box not available on post {}", index),
            Err(e) => {
                warn!("comment failed on post {}: {}", index, e);
                continue;
            }
        }

        // Jittered inter-post pause, sliced so a preemption lands within one
        // slice instead of waiting out the whole delay.
        let pause_ms = {
            let mut rng = rand::rng();
            rng.random_range(3000..8000)
        };
        if interruptible_wait(ctx, Duration::from_millis(pause_ms)).await {
            info!("feed walk yielding to posting during inter-post wait");
            return Ok(());
        }
    }

    info!("feed walk exhausted visible posts");
    Ok(())
}

/// Sleeps in stop-checking slices. Returns true when a stop was requested.
async fn interruptible_wait(ctx: &BotContext, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if ctx.coordinator.stop_requested().await {
            return true;
        }
        let slice = remaining.min(STOP_SLICE);
        sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
    ctx.coordinator.stop_requested().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_post(author: &str, is_own_post: bool) -> FeedPost {
        FeedPost {
            post_id: format!("id-{}", author),
            author: author.to_string(),
            caption: "a caption".to_string(),
            url: "https://example.com/p/1".to_string(),
            is_own_post,
        }
    }

    #[test]
    fn own_posts_get_a_like_but_never_a_comment() {
        let post = feed_post("the_bot", true);
        assert_eq!(engagement_plan(&post, false), EngagementPlan::LikeOnly);
    }

    #[test]
    fn unresolved_author_gets_a_like_but_never_a_comment() {
        let post = feed_post("unknown", false);
        assert_eq!(engagement_plan(&post, false), EngagementPlan::LikeOnly);
    }

    #[test]
    fn engaged_posts_are_left_alone() {
        // Already-engaged beats every other rule, own posts included.
        let post = feed_post("alice", false);
        assert_eq!(engagement_plan(&post, true), EngagementPlan::Skip);
        let own = feed_post("the_bot", true);
        assert_eq!(engagement_plan(&own, true), EngagementPlan::Skip);
    }

    #[test]
    fn fresh_posts_get_the_full_treatment() {
        let post = feed_post("alice", false);
        assert_eq!(engagement_plan(&post, false), EngagementPlan::LikeAndComment);
    }
}
