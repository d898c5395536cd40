//! End-to-end scheduling scenario without a live browser: a feed walk is
//! underway, a posting request arrives mid-walk, the walk backs off at its
//! next check-point, posting runs, and the walk resumes afterwards.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tempfile::TempDir;
use tokio::time::{sleep, Duration};

use postpilot::automation::state::CoordinatorClient;
use postpilot::automation::workflows::commenting::{engagement_plan, EngagementPlan};
use postpilot::history::{content_hash, derive_post_id, HistoryStore};
use postpilot::models::{ActivityKind, FeedPost, PersistedComment};

fn feed_post(caption: &str, index: usize, author: &str, is_own_post: bool) -> FeedPost {
    FeedPost {
        post_id: derive_post_id(caption, index, author),
        author: author.to_string(),
        caption: caption.to_string(),
        url: format!("https://example.com/p/{}", author),
        is_own_post,
    }
}

fn comment_for(post: &FeedPost) -> PersistedComment {
    PersistedComment {
        post_id: post.post_id.clone(),
        post_url: post.url.clone(),
        author: post.author.clone(),
        comment_text: "great shot!".to_string(),
        comment_hash: content_hash("great shot!"),
        commented_at: Local::now().to_rfc3339(),
        is_own_post: post.is_own_post,
    }
}

/// Engages with one post the way the walk does, minus the page driving.
/// Re-likes are no-ops, mirroring the page's "already liked" outcome.
fn engage(store: &HistoryStore, post: &FeedPost, liked: &Mutex<HashSet<String>>) {
    match engagement_plan(post, store.has_engaged_with(&post.post_id)) {
        EngagementPlan::Skip => {}
        EngagementPlan::LikeOnly => {
            liked.lock().unwrap().insert(post.post_id.clone());
        }
        EngagementPlan::LikeAndComment => {
            liked.lock().unwrap().insert(post.post_id.clone());
            store.record_comment(&comment_for(post));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn posting_preempts_and_walk_resumes() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(HistoryStore::new(dir.path()).unwrap());
    let coordinator = CoordinatorClient::spawn();

    // One of the visible posts is the bot's own: it must end the scenario
    // liked but never commented on.
    let feed = vec![
        feed_post("sunset pics", 1, "alice", false),
        feed_post("throwback from the bot", 2, "the_bot", true),
        feed_post("lunch today", 3, "bob", false),
        feed_post("new bike", 4, "carol", false),
    ];

    let processed = Arc::new(AtomicUsize::new(0));
    let liked: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

    // Mock feed walk: per post, poll the stop signal, engage, pause.
    let walk = {
        let coordinator = coordinator.clone();
        let store = store.clone();
        let feed = feed.clone();
        let processed = processed.clone();
        let liked = liked.clone();
        tokio::spawn(async move {
            let guard = coordinator
                .try_acquire(ActivityKind::Commenting)
                .await
                .expect("idle coordinator must grant commenting");
            for post in &feed {
                if coordinator.stop_requested().await {
                    break;
                }
                engage(&store, post, &liked);
                processed.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(400)).await;
            }
            drop(guard);
        })
    };

    // Let the walk get through the first post, then demand the page.
    sleep(Duration::from_millis(500)).await;
    assert!(processed.load(Ordering::SeqCst) >= 1);

    let post_guard = coordinator.acquire_posting().await;
    assert_eq!(coordinator.current().await, ActivityKind::Posting);
    walk.await.unwrap();

    // The walk stopped early: it never got through the whole feed.
    assert!(processed.load(Ordering::SeqCst) < feed.len());

    // "Publish" while holding the lock, then release.
    drop(post_guard);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(coordinator.current().await, ActivityKind::Idle);

    // The walk resumes from Idle and skips what it already engaged with.
    let guard = coordinator
        .try_acquire(ActivityKind::Commenting)
        .await
        .expect("coordinator must be idle again");
    for post in &feed {
        engage(&store, post, &liked);
    }
    drop(guard);

    // Every post got its like across the two passes.
    assert_eq!(liked.lock().unwrap().len(), feed.len());

    // Everyone else's posts carry a comment; the bot's own never does.
    for post in &feed {
        assert_eq!(store.has_engaged_with(&post.post_id), !post.is_own_post);
    }
}
