use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::models::{Guidelines, PersistedComment, PersistedPost};
use crate::storage::{atomic_write_json, read_json, FileLock};

const POSTS_FILE: &str = "posts.json";
const COMMENTS_FILE: &str = "comments.json";

/// Fewer posts than this and analyze_history returns defaults.
const MIN_POSTS_FOR_ANALYSIS: usize = 3;
/// A word or emoji showing up in at least this fraction of recent posts
/// counts as overused.
const OVERUSE_THRESHOLD: f64 = 0.3;

/// Content categories the generator rotates through. analyze_history
/// recommends the ones missing from the recent window.
pub const POST_CATEGORIES: &[&str] = &["humor", "tech", "motivation", "question"];

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Feed items carry no stable platform id we can read, so the id is derived
/// from caption, feed position and author. Position is not stable across
/// reloads; see DESIGN.md for the collision caveat.
pub fn derive_post_id(caption: &str, index: usize, author: &str) -> String {
    content_hash(&format!("{}|{}|{}", caption, index, author))
}

/// Append-only store over two JSON collections. Every failure path here is
/// non-fatal: lookups fail open (report "unseen") and inserts log and
/// swallow, so a broken store never stalls the browser workflows.
pub struct HistoryStore {
    posts_path: PathBuf,
    comments_path: PathBuf,
}

impl HistoryStore {
    pub fn new(data_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            posts_path: data_dir.join(POSTS_FILE),
            comments_path: data_dir.join(COMMENTS_FILE),
        })
    }

    fn load_posts(&self) -> Vec<PersistedPost> {
        read_json(&self.posts_path).unwrap_or_default()
    }

    fn load_comments(&self) -> Vec<PersistedComment> {
        read_json(&self.comments_path).unwrap_or_default()
    }

    pub fn is_duplicate_content(&self, hash: &str) -> bool {
        self.load_posts().iter().any(|p| p.content_hash == hash)
    }

    pub fn has_engaged_with(&self, post_id: &str) -> bool {
        self.load_comments().iter().any(|c| c.post_id == post_id)
    }

    pub fn record_post(&self, post: &PersistedPost) {
        let lock = match FileLock::new(&self.posts_path) {
            Ok(l) => l,
            Err(e) => {
                warn!("post record skipped, lock failed: {}", e);
                return;
            }
        };
        let mut posts = self.load_posts();
        posts.push(post.clone());
        if let Err(e) = atomic_write_json(&self.posts_path, &posts) {
            warn!("post record write failed: {}", e);
        }
        drop(lock);
    }

    pub fn record_comment(&self, comment: &PersistedComment) {
        let lock = match FileLock::new(&self.comments_path) {
            Ok(l) => l,
            Err(e) => {
                warn!("comment record skipped, lock failed: {}", e);
                return;
            }
        };
        let mut comments = self.load_comments();
        comments.push(comment.clone());
        if let Err(e) = atomic_write_json(&self.comments_path, &comments) {
            warn!("comment record write failed: {}", e);
        }
        drop(lock);
    }

    /// Most recent posts, newest first.
    pub fn recent_posts(&self, limit: usize) -> Vec<PersistedPost> {
        let mut posts = self.load_posts();
        posts.reverse();
        posts.truncate(limit);
        posts
    }

    /// Scans the last `window` posts for overused words and emoji and for
    /// categories that have gone unused. Degrades to defaults below the
    /// minimum post count.
    pub fn analyze_history(&self, window: usize) -> Guidelines {
        let recent = self.recent_posts(window);
        if recent.len() < MIN_POSTS_FOR_ANALYSIS {
            return Guidelines::default();
        }

        let mut word_counts: HashMap<String, usize> = HashMap::new();
        let mut emoji_counts: HashMap<char, usize> = HashMap::new();
        let mut used_categories: HashSet<&str> = HashSet::new();

        for post in &recent {
            let mut seen_words: HashSet<String> = HashSet::new();
            for raw in post.content.split_whitespace() {
                let word: String = raw
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect::<String>()
                    .to_lowercase();
                if word.len() > 3 && seen_words.insert(word.clone()) {
                    *word_counts.entry(word).or_insert(0) += 1;
                }
            }
            let mut seen_emoji: HashSet<char> = HashSet::new();
            for c in post.content.chars().filter(|c| is_emoji(*c)) {
                if seen_emoji.insert(c) {
                    *emoji_counts.entry(c).or_insert(0) += 1;
                }
            }
            if let Some(cat) = POST_CATEGORIES.iter().copied().find(|c| *c == post.post_type) {
                used_categories.insert(cat);
            }
        }

        let threshold = ((recent.len() as f64) * OVERUSE_THRESHOLD).ceil() as usize;
        let threshold = threshold.max(2);

        let mut overused_words: Vec<String> = word_counts
            .into_iter()
            .filter(|(_, n)| *n >= threshold)
            .map(|(w, _)| w)
            .collect();
        overused_words.sort();

        let mut overused_emoji: Vec<String> = emoji_counts
            .into_iter()
            .filter(|(_, n)| *n >= threshold)
            .map(|(c, _)| c.to_string())
            .collect();
        overused_emoji.sort();

        let recommended_topics: Vec<String> = POST_CATEGORIES
            .iter()
            .filter(|c| !used_categories.contains(**c))
            .map(|c| c.to_string())
            .collect();

        Guidelines {
            overused_words,
            overused_emoji,
            recommended_topics,
        }
    }
}

fn is_emoji(c: char) -> bool {
    matches!(u32::from(c),
        0x1F300..=0x1FAFF | 0x2600..=0x27BF | 0x1F1E6..=0x1F1FF | 0xFE0F | 0x2B00..=0x2BFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use tempfile::TempDir;

    fn post(content: &str, post_type: &str) -> PersistedPost {
        PersistedPost {
            content: content.to_string(),
            content_hash: content_hash(content),
            image_path: None,
            post_type: post_type.to_string(),
            posted_at: Local::now().to_rfc3339(),
        }
    }

    fn comment(post_id: &str) -> PersistedComment {
        PersistedComment {
            post_id: post_id.to_string(),
            post_url: "https://example.com/p/x".to_string(),
            author: "someone".to_string(),
            comment_text: "nice one".to_string(),
            comment_hash: content_hash("nice one"),
            commented_at: Local::now().to_rfc3339(),
            is_own_post: false,
        }
    }

    #[test]
    fn duplicate_detection_is_exact() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        let p = post("hello feed", "humor");
        store.record_post(&p);

        assert!(store.is_duplicate_content(&p.content_hash));
        assert!(!store.is_duplicate_content(&content_hash("something else")));
    }

    #[test]
    fn engagement_lookup() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        let id = derive_post_id("a caption", 1, "alice");
        assert!(!store.has_engaged_with(&id));
        store.record_comment(&comment(&id));
        assert!(store.has_engaged_with(&id));
    }

    #[test]
    fn fail_open_on_missing_store() {
        // Point at a directory that exists but holds no collections yet:
        // lookups must answer "unseen", not error.
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        assert!(!store.is_duplicate_content("deadbeef"));
        assert!(!store.has_engaged_with("deadbeef"));
    }

    #[test]
    fn analysis_needs_a_minimum_window() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        store.record_post(&post("just one post here", "tech"));

        let g = store.analyze_history(10);
        assert!(g.overused_words.is_empty());
        assert!(g.recommended_topics.is_empty());
    }

    #[test]
    fn analysis_flags_overused_words_and_missing_topics() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        store.record_post(&post("coffee first, always coffee", "humor"));
        store.record_post(&post("more coffee talk today", "humor"));
        store.record_post(&post("nothing beats good coffee", "tech"));

        let g = store.analyze_history(10);
        assert!(g.overused_words.contains(&"coffee".to_string()));
        assert!(g.recommended_topics.contains(&"motivation".to_string()));
        assert!(g.recommended_topics.contains(&"question".to_string()));
        assert!(!g.recommended_topics.contains(&"humor".to_string()));
    }

    #[test]
    fn recent_posts_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        store.record_post(&post("first", "tech"));
        store.record_post(&post("second", "humor"));

        let recent = store.recent_posts(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "second");
    }
}
