use serde::{Deserialize, Serialize};

/// A feed item as extracted from the live page. Never persisted directly;
/// only its derived id and the resulting comment survive the iteration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedPost {
    pub post_id: String,
    pub author: String,
    pub caption: String,
    pub url: String,
    pub is_own_post: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersistedPost {
    pub content: String,
    pub content_hash: String,
    pub image_path: Option<String>,
    pub post_type: String,
    pub posted_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersistedComment {
    pub post_id: String,
    pub post_url: String,
    pub author: String,
    pub comment_text: String,
    pub comment_hash: String,
    pub commented_at: String,
    pub is_own_post: bool,
}

/// History-analysis output fed back into prompt construction: terms to steer
/// away from and categories that have not been used recently.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Guidelines {
    pub overused_words: Vec<String>,
    pub overused_emoji: Vec<String>,
    pub recommended_topics: Vec<String>,
}

/// The unit of work the coordinator arbitrates. Liking never holds the lock
/// on its own; it only runs inside a granted Commenting window.
///
/// Derived `Ord` is the priority order: Posting preempts everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActivityKind {
    Idle,
    Liking,
    Commenting,
    Posting,
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActivityKind::Idle => "idle",
            ActivityKind::Liking => "liking",
            ActivityKind::Commenting => "commenting",
            ActivityKind::Posting => "posting",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posting_outranks_everything() {
        assert!(ActivityKind::Posting > ActivityKind::Commenting);
        assert!(ActivityKind::Commenting > ActivityKind::Liking);
        assert!(ActivityKind::Liking > ActivityKind::Idle);
    }
}
