use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::models::{FeedPost, Guidelines};

/// Field names the backend has been observed to hide the text under, in
/// lookup priority order. The set is open; extend as new shapes show up.
const TEXT_FIELDS: &[&str] = &[
    "post",
    "content",
    "witz",
    "instagram_post",
    "caption",
    "comment",
    "text",
    "message",
    "response",
];

/// Weighted prompt categories for post generation. Weights bias toward the
/// account's usual voice; analyze_history nudges the rotation via the
/// recommended-topics list.
const POST_PROMPTS: &[(&str, &str, u32)] = &[
    (
        "humor",
        "Write a short, funny social media post about everyday life. One or two sentences, casual tone.",
        3,
    ),
    (
        "tech",
        "Write a short social media post with a witty observation about technology or software. Keep it under 40 words.",
        2,
    ),
    (
        "motivation",
        "Write a short, genuine motivational post for a social feed. No hashtag spam, at most one emoji.",
        2,
    ),
    (
        "question",
        "Write a short post asking followers an engaging everyday question. One sentence.",
        1,
    ),
];

const FALLBACK_POSTS: &[&str] = &[
    "Some days the coffee works faster than the code. Today is not one of those days.",
    "Reminder to future me: it was never the compiler's fault.",
    "What's one small thing that made your day better? Asking for a friend.",
];

const FALLBACK_COMMENTS: &[&str] = &[
    "Love this one!",
    "Great post, thanks for sharing.",
    "This made my day, nice work!",
];

/// Wraps the generation backend. Every public method is total: backend
/// failures and unparseable responses degrade to a templated fallback, never
/// to an error or an empty string.
pub struct ContentGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl ContentGenerator {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.gen_api_url.clone(),
            api_key: config.gen_api_key.clone(),
            model: config.gen_model.clone(),
        }
    }

    /// Picks a category (weighted, biased toward recommended topics) and
    /// returns `(category, text)`.
    pub async fn generate_post(&self, guidelines: &Guidelines) -> (String, String) {
        let (category, template) = pick_post_prompt(guidelines);
        let mut prompt = template.to_string();

        if !guidelines.overused_words.is_empty() {
            prompt.push_str(&format!(
                " Avoid these overused words: {}.",
                guidelines.overused_words.join(", ")
            ));
        }
        if !guidelines.overused_emoji.is_empty() {
            prompt.push_str(&format!(
                " Do not use these emoji: {}.",
                guidelines.overused_emoji.join(" ")
            ));
        }

        let text = self.generate(&prompt, FALLBACK_POSTS).await;
        (category.to_string(), text)
    }

    pub async fn generate_comment(&self, post: &FeedPost) -> String {
        let caption: String = post.caption.chars().take(300).collect();
        let prompt = format!(
            "Write a short, friendly comment (max 20 words) replying to this social media post by {}: \"{}\". \
             Be specific to the post, positive, no hashtags.",
            post.author, caption
        );
        self.generate(&prompt, FALLBACK_COMMENTS).await
    }

    /// prompt in, non-empty text out. The only failure mode is a fallback.
    async fn generate(&self, prompt: &str, fallbacks: &[&str]) -> String {
        match self.call_backend(prompt).await {
            Ok(value) => match extract_text(&value) {
                Some(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => {
                    warn!("backend response had no usable text, using fallback");
                    pick_fallback(fallbacks)
                }
            },
            Err(e) => {
                warn!("generation call failed: {}", e);
                pick_fallback(fallbacks)
            }
        }
    }

    async fn call_backend(
        &self,
        prompt: &str,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false
        });

        let mut req = self.client.post(&self.api_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(format!("generation backend returned {}", resp.status()).into());
        }

        let value: Value = resp.json().await?;
        debug!("backend response shape: {}", shape_of(&value));
        Ok(value)
    }
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
        _ => "other",
    }
}

fn pick_fallback(fallbacks: &[&str]) -> String {
    let mut rng = rand::rng();
    let idx = rng.random_range(0..fallbacks.len());
    fallbacks[idx].to_string()
}

fn pick_post_prompt(guidelines: &Guidelines) -> (&'static str, &'static str) {
    // Recommended (recently unused) categories get their weight tripled.
    let weighted: Vec<(&str, &str, u32)> = POST_PROMPTS
        .iter()
        .map(|(cat, tpl, w)| {
            let boosted = if guidelines.recommended_topics.iter().any(|t| t == cat) {
                w * 3
            } else {
                *w
            };
            (*cat, *tpl, boosted)
        })
        .collect();

    let total: u32 = weighted.iter().map(|(_, _, w)| w).sum();
    let mut rng = rand::rng();
    let mut roll = rng.random_range(0..total);
    for (cat, tpl, w) in &weighted {
        if roll < *w {
            return (cat, tpl);
        }
        roll -= w;
    }
    (POST_PROMPTS[0].0, POST_PROMPTS[0].1)
}

/// Priority-ordered scan for the actual text inside whatever shape the
/// backend returned: a sequence of mappings, a mapping, a JSON-encoded
/// string, or plain text. Returns None only when nothing string-like is
/// reachable; callers then fall back.
pub fn extract_text(value: &Value) -> Option<String> {
    extract_inner(value, 0)
}

fn extract_inner(value: &Value, depth: usize) -> Option<String> {
    if depth > 2 {
        return None;
    }
    match value {
        Value::Array(items) => items.first().and_then(|v| extract_inner(v, depth + 1)),
        Value::Object(map) => {
            for field in TEXT_FIELDS {
                if let Some(Value::String(s)) = map.get(*field) {
                    if !s.trim().is_empty() {
                        return Some(s.clone());
                    }
                }
            }
            // No known field matched: a non-empty mapping still counts if
            // its first value is a string.
            map.values().find_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                _ => None,
            })
        }
        Value::String(s) => {
            // The backend sometimes double-encodes: a string that is itself
            // a JSON document. Sniff and recurse, otherwise take it raw.
            match serde_json::from_str::<Value>(s) {
                Ok(inner @ (Value::Array(_) | Value::Object(_))) => {
                    extract_inner(&inner, depth + 1).or_else(|| Some(s.clone()))
                }
                _ => Some(s.clone()),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string_passes_through() {
        assert_eq!(
            extract_text(&json!("just a post")),
            Some("just a post".to_string())
        );
    }

    #[test]
    fn mapping_fields_scan_in_priority_order() {
        let v = json!({ "text": "lower priority", "post": "the post" });
        assert_eq!(extract_text(&v), Some("the post".to_string()));

        let v = json!({ "witz": "der witz" });
        assert_eq!(extract_text(&v), Some("der witz".to_string()));
    }

    #[test]
    fn sequence_uses_first_element() {
        let v = json!([{ "instagram_post": "from the array" }, { "post": "ignored" }]);
        assert_eq!(extract_text(&v), Some("from the array".to_string()));
    }

    #[test]
    fn unknown_field_falls_back_to_first_string_value() {
        let v = json!({ "zzz_custom": "still found" });
        assert_eq!(extract_text(&v), Some("still found".to_string()));
    }

    #[test]
    fn json_encoded_string_recurses() {
        let v = json!("{\"content\": \"nested text\"}");
        assert_eq!(extract_text(&v), Some("nested text".to_string()));
    }

    #[test]
    fn non_json_garbage_string_is_returned_raw() {
        let v = json!("{not json at all");
        assert_eq!(extract_text(&v), Some("{not json at all".to_string()));
    }

    #[test]
    fn hopeless_shapes_yield_none() {
        assert_eq!(extract_text(&json!({})), None);
        assert_eq!(extract_text(&json!([42, 43])), None);
        assert_eq!(extract_text(&json!(null)), None);
        assert_eq!(extract_text(&json!({ "n": 7 })), None);
    }

    #[test]
    fn prompt_categories_match_history_analysis() {
        // analyze_history recommends from its own category list; a prompt
        // category missing there would never get its weight boosted, and a
        // category missing here could never be generated at all.
        let prompt_categories: Vec<&str> = POST_PROMPTS.iter().map(|(c, _, _)| *c).collect();
        assert_eq!(prompt_categories, crate::history::POST_CATEGORIES);
    }

    #[test]
    fn prompt_pick_respects_recommendations() {
        // With every weight concentrated on a recommended topic the pick
        // still has to terminate and return a valid pair.
        let g = Guidelines {
            recommended_topics: vec!["question".to_string()],
            ..Default::default()
        };
        for _ in 0..50 {
            let (cat, tpl) = pick_post_prompt(&g);
            assert!(POST_PROMPTS.iter().any(|(c, t, _)| *c == cat && *t == tpl));
        }
    }

    #[tokio::test]
    async fn generate_never_returns_empty_even_when_backend_is_down() {
        // Unroutable port: the call fails fast and the fallback kicks in.
        let cfg = crate::config::BotConfig {
            username: "u".into(),
            password: "p".into(),
            base_url: "https://example.com".into(),
            gen_api_url: "http://127.0.0.1:9/api/generate".into(),
            gen_api_key: None,
            gen_model: "m".into(),
            data_dir: std::path::PathBuf::from("."),
            images_dir: None,
            post_interval_secs: 1,
            feed_walk_pause_secs: 1,
            feed_limit: 1,
            headless: true,
        };
        let generator = ContentGenerator::new(&cfg);
        let (category, text) = generator.generate_post(&Guidelines::default()).await;
        assert!(!text.is_empty());
        assert!(crate::history::POST_CATEGORIES.contains(&category.as_str()));

        let post = crate::models::FeedPost {
            post_id: "x".into(),
            author: "alice".into(),
            caption: "a view".into(),
            url: "https://example.com/p/1".into(),
            is_own_post: false,
        };
        assert!(!generator.generate_comment(&post).await.is_empty());
    }
}
