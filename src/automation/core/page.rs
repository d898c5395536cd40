use std::path::{Path, PathBuf};

use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::{Element, Page};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::history::derive_post_id;
use crate::models::FeedPost;

pub type PageResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const LOGIN_USER_SEL: &str = "input[name=\"username\"]";
const LOGIN_PASS_SEL: &str = "input[name=\"password\"]";
const LOGIN_SUBMIT_SEL: &str = "button[type=\"submit\"]";
const NEW_POST_SEL: &str = "svg[aria-label=\"New post\"], svg[aria-label=\"Create\"]";
const FILE_INPUT_SEL: &str = "input[type=\"file\"]";
const CAPTION_SEL: &str =
    "textarea[aria-label=\"Write a caption...\"], div[aria-label=\"Write a caption...\"]";

/// Path segments that look like usernames in hrefs but are reserved routes.
const RESERVED_SEGMENTS: &[&str] = &[
    "p",
    "explore",
    "reels",
    "stories",
    "direct",
    "accounts",
    "about",
    "legal",
    "directory",
    "web",
    "challenge",
    "developer",
];

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._]{0,29})$").expect("static regex"));

/// Raw per-article extraction handed back by the in-page script. Kept dumb
/// on the JS side so the brittle part (deciding what counts as an author)
/// stays in unit-testable Rust.
#[derive(Debug, serde::Deserialize)]
struct RawFeedItem {
    header: Vec<(String, String)>,
    links: Vec<(String, String)>,
    caption: String,
    url: String,
}

/// Thin capability layer over the one shared tab. Every DOM-dependent call
/// treats "element not found" as a normal outcome: feed markup is
/// third-party and changes without notice.
pub struct PageDriver {
    page: Page,
    own_username: String,
    base_url: String,
    data_dir: PathBuf,
}

impl PageDriver {
    pub fn new(page: Page, own_username: String, base_url: String, data_dir: PathBuf) -> Self {
        Self {
            page,
            own_username,
            base_url,
            data_dir,
        }
    }

    pub fn is_self(&self, author: &str) -> bool {
        same_account(author, &self.own_username)
    }

    /// Logs in unless the stored browser profile already carries a session.
    pub async fn login(&self, password: &str) -> PageResult<()> {
        self.page
            .goto(format!("{}/accounts/login/", self.base_url))
            .await?;
        self.wait_for_settle().await?;

        let user_input = match self.wait_for_selector(LOGIN_USER_SEL, 5).await {
            Ok(el) => el,
            Err(_) => {
                info!("no login form found, assuming existing session");
                return Ok(());
            }
        };

        info!("logging in as {}", self.own_username);
        user_input.click().await?;
        user_input.type_str(&self.own_username).await?;

        let pass_input = self.wait_for_selector(LOGIN_PASS_SEL, 5).await?;
        pass_input.click().await?;
        pass_input.type_str(password).await?;
        sleep(Duration::from_millis(500)).await;

        let submit = self.wait_for_selector(LOGIN_SUBMIT_SEL, 5).await?;
        submit.click().await?;
        self.wait_for_settle().await?;

        // Still on the login form means the credentials were rejected.
        if self.page.find_element(LOGIN_PASS_SEL).await.is_ok() {
            return Err("login rejected, check credentials".into());
        }
        Ok(())
    }

    pub async fn navigate_home(&self) -> PageResult<()> {
        self.page.goto(self.base_url.as_str()).await?;
        self.wait_for_settle().await?;
        Ok(())
    }

    /// Drives the post-creation dialog: open, optional upload, advance,
    /// caption, share.
    pub async fn create_post(&self, caption: &str, image_path: Option<&Path>) -> PageResult<()> {
        let new_post = self.wait_for_selector(NEW_POST_SEL, 10).await?;
        new_post.click().await?;
        sleep(Duration::from_millis(800)).await;

        if let Some(path) = image_path {
            let input = self.wait_for_selector(FILE_INPUT_SEL, 10).await?;
            let params = SetFileInputFilesParams::builder()
                .files(vec![path.display().to_string()])
                .node_id(input.node_id)
                .build()?;
            self.page.execute(params).await?;
            sleep(Duration::from_secs(1)).await;

            // The crop and filter steps each need one "Next".
            self.click_button_by_text("Next").await?;
            sleep(Duration::from_millis(800)).await;
            self.click_button_by_text("Next").await?;
            sleep(Duration::from_millis(800)).await;
        }

        let caption_el = self.wait_for_selector(CAPTION_SEL, 10).await?;
        caption_el.click().await?;
        self.insert_text(CAPTION_SEL, caption).await?;
        sleep(Duration::from_millis(500)).await;

        self.click_button_by_text("Share").await?;
        self.wait_for_settle().await?;
        let _ = self.take_screenshot("last_post.png").await;
        Ok(())
    }

    /// Extracts up to `limit` posts currently visible in the feed. Articles
    /// whose author cannot be resolved still come back, tagged "unknown".
    pub async fn list_visible_posts(&self, limit: usize) -> PageResult<Vec<FeedPost>> {
        let items = self.extract_raw_items(limit).await?;
        let posts = items
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let author = resolve_author(&items, index);
                let is_own_post = self.is_self(&author);
                FeedPost {
                    post_id: derive_post_id(&raw.caption, index + 1, &author),
                    author,
                    caption: raw.caption.clone(),
                    url: raw.url.clone(),
                    is_own_post,
                }
            })
            .collect();
        Ok(posts)
    }

    /// Likes the nth visible post. False means already liked or the button
    /// was not found; both are normal.
    pub async fn like_post(&self, index: usize) -> PageResult<bool> {
        let js = format!(
            r#"() => {{
                const art = document.querySelectorAll('article')[{}];
                if (!art) return "missing";
                if (art.querySelector('svg[aria-label="Unlike"]')) return "already";
                const icon = art.querySelector('svg[aria-label="Like"]');
                if (!icon) return "missing";
                const btn = icon.closest('button, div[role="button"]');
                if (!btn) return "missing";
                btn.click();
                return "liked";
            }}"#,
            index
        );
        let result = self.page.evaluate(js).await?;
        let outcome = result.value().and_then(|v| v.as_str()).unwrap_or("missing");
        debug!("like #{}: {}", index, outcome);
        Ok(outcome == "liked")
    }

    /// Types and submits a comment on the nth visible post.
    pub async fn comment_on_post(&self, index: usize, text: &str) -> PageResult<bool> {
        let focus_js = format!(
            r#"() => {{
                const art = document.querySelectorAll('article')[{}];
                if (!art) return false;
                const box = art.querySelector('textarea, [aria-label="Add a comment…"]');
                if (!box) return false;
                box.focus();
                return true;
            }}"#,
            index
        );
        let focused = self
            .page
            .evaluate(focus_js)
            .await?
            .value()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !focused {
            return Ok(false);
        }

        // insertText instead of setting .value so the framework's own input
        // emitters fire and the submit button enables itself.
        let content_json = serde_json::to_string(text)?;
        let type_js = format!(
            r#"() => {{
                const art = document.querySelectorAll('article')[{}];
                const box = art.querySelector('textarea, [aria-label="Add a comment…"]');
                box.focus();
                document.execCommand('insertText', false, {});
                box.dispatchEvent(new Event('input', {{ bubbles: true }}));
                return true;
            }}"#,
            index, content_json
        );
        self.page.evaluate(type_js).await?;
        sleep(Duration::from_millis(600)).await;

        let submit_js = format!(
            r#"() => {{
                const art = document.querySelectorAll('article')[{}];
                if (!art) return false;
                const btns = [...art.querySelectorAll('button, div[role="button"]')];
                const post = btns.find(b => b.innerText.trim() === 'Post');
                if (!post) return false;
                post.click();
                return true;
            }}"#,
            index
        );
        let submitted = self
            .page
            .evaluate(submit_js)
            .await?
            .value()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if submitted {
            self.wait_for_settle().await?;
        }
        Ok(submitted)
    }

    /// Resolves the author of the nth visible post, or "unknown".
    pub async fn identify_author(&self, index: usize) -> String {
        match self.extract_raw_items(index + 1).await {
            Ok(items) => resolve_author(&items, index),
            Err(e) => {
                warn!("author extraction failed: {}", e);
                "unknown".to_string()
            }
        }
    }

    async fn extract_raw_items(&self, limit: usize) -> PageResult<Vec<RawFeedItem>> {
        let js = format!(
            r#"() => {{
                const arts = [...document.querySelectorAll('article')].slice(0, {});
                return arts.map(a => {{
                    const header = a.querySelector('header');
                    const grab = root => [...root.querySelectorAll('a[href]')]
                        .map(l => [l.getAttribute('href') || '', l.innerText.trim()]);
                    const capEl = a.querySelector('h1, span[dir="auto"]');
                    const permalink = a.querySelector('a[href*="/p/"]');
                    return {{
                        header: header ? grab(header) : [],
                        links: grab(a),
                        caption: capEl ? capEl.innerText.trim() : '',
                        url: permalink ? permalink.href : ''
                    }};
                }});
            }}"#,
            limit
        );
        let result = self.page.evaluate(js).await?;
        let value = result.value().cloned().unwrap_or(serde_json::Value::Null);
        if value.is_null() {
            return Ok(Vec::new());
        }
        let items: Vec<RawFeedItem> = serde_json::from_value(value)?;
        Ok(items)
    }

    async fn insert_text(&self, selector: &str, text: &str) -> PageResult<()> {
        let content_json = serde_json::to_string(text)?;
        let selector_list = serde_json::to_string(selector)?;
        let js = format!(
            r#"() => {{
                const el = document.querySelector({});
                if (!el) return false;
                el.focus();
                document.execCommand('insertText', false, {});
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                return true;
            }}"#,
            selector_list, content_json
        );
        self.page.evaluate(js).await?;
        Ok(())
    }

    async fn click_button_by_text(&self, label: &str) -> PageResult<()> {
        let js = format!(
            r#"() => {{
                const btns = [...document.querySelectorAll('button, div[role="button"]')];
                const target = btns.find(b => b.innerText.trim() === "{}");
                if (!target) return false;
                target.click();
                return true;
            }}"#,
            label
        );
        let clicked = self
            .page
            .evaluate(js)
            .await?
            .value()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !clicked {
            return Err(format!("button \"{}\" not found", label).into());
        }
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, attempts: usize) -> PageResult<Element> {
        for _ in 0..attempts {
            if let Ok(el) = self.page.find_element(selector).await {
                return Ok(el);
            }
            sleep(Duration::from_millis(1000)).await;
        }
        Err(format!("timeout waiting for selector: {}", selector).into())
    }

    /// Waits until the DOM stops mutating for a short quiet period, with a
    /// hard upper bound.
    async fn wait_for_settle(&self) -> PageResult<()> {
        self.page
            .evaluate(
                r#"
            window.__pageSettle = () => new Promise(resolve => {
                let lastChange = Date.now();
                const start = Date.now();
                const obs = new MutationObserver(() => { lastChange = Date.now(); });
                obs.observe(document.body, { childList: true, subtree: true, characterData: true });
                const check = setInterval(() => {
                    const now = Date.now();
                    if (now - lastChange > 2000 || now - start > 30000) {
                        clearInterval(check);
                        obs.disconnect();
                        resolve(true);
                    }
                }, 300);
            });
        "#,
            )
            .await?;
        self.page.evaluate("window.__pageSettle()").await?;
        Ok(())
    }

    async fn take_screenshot(&self, filename: &str) -> PageResult<()> {
        let path = self.data_dir.join(filename);
        self.page
            .save_screenshot(
                chromiumoxide::page::ScreenshotParams::builder()
                    .full_page(false)
                    .build(),
                &path,
            )
            .await?;
        debug!("screenshot saved to {:?}", path);
        Ok(())
    }
}

/// Handles, not display names: the platform lowercases handles in some
/// surfaces and preserves case in others.
fn same_account(author: &str, own: &str) -> bool {
    !author.is_empty() && author.eq_ignore_ascii_case(own)
}

fn resolve_author(items: &[RawFeedItem], index: usize) -> String {
    items
        .get(index)
        .and_then(|raw| pick_username(&raw.header, &raw.links))
        .unwrap_or_else(|| "unknown".to_string())
}

fn valid_username(candidate: &str) -> bool {
    USERNAME_RE.is_match(candidate)
        && !RESERVED_SEGMENTS
            .iter()
            .any(|r| candidate.eq_ignore_ascii_case(r))
}

fn first_path_segment(href: &str) -> Option<&str> {
    let path = href
        .strip_prefix("https://")
        .or_else(|| href.strip_prefix("http://"))
        .map(|rest| rest.find('/').map(|i| &rest[i..]).unwrap_or(""))
        .unwrap_or(href);
    path.trim_start_matches('/').split('/').next().filter(|s| !s.is_empty())
}

/// Layered author heuristic: structural header links first (the href path
/// segment must look like a username and not be a reserved route), then a
/// fallback scan of all link texts under the same validation.
fn pick_username(header: &[(String, String)], all: &[(String, String)]) -> Option<String> {
    for (href, _) in header {
        if let Some(seg) = first_path_segment(href) {
            if valid_username(seg) {
                return Some(seg.to_string());
            }
        }
    }
    for (_, text) in all {
        let candidate = text.trim().trim_start_matches('@');
        if !candidate.is_empty() && !candidate.contains(char::is_whitespace) && valid_username(candidate) {
            return Some(candidate.to_string());
        }
    }
    None
}
