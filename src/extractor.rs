use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::db::{Article, Database};
use crate::error::ExtractError;

/// Article-body selectors for the news sites the stock feed registry
/// points at, keyed by domain. Tried before the generic candidates;
/// subdomains match their entry.
const SITE_SELECTORS: &[(&str, &[&str])] = &[
    (
        "kenh14.vn",
        &["div.detail-content", "div.knc-content", "article"],
    ),
    (
        "vnexpress.net",
        &[
            "div.fck_detail",
            "div.sidebar_1",
            "div.content_detail",
            "div.article_content",
            "article",
        ],
    ),
    ("tuoitre.vn", &["div[data-role=\"content\"]"]),
    ("techcrunch.com", &["div.entry-content"]),
    ("bbc.com", &["article", "div[data-component=\"text-block\"]"]),
    ("cnbc.com", &["div[data-module=\"ArticleBody\"]"]),
    (
        "theverge.com",
        &["div.duet--layout--entry-body-container", "article"],
    ),
    ("engadget.com", &["div.caas-body", "div.article-body"]),
    (
        "abcnews.go.com",
        &[
            "div[data-testid=\"prism-article-body\"]",
            "div.article-body",
            "div.content",
        ],
    ),
    (
        "nbcnews.com",
        &["div.article-body__content", "div.article-content"],
    ),
    ("cbsnews.com", &["section.content__body", "div.article-content"]),
];

/// Containers tried when no site entry matches, or the matching one
/// yields too little text.
const CONTAINER_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    "#content",
    "[itemprop=\"articleBody\"]",
    ".post-content",
    ".article-body",
];

/// Block-level elements whose text makes up the article body. Taking
/// only these keeps script, nav and ad markup out of the result.
const TEXT_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li, blockquote";

/// Anything shorter than this is boilerplate, not an article.
const MIN_TEXT_CHARS: usize = 200;

const PAGE_TIMEOUT_SECS: u64 = 15;

/// Readable content pulled out of an article page.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub images: Vec<String>,
    pub lead_image: Option<String>,
}

pub struct ContentExtractor {
    client: Client,
    db: Arc<Database>,
}

impl ContentExtractor {
    pub fn new(db: Arc<Database>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PAGE_TIMEOUT_SECS))
            .user_agent("News4U/1.0 (RSS Aggregator)")
            .build()?;

        Ok(Self { client, db })
    }

    /// Fetch an article page and pull the readable text out of it.
    pub async fn extract(&self, url: &str) -> Result<Extraction, ExtractError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let html = response.text().await?;

        let base = Url::parse(url).ok();
        match extract_from_html(&html, base.as_ref()) {
            Some(extraction) => {
                debug!(
                    "Extracted {} chars and {} images from {}",
                    extraction.text.chars().count(),
                    extraction.images.len(),
                    url
                );
                Ok(extraction)
            }
            None => Err(ExtractError::NoContent),
        }
    }

    /// Extract and persist content for one article. Failures are logged
    /// and leave the row untouched, so a later pass retries it.
    pub async fn extract_and_store(&self, article: &Article) -> bool {
        let extraction = match self.extract(&article.link).await {
            Ok(extraction) => extraction,
            Err(e) => {
                debug!(
                    "Content extraction failed for '{}' ({}): {}",
                    article.title, article.link, e
                );
                return false;
            }
        };

        let image = extraction.lead_image.as_deref();
        match self
            .db
            .store_extraction(article.id, &extraction.text, image)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to store content for article {}: {}", article.id, e);
                false
            }
        }
    }

    /// One pass over articles that still have no content, most recent
    /// first.
    pub async fn process_pending(&self, batch_size: i64) -> anyhow::Result<usize> {
        let pending = self.db.articles_missing_content(batch_size).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut stored = 0;
        for article in &pending {
            if self.extract_and_store(article).await {
                stored += 1;
            }
        }

        info!(
            "Content extraction pass: {} of {} articles filled",
            stored,
            pending.len()
        );
        Ok(stored)
    }
}

/// Selector list for a known news site. `host` must already be
/// lowercase, which `Url::host_str` guarantees.
fn site_selectors(host: &str) -> Option<&'static [&'static str]> {
    SITE_SELECTORS
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{domain}")))
        .map(|(_, selectors)| *selectors)
}

/// Heuristic readability pass over a full HTML document. Returns None
/// when no candidate yields enough text.
fn extract_from_html(html: &str, base: Option<&Url>) -> Option<Extraction> {
    let document = Html::parse_document(html);
    let text_selector = Selector::parse(TEXT_SELECTOR).ok()?;
    let img_selector = Selector::parse("img").ok()?;

    let site = base
        .and_then(|url| url.host_str())
        .and_then(site_selectors)
        .unwrap_or_default();

    for candidate in site.iter().chain(CONTAINER_SELECTORS) {
        let Ok(container_selector) = Selector::parse(candidate) else {
            continue;
        };
        for container in document.select(&container_selector) {
            let text = collect_text(container.select(&text_selector));
            if text.chars().count() >= MIN_TEXT_CHARS {
                let images = collect_images(container.select(&img_selector), base);
                let lead_image =
                    meta_image(&document, base).or_else(|| images.first().cloned());
                return Some(Extraction {
                    text,
                    images,
                    lead_image,
                });
            }
        }
    }

    // No recognizable container: fall back to every paragraph on the page
    let p_selector = Selector::parse("p").ok()?;
    let text = collect_text(document.select(&p_selector));
    if text.chars().count() >= MIN_TEXT_CHARS {
        let images = collect_images(document.select(&img_selector), base);
        let lead_image = meta_image(&document, base).or_else(|| images.first().cloned());
        return Some(Extraction {
            text,
            images,
            lead_image,
        });
    }

    None
}

fn collect_text<'a>(elements: impl Iterator<Item = ElementRef<'a>>) -> String {
    let mut blocks = Vec::new();
    for element in elements {
        let text = normalize(&element.text().collect::<String>());
        if !text.is_empty() {
            blocks.push(text);
        }
    }
    blocks.join("\n\n")
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_images<'a>(
    images: impl Iterator<Item = ElementRef<'a>>,
    base: Option<&Url>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    for img in images {
        let Some(src) = img.value().attr("src") else {
            continue;
        };
        let Some(url) = resolve(base, src) else {
            continue;
        };
        if is_content_image(&url) && seen.insert(url.clone()) {
            resolved.push(url);
        }
    }
    resolved
}

/// Lead image advertised by the page itself, og:image first.
fn meta_image(document: &Html, base: Option<&Url>) -> Option<String> {
    for selector in ["meta[property=\"og:image\"]", "meta[name=\"twitter:image\"]"] {
        let Ok(meta_selector) = Selector::parse(selector) else {
            continue;
        };
        if let Some(meta) = document.select(&meta_selector).next() {
            if let Some(content) = meta.value().attr("content") {
                if let Some(url) = resolve(base, content) {
                    if is_content_image(&url) {
                        return Some(url);
                    }
                }
            }
        }
    }
    None
}

fn resolve(base: Option<&Url>, candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    let url = match base {
        Some(base) => base.join(candidate).ok()?,
        None => Url::parse(candidate).ok()?,
    };
    Some(url.to_string())
}

/// Filters out data URIs, tracking pixels and the like.
fn is_content_image(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if !lower.starts_with("http://") && !lower.starts_with("https://") {
        return false;
    }
    const JUNK: &[&str] = &["pixel", "spacer", "1x1", "transparent"];
    !JUNK.iter().any(|junk| lower.contains(junk))
}
