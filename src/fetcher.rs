use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::db::{Database, Feed, NewArticle, NewFetchLog};
use crate::error::FetchError;
use crate::slug;

/// Outcome of fetching a single feed. Mirrors the log row written for
/// the attempt.
#[derive(Debug, Clone, Serialize)]
pub struct FeedFetchSummary {
    pub feed_name: String,
    pub status: String,
    pub articles_found: i64,
    pub articles_processed: i64,
    pub error_message: Option<String>,
    pub execution_time_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub feeds_fetched: usize,
    pub total_found: i64,
    pub total_new: i64,
    pub summaries: Vec<FeedFetchSummary>,
}

pub struct Fetcher {
    client: Client,
    db: Arc<Database>,
}

impl Fetcher {
    pub fn new(db: Arc<Database>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("News4U/1.0 (RSS Aggregator)")
            .build()?;

        Ok(Self { client, db })
    }

    /// Fetch every active feed in turn. A failing feed gets its own error
    /// log row and never stops the rest of the batch.
    pub async fn fetch_all(&self) -> anyhow::Result<FetchReport> {
        let feeds = self.db.get_feeds(true).await?;
        info!("Fetching {} active feeds", feeds.len());

        let mut summaries = Vec::with_capacity(feeds.len());
        for feed in &feeds {
            summaries.push(self.fetch_feed(feed).await);
        }

        let report = FetchReport {
            feeds_fetched: summaries.len(),
            total_found: summaries.iter().map(|s| s.articles_found).sum(),
            total_new: summaries.iter().map(|s| s.articles_processed).sum(),
            summaries,
        };
        info!(
            "Feed fetch complete: {} new articles across {} feeds",
            report.total_new, report.feeds_fetched
        );
        Ok(report)
    }

    /// Fetch one feed and store whatever is new. Always records a fetch
    /// log row, success or error.
    pub async fn fetch_feed(&self, feed: &Feed) -> FeedFetchSummary {
        info!("Fetching feed: {} ({})", feed.name, feed.url);
        let started = Instant::now();

        let outcome = self.ingest_feed(feed).await;
        let execution_time_ms = started.elapsed().as_millis() as i64;

        let summary = match outcome {
            Ok((found, inserted)) => {
                info!("Stored {} new articles for feed '{}'", inserted, feed.name);
                FeedFetchSummary {
                    feed_name: feed.name.clone(),
                    status: "success".to_string(),
                    articles_found: found,
                    articles_processed: inserted,
                    error_message: None,
                    execution_time_ms,
                }
            }
            Err(e) => {
                error!("Failed to fetch feed '{}': {}", feed.name, e);
                FeedFetchSummary {
                    feed_name: feed.name.clone(),
                    status: "error".to_string(),
                    articles_found: 0,
                    articles_processed: 0,
                    error_message: Some(e.to_string()),
                    execution_time_ms,
                }
            }
        };

        let log = NewFetchLog {
            feed_name: summary.feed_name.clone(),
            status: summary.status.clone(),
            articles_found: summary.articles_found,
            articles_processed: summary.articles_processed,
            error_message: summary.error_message.clone(),
            execution_time_ms: summary.execution_time_ms,
        };
        if let Err(e) = self.db.insert_fetch_log(&log).await {
            error!("Failed to record fetch log for '{}': {}", feed.name, e);
        }

        summary
    }

    async fn ingest_feed(&self, feed: &Feed) -> anyhow::Result<(i64, i64)> {
        let parsed = self.download(feed).await?;
        let found = parsed.entries.len() as i64;

        let mut slugs = self.db.existing_slugs().await?;
        let mut inserted = 0i64;

        for entry in parsed.entries {
            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.clone())
                .unwrap_or_else(|| "Untitled".to_string());

            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();

            if link.is_empty() {
                warn!("Skipping entry with no link: {}", title);
                continue;
            }

            let summary = entry.summary.as_ref().map(|t| strip_html(&t.content));
            let author = entry.authors.first().map(|p| p.name.clone());
            let published: Option<DateTime<Utc>> = entry.published.or(entry.updated);
            let image_url = extract_entry_image(&entry);

            let article = NewArticle {
                slug: slug::generate_unique_slug(&title, &slugs),
                title,
                summary,
                link,
                author,
                published_date: published,
                category: feed.category.clone(),
                source_name: feed.name.clone(),
                source_url: feed.url.clone(),
                image_url,
            };

            match self.db.insert_article(&article).await {
                Ok(true) => {
                    slugs.insert(article.slug.clone());
                    inserted += 1;
                }
                Ok(false) => {} // link already stored, first write wins
                Err(e) => warn!("Failed to store article '{}': {}", article.title, e),
            }
        }

        Ok((found, inserted))
    }

    async fn download(&self, feed: &Feed) -> Result<feed_rs::model::Feed, FetchError> {
        let response = self.client.get(&feed.url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(parser::parse(&bytes[..])?)
    }
}

/// Flatten an HTML fragment (feed summaries are usually HTML) to
/// whitespace-normalized plain text.
fn strip_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text = fragment.root_element().text().collect::<String>();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best-effort image for a feed entry: media content, then media
/// thumbnail, then the first <img> inside the HTML summary.
fn extract_entry_image(entry: &Entry) -> Option<String> {
    for media in &entry.media {
        for content in &media.content {
            if let Some(url) = &content.url {
                return Some(url.to_string());
            }
        }
        if let Some(thumbnail) = media.thumbnails.first() {
            return Some(thumbnail.image.uri.clone());
        }
    }

    let summary = entry.summary.as_ref()?;
    first_img_src(&summary.content)
}

fn first_img_src(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("img").ok()?;
    let img = fragment.select(&selector).next()?;
    img.value().attr("src").map(|s| s.to_string())
}
