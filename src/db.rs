use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};
use std::collections::HashSet;

use crate::config::FeedConfig;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub category: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub link: String,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub category: String,
    pub source_name: String,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub slug: String,
    pub is_processed: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FetchLog {
    pub id: i64,
    pub feed_name: String,
    pub fetch_timestamp: String,
    pub status: String,
    pub articles_found: i64,
    pub articles_processed: i64,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<i64>,
}

/// A candidate article produced by the fetcher, not yet stored.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub summary: Option<String>,
    pub link: String,
    pub author: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub category: String,
    pub source_name: String,
    pub source_url: String,
    pub image_url: Option<String>,
    pub slug: String,
}

#[derive(Debug, Clone)]
pub struct NewFetchLog {
    pub feed_name: String,
    pub status: String,
    pub articles_found: i64,
    pub articles_processed: i64,
    pub error_message: Option<String>,
    pub execution_time_ms: i64,
}

/// Filters shared by the listing and search endpoints. Empty/None fields
/// are not applied.
#[derive(Debug, Default, Clone)]
pub struct ArticleFilter {
    pub category: Option<String>,
    pub source: Option<String>,
    pub feeds: Vec<String>,
    pub search: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rss_feeds (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                category TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news_articles (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                summary TEXT,
                content TEXT,
                link TEXT NOT NULL UNIQUE,
                author TEXT,
                published_date TEXT,
                category TEXT NOT NULL,
                source_name TEXT NOT NULL,
                source_url TEXT,
                image_url TEXT,
                slug TEXT NOT NULL UNIQUE,
                is_processed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_fetch_logs (
                id INTEGER PRIMARY KEY,
                feed_name TEXT NOT NULL,
                fetch_timestamp TEXT NOT NULL,
                status TEXT NOT NULL,
                articles_found INTEGER NOT NULL DEFAULT 0,
                articles_processed INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                execution_time_ms INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_articles_category
            ON news_articles(category)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_articles_source_published
            ON news_articles(source_name, published_date DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_articles_processed
            ON news_articles(is_processed)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_logs_feed_timestamp
            ON feed_fetch_logs(feed_name, fetch_timestamp DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Quick connectivity probe for the health endpoint.
    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Feeds
    // ------------------------------------------------------------------

    /// Seed the feed registry from configuration. Name is the stable key;
    /// url and category follow the config, but a runtime `is_active`
    /// toggle survives restarts.
    pub async fn sync_feeds(&self, configs: &[FeedConfig]) -> anyhow::Result<()> {
        for config in configs {
            sqlx::query(
                r#"
                INSERT INTO rss_feeds (name, url, category, is_active, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(name) DO UPDATE SET
                    url = excluded.url,
                    category = excluded.category
                "#,
            )
            .bind(&config.name)
            .bind(&config.url)
            .bind(config.category.as_str())
            .bind(config.is_active)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get_feeds(&self, active_only: bool) -> anyhow::Result<Vec<Feed>> {
        let sql = if active_only {
            "SELECT * FROM rss_feeds WHERE is_active = 1 ORDER BY id"
        } else {
            "SELECT * FROM rss_feeds ORDER BY id"
        };
        let feeds = sqlx::query_as::<_, Feed>(sql).fetch_all(&self.pool).await?;
        Ok(feeds)
    }

    pub async fn get_feed_by_name(&self, name: &str) -> anyhow::Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM rss_feeds WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(feed)
    }

    pub async fn feed_names(&self) -> anyhow::Result<Vec<String>> {
        let names = sqlx::query_as::<_, (String,)>("SELECT name FROM rss_feeds ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(names.into_iter().map(|(name,)| name).collect())
    }

    /// Insert a feed added at runtime. Returns false when the name is taken.
    pub async fn add_feed(&self, config: &FeedConfig) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO rss_feeds (name, url, category, is_active, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(&config.name)
        .bind(&config.url)
        .bind(config.category.as_str())
        .bind(config.is_active)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Flip a feed's active flag. Returns the new state, or None when no
    /// such feed exists.
    pub async fn toggle_feed(&self, name: &str) -> anyhow::Result<Option<bool>> {
        let Some(feed) = self.get_feed_by_name(name).await? else {
            return Ok(None);
        };
        let new_state = !feed.is_active;

        sqlx::query("UPDATE rss_feeds SET is_active = ? WHERE name = ?")
            .bind(new_state)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(Some(new_state))
    }

    pub async fn delete_feed(&self, name: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM rss_feeds WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_feeds(&self, active_only: bool) -> anyhow::Result<i64> {
        let sql = if active_only {
            "SELECT COUNT(*) FROM rss_feeds WHERE is_active = 1"
        } else {
            "SELECT COUNT(*) FROM rss_feeds"
        };
        let count: (i64,) = sqlx::query_as(sql).fetch_one(&self.pool).await?;
        Ok(count.0)
    }

    // ------------------------------------------------------------------
    // Articles
    // ------------------------------------------------------------------

    /// Insert a candidate unless its link is already stored. Feeds are
    /// append-only sources: an existing row is never updated by a re-fetch.
    /// Returns true when a new row was created.
    pub async fn insert_article(&self, article: &NewArticle) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO news_articles
                (title, summary, content, link, author, published_date,
                 category, source_name, source_url, image_url, slug,
                 is_processed, created_at)
            VALUES (?, ?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT(link) DO NOTHING
            "#,
        )
        .bind(&article.title)
        .bind(&article.summary)
        .bind(&article.link)
        .bind(&article.author)
        .bind(article.published_date.map(|d| d.to_rfc3339()))
        .bind(&article.category)
        .bind(&article.source_name)
        .bind(&article.source_url)
        .bind(&article.image_url)
        .bind(&article.slug)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn existing_slugs(&self) -> anyhow::Result<HashSet<String>> {
        let slugs = sqlx::query_as::<_, (String,)>("SELECT slug FROM news_articles")
            .fetch_all(&self.pool)
            .await?;
        Ok(slugs.into_iter().map(|(slug,)| slug).collect())
    }

    pub async fn get_article(&self, id: i64) -> anyhow::Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM news_articles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    pub async fn get_article_by_slug(&self, slug: &str) -> anyhow::Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM news_articles WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    fn filter_clauses(filter: &ArticleFilter) -> String {
        let mut sql = String::from(" WHERE 1=1");
        if filter.category.is_some() {
            sql.push_str(" AND category = ?");
        }
        if filter.source.is_some() {
            sql.push_str(" AND source_name = ?");
        }
        if !filter.feeds.is_empty() {
            let placeholders = vec!["?"; filter.feeds.len()].join(", ");
            sql.push_str(&format!(" AND source_name IN ({placeholders})"));
        }
        if filter.search.is_some() {
            sql.push_str(" AND (title LIKE ? OR summary LIKE ?)");
        }
        if filter.since.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        sql
    }

    /// List articles matching `filter`, most recent first.
    pub async fn list_articles(
        &self,
        filter: &ArticleFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Article>> {
        let mut sql = String::from("SELECT * FROM news_articles");
        sql.push_str(&Self::filter_clauses(filter));
        sql.push_str(
            " ORDER BY published_date DESC NULLS LAST, created_at DESC, id DESC LIMIT ? OFFSET ?",
        );

        let mut query = sqlx::query_as::<_, Article>(&sql);
        if let Some(category) = &filter.category {
            query = query.bind(category);
        }
        if let Some(source) = &filter.source {
            query = query.bind(source);
        }
        for feed in &filter.feeds {
            query = query.bind(feed);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{search}%");
            query = query.bind(pattern.clone()).bind(pattern);
        }
        if let Some(since) = &filter.since {
            query = query.bind(since.to_rfc3339());
        }

        let articles = query.bind(limit).bind(offset).fetch_all(&self.pool).await?;
        Ok(articles)
    }

    pub async fn count_articles(&self, filter: &ArticleFilter) -> anyhow::Result<i64> {
        let mut sql = String::from("SELECT COUNT(*) FROM news_articles");
        sql.push_str(&Self::filter_clauses(filter));

        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        if let Some(category) = &filter.category {
            query = query.bind(category);
        }
        if let Some(source) = &filter.source {
            query = query.bind(source);
        }
        for feed in &filter.feeds {
            query = query.bind(feed);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{search}%");
            query = query.bind(pattern.clone()).bind(pattern);
        }
        if let Some(since) = &filter.since {
            query = query.bind(since.to_rfc3339());
        }

        let count = query.fetch_one(&self.pool).await?;
        Ok(count.0)
    }

    /// Articles the extractor still has to visit, most recent first.
    pub async fn articles_missing_content(&self, limit: i64) -> anyhow::Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM news_articles
            WHERE content IS NULL OR content = ''
            ORDER BY published_date DESC NULLS LAST, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    /// Store extracted content. The image URL only fills in when the
    /// article does not already have one.
    pub async fn store_extraction(
        &self,
        id: i64,
        content: &str,
        image_url: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE news_articles
            SET content = ?,
                image_url = COALESCE(image_url, ?),
                is_processed = 1,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(content)
        .bind(image_url)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop extracted content and image so a later pass re-extracts.
    pub async fn clear_article_content(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE news_articles
            SET content = NULL, image_url = NULL, is_processed = 0, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn recent_articles(&self, limit: i64) -> anyhow::Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            "SELECT * FROM news_articles ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    pub async fn articles_by_category(&self) -> anyhow::Result<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT category, COUNT(*) FROM news_articles GROUP BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn articles_by_source(&self) -> anyhow::Result<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT source_name, COUNT(*) FROM news_articles GROUP BY source_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Fetch logs
    // ------------------------------------------------------------------

    pub async fn insert_fetch_log(&self, log: &NewFetchLog) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feed_fetch_logs
                (feed_name, fetch_timestamp, status, articles_found,
                 articles_processed, error_message, execution_time_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.feed_name)
        .bind(Utc::now().to_rfc3339())
        .bind(&log.status)
        .bind(log.articles_found)
        .bind(log.articles_processed)
        .bind(&log.error_message)
        .bind(log.execution_time_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_fetch_logs(&self, limit: i64) -> anyhow::Result<Vec<FetchLog>> {
        let logs = sqlx::query_as::<_, FetchLog>(
            "SELECT * FROM feed_fetch_logs ORDER BY fetch_timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    pub async fn latest_fetch_log_for(&self, feed_name: &str) -> anyhow::Result<Option<FetchLog>> {
        let log = sqlx::query_as::<_, FetchLog>(
            r#"
            SELECT * FROM feed_fetch_logs
            WHERE feed_name = ?
            ORDER BY fetch_timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(feed_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(log)
    }

    // ------------------------------------------------------------------
    // Cleanup
    // ------------------------------------------------------------------

    /// Delete every article and fetch log. The feed registry stays.
    pub async fn cleanup_all(&self) -> anyhow::Result<(u64, u64)> {
        let articles = sqlx::query("DELETE FROM news_articles")
            .execute(&self.pool)
            .await?;
        let logs = sqlx::query("DELETE FROM feed_fetch_logs")
            .execute(&self.pool)
            .await?;
        Ok((articles.rows_affected(), logs.rows_affected()))
    }

    /// Delete one feed's articles and fetch logs, leaving other feeds'
    /// data untouched.
    pub async fn cleanup_feed(&self, feed_name: &str) -> anyhow::Result<(u64, u64)> {
        let articles = sqlx::query("DELETE FROM news_articles WHERE source_name = ?")
            .bind(feed_name)
            .execute(&self.pool)
            .await?;
        let logs = sqlx::query("DELETE FROM feed_fetch_logs WHERE feed_name = ?")
            .bind(feed_name)
            .execute(&self.pool)
            .await?;
        Ok((articles.rows_affected(), logs.rows_affected()))
    }
}
