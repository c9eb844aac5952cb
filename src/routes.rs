use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::config::{FeedConfig, NewsCategory};
use crate::db::{Article, ArticleFilter, Database, Feed};
use crate::extractor::ContentExtractor;
use crate::fetcher::{FeedFetchSummary, FetchReport, Fetcher};
use crate::scheduler::{Scheduler, SchedulerStatus};

pub struct AppState {
    pub db: Arc<Database>,
    pub fetcher: Arc<Fetcher>,
    pub extractor: Arc<ContentExtractor>,
    pub scheduler: Arc<Scheduler>,
}

/// API failures rendered as `{"detail": ...}` JSON.
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Internal(err) => {
                error!("Request failed: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError::Internal(err.into())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .nest("/api/news", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/articles", get(list_articles))
        .route("/articles/:id", get(get_article))
        .route("/articles/:id/extract", post(extract_article))
        .route("/articles/slug/:slug", get(get_article_by_slug))
        .route("/categories/:category", get(category_articles))
        .route("/feeds", get(list_feeds))
        .route("/feeds/names", get(feed_names))
        .route("/feeds/status", get(feeds_status))
        .route("/feeds/:name/toggle", post(toggle_feed))
        .route("/fetch", post(fetch_all_feeds))
        .route("/fetch/:feed_name", post(fetch_one_feed))
        .route("/logs", get(fetch_logs))
        .route("/search", get(search_articles))
        .route("/stats", get(stats))
        .route("/scheduler/status", get(scheduler_status))
        .route("/scheduler/start", post(scheduler_start))
        .route("/scheduler/stop", post(scheduler_stop))
        .route("/admin/cleanup/all", delete(cleanup_all))
        .route("/admin/cleanup/feed/:name", delete(cleanup_feed))
        .route("/admin/cleanup/article/:id", delete(cleanup_article))
        .route("/admin/feeds/add", post(add_feed))
        .route("/admin/feeds/delete/:name", delete(delete_feed))
}

#[derive(Serialize)]
pub struct ArticleListResponse {
    pub articles: Vec<Article>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub source: Option<String>,
    /// Comma-separated feed names
    pub feeds: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    pub category: Option<String>,
    pub time_filter: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_log_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

fn default_log_limit() -> i64 {
    50
}

fn validate_pagination(page: i64, per_page: i64) -> Result<(), ApiError> {
    if page < 1 {
        return Err(ApiError::BadRequest("page must be at least 1".to_string()));
    }
    if !(1..=100).contains(&per_page) {
        return Err(ApiError::BadRequest(
            "per_page must be between 1 and 100".to_string(),
        ));
    }
    Ok(())
}

fn parse_category(raw: &str) -> Result<String, ApiError> {
    NewsCategory::parse(raw)
        .map(|category| category.as_str().to_string())
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown category: {raw}")))
}

async fn paginated(
    state: &AppState,
    filter: ArticleFilter,
    page: i64,
    per_page: i64,
) -> Result<Json<ArticleListResponse>, ApiError> {
    let total = state.db.count_articles(&filter).await?;
    let offset = page
        .checked_sub(1)
        .and_then(|p| p.checked_mul(per_page))
        .ok_or_else(|| ApiError::BadRequest("page is out of range".to_string()))?;
    let articles = state.db.list_articles(&filter, per_page, offset).await?;

    Ok(Json(ArticleListResponse {
        articles,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    }))
}

/// Best-effort inline extraction for detail views. A failed extraction
/// leaves the article exactly as stored.
async fn fill_content(state: &AppState, article: Article) -> Result<Article, ApiError> {
    let missing = article.content.as_deref().map_or(true, |c| c.is_empty());
    if !missing {
        return Ok(article);
    }

    if state.extractor.extract_and_store(&article).await {
        if let Some(updated) = state.db.get_article(article.id).await? {
            return Ok(updated);
        }
    }
    Ok(article)
}

// Route handlers

async fn root() -> Json<Value> {
    Json(json!({
        "service": "news4u",
        "version": env!("CARGO_PKG_VERSION"),
        "api": "/api/news",
        "health": "/api/news/health",
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    if state.db.ping().await.is_err() {
        return Ok(Json(json!({
            "status": "degraded",
            "timestamp": Utc::now().to_rfc3339(),
            "database": "unavailable",
        })));
    }

    let total_articles = state.db.count_articles(&ArticleFilter::default()).await?;
    let total_feeds = state.db.count_feeds(false).await?;
    let active_feeds = state.db.count_feeds(true).await?;

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "database": "connected",
        "total_articles": total_articles,
        "total_feeds": total_feeds,
        "active_feeds": active_feeds,
    })))
}

async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ArticleListResponse>, ApiError> {
    validate_pagination(query.page, query.per_page)?;

    let mut filter = ArticleFilter {
        source: query.source.clone(),
        ..Default::default()
    };
    if let Some(category) = &query.category {
        filter.category = Some(parse_category(category)?);
    }
    if let Some(feeds) = &query.feeds {
        filter.feeds = feeds
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
    }

    paginated(&state, filter, query.page, query.per_page).await
}

async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Article>, ApiError> {
    let article = state
        .db
        .get_article(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Article {id} not found")))?;

    let article = fill_content(&state, article).await?;
    Ok(Json(article))
}

async fn get_article_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<Article>, ApiError> {
    let article = state
        .db
        .get_article_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Article '{slug}' not found")))?;

    let article = fill_content(&state, article).await?;
    Ok(Json(article))
}

async fn extract_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let article = state
        .db
        .get_article(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Article {id} not found")))?;

    if article.link.is_empty() {
        return Err(ApiError::BadRequest(
            "Article has no link to extract from".to_string(),
        ));
    }

    let extracted = state.extractor.extract_and_store(&article).await;
    let article = state
        .db
        .get_article(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Article {id} not found")))?;

    Ok(Json(json!({ "extracted": extracted, "article": article })))
}

async fn category_articles(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ArticleListResponse>, ApiError> {
    validate_pagination(query.page, query.per_page)?;

    let filter = ArticleFilter {
        category: Some(parse_category(&category)?),
        ..Default::default()
    };
    paginated(&state, filter, query.page, query.per_page).await
}

async fn list_feeds(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Feed>>, ApiError> {
    let feeds = state.db.get_feeds(true).await?;
    Ok(Json(feeds))
}

async fn feed_names(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, ApiError> {
    let names = state.db.feed_names().await?;
    Ok(Json(names))
}

async fn feeds_status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let feeds = state.db.get_feeds(false).await?;

    let mut statuses = Vec::with_capacity(feeds.len());
    for feed in &feeds {
        let last_fetch = state.db.latest_fetch_log_for(&feed.name).await?;
        statuses.push(json!({
            "name": feed.name,
            "url": feed.url,
            "category": feed.category,
            "is_active": feed.is_active,
            "last_fetch": last_fetch,
        }));
    }

    Ok(Json(json!({
        "feeds": statuses,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

async fn toggle_feed(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let is_active = state
        .db
        .toggle_feed(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Feed '{name}' not found")))?;

    info!("Feed '{}' toggled to is_active={}", name, is_active);
    Ok(Json(json!({ "feed": name, "is_active": is_active })))
}

async fn fetch_all_feeds(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FetchReport>, ApiError> {
    let report = state.fetcher.fetch_all().await?;
    Ok(Json(report))
}

async fn fetch_one_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_name): Path<String>,
) -> Result<Json<FeedFetchSummary>, ApiError> {
    let feed = state
        .db
        .get_feed_by_name(&feed_name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Feed '{feed_name}' not found")))?;

    Ok(Json(state.fetcher.fetch_feed(&feed).await))
}

async fn fetch_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Value>, ApiError> {
    if !(1..=100).contains(&query.limit) {
        return Err(ApiError::BadRequest(
            "limit must be between 1 and 100".to_string(),
        ));
    }

    let logs = state.db.recent_fetch_logs(query.limit).await?;
    let count = logs.len();
    Ok(Json(json!({ "count": count, "logs": logs })))
}

async fn search_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ArticleListResponse>, ApiError> {
    validate_pagination(query.page, query.per_page)?;

    let term = query.query.trim();
    if term.is_empty() {
        return Err(ApiError::BadRequest(
            "Search query must not be blank".to_string(),
        ));
    }

    let mut filter = ArticleFilter {
        search: Some(term.to_string()),
        ..Default::default()
    };
    if let Some(category) = &query.category {
        if category != "all" {
            filter.category = Some(parse_category(category)?);
        }
    }
    filter.since = search_window(query.time_filter.as_deref().unwrap_or("24h"))?;

    paginated(&state, filter, query.page, query.per_page).await
}

fn search_window(time_filter: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    let now = Utc::now();
    match time_filter {
        "24h" => Ok(Some(now - Duration::hours(24))),
        "7d" => Ok(Some(now - Duration::days(7))),
        "30d" => Ok(Some(now - Duration::days(30))),
        "all" => Ok(None),
        other => Err(ApiError::BadRequest(format!(
            "Unknown time filter: {other}"
        ))),
    }
}

async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let total_articles = state.db.count_articles(&ArticleFilter::default()).await?;
    let total_feeds = state.db.count_feeds(false).await?;
    let active_feeds = state.db.count_feeds(true).await?;
    let recent_articles = state.db.recent_articles(5).await?;

    let by_category: Map<String, Value> = state
        .db
        .articles_by_category()
        .await?
        .into_iter()
        .map(|(category, count)| (category, json!(count)))
        .collect();
    let by_source: Map<String, Value> = state
        .db
        .articles_by_source()
        .await?
        .into_iter()
        .map(|(source, count)| (source, json!(count)))
        .collect();

    Ok(Json(json!({
        "total_articles": total_articles,
        "articles_by_category": by_category,
        "articles_by_source": by_source,
        "recent_articles": recent_articles,
        "total_feeds": total_feeds,
        "active_feeds": active_feeds,
        "last_updated": Utc::now().to_rfc3339(),
    })))
}

async fn scheduler_status(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

async fn scheduler_start(State(state): State<Arc<AppState>>) -> Json<Value> {
    let started = state.scheduler.start().await;
    let message = if started {
        "Scheduler started"
    } else {
        "Scheduler already running"
    };
    Json(json!({ "running": true, "message": message }))
}

async fn scheduler_stop(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stopped = state.scheduler.stop().await;
    let message = if stopped {
        "Scheduler stopped"
    } else {
        "Scheduler was not running"
    };
    Json(json!({ "running": false, "message": message }))
}

async fn cleanup_all(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let (articles, logs) = state.db.cleanup_all().await?;
    info!("Cleanup removed {} articles and {} fetch logs", articles, logs);
    Ok(Json(json!({
        "deleted_articles": articles,
        "deleted_logs": logs,
    })))
}

async fn cleanup_feed(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let feed = state
        .db
        .get_feed_by_name(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Feed '{name}' not found")))?;

    let (articles, logs) = state.db.cleanup_feed(&feed.name).await?;
    info!(
        "Cleanup removed {} articles and {} fetch logs for feed '{}'",
        articles, logs, feed.name
    );
    Ok(Json(json!({
        "feed": feed.name,
        "deleted_articles": articles,
        "deleted_logs": logs,
    })))
}

async fn cleanup_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let cleared = state.db.clear_article_content(id).await?;
    if !cleared {
        return Err(ApiError::NotFound(format!("Article {id} not found")));
    }
    Ok(Json(json!({ "article_id": id, "content_cleared": true })))
}

async fn add_feed(
    State(state): State<Arc<AppState>>,
    Json(feed): Json<FeedConfig>,
) -> Result<Json<Value>, ApiError> {
    if feed.name.trim().is_empty() || feed.url.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Feed name and url must not be blank".to_string(),
        ));
    }

    let added = state.db.add_feed(&feed).await?;
    if !added {
        return Err(ApiError::BadRequest(format!(
            "Feed '{}' already exists",
            feed.name
        )));
    }

    info!("Feed '{}' added via admin API", feed.name);
    Ok(Json(json!({ "feed": feed.name, "added": true })))
}

async fn delete_feed(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state.db.delete_feed(&name).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Feed '{name}' not found")));
    }

    info!("Feed '{}' deleted via admin API", name);
    Ok(Json(json!({ "feed": name, "deleted": true })))
}
