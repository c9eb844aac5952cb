use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::config::Config;
use crate::extractor::ContentExtractor;
use crate::fetcher::Fetcher;

/// The two background jobs: a periodic full feed fetch and a faster
/// content extraction pass. Each job is a single task that runs its
/// work to completion before the next tick, so a job never overlaps
/// itself; the jobs are independent of each other and of API calls.
pub struct Scheduler {
    fetcher: Arc<Fetcher>,
    extractor: Arc<ContentExtractor>,
    fetch_interval: Duration,
    extract_interval: Duration,
    extract_batch: i64,
    jobs: Mutex<Option<Jobs>>,
}

struct Jobs {
    cancel: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub fetch_interval_minutes: u64,
    pub extract_interval_seconds: u64,
    pub extract_batch_size: i64,
}

impl Scheduler {
    pub fn new(fetcher: Arc<Fetcher>, extractor: Arc<ContentExtractor>, config: &Config) -> Self {
        Self {
            fetcher,
            extractor,
            fetch_interval: Duration::from_secs(config.fetch_interval_minutes * 60),
            extract_interval: Duration::from_secs(config.extract_interval_seconds),
            extract_batch: config.extract_batch_size,
            jobs: Mutex::new(None),
        }
    }

    /// Spawn both jobs. Returns false when the scheduler is already
    /// running.
    pub async fn start(&self) -> bool {
        let mut jobs = self.jobs.lock().await;
        if jobs.is_some() {
            return false;
        }

        let (cancel, _) = broadcast::channel(1);

        let fetch_handle = tokio::spawn(run_fetch_job(
            self.fetcher.clone(),
            self.fetch_interval,
            cancel.subscribe(),
        ));
        let extract_handle = tokio::spawn(run_extract_job(
            self.extractor.clone(),
            self.extract_interval,
            self.extract_batch,
            cancel.subscribe(),
        ));

        *jobs = Some(Jobs {
            cancel,
            handles: vec![fetch_handle, extract_handle],
        });
        info!("Scheduler started");
        true
    }

    /// Signal both jobs and wait for them to wind down. Returns false
    /// when the scheduler was not running.
    pub async fn stop(&self) -> bool {
        let Some(jobs) = self.jobs.lock().await.take() else {
            return false;
        };

        let _ = jobs.cancel.send(());
        for handle in jobs.handles {
            if let Err(e) = handle.await {
                error!("Scheduler job ended abnormally: {}", e);
            }
        }
        info!("Scheduler stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.jobs.lock().await.is_some()
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running().await,
            fetch_interval_minutes: self.fetch_interval.as_secs() / 60,
            extract_interval_seconds: self.extract_interval.as_secs(),
            extract_batch_size: self.extract_batch,
        }
    }
}

async fn run_fetch_job(
    fetcher: Arc<Fetcher>,
    period: Duration,
    mut cancel: broadcast::Receiver<()>,
) {
    // The first tick completes immediately, giving one fetch at startup
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = fetcher.fetch_all().await {
                    error!("Scheduled feed fetch failed: {}", e);
                }
            }
            _ = cancel.recv() => {
                info!("Feed fetch job stopping");
                break;
            }
        }
    }
}

async fn run_extract_job(
    extractor: Arc<ContentExtractor>,
    period: Duration,
    batch: i64,
    mut cancel: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = extractor.process_pending(batch).await {
                    error!("Scheduled content extraction failed: {}", e);
                }
            }
            _ = cancel.recv() => {
                info!("Content extraction job stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeedConfig, NewsCategory};
    use crate::db::{ArticleFilter, Database};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_test_db() -> Arc<Database> {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        Arc::new(db)
    }

    fn test_config() -> Config {
        Config {
            bind_addr: "127.0.0.1:0".to_string(),
            fetch_interval_minutes: 60,
            extract_interval_seconds: 1,
            extract_batch_size: 20,
            request_timeout_seconds: 5,
            feeds: Vec::new(),
        }
    }

    async fn test_scheduler(db: Arc<Database>) -> Scheduler {
        let config = test_config();
        let fetcher = Arc::new(Fetcher::new(db.clone(), Duration::from_secs(5)).unwrap());
        let extractor = Arc::new(ContentExtractor::new(db).unwrap());
        Scheduler::new(fetcher, extractor, &config)
    }

    #[tokio::test]
    async fn test_start_stop_idempotence() {
        let scheduler = test_scheduler(create_test_db().await).await;

        assert!(!scheduler.is_running().await);
        assert!(scheduler.start().await);
        assert!(scheduler.is_running().await);
        // Second start is a no-op
        assert!(!scheduler.start().await);

        assert!(scheduler.stop().await);
        assert!(!scheduler.is_running().await);
        // Second stop is a no-op
        assert!(!scheduler.stop().await);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let scheduler = test_scheduler(create_test_db().await).await;

        assert!(scheduler.start().await);
        assert!(scheduler.stop().await);
        assert!(scheduler.start().await);
        assert!(scheduler.is_running().await);
        assert!(scheduler.stop().await);
    }

    #[tokio::test]
    async fn test_status_reports_configuration() {
        let scheduler = test_scheduler(create_test_db().await).await;

        let status = scheduler.status().await;
        assert!(!status.running);
        assert_eq!(status.fetch_interval_minutes, 60);
        assert_eq!(status.extract_interval_seconds, 1);
        assert_eq!(status.extract_batch_size, 20);

        scheduler.start().await;
        assert!(scheduler.status().await.running);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_fetch_job_runs_at_startup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(
                    "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>\
                     <title>Feed</title>\
                     <item><title>Story</title><link>https://example.com/1</link></item>\
                     </channel></rss>",
                ),
            )
            .mount(&server)
            .await;

        let db = create_test_db().await;
        db.sync_feeds(&[FeedConfig {
            name: "Feed".to_string(),
            url: format!("{}/rss", server.uri()),
            category: NewsCategory::Tech,
            is_active: true,
        }])
        .await
        .unwrap();

        let scheduler = test_scheduler(db.clone()).await;
        scheduler.start().await;

        // The first interval tick fires immediately; give it a moment
        tokio::time::sleep(Duration::from_millis(400)).await;
        scheduler.stop().await;

        let total = db.count_articles(&ArticleFilter::default()).await.unwrap();
        assert_eq!(total, 1);
    }
}
