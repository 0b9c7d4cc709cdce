//! Full integration tests exercising all features together.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use strata_config::core::Table;
use strata_config::prelude::*;
use strata_config::sources::table_from_json;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
struct IntegrationConfig {
    #[validate(nested)]
    server: ServerConfig,
    #[validate(nested)]
    db: DatabaseConfig,
}

#[derive(Debug, Deserialize, Validate)]
struct ServerConfig {
    #[validate(range(min = 1024, max = 65535))]
    port: u16,
}

#[derive(Debug, Deserialize, Validate)]
struct DatabaseConfig {
    #[validate(range(min = 1))]
    port: u16,
}

/// Serves whatever payload the test last put in it.
#[derive(Clone)]
struct SharedFetcher {
    payload: Arc<Mutex<JsonValue>>,
    calls: Arc<AtomicUsize>,
}

impl SharedFetcher {
    fn new(payload: JsonValue) -> Self {
        Self {
            payload: Arc::new(Mutex::new(payload)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn set(&self, payload: JsonValue) {
        *self.payload.lock() = payload;
    }
}

#[async_trait]
impl RemoteFetcher for SharedFetcher {
    async fn fetch(&self, _provider: &RemoteProvider) -> Result<Table> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        table_from_json(self.payload.lock().clone())
    }
}

struct StalledFetcher;

#[async_trait]
impl RemoteFetcher for StalledFetcher {
    async fn fetch(&self, _provider: &RemoteProvider) -> Result<Table> {
        sleep(Duration::from_secs(3600)).await;
        Ok(Table::new())
    }
}

fn etcd() -> RemoteProvider {
    RemoteProvider::new("etcd", "localhost:2379", "/myapp/config")
}

fn remote_manager(fetcher: SharedFetcher, policy: ReloadPolicy) -> ConfigManager<IntegrationConfig> {
    ConfigManager::builder()
        .with_remote_provider(etcd())
        .with_remote_fetcher(fetcher)
        .with_watcher(true)
        .with_poll_interval(Duration::from_millis(50))
        .with_default("db.port", 5432)
        .with_reload_policy(policy)
        .with_schema::<IntegrationConfig>()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_end_to_end_defaults_and_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "server:\n  port: 8080\n").unwrap();

    let config = ConfigManager::builder()
        .with_file(&config_path)
        .with_default("server.port", 9999)
        .with_default("db.port", 5432)
        .with_schema::<IntegrationConfig>()
        .build()
        .unwrap();
    config.load().await.unwrap();

    assert_eq!(config.get_int("server.port"), 8080);
    assert_eq!(config.get_int("db.port"), 5432);

    let schema = config.get_schema().unwrap();
    assert_eq!(schema.server.port, 8080);
    assert_eq!(schema.db.port, 5432);
}

#[tokio::test]
async fn test_failed_load_keeps_last_known_good() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "server:\n  port: 8080\ndb:\n  port: 5432\n").unwrap();

    let config = ConfigManager::builder()
        .with_file(&config_path)
        .with_schema::<IntegrationConfig>()
        .build()
        .unwrap();
    config.load().await.unwrap();

    // Port below the allowed range
    fs::write(&config_path, "server:\n  port: 80\ndb:\n  port: 5433\n").unwrap();
    let err = config.load().await.unwrap_err();
    assert_eq!(err.as_validation().unwrap().field, "server.port");

    assert_eq!(config.get_int("server.port"), 8080);
    assert_eq!(config.get_int("db.port"), 5432);
    assert_eq!(config.get_schema().unwrap().server.port, 8080);

    // Malformed content
    fs::write(&config_path, "server: [").unwrap();
    assert!(matches!(config.load().await, Err(ConfigError::ParseError(_))));
    assert_eq!(config.get_int("server.port"), 8080);

    fs::write(&config_path, "server:\n  port: 9090\ndb:\n  port: 5432\n").unwrap();
    config.load().await.unwrap();
    assert_eq!(config.get_schema().unwrap().server.port, 9090);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_during_reload() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "server:\n  port: 8080\n  mirror: 8080\n").unwrap();

    let config = ConfigManager::builder().with_file(&config_path).build().unwrap();
    config.load().await.unwrap();

    let mut readers = Vec::new();
    for _ in 0..100 {
        let config = config.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let settings = config.all_settings();
                let server = settings["server"].clone().into_table().unwrap();
                let port = server["port"].clone().into_int().unwrap();
                let mirror = server["mirror"].clone().into_int().unwrap();
                assert_eq!(port, mirror, "observed a partially applied load");
                assert!(port == 8080 || port == 9090);
                tokio::task::yield_now().await;
            }
        }));
    }

    for i in 0..20 {
        let port = if i % 2 == 0 { 9090 } else { 8080 };
        fs::write(
            &config_path,
            format!("server:\n  port: {port}\n  mirror: {port}\n"),
        )
        .unwrap();
        config.load().await.unwrap();
    }

    for reader in readers {
        reader.await.unwrap();
    }
}

#[tokio::test]
async fn test_file_watch_reloads_before_notify() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "server:\n  port: 8080\n").unwrap();

    let config = ConfigManager::builder()
        .with_file(&config_path)
        .with_debounce(Duration::from_millis(50))
        .build()
        .unwrap();
    config.load().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = config.clone();
    config
        .watch(CancellationToken::new(), move || {
            let _ = tx.send(handle.get_int("server.port"));
        })
        .unwrap();

    sleep(Duration::from_millis(100)).await;
    fs::write(&config_path, "server:\n  port: 9090\n").unwrap();

    let port = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(port, Some(9090));

    config.close().unwrap();
}

#[tokio::test]
async fn test_watch_cancellation_stops_notifications() {
    let fetcher = SharedFetcher::new(json!({"server": {"port": 8080}}));
    let config = remote_manager(fetcher, ReloadPolicy::NotifyOnFailure);
    config.load().await.unwrap();

    let token = CancellationToken::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    config
        .watch(token.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    sleep(Duration::from_millis(300)).await;
    assert!(count.load(Ordering::SeqCst) > 0);

    token.cancel();
    sleep(Duration::from_millis(100)).await;
    let settled = count.load(Ordering::SeqCst);
    sleep(Duration::from_millis(300)).await;
    assert_eq!(count.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn test_close_stops_watchers() {
    let fetcher = SharedFetcher::new(json!({"server": {"port": 8080}}));
    let config = remote_manager(fetcher.clone(), ReloadPolicy::NotifyOnFailure);
    config.load().await.unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    config
        .watch(CancellationToken::new(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    sleep(Duration::from_millis(300)).await;
    config.close().unwrap();
    sleep(Duration::from_millis(100)).await;

    let notified = count.load(Ordering::SeqCst);
    let polled = fetcher.calls.load(Ordering::SeqCst);
    sleep(Duration::from_millis(300)).await;

    assert_eq!(count.load(Ordering::SeqCst), notified);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), polled);
    assert!(matches!(
        config.watch(CancellationToken::new(), || {}),
        Err(ConfigError::Closed)
    ));
}

#[tokio::test]
async fn test_multiple_subscriptions() {
    let fetcher = SharedFetcher::new(json!({"server": {"port": 8080}}));
    let config = remote_manager(fetcher, ReloadPolicy::NotifyOnFailure);
    config.load().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    for id in 0..2 {
        let tx = tx.clone();
        config
            .watch(CancellationToken::new(), move || {
                let _ = tx.send(id);
            })
            .unwrap();
    }

    let mut seen = [false; 2];
    let all_seen = timeout(Duration::from_secs(5), async {
        while let Some(id) = rx.recv().await {
            seen[id] = true;
            if seen.iter().all(|s| *s) {
                break;
            }
        }
    })
    .await;
    assert!(all_seen.is_ok());

    config.close().unwrap();
}

#[tokio::test]
async fn test_remote_load_and_watch() {
    let fetcher = SharedFetcher::new(json!({"server": {"port": 8080}}));
    let config = remote_manager(fetcher.clone(), ReloadPolicy::NotifyOnFailure);
    config.load().await.unwrap();

    assert_eq!(config.get_int("server.port"), 8080);
    assert_eq!(config.get_int("db.port"), 5432);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = config.clone();
    config
        .watch(CancellationToken::new(), move || {
            let _ = tx.send(handle.get_schema().map(|s| s.server.port));
        })
        .unwrap();

    fetcher.set(json!({"server": {"port": 9090}}));

    let reloaded = timeout(Duration::from_secs(5), async {
        while let Some(port) = rx.recv().await {
            if port == Some(9090) {
                return true;
            }
        }
        false
    })
    .await;
    assert_eq!(reloaded.ok(), Some(true));

    config.close().unwrap();
}

#[tokio::test]
async fn test_notify_on_failure_keeps_last_known_good() {
    let fetcher = SharedFetcher::new(json!({"server": {"port": 8080}}));
    let config = remote_manager(fetcher.clone(), ReloadPolicy::NotifyOnFailure);
    config.load().await.unwrap();

    // Out of range for the schema
    fetcher.set(json!({"server": {"port": 80}}));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = config.clone();
    config
        .watch(CancellationToken::new(), move || {
            let _ = tx.send(handle.get_int("server.port"));
        })
        .unwrap();

    let port = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(port, Some(8080));

    config.close().unwrap();
}

#[tokio::test]
async fn test_skip_on_failure_suppresses_notify() {
    let fetcher = SharedFetcher::new(json!({"server": {"port": 8080}}));
    let config = remote_manager(fetcher.clone(), ReloadPolicy::SkipOnFailure);
    config.load().await.unwrap();

    fetcher.set(json!({"server": {"port": 80}}));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = config.clone();
    config
        .watch(CancellationToken::new(), move || {
            let _ = tx.send(handle.get_int("server.port"));
        })
        .unwrap();

    // Several failed reloads, no notification
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
    assert_eq!(config.get_int("server.port"), 8080);

    fetcher.set(json!({"server": {"port": 9090}}));
    let port = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(port, Some(9090));

    config.close().unwrap();
}

#[tokio::test]
async fn test_remote_timeout() {
    let config = ConfigManager::builder()
        .with_remote_provider(etcd())
        .with_remote_fetcher(StalledFetcher)
        .with_remote_timeout(Duration::from_millis(50))
        .with_default("server.port", 9999)
        .build()
        .unwrap();

    let started = Instant::now();
    let err = config.load().await.unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(1));
    // Nothing was published
    assert!(!config.is_set("server.port"));
}

#[tokio::test]
async fn test_remote_non_object_payload() {
    let fetcher = SharedFetcher::new(json!(["not", "an", "object"]));
    let config = ConfigManager::builder()
        .with_remote_provider(etcd())
        .with_remote_fetcher(fetcher)
        .build()
        .unwrap();

    assert!(matches!(
        config.load().await,
        Err(ConfigError::DeserializationError(_))
    ));
}
