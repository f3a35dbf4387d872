use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::fetch::{Fetcher, RetryPolicy};
use crate::normalize;
use crate::registry::Platform;

/// Every scheduling knob of a cycle, explicit so tests can inject zero
/// delays and a short timeout.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_attempts: u32,
    pub backoff_secs: (f64, f64),
    pub request_timeout: Duration,
    /// Fixed minimum spacing between platforms.
    pub platform_delay: Duration,
    /// Random extra on top of the fixed spacing.
    pub delay_jitter: Duration,
    pub per_platform_limit: usize,
    pub retention: chrono::Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: (3.0, 5.0),
            request_timeout: Duration::from_secs(15),
            platform_delay: Duration::from_millis(100),
            delay_jitter: Duration::from_millis(50),
            per_platform_limit: normalize::MAX_ITEMS,
            retention: chrono::Duration::hours(24),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub platforms: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items_written: usize,
    pub elapsed: Duration,
}

/// One full cycle over the enabled platforms, in registry order.
///
/// Per-platform failures (fetch, normalize, persistence) are counted and
/// logged, never propagated: the run completes whatever happens to
/// individual platforms. Failing to build the HTTP client is the only error
/// this returns.
pub async fn run_cycle(
    conn: &Connection,
    platforms: &[Platform],
    cfg: &CrawlConfig,
) -> Result<RunStats> {
    let fetcher = Fetcher::new(
        cfg.request_timeout,
        RetryPolicy {
            max_attempts: cfg.max_attempts,
            backoff_secs: cfg.backoff_secs,
        },
    )?;
    db::sync_platforms(conn, platforms)?;

    let enabled: Vec<&Platform> = platforms.iter().filter(|p| p.enabled).collect();
    let started = Instant::now();
    let mut stats = RunStats {
        platforms: enabled.len(),
        ..Default::default()
    };

    let pb = ProgressBar::new(enabled.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    for (i, platform) in enabled.iter().enumerate() {
        pb.set_message(platform.id.clone());
        info!("{} ({}, {})", platform.name, platform.id, platform.strategy.kind());

        match process_platform(conn, &fetcher, platform, cfg).await {
            Ok(written) => {
                info!("{}: {} items written", platform.id, written);
                stats.succeeded += 1;
                stats.items_written += written;
            }
            Err(e) => {
                warn!("{}: {:#}", platform.id, e);
                stats.failed += 1;
            }
        }

        pb.inc(1);
        if i + 1 < enabled.len() {
            tokio::time::sleep(pace(cfg)).await;
        }
    }
    pb.finish_and_clear();

    stats.elapsed = started.elapsed();
    Ok(stats)
}

/// Fetch, normalize and upsert one platform. An empty item set counts as a
/// failure: nothing was observed, so nothing may touch the stored history.
async fn process_platform(
    conn: &Connection,
    fetcher: &Fetcher,
    platform: &Platform,
    cfg: &CrawlConfig,
) -> Result<usize> {
    let body = fetcher.fetch(platform).await?;
    let items = normalize::normalize(platform, &body, cfg.per_platform_limit)?;
    if items.is_empty() {
        anyhow::bail!("response yielded no usable items");
    }
    let written = db::upsert_items(conn, &items, Utc::now(), cfg.retention)?;
    Ok(written)
}

fn pace(cfg: &CrawlConfig) -> Duration {
    let jitter_ms = cfg.delay_jitter.as_millis() as u64;
    let extra = if jitter_ms > 0 {
        rand::rng().random_range(0..=jitter_ms)
    } else {
        0
    };
    cfg.platform_delay + Duration::from_millis(extra)
}

pub fn print_summary(stats: &RunStats) {
    println!("\n{}", "=".repeat(50));
    println!("Crawl finished");
    println!(
        "  platforms: {} ({} ok, {} failed)",
        stats.platforms, stats.succeeded, stats.failed
    );
    println!("  items written: {}", stats.items_written);
    println!("  elapsed: {:.1}s", stats.elapsed.as_secs_f64());
    println!("{}", "=".repeat(50));
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ApiRule, HtmlRule, Strategy};
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn test_cfg() -> CrawlConfig {
        CrawlConfig {
            max_attempts: 2,
            backoff_secs: (0.0, 0.0),
            request_timeout: Duration::from_secs(2),
            platform_delay: Duration::ZERO,
            delay_jitter: Duration::ZERO,
            ..Default::default()
        }
    }

    fn api_platform(id: &str, endpoint: String) -> Platform {
        Platform {
            id: id.into(),
            name: id.into(),
            enabled: true,
            max_attempts: None,
            strategy: Strategy::Api(ApiRule {
                endpoint,
                items_path: "items".into(),
                title_path: "title".into(),
                url_paths: vec!["url".into()],
                rank_path: Some("rank".into()),
                hot_path: Some("hot".into()),
            }),
        }
    }

    fn html_platform(id: &str, endpoint: String) -> Platform {
        Platform {
            id: id.into(),
            name: id.into(),
            enabled: true,
            max_attempts: None,
            strategy: Strategy::HtmlScrape(HtmlRule {
                endpoint,
                row_selector: "table tbody tr".into(),
                title_selector: "td.td-02 a".into(),
                hot_selector: Some("td.td-03".into()),
                url_base: None,
            }),
        }
    }

    /// Serves the same canned body to every connection until the test ends.
    fn serve_forever(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut sock) = stream else { break };
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf);
                let resp = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes());
            }
        });
        format!("http://{}/", addr)
    }

    fn dead_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/", addr)
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn count(conn: &Connection, platform_id: &str) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM news_items WHERE platform_id = ?1",
            [platform_id],
            |r| r.get(0),
        )
        .unwrap()
    }

    const THREE_ITEMS: &str = r#"{"items":[
        {"title":"一号","url":"https://a/1","rank":1,"hot":"500万"},
        {"title":"二号","url":"https://a/2","rank":2,"hot":"300万"},
        {"title":"三号","url":"https://a/3","rank":3,"hot":"100万"}
    ]}"#;

    #[tokio::test]
    async fn one_dead_platform_does_not_block_the_rest() {
        let conn = test_conn();
        let platforms = vec![
            api_platform("alpha", serve_forever(THREE_ITEMS)),
            api_platform("beta", dead_endpoint()),
        ];

        let stats = run_cycle(&conn, &platforms, &test_cfg()).await.unwrap();

        assert_eq!(stats.platforms, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded + stats.failed, stats.platforms);
        assert_eq!(stats.items_written, 3);
        assert_eq!(count(&conn, "alpha"), 3);
        assert_eq!(count(&conn, "beta"), 0);
    }

    #[tokio::test]
    async fn unchanged_payload_twice_leaves_counted_rows() {
        let conn = test_conn();
        let platforms = vec![api_platform("alpha", serve_forever(THREE_ITEMS))];

        run_cycle(&conn, &platforms, &test_cfg()).await.unwrap();
        run_cycle(&conn, &platforms, &test_cfg()).await.unwrap();

        assert_eq!(count(&conn, "alpha"), 3);
        let counts: Vec<i64> = conn
            .prepare("SELECT crawl_count FROM news_items WHERE platform_id = 'alpha'")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(counts, vec![2, 2, 2]);
    }

    #[tokio::test]
    async fn malformed_response_counts_as_failure_without_writes() {
        let conn = test_conn();
        // The ranked-list container is missing: normalize fails, nothing is
        // written and no purge runs.
        let platforms = vec![html_platform(
            "gamma",
            serve_forever("<html><body><p>改版了</p></body></html>"),
        )];

        let stats = run_cycle(&conn, &platforms, &test_cfg()).await.unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.items_written, 0);
        assert_eq!(count(&conn, "gamma"), 0);
    }

    #[tokio::test]
    async fn disabled_platforms_are_skipped() {
        let conn = test_conn();
        let mut off = api_platform("omega", dead_endpoint());
        off.enabled = false;
        let platforms = vec![api_platform("alpha", serve_forever(THREE_ITEMS)), off];

        let stats = run_cycle(&conn, &platforms, &test_cfg()).await.unwrap();

        assert_eq!(stats.platforms, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn pace_respects_fixed_baseline() {
        let mut cfg = test_cfg();
        cfg.platform_delay = Duration::from_millis(100);
        cfg.delay_jitter = Duration::from_millis(50);
        for _ in 0..20 {
            let d = pace(&cfg);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(150));
        }
    }
}
