use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::registry::Platform;

/// One normalized trending entry, ready for upsert.
#[derive(Debug, Clone)]
pub struct NewsItem {
    pub platform_id: String,
    pub title: String,
    pub url: Option<String>,
    pub rank: u32,
    pub hot_value: String,
}

/// Opens the database named by DATABASE_URL. The one fatal failure of a run:
/// anything else is contained per platform, but no store means no crawl.
pub fn connect() -> Result<Connection> {
    let path = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set to the sqlite database path"))?;
    let conn =
        Connection::open(&path).with_context(|| format!("opening database at {}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS platforms (
            id      TEXT PRIMARY KEY,
            name    TEXT NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS news_items (
            id               INTEGER PRIMARY KEY,
            platform_id      TEXT NOT NULL REFERENCES platforms(id),
            title            TEXT NOT NULL,
            url              TEXT,
            rank             INTEGER NOT NULL,
            hot_value        TEXT,
            first_crawl_time TEXT NOT NULL,
            last_crawl_time  TEXT NOT NULL,
            crawl_count      INTEGER NOT NULL DEFAULT 1,
            UNIQUE(platform_id, title)
        );
        CREATE INDEX IF NOT EXISTS idx_items_platform_seen
            ON news_items(platform_id, last_crawl_time);
        ",
    )?;
    Ok(())
}

/// Seed or refresh platform rows from the registry table.
pub fn sync_platforms(conn: &Connection, platforms: &[Platform]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO platforms (id, name, enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, enabled = excluded.enabled",
        )?;
        for p in platforms {
            stmt.execute(rusqlite::params![p.id, p.name, p.enabled])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Purge-then-upsert for one platform's batch, one transaction per cycle.
///
/// The purge runs first so a marginally stale row observed this cycle is
/// re-written immediately after; rows untouched by the batch and older than
/// the retention window are gone once the transaction commits. An empty
/// batch is a strict no-op: a failed platform never erodes its own history.
pub fn upsert_items(
    conn: &Connection,
    items: &[NewsItem],
    now: DateTime<Utc>,
    retention: Duration,
) -> Result<usize> {
    let Some(first) = items.first() else {
        return Ok(0);
    };
    let platform_id = first.platform_id.as_str();
    let stamp = format_time(now);
    let cutoff = format_time(now - retention);

    let tx = conn.unchecked_transaction()?;
    {
        tx.execute(
            "DELETE FROM news_items WHERE platform_id = ?1 AND last_crawl_time < ?2",
            rusqlite::params![platform_id, cutoff],
        )?;

        let mut stmt = tx.prepare(
            "INSERT INTO news_items
                 (platform_id, title, url, rank, hot_value,
                  first_crawl_time, last_crawl_time, crawl_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 1)
             ON CONFLICT(platform_id, title) DO UPDATE SET
                 url = excluded.url,
                 rank = excluded.rank,
                 hot_value = excluded.hot_value,
                 last_crawl_time = excluded.last_crawl_time,
                 crawl_count = crawl_count + 1",
        )?;
        for item in items {
            stmt.execute(rusqlite::params![
                item.platform_id,
                item.title,
                item.url,
                item.rank,
                item.hot_value,
                stamp,
            ])?;
        }
    }
    tx.commit()?;
    Ok(items.len())
}

/// UTC wall-clock in sqlite's datetime('now') format; lexicographic order is
/// chronological order, so the retention cutoff is a plain text comparison.
pub fn format_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Stats ──

pub struct PlatformCount {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub items: i64,
    pub last_crawl: Option<String>,
}

pub struct Stats {
    pub platforms: Vec<PlatformCount>,
    pub total_items: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.enabled, COUNT(n.id), MAX(n.last_crawl_time)
         FROM platforms p
         LEFT JOIN news_items n ON n.platform_id = p.id
         GROUP BY p.id
         ORDER BY p.id",
    )?;
    let platforms = stmt
        .query_map([], |row| {
            Ok(PlatformCount {
                id: row.get(0)?,
                name: row.get(1)?,
                enabled: row.get(2)?,
                items: row.get(3)?,
                last_crawl: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let total_items: i64 = conn.query_row("SELECT COUNT(*) FROM news_items", [], |r| r.get(0))?;
    Ok(Stats {
        platforms,
        total_items,
    })
}

// ── Top items ──

pub struct TopRow {
    pub rank: u32,
    pub title: String,
    pub hot_value: String,
    pub url: Option<String>,
    pub crawl_count: i64,
}

/// Ranked items from the platform's most recent cycle. Older retained rows
/// are history, not the current board.
pub fn fetch_top(conn: &Connection, platform_id: &str, limit: usize) -> Result<Vec<TopRow>> {
    let mut stmt = conn.prepare(
        "SELECT rank, title, COALESCE(hot_value, ''), url, crawl_count
         FROM news_items
         WHERE platform_id = ?1
           AND last_crawl_time = (
               SELECT MAX(last_crawl_time) FROM news_items WHERE platform_id = ?1
           )
         ORDER BY rank
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![platform_id, limit], |row| {
            Ok(TopRow {
                rank: row.get(0)?,
                title: row.get(1)?,
                hot_value: row.get(2)?,
                url: row.get(3)?,
                crawl_count: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Tests ──
