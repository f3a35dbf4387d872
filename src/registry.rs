use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// One external source of trending content.
#[derive(Debug, Clone, Deserialize)]
pub struct Platform {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the global retry budget for this platform.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    pub strategy: Strategy,
}

/// How a platform's ranked list is retrieved and where the fields live.
/// Divergent upstream variants differ only in endpoints and field names,
/// so the whole mapping is data, not code.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    Api(ApiRule),
    HtmlScrape(HtmlRule),
    EmbeddedJson(EmbeddedRule),
}

impl Strategy {
    pub fn endpoint(&self) -> &str {
        match self {
            Strategy::Api(r) => &r.endpoint,
            Strategy::HtmlScrape(r) => &r.endpoint,
            Strategy::EmbeddedJson(r) => &r.endpoint,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::Api(_) => "api",
            Strategy::HtmlScrape(_) => "html_scrape",
            Strategy::EmbeddedJson(_) => "embedded_json",
        }
    }
}

/// Structured JSON endpoint. Paths are dot-separated object keys.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRule {
    pub endpoint: String,
    /// Path to the items array, e.g. "data.list".
    pub items_path: String,
    pub title_path: String,
    /// Candidate url fields, first non-empty wins.
    #[serde(default)]
    pub url_paths: Vec<String>,
    #[serde(default)]
    pub rank_path: Option<String>,
    #[serde(default)]
    pub hot_path: Option<String>,
}

/// Rendered HTML page scraped with CSS selectors.
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlRule {
    pub endpoint: String,
    /// Selects one ranked row each, e.g. "table tbody tr".
    pub row_selector: String,
    /// Within a row: link text is the title, href the url.
    pub title_selector: String,
    /// Within a row: text of the popularity cell.
    #[serde(default)]
    pub hot_selector: Option<String>,
    /// Prefixed onto relative hrefs.
    #[serde(default)]
    pub url_base: Option<String>,
}

/// JSON payload embedded in an HTML page behind a marker comment.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddedRule {
    pub endpoint: String,
    /// Regex with one capture group around the JSON payload.
    pub marker: String,
    /// Path to the cards array inside the payload, e.g. "data.cards".
    pub cards_path: String,
    /// `type` value of the ranked-list card.
    pub card_type: String,
    /// Field of the card holding the item array.
    pub items_field: String,
    pub title_field: String,
    #[serde(default)]
    pub url_field: Option<String>,
    #[serde(default)]
    pub hot_field: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct PlatformFile {
    #[serde(default)]
    platforms: Vec<Platform>,
}

/// Load a platform table from a TOML file, replacing the built-in table.
pub fn load(path: &Path) -> Result<Vec<Platform>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading platform config {}", path.display()))?;
    let file: PlatformFile = toml::from_str(&raw)
        .with_context(|| format!("parsing platform config {}", path.display()))?;
    anyhow::ensure!(
        !file.platforms.is_empty(),
        "platform config {} defines no platforms",
        path.display()
    );
    Ok(file.platforms)
}

/// Built-in platform table. Direct endpoints where the platform tolerates
/// them, the aggregator API for the rest.
pub fn builtin() -> Vec<Platform> {
    vec![
        Platform {
            id: "weibo".into(),
            name: "微博热搜".into(),
            enabled: true,
            max_attempts: Some(1),
            strategy: Strategy::HtmlScrape(HtmlRule {
                endpoint: "https://s.weibo.com/top/summary".into(),
                row_selector: "table tbody tr".into(),
                title_selector: "td.td-02 a".into(),
                hot_selector: Some("td.td-03".into()),
                url_base: Some("https://s.weibo.com".into()),
            }),
        },
        Platform {
            id: "zhihu".into(),
            name: "知乎热榜".into(),
            enabled: true,
            max_attempts: None,
            strategy: Strategy::Api(ApiRule {
                endpoint: "https://www.zhihu.com/api/v3/feed/topstory/hot-lists/total".into(),
                items_path: "data".into(),
                title_path: "target.title".into(),
                url_paths: vec!["target.url".into()],
                rank_path: None,
                hot_path: Some("detail_text".into()),
            }),
        },
        Platform {
            id: "bilibili".into(),
            name: "B站热门".into(),
            enabled: true,
            max_attempts: None,
            strategy: Strategy::Api(ApiRule {
                endpoint: "https://api.bilibili.com/x/web-interface/popular".into(),
                items_path: "data.list".into(),
                title_path: "title".into(),
                url_paths: vec!["short_link_v2".into()],
                rank_path: None,
                hot_path: Some("stat.view".into()),
            }),
        },
        Platform {
            id: "baidu".into(),
            name: "百度热搜".into(),
            enabled: true,
            max_attempts: Some(1),
            strategy: Strategy::EmbeddedJson(EmbeddedRule {
                endpoint: "https://top.baidu.com/board?tab=realtime".into(),
                marker: r"(?s)<!--s-data:(.*?)-->".into(),
                cards_path: "data.cards".into(),
                card_type: "toplist1".into(),
                items_field: "content".into(),
                title_field: "word".into(),
                url_field: Some("url".into()),
                hot_field: Some("hotScore".into()),
            }),
        },
        Platform {
            id: "douyin".into(),
            name: "抖音热榜".into(),
            enabled: true,
            max_attempts: None,
            strategy: Strategy::Api(ApiRule {
                endpoint: "https://newsnow.busiyi.world/api/s?id=douyin&latest".into(),
                items_path: "items".into(),
                title_path: "title".into(),
                url_paths: vec!["url".into(), "mobileUrl".into()],
                rank_path: Some("rank".into()),
                hot_path: Some("extra.hot".into()),
            }),
        },
        Platform {
            id: "toutiao".into(),
            name: "今日头条".into(),
            enabled: true,
            max_attempts: None,
            strategy: Strategy::Api(ApiRule {
                endpoint: "https://newsnow.busiyi.world/api/s?id=toutiao&latest".into(),
                items_path: "items".into(),
                title_path: "title".into(),
                url_paths: vec!["url".into(), "mobileUrl".into()],
                rank_path: Some("rank".into()),
                hot_path: Some("extra.hot".into()),
            }),
        },
    ]
}

// ── Tests ──
