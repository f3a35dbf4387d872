mod api;
mod embedded;
mod html;

use serde_json::Value;
use thiserror::Error;

use crate::db::NewsItem;
use crate::registry::{Platform, Strategy};

/// Per-platform cap on candidates per cycle. Bounds row growth and the cost
/// of everything downstream.
pub const MAX_ITEMS: usize = 20;

/// The response arrived but its expected structure didn't. Never retried and
/// never fatal: the orchestrator logs it and the platform scores a failure
/// for the cycle.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected structure missing at `{0}`")]
    MissingPath(String),
    #[error("invalid selector `{0}`")]
    Selector(String),
    #[error("no rows matched `{0}`")]
    NoRows(String),
    #[error("marker pattern matched nothing")]
    MarkerNotFound,
    #[error("invalid marker pattern: {0}")]
    Pattern(String),
    #[error("no `{0}` card in embedded payload")]
    CardNotFound(String),
}

/// Raw platform response → canonical ranked items, per the platform's
/// strategy. At most `limit` candidates are considered; candidates with an
/// empty or numeric-only title are dropped.
pub fn normalize(
    platform: &Platform,
    body: &str,
    limit: usize,
) -> Result<Vec<NewsItem>, NormalizeError> {
    match &platform.strategy {
        Strategy::Api(rule) => api::extract(&platform.id, rule, body, limit),
        Strategy::HtmlScrape(rule) => html::extract(&platform.id, rule, body, limit),
        Strategy::EmbeddedJson(rule) => embedded::extract(&platform.id, rule, body, limit),
    }
}

/// Trimmed, non-empty, non-numeric titles only. A title that parses as a
/// bare number is platform noise, not text.
pub(crate) fn clean_title(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() || t.parse::<f64>().is_ok() {
        return None;
    }
    Some(t.to_string())
}

/// Walk a dot-separated object path.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}

/// Popularity signals come back as strings or numbers depending on the
/// platform; stored as opaque text either way.
pub(crate) fn hot_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

// ── Tests ──
