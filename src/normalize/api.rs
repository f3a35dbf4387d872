use serde_json::Value;

use super::{clean_title, hot_to_string, lookup, NormalizeError};
use crate::db::NewsItem;
use crate::registry::ApiRule;

/// Structured-API response: walk to the items array, map per-platform field
/// paths. Ranks pass through when the source provides them, otherwise the
/// 1-based position in the truncated candidate sequence.
pub fn extract(
    platform_id: &str,
    rule: &ApiRule,
    body: &str,
    limit: usize,
) -> Result<Vec<NewsItem>, NormalizeError> {
    let root: Value = serde_json::from_str(body)?;
    let list = lookup(&root, &rule.items_path)
        .and_then(Value::as_array)
        .ok_or_else(|| NormalizeError::MissingPath(rule.items_path.clone()))?;

    let mut items = Vec::new();
    for (pos, el) in list.iter().take(limit).enumerate() {
        let Some(title) = lookup(el, &rule.title_path)
            .and_then(Value::as_str)
            .and_then(clean_title)
        else {
            continue;
        };
        let url = rule
            .url_paths
            .iter()
            .find_map(|p| lookup(el, p).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .map(str::to_string);
        let rank = rule
            .rank_path
            .as_deref()
            .and_then(|p| lookup(el, p).and_then(Value::as_u64))
            .filter(|r| *r > 0)
            .unwrap_or(pos as u64 + 1) as u32;
        let hot_value = rule
            .hot_path
            .as_deref()
            .and_then(|p| lookup(el, p))
            .map(hot_to_string)
            .unwrap_or_default();

        items.push(NewsItem {
            platform_id: platform_id.to_string(),
            title,
            url,
            rank,
            hot_value,
        });
    }
    Ok(items)
}

// ── Tests ──
