use regex::Regex;
use serde_json::Value;

use super::{clean_title, hot_to_string, lookup, NormalizeError};
use crate::db::NewsItem;
use crate::registry::EmbeddedRule;

/// Embedded-JSON response: the page carries its data inside a marker comment.
/// Capture the payload, decode it, and walk the cards array to the
/// ranked-list card.
pub fn extract(
    platform_id: &str,
    rule: &EmbeddedRule,
    body: &str,
    limit: usize,
) -> Result<Vec<NewsItem>, NormalizeError> {
    let marker = Regex::new(&rule.marker).map_err(|e| NormalizeError::Pattern(e.to_string()))?;
    let caps = marker.captures(body).ok_or(NormalizeError::MarkerNotFound)?;
    let payload = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

    let data: Value = serde_json::from_str(payload)?;
    let cards = lookup(&data, &rule.cards_path)
        .and_then(Value::as_array)
        .ok_or_else(|| NormalizeError::MissingPath(rule.cards_path.clone()))?;
    let card = cards
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(rule.card_type.as_str()))
        .ok_or_else(|| NormalizeError::CardNotFound(rule.card_type.clone()))?;
    let content = card
        .get(&rule.items_field)
        .and_then(Value::as_array)
        .ok_or_else(|| NormalizeError::MissingPath(rule.items_field.clone()))?;

    let mut items = Vec::new();
    for (pos, el) in content.iter().take(limit).enumerate() {
        let Some(title) = el
            .get(&rule.title_field)
            .and_then(Value::as_str)
            .and_then(clean_title)
        else {
            continue;
        };
        let url = rule
            .url_field
            .as_deref()
            .and_then(|f| el.get(f).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let hot_value = rule
            .hot_field
            .as_deref()
            .and_then(|f| el.get(f))
            .map(hot_to_string)
            .unwrap_or_default();

        items.push(NewsItem {
            platform_id: platform_id.to_string(),
            title,
            url,
            rank: pos as u32 + 1,
            hot_value,
        });
    }
    Ok(items)
}

// ── Tests ──
