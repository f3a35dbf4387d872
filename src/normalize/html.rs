use scraper::{Html, Selector};

use super::{clean_title, NormalizeError};
use crate::db::NewsItem;
use crate::registry::HtmlRule;

/// HTML-scrape response: rows by CSS selector, link text as title, href as
/// url, an adjacent cell's text as the popularity signal. A candidate is a
/// row that contains the title link; the first `limit` candidates count.
pub fn extract(
    platform_id: &str,
    rule: &HtmlRule,
    body: &str,
    limit: usize,
) -> Result<Vec<NewsItem>, NormalizeError> {
    let row_sel = parse_selector(&rule.row_selector)?;
    let title_sel = parse_selector(&rule.title_selector)?;
    let hot_sel = rule
        .hot_selector
        .as_deref()
        .map(parse_selector)
        .transpose()?;

    let doc = Html::parse_document(body);
    let mut items = Vec::new();
    let mut pos = 0usize;

    for row in doc.select(&row_sel) {
        let Some(link) = row.select(&title_sel).next() else {
            continue;
        };
        pos += 1;
        if pos > limit {
            break;
        }
        let Some(title) = clean_title(&link.text().collect::<String>()) else {
            continue;
        };
        let url = link
            .value()
            .attr("href")
            .filter(|h| !h.is_empty())
            .map(|h| absolutize(h, rule.url_base.as_deref()));
        let hot_value = hot_sel
            .as_ref()
            .and_then(|s| row.select(s).next())
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        items.push(NewsItem {
            platform_id: platform_id.to_string(),
            title,
            url,
            rank: pos as u32,
            hot_value,
        });
    }

    if pos == 0 {
        return Err(NormalizeError::NoRows(rule.row_selector.clone()));
    }
    Ok(items)
}

fn absolutize(href: &str, base: Option<&str>) -> String {
    match base {
        Some(b) if href.starts_with('/') => format!("{}{}", b, href),
        _ => href.to_string(),
    }
}

fn parse_selector(s: &str) -> Result<Selector, NormalizeError> {
    Selector::parse(s).map_err(|e| NormalizeError::Selector(format!("{}: {}", s, e)))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> HtmlRule {
        HtmlRule {
            endpoint: "https://example.com/top/summary".into(),
            row_selector: "table tbody tr".into(),
            title_selector: "td.td-02 a".into(),
            hot_selector: Some("td.td-03".into()),
            url_base: Some("https://example.com".into()),
        }
    }

    fn board(rows: &str) -> String {
        format!("<html><body><table><tbody>{}</tbody></table></body></html>", rows)
    }

    #[test]
    fn extracts_title_href_and_hot_cell() {
        let html = board(
            r#"
            <tr><td class="td-01">1</td>
                <td class="td-02"><a href="/weibo?q=one">第一条</a></td>
                <td class="td-03">沸 4821万</td></tr>
            <tr><td class="td-01">2</td>
                <td class="td-02"><a href="https://other.example/two">第二条</a></td>
                <td class="td-03">热 120万</td></tr>
        "#,
        );
        let items = extract("weibo", &rule(), &html, 20).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "第一条");
        assert_eq!(items[0].url.as_deref(), Some("https://example.com/weibo?q=one"));
        assert_eq!(items[0].hot_value, "沸 4821万");
        assert_eq!(items[0].rank, 1);
        // Absolute hrefs pass through untouched.
        assert_eq!(items[1].url.as_deref(), Some("https://other.example/two"));
        assert_eq!(items[1].rank, 2);
    }

    #[test]
    fn rows_without_title_link_are_not_candidates() {
        let html = board(
            r#"
            <tr><td class="td-02">广告位，无链接</td></tr>
            <tr><td class="td-02"><a href="/q">正文</a></td><td class="td-03">99万</td></tr>
        "#,
        );
        let items = extract("weibo", &rule(), &html, 20).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].rank, 1, "skipped row does not consume a rank");
    }

    #[test]
    fn caps_candidates_at_limit() {
        let rows: String = (0..30)
            .map(|i| {
                format!(
                    r#"<tr><td class="td-02"><a href="/q{i}">条目{i}</a></td><td class="td-03">{i}万</td></tr>"#
                )
            })
            .collect();
        let items = extract("weibo", &rule(), &board(&rows), 20).unwrap();
        assert_eq!(items.len(), 20);
        assert_eq!(items.last().unwrap().rank, 20);
    }

    #[test]
    fn numeric_only_link_text_is_dropped_but_keeps_its_slot() {
        let html = board(
            r#"
            <tr><td class="td-02"><a href="/a">1024</a></td><td class="td-03">x</td></tr>
            <tr><td class="td-02"><a href="/b">真标题</a></td><td class="td-03">y</td></tr>
        "#,
        );
        let items = extract("weibo", &rule(), &html, 20).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "真标题");
        assert_eq!(items[0].rank, 2, "rank reflects board position");
    }

    #[test]
    fn missing_container_is_an_error() {
        let err = extract("weibo", &rule(), "<html><body><p>改版了</p></body></html>", 20)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::NoRows(_)));
    }

    #[test]
    fn missing_hot_cell_yields_empty_signal() {
        let html = board(r#"<tr><td class="td-02"><a href="/q">标题</a></td></tr>"#);
        let items = extract("weibo", &rule(), &html, 20).unwrap();
        assert_eq!(items[0].hot_value, "");
    }
}
