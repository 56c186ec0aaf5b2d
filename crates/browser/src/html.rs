//! HTML-to-Markdown conversion for rendered assistant replies.

/// Convert an HTML fragment to clean Markdown using htmd.
///
/// Drops script/style/nav chrome the chat UI may render inside a message
/// (copy buttons, toolbars) and keeps headings, links, lists, tables, code
/// blocks and emphasis.
pub fn html_to_markdown(html: &str) -> String {
    use htmd::HtmlToMarkdown;

    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "button", "svg", "noscript", "iframe"])
        .build();

    match converter.convert(html) {
        Ok(md) => md.trim().to_string(),
        Err(_) => extract_text_fallback(html),
    }
}

/// Plain-text extraction with scraper, used when htmd rejects the input.
fn extract_text_fallback(html: &str) -> String {
    let fragment = scraper::Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
