//! Text extraction from HTML fragments.

use scraper::{Html, Node};

/// Split an HTML fragment into the text of its text nodes, in document order.
///
/// Tags are treated as boundaries, so `<p>First <b>bold</b> text</p>` yields
/// `["First", "bold", "text"]`. Text is trimmed and empty pieces are dropped.
/// The fragment is parsed the way a browser would: stray `&` and `<`,
/// unquoted attributes and unclosed tags are accepted, and named and numeric
/// character references are decoded.
pub fn html_fragment_to_list(fragment: &str) -> Vec<String> {
    let document = Html::parse_fragment(fragment);

    document
        .tree
        .root()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            _ => None,
        })
        .collect()
}
