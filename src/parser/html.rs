//! HTML reduction: sniffing, tag stripping, and link shedding.
//!
//! Body text headed for the full-text index is plain text. HTML that
//! arrives disguised as `text/plain` is detected by marker sniffing and
//! converted; HTML-only messages are back-filled through the same
//! conversion so `content_text` is always searchable.

/// Placeholder substituted for stripped URLs.
pub const LINK_PLACEHOLDER: &str = "[link]";

/// Case-insensitive markers that flag a "plain text" part as HTML.
const HTML_MARKERS: [&str; 4] = ["<html", "<head", "<meta", "<img"];

/// Whether a nominally plain-text body looks like HTML.
pub fn looks_like_html(text: &str) -> bool {
    let lower = text.to_lowercase();
    HTML_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Convert a plain-text candidate for storage: HTML in disguise is
/// stripped of images and converted, real plain text passes unchanged.
pub fn sniff_and_convert(text: &str) -> String {
    if looks_like_html(text) {
        html_to_text(&strip_images(text))
    } else {
        text.to_string()
    }
}

/// Convert HTML to plain text in single-line-break mode.
///
/// Images, links, tables and emphasis are dropped, not rendered; block
/// elements become one line break; scripts, styles and all remaining tags
/// are removed; common entities are decoded.
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();

    text = remove_tag_block(&text, "script");
    text = remove_tag_block(&text, "style");

    // Block elements become single line breaks
    for tag in &["br", "BR", "br/", "br /"] {
        text = text.replace(&format!("<{tag}>"), "\n");
    }
    for tag in &["p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6"] {
        text = text.replace(&format!("<{tag}>"), "\n");
        text = text.replace(&format!("<{tag} "), "\n<");
        let upper = tag.to_uppercase();
        text = text.replace(&format!("<{upper}>"), "\n");
        text = text.replace(&format!("</{tag}>"), "\n");
        text = text.replace(&format!("</{upper}>"), "\n");
    }

    // Strip all remaining tags
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    // Decode common entities
    result = result.replace("&amp;", "&");
    result = result.replace("&lt;", "<");
    result = result.replace("&gt;", ">");
    result = result.replace("&quot;", "\"");
    result = result.replace("&#39;", "'");
    result = result.replace("&apos;", "'");
    result = result.replace("&nbsp;", " ");
    result = result.replace("&#160;", " ");

    // Single-line-break mode: collapse blank runs to one newline
    let mut cleaned = String::with_capacity(result.len());
    let mut prev_was_blank = false;
    for line in result.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank && !cleaned.is_empty() {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim_end().to_string()
}

/// Remove `<img …>` tags before conversion.
fn strip_images(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut remaining = html;

    while let Some(start) = find_ci(remaining, "<img") {
        result.push_str(&remaining[..start]);
        let after = &remaining[start..];
        match after.find('>') {
            Some(end) => remaining = &after[end + 1..],
            None => {
                remaining = "";
                break;
            }
        }
    }
    result.push_str(remaining);
    result
}

/// Remove an entire tag block (e.g. `<script>…</script>`).
fn remove_tag_block(html: &str, tag: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut remaining = html;
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    while let Some(start) = find_ci(remaining, &open) {
        result.push_str(&remaining[..start]);
        let after = &remaining[start..];
        if let Some(end) = find_ci(after, &close) {
            remaining = &after[end + close.len()..];
        } else {
            // No closing tag, remove the rest
            remaining = "";
            break;
        }
    }
    result.push_str(remaining);
    result
}

/// Case-insensitive substring search returning a byte offset.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_lowercase().find(&needle.to_lowercase())
}

/// Shed bytes from a link-heavy body: every whitespace-delimited token
/// starting with `http` becomes [`LINK_PLACEHOLDER`]. Whitespace and all
/// other tokens are preserved as-is.
pub fn strip_links(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut token = String::new();

    let mut flush = |token: &mut String, result: &mut String| {
        if token.starts_with("http") {
            result.push_str(LINK_PLACEHOLDER);
        } else {
            result.push_str(token);
        }
        token.clear();
    };

    for ch in text.chars() {
        if ch.is_whitespace() {
            flush(&mut token, &mut result);
            result.push(ch);
        } else {
            token.push(ch);
        }
    }
    flush(&mut token, &mut result);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<HTML><body>hi</body>"));
        assert!(looks_like_html("hello <img src=\"x\"> world"));
        assert!(looks_like_html("<meta charset=\"utf-8\">"));
        assert!(!looks_like_html("plain text with < and > signs"));
    }

    #[test]
    fn test_sniff_passthrough() {
        let text = "Just a normal body.\nSecond line.";
        assert_eq!(sniff_and_convert(text), text);
    }

    #[test]
    fn test_sniff_converts_disguised_html() {
        let text = "<html><body><p>Hello <b>world</b></p></body></html>";
        let converted = sniff_and_convert(text);
        assert!(converted.contains("Hello world"));
        assert!(!converted.contains('<'));
    }

    #[test]
    fn test_html_to_text_basic() {
        let text = html_to_text("<p>Hello <b>world</b></p><p>Second paragraph</p>");
        assert!(text.contains("Hello world"));
        assert!(text.contains("Second paragraph"));
    }

    #[test]
    fn test_html_to_text_entities() {
        assert_eq!(html_to_text("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
    }

    #[test]
    fn test_html_to_text_removes_scripts() {
        assert_eq!(
            html_to_text("Before<script>alert('x')</script>After"),
            "BeforeAfter"
        );
    }

    #[test]
    fn test_images_are_stripped_before_conversion() {
        let text = sniff_and_convert("<html><p>photo: <img src=\"cid:1\" alt=\"x\"></p></html>");
        assert!(text.contains("photo:"));
        assert!(!text.contains("img"));
        assert!(!text.contains("cid:1"));
    }

    #[test]
    fn test_strip_links_replaces_tokens() {
        let input = "see https://example.com/very/long/path and http://other.net now";
        assert_eq!(strip_links(input), "see [link] and [link] now");
    }

    #[test]
    fn test_strip_links_preserves_prose() {
        let input = "no links here, just words";
        assert_eq!(strip_links(input), input);
    }

    #[test]
    fn test_strip_links_preserves_whitespace_shape() {
        assert_eq!(strip_links("a\nhttps://x.com\nb"), "a\n[link]\nb");
    }
}
