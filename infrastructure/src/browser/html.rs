//! HTML to readable text

use scraper::{ElementRef, Html, Node, Selector};

/// Tags whose entire subtree is ignored
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "svg", "template"];

/// Block-level tags that end a line of text
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "pre",
    "section", "article", "header", "footer", "blockquote",
];

/// Parsed page: title plus visible text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub text: String,
}

pub fn extract_page(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| clean_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let root = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    collect_text(root, &mut raw);

    ExtractedPage {
        title,
        text: clean_whitespace(&raw),
    }
}

pub fn html_to_text(html: &str) -> String {
    extract_page(html).text
}

fn collect_text(element: ElementRef, out: &mut String) {
    let tag = element.value().name();
    if SKIP_TAGS.contains(&tag) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let t = text.trim();
                if !t.is_empty() {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push(' ');
                    }
                    out.push_str(t);
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }

    if BLOCK_TAGS.contains(&tag) {
        out.push('\n');
    }
}

/// Collapse runs of spaces, keep at most one blank line
fn clean_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_whitespace = false;
    let mut newline_count = 0;

    for ch in text.chars() {
        if ch == '\n' {
            newline_count += 1;
            if newline_count <= 2 {
                // drop the space that preceded the newline
                if result.ends_with(' ') {
                    result.pop();
                }
                result.push('\n');
            }
            prev_was_whitespace = true;
        } else if ch.is_whitespace() {
            if !prev_was_whitespace {
                result.push(' ');
            }
            prev_was_whitespace = true;
        } else {
            result.push(ch);
            prev_was_whitespace = false;
            newline_count = 0;
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title_and_text() {
        let page = extract_page(
            "<html><head><title> Rust  Book </title></head>\
             <body><h1>Hello</h1><p>World <b>bold</b></p></body></html>",
        );
        assert_eq!(page.title.as_deref(), Some("Rust Book"));
        assert_eq!(page.text, "Hello\nWorld bold");
    }

    #[test]
    fn test_scripts_and_styles_are_dropped() {
        let text = html_to_text(
            r#"<html><body>
                <script>var x = 1;</script>
                <style>.foo { color: red; }</style>
                <p>Visible text</p>
                <noscript>No JS</noscript>
            </body></html>"#,
        );
        assert_eq!(text, "Visible text");
    }

    #[test]
    fn test_empty_document() {
        let page = extract_page("");
        assert!(page.title.is_none());
        assert!(page.text.is_empty());
    }

    #[test]
    fn test_clean_whitespace() {
        assert_eq!(clean_whitespace("  hello   world  "), "hello world");
        assert_eq!(clean_whitespace("a\n\n\n\nb"), "a\n\nb");
    }
}
