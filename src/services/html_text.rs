//! Plain-text rendering of planner HTML descriptions.

use scraper::{ElementRef, Html, Node};

/// Longest description sent to the classifier, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 4000;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre",
    "section", "table", "tr", "ul",
];

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Convert an HTML fragment to text. Block elements become paragraphs
/// separated by a blank line, `<br>` becomes a line break, and runs of
/// whitespace collapse to one space.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(html);
    let mut raw = String::new();
    collect(fragment.root_element(), &mut raw);

    let mut lines: Vec<String> = Vec::new();
    let mut pending_blank = false;
    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            pending_blank = !lines.is_empty();
            continue;
        }
        if pending_blank {
            lines.push(String::new());
            pending_blank = false;
        }
        lines.push(line);
    }

    lines.join("\n")
}

fn collect(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }

    let block = BLOCK_TAGS.contains(&name);
    if block {
        out.push_str("\n\n");
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_text(out, text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect(child, out);
                }
            }
            _ => {}
        }
    }

    if block {
        out.push_str("\n\n");
    }
}

fn push_text(out: &mut String, text: &str) {
    let mut previous_space = out.ends_with(char::is_whitespace);
    for c in text.chars() {
        if c.is_whitespace() {
            if !previous_space {
                out.push(' ');
                previous_space = true;
            }
        } else {
            out.push(c);
            previous_space = false;
        }
    }
}

/// Cut `text` to at most `max` characters on a character boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
