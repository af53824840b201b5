//! Minimal markdown-to-HTML for generated reports.
//!
//! Supports `#`-`###` headings, `**bold**`, `*italic*` / `_italic_`, and
//! single-level `-`/`*` and `1.` lists. Everything else is emitted as
//! escaped text. Input is escaped before any markup is produced, so model
//! output can never inject tags.

use std::sync::LazyLock;

use regex::Regex;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,3}) (.*)$").expect("heading pattern"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*] (.*)$").expect("bullet pattern"));
static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\. (.*)$").expect("numbered pattern"));
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold pattern"));
static STAR_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.+?)\*").expect("italic pattern"));
static UNDERSCORE_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(.+?)_").expect("italic pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Unordered => "ul",
            ListKind::Ordered => "ol",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Line<'a> {
    Heading(usize, &'a str),
    Item(ListKind, &'a str),
    Blank,
    Text(&'a str),
}

fn classify(line: &str) -> Line<'_> {
    if line.trim().is_empty() {
        return Line::Blank;
    }
    if let Some(caps) = HEADING.captures(line) {
        let level = caps.get(1).map_or(1, |m| m.len());
        let text = caps.get(2).map_or("", |m| m.as_str());
        return Line::Heading(level, text);
    }
    if let Some(text) = BULLET.captures(line).and_then(|c| c.get(1)) {
        return Line::Item(ListKind::Unordered, text.as_str());
    }
    if let Some(text) = NUMBERED.captures(line).and_then(|c| c.get(1)) {
        return Line::Item(ListKind::Ordered, text.as_str());
    }
    Line::Text(line)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn inline(text: &str) -> String {
    let html = BOLD.replace_all(text, "<strong>$1</strong>");
    let html = STAR_ITALIC.replace_all(&html, "<em>$1</em>");
    UNDERSCORE_ITALIC.replace_all(&html, "<em>$1</em>").into_owned()
}

/// What the renderer emitted last; decides whether a `<br />` is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Paragraph,
    List(ListKind),
    Block,
}

/// Render a report to HTML.
pub fn render(text: &str) -> String {
    let escaped = escape(text);
    let mut html = String::with_capacity(escaped.len() + 64);
    let mut state = State::Start;

    for raw in escaped.lines() {
        let line = classify(raw);

        // Anything but another item of the same kind (blank lines included) closes a list.
        if let State::List(open) = state {
            let continues = matches!(line, Line::Item(kind, _) if kind == open);
            if !continues {
                html.push_str(&format!("</{}>", open.tag()));
                state = State::Block;
            }
        }

        match line {
            Line::Blank => {}
            Line::Heading(level, body) => {
                html.push_str(&format!("<h{level}>{}</h{level}>", inline(body)));
                state = State::Block;
            }
            Line::Item(kind, body) => {
                if state != State::List(kind) {
                    html.push_str(&format!("<{}>", kind.tag()));
                }
                html.push_str(&format!("<li>{}</li>", inline(body)));
                state = State::List(kind);
            }
            Line::Text(body) => {
                if state == State::Paragraph {
                    html.push_str("<br />");
                }
                html.push_str(&inline(body));
                state = State::Paragraph;
            }
        }
    }

    if let State::List(open) = state {
        html.push_str(&format!("</{}>", open.tag()));
    }
    html
}
