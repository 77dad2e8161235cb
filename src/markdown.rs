//! Markdown rendering for bot messages.
//!
//! Bot answers arrive as lightweight Markdown: fenced code, `#`..`###`
//! headings, emphasis, inline code, links and lists. They are rendered once,
//! at append time, into an HTML fragment for display.
//!
//! DESIGN
//! ======
//! Parsing goes through `pulldown-cmark`, so code fences are tokenized before
//! any inline rule can see their contents and block elements are never
//! wrapped in paragraphs. The event stream is adjusted to the chat's dialect:
//! soft breaks become `<br />`, links open in a new tab, headings deeper than
//! `###` stay literal paragraph text, and raw HTML in the input is escaped
//! instead of passed through. Images are shown as links to the image. A link
//! whose scheme is not `http`, `https` or `mailto` keeps only its text.

#[cfg(test)]
#[path = "markdown_test.rs"]
mod markdown_test;

use pulldown_cmark::{CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};

/// Render bot message Markdown into an HTML fragment.
///
/// Not idempotent: feed it prose, never its own output.
#[must_use]
pub fn render_markdown_html(markdown: &str) -> String {
    let mut events = Vec::new();
    // One entry per open link or image: whether an `<a>` was emitted for it.
    let mut anchors = Vec::new();
    for event in Parser::new_ext(markdown, Options::empty()) {
        match event {
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            Event::SoftBreak => events.push(Event::HardBreak),
            Event::Start(Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. }) => {
                let safe = is_safe_href(&dest_url);
                if safe {
                    let open = format!("<a href=\"{}\" target=\"_blank\">", escape_attr(&dest_url));
                    events.push(Event::InlineHtml(CowStr::from(open)));
                }
                anchors.push(safe);
            }
            Event::End(TagEnd::Link | TagEnd::Image) => {
                if anchors.pop().unwrap_or(false) {
                    events.push(Event::InlineHtml(CowStr::Borrowed("</a>")));
                }
            }
            Event::Start(Tag::Heading { level, .. }) if is_literal_heading(level) => {
                events.push(Event::Start(Tag::Paragraph));
                let marker = format!("{} ", "#".repeat(level as usize));
                events.push(Event::Text(CowStr::from(marker)));
            }
            Event::End(TagEnd::Heading(level)) if is_literal_heading(level) => {
                events.push(Event::End(TagEnd::Paragraph));
            }
            other => events.push(other),
        }
    }

    let mut out = String::new();
    html::push_html(&mut out, events.into_iter());
    out
}

/// Render user-typed text as HTML: escaped, newlines as `<br />`.
#[must_use]
pub fn render_plain_html(text: &str) -> String {
    escape_attr(text).replace('\n', "<br />")
}

fn is_literal_heading(level: HeadingLevel) -> bool {
    matches!(level, HeadingLevel::H4 | HeadingLevel::H5 | HeadingLevel::H6)
}

/// Relative targets and `http`, `https` and `mailto` URLs may become links.
fn is_safe_href(dest: &str) -> bool {
    let dest = dest.trim().to_ascii_lowercase();
    match dest.split_once(':') {
        Some((scheme, _)) if !scheme.contains(['/', '?', '#']) => matches!(scheme, "http" | "https" | "mailto"),
        _ => true,
    }
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
