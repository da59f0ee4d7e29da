//! Regex-based markup helpers shared by the field extractors.
//!
//! The pages are third-party and unversioned, so these helpers only
//! understand the handful of shapes the extractors rely on: flat `td`/`li`/`span`
//! elements, nested `div` blocks, and `class`/`style` attributes.

use std::sync::OnceLock;

use regex::Regex;

macro_rules! static_regex {
    ($pat:expr) => {{
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new($pat).expect("static regex is valid"))
    }};
}

/// One matched element: its raw attribute string and inner markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub attrs: &'a str,
    pub inner: &'a str,
}

impl<'a> Element<'a> {
    pub fn class(&self) -> Option<&'a str> {
        let re = static_regex!(r#"(?i)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#);
        let caps = re.captures(self.attrs)?;
        caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
    }

    /// Whole class attribute equals `class` (whitespace-normalized).
    pub fn class_is(&self, class: &str) -> bool {
        self.class().map_or(false, |c| {
            c.split_whitespace().eq(class.split_whitespace())
        })
    }

    pub fn has_class_token(&self, token: &str) -> bool {
        self.class()
            .map_or(false, |c| c.split_whitespace().any(|t| t == token))
    }

    pub fn has_style(&self) -> bool {
        static_regex!(r"(?i)\bstyle\s*=").is_match(self.attrs)
    }

    /// Visible text of the element.
    pub fn text(&self) -> String {
        strip_tags(self.inner)
    }
}

/// Drop tags, decode the common entities, collapse whitespace.
pub fn strip_tags(html: &str) -> String {
    let tags = static_regex!(r"(?s)<[^>]*>");
    let no_tags = tags.replace_all(html, "");
    let decoded = no_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn flat<'a>(re: &Regex, html: &'a str) -> Vec<Element<'a>> {
    re.captures_iter(html)
        .filter_map(|c| {
            Some(Element {
                attrs: c.get(1)?.as_str(),
                inner: c.get(2)?.as_str(),
            })
        })
        .collect()
}

pub fn table_cells(html: &str) -> Vec<Element<'_>> {
    flat(static_regex!(r"(?is)<td\b([^>]*)>(.*?)</td>"), html)
}

pub fn spans(html: &str) -> Vec<Element<'_>> {
    flat(static_regex!(r"(?is)<span\b([^>]*)>(.*?)</span>"), html)
}

pub fn list_items(html: &str) -> Vec<Element<'_>> {
    flat(static_regex!(r"(?is)<li\b([^>]*)>(.*?)</li>"), html)
}

/// Every `div`, outermost first in document order, with nesting respected.
pub fn divs(html: &str) -> Vec<Element<'_>> {
    struct Tag<'a> {
        start: usize,
        end: usize,
        closing: bool,
        attrs: &'a str,
    }

    let re = static_regex!(r"(?is)<(/?)div\b([^>]*)>");
    let tags: Vec<Tag<'_>> = re
        .captures_iter(html)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let attrs = c.get(2).map_or("", |m| m.as_str());
            // <div/> opens nothing
            if attrs.trim_end().ends_with('/') {
                return None;
            }
            Some(Tag {
                start: whole.start(),
                end: whole.end(),
                closing: !c[1].is_empty(),
                attrs,
            })
        })
        .collect();

    let mut out = Vec::new();
    for (i, open) in tags.iter().enumerate() {
        if open.closing {
            continue;
        }
        let mut depth = 0usize;
        for tag in &tags[i + 1..] {
            if !tag.closing {
                depth += 1;
            } else if depth == 0 {
                out.push(Element {
                    attrs: open.attrs,
                    inner: &html[open.end..tag.start],
                });
                break;
            } else {
                depth -= 1;
            }
        }
    }
    out
}

/// `div`s whose class attribute is exactly `class`.
pub fn divs_with_class<'a>(html: &'a str, class: &str) -> Vec<Element<'a>> {
    divs(html).into_iter().filter(|d| d.class_is(class)).collect()
}

/// Numeric reading of a displayed value: thousands separators and a
/// trailing `%` are ignored; the placeholder and empty strings are `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().trim_end_matches('%').chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
