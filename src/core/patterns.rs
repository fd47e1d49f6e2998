//! Server config pattern library and classification.
//!
//! Each category owns an ordered list of rules. The first rule is the strict
//! form of a link and later rules are looser fallbacks. Within one category
//! overlapping spans are reported once, as the longest of them. Results of
//! different categories are never deduplicated against each other.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::domain::PatternMatch;

/// Category names with their rule sources, in declaration order
const LIBRARY: &[(&str, &[&str])] = &[
    ("vmess", &[r"vmess://[A-Za-z0-9+/=]+", r"vmess://\S+"]),
    (
        "vless",
        &[r"vless://[A-Za-z0-9+/=\-_.~]+@\S+", r"vless://\S+"],
    ),
    (
        "shadowsocks",
        &[r"\bss://[A-Za-z0-9+/=]+@\S+", r"shadowsocks://\S+"],
    ),
    (
        "trojan",
        &[r"trojan://[A-Za-z0-9+/=\-_.~]+@\S+", r"trojan://\S+"],
    ),
    (
        "wireguard",
        &[
            r"\[Interface\][\s\S]*?\[Peer\](?:[ \t]*\r?\n[ \t]*[A-Za-z][A-Za-z0-9]*[ \t]*=[^\n]*)*",
            r"wg://\S+",
        ],
    ),
    ("outline", &[r"\bss://[A-Za-z0-9+/=]+#\S+", r"outline://\S+"]),
    (
        "proxy_links",
        &[r"https://t\.me/proxy\?server=\S+", r"tg://proxy\?server=\S+"],
    ),
];

/// A named category with compiled rules
pub struct Category {
    pub name: &'static str,
    rules: Vec<Regex>,
}

impl Category {
    fn compile(name: &'static str, sources: &[&str]) -> Self {
        let rules = sources
            .iter()
            .map(|src| {
                RegexBuilder::new(src)
                    .case_insensitive(true)
                    .multi_line(true)
                    .build()
                    .unwrap_or_else(|e| panic!("invalid built-in pattern {}: {}", src, e))
            })
            .collect();
        Self { name, rules }
    }

    /// Matches of this category in `text`, in rule order then text order.
    ///
    /// Overlapping spans keep the longest one, in the slot of the first
    /// span it replaced.
    fn find_all(&self, text: &str) -> Vec<PatternMatch> {
        let mut spans: Vec<(usize, usize)> = Vec::new();

        for rule in &self.rules {
            for m in rule.find_iter(text) {
                if m.as_str().trim().is_empty() {
                    continue;
                }
                let span = (m.start(), m.end());
                let overlapping: Vec<usize> = spans
                    .iter()
                    .enumerate()
                    .filter(|&(_, &(start, end))| span.0 < end && start < span.1)
                    .map(|(i, _)| i)
                    .collect();

                let Some(&slot) = overlapping.first() else {
                    spans.push(span);
                    continue;
                };
                let covered = overlapping
                    .iter()
                    .all(|&i| spans[i].1 - spans[i].0 < span.1 - span.0);
                if !covered {
                    continue;
                }
                for &i in overlapping.iter().rev() {
                    spans.remove(i);
                }
                spans.insert(slot, span);
            }
        }

        spans
            .into_iter()
            .map(|(start, end)| PatternMatch::new(self.name, text[start..end].trim()))
            .collect()
    }
}

fn library() -> &'static [Category] {
    static CATEGORIES: OnceLock<Vec<Category>> = OnceLock::new();
    CATEGORIES.get_or_init(|| {
        LIBRARY
            .iter()
            .map(|(name, sources)| Category::compile(name, sources))
            .collect()
    })
}

/// Look up a category by name (case-insensitive)
pub fn category(name: &str) -> Option<&'static Category> {
    library()
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
}

/// Names of every category in the library
pub fn category_names() -> Vec<&'static str> {
    library().iter().map(|c| c.name).collect()
}

/// Classify text against the enabled categories.
///
/// Categories are applied in the order given; repeated or unknown names are
/// skipped. Output order is category, then rule, then position in text.
pub fn classify<S: AsRef<str>>(text: &str, enabled: &[S]) -> Vec<PatternMatch> {
    let mut seen: Vec<&'static str> = Vec::new();
    let mut matches = Vec::new();

    for name in enabled {
        let Some(found) = category(name.as_ref()) else {
            tracing::debug!(category = name.as_ref(), "Unknown server type, skipping");
            continue;
        };
        if seen.contains(&found.name) {
            continue;
        }
        seen.push(found.name);
        matches.extend(found.find_all(text));
    }

    matches
}
