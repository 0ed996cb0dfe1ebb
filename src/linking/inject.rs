//! Regex-based anchor injection into stored article HTML.
//!
//! Each link rule turns the first whole-word, case-insensitive occurrence
//! of its keyword into an anchor. Matches inside tag markup or inside an
//! existing `<a>` element are never touched, and a document is never
//! linked to its own URL.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::content::models::LinkRule;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex is a valid static pattern"));

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<a\b[^>]*>.*?</a>").expect("anchor regex is a valid static pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub struct InjectionOutcome {
    pub html: String,
    pub injected: usize,
}

/// Apply every rule to one document. `self_url` suppresses rules pointing
/// back at the document itself.
pub fn inject_links(html: &str, rules: &[LinkRule], self_url: Option<&str>) -> InjectionOutcome {
    // Longer keywords first, so "custom channel letters" wins over
    // "channel letters" when both rules exist.
    let mut ordered: Vec<&LinkRule> = rules.iter().collect();
    ordered.sort_by_key(|r| std::cmp::Reverse(r.keyword.len()));

    let mut html = html.to_string();
    let mut injected = 0;

    for rule in ordered {
        if self_url.is_some_and(|u| u == rule.url) {
            continue;
        }
        let keyword_re = match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&rule.keyword))) {
            Ok(re) => re,
            Err(_) => continue,
        };
        if let Some(range) = find_injection_point(&html, &keyword_re) {
            let matched = &html[range.clone()];
            let anchor = format!("<a href=\"{}\">{}</a>", rule.url, matched);
            html.replace_range(range, &anchor);
            injected += 1;
        }
    }

    InjectionOutcome { html, injected }
}

/// First keyword match that is plain text: not inside tag markup and not
/// inside an existing anchor element.
fn find_injection_point(html: &str, keyword_re: &Regex) -> Option<Range<usize>> {
    let protected = protected_spans(html);
    keyword_re
        .find_iter(html)
        .map(|m| m.range())
        .find(|range| !protected.iter().any(|p| ranges_overlap(p, range)))
}

fn protected_spans(html: &str) -> Vec<Range<usize>> {
    let mut spans: Vec<Range<usize>> = ANCHOR_RE.find_iter(html).map(|m| m.range()).collect();
    spans.extend(TAG_RE.find_iter(html).map(|m| m.range()));
    spans
}

fn ranges_overlap(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}
