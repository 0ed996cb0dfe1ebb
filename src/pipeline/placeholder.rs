//! Image-placeholder markers embedded in generated article bodies.
//!
//! The Writer stage emits `[IMAGE: <prompt>]` markers inline in the HTML.
//! The Visual Inspector resolves each marker into a `<figure>` element, or
//! removes it when image generation fails.

use std::sync::LazyLock;

use regex::Regex;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[IMAGE:\s*([^\]]+)\]").expect("placeholder regex is a valid static pattern")
});

/// One `[IMAGE: …]` marker found in a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    /// The full marker text, including brackets.
    pub marker: String,
    /// The image prompt inside the marker.
    pub prompt: String,
}

/// Find all placeholders in document order.
pub fn extract(body: &str) -> Vec<Placeholder> {
    MARKER_RE
        .captures_iter(body)
        .map(|cap| Placeholder {
            marker: cap[0].to_string(),
            prompt: cap[1].trim().to_string(),
        })
        .collect()
}

/// Replace the first occurrence of `marker` with a rendered figure.
pub fn substitute(body: &str, marker: &str, image_url: &str, caption: &str) -> String {
    let figure = format!(
        "<figure><img src=\"{}\" alt=\"{}\"><figcaption>{}</figcaption></figure>",
        image_url,
        escape_attr(caption),
        escape_text(caption)
    );
    body.replacen(marker, &figure, 1)
}

/// Drop the first occurrence of `marker` entirely (failed generation).
pub fn remove(body: &str, marker: &str) -> String {
    body.replacen(marker, "", 1)
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_finds_markers_in_order() {
        let body = "<p>Intro</p>[IMAGE: a storefront sign]<p>More</p>[IMAGE: crane lifting a sign]";
        let found = extract(body);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].prompt, "a storefront sign");
        assert_eq!(found[1].prompt, "crane lifting a sign");
        assert_eq!(found[0].marker, "[IMAGE: a storefront sign]");
    }

    #[test]
    fn test_extract_none() {
        assert!(extract("<p>No images here</p>").is_empty());
    }

    #[test]
    fn test_substitute_renders_figure() {
        let body = "<p>Before</p>[IMAGE: neon sign] <p>After</p>";
        let out = substitute(body, "[IMAGE: neon sign]", "https://img.example/1.png", "neon sign");
        assert!(out.contains("<figure><img src=\"https://img.example/1.png\""));
        assert!(out.contains("<figcaption>neon sign</figcaption>"));
        assert!(!out.contains("[IMAGE:"));
    }

    #[test]
    fn test_substitute_escapes_caption() {
        let body = "[IMAGE: x]";
        let out = substitute(body, "[IMAGE: x]", "/i.png", "a \"big\" <sign> & co");
        assert!(out.contains("alt=\"a &quot;big&quot; &lt;sign> &amp; co\""));
        assert!(out.contains("<figcaption>a \"big\" &lt;sign&gt; &amp; co</figcaption>"));
    }

    #[test]
    fn test_remove_drops_only_the_marker() {
        let body = "<p>Keep</p>[IMAGE: broken]<p>Me</p>";
        assert_eq!(remove(body, "[IMAGE: broken]"), "<p>Keep</p><p>Me</p>");
    }

    #[test]
    fn test_substitute_only_first_occurrence() {
        let body = "[IMAGE: a][IMAGE: a]";
        let out = substitute(body, "[IMAGE: a]", "/i.png", "a");
        assert_eq!(out.matches("<figure>").count(), 1);
        assert_eq!(out.matches("[IMAGE: a]").count(), 1);
    }
}
