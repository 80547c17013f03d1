//! Structural, SEO, accessibility and speed findings for a fetched page.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::models::PageMetrics;

/// More inline-styled elements than this produce a finding
const INLINE_STYLE_LIMIT: usize = 10;

const SLOW_LOAD_MS: f64 = 3000.0;
const VERY_SLOW_LOAD_MS: f64 = 5000.0;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css}: {e:?}"))
}

static VIEWPORT: Lazy<Selector> = Lazy::new(|| selector("meta[name=viewport]"));
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| selector("meta[name=description]"));
static META_CHARSET: Lazy<Selector> = Lazy::new(|| selector("meta[charset]"));
static META_HTTP_EQUIV: Lazy<Selector> = Lazy::new(|| selector("meta[http-equiv]"));
static IMG_WITHOUT_ALT: Lazy<Selector> = Lazy::new(|| selector("img:not([alt])"));
static INLINE_STYLE: Lazy<Selector> = Lazy::new(|| selector("[style]"));

/// Run every rule against the page and return the findings in rule order
pub fn analyze_issues(html: &str, status_code: u16, metrics: &PageMetrics) -> Vec<String> {
    let document = Html::parse_document(html);
    let has = |s: &Selector| document.select(s).next().is_some();
    let mut issues = Vec::new();

    if status_code >= 400 {
        issues.push(format!("HTTP Error: {}", status_code));
    }

    if !has(&VIEWPORT) {
        issues.push("Missing viewport meta tag (Not Mobile Friendly)".to_string());
    }

    if !has(&H1) {
        issues.push("Missing H1 tag (SEO issue)".to_string());
    }

    if !has(&DESCRIPTION) {
        issues.push("Missing meta description (SEO issue)".to_string());
    }

    let declares_content_type = document.select(&META_HTTP_EQUIV).any(|meta| {
        meta.value()
            .attr("http-equiv")
            .map(|v| v.eq_ignore_ascii_case("content-type"))
            .unwrap_or(false)
    });
    if !has(&META_CHARSET) && !declares_content_type {
        issues.push("Missing charset declaration".to_string());
    }

    let missing_alt = document.select(&IMG_WITHOUT_ALT).count();
    if missing_alt > 0 {
        issues.push(format!(
            "{} images missing alt text (Accessibility issue)",
            missing_alt
        ));
    }

    let inline_styles = document.select(&INLINE_STYLE).count();
    if inline_styles > INLINE_STYLE_LIMIT {
        issues.push(format!(
            "{} elements with inline styles (Consider using CSS classes)",
            inline_styles
        ));
    }

    let load = metrics.load_complete;
    if load > VERY_SLOW_LOAD_MS {
        issues.push(format!(
            "Very slow load time ({:.1}s) - Consider optimization",
            load / 1000.0
        ));
    } else if load > SLOW_LOAD_MS {
        issues.push(format!(
            "Slow load time ({:.1}s) - Could be faster",
            load / 1000.0
        ));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_PAGE: &str = r#"<!doctype html><html><head>
        <meta charset="utf-8">
        <meta name="viewport" content="width=device-width">
        <meta name="description" content="A tidy page">
        <title>Tidy</title></head>
        <body><h1>Hello</h1><img src="a.png" alt="logo"></body></html>"#;

    fn metrics(load_complete: f64) -> PageMetrics {
        PageMetrics {
            load_complete,
            ..PageMetrics::default()
        }
    }

    #[test]
    fn clean_page_has_no_findings() {
        assert!(analyze_issues(CLEAN_PAGE, 200, &metrics(800.0)).is_empty());
    }

    #[test]
    fn bare_page_reports_every_structural_rule_in_order() {
        let issues = analyze_issues("<html><body><p>hi</p></body></html>", 404, &metrics(0.0));
        assert_eq!(
            issues,
            vec![
                "HTTP Error: 404",
                "Missing viewport meta tag (Not Mobile Friendly)",
                "Missing H1 tag (SEO issue)",
                "Missing meta description (SEO issue)",
                "Missing charset declaration",
            ]
        );
    }

    #[test]
    fn http_equiv_content_type_counts_as_charset() {
        let html = r#"<head><meta http-equiv="Content-Type" content="text/html; charset=utf-8"></head>"#;
        let issues = analyze_issues(html, 200, &metrics(0.0));
        assert!(!issues.contains(&"Missing charset declaration".to_string()));
    }

    #[test]
    fn images_without_alt_are_counted_once() {
        let html = r#"<img src=a><img src=b alt=""><img src=c><img src=d>"#;
        let issues = analyze_issues(html, 200, &metrics(0.0));
        let alt: Vec<_> = issues.iter().filter(|i| i.contains("alt text")).collect();
        assert_eq!(alt, vec!["3 images missing alt text (Accessibility issue)"]);
    }

    #[test]
    fn inline_styles_over_threshold() {
        let ten = "<p style='color:red'>x</p>".repeat(10);
        let issues = analyze_issues(&ten, 200, &metrics(0.0));
        assert!(!issues.iter().any(|i| i.contains("inline styles")));

        let eleven = "<p style='color:red'>x</p>".repeat(11);
        let issues = analyze_issues(&eleven, 200, &metrics(0.0));
        assert!(issues.contains(
            &"11 elements with inline styles (Consider using CSS classes)".to_string()
        ));
    }

    #[test]
    fn slow_and_very_slow_are_exclusive() {
        let slow = analyze_issues(CLEAN_PAGE, 200, &metrics(3500.0));
        assert_eq!(slow, vec!["Slow load time (3.5s) - Could be faster"]);

        let very_slow = analyze_issues(CLEAN_PAGE, 200, &metrics(6200.0));
        assert_eq!(very_slow, vec!["Very slow load time (6.2s) - Consider optimization"]);

        assert!(analyze_issues(CLEAN_PAGE, 200, &metrics(3000.0)).is_empty());
        assert_eq!(analyze_issues(CLEAN_PAGE, 200, &metrics(5000.0)).len(), 1);
    }
}
