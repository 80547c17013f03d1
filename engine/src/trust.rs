//! Rule-based trust verdict over the resolved URL and status code.
//!
//! The verdict is reported next to the performance grade and never changes it.

use crate::models::TrustVerdict;
use crate::url::domain_of_str;

/// Substrings in a domain that commonly show up in phishing hosts
pub const PHISHING_PATTERNS: &[&str] = &[
    "login",
    "signin",
    "verify",
    "verification",
    "account",
    "secure",
    "security",
    "banking",
    "update-info",
    "password",
    "wp-admin",
    "phpmyadmin",
    "webmail",
];

/// A domain with more hyphens than this is suspicious
const MAX_HYPHENS: usize = 3;

/// Evaluate a resolved URL and the status it answered with
pub fn evaluate_trust(resolved_url: &str, status_code: u16) -> TrustVerdict {
    let mut reasons = Vec::new();

    if !resolved_url.to_ascii_lowercase().starts_with("https://") {
        reasons.push("Connection is not secure (no HTTPS)".to_string());
    }

    if status_code != 200 {
        reasons.push(format!("Unexpected HTTP status code: {}", status_code));
    }

    let domain = domain_of_str(resolved_url);

    let hyphens = domain.matches('-').count();
    if hyphens > MAX_HYPHENS {
        reasons.push(format!("Suspicious domain: excessive hyphens ({})", hyphens));
    }

    for pattern in PHISHING_PATTERNS {
        if domain.contains(pattern) {
            reasons.push(format!("Suspicious pattern in domain: '{}'", pattern));
        }
    }

    TrustVerdict::from_reasons(reasons)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_https_site_is_safe() {
        let verdict = evaluate_trust("https://example.com/", 200);
        assert!(verdict.is_safe);
        assert!(verdict.reasons.is_empty());
        assert_eq!(verdict.status(), "safe");
    }

    #[test]
    fn http_is_insecure() {
        let verdict = evaluate_trust("http://example.com/", 200);
        assert!(!verdict.is_safe);
        assert_eq!(verdict.reasons, vec!["Connection is not secure (no HTTPS)"]);
    }

    #[test]
    fn non_200_status_is_flagged() {
        for code in [301, 404, 503] {
            let verdict = evaluate_trust("https://example.com/", code);
            assert!(!verdict.is_safe);
            assert_eq!(
                verdict.reasons,
                vec![format!("Unexpected HTTP status code: {}", code)]
            );
        }
    }

    #[test]
    fn hyphen_threshold_is_exclusive() {
        assert!(evaluate_trust("https://a-b-c-d.example.com/", 200).is_safe);
        let verdict = evaluate_trust("https://a-b-c-d-e.example.com/", 200);
        assert_eq!(
            verdict.reasons,
            vec!["Suspicious domain: excessive hyphens (4)"]
        );
    }

    #[test]
    fn phishing_lookalike_collects_one_reason_per_pattern() {
        let verdict = evaluate_trust("https://secure-login-verify-account.example.com/", 200);
        assert!(!verdict.is_safe);
        assert!(verdict.reasons.len() >= 3);
        for pattern in ["login", "verify", "account"] {
            assert!(verdict
                .reasons
                .contains(&format!("Suspicious pattern in domain: '{}'", pattern)));
        }
    }

    #[test]
    fn safe_flag_matches_reasons() {
        let cases = [
            ("https://example.com/", 200),
            ("http://example.com/", 200),
            ("https://mybanking-portal.example/", 200),
            ("https://example.com/", 500),
        ];
        for (url, status) in cases {
            let verdict = evaluate_trust(url, status);
            assert_eq!(verdict.is_safe, verdict.reasons.is_empty());
        }
    }
}
