use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const SAFE_BROWSING_ENDPOINT: &str = "https://safebrowsing.googleapis.com/v4/threatMatches:find";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
const CLIENT_ID: &str = "sitescan";

const THREAT_TYPES: &[&str] = &[
    "MALWARE",
    "SOCIAL_ENGINEERING",
    "UNWANTED_SOFTWARE",
    "POTENTIALLY_HARMFUL_APPLICATION",
    "THREAT_TYPE_UNSPECIFIED",
];

/// Result of a reputation lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReputationOutcome {
    /// The lookup did not happen or failed
    NotChecked { reason: String },
    Clean,
    /// Threat types reported for the URL
    Threats { threats: Vec<String> },
}

/// External URL reputation service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReputationCheck: Send + Sync {
    /// Never fails; errors are folded into `NotChecked`
    async fn check(&self, url: &str) -> ReputationOutcome;
}

/// Google Safe Browsing v4 lookup client
pub struct SafeBrowsingClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreatMatchesResponse {
    #[serde(default)]
    matches: Vec<ThreatMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreatMatch {
    threat_type: String,
}

impl SafeBrowsingClient {
    /// A blank key is treated as missing
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_body(url: &str) -> serde_json::Value {
        json!({
            "client": {
                "clientId": CLIENT_ID,
                "clientVersion": env!("CARGO_PKG_VERSION"),
            },
            "threatInfo": {
                "threatTypes": THREAT_TYPES,
                "platformTypes": ["ANY_PLATFORM"],
                "threatEntryTypes": ["URL"],
                "threatEntries": [{ "url": url }],
            }
        })
    }

    async fn lookup(&self, key: &str, url: &str) -> Result<ReputationOutcome, reqwest::Error> {
        let response = self
            .client
            .post(SAFE_BROWSING_ENDPOINT)
            .query(&[("key", key)])
            .timeout(LOOKUP_TIMEOUT)
            .json(&Self::request_body(url))
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!("Safe Browsing returned {} for {}", status.as_u16(), url);
            return Ok(ReputationOutcome::NotChecked {
                reason: format!("API error: {}", status.as_u16()),
            });
        }

        let body: ThreatMatchesResponse = response.json().await?;
        Ok(outcome_from_matches(body.matches))
    }
}

fn outcome_from_matches(matches: Vec<ThreatMatch>) -> ReputationOutcome {
    if matches.is_empty() {
        ReputationOutcome::Clean
    } else {
        ReputationOutcome::Threats {
            threats: matches.into_iter().map(|m| m.threat_type).collect(),
        }
    }
}

#[async_trait]
impl ReputationCheck for SafeBrowsingClient {
    async fn check(&self, url: &str) -> ReputationOutcome {
        let Some(key) = self.api_key.as_deref() else {
            return ReputationOutcome::NotChecked {
                reason: "No API key configured".to_string(),
            };
        };

        match self.lookup(key, url).await {
            Ok(outcome) => {
                debug!("Safe Browsing verdict for {}: {:?}", url, outcome);
                outcome
            }
            Err(e) => {
                warn!("Safe Browsing lookup failed for {}: {}", url, e);
                ReputationOutcome::NotChecked {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_not_checked() {
        for key in [None, Some(String::new()), Some("   ".to_string())] {
            let client = SafeBrowsingClient::new(key);
            assert!(!client.has_key());
            assert_eq!(
                client.check("https://example.com/").await,
                ReputationOutcome::NotChecked {
                    reason: "No API key configured".to_string()
                }
            );
        }
    }

    #[test]
    fn empty_match_list_is_clean() {
        let body: ThreatMatchesResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(outcome_from_matches(body.matches), ReputationOutcome::Clean);
    }

    #[test]
    fn matches_become_threat_list() {
        let body: ThreatMatchesResponse = serde_json::from_str(
            r#"{"matches":[{"threatType":"MALWARE","platformType":"ANY_PLATFORM"},
                           {"threatType":"SOCIAL_ENGINEERING"}]}"#,
        )
        .unwrap();
        assert_eq!(
            outcome_from_matches(body.matches),
            ReputationOutcome::Threats {
                threats: vec!["MALWARE".to_string(), "SOCIAL_ENGINEERING".to_string()]
            }
        );
    }

    #[test]
    fn request_names_the_url_and_threat_types() {
        let body = SafeBrowsingClient::request_body("https://example.com/");
        assert_eq!(body["client"]["clientId"], "sitescan");
        assert_eq!(body["threatInfo"]["threatEntries"][0]["url"], "https://example.com/");
        assert_eq!(body["threatInfo"]["threatTypes"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ReputationOutcome::Clean).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "clean" }));
    }
}
