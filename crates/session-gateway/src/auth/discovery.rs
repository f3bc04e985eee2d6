//! Key source diagnostics.
//!
//! Probes a prioritized list of identity provider base URLs for a usable key
//! set and reports every attempt. Used by `GET /api/jwks-test` to find out
//! which address works from inside the deployment (container network,
//! loopback, public host). The probe never touches the verifier's cache.

use crate::auth::jwks::JwksResponse;
use crate::config::{certs_url, Config};
use crate::observability::metrics;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Port the identity provider container listens on inside the network.
pub const CONTAINER_PORT: u16 = 8081;

/// One probed candidate.
///
/// A failed attempt carries either `status` (the candidate answered with a
/// non-200 status) or `error` (transport failure, unusable body); a
/// successful one carries `count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeAttempt {
    /// Candidate base URL.
    pub host: String,

    /// Full certs URL that was requested.
    pub url: String,

    pub ok: bool,

    /// Non-200 HTTP status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Elapsed milliseconds.
    pub ms: u64,

    /// Number of keys in the set (successful attempts only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeSummary {
    Success,
    AllFailed,
}

impl ProbeSummary {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeSummary::Success => "success",
            ProbeSummary::AllFailed => "all_failed",
        }
    }
}

/// Result of a probe run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub summary: ProbeSummary,
    pub tried: Vec<ProbeAttempt>,
}

/// Build the candidate base URLs in priority order.
///
/// Order: internal, internal with `localhost` → `127.0.0.1`, public, public
/// with the same substitution, then `http://{container}:8081`. Empty values
/// and exact duplicates are dropped, keeping the first occurrence.
pub fn candidate_bases(internal: &str, public: &str, container_name: Option<&str>) -> Vec<String> {
    let raw = [
        Some(internal.to_string()),
        Some(internal.replacen("localhost", "127.0.0.1", 1)),
        Some(public.to_string()),
        Some(public.replacen("localhost", "127.0.0.1", 1)),
        container_name
            .filter(|name| !name.is_empty())
            .map(|name| format!("http://{name}:{CONTAINER_PORT}")),
    ];

    let mut candidates: Vec<String> = Vec::with_capacity(raw.len());
    for candidate in raw.into_iter().flatten() {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Probes candidate key set locations.
pub struct KeySourceProbe {
    http_client: reqwest::Client,
    realm: String,
    candidates: Vec<String>,
}

impl KeySourceProbe {
    pub fn new(realm: String, candidates: Vec<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gw.auth.discovery", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            http_client,
            realm,
            candidates,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.realm.clone(),
            candidate_bases(
                &config.internal_url,
                &config.public_url,
                config.container_name.as_deref(),
            ),
            config.http_timeout,
        )
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Try each candidate in order, stopping at the first usable key set.
    #[instrument(skip_all, name = "gw.auth.probe", fields(candidates = self.candidates.len()))]
    pub async fn probe(&self) -> ProbeReport {
        let mut tried = Vec::with_capacity(self.candidates.len());

        for base in &self.candidates {
            let attempt = self.probe_one(base).await;
            let ok = attempt.ok;
            tried.push(attempt);

            if ok {
                tracing::info!(target: "gw.auth.discovery", host = %base, "Key set reachable");
                metrics::record_key_probe(ProbeSummary::Success.as_str());
                return ProbeReport {
                    summary: ProbeSummary::Success,
                    tried,
                };
            }
        }

        tracing::warn!(
            target: "gw.auth.discovery",
            attempts = tried.len(),
            "No candidate served a usable key set"
        );
        metrics::record_key_probe(ProbeSummary::AllFailed.as_str());
        ProbeReport {
            summary: ProbeSummary::AllFailed,
            tried,
        }
    }

    async fn probe_one(&self, base: &str) -> ProbeAttempt {
        let url = certs_url(base, &self.realm);
        let start = Instant::now();
        let mut attempt = ProbeAttempt {
            host: base.to_string(),
            url: url.clone(),
            ok: false,
            status: None,
            error: None,
            ms: 0,
            count: None,
        };

        match self.http_client.get(&url).send().await {
            Err(e) => {
                attempt.error = Some(e.to_string());
            }
            Ok(response) => {
                let status = response.status();

                if status.as_u16() != 200 {
                    attempt.status = Some(status.as_u16());
                } else {
                    match response.json::<JwksResponse>().await {
                        Err(e) => attempt.error = Some(format!("unparseable key set: {e}")),
                        Ok(jwks) if jwks.keys.is_empty() => {
                            attempt.error = Some("empty key set".to_string());
                        }
                        Ok(jwks) => {
                            attempt.ok = true;
                            attempt.count = Some(jwks.keys.len());
                        }
                    }
                }
            }
        }

        attempt.ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            target: "gw.auth.discovery",
            host = %attempt.host,
            ok = attempt.ok,
            status = ?attempt.status,
            error = ?attempt.error,
            ms = attempt.ms,
            "Probed key set candidate"
        );

        attempt
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_order_with_substitution() {
        let candidates = candidate_bases(
            "http://keycloak:8081",
            "http://localhost:8082",
            Some("bsw-keycloak"),
        );

        assert_eq!(
            candidates,
            vec![
                "http://keycloak:8081",
                "http://localhost:8082",
                "http://127.0.0.1:8082",
                "http://bsw-keycloak:8081",
            ]
        );
    }

    #[test]
    fn test_candidates_deduplicated_keeping_first() {
        let candidates = candidate_bases("http://localhost:8082", "http://localhost:8082", None);

        assert_eq!(
            candidates,
            vec!["http://localhost:8082", "http://127.0.0.1:8082"]
        );
    }

    #[test]
    fn test_empty_values_dropped() {
        let candidates = candidate_bases("", "https://login.example.nl", Some(""));

        assert_eq!(candidates, vec!["https://login.example.nl"]);
    }

    #[test]
    fn test_report_serialization_omits_absent_fields() {
        let report = ProbeReport {
            summary: ProbeSummary::AllFailed,
            tried: vec![ProbeAttempt {
                host: "http://keycloak:8081".to_string(),
                url: "http://keycloak:8081/realms/bsw-realm/protocol/openid-connect/certs"
                    .to_string(),
                ok: false,
                status: None,
                error: Some("connection refused".to_string()),
                ms: 3,
                count: None,
            }],
        };

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["summary"], "all_failed");
        assert_eq!(json["tried"][0]["error"], "connection refused");
        assert!(json["tried"][0].get("status").is_none());
        assert!(json["tried"][0].get("count").is_none());
    }

    #[test]
    fn test_successful_attempt_serializes_count_only() {
        let attempt = ProbeAttempt {
            host: "http://keycloak:8081".to_string(),
            url: "http://keycloak:8081/realms/bsw-realm/protocol/openid-connect/certs"
                .to_string(),
            ok: true,
            status: None,
            error: None,
            ms: 4,
            count: Some(2),
        };

        let json = serde_json::to_value(&attempt).unwrap();
        let mut fields: Vec<&str> = json
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        fields.sort_unstable();

        assert_eq!(fields, vec!["count", "host", "ms", "ok", "url"]);
    }
}
