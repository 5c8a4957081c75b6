//! Free-quota guard.
//!
//! Before spending, the account's usage is fetched from the provider and run
//! through a fixed policy table. Nothing is cached: every check is a fresh query,
//! and a failed query always denies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::translate::openai_types::KeyInfoResponse;

/// Account usage as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_units: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_units: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits_balance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_used: Option<f64>,
}

impl QuotaDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            remaining: None,
            percent_used: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            remaining: None,
            percent_used: None,
        }
    }

    /// Turn a denial into the error the endpoints return.
    pub fn into_result(self) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(ProxyError::quota_denied(
                self.reason.unwrap_or_else(|| "Quota denied".to_string()),
            ))
        }
    }
}

/// Response of the standalone quota endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaReport {
    #[serde(flatten)]
    pub decision: QuotaDecision,
    pub model: String,
    pub checked_at: DateTime<Utc>,
}

impl QuotaReport {
    pub fn new(decision: QuotaDecision, model: impl Into<String>) -> Self {
        Self {
            decision,
            model: model.into(),
            checked_at: Utc::now(),
        }
    }
}

pub fn is_free_tier(model: &str, free_tier_marker: &str) -> bool {
    !free_tier_marker.is_empty() && model.contains(free_tier_marker)
}

/// Apply the policy table to a snapshot. Pure: same inputs, same decision.
///
/// 1. A positive limit is authoritative: allowed while usage is below it.
/// 2. No limit and zero usage: allowed.
/// 3. No limit and nonzero usage: only free-tier models are allowed.
/// 4. Anything else, including unreported usage: only free-tier models are allowed.
pub fn decide(snapshot: &UsageSnapshot, model: &str, free_tier_marker: &str) -> QuotaDecision {
    let free = is_free_tier(model, free_tier_marker);
    let Some(usage) = snapshot.usage_units else {
        return if free {
            QuotaDecision::allow()
        } else {
            QuotaDecision::deny(format!(
                "Account usage was not reported; refusing non-free model {model}"
            ))
        };
    };

    if let Some(limit) = snapshot.limit_units.filter(|l| *l > 0.0) {
        if usage < limit {
            return QuotaDecision {
                allowed: true,
                reason: None,
                remaining: Some(limit - usage),
                percent_used: Some(usage * 100.0 / limit),
            };
        }
        return QuotaDecision::deny(format!(
            "Usage {usage}/{limit} has reached the account limit"
        ));
    }

    if usage == 0.0 {
        return QuotaDecision::allow();
    }

    if usage > 0.0 {
        if free {
            return QuotaDecision::allow();
        }
        return QuotaDecision::deny(format!(
            "Account limit is unknown and usage is {usage}; refusing non-free model {model}"
        ));
    }

    if free {
        QuotaDecision::allow()
    } else {
        QuotaDecision::deny(format!(
            "Account usage could not be interpreted ({usage}); refusing non-free model {model}"
        ))
    }
}

/// Fetch the account's current usage from `GET {base_url}/key`.
pub async fn fetch_usage(
    api_key: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
) -> Result<UsageSnapshot> {
    if api_key.is_empty() {
        return Err(ProxyError::MissingCredential);
    }

    let url = config.key_info_url();
    let response = client
        .get(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .send()
        .await?;

    let status = response.status().as_u16();
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        return Err(ProxyError::UpstreamRejected { status, body });
    }

    let parsed: KeyInfoResponse = response.json().await?;
    Ok(UsageSnapshot {
        usage_units: parsed.data.usage,
        limit_units: parsed.data.limit,
        credits_balance: parsed.data.limit_remaining,
    })
}

/// Query the account and decide. Any failure to obtain a snapshot denies.
pub async fn check(
    api_key: &str,
    model: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
) -> QuotaDecision {
    let decision = match fetch_usage(api_key, config, client).await {
        Ok(snapshot) => {
            tracing::debug!(
                usage = ?snapshot.usage_units,
                limit = ?snapshot.limit_units,
                balance = ?snapshot.credits_balance,
                "Fetched account usage"
            );
            decide(&snapshot, model, &config.quota.free_tier_marker)
        }
        Err(e) => QuotaDecision::deny(format!("Quota check failed: {e}")),
    };

    if decision.allowed {
        tracing::info!(model, percent_used = ?decision.percent_used, "Quota check passed");
    } else {
        tracing::warn!(model, reason = ?decision.reason, "Quota check denied");
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    const FREE: &str = "google/gemini-2.5-flash-image-preview:free";
    const PAID: &str = "google/gemini-2.5-flash-image-preview";
    const MARKER: &str = ":free";

    fn snapshot(usage: f64, limit: Option<f64>) -> UsageSnapshot {
        UsageSnapshot {
            usage_units: Some(usage),
            limit_units: limit,
            credits_balance: None,
        }
    }

    #[test]
    fn test_limit_reached_is_denied() {
        let decision = decide(&snapshot(100.0, Some(100.0)), FREE, MARKER);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("100/100"));
    }

    #[test]
    fn test_under_limit_reports_remaining() {
        let decision = decide(&snapshot(25.0, Some(100.0)), PAID, MARKER);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(75.0));
        assert_eq!(decision.percent_used, Some(25.0));
        assert_eq!(decision.reason, None);
    }

    #[test]
    fn test_zero_usage_without_limit_is_allowed() {
        let decision = decide(&snapshot(0.0, None), PAID, MARKER);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, None);
    }

    #[test]
    fn test_non_positive_limit_is_treated_as_unknown() {
        assert!(decide(&snapshot(0.0, Some(0.0)), PAID, MARKER).allowed);
        assert!(!decide(&snapshot(3.0, Some(-1.0)), PAID, MARKER).allowed);
    }

    #[test]
    fn test_usage_without_limit_allows_only_free_tier() {
        assert!(decide(&snapshot(0.5, None), FREE, MARKER).allowed);

        let denied = decide(&snapshot(0.5, None), PAID, MARKER);
        assert!(!denied.allowed);
        let reason = denied.reason.unwrap();
        assert!(reason.contains("unknown"));
        assert!(reason.contains("0.5"));
    }

    #[test]
    fn test_undetermined_usage_allows_only_free_tier() {
        assert!(decide(&snapshot(f64::NAN, None), FREE, MARKER).allowed);
        assert!(!decide(&snapshot(f64::NAN, None), PAID, MARKER).allowed);
        assert!(!decide(&snapshot(-2.0, None), PAID, MARKER).allowed);
    }

    #[test]
    fn test_unreported_usage_allows_only_free_tier() {
        let info: KeyInfoResponse =
            serde_json::from_value(serde_json::json!({"data": {"limit": null}})).unwrap();
        let snap = UsageSnapshot {
            usage_units: info.data.usage,
            limit_units: info.data.limit,
            credits_balance: info.data.limit_remaining,
        };

        let denied = decide(&snap, PAID, MARKER);
        assert!(!denied.allowed);
        assert!(denied.reason.unwrap().contains("not reported"));
        assert!(decide(&snap, FREE, MARKER).allowed);

        let with_limit = UsageSnapshot {
            limit_units: Some(10.0),
            ..snap
        };
        assert!(!decide(&with_limit, PAID, MARKER).allowed);
    }

    #[test]
    fn test_free_tier_marker_is_configurable() {
        assert!(decide(&snapshot(1.0, None), "vendor/model-free", "-free").allowed);
        assert!(!decide(&snapshot(1.0, None), FREE, "-free").allowed);
        assert!(!is_free_tier(FREE, ""));
    }

    #[test]
    fn test_decision_is_deterministic() {
        for snap in [
            snapshot(100.0, Some(100.0)),
            snapshot(10.0, Some(100.0)),
            snapshot(0.0, None),
            snapshot(3.0, None),
        ] {
            for model in [FREE, PAID] {
                assert_eq!(decide(&snap, model, MARKER), decide(&snap, model, MARKER));
            }
        }
    }

    #[test]
    fn test_denied_decision_becomes_quota_error() {
        let err = decide(&snapshot(5.0, Some(5.0)), FREE, MARKER)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, ProxyError::QuotaDenied { .. }));
        assert!(decide(&snapshot(0.0, None), PAID, MARKER).into_result().is_ok());
    }

    #[test]
    fn test_report_flattens_decision() {
        let report = QuotaReport::new(decide(&snapshot(25.0, Some(100.0)), PAID, MARKER), PAID);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["allowed"], true);
        assert_eq!(value["remaining"], 75.0);
        assert_eq!(value["percentUsed"], 25.0);
        assert_eq!(value["model"], PAID);
        assert!(value["checkedAt"].is_string());
        assert!(value.get("reason").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_account_endpoint_fails_closed() {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "http://127.0.0.1:1/api/v1".to_string();
        let client = reqwest::Client::new();

        let decision = check("sk-or-test", FREE, &config, &client).await;
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().starts_with("Quota check failed"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_closed() {
        let config = ProxyConfig::default();
        let client = reqwest::Client::new();

        let decision = check("", FREE, &config, &client).await;
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("API key is missing."));
    }
}
