//! Green minibus per-stop ETA feed adapter.
//!
//! The feed lists arrivals for every route at the stop, keyed by the
//! operator's numeric line id; rows are matched against the route's
//! `line_id` cross-reference.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::domain::Operator;
use crate::eta::adapter::{EtaAdapter, EtaRequest};
use crate::eta::error::EtaError;
use crate::eta::result::{EtaLine, EtaQueryResult};

use super::{minutes_until, parse_eta_timestamp, remark};

const DEFAULT_BASE_URL: &str = "https://data.etagmb.gov.hk";

/// Configuration for the green minibus adapter.
#[derive(Debug, Clone)]
pub struct GmbConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GmbConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl GmbConfig {
    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Adapter for the green minibus per-stop ETA feed.
pub struct GmbAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl GmbAdapter {
    pub fn new(config: GmbConfig) -> Result<Self, EtaError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StopEtaResponse {
    data: Option<Vec<RouteEta>>,
}

#[derive(Debug, Deserialize)]
struct RouteEta {
    /// The feed emits this as a number; keep it loose and compare as text.
    route_id: Option<serde_json::Value>,
    eta: Option<Vec<EtaItem>>,
}

#[derive(Debug, Deserialize)]
struct EtaItem {
    eta_seq: Option<u8>,
    timestamp: Option<String>,
    remarks_en: Option<String>,
    remarks_tc: Option<String>,
}

impl EtaAdapter for GmbAdapter {
    fn operator(&self) -> Operator {
        Operator::Gmb
    }

    fn fetch<'a>(
        &'a self,
        request: &'a EtaRequest,
    ) -> BoxFuture<'a, Result<EtaQueryResult, EtaError>> {
        Box::pin(async move {
            let url = format!("{}/eta/stop/{}", self.base_url, request.stop_id);
            let response = self.http.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(EtaError::Upstream {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            let body = response.text().await?;
            let parsed: StopEtaResponse =
                serde_json::from_str(&body).map_err(|e| EtaError::Malformed(e.to_string()))?;

            Ok(normalize(&parsed, request, Utc::now()))
        })
    }
}

fn route_id_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn normalize(response: &StopEtaResponse, request: &EtaRequest, now: DateTime<Utc>) -> EtaQueryResult {
    let Some(line_id) = request.route.line_id.as_deref() else {
        return EtaQueryResult::from_entries(Operator::Gmb, BTreeMap::new());
    };

    let mut entries = BTreeMap::new();

    for route_eta in response.data.as_deref().unwrap_or(&[]) {
        let matches = route_eta
            .route_id
            .as_ref()
            .is_some_and(|id| route_id_text(id) == line_id);
        if !matches {
            continue;
        }

        for item in route_eta.eta.as_deref().unwrap_or(&[]) {
            let Some(seq) = item.eta_seq else {
                continue;
            };
            let rmk_en = normal_remark(item.remarks_en.as_deref());
            let rmk_tc = normal_remark(item.remarks_tc.as_deref());

            let line = match parse_eta_timestamp(item.timestamp.as_deref()) {
                Some(ts) => {
                    let minutes = minutes_until(ts, now);
                    if minutes <= -60 {
                        continue;
                    }
                    EtaLine::Countdown {
                        minutes: minutes.max(0),
                        remark: remark(rmk_tc, rmk_en),
                    }
                }
                None if seq == 1 => EtaLine::NoSchedule,
                None => continue,
            };
            entries.insert(seq, line);
        }
    }

    EtaQueryResult::from_entries(Operator::Gmb, entries)
}

fn normal_remark(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.eq_ignore_ascii_case("null") => v,
        _ => "",
    }
}
