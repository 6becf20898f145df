//! New Lantao Bus ETA feed adapter.
//!
//! The feed is keyed by the route's variant id rather than a direction
//! token, and omits the arrivals array entirely when nothing is scheduled.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::domain::Operator;
use crate::eta::adapter::{EtaAdapter, EtaRequest};
use crate::eta::error::EtaError;
use crate::eta::result::{EtaLine, EtaQueryResult};

use super::{minutes_until, remark};

const DEFAULT_BASE_URL: &str = "https://rt.data.gov.hk";

/// The feed reports wall-clock times in Hong Kong time without an offset.
const UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Configuration for the NLB adapter.
#[derive(Debug, Clone)]
pub struct NlbConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for NlbConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl NlbConfig {
    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Adapter for the NLB estimated-arrivals feed.
pub struct NlbAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl NlbAdapter {
    pub fn new(config: NlbConfig) -> Result<Self, EtaError> {
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
struct ArrivalsResponse {
    #[serde(rename = "estimatedArrivals")]
    estimated_arrivals: Option<Vec<Arrival>>,
}

#[derive(Debug, Deserialize)]
struct Arrival {
    #[serde(rename = "estimatedArrivalTime")]
    estimated_arrival_time: Option<String>,
    #[serde(rename = "routeVariantName")]
    route_variant_name: Option<String>,
}

impl EtaAdapter for NlbAdapter {
    fn operator(&self) -> Operator {
        Operator::Nlb
    }

    fn fetch<'a>(
        &'a self,
        request: &'a EtaRequest,
    ) -> BoxFuture<'a, Result<EtaQueryResult, EtaError>> {
        Box::pin(async move {
            let variant_id = request
                .route
                .variant_id
                .as_deref()
                .ok_or_else(|| EtaError::Malformed("route has no variant id".to_string()))?;

            let url = format!(
                "{}/v2/transport/nlb/stop.php?action=estimatedArrivals&routeId={}&stopId={}",
                self.base_url, variant_id, request.stop_id
            );
            let response = self.http.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(EtaError::Upstream {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            let body = response.text().await?;
            let parsed: ArrivalsResponse =
                serde_json::from_str(&body).map_err(|e| EtaError::Malformed(e.to_string()))?;

            Ok(normalize(&parsed, Utc::now()))
        })
    }
}

fn parse_local_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok()?;
    FixedOffset::east_opt(UTC_OFFSET_SECS)?
        .from_local_datetime(&naive)
        .single()
}

fn normalize(response: &ArrivalsResponse, now: DateTime<Utc>) -> EtaQueryResult {
    let mut entries = BTreeMap::new();

    for (index, arrival) in response
        .estimated_arrivals
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .enumerate()
    {
        let seq = index as u8 + 1;
        let variant = arrival
            .route_variant_name
            .as_deref()
            .unwrap_or("")
            .trim();

        let line = match arrival
            .estimated_arrival_time
            .as_deref()
            .and_then(parse_local_timestamp)
        {
            Some(ts) => {
                let minutes = minutes_until(ts, now);
                if minutes <= -60 {
                    continue;
                }
                EtaLine::Countdown {
                    minutes: minutes.max(0),
                    remark: remark(variant, variant),
                }
            }
            None if seq == 1 => EtaLine::NoSchedule,
            None => continue,
        };
        entries.insert(seq, line);
    }

    EtaQueryResult::from_entries(Operator::Nlb, entries)
}
