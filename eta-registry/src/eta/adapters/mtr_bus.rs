//! MTR feeder bus schedule feed adapter.
//!
//! The feed returns the whole route's schedule in one POST; rows are
//! matched to the queried stop through the stop's auxiliary alias id,
//! since the feed uses its own stop identifiers.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::domain::{BilingualText, Operator};
use crate::eta::adapter::{EtaAdapter, EtaRequest};
use crate::eta::error::EtaError;
use crate::eta::result::{EtaLine, EtaQueryResult};

const DEFAULT_BASE_URL: &str = "https://rt.data.gov.hk";

/// Arrival seconds at or above this are placeholders; fall back to the
/// departure time.
const ARRIVAL_PLACEHOLDER_SECS: f64 = 108_000.0;

/// Configuration for the MTR feeder bus adapter.
#[derive(Debug, Clone)]
pub struct MtrBusConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for MtrBusConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl MtrBusConfig {
    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Adapter for the MTR feeder bus schedule feed.
pub struct MtrBusAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl MtrBusAdapter {
    pub fn new(config: MtrBusConfig) -> Result<Self, EtaError> {
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
struct ScheduleResponse {
    #[serde(rename = "busStop")]
    bus_stop: Option<Vec<BusStopSchedule>>,
}

#[derive(Debug, Deserialize)]
struct BusStopSchedule {
    #[serde(rename = "busStopId")]
    bus_stop_id: Option<String>,
    bus: Option<Vec<BusEntry>>,
}

#[derive(Debug, Deserialize)]
struct BusEntry {
    #[serde(rename = "arrivalTimeInSecond")]
    arrival_time_in_second: Option<String>,
    #[serde(rename = "departureTimeInSecond")]
    departure_time_in_second: Option<String>,
    #[serde(rename = "busRemark")]
    bus_remark: Option<String>,
    #[serde(rename = "isScheduled")]
    is_scheduled: Option<String>,
    #[serde(rename = "isDelayed")]
    is_delayed: Option<String>,
}

impl EtaAdapter for MtrBusAdapter {
    fn operator(&self) -> Operator {
        Operator::MtrBus
    }

    fn fetch<'a>(
        &'a self,
        request: &'a EtaRequest,
    ) -> BoxFuture<'a, Result<EtaQueryResult, EtaError>> {
        Box::pin(async move {
            let url = format!("{}/v1/transport/mtr/bus/getSchedule", self.base_url);
            let body = serde_json::json!({
                "language": "en",
                "routeName": request.route.route_number,
            });
            let response = self.http.post(&url).json(&body).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(EtaError::Upstream {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            let body = response.text().await?;
            let parsed: ScheduleResponse =
                serde_json::from_str(&body).map_err(|e| EtaError::Malformed(e.to_string()))?;

            Ok(normalize(&parsed, request))
        })
    }
}

/// Whether a feed stop id refers to the queried stop: either directly or
/// through the stop's alias id.
fn matches_stop(feed_stop_id: &str, request: &EtaRequest) -> bool {
    if feed_stop_id == request.stop_id {
        return true;
    }
    request
        .stop
        .as_ref()
        .and_then(|s| s.aux_id.as_deref())
        .is_some_and(|alias| alias == feed_stop_id)
}

fn normalize(response: &ScheduleResponse, request: &EtaRequest) -> EtaQueryResult {
    let mut entries = BTreeMap::new();

    for stop_schedule in response.bus_stop.as_deref().unwrap_or(&[]) {
        let Some(feed_stop_id) = stop_schedule.bus_stop_id.as_deref() else {
            continue;
        };
        if !matches_stop(feed_stop_id, request) {
            continue;
        }

        for (index, bus) in stop_schedule.bus.as_deref().unwrap_or(&[]).iter().enumerate() {
            let seq = index as u8 + 1;

            let arrival: f64 = bus
                .arrival_time_in_second
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(f64::NAN);
            let seconds = if arrival.is_nan() || arrival >= ARRIVAL_PLACEHOLDER_SECS {
                bus.departure_time_in_second
                    .as_deref()
                    .and_then(|s| s.parse().ok())
            } else {
                Some(arrival)
            };
            let Some(seconds) = seconds else {
                continue;
            };

            let mut remark_parts: Vec<BilingualText> = Vec::new();
            if let Some(text) = bus.bus_remark.as_deref()
                && !text.is_empty()
                && !text.eq_ignore_ascii_case("null")
            {
                remark_parts.push(BilingualText::new(text, text));
            }
            if bus.is_scheduled.as_deref() == Some("1") {
                remark_parts.push(BilingualText::new("預定班次", "Scheduled Bus"));
            }
            if bus.is_delayed.as_deref() == Some("1") {
                remark_parts.push(BilingualText::new("行車緩慢", "Bus Delayed"));
            }
            let remark = join_remarks(&remark_parts);

            entries.insert(
                seq,
                EtaLine::Countdown {
                    minutes: (seconds / 60.0).floor() as i64,
                    remark,
                },
            );
        }
    }

    EtaQueryResult::from_entries(Operator::MtrBus, entries)
}

fn join_remarks(parts: &[BilingualText]) -> Option<BilingualText> {
    let mut iter = parts.iter();
    let first = iter.next()?.clone();
    Some(iter.fold(first, |joined, part| {
        &(&joined + &BilingualText::new("/", "/")) + part
    }))
}
