//! KMB stop ETA feed adapter.
//!
//! The feed returns every route calling at the stop; the adapter filters
//! down to the requested route and direction and maps the per-sequence
//! entries into canonical lines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::domain::Operator;
use crate::eta::adapter::{EtaAdapter, EtaRequest};
use crate::eta::error::EtaError;
use crate::eta::result::{EtaLine, EtaQueryResult};

use super::{minutes_until, parse_eta_timestamp, remark};

const DEFAULT_BASE_URL: &str = "https://data.etabus.gov.hk";

/// Configuration for the KMB adapter.
#[derive(Debug, Clone)]
pub struct KmbConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for KmbConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl KmbConfig {
    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Adapter for the KMB per-stop ETA feed.
pub struct KmbAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl KmbAdapter {
    pub fn new(config: KmbConfig) -> Result<Self, EtaError> {
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
    data: Option<Vec<StopEtaItem>>,
}

#[derive(Debug, Deserialize)]
struct StopEtaItem {
    co: Option<String>,
    route: Option<String>,
    dir: Option<String>,
    eta_seq: Option<u8>,
    eta: Option<String>,
    rmk_en: Option<String>,
    rmk_tc: Option<String>,
}

impl EtaAdapter for KmbAdapter {
    fn operator(&self) -> Operator {
        Operator::Kmb
    }

    fn fetch<'a>(
        &'a self,
        request: &'a EtaRequest,
    ) -> BoxFuture<'a, Result<EtaQueryResult, EtaError>> {
        Box::pin(async move {
            let url = format!(
                "{}/v1/transport/kmb/stop-eta/{}",
                self.base_url, request.stop_id
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
            let parsed: StopEtaResponse =
                serde_json::from_str(&body).map_err(|e| EtaError::Malformed(e.to_string()))?;

            Ok(normalize(&parsed, request, Utc::now()))
        })
    }
}

/// Map the feed response onto canonical lines.
fn normalize(response: &StopEtaResponse, request: &EtaRequest, now: DateTime<Utc>) -> EtaQueryResult {
    let bound = request
        .route
        .bound
        .get(&Operator::Kmb)
        .map(String::as_str)
        .unwrap_or_default();

    let mut entries = BTreeMap::new();

    for item in response.data.as_deref().unwrap_or(&[]) {
        if item.co.as_deref() != Some("KMB")
            || item.route.as_deref() != Some(request.route.route_number.as_str())
            || item.dir.as_deref() != Some(bound)
        {
            continue;
        }
        let Some(seq) = item.eta_seq else {
            continue;
        };

        let rmk_en = item.rmk_en.as_deref().unwrap_or("");
        let rmk_tc = item.rmk_tc.as_deref().unwrap_or("");

        // The feed keeps publishing rows during a typhoon shutdown, with a
        // suspension remark instead of times.
        if rmk_en == "ETA service suspended" || rmk_tc == "暫停預報" {
            entries.insert(seq, EtaLine::TyphoonSchedule);
            continue;
        }

        let line = match parse_eta_timestamp(item.eta.as_deref()) {
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

    EtaQueryResult::from_entries(Operator::Kmb, entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::mock::simple_route;
    use crate::eta::adapter::test_request;
    use chrono::TimeZone;

    fn request() -> EtaRequest {
        test_request(
            Operator::Kmb,
            simple_route("960", Operator::Kmb, &["AAAA000000000001"]),
            "AAAA000000000001",
        )
    }

    fn now() -> DateTime<Utc> {
        // 20:00 local (+08:00)
        Utc.with_ymd_and_hms(2023, 9, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn countdown_lines_from_feed() {
        let body = r#"{"data":[
            {"co":"KMB","route":"960","dir":"O","eta_seq":1,
             "eta":"2023-09-01T20:04:00+08:00","rmk_en":"","rmk_tc":""},
            {"co":"KMB","route":"960","dir":"O","eta_seq":2,
             "eta":"2023-09-01T20:16:00+08:00","rmk_en":"Scheduled Bus","rmk_tc":"原定班次"},
            {"co":"KMB","route":"960","dir":"I","eta_seq":1,
             "eta":"2023-09-01T20:02:00+08:00","rmk_en":"","rmk_tc":""}
        ]}"#;
        let parsed: StopEtaResponse = serde_json::from_str(body).unwrap();
        let result = normalize(&parsed, &request(), now());

        assert_eq!(result.next_countdown_minutes(), Some(4));
        match result.line(2) {
            EtaLine::Countdown { minutes, remark } => {
                assert_eq!(*minutes, 16);
                let remark = remark.as_ref().unwrap();
                assert_eq!(remark.en, "Scheduled Bus");
                assert_eq!(remark.zh, "預定班次");
            }
            other => panic!("unexpected line: {other:?}"),
        }
        // The wrong-direction row was filtered out; line 3 padded.
        assert_eq!(result.line(3), &EtaLine::NoSchedule);
    }

    #[test]
    fn null_first_eta_becomes_no_schedule() {
        let body = r#"{"data":[
            {"co":"KMB","route":"960","dir":"O","eta_seq":1,
             "eta":null,"rmk_en":"","rmk_tc":""}
        ]}"#;
        let parsed: StopEtaResponse = serde_json::from_str(body).unwrap();
        let result = normalize(&parsed, &request(), now());
        assert_eq!(result.line(1), &EtaLine::NoSchedule);
        assert!(!result.is_connection_error);
    }

    #[test]
    fn typhoon_suspension_is_a_distinct_state() {
        let body = r#"{"data":[
            {"co":"KMB","route":"960","dir":"O","eta_seq":1,
             "eta":"","rmk_en":"ETA service suspended","rmk_tc":"暫停預報"}
        ]}"#;
        let parsed: StopEtaResponse = serde_json::from_str(body).unwrap();
        let result = normalize(&parsed, &request(), now());
        assert_eq!(result.line(1), &EtaLine::TyphoonSchedule);
    }

    #[test]
    fn departed_buses_are_dropped_and_due_clamped_to_zero() {
        let body = r#"{"data":[
            {"co":"KMB","route":"960","dir":"O","eta_seq":1,
             "eta":"2023-09-01T19:59:30+08:00","rmk_en":"","rmk_tc":""},
            {"co":"KMB","route":"960","dir":"O","eta_seq":2,
             "eta":"2023-09-01T18:00:00+08:00","rmk_en":"","rmk_tc":""}
        ]}"#;
        let parsed: StopEtaResponse = serde_json::from_str(body).unwrap();
        let result = normalize(&parsed, &request(), now());
        // 30 seconds ago rounds to 0: still shown as due.
        assert_eq!(result.next_countdown_minutes(), Some(0));
        // Two hours ago is gone entirely.
        assert_eq!(result.line(2), &EtaLine::NoSchedule);
    }

    #[test]
    fn empty_feed_pads_with_no_schedule() {
        let parsed: StopEtaResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        let result = normalize(&parsed, &request(), now());
        assert_eq!(result.line(1), &EtaLine::NoSchedule);
        assert_eq!(result.line(2), &EtaLine::NoSchedule);
        assert_eq!(result.line(3), &EtaLine::NoSchedule);
    }
}
