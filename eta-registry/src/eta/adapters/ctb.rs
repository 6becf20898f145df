//! Citybus per-stop, per-route ETA feed adapter.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::domain::Operator;
use crate::eta::adapter::{EtaAdapter, EtaRequest};
use crate::eta::error::EtaError;
use crate::eta::result::{EtaLine, EtaQueryResult};

use super::{minutes_until, parse_eta_timestamp, remark};

const DEFAULT_BASE_URL: &str = "https://rt.data.gov.hk";

/// Configuration for the Citybus adapter.
#[derive(Debug, Clone)]
pub struct CtbConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for CtbConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl CtbConfig {
    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Adapter for the Citybus ETA feed, queried per (stop, route).
pub struct CtbAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl CtbAdapter {
    pub fn new(config: CtbConfig) -> Result<Self, EtaError> {
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
struct EtaResponse {
    data: Option<Vec<EtaItem>>,
}

#[derive(Debug, Deserialize)]
struct EtaItem {
    co: Option<String>,
    route: Option<String>,
    dir: Option<String>,
    eta_seq: Option<u8>,
    eta: Option<String>,
    rmk_en: Option<String>,
    rmk_tc: Option<String>,
}

impl EtaAdapter for CtbAdapter {
    fn operator(&self) -> Operator {
        Operator::Ctb
    }

    fn fetch<'a>(
        &'a self,
        request: &'a EtaRequest,
    ) -> BoxFuture<'a, Result<EtaQueryResult, EtaError>> {
        Box::pin(async move {
            let url = format!(
                "{}/v2/transport/citybus/eta/CTB/{}/{}",
                self.base_url, request.stop_id, request.route.route_number
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
            let parsed: EtaResponse =
                serde_json::from_str(&body).map_err(|e| EtaError::Malformed(e.to_string()))?;

            Ok(normalize(&parsed, request, Utc::now()))
        })
    }
}

fn normalize(response: &EtaResponse, request: &EtaRequest, now: DateTime<Utc>) -> EtaQueryResult {
    let bound = request
        .route
        .bound
        .get(&Operator::Ctb)
        .map(String::as_str)
        .unwrap_or_default();

    let mut entries = BTreeMap::new();

    for item in response.data.as_deref().unwrap_or(&[]) {
        if item.co.as_deref() != Some("CTB")
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

    EtaQueryResult::from_entries(Operator::Ctb, entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::mock::simple_route;
    use crate::eta::adapter::test_request;
    use chrono::TimeZone;

    fn request() -> EtaRequest {
        test_request(
            Operator::Ctb,
            simple_route("11", Operator::Ctb, &["001234"]),
            "001234",
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 9, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn direction_filtered_countdowns() {
        let body = r#"{"data":[
            {"co":"CTB","route":"11","dir":"O","eta_seq":1,
             "eta":"2023-09-01T20:07:00+08:00","rmk_en":"","rmk_tc":""},
            {"co":"CTB","route":"11","dir":"I","eta_seq":1,
             "eta":"2023-09-01T20:01:00+08:00","rmk_en":"","rmk_tc":""},
            {"co":"CTB","route":"11","dir":"O","eta_seq":2,
             "eta":"2023-09-01T20:19:00+08:00","rmk_en":"","rmk_tc":""}
        ]}"#;
        let parsed: EtaResponse = serde_json::from_str(body).unwrap();
        let result = normalize(&parsed, &request(), now());

        assert_eq!(result.next_countdown_minutes(), Some(7));
        assert_eq!(
            result.line(2),
            &EtaLine::Countdown {
                minutes: 19,
                remark: None
            }
        );
    }

    #[test]
    fn other_route_rows_are_ignored() {
        let body = r#"{"data":[
            {"co":"CTB","route":"12","dir":"O","eta_seq":1,
             "eta":"2023-09-01T20:03:00+08:00","rmk_en":"","rmk_tc":""}
        ]}"#;
        let parsed: EtaResponse = serde_json::from_str(body).unwrap();
        let result = normalize(&parsed, &request(), now());
        assert_eq!(result.line(1), &EtaLine::NoSchedule);
    }

    #[test]
    fn remark_phrasing_is_normalized() {
        let body = r#"{"data":[
            {"co":"CTB","route":"11","dir":"O","eta_seq":1,
             "eta":"2023-09-01T20:03:00+08:00","rmk_en":"Final Bus","rmk_tc":"最後班次"}
        ]}"#;
        let parsed: EtaResponse = serde_json::from_str(body).unwrap();
        let result = normalize(&parsed, &request(), now());
        match result.line(1) {
            EtaLine::Countdown { remark, .. } => {
                assert_eq!(remark.as_ref().unwrap().zh, "尾班車");
            }
            other => panic!("unexpected line: {other:?}"),
        }
    }
}
