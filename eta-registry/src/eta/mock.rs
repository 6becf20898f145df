//! Scripted ETA adapter for dispatcher tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;

use crate::domain::Operator;

use super::adapter::{EtaAdapter, EtaRequest};
use super::error::EtaError;
use super::result::{EtaLine, EtaQueryResult};

/// An adapter serving canned lines, with latency and failure injection and
/// an upstream-invocation counter.
pub struct MockEtaAdapter {
    operator: Operator,
    lines: Mutex<BTreeMap<u8, EtaLine>>,
    delay: Mutex<Duration>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockEtaAdapter {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            lines: Mutex::new(BTreeMap::from([(
                1,
                EtaLine::Countdown {
                    minutes: 5,
                    remark: None,
                },
            )])),
            delay: Mutex::new(Duration::ZERO),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_lines(&self, lines: BTreeMap<u8, EtaLine>) {
        *self.lines.lock().unwrap() = lines;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// How many times the "upstream" was actually invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EtaAdapter for MockEtaAdapter {
    fn operator(&self) -> Operator {
        self.operator.clone()
    }

    fn fetch<'a>(
        &'a self,
        _request: &'a EtaRequest,
    ) -> BoxFuture<'a, Result<EtaQueryResult, EtaError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(EtaError::Upstream {
                    status: 500,
                    message: "injected upstream failure".to_string(),
                });
            }
            let lines = self.lines.lock().unwrap().clone();
            Ok(EtaQueryResult::from_entries(self.operator.clone(), lines))
        })
    }
}
