//! Built-in upstream adapters, one module per operator.

pub mod ctb;
pub mod gmb;
pub mod kmb;
pub mod mtr_bus;
pub mod nlb;

pub use ctb::{CtbAdapter, CtbConfig};
pub use gmb::{GmbAdapter, GmbConfig};
pub use kmb::{KmbAdapter, KmbConfig};
pub use mtr_bus::{MtrBusAdapter, MtrBusConfig};
pub use nlb::{NlbAdapter, NlbConfig};

use chrono::{DateTime, FixedOffset, Utc};

use crate::domain::BilingualText;

/// Rounded minutes from `now` until `ts`.
pub(crate) fn minutes_until(ts: DateTime<FixedOffset>, now: DateTime<Utc>) -> i64 {
    let seconds = ts.signed_duration_since(now).num_seconds();
    (seconds as f64 / 60.0).round() as i64
}

/// Parse an upstream timestamp field that may be empty or the literal
/// string "null".
pub(crate) fn parse_eta_timestamp(value: Option<&str>) -> Option<DateTime<FixedOffset>> {
    let value = value?;
    if value.is_empty() || value.eq_ignore_ascii_case("null") {
        return None;
    }
    DateTime::parse_from_rfc3339(value).ok()
}

/// Normalize the operators' remark phrasing quirks (the feeds disagree on
/// how to say "last departure has passed").
pub(crate) fn clean_remark_zh(remark: &str) -> String {
    remark
        .replace("原定", "預定")
        .replace("最後班次", "尾班車")
        .replace("尾班車已過", "尾班車已過本站")
}

/// Build a bilingual remark, `None` when both sides are blank.
pub(crate) fn remark(zh: &str, en: &str) -> Option<BilingualText> {
    if zh.is_empty() && en.is_empty() {
        return None;
    }
    Some(BilingualText::new(clean_remark_zh(zh), en))
}
