//! Stop value type.

use serde::{Deserialize, Serialize};

use super::bilingual::BilingualText;
use super::coordinates::Coordinates;

/// A physical stop or station.
///
/// Stops are identified externally by a string stop id; the id lives in the
/// directory index tables, not in the value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub location: Coordinates,
    pub name: BilingualText,

    /// Extra display text, e.g. a boarding restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<BilingualText>,

    /// Operator-specific auxiliary id (e.g. an interchange or alias id
    /// used by that operator's real-time feed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_id: Option<String>,
}

impl Stop {
    pub fn new(location: Coordinates, name: BilingualText) -> Self {
        Self {
            location,
            name,
            remark: None,
            aux_id: None,
        }
    }

    pub fn with_remark(mut self, remark: BilingualText) -> Self {
        self.remark = Some(remark);
        self
    }

    pub fn with_aux_id(mut self, aux_id: impl Into<String>) -> Self {
        self.aux_id = Some(aux_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Stop {
        Stop::new(
            Coordinates::new(22.3, 114.17),
            BilingualText::new("金鐘站", "Admiralty Station"),
        )
    }

    #[test]
    fn optional_fields_default_absent() {
        let stop = sample();
        assert!(stop.remark.is_none());
        assert!(stop.aux_id.is_none());
    }

    #[test]
    fn serde_omits_absent_optionals() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(!json.contains("remark"));
        assert!(!json.contains("aux_id"));
    }

    #[test]
    fn serde_round_trip_with_optionals() {
        let stop = sample()
            .with_remark(BilingualText::new("特別班", "Special"))
            .with_aux_id("K12-U010");
        let json = serde_json::to_string(&stop).unwrap();
        assert_eq!(serde_json::from_str::<Stop>(&json).unwrap(), stop);
    }
}
