//! Transit operator type.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A transit operator (bus company or rail operator).
///
/// The built-in operators are the ones this registry ships adapters and
/// stop-id patterns for. Dataset payloads may reference operators we do not
/// know about yet; those parse into [`Operator::Other`] with a lowercased
/// name, so repeated lookups of the same unknown name compare equal.
///
/// # Examples
///
/// ```
/// use eta_registry::domain::Operator;
///
/// assert_eq!(Operator::parse("KMB"), Operator::Kmb);
/// assert_eq!(Operator::parse("mtr-bus"), Operator::MtrBus);
///
/// // Unknown names are preserved as extensions
/// let ext = Operator::parse("Ferry");
/// assert_eq!(ext, Operator::Other("ferry".to_string()));
/// assert_eq!(ext.as_str(), "ferry");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    Kmb,
    Ctb,
    Nlb,
    MtrBus,
    Gmb,
    LightRail,
    Mtr,
    /// An operator not known to this build, carried by lowercased name.
    Other(String),
}

/// The built-in operators, in stable ordinal order.
pub const BUILT_IN_OPERATORS: [Operator; 7] = [
    Operator::Kmb,
    Operator::Ctb,
    Operator::Nlb,
    Operator::MtrBus,
    Operator::Gmb,
    Operator::LightRail,
    Operator::Mtr,
];

impl Operator {
    /// Parse an operator name, case-insensitively.
    ///
    /// Unknown names never fail; they become [`Operator::Other`].
    pub fn parse(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "kmb" => Operator::Kmb,
            "ctb" => Operator::Ctb,
            "nlb" => Operator::Nlb,
            "mtr-bus" => Operator::MtrBus,
            "gmb" => Operator::Gmb,
            "lightrail" => Operator::LightRail,
            "mtr" => Operator::Mtr,
            _ => Operator::Other(lower),
        }
    }

    /// Returns the canonical wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Kmb => "kmb",
            Operator::Ctb => "ctb",
            Operator::Nlb => "nlb",
            Operator::MtrBus => "mtr-bus",
            Operator::Gmb => "gmb",
            Operator::LightRail => "lightRail",
            Operator::Mtr => "mtr",
            Operator::Other(name) => name,
        }
    }

    /// Stable ordinal for deterministic iteration and sorting.
    /// Extensions sort after every built-in.
    pub fn ordinal(&self) -> u8 {
        match self {
            Operator::Kmb => 0,
            Operator::Ctb => 1,
            Operator::Nlb => 2,
            Operator::MtrBus => 3,
            Operator::Gmb => 4,
            Operator::LightRail => 5,
            Operator::Mtr => 6,
            Operator::Other(_) => 7,
        }
    }

    /// Whether this is one of the built-in operators.
    pub fn is_built_in(&self) -> bool {
        !matches!(self, Operator::Other(_))
    }

    /// Check a stop id against this operator's id shape.
    ///
    /// Each built-in operator issues stop ids in a fixed format; extensions
    /// have no known format and never match.
    pub fn matches_stop_id(&self, stop_id: &str) -> bool {
        let b = stop_id.as_bytes();
        match self {
            // 16 chars of [0-9A-Z]
            Operator::Kmb => {
                b.len() == 16
                    && b.iter()
                        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
            }
            // exactly 6 digits
            Operator::Ctb => b.len() == 6 && b.iter().all(|c| c.is_ascii_digit()),
            // 1 to 4 digits
            Operator::Nlb => (1..=4).contains(&b.len()) && b.iter().all(|c| c.is_ascii_digit()),
            // [A-Z]? digits{1,3} [A-Z]? '-' [A-Z] digits{3}
            Operator::MtrBus => matches_mtr_bus_stop_id(b),
            // exactly 8 digits
            Operator::Gmb => b.len() == 8 && b.iter().all(|c| c.is_ascii_digit()),
            // "LR" followed by at least one digit
            Operator::LightRail => {
                b.len() > 2 && b.starts_with(b"LR") && b[2..].iter().all(|c| c.is_ascii_digit())
            }
            // 3 uppercase letters
            Operator::Mtr => b.len() == 3 && b.iter().all(|c| c.is_ascii_uppercase()),
            Operator::Other(_) => false,
        }
    }

    /// Identify which built-in operator issued a stop id, if any.
    ///
    /// Returns the first built-in (in ordinal order) whose pattern matches.
    pub fn for_stop_id(stop_id: &str) -> Option<Operator> {
        BUILT_IN_OPERATORS
            .iter()
            .find(|op| op.matches_stop_id(stop_id))
            .cloned()
    }
}

fn matches_mtr_bus_stop_id(b: &[u8]) -> bool {
    let Some(dash) = b.iter().position(|&c| c == b'-') else {
        return false;
    };
    let (left, right) = (&b[..dash], &b[dash + 1..]);

    // Right of the dash: one uppercase letter then exactly three digits.
    if right.len() != 4
        || !right[0].is_ascii_uppercase()
        || !right[1..].iter().all(|c| c.is_ascii_digit())
    {
        return false;
    }

    // Left of the dash: optional letter, 1-3 digits, optional letter.
    let mut digits = left;
    match digits.split_first() {
        Some((first, rest)) if first.is_ascii_uppercase() => digits = rest,
        Some(_) => {}
        None => return false,
    }
    if let Some((last, rest)) = digits.split_last()
        && last.is_ascii_uppercase()
    {
        digits = rest;
    }
    !digits.is_empty() && digits.len() <= 3 && digits.iter().all(|c| c.is_ascii_digit())
}

impl PartialOrd for Operator {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Operator {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal()
            .cmp(&other.ordinal())
            .then_with(|| self.as_str().cmp(other.as_str()))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OperatorVisitor;

        impl Visitor<'_> for OperatorVisitor {
            type Value = Operator;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an operator name string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Operator, E> {
                Ok(Operator::parse(v))
            }
        }

        deserializer.deserialize_str(OperatorVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_built_ins() {
        assert_eq!(Operator::parse("kmb"), Operator::Kmb);
        assert_eq!(Operator::parse("ctb"), Operator::Ctb);
        assert_eq!(Operator::parse("nlb"), Operator::Nlb);
        assert_eq!(Operator::parse("mtr-bus"), Operator::MtrBus);
        assert_eq!(Operator::parse("gmb"), Operator::Gmb);
        assert_eq!(Operator::parse("lightRail"), Operator::LightRail);
        assert_eq!(Operator::parse("mtr"), Operator::Mtr);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Operator::parse("KMB"), Operator::Kmb);
        assert_eq!(Operator::parse("Mtr-Bus"), Operator::MtrBus);
        assert_eq!(Operator::parse("LIGHTRAIL"), Operator::LightRail);
    }

    #[test]
    fn unknown_names_are_interchangeable() {
        let a = Operator::parse("ferry");
        let b = Operator::parse("Ferry");
        assert_eq!(a, b);
        assert!(!a.is_built_in());
    }

    #[test]
    fn round_trip_through_name() {
        for op in BUILT_IN_OPERATORS {
            assert_eq!(Operator::parse(op.as_str()), op);
        }
    }

    #[test]
    fn ordinals_are_distinct_and_ordered() {
        let mut sorted = BUILT_IN_OPERATORS.to_vec();
        sorted.sort();
        assert_eq!(sorted, BUILT_IN_OPERATORS.to_vec());
        assert!(Operator::parse("xyz") > Operator::Mtr);
    }

    #[test]
    fn stop_id_patterns() {
        assert!(Operator::Kmb.matches_stop_id("A1B2C3D4E5F6A7B8"));
        assert!(!Operator::Kmb.matches_stop_id("a1b2c3d4e5f6a7b8"));
        assert!(Operator::Ctb.matches_stop_id("001234"));
        assert!(!Operator::Ctb.matches_stop_id("01234"));
        assert!(Operator::Nlb.matches_stop_id("1"));
        assert!(Operator::Nlb.matches_stop_id("1234"));
        assert!(!Operator::Nlb.matches_stop_id("12345"));
        assert!(Operator::Gmb.matches_stop_id("20001477"));
        assert!(Operator::LightRail.matches_stop_id("LR140"));
        assert!(!Operator::LightRail.matches_stop_id("LR"));
        assert!(Operator::Mtr.matches_stop_id("TIS"));
        assert!(!Operator::Mtr.matches_stop_id("TISX"));
    }

    #[test]
    fn mtr_bus_stop_id_pattern() {
        assert!(Operator::MtrBus.matches_stop_id("K12-U010"));
        assert!(Operator::MtrBus.matches_stop_id("506-D020"));
        assert!(Operator::MtrBus.matches_stop_id("K12A-U010"));
        assert!(!Operator::MtrBus.matches_stop_id("K12-U01"));
        assert!(!Operator::MtrBus.matches_stop_id("K-U010"));
        assert!(!Operator::MtrBus.matches_stop_id("1234-U010"));
        assert!(!Operator::MtrBus.matches_stop_id("K12U010"));
    }

    #[test]
    fn for_stop_id_identifies_operator() {
        assert_eq!(
            Operator::for_stop_id("A1B2C3D4E5F6A7B8"),
            Some(Operator::Kmb)
        );
        assert_eq!(Operator::for_stop_id("001234"), Some(Operator::Ctb));
        assert_eq!(Operator::for_stop_id("??"), None);
    }

    #[test]
    fn serde_round_trip() {
        for op in BUILT_IN_OPERATORS {
            let json = serde_json::to_string(&op).unwrap();
            let back: Operator = serde_json::from_str(&json).unwrap();
            assert_eq!(back, op);
        }
        let other = Operator::parse("ferry");
        let json = serde_json::to_string(&other).unwrap();
        assert_eq!(json, "\"ferry\"");
        assert_eq!(serde_json::from_str::<Operator>(&json).unwrap(), other);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Parsing the canonical name of any parsed operator is idempotent.
        #[test]
        fn parse_as_str_round_trip(s in "[a-zA-Z-]{1,12}") {
            let op = Operator::parse(&s);
            prop_assert_eq!(Operator::parse(op.as_str()), op);
        }

        /// Case never affects the parsed value.
        #[test]
        fn parse_ignores_case(s in "[a-zA-Z-]{1,12}") {
            prop_assert_eq!(Operator::parse(&s.to_uppercase()), Operator::parse(&s.to_lowercase()));
        }

        /// Six digits always reads as a CTB stop id, never as KMB.
        #[test]
        fn ctb_digits(s in "[0-9]{6}") {
            prop_assert!(Operator::Ctb.matches_stop_id(&s));
            prop_assert!(!Operator::Kmb.matches_stop_id(&s));
        }
    }
}
