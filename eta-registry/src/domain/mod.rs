//! Domain types for the transit data registry.
//!
//! These are the validated value types the rest of the registry operates
//! on. All of them are immutable once constructed; shared ownership is by
//! `Arc` at the component layer, never by interior mutation.

mod bilingual;
mod coordinates;
mod operator;
mod route;
mod search_result;
mod stop;

pub use bilingual::{BilingualText, Language};
pub use coordinates::Coordinates;
pub use operator::{BUILT_IN_OPERATORS, Operator};
pub use route::{Route, RouteKey};
pub use search_result::{RouteSearchResultEntry, StopInfo};
pub use stop::Stop;
