//! Multi-operator transit data registry.
//!
//! Loads and caches a large timetable/stop dataset, keeps it fresh with
//! non-blocking background refreshes, and answers the latency-sensitive
//! queries built on top of it: prefix search over route numbers, nearest
//! stop and nearby-route ranking, and per-operator real-time arrival
//! estimation with request coalescing. A small durable favourites store
//! tracks user-pinned route-stops, including ones that re-resolve to the
//! closest stop on their route.

pub mod codec;
pub mod directory;
pub mod domain;
pub mod eta;
pub mod favourites;
pub mod geo;
pub mod registry;
pub mod search;
pub mod storage;
pub mod web;
