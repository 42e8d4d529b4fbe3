//! distribution-planner
//!
//! Turns a set of client records into delivery routes: geocode addresses,
//! group the stops into vehicle-sized clusters, and order each cluster.
//! External services sit behind the traits in [`traits`].

pub mod api;
pub mod cache;
pub mod clustering;
pub mod directory;
pub mod distance;
pub mod error;
pub mod geocoding;
pub mod haversine;
pub mod jobs;
pub mod model;
pub mod nominatim;
pub mod osrm;
pub mod planner;
pub mod rate_limit;
pub mod retry;
pub mod sequencer;
pub mod traits;
