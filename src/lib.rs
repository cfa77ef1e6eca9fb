//! Canvass - find nearby addresses to canvass from a starting street address.
//!
//! This library provides the geocoding, proximity search, postprocessing and
//! access-gate pieces shared by the server and ingest binaries.

pub mod access;
pub mod canvass;
pub mod config;
pub mod dataset;
pub mod elasticsearch;
pub mod error;
pub mod geocoder;
pub mod models;
pub mod postprocess;
pub mod region;
pub mod search;

pub use canvass::{handle_submission, RenderModel, SearchContext, Submission};
pub use error::CanvassError;
pub use models::{AddressRecord, GeoPoint, OriginPoint, UnitCategory};
