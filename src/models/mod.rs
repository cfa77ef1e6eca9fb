//! Core data models for the canvassing pipeline.

pub mod origin;
pub mod parcel;
pub mod record;

pub use origin::{GeoPoint, OriginPoint};
pub use parcel::ParcelDoc;
pub use record::{AddressRecord, RankKey, UnitCategory};
