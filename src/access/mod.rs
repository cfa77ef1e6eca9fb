//! Access gate backed by an externally maintained allow-list.

mod allowlist;
mod cache;
mod gate;

pub use allowlist::{AllowList, AllowListSource, SheetSource, StaticSource};
pub use cache::{AllowListCache, DEFAULT_TTL};
pub use gate::{AccessGate, GateState};
