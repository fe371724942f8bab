//! Tile cache client.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Renderer / Admin Tool           │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileStore                 │
//! │  get / set / delete     attempt_lock    │
//! │  get_or_render          unlock          │
//! └─────────┬──────────────────────┬────────┘
//!           │ row, column          │ lock key
//!           ▼                      ▼
//! ┌───────────────────┐  ┌───────────────────┐
//! │    BucketStore    │  │   AdvisoryLock    │
//! │    (Cassandra)    │  │    (memcached)    │
//! └───────────────────┘  └───────────────────┘
//! ```
//!
//! - [`TileStore`]: tile get/set/delete keyed by [`TileCoord`](crate::key::TileCoord),
//!   render locks, and per-layer counts and invalidation
//! - [`RenderedTile`]: result of [`TileStore::get_or_render`]
//! - [`LayerCount`]: tiles cached for one layer

mod render;
mod store;

pub use render::RenderedTile;
pub use store::{LayerCount, TileStore, LOCK_POLL_INTERVAL};
