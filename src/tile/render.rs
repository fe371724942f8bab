//! Render coordination.
//!
//! ```text
//!   get ──hit──────────────────────────────────────────────▶ cached
//!    │
//!   miss
//!    │
//!   attempt_lock ──acquired──▶ get ──hit──▶ unlock ───────▶ cached
//!    │      ▲                   │
//!    │      │                  miss ──▶ render, set, unlock ▶ rendered
//!    │      │
//!   held ──▶ wait, get ──hit───────────────────────────────▶ cached
//!    │              │
//!    │          timeout ──┐
//!    │                    ▼
//!   unavailable ──────▶ get ──hit──────────────────────────▶ cached
//!                        │
//!                       miss ──▶ render, set ──────────────▶ rendered
//! ```
//!
//! A caller that finds the lock held polls for the holder's tile until
//! the lock timeout, retrying the lock between polls. Only then does it
//! render unlocked. When the lock service cannot be reached nobody waits.

use std::future::Future;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::debug;

use super::store::TileStore;
use crate::error::StoreError;
use crate::key::TileCoord;
use crate::lock::{AdvisoryLock, LockAttempt};
use crate::store::BucketStore;

/// Outcome of [`TileStore::get_or_render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTile {
    /// Tile payload
    pub data: Bytes,

    /// Whether the payload came from the store rather than the renderer
    pub cache_hit: bool,

    /// Whether this call held the render lock
    pub locked: bool,
}

impl RenderedTile {
    fn cached(data: Bytes, locked: bool) -> Self {
        Self {
            data,
            cache_hit: true,
            locked,
        }
    }

    fn rendered(data: Bytes, locked: bool) -> Self {
        Self {
            data,
            cache_hit: false,
            locked,
        }
    }
}

impl<S: BucketStore, L: AdvisoryLock> TileStore<S, L> {
    /// Return the cached tile, rendering and storing it on a miss.
    ///
    /// `render` runs at most once. Its error type must absorb
    /// [`StoreError`] so store failures and render failures come back
    /// through the same `Result`. The render lock is released whether or
    /// not rendering succeeds.
    ///
    /// While another worker holds the lock this waits up to the lock
    /// timeout for that worker's tile to appear.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let tile = tiles
    ///     .get_or_render(&coord, || async { renderer.render(&coord).await })
    ///     .await?;
    /// ```
    pub async fn get_or_render<F, Fut, E>(&self, coord: &TileCoord, render: F) -> Result<RenderedTile, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
        E: From<StoreError>,
    {
        if let Some(data) = self.get(coord).await? {
            return Ok(RenderedTile::cached(data, false));
        }

        let key = coord.lock_key();
        let mut attempt = self.lock().attempt(&key, self.timeout()).await;

        if attempt == LockAttempt::Held {
            let deadline = Instant::now() + self.timeout();
            while attempt == LockAttempt::Held && Instant::now() < deadline {
                tokio::time::sleep(self.poll_interval()).await;
                if let Some(data) = self.get(coord).await? {
                    return Ok(RenderedTile::cached(data, false));
                }
                attempt = self.lock().attempt(&key, self.timeout()).await;
            }
        }

        match attempt {
            LockAttempt::Acquired => {
                let result = self.render_missing(coord, render, true).await;
                self.unlock(coord).await;
                result
            }
            LockAttempt::Held => {
                debug!(tile = %coord, "Gave up waiting on render lock, continuing unlocked");
                self.render_missing(coord, render, false).await
            }
            LockAttempt::Unavailable => self.render_missing(coord, render, false).await,
        }
    }

    async fn render_missing<F, Fut, E>(
        &self,
        coord: &TileCoord,
        render: F,
        locked: bool,
    ) -> Result<RenderedTile, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
        E: From<StoreError>,
    {
        if let Some(data) = self.get(coord).await? {
            return Ok(RenderedTile::cached(data, locked));
        }

        let data = render().await?;
        let data = self.set(coord, data).await?;
        debug!(tile = %coord, locked, "Rendered tile");
        Ok(RenderedTile::rendered(data, locked))
    }
}
