//! Pool of reusable BGRA surfaces sized to the current video.
//!
//! Avoids allocating a frame-sized buffer per tick. Surfaces leave the pool
//! as [`PooledSurface`] handles and come back when the handle is dropped,
//! wherever that happens (usually on the presentation thread once the
//! display has let go of the sample). The pool never reclaims a surface
//! that is still in flight.
//!
//! All idle surfaces share the pool's target size. A new target size bumps
//! the pool generation: the idle list is dropped, and handles from the old
//! generation are freed instead of pooled when they come back.

use parking_lot::Mutex;
use softframe_core::{Surface, SurfaceError, VideoDimensions};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Source of surface memory.
pub trait SurfaceAllocator: Send + Sync {
    fn allocate(&self, width: u32, height: u32) -> Result<Surface, SurfaceError>;
}

/// Plain heap allocation with an aligned stride.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl SurfaceAllocator for HeapAllocator {
    fn allocate(&self, width: u32, height: u32) -> Result<Surface, SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::ZeroSized { width, height });
        }
        Surface::try_new(width, height)
    }
}

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle surfaces to keep ready.
    pub warm_target: usize,
    /// Maximum live pooled surfaces (idle + in flight) per generation.
    pub hard_cap: usize,
    /// Idle count that triggers [`SurfacePool::replenish_if_low`].
    pub low_water: usize,
    /// Run warm-up on the rayon pool instead of the calling thread.
    pub warm_in_background: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            warm_target: softframe_core::limits::DEFAULT_WARM_TARGET,
            hard_cap: softframe_core::limits::DEFAULT_POOL_HARD_CAP,
            low_water: softframe_core::limits::DEFAULT_LOW_WATER,
            warm_in_background: true,
        }
    }
}

/// Pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Pooled surfaces allocated (acquire misses plus warm-up).
    pub allocations: u64,
    /// Acquires served from the idle list.
    pub reuses: u64,
    /// Unpooled fallback allocations.
    pub direct_allocations: u64,
    /// Surfaces freed on return because they no longer fit.
    pub stale_drops: u64,
    /// Target size changes.
    pub resizes: u64,
}

struct PoolInner {
    target: VideoDimensions,
    idle: Vec<Surface>,
    generation: u64,
    /// Pooled surfaces of the current generation, idle or in flight.
    live: usize,
    stats: PoolStats,
}

struct PoolShared {
    inner: Mutex<PoolInner>,
    allocator: Arc<dyn SurfaceAllocator>,
    config: PoolConfig,
    warming: AtomicBool,
}

/// Shared handle to a surface pool.
#[derive(Clone)]
pub struct SurfacePool {
    shared: Arc<PoolShared>,
}

impl SurfacePool {
    /// Create a pool backed by heap allocation.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_allocator(config, Arc::new(HeapAllocator))
    }

    /// Create a pool with a custom allocator.
    pub fn with_allocator(config: PoolConfig, allocator: Arc<dyn SurfaceAllocator>) -> Self {
        let config = PoolConfig {
            hard_cap: config.hard_cap.max(1),
            warm_target: config.warm_target.min(config.hard_cap.max(1)),
            ..config
        };
        Self {
            shared: Arc::new(PoolShared {
                inner: Mutex::new(PoolInner {
                    target: VideoDimensions::ZERO,
                    idle: Vec::new(),
                    generation: 0,
                    live: 0,
                    stats: PoolStats::default(),
                }),
                allocator,
                config,
                warming: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.shared.config
    }

    /// Current target size.
    pub fn target(&self) -> VideoDimensions {
        self.shared.inner.lock().target
    }

    /// Retarget the pool. Returns true if the size changed, in which case
    /// every idle surface has been dropped and a warm-up scheduled.
    pub fn resize(&self, width: u32, height: u32) -> bool {
        let dims = VideoDimensions::new(width, height);
        let changed = {
            let mut inner = self.shared.inner.lock();
            if inner.target == dims {
                false
            } else {
                invalidate(&mut inner, dims);
                true
            }
        };
        if changed && !dims.is_empty() {
            self.schedule_warmup();
        }
        changed
    }

    /// Take a surface of the given size.
    ///
    /// Reuses an idle surface when one fits, otherwise allocates. A pooled
    /// allocation that fails or would exceed the hard cap falls back to a
    /// direct allocation; only if that also fails is an error returned.
    pub fn acquire(&self, width: u32, height: u32) -> Result<PooledSurface, SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::ZeroSized { width, height });
        }
        let dims = VideoDimensions::new(width, height);

        let reserved = {
            let mut inner = self.shared.inner.lock();
            if inner.target != dims {
                invalidate(&mut inner, dims);
            }
            if let Some(surface) = inner.idle.pop() {
                inner.stats.reuses += 1;
                let generation = inner.generation;
                drop(inner);
                self.maybe_warm();
                return Ok(PooledSurface::pooled(surface, &self.shared, generation));
            }
            if inner.live < self.shared.config.hard_cap {
                inner.live += 1;
                Ok(inner.generation)
            } else {
                Err(SurfaceError::PoolExhausted {
                    cap: self.shared.config.hard_cap,
                })
            }
        };

        let fallback_reason = match reserved {
            Ok(generation) => match self.shared.allocator.allocate(width, height) {
                Ok(surface) => {
                    self.shared.inner.lock().stats.allocations += 1;
                    self.maybe_warm();
                    return Ok(PooledSurface::pooled(surface, &self.shared, generation));
                }
                Err(e) => {
                    let mut inner = self.shared.inner.lock();
                    if inner.generation == generation {
                        inner.live = inner.live.saturating_sub(1);
                    }
                    e
                }
            },
            Err(e) => e,
        };

        warn!(
            width,
            height,
            error = %fallback_reason,
            "pooled surface unavailable, falling back to direct allocation"
        );
        let surface = self.shared.allocator.allocate(width, height)?;
        self.shared.inner.lock().stats.direct_allocations += 1;
        Ok(PooledSurface::detached(surface))
    }

    /// Top up the idle list if it has fallen below the low-water mark.
    pub fn replenish_if_low(&self) {
        let low = self.shared.inner.lock().idle.len() < self.shared.config.low_water;
        if low {
            self.schedule_warmup();
        }
    }

    /// Drop every idle surface and forget the target size.
    pub fn clear(&self) {
        let mut inner = self.shared.inner.lock();
        let dropped = inner.idle.len();
        invalidate(&mut inner, VideoDimensions::ZERO);
        debug!(dropped, "surface pool cleared");
    }

    /// Number of idle surfaces.
    pub fn idle_count(&self) -> usize {
        self.shared.inner.lock().idle.len()
    }

    /// Sizes of the idle surfaces.
    pub fn idle_dimensions(&self) -> Vec<VideoDimensions> {
        self.shared
            .inner
            .lock()
            .idle
            .iter()
            .map(Surface::dimensions)
            .collect()
    }

    /// Live pooled surfaces of the current generation.
    pub fn live_count(&self) -> usize {
        self.shared.inner.lock().live
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.inner.lock().stats
    }

    fn maybe_warm(&self) {
        let below = self.shared.inner.lock().idle.len() < self.shared.config.warm_target;
        if below {
            self.schedule_warmup();
        }
    }

    fn schedule_warmup(&self) {
        if self
            .shared
            .warming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let shared = Arc::clone(&self.shared);
        if self.shared.config.warm_in_background {
            rayon::spawn(move || {
                shared.warm_up();
                shared.warming.store(false, Ordering::Release);
            });
        } else {
            shared.warm_up();
            shared.warming.store(false, Ordering::Release);
        }
    }
}

fn invalidate(inner: &mut PoolInner, dims: VideoDimensions) {
    if inner.target != dims && !dims.is_empty() {
        info!(
            from = %inner.target,
            to = %dims,
            dropped = inner.idle.len(),
            "surface pool retargeted"
        );
        inner.stats.resizes += 1;
    }
    inner.idle.clear();
    inner.target = dims;
    inner.generation += 1;
    inner.live = 0;
}

impl PoolShared {
    /// Allocate idle surfaces up to the warm target, never past the cap.
    fn warm_up(&self) {
        let mut added = 0usize;
        loop {
            let (generation, dims) = {
                let mut inner = self.inner.lock();
                if inner.target.is_empty()
                    || inner.idle.len() >= self.config.warm_target
                    || inner.live >= self.config.hard_cap
                {
                    break;
                }
                inner.live += 1;
                (inner.generation, inner.target)
            };

            match self.allocator.allocate(dims.width, dims.height) {
                Ok(surface) => {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        // Retargeted while allocating; this size is stale.
                        break;
                    }
                    if surface.dimensions() == inner.target && surface.validate().is_ok() {
                        inner.idle.push(surface);
                        inner.stats.allocations += 1;
                        added += 1;
                    } else {
                        inner.live = inner.live.saturating_sub(1);
                        break;
                    }
                }
                Err(e) => {
                    let mut inner = self.inner.lock();
                    if inner.generation == generation {
                        inner.live = inner.live.saturating_sub(1);
                    }
                    warn!(error = %e, "surface warm-up stopped");
                    break;
                }
            }
        }
        if added > 0 {
            debug!(added, "surface pool warmed");
        }
    }

    fn release(&self, surface: Surface, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            inner.stats.stale_drops += 1;
            return;
        }
        let fits = surface.dimensions() == inner.target
            && surface.validate().is_ok()
            && inner.idle.len() < self.config.hard_cap;
        if fits {
            inner.idle.push(surface);
        } else {
            inner.live = inner.live.saturating_sub(1);
            inner.stats.stale_drops += 1;
        }
    }
}

/// A surface on loan from a pool.
///
/// Dereferences to [`Surface`]. Dropping it returns the surface to the pool
/// it came from, if that pool still exists and still wants that size.
pub struct PooledSurface {
    surface: Surface,
    origin: Option<(Weak<PoolShared>, u64)>,
}

impl PooledSurface {
    fn pooled(surface: Surface, shared: &Arc<PoolShared>, generation: u64) -> Self {
        Self {
            surface,
            origin: Some((Arc::downgrade(shared), generation)),
        }
    }

    /// A surface that is freed rather than pooled on drop.
    pub fn detached(surface: Surface) -> Self {
        Self {
            surface,
            origin: None,
        }
    }

    /// Whether the surface goes back to a pool on drop.
    pub fn is_pooled(&self) -> bool {
        self.origin.is_some()
    }
}

impl Deref for PooledSurface {
    type Target = Surface;

    fn deref(&self) -> &Surface {
        &self.surface
    }
}

impl DerefMut for PooledSurface {
    fn deref_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }
}

impl std::fmt::Debug for PooledSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSurface")
            .field("dimensions", &self.surface.dimensions())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl Drop for PooledSurface {
    fn drop(&mut self) {
        if let Some((pool, generation)) = self.origin.take() {
            if let Some(pool) = pool.upgrade() {
                let empty = Surface::from_raw(Vec::new(), 0, 0, 0);
                let surface = std::mem::replace(&mut self.surface, empty);
                pool.release(surface, generation);
            }
        }
    }
}
