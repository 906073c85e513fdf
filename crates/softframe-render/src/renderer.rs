//! One render tick: surface in, finished frame out.

use crate::observer::PlaybackObserver;
use crate::state::SharedState;
use crate::subtitle::SubtitleCompositor;
use crate::surface_pool::{PooledSurface, SurfacePool};
use softframe_color::ColorAttachments;
use softframe_engine::{RenderContext, SoftwareTarget};
use std::sync::Arc;
use tracing::{error, info, trace};

/// A rendered surface on its way to the display.
#[derive(Debug)]
pub struct RenderedFrame {
    pub surface: PooledSurface,
    pub attachments: ColorAttachments,
    /// First frame after a video reconfig.
    pub reconfigured: bool,
}

/// Renderer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub rendered: u64,
    pub dropped: u64,
    /// Ticks skipped because no video size is known yet.
    pub skipped: u64,
    pub resizes: u64,
}

/// Produces frames from the engine's render context.
///
/// Owned by the render thread, which is the only mutator of the pool
/// target and the subtitle cache.
pub struct FrameRenderer {
    state: Arc<SharedState>,
    pool: SurfacePool,
    compositor: SubtitleCompositor,
    observer: Arc<dyn PlaybackObserver>,
    stats: RenderStats,
}

impl FrameRenderer {
    pub fn new(
        state: Arc<SharedState>,
        pool: SurfacePool,
        observer: Arc<dyn PlaybackObserver>,
        subtitle_safe_width: f32,
    ) -> Self {
        Self {
            state,
            pool,
            compositor: SubtitleCompositor::new(subtitle_safe_width),
            observer,
            stats: RenderStats::default(),
        }
    }

    /// Render the current frame. `None` means nothing to deliver this tick.
    pub fn render_tick(&mut self, ctx: &mut dyn RenderContext) -> Option<RenderedFrame> {
        let dims = self.state.dimensions();
        if dims.is_empty() {
            self.stats.skipped += 1;
            return None;
        }

        let target = self.pool.target();
        if target != dims {
            info!(from = %target, to = %dims, "video size changed, rebuilding surface pool");
            self.pool.resize(dims.width, dims.height);
            self.stats.resizes += 1;
        }

        let mut surface = match self.pool.acquire(dims.width, dims.height) {
            Ok(surface) => surface,
            Err(e) => {
                error!(
                    error = %e,
                    width = dims.width,
                    height = dims.height,
                    "no surface, frame dropped"
                );
                self.stats.dropped += 1;
                return None;
            }
        };

        if let Err(e) = surface.validate() {
            error!(
                error = %e,
                width = surface.width(),
                height = surface.height(),
                stride = surface.stride(),
                len = surface.memory_size(),
                "surface layout invalid, frame dropped"
            );
            self.stats.dropped += 1;
            return None;
        }
        if self.state.take_clear() {
            surface.clear();
        }

        if let Err(e) = ctx.render_sw(SoftwareTarget::for_surface(&mut surface)) {
            error!(error = %e, "engine render failed, frame dropped");
            self.stats.dropped += 1;
            return None;
        }

        let attachments = ColorAttachments::from_state(&self.state.color());

        let style = self.observer.subtitle_style();
        let text = if style.enabled {
            self.observer.subtitle_text(self.state.playback().position)
        } else {
            None
        };
        if self.compositor.composite(&mut surface, text.as_deref(), &style) {
            trace!("subtitle composited");
        }

        let reconfigured = self.state.take_reconfig();
        self.pool.replenish_if_low();
        self.stats.rendered += 1;

        Some(RenderedFrame {
            surface,
            attachments,
            reconfigured,
        })
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    pub fn compositor(&self) -> &SubtitleCompositor {
        &self.compositor
    }

    /// Release pooled memory and cached subtitles.
    pub fn reset(&mut self) {
        self.compositor.reset();
        self.pool.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::subtitle::SubtitleStyle;
    use crate::surface_pool::PoolConfig;
    use softframe_color::{ColorState, Transfer};
    use softframe_core::VideoDimensions;
    use softframe_engine::{DecodeEngine, SyntheticConfig, SyntheticEngine};

    struct Subtitles(&'static str);

    impl PlaybackObserver for Subtitles {
        fn subtitle_text(&self, _position: f64) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn setup(
        observer: Arc<dyn PlaybackObserver>,
    ) -> (FrameRenderer, Arc<SharedState>, SyntheticEngine) {
        let state = Arc::new(SharedState::new());
        let pool = SurfacePool::new(PoolConfig {
            warm_in_background: false,
            ..Default::default()
        });
        let renderer = FrameRenderer::new(Arc::clone(&state), pool, observer, 0.9);
        let engine = SyntheticEngine::new(SyntheticConfig::default());
        (renderer, state, engine)
    }

    #[test]
    fn test_zero_size_skips() {
        let (mut renderer, _state, engine) = setup(Arc::new(NoopObserver));
        let mut ctx = engine.create_render_context().unwrap();
        assert!(renderer.render_tick(ctx.as_mut()).is_none());
        assert_eq!(renderer.stats().skipped, 1);
        assert_eq!(renderer.stats().dropped, 0);
    }

    #[test]
    fn test_renders_at_current_size() {
        let (mut renderer, state, engine) = setup(Arc::new(NoopObserver));
        let mut ctx = engine.create_render_context().unwrap();
        state.set_dimensions(VideoDimensions::new(320, 180));
        state.mark_reconfig();

        let frame = renderer.render_tick(ctx.as_mut()).unwrap();
        assert_eq!(frame.surface.dimensions(), VideoDimensions::new(320, 180));
        assert!(frame.reconfigured);
        assert!(frame.surface.is_pooled());
        assert_eq!(frame.surface.pixel(0, 0), [255, 255, 255, 255]);
        assert!(frame.attachments.is_passthrough());

        let next = renderer.render_tick(ctx.as_mut()).unwrap();
        assert!(!next.reconfigured);
        assert_eq!(engine.rendered_frames(), 2);
    }

    #[test]
    fn test_resize_rebuilds_pool() {
        let (mut renderer, state, engine) = setup(Arc::new(NoopObserver));
        let mut ctx = engine.create_render_context().unwrap();
        state.set_dimensions(VideoDimensions::new(320, 180));
        let old = renderer.render_tick(ctx.as_mut()).unwrap();

        state.set_dimensions(VideoDimensions::new(160, 90));
        let new = renderer.render_tick(ctx.as_mut()).unwrap();
        assert_eq!(new.surface.dimensions(), VideoDimensions::new(160, 90));
        assert!(renderer
            .pool()
            .idle_dimensions()
            .iter()
            .all(|d| *d == VideoDimensions::new(160, 90)));
        drop(old);
        assert!(renderer
            .pool()
            .idle_dimensions()
            .iter()
            .all(|d| *d == VideoDimensions::new(160, 90)));
        assert_eq!(renderer.stats().resizes, 2);
    }

    #[test]
    fn test_engine_failure_drops_frame() {
        let (mut renderer, state, engine) = setup(Arc::new(NoopObserver));
        let mut ctx = engine.create_render_context().unwrap();
        state.set_dimensions(VideoDimensions::new(64, 64));
        engine.fail_next_renders(1);
        assert!(renderer.render_tick(ctx.as_mut()).is_none());
        assert_eq!(renderer.stats().dropped, 1);
        assert!(renderer.render_tick(ctx.as_mut()).is_some());
    }

    #[test]
    fn test_color_attachments_follow_state() {
        let (mut renderer, state, engine) = setup(Arc::new(NoopObserver));
        let mut ctx = engine.create_render_context().unwrap();
        state.set_dimensions(VideoDimensions::new(64, 64));
        state.update_color(|c: &mut ColorState| {
            c.apply_transfer(Some("smpte2084"));
            c.apply_primaries(Some("bt.2020"));
        });
        let frame = renderer.render_tick(ctx.as_mut()).unwrap();
        assert_eq!(frame.attachments.transfer, Some(Transfer::Pq));
        assert!(frame.attachments.edr);
    }

    #[test]
    fn test_subtitles_burned_in_and_cached() {
        let (mut renderer, state, engine) = setup(Arc::new(Subtitles("Hello")));
        let mut ctx = engine.create_render_context().unwrap();
        state.set_dimensions(VideoDimensions::new(640, 360));
        renderer.render_tick(ctx.as_mut()).unwrap();
        renderer.render_tick(ctx.as_mut()).unwrap();
        assert!(renderer.compositor().is_showing());
        assert_eq!(renderer.compositor().rasterizations(), 1);
    }

    #[test]
    fn test_disabled_style_skips_lookup() {
        struct Disabled;
        impl PlaybackObserver for Disabled {
            fn subtitle_text(&self, _position: f64) -> Option<String> {
                panic!("lookup with subtitles disabled");
            }
            fn subtitle_style(&self) -> SubtitleStyle {
                SubtitleStyle {
                    enabled: false,
                    ..Default::default()
                }
            }
        }
        let (mut renderer, state, engine) = setup(Arc::new(Disabled));
        let mut ctx = engine.create_render_context().unwrap();
        state.set_dimensions(VideoDimensions::new(64, 64));
        assert!(renderer.render_tick(ctx.as_mut()).is_some());
        assert!(!renderer.compositor().is_showing());
    }

    #[test]
    fn test_clear_flag_consumed() {
        let (mut renderer, state, engine) = setup(Arc::new(NoopObserver));
        let mut ctx = engine.create_render_context().unwrap();
        state.set_dimensions(VideoDimensions::new(64, 64));
        state.request_clear();
        renderer.render_tick(ctx.as_mut()).unwrap();
        assert!(!state.take_clear());
    }
}
