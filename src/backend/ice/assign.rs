use drm_fourcc::DrmFourcc;
use tracing::{debug, trace, warn};

use super::cursor::{IceCursor, CURSOR_SIZE};
use super::device::{GdlDevice, GdlPlane};
use super::output::IceOutput;
use super::plane::{IcePlane, PlaneConfig, Tint};
use crate::backend::scanout::clip::{align_even_vertical, check_scale, clip_view};
use crate::backend::scanout::format::{classify_alpha, has_alpha, AlphaBlend, ColorSpace};
use crate::backend::scanout::{
    assign_views, BufferKind, DebugFlags, PlaneAssigner, PlaneAssignments, Rejection, ScaleLimits, ScanoutSource,
    SidebandKind, TransformFlags, View,
};
use crate::utils::{Physical, Rectangle, Size, Transform};

/// The UPP scaler only enlarges, and only narrow sources
const ICE_SCALE_LIMITS: ScaleLimits = ScaleLimits {
    max_upscale: None,
    max_downscale: Some(1),
    max_src_width: Some(1280),
    interlaced: false,
};

impl<D: GdlDevice, R> IceOutput<D, R> {
    /// Place `views`, ordered topmost first, on the hardware planes
    ///
    /// Views that get no plane must be rendered into the framebuffer before
    /// [`IceOutput::repaint`] is called.
    #[profiling::function]
    pub fn assign_planes(&mut self, views: &[View]) -> PlaneAssignments<GdlPlane> {
        let span = self.span.clone();
        let _guard = span.enter();

        let assignments = assign_views(self, views);
        self.primary_in_use = assignments.primary_in_use;
        assignments
    }

    /// Pool index of the overlay plane with raw id `raw`
    pub(super) fn plane_index(&self, raw: u32) -> Option<usize> {
        let id = GdlPlane::from_raw(raw)?;
        self.planes.position(|plane| plane.id == id)
    }

    fn tint(&self, tint: Tint) -> Tint {
        if self.debug_flags.contains(DebugFlags::TINT) {
            tint
        } else {
            Tint::None
        }
    }

    fn check_planes_enabled(&self) -> Result<(), Rejection> {
        if self.debug_flags.contains(DebugFlags::DISABLE_PLANES) {
            return Err(Rejection::PlanesDisabled);
        }
        Ok(())
    }

    /// Stage the framebuffer rendered this cycle on the topmost free plane
    pub(super) fn assign_framebuffer(&mut self) -> Option<GdlPlane> {
        let fb = *self.framebuffer(self.current_fb)?;
        let tint = self.tint(Tint::Red);

        let index = self.planes.find_last_free(IcePlane::is_available)?;
        let plane = self.planes.get_mut(index)?;

        let config = PlaneConfig {
            src: Rectangle::from_size(fb.size),
            dst: Rectangle::from_size(fb.size.to_kind()),
            format: Some(fb.format),
            color_space: Some(ColorSpace::for_surface(fb.format, fb.size.w)),
            premultiplied: has_alpha(fb.format),
            scale: false,
            alpha: 255,
            mode: None,
            tint,
        };
        if let Err(err) = plane.state.prepare(ScanoutSource::Surface(fb.id), Some(config), None) {
            warn!(plane = %plane.id, ?err, "failed to stage framebuffer");
            return None;
        }

        let id = plane.id;
        self.planes.reserve(index);
        self.pending_zorder.push(id);
        trace!(plane = %id, surface = %fb.id, "framebuffer assigned");
        Some(id)
    }

    fn assign_graphics(&mut self, index: usize, view: &View) -> Result<GdlPlane, Rejection> {
        let interlaced = self.mode.interlaced;
        let output = self.mode.size;
        let tint = self.tint(Tint::Blue);

        let buffer = view.buffer.as_ref().ok_or(Rejection::NoBuffer)?;
        let BufferKind::Native {
            surface,
            format,
            color_space,
            ..
        } = *buffer.kind()
        else {
            trace!(view = view.id.0, "not a gdl surface");
            return Err(Rejection::UnsupportedBuffer);
        };

        let plane = self.planes.get_mut(index).ok_or(Rejection::NoFreePlane)?;
        let id = plane.id;

        if !plane.caps.supports(format) {
            trace!(plane = %id, ?format, "format not supported");
            return Err(Rejection::UnsupportedFormat);
        }
        if view.buffer_transform != Transform::Normal {
            return Err(Rejection::UnsupportedTransform);
        }

        let rects = clip_view(view, output)?.to_scanout(view, interlaced);
        if !plane.caps.accepts_dst(rects.dst.size) {
            trace!(plane = %id, size = ?rects.dst.size, "destination size out of range");
            return Err(Rejection::SizeOutOfRange);
        }

        let format = match classify_alpha(format, &view.opaque, view.surface_size)? {
            AlphaBlend::Opaque {
                substitute: Some(opaque),
            } if plane.caps.supports(opaque) => opaque,
            AlphaBlend::Opaque { substitute: Some(_) } => return Err(Rejection::UnsupportedFormat),
            AlphaBlend::Opaque { substitute: None } if has_alpha(format) => {
                return Err(Rejection::UnsupportedFormat)
            }
            AlphaBlend::Opaque { substitute: None } | AlphaBlend::Premultiplied => format,
        };

        let scale = check_scale(rects.src.size, rects.dst.size, &ICE_SCALE_LIMITS, interlaced)?;
        if scale {
            self.scaler.claim(id)?;
        }

        let config = PlaneConfig {
            src: rects.src,
            dst: rects.dst,
            format: Some(format),
            color_space: Some(color_space),
            premultiplied: has_alpha(format),
            scale,
            alpha: view.alpha_u8(),
            mode: None,
            tint,
        };

        if plane
            .state
            .prepare(ScanoutSource::Surface(surface), Some(config), Some(buffer.clone()))
            .is_err()
        {
            if scale {
                self.scaler.clear();
            }
            return Err(Rejection::PlaneBusy);
        }

        self.planes.reserve(index);
        self.pending_zorder.push(id);
        trace!(plane = %id, %surface, src = ?rects.src, dst = ?rects.dst, "view assigned");
        Ok(id)
    }
}

impl<D: GdlDevice, R> PlaneAssigner for IceOutput<D, R> {
    type Plane = GdlPlane;

    fn output_size(&self) -> Size<i32, Physical> {
        self.mode.size
    }

    fn try_cursor(&mut self, view: &View) -> Result<GdlPlane, Rejection> {
        self.check_planes_enabled()?;

        let buffer = view.buffer.as_ref().ok_or(Rejection::NoBuffer)?;
        if view.surface_size.w > CURSOR_SIZE || view.surface_size.h > CURSOR_SIZE {
            return Err(Rejection::CursorTooLarge);
        }
        if !self.cursor_plane.state.is_idle() {
            return Err(Rejection::PlaneBusy);
        }
        if view
            .transform
            .flags
            .intersects(TransformFlags::SCALE | TransformFlags::ROTATE)
        {
            return Err(Rejection::UnsupportedTransform);
        }

        if self.cursor.is_none() {
            match IceCursor::new(&mut self.device, self.cursor_plane.caps.min_dst) {
                Ok(cursor) => self.cursor = Some(cursor),
                Err(err) => {
                    warn!(?err, "failed to create cursor surface");
                    return Err(Rejection::UnsupportedBuffer);
                }
            }
        }
        let Some(cursor) = self.cursor.as_ref() else {
            return Err(Rejection::UnsupportedBuffer);
        };

        if self.cursor_plane.state.current().is_none() || !view.damage.is_empty() {
            cursor.update(&mut self.device, buffer)?;
        }

        let bbox = view.bounding_box();
        let offset = cursor.offset();
        let output = Rectangle::from_size(self.mode.size);
        let mut dst = Rectangle::new(bbox.loc - offset, cursor.size())
            .intersection(output)
            .ok_or(Rejection::Offscreen)?;
        let mut src = Rectangle::new((dst.loc - bbox.loc + offset).to_kind(), dst.size.to_kind());

        if self.mode.interlaced {
            align_even_vertical(&mut dst);
            align_even_vertical(&mut src);
        }
        if !self.cursor_plane.caps.accepts_dst(dst.size) {
            return Err(Rejection::SizeOutOfRange);
        }

        let config = PlaneConfig {
            src,
            dst,
            format: Some(DrmFourcc::C8),
            color_space: Some(ColorSpace::Rgb),
            premultiplied: true,
            scale: false,
            alpha: view.alpha_u8(),
            mode: None,
            tint: Tint::None,
        };
        let surface = cursor.surface().id;
        self.cursor_plane
            .state
            .prepare(ScanoutSource::Surface(surface), Some(config), None)
            .map_err(|_| Rejection::PlaneBusy)?;

        trace!(?dst, "cursor assigned");
        Ok(self.cursor_plane.id)
    }

    fn try_sideband(&mut self, view: &View) -> Result<GdlPlane, Rejection> {
        self.check_planes_enabled()?;

        let buffer = view.buffer.as_ref().ok_or(Rejection::NoBuffer)?;
        let BufferKind::Sideband { plane: raw, kind, .. } = *buffer.kind() else {
            return Err(Rejection::UnsupportedBuffer);
        };
        let index = self.plane_index(raw).ok_or_else(|| {
            debug!(raw, "sideband buffer names no overlay plane");
            Rejection::UnsupportedBuffer
        })?;
        if self.planes.is_reserved(index) {
            return Err(Rejection::PlaneBusy);
        }

        let output = Rectangle::<i32, Physical>::from_size(self.mode.size);
        let interlaced = self.mode.interlaced;
        let tint = self.tint(Tint::Green);

        let plane = self.planes.get_mut(index).ok_or(Rejection::UnsupportedBuffer)?;
        if !plane.state.is_idle() {
            return Err(Rejection::PlaneBusy);
        }

        let (source, config) = match kind {
            SidebandKind::Video => {
                if plane.acquire_count > 0 {
                    return Err(Rejection::PlaneAcquired);
                }
                let bbox = view.bounding_box();
                let mut dst = bbox.intersection(output).ok_or(Rejection::Offscreen)?;
                let mut src = Rectangle::new((dst.loc - bbox.loc).to_kind(), dst.size.to_kind());
                if interlaced {
                    align_even_vertical(&mut dst);
                    align_even_vertical(&mut src);
                }
                let config = PlaneConfig {
                    src,
                    dst,
                    alpha: view.alpha_u8(),
                    tint,
                    ..PlaneConfig::default()
                };
                (ScanoutSource::Video, config)
            }
            SidebandKind::Bypass => {
                if plane.acquire_count == 0 {
                    return Err(Rejection::PlaneNotAcquired);
                }
                let config = PlaneConfig {
                    tint,
                    ..PlaneConfig::default()
                };
                (ScanoutSource::Bypass, config)
            }
        };

        plane
            .state
            .prepare(source, Some(config), Some(buffer.clone()))
            .map_err(|_| Rejection::PlaneBusy)?;

        let id = plane.id;
        self.planes.reserve(index);
        self.pending_zorder.push(id);
        trace!(plane = %id, ?kind, "sideband assigned");
        Ok(id)
    }

    fn try_overlay(&mut self, view: &View, is_last: bool) -> Result<GdlPlane, Rejection> {
        self.check_planes_enabled()?;

        let free = self.planes.free_count(IcePlane::is_available);
        let index = self
            .planes
            .find_last_free(IcePlane::is_available)
            .ok_or(Rejection::NoFreePlane)?;
        if free == 1 && !is_last {
            return Err(Rejection::ReservedForFramebuffer);
        }

        self.assign_graphics(index, view)
    }
}

#[cfg(test)]
mod tests {
    use drm_fourcc::DrmFourcc;

    use crate::backend::ice::device::{GdlPlane, Refresh, TvMode};
    use crate::backend::ice::test::{DummyGdl, DummyRenderer, GdlCall};
    use crate::backend::ice::{IceConfig, IceOutput, IcePlane, PlaneConfig};
    use crate::backend::scanout::format::ColorSpace;
    use crate::backend::scanout::{
        Buffer, BufferKind, DebugFlags, Placement, PlaneAssignments, Rejection, ScanoutSource, SidebandKind,
        SurfaceId, View, ViewId, ViewLayer, ViewTransform,
    };
    use crate::utils::{Logical, Point, Rectangle, Region, Size};

    type Output = IceOutput<DummyGdl, DummyRenderer>;

    fn output_with(device: DummyGdl) -> Output {
        crate::backend::scanout::test_logging();
        IceOutput::new(device, DummyRenderer::default(), IceConfig::default())
            .unwrap()
            .0
    }

    fn native(id: u32, format: DrmFourcc, w: i32, h: i32) -> Buffer {
        Buffer::new(BufferKind::Native {
            surface: SurfaceId(id),
            format,
            size: Size::from((w, h)),
            color_space: ColorSpace::Rgb,
        })
    }

    fn view(id: u64, x: f64, y: f64, buffer: Buffer) -> View {
        let size = match buffer.kind() {
            BufferKind::Native { size, .. } | BufferKind::Sideband { size, .. } => *size,
            _ => Size::from((32, 32)),
        };
        let mut view = View::new(ViewId(id), (size.w, size.h));
        view.transform = ViewTransform::translate(Point::from((x, y)));
        view.buffer = Some(buffer);
        view
    }

    fn plane(output: &Output, id: GdlPlane) -> &IcePlane {
        output.planes().find(|plane| plane.id() == id).unwrap()
    }

    fn pending_config(output: &Output, id: GdlPlane) -> PlaneConfig {
        *plane(output, id).state().pending_config()
    }

    fn reason(assignments: &PlaneAssignments<GdlPlane>, id: u64) -> Option<Rejection> {
        assignments.placements[&ViewId(id)].reason
    }

    #[test]
    fn fully_opaque_argb_scans_out_opaque_twin() {
        let mut output = output_with(DummyGdl::new());
        let mut opaque = view(1, 100.0, 100.0, native(100, DrmFourcc::Argb8888, 320, 240));
        opaque.opaque = Region::<Logical>::from_rect(Rectangle::from_size(Size::from((320, 240))));

        let assignments = output.assign_planes(&[opaque]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Plane(GdlPlane::UppD)));
        assert!(!assignments.primary_in_use);

        let config = pending_config(&output, GdlPlane::UppD);
        assert_eq!(config.format, Some(DrmFourcc::Xrgb8888));
        assert!(!config.premultiplied);
        assert!(!config.scale);
        assert_eq!(config.alpha, 255);
        assert_eq!(config.dst, Rectangle::new((100, 100).into(), (320, 240).into()));
        assert_eq!(config.src, Rectangle::from_size(Size::from((320, 240))));
    }

    #[test]
    fn partial_opacity_is_composited() {
        let mut output = output_with(DummyGdl::new());
        let translucent = view(1, 0.0, 0.0, native(100, DrmFourcc::Argb8888, 320, 240));
        let mut partial = view(2, 400.0, 0.0, native(101, DrmFourcc::Argb8888, 320, 240));
        partial.opaque = Region::from_rect(Rectangle::from_size(Size::from((100, 240))));

        let assignments = output.assign_planes(&[partial, translucent]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Plane(GdlPlane::UppD)));
        assert!(pending_config(&output, GdlPlane::UppD).premultiplied);

        assert_eq!(assignments.placement(ViewId(2)), Some(Placement::Primary));
        assert_eq!(reason(&assignments, 2), Some(Rejection::PartiallyOpaque));
        assert!(plane(&output, GdlPlane::UppC).state().is_idle());
    }

    #[test]
    fn scaler_goes_to_one_plane_per_cycle() {
        let mut output = output_with(DummyGdl::new());
        let scaled = |id: u64, x: f64, surface: u32| {
            let mut view = View::new(ViewId(id), (320, 240));
            view.transform = ViewTransform::scaled(Point::from((x, 0.0)), (2.0, 2.0));
            view.buffer = Some(native(surface, DrmFourcc::Xrgb8888, 320, 240));
            view
        };

        let views = vec![scaled(2, 700.0, 101), scaled(1, 0.0, 100)];
        let assignments = output.assign_planes(&views);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Plane(GdlPlane::UppD)));
        assert_eq!(assignments.placement(ViewId(2)), Some(Placement::Primary));
        assert_eq!(reason(&assignments, 2), Some(Rejection::ScalerBusy));

        let config = pending_config(&output, GdlPlane::UppD);
        assert!(config.scale);
        assert_eq!(config.dst.size, Size::from((640, 480)));
        assert_eq!(config.src.size, Size::from((320, 240)));

        // the claim ends with the cycle
        output.repaint(&Region::new()).unwrap();
        let vblank = {
            let now: std::time::Duration = crate::utils::Clock::<crate::utils::Monotonic>::new()
                .unwrap()
                .now()
                .into();
            crate::backend::scanout::VBlank {
                time: (now + std::time::Duration::from_millis(16)).into(),
                count: 1,
            }
        };
        assert!(output.on_vblank(vblank).is_some());

        let assignments = output.assign_planes(&views[..1]);
        assert_eq!(assignments.placement(ViewId(2)), Some(Placement::Plane(GdlPlane::UppD)));
    }

    #[test]
    fn subpixel_offset_does_not_claim_the_scaler() {
        let mut output = output_with(DummyGdl::new());
        let unscaled = view(1, -0.5, 0.0, native(100, DrmFourcc::Xrgb8888, 100, 100));
        let mut scaled = View::new(ViewId(2), (320, 240));
        scaled.transform = ViewTransform::scaled(Point::from((700.0, 0.0)), (2.0, 2.0));
        scaled.buffer = Some(native(101, DrmFourcc::Xrgb8888, 320, 240));

        let assignments = output.assign_planes(&[scaled, unscaled]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Plane(GdlPlane::UppD)));
        assert_eq!(assignments.placement(ViewId(2)), Some(Placement::Plane(GdlPlane::UppC)));

        let config = pending_config(&output, GdlPlane::UppD);
        assert!(!config.scale);
        assert_eq!(config.dst, Rectangle::new((0, 0).into(), (100, 100).into()));
        assert_eq!(config.src, Rectangle::from_size(Size::from((100, 100))));
        assert!(pending_config(&output, GdlPlane::UppC).scale);
    }

    #[test]
    fn downscaling_is_rejected() {
        let mut output = output_with(DummyGdl::new());
        let mut shrunk = View::new(ViewId(1), (640, 480));
        shrunk.transform = ViewTransform::scaled(Point::from((0.0, 0.0)), (0.5, 0.5));
        shrunk.buffer = Some(native(100, DrmFourcc::Xrgb8888, 640, 480));

        let assignments = output.assign_planes(&[shrunk]);
        assert_eq!(reason(&assignments, 1), Some(Rejection::Downscale));
    }

    #[test]
    fn last_free_plane_is_kept_for_framebuffer() {
        let mut output = output_with(DummyGdl::new());
        let views: Vec<_> = (0..5u32)
            .rev()
            .map(|i| view(i as u64, i as f64 * 200.0, 0.0, native(100 + i, DrmFourcc::Xrgb8888, 100, 100)))
            .collect();

        let assignments = output.assign_planes(&views);
        assert_eq!(assignments.placement(ViewId(0)), Some(Placement::Plane(GdlPlane::UppD)));
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Plane(GdlPlane::UppC)));
        assert_eq!(assignments.placement(ViewId(2)), Some(Placement::Plane(GdlPlane::UppB)));
        assert_eq!(reason(&assignments, 3), Some(Rejection::ReservedForFramebuffer));
        // the topmost view may still take it
        assert_eq!(assignments.placement(ViewId(4)), Some(Placement::Plane(GdlPlane::UppA)));
    }

    #[test]
    fn views_above_composited_content_stay_composited() {
        let mut output = output_with(DummyGdl::new());
        let mut shm = View::new(ViewId(1), (200, 200));
        shm.buffer = Some(Buffer::new(BufferKind::Shm {
            format: DrmFourcc::Xrgb8888,
            size: Size::from((200, 200)),
            stride: 800,
            data: vec![0; 800 * 200].into(),
        }));
        let above = view(2, 100.0, 100.0, native(100, DrmFourcc::Xrgb8888, 200, 200));

        let assignments = output.assign_planes(&[above, shm]);
        assert_eq!(reason(&assignments, 1), Some(Rejection::UnsupportedBuffer));
        assert_eq!(reason(&assignments, 2), Some(Rejection::Overlap));
        assert!(output.planes().all(|plane| plane.state().is_idle()));
    }

    #[test]
    fn interlaced_rectangles_start_on_even_lines() {
        let mut device = DummyGdl::new();
        device.mode = Ok(TvMode {
            size: Size::from((1920, 1080)),
            refresh: Refresh::Hz59_94,
            interlaced: true,
        });
        let mut output = output_with(device);

        let assignments = output.assign_planes(&[view(1, 10.0, 11.0, native(100, DrmFourcc::Xrgb8888, 320, 241))]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Plane(GdlPlane::UppD)));

        let config = pending_config(&output, GdlPlane::UppD);
        assert_eq!(config.dst, Rectangle::new((10, 10).into(), (320, 240).into()));
        assert_eq!(config.src, Rectangle::from_size(Size::from((320, 240))));
        assert!(!config.scale);
    }

    fn interlaced_output() -> Output {
        let mut device = DummyGdl::new();
        device.mode = Ok(TvMode {
            size: Size::from((1920, 1080)),
            refresh: Refresh::Hz59_94,
            interlaced: true,
        });
        output_with(device)
    }

    #[test]
    fn interlaced_video_source_starts_on_even_line() {
        let mut output = interlaced_output();
        let video = view(
            1,
            0.0,
            -3.0,
            Buffer::new(BufferKind::Sideband {
                plane: GdlPlane::UppB.raw(),
                kind: SidebandKind::Video,
                size: Size::from((1280, 721)),
            }),
        );

        let assignments = output.assign_planes(&[video]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Plane(GdlPlane::UppB)));

        let config = pending_config(&output, GdlPlane::UppB);
        assert_eq!(config.dst, Rectangle::new((0, 0).into(), (1280, 718).into()));
        assert_eq!(config.src, Rectangle::new((0, 2).into(), (1280, 718).into()));
    }

    #[test]
    fn interlaced_cursor_above_the_top_edge_is_even() {
        let mut output = interlaced_output();
        let mut cursor = View::new(ViewId(1), (16, 16));
        cursor.layer = ViewLayer::Cursor;
        cursor.transform = ViewTransform::translate(Point::from((100.0, -3.0)));
        cursor.buffer = Some(Buffer::new(BufferKind::Shm {
            format: DrmFourcc::Argb8888,
            size: Size::from((16, 16)),
            stride: 64,
            data: vec![0xff; 64 * 16].into(),
        }));

        let assignments = output.assign_planes(&[cursor]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Cursor(GdlPlane::IapB)));

        let config = *output.cursor_plane().state().pending_config();
        assert_eq!(config.dst, Rectangle::new((98, 0).into(), (34, 28).into()));
        assert_eq!(config.src, Rectangle::new((0, 4).into(), (34, 28).into()));
    }

    #[test]
    fn disabled_planes_composite_everything() {
        let mut output = output_with(DummyGdl::new());
        output.set_debug_flags(DebugFlags::DISABLE_PLANES);

        let assignments = output.assign_planes(&[view(1, 0.0, 0.0, native(100, DrmFourcc::Xrgb8888, 320, 240))]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Primary));
        assert_eq!(reason(&assignments, 1), Some(Rejection::PlanesDisabled));
    }

    #[test]
    fn cursor_hanging_off_the_edge_is_clipped() {
        let mut output = output_with(DummyGdl::new());
        let mut cursor = View::new(ViewId(1), (16, 16));
        cursor.layer = ViewLayer::Cursor;
        cursor.transform = ViewTransform::translate(Point::from((-4.0, 10.0)));
        cursor.buffer = Some(Buffer::new(BufferKind::Shm {
            format: DrmFourcc::Argb8888,
            size: Size::from((16, 16)),
            stride: 64,
            data: vec![0xff; 64 * 16].into(),
        }));

        let assignments = output.assign_planes(&[cursor]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Cursor(GdlPlane::IapB)));
        assert!(!assignments.primary_in_use);

        let state = output.cursor_plane().state();
        let config = *state.pending_config();
        // the image sits 2 pixels into the surface, the plane minimum size
        assert_eq!(config.dst, Rectangle::new((0, 8).into(), (28, 34).into()));
        assert_eq!(config.src, Rectangle::new((6, 0).into(), (28, 34).into()));
        assert_eq!(config.format, Some(DrmFourcc::C8));
        assert!(matches!(state.pending().map(|p| p.source), Some(ScanoutSource::Surface(_))));
        assert!(output
            .device()
            .calls
            .iter()
            .any(|call| matches!(call, GdlCall::Palette(_))));
    }

    #[test]
    fn large_cursor_is_not_put_on_cursor_plane() {
        let mut output = output_with(DummyGdl::new());
        let mut cursor = View::new(ViewId(1), (64, 64));
        cursor.layer = ViewLayer::Cursor;
        cursor.buffer = Some(Buffer::new(BufferKind::Shm {
            format: DrmFourcc::Argb8888,
            size: Size::from((64, 64)),
            stride: 256,
            data: vec![0; 256 * 64].into(),
        }));

        let assignments = output.assign_planes(&[cursor]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Primary));
        assert!(output.cursor_plane().state().is_idle());
    }

    #[test]
    fn video_goes_on_the_plane_it_names() {
        let mut output = output_with(DummyGdl::new());
        let buffer = Buffer::new(BufferKind::Sideband {
            plane: GdlPlane::UppB.raw(),
            kind: SidebandKind::Video,
            size: Size::from((1280, 720)),
        });
        let mut video = view(1, 1000.0, 500.0, buffer.clone());
        video.alpha = 0.5;

        let assignments = output.assign_planes(&[video]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Plane(GdlPlane::UppB)));

        let state = plane(&output, GdlPlane::UppB).state();
        assert_eq!(state.pending().map(|p| p.source), Some(ScanoutSource::Video));
        assert_eq!(
            state.pending_config().dst,
            Rectangle::new((1000, 500).into(), (920, 580).into())
        );
        assert_eq!(state.pending_config().src, Rectangle::from_size(Size::from((920, 580))));
        assert_eq!(state.pending_config().alpha, 128);
        // the view is gone, the plane still holds the stream
        assert_eq!(buffer.ref_count(), 2);
    }

    #[test]
    fn sideband_on_unknown_plane_is_composited() {
        let mut output = output_with(DummyGdl::new());
        let cursor_plane = Buffer::new(BufferKind::Sideband {
            plane: GdlPlane::IapB.raw(),
            kind: SidebandKind::Video,
            size: Size::from((64, 64)),
        });

        let assignments = output.assign_planes(&[view(1, 0.0, 0.0, cursor_plane)]);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Primary));
        assert_eq!(reason(&assignments, 1), Some(Rejection::UnsupportedBuffer));
    }
}
