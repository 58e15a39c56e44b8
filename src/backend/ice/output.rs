use std::fmt;

use drm_fourcc::DrmFourcc;
use smallvec::SmallVec;
use tracing::{debug, error, info, info_span, trace, warn};

use super::cursor::IceCursor;
use super::device::{GdlDevice, GdlPlane, SurfaceInfo, TvMode};
use super::mode::{read_display_mode, ModeFlags, OutputMode};
use super::plane::{GdlPlanes, IcePlane};
use super::{Error, IceConfig};
use crate::backend::scanout::{
    commit_plane, complete_plane, DebugFlags, FrameFinished, FramebufferRenderer, PlanePool, PresentationFlags,
    ScalerSlot, VBlank, VBlankSource, VBlankThread,
};
use crate::utils::{Clock, Monotonic, Physical, Rectangle, Region, Size, Time};

/// Outcome of [`IceOutput::repaint`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepaintStatus {
    /// Whether the composited framebuffer was rendered
    pub rendered: bool,
    /// Planes whose commit failed, their pending scanout was dropped
    pub failed: SmallVec<[GdlPlane; 5]>,
}

/// One GDL display pipe
///
/// Owns the device, the four overlay planes, the cursor plane and the two
/// composited framebuffers. Every method must be called from the event loop
/// thread.
pub struct IceOutput<D: GdlDevice, R> {
    pub(super) device: D,
    renderer: R,
    pub(super) planes: PlanePool<IcePlane>,
    pub(super) cursor_plane: IcePlane,
    pub(super) cursor: Option<IceCursor>,
    framebuffers: [Option<SurfaceInfo>; 2],
    pub(super) current_fb: usize,
    previous_damage: Region<Physical>,
    output_damage: Region<Physical>,
    pub(super) scaler: ScalerSlot<GdlPlane>,
    zorder: SmallVec<[GdlPlane; 5]>,
    pub(super) pending_zorder: SmallVec<[GdlPlane; 5]>,
    pub(super) primary_in_use: bool,
    pub(super) mode: OutputMode,
    tvmode: TvMode,
    flip_pending: bool,
    finish_frame: bool,
    flip_time: Time<Monotonic>,
    clock: Clock<Monotonic>,
    pub(super) debug_flags: DebugFlags,
    vblank: Option<VBlankThread>,
    pub(super) span: tracing::Span,
}

impl<D: GdlDevice, R> fmt::Debug for IceOutput<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IceOutput")
            .field("planes", &self.planes)
            .field("cursor_plane", &self.cursor_plane)
            .field("framebuffers", &self.framebuffers)
            .field("current_fb", &self.current_fb)
            .field("mode", &self.mode)
            .field("flip_pending", &self.flip_pending)
            .field("debug_flags", &self.debug_flags)
            .finish_non_exhaustive()
    }
}

impl<D: GdlDevice, R: FramebufferRenderer> IceOutput<D, R> {
    /// Create the output of display pipe 0
    ///
    /// The vblank source is `None` when the display reports no mode; the
    /// output then runs in a 720x576 fallback mode until
    /// [`IceOutput::handle_display_event`] finds a real one.
    pub fn new(mut device: D, renderer: R, config: IceConfig) -> Result<(Self, Option<VBlankSource>), Error> {
        let span = info_span!("backend_ice", output = "Display Pipe 0");
        let _guard = span.enter();

        let (tvmode, defined) = read_display_mode(&mut device)?;
        let clock = Clock::new().map_err(Error::Clock)?;

        let cursor_plane = IcePlane::new(&mut device, GdlPlane::IapB);
        let planes = PlanePool::new(
            GdlPlane::OVERLAYS
                .into_iter()
                .map(|id| IcePlane::new(&mut device, id))
                .collect(),
        );

        let mut output = IceOutput {
            device,
            renderer,
            planes,
            cursor_plane,
            cursor: None,
            framebuffers: [None, None],
            current_fb: 0,
            previous_damage: Region::new(),
            output_damage: Region::new(),
            scaler: ScalerSlot::new(),
            zorder: SmallVec::new(),
            pending_zorder: SmallVec::new(),
            primary_in_use: false,
            mode: OutputMode::from_tvmode(&tvmode, ModeFlags::CURRENT | ModeFlags::PREFERRED),
            tvmode,
            flip_pending: false,
            finish_frame: false,
            flip_time: Time::from_nanos(0),
            clock,
            debug_flags: config.debug_flags,
            vblank: None,
            span: span.clone(),
        };

        output.init()?;
        info!(mode = %output.mode, "output created");

        let vblank = if defined {
            Some(output.start_vblank()?)
        } else {
            None
        };

        Ok((output, vblank))
    }

    /// Render the composited framebuffer if needed and commit every plane
    ///
    /// Must be called after [`IceOutput::assign_planes`]. Fails with
    /// [`Error::FlipPending`] while the previous frame is still on its way,
    /// dropping what the assignment staged.
    #[profiling::function]
    pub fn repaint(&mut self, damage: &Region<Physical>) -> Result<RepaintStatus, Error> {
        let span = self.span.clone();
        let _guard = span.enter();

        if self.flip_pending {
            warn!("repaint while a flip is pending");
            for plane in self.planes.iter_mut().chain(std::iter::once(&mut self.cursor_plane)) {
                drop(plane.state.cancel());
            }
            self.end_cycle();
            return Err(Error::FlipPending);
        }

        let mut status = RepaintStatus::default();

        let mut damage = damage.clone();
        damage.union(&self.output_damage);
        self.output_damage.clear();

        if !damage.is_empty() {
            self.current_fb ^= 1;
            let mut total = damage.clone();
            total.union(&self.previous_damage);
            self.previous_damage = damage;

            trace!(framebuffer = self.current_fb, "render output");
            match self.renderer.render(self.current_fb, &total) {
                Ok(()) => status.rendered = true,
                Err(err) => error!(?err, "failed to render framebuffer"),
            }
        }

        if self.primary_in_use && self.assign_framebuffer().is_none() {
            // every plane went to clients, the composited content stays hidden
            debug!("no plane left for the framebuffer");
        }

        if self.pending_zorder != self.zorder {
            match self.device.set_upp_zorder(&self.pending_zorder) {
                Ok(()) => self.zorder = self.pending_zorder.clone(),
                Err(err) => warn!(?err, "failed to set upp zorder"),
            }
        }

        let mut device = GdlPlanes::new(&mut self.device, self.scaler.owner());
        for plane in self.planes.iter_mut() {
            // acquired planes belong to their client
            if plane.is_available() {
                if let Err(err) = plane.state.disable() {
                    warn!(plane = %plane.id, ?err, "failed to disable unused plane");
                }
            }
            if commit_plane(&mut device, plane.id, &mut plane.state).is_err() {
                status.failed.push(plane.id);
            }
        }

        self.flip_time = self.clock.now();

        let plane = &mut self.cursor_plane;
        if plane.state.is_idle() {
            if let Err(err) = plane.state.disable() {
                warn!(plane = %plane.id, ?err, "failed to disable cursor plane");
            }
        }
        if commit_plane(&mut device, plane.id, &mut plane.state).is_err() {
            status.failed.push(plane.id);
        }

        self.flip_pending = true;
        self.end_cycle();

        Ok(status)
    }

    /// Reconcile the planes after a vblank
    ///
    /// Returns the frame completion to report, if any.
    #[profiling::function]
    pub fn on_vblank(&mut self, vblank: VBlank) -> Option<FrameFinished> {
        let span = self.span.clone();
        let _guard = span.enter();

        if self.flip_pending && self.flip_time < vblank.time {
            trace!(count = vblank.count, "vblank after flip");

            let mut device = GdlPlanes::new(&mut self.device, None);
            let mut resolved = true;
            for plane in self.planes.iter_mut().chain(std::iter::once(&mut self.cursor_plane)) {
                resolved &= complete_plane(&mut device, plane.id, &mut plane.state).is_resolved();
            }

            if resolved {
                self.flip_pending = false;
                self.finish_frame = true;
            }
        }

        if self.finish_frame && !self.flip_pending {
            trace!("finish frame");
            self.finish_frame = false;
            return Some(FrameFinished {
                time: vblank.time,
                flags: PresentationFlags::HW_COMPLETION | PresentationFlags::VSYNC,
            });
        }

        None
    }

    /// Report a finished frame at the next vblank
    pub fn start_repaint_loop(&mut self) {
        self.finish_frame = true;
    }

    /// Switch to the mode the display pipe reported last
    ///
    /// `mode` must carry [`ModeFlags::TVMODE`]; compositor-initiated mode
    /// changes are not supported by the hardware.
    pub fn switch_mode(&mut self, mode: &OutputMode) -> Result<(), Error> {
        let span = self.span.clone();
        let _guard = span.enter();

        if !mode.flags.contains(ModeFlags::TVMODE) {
            debug!(%mode, "rejecting mode switch");
            return Err(Error::ModeRejected);
        }

        let next = OutputMode::from_tvmode(&self.tvmode, ModeFlags::CURRENT | ModeFlags::PREFERRED);
        if next.same_timing(&self.mode) {
            return Ok(());
        }

        self.fini();
        self.mode = next;
        info!("switch mode to {}", self.mode);

        self.output_damage = Region::from_rect(Rectangle::from_size(self.mode.size));
        self.init()
    }

    /// Re-read the display mode after a display pipe event
    ///
    /// Returns a vblank source if the vblank thread was started by this call.
    pub fn handle_display_event(&mut self) -> Result<Option<VBlankSource>, Error> {
        let (tvmode, defined) = read_display_mode(&mut self.device)?;
        self.tvmode = tvmode;

        let mode = OutputMode::from_tvmode(&tvmode, ModeFlags::TVMODE);
        self.switch_mode(&mode)?;

        if defined && self.vblank.is_none() {
            return self.start_vblank().map(Some);
        }
        Ok(None)
    }
}

impl<D: GdlDevice, R> IceOutput<D, R> {
    /// Current mode
    pub fn current_mode(&self) -> &OutputMode {
        &self.mode
    }

    /// Size of the output
    pub fn size(&self) -> Size<i32, Physical> {
        self.mode.size
    }

    /// Whether a frame waits for its vblank
    pub fn is_flip_pending(&self) -> bool {
        self.flip_pending
    }

    /// Framebuffer number `index`, as rendered by [`FramebufferRenderer::render`]
    pub fn framebuffer(&self, index: usize) -> Option<&SurfaceInfo> {
        self.framebuffers.get(index).and_then(Option::as_ref)
    }

    /// Overlay planes, bottom first
    pub fn planes(&self) -> impl Iterator<Item = &IcePlane> {
        self.planes.iter()
    }

    /// The cursor plane
    pub fn cursor_plane(&self) -> &IcePlane {
        &self.cursor_plane
    }

    /// Debug switches in use
    pub fn debug_flags(&self) -> DebugFlags {
        self.debug_flags
    }

    /// Change the debug switches, taking effect at the next assignment
    pub fn set_debug_flags(&mut self, flags: DebugFlags) {
        info!(?flags, "debug flags changed");
        self.debug_flags = flags;
        self.output_damage = Region::from_rect(Rectangle::from_size(self.mode.size));
    }

    /// The driver
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The driver
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The framebuffer renderer
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    fn init(&mut self) -> Result<(), Error> {
        let size = self.mode.size;

        for slot in 0..self.framebuffers.len() {
            // fixed allocation size against fragmentation
            let alloc = Size::from((size.w.max(1920), size.h.max(1080)));
            let mut info = self
                .device
                .alloc_surface(DrmFourcc::Argb8888, alloc, false)
                .map_err(|source| Error::Access {
                    errmsg: "failed to allocate framebuffer",
                    source,
                })?;
            info.size = size.to_kind();
            self.framebuffers[slot] = Some(info);
        }

        self.previous_damage = Region::from_rect(Rectangle::from_size(size));
        Ok(())
    }

    fn fini(&mut self) {
        for info in self.framebuffers.iter_mut().filter_map(Option::take) {
            if let Err(err) = self.device.free_surface(info.id) {
                warn!(surface = %info.id, ?err, "failed to free fb surface");
            }
        }
        if let Some(cursor) = self.cursor.take() {
            cursor.destroy(&mut self.device);
        }
        self.previous_damage.clear();
    }

    fn start_vblank(&mut self) -> Result<VBlankSource, Error> {
        let waiter = self.device.vblank_waiter().map_err(|source| Error::Access {
            errmsg: "failed to get a vblank waiter",
            source,
        })?;
        let (thread, source) = VBlankThread::spawn(waiter).map_err(Error::VBlank)?;
        self.vblank = Some(thread);
        Ok(source)
    }

    /// Drop the per-cycle reservations
    pub(super) fn end_cycle(&mut self) {
        self.pending_zorder.clear();
        self.scaler.clear();
        self.planes.reset();
        self.primary_in_use = false;
    }
}

impl<D: GdlDevice, R> Drop for IceOutput<D, R> {
    fn drop(&mut self) {
        // no vblank may reach a half torn down output
        if let Some(mut vblank) = self.vblank.take() {
            vblank.stop();
        }
        self.fini();
    }
}
