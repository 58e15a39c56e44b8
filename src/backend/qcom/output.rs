use std::fmt;

use smallvec::SmallVec;
use tracing::{debug, error, info, info_span, trace, warn};

use super::caps::{MdpCaps, PipeType};
use super::device::{Framebuffer, LayerBuffer, MdpDevice, MdpLayer, ScreenInfo};
use super::fence::ReleaseFence;
use super::format::MdpFormat;
use super::pipe::{decimation, needs_split, reserve_pipe, split_rects, PipePool};
use super::plane::{LayerConfig, MdpPlane, QcomPlane, PLANE_COUNT};
use super::{Error, QcomConfig};
use crate::backend::scanout::clip::ScanoutRects;
use crate::backend::scanout::format::ColorSpace;
use crate::backend::scanout::{
    BufferKind, DebugFlags, FlipState, FrameFinished, FramebufferRenderer, PlanePool, PresentationFlags, Scanout,
    ScanoutSource,
};
use crate::utils::{Clock, Monotonic, Physical, Rectangle, Region, Size, Time};

/// Outcome of [`QcomOutput::repaint`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepaintStatus {
    /// Whether the composited framebuffer was rendered
    pub rendered: bool,
    /// Number of layers in the commit
    pub layers: usize,
}

/// The framebuffer output of an MDP display engine
///
/// Every method must be called from the event loop thread. The compositor
/// calls [`QcomOutput::on_vsync`] when the vsync attribute becomes ready and
/// [`QcomOutput::on_release_fence`] when [`QcomOutput::release_fence`]
/// becomes readable.
pub struct QcomOutput<D: MdpDevice, R> {
    pub(super) device: D,
    renderer: R,
    pub(super) caps: MdpCaps,
    pub(super) pipes: PipePool,
    pub(super) planes: PlanePool<QcomPlane>,
    framebuffers: [Option<Framebuffer>; 2],
    current_fb: usize,
    previous_damage: Region<Physical>,
    output_damage: Region<Physical>,
    pub(super) zorder: u32,
    screen: ScreenInfo,
    pub(super) config: QcomConfig,
    next_fence: Option<ReleaseFence>,
    current_fence: Option<ReleaseFence>,
    vsync_enabled: bool,
    clock: Clock<Monotonic>,
    pub(super) span: tracing::Span,
}

impl<D: MdpDevice, R> fmt::Debug for QcomOutput<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QcomOutput")
            .field("caps", &self.caps)
            .field("pipes", &self.pipes)
            .field("planes", &self.planes)
            .field("framebuffers", &self.framebuffers)
            .field("screen", &self.screen)
            .field("config", &self.config)
            .field("next_fence", &self.next_fence)
            .field("current_fence", &self.current_fence)
            .finish_non_exhaustive()
    }
}

impl<D: MdpDevice, R: FramebufferRenderer> QcomOutput<D, R> {
    /// Create the output of the framebuffer device
    pub fn new(mut device: D, renderer: R, config: QcomConfig) -> Result<Self, Error> {
        let span = info_span!("backend_qcom", output = %config.device_path.display());
        let _guard = span.enter();

        let screen = device.screen_info().map_err(|source| Error::Access {
            errmsg: "failed to get frame buffer info",
            source,
        })?;
        let caps = device.read_caps().map(|text| MdpCaps::parse(&text)).map_err(|source| Error::Access {
            errmsg: "failed to enumerate MDP capabilities",
            source,
        })?;
        let clock = Clock::new().map_err(Error::Clock)?;

        let mut pipes = caps.pipes.clone();
        if pipes.len() > 64 {
            warn!(count = pipes.len(), "too many pipes, ignoring the last ones");
            pipes.truncate(64);
        }
        debug!(
            pipes = pipes.len(),
            max_pipe_width = caps.hw.max_pipe_width,
            features = ?caps.hw.features,
            "MDP capabilities"
        );

        let planes = (0..PLANE_COUNT as u8).map(|id| QcomPlane::new(MdpPlane(id))).collect();

        let mut output = QcomOutput {
            device,
            renderer,
            caps,
            pipes: PipePool::new(pipes),
            planes: PlanePool::new(planes),
            framebuffers: [None, None],
            current_fb: 0,
            previous_damage: Region::new(),
            output_damage: Region::new(),
            zorder: 0,
            screen,
            config,
            next_fence: None,
            current_fence: None,
            vsync_enabled: false,
            clock,
            span: span.clone(),
        };

        output.init()?;
        info!(
            "fbdev output {}x{}@{}Hz",
            output.screen.size.w,
            output.screen.size.h,
            output.screen.refresh / 1000
        );

        Ok(output)
    }

    /// Render the composited framebuffer if needed and commit every layer
    ///
    /// Must be called after [`QcomOutput::assign_planes`]. When the commit
    /// fails, every scanout staged for it is dropped.
    #[profiling::function]
    pub fn repaint(&mut self, damage: &Region<Physical>) -> Result<RepaintStatus, Error> {
        let span = self.span.clone();
        let _guard = span.enter();

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

            if let Some(fb) = self.framebuffers[self.current_fb] {
                let range = fb.flush_range(Some(total.extents()));
                if let Err(err) = self.device.flush_framebuffer(&fb, range) {
                    warn!(?err, "failed to flush framebuffer");
                }
            }
        }

        let result = self.commit();
        self.end_cycle();

        status.layers = result?;
        Ok(status)
    }
}

impl<D: MdpDevice, R> QcomOutput<D, R> {
    /// Handle a vsync event
    ///
    /// When the last commit is on screen and the release fence of the
    /// commit before it has signaled, the staged scanouts become current and
    /// the frame completion is returned.
    #[profiling::function]
    pub fn on_vsync(&mut self) -> Option<FrameFinished> {
        let span = self.span.clone();
        let _guard = span.enter();

        let time = match self.read_vsync() {
            Ok(time) => time,
            Err(err) => {
                debug!(?err, "failed to read vsync timestamp");
                return None;
            }
        };

        if self.next_fence.is_none() || self.current_fence.is_some() {
            trace!("vsync without a new frame");
            return None;
        }
        self.current_fence = self.next_fence.take();

        for plane in self.planes.iter_mut() {
            if plane.state.promote() {
                trace!(plane = %plane.id, "scanout displayed");
            }
        }

        Some(FrameFinished {
            time,
            flags: PresentationFlags::HW_COMPLETION | PresentationFlags::VSYNC,
        })
    }

    /// Handle readiness of the release fence
    ///
    /// Once the fence signaled, client buffers of the displayed frame are
    /// released. Returns whether the fence had signaled.
    pub fn on_release_fence(&mut self) -> bool {
        let span = self.span.clone();
        let _guard = span.enter();

        match self.current_fence.as_ref() {
            Some(fence) if fence.is_signaled() => {}
            _ => return false,
        }

        for plane in self.planes.iter_mut() {
            drop(plane.state.release_current());
        }
        self.current_fence = None;
        trace!("release fence signaled");
        true
    }

    /// Report the frame that starts the repaint loop
    ///
    /// Uses the last vsync time when vsync events are on, the clock
    /// otherwise. The completion is not tied to a vsync.
    pub fn start_repaint_loop(&mut self) -> FrameFinished {
        let time = if self.vsync_enabled {
            self.read_vsync().ok()
        } else {
            None
        };

        FrameFinished {
            time: time.unwrap_or_else(|| self.clock.now()),
            flags: PresentationFlags::empty(),
        }
    }

    /// Switch to another mode
    ///
    /// A panel driven through the framebuffer device keeps the mode it was
    /// set up with, only that mode is accepted.
    pub fn switch_mode(&mut self, size: Size<i32, Physical>, refresh: u32) -> Result<(), Error> {
        if size == self.screen.size && refresh == self.screen.refresh {
            return Ok(());
        }
        warn!(
            "rejecting mode switch to {}x{}@{}Hz",
            size.w,
            size.h,
            refresh / 1000
        );
        Err(Error::ModeRejected)
    }

    /// Fence of the frame on screen, to wait for in the event loop
    pub fn release_fence(&self) -> Option<&ReleaseFence> {
        self.current_fence.as_ref()
    }

    /// Whether a committed frame waits for its vsync
    pub fn is_frame_pending(&self) -> bool {
        self.next_fence.is_some()
    }

    /// Panel information
    pub fn screen_info(&self) -> &ScreenInfo {
        &self.screen
    }

    /// Size of the output
    pub fn size(&self) -> Size<i32, Physical> {
        self.screen.size
    }

    /// Display engine capabilities
    pub fn caps(&self) -> &MdpCaps {
        &self.caps
    }

    /// Logical planes, bottom first
    pub fn planes(&self) -> impl Iterator<Item = &QcomPlane> {
        self.planes.iter()
    }

    /// Framebuffer number `index`, as rendered by [`FramebufferRenderer::render`]
    pub fn framebuffer(&self, index: usize) -> Option<&Framebuffer> {
        self.framebuffers.get(index).and_then(Option::as_ref)
    }

    /// Debug switches in use
    pub fn debug_flags(&self) -> DebugFlags {
        self.config.debug_flags
    }

    /// Change the debug switches, taking effect at the next assignment
    pub fn set_debug_flags(&mut self, flags: DebugFlags) {
        info!(?flags, "debug flags changed");
        self.config.debug_flags = flags;
        self.output_damage = Region::from_rect(Rectangle::from_size(self.screen.size));
    }

    /// The device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The framebuffer renderer
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    fn init(&mut self) -> Result<(), Error> {
        let size = self.screen.size;
        for slot in self.framebuffers.iter_mut() {
            let fb = self
                .device
                .alloc_framebuffer(size.to_kind())
                .map_err(|source| Error::Access {
                    errmsg: "failed to allocate framebuffer",
                    source,
                })?;
            *slot = Some(fb);
        }
        self.previous_damage = Region::from_rect(Rectangle::from_size(size));
        Ok(())
    }

    fn read_vsync(&mut self) -> Result<Time<Monotonic>, super::MdpError> {
        let text = self.device.read_vsync_event()?;
        super::device::parse_vsync_event(&text)
    }

    fn commit(&mut self) -> Result<usize, Error> {
        self.assign_framebuffer();

        let tint = self.config.debug_flags.contains(DebugFlags::TINT);
        let mut layers = SmallVec::<[MdpLayer; 8]>::new();
        for plane in self.planes.iter() {
            if plane.state.flip_state() != FlipState::Pending {
                continue;
            }
            let config = plane.state.pending_config();
            let buffer = plane
                .state
                .pending()
                .and_then(|scanout| self.layer_buffer(scanout, config.format));
            match buffer {
                Some(buffer) => self.fill_layers(config, buffer, tint, &mut layers),
                None => warn!(plane = %plane.id, "no buffer for staged layer"),
            }
        }

        trace!(layers = layers.len(), "commit");
        let fences = match self.device.atomic_commit(&layers) {
            Ok(fences) => fences,
            Err(source) => {
                error!(err = ?source, "failed to commit");
                for plane in self.planes.iter_mut() {
                    drop(plane.state.cancel());
                }
                return Err(Error::Access {
                    errmsg: "failed to commit",
                    source,
                });
            }
        };

        for plane in self.planes.iter_mut() {
            plane.state.submitted();
        }

        match fences.release {
            Some(fd) if self.next_fence.is_none() => self.next_fence = Some(ReleaseFence::new(fd)),
            Some(_) => warn!("release fence already in progress"),
            None => warn!("commit returned no release fence"),
        }

        if !self.vsync_enabled {
            self.device.set_vsync(true).map_err(|source| Error::Access {
                errmsg: "failed to enable vsync ctrl",
                source,
            })?;
            self.vsync_enabled = true;
        }

        Ok(layers.len())
    }

    /// Put the current framebuffer on the topmost free plane
    fn assign_framebuffer(&mut self) {
        let Some(fb) = self.framebuffers[self.current_fb] else {
            return;
        };
        let Some(index) = self.planes.find_last_free(|plane| plane.state.is_idle()) else {
            warn!("no available plane for framebuffer");
            return;
        };
        let Some(left) = reserve_pipe(&mut self.pipes, PipeType::Rgb) else {
            warn!("no available rgb pipe for framebuffer left ROI");
            return;
        };

        let rects = ScanoutRects {
            src: Rectangle::from_size(fb.size),
            dst: Rectangle::from_size(fb.size.to_kind()),
        };
        let right = if needs_split(&rects, &self.caps.hw) {
            let right = reserve_pipe(&mut self.pipes, PipeType::Rgb);
            if right.is_none() {
                warn!("no available rgb pipe for framebuffer right ROI");
            }
            right
        } else {
            None
        };

        let config = LayerConfig {
            mode: None,
            left: Some(left),
            right,
            src: rects.src,
            dst: rects.dst,
            alpha: 255,
            format: Some(fb.format),
            blend: super::device::BlendOp::Premultiplied,
            zorder: self.zorder,
        };

        let Some(plane) = self.planes.get_mut(index) else {
            return;
        };
        if let Err(err) = plane.state.prepare(ScanoutSource::Surface(fb.id), Some(config), None) {
            warn!(?err, plane = %plane.id, "failed to stage framebuffer");
            return;
        }
        trace!(plane = %plane.id, zorder = self.zorder, "framebuffer assigned");
        self.planes.reserve(index);
    }

    fn layer_buffer(&self, scanout: &Scanout, format: Option<MdpFormat>) -> Option<LayerBuffer> {
        let format = format?;
        match scanout.buffer.as_ref().map(|buffer| buffer.kind()) {
            Some(BufferKind::Dmabuf {
                handle, size, planes, ..
            }) => {
                let plane = planes.first()?;
                Some(LayerBuffer {
                    handle: *handle,
                    format,
                    width: if format == MdpFormat::YCbCrH2V2Ubwc {
                        plane.stride
                    } else {
                        size.w as u32
                    },
                    height: size.h as u32,
                    offset: plane.offset,
                    stride: plane.stride,
                })
            }
            Some(_) => None,
            None => {
                let ScanoutSource::Surface(id) = scanout.source else {
                    return None;
                };
                let fb = self.framebuffers.iter().flatten().find(|fb| fb.id == id)?;
                Some(LayerBuffer {
                    handle: fb.id,
                    format,
                    width: fb.size.w as u32,
                    height: fb.size.h as u32,
                    offset: 0,
                    stride: fb.stride,
                })
            }
        }
    }

    fn fill_layers(
        &self,
        config: &LayerConfig,
        buffer: LayerBuffer,
        tint: bool,
        layers: &mut SmallVec<[MdpLayer; 8]>,
    ) {
        let Some(left) = config.left else {
            return;
        };
        let alpha = if tint {
            (config.alpha as f32 * 0.8) as u8
        } else {
            config.alpha
        };

        let rects = ScanoutRects {
            src: config.src,
            dst: config.dst,
        };
        let halves: SmallVec<[_; 2]> = match config.right {
            Some(right) => {
                let (l, r) = split_rects(&rects);
                SmallVec::from_buf([(left, l), (right, r)])
            }
            None => SmallVec::from_iter([(left, rects)]),
        };

        let hw = &self.caps.hw;
        for (pipe, rects) in halves {
            let layer = MdpLayer {
                pipe,
                zorder: config.zorder,
                alpha,
                blend: config.blend,
                color_space: ColorSpace::Bt709,
                src: rects.src,
                dst: rects.dst,
                horz_deci: decimation(rects.src.size.w.max(0) as u32, rects.dst.size.w.max(0) as u32, hw),
                vert_deci: decimation(rects.src.size.h.max(0) as u32, rects.dst.size.h.max(0) as u32, hw),
                buffer,
            };
            trace!(
                %pipe,
                z = layer.zorder,
                a = layer.alpha,
                src = ?layer.src,
                dst = ?layer.dst,
                decimate = ?(layer.horz_deci, layer.vert_deci),
                "config layer"
            );
            layers.push(layer);
        }
    }

    /// Drop the per-cycle reservations
    pub(super) fn end_cycle(&mut self) {
        self.zorder = 0;
        self.pipes.reset();
        self.planes.reset();
    }

    fn fini(&mut self) {
        if self.vsync_enabled {
            if let Err(err) = self.device.set_vsync(false) {
                warn!(?err, "failed to disable vsync ctrl");
            }
            self.vsync_enabled = false;
        }
        self.current_fence = None;
        self.next_fence = None;

        for fb in self.framebuffers.iter_mut().filter_map(Option::take) {
            if let Err(err) = self.device.free_framebuffer(&fb) {
                warn!(surface = %fb.id, ?err, "failed to free framebuffer");
            }
        }
        self.previous_damage.clear();
    }
}

impl<D: MdpDevice, R> Drop for QcomOutput<D, R> {
    fn drop(&mut self) {
        let span = self.span.clone();
        let _guard = span.enter();
        info!("destroying fbdev output");
        self.fini();
    }
}
