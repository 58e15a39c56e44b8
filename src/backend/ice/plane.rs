use drm_fourcc::DrmFourcc;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::device::{Csc, GdlDevice, GdlError, GdlPlane, PlaneAttribute};
use crate::backend::scanout::{
    format::ColorSpace, PlaneCaps, PlaneConfiguration, PlaneDevice, PlaneMode, PlaneState, ScanoutSource,
};
use crate::utils::{Buffer as BufferCoords, Physical, Rectangle};

/// Debug tint of a plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tint {
    /// No tint
    #[default]
    None,
    /// The composited framebuffer
    Red,
    /// Sideband planes
    Green,
    /// Client surfaces
    Blue,
}

impl Tint {
    fn csc(self) -> Csc {
        let mut csc = Csc {
            coefficients: [1.0; 9],
            yg_offset: 0,
            cb_offset: 0,
            cr_offset: 0,
        };
        match self {
            Tint::Red => csc.cr_offset = 512,
            Tint::Blue => csc.cb_offset = 512,
            Tint::Green => csc.yg_offset = 512,
            Tint::None => {}
        }
        csc
    }
}

/// Configuration programmed into a GDL plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneConfig {
    /// Source rectangle in buffer pixels
    pub src: Rectangle<i32, BufferCoords>,
    /// Destination rectangle on the output
    pub dst: Rectangle<i32, Physical>,
    /// Pixel format of flipped surfaces
    pub format: Option<DrmFourcc>,
    /// Color space of flipped surfaces
    pub color_space: Option<ColorSpace>,
    /// Whether the contents are premultiplied
    pub premultiplied: bool,
    /// Whether the plane goes through the scaler
    pub scale: bool,
    /// Plane alpha
    pub alpha: u8,
    /// Plane mode, `None` right after a reset
    pub mode: Option<PlaneMode>,
    /// Debug tint
    pub tint: Tint,
}

impl PlaneConfiguration for PlaneConfig {
    fn unset() -> Self {
        PlaneConfig {
            src: Rectangle::default(),
            dst: Rectangle::default(),
            format: None,
            color_space: None,
            premultiplied: false,
            scale: false,
            alpha: 255,
            mode: None,
            tint: Tint::None,
        }
    }

    fn mode(&self) -> Option<PlaneMode> {
        self.mode
    }

    fn set_mode(&mut self, mode: PlaneMode) {
        self.mode = Some(mode);
    }

    fn is_compatible(&self, next: &Self) -> bool {
        if self.mode != Some(PlaneMode::Graphics) {
            return true;
        }
        next.mode == self.mode && next.format == self.format && next.src == self.src && next.dst == self.dst
    }
}

impl Default for PlaneConfig {
    fn default() -> Self {
        PlaneConfig::unset()
    }
}

/// One GDL plane owned by an output
#[derive(Debug)]
pub struct IcePlane {
    pub(super) id: GdlPlane,
    pub(super) caps: PlaneCaps,
    pub(super) state: PlaneState<PlaneConfig>,
    pub(super) acquire_count: u32,
}

impl IcePlane {
    /// Read the capabilities of `id` and reset it
    pub(super) fn new<D: GdlDevice>(device: &mut D, id: GdlPlane) -> IcePlane {
        let caps = device.plane_capabilities(id).unwrap_or_else(|err| {
            warn!(plane = %id, ?err, "failed to get plane capabilities");
            PlaneCaps {
                formats: Default::default(),
                min_dst: Default::default(),
                max_dst: Default::default(),
                max_src_width: None,
            }
        });

        let mut planes = GdlPlanes::new(device, None);
        if let Err(err) = planes.reset(id) {
            warn!(plane = %id, ?err, "failed to reset plane");
        }

        IcePlane {
            id,
            caps,
            state: PlaneState::new(),
            acquire_count: 0,
        }
    }

    /// Hardware id
    pub fn id(&self) -> GdlPlane {
        self.id
    }

    /// Capabilities read at creation
    pub fn caps(&self) -> &PlaneCaps {
        &self.caps
    }

    /// Commit state
    pub fn state(&self) -> &PlaneState<PlaneConfig> {
        &self.state
    }

    /// Number of clients holding the plane
    pub fn acquire_count(&self) -> u32 {
        self.acquire_count
    }

    /// Whether a compositor view may be flipped on the plane this cycle
    pub(super) fn is_available(&self) -> bool {
        self.state.is_idle() && self.acquire_count == 0
    }
}

/// [`PlaneDevice`] view of a GDL device for one repaint cycle
pub(super) struct GdlPlanes<'a, D> {
    device: &'a mut D,
    scaler_owner: Option<GdlPlane>,
}

impl<'a, D: GdlDevice> GdlPlanes<'a, D> {
    /// `scaler_owner` is the plane given the scaler this cycle
    pub(super) fn new(device: &'a mut D, scaler_owner: Option<GdlPlane>) -> Self {
        GdlPlanes { device, scaler_owner }
    }
}

impl<'a, D: GdlDevice> PlaneDevice for GdlPlanes<'a, D> {
    type Plane = GdlPlane;
    type Config = PlaneConfig;
    type Error = GdlError;

    fn reconfigure(&mut self, plane: GdlPlane, current: &PlaneConfig, next: &PlaneConfig) -> Result<(), GdlError> {
        let mut attributes = SmallVec::<[PlaneAttribute; 12]>::new();

        let (hide, vid_mute) = match next.mode {
            None | Some(PlaneMode::Disabled) => {
                trace!(%plane, "hide plane");
                (true, true)
            }
            Some(PlaneMode::Bypass) => {
                trace!(%plane, "configure plane for bypass");
                (false, false)
            }
            Some(PlaneMode::Video) => {
                trace!(%plane, alpha = next.alpha, src = ?next.src, dst = ?next.dst, "configure video plane");
                attributes.push(PlaneAttribute::AlphaPremult(false));
                attributes.push(PlaneAttribute::AlphaGlobal(scale_alpha(
                    next.alpha,
                    if next.tint != Tint::None { 0.8 } else { 1.0 },
                )));
                attributes.push(PlaneAttribute::VidMismatchConstrain);
                attributes.push(PlaneAttribute::VidSrcRect(next.src));
                attributes.push(PlaneAttribute::VidDstRect(next.dst));
                attributes.push(PlaneAttribute::VidMute(false));
                (false, false)
            }
            Some(PlaneMode::Graphics) => {
                trace!(
                    %plane,
                    format = ?next.format,
                    color_space = ?next.color_space,
                    alpha = next.alpha,
                    src = ?next.src,
                    dst = ?next.dst,
                    "configure graphics plane"
                );
                if let Some(color_space) = next.color_space {
                    attributes.push(PlaneAttribute::SrcColorSpace(color_space));
                }
                if let Some(format) = next.format {
                    attributes.push(PlaneAttribute::PixelFormat(format));
                }
                attributes.push(PlaneAttribute::AlphaPremult(next.premultiplied));
                // graphics are never fully opaque on screen
                attributes.push(PlaneAttribute::AlphaGlobal(scale_alpha(
                    next.alpha,
                    if next.tint != Tint::None { 0.8 } else { 0.96 },
                )));
                attributes.push(PlaneAttribute::SrcRect(next.src));
                attributes.push(PlaneAttribute::DstRect(next.dst));
                (false, true)
            }
        };

        attributes.push(PlaneAttribute::Hide(hide));

        if !plane.is_iap() {
            attributes.push(PlaneAttribute::VidMute(vid_mute));
            attributes.push(PlaneAttribute::Scale(next.scale && !hide));
        }

        if current.tint != next.tint {
            attributes.push(PlaneAttribute::CscAdjust(next.tint.csc()));
        }

        self.device.configure_plane(plane, &attributes)
    }

    fn reset(&mut self, plane: GdlPlane) -> Result<(), GdlError> {
        debug!(%plane, "reset plane");
        self.device.reset_plane(plane)?;

        if self.scaler_owner == Some(plane) {
            // the scaler may be left enabled on a plane that lost it
            for other in GdlPlane::UPP.into_iter().filter(|other| *other != plane) {
                if let Err(err) = self.device.configure_plane(other, &[PlaneAttribute::Scale(false)]) {
                    warn!(plane = %other, ?err, "failed to disable scaling");
                }
            }
        }
        Ok(())
    }

    fn flip(&mut self, plane: GdlPlane, source: ScanoutSource) -> Result<(), GdlError> {
        match source {
            ScanoutSource::Surface(surface) => self.device.flip(plane, Some(surface)),
            _ => self.device.flip(plane, None),
        }
    }

    fn displayed(&mut self, plane: GdlPlane) -> Result<ScanoutSource, GdlError> {
        Ok(match self.device.displayed_surface(plane)? {
            Some(surface) => ScanoutSource::Surface(surface),
            None => ScanoutSource::Disabled,
        })
    }
}

fn scale_alpha(alpha: u8, factor: f32) -> u8 {
    (alpha as f32 * factor) as u8
}
