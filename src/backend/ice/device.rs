//! Hardware operations of the GDL display driver

use std::fmt;

use drm_fourcc::DrmFourcc;

use crate::backend::scanout::{format::ColorSpace, PlaneCaps, SurfaceId, VBlankWait};
use crate::utils::{Buffer as BufferCoords, Physical, Rectangle, Size};

/// Hardware planes of a GDL display pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum GdlPlane {
    /// First indexed-alpha plane
    IapA = 1,
    /// Second indexed-alpha plane, used for the cursor
    IapB = 2,
    /// First universal pixel plane
    UppA = 3,
    /// Second universal pixel plane
    UppB = 4,
    /// Third universal pixel plane
    UppC = 5,
    /// Fourth universal pixel plane
    UppD = 6,
    /// Fifth universal pixel plane
    UppE = 7,
}

impl GdlPlane {
    /// Universal planes used as overlays, bottom first
    pub const OVERLAYS: [GdlPlane; 4] = [GdlPlane::UppA, GdlPlane::UppB, GdlPlane::UppC, GdlPlane::UppD];

    /// Every universal plane
    pub const UPP: [GdlPlane; 5] = [
        GdlPlane::UppA,
        GdlPlane::UppB,
        GdlPlane::UppC,
        GdlPlane::UppD,
        GdlPlane::UppE,
    ];

    /// Plane with the raw driver id `id`
    pub fn from_raw(id: u32) -> Option<GdlPlane> {
        Some(match id {
            1 => GdlPlane::IapA,
            2 => GdlPlane::IapB,
            3 => GdlPlane::UppA,
            4 => GdlPlane::UppB,
            5 => GdlPlane::UppC,
            6 => GdlPlane::UppD,
            7 => GdlPlane::UppE,
            _ => return None,
        })
    }

    /// Raw driver id
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Whether this is one of the indexed-alpha planes
    pub fn is_iap(self) -> bool {
        matches!(self, GdlPlane::IapA | GdlPlane::IapB)
    }

    /// Driver name of the plane
    pub fn name(self) -> &'static str {
        match self {
            GdlPlane::IapA => "IAP_A",
            GdlPlane::IapB => "IAP_B",
            GdlPlane::UppA => "UPP_A",
            GdlPlane::UppB => "UPP_B",
            GdlPlane::UppC => "UPP_C",
            GdlPlane::UppD => "UPP_D",
            GdlPlane::UppE => "UPP_E",
        }
    }
}

impl fmt::Display for GdlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure codes of the GDL driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum GdlError {
    /// A parameter was rejected
    #[error("invalid parameter")]
    InvalidParam,
    /// The driver ran out of memory
    #[error("out of memory")]
    NoMemory,
    /// The resource is in use
    #[error("resource busy")]
    Busy,
    /// The display has no mode set
    #[error("display mode undefined")]
    TvModeUndefined,
    /// The operation is not supported by the hardware
    #[error("not supported")]
    NotSupported,
    /// Any other driver code
    #[error("gdl error {0:#x}")]
    Other(i32),
}

/// Refresh rates a GDL display mode may have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Refresh {
    /// 23.976 Hz
    Hz23_98,
    /// 24 Hz
    Hz24,
    /// 25 Hz
    Hz25,
    /// 29.97 Hz
    Hz29_97,
    /// 30 Hz
    Hz30,
    /// 47.952 Hz
    Hz47_96,
    /// 48 Hz
    Hz48,
    /// 50 Hz
    Hz50,
    /// 59.94 Hz
    Hz59_94,
    /// 60 Hz
    Hz60,
    /// 85 Hz
    Hz85,
    /// 100 Hz
    Hz100,
    /// 119.88 Hz
    Hz119_88,
    /// 120 Hz
    Hz120,
}

impl Refresh {
    /// Refresh rate in mHz
    pub fn millihertz(self) -> u32 {
        match self {
            Refresh::Hz23_98 => 23976,
            Refresh::Hz24 => 24000,
            Refresh::Hz25 => 25000,
            Refresh::Hz29_97 => 29970,
            Refresh::Hz30 => 30000,
            Refresh::Hz47_96 => 47952,
            Refresh::Hz48 => 48000,
            Refresh::Hz50 => 50000,
            Refresh::Hz59_94 => 59940,
            Refresh::Hz60 => 60000,
            Refresh::Hz85 => 85000,
            Refresh::Hz100 => 100000,
            Refresh::Hz119_88 => 119880,
            Refresh::Hz120 => 120000,
        }
    }
}

/// Display timing reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TvMode {
    /// Active area
    pub size: Size<i32, Physical>,
    /// Vertical refresh
    pub refresh: Refresh,
    /// Whether lines are sent as two fields
    pub interlaced: bool,
}

impl TvMode {
    /// Mode assumed while the display reports none, 720x576 progressive at 50 Hz
    pub fn fallback() -> TvMode {
        TvMode {
            size: Size::from((720, 576)),
            refresh: Refresh::Hz50,
            interlaced: false,
        }
    }
}

/// A hardware surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    /// Surface id, valid until the surface is freed
    pub id: SurfaceId,
    /// Pixel format
    pub format: DrmFourcc,
    /// Size in pixels
    pub size: Size<i32, BufferCoords>,
    /// Bytes per row
    pub pitch: usize,
}

/// One entry of an indexed-color palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaletteEntry {
    /// Alpha
    pub a: u8,
    /// Red or luma
    pub r: u8,
    /// Green or U
    pub g: u8,
    /// Blue or V
    pub b: u8,
}

/// Color conversion adjustment of a plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Csc {
    /// 3x3 matrix, row major
    pub coefficients: [f32; 9],
    /// Luma or green input offset
    pub yg_offset: i32,
    /// Blue chroma input offset
    pub cb_offset: i32,
    /// Red chroma input offset
    pub cr_offset: i32,
}

/// A plane attribute set within one configuration transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaneAttribute {
    /// Hide the plane
    Hide(bool),
    /// Mute video output of the plane
    VidMute(bool),
    /// Route the plane through the scaler
    Scale(bool),
    /// Contents carry premultiplied alpha
    AlphaPremult(bool),
    /// Plane-wide alpha
    AlphaGlobal(u8),
    /// Fit mismatched video frames into the destination
    VidMismatchConstrain,
    /// Source rectangle of video frames
    VidSrcRect(Rectangle<i32, BufferCoords>),
    /// Destination rectangle of video frames
    VidDstRect(Rectangle<i32, Physical>),
    /// Color space of the surface samples
    SrcColorSpace(ColorSpace),
    /// Pixel format of flipped surfaces
    PixelFormat(DrmFourcc),
    /// Source rectangle of flipped surfaces
    SrcRect(Rectangle<i32, BufferCoords>),
    /// Destination rectangle of flipped surfaces
    DstRect(Rectangle<i32, Physical>),
    /// Color conversion adjustment
    CscAdjust(Csc),
}

/// Access to the GDL driver
///
/// Every call maps to one driver entry point. Implementations only forward
/// to the hardware; all bookkeeping is done by the output.
pub trait GdlDevice {
    /// Blocking vblank wait handed to the vblank thread
    type VBlank: VBlankWait;

    /// Capabilities of `plane`
    fn plane_capabilities(&mut self, plane: GdlPlane) -> Result<PlaneCaps, GdlError>;

    /// Set `attributes` on `plane` in one begin/end transaction
    ///
    /// If any attribute fails the transaction is aborted and nothing changes.
    fn configure_plane(&mut self, plane: GdlPlane, attributes: &[PlaneAttribute]) -> Result<(), GdlError>;

    /// Put `plane` back to its power-on state
    fn reset_plane(&mut self, plane: GdlPlane) -> Result<(), GdlError>;

    /// Asynchronously flip `surface` on `plane`, `None` flips nothing
    fn flip(&mut self, plane: GdlPlane, surface: Option<SurfaceId>) -> Result<(), GdlError>;

    /// Surface `plane` is scanning out right now
    fn displayed_surface(&mut self, plane: GdlPlane) -> Result<Option<SurfaceId>, GdlError>;

    /// Stack the universal planes, bottom first
    fn set_upp_zorder(&mut self, order: &[GdlPlane]) -> Result<(), GdlError>;

    /// Mode of the display pipe
    fn display_mode(&mut self) -> Result<TvMode, GdlError>;

    /// Allocate a surface, `cached` surfaces need [`GdlDevice::flush_surface`]
    fn alloc_surface(
        &mut self,
        format: DrmFourcc,
        size: Size<i32, BufferCoords>,
        cached: bool,
    ) -> Result<SurfaceInfo, GdlError>;

    /// Free a surface
    fn free_surface(&mut self, surface: SurfaceId) -> Result<(), GdlError>;

    /// CPU mapping of a surface, `pitch * height` bytes
    fn surface_data(&mut self, surface: SurfaceId) -> Result<&mut [u8], GdlError>;

    /// Set the palette of an indexed-color surface
    fn set_palette(&mut self, surface: SurfaceId, palette: &[PaletteEntry; 256]) -> Result<(), GdlError>;

    /// Write back the CPU cache of a cached surface
    fn flush_surface(&mut self, surface: SurfaceId);

    /// A vblank wait for the display pipe
    fn vblank_waiter(&mut self) -> Result<Self::VBlank, GdlError>;
}
