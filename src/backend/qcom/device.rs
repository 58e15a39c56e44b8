use std::{fmt, io, ops::Range, os::unix::io::OwnedFd};

use scan_fmt::scan_fmt;

use super::caps::Pipe;
use super::format::MdpFormat;
use crate::backend::scanout::format::ColorSpace;
use crate::backend::scanout::SurfaceId;
use crate::utils::{Buffer as BufferCoords, Monotonic, Physical, Rectangle, Size, Time};

/// Errors of MDP device calls
#[derive(Debug, thiserror::Error)]
pub enum MdpError {
    /// An ioctl or file access failed
    #[error("{errmsg}")]
    Io {
        /// What the call was doing
        errmsg: &'static str,
        /// OS error
        #[source]
        source: io::Error,
    },
    /// The display engine refused the layer configuration
    #[error("layer configuration rejected")]
    Rejected,
    /// An attribute read from the device did not have the expected form
    #[error("malformed {0}")]
    Malformed(&'static str),
}

/// Fixed information of the framebuffer device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenInfo {
    /// Visible area
    pub size: Size<i32, Physical>,
    /// Physical size of the panel in millimeters, if known
    pub physical_size: Option<Size<i32, Physical>>,
    /// Refresh rate in mHz
    pub refresh: u32,
    /// Device identifier
    pub id: String,
}

impl ScreenInfo {
    /// Physical size, assuming 96 dpi when the panel does not report one
    pub fn physical_size_or_default(&self) -> Size<i32, Physical> {
        self.physical_size.unwrap_or_else(|| {
            let mm = |px: i32| (px as f32 * 25.4 / 96.0).round() as i32;
            Size::from((mm(self.size.w), mm(self.size.h)))
        })
    }
}

/// A buffer allocated for the composited framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    /// Handle passed in layers
    pub id: SurfaceId,
    /// Pixel format
    pub format: MdpFormat,
    /// Size in pixels
    pub size: Size<i32, BufferCoords>,
    /// Bytes per row
    pub stride: u32,
}

impl Framebuffer {
    /// Bytes per pixel of the framebuffer format
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Byte range of the framebuffer covering `damage`, all of it for `None`
    ///
    /// The range starts at the first damaged pixel and ends after the last
    /// one, so the lines in between are flushed completely.
    pub fn flush_range(&self, damage: Option<Rectangle<i32, Physical>>) -> Range<usize> {
        let stride = self.stride as usize;
        let full = 0..stride * self.size.h.max(0) as usize;

        let Some(damage) = damage else {
            return full;
        };
        let Some(damage) = damage.intersection(Rectangle::from_size(self.size.to_kind())) else {
            return 0..0;
        };

        let start = damage.loc.y as usize * stride + damage.loc.x as usize * Self::BYTES_PER_PIXEL;
        let end = (damage.loc.y + damage.size.h - 1) as usize * stride
            + (damage.loc.x + damage.size.w) as usize * Self::BYTES_PER_PIXEL;
        start..end
    }
}

/// How a layer mixes with the layers beneath it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    /// Alpha is ignored
    #[default]
    Opaque,
    /// Per-pixel premultiplied alpha
    Premultiplied,
}

/// Memory read by a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerBuffer {
    /// Buffer handle, a dmabuf import or a framebuffer
    pub handle: SurfaceId,
    /// Pixel format
    pub format: MdpFormat,
    /// Width as the pipe sees it
    ///
    /// Compressed NV12 is fetched by stride rather than by visible width.
    pub width: u32,
    /// Height in lines
    pub height: u32,
    /// Byte offset of the first pixel
    pub offset: u32,
    /// Bytes per row
    pub stride: u32,
}

/// One input layer of an atomic commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MdpLayer {
    /// Pipe fetching this layer
    pub pipe: Pipe,
    /// Stacking position, higher is on top
    pub zorder: u32,
    /// Layer-wide alpha
    pub alpha: u8,
    /// Blending with the layers beneath
    pub blend: BlendOp,
    /// Color space of YUV samples
    pub color_space: ColorSpace,
    /// Fetched part of the buffer
    pub src: Rectangle<i32, BufferCoords>,
    /// Position on the output
    pub dst: Rectangle<i32, Physical>,
    /// Horizontal decimation factor
    pub horz_deci: u8,
    /// Vertical decimation factor
    pub vert_deci: u8,
    /// Memory to fetch
    pub buffer: LayerBuffer,
}

/// Fences returned by a successful atomic commit
#[derive(Default)]
pub struct CommitFences {
    /// Signals once the buffers of this commit are no longer read
    pub release: Option<OwnedFd>,
    /// Signals once this commit left the screen
    pub retire: Option<OwnedFd>,
}

impl fmt::Debug for CommitFences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitFences")
            .field("release", &self.release.is_some())
            .field("retire", &self.retire.is_some())
            .finish()
    }
}

/// Access to the MDP framebuffer device
///
/// The output does all the bookkeeping; implementations only translate
/// calls into ioctls and sysfs accesses.
pub trait MdpDevice {
    /// Resolution, refresh and name of the panel
    fn screen_info(&mut self) -> Result<ScreenInfo, MdpError>;

    /// Contents of the MDP `caps` attribute
    fn read_caps(&mut self) -> Result<String, MdpError>;

    /// Allocate a cached, CPU mapped framebuffer
    fn alloc_framebuffer(&mut self, size: Size<i32, BufferCoords>) -> Result<Framebuffer, MdpError>;

    /// Free a framebuffer
    fn free_framebuffer(&mut self, framebuffer: &Framebuffer) -> Result<(), MdpError>;

    /// Write back the CPU cache lines of `range`
    fn flush_framebuffer(&mut self, framebuffer: &Framebuffer, range: Range<usize>) -> Result<(), MdpError>;

    /// Show `layers` at the next vsync
    fn atomic_commit(&mut self, layers: &[MdpLayer]) -> Result<CommitFences, MdpError>;

    /// Turn vsync events on or off
    fn set_vsync(&mut self, enabled: bool) -> Result<(), MdpError>;

    /// Contents of the `vsync_event` attribute
    fn read_vsync_event(&mut self) -> Result<String, MdpError>;
}

/// Parse the `VSYNC=<ns>` contents of the vsync attribute
pub fn parse_vsync_event(text: &str) -> Result<Time<Monotonic>, MdpError> {
    if !text.starts_with("VSYNC=") {
        return Err(MdpError::Malformed("vsync event"));
    }
    scan_fmt!(text, "VSYNC={d}", u64)
        .map(Time::from_nanos)
        .map_err(|_| MdpError::Malformed("vsync timestamp"))
}
