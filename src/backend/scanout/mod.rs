//! Hardware plane scanout shared by the display backends
//!
//! A scanout backend drives a display pipeline made of a fixed set of
//! hardware planes. Every repaint cycle goes through the same steps:
//!
//! 1. [`assign_views`] walks the views back-to-front and asks the backend,
//!    through [`PlaneAssigner`], to place each of them on a hardware plane.
//!    Views that cannot be placed fall back to the composited framebuffer.
//! 2. Placed views stage a pending [`Scanout`] on their [`PlaneState`].
//! 3. The backend renders the composited framebuffer if needed and
//!    commits every pending scanout ([`commit_plane`]).
//! 4. When the hardware reports completion (vblank or release fence)
//!    [`complete_plane`] reconciles what is really displayed and releases
//!    the [`Buffer`]s that left the screen.
//!
//! Geometric checks live in [`clip`], pixel format tables in [`format`],
//! plane and pipe bookkeeping in [`PlanePool`] and [`ScalerSlot`].
//!
//! Vblank delivery from a blocking hardware wait into a [`calloop`] event
//! loop is provided by [`VBlankThread`] and [`VBlankSource`].

use std::fmt;

mod assign;
mod buffer;
pub mod clip;
mod commit;
pub mod format;
mod plane;
mod pool;
mod view;
mod vblank;

pub use self::assign::{assign_views, PlaneAssigner, PlaneAssignments, Placement, PresentationFlags, ViewPlacement};
pub use self::buffer::{Buffer, BufferKind, DmabufPlane, SidebandKind};
pub use self::commit::{commit_plane, complete_plane, CommitOutcome, FlipOutcome, PlaneDevice};
pub use self::plane::{FlipState, PlaneConfiguration, PlaneMode, PlaneState, Scanout, ScanoutSource};
pub use self::pool::{PlaneCaps, PlanePool, ScaleLimits, ScalerSlot};
pub use self::vblank::{VBlank, VBlankCancel, VBlankSource, VBlankThread, VBlankWait};
pub use self::view::{TransformFlags, View, ViewId, ViewLayer, ViewTransform};

use crate::utils::{Monotonic, Physical, Region, Time};

/// Hardware id of a scanout surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

bitflags::bitflags! {
    /// Debug switches of a scanout backend
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DebugFlags: u32 {
        /// Tint planes by role and lower their alpha so they can be told apart
        const TINT = 0b0000_0001;
        /// Composite every view, leaving overlay planes unused
        const DISABLE_PLANES = 0b0000_0010;
    }
}

/// Reason a view could not be put on a hardware plane
///
/// A rejection is not an error: the view is simply composited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Rejection {
    /// The view does not intersect the output
    #[error("surface out of screen")]
    Offscreen,
    /// The view transform rotates or shears
    #[error("transform not supported")]
    UnsupportedTransform,
    /// No buffer is attached
    #[error("no buffer attached")]
    NoBuffer,
    /// The buffer type cannot be scanned out by this plane
    #[error("unhandled buffer type")]
    UnsupportedBuffer,
    /// The pixel format is not supported by the plane
    #[error("pixel format not supported")]
    UnsupportedFormat,
    /// A format with alpha is only partly covered by the opaque region
    #[error("surface with alpha is partly opaque")]
    PartiallyOpaque,
    /// The destination size exceeds the plane limits
    #[error("surface size not supported by hw")]
    SizeOutOfRange,
    /// The source would have to shrink
    #[error("cannot downscale")]
    Downscale,
    /// The scale factor is beyond what the scaler supports
    #[error("scaling factor not supported")]
    ScaleOutOfRange,
    /// The source is too wide to be scaled
    #[error("source too wide to scale")]
    SourceTooWide,
    /// Scaling is avoided on interlaced outputs
    #[error("avoid scaling in interlaced mode")]
    ScaleInterlaced,
    /// The scaler is already used by another plane this cycle
    #[error("no scaler left")]
    ScalerBusy,
    /// Every plane is taken
    #[error("no plane available")]
    NoFreePlane,
    /// The last free plane is kept for the composited framebuffer
    #[error("last plane kept for the framebuffer")]
    ReservedForFramebuffer,
    /// Every pipe of the needed type is taken
    #[error("no pipe available")]
    NoFreePipe,
    /// The target plane still has a pending scanout
    #[error("plane has a pending scanout")]
    PlaneBusy,
    /// A client owns the plane
    #[error("plane acquired by a client")]
    PlaneAcquired,
    /// The plane must be acquired by a client first
    #[error("plane not acquired")]
    PlaneNotAcquired,
    /// The view is also visible on another output
    #[error("view spans other outputs")]
    OtherOutputs,
    /// The cursor image is larger than the cursor plane
    #[error("cursor too large")]
    CursorTooLarge,
    /// The view overlaps composited content
    #[error("overlaps composited content")]
    Overlap,
    /// Overlay planes are disabled by debug flags
    #[error("planes disabled")]
    PlanesDisabled,
}

/// Core scanout errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A scanout was staged on a plane that already has one pending
    #[error("plane already has a pending scanout")]
    PlaneBusy,
}

/// Frame completion to report to the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFinished {
    /// Time the frame hit the screen, or the best estimate of it
    pub time: Time<Monotonic>,
    /// How `time` was obtained
    pub flags: PresentationFlags,
}

/// Renders the composited fallback into one of the output framebuffers
pub trait FramebufferRenderer {
    /// Error returned by [`FramebufferRenderer::render`]
    type Error: std::error::Error + Send + Sync + 'static;

    /// Repaint `damage` of framebuffer number `framebuffer`
    fn render(&mut self, framebuffer: usize, damage: &Region<Physical>) -> Result<(), Self::Error>;
}

/// Route logs of a test to the test output, filtered by `RUST_LOG`
#[cfg(test)]
pub(crate) fn test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
