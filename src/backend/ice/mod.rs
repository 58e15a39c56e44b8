//! Intel CE media processor backend
//!
//! The display pipe exposes four universal pixel planes (`UPP_A` to `UPP_D`)
//! used as overlays, and an indexed-alpha plane (`IAP_B`) used for the
//! cursor. Each plane is programmed on its own and flipped asynchronously;
//! there is no completion event, so after every vblank the output asks each
//! plane which surface it really displays.
//!
//! The composited framebuffer is stacked on top of the overlays and goes onto
//! the last free universal plane. Client surfaces are placed on the planes
//! below it, which is why a view overlapping composited content can never get
//! a plane of its own.
//!
//! ```no_run
//! use scanplane::backend::ice::{Error, GdlDevice, IceOutput};
//! use scanplane::backend::scanout::{FramebufferRenderer, Placement, View};
//! use scanplane::utils::{Physical, Region};
//!
//! fn frame<D: GdlDevice, R: FramebufferRenderer>(
//!     output: &mut IceOutput<D, R>,
//!     views: &[View],
//!     damage: &Region<Physical>,
//! ) -> Result<(), Error> {
//!     let assignments = output.assign_planes(views);
//!     for (id, placement) in &assignments.placements {
//!         if let Placement::Plane(plane) = placement.placement {
//!             println!("view {} scanned out on {}", id.0, plane);
//!         }
//!     }
//!     output.repaint(damage)?;
//!     Ok(())
//! }
//! ```
//!
//! [`IceOutput::new`] returns a [`VBlankSource`](crate::backend::scanout::VBlankSource)
//! to insert into the event loop; each event is handed to
//! [`IceOutput::on_vblank`].

use std::io;

mod assign;
mod cursor;
pub mod device;
mod mode;
mod output;
mod plane;
mod sideband;
#[cfg(any(test, feature = "test_device"))]
pub mod test;

pub use self::cursor::CURSOR_SIZE;
pub use self::device::{
    Csc, GdlDevice, GdlError, GdlPlane, PaletteEntry, PlaneAttribute, Refresh, SurfaceInfo, TvMode,
};
pub use self::mode::{ModeFlags, OutputMode};
pub use self::output::{IceOutput, RepaintStatus};
pub use self::plane::{IcePlane, PlaneConfig, Tint};

use crate::backend::scanout::DebugFlags;

/// Errors of the ice backend
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A driver call failed
    #[error("{errmsg}: {source}")]
    Access {
        /// What the output was trying to do
        errmsg: &'static str,
        /// Driver error
        #[source]
        source: GdlError,
    },
    /// The raw id names no overlay plane
    #[error("invalid gdl plane {0}")]
    InvalidPlane(u32),
    /// The plane is not held by a client
    #[error("plane {0} is not acquired")]
    PlaneNotAcquired(GdlPlane),
    /// Only modes reported by the display pipe can be set
    #[error("mode is not a display pipe mode")]
    ModeRejected,
    /// The previous frame is still waiting for its vblank
    #[error("a flip is still pending")]
    FlipPending,
    /// The presentation clock cannot be read
    #[error("failed to read the presentation clock")]
    Clock(#[source] io::Error),
    /// The vblank thread could not be started
    #[error("failed to start the vblank thread")]
    VBlank(#[source] io::Error),
}

/// Settings of an [`IceOutput`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IceConfig {
    /// Debug switches, can be changed later with [`IceOutput::set_debug_flags`]
    pub debug_flags: DebugFlags,
}
