//! Qualcomm MDP framebuffer backend
//!
//! The display engine blends up to [`PLANE_COUNT`] layers, each fetched by
//! a source pipe: VIG pipes for client buffers, RGB pipes for the
//! composited framebuffer. All layers of a frame go to the hardware in a
//! single atomic commit which returns a release fence. The frame is on
//! screen at the next vsync; buffers it replaced may be reused once the
//! fence signals.
//!
//! ```no_run
//! use scanplane::backend::qcom::{Error, MdpDevice, QcomOutput};
//! use scanplane::backend::scanout::{FramebufferRenderer, View};
//! use scanplane::utils::{Physical, Region};
//!
//! fn frame<D: MdpDevice, R: FramebufferRenderer>(
//!     output: &mut QcomOutput<D, R>,
//!     views: &[View],
//!     damage: &Region<Physical>,
//! ) -> Result<(), Error> {
//!     let assignments = output.assign_planes(views);
//!     println!("{} views composited", assignments.placements.values().filter(|p| !p.placement.is_plane()).count());
//!     output.repaint(damage)?;
//!
//!     // later, when the vsync attribute is readable
//!     if let Some(frame) = output.on_vsync() {
//!         println!("frame shown at {:?}", frame.time);
//!     }
//!     // and when the release fence is
//!     output.on_release_fence();
//!     Ok(())
//! }
//! ```

use std::{io, path::PathBuf};

mod assign;
pub mod caps;
pub mod device;
mod fence;
mod format;
mod output;
mod pipe;
mod plane;

pub use self::caps::{HwInfo, MdpCaps, MdpFeatures, Pipe, PipeType};
pub use self::device::{
    BlendOp, CommitFences, Framebuffer, LayerBuffer, MdpDevice, MdpError, MdpLayer, ScreenInfo,
};
pub use self::fence::ReleaseFence;
pub use self::format::MdpFormat;
pub use self::output::{QcomOutput, RepaintStatus};
pub use self::pipe::{decimation, split_rects};
pub use self::plane::{LayerConfig, MdpPlane, QcomPlane, PLANE_COUNT};

use crate::backend::scanout::DebugFlags;
use crate::utils::Transform;

/// Errors of the qcom backend
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A device call failed
    #[error("{errmsg}: {source}")]
    Access {
        /// What the output was trying to do
        errmsg: &'static str,
        /// Device error
        #[source]
        source: MdpError,
    },
    /// The panel has a single mode
    #[error("mode is not the panel mode")]
    ModeRejected,
    /// The presentation clock cannot be read
    #[error("failed to read the presentation clock")]
    Clock(#[source] io::Error),
}

/// Settings of a [`QcomOutput`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QcomConfig {
    /// Framebuffer device node, used to name the output
    pub device_path: PathBuf,
    /// Output transform, client buffers must match it to be scanned out
    pub transform: Transform,
    /// Bit of this output in [`View::output_mask`](crate::backend::scanout::View::output_mask)
    pub output_id: u32,
    /// Debug switches
    pub debug_flags: DebugFlags,
}

impl Default for QcomConfig {
    fn default() -> Self {
        QcomConfig {
            device_path: PathBuf::from("/dev/fb0"),
            transform: Transform::Normal,
            output_id: 0,
            debug_flags: DebugFlags::empty(),
        }
    }
}
