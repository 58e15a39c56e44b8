use std::fmt;

use super::caps::Pipe;
use super::device::BlendOp;
use super::format::MdpFormat;
use crate::backend::scanout::{PlaneConfiguration, PlaneMode, PlaneState};
use crate::utils::{Buffer as BufferCoords, Physical, Rectangle};

/// Number of logical planes of an output
pub const PLANE_COUNT: usize = 16;

/// Logical plane of a qcom output
///
/// Planes are only slots for layers; the hardware resource behind a layer
/// is the pipe it is fetched by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MdpPlane(pub u8);

impl fmt::Display for MdpPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plane {}", self.0)
    }
}

/// Layer parameters of a plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerConfig {
    /// Mode, `None` when unset
    pub mode: Option<PlaneMode>,
    /// Pipe fetching the layer, or its left half
    pub left: Option<Pipe>,
    /// Pipe fetching the right half of a split layer
    pub right: Option<Pipe>,
    /// Fetched part of the buffer
    pub src: Rectangle<i32, BufferCoords>,
    /// Position on the output
    pub dst: Rectangle<i32, Physical>,
    /// Layer-wide alpha
    pub alpha: u8,
    /// Pixel format of the buffer
    pub format: Option<MdpFormat>,
    /// Blending with the layers beneath
    pub blend: BlendOp,
    /// Stacking position
    pub zorder: u32,
}

impl PlaneConfiguration for LayerConfig {
    fn unset() -> Self {
        LayerConfig {
            mode: None,
            left: None,
            right: None,
            src: Rectangle::default(),
            dst: Rectangle::default(),
            alpha: 0,
            format: None,
            blend: BlendOp::Opaque,
            zorder: 0,
        }
    }

    fn mode(&self) -> Option<PlaneMode> {
        self.mode
    }

    fn set_mode(&mut self, mode: PlaneMode) {
        self.mode = Some(mode);
    }

    // every commit carries the complete layer list
    fn is_compatible(&self, _next: &Self) -> bool {
        true
    }
}

/// A logical plane and its scanout state
#[derive(Debug)]
pub struct QcomPlane {
    pub(super) id: MdpPlane,
    pub(super) state: PlaneState<LayerConfig>,
}

impl QcomPlane {
    pub(super) fn new(id: MdpPlane) -> QcomPlane {
        QcomPlane {
            id,
            state: PlaneState::new(),
        }
    }

    /// Plane id
    pub fn id(&self) -> MdpPlane {
        self.id
    }

    /// Scanout state
    pub fn state(&self) -> &PlaneState<LayerConfig> {
        &self.state
    }
}
