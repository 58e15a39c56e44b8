use std::fmt;

use indexmap::IndexMap;
use tracing::trace;

use super::{BufferKind, Rejection, View, ViewId, ViewLayer};
use crate::utils::{Physical, Rectangle, Region, Size};

bitflags::bitflags! {
    /// How a frame or a view reached the screen
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PresentationFlags: u32 {
        /// Presentation was synchronized to the vertical retrace
        const VSYNC = 0b0001;
        /// The timestamp comes from a hardware clock
        const HW_CLOCK = 0b0010;
        /// The hardware signaled completion
        const HW_COMPLETION = 0b0100;
        /// The client buffer was scanned out without a copy
        const ZERO_COPY = 0b1000;
    }
}

/// Where a view ended up for this repaint cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement<P> {
    /// Composited into the output framebuffer
    Primary,
    /// Scanned out directly on a hardware plane
    Plane(P),
    /// Copied into the cursor plane
    Cursor(P),
    /// Not visible on this output
    Offscreen,
}

impl<P> Placement<P> {
    /// Whether the view is shown through a hardware plane of its own
    pub fn is_plane(&self) -> bool {
        matches!(self, Placement::Plane(_) | Placement::Cursor(_))
    }
}

/// Placement of one view with its presentation feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewPlacement<P> {
    /// Where the view went
    pub placement: Placement<P>,
    /// Feedback flags for the view
    pub flags: PresentationFlags,
    /// Why the view did not get a plane, if it did not
    pub reason: Option<Rejection>,
}

/// Outcome of one [`assign_views`] walk
#[derive(Debug, Clone)]
pub struct PlaneAssignments<P> {
    /// Placement of every view, in back-to-front order
    pub placements: IndexMap<ViewId, ViewPlacement<P>>,
    /// Output area claimed by composited views
    pub composited: Region<Physical>,
    /// Whether anything was placed on the composited framebuffer
    pub primary_in_use: bool,
}

impl<P: Copy> PlaneAssignments<P> {
    /// Placement of the view `id`
    pub fn placement(&self, id: ViewId) -> Option<Placement<P>> {
        self.placements.get(&id).map(|p| p.placement)
    }

    /// Views placed on hardware planes, back to front
    pub fn planes(&self) -> impl Iterator<Item = (ViewId, P)> + '_ {
        self.placements.iter().filter_map(|(id, p)| match p.placement {
            Placement::Plane(plane) | Placement::Cursor(plane) => Some((*id, plane)),
            _ => None,
        })
    }
}

impl<P> Default for PlaneAssignments<P> {
    fn default() -> Self {
        PlaneAssignments {
            placements: IndexMap::new(),
            composited: Region::new(),
            primary_in_use: false,
        }
    }
}

/// Backend side of the assignment walk
///
/// Every `try_*` call either stages a pending scanout on a plane and returns
/// it, or leaves all planes untouched and returns the [`Rejection`].
pub trait PlaneAssigner {
    /// Plane identifier
    type Plane: Copy + PartialEq + fmt::Debug;

    /// Size of the output in pixels
    fn output_size(&self) -> Size<i32, Physical>;

    /// Put a cursor-layer view on the cursor plane
    fn try_cursor(&mut self, view: &View) -> Result<Self::Plane, Rejection> {
        let _ = view;
        Err(Rejection::UnsupportedBuffer)
    }

    /// Put a view with a sideband buffer on the plane that buffer names
    fn try_sideband(&mut self, view: &View) -> Result<Self::Plane, Rejection> {
        let _ = view;
        Err(Rejection::UnsupportedBuffer)
    }

    /// Put a view on a free overlay plane
    ///
    /// `is_last` is set for the topmost view, the last one to be placed;
    /// other views must leave one plane free for the composited framebuffer.
    fn try_overlay(&mut self, view: &View, is_last: bool) -> Result<Self::Plane, Rejection>;
}

/// Decide a placement for every view of an output
///
/// `views` are ordered front to back, topmost first, and are walked from
/// the back. Screen area claimed by a composited view is never given to a
/// plane later in the same walk.
#[profiling::function]
pub fn assign_views<A: PlaneAssigner>(assigner: &mut A, views: &[View]) -> PlaneAssignments<A::Plane> {
    let output = Rectangle::<i32, Physical>::from_size(assigner.output_size());
    let mut assignments = PlaneAssignments::default();

    for (index, view) in views.iter().enumerate().rev() {
        let placement = place_view(assigner, view, index == 0, output, &mut assignments.composited);
        trace!(view = view.id.0, ?placement, "placed view");

        if placement.placement == Placement::Primary {
            assignments.primary_in_use = true;
        }
        assignments.placements.insert(view.id, placement);
    }

    assignments
}

fn place_view<A: PlaneAssigner>(
    assigner: &mut A,
    view: &View,
    is_last: bool,
    output: Rectangle<i32, Physical>,
    composited: &mut Region<Physical>,
) -> ViewPlacement<A::Plane> {
    // the backdrop only feeds damage tracking of the framebuffer
    if view.layer == ViewLayer::Background {
        return composited_view(None);
    }

    if view.layer == ViewLayer::Cursor {
        match assigner.try_cursor(view) {
            Ok(plane) => {
                return ViewPlacement {
                    placement: Placement::Cursor(plane),
                    flags: PresentationFlags::empty(),
                    reason: None,
                }
            }
            Err(rejection) => trace!(view = ?view.id, ?rejection, "not on the cursor plane"),
        }
    }

    let bbox = view.bounding_box();
    if !bbox.overlaps(output) {
        return ViewPlacement {
            placement: Placement::Offscreen,
            flags: PresentationFlags::empty(),
            reason: Some(Rejection::Offscreen),
        };
    }

    let is_sideband = matches!(
        view.buffer.as_ref().map(|buffer| buffer.kind()),
        Some(BufferKind::Sideband { .. })
    );
    if is_sideband {
        match assigner.try_sideband(view) {
            Ok(plane) => return zero_copy(plane),
            Err(rejection) => trace!(view = ?view.id, ?rejection, "sideband not on its plane"),
        }
    }

    let reason = if composited.intersects(bbox) {
        Rejection::Overlap
    } else {
        match assigner.try_overlay(view, is_last) {
            Ok(plane) => return zero_copy(plane),
            Err(rejection) => rejection,
        }
    };

    composited.union_rect(bbox);
    composited_view(Some(reason))
}

fn zero_copy<P>(plane: P) -> ViewPlacement<P> {
    ViewPlacement {
        placement: Placement::Plane(plane),
        flags: PresentationFlags::ZERO_COPY,
        reason: None,
    }
}

fn composited_view<P>(reason: Option<Rejection>) -> ViewPlacement<P> {
    ViewPlacement {
        placement: Placement::Primary,
        flags: PresentationFlags::empty(),
        reason,
    }
}
