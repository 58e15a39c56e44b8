use super::Buffer;
use crate::utils::{Buffer as BufferCoords, Logical, Physical, Point, Rectangle, Region, Scale, Size, Transform};

/// Identifies a view across repaint cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u64);

/// Layer a view belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewLayer {
    /// The transparent backdrop tracking composited damage
    Background,
    /// The pointer cursor layer
    Cursor,
    /// Any other layer
    #[default]
    Normal,
}

bitflags::bitflags! {
    /// Classification of a view transform
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransformFlags: u32 {
        /// Offset applied
        const TRANSLATE = 0b001;
        /// Axis-aligned scale applied
        const SCALE = 0b010;
        /// Rotation or shear applied
        const ROTATE = 0b100;
    }
}

/// Mapping from surface-local coordinates to output pixels
///
/// A point `p` of the surface lands at `offset + p * scale` on the output.
/// Views whose matrix rotates carry [`TransformFlags::ROTATE`] and are never
/// scanned out directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Output position of the surface origin
    pub offset: Point<f64, Physical>,
    /// Scale from surface to output units
    pub scale: Scale,
    /// What the matrix does
    pub flags: TransformFlags,
}

impl ViewTransform {
    /// Pure translation to `offset`
    pub fn translate(offset: Point<f64, Physical>) -> Self {
        ViewTransform {
            offset,
            scale: Scale::default(),
            flags: TransformFlags::TRANSLATE,
        }
    }

    /// Translation to `offset` combined with `scale`
    pub fn scaled(offset: Point<f64, Physical>, scale: impl Into<Scale>) -> Self {
        let scale = scale.into();
        let mut flags = TransformFlags::TRANSLATE;
        if !scale.is_identity() {
            flags |= TransformFlags::SCALE;
        }
        ViewTransform { offset, scale, flags }
    }

    /// Map a surface-local point to output space
    pub fn apply(&self, point: Point<f64, Logical>) -> Point<f64, Physical> {
        Point::from((
            self.offset.x + point.x * self.scale.x,
            self.offset.y + point.y * self.scale.y,
        ))
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        ViewTransform::translate(Point::default())
    }
}

/// A surface as placed on an output by the scene graph
#[derive(Debug, Clone)]
pub struct View {
    /// Stable identity of the view
    pub id: ViewId,
    /// Layer the view is stacked in
    pub layer: ViewLayer,
    /// Size of the surface in surface-local units
    pub surface_size: Size<i32, Logical>,
    /// Surface to output mapping
    pub transform: ViewTransform,
    /// Attached buffer
    pub buffer: Option<Buffer>,
    /// Transform the client applied to its buffer contents
    pub buffer_transform: Transform,
    /// Integer buffer scale
    pub buffer_scale: i32,
    /// Viewport source crop in buffer pixels
    pub viewport_src: Option<Rectangle<f64, BufferCoords>>,
    /// Opaque part of the surface
    pub opaque: Region<Logical>,
    /// Surface damage since the last commit
    pub damage: Region<Logical>,
    /// Opacity, 0.0 to 1.0
    pub alpha: f32,
    /// Bitmask of outputs the view is visible on
    pub output_mask: u32,
}

impl View {
    /// A fully opaque-unknown, unscaled view at the origin of output 0
    pub fn new(id: ViewId, surface_size: impl Into<Size<i32, Logical>>) -> View {
        View {
            id,
            layer: ViewLayer::Normal,
            surface_size: surface_size.into(),
            transform: ViewTransform::default(),
            buffer: None,
            buffer_transform: Transform::Normal,
            buffer_scale: 1,
            viewport_src: None,
            opaque: Region::new(),
            damage: Region::new(),
            alpha: 1.0,
            output_mask: 1,
        }
    }

    /// Output-space bounding box of the surface, rounded outwards
    pub fn bounding_box(&self) -> Rectangle<i32, Physical> {
        let size = self.surface_size.to_f64();
        let p1 = self.transform.apply(Point::default());
        let p2 = self.transform.apply(Point::from((size.w, size.h)));
        Rectangle::from_extremities(
            (p1.x.min(p2.x).floor() as i32, p1.y.min(p2.y).floor() as i32),
            (p1.x.max(p2.x).ceil() as i32, p1.y.max(p2.y).ceil() as i32),
        )
    }

    /// Map a surface-local point to buffer pixels
    pub fn surface_to_buffer(&self, point: Point<f64, Logical>) -> Point<f64, BufferCoords> {
        match self.viewport_src {
            Some(src) => {
                let size = self.surface_size.to_f64();
                let (kx, ky) = if size.w > 0.0 && size.h > 0.0 {
                    (src.size.w / size.w, src.size.h / size.h)
                } else {
                    (0.0, 0.0)
                };
                Point::from((src.loc.x + point.x * kx, src.loc.y + point.y * ky))
            }
            None => {
                let scale = self.buffer_scale.max(1) as f64;
                Point::from((point.x * scale, point.y * scale))
            }
        }
    }

    /// Opacity as an 8 bit plane alpha
    pub fn alpha_u8(&self) -> u8 {
        (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}
