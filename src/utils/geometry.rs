use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Type-level marker for surface-local coordinates
#[derive(Debug)]
pub struct Logical;

/// Type-level marker for output pixel coordinates
#[derive(Debug)]
pub struct Physical;

/// Type-level marker for buffer pixel coordinates
#[derive(Debug)]
pub struct Buffer;

/// Numeric type usable as a coordinate of the geometry types
pub trait Coordinate:
    Sized + Add<Self, Output = Self> + Sub<Self, Output = Self> + PartialOrd + Default + Copy + fmt::Debug
{
    /// The zero value
    const ZERO: Self;
    /// Widen to f64
    fn to_f64(self) -> f64;
    /// Narrow from f64, truncating
    fn from_f64(v: f64) -> Self;
    /// Smaller of two values
    fn min(self, other: Self) -> Self {
        if self < other {
            self
        } else {
            other
        }
    }
    /// Larger of two values
    fn max(self, other: Self) -> Self {
        if self > other {
            self
        } else {
            other
        }
    }
    /// Addition clamped to the numeric range
    fn saturating_add(self, other: Self) -> Self;
    /// Subtraction clamped to the numeric range
    fn saturating_sub(self, other: Self) -> Self;
}

macro_rules! coordinate_impl {
    (int: $($ty:ty),*) => {
        $(
            impl Coordinate for $ty {
                const ZERO: $ty = 0;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(v: f64) -> Self {
                    v as Self
                }

                #[inline]
                fn saturating_add(self, other: Self) -> Self {
                    <$ty>::saturating_add(self, other)
                }

                #[inline]
                fn saturating_sub(self, other: Self) -> Self {
                    <$ty>::saturating_sub(self, other)
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Coordinate for $ty {
                const ZERO: $ty = 0.0;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(v: f64) -> Self {
                    v as Self
                }

                #[inline]
                fn saturating_add(self, other: Self) -> Self {
                    self + other
                }

                #[inline]
                fn saturating_sub(self, other: Self) -> Self {
                    self - other
                }
            }
        )*
    };
}

coordinate_impl!(int: i32, i64, u32);
coordinate_impl!(float: f32, f64);

/// Per-axis scale factor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    /// Horizontal factor
    pub x: f64,
    /// Vertical factor
    pub y: f64,
}

impl Scale {
    /// Whether both axes are unscaled
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.x == 1.0 && self.y == 1.0
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale { x: 1.0, y: 1.0 }
    }
}

impl From<f64> for Scale {
    #[inline]
    fn from(v: f64) -> Self {
        Scale { x: v, y: v }
    }
}

impl From<(f64, f64)> for Scale {
    #[inline]
    fn from((x, y): (f64, f64)) -> Self {
        Scale { x, y }
    }
}

/// A point in a coordinate space
#[repr(C)]
pub struct Point<N, Kind> {
    /// horizontal coordinate
    pub x: N,
    /// vertical coordinate
    pub y: N,
    _kind: PhantomData<Kind>,
}

impl<N: Coordinate, Kind> Point<N, Kind> {
    /// Reinterpret as a [`Size`]
    #[inline]
    pub fn to_size(self) -> Size<N, Kind> {
        Size {
            w: self.x,
            h: self.y,
            _kind: PhantomData,
        }
    }

    /// Widen to f64
    #[inline]
    pub fn to_f64(self) -> Point<f64, Kind> {
        Point {
            x: self.x.to_f64(),
            y: self.y.to_f64(),
            _kind: PhantomData,
        }
    }

    /// Keep the coordinates but move to another space
    #[inline]
    pub fn to_kind<K>(self) -> Point<N, K> {
        Point {
            x: self.x,
            y: self.y,
            _kind: PhantomData,
        }
    }
}

impl<Kind> Point<f64, Kind> {
    /// Round both coordinates half away from zero
    #[inline]
    pub fn to_i32_round<N: Coordinate>(self) -> Point<N, Kind> {
        Point {
            x: N::from_f64(self.x.round()),
            y: N::from_f64(self.y.round()),
            _kind: PhantomData,
        }
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Point<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {:?})", self.x, self.y)
    }
}

impl<N, Kind> From<(N, N)> for Point<N, Kind> {
    #[inline]
    fn from((x, y): (N, N)) -> Point<N, Kind> {
        Point {
            x,
            y,
            _kind: PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> Add for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn add(self, other: Point<N, Kind>) -> Point<N, Kind> {
        Point {
            x: self.x.saturating_add(other.x),
            y: self.y.saturating_add(other.y),
            _kind: PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> AddAssign for Point<N, Kind> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<N: Coordinate, Kind> Sub for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn sub(self, other: Point<N, Kind>) -> Point<N, Kind> {
        Point {
            x: self.x.saturating_sub(other.x),
            y: self.y.saturating_sub(other.y),
            _kind: PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> SubAssign for Point<N, Kind> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<N: Clone, Kind> Clone for Point<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Point {
            x: self.x.clone(),
            y: self.y.clone(),
            _kind: PhantomData,
        }
    }
}

impl<N: Copy, Kind> Copy for Point<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Point<N, Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl<N: Eq, Kind> Eq for Point<N, Kind> {}

impl<N: Default, Kind> Default for Point<N, Kind> {
    fn default() -> Self {
        Point {
            x: N::default(),
            y: N::default(),
            _kind: PhantomData,
        }
    }
}

/// Width and height in a coordinate space
#[repr(C)]
pub struct Size<N, Kind> {
    /// horizontal extent
    pub w: N,
    /// vertical extent
    pub h: N,
    _kind: PhantomData<Kind>,
}

impl<N: Coordinate, Kind> Size<N, Kind> {
    /// Reinterpret as a [`Point`]
    #[inline]
    pub fn to_point(self) -> Point<N, Kind> {
        Point {
            x: self.w,
            y: self.h,
            _kind: PhantomData,
        }
    }

    /// Widen to f64
    #[inline]
    pub fn to_f64(self) -> Size<f64, Kind> {
        Size {
            w: self.w.to_f64(),
            h: self.h.to_f64(),
            _kind: PhantomData,
        }
    }

    /// Keep the extents but move to another space
    #[inline]
    pub fn to_kind<K>(self) -> Size<N, K> {
        Size {
            w: self.w,
            h: self.h,
            _kind: PhantomData,
        }
    }

    /// Whether either extent is zero or negative
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w <= N::ZERO || self.h <= N::ZERO
    }

    /// Whether both extents fit inside `other`
    #[inline]
    pub fn fits_in(&self, other: Size<N, Kind>) -> bool {
        self.w <= other.w && self.h <= other.h
    }
}

impl<Kind> Size<f64, Kind> {
    /// Round both extents half away from zero
    #[inline]
    pub fn to_i32_round<N: Coordinate>(self) -> Size<N, Kind> {
        Size {
            w: N::from_f64(self.w.round()),
            h: N::from_f64(self.h.round()),
            _kind: PhantomData,
        }
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Size<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}x{:?}", self.w, self.h)
    }
}

impl<N, Kind> From<(N, N)> for Size<N, Kind> {
    #[inline]
    fn from((w, h): (N, N)) -> Size<N, Kind> {
        Size {
            w,
            h,
            _kind: PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> Add for Size<N, Kind> {
    type Output = Size<N, Kind>;
    #[inline]
    fn add(self, other: Size<N, Kind>) -> Size<N, Kind> {
        Size {
            w: self.w.saturating_add(other.w),
            h: self.h.saturating_add(other.h),
            _kind: PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> Sub for Size<N, Kind> {
    type Output = Size<N, Kind>;
    #[inline]
    fn sub(self, other: Size<N, Kind>) -> Size<N, Kind> {
        Size {
            w: self.w.saturating_sub(other.w),
            h: self.h.saturating_sub(other.h),
            _kind: PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> Add<Size<N, Kind>> for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn add(self, other: Size<N, Kind>) -> Point<N, Kind> {
        Point {
            x: self.x.saturating_add(other.w),
            y: self.y.saturating_add(other.h),
            _kind: PhantomData,
        }
    }
}

impl<N: Clone, Kind> Clone for Size<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Size {
            w: self.w.clone(),
            h: self.h.clone(),
            _kind: PhantomData,
        }
    }
}

impl<N: Copy, Kind> Copy for Size<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Size<N, Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.w == other.w && self.h == other.h
    }
}

impl<N: Eq, Kind> Eq for Size<N, Kind> {}

impl<N: Default, Kind> Default for Size<N, Kind> {
    fn default() -> Self {
        Size {
            w: N::default(),
            h: N::default(),
            _kind: PhantomData,
        }
    }
}

/// An axis-aligned rectangle
///
/// Edges are half-open: a rectangle covers `[x, x + w) x [y, y + h)`.
#[repr(C)]
pub struct Rectangle<N, Kind> {
    /// Top-left corner
    pub loc: Point<N, Kind>,
    /// Extent, as (width, height)
    pub size: Size<N, Kind>,
}

impl<N: Coordinate, Kind> Rectangle<N, Kind> {
    /// Rectangle from its top-left corner and its size
    #[inline]
    pub fn new(loc: Point<N, Kind>, size: Size<N, Kind>) -> Self {
        Rectangle { loc, size }
    }

    /// Rectangle of the given size anchored at the origin
    #[inline]
    pub fn from_size(size: Size<N, Kind>) -> Self {
        Rectangle {
            loc: (N::ZERO, N::ZERO).into(),
            size,
        }
    }

    /// Rectangle spanning two corners
    #[inline]
    pub fn from_extremities(
        topleft: impl Into<Point<N, Kind>>,
        bottomright: impl Into<Point<N, Kind>>,
    ) -> Self {
        let topleft = topleft.into();
        let bottomright = bottomright.into();
        Rectangle {
            loc: topleft,
            size: (bottomright - topleft).to_size(),
        }
    }

    /// Bottom-right corner, exclusive
    #[inline]
    pub fn end(&self) -> Point<N, Kind> {
        self.loc + self.size
    }

    /// Whether the rectangle has no area
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    /// Widen to f64
    #[inline]
    pub fn to_f64(self) -> Rectangle<f64, Kind> {
        Rectangle {
            loc: self.loc.to_f64(),
            size: self.size.to_f64(),
        }
    }

    /// Keep the numbers but move to another space
    #[inline]
    pub fn to_kind<K>(self) -> Rectangle<N, K> {
        Rectangle {
            loc: self.loc.to_kind(),
            size: self.size.to_kind(),
        }
    }

    /// Whether `rect` lies fully inside this rectangle
    #[inline]
    pub fn contains_rect(self, rect: Rectangle<N, Kind>) -> bool {
        let end = self.end();
        let other_end = rect.end();
        rect.loc.x >= self.loc.x && rect.loc.y >= self.loc.y && other_end.x <= end.x && other_end.y <= end.y
    }

    /// Whether the two rectangles share any area
    ///
    /// Rectangles that only touch do not overlap.
    #[inline]
    pub fn overlaps(self, other: Rectangle<N, Kind>) -> bool {
        let end = self.end();
        let other_end = other.end();
        self.loc.x < other_end.x && other.loc.x < end.x && self.loc.y < other_end.y && other.loc.y < end.y
    }

    /// Shared area of two rectangles, `None` when they do not overlap
    #[inline]
    pub fn intersection(self, other: Rectangle<N, Kind>) -> Option<Self> {
        if !self.overlaps(other) {
            return None;
        }
        let end = self.end();
        let other_end = other.end();
        Some(Rectangle::from_extremities(
            (self.loc.x.max(other.loc.x), self.loc.y.max(other.loc.y)),
            (end.x.min(other_end.x), end.y.min(other_end.y)),
        ))
    }

    /// Smallest rectangle containing both
    #[inline]
    pub fn merge(self, other: Self) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let end = self.end();
        let other_end = other.end();
        Rectangle::from_extremities(
            (self.loc.x.min(other.loc.x), self.loc.y.min(other.loc.y)),
            (end.x.max(other_end.x), end.y.max(other_end.y)),
        )
    }

    /// Move the rectangle by `offset`
    #[inline]
    pub fn translate(self, offset: Point<N, Kind>) -> Self {
        Rectangle {
            loc: self.loc + offset,
            size: self.size,
        }
    }

    /// Remove `other` from this rectangle
    ///
    /// Returns up to four disjoint bands: the full-width band above the
    /// intersection, the left and right pieces beside it and the full-width
    /// band below it.
    pub fn subtract_rect(self, other: Self) -> impl Iterator<Item = Self> {
        let pieces: [Option<Self>; 4] = match self.intersection(other) {
            None => [Some(self), None, None, None],
            Some(hole) => {
                let end = self.end();
                let hole_end = hole.end();
                [
                    Some(Rectangle::from_extremities(self.loc, (end.x, hole.loc.y))),
                    Some(Rectangle::from_extremities((self.loc.x, hole.loc.y), (hole.loc.x, hole_end.y))),
                    Some(Rectangle::from_extremities((hole_end.x, hole.loc.y), (end.x, hole_end.y))),
                    Some(Rectangle::from_extremities((self.loc.x, hole_end.y), end)),
                ]
            }
        };
        pieces.into_iter().flatten().filter(|r| !r.is_empty())
    }
}

impl<Kind> Rectangle<i32, Kind> {
    /// Number of pixels covered
    #[inline]
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.size.w as i64 * self.size.h as i64
        }
    }
}

impl<Kind> Rectangle<f64, Kind> {
    /// Round location and size independently, half away from zero
    #[inline]
    pub fn to_i32_round<N: Coordinate>(self) -> Rectangle<N, Kind> {
        Rectangle {
            loc: self.loc.to_i32_round(),
            size: self.size.to_i32_round(),
        }
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Rectangle<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}x{:?}{:+?}{:+?}",
            self.size.w, self.size.h, self.loc.x, self.loc.y
        )
    }
}

impl<N: Clone, Kind> Clone for Rectangle<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Rectangle {
            loc: self.loc.clone(),
            size: self.size.clone(),
        }
    }
}

impl<N: Copy, Kind> Copy for Rectangle<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Rectangle<N, Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.loc == other.loc && self.size == other.size
    }
}

impl<N: Eq, Kind> Eq for Rectangle<N, Kind> {}

impl<N: Default, Kind> Default for Rectangle<N, Kind> {
    fn default() -> Self {
        Rectangle {
            loc: Default::default(),
            size: Default::default(),
        }
    }
}

/// Buffer or output transformation
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Transform {
    /// Identity
    #[default]
    Normal,
    /// Rotated by 90 degrees
    _90,
    /// Rotated by 180 degrees
    _180,
    /// Rotated by 270 degrees
    _270,
    /// Flipped around the vertical axis
    Flipped,
    /// Flipped, then rotated by 90 degrees
    Flipped90,
    /// Flipped, then rotated by 180 degrees
    Flipped180,
    /// Flipped, then rotated by 270 degrees
    Flipped270,
}

impl Transform {
    /// Whether width and height swap under this transform
    #[inline]
    pub fn swaps_axes(&self) -> bool {
        matches!(
            self,
            Transform::_90 | Transform::_270 | Transform::Flipped90 | Transform::Flipped270
        )
    }
}
