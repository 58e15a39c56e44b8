//! Regions made of disjoint rectangles
//!
//! Damage, opaque areas and the composited area of an output are all
//! tracked as [`Region`]s. The representation keeps its rectangles
//! pairwise disjoint, so area and containment queries never double count.

use std::fmt;

use smallvec::SmallVec;

use super::geometry::Rectangle;

/// How a rectangle relates to a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// The rectangle lies entirely inside the region
    In,
    /// The rectangle does not touch the region
    Out,
    /// The rectangle is partially covered
    Part,
}

/// A set of pixels described by disjoint rectangles
pub struct Region<Kind> {
    rects: SmallVec<[Rectangle<i32, Kind>; 4]>,
}

impl<Kind> Region<Kind> {
    /// The empty region
    pub fn new() -> Self {
        Region {
            rects: SmallVec::new(),
        }
    }

    /// Region covering a single rectangle
    pub fn from_rect(rect: Rectangle<i32, Kind>) -> Self {
        let mut region = Region::new();
        if !rect.is_empty() {
            region.rects.push(rect);
        }
        region
    }

    /// Region covering the union of the given rectangles
    pub fn from_rects(rects: impl IntoIterator<Item = Rectangle<i32, Kind>>) -> Self {
        let mut region = Region::new();
        for rect in rects {
            region.union_rect(rect);
        }
        region
    }

    /// Whether no pixel is covered
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// The disjoint rectangles of this region
    pub fn rects(&self) -> &[Rectangle<i32, Kind>] {
        &self.rects
    }

    /// Number of covered pixels
    pub fn area(&self) -> i64 {
        self.rects.iter().map(|r| r.area()).sum()
    }

    /// Bounding box of the region, empty when the region is
    pub fn extents(&self) -> Rectangle<i32, Kind> {
        self.rects
            .iter()
            .fold(Rectangle::default(), |acc, rect| acc.merge(*rect))
    }

    /// Remove every pixel
    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Add a rectangle
    pub fn union_rect(&mut self, rect: Rectangle<i32, Kind>) {
        if rect.is_empty() {
            return;
        }
        if self.rects.iter().any(|r| r.contains_rect(rect)) {
            return;
        }

        // keep the stored rectangles disjoint by only adding what is new
        let mut fresh: SmallVec<[Rectangle<i32, Kind>; 4]> = SmallVec::new();
        fresh.push(rect);
        for existing in &self.rects {
            fresh = fresh
                .into_iter()
                .flat_map(|piece| piece.subtract_rect(*existing))
                .collect();
            if fresh.is_empty() {
                return;
            }
        }
        self.rects.extend(fresh);
    }

    /// Add every pixel of `other`
    pub fn union(&mut self, other: &Region<Kind>) {
        for rect in &other.rects {
            self.union_rect(*rect);
        }
    }

    /// Remove a rectangle
    pub fn subtract_rect(&mut self, rect: Rectangle<i32, Kind>) {
        if rect.is_empty() {
            return;
        }
        self.rects = std::mem::take(&mut self.rects)
            .into_iter()
            .flat_map(|r| r.subtract_rect(rect))
            .collect();
    }

    /// Remove every pixel of `other`
    pub fn subtract(&mut self, other: &Region<Kind>) {
        for rect in &other.rects {
            self.subtract_rect(*rect);
        }
    }

    /// Pixels shared with `rect`
    pub fn intersect_rect(&self, rect: Rectangle<i32, Kind>) -> Region<Kind> {
        Region {
            rects: self.rects.iter().filter_map(|r| r.intersection(rect)).collect(),
        }
    }

    /// Whether any pixel of `rect` is covered
    pub fn intersects(&self, rect: Rectangle<i32, Kind>) -> bool {
        self.rects.iter().any(|r| r.overlaps(rect))
    }

    /// Classify `rect` against this region
    pub fn coverage(&self, rect: Rectangle<i32, Kind>) -> Coverage {
        if rect.is_empty() {
            return Coverage::Out;
        }
        let covered: i64 = self
            .rects
            .iter()
            .filter_map(|r| r.intersection(rect))
            .map(|r| r.area())
            .sum();
        if covered == 0 {
            Coverage::Out
        } else if covered == rect.area() {
            Coverage::In
        } else {
            Coverage::Part
        }
    }

    /// Move every rectangle by `offset`
    pub fn translate(&mut self, offset: super::geometry::Point<i32, Kind>) {
        for rect in self.rects.iter_mut() {
            *rect = rect.translate(offset);
        }
    }
}

impl<Kind> Default for Region<Kind> {
    fn default() -> Self {
        Region::new()
    }
}

impl<Kind> Clone for Region<Kind> {
    fn clone(&self) -> Self {
        Region {
            rects: self.rects.clone(),
        }
    }
}

impl<Kind> fmt::Debug for Region<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rects.iter()).finish()
    }
}

impl<Kind> From<Rectangle<i32, Kind>> for Region<Kind> {
    fn from(rect: Rectangle<i32, Kind>) -> Self {
        Region::from_rect(rect)
    }
}
