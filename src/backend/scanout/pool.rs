use std::fmt;

use drm_fourcc::DrmFourcc;
use indexmap::IndexSet;

use super::Rejection;
use crate::utils::{Physical, Size};

/// Capabilities of one hardware plane
///
/// Read once when the plane is created, never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneCaps {
    /// Pixel formats the plane can scan out
    pub formats: IndexSet<DrmFourcc>,
    /// Smallest destination rectangle
    pub min_dst: Size<i32, Physical>,
    /// Largest destination rectangle
    pub max_dst: Size<i32, Physical>,
    /// Widest source rectangle, if limited
    pub max_src_width: Option<i32>,
}

impl PlaneCaps {
    /// Whether `format` can be scanned out
    pub fn supports(&self, format: DrmFourcc) -> bool {
        self.formats.contains(&format)
    }

    /// Whether a destination of `size` is within limits
    pub fn accepts_dst(&self, size: Size<i32, Physical>) -> bool {
        self.min_dst.fits_in(size) && size.fits_in(self.max_dst)
    }
}

/// Limits of a scaling unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleLimits {
    /// Largest `dst / src` ratio, unlimited if `None`
    pub max_upscale: Option<u32>,
    /// Largest `src / dst` ratio, `Some(1)` forbids downscaling
    pub max_downscale: Option<u32>,
    /// Widest source the scaler accepts
    pub max_src_width: Option<i32>,
    /// Whether scaling is allowed on interlaced outputs
    pub interlaced: bool,
}

/// Fixed inventory of planes or pipes with per-cycle reservations
///
/// Entries are never added or removed after creation. Reservations mark
/// entries claimed during the current repaint cycle and are dropped with
/// [`PlanePool::reset`] at the end of every cycle.
pub struct PlanePool<T> {
    entries: Vec<T>,
    reserved: u64,
}

impl<T> PlanePool<T> {
    /// Pool over `entries`, at most 64 of them
    pub fn new(entries: Vec<T>) -> PlanePool<T> {
        debug_assert!(entries.len() <= 64);
        PlanePool { entries, reserved: 0 }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    /// Mutable entry at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)
    }

    /// Entries in pool order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Mutable entries in pool order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }

    /// Index of the first entry matching `f`
    pub fn position(&self, f: impl Fn(&T) -> bool) -> Option<usize> {
        self.entries.iter().position(f)
    }

    /// Whether `index` is claimed this cycle
    pub fn is_reserved(&self, index: usize) -> bool {
        index < 64 && self.reserved & (1u64 << index) != 0
    }

    /// Claim `index` for this cycle, claiming twice is a no-op
    pub fn reserve(&mut self, index: usize) {
        if index < self.entries.len() {
            self.reserved |= 1u64 << index;
        }
    }

    /// Drop the claim on `index`
    pub fn release(&mut self, index: usize) {
        if index < 64 {
            self.reserved &= !(1u64 << index);
        }
    }

    /// Drop every claim
    pub fn reset(&mut self) {
        self.reserved = 0;
    }

    /// First unclaimed entry matching `f`
    pub fn find_free(&self, f: impl Fn(&T) -> bool) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .find(|(i, entry)| !self.is_reserved(*i) && f(entry))
            .map(|(i, _)| i)
    }

    /// Last unclaimed entry matching `f`
    pub fn find_last_free(&self, f: impl Fn(&T) -> bool) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find(|(i, entry)| !self.is_reserved(*i) && f(entry))
            .map(|(i, _)| i)
    }

    /// Number of unclaimed entries matching `f`
    pub fn free_count(&self, f: impl Fn(&T) -> bool) -> usize {
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, entry)| !self.is_reserved(*i) && f(entry))
            .count()
    }
}

impl<T: fmt::Debug> fmt::Debug for PlanePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanePool")
            .field("entries", &self.entries)
            .field("reserved", &format_args!("{:#x}", self.reserved))
            .finish()
    }
}

/// The single scaling unit shared by all planes of an output
///
/// Once a plane claims the scaler in a repaint cycle, no other plane may
/// scale until [`ScalerSlot::clear`] runs at the start of the next cycle.
#[derive(Debug)]
pub struct ScalerSlot<P> {
    owner: Option<P>,
}

impl<P: Copy + PartialEq> ScalerSlot<P> {
    /// An unclaimed scaler
    pub fn new() -> Self {
        ScalerSlot { owner: None }
    }

    /// Plane currently owning the scaler
    pub fn owner(&self) -> Option<P> {
        self.owner
    }

    /// Whether `plane` may use the scaler
    pub fn is_available_to(&self, plane: P) -> bool {
        self.owner.map_or(true, |owner| owner == plane)
    }

    /// Give the scaler to `plane`
    pub fn claim(&mut self, plane: P) -> Result<(), Rejection> {
        if !self.is_available_to(plane) {
            return Err(Rejection::ScalerBusy);
        }
        self.owner = Some(plane);
        Ok(())
    }

    /// Free the scaler for the next cycle
    pub fn clear(&mut self) {
        self.owner = None;
    }
}

impl<P: Copy + PartialEq> Default for ScalerSlot<P> {
    fn default() -> Self {
        ScalerSlot::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{PlanePool, ScalerSlot};
    use crate::backend::scanout::Rejection;

    #[test]
    fn reservations_are_idempotent_and_reset() {
        let mut pool = PlanePool::new(vec!['a', 'b', 'c', 'd']);

        assert_eq!(pool.find_free(|_| true), Some(0));
        assert_eq!(pool.find_last_free(|_| true), Some(3));

        pool.reserve(3);
        pool.reserve(3);
        assert_eq!(pool.free_count(|_| true), 3);
        assert_eq!(pool.find_last_free(|_| true), Some(2));
        assert_eq!(pool.find_free(|c| *c == 'd'), None);

        pool.release(3);
        assert_eq!(pool.find_free(|c| *c == 'd'), Some(3));

        pool.reserve(0);
        pool.reserve(1);
        pool.reset();
        assert_eq!(pool.free_count(|_| true), 4);
    }

    #[test]
    fn scaler_goes_to_one_plane_per_cycle() {
        let mut scaler = ScalerSlot::new();

        assert_eq!(scaler.claim(1u32), Ok(()));
        assert_eq!(scaler.claim(1), Ok(()));
        assert_eq!(scaler.claim(2), Err(Rejection::ScalerBusy));
        assert_eq!(scaler.owner(), Some(1));

        scaler.clear();
        assert_eq!(scaler.claim(2), Ok(()));
    }
}
