//! Pipe bookkeeping and per-layer arithmetic
//!
//! A rectangle wider than [`HwInfo::max_pipe_width`] is fetched by two pipes
//! side by side. Sources shrunk by more than the pipe downscaler allows are
//! decimated first.

use super::caps::{HwInfo, Pipe, PipeType};
use crate::backend::scanout::clip::ScanoutRects;
use crate::backend::scanout::PlanePool;
use crate::utils::Rectangle;

/// Source pipes with per-cycle reservations
pub type PipePool = PlanePool<Pipe>;

/// Reserve the first free pipe of `kind`
pub fn reserve_pipe(pool: &mut PipePool, kind: PipeType) -> Option<Pipe> {
    let index = pool.find_free(|pipe| pipe.kind == kind)?;
    pool.reserve(index);
    pool.get(index).copied()
}

/// Drop the reservation of `pipe`
pub fn release_pipe(pool: &mut PipePool, pipe: Pipe) {
    if let Some(index) = pool.position(|p| *p == pipe) {
        pool.release(index);
    }
}

/// Whether `rects` need a second pipe
pub fn needs_split(rects: &ScanoutRects, hw: &HwInfo) -> bool {
    let max = hw.max_pipe_width as i64;
    rects.src.size.w as i64 > max || rects.dst.size.w as i64 > max
}

/// Split `rects` into the halves fetched by the left and right pipes
///
/// The left source width must stay even; when halving makes it odd, it is
/// widened by one pixel and its destination by one scaled step. The right
/// half takes what remains.
pub fn split_rects(rects: &ScanoutRects) -> (ScanoutRects, ScanoutRects) {
    let mut left = *rects;
    left.src.size.w /= 2;
    left.dst.size.w /= 2;

    if left.src.size.w & 1 != 0 {
        let step = (left.dst.size.w as f32 / left.src.size.w as f32).round() as i32;
        left.dst.size.w += step;
        left.src.size.w += 1;
    }

    let right = ScanoutRects {
        src: Rectangle::new(
            (left.src.loc.x + left.src.size.w, rects.src.loc.y).into(),
            (rects.src.size.w - left.src.size.w, rects.src.size.h).into(),
        ),
        dst: Rectangle::new(
            (left.dst.loc.x + left.dst.size.w, rects.dst.loc.y).into(),
            (rects.dst.size.w - left.dst.size.w, rects.dst.size.h).into(),
        ),
    };

    (left, right)
}

/// Decimation factor for fetching `src` pixels into `dst` on one axis
///
/// The source is decimated until one pipe can fetch it and until what is
/// left fits in the downscale range of the pipe. A factor of `n` drops
/// `n` lines out of every `n + 1`.
pub fn decimation(src: u32, dst: u32, hw: &HwInfo) -> u8 {
    let src = src as u64;
    let mut decimation: u64 = 0;

    let max_width = hw.max_pipe_width as u64;
    if max_width > 0 {
        while src > max_width * (decimation + 1) {
            decimation += 1;
        }
    }

    let dst = dst as u64 * hw.max_scale_down as u64;
    if dst > 0 {
        while dst * (decimation + 1) < src {
            decimation += 1;
        }
    }

    decimation.min(u8::MAX as u64) as u8
}
