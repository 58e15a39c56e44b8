//! Clipping and rounding of view rectangles to hardware constraints
//!
//! Everything here is side-effect free. A view that cannot be represented
//! yields a [`Rejection`] and the caller composites it instead.

use super::{Rejection, ScaleLimits, TransformFlags, View};
use crate::utils::{Buffer, Logical, Physical, Point, Rectangle, Size};

/// A view clipped to the output, before rounding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clip {
    /// Visible part of the view in output space
    pub dst: Rectangle<f64, Physical>,
    /// The same part in surface-local space
    pub src: Rectangle<f64, Logical>,
}

/// Integer rectangles to program into a plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanoutRects {
    /// Destination on the output
    pub dst: Rectangle<i32, Physical>,
    /// Source in buffer pixels
    pub src: Rectangle<i32, Buffer>,
}

/// Clip `view` against an output of size `output`
///
/// The source rectangle is cropped by the same ratio as the destination, so
/// a scaled view keeps its scale factor after clipping.
pub fn clip_view(view: &View, output: Size<i32, Physical>) -> Result<Clip, Rejection> {
    if view.transform.flags.contains(TransformFlags::ROTATE) {
        return Err(Rejection::UnsupportedTransform);
    }

    let width = output.w as f64;
    let height = output.h as f64;
    let surface = view.surface_size.to_f64();

    let mut p1 = view.transform.apply(Point::default());
    let mut p2 = view.transform.apply(Point::from((surface.w, surface.h)));

    if p1.x >= width || p1.y >= height || p2.x <= 0.0 || p2.y <= 0.0 {
        return Err(Rejection::Offscreen);
    }
    if p2.x - p1.x <= 0.0 || p2.y - p1.y <= 0.0 {
        return Err(Rejection::Offscreen);
    }

    // surface units per output pixel
    let kx = surface.w / (p2.x - p1.x);
    let ky = surface.h / (p2.y - p1.y);

    let mut s1 = Point::<f64, Logical>::from((0.0, 0.0));
    let mut s2 = Point::<f64, Logical>::from((surface.w, surface.h));

    if p1.x < 0.0 {
        s1.x -= p1.x * kx;
        p1.x = 0.0;
    }
    if p1.y < 0.0 {
        s1.y -= p1.y * ky;
        p1.y = 0.0;
    }
    if p2.x > width {
        s2.x -= (p2.x - width) * kx;
        p2.x = width;
    }
    if p2.y > height {
        s2.y -= (p2.y - height) * ky;
        p2.y = height;
    }

    Ok(Clip {
        dst: Rectangle::from_extremities(p1, p2),
        src: Rectangle::from_extremities(s1, s2),
    })
}

impl Clip {
    /// Round to integer rectangles for `view`
    ///
    /// The far corner and the extent of each rectangle are rounded half away
    /// from zero, so an unscaled view keeps equal source and destination
    /// sizes whatever its subpixel offset. On interlaced outputs the vertical
    /// origin and height of both rectangles are made even by rounding down;
    /// when the destination loses a line the source loses the matching
    /// surface line.
    pub fn to_scanout(&self, view: &View, interlaced: bool) -> ScanoutRects {
        let mut dst = round_extent(self.dst.loc, self.dst.end());

        let s1 = self.src.loc;
        let mut s2 = self.src.end();

        if interlaced {
            if dst.loc.y & 1 != 0 {
                dst.loc.y -= 1;
            }
            if dst.size.h & 1 != 0 {
                dst.size.h -= 1;
                s2.y -= 1.0;
            }
        }

        let mut src = round_extent(view.surface_to_buffer(s1), view.surface_to_buffer(s2));

        if interlaced {
            align_even_vertical(&mut src);
        }

        ScanoutRects { dst, src }
    }
}

// anchored on the far corner: it never passes the clip bounds, which are whole pixels
fn round_extent<Kind>(p1: Point<f64, Kind>, p2: Point<f64, Kind>) -> Rectangle<i32, Kind> {
    let end = p2.to_i32_round::<i32>();
    let size = Size::<f64, Kind>::from((p2.x - p1.x, p2.y - p1.y)).to_i32_round::<i32>();
    Rectangle::from_extremities(Point::from((end.x - size.w, end.y - size.h)), end)
}

/// Round vertical origin and height down to even values
pub fn align_even_vertical<Kind>(rect: &mut Rectangle<i32, Kind>) {
    if rect.loc.y & 1 != 0 {
        rect.loc.y -= 1;
    }
    if rect.size.h & 1 != 0 {
        rect.size.h -= 1;
    }
}

/// Round origin and size down to even values on both axes
pub fn align_even<Kind>(rect: &mut Rectangle<i32, Kind>) {
    if rect.loc.x & 1 != 0 {
        rect.loc.x -= 1;
    }
    if rect.size.w & 1 != 0 {
        rect.size.w -= 1;
    }
    align_even_vertical(rect);
}

/// Check whether scanning `src` into `dst` is within `limits`
///
/// Returns whether the scaler is needed at all.
pub fn check_scale(
    src: Size<i32, Buffer>,
    dst: Size<i32, Physical>,
    limits: &ScaleLimits,
    interlaced: bool,
) -> Result<bool, Rejection> {
    if src.w == dst.w && src.h == dst.h {
        return Ok(false);
    }

    // widen before multiplying, ratios may be large
    let (sw, sh) = (src.w as i64, src.h as i64);
    let (dw, dh) = (dst.w as i64, dst.h as i64);

    if let Some(down) = limits.max_downscale {
        let down = down as i64;
        if sw > dw * down || sh > dh * down {
            return Err(if down <= 1 {
                Rejection::Downscale
            } else {
                Rejection::ScaleOutOfRange
            });
        }
    }
    if let Some(up) = limits.max_upscale {
        let up = up as i64;
        if sw * up < dw || sh * up < dh {
            return Err(Rejection::ScaleOutOfRange);
        }
    }
    if let Some(max_width) = limits.max_src_width {
        if src.w > max_width {
            return Err(Rejection::SourceTooWide);
        }
    }
    if interlaced && !limits.interlaced {
        return Err(Rejection::ScaleInterlaced);
    }

    Ok(true)
}
