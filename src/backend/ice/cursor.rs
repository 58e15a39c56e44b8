use drm_fourcc::DrmFourcc;
use tracing::{trace, warn};

use super::device::{GdlDevice, GdlError, PaletteEntry, SurfaceInfo};
use crate::backend::scanout::{Buffer, BufferKind, Rejection};
use crate::utils::{Physical, Point, Size};

/// Largest cursor image, in both directions
pub const CURSOR_SIZE: i32 = 32;

/// Indexed-color image shown on the cursor plane
///
/// The image is drawn at an offset equal to the plane's minimum destination
/// size, so a cursor hanging off the top-left edge still leaves a rectangle
/// the plane accepts.
#[derive(Debug)]
pub(super) struct IceCursor {
    surface: SurfaceInfo,
    offset: Size<i32, Physical>,
}

impl IceCursor {
    pub(super) fn new<D: GdlDevice>(device: &mut D, offset: Size<i32, Physical>) -> Result<IceCursor, GdlError> {
        let size = Size::from((CURSOR_SIZE + offset.w, CURSOR_SIZE + offset.h));
        let surface = device.alloc_surface(DrmFourcc::C8, size, true)?;

        match device.surface_data(surface.id) {
            Ok(data) => data.fill(0),
            Err(err) => {
                if let Err(err) = device.free_surface(surface.id) {
                    warn!(surface = %surface.id, ?err, "failed to free cursor surface");
                }
                return Err(err);
            }
        }

        if let Err(err) = device.set_palette(surface.id, &palette()) {
            warn!(surface = %surface.id, ?err, "failed to set cursor palette");
        }

        Ok(IceCursor { surface, offset })
    }

    pub(super) fn surface(&self) -> &SurfaceInfo {
        &self.surface
    }

    /// Offset of the image inside the surface
    pub(super) fn offset(&self) -> Point<i32, Physical> {
        self.offset.to_point()
    }

    pub(super) fn size(&self) -> Size<i32, Physical> {
        self.surface.size.to_kind()
    }

    /// Copy the top-left 32x32 pixels of a shm `buffer` into the image
    pub(super) fn update<D: GdlDevice>(&self, device: &mut D, buffer: &Buffer) -> Result<(), Rejection> {
        let BufferKind::Shm {
            format,
            size,
            stride,
            data,
        } = buffer.kind()
        else {
            trace!("unsupported buffer type for cursor");
            return Err(Rejection::UnsupportedBuffer);
        };

        if !matches!(
            format,
            DrmFourcc::Xrgb8888 | DrmFourcc::Argb8888 | DrmFourcc::Rgb565
        ) {
            trace!(?format, "unsupported format for cursor");
            return Err(Rejection::UnsupportedFormat);
        }

        let pitch = self.surface.pitch;
        let target = device.surface_data(self.surface.id).map_err(|err| {
            warn!(surface = %self.surface.id, ?err, "failed to map cursor surface");
            Rejection::UnsupportedBuffer
        })?;

        trace!("update cursor data");
        for y in 0..CURSOR_SIZE {
            let row = (y + self.offset.h) as usize * pitch;
            for x in 0..CURSOR_SIZE {
                let pixel = if x < size.w && y < size.h {
                    sample(*format, data, *stride, x as usize, y as usize).unwrap_or(0)
                } else {
                    0
                };
                if let Some(target) = target.get_mut(row + (x + self.offset.w) as usize) {
                    *target = pixel;
                }
            }
        }

        device.flush_surface(self.surface.id);
        Ok(())
    }

    pub(super) fn destroy<D: GdlDevice>(self, device: &mut D) {
        if let Err(err) = device.free_surface(self.surface.id) {
            warn!(surface = %self.surface.id, ?err, "failed to free cursor surface");
        }
    }
}

/// Palette indexing a2r2g2b2 colors
fn palette() -> [PaletteEntry; 256] {
    std::array::from_fn(|i| PaletteEntry {
        a: ((i & 0xc0) >> 6) as u8 * 0x55,
        r: ((i & 0x30) >> 4) as u8 * 0x55,
        g: ((i & 0x0c) >> 2) as u8 * 0x55,
        b: (i & 0x03) as u8 * 0x55,
    })
}

fn a2r2g2b2(a: u8, r: u8, g: u8, b: u8) -> u8 {
    (a & 0xc0) | ((r & 0xc0) >> 2) | ((g & 0xc0) >> 4) | (b >> 6)
}

fn sample(format: DrmFourcc, data: &[u8], stride: usize, x: usize, y: usize) -> Option<u8> {
    match format {
        DrmFourcc::Argb8888 | DrmFourcc::Xrgb8888 => {
            let offset = y * stride + x * 4;
            let [b, g, r, a] = <[u8; 4]>::try_from(data.get(offset..offset + 4)?).ok()?;
            let a = if format == DrmFourcc::Xrgb8888 { 0xff } else { a };
            Some(a2r2g2b2(a, r, g, b))
        }
        DrmFourcc::Rgb565 => {
            let offset = y * stride + x * 2;
            let pixel = u16::from_le_bytes(<[u8; 2]>::try_from(data.get(offset..offset + 2)?).ok()?);
            let r = ((pixel >> 11) as u8) << 3;
            let g = (((pixel >> 5) & 0x3f) as u8) << 2;
            let b = ((pixel & 0x1f) as u8) << 3;
            Some(a2r2g2b2(0xff, r, g, b))
        }
        _ => None,
    }
}
