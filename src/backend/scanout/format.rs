//! Pixel format tables for scanout
//!
//! Every format a plane may be asked to scan out is listed once here, with
//! its opaque twin, whether it carries alpha and whether it is an RGB
//! format. The helpers [`get_opaque`], [`has_alpha`] and [`is_rgb`] are
//! generated from that single table.
//!
//! ```
//! # use scanplane::backend::scanout::format::{get_opaque, has_alpha};
//! # use drm_fourcc::DrmFourcc;
//! assert_eq!(get_opaque(DrmFourcc::Argb8888), Some(DrmFourcc::Xrgb8888));
//! assert!(!has_alpha(DrmFourcc::Xrgb8888));
//! ```

use drm_fourcc::DrmFourcc;

use crate::utils::{Coverage, Logical, Rectangle, Region, Size};

use super::Rejection;

macro_rules! format_tables {
    (
        $($fourcc: ident {
            $(opaque: $opaque: ident,)?
            alpha: $alpha: expr,
            rgb: $rgb: expr $(,)?
        }),* $(,)?
    ) => {
        /// Opaque twin of a format with an alpha channel
        ///
        /// Unknown formats and formats without a twin return [`None`].
        pub const fn get_opaque(fourcc: DrmFourcc) -> Option<DrmFourcc> {
            match fourcc {
                $($(
                    DrmFourcc::$fourcc => Some(DrmFourcc::$opaque),
                )?)*
                _ => None,
            }
        }

        /// Whether the format carries an alpha channel
        ///
        /// Unknown formats return `false`.
        pub const fn has_alpha(fourcc: DrmFourcc) -> bool {
            match fourcc {
                $(DrmFourcc::$fourcc => $alpha,)*
                _ => false,
            }
        }

        /// Whether the format stores RGB rather than YUV samples
        ///
        /// Unknown formats return `false`.
        pub const fn is_rgb(fourcc: DrmFourcc) -> bool {
            match fourcc {
                $(DrmFourcc::$fourcc => $rgb,)*
                _ => false,
            }
        }

        /// Whether the format is listed in the scanout tables
        pub const fn is_known(fourcc: DrmFourcc) -> bool {
            matches!(fourcc, $(DrmFourcc::$fourcc)|*)
        }
    };
}

format_tables! {
    Argb8888 { opaque: Xrgb8888, alpha: true, rgb: true },
    Xrgb8888 { alpha: false, rgb: true },
    Abgr8888 { opaque: Xbgr8888, alpha: true, rgb: true },
    Xbgr8888 { alpha: false, rgb: true },
    Rgba8888 { opaque: Rgbx8888, alpha: true, rgb: true },
    Rgbx8888 { alpha: false, rgb: true },
    Bgra8888 { opaque: Bgrx8888, alpha: true, rgb: true },
    Bgrx8888 { alpha: false, rgb: true },
    Xrgb2101010 { alpha: false, rgb: true },
    Rgb888 { alpha: false, rgb: true },
    Bgr888 { alpha: false, rgb: true },
    Rgb565 { alpha: false, rgb: true },
    Bgr565 { alpha: false, rgb: true },
    Argb1555 { opaque: Xrgb1555, alpha: true, rgb: true },
    Xrgb1555 { alpha: false, rgb: true },
    Rgba5551 { opaque: Rgbx5551, alpha: true, rgb: true },
    Rgbx5551 { alpha: false, rgb: true },
    Argb4444 { opaque: Xrgb4444, alpha: true, rgb: true },
    Xrgb4444 { alpha: false, rgb: true },
    Rgba4444 { opaque: Rgbx4444, alpha: true, rgb: true },
    Rgbx4444 { alpha: false, rgb: true },
    C8 { alpha: false, rgb: true },
    Ayuv { alpha: true, rgb: false },
    Yuyv { alpha: false, rgb: false },
    Uyvy { alpha: false, rgb: false },
    Nv12 { alpha: false, rgb: false },
}

/// Color space of the samples a plane reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// Full range RGB
    Rgb,
    /// ITU-R BT.601, standard definition video
    Bt601,
    /// ITU-R BT.709, high definition video
    Bt709,
}

impl ColorSpace {
    /// Color space to assume for a surface of `format` that is `width` pixels wide
    pub fn for_surface(format: DrmFourcc, width: i32) -> ColorSpace {
        if is_rgb(format) {
            ColorSpace::Rgb
        } else if width >= 720 {
            ColorSpace::Bt709
        } else {
            ColorSpace::Bt601
        }
    }
}

/// How the contents of a plane mix with what lies beneath it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaBlend {
    /// The plane fully hides what lies beneath it
    ///
    /// `substitute` is the opaque twin to scan out with, when the format
    /// carries alpha the hardware must ignore.
    Opaque {
        /// Opaque twin of the source format
        substitute: Option<DrmFourcc>,
    },
    /// Per-pixel alpha, premultiplied
    Premultiplied,
}

/// Decide how a surface of `format` with the given opaque region blends
///
/// Formats without alpha are opaque. A format with alpha whose opaque
/// region covers the whole surface is opaque too and may be swapped for its
/// opaque twin. A surface with an empty opaque region blends premultiplied.
/// Any other opaque region, including one lying wholly outside the surface,
/// cannot be represented and is rejected.
pub fn classify_alpha(
    format: DrmFourcc,
    opaque: &Region<Logical>,
    surface: Size<i32, Logical>,
) -> Result<AlphaBlend, Rejection> {
    if !has_alpha(format) {
        return Ok(AlphaBlend::Opaque { substitute: None });
    }

    match opaque.coverage(Rectangle::from_size(surface)) {
        Coverage::In => Ok(AlphaBlend::Opaque {
            substitute: get_opaque(format),
        }),
        Coverage::Out if opaque.is_empty() => Ok(AlphaBlend::Premultiplied),
        Coverage::Out | Coverage::Part => Err(Rejection::PartiallyOpaque),
    }
}

#[cfg(test)]
mod tests {
    use drm_fourcc::DrmFourcc;

    use super::{classify_alpha, AlphaBlend, ColorSpace};
    use crate::backend::scanout::Rejection;
    use crate::utils::{Logical, Rectangle, Region, Size};

    #[test]
    fn color_space_follows_format_and_width() {
        assert_eq!(ColorSpace::for_surface(DrmFourcc::Argb8888, 320), ColorSpace::Rgb);
        assert_eq!(ColorSpace::for_surface(DrmFourcc::Nv12, 1280), ColorSpace::Bt709);
        assert_eq!(ColorSpace::for_surface(DrmFourcc::Nv12, 720), ColorSpace::Bt709);
        assert_eq!(ColorSpace::for_surface(DrmFourcc::Yuyv, 719), ColorSpace::Bt601);
    }

    #[test]
    fn fully_opaque_argb_uses_rgb_twin() {
        let size = Size::<i32, Logical>::from((64, 64));
        let opaque = Region::from_rect(Rectangle::from_size(size));

        assert_eq!(
            classify_alpha(DrmFourcc::Argb8888, &opaque, size),
            Ok(AlphaBlend::Opaque {
                substitute: Some(DrmFourcc::Xrgb8888)
            })
        );
    }

    #[test]
    fn partial_opacity_is_rejected() {
        let size = Size::<i32, Logical>::from((64, 64));
        let opaque = Region::from_rect(Rectangle::new((0, 0).into(), (32, 64).into()));

        assert_eq!(
            classify_alpha(DrmFourcc::Argb8888, &opaque, size),
            Err(Rejection::PartiallyOpaque)
        );
        assert_eq!(
            classify_alpha(DrmFourcc::Argb8888, &Region::new(), size),
            Ok(AlphaBlend::Premultiplied)
        );
        assert_eq!(
            classify_alpha(DrmFourcc::Xrgb8888, &opaque, size),
            Ok(AlphaBlend::Opaque { substitute: None })
        );
    }

    #[test]
    fn opaque_region_outside_the_surface_is_rejected() {
        let size = Size::<i32, Logical>::from((64, 64));
        let outside = Region::from_rect(Rectangle::new((100, 100).into(), (32, 32).into()));

        assert_eq!(
            classify_alpha(DrmFourcc::Argb8888, &outside, size),
            Err(Rejection::PartiallyOpaque)
        );
        assert_eq!(
            classify_alpha(DrmFourcc::Xrgb8888, &outside, size),
            Ok(AlphaBlend::Opaque { substitute: None })
        );
    }
}
