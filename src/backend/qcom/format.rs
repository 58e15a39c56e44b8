use std::fmt;

use drm_fourcc::{DrmFourcc, DrmModifier};

/// Pixel formats understood by the MDP pipes
///
/// Names follow the MDP convention of listing components in memory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MdpFormat {
    /// 16 bit RGB
    Rgb565,
    /// 16 bit BGR
    Bgr565,
    /// 24 bit RGB
    Rgb888,
    /// 24 bit BGR
    Bgr888,
    /// 32 bit RGB, padding first
    Xrgb8888,
    /// 32 bit RGB, padding last
    Rgbx8888,
    /// 32 bit RGB with leading alpha
    Argb8888,
    /// 32 bit RGB with trailing alpha
    Rgba8888,
    /// 32 bit BGR with trailing alpha, the framebuffer format
    Bgra8888,
    /// 16 bit RGB with 1 bit leading alpha
    Argb1555,
    /// 16 bit RGB with 1 bit trailing alpha
    Rgba5551,
    /// 16 bit RGB with 4 bit leading alpha
    Argb4444,
    /// 16 bit RGB with 4 bit trailing alpha
    Rgba4444,
    /// Two plane YUV 4:2:0 with video decoder alignment
    YCbCrH2V2Venus,
    /// Two plane YUV 4:2:0, bandwidth compressed
    YCbCrH2V2Ubwc,
    /// 32 bit RGBA, bandwidth compressed
    Rgba8888Ubwc,
}

impl MdpFormat {
    /// MDP format for a client buffer, if the pipes can read it
    ///
    /// Compressed layouts are only known for NV12 and RGBA8888.
    pub fn from_drm(format: DrmFourcc, modifier: DrmModifier) -> Option<MdpFormat> {
        let compressed = match modifier {
            DrmModifier::Linear => false,
            DrmModifier::Qcom_compressed => true,
            _ => return None,
        };

        let format = match (format, compressed) {
            (DrmFourcc::Rgb565, false) => MdpFormat::Rgb565,
            (DrmFourcc::Bgr565, false) => MdpFormat::Bgr565,
            (DrmFourcc::Rgb888, false) => MdpFormat::Rgb888,
            (DrmFourcc::Bgr888, false) => MdpFormat::Bgr888,
            (DrmFourcc::Xrgb8888, false) => MdpFormat::Xrgb8888,
            (DrmFourcc::Rgbx8888, false) => MdpFormat::Rgbx8888,
            (DrmFourcc::Argb8888, false) => MdpFormat::Argb8888,
            (DrmFourcc::Rgba8888, false) => MdpFormat::Rgba8888,
            (DrmFourcc::Bgra8888, false) => MdpFormat::Bgra8888,
            (DrmFourcc::Argb1555, false) => MdpFormat::Argb1555,
            (DrmFourcc::Rgba5551, false) => MdpFormat::Rgba5551,
            (DrmFourcc::Argb4444, false) => MdpFormat::Argb4444,
            (DrmFourcc::Rgba4444, false) => MdpFormat::Rgba4444,
            (DrmFourcc::Nv12, false) => MdpFormat::YCbCrH2V2Venus,
            (DrmFourcc::Nv12, true) => MdpFormat::YCbCrH2V2Ubwc,
            (DrmFourcc::Rgba8888, true) => MdpFormat::Rgba8888Ubwc,
            _ => return None,
        };
        Some(format)
    }

    /// Whether the format carries per-pixel alpha
    pub fn has_alpha(&self) -> bool {
        matches!(
            self,
            MdpFormat::Argb8888
                | MdpFormat::Rgba8888
                | MdpFormat::Bgra8888
                | MdpFormat::Argb1555
                | MdpFormat::Rgba5551
                | MdpFormat::Argb4444
                | MdpFormat::Rgba4444
                | MdpFormat::Rgba8888Ubwc
        )
    }

    /// Whether the format is bandwidth compressed
    ///
    /// Compressed formats cannot be decimated.
    pub fn is_ubwc(&self) -> bool {
        matches!(self, MdpFormat::YCbCrH2V2Ubwc | MdpFormat::Rgba8888Ubwc)
    }

    /// Whether the format stores YUV samples
    pub fn is_yuv(&self) -> bool {
        matches!(self, MdpFormat::YCbCrH2V2Venus | MdpFormat::YCbCrH2V2Ubwc)
    }
}

impl fmt::Display for MdpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
