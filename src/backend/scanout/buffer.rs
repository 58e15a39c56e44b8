use std::{fmt, rc::Rc};

use drm_fourcc::{DrmFourcc, DrmModifier};
use smallvec::SmallVec;

use super::{format::ColorSpace, SurfaceId};
use crate::utils::{Buffer as BufferCoords, Size};

/// Sideband stream type of a vendor buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebandKind {
    /// The client flips video frames on the plane itself
    Video,
    /// The client drives the plane, the compositor only enables it
    Bypass,
}

/// One memory plane of a dmabuf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmabufPlane {
    /// Byte offset of the plane
    pub offset: u32,
    /// Bytes per row
    pub stride: u32,
}

/// Contents and type of a client buffer
#[derive(Debug)]
pub enum BufferKind {
    /// CPU memory shared with the client
    Shm {
        /// Pixel format
        format: DrmFourcc,
        /// Size in pixels
        size: Size<i32, BufferCoords>,
        /// Bytes per row
        stride: usize,
        /// Pixel data
        data: Rc<[u8]>,
    },
    /// A surface allocated by the display hardware
    Native {
        /// Hardware surface id
        surface: SurfaceId,
        /// Pixel format
        format: DrmFourcc,
        /// Size in pixels
        size: Size<i32, BufferCoords>,
        /// Color space of the contents
        color_space: ColorSpace,
    },
    /// A plane handed to a client, contents never go through the compositor
    Sideband {
        /// Raw id of the plane the stream runs on
        plane: u32,
        /// Stream type
        kind: SidebandKind,
        /// Frame size announced by the client
        size: Size<i32, BufferCoords>,
    },
    /// An imported dmabuf
    Dmabuf {
        /// Import handle known to the display device
        handle: SurfaceId,
        /// Pixel format
        format: DrmFourcc,
        /// Layout of the pixel data, `Qcom_compressed` for UBWC
        modifier: DrmModifier,
        /// Size in pixels
        size: Size<i32, BufferCoords>,
        /// Memory planes
        planes: SmallVec<[DmabufPlane; 4]>,
    },
}

struct InnerBuffer {
    kind: BufferKind,
    release: Option<Box<dyn FnOnce()>>,
}

impl Drop for InnerBuffer {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Shared reference to a client buffer
///
/// Every plane slot that may still be read by the hardware holds a clone.
/// The release callback runs once, when the last clone is dropped, which is
/// the moment the client may reuse or destroy the buffer.
#[derive(Clone)]
pub struct Buffer {
    inner: Rc<InnerBuffer>,
}

impl Buffer {
    /// Wrap a buffer that needs no release notification
    pub fn new(kind: BufferKind) -> Buffer {
        Buffer {
            inner: Rc::new(InnerBuffer { kind, release: None }),
        }
    }

    /// Wrap a buffer and call `release` once it is no longer referenced
    pub fn with_release(kind: BufferKind, release: impl FnOnce() + 'static) -> Buffer {
        Buffer {
            inner: Rc::new(InnerBuffer {
                kind,
                release: Some(Box::new(release)),
            }),
        }
    }

    /// Type and contents of the buffer
    pub fn kind(&self) -> &BufferKind {
        &self.inner.kind
    }

    /// Pixel format, if the buffer has one
    pub fn format(&self) -> Option<DrmFourcc> {
        match self.inner.kind {
            BufferKind::Shm { format, .. }
            | BufferKind::Native { format, .. }
            | BufferKind::Dmabuf { format, .. } => Some(format),
            BufferKind::Sideband { .. } => None,
        }
    }

    /// Number of live references to this buffer
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Whether both handles refer to the same buffer
    pub fn same_as(&self, other: &Buffer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("kind", &self.inner.kind)
            .field("refs", &self.ref_count())
            .finish()
    }
}
