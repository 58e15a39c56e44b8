//! In-memory GDL device
//!
//! Records every driver call and keeps surfaces in plain memory, so
//! outputs can be driven without the hardware. Flips are displayed at once
//! unless [`DummyGdl::auto_display`] is turned off.

use std::{
    collections::HashMap,
    convert::Infallible,
    io,
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

use drm_fourcc::DrmFourcc;
use indexmap::IndexSet;

use super::device::{GdlDevice, GdlError, GdlPlane, PaletteEntry, PlaneAttribute, SurfaceInfo, TvMode};
use crate::backend::scanout::{FramebufferRenderer, PlaneCaps, SurfaceId, VBlankCancel, VBlankWait};
use crate::utils::{Buffer as BufferCoords, Physical, Region, Size};

/// A driver call seen by [`DummyGdl`]
#[derive(Debug, Clone, PartialEq)]
pub enum GdlCall {
    /// One configuration transaction
    Configure(GdlPlane, Vec<PlaneAttribute>),
    /// Plane reset
    Reset(GdlPlane),
    /// Asynchronous flip
    Flip(GdlPlane, Option<SurfaceId>),
    /// Universal plane stacking
    ZOrder(Vec<GdlPlane>),
    /// Surface allocation
    Alloc(SurfaceId, Size<i32, BufferCoords>),
    /// Surface release
    Free(SurfaceId),
    /// Palette upload
    Palette(SurfaceId),
    /// Cache flush
    Flush(SurfaceId),
}

#[derive(Debug)]
struct DummySurface {
    info: SurfaceInfo,
    data: Vec<u8>,
    palette: Option<Box<[PaletteEntry; 256]>>,
}

/// Recording GDL device
#[derive(Debug)]
pub struct DummyGdl {
    /// Calls in issue order
    pub calls: Vec<GdlCall>,
    /// Result of [`GdlDevice::display_mode`]
    pub mode: Result<TvMode, GdlError>,
    /// Whether flips show up on screen immediately
    pub auto_display: bool,
    /// Number of upcoming configuration transactions to fail
    pub failing_configures: usize,
    /// Period of the vblank waiter
    pub vblank_interval: Duration,
    displayed: HashMap<GdlPlane, Option<SurfaceId>>,
    surfaces: HashMap<SurfaceId, DummySurface>,
    next_surface: u32,
}

impl DummyGdl {
    /// Device displaying 1920x1080p60
    pub fn new() -> DummyGdl {
        DummyGdl {
            calls: Vec::new(),
            mode: Ok(TvMode {
                size: Size::from((1920, 1080)),
                refresh: super::device::Refresh::Hz60,
                interlaced: false,
            }),
            auto_display: true,
            failing_configures: 0,
            vblank_interval: Duration::from_millis(16),
            displayed: HashMap::new(),
            surfaces: HashMap::new(),
            next_surface: 10,
        }
    }

    /// Configuration attributes of the last transaction on `plane`
    pub fn last_configuration(&self, plane: GdlPlane) -> Option<&[PlaneAttribute]> {
        self.calls.iter().rev().find_map(|call| match call {
            GdlCall::Configure(p, attributes) if *p == plane => Some(attributes.as_slice()),
            _ => None,
        })
    }

    /// Flips issued on `plane`
    pub fn flips(&self, plane: GdlPlane) -> Vec<Option<SurfaceId>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GdlCall::Flip(p, surface) if *p == plane => Some(*surface),
                _ => None,
            })
            .collect()
    }

    /// Pretend the hardware now scans out `surface` on `plane`
    pub fn set_displayed(&mut self, plane: GdlPlane, surface: Option<SurfaceId>) {
        self.displayed.insert(plane, surface);
    }

    /// Memory of a live surface
    pub fn surface(&self, id: SurfaceId) -> Option<&[u8]> {
        self.surfaces.get(&id).map(|surface| surface.data.as_slice())
    }

    /// Palette uploaded for a live surface
    pub fn palette(&self, id: SurfaceId) -> Option<&[PaletteEntry; 256]> {
        self.surfaces.get(&id).and_then(|surface| surface.palette.as_deref())
    }

    /// Number of live surfaces
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    fn caps(plane: GdlPlane) -> PlaneCaps {
        if plane.is_iap() {
            PlaneCaps {
                formats: IndexSet::from([DrmFourcc::C8, DrmFourcc::Argb8888]),
                min_dst: Size::from((2, 2)),
                max_dst: Size::from((1920, 1080)),
                max_src_width: None,
            }
        } else {
            PlaneCaps {
                formats: IndexSet::from([
                    DrmFourcc::Argb8888,
                    DrmFourcc::Xrgb8888,
                    DrmFourcc::Rgb565,
                    DrmFourcc::Yuyv,
                    DrmFourcc::Nv12,
                ]),
                min_dst: Size::from((16, 16)),
                max_dst: Size::from((1920, 1080)),
                max_src_width: Some(1920),
            }
        }
    }
}

impl Default for DummyGdl {
    fn default() -> Self {
        DummyGdl::new()
    }
}

/// Vblank waiter ticking at a fixed period until cancelled
#[derive(Debug)]
pub struct DummyVBlank {
    interval: Duration,
    cancelled: Arc<(Mutex<bool>, Condvar)>,
}

impl VBlankWait for DummyVBlank {
    fn wait_for_vblank(&mut self) -> io::Result<()> {
        let (cancelled, cvar) = &*self.cancelled;
        let cancelled = cancelled
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "vblank state poisoned"))?;
        let (cancelled, _) = cvar
            .wait_timeout_while(cancelled, self.interval, |cancelled| !*cancelled)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "vblank state poisoned"))?;
        if *cancelled {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "vblank wait cancelled"));
        }
        Ok(())
    }

    fn canceller(&self) -> Option<VBlankCancel> {
        let state = self.cancelled.clone();
        Some(Box::new(move || {
            let (cancelled, cvar) = &*state;
            if let Ok(mut cancelled) = cancelled.lock() {
                *cancelled = true;
            }
            cvar.notify_all();
        }))
    }
}

impl GdlDevice for DummyGdl {
    type VBlank = DummyVBlank;

    fn plane_capabilities(&mut self, plane: GdlPlane) -> Result<PlaneCaps, GdlError> {
        Ok(DummyGdl::caps(plane))
    }

    fn configure_plane(&mut self, plane: GdlPlane, attributes: &[PlaneAttribute]) -> Result<(), GdlError> {
        if self.failing_configures > 0 {
            self.failing_configures -= 1;
            return Err(GdlError::InvalidParam);
        }
        self.calls.push(GdlCall::Configure(plane, attributes.to_vec()));
        Ok(())
    }

    fn reset_plane(&mut self, plane: GdlPlane) -> Result<(), GdlError> {
        self.calls.push(GdlCall::Reset(plane));
        self.displayed.insert(plane, None);
        Ok(())
    }

    fn flip(&mut self, plane: GdlPlane, surface: Option<SurfaceId>) -> Result<(), GdlError> {
        self.calls.push(GdlCall::Flip(plane, surface));
        if self.auto_display {
            self.displayed.insert(plane, surface);
        }
        Ok(())
    }

    fn displayed_surface(&mut self, plane: GdlPlane) -> Result<Option<SurfaceId>, GdlError> {
        Ok(self.displayed.get(&plane).copied().flatten())
    }

    fn set_upp_zorder(&mut self, order: &[GdlPlane]) -> Result<(), GdlError> {
        self.calls.push(GdlCall::ZOrder(order.to_vec()));
        Ok(())
    }

    fn display_mode(&mut self) -> Result<TvMode, GdlError> {
        self.mode
    }

    fn alloc_surface(
        &mut self,
        format: DrmFourcc,
        size: Size<i32, BufferCoords>,
        _cached: bool,
    ) -> Result<SurfaceInfo, GdlError> {
        let bpp = match format {
            DrmFourcc::C8 => 1,
            DrmFourcc::Rgb565 | DrmFourcc::Yuyv => 2,
            _ => 4,
        };
        let id = SurfaceId(self.next_surface);
        self.next_surface += 1;

        let info = SurfaceInfo {
            id,
            format,
            size,
            pitch: size.w as usize * bpp,
        };
        self.surfaces.insert(
            id,
            DummySurface {
                info,
                data: vec![0xaa; info.pitch * size.h as usize],
                palette: None,
            },
        );
        self.calls.push(GdlCall::Alloc(id, size));
        Ok(info)
    }

    fn free_surface(&mut self, surface: SurfaceId) -> Result<(), GdlError> {
        self.calls.push(GdlCall::Free(surface));
        self.surfaces.remove(&surface).map(|_| ()).ok_or(GdlError::InvalidParam)
    }

    fn surface_data(&mut self, surface: SurfaceId) -> Result<&mut [u8], GdlError> {
        self.surfaces
            .get_mut(&surface)
            .map(|surface| surface.data.as_mut_slice())
            .ok_or(GdlError::InvalidParam)
    }

    fn set_palette(&mut self, surface: SurfaceId, palette: &[PaletteEntry; 256]) -> Result<(), GdlError> {
        self.calls.push(GdlCall::Palette(surface));
        let surface = self.surfaces.get_mut(&surface).ok_or(GdlError::InvalidParam)?;
        if surface.info.format != DrmFourcc::C8 {
            return Err(GdlError::NotSupported);
        }
        surface.palette = Some(Box::new(*palette));
        Ok(())
    }

    fn flush_surface(&mut self, surface: SurfaceId) {
        self.calls.push(GdlCall::Flush(surface));
    }

    fn vblank_waiter(&mut self) -> Result<DummyVBlank, GdlError> {
        Ok(DummyVBlank {
            interval: self.vblank_interval,
            cancelled: Arc::default(),
        })
    }
}

/// Renderer recording the framebuffer and damage of every frame
#[derive(Debug, Default)]
pub struct DummyRenderer {
    /// Rendered frames, oldest first
    pub frames: Vec<(usize, Region<Physical>)>,
}

impl FramebufferRenderer for DummyRenderer {
    type Error = Infallible;

    fn render(&mut self, framebuffer: usize, damage: &Region<Physical>) -> Result<(), Infallible> {
        self.frames.push((framebuffer, damage.clone()));
        Ok(())
    }
}
