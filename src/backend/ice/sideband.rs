//! Planes handed to clients
//!
//! A client may take an overlay plane for itself and drive it outside the
//! compositor (bypass), or only stream video into a plane the compositor
//! still positions (video). Both are represented to the assignment walk as
//! [`BufferKind::Sideband`] buffers naming the plane.

use tracing::debug;

use super::device::{GdlDevice, GdlPlane};
use super::output::IceOutput;
use super::Error;
use crate::backend::scanout::{Buffer, BufferKind, SidebandKind};
use crate::utils::{Buffer as BufferCoords, Size};

impl<D: GdlDevice, R> IceOutput<D, R> {
    /// Give overlay plane `raw` to a client
    ///
    /// The plane may be acquired several times; it stays out of the
    /// compositor's hands until every holder released it.
    pub fn acquire_plane(&mut self, raw: u32) -> Result<GdlPlane, Error> {
        let index = self.plane_index(raw).ok_or(Error::InvalidPlane(raw))?;
        let plane = self.planes.get_mut(index).ok_or(Error::InvalidPlane(raw))?;

        if plane.acquire_count == 0 {
            debug!(plane = %plane.id, "plane acquired");
            plane.state.reset_config();
        }
        plane.acquire_count += 1;
        Ok(plane.id)
    }

    /// Drop one client hold on `plane`
    pub fn release_plane(&mut self, plane: GdlPlane) -> Result<(), Error> {
        let index = self
            .plane_index(plane.raw())
            .ok_or(Error::InvalidPlane(plane.raw()))?;
        let entry = self
            .planes
            .get_mut(index)
            .ok_or(Error::InvalidPlane(plane.raw()))?;
        if entry.acquire_count == 0 {
            return Err(Error::PlaneNotAcquired(plane));
        }

        entry.acquire_count -= 1;
        if entry.acquire_count == 0 {
            debug!(%plane, "plane released");
            entry.state.reset_config();
        }
        Ok(())
    }

    /// Buffer streaming video of `size` into overlay plane `raw`
    pub fn create_sideband_buffer(&self, raw: u32, size: Size<i32, BufferCoords>) -> Result<Buffer, Error> {
        self.plane_index(raw).ok_or(Error::InvalidPlane(raw))?;
        Ok(Buffer::new(BufferKind::Sideband {
            plane: raw,
            kind: SidebandKind::Video,
            size,
        }))
    }

    /// Buffer standing for the client-driven contents of an acquired `plane`
    pub fn plane_get_buffer(&self, plane: GdlPlane, size: Size<i32, BufferCoords>) -> Result<Buffer, Error> {
        let index = self
            .plane_index(plane.raw())
            .ok_or(Error::InvalidPlane(plane.raw()))?;
        match self.planes.get(index) {
            Some(entry) if entry.acquire_count > 0 => Ok(Buffer::new(BufferKind::Sideband {
                plane: plane.raw(),
                kind: SidebandKind::Bypass,
                size,
            })),
            _ => Err(Error::PlaneNotAcquired(plane)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::ice::device::{GdlPlane, PlaneAttribute};
    use crate::backend::ice::test::{DummyGdl, DummyRenderer};
    use crate::backend::ice::{Error, IceConfig, IceOutput, PlaneConfig};
    use crate::backend::scanout::{
        Buffer, BufferKind, Placement, PlaneConfiguration, Rejection, ScanoutSource, SidebandKind, View, ViewId,
        ViewTransform,
    };
    use crate::utils::{Point, Region, Size};

    type Output = IceOutput<DummyGdl, DummyRenderer>;

    fn output() -> Output {
        IceOutput::new(DummyGdl::new(), DummyRenderer::default(), IceConfig::default())
            .unwrap()
            .0
    }

    fn sideband_view(id: u64, buffer: Buffer) -> View {
        let mut view = View::new(ViewId(id), (640, 360));
        view.transform = ViewTransform::translate(Point::from((100.0, 100.0)));
        view.buffer = Some(buffer);
        view
    }

    #[test]
    fn acquire_counts_holders() {
        let mut output = output();
        assert!(matches!(output.acquire_plane(99), Err(Error::InvalidPlane(99))));
        // the cursor plane is never handed out
        assert!(matches!(
            output.acquire_plane(GdlPlane::IapB.raw()),
            Err(Error::InvalidPlane(_))
        ));

        let plane = output.acquire_plane(GdlPlane::UppC.raw()).unwrap();
        assert_eq!(plane, GdlPlane::UppC);
        output.acquire_plane(GdlPlane::UppC.raw()).unwrap();

        let count = |output: &Output| {
            output
                .planes()
                .find(|p| p.id() == GdlPlane::UppC)
                .unwrap()
                .acquire_count()
        };
        assert_eq!(count(&output), 2);

        output.release_plane(GdlPlane::UppC).unwrap();
        output.release_plane(GdlPlane::UppC).unwrap();
        assert_eq!(count(&output), 0);
        assert!(matches!(
            output.release_plane(GdlPlane::UppC),
            Err(Error::PlaneNotAcquired(GdlPlane::UppC))
        ));
    }

    #[test]
    fn acquired_planes_are_not_used_for_views() {
        let mut output = output();
        output.acquire_plane(GdlPlane::UppD.raw()).unwrap();

        let buffer = output
            .create_sideband_buffer(GdlPlane::UppD.raw(), Size::from((640, 360)))
            .unwrap();
        let assignments = output.assign_planes(&[sideband_view(1, buffer)]);
        assert_eq!(assignments.placements[&ViewId(1)].reason, Some(Rejection::UnsupportedBuffer));

        // the overlay attempt that follows the video one cannot take a sideband buffer
        assert!(output
            .planes()
            .find(|p| p.id() == GdlPlane::UppD)
            .unwrap()
            .state()
            .is_idle());
    }

    #[test]
    fn bypass_needs_an_acquired_plane() {
        let mut output = output();
        assert!(matches!(
            output.plane_get_buffer(GdlPlane::UppA, Size::from((1920, 1080))),
            Err(Error::PlaneNotAcquired(GdlPlane::UppA))
        ));

        output.acquire_plane(GdlPlane::UppA.raw()).unwrap();
        let buffer = output
            .plane_get_buffer(GdlPlane::UppA, Size::from((1920, 1080)))
            .unwrap();
        assert!(matches!(
            buffer.kind(),
            BufferKind::Sideband {
                kind: SidebandKind::Bypass,
                ..
            }
        ));

        let views = vec![sideband_view(1, buffer.clone())];
        let assignments = output.assign_planes(&views);
        assert_eq!(assignments.placement(ViewId(1)), Some(Placement::Plane(GdlPlane::UppA)));

        let state = output.planes().find(|p| p.id() == GdlPlane::UppA).unwrap().state();
        assert_eq!(state.pending().map(|p| p.source), Some(ScanoutSource::Bypass));

        output.repaint(&Region::new()).unwrap();
        let attributes = output.device().last_configuration(GdlPlane::UppA).unwrap();
        assert!(attributes.contains(&PlaneAttribute::Hide(false)));
    }

    #[test]
    fn releasing_resets_the_configuration() {
        let mut output = output();
        let views = vec![sideband_view(
            1,
            output
                .create_sideband_buffer(GdlPlane::UppB.raw(), Size::from((640, 360)))
                .unwrap(),
        )];
        output.assign_planes(&views);
        output.repaint(&Region::new()).unwrap();

        let config = |output: &Output| {
            *output
                .planes()
                .find(|p| p.id() == GdlPlane::UppB)
                .unwrap()
                .state()
                .config()
        };
        assert_ne!(config(&output), PlaneConfig::unset());

        output.acquire_plane(GdlPlane::UppB.raw()).unwrap();
        assert_eq!(config(&output), PlaneConfig::unset());
        output.release_plane(GdlPlane::UppB).unwrap();
        assert_eq!(config(&output), PlaneConfig::unset());
    }

    #[test]
    fn sideband_buffers_name_an_overlay() {
        let output = output();
        assert!(matches!(
            output.create_sideband_buffer(GdlPlane::UppE.raw(), Size::from((16, 16))),
            Err(Error::InvalidPlane(_))
        ));
        let buffer = output
            .create_sideband_buffer(GdlPlane::UppA.raw(), Size::from((720, 576)))
            .unwrap();
        assert!(matches!(
            buffer.kind(),
            BufferKind::Sideband {
                kind: SidebandKind::Video,
                size,
                ..
            } if *size == Size::from((720, 576))
        ));
    }
}
