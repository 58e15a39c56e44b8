use std::fmt;

use tracing::{debug, trace, warn};

use super::{FlipState, PlaneConfiguration, PlaneState, Scanout, ScanoutSource};

/// Hardware operations needed to commit and complete plane flips
pub trait PlaneDevice {
    /// Hardware plane identifier
    type Plane: Copy + fmt::Debug;
    /// Plane configuration
    type Config: PlaneConfiguration;
    /// Hardware error
    type Error: std::error::Error;

    /// Program `next` into `plane` in one begin/end transaction
    ///
    /// `current` is what the hardware last accepted, so unchanged
    /// attributes may be skipped.
    fn reconfigure(&mut self, plane: Self::Plane, current: &Self::Config, next: &Self::Config) -> Result<(), Self::Error>;

    /// Reset `plane` to its power-on state
    fn reset(&mut self, plane: Self::Plane) -> Result<(), Self::Error>;

    /// Ask the hardware to show `source` on `plane` at the next vblank
    ///
    /// Only called with [`ScanoutSource::Disabled`] and
    /// [`ScanoutSource::Surface`].
    fn flip(&mut self, plane: Self::Plane, source: ScanoutSource) -> Result<(), Self::Error>;

    /// Surface `plane` is currently displaying
    fn displayed(&mut self, plane: Self::Plane) -> Result<ScanoutSource, Self::Error>;
}

/// Result of committing one plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was pending, the hardware was not touched
    Skipped,
    /// The pending scanout was handed to the hardware
    Submitted,
}

/// Result of reconciling one plane after a vblank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipOutcome {
    /// No flip was outstanding
    Idle,
    /// The requested surface is displayed and now current
    Confirmed,
    /// The requested surface is not displayed yet, retry at the next vblank
    Delayed,
    /// The requested surface never showed up and was dropped
    Abandoned,
}

impl FlipOutcome {
    /// Whether the plane no longer waits for the hardware
    pub fn is_resolved(&self) -> bool {
        !matches!(self, FlipOutcome::Delayed)
    }
}

/// Send the pending scanout of `plane` to the hardware
///
/// When the configuration changes in a way the hardware cannot apply on
/// top of an outstanding flip, the plane is flipped to nothing first. A
/// failed reconfiguration or flip gets one plane reset and one retry; if
/// that fails too the pending scanout is dropped, releasing its buffer.
///
/// Planes without a pending scanout, or whose scanout was already
/// submitted, are left alone, so committing twice is harmless.
pub fn commit_plane<D: PlaneDevice>(
    device: &mut D,
    plane: D::Plane,
    state: &mut PlaneState<D::Config>,
) -> Result<CommitOutcome, D::Error> {
    if state.flip != FlipState::Pending {
        return Ok(CommitOutcome::Skipped);
    }
    let source = match state.pending {
        Some(Scanout { source, .. }) => source,
        None => return Ok(CommitOutcome::Skipped),
    };

    let mut retried = false;
    loop {
        match try_commit(device, plane, state, source) {
            Ok(()) => {
                state.flip = FlipState::Submitted;
                return Ok(CommitOutcome::Submitted);
            }
            Err(err) if !retried => {
                warn!(?plane, ?err, "failed to commit plane, resetting");
                retried = true;
                if let Err(err) = device.reset(plane) {
                    warn!(?plane, ?err, "failed to reset plane");
                }
                state.config = D::Config::unset();
            }
            Err(err) => {
                warn!(?plane, ?err, "failed to commit plane after reset");
                state.pending = None;
                state.pending_config = state.config.clone();
                state.flip = FlipState::Idle;
                return Err(err);
            }
        }
    }
}

fn try_commit<D: PlaneDevice>(
    device: &mut D,
    plane: D::Plane,
    state: &mut PlaneState<D::Config>,
    source: ScanoutSource,
) -> Result<(), D::Error> {
    if state.config != state.pending_config {
        if !state.config.is_compatible(&state.pending_config) {
            trace!(?plane, "clear outstanding flip before reconfiguring");
            if let Err(err) = device.flip(plane, ScanoutSource::Disabled) {
                debug!(?plane, ?err, "failed to clear flip");
            }
        }
        device.reconfigure(plane, &state.config, &state.pending_config)?;
        state.config = state.pending_config.clone();
    }

    if !source.is_inferred() {
        device.flip(plane, source)?;
    }
    Ok(())
}

/// Reconcile `plane` with what the hardware displays
///
/// A submitted scanout that is not displayed gets one more vblank; if it is
/// still missing after that it is abandoned and its buffer released. Once
/// displayed, the pending scanout replaces the current one.
pub fn complete_plane<D: PlaneDevice>(
    device: &mut D,
    plane: D::Plane,
    state: &mut PlaneState<D::Config>,
) -> FlipOutcome {
    if !matches!(state.flip, FlipState::Submitted | FlipState::Delayed) {
        return FlipOutcome::Idle;
    }
    let Some(requested) = state.pending.as_ref().map(|pending| pending.source) else {
        state.flip = FlipState::Idle;
        return FlipOutcome::Idle;
    };

    let displayed = if requested.is_inferred() {
        requested
    } else {
        match device.displayed(plane) {
            Ok(displayed) => displayed,
            Err(err) => {
                warn!(?plane, ?err, "failed to query displayed surface");
                ScanoutSource::Disabled
            }
        }
    };

    if state.current.as_ref().map(|current| current.source) != Some(displayed) {
        // whatever was current left the screen
        state.current = Some(Scanout {
            source: displayed,
            buffer: None,
        });
    }

    if displayed != requested {
        if state.flip == FlipState::Submitted {
            debug!(?plane, ?requested, ?displayed, "flip delayed");
            state.flip = FlipState::Delayed;
            return FlipOutcome::Delayed;
        }
        debug!(?plane, ?requested, ?displayed, "flip abandoned");
        state.pending = None;
        state.flip = FlipState::Idle;
        return FlipOutcome::Abandoned;
    }

    if let (Some(current), Some(pending)) = (state.current.as_mut(), state.pending.take()) {
        current.buffer = pending.buffer;
    }
    state.flip = FlipState::Idle;
    FlipOutcome::Confirmed
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::{commit_plane, complete_plane, CommitOutcome, FlipOutcome, PlaneDevice};
    use crate::backend::scanout::plane::tests::TestConfig;
    use crate::backend::scanout::{
        Buffer, BufferKind, FlipState, PlaneMode, PlaneState, ScanoutSource, SidebandKind, SurfaceId,
    };

    #[derive(Debug, thiserror::Error)]
    #[error("device failure")]
    struct Failure;

    #[derive(Default)]
    struct Device {
        displayed: Option<ScanoutSource>,
        fail_reconfigure: usize,
        reconfigures: usize,
        resets: usize,
        flips: Vec<ScanoutSource>,
    }

    impl PlaneDevice for Device {
        type Plane = u32;
        type Config = TestConfig;
        type Error = Failure;

        fn reconfigure(&mut self, _: u32, _: &TestConfig, _: &TestConfig) -> Result<(), Failure> {
            self.reconfigures += 1;
            if self.fail_reconfigure > 0 {
                self.fail_reconfigure -= 1;
                return Err(Failure);
            }
            Ok(())
        }

        fn reset(&mut self, _: u32) -> Result<(), Failure> {
            self.resets += 1;
            Ok(())
        }

        fn flip(&mut self, _: u32, source: ScanoutSource) -> Result<(), Failure> {
            self.flips.push(source);
            Ok(())
        }

        fn displayed(&mut self, _: u32) -> Result<ScanoutSource, Failure> {
            self.displayed.ok_or(Failure)
        }
    }

    fn counted_buffer(released: &Rc<Cell<u32>>) -> Buffer {
        let released = released.clone();
        Buffer::with_release(
            BufferKind::Sideband {
                plane: 0,
                kind: SidebandKind::Bypass,
                size: (0, 0).into(),
            },
            move || released.set(released.get() + 1),
        )
    }

    fn graphics(width: i32) -> Option<TestConfig> {
        Some(TestConfig {
            mode: Some(PlaneMode::Graphics),
            width,
        })
    }

    #[test]
    fn commit_twice_flips_once() {
        let mut device = Device::default();
        let mut state = PlaneState::<TestConfig>::new();
        let buffer = crate::backend::scanout::plane::tests::buffer();
        state
            .prepare(ScanoutSource::Surface(SurfaceId(7)), graphics(64), Some(buffer.clone()))
            .unwrap();

        assert_eq!(
            commit_plane(&mut device, 0, &mut state).unwrap(),
            CommitOutcome::Submitted
        );
        let refs = buffer.ref_count();
        assert_eq!(
            commit_plane(&mut device, 0, &mut state).unwrap(),
            CommitOutcome::Skipped
        );

        assert_eq!(device.flips, vec![ScanoutSource::Surface(SurfaceId(7))]);
        assert_eq!(device.reconfigures, 1);
        assert_eq!(buffer.ref_count(), refs);
    }

    #[test]
    fn incompatible_change_clears_flip_first() {
        let mut device = Device {
            displayed: Some(ScanoutSource::Surface(SurfaceId(1))),
            ..Default::default()
        };
        let mut state = PlaneState::<TestConfig>::new();
        state
            .prepare(ScanoutSource::Surface(SurfaceId(1)), graphics(64), None)
            .unwrap();
        commit_plane(&mut device, 0, &mut state).unwrap();
        assert_eq!(complete_plane(&mut device, 0, &mut state), FlipOutcome::Confirmed);

        state
            .prepare(ScanoutSource::Surface(SurfaceId(2)), graphics(128), None)
            .unwrap();
        commit_plane(&mut device, 0, &mut state).unwrap();

        assert_eq!(
            device.flips,
            vec![
                ScanoutSource::Surface(SurfaceId(1)),
                ScanoutSource::Disabled,
                ScanoutSource::Surface(SurfaceId(2)),
            ]
        );
    }

    #[test]
    fn reconfigure_failure_resets_and_retries_once() {
        let mut device = Device {
            fail_reconfigure: 1,
            ..Default::default()
        };
        let mut state = PlaneState::<TestConfig>::new();
        state
            .prepare(ScanoutSource::Surface(SurfaceId(3)), graphics(64), None)
            .unwrap();

        assert_eq!(
            commit_plane(&mut device, 0, &mut state).unwrap(),
            CommitOutcome::Submitted
        );
        assert_eq!(device.resets, 1);
        assert_eq!(device.reconfigures, 2);
    }

    #[test]
    fn second_failure_drops_pending_buffer() {
        let released = Rc::new(Cell::new(0));
        let mut device = Device {
            fail_reconfigure: 2,
            ..Default::default()
        };
        let mut state = PlaneState::<TestConfig>::new();
        state
            .prepare(
                ScanoutSource::Surface(SurfaceId(3)),
                graphics(64),
                Some(counted_buffer(&released)),
            )
            .unwrap();

        assert!(commit_plane(&mut device, 0, &mut state).is_err());
        assert_eq!(released.get(), 1);
        assert_eq!(state.flip_state(), FlipState::Idle);
        assert!(device.flips.is_empty());
    }

    #[test]
    fn flip_abandoned_after_second_mismatch() {
        let released = Rc::new(Cell::new(0));
        let mut device = Device {
            displayed: Some(ScanoutSource::Surface(SurfaceId(1))),
            ..Default::default()
        };
        let mut state = PlaneState::<TestConfig>::new();
        state
            .prepare(
                ScanoutSource::Surface(SurfaceId(2)),
                graphics(64),
                Some(counted_buffer(&released)),
            )
            .unwrap();
        commit_plane(&mut device, 0, &mut state).unwrap();

        assert_eq!(complete_plane(&mut device, 0, &mut state), FlipOutcome::Delayed);
        assert_eq!(released.get(), 0);
        assert_eq!(complete_plane(&mut device, 0, &mut state), FlipOutcome::Abandoned);
        assert_eq!(released.get(), 1);
        assert_eq!(state.flip_state(), FlipState::Idle);
        assert!(state.is_idle());

        // nothing left to release
        assert_eq!(complete_plane(&mut device, 0, &mut state), FlipOutcome::Idle);
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn delayed_flip_confirmed_at_second_vblank() {
        let released = Rc::new(Cell::new(0));
        let mut device = Device {
            displayed: Some(ScanoutSource::Disabled),
            ..Default::default()
        };
        let mut state = PlaneState::<TestConfig>::new();
        state
            .prepare(
                ScanoutSource::Surface(SurfaceId(2)),
                graphics(64),
                Some(counted_buffer(&released)),
            )
            .unwrap();
        commit_plane(&mut device, 0, &mut state).unwrap();

        assert_eq!(complete_plane(&mut device, 0, &mut state), FlipOutcome::Delayed);
        device.displayed = Some(ScanoutSource::Surface(SurfaceId(2)));
        assert_eq!(complete_plane(&mut device, 0, &mut state), FlipOutcome::Confirmed);

        let current = state.current().unwrap();
        assert_eq!(current.source, ScanoutSource::Surface(SurfaceId(2)));
        assert!(current.buffer.is_some());
        assert_eq!(released.get(), 0);
    }

    #[test]
    fn confirmed_flip_releases_previous_buffer() {
        let released = Rc::new(Cell::new(0));
        let mut device = Device::default();
        let mut state = PlaneState::<TestConfig>::new();

        for id in 1..=2 {
            device.displayed = Some(ScanoutSource::Surface(SurfaceId(id)));
            state
                .prepare(
                    ScanoutSource::Surface(SurfaceId(id)),
                    graphics(64),
                    Some(counted_buffer(&released)),
                )
                .unwrap();
            commit_plane(&mut device, 0, &mut state).unwrap();
            assert_eq!(complete_plane(&mut device, 0, &mut state), FlipOutcome::Confirmed);
        }

        assert_eq!(released.get(), 1);
    }

    #[test]
    fn video_source_is_inferred() {
        let mut device = Device::default();
        let mut state = PlaneState::<TestConfig>::new();
        state.prepare(ScanoutSource::Video, None, None).unwrap();

        commit_plane(&mut device, 0, &mut state).unwrap();
        assert!(device.flips.is_empty());
        assert_eq!(complete_plane(&mut device, 0, &mut state), FlipOutcome::Confirmed);
        assert_eq!(state.config().mode, Some(PlaneMode::Video));
    }
}
