use std::fmt;

use tracing::trace;

use super::{Buffer, Error, SurfaceId};

/// What a plane is configured to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneMode {
    /// Hidden
    Disabled,
    /// A compositor-flipped surface
    Graphics,
    /// A client video stream
    Video,
    /// A client-driven passthrough
    Bypass,
}

/// Surface a plane is asked to display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanoutSource {
    /// Nothing
    Disabled,
    /// A hardware surface flipped by the compositor
    Surface(SurfaceId),
    /// A video stream flipped by the client
    Video,
    /// A passthrough driven by the client
    Bypass,
}

impl ScanoutSource {
    /// Whether the hardware cannot be asked what is displayed
    ///
    /// Client-flipped sources are assumed displayed as soon as the plane
    /// is configured.
    pub fn is_inferred(&self) -> bool {
        matches!(self, ScanoutSource::Video | ScanoutSource::Bypass)
    }

    /// Plane mode needed to show this source
    pub fn mode(&self) -> PlaneMode {
        match self {
            ScanoutSource::Disabled => PlaneMode::Disabled,
            ScanoutSource::Surface(_) => PlaneMode::Graphics,
            ScanoutSource::Video => PlaneMode::Video,
            ScanoutSource::Bypass => PlaneMode::Bypass,
        }
    }
}

/// A source together with the client buffer it keeps alive
#[derive(Debug, Clone)]
pub struct Scanout {
    /// What is shown
    pub source: ScanoutSource,
    /// Client buffer read by the hardware, if any
    pub buffer: Option<Buffer>,
}

/// Hardware configuration of a plane
pub trait PlaneConfiguration: Clone + PartialEq + fmt::Debug {
    /// The state right after a plane reset, matching no real configuration
    fn unset() -> Self;

    /// Mode of this configuration, `None` when unset
    fn mode(&self) -> Option<PlaneMode>;

    /// Switch the mode, keeping everything else
    fn set_mode(&mut self, mode: PlaneMode);

    /// Whether the hardware may switch from `self` to `next` while the
    /// previous flip may still be outstanding
    fn is_compatible(&self, next: &Self) -> bool;
}

/// Flip progress of a plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlipState {
    /// Nothing staged
    Idle,
    /// A scanout is staged, not yet sent to the hardware
    Pending,
    /// The hardware accepted the flip
    Submitted,
    /// The flip did not show up at the first vblank
    Delayed,
}

/// Double-buffered configuration and scanout of one plane
///
/// At most one scanout is pending at any time; [`PlaneState::prepare`]
/// refuses to stage another until the current one resolves or is cancelled.
#[derive(Debug)]
pub struct PlaneState<C> {
    pub(super) config: C,
    pub(super) pending_config: C,
    pub(super) current: Option<Scanout>,
    pub(super) pending: Option<Scanout>,
    pub(super) flip: FlipState,
}

impl<C: PlaneConfiguration> PlaneState<C> {
    /// Fresh state of a plane that was just reset
    pub fn new() -> Self {
        PlaneState {
            config: C::unset(),
            pending_config: C::unset(),
            current: None,
            pending: None,
            flip: FlipState::Idle,
        }
    }

    /// Last configuration accepted by the hardware
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Configuration for the next commit
    pub fn pending_config(&self) -> &C {
        &self.pending_config
    }

    /// Scanout the hardware is known to display
    pub fn current(&self) -> Option<&Scanout> {
        self.current.as_ref()
    }

    /// Scanout waiting for commit or confirmation
    pub fn pending(&self) -> Option<&Scanout> {
        self.pending.as_ref()
    }

    /// Flip progress
    pub fn flip_state(&self) -> FlipState {
        self.flip
    }

    /// Whether no scanout is pending
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Stage `source` for the next commit
    ///
    /// `config` replaces the pending configuration if given; the mode always
    /// follows the source.
    pub fn prepare(
        &mut self,
        source: ScanoutSource,
        config: Option<C>,
        buffer: Option<Buffer>,
    ) -> Result<(), Error> {
        if self.pending.is_some() {
            return Err(Error::PlaneBusy);
        }

        if let Some(config) = config {
            self.pending_config = config;
        }
        self.pending_config.set_mode(source.mode());
        self.pending = Some(Scanout { source, buffer });
        self.flip = FlipState::Pending;
        Ok(())
    }

    /// Stage a disabled scanout unless the plane is already known disabled
    pub fn disable(&mut self) -> Result<(), Error> {
        if matches!(self.current, Some(Scanout { source: ScanoutSource::Disabled, .. })) {
            return Ok(());
        }
        self.prepare(ScanoutSource::Disabled, None, None)
    }

    /// Drop a scanout that was staged but not yet committed
    ///
    /// Returns the dropped scanout. Submitted flips cannot be cancelled.
    pub fn cancel(&mut self) -> Option<Scanout> {
        if self.flip != FlipState::Pending {
            return None;
        }
        self.flip = FlipState::Idle;
        self.pending_config = self.config.clone();
        self.pending.take()
    }

    /// Mark the pending scanout and configuration as handed to the hardware
    ///
    /// Used by pipelines that commit every plane in one atomic request
    /// instead of going through [`commit_plane`](super::commit_plane).
    pub fn submitted(&mut self) {
        if self.flip == FlipState::Pending {
            self.config = self.pending_config.clone();
            self.flip = FlipState::Submitted;
        }
    }

    /// The submitted scanout is displayed: make it current
    ///
    /// Used by pipelines that learn about completion from a vsync rather
    /// than by querying each plane.
    pub fn promote(&mut self) -> bool {
        if !matches!(self.flip, FlipState::Submitted | FlipState::Delayed) {
            return false;
        }
        self.current = self.pending.take();
        self.flip = FlipState::Idle;
        true
    }

    /// Drop the buffer of the current scanout, keeping its source
    pub fn release_current(&mut self) -> Option<Buffer> {
        self.current.as_mut().and_then(|current| current.buffer.take())
    }

    /// Forget the configuration the hardware holds, as after a reset
    pub fn reset_config(&mut self) {
        trace!("reset plane config");
        self.config = C::unset();
    }

    /// Forget everything, as after an output reinit
    pub fn reset(&mut self) {
        self.config = C::unset();
        self.pending_config = C::unset();
        self.current = None;
        self.pending = None;
        self.flip = FlipState::Idle;
    }
}

impl<C: PlaneConfiguration> Default for PlaneState<C> {
    fn default() -> Self {
        PlaneState::new()
    }
}
