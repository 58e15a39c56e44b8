use std::{cmp::Ordering, fmt, hash, io, marker::PhantomData, time::Duration};

use rustix::time::{clock_gettime_dynamic, ClockId, DynamicClockId, Timespec};
use tracing::warn;

/// A kernel clock a [`Clock`] can read
pub trait ClockSource {
    /// Kernel id of the clock
    fn id() -> ClockId;
}

/// Monotonic clock, the presentation clock of every output
#[derive(Debug)]
pub struct Monotonic;

impl ClockSource for Monotonic {
    fn id() -> ClockId {
        ClockId::Monotonic
    }
}

/// Reader of a kernel clock
#[derive(Debug)]
pub struct Clock<Kind> {
    _kind: PhantomData<Kind>,
}

impl<Kind: ClockSource> Clock<Kind> {
    /// Check that the clock can be read on this system
    pub fn new() -> io::Result<Self> {
        read_clock(Kind::id())?;
        Ok(Clock { _kind: PhantomData })
    }

    /// Current time of the clock
    pub fn now(&self) -> Time<Kind> {
        match read_clock(Kind::id()) {
            Ok(time) => Time::from(time),
            Err(err) => {
                warn!(?err, "failed to read clock");
                Time::from(Duration::ZERO)
            }
        }
    }
}

/// A point in time on the clock `Kind`, counted from the clock epoch
pub struct Time<Kind> {
    since_epoch: Duration,
    _kind: PhantomData<Kind>,
}

impl<Kind> Time<Kind> {
    /// Time `nanos` nanoseconds after the clock epoch
    pub fn from_nanos(nanos: u64) -> Self {
        Time::from(Duration::from_nanos(nanos))
    }

    /// Time elapsed from `self` to `later`, zero if `later` is earlier
    pub fn duration_since(&self, later: Time<Kind>) -> Duration {
        later.since_epoch.saturating_sub(self.since_epoch)
    }
}

impl<Kind> From<Duration> for Time<Kind> {
    fn from(since_epoch: Duration) -> Self {
        Time {
            since_epoch,
            _kind: PhantomData,
        }
    }
}

impl<Kind> From<Time<Kind>> for Duration {
    fn from(time: Time<Kind>) -> Self {
        time.since_epoch
    }
}

// PhantomData<Kind> would put bounds on Kind in derived impls

impl<Kind> Clone for Time<Kind> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Kind> Copy for Time<Kind> {}

impl<Kind> PartialEq for Time<Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.since_epoch == other.since_epoch
    }
}

impl<Kind> Eq for Time<Kind> {}

impl<Kind> PartialOrd for Time<Kind> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Kind> Ord for Time<Kind> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.since_epoch.cmp(&other.since_epoch)
    }
}

impl<Kind> hash::Hash for Time<Kind> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.since_epoch.hash(state)
    }
}

impl<Kind> fmt::Debug for Time<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:09}",
            self.since_epoch.as_secs(),
            self.since_epoch.subsec_nanos()
        )
    }
}

fn read_clock(id: ClockId) -> io::Result<Duration> {
    let now: Timespec = clock_gettime_dynamic(DynamicClockId::Known(id))?;
    let (tv_sec, tv_nsec) = (now.tv_sec as i64, now.tv_nsec as i64);
    if tv_sec < 0 || !(0..1_000_000_000).contains(&tv_nsec) {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "clock before its epoch"));
    }
    Ok(Duration::new(tv_sec as u64, tv_nsec as u32))
}
