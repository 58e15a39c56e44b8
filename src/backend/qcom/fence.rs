use std::{
    fmt,
    os::unix::io::{AsFd, BorrowedFd, OwnedFd},
};

use rustix::event::{poll, PollFd, PollFlags};
use tracing::warn;

/// Sync fence of an atomic commit
///
/// The fd becomes readable once the fence signals. It can be polled
/// directly with [`ReleaseFence::is_signaled`], or borrowed through
/// [`AsFd`] to wait for it in an event loop.
pub struct ReleaseFence {
    fd: OwnedFd,
}

impl ReleaseFence {
    /// Wrap a fence fd returned by the device
    pub fn new(fd: OwnedFd) -> ReleaseFence {
        ReleaseFence { fd }
    }

    /// Whether the fence signaled, without blocking
    pub fn is_signaled(&self) -> bool {
        let mut fds = [PollFd::new(&self.fd, PollFlags::IN)];
        match poll(&mut fds, 0) {
            Ok(0) => false,
            Ok(_) => fds[0].revents().intersects(PollFlags::IN | PollFlags::ERR | PollFlags::HUP),
            Err(err) => {
                warn!(?err, "failed to poll fence");
                false
            }
        }
    }
}

impl AsFd for ReleaseFence {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl fmt::Debug for ReleaseFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReleaseFence").field(&self.fd).finish()
    }
}
