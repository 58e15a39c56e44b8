//! Vblank delivery from a blocking hardware wait into an event loop
//!
//! Display engines without pollable vblank events only offer a call that
//! blocks until the next vertical blank. [`VBlankThread`] runs that call on
//! a dedicated thread which does nothing else than read the clock and send
//! the timestamp over a bounded channel. [`VBlankSource`] is the receiving
//! end, to be inserted into a [`calloop`] event loop, so that every plane
//! reconciliation runs on the event loop thread.

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::TrySendError, Arc,
    },
    thread::{self, JoinHandle},
};

use calloop::{
    channel::{sync_channel, Channel, Event as ChannelEvent, SyncSender},
    EventSource, Poll, PostAction, Readiness, Token, TokenFactory,
};
use tracing::{debug, info, warn};

use crate::utils::{Clock, Monotonic, Time};

/// Vblank timestamps buffered before the worker starts dropping them
const VBLANK_QUEUE: usize = 4;

/// Interrupts a blocked [`VBlankWait::wait_for_vblank`] from another thread
pub type VBlankCancel = Box<dyn Fn() + Send>;

/// Blocking wait for the next vertical blank
pub trait VBlankWait: Send + 'static {
    /// Block until the next vertical blank
    fn wait_for_vblank(&mut self) -> io::Result<()>;

    /// Handle that makes the current wait return, or the next one if no
    /// wait is in progress
    ///
    /// Without one, stopping the [`VBlankThread`] waits for the next vblank.
    fn canceller(&self) -> Option<VBlankCancel> {
        None
    }
}

/// One or more vblanks since the event loop last ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VBlank {
    /// Time of the most recent vblank
    pub time: Time<Monotonic>,
    /// Number of vblanks coalesced in this event
    pub count: u32,
}

/// Worker thread waiting for vblanks
///
/// Dropping the handle stops the thread and joins it. A blocked wait is
/// cancelled through [`VBlankWait::canceller`] before joining.
pub struct VBlankThread {
    stop: Arc<AtomicBool>,
    cancel: Option<VBlankCancel>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for VBlankThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VBlankThread")
            .field("stop", &self.stop)
            .field("cancellable", &self.cancel.is_some())
            .field("handle", &self.handle)
            .finish()
    }
}

impl VBlankThread {
    /// Start waiting for vblanks with `waiter`
    ///
    /// Returns the thread handle and the event source receiving the vblanks.
    pub fn spawn<W: VBlankWait>(waiter: W) -> io::Result<(VBlankThread, VBlankSource)> {
        let clock = Clock::<Monotonic>::new()?;
        let (sender, channel) = sync_channel(VBLANK_QUEUE);
        let stop = Arc::new(AtomicBool::new(false));
        let cancel = waiter.canceller();

        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("vblank".into())
            .spawn(move || run_vblank_thread(waiter, clock, sender, thread_stop))?;

        Ok((
            VBlankThread {
                stop,
                cancel,
                handle: Some(handle),
            },
            VBlankSource { channel },
        ))
    }

    /// Whether the thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |handle| !handle.is_finished())
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Some(cancel) = self.cancel.as_ref() {
            cancel();
        }
        if handle.join().is_err() {
            warn!("vblank thread panicked");
        }
    }
}

impl Drop for VBlankThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_vblank_thread<W: VBlankWait>(
    mut waiter: W,
    clock: Clock<Monotonic>,
    sender: SyncSender<Time<Monotonic>>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        if let Err(err) = waiter.wait_for_vblank() {
            if !stop.load(Ordering::SeqCst) {
                warn!(?err, "vblank wait failed, stopping vblank thread");
            }
            break;
        }

        // the timestamp is taken right after the wait returns
        let time = clock.now();

        match sender.try_send(time) {
            Ok(()) => {}
            // the event loop is behind, it gets the next one
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    debug!("vblank thread exiting");
}

/// Event source delivering [`VBlank`]s from a [`VBlankThread`]
pub struct VBlankSource {
    channel: Channel<Time<Monotonic>>,
}

impl fmt::Debug for VBlankSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VBlankSource").finish_non_exhaustive()
    }
}

impl EventSource for VBlankSource {
    type Event = VBlank;
    type Metadata = ();
    type Ret = ();
    type Error = io::Error;

    fn process_events<F>(
        &mut self,
        readiness: Readiness,
        token: Token,
        mut callback: F,
    ) -> Result<PostAction, Self::Error>
    where
        F: FnMut(VBlank, &mut ()),
    {
        let mut latest = None;
        let mut count = 0;
        let mut closed = false;

        self.channel
            .process_events(readiness, token, |event, _| match event {
                ChannelEvent::Msg(time) => {
                    latest = Some(time);
                    count += 1;
                }
                ChannelEvent::Closed => closed = true,
            })
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

        if let Some(time) = latest {
            callback(VBlank { time, count }, &mut ());
        }

        if closed {
            info!("vblank thread exited");
            return Ok(PostAction::Remove);
        }
        Ok(PostAction::Continue)
    }

    fn register(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.channel.register(poll, token_factory)
    }

    fn reregister(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.channel.reregister(poll, token_factory)
    }

    fn unregister(&mut self, poll: &mut Poll) -> calloop::Result<()> {
        self.channel.unregister(poll)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            mpsc::{channel, Receiver},
            Arc, Condvar, Mutex,
        },
        time::Duration,
    };

    use calloop::EventLoop;

    use super::{VBlankCancel, VBlankThread, VBlankWait};

    /// Completes one vblank per token received
    struct Ticks(Receiver<()>);

    impl VBlankWait for Ticks {
        fn wait_for_vblank(&mut self) -> io::Result<()> {
            self.0
                .recv()
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "ticker gone"))
        }
    }

    #[test]
    fn vblanks_reach_the_event_loop() {
        let (tick, ticks) = channel();
        let (mut thread, source) = VBlankThread::spawn(Ticks(ticks)).unwrap();

        let mut event_loop = EventLoop::<Vec<u32>>::try_new().unwrap();
        event_loop
            .handle()
            .insert_source(source, |vblank, _, counts: &mut Vec<u32>| counts.push(vblank.count))
            .unwrap();

        let mut counts = Vec::new();
        tick.send(()).unwrap();
        for _ in 0..50 {
            event_loop
                .dispatch(Some(Duration::from_millis(20)), &mut counts)
                .unwrap();
            if !counts.is_empty() {
                break;
            }
        }
        assert_eq!(counts.iter().sum::<u32>(), 1);

        // a closed ticker fails the pending wait
        drop(tick);
        thread.stop();
        assert!(!thread.is_running());
    }

    /// Never sees a vblank, only a cancellation ends its wait
    #[derive(Default)]
    struct Stalled(Arc<(Mutex<bool>, Condvar)>);

    impl VBlankWait for Stalled {
        fn wait_for_vblank(&mut self) -> io::Result<()> {
            let (cancelled, cvar) = &*self.0;
            let mut cancelled = cancelled.lock().unwrap();
            while !*cancelled {
                cancelled = cvar.wait(cancelled).unwrap();
            }
            Err(io::Error::new(io::ErrorKind::Interrupted, "wait cancelled"))
        }

        fn canceller(&self) -> Option<VBlankCancel> {
            let state = self.0.clone();
            Some(Box::new(move || {
                let (cancelled, cvar) = &*state;
                *cancelled.lock().unwrap() = true;
                cvar.notify_all();
            }))
        }
    }

    #[test]
    fn stop_cancels_a_blocked_wait() {
        let (mut thread, _source) = VBlankThread::spawn(Stalled::default()).unwrap();
        // let the thread block in its wait
        std::thread::sleep(Duration::from_millis(20));
        assert!(thread.is_running());

        thread.stop();
        assert!(!thread.is_running());
    }

    #[test]
    fn failing_wait_ends_thread() {
        let (tick, ticks) = channel::<()>();
        drop(tick);
        let (mut thread, _source) = VBlankThread::spawn(Ticks(ticks)).unwrap();

        thread.stop();
        assert!(!thread.is_running());
    }
}
