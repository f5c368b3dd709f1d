//! # Frame source
//!
//! Camera frames are delivered to the control loop through a `FrameSource`.
//! The loop blocks on `next_frame` and runs one control cycle per frame, so
//! it can be driven by a camera, the simulator or a test feeding frames by
//! hand.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

// Internal
use comms_if::eqpt::cam::Frame;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Frames buffered between the producer and the control loop. Any more and
/// the loop is falling behind, so frames are dropped rather than queued.
const FRAME_QUEUE_LEN: usize = 2;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

pub trait FrameSource {
    /// Block until the next frame, or return `None` once the source has
    /// stopped.
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError>;

    /// Stop producing frames. Frames already buffered are discarded.
    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A frame source fed over a channel by a producer thread.
pub struct ChannelFrameSource {
    rx: Receiver<Frame>,
    running: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
    poll: Duration,
}

/// Producer side of a `ChannelFrameSource`.
#[derive(Clone)]
pub struct FrameSender {
    tx: SyncSender<Frame>,
    running: Arc<AtomicBool>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FrameSourceError {
    #[error("The frame producer stopped unexpectedly")]
    ProducerStopped,

    #[error("The frame producer panicked")]
    ProducerPanicked,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ChannelFrameSource {
    /// Create the source and the sender its producer pushes frames into.
    ///
    /// `poll` bounds how long `next_frame` waits before rechecking whether
    /// the source has been stopped.
    pub fn new(poll: Duration) -> (Self, FrameSender) {
        let (tx, rx) = sync_channel(FRAME_QUEUE_LEN);
        let running = Arc::new(AtomicBool::new(true));

        (
            Self {
                rx,
                running: running.clone(),
                producer: None,
                poll,
            },
            FrameSender { tx, running },
        )
    }

    /// Give the source ownership of the producer thread so `stop` can join
    /// it.
    pub fn set_producer(&mut self, handle: JoinHandle<()>) {
        self.producer = Some(handle);
    }

    /// Flag shared with the producer, cleared when the source stops.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}

impl FrameSource for ChannelFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Ok(None);
            }

            match self.rx.recv_timeout(self.poll) {
                Ok(f) => return Ok(Some(f)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return if self.running.load(Ordering::SeqCst) {
                        Err(FrameSourceError::ProducerStopped)
                    } else {
                        Ok(None)
                    };
                }
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        // Unblock a producer waiting on a full queue
        while self.rx.try_recv().is_ok() {}

        if let Some(h) = self.producer.take() {
            if h.join().is_err() {
                warn!("{}", FrameSourceError::ProducerPanicked);
            }
        }

        debug!("Frame source stopped");
    }
}

impl FrameSender {
    /// Hand a frame to the control loop, dropping it if the loop is behind.
    ///
    /// Returns false once the source has stopped.
    pub fn send(&self, frame: Frame) -> bool {
        if !self.is_running() {
            return false;
        }

        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Control loop behind, dropping frame");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use std::thread;

    fn frame(n: u8) -> Frame {
        Frame {
            timestamp: Utc::now(),
            width: 1,
            height: 1,
            data: vec![n],
        }
    }

    #[test]
    fn test_frames_delivered() {
        let (mut source, sender) = ChannelFrameSource::new(Duration::from_millis(10));

        assert!(sender.send(frame(1)));
        assert!(sender.send(frame(2)));

        // Queue full, dropped
        assert!(sender.send(frame(3)));

        assert_eq!(source.next_frame().unwrap().unwrap().data, vec![1]);
        assert_eq!(source.next_frame().unwrap().unwrap().data, vec![2]);

        source.stop();
        assert!(source.next_frame().unwrap().is_none());
        assert!(!sender.send(frame(4)));
    }

    #[test]
    fn test_stop_joins_producer() {
        let (mut source, sender) = ChannelFrameSource::new(Duration::from_millis(10));

        let handle = thread::spawn(move || {
            let mut n = 0u8;
            while sender.send(frame(n)) {
                n = n.wrapping_add(1);
                thread::sleep(Duration::from_millis(1));
            }
        });
        source.set_producer(handle);

        for _ in 0..5 {
            assert!(source.next_frame().unwrap().is_some());
        }

        source.stop();
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_producer_lost() {
        let (mut source, sender) = ChannelFrameSource::new(Duration::from_millis(10));
        drop(sender);

        assert!(matches!(
            source.next_frame(),
            Err(FrameSourceError::ProducerStopped)
        ));
    }
}
