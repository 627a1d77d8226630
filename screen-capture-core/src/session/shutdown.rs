use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::models::error::CaptureError;
use crate::models::media::TrackKind;
use crate::sink::track_sink::TrackSinkSet;
use crate::traits::audio_input::AudioInputEngine;

enum Slot {
    Pending,
    Done(Result<(), CaptureError>),
    Abandoned,
}

struct Signal {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Signal {
    fn settle(&self, value: Slot) {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Pending) {
            *slot = value;
            self.ready.notify_all();
        }
    }
}

/// Completion handle given to [`ContainerWriter::finish_writing`].
///
/// Fire it exactly once with the finalize result, from any thread. Dropping
/// it unfired reports the finalize as abandoned.
///
/// [`ContainerWriter::finish_writing`]: crate::traits::container_writer::ContainerWriter::finish_writing
pub struct FinalizeCompletion {
    signal: Option<Arc<Signal>>,
}

impl FinalizeCompletion {
    pub fn complete(mut self, result: Result<(), CaptureError>) {
        if let Some(signal) = self.signal.take() {
            signal.settle(Slot::Done(result));
        }
    }
}

impl Drop for FinalizeCompletion {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.settle(Slot::Abandoned);
        }
    }
}

/// Blocking side of a finalize signal.
pub struct FinalizeWaiter {
    signal: Arc<Signal>,
}

impl FinalizeWaiter {
    /// Block until the completion fires or is dropped.
    pub fn wait(self) -> Result<(), CaptureError> {
        let mut slot = self.signal.slot.lock();
        while matches!(*slot, Slot::Pending) {
            self.signal.ready.wait(&mut slot);
        }
        match std::mem::replace(&mut *slot, Slot::Abandoned) {
            Slot::Done(result) => result,
            Slot::Abandoned | Slot::Pending => {
                Err(CaptureError::WriterFailed("finalize completion dropped without a result".into()))
            }
        }
    }
}

/// One-shot pair: the writer gets the completion, the caller waits.
pub fn finalize_signal() -> (FinalizeCompletion, FinalizeWaiter) {
    let signal = Arc::new(Signal {
        slot: Mutex::new(Slot::Pending),
        ready: Condvar::new(),
    });
    (
        FinalizeCompletion {
            signal: Some(Arc::clone(&signal)),
        },
        FinalizeWaiter { signal },
    )
}

/// Drains and closes a muxed recording.
pub struct ShutdownCoordinator;

impl ShutdownCoordinator {
    /// Finish every track, detach the microphone, then finalize the
    /// container and block until it reports back.
    ///
    /// Must run on a control thread: the writer may complete on a platform
    /// callback thread, which this call waits on. The writer is dropped
    /// before returning whatever the outcome. Finalize failures come back
    /// as `RecordingSaveFailed`.
    pub fn finalize(sinks: &Mutex<TrackSinkSet>, microphone: Option<&mut dyn AudioInputEngine>) -> Result<(), CaptureError> {
        let (writer, had_microphone) = {
            let mut set = sinks.lock();
            let had_microphone = set.has_track(TrackKind::Microphone);
            (set.finish_all(), had_microphone)
        };

        if had_microphone {
            if let Some(engine) = microphone {
                engine.remove_tap();
                if let Err(e) = engine.stop() {
                    log::warn!("failed to stop audio input engine: {}", e);
                }
            }
        }

        let Some(mut writer) = writer else {
            log::warn!("finalize requested but the container was already handed off");
            return Ok(());
        };

        let (completion, waiter) = finalize_signal();
        writer.finish_writing(completion);
        let result = waiter.wait();
        drop(writer);

        result.map_err(|e| {
            log::error!("recording finalize failed: {}", e);
            match e {
                CaptureError::RecordingSaveFailed(reason) => CaptureError::RecordingSaveFailed(reason),
                other => CaptureError::RecordingSaveFailed(other.to_string()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{frame_at, FakeMicrophone, FakeWriter, FinalizeBehavior, WriterCall};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn waiter_gets_result_from_other_thread() {
        let (completion, waiter) = finalize_signal();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completion.complete(Ok(()));
        });

        assert_eq!(waiter.wait(), Ok(()));
        handle.join().unwrap();
    }

    #[test]
    fn dropped_completion_is_an_error() {
        let (completion, waiter) = finalize_signal();
        drop(completion);

        assert!(matches!(waiter.wait(), Err(CaptureError::WriterFailed(_))));
    }

    #[test]
    fn completion_before_wait_is_kept() {
        let (completion, waiter) = finalize_signal();
        completion.complete(Err(CaptureError::WriterFailed("disk full".into())));

        assert_eq!(waiter.wait(), Err(CaptureError::WriterFailed("disk full".into())));
    }

    #[test]
    fn finalize_marks_tracks_detaches_mic_then_waits() {
        let writer = FakeWriter::with_finalize(FinalizeBehavior::SucceedAfter(Duration::from_millis(50)));
        let log = writer.log();
        let sinks = Mutex::new(TrackSinkSet::new(
            Box::new(writer),
            &[TrackKind::Video, TrackKind::SystemAudio, TrackKind::Microphone],
        ));
        sinks.lock().append(TrackKind::Video, &frame_at(Duration::from_millis(1)));
        let mut mic = FakeMicrophone::new();
        let mic_feed = mic.feed();

        let started = Instant::now();
        ShutdownCoordinator::finalize(&sinks, Some(&mut mic as &mut dyn AudioInputEngine)).unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(log.finalized());
        assert!(log.dropped());
        assert!(mic_feed.tap_removed());
        assert!(mic_feed.stopped());

        let calls = log.calls();
        let finish_at = calls.iter().position(|c| *c == WriterCall::FinishWriting).unwrap();
        for kind in [TrackKind::Video, TrackKind::SystemAudio, TrackKind::Microphone] {
            let marked_at = calls.iter().position(|c| *c == WriterCall::MarkFinished(kind)).unwrap();
            assert!(marked_at < finish_at);
        }
        assert!(sinks.lock().is_closed());
    }

    #[test]
    fn finalize_failure_becomes_save_failed_and_releases_writer() {
        let writer = FakeWriter::with_finalize(FinalizeBehavior::Fail("disk full".into()));
        let log = writer.log();
        let sinks = Mutex::new(TrackSinkSet::new(Box::new(writer), &[TrackKind::Video]));

        let err = ShutdownCoordinator::finalize(&sinks, None).unwrap_err();

        assert!(matches!(err, CaptureError::RecordingSaveFailed(ref reason) if reason.contains("disk full")));
        assert!(log.dropped());
    }

    #[test]
    fn abandoned_finalize_becomes_save_failed() {
        let writer = FakeWriter::with_finalize(FinalizeBehavior::Abandon);
        let sinks = Mutex::new(TrackSinkSet::new(Box::new(writer), &[TrackKind::Video]));

        assert!(matches!(
            ShutdownCoordinator::finalize(&sinks, None),
            Err(CaptureError::RecordingSaveFailed(_))
        ));
    }

    #[test]
    fn microphone_untouched_without_mic_track() {
        let sinks = Mutex::new(TrackSinkSet::new(Box::new(FakeWriter::new()), &[TrackKind::Video]));
        let mut mic = FakeMicrophone::new();
        let mic_feed = mic.feed();

        ShutdownCoordinator::finalize(&sinks, Some(&mut mic as &mut dyn AudioInputEngine)).unwrap();

        assert!(!mic_feed.tap_removed());
        assert!(!mic_feed.stopped());
    }

    #[test]
    fn second_finalize_is_a_no_op() {
        let writer = FakeWriter::new();
        let log = writer.log();
        let sinks = Mutex::new(TrackSinkSet::new(Box::new(writer), &[TrackKind::Video]));

        ShutdownCoordinator::finalize(&sinks, None).unwrap();
        ShutdownCoordinator::finalize(&sinks, None).unwrap();

        let finishes = log.calls().iter().filter(|c| **c == WriterCall::FinishWriting).count();
        assert_eq!(finishes, 1);
    }
}
