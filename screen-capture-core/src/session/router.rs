use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::media::{SessionDiagnostics, TrackKind, TrackStats};
use crate::models::sample::Sample;
use crate::sink::track_sink::{AppendOutcome, TrackSinkSet};
use crate::storage::audio_file::AudioFileWriter;
use crate::timing::adjust::adjust_time;
use crate::timing::offset::Timeline;
use crate::traits::audio_input::MicrophoneCallback;
use crate::traits::capture_source::SampleCallback;

/// Where forwarded samples end up.
#[derive(Clone)]
pub enum SampleOutput {
    /// Muxed container, one sink per track.
    Muxed(Arc<Mutex<TrackSinkSet>>),
    /// System-audio-only capture written straight to a WAV file. `None`
    /// once the file is closed.
    AudioFile(Arc<Mutex<Option<AudioFileWriter>>>),
}

/// Per-sample pipeline shared by every producer callback of a recording:
/// pause gate → timestamp adjustment → track output.
pub struct SampleRouter {
    timeline: Arc<Timeline>,
    output: SampleOutput,
    diagnostics: Mutex<SessionDiagnostics>,
}

impl SampleRouter {
    pub fn new(timeline: Arc<Timeline>, output: SampleOutput) -> Self {
        Self {
            timeline,
            output,
            diagnostics: Mutex::new(SessionDiagnostics::default()),
        }
    }

    pub fn output(&self) -> &SampleOutput {
        &self.output
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        let mut diagnostics = self.diagnostics.lock().clone();
        diagnostics.pause_count = self.timeline.pause_count();
        diagnostics
    }

    /// Callback for one track of the capture stream.
    pub fn sample_callback(self: &Arc<Self>, kind: TrackKind) -> SampleCallback {
        let router = Arc::clone(self);
        Arc::new(move |sample: Sample| router.deliver(kind, sample))
    }

    /// Tap callback for the audio input engine.
    pub fn microphone_callback(self: &Arc<Self>) -> MicrophoneCallback {
        let router = Arc::clone(self);
        Arc::new(move |samples: &[f32], sample_rate: f64, channels: u16, host_time: Duration| {
            router.deliver(
                TrackKind::Microphone,
                Sample::from_pcm_f32(samples, sample_rate, channels, host_time),
            );
        })
    }

    /// Run one sample through the pipeline. Never fails: every drop is
    /// logged and counted.
    pub fn deliver(&self, kind: TrackKind, sample: Sample) {
        let snapshot = self.timeline.snapshot();
        if snapshot.paused {
            self.record(kind, |s| s.dropped_paused += 1);
            return;
        }

        let adjusted = match adjust_time(&sample, snapshot.offset) {
            Ok(adjusted) => adjusted,
            Err(e) => {
                log::warn!("dropping {} sample: {}", kind.as_str(), e);
                self.record(kind, |s| s.dropped_malformed += 1);
                return;
            }
        };

        match &self.output {
            SampleOutput::Muxed(sinks) => {
                let outcome = sinks.lock().append(kind, &adjusted);
                self.record_outcome(kind, outcome);
            }
            SampleOutput::AudioFile(file) => {
                if kind != TrackKind::SystemAudio {
                    self.record_outcome(kind, AppendOutcome::NoSuchTrack);
                    return;
                }
                let result = match file.lock().as_mut() {
                    Some(writer) => writer.write_sample(&adjusted).map(|()| AppendOutcome::Appended),
                    None => Ok(AppendOutcome::Finished),
                };
                let outcome = result.unwrap_or_else(AppendOutcome::Failed);
                self.record_outcome(kind, outcome);
            }
        }
    }

    fn record(&self, kind: TrackKind, update: impl FnOnce(&mut TrackStats)) {
        let mut diagnostics = self.diagnostics.lock();
        let stats = diagnostics.track_mut(kind);
        stats.received += 1;
        update(stats);
    }

    fn record_outcome(&self, kind: TrackKind, outcome: AppendOutcome) {
        match outcome {
            AppendOutcome::Appended => self.record(kind, |s| s.forwarded += 1),
            AppendOutcome::NoSuchTrack | AppendOutcome::Finished => {
                log::trace!("{} sample arrived after its sink closed", kind.as_str());
                self.record(kind, |s| s.dropped_finished += 1)
            }
            AppendOutcome::NotReady => {
                log::debug!("{} input not ready, sample dropped", kind.as_str());
                self.record(kind, |s| s.dropped_not_ready += 1)
            }
            AppendOutcome::SessionNotStarted => self.record(kind, |s| s.dropped_before_session_start += 1),
            AppendOutcome::Untimed => {
                log::warn!("dropping {} sample: no timing entries", kind.as_str());
                self.record(kind, |s| s.dropped_malformed += 1)
            }
            AppendOutcome::OutOfOrder { last, got } => {
                log::debug!(
                    "dropping {} sample at {:?}: not after previous {:?}",
                    kind.as_str(),
                    got,
                    last
                );
                self.record(kind, |s| s.dropped_out_of_order += 1)
            }
            AppendOutcome::Failed(e) => {
                log_write_failure(kind, &e);
                self.record(kind, |s| s.write_failures += 1)
            }
        }
    }
}

fn log_write_failure(kind: TrackKind, error: &CaptureError) {
    log::error!("failed to write {} sample: {}", kind.as_str(), error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::ResumeAnchor;
    use crate::models::sample::SampleTiming;
    use crate::session::test_support::{frame_at, FakeWriter, WriterCall, WriterLog};

    fn secs(v: f64) -> Duration {
        Duration::from_secs_f64(v)
    }

    fn muxed_router(tracks: &[TrackKind]) -> (Arc<SampleRouter>, Arc<Timeline>, WriterLog) {
        let writer = FakeWriter::new();
        let log = writer.log();
        let timeline = Arc::new(Timeline::new(ResumeAnchor::default()));
        timeline.begin(Duration::ZERO);
        let sinks = Arc::new(Mutex::new(TrackSinkSet::new(Box::new(writer), tracks)));
        let router = Arc::new(SampleRouter::new(Arc::clone(&timeline), SampleOutput::Muxed(sinks)));
        (router, timeline, log)
    }

    #[test]
    fn paused_samples_never_reach_the_sink() {
        let (router, timeline, log) = muxed_router(&[TrackKind::Video]);
        let video = router.sample_callback(TrackKind::Video);

        video(frame_at(secs(1.0)));
        timeline.pause(secs(1.5));
        for i in 0..5 {
            video(frame_at(secs(2.0 + i as f64 * 0.1)));
        }

        let stats = router.diagnostics().video;
        assert_eq!(stats.received, 6);
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.dropped_paused, 5);
        let appends = log.calls().iter().filter(|c| matches!(c, WriterCall::Append(..))).count();
        assert_eq!(appends, 1);
    }

    #[test]
    fn forwarded_samples_are_shifted_by_offset() {
        let (router, timeline, log) = muxed_router(&[TrackKind::Video]);

        router.deliver(TrackKind::Video, frame_at(secs(4.0)));
        timeline.pause(secs(5.0));
        timeline.resume(secs(8.0));
        router.deliver(TrackKind::Video, frame_at(secs(8.5)));

        assert_eq!(
            log.calls().last(),
            Some(&WriterCall::Append(TrackKind::Video, secs(5.5)))
        );
    }

    #[test]
    fn malformed_sample_is_dropped_and_counted() {
        let (router, _timeline, log) = muxed_router(&[TrackKind::Video]);

        router.deliver(
            TrackKind::Video,
            Sample::new(None, vec![SampleTiming::at(secs(1.0))], vec![0u8; 4]),
        );

        assert_eq!(router.diagnostics().video.dropped_malformed, 1);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn microphone_tap_feeds_microphone_track() {
        let (router, _timeline, log) = muxed_router(&[TrackKind::Microphone]);
        let tap = router.microphone_callback();

        tap(&[0.0, 0.1, 0.2, 0.3], 48000.0, 2, secs(0.5));

        assert_eq!(
            log.calls(),
            vec![
                WriterCall::StartSession(secs(0.5)),
                WriterCall::Append(TrackKind::Microphone, secs(0.5)),
            ]
        );
        assert_eq!(router.diagnostics().microphone.forwarded, 1);
    }

    #[test]
    fn paused_microphone_buffer_is_counted_once() {
        let (router, timeline, log) = muxed_router(&[TrackKind::Microphone]);
        let tap = router.microphone_callback();

        timeline.pause(secs(0.2));
        tap(&[0.0; 4], 48000.0, 2, secs(0.5));

        let stats = router.diagnostics().microphone;
        assert_eq!(stats.received, 1);
        assert_eq!(stats.dropped_paused, 1);
        assert_eq!(stats.dropped(), 1);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn concurrent_producers_stay_ordered_across_pause_cycles() {
        use crate::timing::clock::{Clock, MonotonicClock};
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let (router, timeline, log) = muxed_router(&TrackKind::ALL);
        let clock = Arc::new(MonotonicClock::new());
        let running = Arc::new(AtomicBool::new(true));

        let producers: Vec<_> = TrackKind::ALL
            .into_iter()
            .map(|kind| {
                let router = Arc::clone(&router);
                let clock = Arc::clone(&clock);
                let running = Arc::clone(&running);
                thread::spawn(move || {
                    let video = router.sample_callback(TrackKind::Video);
                    let system_audio = router.sample_callback(TrackKind::SystemAudio);
                    let tap = router.microphone_callback();
                    while running.load(Ordering::SeqCst) {
                        let now = clock.now();
                        match kind {
                            TrackKind::Video => video(frame_at(now)),
                            TrackKind::SystemAudio => system_audio(Sample::from_pcm_f32(&[0.0; 4], 48000.0, 2, now)),
                            TrackKind::Microphone => tap(&[0.0; 4], 48000.0, 2, now),
                        }
                        thread::sleep(Duration::from_micros(200));
                    }
                })
            })
            .collect();

        let appended_per_track = || TrackKind::ALL.map(|kind| log.appended(kind).len());
        thread::sleep(Duration::from_millis(5));
        for _ in 0..20 {
            assert!(timeline.pause(clock.now()));
            let at_pause = appended_per_track();
            thread::sleep(Duration::from_millis(3));
            let before_resume = appended_per_track();
            assert!(timeline.resume(clock.now()).is_some());

            for i in 0..TrackKind::ALL.len() {
                assert!(
                    before_resume[i] - at_pause[i] <= 1,
                    "{} appended {} samples while paused",
                    TrackKind::ALL[i].as_str(),
                    before_resume[i] - at_pause[i]
                );
            }
            thread::sleep(Duration::from_millis(3));
        }

        running.store(false, Ordering::SeqCst);
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(router.diagnostics().pause_count, 20);
        for kind in TrackKind::ALL {
            let appended = log.appended(kind);
            assert!(!appended.is_empty(), "no {} samples appended", kind.as_str());
            assert!(
                appended.windows(2).all(|w| w[0] < w[1]),
                "{} timestamps went backwards",
                kind.as_str()
            );
        }
    }

    #[test]
    fn audio_file_output_only_takes_system_audio() {
        let path = std::env::temp_dir().join("screen_capture_test_router.wav");
        std::fs::remove_file(&path).ok();
        let timeline = Arc::new(Timeline::new(ResumeAnchor::default()));
        timeline.begin(Duration::ZERO);
        let file = Arc::new(Mutex::new(Some(AudioFileWriter::new(path.clone()))));
        let router = SampleRouter::new(timeline, SampleOutput::AudioFile(Arc::clone(&file)));

        router.deliver(
            TrackKind::SystemAudio,
            Sample::from_pcm_f32(&[0.0; 8], 48000.0, 2, secs(0.1)),
        );
        router.deliver(TrackKind::Video, frame_at(secs(0.1)));

        let diagnostics = router.diagnostics();
        assert_eq!(diagnostics.system_audio.forwarded, 1);
        assert_eq!(diagnostics.video.dropped_finished, 1);

        let mut writer = file.lock().take().unwrap();
        assert!(writer.close().unwrap());
        std::fs::remove_file(&path).ok();
    }
}
