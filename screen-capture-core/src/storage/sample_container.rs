use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::models::error::CaptureError;
use crate::models::media::TrackKind;
use crate::models::sample::Sample;
use crate::session::shutdown::FinalizeCompletion;
use crate::traits::container_writer::{ContainerWriter, ContainerWriterFactory};

const MAGIC: &[u8; 4] = b"SCKC";
const TRAILER_MAGIC: &[u8; 4] = b"SCKE";
const VERSION: u16 = 1;
const HEADER_SIZE: u64 = 16;
const SESSION_START_OFFSET: u64 = 8;
const NONE_NANOS: u64 = u64::MAX;

fn track_code(kind: TrackKind) -> u8 {
    match kind {
        TrackKind::Video => 0,
        TrackKind::SystemAudio => 1,
        TrackKind::Microphone => 2,
    }
}

fn track_from_code(code: u8) -> Option<TrackKind> {
    match code {
        0 => Some(TrackKind::Video),
        1 => Some(TrackKind::SystemAudio),
        2 => Some(TrackKind::Microphone),
        _ => None,
    }
}

fn nanos(d: Option<Duration>) -> u64 {
    d.map(|d| d.as_nanos().min(u128::from(NONE_NANOS - 1)) as u64)
        .unwrap_or(NONE_NANOS)
}

fn from_nanos(n: u64) -> Option<Duration> {
    (n != NONE_NANOS).then(|| Duration::from_nanos(n))
}

fn io_err(context: &str) -> impl Fn(std::io::Error) -> CaptureError + '_ {
    move |e| CaptureError::WriterFailed(format!("{}: {}", context, e))
}

#[derive(Debug, Clone, Copy, Default)]
struct TrackInput {
    present: bool,
    finished: bool,
    records: u64,
}

/// File-backed reference container.
///
/// Interleaves timed sample records from up to three tracks. Finalization
/// runs on a worker thread and reports through the completion handle, the
/// same contract a platform muxer has.
///
/// ```text
/// header   "SCKC" | u16 version | u8 track mask | u8 0 | u64 session start ns
/// record   u8 track | u64 pts ns | u64 dts ns | u64 duration ns | u32 len | payload
/// trailer  "SCKE" | u64 records × 3 (video, system audio, microphone)
/// ```
/// Absent timestamps are stored as `u64::MAX`. Only the first timing entry
/// of a sample is stored.
pub struct SampleContainerWriter {
    file_path: PathBuf,
    file: Option<BufWriter<File>>,
    inputs: [TrackInput; 3],
    session_start: Option<Duration>,
}

impl SampleContainerWriter {
    pub fn create(path: &Path, tracks: &[TrackKind]) -> Result<Self, CaptureError> {
        if tracks.is_empty() {
            return Err(CaptureError::ConfigurationFailed("container needs at least one track".into()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let mut inputs = [TrackInput::default(); 3];
        let mut mask = 0u8;
        for &kind in tracks {
            inputs[track_code(kind) as usize].present = true;
            mask |= 1 << track_code(kind);
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", path.display(), e)))?;
        let mut file = BufWriter::new(file);

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..4].copy_from_slice(MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_le_bytes());
        header[6] = mask;
        header[8..16].copy_from_slice(&NONE_NANOS.to_le_bytes());
        file.write_all(&header).map_err(io_err("failed to write header"))?;

        Ok(Self {
            file_path: path.to_path_buf(),
            file: Some(file),
            inputs,
            session_start: None,
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn input(&self, kind: TrackKind) -> &TrackInput {
        &self.inputs[track_code(kind) as usize]
    }

    fn finalize(mut file: BufWriter<File>, session_start: Option<Duration>, records: [u64; 3]) -> Result<(), CaptureError> {
        file.write_all(TRAILER_MAGIC).map_err(io_err("failed to write trailer"))?;
        for count in records {
            file.write_all(&count.to_le_bytes()).map_err(io_err("failed to write trailer"))?;
        }

        file.seek(SeekFrom::Start(SESSION_START_OFFSET))
            .map_err(io_err("failed to seek to header"))?;
        file.write_all(&nanos(session_start).to_le_bytes())
            .map_err(io_err("failed to patch header"))?;

        let file = file
            .into_inner()
            .map_err(|e| CaptureError::WriterFailed(format!("failed to flush container: {}", e.error())))?;
        file.sync_all().map_err(io_err("failed to sync container"))?;
        Ok(())
    }
}

impl ContainerWriter for SampleContainerWriter {
    fn start_session(&mut self, at: Duration) -> Result<(), CaptureError> {
        if self.session_start.is_some() {
            return Err(CaptureError::WriterFailed("session already started".into()));
        }
        self.session_start = Some(at);
        Ok(())
    }

    fn is_ready_for_more_data(&self, kind: TrackKind) -> bool {
        let input = self.input(kind);
        self.file.is_some() && input.present && !input.finished
    }

    fn append(&mut self, kind: TrackKind, sample: &Sample) -> Result<(), CaptureError> {
        if self.session_start.is_none() {
            return Err(CaptureError::WriterFailed("append before session start".into()));
        }
        if !self.is_ready_for_more_data(kind) {
            return Err(CaptureError::WriterFailed(format!("{} input is not accepting samples", kind.as_str())));
        }
        let timing = sample
            .timing()
            .first()
            .ok_or_else(|| CaptureError::WriterFailed("sample has no timing".into()))?;
        let payload = sample.payload();
        let len = u32::try_from(payload.len())
            .map_err(|_| CaptureError::WriterFailed(format!("sample payload too large: {} bytes", payload.len())))?;

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::WriterFailed("container is closed".into()))?;

        let mut record = Vec::with_capacity(29 + payload.len());
        record.push(track_code(kind));
        record.extend_from_slice(&nanos(Some(timing.presentation)).to_le_bytes());
        record.extend_from_slice(&nanos(timing.decode).to_le_bytes());
        record.extend_from_slice(&nanos(timing.duration).to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(payload);
        file.write_all(&record).map_err(io_err("failed to write sample"))?;

        self.inputs[track_code(kind) as usize].records += 1;
        Ok(())
    }

    fn mark_finished(&mut self, kind: TrackKind) {
        self.inputs[track_code(kind) as usize].finished = true;
    }

    fn finish_writing(&mut self, completion: FinalizeCompletion) {
        let Some(file) = self.file.take() else {
            completion.complete(Err(CaptureError::WriterFailed("container already finalized".into())));
            return;
        };
        let session_start = self.session_start;
        let records = self.inputs.map(|i| i.records);
        let path = self.file_path.clone();

        let spawned = thread::Builder::new()
            .name("container-finalize".into())
            .spawn(move || {
                let result = Self::finalize(file, session_start, records);
                match &result {
                    Ok(()) => log::debug!("finalized container {}", path.display()),
                    Err(e) => log::error!("failed to finalize container {}: {}", path.display(), e),
                }
                completion.complete(result);
            });
        if let Err(e) = spawned {
            // The completion moved into the closure and is dropped with it,
            // which the waiting side observes as an abandoned finalize.
            log::error!("failed to spawn finalize thread: {}", e);
        }
    }
}

/// Factory for [`SampleContainerWriter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleContainerFactory;

impl ContainerWriterFactory for SampleContainerFactory {
    fn file_extension(&self) -> &str {
        "sckc"
    }

    fn create(&self, path: &Path, tracks: &[TrackKind]) -> Result<Box<dyn ContainerWriter>, CaptureError> {
        Ok(Box::new(SampleContainerWriter::create(path, tracks)?))
    }
}

/// One stored sample record, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerRecord {
    pub track: TrackKind,
    pub presentation: Duration,
    pub decode: Option<Duration>,
    pub duration: Option<Duration>,
    pub payload_len: u32,
}

/// Contents of a finalized container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub tracks: Vec<TrackKind>,
    pub session_start: Option<Duration>,
    pub records: Vec<ContainerRecord>,
}

impl ContainerSummary {
    pub fn records_for(&self, track: TrackKind) -> impl Iterator<Item = &ContainerRecord> {
        self.records.iter().filter(move |r| r.track == track)
    }
}

/// Read back a finalized container. Fails on files that were never
/// finalized.
pub fn read_container(path: &Path) -> Result<ContainerSummary, CaptureError> {
    let file = File::open(path).map_err(|e| CaptureError::StorageError(format!("failed to open container: {}", e)))?;
    let mut reader = BufReader::new(file);
    let corrupt = |what: &str| CaptureError::StorageError(format!("corrupt container: {}", what));

    let mut header = [0u8; HEADER_SIZE as usize];
    reader.read_exact(&mut header).map_err(|_| corrupt("short header"))?;
    if &header[0..4] != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let mask = header[6];
    let tracks = TrackKind::ALL
        .into_iter()
        .filter(|&k| mask & (1 << track_code(k)) != 0)
        .collect();
    let session_start = from_nanos(u64::from_le_bytes(header[8..16].try_into().map_err(|_| corrupt("header"))?));

    let mut records = Vec::new();
    loop {
        let mut tag = [0u8; 1];
        reader.read_exact(&mut tag).map_err(|_| corrupt("missing trailer"))?;
        if tag[0] == TRAILER_MAGIC[0] {
            let mut rest = [0u8; 3];
            reader.read_exact(&mut rest).map_err(|_| corrupt("short trailer"))?;
            if rest != TRAILER_MAGIC[1..] {
                return Err(corrupt("bad trailer"));
            }
            break;
        }

        let track = track_from_code(tag[0]).ok_or_else(|| corrupt("unknown track"))?;
        let mut fixed = [0u8; 28];
        reader.read_exact(&mut fixed).map_err(|_| corrupt("short record"))?;
        let field = |at: usize| u64::from_le_bytes(fixed[at..at + 8].try_into().unwrap_or([0; 8]));
        let payload_len = u32::from_le_bytes(fixed[24..28].try_into().unwrap_or([0; 4]));

        let mut payload = vec![0u8; payload_len as usize];
        reader.read_exact(&mut payload).map_err(|_| corrupt("short payload"))?;

        records.push(ContainerRecord {
            track,
            presentation: Duration::from_nanos(field(0)),
            decode: from_nanos(field(8)),
            duration: from_nanos(field(16)),
            payload_len,
        });
    }

    Ok(ContainerSummary {
        tracks,
        session_start,
        records,
    })
}
