//! PCM fragments, their assembly into one container, and atomic WAV output.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::PipelineError;

pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;
pub const OUTPUT_PREFIX: &str = "interview_";
pub const OUTPUT_EXTENSION: &str = "wav";

/// Sample layout of raw little-endian integer PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for AudioFormat {
    /// Mono, 16-bit, 24 kHz.
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

impl AudioFormat {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Parse a raw-PCM MIME type such as `audio/L16;codec=pcm;rate=24000`.
    ///
    /// Returns `None` for anything that is not 16-bit linear PCM. Missing
    /// `rate`/`channels` parameters take the defaults.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mut parts = mime.split(';').map(str::trim);
        let essence = parts.next()?.to_ascii_lowercase();
        if essence != "audio/l16" && essence != "audio/pcm" {
            return None;
        }

        let mut format = Self::default();
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "rate" => format.sample_rate = value.trim().parse().ok().filter(|r| *r > 0)?,
                "channels" => format.channels = value.trim().parse().ok().filter(|c| *c > 0)?,
                _ => {}
            }
        }
        Some(format)
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

/// Raw sample bytes plus the layout they are in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    pub format: AudioFormat,
    pub pcm: Vec<u8>,
}

/// One synthesis result tied to the utterance it renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFragment {
    pub sequence_index: usize,
    pub payload: AudioPayload,
}

/// Final audio: one format, one concatenated sample body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioContainer {
    pub format: AudioFormat,
    pub pcm: Vec<u8>,
}

impl AudioContainer {
    pub fn frame_count(&self) -> usize {
        self.pcm.len() / self.format.bytes_per_frame()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.frame_count() as u64 * 1000) / self.format.sample_rate as u64
    }

    /// Write a RIFF/WAVE file with a header describing `self.format`.
    pub fn write_wav<W: Write + Seek>(&self, writer: W) -> hound::Result<()> {
        let mut wav = hound::WavWriter::new(writer, self.format.wav_spec())?;
        {
            let mut samples = wav.get_i16_writer((self.pcm.len() / 2) as u32);
            for pair in self.pcm.chunks_exact(2) {
                samples.write_sample(i16::from_le_bytes([pair[0], pair[1]]));
            }
            samples.flush()?;
        }
        wav.finalize()
    }
}

/// Outcome of assembling fragments into a container.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub container: AudioContainer,
    pub used_fragments: usize,
    pub skipped_fragments: usize,
}

/// Concatenate fragments in `sequence_index` order.
///
/// The first non-empty fragment fixes the container format; empty fragments
/// and fragments in another format are skipped. A trailing partial frame is
/// cut so every fragment stays frame-aligned.
pub fn assemble(mut fragments: Vec<AudioFragment>) -> Result<Assembly, PipelineError> {
    fragments.sort_by_key(|f| f.sequence_index);

    let mut format: Option<AudioFormat> = None;
    let mut pcm = Vec::new();
    let mut used = 0usize;
    let mut skipped = 0usize;

    for fragment in fragments {
        let payload = fragment.payload;
        let frame = payload.format.bytes_per_frame();
        let usable = if frame == 0 {
            0
        } else {
            payload.pcm.len() - payload.pcm.len() % frame
        };
        if usable == 0 {
            tracing::warn!(sequence_index = fragment.sequence_index, "skipping empty audio fragment");
            skipped += 1;
            continue;
        }

        match format {
            None => format = Some(payload.format),
            Some(f) if f != payload.format => {
                tracing::warn!(
                    sequence_index = fragment.sequence_index,
                    expected_rate = f.sample_rate,
                    got_rate = payload.format.sample_rate,
                    "skipping audio fragment with mismatched format"
                );
                skipped += 1;
                continue;
            }
            Some(_) => {}
        }

        pcm.extend_from_slice(&payload.pcm[..usable]);
        used += 1;
    }

    let format = format.ok_or(PipelineError::NoAudioProduced)?;
    Ok(Assembly {
        container: AudioContainer { format, pcm },
        used_fragments: used,
        skipped_fragments: skipped,
    })
}

/// A container written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredAudio {
    pub file_name: String,
    pub path: PathBuf,
}

/// Output directory for finished containers.
///
/// Files are written to a temporary file in the same directory and renamed
/// into place, so a reader never sees a partially written container.
#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the directory (and parents) if missing.
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a bare file name inside the store, rejecting anything else.
    pub fn path_for(&self, file_name: &str) -> Option<PathBuf> {
        let is_plain = !file_name.is_empty()
            && !file_name.contains(['/', '\\'])
            && file_name != "."
            && file_name != "..";
        is_plain.then(|| self.dir.join(file_name))
    }

    /// Write `container` unless `cancelled` is set before the final rename.
    pub fn save(
        &self,
        container: &AudioContainer,
        cancelled: &AtomicBool,
    ) -> Result<StoredAudio, PipelineError> {
        self.write_atomic_unless(
            |file| {
                container
                    .write_wav(BufWriter::new(file))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            },
            cancelled,
        )
    }

    /// Run `write` against a temporary file, then rename it to a fresh
    /// `interview_<unix_timestamp>.wav`. On any error the temporary file is
    /// removed and nothing appears under the final name.
    pub fn write_atomic<F>(&self, write: F) -> Result<StoredAudio, PipelineError>
    where
        F: FnOnce(&mut File) -> std::io::Result<()>,
    {
        self.write_atomic_unless(write, &AtomicBool::new(false))
    }

    /// Like [`write_atomic`](Self::write_atomic), but the temporary file is
    /// dropped instead of renamed once `cancelled` is set.
    pub fn write_atomic_unless<F>(
        &self,
        write: F,
        cancelled: &AtomicBool,
    ) -> Result<StoredAudio, PipelineError>
    where
        F: FnOnce(&mut File) -> std::io::Result<()>,
    {
        let storage_err = |e: std::io::Error| PipelineError::StorageWriteFailed(e.to_string());

        self.ensure_dir().map_err(storage_err)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".interview_")
            .suffix(".wav.part")
            .tempfile_in(&self.dir)
            .map_err(storage_err)?;

        write(tmp.as_file_mut()).map_err(storage_err)?;
        tmp.as_file().sync_all().map_err(storage_err)?;

        if cancelled.load(Ordering::SeqCst) {
            return Err(PipelineError::StorageWriteFailed("write cancelled".into()));
        }
        self.persist_unique(tmp, chrono::Utc::now().timestamp())
    }

    /// Rename into place without clobbering an existing container. A second
    /// run in the same second gets `interview_<ts>_<n>.wav`.
    fn persist_unique(&self, mut tmp: NamedTempFile, timestamp: i64) -> Result<StoredAudio, PipelineError> {
        const MAX_ATTEMPTS: usize = 1000;

        for attempt in 0..MAX_ATTEMPTS {
            let file_name = if attempt == 0 {
                format!("{OUTPUT_PREFIX}{timestamp}.{OUTPUT_EXTENSION}")
            } else {
                format!("{OUTPUT_PREFIX}{timestamp}_{attempt}.{OUTPUT_EXTENSION}")
            };
            let path = self.dir.join(&file_name);
            match tmp.persist_noclobber(&path) {
                Ok(_) => return Ok(StoredAudio { file_name, path }),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => tmp = e.file,
                Err(e) => return Err(PipelineError::StorageWriteFailed(e.error.to_string())),
            }
        }
        Err(PipelineError::StorageWriteFailed(format!(
            "no free output name for timestamp {timestamp}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn fragment(index: usize, samples: &[i16]) -> AudioFragment {
        AudioFragment {
            sequence_index: index,
            payload: AudioPayload {
                format: AudioFormat::default(),
                pcm: pcm(samples),
            },
        }
    }

    #[test]
    fn test_format_from_mime() {
        assert_eq!(
            AudioFormat::from_mime("audio/L16;codec=pcm;rate=24000"),
            Some(AudioFormat::default())
        );
        assert_eq!(
            AudioFormat::from_mime("audio/L16; rate=16000").map(|f| f.sample_rate),
            Some(16_000)
        );
        assert_eq!(AudioFormat::from_mime("audio/pcm"), Some(AudioFormat::default()));
        assert_eq!(AudioFormat::from_mime("audio/mpeg"), None);
        assert_eq!(AudioFormat::from_mime("audio/L16;rate=abc"), None);
        assert_eq!(AudioFormat::from_mime("text/plain"), None);
    }

    #[test]
    fn test_assemble_orders_by_sequence_index() {
        let assembly = assemble(vec![fragment(2, &[3]), fragment(0, &[1]), fragment(1, &[2])]).unwrap();
        assert_eq!(assembly.container.pcm, pcm(&[1, 2, 3]));
        assert_eq!(assembly.used_fragments, 3);
        assert_eq!(assembly.skipped_fragments, 0);
    }

    #[test]
    fn test_assemble_skips_empty_and_mismatched() {
        let mut odd = fragment(1, &[]);
        odd.payload.format.sample_rate = 16_000;
        odd.payload.pcm = pcm(&[9, 9]);

        let assembly = assemble(vec![fragment(0, &[]), odd, fragment(2, &[5, 6]), fragment(3, &[7])]).unwrap();
        // 0 is empty, so 1 fixes 16 kHz and 2/3 mismatch
        assert_eq!(assembly.container.format.sample_rate, 16_000);
        assert_eq!(assembly.container.pcm, pcm(&[9, 9]));
        assert_eq!(assembly.used_fragments, 1);
        assert_eq!(assembly.skipped_fragments, 3);
    }

    #[test]
    fn test_assemble_trims_partial_frame() {
        let mut f = fragment(0, &[1, 2]);
        f.payload.pcm.push(0x7f);
        let assembly = assemble(vec![f, fragment(1, &[3])]).unwrap();
        assert_eq!(assembly.container.pcm, pcm(&[1, 2, 3]));
    }

    #[test]
    fn test_assemble_nothing_usable() {
        assert!(matches!(assemble(vec![]), Err(PipelineError::NoAudioProduced)));
        let mut f = fragment(0, &[]);
        f.payload.pcm = vec![1];
        assert!(matches!(assemble(vec![f]), Err(PipelineError::NoAudioProduced)));
    }

    #[test]
    fn test_write_wav_header() {
        let container = AudioContainer {
            format: AudioFormat::default(),
            pcm: pcm(&[0, 100, -100, i16::MAX]),
        };
        let mut buf = Cursor::new(Vec::new());
        container.write_wav(&mut buf).unwrap();

        let bytes = buf.into_inner();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_rate, 24_000);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 100, -100, i16::MAX]);
    }

    #[test]
    fn test_duration() {
        let container = AudioContainer {
            format: AudioFormat::default(),
            pcm: vec![0; 48_000],
        };
        assert_eq!(container.frame_count(), 24_000);
        assert_eq!(container.duration_ms(), 1000);
    }

    #[test]
    fn test_path_for_rejects_traversal() {
        let store = AudioStore::new("/srv/audio");
        assert_eq!(
            store.path_for("interview_1.wav"),
            Some(PathBuf::from("/srv/audio/interview_1.wav"))
        );
        assert_eq!(store.path_for("../secret"), None);
        assert_eq!(store.path_for("a/b.wav"), None);
        assert_eq!(store.path_for("a\\b.wav"), None);
        assert_eq!(store.path_for(".."), None);
        assert_eq!(store.path_for(""), None);
    }

    #[test]
    fn test_persist_unique_does_not_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path());

        let first = NamedTempFile::new_in(dir.path()).unwrap();
        let a = store.persist_unique(first, 1_700_000_000).unwrap();
        let second = NamedTempFile::new_in(dir.path()).unwrap();
        let b = store.persist_unique(second, 1_700_000_000).unwrap();

        assert_eq!(a.file_name, "interview_1700000000.wav");
        assert_eq!(b.file_name, "interview_1700000000_1.wav");
        assert!(a.path.exists() && b.path.exists());
    }

    #[test]
    fn test_cancelled_write_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path());

        let err = store
            .write_atomic_unless(|file| file.write_all(b"RIFF"), &AtomicBool::new(true))
            .unwrap_err();

        assert!(matches!(err, PipelineError::StorageWriteFailed(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
