//! Record-stream caching for lazily produced sequences
//!
//! Instead of materializing a whole collection into one blob, elements are
//! appended to an on-disk record stream as the source iterator produces
//! them, so consumption can start before the sequence finishes and
//! serialization never holds the full collection in memory. Frames are
//! u32-LE length-prefixed bincode payloads; each frame is flushed as it is
//! written, so a second reader can follow the stream sequentially while the
//! writer is still appending.
//!
//! Recording happens in a temp file that is published onto the canonical
//! path only on exhaustion of the source; a recording abandoned mid-way is
//! discarded. File existence therefore marks a complete, replayable hit.

use super::disk::{publish, temp_sibling};
use super::CacheStats;
use crate::core::{CacheError, CacheKey, Result};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Iterable cache layout
#[derive(Debug, Clone)]
pub struct IterableCacheConfig {
    /// Directory holding the record streams
    pub root: PathBuf,
    /// File extension for record streams
    pub suffix: String,
}

impl Default for IterableCacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./cache/sequences"),
            suffix: "seq".to_string(),
        }
    }
}

/// Caches arbitrarily long sequences element-by-element
#[derive(Clone)]
pub struct IterableCache {
    config: IterableCacheConfig,
    stats: Arc<RwLock<CacheStats>>,
}

impl IterableCache {
    /// Create or open an iterable cache rooted at `config.root`
    pub fn new(config: IterableCacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        info!("opening iterable cache at {:?}", config.root);
        Ok(Self {
            config,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        })
    }

    /// Canonical stream path for a key digest
    pub fn stream_path(&self, digest: &str) -> PathBuf {
        self.config
            .root
            .join(format!("{digest}.{}", self.config.suffix))
    }

    /// Fetch-or-record: replay the cached stream on a hit, otherwise record
    /// the iterator produced by `source` while passing its elements through.
    /// `source` is only invoked on a miss.
    pub fn fetch<V, I, F>(&self, key: &CacheKey, source: F) -> Result<RecordStream<V, I>>
    where
        V: Serialize + DeserializeOwned,
        I: Iterator<Item = V>,
        F: FnOnce() -> I,
    {
        let digest = key.digest();
        let target = self.stream_path(&digest);

        match File::open(&target) {
            Ok(file) => {
                self.stats.write().record_hit();
                debug!("replaying cached sequence {digest}");
                Ok(RecordStream::replay(file, target))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.stats.write().record_miss();
                let iter = source();
                let tmp = temp_sibling(&target);
                match File::create(&tmp) {
                    Ok(file) => Ok(RecordStream::record(iter, file, tmp, target)),
                    Err(e) => {
                        // Degrade to an uncached pass-through of the source.
                        warn!("failed to stage sequence {digest}: {e}");
                        Ok(RecordStream::passthrough(iter))
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replay a record stream directly from a path, without the hit/miss
    /// protocol. Useful for following a stream another process is writing.
    pub fn replay_path<V>(path: &Path) -> Result<RecordStream<V, std::iter::Empty<V>>>
    where
        V: Serialize + DeserializeOwned,
    {
        let file = File::open(path)?;
        Ok(RecordStream::replay(file, path.to_path_buf()))
    }

    /// True if a complete stream exists for the key
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.stream_path(&key.digest()).exists()
    }

    /// Remove a cached stream. Deleting an absent key is an error.
    pub fn delete_key(&self, key: &CacheKey) -> Result<()> {
        let digest = key.digest();
        match fs::remove_file(self.stream_path(&digest)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheError::KeyNotFound(digest))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Hit/miss counters
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

enum StreamState<I> {
    /// Streaming frames back from a completed record file
    Replay {
        reader: BufReader<File>,
        path: PathBuf,
    },
    /// Pulling from the source while appending frames to a staged file
    Record {
        source: I,
        writer: BufWriter<File>,
        tmp: PathBuf,
        target: PathBuf,
    },
    /// Recording failed; elements flow through uncached
    PassThrough { source: I },
    Done,
}

/// Iterator returned by [`IterableCache::fetch`]
pub struct RecordStream<V, I> {
    state: StreamState<I>,
    _value: PhantomData<fn() -> V>,
}

impl<V, I> RecordStream<V, I>
where
    V: Serialize + DeserializeOwned,
    I: Iterator<Item = V>,
{
    fn replay(file: File, path: PathBuf) -> Self {
        Self {
            state: StreamState::Replay {
                reader: BufReader::new(file),
                path,
            },
            _value: PhantomData,
        }
    }

    fn record(source: I, file: File, tmp: PathBuf, target: PathBuf) -> Self {
        Self {
            state: StreamState::Record {
                source,
                writer: BufWriter::new(file),
                tmp,
                target,
            },
            _value: PhantomData,
        }
    }

    fn passthrough(source: I) -> Self {
        Self {
            state: StreamState::PassThrough { source },
            _value: PhantomData,
        }
    }

    /// True while elements are being recorded rather than replayed
    pub fn is_recording(&self) -> bool {
        matches!(self.state, StreamState::Record { .. })
    }
}

impl<V, I> Iterator for RecordStream<V, I>
where
    V: Serialize + DeserializeOwned,
    I: Iterator<Item = V>,
{
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            StreamState::Replay { reader, path } => match read_frame(reader) {
                Ok(Some(bytes)) => Some(
                    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                        .map(|(value, _)| value)
                        .map_err(|e| {
                            CacheError::CorruptEntry(format!("{}: {e}", path.display()))
                        }),
                ),
                Ok(None) => {
                    self.state = StreamState::Done;
                    None
                }
                Err(e) => {
                    let err = match e {
                        CacheError::CorruptEntry(msg) => {
                            CacheError::CorruptEntry(format!("{}: {msg}", path.display()))
                        }
                        other => other,
                    };
                    self.state = StreamState::Done;
                    Some(Err(err))
                }
            },
            StreamState::Record { .. } => {
                let StreamState::Record {
                    mut source,
                    mut writer,
                    tmp,
                    target,
                } = std::mem::replace(&mut self.state, StreamState::Done)
                else {
                    unreachable!();
                };
                match source.next() {
                    Some(value) => {
                        if let Err(e) = write_frame(&mut writer, &value) {
                            // Stop recording but keep serving the source; the
                            // cache degrades to a miss on the next fetch.
                            warn!("recording failed for {:?}: {e}", target);
                            let _ = fs::remove_file(&tmp);
                            self.state = StreamState::PassThrough { source };
                        } else {
                            self.state = StreamState::Record {
                                source,
                                writer,
                                tmp,
                                target,
                            };
                        }
                        Some(Ok(value))
                    }
                    None => {
                        if let Err(e) = finalize(writer, &tmp, &target) {
                            warn!("failed to publish sequence {:?}: {e}", target);
                            let _ = fs::remove_file(&tmp);
                        }
                        None
                    }
                }
            }
            StreamState::PassThrough { source } => source.next().map(Ok),
            StreamState::Done => None,
        }
    }
}

impl<V, I> Drop for RecordStream<V, I> {
    fn drop(&mut self) {
        // An unexhausted recording must never become a (partial) hit.
        if let StreamState::Record { tmp, .. } = &self.state {
            let _ = fs::remove_file(tmp);
        }
    }
}

fn finalize(mut writer: BufWriter<File>, tmp: &Path, target: &Path) -> Result<()> {
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| CacheError::StoreUnavailable(e.to_string()))?
        .sync_all()?;
    publish(tmp, target)
}

fn write_frame<V: Serialize>(writer: &mut BufWriter<File>, value: &V) -> Result<()> {
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| CacheError::Serialization(e.to_string()))?;
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    // Flush per frame so a second reader can follow the stream.
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame. `Ok(None)` is a clean end-of-stream; a
/// partial header or body is a framing error.
fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CacheError::CorruptEntry("truncated frame header".into()));
        }
        filled += n;
    }
    let len = u32::from_le_bytes(header) as usize;
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .map_err(|_| CacheError::CorruptEntry("truncated frame body".into()))?;
    Ok(Some(body))
}
