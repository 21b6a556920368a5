use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use pok_types::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::traits::{EntryLog, Recovery};

/// Flush/sync strategy for the log file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every write. Required for the ledger's durability
    /// guarantee.
    #[default]
    EveryWrite,
    /// Flush to the OS page cache only. Intended for tests and scratch
    /// ledgers.
    OsDefault,
}

/// Configuration for a [`FileLog`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
pub(crate) const HEADER_SIZE: u64 = 8;

/// Bincode size of an `Entry` apart from its payload bytes: index,
/// timestamp, payload length prefix and two hashes.
const ENTRY_FIXED_LEN: u64 = 8 + 8 + 8 + 32 + 32;

/// End of the payload length prefix within a frame body.
const PAYLOAD_LEN_END: usize = 24;

/// Largest body a frame may declare.
pub const MAX_FRAME_LEN: u64 = ENTRY_FIXED_LEN + u16::MAX as u64;

/// Internal mutable state for the log writer.
struct LogWriter {
    file: File,
    /// Current end of the durable data.
    offset: u64,
}

/// File-backed entry log.
///
/// On-disk format, repeated per entry:
/// ```text
/// [4 bytes: frame length (little-endian u32)]
/// [4 bytes: CRC32 of frame (little-endian u32)]
/// [N bytes: bincode-serialized Entry]
/// ```
pub struct FileLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    config: LogConfig,
}

impl FileLog {
    /// Open (or create) the log file at the given path.
    pub fn open(path: &Path, config: LogConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter { file, offset }),
            config,
        })
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, LogWriter>> {
        self.writer.lock().map_err(|_| StoreError::Poisoned)
    }

    fn frame(entry: &Entry, buf: &mut Vec<u8>) -> Result<()> {
        let body =
            bincode::serialize(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if body.len() as u64 > MAX_FRAME_LEN {
            return Err(StoreError::FrameTooLarge {
                size: body.len(),
                max: MAX_FRAME_LEN as usize,
            });
        }
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(())
    }

    fn write_at_end(&self, w: &mut LogWriter, frames: &[u8]) -> io::Result<()> {
        w.file.seek(SeekFrom::Start(w.offset))?;
        w.file.write_all(frames)?;
        w.file.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            w.file.sync_data()?;
        }
        Ok(())
    }
}

impl EntryLog for FileLog {
    fn append_batch(&self, entries: &[Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        // Encode everything before touching the file so a serialization
        // failure cannot leave a partial batch behind.
        let mut frames = Vec::new();
        for entry in entries {
            Self::frame(entry, &mut frames)?;
        }

        let mut w = self.lock()?;
        let start = w.offset;
        if let Err(e) = self.write_at_end(&mut w, &frames) {
            warn!(offset = start, error = %e, "log write failed; rolling back");
            w.file.set_len(start)?;
            w.file.sync_data()?;
            return Err(e.into());
        }
        w.offset = start + frames.len() as u64;

        debug!(offset = start, count = entries.len(), len = frames.len(), "log append");
        Ok(())
    }

    fn recover(&self) -> Result<Recovery> {
        let mut w = self.lock()?;
        let file_len = w.file.metadata()?.len();
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut recovery = Recovery::default();
        let mut offset: u64 = 0;

        while offset < file_len {
            let record = recovery.entries.len() as u64;
            if offset + HEADER_SIZE > file_len {
                recovery.torn_bytes = file_len - offset;
                break;
            }

            let mut header = [0u8; HEADER_SIZE as usize];
            reader.read_exact(&mut header)?;
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || u64::from(length) > MAX_FRAME_LEN {
                warn!(offset, record, length, "implausible log frame length");
                recovery.corrupt_at = Some(record);
                break;
            }
            if offset + HEADER_SIZE + u64::from(length) > file_len {
                let available = file_len - offset - HEADER_SIZE;
                if is_torn_frame(&mut reader, length, available)? {
                    recovery.torn_bytes = file_len - offset;
                } else {
                    warn!(
                        offset,
                        record,
                        length,
                        available,
                        "log frame length disagrees with its body; stopping recovery"
                    );
                    recovery.corrupt_at = Some(record);
                }
                break;
            }

            let mut body = vec![0u8; length as usize];
            reader.read_exact(&mut body)?;

            let actual_crc = crc32fast::hash(&body);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    record,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch in log; stopping recovery"
                );
                recovery.corrupt_at = Some(record);
                break;
            }

            match bincode::deserialize::<Entry>(&body) {
                Ok(entry) => recovery.entries.push(entry),
                Err(e) => {
                    warn!(offset, record, error = %e, "undecodable log frame; stopping recovery");
                    recovery.corrupt_at = Some(record);
                    break;
                }
            }

            offset += HEADER_SIZE + length as u64;
        }

        if recovery.torn_bytes > 0 {
            // A torn tail was never acknowledged to a caller; drop it so the
            // next append starts on a frame boundary.
            warn!(offset, torn = recovery.torn_bytes, "truncating torn log tail");
            w.file.set_len(offset)?;
            w.file.sync_data()?;
            w.offset = offset;
        }

        debug!(
            recovered = recovery.entries.len(),
            corrupt_at = ?recovery.corrupt_at,
            "log recovery complete"
        );
        Ok(recovery)
    }

    fn truncate(&self) -> Result<()> {
        let mut w = self.lock()?;
        w.file.set_len(0)?;
        w.file.sync_data()?;
        w.offset = 0;
        debug!("log truncated");
        Ok(())
    }

    fn len_bytes(&self) -> Result<u64> {
        Ok(self.lock()?.offset)
    }
}

/// Whether a frame running past the end of the file is an interrupted last
/// write rather than a damaged length field.
///
/// Once the payload length prefix made it to disk, the declared frame length
/// must agree with it.
fn is_torn_frame(reader: &mut impl Read, length: u32, available: u64) -> io::Result<bool> {
    if available < PAYLOAD_LEN_END as u64 {
        return Ok(true);
    }
    let mut prefix = [0u8; PAYLOAD_LEN_END];
    reader.read_exact(&mut prefix)?;
    let mut payload_len = [0u8; 8];
    payload_len.copy_from_slice(&prefix[PAYLOAD_LEN_END - 8..]);
    let expected = ENTRY_FIXED_LEN.checked_add(u64::from_le_bytes(payload_len));
    Ok(expected == Some(u64::from(length)))
}
