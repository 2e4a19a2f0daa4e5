use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Larger length prefixes can only come from a corrupt tail.
const MAX_EVENT_BYTES: usize = 16 * 1024 * 1024;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read one framed entry. `Ok(None)` on clean EOF, truncation, or corruption.
fn decode_event(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_EVENT_BYTES {
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let mut crc_buf = [0u8; 4];
    match reader.read_exact(&mut crc_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }

    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Some((event, (len + 8) as u64))),
        Err(_) => Ok(None),
    }
}

/// Valid prefix of a log file.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte length of the valid prefix. Anything after it is a torn or corrupt tail.
    pub valid_len: u64,
}

/// Storage under the log. Appended to, synced, and cut back after a failed write.
pub trait LogFile: Write {
    fn sync(&self) -> io::Result<()>;
    fn truncate(&self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_all()
    }
}

/// Append-only Write-Ahead Log.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn last entry (crash mid-write) is discarded at replay and cut off at
///   open, so later appends are never stranded behind garbage.
/// - A failed flush cuts the file back to its last durable length, so frames
///   whose callers were told they failed never reach replay.
pub struct Wal<F: LogFile = File> {
    file: F,
    /// Encoded frames not yet written to `file`.
    pending: Vec<u8>,
    pending_appends: u64,
    path: PathBuf,
    /// File length covered by fully written and synced frames.
    durable_len: u64,
    /// A failed write could not be cut back. Every later write fails until compaction.
    broken: bool,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the WAL file at `path`, truncating any invalid tail.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::recover(path).map(|(wal, _)| wal)
    }

    /// Replay the valid prefix, cut any torn tail, and open for appending.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let Replay { events, valid_len } = Self::replay(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        if file.metadata()?.len() > valid_len {
            tracing::warn!(path = %path.display(), valid_len, "discarding torn WAL tail");
            LogFile::truncate(&file, valid_len)?;
        }
        Ok((Self::with_file(file, path.to_path_buf(), valid_len), events))
    }

    /// Write compacted events to a temp file and fsync.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename temp file over the WAL and reopen.
    ///
    /// The compacted file mirrors applied state only, so it also clears a
    /// broken log.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.durable_len = file.metadata()?.len();
        self.file = file;
        self.pending.clear();
        self.pending_appends = 0;
        self.broken = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Replace the WAL with a minimal set of events that recreates the current state.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Replay the WAL from disk, returning the valid prefix.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();
        while let Some((event, size)) = decode_event(&mut reader)? {
            replay.events.push(event);
            replay.valid_len += size;
        }
        Ok(replay)
    }
}

impl<F: LogFile> Wal<F> {
    /// Wrap an open log whose first `durable_len` bytes are valid frames.
    pub fn with_file(file: F, path: PathBuf, durable_len: u64) -> Self {
        Self {
            file,
            pending: Vec::new(),
            pending_appends: 0,
            path,
            durable_len,
            broken: false,
            appends_since_compact: 0,
        }
    }

    /// Append a single event to the WAL and fsync. Used by tests only;
    /// production code uses `append_buffered` + `flush_sync` for group commit.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Encode one event into the pending batch without touching the file.
    /// Call `flush_sync()` after the batch to durably commit all buffered events.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.broken {
            return Err(broken());
        }
        encode_event(&mut self.pending, event)?;
        self.pending_appends += 1;
        Ok(())
    }

    /// Write the pending batch and fsync. On failure nothing of the batch
    /// survives: the file is cut back to its last durable length.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.broken {
            return Err(broken());
        }
        let result = self
            .file
            .write_all(&self.pending)
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync());
        match result {
            Ok(()) => {
                self.durable_len += self.pending.len() as u64;
                self.appends_since_compact += self.pending_appends;
                self.pending.clear();
                self.pending_appends = 0;
                Ok(())
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn rollback(&mut self) {
        self.pending.clear();
        self.pending_appends = 0;
        if let Err(e) = self.file.truncate(self.durable_len) {
            tracing::error!(
                path = %self.path.display(),
                durable_len = self.durable_len,
                "cannot cut back failed WAL write, refusing further appends: {e}"
            );
            self.broken = true;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably written events since open or the last compaction.
    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}

fn broken() -> io::Error {
    io::Error::other("WAL unusable after a failed write could not be rolled back")
}
