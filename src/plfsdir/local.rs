//! Local log-structured write-only backend.
//!
//! `LogDir` buffers appended records up to the configured data-buffer
//! size and spills them to numbered per-rank log files under the
//! shared directory. Epoch flush seals the epoch with a per-rank seal
//! file; finish writes a footer with run totals. With log rotation
//! enabled each epoch gets its own log file. This is deliberately
//! simple glue: indexing, filtering and compaction are the real
//! storage engine's business, not the harness's.
//!
//! Record framing inside a log file, little-endian:
//! `[u16 name_len][u32 epoch][u32 value_len][name][value]`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{
    tracing_error_sink, DirConfig, DirError, DirResult, ErrorSink, PlfsDir, RemoteEnv,
    WorkerPool,
};

/// Framed record header size: name_len (2) + epoch (4) + value_len (4).
const RECORD_HEADER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirState {
    Created,
    Open,
    Finished,
}

/// One rank's write-only handle over a directory on a shared
/// filesystem.
pub struct LogDir {
    config: DirConfig,
    state: DirState,
    root: PathBuf,
    env: Option<RemoteEnv>,
    pool: Option<Arc<WorkerPool>>,
    error_sink: ErrorSink,
    background_failure: Arc<Mutex<Option<String>>>,
    // Serializes background spills; append-mode writes from two
    // workers must not interleave inside a record.
    log_lock: Arc<Mutex<()>>,

    buf: Vec<u8>,
    log_no: u32,
    current_epoch: u32,
    epoch_records: u64,
    epoch_value_bytes: u64,
    total_records: u64,
    total_value_bytes: u64,
}

impl LogDir {
    /// Create a handle from its configuration record. The handle is
    /// not usable until [`PlfsDir::open`].
    pub fn create(config: DirConfig) -> Self {
        let buf = Vec::with_capacity(config.data_buffer);
        Self {
            config,
            state: DirState::Created,
            root: PathBuf::new(),
            env: None,
            pool: None,
            error_sink: tracing_error_sink(),
            background_failure: Arc::new(Mutex::new(None)),
            log_lock: Arc::new(Mutex::new(())),
            buf,
            log_no: 0,
            current_epoch: 0,
            epoch_records: 0,
            epoch_value_bytes: 0,
            total_records: 0,
            total_value_bytes: 0,
        }
    }

    /// Attach the background worker pool. Must happen before open.
    pub fn set_thread_pool(&mut self, pool: Arc<WorkerPool>) {
        debug_assert_eq!(self.state, DirState::Created);
        self.pool = Some(pool);
    }

    /// Attach the remote-storage environment. Must happen before open.
    pub fn set_env(&mut self, env: RemoteEnv) {
        debug_assert_eq!(self.state, DirState::Created);
        self.env = Some(env);
    }

    /// Register the callback receiving storage-internal error text.
    pub fn set_error_sink(&mut self, sink: ErrorSink) {
        self.error_sink = sink;
    }

    /// Records appended through this handle so far.
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    /// Value bytes appended through this handle so far.
    pub fn total_value_bytes(&self) -> u64 {
        self.total_value_bytes
    }

    fn rank(&self) -> u32 {
        self.config.rank
    }

    fn log_path(&self) -> PathBuf {
        self.root
            .join(format!("l-r{:08x}-{:04x}.log", self.rank(), self.log_no))
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(format!("MANIFEST-r{:08x}", self.rank()))
    }

    fn seal_path(&self, epoch: u32) -> PathBuf {
        self.root
            .join(format!("seal-r{:08x}-e{:08x}", self.rank(), epoch))
    }

    fn footer_path(&self) -> PathBuf {
        self.root.join(format!("FOOTER-r{:08x}", self.rank()))
    }

    /// Hand the pending buffer to the pool, or write it inline when no
    /// pool is attached.
    fn spill_buffer(&mut self) -> DirResult<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::take(&mut self.buf);
        let path = self.log_path();

        match &self.pool {
            Some(pool) => {
                let sink = Arc::clone(&self.error_sink);
                let failure = Arc::clone(&self.background_failure);
                let lock = Arc::clone(&self.log_lock);
                pool.execute(move || {
                    let _guard = lock.lock().unwrap();
                    if let Err(e) = append_to_file(&path, &bytes) {
                        sink(&format!("spill to {} failed: {}", path.display(), e));
                        let mut slot = failure.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(e.to_string());
                        }
                    }
                });
            }
            None => append_to_file(&path, &bytes)?,
        }
        Ok(())
    }

    /// Drain the pool and surface any failure a background spill hit.
    fn drain_background(&self) -> DirResult<()> {
        if let Some(pool) = &self.pool {
            pool.wait_idle();
        }
        self.check_background()
    }

    fn check_background(&self) -> DirResult<()> {
        if let Some(msg) = self.background_failure.lock().unwrap().clone() {
            return Err(DirError::Background(msg));
        }
        Ok(())
    }

    fn sync_current_log(&self) -> DirResult<()> {
        let path = self.log_path();
        if path.exists() {
            OpenOptions::new().append(true).open(&path)?.sync_all()?;
        }
        Ok(())
    }
}

impl PlfsDir for LogDir {
    fn open(&mut self, path: &Path) -> DirResult<()> {
        match self.state {
            DirState::Created => {}
            DirState::Open => return Err(DirError::AlreadyOpen),
            DirState::Finished => return Err(DirError::Finished),
        }

        fs::create_dir_all(path)?;
        self.root = path.to_path_buf();

        let mut manifest = File::create(self.manifest_path())?;
        writeln!(manifest, "conf={}", self.config.to_query_string())?;
        if let Some(env) = &self.env {
            writeln!(manifest, "env={}", env)?;
        }
        if let Some(pool) = &self.pool {
            writeln!(manifest, "bg_threads={}", pool.size())?;
        }
        manifest.sync_all()?;

        self.state = DirState::Open;
        tracing::debug!(
            rank = self.rank(),
            dir = %path.display(),
            "plfsdir opened for writing"
        );
        Ok(())
    }

    fn append(&mut self, name: &str, epoch: u32, value: &[u8]) -> DirResult<()> {
        match self.state {
            DirState::Open => {}
            DirState::Created => return Err(DirError::NotOpen),
            DirState::Finished => return Err(DirError::Finished),
        }
        if epoch != self.current_epoch {
            return Err(DirError::EpochOutOfOrder {
                requested: epoch,
                current: self.current_epoch,
            });
        }
        self.check_background()?;

        self.buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(&epoch.to_le_bytes());
        self.buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.extend_from_slice(value);

        self.epoch_records += 1;
        self.epoch_value_bytes += value.len() as u64;
        self.total_records += 1;
        self.total_value_bytes += value.len() as u64;

        if self.buf.len() >= self.config.data_buffer {
            self.spill_buffer()?;
        }
        Ok(())
    }

    fn epoch_flush(&mut self, epoch: u32) -> DirResult<()> {
        match self.state {
            DirState::Open => {}
            DirState::Created => return Err(DirError::NotOpen),
            DirState::Finished => return Err(DirError::Finished),
        }
        if epoch != self.current_epoch {
            return Err(DirError::EpochOutOfOrder {
                requested: epoch,
                current: self.current_epoch,
            });
        }

        self.spill_buffer()?;
        self.drain_background()?;
        self.sync_current_log()?;

        let mut seal = File::create(self.seal_path(epoch))?;
        writeln!(
            seal,
            "epoch={}&records={}&value_bytes={}",
            epoch, self.epoch_records, self.epoch_value_bytes
        )?;
        seal.sync_all()?;

        tracing::debug!(
            rank = self.rank(),
            epoch,
            records = self.epoch_records,
            "epoch sealed"
        );

        if self.config.epoch_log_rotation {
            self.log_no += 1;
        }
        self.epoch_records = 0;
        self.epoch_value_bytes = 0;
        self.current_epoch += 1;
        Ok(())
    }

    fn finish(&mut self) -> DirResult<()> {
        match self.state {
            DirState::Open => {}
            DirState::Created => return Err(DirError::NotOpen),
            DirState::Finished => return Err(DirError::Finished),
        }

        self.spill_buffer()?;
        self.drain_background()?;
        self.sync_current_log()?;

        let mut footer = File::create(self.footer_path())?;
        writeln!(
            footer,
            "epochs={}&records={}&value_bytes={}",
            self.current_epoch, self.total_records, self.total_value_bytes
        )?;
        footer.sync_all()?;

        self.state = DirState::Finished;
        tracing::debug!(
            rank = self.rank(),
            epochs = self.current_epoch,
            records = self.total_records,
            "plfsdir finished"
        );
        Ok(())
    }
}

fn append_to_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)
}

/// One record decoded back out of a rank's log files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub name: String,
    pub epoch: u32,
    pub value_len: usize,
}

/// This rank's log files under `root`, in log-number order.
pub fn log_files(root: &Path, rank: u32) -> DirResult<Vec<PathBuf>> {
    let prefix = format!("l-r{:08x}-", rank);
    let mut logs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with(&prefix))
                .unwrap_or(false)
        })
        .collect();
    logs.sort();
    Ok(logs)
}

/// Decode every record written by `rank` under `root`, in log order
/// (identical to write order when no background pool was attached).
///
/// Test support for verifying what a run put on disk; the benchmark
/// itself never reads back.
pub fn scan(root: &Path, rank: u32) -> DirResult<Vec<ScanRecord>> {
    let mut records = Vec::new();
    for log in log_files(root, rank)? {
        let bytes = fs::read(&log)?;
        let mut at = 0;
        while at < bytes.len() {
            if bytes.len() - at < RECORD_HEADER {
                return Err(truncated(&log));
            }
            let name_len = u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize;
            let epoch = u32::from_le_bytes(bytes[at + 2..at + 6].try_into().unwrap());
            let value_len =
                u32::from_le_bytes(bytes[at + 6..at + 10].try_into().unwrap()) as usize;
            at += RECORD_HEADER;

            if bytes.len() - at < name_len + value_len {
                return Err(truncated(&log));
            }
            let name = String::from_utf8_lossy(&bytes[at..at + name_len]).into_owned();
            at += name_len + value_len;

            records.push(ScanRecord {
                name,
                epoch,
                value_len,
            });
        }
    }
    Ok(records)
}

fn truncated(log: &Path) -> DirError {
    DirError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("truncated record in {}", log.display()),
    ))
}
