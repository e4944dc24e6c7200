//! Shared-filesystem barrier.
//!
//! Ranks rendezvous through a sync directory on a filesystem visible to
//! the whole group: each barrier generation gets its own subdirectory,
//! every rank drops an arrival file into it, and rank 0 writes a
//! release marker once all arrivals are present. Generations are
//! monotonic and never reused within a run; rank 0 garbage-collects the
//! generation two behind, which every rank is guaranteed to have left.
//!
//! At construction rank 0 takes an exclusive `flock` on the sync
//! directory's lock file, clears generation state left behind by a
//! crashed earlier run, and then writes a `.open` sentinel; non-zero
//! ranks wait for the sentinel before their first barrier, so cleanup
//! cannot race a live arrival. A sentinel surviving from a crashed run
//! narrows that guarantee: launchers that reuse a target directory
//! after a crash should clear it first. A sync directory shared with a
//! concurrently running group is not supported.

use std::fs::{self, File};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{CommError, ProcessGroup, ProcessIdentity};

/// Arrival poll interval.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Barrier over a directory on a shared filesystem.
pub struct FsGroup {
    identity: ProcessIdentity,
    sync_dir: PathBuf,
    generation: u64,
}

impl FsGroup {
    /// Set up the sync directory and join the group.
    ///
    /// Rank 0 removes stale generation state under an exclusive lock
    /// and then marks the directory open; non-zero ranks wait for that
    /// mark so they cannot race past a cleanup in progress.
    pub fn new(sync_dir: &Path, identity: ProcessIdentity) -> Result<Self, CommError> {
        if identity.rank >= identity.size {
            return Err(CommError::InvalidIdentity {
                rank: identity.rank,
                size: identity.size,
            });
        }

        fs::create_dir_all(sync_dir)?;

        let sentinel = sync_dir.join(".open");
        if identity.rank == 0 {
            let lock = lock_file(sync_dir)?;
            flock(&lock, libc::LOCK_EX)?;
            let _ = fs::remove_file(&sentinel);
            clear_stale_generations(sync_dir)?;
            File::create(&sentinel)?;
            // Lock released on drop; barriers only use generation dirs.
            drop(lock);
        } else {
            while !sentinel.exists() {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        tracing::debug!(
            rank = identity.rank,
            size = identity.size,
            sync_dir = %sync_dir.display(),
            "joined filesystem barrier group"
        );

        Ok(Self {
            identity,
            sync_dir: sync_dir.to_path_buf(),
            generation: 0,
        })
    }

    fn generation_dir(&self, generation: u64) -> PathBuf {
        self.sync_dir.join(format!("gen-{:08}", generation))
    }

    fn arrival_count(dir: &Path) -> Result<u32, CommError> {
        let mut count = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('r') {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl ProcessGroup for FsGroup {
    fn rank(&self) -> u32 {
        self.identity.rank
    }

    fn size(&self) -> u32 {
        self.identity.size
    }

    fn barrier(&mut self) -> Result<(), CommError> {
        let generation = self.generation;
        self.generation += 1;

        let gen_dir = self.generation_dir(generation);
        fs::create_dir_all(&gen_dir)?;
        File::create(gen_dir.join(format!("r{:08x}", self.identity.rank)))?;

        let release = gen_dir.join(".release");
        if self.identity.rank == 0 {
            while Self::arrival_count(&gen_dir)? < self.identity.size {
                std::thread::sleep(POLL_INTERVAL);
            }
            File::create(&release)?;

            // Every rank has passed generation-2 before entering this
            // one, so its directory can no longer be observed.
            if generation >= 2 {
                let old = self.generation_dir(generation - 2);
                if old.exists() {
                    fs::remove_dir_all(old)?;
                }
            }
        } else {
            while !release.exists() {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        tracing::trace!(rank = self.identity.rank, generation, "barrier passed");
        Ok(())
    }
}

fn lock_file(sync_dir: &Path) -> Result<File, CommError> {
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(sync_dir.join(".lock"))?;
    Ok(file)
}

fn flock(file: &File, operation: libc::c_int) -> Result<(), CommError> {
    let ret = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if ret != 0 {
        return Err(CommError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

fn clear_stale_generations(sync_dir: &Path) -> Result<(), CommError> {
    for entry in fs::read_dir(sync_dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with("gen-") {
            fs::remove_dir_all(entry.path())?;
        }
    }
    Ok(())
}
