//! Process-group coordination.
//!
//! Each benchmark participant is one operating-system process with a
//! rank in a fixed-size group. Rank and size are assigned once by the
//! job launcher and read from its environment; ranks then cooperate
//! only through the [`ProcessGroup::barrier`] collective, implemented
//! over a shared filesystem so the harness needs no message-passing
//! runtime of its own.

pub mod fs_barrier;

pub use fs_barrier::FsGroup;

use thiserror::Error;

/// This process's place in the group, assigned once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    /// 0-based rank within the group
    pub rank: u32,
    /// Total number of participants
    pub size: u32,
}

/// Coordination error types
#[derive(Debug, Error)]
pub enum CommError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid identity: rank {rank} in a group of {size}")]
    InvalidIdentity { rank: u32, size: u32 },

    #[error("bad launcher environment: {0}")]
    BadEnvironment(String),
}

/// A fixed-size group of cooperating processes.
pub trait ProcessGroup {
    /// This process's 0-based rank.
    fn rank(&self) -> u32;

    /// Total number of participants.
    fn size(&self) -> u32;

    /// Rendezvous with every other rank. Returns once all ranks of the
    /// group have arrived at the same barrier generation.
    fn barrier(&mut self) -> Result<(), CommError>;
}

/// The trivial single-process group.
pub struct SoloGroup;

impl ProcessGroup for SoloGroup {
    fn rank(&self) -> u32 {
        0
    }

    fn size(&self) -> u32 {
        1
    }

    fn barrier(&mut self) -> Result<(), CommError> {
        Ok(())
    }
}

/// Environment variable pairs consulted for rank/size detection, in
/// priority order. The first pair with both variables set wins.
const LAUNCHER_ENV: &[(&str, &str)] = &[
    ("PLFSBENCH_RANK", "PLFSBENCH_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("SLURM_PROCID", "SLURM_NTASKS"),
];

/// Determine this process's rank and the group size from the job
/// launcher environment.
///
/// Without any launcher environment the process runs as a group of one.
/// A launcher variable that is present but unparsable, or a rank not
/// below the group size, is a fatal bootstrap error.
pub fn detect_identity() -> Result<ProcessIdentity, CommError> {
    for (rank_var, size_var) in LAUNCHER_ENV {
        let (rank_val, size_val) = match (std::env::var(rank_var), std::env::var(size_var)) {
            (Ok(r), Ok(s)) => (r, s),
            _ => continue,
        };

        let rank: u32 = rank_val.parse().map_err(|_| {
            CommError::BadEnvironment(format!("{}={}", rank_var, rank_val))
        })?;
        let size: u32 = size_val.parse().map_err(|_| {
            CommError::BadEnvironment(format!("{}={}", size_var, size_val))
        })?;

        if size == 0 || rank >= size {
            return Err(CommError::InvalidIdentity { rank, size });
        }

        tracing::debug!(rank, size, source = rank_var, "identity from launcher environment");
        return Ok(ProcessIdentity { rank, size });
    }

    Ok(ProcessIdentity { rank: 0, size: 1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solo_group_barrier_is_immediate() {
        let mut group = SoloGroup;
        assert_eq!(group.rank(), 0);
        assert_eq!(group.size(), 1);
        for _ in 0..3 {
            group.barrier().unwrap();
        }
    }

    #[test]
    fn identity_from_environment() {
        // PLFSBENCH_* has the highest priority, so other launcher
        // variables in the ambient environment cannot interfere.
        std::env::set_var("PLFSBENCH_RANK", "2");
        std::env::set_var("PLFSBENCH_SIZE", "4");
        let id = detect_identity().unwrap();
        assert_eq!(id, ProcessIdentity { rank: 2, size: 4 });

        std::env::set_var("PLFSBENCH_RANK", "4");
        assert!(matches!(
            detect_identity(),
            Err(CommError::InvalidIdentity { rank: 4, size: 4 })
        ));

        std::env::set_var("PLFSBENCH_RANK", "zero");
        assert!(matches!(detect_identity(), Err(CommError::BadEnvironment(_))));

        std::env::remove_var("PLFSBENCH_RANK");
        std::env::remove_var("PLFSBENCH_SIZE");
    }
}
