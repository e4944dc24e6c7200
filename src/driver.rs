//! Handle lifecycle and the epoch write loop.
//!
//! The protocol under test: for each epoch, every rank appends its
//! records, all ranks barrier, then the epoch is flushed. The barrier
//! between writes and flush guarantees no rank seals an epoch while a
//! peer might still be writing it, and no rank starts the next epoch
//! before this one is sealed everywhere.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::comm::{CommError, ProcessGroup, ProcessIdentity};
use crate::config::RunConfig;
use crate::plfsdir::{
    tracing_error_sink, DirConfig, DirError, LogDir, PlfsDir, RemoteEnv, WorkerPool,
};
use crate::record;
use crate::stats::{EpochTiming, RunReport};

/// Everything one run needs, created once at startup and passed into
/// each phase. No ambient globals.
pub struct RunContext {
    pub config: RunConfig,
    pub identity: ProcessIdentity,
}

/// Driver error types
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("storage error: {0}")]
    Dir(#[from] DirError),

    #[error("coordination error: {0}")]
    Comm(#[from] CommError),
}

/// Assemble and open this rank's directory handle.
///
/// The worker pool and the remote environment are each constructed at
/// most once per process, here, and owned by the handle for the run's
/// duration.
pub fn build_dir(ctx: &RunContext) -> Result<LogDir, DriverError> {
    let dir_config = DirConfig::from_run_config(ctx.identity.rank, &ctx.config);
    tracing::debug!(conf = %dir_config.to_query_string(), "handle configuration");

    let mut dir = LogDir::create(dir_config);
    dir.set_error_sink(tracing_error_sink());
    if ctx.config.bgthreads > 0 {
        dir.set_thread_pool(Arc::new(WorkerPool::new(ctx.config.bgthreads)));
    }
    if ctx.config.bbos {
        dir.set_env(RemoteEnv::new(
            &ctx.config.bbos_hostname,
            ctx.config.bbos_port,
        ));
    }

    dir.open(&ctx.config.dir)?;
    Ok(dir)
}

/// Run the multi-epoch write protocol to completion.
///
/// Generic over the group and the handle so tests can substitute mocks
/// that record call order.
pub fn run<D: PlfsDir>(
    ctx: &RunContext,
    group: &mut dyn ProcessGroup,
    dir: &mut D,
) -> Result<RunReport, DriverError> {
    let cfg = &ctx.config;
    let rank = ctx.identity.rank;
    let value = record::fill_value(cfg.valsz);

    let mut report = RunReport::new();
    let start = Instant::now();

    for epoch in 0..cfg.nepochs {
        let write_start = Instant::now();
        for k in 0..cfg.nkeys {
            let name = record::record_name(k, rank);
            dir.append(&name, epoch, &value)?;
            report.record_append(value.len() as u64);
        }

        let barrier_start = Instant::now();
        group.barrier()?;

        let flush_start = Instant::now();
        dir.epoch_flush(epoch)?;

        report.record_epoch(EpochTiming {
            write: barrier_start - write_start,
            barrier: flush_start - barrier_start,
            flush: flush_start.elapsed(),
        });
        tracing::info!(epoch, keys = cfg.nkeys, "epoch complete");
    }

    dir.finish()?;
    report.finalize(start.elapsed());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SoloGroup;
    use crate::record::FILL_BYTE;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::path::Path;
    use std::rc::Rc;

    /// One observed call, in global order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Append { name: String, epoch: u32, len: usize },
        Barrier,
        Flush(u32),
        Finish,
    }

    #[derive(Default)]
    struct MockDir {
        ops: Rc<RefCell<Vec<Op>>>,
        fill_ok: Rc<RefCell<bool>>,
    }

    impl PlfsDir for MockDir {
        fn open(&mut self, _path: &Path) -> crate::plfsdir::DirResult<()> {
            Ok(())
        }

        fn append(&mut self, name: &str, epoch: u32, value: &[u8]) -> crate::plfsdir::DirResult<()> {
            if !value.iter().all(|&b| b == FILL_BYTE) {
                *self.fill_ok.borrow_mut() = false;
            }
            self.ops.borrow_mut().push(Op::Append {
                name: name.to_string(),
                epoch,
                len: value.len(),
            });
            Ok(())
        }

        fn epoch_flush(&mut self, epoch: u32) -> crate::plfsdir::DirResult<()> {
            self.ops.borrow_mut().push(Op::Flush(epoch));
            Ok(())
        }

        fn finish(&mut self) -> crate::plfsdir::DirResult<()> {
            self.ops.borrow_mut().push(Op::Finish);
            Ok(())
        }
    }

    /// Group that records its barriers into the same op stream as the
    /// mock dir, exposing the interleaving.
    struct RecordingGroup {
        ops: Rc<RefCell<Vec<Op>>>,
    }

    impl ProcessGroup for RecordingGroup {
        fn rank(&self) -> u32 {
            0
        }

        fn size(&self) -> u32 {
            1
        }

        fn barrier(&mut self) -> Result<(), CommError> {
            self.ops.borrow_mut().push(Op::Barrier);
            Ok(())
        }
    }

    fn context(rank: u32, nepochs: u32, nkeys: u32, valsz: usize) -> RunContext {
        RunContext {
            config: RunConfig {
                dir: "/tmp/plfsbench-test".into(),
                nepochs,
                nkeys,
                valsz,
                ..RunConfig::default()
            },
            identity: ProcessIdentity { rank, size: 4 },
        }
    }

    fn run_mocked(ctx: &RunContext) -> (Vec<Op>, bool, RunReport) {
        let ops = Rc::new(RefCell::new(Vec::new()));
        let fill_ok = Rc::new(RefCell::new(true));
        let mut dir = MockDir {
            ops: ops.clone(),
            fill_ok: fill_ok.clone(),
        };
        let mut group = RecordingGroup { ops: ops.clone() };
        let report = run(ctx, &mut group, &mut dir).unwrap();
        let trace = ops.borrow().clone();
        let fill_ok = *fill_ok.borrow();
        (trace, fill_ok, report)
    }

    #[test]
    fn protocol_call_order() {
        // 4 ranks, 2 epochs, 3 keys, 8-byte keys, 4-byte values
        let ctx = context(1, 2, 3, 4);
        let (trace, fill_ok, report) = run_mocked(&ctx);

        assert!(fill_ok, "every value must be constant fill");
        assert_eq!(report.appends(), 6);
        assert_eq!(report.total_bytes(), 24);

        let mut expected = Vec::new();
        for epoch in 0..2 {
            for k in 0..3 {
                expected.push(Op::Append {
                    name: format!("f{:08x}-r00000001", k),
                    epoch,
                    len: 4,
                });
            }
            expected.push(Op::Barrier);
            expected.push(Op::Flush(epoch));
        }
        expected.push(Op::Finish);
        assert_eq!(trace, expected);
    }

    #[test]
    fn no_duplicate_name_epoch_pairs() {
        let ctx = context(2, 3, 16, 4);
        let (trace, _, _) = run_mocked(&ctx);

        let mut seen = HashSet::new();
        for op in &trace {
            if let Op::Append { name, epoch, .. } = op {
                assert!(seen.insert((name.clone(), *epoch)), "duplicate {:?}", op);
            }
        }
        assert_eq!(seen.len(), 48);
    }

    #[test]
    fn names_differ_between_ranks() {
        let (trace_a, _, _) = run_mocked(&context(0, 1, 4, 4));
        let (trace_b, _, _) = run_mocked(&context(3, 1, 4, 4));

        let names = |trace: &[Op]| -> HashSet<String> {
            trace
                .iter()
                .filter_map(|op| match op {
                    Op::Append { name, .. } => Some(name.clone()),
                    _ => None,
                })
                .collect()
        };
        assert!(names(&trace_a).is_disjoint(&names(&trace_b)));
    }

    #[test]
    fn zero_epochs_goes_straight_to_finalize() {
        let ctx = context(0, 0, 1024, 32);
        let (trace, _, report) = run_mocked(&ctx);

        assert_eq!(trace, vec![Op::Finish]);
        assert_eq!(report.appends(), 0);
        assert_eq!(report.epochs().len(), 0);
    }

    #[test]
    fn zero_keys_still_barriers_and_flushes() {
        let ctx = context(0, 2, 0, 32);
        let (trace, _, _) = run_mocked(&ctx);

        assert_eq!(
            trace,
            vec![Op::Barrier, Op::Flush(0), Op::Barrier, Op::Flush(1), Op::Finish]
        );
    }

    #[test]
    fn end_to_end_over_local_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RunContext {
            config: RunConfig {
                dir: tmp.path().to_path_buf(),
                nepochs: 2,
                nkeys: 8,
                valsz: 16,
                iosz: 64,
                ..RunConfig::default()
            },
            identity: ProcessIdentity { rank: 0, size: 1 },
        };

        let mut dir = build_dir(&ctx).unwrap();
        let mut group = SoloGroup;
        let report = run(&ctx, &mut group, &mut dir).unwrap();

        assert_eq!(report.appends(), 16);
        assert_eq!(report.total_bytes(), 256);

        let records = crate::plfsdir::local::scan(tmp.path(), 0).unwrap();
        assert_eq!(records.len(), 16);
    }
}
