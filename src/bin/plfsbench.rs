//! plfsbench - parallel multi-epoch plfsdir write benchmark
//!
//! Every rank of a launcher-provided process group writes `nkeys`
//! deterministically named records per epoch into a shared plfsdir,
//! barriers, and flushes the epoch, for `nepochs` epochs.
//!
//! Usage:
//!   mpirun -n <ranks> plfsbench [options] <plfsdir> [bbos-hostname] [bbos-port]
//!
//! Without a launcher environment the benchmark runs as a single rank.

use clap::Parser;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use plfsbench::comm::{self, FsGroup, ProcessGroup, SoloGroup};
use plfsbench::config::RunConfig;
use plfsbench::driver::{self, RunContext};
use plfsbench::logging;
use plfsbench::watchdog::Watchdog;

/// Parallel multi-epoch write benchmark for plfsdir-style storage
#[derive(Parser, Debug)]
#[command(name = "plfsbench")]
#[command(about = "Parallel multi-epoch write benchmark for plfsdir-style storage")]
struct Args {
    /// Target plfsdir path (on a filesystem shared by all ranks)
    plfsdir: PathBuf,

    /// Remote-storage (bbos) server hostname
    bbos_hostname: Option<String>,

    /// Remote-storage (bbos) server port
    bbos_port: Option<u16>,

    /// Data and index buffer size in bytes
    #[arg(short = 's', long = "iosz")]
    iosz: Option<usize>,

    /// Number of epochs to write
    #[arg(short = 'e', long = "nepochs")]
    nepochs: Option<u32>,

    /// Keys written per rank per epoch
    #[arg(short = 'n', long = "nkeys")]
    nkeys: Option<u32>,

    /// Filter bits per key
    #[arg(short = 'f', long = "filterbits")]
    filterbits: Option<u32>,

    /// Key size in bytes
    #[arg(short = 'k', long = "keysz")]
    keysz: Option<usize>,

    /// Value size in bytes
    #[arg(short = 'd', long = "valsz")]
    valsz: Option<usize>,

    /// Background worker threads for the storage handle
    #[arg(short = 'j', long = "bgthreads")]
    bgthreads: Option<usize>,

    /// Watchdog timeout in seconds (0 disables)
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u64>,

    /// Rotate logs at every epoch boundary
    #[arg(short = 'r', long = "logrotation")]
    logrotation: bool,

    /// Route storage I/O through a remote bbos endpoint
    #[arg(short = 'b', long = "bbos")]
    bbos: bool,

    /// Be verbose
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// TOML configuration file (CLI flags override its values)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

/// Report a fatal error and terminate with status 1.
fn complain(msg: impl Display) -> ! {
    eprintln!("!!! ERROR !!! plfsbench: {}", msg);
    std::process::exit(1);
}

/// Merge defaults, the optional config file, and CLI overrides into
/// one resolved configuration.
fn resolve_config(args: &Args) -> RunConfig {
    let mut cfg = match &args.config {
        Some(path) => match RunConfig::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => complain(e),
        },
        None => RunConfig::default(),
    };

    cfg.dir = args.plfsdir.clone();
    if let Some(hostname) = &args.bbos_hostname {
        cfg.bbos_hostname = hostname.clone();
    }
    if let Some(port) = args.bbos_port {
        cfg.bbos_port = port;
    }
    if let Some(iosz) = args.iosz {
        cfg.iosz = iosz;
    }
    if let Some(nepochs) = args.nepochs {
        cfg.nepochs = nepochs;
    }
    if let Some(nkeys) = args.nkeys {
        cfg.nkeys = nkeys;
    }
    if let Some(filterbits) = args.filterbits {
        cfg.filterbits = filterbits;
    }
    if let Some(keysz) = args.keysz {
        cfg.keysz = keysz;
    }
    if let Some(valsz) = args.valsz {
        cfg.valsz = valsz;
    }
    if let Some(bgthreads) = args.bgthreads {
        cfg.bgthreads = bgthreads;
    }
    if let Some(timeout) = args.timeout {
        cfg.timeout_secs = timeout;
    }
    if args.logrotation {
        cfg.logrotation = true;
    }
    if args.bbos {
        cfg.bbos = true;
    }
    if args.verbose {
        cfg.verbose = true;
    }
    if let Some(level) = &args.log_level {
        cfg.log_level = level.clone();
    }
    cfg
}

fn main() {
    // Usage errors exit with status 1, not clap's default 2.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let cfg = resolve_config(&args);
    if let Err(e) = cfg.validate() {
        eprintln!("!!! ERROR !!! plfsbench: {}", e);
        eprintln!("usage: plfsbench [options] <plfsdir> [bbos-hostname] [bbos-port]");
        std::process::exit(1);
    }

    // Bootstrap the group before anything else.
    let identity = match comm::detect_identity() {
        Ok(identity) => identity,
        Err(e) => complain(e),
    };

    let level = if cfg.verbose && cfg.log_level == "info" {
        "debug"
    } else {
        &cfg.log_level
    };
    logging::init_with_rank(level, identity.rank);

    if identity.rank == 0 || cfg.verbose {
        cfg.print_opts(identity.rank, identity.size);
    }

    let watchdog = Watchdog::arm(Duration::from_secs(cfg.timeout_secs));

    let ctx = RunContext {
        config: cfg,
        identity,
    };

    let mut group: Box<dyn ProcessGroup> = if identity.size > 1 {
        let sync_dir = ctx.config.dir.join(".sync");
        match FsGroup::new(&sync_dir, identity) {
            Ok(group) => Box::new(group),
            Err(e) => complain(format!("fail to join process group: {}", e)),
        }
    } else {
        Box::new(SoloGroup)
    };

    if ctx.config.verbose && identity.rank == 0 {
        tracing::info!("test begins ...");
    }

    // Startup rendezvous before any rank touches the directory.
    if let Err(e) = group.barrier() {
        complain(format!("fail to do barrier: {}", e));
    }

    let mut dir = match driver::build_dir(&ctx) {
        Ok(dir) => dir,
        Err(e) => complain(format!("error opening dir: {}", e)),
    };

    let report = match driver::run(&ctx, group.as_mut(), &mut dir) {
        Ok(report) => report,
        Err(e) => complain(e),
    };

    // The handle must be fully closed on every rank before the group
    // is torn down.
    drop(dir);
    drop(group);
    watchdog.disarm();

    if identity.rank == 0 {
        report.print_report();
        if ctx.config.verbose {
            tracing::info!("all done!");
            tracing::info!("bye");
        }
    }
}
