//! Provide tracing, tailored to this program.
//!
//! The binary calls [`init`] once at startup to install a subscriber; the
//! rest of the program uses `crate::tracing::prelude::*` for the usual
//! level macros.

use std::fmt;

use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer as FmtWriter, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Check whether stderr really is the systemd journal stream.
///
/// Per systemd documentation, parse the device and inode numbers from
/// JOURNAL_STREAM and compare them against stderr's descriptor, so I/O
/// redirection doesn't fool us.
#[cfg(target_os = "linux")]
fn stderr_is_journal_stream() -> bool {
    use nix::libc;
    use std::os::unix::io::AsRawFd;

    let Ok(journal_stream) = std::env::var("JOURNAL_STREAM") else {
        return false;
    };
    let Some((dev, ino)) = journal_stream.split_once(':') else {
        return false;
    };
    let (Ok(dev), Ok(ino)) = (dev.parse::<u64>(), ino.parse::<u64>()) else {
        return false;
    };

    let fd = std::io::stderr().as_raw_fd();
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut stat) } != 0 {
        return false;
    }

    stat.st_dev as u64 == dev && stat.st_ino as u64 == ino
}

/// Initialize logging: journald when running under systemd, stdout
/// otherwise.
pub fn init() {
    #[cfg(target_os = "linux")]
    {
        if stderr_is_journal_stream() {
            if let Ok(layer) = tracing_journald::layer() {
                tracing_subscriber::registry().with(layer).init();
                return;
            }
            error!("Failed to initialize journald logging, using stdout.");
        }
    }

    use_stdout();
}

// Log to stdout, filtering per RUST_LOG with a default level of INFO.
fn use_stdout() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_target(true),
        )
        .init();
}

// Local-time timestamps to the nearest second; the default timer's long
// UTC strings drown the actual log content.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut FmtWriter<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        write!(
            w,
            "{}",
            now.format(time::macros::format_description!(
                "[hour]:[minute]:[second]"
            ))
            .map_err(|_| fmt::Error)?,
        )
    }
}
