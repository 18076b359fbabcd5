pub mod commands;
pub mod config;
pub mod mcp_client;

use std::path::Path;

/// Initialize the tracing subscriber.
///
/// Logs go to stderr (stdout carries the demo output) unless `log_file` is
/// given, in which case:
/// 1. Existing logs are rotated (`x.log` → `x.log.1` → .2 → .3, keeps last 3).
/// 2. A fresh file is opened behind a line-flushing writer.
///
/// `json` switches the file output to one JSON object per event.
///
/// `RUST_LOG` overrides `verbosity` (0 = info, 1 = debug, 2+ = trace).
pub fn init_tracing(verbosity: u8, log_file: Option<&Path>, json: bool) -> std::io::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dsl_starter={level},warn")));

    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            rotate_log_file(path, 3);

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;

            let builder = fmt::fmt()
                .with_env_filter(filter)
                .with_writer(FlushingWriter::new(file))
                .with_ansi(false)
                .with_target(true);
            if json {
                builder.json().init();
            } else {
                builder.init();
            }

            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                log_file = %path.display(),
                pid = std::process::id(),
                "=== dsl-starter starting ==="
            );
        }
        None => {
            fmt::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }

    Ok(())
}

/// Rotate log files: `x.log` → `x.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    // Shift: .{n-1} → .{n}
    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    // Current → .1
    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// Each log line reaches the file before the next server call, so a hung
/// or killed session still leaves a complete log behind.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
