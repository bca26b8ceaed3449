use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// The base name used for `getAllItems` results.
pub const ALL_ITEMS: &str = "all_items";

/// Defines the destination for query results used by [`Dispatcher`].
///
/// [`Dispatcher`]: struct.Dispatcher.html
pub trait Sink: Send + Sync {
    /// Write `content` to a fresh destination derived from `base_name`.
    fn write(&self, base_name: &str, content: &str) -> Result<()>;
}

/// Format a single result line.
pub fn format_entry(key: &str, value: &str) -> String {
    format!("{} : {}\n", key, value)
}

/// A sink writing each result to its own file in a directory.
///
/// Files are named `<base_name>_<n>`, where `n` comes from a counter shared by every write to
/// this sink, starting at 1. A sequence number is used up even if its write fails.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl FileSink {
    /// Construct a sink writing into `dir`. The directory is not created.
    pub fn new<P: Into<PathBuf>>(dir: P) -> FileSink {
        FileSink {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// The directory results are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_name(&self, base_name: &str) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_{}", base_name, sequence)
    }
}

impl Sink for FileSink {
    fn write(&self, base_name: &str, content: &str) -> Result<()> {
        let name = self.next_name(base_name);
        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(&name))?;
            file.write_all(content.as_bytes())
        };
        write().map_err(|source| Error::SinkWrite { name, source })
    }
}
