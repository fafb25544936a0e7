use crate::error::GeoScanError;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Bytes read per step while looking for the last newline.
const TAIL_CHUNK: usize = 4096;

/// Sole owner of the match list and the checkpoint log.
///
/// Workers never touch either directly; they call [`MatchSink::record`],
/// which appends to the file and to memory inside one critical section.
/// The log therefore holds exactly the in-memory matches, in append order.
#[derive(Debug)]
pub struct MatchSink {
    path: PathBuf,
    sync: bool,
    state: Mutex<SinkState>,
}

#[derive(Debug)]
struct SinkState {
    matches: Vec<String>,
    log: File,
}

impl MatchSink {
    /// Open (or create) the log in append mode.
    ///
    /// A fragment after the last newline, left by a crash mid-write, is cut
    /// off first so the next entry starts on its own line.
    pub fn open(path: &Path, sync: bool) -> Result<Self, GeoScanError> {
        let to_file_error = |action: &str, e: io::Error| {
            GeoScanError::file_error(
                path.to_string_lossy(),
                format!("Failed to {} checkpoint log: {}", action, e),
            )
        };

        let mut head = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| to_file_error("open", e))?;
        let len = head
            .metadata()
            .map_err(|e| to_file_error("inspect", e))?
            .len();
        let complete = complete_prefix_len(&mut head, len).map_err(|e| to_file_error("read", e))?;
        if complete < len {
            warn!(
                "Truncating {} torn bytes at the end of {}",
                len - complete,
                path.display()
            );
            head.set_len(complete)
                .map_err(|e| to_file_error("truncate", e))?;
        }
        drop(head);

        let log = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| to_file_error("open", e))?;

        Ok(Self {
            path: path.to_path_buf(),
            sync,
            state: Mutex::new(SinkState {
                matches: Vec::new(),
                log,
            }),
        })
    }

    /// Durably append one match.
    ///
    /// The in-memory list only grows after the log write succeeded.
    pub fn record(&self, domain: &str) -> Result<(), GeoScanError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| GeoScanError::internal("checkpoint lock poisoned"))?;

        let mut line = String::with_capacity(domain.len() + 1);
        line.push_str(domain);
        line.push('\n');

        let mut written = state.log.write_all(line.as_bytes());
        if written.is_ok() && self.sync {
            written = state.log.sync_data();
        }
        written.map_err(|e| {
            GeoScanError::file_error(
                self.path.to_string_lossy(),
                format!("Failed to append to checkpoint log: {}", e),
            )
        })?;

        state.matches.push(domain.to_string());
        Ok(())
    }

    /// Number of matches recorded so far.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.matches.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the collected matches once the pool has drained.
    pub fn into_matches(self) -> Result<Vec<String>, GeoScanError> {
        self.state
            .into_inner()
            .map(|state| state.matches)
            .map_err(|_| GeoScanError::internal("checkpoint lock poisoned"))
    }
}

/// Length of the log up to and including its last newline.
fn complete_prefix_len(log: &mut File, len: u64) -> io::Result<u64> {
    let mut buf = [0u8; TAIL_CHUNK];
    let mut end = len;

    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK as u64);
        let chunk = &mut buf[..(end - start) as usize];
        log.seek(SeekFrom::Start(start))?;
        log.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }

    Ok(0)
}
