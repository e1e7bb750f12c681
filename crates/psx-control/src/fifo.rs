use std::io;
use std::path::Path;

/// Creates a named pipe at `path` unless something already exists there. Returns whether one was
/// made.
#[cfg(unix)]
pub fn ensure_fifo(path: &Path) -> io::Result<bool> {
    use nix::errno::Errno;
    use nix::sys::stat::Mode;

    if path.exists() {
        return Ok(false);
    }
    match nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o666)) {
        Ok(()) => {
            tracing::debug!("created fifo {}", path.display());
            Ok(true)
        }
        // Lost a race with another creator.
        Err(Errno::EEXIST) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Named pipes need unix; the channel falls back to a plain file.
#[cfg(not(unix))]
pub fn ensure_fifo(_path: &Path) -> io::Result<bool> {
    Ok(false)
}
