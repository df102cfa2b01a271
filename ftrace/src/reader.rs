//! # Reader
//!
//! Reads a text file line by line from a dedicated thread, making the lines
//! available through a channel. This is used to consume the trace pipe, which
//! is an endless stream: the reading thread polls the file so it can notice a
//! termination request even when no data is coming.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    os::fd::AsFd,
    path::Path,
    sync::mpsc,
    thread,
    time::Duration,
};

use anyhow::{anyhow, Result};
use log::{debug, error};
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};

use crate::helpers::signals::Running;

/// Timeout when polling the file for new data.
const READ_POLL_TIMEOUT_MS: u16 = 200;

/// Lines of a file, read in the background.
pub struct LineSource {
    /// Receiver of the lines. Dropping it makes the reading thread stop.
    lines: Option<mpsc::Receiver<String>>,
    /// Reading thread handle.
    handle: Option<thread::JoinHandle<()>>,
    state: Running,
}

impl LineSource {
    /// Open a file and start reading it in a dedicated thread. Only opening
    /// the file is done synchronously.
    ///
    /// The thread stops, closing the channel, at the end of the file, on a
    /// read error or once `state` is terminated. The file is released when
    /// the thread stops.
    pub fn open<P: AsRef<Path>>(path: P, state: Running) -> io::Result<LineSource> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let (sender, receiver) = mpsc::sync_channel(0);

        let run_state = state.clone();
        let name = path.display().to_string();
        let handle = thread::Builder::new()
            .name("ftrace-reader".into())
            .spawn(move || {
                if let Err(e) = pump(file, sender, run_state) {
                    error!("Error while reading {name}: {e}");
                }
                debug!("Stopped reading {name}");
            })?;

        Ok(LineSource {
            lines: Some(receiver),
            handle: Some(handle),
            state,
        })
    }

    /// Wait for the next line, up to `timeout`. Once the reading thread
    /// stopped, `RecvTimeoutError::Disconnected` is returned.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<String, mpsc::RecvTimeoutError> {
        match &self.lines {
            Some(lines) => lines.recv_timeout(timeout),
            None => Err(mpsc::RecvTimeoutError::Disconnected),
        }
    }

    /// Stop the reading thread and wait for it to release the file. This
    /// terminates the running state given at open time.
    pub fn close(&mut self) -> Result<()> {
        self.state.terminate();
        // Unblocks the thread if it is waiting for the line to be received.
        self.lines.take();

        self.handle.take().map_or(Ok(()), |th| {
            th.join()
                .map_err(|_| anyhow!("Failed to join the reader thread"))
        })
    }
}

impl Drop for LineSource {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("{e}");
        }
    }
}

/// Read lines from the file and send them until the end of the file, the
/// receiver going away or the state being terminated.
fn pump(file: File, sender: mpsc::SyncSender<String>, state: Running) -> io::Result<()> {
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    while state.running() {
        // Only wait on the file if nothing is left in our own buffer.
        if reader.buffer().is_empty() && !wait_readable(reader.get_ref())? {
            continue;
        }

        // At most one read, so a partial line can't block us past the poll.
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if available.is_empty() {
            if !buf.is_empty() {
                let _ = sender.send(to_line(&buf));
            }
            break;
        }

        let (used, complete) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        buf.extend_from_slice(&available[..used]);
        reader.consume(used);

        if complete {
            if sender.send(to_line(&buf)).is_err() {
                break;
            }
            buf.clear();
        }
    }

    Ok(())
}

fn to_line(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Wait for the file to have data, up to READ_POLL_TIMEOUT_MS. Returns false
/// on timeout.
fn wait_readable(file: &File) -> io::Result<bool> {
    let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(READ_POLL_TIMEOUT_MS)) {
        Ok(n) => Ok(n > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write, time::Instant};

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn read_until_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe");
        fs::write(&path, b"first\r\nsecond: a=\"b c\"\n\xffthird").unwrap();

        let source = LineSource::open(&path, Running::new()).unwrap();
        assert_eq!(source.recv_timeout(TIMEOUT).unwrap(), "first");
        assert_eq!(source.recv_timeout(TIMEOUT).unwrap(), "second: a=\"b c\"");
        assert_eq!(source.recv_timeout(TIMEOUT).unwrap(), "\u{fffd}third");
        assert_eq!(
            source.recv_timeout(TIMEOUT),
            Err(mpsc::RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LineSource::open(dir.path().join("missing"), Running::new())
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn close_while_sending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe");
        fs::write(&path, "a\nb\nc\n").unwrap();

        // Lines are never received, the thread is blocked sending the first
        // one.
        let state = Running::new();
        let mut source = LineSource::open(&path, state.clone()).unwrap();
        source.close().unwrap();
        assert!(!state.running());
        assert_eq!(
            source.recv_timeout(Duration::from_millis(10)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn close_quiet_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifo");
        nix::unistd::mkfifo(&path, nix::sys::stat::Mode::S_IRWXU).unwrap();

        // Opening a FIFO for reading blocks until it has a writer.
        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            fs::OpenOptions::new()
                .write(true)
                .open(writer_path)
                .unwrap()
        });
        let mut source = LineSource::open(&path, Running::new()).unwrap();
        let writer = writer.join().unwrap();

        assert_eq!(
            source.recv_timeout(Duration::from_millis(50)),
            Err(mpsc::RecvTimeoutError::Timeout)
        );

        // The writer is still there but nothing is written: closing must not
        // hang.
        let start = Instant::now();
        source.close().unwrap();
        assert!(start.elapsed() < TIMEOUT);
        drop(writer);
    }

    #[test]
    fn close_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifo");
        nix::unistd::mkfifo(&path, nix::sys::stat::Mode::S_IRWXU).unwrap();

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            fs::OpenOptions::new()
                .write(true)
                .open(writer_path)
                .unwrap()
        });
        let mut source = LineSource::open(&path, Running::new()).unwrap();
        let mut writer = writer.join().unwrap();

        // The last line is never terminated and the writer stays around.
        writer.write_all(b"first\nsecond half").unwrap();
        assert_eq!(source.recv_timeout(TIMEOUT).unwrap(), "first");
        assert_eq!(
            source.recv_timeout(Duration::from_millis(50)),
            Err(mpsc::RecvTimeoutError::Timeout)
        );

        let start = Instant::now();
        source.close().unwrap();
        assert!(start.elapsed() < TIMEOUT);
        drop(writer);
    }
}
