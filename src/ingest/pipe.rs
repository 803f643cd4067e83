//! FIFO ingestion.
//!
//! Editors write document snapshots into a named pipe. The byte stream is
//! cut into frames at NUL bytes and at end-of-stream; every writer
//! disconnect ends the stream, so the reader reopens the FIFO in a loop.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 64 * 1024;

/// How long `stop` waits for the reader before leaving it behind.
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Feed every non-empty frame of `reader` to `on_frame`.
///
/// A frame ends at a NUL byte or at end-of-stream.
pub fn split_frames<R: Read>(mut reader: R, mut on_frame: impl FnMut(Vec<u8>)) -> io::Result<()> {
    let mut pending = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        let mut data = &chunk[..n];
        while let Some(pos) = data.iter().position(|b| *b == 0) {
            pending.extend_from_slice(&data[..pos]);
            if !pending.is_empty() {
                on_frame(std::mem::take(&mut pending));
            }
            data = &data[pos + 1..];
        }
        pending.extend_from_slice(data);
    }
    if !pending.is_empty() {
        on_frame(pending);
    }
    Ok(())
}

/// Create the FIFO at `path` unless one already exists.
#[cfg(unix)]
pub fn ensure_fifo(path: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::FileTypeExt;

    if let Ok(meta) = fs::symlink_metadata(path) {
        if meta.file_type().is_fifo() {
            return Ok(());
        }
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a FIFO", path.display()),
        ));
    }

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains null byte"))?;
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), libc::S_IRUSR | libc::S_IWUSR) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_fifo(_path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "named pipes require a unix platform",
    ))
}

/// Background reader of the ingestion FIFO.
pub struct PipeListener {
    path: PathBuf,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PipeListener {
    /// Create the FIFO if needed and start reading frames from it.
    pub fn spawn<F>(path: PathBuf, on_frame: F) -> io::Result<Self>
    where
        F: Fn(Vec<u8>) + Send + 'static,
    {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        ensure_fifo(&path)?;

        let stopped = Arc::new(AtomicBool::new(false));
        let handle = {
            let path = path.clone();
            let stopped = Arc::clone(&stopped);
            std::thread::Builder::new()
                .name("panlive-pipe".into())
                .spawn(move || read_loop(&path, &stopped, on_frame))?
        };

        Ok(Self {
            path,
            stopped,
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the reader thread.
    ///
    /// A writer that keeps the FIFO open holds the reader in `read()`; after
    /// `STOP_GRACE` the thread is detached and drops whatever it still
    /// reads.
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // The reader blocks in open() until a writer appears
        wake_reader(&self.path);
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + STOP_GRACE;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            crate::debug!("pipe"; "writer still attached, detaching reader");
        }
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop<F: Fn(Vec<u8>)>(path: &Path, stopped: &AtomicBool, on_frame: F) {
    crate::debug!("pipe"; "reading {}", path.display());
    while !stopped.load(Ordering::SeqCst) {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                crate::log!("pipe"; "cannot open {}: {}", path.display(), e);
                std::thread::sleep(Duration::from_millis(500));
                continue;
            }
        };
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = split_frames(file, |frame| {
            if stopped.load(Ordering::SeqCst) {
                return;
            }
            crate::debug!("pipe"; "frame of {} bytes", frame.len());
            on_frame(frame);
        }) {
            crate::log!("pipe"; "read error: {}", e);
        }
    }
}

#[cfg(unix)]
fn wake_reader(path: &Path) {
    use std::os::unix::fs::OpenOptionsExt;
    let _ = fs::OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path);
}

#[cfg(not(unix))]
fn wake_reader(_path: &Path) {}

/// Write one NUL-terminated frame into the FIFO at `path`.
///
/// Fails with `NotConnected` when no reader holds the FIFO open, instead of
/// blocking until one appears.
#[cfg(unix)]
pub fn write_frame(path: &Path, frame: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};

    if !fs::metadata(path)?.file_type().is_fifo() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a FIFO", path.display()),
        ));
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|e| match e.raw_os_error() {
            Some(libc::ENXIO) => io::Error::new(io::ErrorKind::NotConnected, "no reader on the pipe"),
            _ => e,
        })?;

    // Frames outgrow the pipe buffer; write them blocking.
    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }

    file.write_all(frame)?;
    file.write_all(&[0])?;
    file.flush()
}

#[cfg(not(unix))]
pub fn write_frame(_path: &Path, _frame: &[u8]) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "named pipes require a unix platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frames(input: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        split_frames(Cursor::new(input.to_vec()), |f| out.push(f)).unwrap();
        out
    }

    #[test]
    fn test_eof_terminates_frame() {
        assert_eq!(frames(b"# Hello"), [b"# Hello".to_vec()]);
    }

    #[test]
    fn test_nul_terminates_frame() {
        assert_eq!(
            frames(b"one\0two\0three"),
            [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
    }

    #[test]
    fn test_empty_frames_skipped() {
        assert_eq!(frames(b"\0\0a\0\0"), [b"a".to_vec()]);
        assert!(frames(b"").is_empty());
    }

    /// Reader that hands out one byte per call.
    struct Trickle(Vec<u8>, usize);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.1 >= self.0.len() {
                return Ok(0);
            }
            buf[0] = self.0[self.1];
            self.1 += 1;
            Ok(1)
        }
    }

    #[test]
    fn test_frames_span_reads() {
        let mut out = Vec::new();
        split_frames(Trickle(b"ab\0cd".to_vec(), 0), |f| out.push(f)).unwrap();
        assert_eq!(out, [b"ab".to_vec(), b"cd".to_vec()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_fifo() {
        use std::os::unix::fs::FileTypeExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe");
        ensure_fifo(&path).unwrap();
        assert!(fs::metadata(&path).unwrap().file_type().is_fifo());
        // idempotent
        ensure_fifo(&path).unwrap();

        let plain = dir.path().join("plain");
        fs::write(&plain, "x").unwrap();
        assert!(ensure_fifo(&plain).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_listener_receives_frames() {
        use std::io::Write;
        use std::sync::mpsc;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/pipe");
        let (tx, rx) = mpsc::channel();
        let mut listener = PipeListener::spawn(path.clone(), move |f| {
            let _ = tx.send(f);
        })
        .unwrap();

        // first writer: two NUL-terminated frames
        let mut w = fs::OpenOptions::new().write(true).open(&path).unwrap();
        w.write_all(b"first\0second\0").unwrap();
        drop(w);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"first");
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"second");

        // reopened after the writer left; EOF ends the frame
        let mut w = fs::OpenOptions::new().write(true).open(&path).unwrap();
        w.write_all(b"third").unwrap();
        drop(w);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"third");

        listener.stop();
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_with_attached_writer() {
        use std::io::Write;
        use std::sync::mpsc;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe");
        let (tx, rx) = mpsc::channel();
        let mut listener = PipeListener::spawn(path.clone(), move |f| {
            let _ = tx.send(f);
        })
        .unwrap();

        // like `cat > pipe`: the writer stays open
        let mut w = fs::OpenOptions::new().write(true).open(&path).unwrap();
        w.write_all(b"held\0").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"held");

        let started = Instant::now();
        listener.stop();
        assert!(started.elapsed() < Duration::from_secs(2));

        // frames after stop are dropped
        w.write_all(b"late\0").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        drop(w);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_frame_without_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe");
        ensure_fifo(&path).unwrap();

        let err = write_frame(&path, b"lost").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_frame_reaches_listener() {
        use std::sync::mpsc;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe");
        let (tx, rx) = mpsc::channel();
        let mut listener = PipeListener::spawn(path.clone(), move |f| {
            let _ = tx.send(f);
        })
        .unwrap();

        // the reader thread may not have opened the FIFO yet
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match write_frame(&path, b"# sent") {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::NotConnected && Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => panic!("write failed: {e}"),
            }
        }
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"# sent");

        listener.stop();
    }
}
