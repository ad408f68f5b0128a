//! Console input as a stop source.
//!
//! A detached thread blocks on the reader. The first complete line, the end
//! of input, or a read error requests the stop. The thread cannot be
//! interrupted while blocked, so it is never joined; it exits on its own
//! after its read returns.

use std::io::{BufRead, BufReader, Read};
use std::thread;

use super::{RunFlag, StopCause, StopSource, StopSourceError};

/// Stop source that waits for a line on a reader (stdin by default).
pub struct ConsoleStopSource<R> {
    reader: Option<R>,
}

impl ConsoleStopSource<std::io::Stdin> {
    /// Listen on the process's standard input.
    pub fn stdin() -> Self {
        Self::new(std::io::stdin())
    }
}

impl<R> ConsoleStopSource<R>
where
    R: Read + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R> StopSource for ConsoleStopSource<R>
where
    R: Read + Send + 'static,
{
    fn name(&self) -> &str {
        "console"
    }

    fn arm(&mut self, flag: &RunFlag) -> Result<(), StopSourceError> {
        let Some(reader) = self.reader.take() else {
            // Already armed; the listener thread owns the reader.
            return Ok(());
        };
        let flag = flag.clone();

        thread::Builder::new()
            .name("exm-console".to_string())
            .spawn(move || listen(BufReader::new(reader), &flag))
            .map_err(|source| StopSourceError::Spawn {
                name: "console".to_string(),
                source,
            })?;

        tracing::info!("press Enter to stop");
        Ok(())
    }
}

fn listen(mut reader: impl BufRead, flag: &RunFlag) {
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => tracing::debug!("console closed"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "console read failed"),
    }
    flag.request_stop(StopCause::Console);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn wait_stopped(flag: &RunFlag) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if !flag.is_running() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Reader that fails every read.
    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("console unplugged"))
        }
    }

    #[test]
    fn newline_requests_console_stop() {
        let flag = RunFlag::new();
        let mut source = ConsoleStopSource::new(Cursor::new(b"\n".to_vec()));
        source.arm(&flag).unwrap();

        assert!(wait_stopped(&flag));
        assert_eq!(flag.stop_cause(), Some(StopCause::Console));
    }

    #[test]
    fn end_of_input_requests_stop() {
        let flag = RunFlag::new();
        let mut source = ConsoleStopSource::new(Cursor::new(Vec::new()));
        source.arm(&flag).unwrap();

        assert!(wait_stopped(&flag));
        assert_eq!(flag.stop_cause(), Some(StopCause::Console));
    }

    #[test]
    fn read_error_requests_stop() {
        let flag = RunFlag::new();
        let mut source = ConsoleStopSource::new(BrokenReader);
        source.arm(&flag).unwrap();

        assert!(wait_stopped(&flag));
    }

    #[test]
    fn does_not_override_an_earlier_cause() {
        let flag = RunFlag::new();
        assert!(flag.request_stop(StopCause::Signal(15)));

        let mut source = ConsoleStopSource::new(Cursor::new(b"\n".to_vec()));
        source.arm(&flag).unwrap();
        thread::sleep(Duration::from_millis(50));

        assert_eq!(flag.stop_cause(), Some(StopCause::Signal(15)));
    }

    #[test]
    fn arming_twice_is_harmless() {
        let flag = RunFlag::new();
        let mut source = ConsoleStopSource::new(Cursor::new(b"\n".to_vec()));
        source.arm(&flag).unwrap();
        source.arm(&flag).unwrap();
        assert!(wait_stopped(&flag));
    }
}
