use std::cmp::min;
use std::io::{Error, ErrorKind, Read, Result, Write};
use std::sync::{Arc, Mutex};

/// A scripted server: reads replay `read_buf`, writes land in a buffer that outlives the
/// stream, so a test can inspect the commands after the session has taken ownership.
#[derive(Clone, Debug, Default)]
pub struct MockStream {
    read_buf: Vec<u8>,
    read_pos: usize,
    written: Arc<Mutex<Vec<u8>>>,
    err_on_read: bool,
}

impl MockStream {
    pub fn new(read_buf: impl Into<Vec<u8>>) -> MockStream {
        MockStream {
            read_buf: read_buf.into(),
            ..MockStream::default()
        }
    }

    /// Fail every read once the script is exhausted with an I/O error other than EOF.
    pub fn with_err(mut self) -> MockStream {
        self.err_on_read = true;
        self
    }

    pub fn written(&self) -> Written {
        Written(Arc::clone(&self.written))
    }
}

/// Everything written to a [`MockStream`].
#[derive(Clone, Debug)]
pub struct Written(Arc<Mutex<Vec<u8>>>);

impl Written {
    pub fn text(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.read_pos >= self.read_buf.len() {
            if self.err_on_read {
                return Err(Error::new(ErrorKind::ConnectionReset, "MockStream Error"));
            }
            return Err(Error::new(ErrorKind::UnexpectedEof, "EOF"));
        }
        let len = min(buf.len(), self.read_buf.len() - self.read_pos);
        buf[..len].copy_from_slice(&self.read_buf[self.read_pos..self.read_pos + len]);
        self.read_pos += len;
        Ok(len)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
