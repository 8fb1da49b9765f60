use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;

/// A [`MakeWriter`] that buffers every line written to it in memory instead of printing it,
/// for asserting on log output in tests.
#[derive(Debug, Default, Clone)]
pub struct CapturingWriter {
    content: Arc<Mutex<String>>,
}

impl std::io::Write for CapturingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = std::str::from_utf8(buf).map_err(std::io::Error::other)?;
        self.content.lock().unwrap().push_str(line);

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturingWriter {
    pub fn lines(&self) -> MutexGuard<'_, String> {
        self.content.lock().unwrap()
    }
}

impl<'a> MakeWriter<'a> for CapturingWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
