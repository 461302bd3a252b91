use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::warn;

type Sink = Box<dyn Write + Send>;

/// Destination of the solver's progress and result messages. The text is
/// advisory; write failures are logged and otherwise ignored.
#[derive(Clone)]
pub struct Output {
    sink: Arc<Mutex<Sink>>,
}

impl Default for Output {
    fn default() -> Self {
        Output::from_writer(io::stdout())
    }
}

impl Output {
    pub fn from_writer(writer: impl Write + Send + 'static) -> Output {
        Output {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn line(&self, text: &str) {
        if let Err(err) = writeln!(self.lock(), "{text}") {
            warn!("could not write solver output: {err}");
        }
    }

    /// Writes multi-line text as is.
    pub fn block(&self, text: &str) {
        if let Err(err) = self.lock().write_all(text.as_bytes()) {
            warn!("could not write solver output: {err}");
        }
    }

    /// Redirects all messages to `path` until the returned guard is dropped.
    pub fn capture_to_file(&self, path: &Path) -> io::Result<OutputCapture> {
        let file = File::create(path)?;
        let previous = self.replace(Box::new(BufWriter::new(file)));
        Ok(OutputCapture {
            output: self.clone(),
            previous: Some(previous),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Sink> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, sink: Sink) -> Sink {
        std::mem::replace(&mut *self.lock(), sink)
    }
}

/// Restores the previous destination when dropped, flushing the capture
/// file first.
pub struct OutputCapture {
    output: Output,
    previous: Option<Sink>,
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let mut capture = self.output.replace(previous);
            if let Err(err) = capture.flush() {
                warn!("could not flush captured output: {err}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn capture_restores_destination() {
        let buffer = Buffer::default();
        let output = Output::from_writer(buffer.clone());
        output.line("before");
        let path = std::env::temp_dir().join(format!("reluplexr_output_{}", std::process::id()));
        {
            let _capture = output.capture_to_file(&path).unwrap();
            output.line("captured");
        }
        output.block("after\n");
        assert_eq!(buffer.text(), "before\nafter\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "captured\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn failed_capture_keeps_destination() {
        let buffer = Buffer::default();
        let output = Output::from_writer(buffer.clone());
        assert!(output
            .capture_to_file(Path::new("/nonexistent/dir/out.txt"))
            .is_err());
        output.line("still here");
        assert_eq!(buffer.text(), "still here\n");
    }
}
