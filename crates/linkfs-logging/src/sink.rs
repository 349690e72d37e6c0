// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Log sink that can move between the local writer and a session log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkMode {
    /// The writer the subscriber was initialized with.
    Local,
    /// The attached session log; events are dropped while none is attached.
    Session,
}

#[derive(Default)]
struct SinkState {
    session: bool,
    file: Option<(PathBuf, Arc<File>)>,
}

/// `MakeWriter` shared between the subscriber and whoever switches modes.
#[derive(Clone)]
pub struct SessionSink {
    local: Arc<BoxMakeWriter>,
    state: Arc<RwLock<SinkState>>,
}

impl SessionSink {
    pub fn new<W>(local: W) -> Self
    where
        W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    {
        Self {
            local: Arc::new(BoxMakeWriter::new(local)),
            state: Arc::new(RwLock::new(SinkState::default())),
        }
    }

    pub fn mode(&self) -> SinkMode {
        match self.state.read() {
            Ok(state) if state.session => SinkMode::Session,
            _ => SinkMode::Local,
        }
    }

    pub fn set_mode(&self, mode: SinkMode) {
        if let Ok(mut state) = self.state.write() {
            state.session = mode == SinkMode::Session;
        }
    }

    /// Opens `path` for appending and makes it the session log.
    pub fn attach(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Ok(mut state) = self.state.write() {
            state.file = Some((path.to_path_buf(), Arc::new(file)));
        }
        Ok(())
    }

    pub fn detach(&self) {
        if let Ok(mut state) = self.state.write() {
            state.file = None;
        }
    }

    pub fn attached_path(&self) -> Option<PathBuf> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.file.as_ref().map(|(path, _)| path.clone()))
    }
}

/// `&File` writes go straight to the descriptor, so each event line is a
/// single append.
struct SharedFile(Arc<File>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

impl<'a> MakeWriter<'a> for SessionSink {
    type Writer = Box<dyn Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        let session_file = match self.state.read() {
            Ok(state) if state.session => Some(state.file.as_ref().map(|(_, f)| Arc::clone(f))),
            _ => None,
        };
        match session_file {
            None => self.local.make_writer(),
            Some(Some(file)) => Box::new(SharedFile(file)),
            Some(None) => Box::new(io::sink()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn switches_between_local_and_session() {
        let captured = Captured::default();
        let local = captured.clone();
        let sink = SessionSink::new(move || local.clone());
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("session.log");

        sink.make_writer().write_all(b"local\n").unwrap();
        sink.set_mode(SinkMode::Session);
        sink.make_writer().write_all(b"dropped\n").unwrap();
        sink.attach(&log).unwrap();
        sink.make_writer().write_all(b"shared\n").unwrap();
        sink.set_mode(SinkMode::Local);
        sink.make_writer().write_all(b"local again\n").unwrap();

        assert_eq!(
            String::from_utf8(captured.0.lock().unwrap().clone()).unwrap(),
            "local\nlocal again\n"
        );
        assert_eq!(fs::read_to_string(&log).unwrap(), "shared\n");
        assert_eq!(sink.attached_path(), Some(log));
        sink.detach();
        assert_eq!(sink.attached_path(), None);
    }
}
