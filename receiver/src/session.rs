use frame_rx_common::config::Config;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};

use crate::dump::{session_dump_path, DumpStore};
use crate::error::{NoFramesReceived, SetupError, ValidationError};
use crate::pipeline::{FramePipeline, PipelineFactory, RxSessionOps};
use crate::worker::{SessionWorker, WorkerReport};

/// One receive session: its pipeline handle, frame thread and optional dump.
///
/// The pipeline handle is held until the session is dropped, which always
/// happens after the frame thread has been joined.
pub struct Session {
    index: usize,
    pipeline: Arc<dyn FramePipeline>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<WorkerReport>>,
    /// Comes back from the worker on join, closed right after.
    dump: Option<DumpStore>,
    received: u64,
}

impl Session {
    /// Set up session `index` and start its frame thread.
    ///
    /// Steps run strictly in order: pipeline, frame size, dump store, thread.
    /// Anything created before a failing step is released on return.
    pub fn create(
        index: usize,
        config: &Config,
        factory: &dyn PipelineFactory,
    ) -> Result<Self, SetupError> {
        let ops = RxSessionOps::for_session(config, index);
        let pipeline = factory
            .create(&ops)
            .map_err(|source| SetupError::Pipeline { index, source })?;

        let frame_size = pipeline.frame_size();
        if frame_size == 0 {
            return Err(SetupError::FrameSize { index });
        }
        info!(session = index, frame_size, "pipeline ready");

        let dump = if config.dump.enabled {
            let path = session_dump_path(
                Path::new(&config.dump.path),
                index,
                config.rx.sessions as usize,
            );
            let store = DumpStore::open(&path, frame_size, config.dump.frame_buffer_count)
                .map_err(|source| SetupError::Dump { index, source })?;
            Some(store)
        } else {
            None
        };

        let stop = Arc::new(AtomicBool::new(false));
        let worker = SessionWorker::new(index, Arc::clone(&pipeline), Arc::clone(&stop), dump)
            .spawn()
            .map_err(|source| SetupError::Thread { index, source })?;

        Ok(Self {
            index,
            pipeline,
            stop,
            worker: Some(worker),
            dump: None,
            received: 0,
        })
    }

    /// Raise the stop flag, wake the pipeline, join the thread, close the dump.
    /// Does nothing once the thread has been joined.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        self.pipeline.wake_blocked();

        match worker.join() {
            Ok(report) => {
                self.received = report.received;
                self.dump = report.dump;
            }
            Err(_) => {
                error!(session = self.index, "frame thread panicked");
            }
        }
        info!(session = self.index, received = self.received, "received frames");

        if let Some(dump) = self.dump.as_mut() {
            dump.close();
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Frames counted by the worker. Only meaningful after `stop`.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns every session of a run.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create sessions `0..config.rx.sessions` in order, stopping at the
    /// first failure. Sessions created before it stay in the registry so
    /// `teardown_all` can release them.
    pub fn create_all(
        &mut self,
        config: &Config,
        factory: &dyn PipelineFactory,
    ) -> Result<(), SetupError> {
        for index in 0..config.rx.sessions as usize {
            self.create_session(index, config, factory)?;
        }
        info!(sessions = self.sessions.len(), "all sessions started");
        Ok(())
    }

    pub fn create_session(
        &mut self,
        index: usize,
        config: &Config,
        factory: &dyn PipelineFactory,
    ) -> Result<&Session, SetupError> {
        let session = Session::create(index, config, factory).inspect_err(|e| {
            error!(session = index, error = %e, "session setup failed");
        })?;
        self.sessions.push(session);
        Ok(&self.sessions[self.sessions.len() - 1])
    }

    /// Stop sessions one by one in index order. Returns once every frame
    /// thread has been joined.
    pub fn stop_all(&mut self) {
        for session in &mut self.sessions {
            session.stop();
        }
    }

    /// Collect every session that received nothing. Call after `stop_all`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let failures: Vec<NoFramesReceived> = self
            .sessions
            .iter()
            .filter(|s| s.received() == 0)
            .map(|s| {
                error!(session = s.index(), received = s.received(), "no received frames");
                NoFramesReceived { index: s.index() }
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { failures })
        }
    }

    /// Release every session and its pipeline handle, stopping any that are
    /// still running.
    pub fn teardown_all(&mut self) {
        for mut session in self.sessions.drain(..) {
            session.stop();
            info!(session = session.index(), "session released");
        }
    }

    /// `(index, received)` for every session.
    pub fn received(&self) -> Vec<(usize, u64)> {
        self.sessions
            .iter()
            .map(|s| (s.index(), s.received()))
            .collect()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.teardown_all();
    }
}
