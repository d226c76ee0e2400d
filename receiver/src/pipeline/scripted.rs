//! Pipeline double for tests: hands out a fixed list of frames, then blocks.

use frame_rx_common::frame::Frame;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use super::{FramePipeline, PipelineError, PipelineFactory, RxSessionOps};

#[derive(Default)]
struct Script {
    pending: VecDeque<Frame>,
    handed_out: usize,
    returned: usize,
    woken: bool,
    wakes: usize,
}

pub struct ScriptedPipeline {
    frame_size: usize,
    timeout: Duration,
    script: Mutex<Script>,
    cond: Condvar,
    destroyed: Arc<AtomicUsize>,
}

impl ScriptedPipeline {
    pub fn new(frame_size: usize, frames: Vec<Frame>, timeout: Duration) -> Self {
        Self {
            frame_size,
            timeout,
            script: Mutex::new(Script {
                pending: frames.into(),
                ..Default::default()
            }),
            cond: Condvar::new(),
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `count` frames of `frame_size` bytes, frame k filled with `k + 1`.
    pub fn numbered(frame_size: usize, count: usize, timeout: Duration) -> Self {
        let frames = (0..count)
            .map(|k| frame(frame_size, k as u8 + 1, None))
            .collect();
        Self::new(frame_size, frames, timeout)
    }

    fn with_destroy_counter(mut self, destroyed: Arc<AtomicUsize>) -> Self {
        self.destroyed = destroyed;
        self
    }

    /// Wait until every scripted frame has been taken and put back.
    pub fn wait_drained(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let mut script = self.script.lock().unwrap();
        while !(script.pending.is_empty() && script.returned == script.handed_out) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            script = self.cond.wait_timeout(script, deadline - now).unwrap().0;
        }
        true
    }

    pub fn returned(&self) -> usize {
        self.script.lock().unwrap().returned
    }

    pub fn wakes(&self) -> usize {
        self.script.lock().unwrap().wakes
    }
}

pub fn frame(size: usize, fill: u8, user_meta: Option<Vec<u8>>) -> Frame {
    Frame {
        data: vec![fill; size],
        seq: fill as u64,
        captured_at_ms: 0,
        buffer_index: 0,
        user_meta,
    }
}

impl FramePipeline for ScriptedPipeline {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn get_frame(&self) -> Option<Frame> {
        let deadline = Instant::now() + self.timeout;
        let mut script = self.script.lock().unwrap();
        loop {
            if script.woken {
                script.woken = false;
                return None;
            }
            if let Some(frame) = script.pending.pop_front() {
                script.handed_out += 1;
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            script = self.cond.wait_timeout(script, deadline - now).unwrap().0;
        }
    }

    fn put_frame(&self, _frame: Frame) {
        self.script.lock().unwrap().returned += 1;
        self.cond.notify_all();
    }

    fn wake_blocked(&self) {
        let mut script = self.script.lock().unwrap();
        script.woken = true;
        script.wakes += 1;
        drop(script);
        self.cond.notify_all();
    }
}

impl Drop for ScriptedPipeline {
    fn drop(&mut self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out scripted pipelines, optionally failing for one index.
pub struct ScriptedFactory {
    frame_size: usize,
    frames_per_session: Vec<usize>,
    timeout: Duration,
    fail_at: Option<usize>,
    created: Mutex<Vec<Weak<ScriptedPipeline>>>,
    pub create_calls: AtomicUsize,
    pub destroyed: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new(frame_size: usize, frames_per_session: Vec<usize>, timeout: Duration) -> Self {
        Self {
            frame_size,
            frames_per_session,
            timeout,
            fail_at: None,
            created: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Live pipeline created for the `n`th successful `create` call.
    pub fn pipeline(&self, n: usize) -> Option<Arc<ScriptedPipeline>> {
        self.created.lock().unwrap().get(n).and_then(Weak::upgrade)
    }

    pub fn wait_all_drained(&self, limit: Duration) -> bool {
        let live: Vec<_> = self
            .created
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        live.iter().all(|p| p.wait_drained(limit))
    }
}

impl PipelineFactory for ScriptedFactory {
    fn create(&self, ops: &RxSessionOps) -> Result<Arc<dyn FramePipeline>, PipelineError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(ops.index) {
            return Err(PipelineError::Create {
                name: ops.name.clone(),
                reason: "scripted failure".into(),
            });
        }
        let count = self.frames_per_session.get(ops.index).copied().unwrap_or(0);
        let pipeline = Arc::new(
            ScriptedPipeline::numbered(self.frame_size, count, self.timeout)
                .with_destroy_counter(Arc::clone(&self.destroyed)),
        );
        self.created.lock().unwrap().push(Arc::downgrade(&pipeline));
        Ok(pipeline)
    }
}
