use frame_rx_common::frame::{Frame, UserMeta};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dump::DumpStore;
use crate::pipeline::FramePipeline;

/// What a worker hands back when its thread is joined.
pub struct WorkerReport {
    pub received: u64,
    pub dump: Option<DumpStore>,
}

/// Frame loop of one session, run on its own thread.
///
/// Pulls frames until the stop flag is seen, copies each one into the dump
/// store if there is one, counts it and gives it back to the pipeline.
pub struct SessionWorker {
    index: usize,
    pipeline: Arc<dyn FramePipeline>,
    stop: Arc<AtomicBool>,
    dump: Option<DumpStore>,
    frame_size: usize,
    received: u64,
}

impl SessionWorker {
    pub fn new(
        index: usize,
        pipeline: Arc<dyn FramePipeline>,
        stop: Arc<AtomicBool>,
        dump: Option<DumpStore>,
    ) -> Self {
        let frame_size = pipeline.frame_size();
        Self {
            index,
            pipeline,
            stop,
            dump,
            frame_size,
            received: 0,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<WorkerReport>> {
        std::thread::Builder::new()
            .name(format!("rx-session-{}", self.index))
            .spawn(move || self.run())
    }

    pub fn run(mut self) -> WorkerReport {
        info!(session = self.index, "frame thread start");
        while !self.stop.load(Ordering::Acquire) {
            let Some(frame) = self.pipeline.get_frame() else {
                if !self.stop.load(Ordering::Acquire) {
                    warn!(session = self.index, "get frame timed out");
                }
                continue;
            };
            debug!(session = self.index, seq = frame.seq, "new frame");
            self.check_user_meta(&frame);
            self.consume(&frame);
            self.pipeline.put_frame(frame);
        }
        info!(session = self.index, received = self.received, "frame thread stop");

        WorkerReport {
            received: self.received,
            dump: self.dump,
        }
    }

    fn check_user_meta(&self, frame: &Frame) {
        let Some(raw) = frame.user_meta.as_deref() else {
            return;
        };
        let meta = match UserMeta::decode(raw) {
            Ok(meta) => meta,
            Err(e) => {
                error!(session = self.index, seq = frame.seq, error = %e, "user meta size wrong");
                UserMeta::decode_lossy(raw)
            }
        };
        debug!(session = self.index, idx = meta.idx, dummy = meta.dummy, "user meta");
    }

    fn consume(&mut self, frame: &Frame) {
        self.received += 1;
        let Some(dump) = self.dump.as_mut() else {
            return;
        };
        if frame.data.len() < self.frame_size {
            warn!(
                session = self.index,
                len = frame.data.len(),
                frame_size = self.frame_size,
                "short frame, dumping what is there"
            );
        }
        dump.write(&frame.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::scripted::{frame, ScriptedPipeline};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn stop(
        pipeline: &ScriptedPipeline,
        flag: &AtomicBool,
        handle: JoinHandle<WorkerReport>,
    ) -> WorkerReport {
        flag.store(true, Ordering::Release);
        pipeline.wake_blocked();
        handle.join().unwrap()
    }

    #[test]
    fn counts_every_frame_and_returns_it() {
        let pipeline = Arc::new(ScriptedPipeline::numbered(64, 5, Duration::from_millis(20)));
        let flag = Arc::new(AtomicBool::new(false));
        let worker = SessionWorker::new(0, pipeline.clone(), flag.clone(), None);
        let handle = worker.spawn().unwrap();

        assert!(pipeline.wait_drained(WAIT));
        let report = stop(&pipeline, &flag, handle);
        assert_eq!(report.received, 5);
        assert_eq!(pipeline.returned(), 5);
        assert!(report.dump.is_none());
    }

    #[test]
    fn bad_user_meta_still_counted() {
        let frames = vec![
            frame(16, 1, Some(vec![0; 3])),
            frame(16, 2, Some(UserMeta::new(2, "ok").encode())),
            frame(16, 3, None),
        ];
        let pipeline = Arc::new(ScriptedPipeline::new(16, frames, Duration::from_millis(20)));
        let flag = Arc::new(AtomicBool::new(false));
        let handle = SessionWorker::new(1, pipeline.clone(), flag.clone(), None)
            .spawn()
            .unwrap();

        assert!(pipeline.wait_drained(WAIT));
        let report = stop(&pipeline, &flag, handle);
        assert_eq!(report.received, 3);
    }

    #[test]
    fn writes_frames_to_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.yuv");
        let dump = DumpStore::open(&path, 10, 2).unwrap();
        let pipeline = Arc::new(ScriptedPipeline::numbered(10, 3, Duration::from_millis(20)));
        let flag = Arc::new(AtomicBool::new(false));
        let handle = SessionWorker::new(0, pipeline.clone(), flag.clone(), Some(dump))
            .spawn()
            .unwrap();

        assert!(pipeline.wait_drained(WAIT));
        let mut report = stop(&pipeline, &flag, handle);
        assert_eq!(report.received, 3);
        let mut dump = report.dump.take().unwrap();
        dump.close();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, [vec![3u8; 10], vec![2u8; 10]].concat());
    }

    #[test]
    fn stop_without_frames_exits_promptly() {
        // long timeout: only the wake can get the worker out in time
        let pipeline = Arc::new(ScriptedPipeline::numbered(8, 0, Duration::from_secs(600)));
        let flag = Arc::new(AtomicBool::new(false));
        let handle = SessionWorker::new(0, pipeline.clone(), flag.clone(), None)
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let report = stop(&pipeline, &flag, handle);
        assert_eq!(report.received, 0);
        assert_eq!(pipeline.wakes(), 1);
    }

    #[test]
    fn keeps_retrying_after_timeouts() {
        let pipeline = Arc::new(ScriptedPipeline::numbered(8, 0, Duration::from_millis(1)));
        let flag = Arc::new(AtomicBool::new(false));
        let handle = SessionWorker::new(0, pipeline.clone(), flag.clone(), None)
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_finished());

        let report = stop(&pipeline, &flag, handle);
        assert_eq!(report.received, 0);
    }
}
