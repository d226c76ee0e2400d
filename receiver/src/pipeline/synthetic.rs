use chrono::Utc;
use frame_rx_common::frame::{Frame, UserMeta};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{FramePipeline, PipelineError, PipelineFactory, RxSessionOps};

/// In-process producer that paces frames at the session frame rate.
///
/// Frames come out of a fixed pool of `framebuffer_count` buffers; once every
/// buffer is lent out `get_frame` waits until one is put back. Each frame is
/// filled with the low byte of its sequence number.
pub struct SyntheticPipeline {
    name: String,
    frame_size: usize,
    interval: Duration,
    timeout: Duration,
    user_meta: bool,
    state: Mutex<PoolState>,
    cond: Condvar,
}

struct PoolState {
    free: Vec<(usize, Vec<u8>)>,
    next_due: Instant,
    seq: u64,
    woken: bool,
}

impl SyntheticPipeline {
    pub fn new(ops: &RxSessionOps) -> Result<Self, PipelineError> {
        let frame_size = match ops.frame_size() {
            Some(0) | None => {
                return Err(PipelineError::Create {
                    name: ops.name.clone(),
                    reason: format!("unusable frame size for {}x{}", ops.width, ops.height),
                });
            }
            Some(size) => size,
        };
        if ops.framebuffer_count == 0 {
            return Err(PipelineError::Create {
                name: ops.name.clone(),
                reason: "no framebuffers".into(),
            });
        }
        let interval = Duration::try_from_secs_f64(1.0 / ops.fps)
            .ok()
            .filter(|_| ops.fps > 0.0)
            .ok_or_else(|| PipelineError::Create {
                name: ops.name.clone(),
                reason: format!("invalid fps {}", ops.fps),
            })?;

        let free = (0..ops.framebuffer_count as usize)
            .map(|i| (i, vec![0u8; frame_size]))
            .collect();

        info!(
            name = ops.name,
            primary = %ops.primary.ip,
            udp_port = ops.primary.udp_port,
            num_ports = ops.num_ports(),
            width = ops.width,
            height = ops.height,
            fps = ops.fps,
            format = ?ops.output_format,
            frame_size,
            "synthetic pipeline created"
        );

        Ok(Self {
            name: ops.name.clone(),
            frame_size,
            interval,
            timeout: ops.get_timeout,
            user_meta: ops.user_meta,
            state: Mutex::new(PoolState {
                free,
                next_due: Instant::now(),
                seq: 0,
                woken: false,
            }),
            cond: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FramePipeline for SyntheticPipeline {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn get_frame(&self) -> Option<Frame> {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.lock();
        loop {
            if state.woken {
                state.woken = false;
                return None;
            }

            let now = Instant::now();
            if now >= state.next_due {
                if let Some((buffer_index, mut data)) = state.free.pop() {
                    let seq = state.seq;
                    state.seq += 1;
                    // don't burst to catch up after a stall
                    state.next_due = (state.next_due + self.interval).max(now);
                    drop(state);

                    data.fill(seq as u8);
                    let user_meta = self
                        .user_meta
                        .then(|| UserMeta::new(seq as i32, self.name.as_str()).encode());
                    return Some(Frame {
                        data,
                        seq,
                        captured_at_ms: Utc::now().timestamp_millis(),
                        buffer_index,
                        user_meta,
                    });
                }
            }

            if now >= deadline {
                return None;
            }
            let wait_until = if state.free.is_empty() {
                deadline
            } else {
                state.next_due.min(deadline)
            };
            state = self
                .cond
                .wait_timeout(state, wait_until.saturating_duration_since(now))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn put_frame(&self, frame: Frame) {
        let mut state = self.lock();
        state.free.push((frame.buffer_index, frame.data));
        drop(state);
        self.cond.notify_all();
    }

    fn wake_blocked(&self) {
        self.lock().woken = true;
        self.cond.notify_all();
    }
}

impl Drop for SyntheticPipeline {
    fn drop(&mut self) {
        let state = self.lock();
        debug!(name = self.name, frames = state.seq, "synthetic pipeline freed");
    }
}

#[derive(Debug, Default)]
pub struct SyntheticFactory;

impl PipelineFactory for SyntheticFactory {
    fn create(&self, ops: &RxSessionOps) -> Result<Arc<dyn FramePipeline>, PipelineError> {
        Ok(Arc::new(SyntheticPipeline::new(ops)?))
    }
}
