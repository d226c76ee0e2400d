use crate::dump::DumpError;
use crate::pipeline::PipelineError;

/// Fatal failure while bringing up one session.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("session {index}: {source}")]
    Pipeline { index: usize, source: PipelineError },
    #[error("session {index}: pipeline reported a zero frame size")]
    FrameSize { index: usize },
    #[error("session {index}: {source}")]
    Dump { index: usize, source: DumpError },
    #[error("session {index}: failed to spawn frame thread: {source}")]
    Thread {
        index: usize,
        source: std::io::Error,
    },
}

impl SetupError {
    pub fn index(&self) -> usize {
        match self {
            SetupError::Pipeline { index, .. }
            | SetupError::FrameSize { index }
            | SetupError::Dump { index, .. }
            | SetupError::Thread { index, .. } => *index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session {index}: no frames received")]
pub struct NoFramesReceived {
    pub index: usize,
}

/// Every session that came out of a run without a single frame.
#[derive(Debug, thiserror::Error)]
#[error("{} session(s) received no frames: {:?}", .failures.len(), indices(.failures))]
pub struct ValidationError {
    pub failures: Vec<NoFramesReceived>,
}

impl ValidationError {
    pub fn indices(&self) -> Vec<usize> {
        indices(&self.failures)
    }
}

fn indices(failures: &[NoFramesReceived]) -> Vec<usize> {
    failures.iter().map(|f| f.index).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}
