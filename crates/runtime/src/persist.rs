// Path: crates/runtime/src/persist.rs

//! Persistence seams.
//!
//! The durable layout is an append-only server-frame log plus, per replica,
//! the latest state snapshot (the replica map itself, drained at shutdown).
//! Real drivers live with the host; the traits here are the contract, and
//! the in-memory log backs tests.

use xln_types::error::RuntimeError;
use xln_types::server::ServerFrame;

/// An append-only log of server frames.
pub trait FrameLog {
    /// Appends one committed frame. Failure is exit-code-2 territory.
    fn append(&mut self, frame: &ServerFrame) -> Result<(), RuntimeError>;
}

/// In-memory frame log for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemFrameLog {
    frames: Vec<ServerFrame>,
}

impl MemFrameLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames appended so far.
    pub fn frames(&self) -> &[ServerFrame] {
        &self.frames
    }
}

impl FrameLog for MemFrameLog {
    fn append(&mut self, frame: &ServerFrame) -> Result<(), RuntimeError> {
        if let Some(last) = self.frames.last() {
            if frame.height != last.height + 1 {
                return Err(RuntimeError::Persistence(format!(
                    "frame height {} does not extend log at {}",
                    frame.height, last.height
                )));
            }
        }
        self.frames.push(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(height: u64) -> ServerFrame {
        ServerFrame {
            height,
            timestamp: 0,
            root: [0u8; 32],
            inputs_root: [0u8; 32],
            batch: vec![],
        }
    }

    #[test]
    fn log_is_append_only_and_gapless() {
        let mut log = MemFrameLog::new();
        log.append(&frame(1)).unwrap();
        log.append(&frame(2)).unwrap();
        let err = log.append(&frame(4)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(log.frames().len(), 2);
    }
}
