// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-operation transmit state machine shared by all drivers.
//
//   Idle -> Connecting -> Initializing -> Transmitting -> Finalizing -> Done
//
// Finalizing may loop back to Transmitting for the next copy.  Any phase
// after Idle may drop to Failed; Done and Failed are final.  Nothing is
// resumable: a failure aborts the operation and the transport is released.

use labelbridge_core::error::{LabelBridgeError, Result};
use labelbridge_raster::ProgramPhase;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitPhase {
    Idle,
    Connecting,
    Initializing,
    Transmitting,
    Finalizing,
    Done,
    Failed,
}

impl TransmitPhase {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self -> next` is a legal move.  Re-entering the current
    /// phase is allowed so that multi-segment phases stay simple.
    pub fn can_enter(self, next: TransmitPhase) -> bool {
        use TransmitPhase::*;
        if self == next {
            return !self.is_finished();
        }
        match (self, next) {
            (Idle, Connecting) => true,
            (Connecting, Initializing) => true,
            (Initializing, Transmitting) => true,
            (Transmitting, Finalizing) => true,
            (Finalizing, Transmitting | Done) => true,
            (Idle | Done | Failed, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

impl From<ProgramPhase> for TransmitPhase {
    fn from(phase: ProgramPhase) -> Self {
        match phase {
            ProgramPhase::Initialize => Self::Initializing,
            ProgramPhase::Transmit => Self::Transmitting,
            ProgramPhase::Finalize => Self::Finalizing,
        }
    }
}

/// Tracks one print operation against one printer.
#[derive(Debug)]
pub struct TransmitSession {
    printer: String,
    phase: TransmitPhase,
}

impl TransmitSession {
    pub fn new(printer: impl Into<String>) -> Self {
        Self {
            printer: printer.into(),
            phase: TransmitPhase::Idle,
        }
    }

    pub fn phase(&self) -> TransmitPhase {
        self.phase
    }

    pub fn printer(&self) -> &str {
        &self.printer
    }

    /// Move to `next`.
    pub fn enter(&mut self, next: TransmitPhase) -> Result<()> {
        if !self.phase.can_enter(next) {
            return Err(LabelBridgeError::Transport(format!(
                "{}: cannot move from {:?} to {:?}",
                self.printer, self.phase, next
            )));
        }
        if self.phase != next {
            debug!(printer = %self.printer, from = ?self.phase, to = ?next, "transmit phase");
        }
        self.phase = next;
        Ok(())
    }

    /// Mark the session done.  Only legal from Finalizing.
    pub fn finish(&mut self) -> Result<()> {
        self.enter(TransmitPhase::Done)
    }

    /// Abort the session and tag `err` with the phase it happened in.
    pub fn abort(&mut self, err: LabelBridgeError) -> LabelBridgeError {
        let during = self.phase;
        if self.phase.can_enter(TransmitPhase::Failed) {
            self.phase = TransmitPhase::Failed;
        }
        warn!(printer = %self.printer, phase = ?during, error = %err, "transmit aborted");
        match err {
            LabelBridgeError::Transport(detail) => {
                LabelBridgeError::Transport(format!("{detail} (while {})", phase_verb(during)))
            }
            other => other,
        }
    }
}

fn phase_verb(phase: TransmitPhase) -> &'static str {
    match phase {
        TransmitPhase::Idle => "idle",
        TransmitPhase::Connecting => "connecting",
        TransmitPhase::Initializing => "initializing",
        TransmitPhase::Transmitting => "transmitting",
        TransmitPhase::Finalizing => "finalizing",
        TransmitPhase::Done => "done",
        TransmitPhase::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_with_two_copies() {
        let mut session = TransmitSession::new("Loopback");
        for phase in [
            TransmitPhase::Connecting,
            TransmitPhase::Initializing,
            TransmitPhase::Transmitting,
            TransmitPhase::Transmitting,
            TransmitPhase::Finalizing,
            TransmitPhase::Transmitting,
            TransmitPhase::Finalizing,
        ] {
            session.enter(phase).expect("legal phase");
        }
        session.finish().expect("finish");
        assert_eq!(session.phase(), TransmitPhase::Done);
    }

    #[test]
    fn cannot_skip_connecting() {
        let mut session = TransmitSession::new("Loopback");
        assert!(session.enter(TransmitPhase::Transmitting).is_err());
        assert_eq!(session.phase(), TransmitPhase::Idle);
    }

    #[test]
    fn done_is_final() {
        assert!(!TransmitPhase::Done.can_enter(TransmitPhase::Failed));
        assert!(!TransmitPhase::Done.can_enter(TransmitPhase::Done));
        assert!(!TransmitPhase::Failed.can_enter(TransmitPhase::Connecting));
    }

    #[test]
    fn abort_records_phase() {
        let mut session = TransmitSession::new("Net-10.0.0.5:9100");
        session.enter(TransmitPhase::Connecting).expect("connect");
        let err = session.abort(LabelBridgeError::Transport("connection refused".into()));
        assert_eq!(session.phase(), TransmitPhase::Failed);
        assert!(err.to_string().contains("while connecting"));
    }

    #[test]
    fn program_phases_map_to_transmit_phases() {
        assert_eq!(TransmitPhase::from(ProgramPhase::Initialize), TransmitPhase::Initializing);
        assert_eq!(TransmitPhase::from(ProgramPhase::Finalize), TransmitPhase::Finalizing);
    }
}
