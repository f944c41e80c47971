// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for front-ends (dashboard, websocket clients,
// the CLI).  Every technical error maps to a short message plus a concrete
// suggestion for whoever is standing next to the printer.

use crate::error::LabelBridgeError;

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Printer busy, or a timeout.  Resubmitting may work.
    Transient,
    /// Someone has to do something (load labels, pick a printer).
    ActionRequired,
    /// Resubmitting the same request will fail the same way.
    Permanent,
}

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    /// Whether resubmitting unchanged could succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `LabelBridgeError` into a `HumanError`.
pub fn humanize_error(err: &LabelBridgeError) -> HumanError {
    match err {
        LabelBridgeError::ImageDecode(_) => HumanError {
            message: "The label image couldn't be read.".into(),
            suggestion: "Send the label as a PNG, JPEG, BMP or GIF and check the upload isn't truncated.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        LabelBridgeError::ImageEncode(_) => HumanError {
            message: "The label preview couldn't be produced.".into(),
            suggestion: "The label itself may still have printed. Check the printer.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        LabelBridgeError::InvalidLabelSize(detail) => HumanError {
            message: "That label size isn't possible.".into(),
            suggestion: format!("Width and height must be positive millimetre values. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        LabelBridgeError::DriverNotFound(name) => HumanError {
            message: format!("The printer \"{name}\" wasn't found."),
            suggestion: "Make sure it is switched on and connected, then refresh the printer list.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        LabelBridgeError::Transport(detail) => humanize_transport_error(detail),

        LabelBridgeError::InvalidState { status, .. } => HumanError {
            message: format!("This job is already {status:?}."),
            suggestion: "Only queued or printing jobs can be cancelled.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        LabelBridgeError::JobNotFound(_) => HumanError {
            message: "That print job doesn't exist.".into(),
            suggestion: "Jobs are kept in memory only; it may be from before a restart.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        LabelBridgeError::WorkerStopped => HumanError {
            message: "The print queue has stopped.".into(),
            suggestion: "Restart the label bridge.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        LabelBridgeError::InvalidRequest(detail) => HumanError {
            message: "The print request was incomplete or malformed.".into(),
            suggestion: format!("Check the request fields and try again. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        LabelBridgeError::Config(detail) => HumanError {
            message: "The bridge configuration is invalid.".into(),
            suggestion: format!("Fix the configuration file and restart. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        LabelBridgeError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "The file couldn't be found.".into(),
                suggestion: "Check the path and try again.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "Permission denied.".into(),
                suggestion: "On Linux, serial ports usually need membership in the dialout group.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "There was a problem reading or writing a file.".into(),
                suggestion: "Try again.".into(),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        LabelBridgeError::Serialization(_) => HumanError {
            message: "The bridge had an internal data problem.".into(),
            suggestion: "Check the request is valid JSON and try again.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}

/// Parse transport-level details (serial or socket) into plain messages.
fn humanize_transport_error(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("timed out") {
        HumanError {
            message: "The printer didn't respond in time.".into(),
            suggestion: "It may be busy, asleep, or switched off. Check it's on, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        }
    } else if lower.contains("connection refused") {
        HumanError {
            message: "The printer refused the connection.".into(),
            suggestion: "Check the printer's IP address and that raw printing (port 9100) is enabled.".into(),
            retriable: true,
            severity: Severity::Transient,
        }
    } else if lower.contains("no such file") || lower.contains("not found") {
        HumanError {
            message: "The printer's port has disappeared.".into(),
            suggestion: "The USB cable may have been unplugged. Reconnect it and refresh the printer list.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("busy") || lower.contains("permission denied") {
        HumanError {
            message: "The printer's port is in use.".into(),
            suggestion: "Close any other program talking to the printer and try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        }
    } else {
        HumanError {
            message: "The printer connection had a problem.".into(),
            suggestion: format!("Try again. If this keeps happening, power-cycle the printer. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}
