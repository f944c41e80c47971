// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON-lines wire format for `labelbridge serve`.
//
// One request object per input line, one response object per output line.
// Both are tagged by a `type` field:
//
//   {"type":"status","printerName":"Serial-/dev/ttyUSB0"}
//   {"type":"status","printerName":"Serial-/dev/ttyUSB0","status":{...}}

use labelbridge_core::human_errors::humanize_error;
use labelbridge_core::request::{SubmitRequest, SubmitResponse};
use labelbridge_core::{JobId, LabelBridgeError, PrintJob, PrinterStatus, RenderPreview};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeRequest {
    /// Print and wait for the final status.
    Submit(SubmitRequest),
    /// Queue and answer immediately.
    Enqueue(SubmitRequest),
    #[serde(rename_all = "camelCase")]
    Job { job_id: String },
    Jobs,
    #[serde(rename_all = "camelCase")]
    Cancel { job_id: String },
    Printers,
    #[serde(rename_all = "camelCase")]
    Status { printer_name: String },
    #[serde(rename_all = "camelCase")]
    Test { printer_name: String },
    Previews,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeResponse {
    Submitted(SubmitResponse),
    #[serde(rename_all = "camelCase")]
    Job { job: PrintJob },
    #[serde(rename_all = "camelCase")]
    Jobs { jobs: Vec<PrintJob> },
    #[serde(rename_all = "camelCase")]
    Cancelled {
        job_id: JobId,
        cancelled: bool,
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Printers { printers: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Status {
        printer_name: String,
        status: PrinterStatus,
    },
    #[serde(rename_all = "camelCase")]
    Test { printer_name: String, ok: bool },
    #[serde(rename_all = "camelCase")]
    Previews { previews: Vec<RenderPreview> },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        suggestion: String,
        retriable: bool,
        detail: String,
    },
}

impl BridgeResponse {
    pub fn error(err: &LabelBridgeError) -> Self {
        let human = humanize_error(err);
        Self::Error {
            message: human.message,
            suggestion: human.suggestion,
            retriable: human.retriable,
            detail: err.to_string(),
        }
    }

    /// One output line, without the trailing newline.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"response could not be encoded","detail":"{e}"}}"#)
        })
    }
}

/// Parse one input line.
pub fn parse_line(line: &str) -> Result<BridgeRequest, LabelBridgeError> {
    serde_json::from_str(line.trim())
        .map_err(|e| LabelBridgeError::InvalidRequest(format!("unreadable request: {e}")))
}
