// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job submission contract shared by every front-end.
//
// HTTP forms, websocket messages, and the JSON-lines CLI all reduce to a
// `SubmitRequest`.  Images travel as base64, optionally wrapped in a
// `data:image/png;base64,` URL as browsers produce from a canvas.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{LabelBridgeError, Result};
use crate::types::{JobId, JobStatus, LabelImageFormat, PrintJob, PrintSettings};

/// A request to print one label image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub job_name: Option<String>,
    pub printer_name: String,
    /// Base64 image bytes or a `data:image/...;base64,` URL.
    pub image: String,
    pub image_format: Option<String>,
    pub copies: Option<u32>,
    pub width_mm: f64,
    pub height_mm: f64,
    pub auto_cut: Option<bool>,
    pub label_type: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl SubmitRequest {
    /// Validate the request and turn it into a pending `PrintJob`.
    pub fn into_job(self) -> Result<PrintJob> {
        let printer_name = self.printer_name.trim().to_owned();
        if printer_name.is_empty() {
            return Err(LabelBridgeError::InvalidRequest("printer name is required".into()));
        }

        let (bytes, url_format) = decode_image_payload(&self.image)?;

        let image_format = match self.image_format.as_deref() {
            Some(declared) => LabelImageFormat::from_extension(declared).ok_or_else(|| {
                LabelBridgeError::InvalidRequest(format!("unsupported image format: {declared}"))
            })?,
            None => url_format.unwrap_or_default(),
        };

        let job_name = self
            .job_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(default_job_name);

        let settings = PrintSettings {
            printer_name,
            copies: self.copies.unwrap_or(1).max(1),
            width_mm: self.width_mm,
            height_mm: self.height_mm,
            auto_cut: self.auto_cut.unwrap_or(true),
            label_type: self.label_type,
            options: self.options,
        };

        Ok(PrintJob::new(job_name, bytes, image_format, settings))
    }
}

/// What a front-end gets back after submitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: Option<String>,
}

impl From<&PrintJob> for SubmitResponse {
    fn from(job: &PrintJob) -> Self {
        let message = match job.status {
            JobStatus::Completed => Some("Print job submitted successfully".to_owned()),
            JobStatus::Pending => Some("Print job queued".to_owned()),
            _ => job.error_message.clone(),
        };
        Self {
            job_id: job.id,
            status: job.status,
            message,
        }
    }
}

/// Decode a base64 payload, stripping a `data:` URL prefix if present.
///
/// Returns the bytes plus the format named by the data URL, if any.
pub fn decode_image_payload(payload: &str) -> Result<(Vec<u8>, Option<LabelImageFormat>)> {
    let payload = payload.trim();
    let (format, body) = match split_data_url(payload) {
        Some((mime, body)) => (LabelImageFormat::from_extension(mime), body),
        None => (None, payload),
    };

    if body.is_empty() {
        return Err(LabelBridgeError::InvalidRequest("image data is empty".into()));
    }

    let bytes = STANDARD
        .decode(body)
        .map_err(|e| LabelBridgeError::InvalidRequest(format!("image is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(LabelBridgeError::InvalidRequest("image data is empty".into()));
    }
    Ok((bytes, format))
}

/// Split `data:image/<subtype>;base64,<body>` into `(subtype, body)`.
fn split_data_url(payload: &str) -> Option<(&str, &str)> {
    let prefix = payload.get(..11)?;
    if !prefix.eq_ignore_ascii_case("data:image/") {
        return None;
    }
    let rest = &payload[11..];
    let (header, body) = rest.split_once(',')?;
    let subtype = header.strip_suffix(";base64").or_else(|| header.strip_suffix(";BASE64"))?;
    Some((subtype, body))
}

fn default_job_name() -> String {
    format!("Print Job {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
}
