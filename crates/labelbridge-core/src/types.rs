// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the labelbridge print bridge.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::digest::hash_bytes;
use crate::error::{LabelBridgeError, Result};

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job id from its hyphenated string form.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| LabelBridgeError::InvalidRequest(format!("bad job id {s:?}: {e}")))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a print job.
///
/// Status only moves forward: `Pending -> Processing -> {Completed, Failed,
/// Cancelled}`, with `Pending` also allowed to jump straight to `Failed` or
/// `Cancelled`.  Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Stored, waiting to be sent.
    Pending,
    /// Currently being rendered and transmitted to the printer.
    Processing,
    /// The printer accepted the whole command stream.
    Completed,
    /// Printing failed.  See the job error field.
    Failed,
    /// Cancelled before or during transmission.
    Cancelled,
}

impl JobStatus {
    /// Whether this status is final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` respects the forward-only lifecycle.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Processing | Self::Failed | Self::Cancelled),
            Self::Processing => matches!(next, Self::Completed | Self::Failed | Self::Cancelled),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

/// Declared format of a submitted label image.
///
/// The raster encoder sniffs the actual bytes; the declared format is kept
/// for job records and MIME reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LabelImageFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Gif,
}

impl LabelImageFormat {
    /// MIME type string.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
        }
    }

    /// Infer the format from a file extension or a format name such as "PNG".
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "bmp" => Some(Self::Bmp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }
}

/// Physical label dimensions in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl LabelSize {
    pub fn new(width_mm: f64, height_mm: f64) -> Self {
        Self {
            width_mm,
            height_mm,
        }
    }
}

impl Default for LabelSize {
    /// The 56 x 31 mm shipping label the bridge was built around.
    fn default() -> Self {
        Self::new(56.0, 31.0)
    }
}

/// Print settings for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintSettings {
    /// Logical printer name the job is routed to.
    pub printer_name: String,
    pub copies: u32,
    pub width_mm: f64,
    pub height_mm: f64,
    /// Cut after each label instead of feeding three lines.
    pub auto_cut: bool,
    pub label_type: Option<String>,
    /// Driver-specific extras.  Values are passed through untouched.
    pub options: BTreeMap<String, serde_json::Value>,
}

impl PrintSettings {
    /// Settings for `printer_name` with the given label size and defaults
    /// for everything else.
    pub fn new(printer_name: impl Into<String>, width_mm: f64, height_mm: f64) -> Self {
        Self {
            printer_name: printer_name.into(),
            width_mm,
            height_mm,
            ..Self::default()
        }
    }

    pub fn label_size(&self) -> LabelSize {
        LabelSize::new(self.width_mm, self.height_mm)
    }
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            printer_name: String::new(),
            copies: 1,
            width_mm: 100.0,
            height_mm: 50.0,
            auto_cut: true,
            label_type: None,
            options: BTreeMap::new(),
        }
    }
}

/// A complete print job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintJob {
    pub id: JobId,
    pub name: String,
    /// Source image bytes.  Shared so that job snapshots stay cheap.
    #[serde(skip)]
    pub image: Arc<Vec<u8>>,
    pub image_format: LabelImageFormat,
    /// SHA-256 of the source image bytes.
    pub image_digest: String,
    pub settings: PrintSettings,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl PrintJob {
    pub fn new(
        name: impl Into<String>,
        image: Vec<u8>,
        image_format: LabelImageFormat,
        settings: PrintSettings,
    ) -> Self {
        let now = Utc::now();
        let image_digest = hash_bytes(&image);
        Self {
            id: JobId::new(),
            name: name.into(),
            image: Arc::new(image),
            image_format,
            image_digest,
            settings,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    /// Move the job to `next`, rejecting any backwards or post-terminal move.
    ///
    /// On rejection the job is left untouched.
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(LabelBridgeError::InvalidState {
                job_id: self.id,
                status: self.status,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the job failed with `message`, if it is not already terminal.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }
}

/// Point-in-time status of one printer.  Produced fresh on every query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterStatus {
    pub online: bool,
    pub ready: bool,
    pub paper_present: bool,
    pub ribbon_present: bool,
    pub error: Option<String>,
    pub additional_info: BTreeMap<String, serde_json::Value>,
}

impl PrinterStatus {
    /// An offline status carrying `error`.
    pub fn offline(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// A rendered label kept for dashboards after the worker finishes a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPreview {
    pub job_id: JobId,
    pub printer_name: String,
    pub width_mm: f64,
    pub height_mm: f64,
    pub status: JobStatus,
    /// Thresholded label as PNG, base64-encoded.  `None` if the source
    /// image could not be decoded.
    pub image_png_base64: Option<String>,
    pub rendered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job() -> PrintJob {
        PrintJob::new(
            "shipping label",
            vec![1, 2, 3],
            LabelImageFormat::Png,
            PrintSettings::new("Loopback", 56.0, 31.0),
        )
    }

    #[test]
    fn lifecycle_moves_forward() {
        let mut job = test_job();
        assert_eq!(job.status, JobStatus::Pending);
        job.transition(JobStatus::Processing).expect("pending -> processing");
        job.transition(JobStatus::Completed).expect("processing -> completed");
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn terminal_status_never_reverts() {
        let mut job = test_job();
        job.transition(JobStatus::Cancelled).expect("cancel pending");
        for next in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let err = job.transition(next).unwrap_err();
            assert!(matches!(err, LabelBridgeError::InvalidState { .. }));
            assert_eq!(job.status, JobStatus::Cancelled);
        }
    }

    #[test]
    fn fail_records_message_once() {
        let mut job = test_job();
        job.fail("paper out").expect("fail pending job");
        assert_eq!(job.error_message.as_deref(), Some("paper out"));
        assert!(job.fail("second").is_err());
        assert_eq!(job.error_message.as_deref(), Some("paper out"));
    }

    #[test]
    fn pending_cannot_complete_without_processing() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn image_bytes_are_not_serialized() {
        let job = test_job();
        let json = serde_json::to_value(&job).expect("serialize job");
        assert!(json.get("image").is_none());
        assert_eq!(json["imageDigest"], job.image_digest);
        assert_eq!(json["settings"]["printerName"], "Loopback");
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(LabelImageFormat::from_extension("PNG"), Some(LabelImageFormat::Png));
        assert_eq!(LabelImageFormat::from_extension(".jpeg"), Some(LabelImageFormat::Jpeg));
        assert_eq!(LabelImageFormat::from_extension("pdf"), None);
    }

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()).expect("parse"), id);
        assert!(JobId::parse("not-a-uuid").is_err());
    }
}
