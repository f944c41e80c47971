// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for labelbridge.

use thiserror::Error;

use crate::types::{JobId, JobStatus};

/// Top-level error type for all labelbridge operations.
#[derive(Debug, Error)]
pub enum LabelBridgeError {
    // -- Raster errors --
    #[error("image could not be decoded: {0}")]
    ImageDecode(String),

    #[error("image could not be encoded: {0}")]
    ImageEncode(String),

    #[error("invalid label size: {0}")]
    InvalidLabelSize(String),

    // -- Driver errors --
    #[error("no driver found for printer: {0}")]
    DriverNotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    // -- Job lifecycle --
    #[error("job {job_id} is {status:?} and cannot be changed")]
    InvalidState { job_id: JobId, status: JobStatus },

    #[error("print job {0} not found")]
    JobNotFound(JobId),

    #[error("print worker is not running")]
    WorkerStopped,

    // -- Front-end input --
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LabelBridgeError>;
