// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer drivers.
//
// The driver set is closed: every transport the bridge speaks is a variant of
// `PrinterDriver`, and the registry holds an explicit list of them.  All
// variants share one capability set and one command program, so a label
// prints byte-identically whichever way it travels.

pub mod loopback;
pub mod network;
pub mod serial;

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use labelbridge_core::error::{LabelBridgeError, Result};
use labelbridge_core::{JobId, PrintJob, PrinterStatus};
use labelbridge_raster::LabelProgram;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use self::loopback::LoopbackLabelDriver;
use self::network::NetworkLabelDriver;
use self::serial::SerialLabelDriver;

/// One class of physical (or simulated) label printer.
#[derive(Debug)]
pub enum PrinterDriver {
    Serial(SerialLabelDriver),
    Network(NetworkLabelDriver),
    Loopback(LoopbackLabelDriver),
}

impl PrinterDriver {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Serial(_) => "serial",
            Self::Network(_) => "network",
            Self::Loopback(_) => "loopback",
        }
    }

    /// Prepare the driver.  `false` means it should not be used.
    pub async fn initialize(&self) -> bool {
        match self {
            Self::Serial(d) => d.initialize().await,
            Self::Network(d) => d.initialize().await,
            Self::Loopback(d) => d.initialize(),
        }
    }

    /// Logical names of every printer this driver can currently reach.
    pub async fn discover(&self) -> BTreeSet<String> {
        match self {
            Self::Serial(d) => d.discover().await,
            Self::Network(d) => d.discover().await,
            Self::Loopback(d) => d.discover(),
        }
    }

    pub async fn test_connection(&self, printer: &str) -> bool {
        match self {
            Self::Serial(d) => d.test_connection(printer).await,
            Self::Network(d) => d.test_connection(printer).await,
            Self::Loopback(d) => d.test_connection(printer),
        }
    }

    /// Send `program` to `job`'s printer.  Never retries.  Cancelling
    /// `cancel` before the connection opens means nothing is sent.
    #[instrument(skip_all, fields(driver = self.kind(), job_id = %job.id, printer = %job.settings.printer_name))]
    pub async fn print(
        &self,
        job: &PrintJob,
        program: &LabelProgram,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self {
            Self::Serial(d) => d.print(job, program, cancel).await,
            Self::Network(d) => d.print(job, program, cancel).await,
            Self::Loopback(d) => d.print(job, program, cancel).await,
        }
    }

    /// Best-effort abort of an in-flight print.  `true` if the job was
    /// in flight on this driver.
    pub fn cancel(&self, job_id: JobId) -> bool {
        self.in_flight().cancel(job_id)
    }

    pub async fn get_status(&self, printer: &str) -> PrinterStatus {
        match self {
            Self::Serial(d) => d.get_status(printer).await,
            Self::Network(d) => d.get_status(printer).await,
            Self::Loopback(d) => d.get_status(printer),
        }
    }

    /// Abort everything in flight and forget discovered state.
    pub fn dispose(&self) {
        let aborted = self.in_flight().cancel_all();
        if aborted > 0 {
            tracing::info!(driver = self.kind(), aborted, "driver disposed with prints in flight");
        }
        match self {
            Self::Serial(d) => d.dispose(),
            Self::Network(_) => {}
            Self::Loopback(_) => {}
        }
    }

    fn in_flight(&self) -> &InFlight {
        match self {
            Self::Serial(d) => &d.in_flight,
            Self::Network(d) => &d.in_flight,
            Self::Loopback(d) => &d.in_flight,
        }
    }
}

impl From<SerialLabelDriver> for PrinterDriver {
    fn from(driver: SerialLabelDriver) -> Self {
        Self::Serial(driver)
    }
}

impl From<NetworkLabelDriver> for PrinterDriver {
    fn from(driver: NetworkLabelDriver) -> Self {
        Self::Network(driver)
    }
}

impl From<LoopbackLabelDriver> for PrinterDriver {
    fn from(driver: LoopbackLabelDriver) -> Self {
        Self::Loopback(driver)
    }
}

/// Cancellation handles for the prints a driver currently has in flight.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    jobs: Mutex<HashMap<JobId, CancellationToken>>,
}

impl InFlight {
    /// Track `job_id` under a child of `parent`, so cancelling either one
    /// stops the transfer.
    pub(crate) fn begin(&self, job_id: JobId, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        self.jobs
            .lock()
            .expect("in-flight lock poisoned")
            .insert(job_id, token.clone());
        token
    }

    pub(crate) fn end(&self, job_id: JobId) {
        self.jobs
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&job_id);
    }

    pub(crate) fn cancel(&self, job_id: JobId) -> bool {
        match self.jobs.lock().expect("in-flight lock poisoned").get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, job_id: JobId) -> bool {
        self.jobs
            .lock()
            .expect("in-flight lock poisoned")
            .contains_key(&job_id)
    }

    pub(crate) fn cancel_all(&self) -> usize {
        let jobs = self.jobs.lock().expect("in-flight lock poisoned");
        for token in jobs.values() {
            token.cancel();
        }
        jobs.len()
    }
}

/// Encode `job` off the async runtime.
pub async fn build_program(job: &PrintJob) -> Result<LabelProgram> {
    let job = job.clone();
    tokio::task::spawn_blocking(move || LabelProgram::for_job(&job))
        .await
        .map_err(|e| LabelBridgeError::Transport(format!("encoder task failed: {e}")))?
}

pub(crate) fn cancelled(job_id: JobId) -> LabelBridgeError {
    LabelBridgeError::Transport(format!("print job {job_id} was cancelled"))
}

/// `name` without `prefix`, or `DriverNotFound` if it isn't one of ours.
pub(crate) fn strip_printer_prefix<'a>(name: &'a str, prefix: &str) -> Result<&'a str> {
    name.strip_prefix(prefix)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| LabelBridgeError::DriverNotFound(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_cancel_only_hits_known_jobs() {
        let in_flight = InFlight::default();
        let job = JobId::new();
        let parent = CancellationToken::new();
        let token = in_flight.begin(job, &parent);
        assert!(!in_flight.cancel(JobId::new()));
        assert!(in_flight.cancel(job));
        assert!(token.is_cancelled());
        assert!(!parent.is_cancelled());
        in_flight.end(job);
        assert!(!in_flight.cancel(job));
    }

    #[test]
    fn cancelling_the_parent_reaches_the_in_flight_token() {
        let in_flight = InFlight::default();
        let parent = CancellationToken::new();
        let token = in_flight.begin(JobId::new(), &parent);
        parent.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn prefix_must_match_and_leave_something() {
        assert_eq!(strip_printer_prefix("Serial-COM3", "Serial-").unwrap(), "COM3");
        assert!(strip_printer_prefix("Serial-", "Serial-").is_err());
        assert!(strip_printer_prefix("Net-10.0.0.1:9100", "Serial-").is_err());
    }
}
