// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory print job table and dispatch.
//
// Every job is recorded before anything is sent, so a job that dies mid-print
// is still listed.  Records live for the life of the process; nothing is
// evicted.  Status changes go through `PrintJob::transition`, so a terminal
// job (for example one cancelled while its print was in flight) keeps its
// status whatever the driver reports afterwards.
//
// A Processing job owns a cancellation token from the moment it leaves
// Pending.  The token is created and cancelled under the job table lock, so
// a cancel that lands while the label is still being encoded or the driver
// resolved stops the job before any byte reaches the printer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use labelbridge_core::error::{LabelBridgeError, Result};
use labelbridge_core::{JobId, JobStatus, PrintJob, PrinterStatus};
use labelbridge_raster::LabelProgram;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::driver::{build_program, cancelled};
use crate::registry::DriverRegistry;

/// A processed job and the program built for it, if encoding got that far.
#[derive(Debug, Clone)]
pub struct Processed {
    pub job: PrintJob,
    pub program: Option<LabelProgram>,
}

pub struct PrintDispatcher {
    registry: Arc<DriverRegistry>,
    jobs: RwLock<HashMap<JobId, PrintJob>>,
    /// Tokens of Processing jobs.  Inserted and cancelled only while
    /// holding the `jobs` write lock.
    cancels: Mutex<HashMap<JobId, CancellationToken>>,
}

impl PrintDispatcher {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            jobs: RwLock::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    /// Record `job` (Pending) without dispatching it.
    pub fn register(&self, job: PrintJob) -> JobId {
        let id = job.id;
        debug!(job_id = %id, printer = %job.settings.printer_name, "job recorded");
        self.jobs
            .write()
            .expect("job table lock poisoned")
            .insert(id, job);
        id
    }

    /// Record and print `job`, returning its final state.
    ///
    /// Failures end up in the returned job's status and error message rather
    /// than as an `Err`.
    #[instrument(skip_all, fields(job_id = %job.id, printer = %job.settings.printer_name))]
    pub async fn submit(&self, job: PrintJob) -> PrintJob {
        let id = self.register(job);
        match self.process(id).await {
            Ok(job) => job,
            Err(e) => {
                // Only reachable if the job vanished from the table.
                error!(job_id = %id, error = %e, "submitted job could not be processed");
                self.snapshot_or_failed(id, &e)
            }
        }
    }

    /// Print a recorded job.  A job that is no longer Pending (typically
    /// because it was cancelled while queued) is returned untouched.
    pub async fn process(&self, id: JobId) -> Result<PrintJob> {
        Ok(self.process_with_program(id).await?.job)
    }

    /// [`process`](Self::process), also handing back the encoded program.
    pub async fn process_with_program(&self, id: JobId) -> Result<Processed> {
        let cancel = CancellationToken::new();
        let job = self.update(id, |job| {
            if job.status == JobStatus::Pending {
                job.transition(JobStatus::Processing)?;
                self.cancels
                    .lock()
                    .expect("cancel map lock poisoned")
                    .insert(id, cancel.clone());
            }
            Ok(())
        })?;
        if job.status != JobStatus::Processing {
            debug!(job_id = %id, status = ?job.status, "job skipped");
            return Ok(Processed { job, program: None });
        }

        let printer = job.settings.printer_name.clone();
        let (program, outcome) = self.run(&job, &cancel).await;
        self.cancels
            .lock()
            .expect("cancel map lock poisoned")
            .remove(&id);

        let finished = self.update(id, |job| {
            let applied = match &outcome {
                Ok(()) => job.transition(JobStatus::Completed),
                Err(e) => job.fail(e.to_string()),
            };
            if applied.is_err() {
                warn!(job_id = %id, status = ?job.status, "job changed while printing; keeping its status");
            }
            Ok(())
        })?;

        match &outcome {
            Ok(()) => info!(job_id = %id, printer = %printer, "print job completed"),
            Err(e) => warn!(job_id = %id, printer = %printer, error = %e, "print job failed"),
        }
        Ok(Processed {
            job: finished,
            program,
        })
    }

    /// Encode, resolve, then print, giving up at each step once `cancel`
    /// fires.
    async fn run(
        &self,
        job: &PrintJob,
        cancel: &CancellationToken,
    ) -> (Option<LabelProgram>, Result<()>) {
        let built = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled(job.id)),
            built = build_program(job) => built,
        };
        let program = match built {
            Ok(program) => program,
            Err(e) => return (None, Err(e)),
        };

        let driver = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled(job.id)),
            resolved = self.registry.resolve(&job.settings.printer_name) => resolved,
        };
        let outcome = match driver {
            Ok(_) if cancel.is_cancelled() => Err(cancelled(job.id)),
            Ok(driver) => driver.print(job, &program, cancel).await,
            Err(e) => Err(e),
        };
        (Some(program), outcome)
    }

    pub fn get_job(&self, id: JobId) -> Option<PrintJob> {
        self.jobs
            .read()
            .expect("job table lock poisoned")
            .get(&id)
            .cloned()
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> Vec<PrintJob> {
        let mut jobs: Vec<PrintJob> = self
            .jobs
            .read()
            .expect("job table lock poisoned")
            .values()
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Cancel a Pending or Processing job.
    ///
    /// A Processing job also gets a best-effort abort from its driver; the
    /// bytes already sent cannot be recalled.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: JobId) -> Result<PrintJob> {
        let job = self.update(id, |job| {
            job.transition(JobStatus::Cancelled)?;
            if let Some(token) = self
                .cancels
                .lock()
                .expect("cancel map lock poisoned")
                .remove(&id)
            {
                token.cancel();
            }
            Ok(())
        })?;
        if let Some(driver) = self.registry.cached(&job.settings.printer_name) {
            if driver.cancel(id) {
                info!(job_id = %id, "in-flight print aborted");
            }
        }
        info!(job_id = %id, "print job cancelled");
        Ok(job)
    }

    /// Rediscover printers on every driver.  Returns the names found, sorted.
    pub async fn list_printers(&self) -> Vec<String> {
        self.registry.refresh().await.into_keys().collect()
    }

    pub async fn get_status(&self, printer: &str) -> PrinterStatus {
        match self.registry.resolve(printer).await {
            Ok(driver) => driver.get_status(printer).await,
            Err(e) => PrinterStatus::offline(e.to_string()),
        }
    }

    pub async fn test_printer(&self, printer: &str) -> bool {
        match self.registry.resolve(printer).await {
            Ok(driver) => driver.test_connection(printer).await,
            Err(e) => {
                warn!(printer, error = %e, "printer test skipped");
                false
            }
        }
    }

    /// Apply `change` to a job under the table lock and return a snapshot.
    fn update<F>(&self, id: JobId, change: F) -> Result<PrintJob>
    where
        F: FnOnce(&mut PrintJob) -> Result<()>,
    {
        let mut jobs = self.jobs.write().expect("job table lock poisoned");
        let job = jobs.get_mut(&id).ok_or(LabelBridgeError::JobNotFound(id))?;
        change(job)?;
        Ok(job.clone())
    }

    fn snapshot_or_failed(&self, id: JobId, err: &LabelBridgeError) -> PrintJob {
        if let Some(job) = self.get_job(id) {
            return job;
        }
        let mut job = PrintJob::new("unknown", Vec::new(), Default::default(), Default::default());
        job.id = id;
        // A fresh job is Pending, so this cannot be rejected.
        let _ = job.fail(err.to_string());
        job
    }
}
