// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory driver: builds the real command program and keeps it instead of
// sending it anywhere.  Used for dry runs and wherever a printer has to be
// simulated.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use labelbridge_core::error::{LabelBridgeError, Result};
use labelbridge_core::{JobId, PrintJob, PrinterStatus};
use labelbridge_raster::LabelProgram;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{InFlight, cancelled};
use crate::session::{TransmitPhase, TransmitSession};

/// One label as it would have gone over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLabel {
    pub job_id: JobId,
    pub printer_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct LoopbackLabelDriver {
    printers: BTreeSet<String>,
    captured: Mutex<Vec<CapturedLabel>>,
    fail_prints: bool,
    latency: Duration,
    discoveries: AtomicUsize,
    pub(crate) in_flight: InFlight,
}

impl LoopbackLabelDriver {
    pub fn new<I, S>(printers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            printers: printers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Every print fails with a transport error and nothing is captured.
    pub fn failing(mut self) -> Self {
        self.fail_prints = true;
        self
    }

    /// Hold each print for `latency` before capturing it.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn initialize(&self) -> bool {
        info!(printers = self.printers.len(), "loopback driver initialized");
        true
    }

    pub fn discover(&self) -> BTreeSet<String> {
        self.discoveries.fetch_add(1, Ordering::Relaxed);
        self.printers.clone()
    }

    /// How many times `discover` has run.
    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::Relaxed)
    }

    pub fn test_connection(&self, printer: &str) -> bool {
        self.printers.contains(printer)
    }

    pub async fn print(
        &self,
        job: &PrintJob,
        program: &LabelProgram,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let printer = &job.settings.printer_name;
        if !self.printers.contains(printer) {
            return Err(LabelBridgeError::DriverNotFound(printer.clone()));
        }

        let token = self.in_flight.begin(job.id, cancel);
        let mut session = TransmitSession::new(printer.as_str());
        let result = self.simulate(job, program, &mut session, &token).await;
        self.in_flight.end(job.id);
        result?;

        self.captured
            .lock()
            .expect("capture lock poisoned")
            .push(CapturedLabel {
                job_id: job.id,
                printer_name: printer.clone(),
                bytes: program.to_bytes(),
            });
        Ok(())
    }

    async fn simulate(
        &self,
        job: &PrintJob,
        program: &LabelProgram,
        session: &mut TransmitSession,
        token: &CancellationToken,
    ) -> Result<()> {
        if token.is_cancelled() {
            return Err(session.abort(cancelled(job.id)));
        }
        session.enter(TransmitPhase::Connecting)?;
        if !self.latency.is_zero() {
            tokio::select! {
                _ = token.cancelled() => return Err(session.abort(cancelled(job.id))),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        for segment in program.segments() {
            session.enter(segment.phase.into())?;
        }
        if self.fail_prints {
            return Err(session.abort(LabelBridgeError::Transport(format!(
                "{} is configured to fail",
                job.settings.printer_name
            ))));
        }
        session.finish()
    }

    pub fn get_status(&self, printer: &str) -> PrinterStatus {
        if !self.printers.contains(printer) {
            return PrinterStatus::offline("Invalid printer name");
        }
        PrinterStatus {
            online: true,
            ready: true,
            paper_present: true,
            ribbon_present: true,
            ..PrinterStatus::default()
        }
    }

    /// Everything printed so far, oldest first.
    pub fn captured(&self) -> Vec<CapturedLabel> {
        self.captured.lock().expect("capture lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use labelbridge_core::{LabelImageFormat, PrintSettings};

    fn job(printer: &str) -> PrintJob {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let mut png = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .expect("encode PNG");
        PrintJob::new("loop", png, LabelImageFormat::Png, PrintSettings::new(printer, 10.0, 5.0))
    }

    async fn print(driver: &LoopbackLabelDriver, job: &PrintJob) -> Result<()> {
        let program = LabelProgram::for_job(job).expect("program");
        driver.print(job, &program, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn captures_program_bytes() {
        let driver = LoopbackLabelDriver::new(["Desk"]);
        let job = job("Desk");
        print(&driver, &job).await.expect("print");

        let captured = driver.captured();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].job_id, job.id);
        assert!(captured[0].bytes.starts_with(&[0x1B, 0x40, 0x1D, 0x57, 0x50, 0x00]));
    }

    #[tokio::test]
    async fn failing_driver_captures_nothing() {
        let driver = LoopbackLabelDriver::new(["Desk"]).failing();
        let err = print(&driver, &job("Desk")).await.unwrap_err();
        assert!(matches!(err, LabelBridgeError::Transport(_)));
        assert!(driver.captured().is_empty());
    }

    #[tokio::test]
    async fn unknown_printer_is_not_found() {
        let driver = LoopbackLabelDriver::new(["Desk"]);
        assert!(matches!(
            print(&driver, &job("Shelf")).await,
            Err(LabelBridgeError::DriverNotFound(_))
        ));
        assert!(!driver.get_status("Shelf").online);
        assert!(driver.get_status("Desk").ready);
    }

    #[tokio::test]
    async fn in_flight_print_can_be_cancelled() {
        let driver = std::sync::Arc::new(
            LoopbackLabelDriver::new(["Desk"]).with_latency(Duration::from_secs(5)),
        );
        let job = job("Desk");
        let id = job.id;
        let printing = {
            let driver = driver.clone();
            tokio::spawn(async move { print(&driver, &job).await })
        };

        // Wait until the print registers itself.
        let mut attempts = 0;
        while !driver.in_flight.cancel(id) {
            attempts += 1;
            assert!(attempts < 500, "print never went in flight");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let err = printing.await.expect("join").unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(driver.captured().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_connecting_sends_nothing() {
        let driver = LoopbackLabelDriver::new(["Desk"]);
        let job = job("Desk");
        let program = LabelProgram::for_job(&job).expect("program");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = driver.print(&job, &program, &cancel).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(driver.captured().is_empty());
        assert!(!driver.in_flight.contains(job.id));
    }
}
