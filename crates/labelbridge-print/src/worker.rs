// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-consumer print worker.
//
// Front-ends enqueue without waiting; one background task takes jobs off an
// unbounded FIFO and runs them through the dispatcher one at a time, so two
// raster streams never interleave on a printer.  After each job the label
// render the printer received goes into a bounded ring buffer for
// dashboards.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use labelbridge_core::error::{LabelBridgeError, Result};
use labelbridge_core::{
    JobId, JobStatus, LabelImageFormat, PrintJob, PrintSettings, RenderPreview,
};
use labelbridge_raster::LabelProgram;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::PrintDispatcher;

pub struct PrintWorker {
    dispatcher: Arc<PrintDispatcher>,
    /// Taken (and so dropped) by `close` to let the loop drain and exit.
    tx: Mutex<Option<mpsc::UnboundedSender<JobId>>>,
    previews: Arc<Mutex<VecDeque<RenderPreview>>>,
    finished: Arc<Notify>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PrintWorker {
    /// Start the worker loop on the current tokio runtime.
    pub fn spawn(dispatcher: Arc<PrintDispatcher>, preview_capacity: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let previews = Arc::new(Mutex::new(VecDeque::with_capacity(preview_capacity)));
        let finished = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let worker_loop = WorkerLoop {
            dispatcher: Arc::clone(&dispatcher),
            previews: Arc::clone(&previews),
            capacity: preview_capacity.max(1),
            finished: Arc::clone(&finished),
        };
        let handle = tokio::spawn(worker_loop.run(rx, shutdown.clone()));

        Self {
            dispatcher,
            tx: Mutex::new(Some(tx)),
            previews,
            finished,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn dispatcher(&self) -> &Arc<PrintDispatcher> {
        &self.dispatcher
    }

    /// Queue a single-copy, auto-cut label.  The image is copied, so the
    /// caller's buffer is free as soon as this returns.
    pub fn enqueue(
        &self,
        image: &[u8],
        printer_name: &str,
        width_mm: f64,
        height_mm: f64,
    ) -> Result<JobId> {
        let settings = PrintSettings::new(printer_name, width_mm, height_mm);
        let name = format!("Label {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        let job = PrintJob::new(name, image.to_vec(), LabelImageFormat::default(), settings);
        self.enqueue_job(job)
    }

    /// Record `job` as Pending and queue it behind everything already queued.
    pub fn enqueue_job(&self, job: PrintJob) -> Result<JobId> {
        let tx = self.tx.lock().expect("worker sender lock poisoned");
        let Some(tx) = tx.as_ref().filter(|_| !self.shutdown.is_cancelled()) else {
            return Err(LabelBridgeError::WorkerStopped);
        };

        let id = self.dispatcher.register(job);
        if tx.send(id).is_err() {
            if let Err(e) = self.dispatcher.cancel(id) {
                warn!(job_id = %id, error = %e, "could not cancel unqueued job");
            }
            return Err(LabelBridgeError::WorkerStopped);
        }
        debug!(job_id = %id, "job queued");
        Ok(id)
    }

    /// Wait until job `id` reaches a terminal status.
    pub async fn wait_for(&self, id: JobId) -> Result<PrintJob> {
        loop {
            let notified = self.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let job = self
                .dispatcher
                .get_job(id)
                .ok_or(LabelBridgeError::JobNotFound(id))?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::select! {
                _ = notified => {}
                _ = self.shutdown.cancelled() => {
                    return self
                        .dispatcher
                        .get_job(id)
                        .filter(|job| job.status.is_terminal())
                        .ok_or(LabelBridgeError::WorkerStopped);
                }
            }
        }
    }

    /// Recent previews, oldest first.
    pub fn previews(&self) -> Vec<RenderPreview> {
        self.previews
            .lock()
            .expect("preview buffer lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Stop accepting jobs, finish everything already queued, then stop.
    pub async fn close(&self) {
        drop(self.tx.lock().expect("worker sender lock poisoned").take());
        self.join().await;
    }

    /// Stop after the current job.  Jobs still queued are cancelled.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        drop(self.tx.lock().expect("worker sender lock poisoned").take());
        self.join().await;
    }

    async fn join(&self) {
        let handle = self.handle.lock().expect("worker handle lock poisoned").take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "print worker task ended abnormally");
            }
        }
        self.finished.notify_waiters();
    }
}

impl Drop for PrintWorker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct WorkerLoop {
    dispatcher: Arc<PrintDispatcher>,
    previews: Arc<Mutex<VecDeque<RenderPreview>>>,
    capacity: usize,
    finished: Arc<Notify>,
}

impl WorkerLoop {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<JobId>, shutdown: CancellationToken) {
        info!("print worker started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("print worker received shutdown signal");
                    break;
                }
                next = rx.recv() => {
                    let Some(id) = next else {
                        info!("print queue closed, worker stopping");
                        break;
                    };
                    self.run_job(id).await;
                }
            }
        }

        rx.close();
        while let Ok(id) = rx.try_recv() {
            match self.dispatcher.cancel(id) {
                Ok(_) => debug!(job_id = %id, "queued job cancelled at shutdown"),
                Err(e) => debug!(job_id = %id, error = %e, "queued job left as is"),
            }
        }
        self.finished.notify_waiters();
    }

    async fn run_job(&self, id: JobId) {
        let processed = match self.dispatcher.process_with_program(id).await {
            Ok(processed) => processed,
            Err(e) => {
                warn!(job_id = %id, error = %e, "queued job could not be processed");
                return;
            }
        };

        if matches!(processed.job.status, JobStatus::Completed | JobStatus::Failed) {
            self.record_preview(&processed.job, processed.program).await;
        }
        self.finished.notify_waiters();
    }

    /// Reuses the render from `program`; a job that never encoded gets a
    /// preview entry without an image.
    async fn record_preview(&self, job: &PrintJob, program: Option<LabelProgram>) {
        let image_png_base64 = match program {
            None => {
                debug!(job_id = %job.id, "no preview for job");
                None
            }
            Some(program) => {
                match tokio::task::spawn_blocking(move || program.preview_png()).await {
                    Ok(Ok(png)) => Some(STANDARD.encode(png)),
                    Ok(Err(e)) => {
                        debug!(job_id = %job.id, error = %e, "no preview for job");
                        None
                    }
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "preview task failed");
                        None
                    }
                }
            }
        };

        let preview = RenderPreview {
            job_id: job.id,
            printer_name: job.settings.printer_name.clone(),
            width_mm: job.settings.width_mm,
            height_mm: job.settings.height_mm,
            status: job.status,
            image_png_base64,
            rendered_at: Utc::now(),
        };
        let mut previews = self.previews.lock().expect("preview buffer lock poisoned");
        while previews.len() >= self.capacity {
            previews.pop_front();
        }
        previews.push_back(preview);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PrinterDriver;
    use crate::driver::loopback::LoopbackLabelDriver;
    use crate::registry::DriverRegistry;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::time::Duration;

    fn png() -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])));
        let mut png = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .expect("encode PNG");
        png
    }

    fn worker(driver: LoopbackLabelDriver, capacity: usize) -> PrintWorker {
        let mut registry = DriverRegistry::new();
        registry.register(driver);
        let dispatcher = Arc::new(PrintDispatcher::new(Arc::new(registry)));
        PrintWorker::spawn(dispatcher, capacity)
    }

    fn loopback(worker: &PrintWorker) -> &LoopbackLabelDriver {
        match worker.dispatcher().registry().drivers()[0].as_ref() {
            PrinterDriver::Loopback(d) => d,
            other => panic!("expected loopback, got {}", other.kind()),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_print_in_submission_order() {
        let worker = Arc::new(worker(
            LoopbackLabelDriver::new(["Desk"]).with_latency(Duration::from_millis(5)),
            20,
        ));
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let image = Arc::new(png());

        let mut callers = Vec::new();
        for _ in 0..4 {
            let (worker, submitted, image) =
                (Arc::clone(&worker), Arc::clone(&submitted), Arc::clone(&image));
            callers.push(tokio::spawn(async move {
                for _ in 0..5 {
                    // Hold the lock across enqueue so `submitted` records the
                    // exact queue order.
                    {
                        let mut order = submitted.lock().expect("order lock");
                        order.push(worker.enqueue(&image, "Desk", 1.0, 1.0).expect("enqueue"));
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        for caller in callers {
            caller.await.expect("caller");
        }
        worker.close().await;

        let printed: Vec<JobId> = loopback(&worker).captured().iter().map(|c| c.job_id).collect();
        let submitted = submitted.lock().expect("order lock").clone();
        assert_eq!(printed.len(), 20);
        assert_eq!(printed, submitted);
        for id in submitted {
            assert_eq!(
                worker.dispatcher().get_job(id).expect("job").status,
                JobStatus::Completed
            );
        }
    }

    #[tokio::test]
    async fn cancelled_while_queued_never_prints() {
        let worker = worker(
            LoopbackLabelDriver::new(["Desk"]).with_latency(Duration::from_millis(200)),
            20,
        );
        let first = worker.enqueue(&png(), "Desk", 1.0, 1.0).expect("enqueue");
        let second = worker.enqueue(&png(), "Desk", 1.0, 1.0).expect("enqueue");
        worker.dispatcher().cancel(second).expect("cancel queued job");
        worker.close().await;

        let printed: Vec<JobId> = loopback(&worker).captured().iter().map(|c| c.job_id).collect();
        assert_eq!(printed, vec![first]);
        assert_eq!(
            worker.dispatcher().get_job(second).expect("job").status,
            JobStatus::Cancelled
        );
        assert_eq!(worker.previews().len(), 1);
    }

    #[tokio::test]
    async fn failed_job_does_not_stop_the_queue() {
        let worker = worker(LoopbackLabelDriver::new(["Desk"]), 20);
        let bad = worker.enqueue(b"not an image", "Desk", 1.0, 1.0).expect("enqueue");
        let good = worker.enqueue(&png(), "Desk", 1.0, 1.0).expect("enqueue");

        let good_job = worker.wait_for(good).await.expect("wait");
        assert_eq!(good_job.status, JobStatus::Completed);
        let bad_job = worker.wait_for(bad).await.expect("wait");
        assert_eq!(bad_job.status, JobStatus::Failed);
        assert!(bad_job.error_message.expect("message").contains("decoded"));

        worker.close().await;
        let previews = worker.previews();
        assert_eq!(previews.len(), 2);
        assert!(previews[0].image_png_base64.is_none());
        assert!(previews[1].image_png_base64.is_some());
    }

    #[tokio::test]
    async fn preview_is_the_printed_render() {
        let worker = worker(LoopbackLabelDriver::new(["Desk"]), 4);
        let id = worker.enqueue(&png(), "Desk", 2.0, 1.0).expect("enqueue");
        worker.close().await;

        let previews = worker.previews();
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].job_id, id);
        let encoded = previews[0].image_png_base64.as_deref().expect("preview image");
        let decoded = image::load_from_memory(&STANDARD.decode(encoded).expect("base64"))
            .expect("decode preview")
            .to_luma8();
        assert_eq!(decoded.dimensions(), (16, 8));
        assert!(decoded.pixels().all(|p| p.0[0] == 0));

        // The preview is the raster the printer was sent, column for column.
        let sent = &loopback(&worker).captured()[0].bytes;
        let header = [0x1B, 0x2A, 0x21, 16, 0, 8, 0];
        let at = sent.windows(7).position(|w| w == header).expect("raster header");
        let columns = labelbridge_raster::encoder::pack_columns(&decoded);
        assert_eq!(&sent[at + 7..at + 7 + columns.len()], columns.as_slice());
    }

    #[tokio::test]
    async fn preview_buffer_evicts_oldest() {
        let worker = worker(LoopbackLabelDriver::new(["Desk"]), 2);
        let ids: Vec<JobId> = (0..3)
            .map(|_| worker.enqueue(&png(), "Desk", 1.0, 1.0).expect("enqueue"))
            .collect();
        worker.close().await;

        let kept: Vec<JobId> = worker.previews().iter().map(|p| p.job_id).collect();
        assert_eq!(kept, ids[1..].to_vec());
        assert_eq!(worker.previews()[1].printer_name, "Desk");
    }

    #[tokio::test]
    async fn closed_worker_rejects_jobs() {
        let worker = worker(LoopbackLabelDriver::new(["Desk"]), 2);
        worker.close().await;
        assert!(matches!(
            worker.enqueue(&png(), "Desk", 1.0, 1.0),
            Err(LabelBridgeError::WorkerStopped)
        ));
    }

    #[tokio::test]
    async fn shutdown_cancels_what_is_still_queued() {
        let worker = worker(
            LoopbackLabelDriver::new(["Desk"]).with_latency(Duration::from_millis(300)),
            20,
        );
        let first = worker.enqueue(&png(), "Desk", 1.0, 1.0).expect("enqueue");
        let queued = worker.enqueue(&png(), "Desk", 1.0, 1.0).expect("enqueue");

        // Let the first job start before stopping.
        let mut attempts = 0;
        while worker.dispatcher().get_job(first).expect("job").status == JobStatus::Pending {
            attempts += 1;
            assert!(attempts < 500, "first job never started");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        worker.shutdown().await;

        assert_eq!(
            worker.dispatcher().get_job(queued).expect("job").status,
            JobStatus::Cancelled
        );
        assert!(matches!(
            worker.enqueue(&png(), "Desk", 1.0, 1.0),
            Err(LabelBridgeError::WorkerStopped)
        ));
    }
}
