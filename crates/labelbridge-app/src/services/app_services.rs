// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer.  Wires the configured drivers, the dispatcher and
// the print worker together, and answers front-end requests.
//
// Every print goes through the worker, including blocking `submit` calls, so
// the CLI and the JSON-lines loop share one FIFO per process.

use std::path::PathBuf;
use std::sync::Arc;

use labelbridge_core::error::{LabelBridgeError, Result};
use labelbridge_core::request::SubmitResponse;
use labelbridge_core::{BridgeConfig, JobId, PrintJob};
use labelbridge_print::{
    DriverRegistry, LoopbackLabelDriver, NetworkLabelDriver, PrintDispatcher, PrintWorker,
    SerialLabelDriver,
};
use tracing::{info, warn};

use super::data_dir;
use crate::protocol::{BridgeRequest, BridgeResponse};

/// Shared application services.  Cheap to clone.
#[derive(Clone)]
pub struct AppServices {
    config: Arc<BridgeConfig>,
    config_path: PathBuf,
    dispatcher: Arc<PrintDispatcher>,
    worker: Arc<PrintWorker>,
}

impl AppServices {
    /// Load the config (explicit path, env, or data dir) and start services.
    pub async fn init(explicit_config: Option<PathBuf>) -> Result<Self> {
        let path = data_dir::config_path(explicit_config.as_deref());
        let config = BridgeConfig::load_or_default(&path)?;
        config.validate()?;
        Ok(Self::from_config(config, path).await)
    }

    /// Start services from an already-loaded config.
    pub async fn from_config(config: BridgeConfig, config_path: PathBuf) -> Self {
        info!(config = %config_path.display(), "initialising label bridge services");

        let registry = Arc::new(build_registry(&config));
        let ready = registry.initialize_all().await;
        if ready == 0 {
            warn!("no printer driver is usable; every print will fail");
        }

        let dispatcher = Arc::new(PrintDispatcher::new(registry));
        let worker = Arc::new(PrintWorker::spawn(
            Arc::clone(&dispatcher),
            config.preview_capacity,
        ));

        Self {
            config: Arc::new(config),
            config_path,
            dispatcher,
            worker,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn dispatcher(&self) -> &Arc<PrintDispatcher> {
        &self.dispatcher
    }

    pub fn worker(&self) -> &Arc<PrintWorker> {
        &self.worker
    }

    /// Queue `job` behind everything already queued and wait for its
    /// final state.
    pub async fn print_and_wait(&self, job: PrintJob) -> Result<PrintJob> {
        let id = self.worker.enqueue_job(job)?;
        self.worker.wait_for(id).await
    }

    /// Answer one front-end request.  Errors become `BridgeResponse::Error`.
    pub async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        match self.try_handle(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "request failed");
                BridgeResponse::error(&e)
            }
        }
    }

    async fn try_handle(&self, request: BridgeRequest) -> Result<BridgeResponse> {
        let response = match request {
            BridgeRequest::Submit(req) => {
                let job = self.print_and_wait(req.into_job()?).await?;
                BridgeResponse::Submitted(SubmitResponse::from(&job))
            }
            BridgeRequest::Enqueue(req) => {
                let job = req.into_job()?;
                let queued = SubmitResponse::from(&job);
                self.worker.enqueue_job(job)?;
                BridgeResponse::Submitted(queued)
            }
            BridgeRequest::Job { job_id } => {
                let id = JobId::parse(&job_id)?;
                let job = self
                    .dispatcher
                    .get_job(id)
                    .ok_or(LabelBridgeError::JobNotFound(id))?;
                BridgeResponse::Job { job }
            }
            BridgeRequest::Jobs => BridgeResponse::Jobs {
                jobs: self.dispatcher.list_jobs(),
            },
            BridgeRequest::Cancel { job_id } => {
                let id = JobId::parse(&job_id)?;
                match self.dispatcher.cancel(id) {
                    Ok(_) => BridgeResponse::Cancelled {
                        job_id: id,
                        cancelled: true,
                        message: Some("Print job cancelled".into()),
                    },
                    Err(e @ LabelBridgeError::InvalidState { .. }) => BridgeResponse::Cancelled {
                        job_id: id,
                        cancelled: false,
                        message: Some(e.to_string()),
                    },
                    Err(e) => return Err(e),
                }
            }
            BridgeRequest::Printers => BridgeResponse::Printers {
                printers: self.dispatcher.list_printers().await,
            },
            BridgeRequest::Status { printer_name } => {
                let status = self.dispatcher.get_status(&printer_name).await;
                BridgeResponse::Status {
                    printer_name,
                    status,
                }
            }
            BridgeRequest::Test { printer_name } => {
                let ok = self.dispatcher.test_printer(&printer_name).await;
                BridgeResponse::Test { printer_name, ok }
            }
            BridgeRequest::Previews => BridgeResponse::Previews {
                previews: self.worker.previews(),
            },
        };
        Ok(response)
    }

    /// Finish queued jobs, then release every driver.
    pub async fn shutdown(&self) {
        self.worker.close().await;
        self.dispatcher.registry().dispose_all();
        let unfinished = self
            .dispatcher
            .list_jobs()
            .iter()
            .filter(|job| !job.status.is_terminal())
            .count();
        if unfinished > 0 {
            warn!(unfinished, "services stopped with unfinished jobs");
        }
        info!("label bridge services stopped");
    }
}

/// Build the driver list from the config.
///
/// Loopback comes first so its names resolve without touching hardware;
/// serial is asked before network on a cache miss.
fn build_registry(config: &BridgeConfig) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    if !config.loopback_printers.is_empty() {
        registry.register(LoopbackLabelDriver::new(config.loopback_printers.iter().cloned()));
    }
    if config.serial.enabled {
        registry.register(SerialLabelDriver::new(config.serial.clone()));
    }
    if config.network.enabled {
        registry.register(NetworkLabelDriver::new(config.network.clone()));
    }
    info!(drivers = registry.drivers().len(), "driver registry built");
    registry
}
