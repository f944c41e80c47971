// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Network label driver (raw TCP).
//
// Same command program as the serial driver, pushed down a fresh TCP
// connection per operation.  Printers are named `<prefix><host>:<port>`;
// discovery probes every configured host/port pair concurrently.

use std::collections::BTreeSet;
use std::time::Duration;

use labelbridge_core::config::NetworkConfig;
use labelbridge_core::error::{LabelBridgeError, Result};
use labelbridge_core::{PrintJob, PrinterStatus};
use labelbridge_raster::{LabelProgram, commands};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{InFlight, cancelled, strip_printer_prefix};
use crate::session::{TransmitPhase, TransmitSession};

#[derive(Debug)]
pub struct NetworkLabelDriver {
    config: NetworkConfig,
    pub(crate) in_flight: InFlight,
}

impl NetworkLabelDriver {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            in_flight: InFlight::default(),
        }
    }

    pub fn printer_name(&self, host: &str, port: u16) -> String {
        format!("{}{}:{}", self.config.name_prefix, host, port)
    }

    pub async fn initialize(&self) -> bool {
        if !self.config.enabled {
            info!("network driver disabled");
            return false;
        }
        info!(
            hosts = self.config.hosts.len(),
            ports = ?self.config.ports,
            "network driver initialized"
        );
        true
    }

    #[instrument(skip(self))]
    pub async fn discover(&self) -> BTreeSet<String> {
        if !self.config.enabled {
            return BTreeSet::new();
        }

        let mut probes = JoinSet::new();
        for host in &self.config.hosts {
            for &port in &self.config.ports {
                let addr = format!("{host}:{port}");
                let name = self.printer_name(host, port);
                let probe = self.config.probe_timeout();
                probes.spawn(async move {
                    let reachable = connect(&addr, probe).await.is_ok();
                    (name, reachable)
                });
            }
        }

        let mut found = BTreeSet::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((name, true)) => {
                    debug!(printer = %name, "network printer answered probe");
                    found.insert(name);
                }
                Ok((_, false)) => {}
                Err(e) => warn!(error = %e, "network probe task failed"),
            }
        }
        info!(count = found.len(), "network discovery complete");
        found
    }

    pub async fn test_connection(&self, printer: &str) -> bool {
        let Ok(addr) = self.address(printer) else {
            return false;
        };
        match connect(addr, self.config.status_timeout()).await {
            Ok(_) => true,
            Err(e) => {
                warn!(printer, error = %e, "network connection test failed");
                false
            }
        }
    }

    pub async fn print(
        &self,
        job: &PrintJob,
        program: &LabelProgram,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let printer = job.settings.printer_name.as_str();
        let addr = self.address(printer)?.to_owned();

        let token = self.in_flight.begin(job.id, cancel);
        let mut session = TransmitSession::new(printer);
        let result = self
            .transmit(&addr, program, &mut session, &token)
            .await
            .map_err(|e| if token.is_cancelled() { cancelled(job.id) } else { e });
        self.in_flight.end(job.id);

        result?;
        info!(job_id = %job.id, addr = %addr, bytes = program.len(), "label sent over network");
        Ok(())
    }

    async fn transmit(
        &self,
        addr: &str,
        program: &LabelProgram,
        session: &mut TransmitSession,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let timeout = self.config.print_timeout();
        if cancel.is_cancelled() {
            return Err(session.abort(LabelBridgeError::Transport("cancelled".into())));
        }
        session.enter(TransmitPhase::Connecting)?;
        let mut stream = connect(addr, timeout).await.map_err(|e| session.abort(e))?;

        for segment in program.segments() {
            session.enter(segment.phase.into())?;
            let write = tokio::time::timeout(timeout, stream.write_all(&segment.bytes));
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(session.abort(LabelBridgeError::Transport("cancelled".into())));
                }
                written = write => match written {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        return Err(session.abort(LabelBridgeError::Transport(format!(
                            "send to {addr} failed: {e}"
                        ))));
                    }
                    Err(_) => {
                        return Err(session.abort(LabelBridgeError::Transport(format!(
                            "send to {addr} timed out after {timeout:?}"
                        ))));
                    }
                },
            }
        }

        stream
            .flush()
            .await
            .map_err(|e| session.abort(LabelBridgeError::Transport(format!("flush {addr}: {e}"))))?;
        if let Err(e) = stream.shutdown().await {
            debug!(addr, error = %e, "network shutdown after print");
        }
        session.finish()
    }

    /// Connect, send `DLE EOT SOH`, and wait for one status byte.
    pub async fn get_status(&self, printer: &str) -> PrinterStatus {
        let addr = match self.address(printer) {
            Ok(addr) => addr,
            Err(_) => return PrinterStatus::offline("Invalid printer name"),
        };
        let timeout = self.config.status_timeout();
        match connect(addr, timeout).await {
            Ok(mut stream) => request_status(&mut stream, addr, timeout).await,
            Err(e) => PrinterStatus::offline(e.to_string()),
        }
    }

    /// `host:port` for a logical name of ours.
    fn address<'a>(&self, printer: &'a str) -> Result<&'a str> {
        let addr = strip_printer_prefix(printer, &self.config.name_prefix)?;
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(addr),
            _ => Err(LabelBridgeError::DriverNotFound(printer.to_owned())),
        }
    }
}

/// One status exchange on an open connection.  Both the request write and
/// the response read are bounded by `timeout`.
async fn request_status<S>(stream: &mut S, addr: &str, timeout: Duration) -> PrinterStatus
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, stream.write_all(&commands::STATUS_REQUEST)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return PrinterStatus::offline(format!("status request to {addr}: {e}")),
        Err(_) => {
            return PrinterStatus::offline(format!(
                "status request to {addr} timed out after {timeout:?}"
            ));
        }
    }
    let mut response = [0u8; 1];
    match tokio::time::timeout(timeout, stream.read(&mut response)).await {
        Ok(Ok(1)) => commands::decode_status(response[0]),
        _ => silent_status(),
    }
}

/// Reachable but gave no status byte.
fn silent_status() -> PrinterStatus {
    let mut status = PrinterStatus {
        online: true,
        ..PrinterStatus::default()
    };
    status
        .additional_info
        .insert("statusResponse".into(), serde_json::Value::from("none"));
    status
}

async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| LabelBridgeError::Transport(format!("connection to {addr} timed out after {timeout:?}")))?
        .map_err(|e| LabelBridgeError::Transport(format!("connect to {addr}: {e}")))
}
