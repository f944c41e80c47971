// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serial label driver.
//
// Ports are opened per operation at 8-N-1 and closed again when it ends, so a
// printer that is unplugged between jobs never leaves a stale handle behind.
// Every read and write carries the port timeout; the blocking I/O runs on
// tokio's blocking pool.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use labelbridge_core::config::SerialConfig;
use labelbridge_core::error::{LabelBridgeError, Result};
use labelbridge_core::{PrintJob, PrinterStatus};
use labelbridge_raster::{LabelProgram, ProgramPhase, commands};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{InFlight, cancelled, strip_printer_prefix};
use crate::session::{TransmitPhase, TransmitSession};

#[derive(Debug)]
pub struct SerialLabelDriver {
    config: SerialConfig,
    /// Logical name -> port path, from the last discovery.
    ports: Mutex<BTreeMap<String, String>>,
    pub(crate) in_flight: InFlight,
}

impl SerialLabelDriver {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            ports: Mutex::new(BTreeMap::new()),
            in_flight: InFlight::default(),
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Logical name for a port path.
    pub fn printer_name(&self, port: &str) -> String {
        format!("{}{}", self.config.name_prefix, port)
    }

    pub async fn initialize(&self) -> bool {
        if !self.config.enabled {
            info!("serial driver disabled");
            return false;
        }
        info!(baud = self.config.baud_rate, "serial driver initialized");
        true
    }

    /// Candidate ports (configured, or enumerated), kept if they accept a
    /// connection test.
    pub async fn discover(&self) -> BTreeSet<String> {
        if !self.config.enabled {
            return BTreeSet::new();
        }

        let candidates = if self.config.ports.is_empty() {
            match tokio::task::spawn_blocking(serialport::available_ports).await {
                Ok(Ok(ports)) => ports.into_iter().map(|p| p.port_name).collect(),
                Ok(Err(e)) => {
                    warn!(error = %e, "failed to enumerate serial ports");
                    Vec::new()
                }
                Err(e) => {
                    warn!(error = %e, "serial enumeration task failed");
                    Vec::new()
                }
            }
        } else {
            self.config.ports.clone()
        };

        let mut found = BTreeMap::new();
        for port in candidates {
            match self.probe_port(&port).await {
                Ok(()) => {
                    found.insert(self.printer_name(&port), port);
                }
                Err(e) => debug!(port = %port, error = %e, "serial port did not answer"),
            }
        }

        let names: BTreeSet<String> = found.keys().cloned().collect();
        info!(count = names.len(), "serial discovery complete");
        *self.ports.lock().expect("serial port map lock poisoned") = found;
        names
    }

    /// Open the port and send `ESC @`.
    pub async fn test_connection(&self, printer: &str) -> bool {
        let port = match self.port_path(printer) {
            Ok(port) => port,
            Err(_) => return false,
        };
        match self.probe_port(&port).await {
            Ok(()) => {
                info!(printer, "serial connection test passed");
                true
            }
            Err(e) => {
                warn!(printer, error = %e, "serial connection test failed");
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
        let printer = job.settings.printer_name.clone();
        let path = self.port_path(&printer)?;
        let program = program.clone();

        let token = self.in_flight.begin(job.id, cancel);
        let (job_id, baud, timeout, delay) = (
            job.id,
            self.config.baud_rate,
            self.config.print_timeout(),
            self.config.command_delay(),
        );
        let result = tokio::task::spawn_blocking(move || {
            let mut session = TransmitSession::new(printer);
            if token.is_cancelled() {
                return Err(session.abort(cancelled(job_id)));
            }
            session.enter(TransmitPhase::Connecting)?;
            let mut port = open_port(&path, baud, timeout).map_err(|e| session.abort(e))?;
            transmit(&mut port, &program, &mut session, delay, &token)
        })
        .await
        .map_err(|e| LabelBridgeError::Transport(format!("serial print task failed: {e}")));
        self.in_flight.end(job.id);

        result??;
        info!(job_id = %job.id, "label sent over serial");
        Ok(())
    }

    /// `DLE EOT SOH`, then one status byte within the status timeout.
    pub async fn get_status(&self, printer: &str) -> PrinterStatus {
        let path = match self.port_path(printer) {
            Ok(path) => path,
            Err(_) => return PrinterStatus::offline("Invalid printer name"),
        };
        let (baud, timeout) = (self.config.baud_rate, self.config.status_timeout());
        let result = tokio::task::spawn_blocking(move || {
            let mut port = open_port(&path, baud, timeout)?;
            Ok::<_, LabelBridgeError>(query_status(&mut port))
        })
        .await;

        match result {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => PrinterStatus::offline(e.to_string()),
            Err(e) => PrinterStatus::offline(format!("status task failed: {e}")),
        }
    }

    pub fn dispose(&self) {
        self.ports.lock().expect("serial port map lock poisoned").clear();
    }

    /// Port path for a logical name.  Names from discovery resolve through
    /// the port map; any other `<prefix><port>` is taken at face value.
    fn port_path(&self, printer: &str) -> Result<String> {
        if let Some(path) = self
            .ports
            .lock()
            .expect("serial port map lock poisoned")
            .get(printer)
        {
            return Ok(path.clone());
        }
        strip_printer_prefix(printer, &self.config.name_prefix).map(str::to_owned)
    }

    async fn probe_port(&self, path: &str) -> Result<()> {
        let (path, baud, timeout) = (
            path.to_owned(),
            self.config.baud_rate,
            self.config.status_timeout(),
        );
        tokio::task::spawn_blocking(move || {
            let mut port = open_port(&path, baud, timeout)?;
            port.write_all(&commands::INITIALIZE)
                .and_then(|()| port.flush())
                .map_err(|e| LabelBridgeError::Transport(format!("write to {path}: {e}")))?;
            std::thread::sleep(Duration::from_millis(100));
            Ok(())
        })
        .await
        .map_err(|e| LabelBridgeError::Transport(format!("serial probe task failed: {e}")))?
    }
}

fn open_port(path: &str, baud: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    serialport::new(path, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|e| LabelBridgeError::Transport(format!("open {path}: {e}")))
}

/// Write `program` to `port` segment by segment, pausing `delay` after each
/// (twice that after initialize).  Checks `cancel` between segments.
pub fn transmit<W: Write>(
    port: &mut W,
    program: &LabelProgram,
    session: &mut TransmitSession,
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    for segment in program.segments() {
        if cancel.is_cancelled() {
            return Err(session.abort(LabelBridgeError::Transport("cancelled".into())));
        }
        session.enter(segment.phase.into())?;
        port.write_all(&segment.bytes)
            .and_then(|()| port.flush())
            .map_err(|e| session.abort(io_error("write", e)))?;

        let pause = match segment.phase {
            ProgramPhase::Initialize => delay * 2,
            _ => delay,
        };
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }
    session.finish()
}

/// Ask for the one-byte real-time status.  A timeout, a zero-length read,
/// or any I/O error means offline.
pub fn query_status<T: Read + Write>(port: &mut T) -> PrinterStatus {
    if let Err(e) = port.write_all(&commands::STATUS_REQUEST).and_then(|()| port.flush()) {
        return PrinterStatus::offline(io_error("write", e).to_string());
    }
    let mut response = [0u8; 1];
    match port.read(&mut response) {
        Ok(1) => commands::decode_status(response[0]),
        Ok(_) => PrinterStatus::offline("no status response"),
        Err(e) => PrinterStatus::offline(io_error("read", e).to_string()),
    }
}

fn io_error(op: &str, err: std::io::Error) -> LabelBridgeError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            LabelBridgeError::Transport(format!("serial {op} timed out"))
        }
        _ => LabelBridgeError::Transport(format!("serial {op} failed: {err}")),
    }
}
