// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// labelbridge-print: gets encoded labels onto physical printers.
//
// Drivers (serial, network, loopback) own the transports.  The registry maps
// logical printer names to drivers, the dispatcher tracks job lifecycle, and
// the worker serializes all physical printing through one consumer.

pub mod dispatcher;
pub mod driver;
pub mod registry;
pub mod session;
pub mod worker;

pub use dispatcher::{PrintDispatcher, Processed};
pub use driver::PrinterDriver;
pub use driver::loopback::{CapturedLabel, LoopbackLabelDriver};
pub use driver::network::NetworkLabelDriver;
pub use driver::serial::SerialLabelDriver;
pub use registry::DriverRegistry;
pub use session::{TransmitPhase, TransmitSession};
pub use worker::PrintWorker;
