// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// labelbridge-raster: turns label images into thermal-printer command bytes.
//
// Provides the pure raster encoder (resize, monochrome threshold, 24-dot
// column packing), the ESC/POS command vocabulary the label printers speak,
// the per-job command program every driver transmits, and a built-in test
// pattern for commissioning printers.

pub mod commands;
pub mod encoder;
pub mod program;
pub mod sample;

pub use encoder::{DOTS_PER_MM, DotSize, EncodedRaster, RasterEncoder};
pub use program::{CommandSegment, LabelProgram, ProgramPhase};
pub use sample::sample_label;
