// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ESC/POS command vocabulary used by the label printers.
//
// These byte sequences must stay bit-exact: the printers have no way to
// report a malformed command other than printing garbage.

use labelbridge_core::PrinterStatus;

use crate::encoder::DotSize;

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;
pub const DLE: u8 = 0x10;
pub const EOT: u8 = 0x04;
pub const LF: u8 = 0x0A;

/// `ESC @`: reset the printer to its power-on state.
pub const INITIALIZE: [u8; 2] = [ESC, 0x40];

/// `GS V A 0`: feed to the cutter and cut.
pub const AUTO_CUT: [u8; 4] = [GS, 0x56, 0x41, 0x00];

/// Three line feeds, used instead of a cut.
pub const FEED: [u8; 3] = [LF, LF, LF];

/// `DLE EOT SOH`: real-time status request.  The printer answers with one byte.
pub const STATUS_REQUEST: [u8; 3] = [DLE, EOT, 0x01];

/// `ESC *` mode 33: 24-dot double-density bit image.
pub const RASTER_MODE_24_DOT: u8 = 33;

/// Status byte bit: printer ready.
pub const STATUS_READY: u8 = 0x08;
/// Status byte bit: label stock present.
pub const STATUS_PAPER: u8 = 0x20;
/// Status byte bit: ribbon present.
pub const STATUS_RIBBON: u8 = 0x40;

/// `ESC * 33 wL wH hL hH`: header preceding the packed column data.
pub fn raster_header(size: DotSize) -> [u8; 7] {
    let [wl, wh] = size.width.to_le_bytes();
    let [hl, hh] = size.height.to_le_bytes();
    [ESC, 0x2A, RASTER_MODE_24_DOT, wl, wh, hl, hh]
}

/// `GS W nL nH`: set label width in dots.
pub fn set_label_width(dots: u16) -> [u8; 4] {
    let [lo, hi] = dots.to_le_bytes();
    [GS, 0x57, lo, hi]
}

/// `GS H nL nH`: set label height in dots.
pub fn set_label_height(dots: u16) -> [u8; 4] {
    let [lo, hi] = dots.to_le_bytes();
    [GS, 0x48, lo, hi]
}

/// Width-set followed by height-set.
pub fn set_label_size(size: DotSize) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&set_label_width(size.width));
    out.extend_from_slice(&set_label_height(size.height));
    out
}

/// Decode the one-byte answer to [`STATUS_REQUEST`].
///
/// Any answer at all means the printer is online.
pub fn decode_status(byte: u8) -> PrinterStatus {
    let mut status = PrinterStatus {
        online: true,
        ready: byte & STATUS_READY == STATUS_READY,
        paper_present: byte & STATUS_PAPER == STATUS_PAPER,
        ribbon_present: byte & STATUS_RIBBON == STATUS_RIBBON,
        ..PrinterStatus::default()
    };
    status
        .additional_info
        .insert("statusByte".into(), serde_json::Value::from(byte));
    status
}
