// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Built-in test label: a border around the printable area and a checker
// block in the middle, drawn at device resolution so nothing is resampled.

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use labelbridge_core::error::{LabelBridgeError, Result};

use crate::encoder::DotSize;

const BORDER_DOTS: u32 = 4;
const CHECKER_DOTS: u32 = 8;
const BLACK: Luma<u8> = Luma([0]);
const WHITE: Luma<u8> = Luma([255]);

/// PNG bytes of the test label for a `width_mm` x `height_mm` label.
pub fn sample_label(width_mm: f64, height_mm: f64) -> Result<Vec<u8>> {
    let size = DotSize::from_mm(width_mm, height_mm)?;
    let canvas = draw_sample(size);

    let mut buffer = Vec::new();
    DynamicImage::ImageLuma8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| LabelBridgeError::ImageEncode(format!("sample label: {e}")))?;
    Ok(buffer)
}

fn draw_sample(size: DotSize) -> GrayImage {
    let (width, height) = (u32::from(size.width), u32::from(size.height));
    let mut canvas = GrayImage::from_pixel(width, height, WHITE);

    for inset in 0..BORDER_DOTS {
        let (w, h) = (width.saturating_sub(2 * inset), height.saturating_sub(2 * inset));
        if w == 0 || h == 0 {
            break;
        }
        draw_hollow_rect_mut(
            &mut canvas,
            Rect::at(inset as i32, inset as i32).of_size(w, h),
            BLACK,
        );
    }

    let (block_w, block_h) = (width / 3, height / 3);
    if block_w < CHECKER_DOTS || block_h < CHECKER_DOTS {
        return canvas;
    }
    let (left, top) = ((width - block_w) / 2, (height - block_h) / 2);
    for row in 0..block_h / CHECKER_DOTS {
        for col in 0..block_w / CHECKER_DOTS {
            if (row + col) % 2 == 0 {
                let x = left + col * CHECKER_DOTS;
                let y = top + row * CHECKER_DOTS;
                draw_filled_rect_mut(
                    &mut canvas,
                    Rect::at(x as i32, y as i32).of_size(CHECKER_DOTS, CHECKER_DOTS),
                    BLACK,
                );
            }
        }
    }
    canvas
}
