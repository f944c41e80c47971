// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The full command stream for one print job, split into segments so that
// transports can pace them and report which phase a failure happened in.

use image::GrayImage;
use labelbridge_core::PrintJob;
use labelbridge_core::error::Result;

use crate::commands;
use crate::encoder::{DotSize, EncodedRaster, RasterEncoder, encode_png};

/// Which part of the print operation a segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramPhase {
    /// `ESC @`.
    Initialize,
    /// Label size and raster data.
    Transmit,
    /// Cut or feed.
    Finalize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSegment {
    pub phase: ProgramPhase,
    pub bytes: Vec<u8>,
}

/// Ordered command segments for a job.
///
/// Layout: one initialize, then for each copy the size-set commands, the
/// raster, and a cut (or three line feeds when auto-cut is off).
#[derive(Debug, Clone)]
pub struct LabelProgram {
    size: DotSize,
    copies: u32,
    segments: Vec<CommandSegment>,
    render: GrayImage,
}

impl LabelProgram {
    /// Encode the job's image and build its program.
    pub fn for_job(job: &PrintJob) -> Result<Self> {
        let raster = RasterEncoder::new().with_size_commands(true).encode(
            &job.image,
            job.settings.width_mm,
            job.settings.height_mm,
        )?;
        Ok(Self::from_raster(&raster, job.settings.copies, job.settings.auto_cut))
    }

    pub fn from_raster(raster: &EncodedRaster, copies: u32, auto_cut: bool) -> Self {
        let copies = copies.max(1);
        let size_commands = if raster.size_commands.is_empty() {
            commands::set_label_size(raster.size)
        } else {
            raster.size_commands.clone()
        };
        let finish: &[u8] = if auto_cut {
            &commands::AUTO_CUT
        } else {
            &commands::FEED
        };

        let mut segments = Vec::with_capacity(1 + 3 * copies as usize);
        segments.push(CommandSegment {
            phase: ProgramPhase::Initialize,
            bytes: commands::INITIALIZE.to_vec(),
        });
        for _ in 0..copies {
            segments.push(CommandSegment {
                phase: ProgramPhase::Transmit,
                bytes: size_commands.clone(),
            });
            segments.push(CommandSegment {
                phase: ProgramPhase::Transmit,
                bytes: raster.raster.clone(),
            });
            segments.push(CommandSegment {
                phase: ProgramPhase::Finalize,
                bytes: finish.to_vec(),
            });
        }

        Self {
            size: raster.size,
            copies,
            segments,
            render: raster.render.clone(),
        }
    }

    pub fn size(&self) -> DotSize {
        self.size
    }

    pub fn copies(&self) -> u32 {
        self.copies
    }

    pub fn segments(&self) -> &[CommandSegment] {
        &self.segments
    }

    /// The monochrome label the raster segments were packed from.
    pub fn render(&self) -> &GrayImage {
        &self.render
    }

    /// PNG of [`render`](Self::render), for previews.
    pub fn preview_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.render)
    }

    /// Total bytes on the wire.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.bytes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole program as one contiguous stream.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for segment in &self.segments {
            out.extend_from_slice(&segment.bytes);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use labelbridge_core::{LabelImageFormat, PrintSettings};

    fn black_png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])));
        let mut buffer = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .expect("encode PNG");
        buffer
    }

    fn job(auto_cut: bool, copies: u32) -> PrintJob {
        let mut settings = PrintSettings::new("Serial-COM3", 56.0, 31.0);
        settings.auto_cut = auto_cut;
        settings.copies = copies;
        PrintJob::new("e2e", black_png(56, 31), LabelImageFormat::Png, settings)
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn black_56x31_label_stream() {
        let bytes = LabelProgram::for_job(&job(true, 1)).expect("program").to_bytes();
        assert_eq!(&bytes[..2], &[0x1B, 0x40]);
        assert!(contains(&bytes, &[0x1D, 0x57, 0xC0, 0x01]));
        assert!(contains(&bytes, &[0x1D, 0x48, 0xF8, 0x00]));
        assert!(contains(&bytes, &[0x1B, 0x2A, 0x21, 0xC0, 0x01, 0xF8, 0x00]));
        assert!(bytes.ends_with(&[0x1D, 0x56, 0x41, 0x00]));
    }

    #[test]
    fn feed_replaces_cut() {
        let bytes = LabelProgram::for_job(&job(false, 1)).expect("program").to_bytes();
        assert!(bytes.ends_with(&[0x0A, 0x0A, 0x0A]));
        assert!(!contains(&bytes, &commands::AUTO_CUT));
    }

    #[test]
    fn phases_are_ordered() {
        let program = LabelProgram::for_job(&job(true, 1)).expect("program");
        let phases: Vec<_> = program.segments().iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![
                ProgramPhase::Initialize,
                ProgramPhase::Transmit,
                ProgramPhase::Transmit,
                ProgramPhase::Finalize,
            ]
        );
        assert_eq!(program.size(), DotSize::new(448, 248));
    }

    #[test]
    fn preview_comes_from_the_printed_render() {
        let program = LabelProgram::for_job(&job(true, 2)).expect("program");
        assert_eq!(program.render().dimensions(), (448, 248));
        assert!(program.render().pixels().all(|p| p.0[0] == 0));

        let png = program.preview_png().expect("png");
        let decoded = image::load_from_memory(&png).expect("decode").to_luma8();
        assert_eq!(&decoded, program.render());
    }

    #[test]
    fn copies_repeat_everything_but_initialize() {
        let one = LabelProgram::for_job(&job(true, 1)).expect("program");
        let three = LabelProgram::for_job(&job(true, 3)).expect("program");
        assert_eq!(three.copies(), 3);
        assert_eq!(three.segments().len(), 1 + 3 * 3);
        assert_eq!(three.len() - 2, 3 * (one.len() - 2));

        let stream = three.to_bytes();
        let inits = stream.windows(2).filter(|w| *w == commands::INITIALIZE).count();
        let cuts = stream.windows(4).filter(|w| *w == commands::AUTO_CUT).count();
        assert!(inits >= 1);
        assert_eq!(&stream[..2], &commands::INITIALIZE);
        assert_eq!(cuts, 3);
    }

    #[test]
    fn zero_copies_prints_once() {
        let raster = RasterEncoder::new()
            .encode(&black_png(8, 8), 1.0, 1.0)
            .expect("encode");
        let program = LabelProgram::from_raster(&raster, 0, true);
        assert_eq!(program.copies(), 1);
        // Size commands are filled in even when the encoder skipped them.
        assert_eq!(program.segments()[1].bytes, commands::set_label_size(DotSize::new(8, 8)));
    }
}
