/*
 * Copyright 2020 The Regents of the University of California
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//! The channel emitter shim: hands one block of PCM to a destination
//!
//! RTP/RTCP framing and multicast delivery are external collaborators (`spec.md` §1); this
//! crate only defines the boundary each channel writes across.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::EngineError;

/// One block of demodulated PCM handed to a channel's destination
///
/// `samples` is interleaved if `channels == 2`. `muted` mirrors Pass E of the linear
/// demodulator (`spec.md` §4.5): the emitter decides whether muted blocks are silence,
/// suppressed, or marked some other way.
pub struct PcmBlock<'a> {
    pub samples: &'a [f32],
    pub channels: u8,
    pub muted: bool,
    pub ssrc: u32,
}

/// Destination for one channel's demodulated audio
pub trait FrameSink: Send {
    /// Delivers one block of PCM
    fn deliver(&mut self, block: PcmBlock<'_>) -> Result<(), EngineError>;
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn deliver(&mut self, block: PcmBlock<'_>) -> Result<(), EngineError> {
        (**self).deliver(block)
    }
}

/// Discards everything delivered to it
#[derive(Debug, Default)]
pub struct NullFrameSink;

impl FrameSink for NullFrameSink {
    fn deliver(&mut self, _block: PcmBlock<'_>) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Captures every delivered block, for tests
#[derive(Debug, Default)]
pub struct VecFrameSink {
    /// Interleaved samples from every non-muted block, in delivery order
    pub samples: Vec<f32>,
    /// Mute flag from every delivered block, in delivery order
    pub mutes: Vec<bool>,
    /// Channel count last observed
    pub channels: u8,
}

impl FrameSink for VecFrameSink {
    fn deliver(&mut self, block: PcmBlock<'_>) -> Result<(), EngineError> {
        self.channels = block.channels;
        self.mutes.push(block.muted);
        self.samples.extend_from_slice(block.samples);
        Ok(())
    }
}

/// Writes interleaved raw `f32` PCM samples to any `Write`, for the `Stdout`/`File` destinations
/// (`spec.md` §1: RTP framing lives outside this crate; this is the simplest destination that
/// doesn't need it)
pub struct WriterFrameSink<W> {
    writer: W,
}

impl<W: Write + Send> WriterFrameSink<W> {
    pub fn new(writer: W) -> Self {
        WriterFrameSink { writer }
    }
}

impl<W: Write + Send> FrameSink for WriterFrameSink<W> {
    fn deliver(&mut self, block: PcmBlock<'_>) -> Result<(), EngineError> {
        for &sample in block.samples {
            self.writer
                .write_f32::<LittleEndian>(sample)
                .map_err(|e| EngineError::NetworkError(e.to_string()))?;
        }
        self.writer
            .flush()
            .map_err(|e| EngineError::NetworkError(e.to_string()))
    }
}

/// Writes a 16-bit PCM `.wav` file, for local inspection without an RTP stack
///
/// The header is written with placeholder sizes and patched on `finalize`/`Drop`, the same
/// "write then seek back and patch" approach the teacher's `output::stdio` helpers use for
/// framing raw samples.
pub struct WavFileSink {
    writer: BufWriter<File>,
    sample_rate: u32,
    channels: u16,
    data_bytes: u32,
    finalized: bool,
}

const WAV_HEADER_BYTES: u64 = 44;

impl WavFileSink {
    /// Creates (or truncates) a `.wav` file at `path`
    pub fn create(path: impl AsRef<Path>, sample_rate: u32, channels: u16) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_placeholder_header(&mut writer, sample_rate, channels)?;
        Ok(WavFileSink {
            writer,
            sample_rate,
            channels,
            data_bytes: 0,
            finalized: false,
        })
    }

    /// Seeks back and writes the final RIFF/data chunk sizes
    pub fn finalize(&mut self) -> io::Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.seek(SeekFrom::Start(4))?;
        file.write_u32::<LittleEndian>(36 + self.data_bytes)?;
        file.seek(SeekFrom::Start(40))?;
        file.write_u32::<LittleEndian>(self.data_bytes)?;
        file.seek(SeekFrom::End(0))?;
        self.finalized = true;
        Ok(())
    }
}

fn write_placeholder_header(
    w: &mut impl Write,
    sample_rate: u32,
    channels: u16,
) -> io::Result<()> {
    let bits_per_sample: u16 = 16;
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * u32::from(block_align);

    w.write_all(b"RIFF")?;
    w.write_u32::<LittleEndian>(36)?; // patched in finalize()
    w.write_all(b"WAVE")?;
    w.write_all(b"fmt ")?;
    w.write_u32::<LittleEndian>(16)?;
    w.write_u16::<LittleEndian>(1)?; // PCM
    w.write_u16::<LittleEndian>(channels)?;
    w.write_u32::<LittleEndian>(sample_rate)?;
    w.write_u32::<LittleEndian>(byte_rate)?;
    w.write_u16::<LittleEndian>(block_align)?;
    w.write_u16::<LittleEndian>(bits_per_sample)?;
    w.write_all(b"data")?;
    w.write_u32::<LittleEndian>(0)?; // patched in finalize()
    Ok(())
}

impl FrameSink for WavFileSink {
    fn deliver(&mut self, block: PcmBlock<'_>) -> Result<(), EngineError> {
        if block.channels != self.channels as u8 {
            return Err(EngineError::InternalInvariantViolation(format!(
                "wav sink was created for {} channels but received {}",
                self.channels, block.channels
            )));
        }
        for &sample in block.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let pcm = (clamped * f32::from(i16::MAX)) as i16;
            self.writer
                .write_i16::<LittleEndian>(pcm)
                .map_err(|e| EngineError::NetworkError(e.to_string()))?;
        }
        self.data_bytes += (block.samples.len() * 2) as u32;
        let _ = self.sample_rate;
        Ok(())
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_sink_writes_little_endian_f32() {
        let mut buf = Vec::new();
        {
            let mut sink = WriterFrameSink::new(&mut buf);
            sink.deliver(PcmBlock {
                samples: &[1.0, -1.0],
                channels: 1,
                muted: false,
                ssrc: 0,
            })
            .unwrap();
        }
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&buf[4..8], &(-1.0f32).to_le_bytes());
    }

    #[test]
    fn vec_sink_captures_samples_and_mutes() {
        let mut sink = VecFrameSink::default();
        sink.deliver(PcmBlock {
            samples: &[0.1, 0.2, 0.3],
            channels: 1,
            muted: false,
            ssrc: 1,
        })
        .unwrap();
        sink.deliver(PcmBlock {
            samples: &[0.0, 0.0, 0.0],
            channels: 1,
            muted: true,
            ssrc: 1,
        })
        .unwrap();
        assert_eq!(sink.samples, vec![0.1, 0.2, 0.3, 0.0, 0.0, 0.0]);
        assert_eq!(sink.mutes, vec![false, true]);
    }

    #[test]
    fn wav_sink_rejects_channel_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = WavFileSink::create(dir.path().join("out.wav"), 24_000, 1).unwrap();
        let result = sink.deliver(PcmBlock {
            samples: &[0.0, 0.0],
            channels: 2,
            muted: false,
            ssrc: 0,
        });
        assert!(result.is_err());
    }

    #[test]
    fn wav_sink_writes_a_valid_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        {
            let mut sink = WavFileSink::create(&path, 24_000, 1).unwrap();
            sink.deliver(PcmBlock {
                samples: &[0.5, -0.5, 0.25],
                channels: 1,
                muted: false,
                ssrc: 0,
            })
            .unwrap();
            sink.finalize().unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len() as u64, WAV_HEADER_BYTES + 6);
    }
}
