//! Opus sounds stored as a sequence of length-prefixed frames.
//!
//! Each frame on disk is a little-endian `u16` byte count followed by that
//! many bytes of Opus payload. There is no header; the file simply ends after
//! the last frame.

use std::{
    fs::File,
    io::{BufReader, Cursor, ErrorKind, Read},
    path::Path,
    time::Duration,
};

use opus::{Channels, Decoder};
use songbird::input::{Input, RawAdapter};

use crate::error::SoundError;

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;
/// Duration of a single frame as written by the encoder.
pub const FRAME_DURATION: Duration = Duration::from_millis(20);
/// Samples per channel in one `FRAME_DURATION`.
const FRAME_SAMPLES: usize = 960;
/// Largest opus frame is 120ms, per channel.
const MAX_FRAME_SAMPLES: usize = 5760;

#[derive(Debug, Default, Clone)]
pub struct Sound {
    frames: Vec<Vec<u8>>,
}

impl Sound {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SoundError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SoundError::Open {
            path: path.display().to_string(),
            source,
        })?;

        let sound = Self::from_reader(BufReader::new(file))?;
        log::info!(
            "loaded {} frames ({:?}) from `{}`",
            sound.len(),
            sound.duration(),
            path.display()
        );
        Ok(sound)
    }

    /// Reads frames until the stream runs out.
    ///
    /// Running out while reading a length prefix is a normal end of stream.
    /// Running out inside a payload means the file was cut short.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, SoundError> {
        let mut frames = Vec::new();

        loop {
            let mut len = [0u8; 2];
            match reader.read_exact(&mut len) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let expected = u16::from_le_bytes(len) as usize;
            let mut frame = vec![0u8; expected];
            match reader.read_exact(&mut frame) {
                Ok(()) => frames.push(frame),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(SoundError::Truncated {
                        frame: frames.len(),
                        expected,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn duration(&self) -> Duration {
        FRAME_DURATION * self.frames.len() as u32
    }

    /// Decodes all frames into interleaved stereo `f32` samples.
    pub fn decode(&self) -> Result<Vec<f32>, SoundError> {
        let mut decoder = Decoder::new(SAMPLE_RATE, Channels::Stereo)
            .map_err(|source| SoundError::Decode { frame: 0, source })?;
        let mut buf = vec![0f32; MAX_FRAME_SAMPLES * CHANNELS as usize];
        let mut pcm = Vec::with_capacity(self.frames.len() * FRAME_SAMPLES * CHANNELS as usize);

        for (i, frame) in self.frames().iter().enumerate() {
            // Empty frames would make the decoder conceal a whole buffer's worth.
            if frame.is_empty() {
                pcm.resize(pcm.len() + FRAME_SAMPLES * CHANNELS as usize, 0.0);
                continue;
            }

            let samples = decoder
                .decode_float(frame, &mut buf, false)
                .map_err(|source| SoundError::Decode { frame: i, source })?;
            pcm.extend_from_slice(&buf[..samples * CHANNELS as usize]);
        }

        Ok(pcm)
    }

    /// Builds a playable input for the voice driver.
    pub fn to_input(&self) -> Result<Input, SoundError> {
        let bytes = self
            .decode()?
            .into_iter()
            .flat_map(f32::to_le_bytes)
            .collect::<Vec<u8>>();

        Ok(RawAdapter::new(Cursor::new(bytes), SAMPLE_RATE, CHANNELS).into())
    }
}
