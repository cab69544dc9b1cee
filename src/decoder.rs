use std::{fs::File, path::Path};

use log::debug;
use thiserror::Error;

use symphonia::core::{
    audio::{AudioBuffer, AudioBufferRef, SampleBuffer},
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error,
    formats::{FormatOptions, FormatReader},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::media::MediaSpec;

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Error)]
pub enum DecoderError {
    #[error("eof")]
    EOF,
    #[error("ignored")]
    Ignored,
    #[error("unsupported audio: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Raw(String),
}

impl From<std::io::Error> for DecoderError {
    fn from(e: std::io::Error) -> Self {
        DecoderError::Raw(e.to_string())
    }
}

/// A whole file decoded into interleaved samples.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<i32>,
    pub spec: MediaSpec,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        match self.spec.channel {
            0 => 0,
            channel => self.samples.len() / channel as usize,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.spec.sample_rate == 0 {
            return 0.0;
        }

        self.frames() as f64 / f64::from(self.spec.sample_rate)
    }
}

/// Decodes every packet of the first audio track of `p`.
pub fn decode_file(p: &Path) -> Result<DecodedAudio, DecoderError> {
    let file = File::open(p)?;
    let mut decoder = PcmDecoder::new(file, p)?;
    let spec = decoder
        .spec()
        .ok_or_else(|| DecoderError::Unsupported("unknown sample rate or channel layout".into()))?;

    let mut samples = Vec::new();
    loop {
        match decoder.decode(&mut samples) {
            Ok(()) | Err(DecoderError::Ignored) => {}
            Err(DecoderError::EOF) => break,
            Err(e) => return Err(e),
        }
    }

    debug!("Decoded {} samples from {}", samples.len(), p.display());
    Ok(DecodedAudio { samples, spec })
}

pub struct PcmDecoder {
    format: Box<dyn FormatReader>,
    track_id: u32,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
}

impl PcmDecoder {
    pub fn new(src: File, p: &Path) -> Result<Self, DecoderError> {
        let mss = MediaSourceStream::new(Box::new(src), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = p.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let meta_opts = MetadataOptions::default();
        let fmt_opts = FormatOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| DecoderError::Unsupported(e.to_string()))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecoderError::Unsupported("no supported audio tracks".into()))?;

        let dec_opts = DecoderOptions::default();
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &dec_opts)
            .map_err(|e| DecoderError::Unsupported(e.to_string()))?;

        let track_id = track.id;

        Ok(Self {
            format,
            track_id,
            decoder,
        })
    }

    pub fn spec(&self) -> Option<MediaSpec> {
        let params = self.decoder.codec_params();
        Some(MediaSpec {
            sample_rate: params.sample_rate?,
            channel: params.channels.map(|c| c.count() as u32)?,
        })
    }

    /// Appends the samples of the next packet to `buf`.
    pub fn decode(&mut self, buf: &mut Vec<i32>) -> Result<(), DecoderError> {
        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            // Chained streams change the track list; treat it as the end of the clip.
            Err(Error::ResetRequired) => return Err(DecoderError::EOF),
            Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(DecoderError::EOF);
            }
            Err(err) => return Err(DecoderError::Raw(err.to_string())),
        };

        while !self.format.metadata().is_latest() {
            self.format.metadata().pop();
        }

        if packet.track_id() != self.track_id {
            return Err(DecoderError::Ignored);
        }

        match self.decoder.decode(&packet) {
            Ok(decoded) => {
                let duration = decoded.capacity() as u64;
                let spec = decoded.spec().to_owned();
                let mut sb: SampleBuffer<i32> = SampleBuffer::new(duration, spec);
                match decoded {
                    AudioBufferRef::S32(b) => {
                        sb.copy_interleaved_typed(b.as_ref());
                    }
                    _ => {
                        let mut converted: AudioBuffer<i32> = AudioBuffer::new(duration, spec);
                        decoded.convert(&mut converted);
                        sb.copy_interleaved_typed(&converted);
                    }
                }

                buf.extend_from_slice(sb.samples());
                Ok(())
            }
            // Corrupt or unreadable packets are skipped.
            Err(Error::IoError(_)) | Err(Error::DecodeError(_)) => Err(DecoderError::Ignored),
            Err(err) => Err(DecoderError::Raw(err.to_string())),
        }
    }
}
