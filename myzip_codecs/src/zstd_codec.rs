use myzip_core::{Action, EncoderConfiguration, Error, Result, Step, StepStatus, StreamCodec};
use zstd::stream::raw::{CParameter, DParameter, Decoder, Encoder, InBuffer, Operation, OutBuffer};

const NAME: &str = "zstd";

/// zstd levels for user levels 0–9.
const LEVELS: [i32; 10] = [1, 2, 3, 4, 6, 9, 12, 15, 17, 19];

/// zstd levels for user levels 0–9 with `extreme` set. 20 and up are the
/// "ultra" levels with larger windows.
const EXTREME_LEVELS: [i32; 10] = [3, 5, 8, 11, 14, 16, 18, 19, 20, 22];

/// Largest decoder window the platform can address; the decoder imposes no
/// tighter memory limit.
const WINDOW_LOG_MAX: u32 = if cfg!(target_pointer_width = "64") { 31 } else { 30 };

/// Map a 0–9 level and the extreme flag onto a zstd compression level.
pub fn zstd_level(level: u8, extreme: bool) -> i32 {
    let table = if extreme { &EXTREME_LEVELS } else { &LEVELS };
    table[usize::from(level).min(table.len() - 1)]
}

fn codec_error(e: std::io::Error) -> Error {
    Error::Codec {
        codec: NAME,
        message: e.to_string(),
    }
}

/// Zstandard stream encoder.
///
/// Writes a single frame with a content checksum. With more than one thread
/// configured, libzstd compresses jobs on its own worker pool and `step` may
/// block while workers catch up.
pub struct ZstdEncoder {
    inner: Encoder<'static>,
}

impl ZstdEncoder {
    pub fn new(config: &EncoderConfiguration) -> Result<Self> {
        let level = zstd_level(config.level, config.extreme);
        let mut inner = Encoder::new(level).map_err(codec_error)?;
        inner
            .set_parameter(CParameter::ChecksumFlag(true))
            .map_err(codec_error)?;
        if config.threads > 1 {
            inner
                .set_parameter(CParameter::NbWorkers(config.threads))
                .map_err(codec_error)?;
        }
        if config.block_size > 0 {
            inner
                .set_parameter(CParameter::JobSize(config.block_size))
                .map_err(codec_error)?;
        }
        if config.extreme {
            inner
                .set_parameter(CParameter::EnableLongDistanceMatching(true))
                .map_err(codec_error)?;
        }

        tracing::debug!(
            level,
            threads = config.threads,
            block_size = config.block_size,
            extreme = config.extreme,
            "zstd encoder ready"
        );
        Ok(Self { inner })
    }
}

impl StreamCodec for ZstdEncoder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn step(&mut self, input: &[u8], output: &mut [u8], action: Action) -> Result<Step> {
        let mut out = OutBuffer::around(output);

        // Input still pending is fed normally even when finishing; the frame
        // epilogue is only written once all of it has been taken.
        if action == Action::Run || !input.is_empty() {
            let mut src = InBuffer::around(input);
            self.inner.run(&mut src, &mut out).map_err(codec_error)?;
            return Ok(Step {
                consumed: src.pos(),
                produced: out.pos(),
                status: StepStatus::Progress,
            });
        }

        let remaining = self.inner.finish(&mut out, true).map_err(codec_error)?;
        Ok(Step {
            consumed: 0,
            produced: out.pos(),
            status: if remaining == 0 {
                StepStatus::StreamEnd
            } else {
                StepStatus::Progress
            },
        })
    }
}

/// Zstandard stream decoder.
///
/// Decodes any number of back-to-back frames as one output. The stream ends
/// once the input is exhausted on a frame boundary.
pub struct ZstdDecoder {
    inner: Decoder<'static>,
    /// The last frame seen has been fully decoded and flushed.
    frame_complete: bool,
}

impl ZstdDecoder {
    pub fn new() -> Result<Self> {
        let mut inner = Decoder::new().map_err(codec_error)?;
        inner
            .set_parameter(DParameter::WindowLogMax(WINDOW_LOG_MAX))
            .map_err(codec_error)?;
        Ok(Self {
            inner,
            frame_complete: false,
        })
    }
}

impl StreamCodec for ZstdDecoder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn step(&mut self, input: &[u8], output: &mut [u8], action: Action) -> Result<Step> {
        let mut src = InBuffer::around(input);
        let mut out = OutBuffer::around(output);
        let hint = self.inner.run(&mut src, &mut out).map_err(codec_error)?;
        let consumed = src.pos();
        let produced = out.pos();

        if hint == 0 {
            self.frame_complete = true;
        } else if consumed > 0 {
            // Bytes of a following frame were taken.
            self.frame_complete = false;
        }

        let status = if action == Action::Finish && consumed == input.len() && self.frame_complete
        {
            StepStatus::StreamEnd
        } else {
            StepStatus::Progress
        };
        Ok(Step {
            consumed,
            produced,
            status,
        })
    }
}
