mod zstd_codec;

pub use zstd_codec::{zstd_level, ZstdDecoder, ZstdEncoder};

use myzip_core::{EncoderConfiguration, Result};

/// Build the encoder the pack path uses for `config`.
pub fn encoder_for(config: &EncoderConfiguration) -> Result<ZstdEncoder> {
    ZstdEncoder::new(config)
}

/// Build the decoder the unpack path uses. Concatenated frames are always
/// accepted.
pub fn decoder() -> Result<ZstdDecoder> {
    ZstdDecoder::new()
}
