use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::codec::StreamCodec;
use crate::config::RunOptions;
use crate::engine::StreamSession;
use crate::error::{Error, Result};
use crate::format::patch_image;

/// What a pack run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackSummary {
    /// Bytes of patched program image at the front of the archive. Equal to
    /// the data offset recorded inside it.
    pub header_len: u64,
    /// Bytes read from the input file.
    pub input_len: u64,
    /// Bytes of compressed payload after the header.
    pub payload_len: u64,
}

impl PackSummary {
    pub fn archive_len(&self) -> u64 {
        self.header_len + self.payload_len
    }
}

/// Build an archive: `image` with its markers patched, followed by `input`
/// compressed through `encoder`.
///
/// # Layout written
/// ```text
/// [PATCHED IMAGE: image.len() bytes, data offset = image.len(), mode = 1]
/// [PAYLOAD: encoder output, up to end of file]
/// ```
///
/// The image is patched before any file is opened, so a bad image leaves no
/// output behind. A failure during streaming leaves a truncated output file.
pub fn pack_archive<C, F>(
    image: Vec<u8>,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    encoder: &mut C,
    options: &RunOptions,
    on_progress: F,
) -> Result<PackSummary>
where
    C: StreamCodec + ?Sized,
    F: FnMut(u64, u64),
{
    let patched = patch_image(image)?;
    let header_len = patched.len();

    let input_file = File::open(input.as_ref()).map_err(|e| Error::io("opening input file", e))?;
    let total = input_file
        .metadata()
        .map_err(|e| Error::io("reading input file size", e))?
        .len();

    let mut output_file =
        File::create(output.as_ref()).map_err(|e| Error::io("creating output file", e))?;
    output_file
        .write_all(patched.as_bytes())
        .map_err(|e| Error::io("writing archive header", e))?;
    drop(patched);

    // The archive is itself a program.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        output_file
            .set_permissions(std::fs::Permissions::from_mode(0o755))
            .map_err(|e| Error::io("marking output executable", e))?;
    }

    tracing::debug!(
        input = %input.as_ref().display(),
        output = %output.as_ref().display(),
        header_len,
        total,
        "packing"
    );

    let summary = StreamSession::new(options.buffer_size, total).run(
        encoder,
        input_file,
        &mut output_file,
        on_progress,
    )?;

    Ok(PackSummary {
        header_len,
        input_len: summary.bytes_read,
        payload_len: summary.bytes_written,
    })
}
