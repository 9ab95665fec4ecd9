use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::codec::StreamCodec;
use crate::config::RunOptions;
use crate::engine::StreamSession;
use crate::error::{Error, Result};
use crate::format::scan_offset;

/// What an unpack run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Offset of the payload inside the archive.
    pub data_offset: u64,
    /// Compressed bytes read after the offset.
    pub payload_len: u64,
    /// Decompressed bytes written.
    pub output_len: u64,
}

/// Decompress the payload of `archive` into `output`.
///
/// # Open sequence
/// 1. Scan the archive for its data-offset marker.
/// 2. Seek the archive to that offset.
/// 3. Stream everything after it through `decoder` into `output`.
///
/// `archive` is normally the running program itself.
pub fn unpack_archive<C, F>(
    archive: impl AsRef<Path>,
    output: impl AsRef<Path>,
    decoder: &mut C,
    options: &RunOptions,
    on_progress: F,
) -> Result<UnpackSummary>
where
    C: StreamCodec + ?Sized,
    F: FnMut(u64, u64),
{
    let mut archive_file =
        File::open(archive.as_ref()).map_err(|e| Error::io("opening archive", e))?;
    let archive_len = archive_file
        .metadata()
        .map_err(|e| Error::io("reading archive size", e))?
        .len();

    let data_offset = scan_offset(&mut archive_file)?;
    if data_offset > archive_len {
        return Err(Error::CorruptOffset(format!(
            "data offset {} is past the end of the archive ({} bytes)",
            data_offset, archive_len
        )));
    }

    archive_file
        .seek(SeekFrom::Start(data_offset))
        .map_err(|e| Error::io("seeking to payload", e))?;

    let output_file =
        File::create(output.as_ref()).map_err(|e| Error::io("creating output file", e))?;

    let total = archive_len - data_offset;
    tracing::debug!(
        archive = %archive.as_ref().display(),
        output = %output.as_ref().display(),
        data_offset,
        total,
        "unpacking"
    );

    let summary = StreamSession::new(options.buffer_size, total).run(
        decoder,
        archive_file,
        output_file,
        on_progress,
    )?;

    Ok(UnpackSummary {
        data_offset,
        payload_len: summary.bytes_read,
        output_len: summary.bytes_written,
    })
}
