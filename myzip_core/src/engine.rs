use std::io::{ErrorKind, Read, Write};

use crate::codec::{Action, StepStatus, StreamCodec};
use crate::error::{Error, Result};

/// Byte counts of a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Bytes read from the source.
    pub bytes_read: u64,
    /// Bytes written to the sink.
    pub bytes_written: u64,
}

/// One encode or decode run of the streaming loop.
///
/// # Loop
/// ```text
/// input empty and source not exhausted → read one chunk, report progress,
///                                        switch to Finish on end of source
/// codec.step(input, output, action)
/// output full or StreamEnd             → write output to the sink
/// StreamEnd                            → done
/// ```
///
/// Memory is bounded by the two buffers; the session never seeks the sink and
/// never retries a failed read or write. Progress reports count bytes read
/// from the source, not bytes emitted.
pub struct StreamSession {
    input: Vec<u8>,
    output: Vec<u8>,
    /// Expected source length, only used for progress reports.
    total: u64,
    bytes_read: u64,
    bytes_written: u64,
    action: Action,
}

impl StreamSession {
    /// Create a session with two buffers of `buffer_size` bytes each.
    pub fn new(buffer_size: usize, total: u64) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            input: vec![0u8; buffer_size],
            output: vec![0u8; buffer_size],
            total,
            bytes_read: 0,
            bytes_written: 0,
            action: Action::Run,
        }
    }

    /// Pump `source` through `codec` into `sink` until the codec reports the
    /// end of the stream.
    ///
    /// `on_progress(bytes_read, total)` is called after every read, including
    /// the final empty read that detects the end of the source.
    pub fn run<C, R, W, F>(
        mut self,
        codec: &mut C,
        mut source: R,
        mut sink: W,
        mut on_progress: F,
    ) -> Result<SessionSummary>
    where
        C: StreamCodec + ?Sized,
        R: Read,
        W: Write,
        F: FnMut(u64, u64),
    {
        tracing::debug!(
            codec = codec.name(),
            buffer_size = self.input.len(),
            total = self.total,
            "starting stream session"
        );

        let mut in_pos = 0usize;
        let mut in_len = 0usize;
        let mut out_len = 0usize;
        let mut exhausted = false;

        loop {
            if in_pos == in_len && !exhausted {
                in_len = read_chunk(&mut source, &mut self.input)?;
                in_pos = 0;
                self.bytes_read += in_len as u64;
                on_progress(self.bytes_read, self.total);

                if in_len == 0 {
                    exhausted = true;
                    self.action = Action::Finish;
                }
            }

            let step = codec.step(
                &self.input[in_pos..in_len],
                &mut self.output[out_len..],
                self.action,
            )?;
            in_pos += step.consumed;
            out_len += step.produced;

            let stream_end = step.status == StepStatus::StreamEnd;
            if out_len == self.output.len() || stream_end {
                self.write_output(&mut sink, out_len)?;
                out_len = 0;
            }

            if stream_end {
                sink.flush().map_err(|e| Error::io("flushing output", e))?;
                tracing::debug!(
                    codec = codec.name(),
                    bytes_read = self.bytes_read,
                    bytes_written = self.bytes_written,
                    "stream session finished"
                );
                return Ok(SessionSummary {
                    bytes_read: self.bytes_read,
                    bytes_written: self.bytes_written,
                });
            }

            // Output space is always available here, so a step that moves
            // nothing after the last input is a dead end (e.g. truncated data).
            if self.action == Action::Finish
                && in_pos == in_len
                && step.consumed == 0
                && step.produced == 0
            {
                return Err(Error::Codec {
                    codec: codec.name(),
                    message: "no progress is possible; input ended inside a stream".to_string(),
                });
            }
        }
    }

    /// Hand the first `len` output bytes to the sink in a single write.
    fn write_output<W: Write>(&mut self, sink: &mut W, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let buf = &self.output[..len];
        let written = loop {
            match sink.write(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io("writing output", e)),
            }
        };
        if written != len {
            return Err(Error::ShortWrite {
                expected: len,
                written,
            });
        }
        self.bytes_written += len as u64;
        Ok(())
    }
}

/// One read from the source. A short count is normal; zero means exhausted.
fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match source.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io("reading input", e)),
        }
    }
}
