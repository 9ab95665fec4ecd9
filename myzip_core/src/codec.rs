use crate::error::Result;

/// What the stream engine tells the codec about the input side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// More input may follow.
    Run,
    /// The source is exhausted; whatever is in `input` is the last of it.
    Finish,
}

/// Whether the codec has more work to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Call `step` again.
    Progress,
    /// All output has been produced. Only valid once `Action::Finish` was given.
    StreamEnd,
}

/// Outcome of one `step` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Bytes taken from the front of `input`.
    pub consumed: usize,
    /// Bytes written to the front of `output`.
    pub produced: usize,
    pub status: StepStatus,
}

/// Streaming compression abstraction.
///
/// A `StreamCodec` is a stateful encoder or decoder driven in small steps by
/// [`StreamSession`](crate::engine::StreamSession). Each step may consume any
/// prefix of the input and fill any prefix of the output; the session owns the
/// buffers and handles all I/O.
///
/// Decoders must treat back-to-back compressed streams in one input as a single
/// logical output and only report `StreamEnd` after `Action::Finish` with all
/// input consumed.
pub trait StreamCodec {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Advance the codec by one step.
    fn step(&mut self, input: &[u8], output: &mut [u8], action: Action) -> Result<Step>;
}

impl<C: StreamCodec + ?Sized> StreamCodec for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn step(&mut self, input: &[u8], output: &mut [u8], action: Action) -> Result<Step> {
        (**self).step(input, output, action)
    }
}
