//! Encoder configuration and per-run options.

/// Upper bound on encoder worker threads, regardless of hardware.
pub const MAX_THREADS: u32 = 8;

/// Compression level used when the caller does not pick one.
pub const DEFAULT_LEVEL: u8 = 6;

/// Highest accepted compression level.
pub const MAX_LEVEL: u8 = 9;

/// Capacity of each of the two stream buffers.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Settings for one encode run. Built once by [`resolve`] and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfiguration {
    /// Encoder threads, in `1..=MAX_THREADS`.
    pub threads: u32,
    /// Compression level, in `0..=MAX_LEVEL`.
    pub level: u8,
    /// Trade more CPU time for a smaller payload at the same level.
    pub extreme: bool,
    /// Bytes per parallel job; 0 leaves it to the backend.
    pub block_size: u32,
}

impl Default for EncoderConfiguration {
    fn default() -> Self {
        Self {
            threads: 1,
            level: DEFAULT_LEVEL,
            extreme: false,
            block_size: 0,
        }
    }
}

/// Derive the encoder configuration from user overrides and the hardware.
///
/// Out-of-range inputs are clamped, never rejected. An explicit thread count
/// can only lower the hardware-derived count.
pub fn resolve(
    user_level: Option<u8>,
    extreme: bool,
    user_threads: Option<i32>,
    hardware_threads: u32,
) -> EncoderConfiguration {
    let mut threads = hardware_threads.max(1).min(MAX_THREADS);
    if let Some(requested) = user_threads {
        let requested = u32::try_from(requested).unwrap_or(0).max(1);
        threads = threads.min(requested);
    }

    EncoderConfiguration {
        threads,
        level: user_level.unwrap_or(DEFAULT_LEVEL).min(MAX_LEVEL),
        extreme,
        block_size: 0,
    }
}

/// Logical CPUs available to this process, or 0 when that cannot be detected.
pub fn hardware_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| u32::try_from(n.get()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// Options shared by the pack and unpack paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Capacity of each stream buffer in bytes.
    pub buffer_size: usize,
    /// Report progress and a run summary on stderr.
    pub verbose: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            verbose: false,
        }
    }
}
