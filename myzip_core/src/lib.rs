pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod pack;
pub mod unpack;

pub use codec::{Action, Step, StepStatus, StreamCodec};
pub use config::{resolve, EncoderConfiguration, RunOptions};
pub use engine::{SessionSummary, StreamSession};
pub use error::{Error, ErrorKind, Result};
pub use format::{locate_and_patch, patch_image, read_mode, read_offset, Mode, PatchedImage};
pub use pack::{pack_archive, PackSummary};
pub use unpack::{unpack_archive, UnpackSummary};
