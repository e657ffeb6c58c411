//! Strategies for driving a streaming client over whole buffers
//!
//! - [`Streaming`]: full-rate audio to audio, latency compensated
//! - [`StreamingControl`]: one feature vector per control-rate hop
//! - [`Slicing`]: detector output to a list of frame markers

mod control;
mod slicing;
mod streaming;

pub use control::StreamingControl;
pub use slicing::Slicing;
pub use streaming::Streaming;

use rf_core::SharedBuffer;

use crate::context::ProcessContext;
use crate::error::OfflineResult;
use crate::processors::AlgorithmClient;
use crate::wrapper::ChannelBufferSpec;

/// Converts validated whole-buffer inputs into client calls
pub trait Adaptation: 'static {
    /// Strategy name for logs
    const NAME: &'static str;

    /// Run `client` over `frames` x `chans` of every input
    ///
    /// `outputs` keeps the layout's order; `None` marks an output that was
    /// dropped during validation. At least one output is present.
    fn process<C: AlgorithmClient>(
        client: &mut C,
        inputs: &[ChannelBufferSpec],
        outputs: &[Option<SharedBuffer>],
        frames: usize,
        chans: usize,
        ctx: &ProcessContext,
    ) -> OfflineResult<()>;
}
