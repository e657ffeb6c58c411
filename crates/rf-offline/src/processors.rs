//! Algorithm contract for block-based processors
//!
//! A client is written against a streaming contract: it is handed one
//! block of per-channel input views at a time and fills matching output
//! views. The adaptation strategies decide how whole buffers are cut
//! into those blocks.

use rf_core::{ParamDescriptorSet, ParamSet, RfResult, Sample};

use crate::context::ProcessContext;
use crate::error::OfflineResult;

/// Trait for streaming algorithm clients
pub trait AlgorithmClient: Send + 'static {
    /// Parameters this client reads from a [`ParamSet`]
    fn descriptors() -> ParamDescriptorSet
    where
        Self: Sized;

    /// Get client name
    fn name(&self) -> &'static str;

    /// Number of audio inputs consumed per block
    fn audio_channels_in(&self) -> usize {
        1
    }

    /// Number of audio outputs produced per block
    fn audio_channels_out(&self) -> usize {
        1
    }

    /// Width of the feature vector emitted per hop (control clients)
    fn control_channels_out(&self) -> usize {
        0
    }

    /// Samples consumed per feature vector (control clients)
    fn control_rate(&self) -> usize {
        1
    }

    /// Internal delay in samples
    fn latency(&self) -> usize {
        0
    }

    /// Called with the source sample rate before processing
    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    /// Pick up parameter values; may change latency
    fn set_params(&mut self, params: &ParamSet) -> RfResult<()>;

    /// Clear internal history
    fn reset(&mut self);

    /// Process one block
    fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        ctx: &ProcessContext,
    ) -> OfflineResult<()>;
}
