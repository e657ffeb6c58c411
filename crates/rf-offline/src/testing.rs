//! Shared fixtures for unit tests

use std::sync::Arc;

use rf_core::{MemoryBuffer, ParamDescriptor, ParamDescriptorSet, ParamSet, RfResult, Sample, SharedBuffer};

use crate::adaptation::Streaming;
use crate::context::ProcessContext;
use crate::error::OfflineResult;
use crate::processors::AlgorithmClient;
use crate::wrapper::{BatchClient, BufferLayout, NrtClient};

/// Multiplies its input by `gain`
#[derive(Debug, Default)]
pub(crate) struct ScaleClient {
    gain: f64,
}

impl ScaleClient {
    pub(crate) fn batch() -> BatchClient<Self, Streaming> {
        BatchClient::new(BufferLayout::new().input("source").output("dest"), Self::default())
    }
}

impl AlgorithmClient for ScaleClient {
    fn descriptors() -> ParamDescriptorSet {
        ParamDescriptorSet::new().with(ParamDescriptor::float("gain", "Gain", 1.0))
    }

    fn name(&self) -> &'static str {
        "scale"
    }

    fn set_params(&mut self, params: &ParamSet) -> RfResult<()> {
        self.gain = params.float("gain")?;
        Ok(())
    }

    fn reset(&mut self) {}

    fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        _ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        for (out, input) in outputs[0].iter_mut().zip(inputs[0]) {
            *out = input * self.gain;
        }
        Ok(())
    }
}

/// Params for [`ScaleClient::batch`] over `[1, 2, 3, 4]` into a 1-frame buffer
pub(crate) fn scale_params(gain: f64) -> (ParamSet, SharedBuffer, SharedBuffer) {
    let descriptors = Arc::new(ScaleClient::batch().descriptors());
    let source = MemoryBuffer::from_channels(vec![vec![1.0, 2.0, 3.0, 4.0]], 44100.0).into_shared();
    let dest = SharedBuffer::memory(1, 1, 44100.0);

    let mut params = ParamSet::new(descriptors);
    params.set_buffer("source", Some(source.clone())).unwrap();
    params.set_buffer("dest", Some(dest.clone())).unwrap();
    params.set_float("gain", gain).unwrap();

    (params, source, dest)
}
