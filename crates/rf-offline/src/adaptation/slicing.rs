//! Slice-point adaptation

use rf_core::{Sample, SharedBuffer};

use super::Adaptation;
use crate::context::ProcessContext;
use crate::error::{OfflineError, OfflineResult};
use crate::processors::AlgorithmClient;
use crate::spikes::spikes_to_times;
use crate::wrapper::ChannelBufferSpec;

/// Detector output to frame markers
///
/// The selected channels are summed to mono, padded by the client's
/// latency and run through the client once. Any spike inside the padding
/// counts as a single event at the first unpadded frame. The output
/// buffer receives one marker per spike, in source frames.
pub struct Slicing;

impl Adaptation for Slicing {
    const NAME: &'static str = "slicing";

    fn process<C: AlgorithmClient>(
        client: &mut C,
        inputs: &[ChannelBufferSpec],
        outputs: &[Option<SharedBuffer>],
        frames: usize,
        chans: usize,
        ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        let ([spec], [Some(output)]) = (inputs, outputs) else {
            return Err(OfflineError::InvalidConfig(
                "slicing takes exactly one input and one output buffer".into(),
            ));
        };

        let latency = client.latency();
        let padded = frames + latency;

        let mut mono = vec![0.0; padded];
        let sample_rate = {
            let source = spec.buffer.read();
            for ch in spec.start_chan..spec.start_chan + chans {
                let samples = source.span(spec.start_frame, frames, ch)?;
                for (sum, sample) in mono.iter_mut().zip(samples) {
                    *sum += sample;
                }
            }
            source.sample_rate()
        };

        let mut spikes = vec![0.0; padded];
        client.reset();
        {
            let input_views: [&[Sample]; 1] = [&mono];
            let mut output_views: [&mut [Sample]; 1] = [&mut spikes];
            client.process(&input_views, &mut output_views, ctx)?;
        }

        if latency > 0 && spikes[..latency].iter().any(|&value| value > 0.0) {
            spikes[latency] = 1.0;
        }

        let mut dest = output.write();
        spikes_to_times(&spikes[latency..], &mut *dest, 1, spec.start_frame, sample_rate)
    }
}
