//! Full-rate streaming adaptation

use rf_core::{Sample, SharedBuffer};

use super::Adaptation;
use crate::context::ProcessContext;
use crate::error::{OfflineError, OfflineResult};
use crate::processors::AlgorithmClient;
use crate::wrapper::ChannelBufferSpec;

/// Audio in, audio out at the same rate
///
/// Each channel is processed on its own after a `reset()`, over a buffer
/// padded by the client's latency. Output frame `i` is padded frame
/// `latency + i`, so results line up with the input.
pub struct Streaming;

impl Adaptation for Streaming {
    const NAME: &'static str = "streaming";

    fn process<C: AlgorithmClient>(
        client: &mut C,
        inputs: &[ChannelBufferSpec],
        outputs: &[Option<SharedBuffer>],
        frames: usize,
        chans: usize,
        ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        let sample_rate = inputs
            .first()
            .map(ChannelBufferSpec::sample_rate)
            .ok_or_else(|| OfflineError::InvalidConfig("streaming needs an input".into()))?;

        let latency = client.latency();
        let padded = frames + latency;

        let mut input_data = vec![vec![0.0; padded]; inputs.len()];
        let mut output_data = vec![vec![0.0; padded]; outputs.len()];
        // Per output, per channel: the unpadded result
        let mut collected: Vec<Vec<Vec<Sample>>> = vec![vec![vec![0.0; frames]; chans]; outputs.len()];

        for ch in 0..chans {
            if !ctx.iteration_update(ch, chans) {
                break;
            }

            for (spec, data) in inputs.iter().zip(input_data.iter_mut()) {
                let source = spec.buffer.read();
                data[..frames].copy_from_slice(source.span(spec.start_frame, frames, spec.start_chan + ch)?);
                data[frames..].fill(0.0);
            }
            for data in &mut output_data {
                data.fill(0.0);
            }

            client.reset();
            {
                let input_views: Vec<&[Sample]> = input_data.iter().map(Vec::as_slice).collect();
                let mut output_views: Vec<&mut [Sample]> =
                    output_data.iter_mut().map(Vec::as_mut_slice).collect();
                client.process(&input_views, &mut output_views, ctx)?;
            }

            for (channels, data) in collected.iter_mut().zip(&output_data) {
                channels[ch].copy_from_slice(&data[latency..]);
            }
        }

        for (output, channels) in outputs.iter().zip(&collected) {
            let Some(output) = output else {
                continue;
            };
            let mut dest = output.write();
            dest.resize(frames, chans, sample_rate)?;
            for (ch, samples) in channels.iter().enumerate() {
                dest.channel_mut(ch)?.copy_from_slice(samples);
            }
        }

        Ok(())
    }
}
