//! Control-rate adaptation

use rf_core::{Sample, SharedBuffer};

use super::Adaptation;
use crate::context::ProcessContext;
use crate::error::{OfflineError, OfflineResult};
use crate::processors::AlgorithmClient;
use crate::wrapper::ChannelBufferSpec;

/// Audio in, one feature vector per hop out
///
/// With hop `R = control_rate()`, `F = control_channels_out()` features
/// and latency `L`, each channel yields `(frames + L) / R` vectors. The
/// first is dropped when writing, so the output buffer holds one frame per
/// remaining hop and `chans * F` channels at `sample_rate / R`. Channel
/// `c` occupies output channels `c * F .. (c + 1) * F`.
pub struct StreamingControl;

impl Adaptation for StreamingControl {
    const NAME: &'static str = "control";

    fn process<C: AlgorithmClient>(
        client: &mut C,
        inputs: &[ChannelBufferSpec],
        outputs: &[Option<SharedBuffer>],
        frames: usize,
        chans: usize,
        ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        let [Some(output)] = outputs else {
            return Err(OfflineError::InvalidConfig(
                "control adaptation writes exactly one output buffer".into(),
            ));
        };
        let sample_rate = inputs
            .first()
            .map(ChannelBufferSpec::sample_rate)
            .ok_or_else(|| OfflineError::InvalidConfig("control adaptation needs an input".into()))?;

        let latency = client.latency();
        let rate = client.control_rate().max(1);
        let features = client.control_channels_out();
        let padded = frames + latency;
        let hops = padded / rate;

        if hops < 2 {
            return Err(OfflineError::OutOfRange(format!(
                "{} frames with latency {} give {} hop(s) of {}; need at least 2",
                frames, latency, hops, rate
            )));
        }

        // Per input, per channel, padded
        let mut input_data = vec![vec![vec![0.0; padded]; chans]; inputs.len()];
        for (spec, channels) in inputs.iter().zip(input_data.iter_mut()) {
            let source = spec.buffer.read();
            for (ch, data) in channels.iter_mut().enumerate() {
                data[..frames].copy_from_slice(source.span(spec.start_frame, frames, spec.start_chan + ch)?);
            }
        }

        // Row per (channel, feature), column per hop
        let mut rows = vec![vec![0.0; hops]; chans * features];
        let mut hop_out = vec![[0.0 as Sample; 1]; features];
        let detached = ProcessContext::detached();
        let total = (hops * chans) as f64;

        for ch in 0..chans {
            client.reset();
            for hop in 0..hops {
                let start = hop * rate;
                {
                    let input_views: Vec<&[Sample]> = input_data
                        .iter()
                        .map(|channels| &channels[ch][start..start + rate])
                        .collect();
                    let mut output_views: Vec<&mut [Sample]> =
                        hop_out.iter_mut().map(|value| &mut value[..]).collect();
                    client.process(&input_views, &mut output_views, &detached)?;
                }

                for (feature, value) in hop_out.iter().enumerate() {
                    rows[ch * features + feature][hop] = value[0];
                }

                if !ctx.process_update((hop + 1 + hops * ch) as f64, total) {
                    break;
                }
            }
        }

        let mut dest = output.write();
        dest.resize(hops - 1, chans * features, sample_rate / rate as f64)?;
        for (index, row) in rows.iter().enumerate() {
            dest.channel_mut(index)?.copy_from_slice(&row[1..]);
        }

        Ok(())
    }
}
