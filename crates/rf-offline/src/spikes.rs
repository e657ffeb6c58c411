//! Sparse event track to explicit time markers

use rf_core::{BufferAdaptor, Sample};

use crate::error::OfflineResult;

/// Convert a binary spike track into frame positions
///
/// Every sample `> 0` at index `i` becomes the marker
/// `start_frame + i * hop`. `output` is resized to one channel holding
/// the markers in order; no spikes leaves it with zero frames.
pub fn spikes_to_times(
    track: &[Sample],
    output: &mut dyn BufferAdaptor,
    hop: usize,
    start_frame: usize,
    sample_rate: f64,
) -> OfflineResult<()> {
    let markers: Vec<Sample> = track
        .iter()
        .enumerate()
        .filter(|(_, value)| **value > 0.0)
        .map(|(index, _)| (start_frame + index * hop) as Sample)
        .collect();

    output.resize(markers.len(), 1, sample_rate)?;
    if !markers.is_empty() {
        output.channel_mut(0)?.copy_from_slice(&markers);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::MemoryBuffer;

    #[test]
    fn test_markers_are_offset_and_scaled() {
        let mut output = MemoryBuffer::new(1, 1, 44100.0);
        let track = [0.0, 1.0, 0.0, 0.0, 0.5, 0.0];

        spikes_to_times(&track, &mut output, 2, 100, 48000.0).unwrap();

        assert_eq!(output.num_frames(), 2);
        assert_eq!(output.channel(0).unwrap(), &[102.0, 108.0]);
        assert_eq!(output.sample_rate(), 48000.0);
    }

    #[test]
    fn test_no_spikes_gives_empty_output() {
        let mut output = MemoryBuffer::new(8, 2, 44100.0);

        spikes_to_times(&[0.0; 16], &mut output, 1, 0, 44100.0).unwrap();

        assert_eq!(output.num_frames(), 0);
        assert_eq!(output.num_chans(), 1);
    }
}
