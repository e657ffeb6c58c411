//! WAV file I/O for memory buffers

use std::path::Path;

use rf_core::{BufferAdaptor, MemoryBuffer, Sample};

use crate::error::{OfflineError, OfflineResult};

/// Load a WAV file, normalised to ±1.0
pub fn load_wav(path: impl AsRef<Path>) -> OfflineResult<MemoryBuffer> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)
        .map_err(|e| OfflineError::ReadError(format!("{}: {}", path.display(), e)))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    let read_error = |e: hound::Error| OfflineError::ReadError(format!("{}: {}", path.display(), e));

    let interleaved: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f64 / max_val))
                .collect::<Result<_, _>>()
                .map_err(read_error)?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()
            .map_err(read_error)?,
    };

    let mut deinterleaved = vec![Vec::with_capacity(interleaved.len() / channels.max(1)); channels];
    for frame in interleaved.chunks_exact(channels.max(1)) {
        for (channel, &sample) in deinterleaved.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    log::debug!(
        "[wav] loaded {} ({} ch, {} Hz, {} bit)",
        path.display(),
        channels,
        spec.sample_rate,
        spec.bits_per_sample
    );

    Ok(MemoryBuffer::from_channels(deinterleaved, spec.sample_rate as f64))
}

/// Write a buffer as WAV; 16 and 24 bit are integer, 32 bit is float
pub fn save_wav(buffer: &dyn BufferAdaptor, path: impl AsRef<Path>, bit_depth: u16) -> OfflineResult<()> {
    let path = path.as_ref();
    let write_error = |e: hound::Error| OfflineError::WriteError(format!("{}: {}", path.display(), e));

    if !buffer.exists() {
        return Err(OfflineError::WriteError(format!("{}: buffer does not exist", path.display())));
    }
    let channels = buffer.num_chans();
    if channels == 0 || channels > u16::MAX as usize {
        return Err(OfflineError::InvalidConfig(format!("cannot write {} channels", channels)));
    }

    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate: buffer.sample_rate().round() as u32,
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            hound::SampleFormat::Float
        } else {
            hound::SampleFormat::Int
        },
    };
    let scale = match bit_depth {
        16 => 32767.0,
        24 => 8388607.0,
        32 => 1.0,
        _ => {
            return Err(OfflineError::InvalidConfig(format!(
                "Unsupported bit depth: {}",
                bit_depth
            )));
        }
    };

    let data = (0..channels)
        .map(|ch| buffer.channel(ch))
        .collect::<Result<Vec<_>, _>>()?;

    let mut writer = hound::WavWriter::create(path, spec).map_err(write_error)?;
    for frame in 0..buffer.num_frames() {
        for channel in &data {
            let sample = channel[frame];
            match bit_depth {
                32 => writer.write_sample(sample as f32),
                16 => writer.write_sample((sample.clamp(-1.0, 1.0) * scale) as i16),
                _ => writer.write_sample((sample.clamp(-1.0, 1.0) * scale) as i32),
            }
            .map_err(write_error)?;
        }
    }
    writer.finalize().map_err(write_error)?;

    log::debug!("[wav] wrote {} ({} ch, {} bit)", path.display(), channels, bit_depth);
    Ok(())
}
