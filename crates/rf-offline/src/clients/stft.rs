//! Streaming short-time Fourier transform with overlap-add resynthesis

use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::error::{OfflineError, OfflineResult};

/// Periodic Hann window
pub fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

/// Sample-by-sample STFT
///
/// A frame over the most recent `window` samples is analysed every `hop`
/// samples. Frames can be resynthesised into any number of output streams
/// with a windowed overlap-add; output lags input by [`StftProcessor::latency`].
pub struct StftProcessor {
    window_size: usize,
    hop_size: usize,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    window: Vec<f64>,
    /// 1 / (sum(w^2) / hop * window)
    norm: f64,
    history: Vec<f64>,
    write_pos: usize,
    /// Per output stream, indexed by time modulo `window`
    accumulators: Vec<Vec<f64>>,
    time: usize,
    frame: Vec<f64>,
    spectrum: Vec<Complex64>,
    synth: Vec<Vec<Complex64>>,
    fft_scratch: Vec<Complex64>,
    ifft_scratch: Vec<Complex64>,
}

impl StftProcessor {
    /// With resynthesis `outputs`, `hop` must be at most a third of `window`
    pub fn new(window_size: usize, hop_size: usize, outputs: usize) -> OfflineResult<Self> {
        let max_hop = if outputs > 0 { window_size / 3 } else { window_size };
        if window_size < 4 || hop_size == 0 || hop_size > max_hop {
            return Err(OfflineError::InvalidConfig(format!(
                "STFT window {} needs 0 < hop <= {} (got {})",
                window_size, max_hop, hop_size
            )));
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(window_size);
        let inverse = planner.plan_fft_inverse(window_size);
        let bins = window_size / 2 + 1;

        let window = hann(window_size);
        let energy: f64 = window.iter().map(|w| w * w).sum();
        let norm = hop_size as f64 / (energy * window_size as f64);

        Ok(Self {
            window_size,
            hop_size,
            fft_scratch: vec![Complex64::default(); forward.get_scratch_len()],
            ifft_scratch: vec![Complex64::default(); inverse.get_scratch_len()],
            forward,
            inverse,
            window,
            norm,
            history: vec![0.0; window_size],
            write_pos: 0,
            accumulators: vec![vec![0.0; window_size]; outputs],
            time: 0,
            frame: vec![0.0; window_size],
            spectrum: vec![Complex64::default(); bins],
            synth: vec![vec![Complex64::default(); bins]; outputs],
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn bins(&self) -> usize {
        self.window_size / 2 + 1
    }

    /// Delay between input and resynthesised output
    pub fn latency(&self) -> usize {
        self.window_size - 1
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.write_pos = 0;
        self.time = 0;
        for acc in &mut self.accumulators {
            acc.fill(0.0);
        }
    }

    /// Push one sample; returns true when a new frame is due
    fn push(&mut self, sample: f64) -> bool {
        self.history[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.window_size;
        self.time += 1;
        self.time % self.hop_size == 0
    }

    fn analyse_frame(&mut self) -> OfflineResult<()> {
        // write_pos now points at the oldest sample
        for (i, (slot, w)) in self.frame.iter_mut().zip(&self.window).enumerate() {
            *slot = self.history[(self.write_pos + i) % self.window_size] * w;
        }
        self.forward
            .process_with_scratch(&mut self.frame, &mut self.spectrum, &mut self.fft_scratch)
            .map_err(|e| OfflineError::ProcessingFailed(format!("forward FFT: {}", e)))
    }

    /// Run analysis only
    ///
    /// `on_frame` gets the index of the input sample that completed the
    /// frame and the spectrum; returning `false` stops early.
    pub fn analyse<F>(&mut self, input: &[f64], mut on_frame: F) -> OfflineResult<()>
    where
        F: FnMut(usize, &[Complex64]) -> bool,
    {
        for (n, &sample) in input.iter().enumerate() {
            if self.push(sample) {
                self.analyse_frame()?;
                if !on_frame(n, &self.spectrum) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Analyse, transform each frame with `on_frame` and resynthesise
    ///
    /// `on_frame` receives the analysis spectrum and one spectrum per
    /// output stream to fill.
    pub fn process<F>(&mut self, input: &[f64], outputs: &mut [&mut [f64]], mut on_frame: F) -> OfflineResult<()>
    where
        F: FnMut(&[Complex64], &mut [Vec<Complex64>]),
    {
        let streams = self.accumulators.len().min(outputs.len());

        for (n, &sample) in input.iter().enumerate() {
            if self.push(sample) {
                self.analyse_frame()?;
                on_frame(&self.spectrum, &mut self.synth);

                for (spectrum, acc) in self.synth.iter_mut().zip(self.accumulators.iter_mut()) {
                    if let Some(dc) = spectrum.first_mut() {
                        dc.im = 0.0;
                    }
                    if let Some(nyquist) = spectrum.last_mut() {
                        if self.window_size % 2 == 0 {
                            nyquist.im = 0.0;
                        }
                    }
                    self.inverse
                        .process_with_scratch(spectrum, &mut self.frame, &mut self.ifft_scratch)
                        .map_err(|e| OfflineError::ProcessingFailed(format!("inverse FFT: {}", e)))?;

                    // Frame covers the last `window` samples; slot of the oldest is `time % window`
                    let start = self.time % self.window_size;
                    for (i, (s, w)) in self.frame.iter().zip(&self.window).enumerate() {
                        acc[(start + i) % self.window_size] += s * w * self.norm;
                    }
                }
            }

            // Oldest slot is complete: every frame covering it has been added
            let slot = self.time % self.window_size;
            for (acc, out) in self.accumulators.iter_mut().zip(outputs.iter_mut()).take(streams) {
                out[n] = acc[slot];
                acc[slot] = 0.0;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(StftProcessor::new(2, 1, 1).is_err());
        assert!(StftProcessor::new(64, 32, 1).is_err());
        assert!(StftProcessor::new(64, 0, 1).is_err());
        assert!(StftProcessor::new(64, 32, 0).is_ok());
    }

    #[test]
    fn test_identity_resynthesis_is_delayed_input() {
        let mut stft = StftProcessor::new(64, 16, 1).unwrap();
        let latency = stft.latency();
        let input: Vec<f64> = (0..512).map(|i| (i as f64 * 0.07).sin()).collect();
        let mut output = vec![0.0; input.len()];

        stft.process(&input, &mut [&mut output[..]], |spectrum, out| {
            out[0].copy_from_slice(spectrum);
        })
        .unwrap();

        for n in latency..input.len() {
            assert_abs_diff_eq!(output[n], input[n - latency], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_analysis_frame_count() {
        let mut stft = StftProcessor::new(32, 8, 0).unwrap();
        let mut ends = Vec::new();

        stft.analyse(&[0.0; 100], |n, spectrum| {
            assert_eq!(spectrum.len(), 17);
            ends.push(n);
            true
        })
        .unwrap();

        assert_eq!(ends.len(), 12);
        assert_eq!(ends[0], 7);
    }
}
