//! Harmonic-percussive source separation by median filtering
//!
//! Harmonic energy is smooth along time, percussive energy is smooth
//! along frequency. Each STFT frame is split with masks derived from a
//! median across time (harmonic) and a median across frequency
//! (percussive), evaluated at the centre of a window of `harmFilterSize`
//! frames.

use num_complex::Complex64;
use rf_core::{ParamDescriptor, ParamDescriptorSet, ParamSet, RfError, RfResult, Sample};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::stft::StftProcessor;
use crate::context::ProcessContext;
use crate::error::{OfflineError, OfflineResult};
use crate::processors::AlgorithmClient;

const EPSILON: f64 = 1e-10;

/// How separation masks are built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskingMode {
    /// Soft masks `H / (H + P)` and `P / (H + P)`
    #[default]
    Classic,
    /// Binary harmonic mask against a threshold curve; percussive is the rest
    Coupled,
    /// Independent harmonic and percussive thresholds; the rest is residual
    Advanced,
}

impl MaskingMode {
    pub const OPTIONS: [&'static str; 3] = ["classic", "coupled", "advanced"];

    pub fn from_index(index: usize) -> Self {
        match index {
            1 => Self::Coupled,
            2 => Self::Advanced,
            _ => Self::Classic,
        }
    }
}

/// Threshold curve: `amp1` dB below `freq1`, `amp2` dB above `freq2`,
/// linear in dB between. Frequencies are fractions of the spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KneeThreshold {
    pub freq1: f64,
    pub amp1: f64,
    pub freq2: f64,
    pub amp2: f64,
}

impl KneeThreshold {
    /// Linear threshold per bin
    pub fn curve(&self, bins: usize) -> Vec<f64> {
        let (lo, hi) = if self.freq1 <= self.freq2 {
            (self.freq1, self.freq2)
        } else {
            (self.freq2, self.freq1)
        };
        let knee_start = ((lo.clamp(0.0, 1.0) * bins as f64).floor() as usize).min(bins);
        let knee_end = ((hi.clamp(0.0, 1.0) * bins as f64).floor() as usize).min(bins);
        let knee_len = knee_end - knee_start;
        let gain = |db: f64| 10f64.powf(db / 20.0);

        (0..bins)
            .map(|bin| {
                if bin < knee_start {
                    gain(self.amp1)
                } else if bin < knee_end {
                    let pos = bin - knee_start;
                    let t = if knee_len > 1 {
                        pos as f64 / (knee_len - 1) as f64
                    } else {
                        1.0
                    };
                    gain(self.amp1 + t * (self.amp2 - self.amp1))
                } else {
                    gain(self.amp2)
                }
            })
            .collect()
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    *m
}

/// Frame history and mask computation
struct MedianSeparator {
    harm_size: usize,
    perc_size: usize,
    mode: MaskingMode,
    harm_curve: Vec<f64>,
    perc_curve: Vec<f64>,
    spectra: VecDeque<Vec<Complex64>>,
    magnitudes: VecDeque<Vec<f64>>,
    scratch: Vec<f64>,
}

impl MedianSeparator {
    fn new(bins: usize, harm_size: usize, perc_size: usize, mode: MaskingMode, harm: KneeThreshold, perc: KneeThreshold) -> Self {
        let mut separator = Self {
            harm_size,
            perc_size,
            mode,
            harm_curve: harm.curve(bins),
            perc_curve: perc.curve(bins),
            spectra: VecDeque::with_capacity(harm_size + 1),
            magnitudes: VecDeque::with_capacity(harm_size + 1),
            scratch: Vec::with_capacity(harm_size.max(perc_size)),
        };
        separator.reset(bins);
        separator
    }

    fn reset(&mut self, bins: usize) {
        self.spectra.clear();
        self.magnitudes.clear();
        for _ in 0..self.harm_size {
            self.spectra.push_back(vec![Complex64::default(); bins]);
            self.magnitudes.push_back(vec![0.0; bins]);
        }
    }

    fn process_frame(&mut self, spectrum: &[Complex64], out: &mut [Vec<Complex64>]) {
        // Recycle the oldest frame's storage
        let mut frame = self.spectra.pop_front().unwrap_or_default();
        let mut mags = self.magnitudes.pop_front().unwrap_or_default();
        frame.clear();
        frame.extend_from_slice(spectrum);
        mags.clear();
        mags.extend(spectrum.iter().map(|c| c.norm()));
        self.spectra.push_back(frame);
        self.magnitudes.push_back(mags);

        let centre = self.harm_size / 2;
        let bins = spectrum.len();
        let half_perc = self.perc_size / 2;

        for bin in 0..bins {
            self.scratch.clear();
            self.scratch.extend(self.magnitudes.iter().map(|m| m[bin]));
            let harmonic = median(&mut self.scratch);

            self.scratch.clear();
            let centre_mags = &self.magnitudes[centre];
            self.scratch.extend((0..self.perc_size).map(|k| {
                (bin + k)
                    .checked_sub(half_perc)
                    .and_then(|b| centre_mags.get(b))
                    .copied()
                    .unwrap_or(0.0)
            }));
            let percussive = median(&mut self.scratch);

            let (h_mask, p_mask, r_mask) = self.masks(bin, harmonic, percussive);
            let value = self.spectra[centre][bin];
            if let Some(o) = out.get_mut(0) {
                o[bin] = value * h_mask;
            }
            if let Some(o) = out.get_mut(1) {
                o[bin] = value * p_mask;
            }
            if let Some(o) = out.get_mut(2) {
                o[bin] = value * r_mask;
            }
        }
    }

    fn masks(&self, bin: usize, harmonic: f64, percussive: f64) -> (f64, f64, f64) {
        match self.mode {
            MaskingMode::Classic => {
                let total = harmonic + percussive;
                if total <= EPSILON {
                    (0.5, 0.5, 0.0)
                } else {
                    (harmonic / total, percussive / total, 0.0)
                }
            }
            MaskingMode::Coupled => {
                let h = if harmonic > self.harm_curve[bin] * percussive { 1.0 } else { 0.0 };
                (h, 1.0 - h, 0.0)
            }
            MaskingMode::Advanced => {
                let h: f64 = if harmonic > self.harm_curve[bin] * percussive { 1.0 } else { 0.0 };
                let p: f64 = if percussive > self.perc_curve[bin] * harmonic { 1.0 } else { 0.0 };
                let r = (1.0 - h) * (1.0 - p);
                let total = h + p + r;
                (h / total, p / total, r / total)
            }
        }
    }
}

/// Streaming HPSS: one input, harmonic / percussive / residual outputs
pub struct HpssClient {
    window_size: usize,
    hop_size: usize,
    harm_size: usize,
    perc_size: usize,
    mode: MaskingMode,
    harm_threshold: KneeThreshold,
    perc_threshold: KneeThreshold,
    stft: Option<StftProcessor>,
    separator: Option<MedianSeparator>,
}

impl Default for HpssClient {
    fn default() -> Self {
        Self {
            window_size: 1024,
            hop_size: 256,
            harm_size: 17,
            perc_size: 31,
            mode: MaskingMode::Classic,
            harm_threshold: KneeThreshold { freq1: 0.1, amp1: 0.0, freq2: 0.5, amp2: 0.0 },
            perc_threshold: KneeThreshold { freq1: 0.1, amp1: 0.0, freq2: 0.5, amp2: 0.0 },
            stft: None,
            separator: None,
        }
    }
}

impl HpssClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> MaskingMode {
        self.mode
    }

    fn rebuild(&mut self) -> OfflineResult<()> {
        let stft = StftProcessor::new(self.window_size, self.hop_size, 3)?;
        self.separator = Some(MedianSeparator::new(
            stft.bins(),
            self.harm_size,
            self.perc_size,
            self.mode,
            self.harm_threshold,
            self.perc_threshold,
        ));
        self.stft = Some(stft);
        Ok(())
    }
}

fn odd(size: i64) -> usize {
    let size = size.max(3) as usize;
    if size % 2 == 0 { size + 1 } else { size }
}

impl AlgorithmClient for HpssClient {
    fn descriptors() -> ParamDescriptorSet {
        let threshold = |name: &str, display: &str, default: f64, is_freq: bool| {
            let d = ParamDescriptor::float(name.to_string(), display.to_string(), default);
            if is_freq { d.min(0.0).max(1.0) } else { d }
        };

        ParamDescriptorSet::new()
            .with(ParamDescriptor::long("harmFilterSize", "Harmonic Filter Size", 17).min(3.0).max(101.0))
            .with(ParamDescriptor::long("percFilterSize", "Percussive Filter Size", 31).min(3.0).max(101.0))
            .with(ParamDescriptor::enumeration("maskingMode", "Masking Mode", 0, &MaskingMode::OPTIONS))
            .with(threshold("harmThreshFreq1", "Harmonic Threshold Low Frequency", 0.1, true))
            .with(threshold("harmThreshAmp1", "Harmonic Threshold Low Amplitude", 0.0, false))
            .with(threshold("harmThreshFreq2", "Harmonic Threshold High Frequency", 0.5, true))
            .with(threshold("harmThreshAmp2", "Harmonic Threshold High Amplitude", 0.0, false))
            .with(threshold("percThreshFreq1", "Percussive Threshold Low Frequency", 0.1, true))
            .with(threshold("percThreshAmp1", "Percussive Threshold Low Amplitude", 0.0, false))
            .with(threshold("percThreshFreq2", "Percussive Threshold High Frequency", 0.5, true))
            .with(threshold("percThreshAmp2", "Percussive Threshold High Amplitude", 0.0, false))
            .with(ParamDescriptor::long("windowSize", "Window Size", 1024).min(16.0))
            .with(ParamDescriptor::long("hopSize", "Hop Size", -1))
    }

    fn name(&self) -> &'static str {
        "hpss"
    }

    fn audio_channels_out(&self) -> usize {
        3
    }

    fn latency(&self) -> usize {
        self.window_size - 1 + (self.harm_size / 2) * self.hop_size
    }

    fn set_params(&mut self, params: &ParamSet) -> RfResult<()> {
        self.harm_size = odd(params.long("harmFilterSize")?);
        self.perc_size = odd(params.long("percFilterSize")?);
        self.mode = MaskingMode::from_index(params.choice("maskingMode")?);
        self.harm_threshold = KneeThreshold {
            freq1: params.float("harmThreshFreq1")?,
            amp1: params.float("harmThreshAmp1")?,
            freq2: params.float("harmThreshFreq2")?,
            amp2: params.float("harmThreshAmp2")?,
        };
        self.perc_threshold = KneeThreshold {
            freq1: params.float("percThreshFreq1")?,
            amp1: params.float("percThreshAmp1")?,
            freq2: params.float("percThreshFreq2")?,
            amp2: params.float("percThreshAmp2")?,
        };

        self.window_size = params.long("windowSize")? as usize;
        let hop = params.long("hopSize")?;
        self.hop_size = if hop <= 0 { self.window_size / 4 } else { hop as usize };

        self.rebuild().map_err(|e| RfError::InvalidParam(e.to_string()))
    }

    fn reset(&mut self) {
        if let (Some(stft), Some(separator)) = (self.stft.as_mut(), self.separator.as_mut()) {
            stft.reset();
            separator.reset(stft.bins());
        }
    }

    fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        _ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        let (Some(stft), Some(separator)) = (self.stft.as_mut(), self.separator.as_mut()) else {
            return Err(OfflineError::ProcessingFailed("hpss used before set_params".into()));
        };
        let input = inputs
            .first()
            .ok_or_else(|| OfflineError::ProcessingFailed("hpss needs one input".into()))?;

        stft.process(input, outputs, |spectrum, out| separator.process_frame(spectrum, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_knee_curve() {
        let knee = KneeThreshold { freq1: 0.25, amp1: 0.0, freq2: 0.75, amp2: 20.0 };
        let curve = knee.curve(8);

        assert_relative_eq!(curve[0], 1.0);
        assert_relative_eq!(curve[1], 1.0);
        assert_relative_eq!(curve[2], 1.0);
        assert_relative_eq!(curve[5], 10.0);
        assert_relative_eq!(curve[7], 10.0);
        assert!(curve[3] > 1.0 && curve[3] < 10.0);
    }

    #[test]
    fn test_masks_partition() {
        let flat = KneeThreshold { freq1: 0.0, amp1: 0.0, freq2: 1.0, amp2: 0.0 };

        for mode in [MaskingMode::Classic, MaskingMode::Coupled, MaskingMode::Advanced] {
            let separator = MedianSeparator::new(4, 3, 3, mode, flat, flat);
            for (h, p) in [(1.0, 0.0), (0.0, 1.0), (2.0, 1.0), (0.0, 0.0), (1.0, 1.0)] {
                let (hm, pm, rm) = separator.masks(0, h, p);
                assert_relative_eq!(hm + pm + rm, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut []), 0.0);
    }

    #[test]
    fn test_even_filter_sizes_become_odd() {
        assert_eq!(odd(16), 17);
        assert_eq!(odd(17), 17);
        assert_eq!(odd(1), 3);
    }
}
