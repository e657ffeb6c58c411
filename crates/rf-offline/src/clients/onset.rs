//! Spectral onset detection
//!
//! One detection function value is computed per STFT frame from the
//! current and two previous spectra. An onset is reported where the value
//! rises through the threshold, at most once per `minSliceLength` frames.

use num_complex::Complex64;
use rf_core::{ParamDescriptor, ParamDescriptorSet, ParamSet, RfError, RfResult, Sample};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::stft::StftProcessor;
use crate::context::ProcessContext;
use crate::error::{OfflineError, OfflineResult};
use crate::processors::AlgorithmClient;

const EPSILON: f64 = 1e-8;

/// Onset detection function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnsetMetric {
    Energy,
    HighFrequencyContent,
    #[default]
    SpectralFlux,
    /// Modified Kullback-Leibler
    Mkl,
    /// Itakura-Saito
    ItakuraSaito,
    Cosine,
    PhaseDeviation,
    WeightedPhaseDeviation,
    ComplexDomain,
    RectifiedComplexDomain,
}

impl OnsetMetric {
    pub const OPTIONS: [&'static str; 10] = [
        "energy",
        "hfc",
        "spectral_flux",
        "mkl",
        "is",
        "cosine",
        "phase_dev",
        "wphase_dev",
        "complex_dev",
        "rcomplex_dev",
    ];

    const ALL: [Self; 10] = [
        Self::Energy,
        Self::HighFrequencyContent,
        Self::SpectralFlux,
        Self::Mkl,
        Self::ItakuraSaito,
        Self::Cosine,
        Self::PhaseDeviation,
        Self::WeightedPhaseDeviation,
        Self::ComplexDomain,
        Self::RectifiedComplexDomain,
    ];

    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or_default()
    }

    /// Evaluate on three consecutive spectra
    pub fn evaluate(self, cur: &[Complex64], prev: &[Complex64], prev2: &[Complex64]) -> f64 {
        let n = cur.len().max(1) as f64;
        let mag = |c: &Complex64| c.norm();
        let floored = |c: &Complex64| c.norm().max(EPSILON);

        match self {
            Self::Energy => cur.iter().map(|c| c.norm_sqr()).sum::<f64>() / n,
            Self::HighFrequencyContent => {
                cur.iter().enumerate().map(|(k, c)| k as f64 * c.norm_sqr()).sum::<f64>() / n
            }
            Self::SpectralFlux => {
                cur.iter().zip(prev).map(|(c, p)| (mag(c) - mag(p)).max(0.0)).sum::<f64>() / n
            }
            Self::Mkl => {
                cur.iter()
                    .zip(prev)
                    .map(|(c, p)| (floored(c) / floored(p)).max(EPSILON).ln())
                    .sum::<f64>()
                    / n
            }
            Self::ItakuraSaito => {
                cur.iter()
                    .zip(prev)
                    .map(|(c, p)| {
                        let ratio = (floored(c) / floored(p)).powi(2).max(EPSILON);
                        ratio - ratio.ln() - 1.0
                    })
                    .sum::<f64>()
                    / n
            }
            Self::Cosine => {
                let (dot, a, b) = cur.iter().zip(prev).fold((0.0, 0.0, 0.0), |(dot, a, b), (c, p)| {
                    let (x, y) = (floored(c), floored(p));
                    (dot + x * y, a + x * x, b + y * y)
                });
                // Distance, so that change reads as a rise
                1.0 - dot / (a.sqrt() * b.sqrt())
            }
            Self::PhaseDeviation => {
                phase_acceleration(cur, prev, prev2).map(|(_, acc)| acc.abs()).sum::<f64>() / n
            }
            Self::WeightedPhaseDeviation => {
                phase_acceleration(cur, prev, prev2)
                    .map(|(c, acc)| (mag(c) * acc).abs())
                    .sum::<f64>()
                    / n
            }
            Self::ComplexDomain => {
                predicted(cur, prev, prev2).map(|(c, target)| (target - c).norm()).sum::<f64>() / n
            }
            Self::RectifiedComplexDomain => {
                predicted(cur, prev, prev2)
                    .zip(prev)
                    .filter(|((c, _), p)| mag(c) >= mag(*p))
                    .map(|((c, target), _)| (target - c).norm())
                    .sum::<f64>()
                    / n
            }
        }
    }
}

/// Wrap into `(-pi, pi]`
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = (phase + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI { PI } else { wrapped }
}

fn phase_acceleration<'a>(
    cur: &'a [Complex64],
    prev: &'a [Complex64],
    prev2: &'a [Complex64],
) -> impl Iterator<Item = (&'a Complex64, f64)> + 'a {
    cur.iter()
        .zip(prev)
        .zip(prev2)
        .map(|((c, p), pp)| (c, wrap_phase((c.arg() - p.arg()) - (p.arg() - pp.arg()))))
}

/// Each current bin with its steady-state prediction from the previous two
fn predicted<'a>(
    cur: &'a [Complex64],
    prev: &'a [Complex64],
    prev2: &'a [Complex64],
) -> impl Iterator<Item = (Complex64, Complex64)> + 'a {
    cur.iter().zip(prev).zip(prev2).map(|((c, p), pp)| {
        let phase = wrap_phase(p.arg() + (p.arg() - pp.arg()));
        (*c, Complex64::from_polar(p.norm(), phase))
    })
}

/// Rising-edge detector with a refractory period in frames
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    threshold: f64,
    min_slice_length: usize,
    previous: f64,
    since_onset: usize,
}

impl OnsetDetector {
    pub fn new(threshold: f64, min_slice_length: usize) -> Self {
        Self {
            threshold,
            min_slice_length,
            previous: 0.0,
            since_onset: min_slice_length,
        }
    }

    pub fn reset(&mut self) {
        self.previous = 0.0;
        self.since_onset = self.min_slice_length;
    }

    /// Feed one detection value; true on an onset
    pub fn update(&mut self, value: f64) -> bool {
        let rising = value > self.threshold && self.previous <= self.threshold;
        self.previous = value;

        if rising && self.since_onset >= self.min_slice_length {
            self.since_onset = 0;
            true
        } else {
            self.since_onset = self.since_onset.saturating_add(1);
            false
        }
    }
}

/// Onset slicer emitting a one-sample spike per detected onset
pub struct OnsetSliceClient {
    metric: OnsetMetric,
    window_size: usize,
    hop_size: usize,
    detector: OnsetDetector,
    stft: Option<StftProcessor>,
    history: [Vec<Complex64>; 2],
}

impl Default for OnsetSliceClient {
    fn default() -> Self {
        Self {
            metric: OnsetMetric::SpectralFlux,
            window_size: 1024,
            hop_size: 512,
            detector: OnsetDetector::new(0.5, 2),
            stft: None,
            history: [Vec::new(), Vec::new()],
        }
    }
}

impl OnsetSliceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metric(&self) -> OnsetMetric {
        self.metric
    }

    fn clear_history(&mut self, bins: usize) {
        for frame in &mut self.history {
            frame.clear();
            frame.resize(bins, Complex64::default());
        }
    }
}

impl AlgorithmClient for OnsetSliceClient {
    fn descriptors() -> ParamDescriptorSet {
        ParamDescriptorSet::new()
            .with(ParamDescriptor::enumeration("metric", "Metric", 2, &OnsetMetric::OPTIONS))
            .with(ParamDescriptor::float("threshold", "Threshold", 0.5).min(0.0))
            .with(ParamDescriptor::long("minSliceLength", "Minimum Length of Slice", 2).min(0.0))
            .with(ParamDescriptor::long("windowSize", "Window Size", 1024).min(16.0))
            .with(ParamDescriptor::long("hopSize", "Hop Size", -1))
    }

    fn name(&self) -> &'static str {
        "onset-slice"
    }

    fn latency(&self) -> usize {
        self.window_size / 4
    }

    fn set_params(&mut self, params: &ParamSet) -> RfResult<()> {
        self.metric = OnsetMetric::from_index(params.choice("metric")?);
        self.window_size = params.long("windowSize")? as usize;
        let hop = params.long("hopSize")?;
        self.hop_size = if hop <= 0 { self.window_size / 2 } else { hop as usize };
        self.detector = OnsetDetector::new(
            params.float("threshold")?,
            params.long("minSliceLength")? as usize,
        );

        let stft = StftProcessor::new(self.window_size, self.hop_size, 0)
            .map_err(|e| RfError::InvalidParam(e.to_string()))?;
        self.clear_history(stft.bins());
        self.stft = Some(stft);
        Ok(())
    }

    fn reset(&mut self) {
        self.detector.reset();
        let bins = self.stft.as_mut().map(|stft| {
            stft.reset();
            stft.bins()
        });
        if let Some(bins) = bins {
            self.clear_history(bins);
        }
    }

    fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        let Some(stft) = self.stft.as_mut() else {
            return Err(OfflineError::ProcessingFailed("onset slicer used before set_params".into()));
        };
        let (Some(input), Some(output)) = (inputs.first(), outputs.first_mut()) else {
            return Err(OfflineError::ProcessingFailed("onset slicer needs one input and one output".into()));
        };

        output.fill(0.0);
        let total = input.len() as f64;
        let metric = self.metric;
        let detector = &mut self.detector;
        let [prev, prev2] = &mut self.history;

        stft.analyse(input, |n, spectrum| {
            let value = metric.evaluate(spectrum, prev, prev2);
            if detector.update(value) {
                output[n] = 1.0;
            }

            std::mem::swap(prev, prev2);
            prev.copy_from_slice(spectrum);

            ctx.process_update((n + 1) as f64, total)
        })
    }
}
