//! Block statistics as a control-rate feature
//!
//! Per hop: mean, standard deviation, skewness, kurtosis and the low,
//! middle and high percentiles of the block, then the same seven values
//! for each requested derivative.

use rf_core::{ParamDescriptor, ParamDescriptorSet, ParamSet, RfResult, Sample};

use crate::context::ProcessContext;
use crate::error::{OfflineError, OfflineResult};
use crate::processors::AlgorithmClient;

/// Features per signal (the block or one of its derivatives)
pub const STATS_PER_SIGNAL: usize = 7;

/// Moments and percentiles of one block
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlockStats {
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub low: f64,
    pub middle: f64,
    pub high: f64,
}

impl BlockStats {
    /// Percentiles in `0..=100`
    pub fn compute(block: &[f64], low: f64, middle: f64, high: f64) -> Self {
        if block.is_empty() {
            return Self::default();
        }

        let n = block.len() as f64;
        let mean = block.iter().sum::<f64>() / n;
        let central = |power: i32| block.iter().map(|x| (x - mean).powi(power)).sum::<f64>() / n;
        let variance = central(2);
        let std_dev = variance.sqrt();
        let scale = if std_dev > 0.0 { std_dev } else { 1.0 };

        let mut sorted = block.to_vec();
        sorted.sort_unstable_by(f64::total_cmp);
        let percentile = |p: f64| {
            let index = (p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64).round_ties_even();
            sorted[index as usize]
        };

        Self {
            mean,
            std_dev,
            skewness: central(3) / scale.powi(3),
            kurtosis: central(4) / scale.powi(4),
            low: percentile(low),
            middle: percentile(middle),
            high: percentile(high),
        }
    }

    pub fn to_array(self) -> [f64; STATS_PER_SIGNAL] {
        [
            self.mean,
            self.std_dev,
            self.skewness,
            self.kurtosis,
            self.low,
            self.middle,
            self.high,
        ]
    }
}

/// First difference
fn derivative(signal: &[f64]) -> Vec<f64> {
    signal.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

/// Control-rate statistics client
#[derive(Debug, Clone)]
pub struct StatsClient {
    num_derivs: usize,
    low: f64,
    middle: f64,
    high: f64,
    hop_size: usize,
}

impl Default for StatsClient {
    fn default() -> Self {
        Self {
            num_derivs: 0,
            low: 0.0,
            middle: 50.0,
            high: 100.0,
            hop_size: 512,
        }
    }
}

impl StatsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_derivs(&self) -> usize {
        self.num_derivs
    }

    pub fn feature_names(&self) -> Vec<String> {
        feature_names(self.num_derivs)
    }
}

/// Names of the features in output channel order
pub fn feature_names(num_derivs: usize) -> Vec<String> {
    const NAMES: [&str; STATS_PER_SIGNAL] = ["mean", "stddev", "skewness", "kurtosis", "low", "middle", "high"];
    (0..=num_derivs)
        .flat_map(|d| {
            NAMES.iter().map(move |name| match d {
                0 => name.to_string(),
                _ => format!("d{}_{}", d, name),
            })
        })
        .collect()
}

impl AlgorithmClient for StatsClient {
    fn descriptors() -> ParamDescriptorSet {
        ParamDescriptorSet::new()
            .with(ParamDescriptor::long("numDerivs", "Number of Derivatives", 0).min(0.0).max(2.0))
            .with(ParamDescriptor::float("low", "Low Percentile", 0.0).min(0.0).max(100.0))
            .with(ParamDescriptor::float("middle", "Middle Percentile", 50.0).min(0.0).max(100.0))
            .with(ParamDescriptor::float("high", "High Percentile", 100.0).min(0.0).max(100.0))
            .with(ParamDescriptor::long("hopSize", "Hop Size", 512).min(4.0))
    }

    fn name(&self) -> &'static str {
        "stats"
    }

    fn audio_channels_out(&self) -> usize {
        0
    }

    fn control_channels_out(&self) -> usize {
        STATS_PER_SIGNAL * (self.num_derivs + 1)
    }

    fn control_rate(&self) -> usize {
        self.hop_size
    }

    fn set_params(&mut self, params: &ParamSet) -> RfResult<()> {
        self.num_derivs = params.long("numDerivs")? as usize;
        self.low = params.float("low")?;
        self.middle = params.float("middle")?;
        self.high = params.float("high")?;
        self.hop_size = params.long("hopSize")? as usize;
        Ok(())
    }

    fn reset(&mut self) {}

    fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        _ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        let Some(block) = inputs.first() else {
            return Err(OfflineError::ProcessingFailed("stats needs an input block".into()));
        };
        if outputs.len() < self.control_channels_out() {
            return Err(OfflineError::ProcessingFailed(format!(
                "stats needs {} outputs, got {}",
                self.control_channels_out(),
                outputs.len()
            )));
        }

        let mut signal = block.to_vec();
        for d in 0..=self.num_derivs {
            if d > 0 {
                signal = derivative(&signal);
            }
            let stats = BlockStats::compute(&signal, self.low, self.middle, self.high).to_array();
            for (out, value) in outputs[d * STATS_PER_SIGNAL..].iter_mut().zip(stats) {
                if let Some(slot) = out.first_mut() {
                    *slot = value;
                }
            }
        }
        Ok(())
    }
}
