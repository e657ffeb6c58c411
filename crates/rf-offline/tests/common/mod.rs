//! Mock algorithm clients for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rf_core::{MemoryBuffer, ParamDescriptor, ParamDescriptorSet, ParamSet, RfResult, Sample, SharedBuffer};
use rf_offline::adaptation::{Slicing, Streaming, StreamingControl};
use rf_offline::{AlgorithmClient, BatchClient, BufferLayout, NrtClient, OfflineResult, ProcessContext, ProcessResult};

pub const SAMPLE_RATE: f64 = 44100.0;

/// Channel `c`, frame `i` holds `c * 1000 + i`
pub fn ramp(frames: usize, chans: usize) -> SharedBuffer {
    let channels = (0..chans)
        .map(|ch| (0..frames).map(|i| (ch * 1000 + i) as Sample).collect())
        .collect();
    MemoryBuffer::from_channels(channels, SAMPLE_RATE).into_shared()
}

pub fn mono(samples: Vec<Sample>) -> SharedBuffer {
    MemoryBuffer::from_channels(vec![samples], SAMPLE_RATE).into_shared()
}

/// Placeholder output, resized by the job
pub fn placeholder() -> SharedBuffer {
    SharedBuffer::memory(1, 1, SAMPLE_RATE)
}

pub fn params_for<N: NrtClient>(client: &N) -> ParamSet {
    ParamSet::new(Arc::new(client.descriptors()))
}

/// Run a batch client directly on the calling thread, without a job
pub fn run<N: NrtClient>(client: &mut N, params: &ParamSet) -> ProcessResult {
    client.process(params, &ProcessContext::detached())
}

pub fn channel(buffer: &SharedBuffer, ch: usize) -> Vec<Sample> {
    buffer.read().channel(ch).map(<[Sample]>::to_vec).unwrap_or_default()
}

fn copy_through(inputs: &[&[Sample]], outputs: &mut [&mut [Sample]]) {
    if let (Some(input), Some(output)) = (inputs.first(), outputs.first_mut()) {
        output.copy_from_slice(input);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STREAMING
// ═══════════════════════════════════════════════════════════════════════════════

/// Delay line reporting its delay as latency
///
/// Every output sample is offset by the number of blocks processed since
/// the last reset, which exposes a missing reset between channels.
#[derive(Debug, Default)]
pub struct DelayClient {
    delay: usize,
    gain: f64,
    blocks: usize,
}

impl DelayClient {
    pub fn batch() -> BatchClient<Self, Streaming> {
        BatchClient::new(BufferLayout::new().input("source").output("dest").output("spare"), Self::default())
    }
}

impl AlgorithmClient for DelayClient {
    fn descriptors() -> ParamDescriptorSet {
        ParamDescriptorSet::new()
            .with(ParamDescriptor::long("delay", "Delay", 0).min(0.0))
            .with(ParamDescriptor::float("gain", "Gain", 1.0))
    }

    fn name(&self) -> &'static str {
        "delay"
    }

    fn latency(&self) -> usize {
        self.delay
    }

    fn set_params(&mut self, params: &ParamSet) -> RfResult<()> {
        self.delay = params.long("delay")? as usize;
        self.gain = params.float("gain")?;
        Ok(())
    }

    fn reset(&mut self) {
        self.blocks = 0;
    }

    fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        _ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        let input = inputs[0];
        let offset = self.blocks as Sample;
        for output in outputs.iter_mut() {
            for (i, out) in output.iter_mut().enumerate() {
                let delayed = i.checked_sub(self.delay).map_or(0.0, |j| input[j]);
                *out = delayed * self.gain + offset;
            }
        }
        self.blocks += 1;
        Ok(())
    }
}

/// Copies its input after `steps` cancellable 1 ms waits
#[derive(Debug, Default)]
pub struct SlowClient {
    steps: usize,
}

impl SlowClient {
    pub fn batch() -> BatchClient<Self, Streaming> {
        BatchClient::new(BufferLayout::new().input("source").output("dest"), Self::default())
    }
}

impl AlgorithmClient for SlowClient {
    fn descriptors() -> ParamDescriptorSet {
        ParamDescriptorSet::new().with(ParamDescriptor::long("steps", "Steps", 100).min(0.0))
    }

    fn name(&self) -> &'static str {
        "slow"
    }

    fn set_params(&mut self, params: &ParamSet) -> RfResult<()> {
        self.steps = params.long("steps")? as usize;
        Ok(())
    }

    fn reset(&mut self) {}

    fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        for step in 0..self.steps {
            if !ctx.process_update((step + 1) as f64, self.steps as f64) {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        copy_through(inputs, outputs);
        Ok(())
    }
}

/// Copies its input, or panics when `explode` is non-zero
#[derive(Debug, Default)]
pub struct PanicClient {
    explode: bool,
}

impl PanicClient {
    pub fn batch() -> BatchClient<Self, Streaming> {
        BatchClient::new(BufferLayout::new().input("source").output("dest"), Self::default())
    }
}

impl AlgorithmClient for PanicClient {
    fn descriptors() -> ParamDescriptorSet {
        ParamDescriptorSet::new().with(ParamDescriptor::long("explode", "Explode", 0))
    }

    fn name(&self) -> &'static str {
        "panic"
    }

    fn set_params(&mut self, params: &ParamSet) -> RfResult<()> {
        self.explode = params.long("explode")? != 0;
        Ok(())
    }

    fn reset(&mut self) {}

    fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        _ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        if self.explode {
            panic!("client exploded");
        }
        copy_through(inputs, outputs);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROL RATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Per hop: mean and absolute peak of the block
///
/// Counts resets and hop calls across a whole run.
#[derive(Debug, Default)]
pub struct HopMeanClient {
    hop: usize,
    latency: usize,
    pub resets: usize,
    pub calls: usize,
}

impl HopMeanClient {
    pub fn batch() -> BatchClient<Self, StreamingControl> {
        BatchClient::new(BufferLayout::new().input("source").output("features"), Self::default())
    }
}

impl AlgorithmClient for HopMeanClient {
    fn descriptors() -> ParamDescriptorSet {
        ParamDescriptorSet::new()
            .with(ParamDescriptor::long("hop", "Hop", 16).min(1.0))
            .with(ParamDescriptor::long("latency", "Latency", 0).min(0.0))
    }

    fn name(&self) -> &'static str {
        "hop-mean"
    }

    fn control_channels_out(&self) -> usize {
        2
    }

    fn control_rate(&self) -> usize {
        self.hop
    }

    fn latency(&self) -> usize {
        self.latency
    }

    fn set_params(&mut self, params: &ParamSet) -> RfResult<()> {
        self.hop = params.long("hop")? as usize;
        self.latency = params.long("latency")? as usize;
        Ok(())
    }

    fn reset(&mut self) {
        self.resets += 1;
    }

    fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        _ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        self.calls += 1;
        let block = inputs[0];
        outputs[0][0] = block.iter().sum::<Sample>() / block.len() as Sample;
        outputs[1][0] = block.iter().fold(0.0, |peak: Sample, x| peak.max(x.abs()));
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SLICING
// ═══════════════════════════════════════════════════════════════════════════════

/// Rising threshold crossings, emitted `delay` samples late
///
/// Reports `latency` independently of its real delay so padding behaviour
/// can be exercised.
#[derive(Debug, Default)]
pub struct SpikeClient {
    threshold: f64,
    delay: usize,
    latency: usize,
}

impl SpikeClient {
    pub fn batch() -> BatchClient<Self, Slicing> {
        BatchClient::new(BufferLayout::new().input("source").output("markers"), Self::default())
    }
}

impl AlgorithmClient for SpikeClient {
    fn descriptors() -> ParamDescriptorSet {
        ParamDescriptorSet::new()
            .with(ParamDescriptor::float("threshold", "Threshold", 0.5))
            .with(ParamDescriptor::long("delay", "Delay", 0).min(0.0))
            .with(ParamDescriptor::long("latency", "Latency", 0).min(0.0))
    }

    fn name(&self) -> &'static str {
        "spike"
    }

    fn latency(&self) -> usize {
        self.latency
    }

    fn set_params(&mut self, params: &ParamSet) -> RfResult<()> {
        self.threshold = params.float("threshold")?;
        self.delay = params.long("delay")? as usize;
        self.latency = params.long("latency")? as usize;
        Ok(())
    }

    fn reset(&mut self) {}

    fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        _ctx: &ProcessContext,
    ) -> OfflineResult<()> {
        let input = inputs[0];
        let output = &mut outputs[0];
        output.fill(0.0);

        for i in 0..input.len() {
            let rising = input[i] > self.threshold && (i == 0 || input[i - 1] <= self.threshold);
            if rising && i + self.delay < output.len() {
                output[i + self.delay] = 1.0;
            }
        }
        Ok(())
    }
}
