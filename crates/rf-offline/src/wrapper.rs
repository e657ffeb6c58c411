//! Whole-buffer job adaptor
//!
//! [`BatchClient`] wraps a streaming [`AlgorithmClient`] so it can be run
//! over complete host buffers: it validates the input ranges, drops
//! output buffers that no longer exist, works out the frame and channel
//! counts shared by all inputs and hands the sample loop to an
//! [`Adaptation`] strategy.

use std::marker::PhantomData;

use rf_core::{ParamDescriptor, ParamDescriptorSet, ParamSet, SharedBuffer};

use crate::adaptation::Adaptation;
use crate::context::ProcessContext;
use crate::error::{OfflineError, OfflineResult};
use crate::processors::AlgorithmClient;
use crate::result::ProcessResult;

// ═══════════════════════════════════════════════════════════════════════════════
// BUFFER LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Names of the input and output buffers a batch client exposes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferLayout {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

/// Range parameter names for one input buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeParamNames {
    pub start_frame: String,
    pub num_frames: String,
    pub start_chan: String,
    pub num_chans: String,
}

impl BufferLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input buffer
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    /// Add an output buffer
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Range parameter names of input `index`
    ///
    /// The first input uses bare names (`startFrame`); later inputs are
    /// prefixed with their buffer name (`sidechainStartFrame`).
    pub fn range_names(&self, index: usize) -> Option<RangeParamNames> {
        let name = self.inputs.get(index)?;
        let field = |suffix: &str| {
            if index == 0 {
                let mut chars = suffix.chars();
                chars
                    .next()
                    .map(|first| first.to_ascii_lowercase().to_string() + chars.as_str())
                    .unwrap_or_default()
            } else {
                format!("{name}{suffix}")
            }
        };

        Some(RangeParamNames {
            start_frame: field("StartFrame"),
            num_frames: field("NumFrames"),
            start_chan: field("StartChan"),
            num_chans: field("NumChans"),
        })
    }

    /// Buffer and range parameters, inputs first
    pub fn descriptors(&self) -> ParamDescriptorSet {
        let mut set = ParamDescriptorSet::new();

        for (index, name) in self.inputs.iter().enumerate() {
            let Some(names) = self.range_names(index) else {
                continue;
            };
            set = set
                .with(ParamDescriptor::input_buffer(name.as_str(), format!("{name} Buffer")))
                .with(ParamDescriptor::long(names.start_frame, "Source Offset", 0).min(0.0))
                .with(ParamDescriptor::long(names.num_frames, "Number of Frames", -1))
                .with(ParamDescriptor::long(names.start_chan, "Start Channel", 0).min(0.0))
                .with(ParamDescriptor::long(names.num_chans, "Number of Channels", -1));
        }

        for name in &self.outputs {
            set = set.with(ParamDescriptor::buffer(name.as_str(), format!("{name} Buffer")));
        }

        set
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INPUT RANGES
// ═══════════════════════════════════════════════════════════════════════════════

/// Validated region of one input buffer
#[derive(Debug, Clone)]
pub struct ChannelBufferSpec {
    pub buffer: SharedBuffer,
    pub start_frame: usize,
    pub num_frames: usize,
    pub start_chan: usize,
    pub num_chans: usize,
}

impl ChannelBufferSpec {
    /// Check a requested region against the buffer's real extent
    ///
    /// Negative counts mean "to the end of the buffer".
    pub fn validate(
        name: &str,
        buffer: Option<SharedBuffer>,
        start_frame: i64,
        num_frames: i64,
        start_chan: i64,
        num_chans: i64,
    ) -> OfflineResult<Self> {
        let out_of_range = |message: String| OfflineError::OutOfRange(format!("{name}: {message}"));

        let buffer = buffer.ok_or_else(|| out_of_range("input buffer not set".into()))?;
        let (frames, chans) = {
            let access = buffer.read();
            if !access.exists() {
                return Err(out_of_range("input buffer not found".into()));
            }
            (access.num_frames() as i64, access.num_chans() as i64)
        };

        if frames == 0 || chans == 0 {
            return Err(out_of_range("input buffer is empty".into()));
        }
        if start_frame < 0 || start_frame >= frames {
            return Err(out_of_range(format!(
                "start frame {start_frame} outside buffer of {frames} frames"
            )));
        }
        if start_chan < 0 || start_chan >= chans {
            return Err(out_of_range(format!(
                "start channel {start_chan} outside buffer of {chans} channels"
            )));
        }

        let num_frames = if num_frames < 0 { frames - start_frame } else { num_frames };
        let num_chans = if num_chans < 0 { chans - start_chan } else { num_chans };

        if num_frames <= 0 {
            return Err(out_of_range("no frames to process".into()));
        }
        if num_chans <= 0 {
            return Err(out_of_range("no channels to process".into()));
        }
        if start_frame + num_frames > frames {
            return Err(out_of_range(format!(
                "frames {}..{} exceed buffer of {frames} frames",
                start_frame,
                start_frame + num_frames
            )));
        }
        if start_chan + num_chans > chans {
            return Err(out_of_range(format!(
                "channels {}..{} exceed buffer of {chans} channels",
                start_chan,
                start_chan + num_chans
            )));
        }

        Ok(Self {
            buffer,
            start_frame: start_frame as usize,
            num_frames: num_frames as usize,
            start_chan: start_chan as usize,
            num_chans: num_chans as usize,
        })
    }

    /// Sample rate of the underlying buffer
    pub fn sample_rate(&self) -> f64 {
        self.buffer.read().sample_rate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// A client that processes whole buffers described by a [`ParamSet`]
pub trait NrtClient: Send + 'static {
    /// Full parameter schema: buffers, ranges, then algorithm parameters
    fn descriptors(&self) -> ParamDescriptorSet;

    /// Run once over the buffers named in `params`
    fn process(&mut self, params: &ParamSet, ctx: &ProcessContext) -> ProcessResult;

    fn name(&self) -> &'static str;
}

/// Adapts a streaming client to whole buffers with strategy `A`
pub struct BatchClient<C, A> {
    layout: BufferLayout,
    client: C,
    adaptation: PhantomData<fn() -> A>,
}

impl<C: AlgorithmClient, A: Adaptation> BatchClient<C, A> {
    pub fn new(layout: BufferLayout, client: C) -> Self {
        Self {
            layout,
            client,
            adaptation: PhantomData,
        }
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    fn execute(&mut self, params: &ParamSet, ctx: &ProcessContext) -> OfflineResult<ProcessResult> {
        let mut inputs = Vec::with_capacity(self.layout.inputs.len());
        for (index, name) in self.layout.inputs.iter().enumerate() {
            let names = self.layout.range_names(index).ok_or_else(|| {
                OfflineError::InvalidConfig(format!("no range parameters for input {name}"))
            })?;
            inputs.push(ChannelBufferSpec::validate(
                name,
                params.buffer(name)?,
                params.long(&names.start_frame)?,
                params.long(&names.num_frames)?,
                params.long(&names.start_chan)?,
                params.long(&names.num_chans)?,
            )?);
        }

        let sample_rate = inputs
            .first()
            .map(ChannelBufferSpec::sample_rate)
            .ok_or_else(|| OfflineError::InvalidConfig("no input buffers".into()))?;

        let mut result = ProcessResult::ok();
        let mut outputs = Vec::with_capacity(self.layout.outputs.len());
        for name in &self.layout.outputs {
            let output = match params.buffer(name)? {
                Some(buffer) if buffer.read().exists() => Some(buffer),
                Some(_) => {
                    log::warn!("[{}] output buffer `{}` does not exist", self.client.name(), name);
                    result.add_warning(OfflineError::MissingOutput(name.clone()).to_string());
                    None
                }
                None => None,
            };
            outputs.push(output);
        }

        if outputs.iter().all(Option::is_none) {
            return Err(OfflineError::NoValidOutput);
        }

        self.client.set_params(params)?;
        self.client.set_sample_rate(sample_rate);

        let frames = inputs.iter().map(|spec| spec.num_frames).min().unwrap_or(0);
        let chans = inputs.iter().map(|spec| spec.num_chans).min().unwrap_or(0);

        log::debug!(
            "[{}] {} adaptation: {} frames x {} channels",
            self.client.name(),
            A::NAME,
            frames,
            chans
        );

        A::process(&mut self.client, &inputs, &outputs, frames, chans, ctx)?;
        Ok(result)
    }
}

impl<C: AlgorithmClient, A: Adaptation> NrtClient for BatchClient<C, A> {
    fn descriptors(&self) -> ParamDescriptorSet {
        self.layout.descriptors().join(C::descriptors())
    }

    fn process(&mut self, params: &ParamSet, ctx: &ProcessContext) -> ProcessResult {
        self.execute(params, ctx).unwrap_or_else(ProcessResult::failure)
    }

    fn name(&self) -> &'static str {
        self.client.name()
    }
}
