//! Parameter descriptors and value sets for offline processors
//!
//! A processor publishes an ordered [`ParamDescriptorSet`]. Hosts fill a
//! [`ParamSet`] against it; cloning a `ParamSet` takes a snapshot that later
//! edits of the original do not affect.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::buffer::SharedBuffer;
use crate::error::{RfError, RfResult};

// ═══════════════════════════════════════════════════════════════════════════════
// DESCRIPTORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameter kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Long,
    Float,
    Enum,
    /// Buffer the processor writes
    Buffer,
    /// Buffer the processor only reads
    InputBuffer,
}

impl ParamKind {
    pub fn is_buffer(self) -> bool {
        matches!(self, Self::Buffer | Self::InputBuffer)
    }

    fn label(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Float => "float",
            Self::Enum => "enum",
            Self::Buffer => "buffer",
            Self::InputBuffer => "input buffer",
        }
    }
}

/// Parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Long(i64),
    Float(f64),
    Enum(usize),
    /// `None` when no buffer is bound
    Buffer(Option<SharedBuffer>),
}

/// Static description of one parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDescriptor {
    pub name: String,
    pub display_name: String,
    pub kind: ParamKind,
    /// Default for numeric kinds (enum: option index); unused for buffers
    pub default: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub options: Vec<&'static str>,
}

impl ParamDescriptor {
    fn with_kind(name: impl Into<String>, display_name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            kind,
            default: 0.0,
            min: None,
            max: None,
            options: Vec::new(),
        }
    }

    pub fn long(name: impl Into<String>, display_name: impl Into<String>, default: i64) -> Self {
        Self {
            default: default as f64,
            ..Self::with_kind(name, display_name, ParamKind::Long)
        }
    }

    pub fn float(name: impl Into<String>, display_name: impl Into<String>, default: f64) -> Self {
        Self {
            default,
            ..Self::with_kind(name, display_name, ParamKind::Float)
        }
    }

    pub fn enumeration(
        name: impl Into<String>,
        display_name: impl Into<String>,
        default: usize,
        options: &[&'static str],
    ) -> Self {
        Self {
            default: default as f64,
            options: options.to_vec(),
            ..Self::with_kind(name, display_name, ParamKind::Enum)
        }
    }

    pub fn buffer(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::with_kind(name, display_name, ParamKind::Buffer)
    }

    pub fn input_buffer(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::with_kind(name, display_name, ParamKind::InputBuffer)
    }

    /// Lower bound (inclusive)
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Upper bound (inclusive)
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn default_value(&self) -> ParamValue {
        match self.kind {
            ParamKind::Long => ParamValue::Long(self.default as i64),
            ParamKind::Float => ParamValue::Float(self.default),
            ParamKind::Enum => ParamValue::Enum(self.default as usize),
            ParamKind::Buffer | ParamKind::InputBuffer => ParamValue::Buffer(None),
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        let value = self.min.map_or(value, |min| value.max(min));
        self.max.map_or(value, |max| value.min(max))
    }

    /// Type-check `value` and clamp it into range
    pub fn constrain(&self, value: ParamValue) -> RfResult<ParamValue> {
        let mismatch = || RfError::ParamType {
            name: self.name.clone(),
            expected: self.kind.label(),
        };

        match (self.kind, value) {
            (ParamKind::Long, ParamValue::Long(v)) => Ok(ParamValue::Long(self.clamp(v as f64) as i64)),
            (ParamKind::Float, ParamValue::Float(v)) => {
                if v.is_nan() {
                    return Err(RfError::InvalidParam(format!("{} is NaN", self.name)));
                }
                Ok(ParamValue::Float(self.clamp(v)))
            }
            (ParamKind::Float, ParamValue::Long(v)) => Ok(ParamValue::Float(self.clamp(v as f64))),
            (ParamKind::Enum, ParamValue::Enum(index)) => {
                if index < self.options.len() {
                    Ok(ParamValue::Enum(index))
                } else {
                    Err(RfError::InvalidParam(format!(
                        "{}: option {} of {}",
                        self.name,
                        index,
                        self.options.len()
                    )))
                }
            }
            (ParamKind::Buffer | ParamKind::InputBuffer, value @ ParamValue::Buffer(_)) => Ok(value),
            _ => Err(mismatch()),
        }
    }
}

/// Ordered, name-unique list of descriptors
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParamDescriptorSet {
    descriptors: Vec<ParamDescriptor>,
}

impl ParamDescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor
    pub fn with(mut self, descriptor: ParamDescriptor) -> Self {
        debug_assert!(
            self.index_of(&descriptor.name).is_none(),
            "duplicate parameter name {}",
            descriptor.name
        );
        self.descriptors.push(descriptor);
        self
    }

    /// Concatenate, keeping `self` first
    pub fn join(self, other: Self) -> Self {
        other.descriptors.into_iter().fold(self, Self::with)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name == name)
    }

    pub fn get(&self, index: usize) -> Option<&ParamDescriptor> {
        self.descriptors.get(index)
    }

    pub fn find(&self, name: &str) -> Option<&ParamDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn count_of(&self, kind: ParamKind) -> usize {
        self.descriptors.iter().filter(|d| d.kind == kind).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE SET
// ═══════════════════════════════════════════════════════════════════════════════

/// Values for every descriptor of a [`ParamDescriptorSet`]
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    descriptors: Arc<ParamDescriptorSet>,
    values: Vec<ParamValue>,
}

impl ParamSet {
    /// All parameters at their defaults
    pub fn new(descriptors: Arc<ParamDescriptorSet>) -> Self {
        let values = descriptors.iter().map(ParamDescriptor::default_value).collect();
        Self {
            descriptors,
            values,
        }
    }

    pub fn descriptors(&self) -> &Arc<ParamDescriptorSet> {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn index(&self, name: &str) -> RfResult<usize> {
        self.descriptors
            .index_of(name)
            .ok_or_else(|| RfError::UnknownParam(name.to_string()))
    }

    pub fn get(&self, name: &str) -> RfResult<&ParamValue> {
        Ok(&self.values[self.index(name)?])
    }

    pub fn value_at(&self, index: usize) -> Option<&ParamValue> {
        self.values.get(index)
    }

    /// Set a value, clamped to the descriptor's range
    pub fn set(&mut self, name: &str, value: ParamValue) -> RfResult<()> {
        let index = self.index(name)?;
        let constrained = self.descriptors.descriptors[index].constrain(value)?;
        self.values[index] = constrained;
        Ok(())
    }

    pub fn set_long(&mut self, name: &str, value: i64) -> RfResult<()> {
        self.set(name, ParamValue::Long(value))
    }

    pub fn set_float(&mut self, name: &str, value: f64) -> RfResult<()> {
        self.set(name, ParamValue::Float(value))
    }

    pub fn set_choice(&mut self, name: &str, index: usize) -> RfResult<()> {
        self.set(name, ParamValue::Enum(index))
    }

    /// Select an enum option by its label
    pub fn set_choice_named(&mut self, name: &str, option: &str) -> RfResult<()> {
        let descriptor = self
            .descriptors
            .find(name)
            .ok_or_else(|| RfError::UnknownParam(name.to_string()))?;
        let index = descriptor
            .options
            .iter()
            .position(|o| *o == option)
            .ok_or_else(|| RfError::InvalidParam(format!("{name}: unknown option `{option}`")))?;
        self.set_choice(name, index)
    }

    pub fn set_buffer(&mut self, name: &str, buffer: Option<SharedBuffer>) -> RfResult<()> {
        self.set(name, ParamValue::Buffer(buffer))
    }

    fn type_error(&self, name: &str, expected: &'static str) -> RfError {
        RfError::ParamType {
            name: name.to_string(),
            expected,
        }
    }

    pub fn long(&self, name: &str) -> RfResult<i64> {
        match self.get(name)? {
            ParamValue::Long(v) => Ok(*v),
            _ => Err(self.type_error(name, "long")),
        }
    }

    /// Float value; long parameters are widened
    pub fn float(&self, name: &str) -> RfResult<f64> {
        match self.get(name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Long(v) => Ok(*v as f64),
            _ => Err(self.type_error(name, "float")),
        }
    }

    pub fn choice(&self, name: &str) -> RfResult<usize> {
        match self.get(name)? {
            ParamValue::Enum(v) => Ok(*v),
            _ => Err(self.type_error(name, "enum")),
        }
    }

    pub fn buffer(&self, name: &str) -> RfResult<Option<SharedBuffer>> {
        match self.get(name)? {
            ParamValue::Buffer(b) => Ok(b.clone()),
            _ => Err(self.type_error(name, "buffer")),
        }
    }

    /// Visit every bound buffer slot together with its kind
    pub fn for_each_buffer_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(ParamKind, &mut SharedBuffer),
    {
        for (descriptor, value) in self.descriptors.descriptors.iter().zip(self.values.iter_mut()) {
            if let ParamValue::Buffer(Some(buffer)) = value {
                f(descriptor.kind, buffer);
            }
        }
    }

    /// Restore every parameter to its default
    pub fn reset(&mut self) {
        for (descriptor, value) in self.descriptors.descriptors.iter().zip(self.values.iter_mut()) {
            *value = descriptor.default_value();
        }
    }
}
