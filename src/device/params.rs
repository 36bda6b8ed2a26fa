//! Typed parameter lists for device entry points
//!
//! A [`KernelSignature`] declares the ordered slots of an entry point. The
//! builder checks each value against the slot it lands in, and byte
//! offsets are derived from the signature instead of being tracked by
//! hand at every call site.

use crate::core::{Result, SVMError};
use crate::device::BufferId;

/// Size of a device pointer argument
pub const POINTER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Ptr,
    Int,
    Float,
}

impl ParamKind {
    pub const fn size(self) -> usize {
        match self {
            ParamKind::Ptr => POINTER_SIZE,
            ParamKind::Int => 4,
            ParamKind::Float => 4,
        }
    }
}

/// Total argument bytes of a slot list
pub const fn params_byte_size(params: &[(&str, ParamKind)]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < params.len() {
        total += params[i].1.size();
        i += 1;
    }
    total
}

/// Name and ordered argument slots of one device entry point
#[derive(Debug, PartialEq, Eq)]
pub struct KernelSignature {
    pub name: &'static str,
    pub params: &'static [(&'static str, ParamKind)],
}

impl KernelSignature {
    pub const fn byte_size(&self) -> usize {
        params_byte_size(self.params)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|&(slot, _)| slot == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Byte offset of a named slot
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        let pos = self.position(name)?;
        Some(params_byte_size(&self.params[..pos]))
    }
}

/// A bound argument value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Ptr(BufferId),
    Int(i32),
    Float(f32),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Ptr(_) => ParamKind::Ptr,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
        }
    }
}

/// Binds values slot by slot, in signature order
#[derive(Debug)]
pub struct ParamListBuilder {
    signature: &'static KernelSignature,
    values: Vec<ParamValue>,
}

impl ParamListBuilder {
    pub fn ptr(self, name: &str, buffer: BufferId) -> Result<Self> {
        self.push(name, ParamValue::Ptr(buffer))
    }

    pub fn int(self, name: &str, value: i32) -> Result<Self> {
        self.push(name, ParamValue::Int(value))
    }

    pub fn float(self, name: &str, value: f32) -> Result<Self> {
        self.push(name, ParamValue::Float(value))
    }

    /// Bind only if the signature declares `name`; lets one binding routine
    /// serve entry points with optional slots
    pub fn float_if_declared(self, name: &str, value: f32) -> Result<Self> {
        if self.signature.has(name) {
            self.float(name, value)
        } else {
            Ok(self)
        }
    }

    pub fn int_if_declared(self, name: &str, value: i32) -> Result<Self> {
        if self.signature.has(name) {
            self.int(name, value)
        } else {
            Ok(self)
        }
    }

    pub fn ptr_if_declared(self, name: &str, buffer: Option<BufferId>) -> Result<Self> {
        match (self.signature.has(name), buffer) {
            (true, Some(buffer)) => self.ptr(name, buffer),
            (false, None) => Ok(self),
            (true, None) => Err(self.layout_error(format!("slot '{name}' needs a buffer"))),
            (false, Some(_)) => Err(self.layout_error(format!("no slot named '{name}'"))),
        }
    }

    fn push(mut self, name: &str, value: ParamValue) -> Result<Self> {
        let pos = self.values.len();
        match self.signature.params.get(pos) {
            Some(&(slot, kind)) if slot == name && kind == value.kind() => {
                self.values.push(value);
                Ok(self)
            }
            Some(&(slot, kind)) => Err(self.layout_error(format!(
                "slot {pos} is '{slot}' ({kind:?}), got '{name}' ({:?})",
                value.kind()
            ))),
            None => Err(self.layout_error(format!(
                "extra argument '{name}' beyond {} slots",
                self.signature.params.len()
            ))),
        }
    }

    fn layout_error(&self, reason: String) -> SVMError {
        SVMError::ParameterLayout {
            entry: self.signature.name,
            reason,
        }
    }

    pub fn build(self) -> Result<ParamList> {
        if self.values.len() != self.signature.params.len() {
            return Err(self.layout_error(format!(
                "{} of {} slots bound",
                self.values.len(),
                self.signature.params.len()
            )));
        }

        let mut offsets = Vec::with_capacity(self.values.len());
        let mut offset = 0;
        for value in &self.values {
            offsets.push(offset);
            offset += value.kind().size();
        }
        if offset != self.signature.byte_size() {
            return Err(self.layout_error(format!(
                "bound {offset} bytes, signature expects {}",
                self.signature.byte_size()
            )));
        }

        Ok(ParamList {
            signature: self.signature,
            values: self.values,
            offsets,
        })
    }
}

/// A complete, layout-checked argument list
#[derive(Debug, Clone)]
pub struct ParamList {
    signature: &'static KernelSignature,
    values: Vec<ParamValue>,
    offsets: Vec<usize>,
}

impl ParamList {
    pub fn builder(signature: &'static KernelSignature) -> ParamListBuilder {
        ParamListBuilder {
            signature,
            values: Vec::with_capacity(signature.params.len()),
        }
    }

    pub fn signature(&self) -> &'static KernelSignature {
        self.signature
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn byte_size(&self) -> usize {
        self.offsets
            .last()
            .zip(self.values.last())
            .map_or(0, |(offset, value)| offset + value.kind().size())
    }

    fn slot(&self, name: &str) -> Result<usize> {
        self.signature
            .position(name)
            .ok_or_else(|| SVMError::ParameterLayout {
                entry: self.signature.name,
                reason: format!("no slot named '{name}'"),
            })
    }

    fn mismatch(&self, name: &str, wanted: ParamKind) -> SVMError {
        SVMError::ParameterLayout {
            entry: self.signature.name,
            reason: format!("slot '{name}' is not {wanted:?}"),
        }
    }

    /// Overwrite a float slot between dispatches
    pub fn set_float(&mut self, name: &str, value: f32) -> Result<()> {
        let pos = self.slot(name)?;
        match &mut self.values[pos] {
            ParamValue::Float(v) => {
                *v = value;
                Ok(())
            }
            _ => Err(self.mismatch(name, ParamKind::Float)),
        }
    }

    /// Overwrite an int slot between dispatches
    pub fn set_int(&mut self, name: &str, value: i32) -> Result<()> {
        let pos = self.slot(name)?;
        match &mut self.values[pos] {
            ParamValue::Int(v) => {
                *v = value;
                Ok(())
            }
            _ => Err(self.mismatch(name, ParamKind::Int)),
        }
    }

    pub fn ptr(&self, name: &str) -> Result<BufferId> {
        match self.values[self.slot(name)?] {
            ParamValue::Ptr(id) => Ok(id),
            _ => Err(self.mismatch(name, ParamKind::Ptr)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i32> {
        match self.values[self.slot(name)?] {
            ParamValue::Int(v) => Ok(v),
            _ => Err(self.mismatch(name, ParamKind::Int)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f32> {
        match self.values[self.slot(name)?] {
            ParamValue::Float(v) => Ok(v),
            _ => Err(self.mismatch(name, ParamKind::Float)),
        }
    }

    /// Pack the arguments little-endian, pointers as 64-bit handles
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.signature.byte_size());
        for value in &self.values {
            match *value {
                ParamValue::Ptr(id) => bytes.extend_from_slice(&id.0.to_le_bytes()),
                ParamValue::Int(v) => bytes.extend_from_slice(&v.to_le_bytes()),
                ParamValue::Float(v) => bytes.extend_from_slice(&v.to_le_bytes()),
            }
        }
        bytes
    }
}
