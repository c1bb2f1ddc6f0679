// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types returned by packet constructors and field accessors.

use core::fmt;

/// An error in the structure of a byte buffer that prevented a layer from
/// being constructed at all.
///
/// Constructors prefer to return a partially-built layer with its malformed
/// flag set over returning this error; a `ValidationError` is only raised
/// when not even the layer's base header fits in the buffer (or a value in
/// it makes the buffer impossible to interpret).
#[derive(Copy, Clone, Debug)]
pub struct ValidationError {
    pub layer: &'static str,
    pub err_type: ValidationErrorType,
    pub reason: &'static str,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValidationErrorType {
    /// The buffer needs more bytes for the layer to be well-formed.
    InsufficientBytes,
    /// A size field in the layer conflicts with the actual composition of
    /// its contents, or two size fields conflict with each other.
    InvalidSize,
    /// A field in the layer contains a value that cannot be interpreted.
    InvalidValue,
    /// The buffer had the given number of excess bytes at the end of it.
    ExcessBytes(usize),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} layer malformed: {}", self.layer, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Returned when accessing a field of an extension header whose presence
/// bit is not set for the layer's current state (e.g. an AETH field of a
/// BTH whose opcode carries no AETH).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldNotPresent {
    pub layer: &'static str,
    pub field: &'static str,
}

impl fmt::Display for FieldNotPresent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {} not present in {} layer", self.field, self.layer)
    }
}

impl std::error::Error for FieldNotPresent {}

/// Returned by a typed TCP option accessor when no option of the requested
/// kind exists in the option list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OptionNotFound {
    pub option: &'static str,
}

impl fmt::Display for OptionNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TCP option {} not found", self.option)
    }
}

impl std::error::Error for OptionNotFound {}

/// Returned when a bounded integer field (24-bit, 4-bit, ...) is assigned
/// a value that does not fit within it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OutOfRangeError {
    pub field: &'static str,
    pub max: u32,
}

impl fmt::Display for OutOfRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value assigned to {} exceeds maximum of {:#x}", self.field, self.max)
    }
}

impl std::error::Error for OutOfRangeError {}
