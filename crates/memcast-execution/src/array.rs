//! Array payloads and their logical layout.
//!
//! The bytes of an array are stored in their native element order. The layout
//! (shape, element type and memory order) is never embedded in the datastore
//! files and must travel along with every call that reads or writes them.
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::checksum::Checksum;
use crate::error::{ExecutionError, ExecutionResult};
use crate::memmap::MappedArray;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl DType {
    pub fn item_size(&self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The memory order of a multi-dimensional array.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Order {
    /// Row-major order.
    #[default]
    C,
    /// Column-major order.
    F,
}

impl Order {
    pub fn as_char(&self) -> char {
        match self {
            Order::C => 'C',
            Order::F => 'F',
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ArrayLayout {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub order: Order,
}

impl ArrayLayout {
    pub fn new(shape: Vec<usize>, dtype: DType, order: Order) -> Self {
        Self {
            shape,
            dtype,
            order,
        }
    }

    pub fn element_count(&self) -> ExecutionResult<usize> {
        self.shape.iter().try_fold(1usize, |acc, &n| {
            acc.checked_mul(n)
                .ok_or_else(|| ExecutionError::invalid(format!("array shape overflow: {self}")))
        })
    }

    pub fn byte_len(&self) -> ExecutionResult<usize> {
        self.element_count()?
            .checked_mul(self.dtype.item_size())
            .ok_or_else(|| ExecutionError::invalid(format!("array size overflow: {self}")))
    }
}

impl fmt::Display for ArrayLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = self
            .shape
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({shape}) {} {}", self.dtype, self.order.as_char())
    }
}

/// An in-memory array owned by the submitting process.
#[derive(Clone)]
pub struct ArrayData {
    layout: ArrayLayout,
    bytes: Arc<[u8]>,
}

impl fmt::Debug for ArrayData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayData")
            .field("layout", &self.layout)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ArrayData {
    pub fn try_new(layout: ArrayLayout, bytes: impl Into<Arc<[u8]>>) -> ExecutionResult<Self> {
        let bytes = bytes.into();
        let expected = layout.byte_len()?;
        if bytes.len() != expected {
            return Err(ExecutionError::invalid(format!(
                "array {layout} requires {expected} bytes but {} bytes were given",
                bytes.len()
            )));
        }
        Ok(Self { layout, bytes })
    }

    pub fn from_f64(shape: Vec<usize>, order: Order, values: &[f64]) -> ExecutionResult<Self> {
        let bytes = values
            .iter()
            .flat_map(|x| x.to_ne_bytes())
            .collect::<Vec<_>>();
        Self::try_new(ArrayLayout::new(shape, DType::Float64, order), bytes)
    }

    pub fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// The data to broadcast, decided once at the call boundary.
#[derive(Debug, Clone)]
pub enum Payload {
    /// An array living in the memory of the submitting process.
    Array(ArrayData),
    /// An array that is already a memory-mapped file visible to the submitting process.
    /// Workers sharing the local datastore map this file directly.
    MappedFile(MappedArray),
}

impl Payload {
    pub fn layout(&self) -> &ArrayLayout {
        match self {
            Payload::Array(x) => x.layout(),
            Payload::MappedFile(x) => x.layout(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Array(x) => x.as_bytes(),
            Payload::MappedFile(x) => x.as_bytes(),
        }
    }

    pub fn mapped_path(&self) -> Option<&Path> {
        match self {
            Payload::Array(_) => None,
            Payload::MappedFile(x) => Some(x.path()),
        }
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::compute(self.layout(), self.as_bytes())
    }
}

impl From<ArrayData> for Payload {
    fn from(value: ArrayData) -> Self {
        Payload::Array(value)
    }
}

impl From<MappedArray> for Payload {
    fn from(value: MappedArray) -> Self {
        Payload::MappedFile(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_byte_len() -> ExecutionResult<()> {
        let layout = ArrayLayout::new(vec![100, 128], DType::Float64, Order::F);
        assert_eq!(layout.element_count()?, 12800);
        assert_eq!(layout.byte_len()?, 102400);
        assert_eq!(layout.to_string(), "(100, 128) float64 F");

        let scalar = ArrayLayout::new(vec![], DType::Int32, Order::C);
        assert_eq!(scalar.byte_len()?, 4);

        let huge = ArrayLayout::new(vec![usize::MAX, 2], DType::UInt8, Order::C);
        assert!(huge.byte_len().is_err());
        Ok(())
    }

    #[test]
    fn test_array_data_length_mismatch() {
        let layout = ArrayLayout::new(vec![2, 2], DType::Int16, Order::C);
        assert!(ArrayData::try_new(layout.clone(), vec![0u8; 8]).is_ok());
        assert!(matches!(
            ArrayData::try_new(layout, vec![0u8; 7]),
            Err(ExecutionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_from_f64() -> ExecutionResult<()> {
        let array = ArrayData::from_f64(vec![3], Order::C, &[1.0, 2.0, 3.0])?;
        assert_eq!(array.as_bytes().len(), 24);
        assert_eq!(&array.as_bytes()[8..16], &2.0f64.to_ne_bytes());
        Ok(())
    }
}
