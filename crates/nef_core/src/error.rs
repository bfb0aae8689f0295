use core::fmt;

/// Errors that stop an ensemble from starting.
///
/// Construction either yields a runnable ensemble or one of these; there is
/// no half-initialised state that silently never ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsembleError {
    /// A buffer the configuration asks for could not be created.
    AllocationFailure {
        buffer: &'static str,
        elements: usize,
    },
    /// A count that is used as a divisor or loop bound is zero.
    ZeroDimension { field: &'static str },
    /// A vector or matrix does not have the length implied by the counts.
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A route points at a filter that does not exist.
    FilterIndexOutOfRange {
        channel: &'static str,
        index: usize,
        n_filters: usize,
    },
    /// A scalar coefficient lies outside its permitted range.
    CoefficientOutOfRange { field: &'static str },
    /// PES writes past the end of the decoder rows.
    PesOutOfRange {
        offset: usize,
        width: usize,
        n_output_dimensions: usize,
    },
    /// Spike recording is on but nothing bounds the number of frames.
    UnboundedRecording,
}

impl fmt::Display for EnsembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsembleError::AllocationFailure { buffer, elements } => {
                write!(f, "failed to allocate {} ({} elements)", buffer, elements)
            }
            EnsembleError::ZeroDimension { field } => write!(f, "{} must be non-zero", field),
            EnsembleError::LengthMismatch {
                field,
                expected,
                actual,
            } => write!(f, "{} has {} entries, expected {}", field, actual, expected),
            EnsembleError::FilterIndexOutOfRange {
                channel,
                index,
                n_filters,
            } => write!(
                f,
                "{} route targets filter {} but only {} filters exist",
                channel, index, n_filters
            ),
            EnsembleError::CoefficientOutOfRange { field } => {
                write!(f, "{} is outside [0, 1]", field)
            }
            EnsembleError::PesOutOfRange {
                offset,
                width,
                n_output_dimensions,
            } => write!(
                f,
                "PES writes decoder columns {}..{} but rows have {} columns",
                offset,
                offset + width,
                n_output_dimensions
            ),
            EnsembleError::UnboundedRecording => {
                write!(f, "record_spikes needs simulation_ticks to size the region")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EnsembleError {}

/// Why an inbound packet was dropped. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMiss {
    /// No route entry matched the key.
    NoRoute { key: u32 },
    /// A route matched but the dimension extracted from the key is too large.
    DimensionOutOfRange {
        key: u32,
        dimension: usize,
        n_dimensions: usize,
    },
}

impl RoutingMiss {
    pub fn key(&self) -> u32 {
        match *self {
            RoutingMiss::NoRoute { key } => key,
            RoutingMiss::DimensionOutOfRange { key, .. } => key,
        }
    }
}

impl fmt::Display for RoutingMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMiss::NoRoute { key } => write!(f, "unknown key {:08x}", key),
            RoutingMiss::DimensionOutOfRange {
                key,
                dimension,
                n_dimensions,
            } => write!(
                f,
                "key {:08x} addresses dimension {} of {}",
                key, dimension, n_dimensions
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RoutingMiss {}

/// Allocate a zeroed vector, reporting failure instead of aborting.
pub(crate) fn try_alloc<T: Clone>(
    buffer: &'static str,
    elements: usize,
    fill: T,
) -> Result<alloc::vec::Vec<T>, EnsembleError> {
    let mut v = alloc::vec::Vec::new();
    v.try_reserve_exact(elements)
        .map_err(|_| EnsembleError::AllocationFailure { buffer, elements })?;
    v.resize(elements, fill);
    Ok(v)
}

/// `a * b` for buffer sizes, as an allocation failure when it overflows.
pub(crate) fn checked_size(
    buffer: &'static str,
    a: usize,
    b: usize,
) -> Result<usize, EnsembleError> {
    a.checked_mul(b).ok_or(EnsembleError::AllocationFailure {
        buffer,
        elements: usize::MAX,
    })
}
