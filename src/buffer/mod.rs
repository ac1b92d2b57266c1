// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Typed numeric buffers that can live in host or device memory.

A [`DataArray`] carries its element type (real, complex scalar or 2x2
complex Jones matrix), its precision (single or double) and its memory
location (host or device) as runtime tags, resolved once at this API
boundary. All arithmetic below that boundary is monomorphised; nothing
re-tests tags inside loops.

Every buffer exclusively owns its storage, and the recorded length is
derived from the storage itself, so the two can never disagree. Operations
that can fail detect their precondition violations before mutating any
state.
 */

mod element;

use std::fmt;

use marlu::{c32, c64, Jones};
use thiserror::Error;

pub use element::ArrayElement;

#[cfg(any(feature = "cuda", feature = "hip"))]
use crate::gpu::DevicePointer;

/// The element kind of a [`DataArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    /// One real value per element.
    Real,
    /// One complex value per element.
    Complex,
    /// A 2x2 complex Jones matrix per element.
    Matrix,
}

impl ElemType {
    /// Real- and complex-valued elements are scalars; matrices are not.
    pub fn is_scalar(self) -> bool {
        !matches!(self, Self::Matrix)
    }

    /// Complex scalars and matrices hold complex values.
    pub fn is_complex(self) -> bool {
        matches!(self, Self::Complex | Self::Matrix)
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, Self::Matrix)
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Real => write!(f, "real"),
            Self::Complex => write!(f, "complex"),
            Self::Matrix => write!(f, "matrix"),
        }
    }
}

/// The floating-point width of a [`DataArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    pub fn is_double(self) -> bool {
        matches!(self, Self::Double)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Double => write!(f, "double"),
        }
    }
}

/// The memory location of a [`DataArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemType {
    Host,
    /// CUDA- or HIP-device memory. Only available when the corresponding
    /// feature was enabled at compile time.
    Device,
}

impl fmt::Display for MemType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device => write!(f, "device"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("buffers are in different memory locations, or a device buffer was used where host data is needed")]
    LocationMismatch,

    #[error("buffer type mismatch: expected {expected_type}/{expected_precision}, found {found_type}/{found_precision}")]
    TypeMismatch {
        expected_type: ElemType,
        expected_precision: Precision,
        found_type: ElemType,
        found_precision: Precision,
    },

    #[error("buffer length mismatch: {0} vs {1}")]
    DimensionMismatch(usize, usize),

    #[error("device memory was requested, but fringecast was compiled without the \"cuda\" or \"hip\" features")]
    BadLocation,

    #[error("failed to allocate {bytes} bytes of {mem} memory")]
    OutOfMemory { bytes: usize, mem: MemType },

    #[cfg(any(feature = "cuda", feature = "hip"))]
    #[error("{0}")]
    Gpu(#[from] crate::gpu::GpuError),
}

/// The storage behind one element type: a host vector or a device
/// allocation.
pub(crate) enum Slab<T> {
    Host(Vec<T>),
    #[cfg(any(feature = "cuda", feature = "hip"))]
    Device(DevicePointer<T>),
}

impl<T: ArrayElement> Slab<T> {
    fn zeros(mem_type: MemType, len: usize) -> Result<Slab<T>, BufferError> {
        match mem_type {
            MemType::Host => {
                let mut v = Vec::new();
                try_reserve(&mut v, len)?;
                v.resize(len, T::default());
                Ok(Slab::Host(v))
            }
            MemType::Device => Slab::zeros_device(len),
        }
    }

    #[cfg(any(feature = "cuda", feature = "hip"))]
    fn zeros_device(len: usize) -> Result<Slab<T>, BufferError> {
        let mut d = DevicePointer::malloc(len * std::mem::size_of::<T>())?;
        d.clear();
        Ok(Slab::Device(d))
    }

    #[cfg(not(any(feature = "cuda", feature = "hip")))]
    fn zeros_device(_len: usize) -> Result<Slab<T>, BufferError> {
        Err(BufferError::BadLocation)
    }

    fn len(&self) -> usize {
        match self {
            Slab::Host(v) => v.len(),
            #[cfg(any(feature = "cuda", feature = "hip"))]
            Slab::Device(d) => d.get_num_elements(),
        }
    }

    fn mem_type(&self) -> MemType {
        match self {
            Slab::Host(_) => MemType::Host,
            #[cfg(any(feature = "cuda", feature = "hip"))]
            Slab::Device(_) => MemType::Device,
        }
    }

    fn resize(&mut self, new_len: usize) -> Result<(), BufferError> {
        match self {
            Slab::Host(v) => {
                use std::cmp::Ordering;
                match new_len.cmp(&v.len()) {
                    Ordering::Greater => {
                        try_reserve(v, new_len - v.len())?;
                        v.resize(new_len, T::default());
                    }
                    Ordering::Less => {
                        v.truncate(new_len);
                        v.shrink_to_fit();
                    }
                    Ordering::Equal => (),
                }
                Ok(())
            }
            #[cfg(any(feature = "cuda", feature = "hip"))]
            Slab::Device(d) => {
                d.realloc_preserving(new_len * std::mem::size_of::<T>())?;
                Ok(())
            }
        }
    }

    fn append(&mut self, src: &Slab<T>) -> Result<(), BufferError> {
        match (self, src) {
            (Slab::Host(dst), Slab::Host(s)) => {
                try_reserve(dst, s.len())?;
                dst.extend_from_slice(s);
                Ok(())
            }
            #[cfg(any(feature = "cuda", feature = "hip"))]
            (Slab::Host(dst), Slab::Device(s)) => {
                // Pull the device data down before growing, so that a failed
                // transfer leaves the buffer untouched.
                let tail = s.copy_from_device_new()?;
                try_reserve(dst, tail.len())?;
                dst.extend_from_slice(&tail);
                Ok(())
            }
            #[cfg(any(feature = "cuda", feature = "hip"))]
            (Slab::Device(dst), Slab::Host(s)) => {
                dst.append_from_host(s)?;
                Ok(())
            }
            #[cfg(any(feature = "cuda", feature = "hip"))]
            (Slab::Device(dst), Slab::Device(s)) => {
                dst.append_from_device(s)?;
                Ok(())
            }
        }
    }

    fn copy_to(&self, mem_type: MemType) -> Result<Slab<T>, BufferError> {
        match (self, mem_type) {
            (Slab::Host(v), MemType::Host) => {
                let mut out = Vec::new();
                try_reserve(&mut out, v.len())?;
                out.extend_from_slice(v);
                Ok(Slab::Host(out))
            }
            (Slab::Host(v), MemType::Device) => host_to_device(v),
            #[cfg(any(feature = "cuda", feature = "hip"))]
            (Slab::Device(d), MemType::Host) => Ok(Slab::Host(d.copy_from_device_new()?)),
            #[cfg(any(feature = "cuda", feature = "hip"))]
            (Slab::Device(d), MemType::Device) => Ok(Slab::Device(d.duplicate()?)),
        }
    }

    /// dst[i] = a[i] + b[i]. Lengths and locations have been checked by the
    /// caller.
    fn add_from(&mut self, a: &Slab<T>, b: &Slab<T>) -> Result<(), BufferError> {
        match (self, a, b) {
            (Slab::Host(dst), Slab::Host(x), Slab::Host(y)) => {
                dst.iter_mut()
                    .zip(x.iter().zip(y.iter()))
                    .for_each(|(d, (&x_i, &y_i))| *d = x_i.add_elem(y_i));
                Ok(())
            }
            #[cfg(any(feature = "cuda", feature = "hip"))]
            (Slab::Device(dst), Slab::Device(x), Slab::Device(y)) => {
                crate::gpu::device_add_components(
                    T::PRECISION,
                    dst.get_num_elements() * T::NUM_COMPONENTS,
                    x.get().cast(),
                    y.get().cast(),
                    dst.get_mut().cast(),
                )?;
                Ok(())
            }
            #[cfg(any(feature = "cuda", feature = "hip"))]
            _ => Err(BufferError::LocationMismatch),
        }
    }

    /// self[i] += src[i], the aliased form of [`Slab::add_from`].
    fn accumulate(&mut self, src: &Slab<T>) -> Result<(), BufferError> {
        match (self, src) {
            (Slab::Host(dst), Slab::Host(s)) => {
                dst.iter_mut()
                    .zip(s.iter())
                    .for_each(|(d, &s_i)| *d = d.add_elem(s_i));
                Ok(())
            }
            #[cfg(any(feature = "cuda", feature = "hip"))]
            (Slab::Device(dst), Slab::Device(s)) => {
                // Each device thread reads its own slot before writing it, so
                // dst doubling as an operand is fine.
                crate::gpu::device_add_components(
                    T::PRECISION,
                    dst.get_num_elements() * T::NUM_COMPONENTS,
                    dst.get().cast(),
                    s.get().cast(),
                    dst.get_mut().cast(),
                )?;
                Ok(())
            }
            #[cfg(any(feature = "cuda", feature = "hip"))]
            _ => Err(BufferError::LocationMismatch),
        }
    }

    fn scale_real(&mut self, factor: f64) -> Result<(), BufferError> {
        match self {
            Slab::Host(v) => {
                v.iter_mut().for_each(|x| x.scale_real(factor));
                Ok(())
            }
            #[cfg(any(feature = "cuda", feature = "hip"))]
            Slab::Device(d) => {
                crate::gpu::device_scale_components(
                    T::PRECISION,
                    d.get_num_elements() * T::NUM_COMPONENTS,
                    d.get_mut().cast(),
                    factor,
                )?;
                Ok(())
            }
        }
    }
}

#[cfg(any(feature = "cuda", feature = "hip"))]
fn host_to_device<T: ArrayElement>(v: &[T]) -> Result<Slab<T>, BufferError> {
    Ok(Slab::Device(DevicePointer::copy_to_device(v)?))
}

#[cfg(not(any(feature = "cuda", feature = "hip")))]
fn host_to_device<T: ArrayElement>(_v: &[T]) -> Result<Slab<T>, BufferError> {
    Err(BufferError::BadLocation)
}

fn try_reserve<T: ArrayElement>(v: &mut Vec<T>, additional: usize) -> Result<(), BufferError> {
    v.try_reserve_exact(additional)
        .map_err(|_| BufferError::OutOfMemory {
            bytes: additional * std::mem::size_of::<T>(),
            mem: MemType::Host,
        })
}

/// The (element type, precision) product, resolved to a closed set of
/// variants.
pub(crate) enum ArrayData {
    RealSingle(Slab<f32>),
    RealDouble(Slab<f64>),
    ComplexSingle(Slab<c32>),
    ComplexDouble(Slab<c64>),
    MatrixSingle(Slab<Jones<f32>>),
    MatrixDouble(Slab<Jones<f64>>),
}

/// Dispatch on the element type once, running the same (generic) body
/// against the typed slab.
macro_rules! on_slab {
    ($data:expr, $s:ident => $body:expr) => {
        match $data {
            ArrayData::RealSingle($s) => $body,
            ArrayData::RealDouble($s) => $body,
            ArrayData::ComplexSingle($s) => $body,
            ArrayData::ComplexDouble($s) => $body,
            ArrayData::MatrixSingle($s) => $body,
            ArrayData::MatrixDouble($s) => $body,
        }
    };
}

/// Like [`on_slab!`], but rebuilds the same variant around the body's
/// result.
macro_rules! map_slab {
    ($data:expr, $s:ident => $body:expr) => {
        match $data {
            ArrayData::RealSingle($s) => ArrayData::RealSingle($body),
            ArrayData::RealDouble($s) => ArrayData::RealDouble($body),
            ArrayData::ComplexSingle($s) => ArrayData::ComplexSingle($body),
            ArrayData::ComplexDouble($s) => ArrayData::ComplexDouble($body),
            ArrayData::MatrixSingle($s) => ArrayData::MatrixSingle($body),
            ArrayData::MatrixDouble($s) => ArrayData::MatrixDouble($body),
        }
    };
}

/// Dispatch on two arrays whose element types have already been checked to
/// agree.
macro_rules! on_slab_pair {
    ($a:expr, $b:expr, $x:ident, $y:ident => $body:expr) => {
        match ($a, $b) {
            (ArrayData::RealSingle($x), ArrayData::RealSingle($y)) => $body,
            (ArrayData::RealDouble($x), ArrayData::RealDouble($y)) => $body,
            (ArrayData::ComplexSingle($x), ArrayData::ComplexSingle($y)) => $body,
            (ArrayData::ComplexDouble($x), ArrayData::ComplexDouble($y)) => $body,
            (ArrayData::MatrixSingle($x), ArrayData::MatrixSingle($y)) => $body,
            (ArrayData::MatrixDouble($x), ArrayData::MatrixDouble($y)) => $body,
            _ => unreachable!("element types already checked"),
        }
    };
}

/// Dispatch on three arrays whose element types have already been checked
/// to agree.
macro_rules! on_slab_triple {
    ($a:expr, $b:expr, $c:expr, $x:ident, $y:ident, $z:ident => $body:expr) => {
        match ($a, $b, $c) {
            (
                ArrayData::RealSingle($x),
                ArrayData::RealSingle($y),
                ArrayData::RealSingle($z),
            ) => $body,
            (
                ArrayData::RealDouble($x),
                ArrayData::RealDouble($y),
                ArrayData::RealDouble($z),
            ) => $body,
            (
                ArrayData::ComplexSingle($x),
                ArrayData::ComplexSingle($y),
                ArrayData::ComplexSingle($z),
            ) => $body,
            (
                ArrayData::ComplexDouble($x),
                ArrayData::ComplexDouble($y),
                ArrayData::ComplexDouble($z),
            ) => $body,
            (
                ArrayData::MatrixSingle($x),
                ArrayData::MatrixSingle($y),
                ArrayData::MatrixSingle($z),
            ) => $body,
            (
                ArrayData::MatrixDouble($x),
                ArrayData::MatrixDouble($y),
                ArrayData::MatrixDouble($z),
            ) => $body,
            _ => unreachable!("element types already checked"),
        }
    };
}

/// A typed numeric buffer in host or device memory.
pub struct DataArray {
    pub(crate) data: ArrayData,
}

impl DataArray {
    /// Allocate a zero-initialised buffer of `len` elements. A `len` of 0
    /// makes a valid, unallocated buffer.
    pub fn zeros(
        elem_type: ElemType,
        precision: Precision,
        mem_type: MemType,
        len: usize,
    ) -> Result<DataArray, BufferError> {
        let data = match (elem_type, precision) {
            (ElemType::Real, Precision::Single) => ArrayData::RealSingle(Slab::zeros(mem_type, len)?),
            (ElemType::Real, Precision::Double) => ArrayData::RealDouble(Slab::zeros(mem_type, len)?),
            (ElemType::Complex, Precision::Single) => {
                ArrayData::ComplexSingle(Slab::zeros(mem_type, len)?)
            }
            (ElemType::Complex, Precision::Double) => {
                ArrayData::ComplexDouble(Slab::zeros(mem_type, len)?)
            }
            (ElemType::Matrix, Precision::Single) => {
                ArrayData::MatrixSingle(Slab::zeros(mem_type, len)?)
            }
            (ElemType::Matrix, Precision::Double) => {
                ArrayData::MatrixDouble(Slab::zeros(mem_type, len)?)
            }
        };
        Ok(DataArray { data })
    }

    /// Wrap existing host data in a buffer. The element type and precision
    /// tags come from `T`.
    pub fn from_vec<T: ArrayElement>(v: Vec<T>) -> DataArray {
        T::upload(v)
    }

    pub fn elem_type(&self) -> ElemType {
        match &self.data {
            ArrayData::RealSingle(_) | ArrayData::RealDouble(_) => ElemType::Real,
            ArrayData::ComplexSingle(_) | ArrayData::ComplexDouble(_) => ElemType::Complex,
            ArrayData::MatrixSingle(_) | ArrayData::MatrixDouble(_) => ElemType::Matrix,
        }
    }

    pub fn precision(&self) -> Precision {
        match &self.data {
            ArrayData::RealSingle(_) | ArrayData::ComplexSingle(_) | ArrayData::MatrixSingle(_) => {
                Precision::Single
            }
            ArrayData::RealDouble(_) | ArrayData::ComplexDouble(_) | ArrayData::MatrixDouble(_) => {
                Precision::Double
            }
        }
    }

    pub fn mem_type(&self) -> MemType {
        on_slab!(&self.data, s => s.mem_type())
    }

    pub fn len(&self) -> usize {
        on_slab!(&self.data, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_double(&self) -> bool {
        self.precision().is_double()
    }

    pub fn is_complex(&self) -> bool {
        self.elem_type().is_complex()
    }

    pub fn is_scalar(&self) -> bool {
        self.elem_type().is_scalar()
    }

    pub fn is_matrix(&self) -> bool {
        self.elem_type().is_matrix()
    }

    /// Resize the buffer in place, preserving the first
    /// `min(len, new_len)` elements. On failure the buffer is unchanged.
    pub fn resize(&mut self, new_len: usize) -> Result<(), BufferError> {
        on_slab!(&mut self.data, s => s.resize(new_len))
    }

    /// Grow this buffer by `src.len()` elements, copying `src`'s contents
    /// into the new tail. `src` may live in a different memory location;
    /// its values are transferred. On failure the buffer is unchanged.
    pub fn append(&mut self, src: &DataArray) -> Result<(), BufferError> {
        self.check_same_type(src)?;
        on_slab_pair!(&mut self.data, &src.data, dst, s => dst.append(s))
    }

    /// Make an owning copy of this buffer in the given memory location,
    /// with identical type tags, length and values.
    pub fn to_mem_type(&self, mem_type: MemType) -> Result<DataArray, BufferError> {
        let data = map_slab!(&self.data, s => s.copy_to(mem_type)?);
        Ok(DataArray { data })
    }

    /// dst[i] = a[i] + b[i] over every element. All three buffers must
    /// agree in location, element type, precision and length. For the
    /// aliased form dst[i] += a[i], use [`DataArray::add_assign`].
    pub fn add(dst: &mut DataArray, a: &DataArray, b: &DataArray) -> Result<(), BufferError> {
        dst.check_same_location(a)?;
        dst.check_same_location(b)?;
        dst.check_same_type(a)?;
        dst.check_same_type(b)?;
        dst.check_same_len(a)?;
        dst.check_same_len(b)?;
        on_slab_triple!(&mut dst.data, &a.data, &b.data, d, x, y => d.add_from(x, y))
    }

    /// self[i] += src[i] over every element; the in-place counterpart of
    /// [`DataArray::add`], and the accumulation point for driving the
    /// correlator incrementally.
    pub fn add_assign(&mut self, src: &DataArray) -> Result<(), BufferError> {
        self.check_same_location(src)?;
        self.check_same_type(src)?;
        self.check_same_len(src)?;
        on_slab_pair!(&mut self.data, &src.data, d, s => d.accumulate(s))
    }

    /// Multiply every real-valued component of every element by `factor`,
    /// in place. All eight components of a matrix element are scaled.
    pub fn scale_real(&mut self, factor: f64) -> Result<(), BufferError> {
        on_slab!(&mut self.data, s => s.scale_real(factor))
    }

    /// View host-resident data as a typed slice.
    pub fn as_slice<T: ArrayElement>(&self) -> Result<&[T], BufferError> {
        T::host_slice(self)
    }

    /// View host-resident data as a mutable typed slice.
    pub fn as_mut_slice<T: ArrayElement>(&mut self) -> Result<&mut [T], BufferError> {
        T::host_slice_mut(self)
    }

    fn check_same_type(&self, other: &DataArray) -> Result<(), BufferError> {
        if self.elem_type() != other.elem_type() || self.precision() != other.precision() {
            Err(BufferError::TypeMismatch {
                expected_type: self.elem_type(),
                expected_precision: self.precision(),
                found_type: other.elem_type(),
                found_precision: other.precision(),
            })
        } else {
            Ok(())
        }
    }

    fn check_same_location(&self, other: &DataArray) -> Result<(), BufferError> {
        if self.mem_type() != other.mem_type() {
            Err(BufferError::LocationMismatch)
        } else {
            Ok(())
        }
    }

    fn check_same_len(&self, other: &DataArray) -> Result<(), BufferError> {
        if self.len() != other.len() {
            Err(BufferError::DimensionMismatch(self.len(), other.len()))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for DataArray {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DataArray")
            .field("elem_type", &self.elem_type())
            .field("precision", &self.precision())
            .field("mem_type", &self.mem_type())
            .field("len", &self.len())
            .finish()
    }
}
