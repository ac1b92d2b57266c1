// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The closed set of element types a [`DataArray`] can hold.

use marlu::{c32, c64, Jones};
use static_assertions::const_assert_eq;

use super::{ArrayData, BufferError, DataArray, ElemType, Precision, Slab};

mod private {
    use marlu::{c32, c64, Jones};

    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for c32 {}
    impl Sealed for c64 {}
    impl Sealed for Jones<f32> {}
    impl Sealed for Jones<f64> {}
}

/// An element type usable inside a [`DataArray`]: real, complex or 2x2
/// complex matrix, in single or double precision. This trait is sealed; the
/// six implementations here are the whole set.
pub trait ArrayElement:
    private::Sealed + Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    const ELEM_TYPE: ElemType;
    const PRECISION: Precision;
    /// The number of real-valued components in one element.
    const NUM_COMPONENTS: usize;

    /// Element-wise sum of two elements.
    fn add_elem(self, other: Self) -> Self;

    /// Multiply every real-valued component of this element by a real
    /// factor. For single-precision elements the factor is demoted before
    /// multiplying.
    fn scale_real(&mut self, factor: f64);

    #[doc(hidden)]
    fn upload(v: Vec<Self>) -> DataArray;
    #[doc(hidden)]
    fn host_slice(arr: &DataArray) -> Result<&[Self], BufferError>;
    #[doc(hidden)]
    fn host_slice_mut(arr: &mut DataArray) -> Result<&mut [Self], BufferError>;
    #[cfg(any(feature = "cuda", feature = "hip"))]
    #[doc(hidden)]
    fn device_ptr(arr: &DataArray) -> Result<*const std::ffi::c_void, BufferError>;
    #[cfg(any(feature = "cuda", feature = "hip"))]
    #[doc(hidden)]
    fn device_ptr_mut(arr: &mut DataArray) -> Result<*mut std::ffi::c_void, BufferError>;
}

macro_rules! impl_array_element {
    ($ty:ty, $variant:ident, $elem:ident, $prec:ident, $ncomp:expr, |$s:ident, $f:ident| $scale:expr) => {
        impl ArrayElement for $ty {
            const ELEM_TYPE: ElemType = ElemType::$elem;
            const PRECISION: Precision = Precision::$prec;
            const NUM_COMPONENTS: usize = $ncomp;

            fn add_elem(mut self, other: Self) -> Self {
                self += other;
                self
            }

            fn scale_real(&mut self, factor: f64) {
                let $s = self;
                let $f = factor;
                $scale
            }

            fn upload(v: Vec<Self>) -> DataArray {
                DataArray {
                    data: ArrayData::$variant(Slab::Host(v)),
                }
            }

            fn host_slice(arr: &DataArray) -> Result<&[Self], BufferError> {
                match &arr.data {
                    ArrayData::$variant(Slab::Host(v)) => Ok(v),
                    #[cfg(any(feature = "cuda", feature = "hip"))]
                    ArrayData::$variant(Slab::Device(_)) => Err(BufferError::LocationMismatch),
                    _ => Err(type_mismatch::<Self>(arr)),
                }
            }

            fn host_slice_mut(arr: &mut DataArray) -> Result<&mut [Self], BufferError> {
                match &mut arr.data {
                    ArrayData::$variant(Slab::Host(v)) => Ok(v),
                    #[cfg(any(feature = "cuda", feature = "hip"))]
                    ArrayData::$variant(Slab::Device(_)) => Err(BufferError::LocationMismatch),
                    _ => Err(type_mismatch::<Self>(arr)),
                }
            }

            #[cfg(any(feature = "cuda", feature = "hip"))]
            fn device_ptr(arr: &DataArray) -> Result<*const std::ffi::c_void, BufferError> {
                match &arr.data {
                    ArrayData::$variant(Slab::Device(d)) => Ok(d.get().cast()),
                    ArrayData::$variant(Slab::Host(_)) => Err(BufferError::LocationMismatch),
                    _ => Err(type_mismatch::<Self>(arr)),
                }
            }

            #[cfg(any(feature = "cuda", feature = "hip"))]
            fn device_ptr_mut(arr: &mut DataArray) -> Result<*mut std::ffi::c_void, BufferError> {
                let err = type_mismatch::<Self>(arr);
                match &mut arr.data {
                    ArrayData::$variant(Slab::Device(d)) => Ok(d.get_mut().cast()),
                    ArrayData::$variant(Slab::Host(_)) => Err(BufferError::LocationMismatch),
                    _ => Err(err),
                }
            }
        }
    };
}

fn type_mismatch<T: ArrayElement>(arr: &DataArray) -> BufferError {
    BufferError::TypeMismatch {
        expected_type: T::ELEM_TYPE,
        expected_precision: T::PRECISION,
        found_type: arr.elem_type(),
        found_precision: arr.precision(),
    }
}

impl_array_element!(f32, RealSingle, Real, Single, 1, |s, f| *s *= f as f32);
impl_array_element!(f64, RealDouble, Real, Double, 1, |s, f| *s *= f);
impl_array_element!(c32, ComplexSingle, Complex, Single, 2, |s, f| *s = *s * f as f32);
impl_array_element!(c64, ComplexDouble, Complex, Double, 2, |s, f| *s = *s * f);
impl_array_element!(Jones<f32>, MatrixSingle, Matrix, Single, 8, |s, f| *s = *s * f as f32);
impl_array_element!(Jones<f64>, MatrixDouble, Matrix, Double, 8, |s, f| *s = *s * f);

// The device code and the element-size accounting both assume these layouts.
const_assert_eq!(std::mem::size_of::<c32>(), 8);
const_assert_eq!(std::mem::size_of::<c64>(), 16);
const_assert_eq!(std::mem::size_of::<Jones<f32>>(), 32);
const_assert_eq!(std::mem::size_of::<Jones<f64>>(), 64);
