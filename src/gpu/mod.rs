// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! CUDA/HIP plumbing: device allocations, transfers and kernel entry
//! points. This module only exists when the `cuda` or `hip` feature is
//! enabled.

mod utils;

use std::{
    ffi::{c_void, CStr},
    panic::Location,
    ptr::null_mut,
};

use thiserror::Error;

use crate::buffer::Precision;
pub(crate) use utils::get_device_info;

// Import CUDA/HIP functions into the same names.
cfg_if::cfg_if! {
    if #[cfg(feature = "cuda")] {
        use cuda_runtime_sys::{
            cudaDeviceSynchronize as gpuDeviceSynchronize, cudaError::cudaSuccess as gpuSuccess,
            cudaFree as gpuFree, cudaGetErrorString as gpuGetErrorString,
            cudaGetLastError as gpuGetLastError, cudaMalloc as gpuMalloc, cudaMemcpy as gpuMemcpy,
            cudaMemcpyKind::cudaMemcpyDeviceToDevice as gpuMemcpyDeviceToDevice,
            cudaMemcpyKind::cudaMemcpyDeviceToHost as gpuMemcpyDeviceToHost,
            cudaMemcpyKind::cudaMemcpyHostToDevice as gpuMemcpyHostToDevice,
            cudaMemset as gpuMemset,
        };
    } else if #[cfg(feature = "hip")] {
        use hip_sys::hiprt::{
            hipDeviceSynchronize as gpuDeviceSynchronize, hipError_t::hipSuccess as gpuSuccess,
            hipFree as gpuFree, hipGetErrorString as gpuGetErrorString,
            hipGetLastError as gpuGetLastError, hipMalloc as gpuMalloc, hipMemcpy as gpuMemcpy,
            hipMemcpyKind::hipMemcpyDeviceToDevice as gpuMemcpyDeviceToDevice,
            hipMemcpyKind::hipMemcpyDeviceToHost as gpuMemcpyDeviceToHost,
            hipMemcpyKind::hipMemcpyHostToDevice as gpuMemcpyHostToDevice,
            hipMemset as gpuMemset,
        };
    }
}

/// The kernel and device-info entry points implemented in the compiled
/// `.cu` sources. Each returns a static error string, or null on success.
pub(crate) mod ffi {
    use std::ffi::{c_char, c_void};

    extern "C" {
        pub(crate) fn xcorr_scalar_float(
            num_sources: i32,
            num_stations: i32,
            jones: *const c_void,
            source_i: *const c_void,
            source_l: *const c_void,
            source_m: *const c_void,
            source_n: *const c_void,
            station_u: *const c_void,
            station_v: *const c_void,
            station_w: *const c_void,
            uv_min_lambda: f32,
            uv_max_lambda: f32,
            inv_wavelength: f32,
            frac_bandwidth: f32,
            vis: *mut c_void,
        ) -> *const c_char;

        pub(crate) fn xcorr_scalar_double(
            num_sources: i32,
            num_stations: i32,
            jones: *const c_void,
            source_i: *const c_void,
            source_l: *const c_void,
            source_m: *const c_void,
            source_n: *const c_void,
            station_u: *const c_void,
            station_v: *const c_void,
            station_w: *const c_void,
            uv_min_lambda: f64,
            uv_max_lambda: f64,
            inv_wavelength: f64,
            frac_bandwidth: f64,
            vis: *mut c_void,
        ) -> *const c_char;

        pub(crate) fn xcorr_matrix_float(
            num_sources: i32,
            num_stations: i32,
            jones: *const c_void,
            brightness: *const c_void,
            source_l: *const c_void,
            source_m: *const c_void,
            source_n: *const c_void,
            station_u: *const c_void,
            station_v: *const c_void,
            station_w: *const c_void,
            uv_min_lambda: f32,
            uv_max_lambda: f32,
            inv_wavelength: f32,
            frac_bandwidth: f32,
            vis: *mut c_void,
        ) -> *const c_char;

        pub(crate) fn xcorr_matrix_double(
            num_sources: i32,
            num_stations: i32,
            jones: *const c_void,
            brightness: *const c_void,
            source_l: *const c_void,
            source_m: *const c_void,
            source_n: *const c_void,
            station_u: *const c_void,
            station_v: *const c_void,
            station_w: *const c_void,
            uv_min_lambda: f64,
            uv_max_lambda: f64,
            inv_wavelength: f64,
            frac_bandwidth: f64,
            vis: *mut c_void,
        ) -> *const c_char;

        pub(crate) fn buffer_add_float(
            num_components: usize,
            a: *const c_void,
            b: *const c_void,
            dst: *mut c_void,
        ) -> *const c_char;

        pub(crate) fn buffer_add_double(
            num_components: usize,
            a: *const c_void,
            b: *const c_void,
            dst: *mut c_void,
        ) -> *const c_char;

        pub(crate) fn buffer_scale_float(
            num_components: usize,
            data: *mut c_void,
            factor: f32,
        ) -> *const c_char;

        pub(crate) fn buffer_scale_double(
            num_components: usize,
            data: *mut c_void,
            factor: f64,
        ) -> *const c_char;

        pub(crate) fn get_gpu_device_info(
            device: i32,
            name: *mut c_char,
            device_major: *mut i32,
            device_minor: *mut i32,
            total_global_mem: *mut usize,
            driver_version: *mut i32,
            runtime_version: *mut i32,
        ) -> *const c_char;
    }
}

macro_rules! gpu_kernel_call {
    ($gpu_fn:path, $($args:expr),* $(,)?) => {{
        #[allow(unused_unsafe)]
        unsafe {
            let error_message_ptr = $gpu_fn($($args),*);
            if error_message_ptr.is_null() {
                Ok(())
            } else {
                let error_message = std::ffi::CStr::from_ptr(error_message_ptr).to_str();
                #[cfg(feature = "cuda")]
                let error_message = error_message.unwrap_or("<cannot read CUDA error string>");
                #[cfg(feature = "hip")]
                let error_message = error_message.unwrap_or("<cannot read HIP error string>");
                let our_error_message = format!("{}: {error_message}", stringify!($gpu_fn));
                Err($crate::gpu::GpuError::Kernel {
                    msg: our_error_message.into(),
                    file: file!(),
                    line: line!(),
                })
            }
        }
    }};
}
pub(crate) use gpu_kernel_call;

#[derive(Clone, Copy)]
pub(crate) enum GpuCall {
    Malloc,
    CopyToDevice,
    CopyFromDevice,
}

/// Run [`gpuGetLastError`] and (in debug mode) [`gpuDeviceSynchronize`]. If
/// either call reports an error, it is converted to a Rust error describing
/// the just-performed operation.
///
/// # Safety
///
/// This function interfaces directly with the CUDA/HIP API. Rust errors
/// attempt to catch problems but there are no guarantees.
#[track_caller]
unsafe fn check_for_errors(gpu_call: GpuCall) -> Result<(), GpuError> {
    let to_error = |code| {
        let c_str = CStr::from_ptr(gpuGetErrorString(code));
        let msg = c_str.to_str();
        #[cfg(feature = "cuda")]
        let msg = msg.unwrap_or("<cannot read CUDA error string>");
        #[cfg(feature = "hip")]
        let msg = msg.unwrap_or("<cannot read HIP error string>");
        let location = Location::caller();
        match gpu_call {
            GpuCall::Malloc => GpuError::Malloc {
                msg: msg.into(),
                file: location.file(),
                line: location.line(),
            },
            GpuCall::CopyToDevice => GpuError::CopyToDevice {
                msg: msg.into(),
                file: location.file(),
                line: location.line(),
            },
            GpuCall::CopyFromDevice => GpuError::CopyFromDevice {
                msg: msg.into(),
                file: location.file(),
                line: location.line(),
            },
        }
    };

    // Only do a device sync if we're in debug mode, for performance.
    let debug_mode = matches!(std::env::var("DEBUG").as_deref(), Ok("true"));
    if debug_mode {
        let code = gpuDeviceSynchronize();
        if code != gpuSuccess {
            return Err(to_error(code));
        }
    }

    let code = gpuGetLastError();
    if code != gpuSuccess {
        return Err(to_error(code));
    }

    Ok(())
}

/// A Rust-managed pointer to device memory. When this is dropped,
/// [`gpuFree`] is called on the pointer.
#[derive(Debug)]
pub(crate) struct DevicePointer<T> {
    ptr: *mut T,

    /// The number of bytes allocated against `ptr`.
    size: usize,
}

impl<T> Drop for DevicePointer<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                gpuFree(self.ptr.cast());
            }
        }
    }
}

impl<T> DevicePointer<T> {
    /// Get a const pointer to the device memory.
    pub(crate) fn get(&self) -> *const T {
        self.ptr as *const T
    }

    /// Get a mutable pointer to the device memory.
    pub(crate) fn get_mut(&mut self) -> *mut T {
        self.ptr
    }

    /// Get the number of elements allocated against the buffer.
    pub(crate) fn get_num_elements(&self) -> usize {
        self.size / std::mem::size_of::<T>()
    }

    /// Allocate a number of bytes on the device.
    #[track_caller]
    pub(crate) fn malloc(size: usize) -> Result<DevicePointer<T>, GpuError> {
        if size == 0 {
            Ok(Self::default())
        } else {
            let mut d_ptr = std::ptr::null_mut();
            unsafe {
                gpuMalloc(&mut d_ptr, size);
                check_for_errors(GpuCall::Malloc)?;
            }
            Ok(Self {
                ptr: d_ptr.cast(),
                size,
            })
        }
    }

    /// Clear all of the bytes in the buffer by writing zeros.
    pub(crate) fn clear(&mut self) {
        unsafe {
            if self.size > 0 {
                gpuMemset(self.get_mut().cast(), 0, self.size);
            }
        }
    }

    /// Re-allocate the buffer to `size` bytes, preserving the first
    /// `min(self.size, size)` bytes of its contents. On failure the buffer
    /// is left as it was.
    #[track_caller]
    pub(crate) fn realloc_preserving(&mut self, size: usize) -> Result<(), GpuError> {
        if size == self.size {
            return Ok(());
        }

        // CUDA/HIP don't provide a realloc; make a new allocation, copy the
        // survivors over and swap it in.
        let mut new = Self::malloc(size)?;
        let keep = self.size.min(size);
        if keep > 0 {
            unsafe {
                gpuMemcpy(
                    new.get_mut().cast(),
                    self.get().cast(),
                    keep,
                    gpuMemcpyDeviceToDevice,
                );
                check_for_errors(GpuCall::CopyToDevice)?;
            }
        }
        std::mem::swap(self, &mut new);
        Ok(())
    }

    /// Copy a slice of data to the device. Any type is allowed, and the
    /// returned pointer is to the device memory.
    #[track_caller]
    pub(crate) fn copy_to_device(v: &[T]) -> Result<DevicePointer<T>, GpuError> {
        let size = std::mem::size_of_val(v);
        unsafe {
            let mut d_ptr = Self::malloc(size)?;
            if size > 0 {
                gpuMemcpy(
                    d_ptr.get_mut().cast(),
                    v.as_ptr().cast(),
                    size,
                    gpuMemcpyHostToDevice,
                );
                check_for_errors(GpuCall::CopyToDevice)?;
            }
            Ok(d_ptr)
        }
    }

    /// Make a new device allocation holding the same bytes as this one.
    #[track_caller]
    pub(crate) fn duplicate(&self) -> Result<DevicePointer<T>, GpuError> {
        let mut new = Self::malloc(self.size)?;
        if self.size > 0 {
            unsafe {
                gpuMemcpy(
                    new.get_mut().cast(),
                    self.get().cast(),
                    self.size,
                    gpuMemcpyDeviceToDevice,
                );
                check_for_errors(GpuCall::CopyToDevice)?;
            }
        }
        Ok(new)
    }

    /// Grow the buffer by `v.len()` elements copied from host memory. The
    /// copy goes through a fresh allocation, so on failure the buffer is
    /// unchanged.
    #[track_caller]
    pub(crate) fn append_from_host(&mut self, v: &[T]) -> Result<(), GpuError> {
        let extra = std::mem::size_of_val(v);
        if extra == 0 {
            return Ok(());
        }

        let mut new = Self::malloc(self.size + extra)?;
        unsafe {
            if self.size > 0 {
                gpuMemcpy(
                    new.get_mut().cast(),
                    self.get().cast(),
                    self.size,
                    gpuMemcpyDeviceToDevice,
                );
                check_for_errors(GpuCall::CopyToDevice)?;
            }
            gpuMemcpy(
                (new.get_mut() as *mut u8).add(self.size).cast(),
                v.as_ptr().cast(),
                extra,
                gpuMemcpyHostToDevice,
            );
            check_for_errors(GpuCall::CopyToDevice)?;
        }
        std::mem::swap(self, &mut new);
        Ok(())
    }

    /// Grow the buffer by the elements of another device buffer.
    #[track_caller]
    pub(crate) fn append_from_device(&mut self, other: &DevicePointer<T>) -> Result<(), GpuError> {
        if other.size == 0 {
            return Ok(());
        }

        let mut new = Self::malloc(self.size + other.size)?;
        unsafe {
            if self.size > 0 {
                gpuMemcpy(
                    new.get_mut().cast(),
                    self.get().cast(),
                    self.size,
                    gpuMemcpyDeviceToDevice,
                );
                check_for_errors(GpuCall::CopyToDevice)?;
            }
            gpuMemcpy(
                (new.get_mut() as *mut u8).add(self.size).cast(),
                other.get().cast(),
                other.size,
                gpuMemcpyDeviceToDevice,
            );
            check_for_errors(GpuCall::CopyToDevice)?;
        }
        std::mem::swap(self, &mut new);
        Ok(())
    }
}

impl<T: Default + Clone> DevicePointer<T> {
    /// Copy the buffer's contents into a new host vector.
    #[track_caller]
    pub(crate) fn copy_from_device_new(&self) -> Result<Vec<T>, GpuError> {
        let mut v: Vec<T> = vec![T::default(); self.get_num_elements()];
        if self.size > 0 {
            unsafe {
                gpuMemcpy(
                    v.as_mut_ptr().cast(),
                    self.ptr.cast(),
                    self.size,
                    gpuMemcpyDeviceToHost,
                );
                check_for_errors(GpuCall::CopyFromDevice)?;
            }
        }
        Ok(v)
    }
}

impl<T> Default for DevicePointer<T> {
    fn default() -> Self {
        Self {
            ptr: null_mut(),
            size: 0,
        }
    }
}

/// dst[i] = a[i] + b[i] over `num_components` real-valued components. `dst`
/// may alias `a` or `b`.
pub(crate) fn device_add_components(
    precision: Precision,
    num_components: usize,
    a: *const c_void,
    b: *const c_void,
    dst: *mut c_void,
) -> Result<(), GpuError> {
    match precision {
        Precision::Single => gpu_kernel_call!(ffi::buffer_add_float, num_components, a, b, dst),
        Precision::Double => gpu_kernel_call!(ffi::buffer_add_double, num_components, a, b, dst),
    }
}

/// Multiply `num_components` real-valued components in place by a real
/// factor.
pub(crate) fn device_scale_components(
    precision: Precision,
    num_components: usize,
    data: *mut c_void,
    factor: f64,
) -> Result<(), GpuError> {
    match precision {
        Precision::Single => {
            gpu_kernel_call!(ffi::buffer_scale_float, num_components, data, factor as f32)
        }
        Precision::Double => {
            gpu_kernel_call!(ffi::buffer_scale_double, num_components, data, factor)
        }
    }
}

#[derive(Error, Debug)]
pub enum GpuError {
    #[cfg(feature = "cuda")]
    #[error("{file}:{line}: cudaMemcpy to device failed: {msg}")]
    CopyToDevice {
        msg: Box<str>,
        file: &'static str,
        line: u32,
    },

    #[cfg(feature = "hip")]
    #[error("{file}:{line}: hipMemcpy to device failed: {msg}")]
    CopyToDevice {
        msg: Box<str>,
        file: &'static str,
        line: u32,
    },

    #[cfg(feature = "cuda")]
    #[error("{file}:{line}: cudaMemcpy from device failed: {msg}")]
    CopyFromDevice {
        msg: Box<str>,
        file: &'static str,
        line: u32,
    },

    #[cfg(feature = "hip")]
    #[error("{file}:{line}: hipMemcpy from device failed: {msg}")]
    CopyFromDevice {
        msg: Box<str>,
        file: &'static str,
        line: u32,
    },

    #[cfg(feature = "cuda")]
    #[error("{file}:{line}: cudaMalloc error: {msg}")]
    Malloc {
        msg: Box<str>,
        file: &'static str,
        line: u32,
    },

    #[cfg(feature = "hip")]
    #[error("{file}:{line}: hipMalloc error: {msg}")]
    Malloc {
        msg: Box<str>,
        file: &'static str,
        line: u32,
    },

    #[cfg(feature = "cuda")]
    #[error("{file}:{line}: CUDA kernel error: {msg}")]
    Kernel {
        msg: Box<str>,
        file: &'static str,
        line: u32,
    },

    #[cfg(feature = "hip")]
    #[error("{file}:{line}: HIP kernel error: {msg}")]
    Kernel {
        msg: Box<str>,
        file: &'static str,
        line: u32,
    },

    #[cfg(feature = "cuda")]
    #[error("{file}:{line}: {msg}")]
    Generic {
        msg: Box<str>,
        file: &'static str,
        line: u32,
    },

    #[cfg(feature = "hip")]
    #[error("{file}:{line}: {msg}")]
    Generic {
        msg: Box<str>,
        file: &'static str,
        line: u32,
    },
}
