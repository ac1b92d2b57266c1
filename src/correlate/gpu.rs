// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Device correlation: thin dispatch over the compiled CUDA/HIP kernels.
//! The same algorithm as the host path, re-expressed as one thread per
//! baseline.

use log::trace;
use marlu::{c32, c64, Jones};

use super::{CorrelateError, CorrelateParams};
use crate::{
    buffer::{ArrayElement, DataArray, ElemType, Precision},
    gpu::{ffi, gpu_kernel_call},
    sky::SourceArrays,
    station::StationArrays,
};

/// Launch the kernel variant matching the visibility buffer's tags. The
/// driver has already validated tags and dimensions; all buffers are
/// device-resident.
#[allow(clippy::too_many_arguments)]
pub(super) fn cross_correlate_device(
    vis: &mut DataArray,
    jones: &DataArray,
    sources: &SourceArrays,
    stations: &StationArrays,
    params: &CorrelateParams,
    num_sources: usize,
    num_stations: usize,
) -> Result<(), CorrelateError> {
    if let Ok((device_info, _)) = crate::gpu::get_device_info() {
        trace!(
            "correlating on {} (capability {}, {} MiB)",
            device_info.name,
            device_info.capability,
            device_info.total_global_mem
        );
    }

    let num_sources = num_sources as i32;
    let num_stations = num_stations as i32;

    match (vis.elem_type(), vis.precision()) {
        (ElemType::Complex, Precision::Single) => gpu_kernel_call!(
            ffi::xcorr_scalar_float,
            num_sources,
            num_stations,
            c32::device_ptr(jones)?,
            f32::device_ptr(&sources.brightness)?,
            f32::device_ptr(&sources.l)?,
            f32::device_ptr(&sources.m)?,
            f32::device_ptr(&sources.n)?,
            f32::device_ptr(&stations.u)?,
            f32::device_ptr(&stations.v)?,
            f32::device_ptr(&stations.w)?,
            params.uv_min_lambda as f32,
            params.uv_max_lambda as f32,
            params.inv_wavelength as f32,
            params.frac_bandwidth as f32,
            c32::device_ptr_mut(vis)?,
        )?,
        (ElemType::Complex, Precision::Double) => gpu_kernel_call!(
            ffi::xcorr_scalar_double,
            num_sources,
            num_stations,
            c64::device_ptr(jones)?,
            f64::device_ptr(&sources.brightness)?,
            f64::device_ptr(&sources.l)?,
            f64::device_ptr(&sources.m)?,
            f64::device_ptr(&sources.n)?,
            f64::device_ptr(&stations.u)?,
            f64::device_ptr(&stations.v)?,
            f64::device_ptr(&stations.w)?,
            params.uv_min_lambda,
            params.uv_max_lambda,
            params.inv_wavelength,
            params.frac_bandwidth,
            c64::device_ptr_mut(vis)?,
        )?,
        (ElemType::Matrix, Precision::Single) => gpu_kernel_call!(
            ffi::xcorr_matrix_float,
            num_sources,
            num_stations,
            <Jones<f32>>::device_ptr(jones)?,
            <Jones<f32>>::device_ptr(&sources.brightness)?,
            f32::device_ptr(&sources.l)?,
            f32::device_ptr(&sources.m)?,
            f32::device_ptr(&sources.n)?,
            f32::device_ptr(&stations.u)?,
            f32::device_ptr(&stations.v)?,
            f32::device_ptr(&stations.w)?,
            params.uv_min_lambda as f32,
            params.uv_max_lambda as f32,
            params.inv_wavelength as f32,
            params.frac_bandwidth as f32,
            <Jones<f32>>::device_ptr_mut(vis)?,
        )?,
        (ElemType::Matrix, Precision::Double) => gpu_kernel_call!(
            ffi::xcorr_matrix_double,
            num_sources,
            num_stations,
            <Jones<f64>>::device_ptr(jones)?,
            <Jones<f64>>::device_ptr(&sources.brightness)?,
            f64::device_ptr(&sources.l)?,
            f64::device_ptr(&sources.m)?,
            f64::device_ptr(&sources.n)?,
            f64::device_ptr(&stations.u)?,
            f64::device_ptr(&stations.v)?,
            f64::device_ptr(&stations.w)?,
            params.uv_min_lambda,
            params.uv_max_lambda,
            params.inv_wavelength,
            params.frac_bandwidth,
            <Jones<f64>>::device_ptr_mut(vis)?,
        )?,
        (ElemType::Real, _) => unreachable!("element types validated by the driver"),
    }

    Ok(())
}
