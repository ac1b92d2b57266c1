// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Cross-correlation of station Jones responses into visibilities.

[`cross_correlate`] inspects the tags on the supplied buffers, validates
that everything agrees on memory location, precision and dimensions, and
dispatches to the kernel variant matching the visibility buffer's element
type. Kernel output is *added* into the visibility buffer, so driving this
once per frequency channel or time sample accumulates naturally.
 */

mod cpu;
#[cfg(any(feature = "cuda", feature = "hip"))]
mod gpu;
#[cfg(test)]
mod tests;

use log::debug;
use thiserror::Error;

use crate::{
    buffer::{BufferError, DataArray, ElemType, MemType},
    math::num_baselines,
    sky::SourceArrays,
    station::StationArrays,
};

/// Scalar inputs for one correlator invocation. These always travel as
/// explicit parameters, never as global state.
#[derive(Debug, Clone, Copy)]
pub struct CorrelateParams {
    /// Minimum allowed baseline length \[wavelengths\]. Baselines shorter
    /// than this contribute exactly zero.
    pub uv_min_lambda: f64,
    /// Maximum allowed baseline length \[wavelengths\]. Baselines longer
    /// than this contribute exactly zero. Baselines exactly at either limit
    /// are included.
    pub uv_max_lambda: f64,
    /// 1 / wavelength \[1/metres\]; scales station coordinates into
    /// wavelength units.
    pub inv_wavelength: f64,
    /// Channel bandwidth divided by frequency; drives bandwidth smearing.
    /// 0 disables smearing exactly.
    pub frac_bandwidth: f64,
}

#[derive(Error, Debug)]
pub enum CorrelateError {
    #[error("correlation operand buffers are in different memory locations")]
    LocationMismatch,

    #[error("correlation operand buffers disagree in precision")]
    TypeMismatch,

    #[error("the {buffer} buffer has element type {found}, which is unsupported here")]
    BadDataType {
        buffer: &'static str,
        found: ElemType,
    },

    #[error("the {buffer} buffer has length {found}, expected {expected}")]
    DimensionMismatch {
        buffer: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("device-resident buffers were supplied, but fringecast was compiled without the \"cuda\" or \"hip\" features")]
    LocationUnavailable,

    #[error("{0}")]
    Buffer(#[from] BufferError),

    #[cfg(any(feature = "cuda", feature = "hip"))]
    #[error("{0}")]
    Gpu(#[from] crate::gpu::GpuError),
}

/// Accumulate the cross-correlation of every station pair into `vis`.
///
/// `vis` must hold one complex value (scalar mode) or one 2x2 Jones matrix
/// (polarised mode) per baseline, indexed as described in [`crate::math`].
/// `jones` is the per-station, per-source response table, station-major:
/// entry `s * num_sources + k` is station `s`'s response to source `k`. In
/// scalar mode the sources' brightness buffer holds Stokes I; in polarised
/// mode it holds 2x2 brightness matrices.
///
/// On success, returns the number of baselines written.
///
/// # Errors
///
/// Every precondition is checked before anything is written: all buffers
/// must share a memory location and precision, element types must match the
/// mode implied by `vis`, and all lengths must be consistent.
pub fn cross_correlate(
    vis: &mut DataArray,
    jones: &DataArray,
    sources: &SourceArrays,
    stations: &StationArrays,
    params: &CorrelateParams,
) -> Result<usize, CorrelateError> {
    let SourceArrays {
        brightness,
        l,
        m,
        n,
    } = sources;
    let StationArrays { u, v, w } = stations;
    let operands: [&DataArray; 8] = [jones, brightness, l, m, n, u, v, w];

    let location = vis.mem_type();
    if operands.iter().any(|a| a.mem_type() != location) {
        return Err(CorrelateError::LocationMismatch);
    }

    let precision = vis.precision();
    if operands.iter().any(|a| a.precision() != precision) {
        return Err(CorrelateError::TypeMismatch);
    }

    // The visibility buffer's element type decides the mode; the Jones and
    // brightness types have to line up with it.
    match vis.elem_type() {
        ElemType::Complex => {
            if jones.elem_type() != ElemType::Complex {
                return Err(CorrelateError::BadDataType {
                    buffer: "jones",
                    found: jones.elem_type(),
                });
            }
            if brightness.elem_type() != ElemType::Real {
                return Err(CorrelateError::BadDataType {
                    buffer: "brightness",
                    found: brightness.elem_type(),
                });
            }
        }
        ElemType::Matrix => {
            if jones.elem_type() != ElemType::Matrix {
                return Err(CorrelateError::BadDataType {
                    buffer: "jones",
                    found: jones.elem_type(),
                });
            }
            if brightness.elem_type() != ElemType::Matrix {
                return Err(CorrelateError::BadDataType {
                    buffer: "brightness",
                    found: brightness.elem_type(),
                });
            }
        }
        ElemType::Real => {
            return Err(CorrelateError::BadDataType {
                buffer: "visibility",
                found: ElemType::Real,
            })
        }
    }
    for (name, coord) in [
        ("source l", l),
        ("source m", m),
        ("source n", n),
        ("station u", u),
        ("station v", v),
        ("station w", w),
    ] {
        if coord.elem_type() != ElemType::Real {
            return Err(CorrelateError::BadDataType {
                buffer: name,
                found: coord.elem_type(),
            });
        }
    }

    let num_sources = l.len();
    for (name, buffer) in [("source m", m), ("source n", n), ("brightness", brightness)] {
        if buffer.len() != num_sources {
            return Err(CorrelateError::DimensionMismatch {
                buffer: name,
                expected: num_sources,
                found: buffer.len(),
            });
        }
    }
    let num_stations = u.len();
    for (name, buffer) in [("station v", v), ("station w", w)] {
        if buffer.len() != num_stations {
            return Err(CorrelateError::DimensionMismatch {
                buffer: name,
                expected: num_stations,
                found: buffer.len(),
            });
        }
    }
    if jones.len() != num_sources * num_stations {
        return Err(CorrelateError::DimensionMismatch {
            buffer: "jones",
            expected: num_sources * num_stations,
            found: jones.len(),
        });
    }
    let nbl = num_baselines(num_stations);
    if vis.len() != nbl {
        return Err(CorrelateError::DimensionMismatch {
            buffer: "visibility",
            expected: nbl,
            found: vis.len(),
        });
    }

    debug!(
        "cross-correlating {num_sources} sources over {nbl} baselines ({} elements, {precision} precision, {location} memory)",
        vis.elem_type(),
    );

    match location {
        MemType::Host => cpu::cross_correlate_host(vis, jones, sources, stations, params)?,
        #[cfg(any(feature = "cuda", feature = "hip"))]
        MemType::Device => {
            gpu::cross_correlate_device(vis, jones, sources, stations, params, num_sources, num_stations)?
        }
        #[cfg(not(any(feature = "cuda", feature = "hip")))]
        MemType::Device => return Err(CorrelateError::LocationUnavailable),
    }

    Ok(nbl)
}
