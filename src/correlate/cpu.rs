// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Host correlation kernels. One generic implementation per mode,
//! monomorphised over the float width; the driver picks the combination
//! that matches the visibility buffer's tags.

use itertools::izip;
use marlu::Jones;
use ndarray::ArrayView2;
use num_complex::Complex;
use num_traits::{Float, FloatConst, NumAssign};
use rayon::prelude::*;

use super::{CorrelateError, CorrelateParams};
use crate::{
    buffer::{ArrayElement, DataArray, ElemType, Precision},
    math::{baseline_to_stations, sinc},
    sky::SourceArrays,
    station::StationArrays,
};

/// The float-width bound shared by the kernels.
pub(crate) trait KernelFloat:
    Float + FloatConst + NumAssign + Send + Sync + ArrayElement
{
}
impl KernelFloat for f32 {}
impl KernelFloat for f64 {}

/// [`CorrelateParams`] demoted to the kernel's float width.
struct KernelParams<F> {
    uv_min_lambda: F,
    uv_max_lambda: F,
    inv_wavelength: F,
    frac_bandwidth: F,
}

impl<F: KernelFloat> KernelParams<F> {
    fn new(params: &CorrelateParams) -> KernelParams<F> {
        let cast = |x: f64| F::from(x).expect("f64 parameter representable as kernel float");
        KernelParams {
            uv_min_lambda: cast(params.uv_min_lambda),
            uv_max_lambda: cast(params.uv_max_lambda),
            inv_wavelength: cast(params.inv_wavelength),
            frac_bandwidth: cast(params.frac_bandwidth),
        }
    }
}

/// Dispatch to the kernel matching the visibility buffer's element type and
/// precision. The driver has already validated tags and dimensions.
pub(super) fn cross_correlate_host(
    vis: &mut DataArray,
    jones: &DataArray,
    sources: &SourceArrays,
    stations: &StationArrays,
    params: &CorrelateParams,
) -> Result<(), CorrelateError> {
    match (vis.elem_type(), vis.precision()) {
        (ElemType::Complex, Precision::Single) => {
            scalar_host::<f32>(vis, jones, sources, stations, params)
        }
        (ElemType::Complex, Precision::Double) => {
            scalar_host::<f64>(vis, jones, sources, stations, params)
        }
        (ElemType::Matrix, Precision::Single) => {
            matrix_host::<f32>(vis, jones, sources, stations, params)
        }
        (ElemType::Matrix, Precision::Double) => {
            matrix_host::<f64>(vis, jones, sources, stations, params)
        }
        (ElemType::Real, _) => unreachable!("element types validated by the driver"),
    }
}

fn scalar_host<F>(
    vis: &mut DataArray,
    jones: &DataArray,
    sources: &SourceArrays,
    stations: &StationArrays,
    params: &CorrelateParams,
) -> Result<(), CorrelateError>
where
    F: KernelFloat,
    Complex<F>: ArrayElement,
{
    let source_i = sources.brightness.as_slice::<F>()?;
    let num_stations = stations.u.len();
    let jones = ArrayView2::from_shape(
        (num_stations, source_i.len()),
        jones.as_slice::<Complex<F>>()?,
    )
    .expect("jones table dimensions validated by the driver");

    correlate_scalar(
        jones,
        source_i,
        sources.l.as_slice::<F>()?,
        sources.m.as_slice::<F>()?,
        sources.n.as_slice::<F>()?,
        stations.u.as_slice::<F>()?,
        stations.v.as_slice::<F>()?,
        stations.w.as_slice::<F>()?,
        &KernelParams::new(params),
        vis.as_mut_slice::<Complex<F>>()?,
    );
    Ok(())
}

fn matrix_host<F>(
    vis: &mut DataArray,
    jones: &DataArray,
    sources: &SourceArrays,
    stations: &StationArrays,
    params: &CorrelateParams,
) -> Result<(), CorrelateError>
where
    F: KernelFloat,
    Jones<F>: ArrayElement,
{
    let brightness = sources.brightness.as_slice::<Jones<F>>()?;
    let num_stations = stations.u.len();
    let jones = ArrayView2::from_shape(
        (num_stations, brightness.len()),
        jones.as_slice::<Jones<F>>()?,
    )
    .expect("jones table dimensions validated by the driver");

    correlate_matrix(
        jones,
        brightness,
        sources.l.as_slice::<F>()?,
        sources.m.as_slice::<F>()?,
        sources.n.as_slice::<F>()?,
        stations.u.as_slice::<F>()?,
        stations.v.as_slice::<F>()?,
        stations.w.as_slice::<F>()?,
        &KernelParams::new(params),
        vis.as_mut_slice::<Jones<F>>()?,
    );
    Ok(())
}

/// Scalar-Jones correlation: for every station pair (s1, s2) with s1 < s2,
/// sum J_{s1,k} conj(J_{s2,k}) I_k over sources k, weighted by the
/// geometric phasor and the bandwidth-smearing factor, and add the sum into
/// the pair's visibility slot.
///
/// Baseline slots are disjoint, so the pairs run in parallel; each pair's
/// source sum is sequential in ascending source order.
#[allow(clippy::too_many_arguments)]
fn correlate_scalar<F: KernelFloat>(
    jones: ArrayView2<Complex<F>>,
    source_i: &[F],
    source_l: &[F],
    source_m: &[F],
    source_n: &[F],
    station_u: &[F],
    station_v: &[F],
    station_w: &[F],
    params: &KernelParams<F>,
    vis: &mut [Complex<F>],
) {
    vis.par_iter_mut()
        .enumerate()
        .for_each(|(i_baseline, vis_out)| {
            let (s1, s2) = baseline_to_stations(i_baseline);
            let du = (station_u[s1] - station_u[s2]) * params.inv_wavelength;
            let dv = (station_v[s1] - station_v[s2]) * params.inv_wavelength;
            let dw = (station_w[s1] - station_w[s2]) * params.inv_wavelength;

            // Gated baselines must read exactly zero; bail before the
            // source loop.
            let uv_len = (du * du + dv * dv).sqrt();
            if uv_len < params.uv_min_lambda || uv_len > params.uv_max_lambda {
                return;
            }

            let mut sum = Complex::new(F::zero(), F::zero());
            izip!(
                source_i,
                source_l,
                source_m,
                source_n,
                jones.row(s1),
                jones.row(s2)
            )
            .for_each(|(&flux, &l, &m, &n, &j1, &j2)| {
                let t = du * l + dv * m + dw * (n - F::one());
                let phasor = Complex::cis(F::TAU() * t);
                let smear = sinc(F::PI() * params.frac_bandwidth * t);
                sum += j1 * j2.conj() * phasor * (flux * smear);
            });
            *vis_out += sum;
        });
}

/// Matrix-Jones correlation: as [`correlate_scalar`], with the per-source
/// product replaced by J_{s1,k} B_k J_{s2,k}^H for 2x2 brightness matrices
/// B.
#[allow(clippy::too_many_arguments)]
fn correlate_matrix<F: KernelFloat>(
    jones: ArrayView2<Jones<F>>,
    brightness: &[Jones<F>],
    source_l: &[F],
    source_m: &[F],
    source_n: &[F],
    station_u: &[F],
    station_v: &[F],
    station_w: &[F],
    params: &KernelParams<F>,
    vis: &mut [Jones<F>],
) {
    vis.par_iter_mut()
        .enumerate()
        .for_each(|(i_baseline, vis_out)| {
            let (s1, s2) = baseline_to_stations(i_baseline);
            let du = (station_u[s1] - station_u[s2]) * params.inv_wavelength;
            let dv = (station_v[s1] - station_v[s2]) * params.inv_wavelength;
            let dw = (station_w[s1] - station_w[s2]) * params.inv_wavelength;

            let uv_len = (du * du + dv * dv).sqrt();
            if uv_len < params.uv_min_lambda || uv_len > params.uv_max_lambda {
                return;
            }

            let mut sum: Jones<F> = Jones::default();
            izip!(
                brightness,
                source_l,
                source_m,
                source_n,
                jones.row(s1),
                jones.row(s2)
            )
            .for_each(|(&b, &l, &m, &n, &j1, &j2)| {
                let t = du * l + dv * m + dw * (n - F::one());
                let weight = Complex::cis(F::TAU() * t) * sinc(F::PI() * params.frac_bandwidth * t);
                sum += (j1 * b * j2.h()) * weight;
            });
            *vis_out += sum;
        });
}
