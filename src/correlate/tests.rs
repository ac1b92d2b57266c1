// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests on cross-correlation.

use approx::assert_abs_diff_eq;
use marlu::{c32, c64, Jones};

use super::*;
use crate::{
    buffer::Precision,
    math::{baseline_index, num_baselines},
};

fn sources_double(flux: &[f64], lmns: &[(f64, f64, f64)]) -> SourceArrays {
    SourceArrays {
        brightness: DataArray::from_vec(flux.to_vec()),
        l: DataArray::from_vec(lmns.iter().map(|x| x.0).collect()),
        m: DataArray::from_vec(lmns.iter().map(|x| x.1).collect()),
        n: DataArray::from_vec(lmns.iter().map(|x| x.2).collect()),
    }
}

fn stations_double(uvws: &[(f64, f64, f64)]) -> StationArrays {
    StationArrays {
        u: DataArray::from_vec(uvws.iter().map(|x| x.0).collect()),
        v: DataArray::from_vec(uvws.iter().map(|x| x.1).collect()),
        w: DataArray::from_vec(uvws.iter().map(|x| x.2).collect()),
    }
}

fn vis_scalar_double(num_stations: usize) -> DataArray {
    DataArray::zeros(
        ElemType::Complex,
        Precision::Double,
        MemType::Host,
        num_baselines(num_stations),
    )
    .unwrap()
}

fn open_params() -> CorrelateParams {
    CorrelateParams {
        uv_min_lambda: 0.0,
        uv_max_lambda: f64::MAX,
        inv_wavelength: 1.0,
        frac_bandwidth: 0.0,
    }
}

/// The measurement-equation sum evaluated longhand for one baseline, used
/// as an independent check of the kernels.
fn expected_scalar(
    station1: (f64, f64, f64),
    station2: (f64, f64, f64),
    per_source: &[((f64, f64, f64), f64, c64, c64)],
    params: &CorrelateParams,
) -> c64 {
    let du = (station1.0 - station2.0) * params.inv_wavelength;
    let dv = (station1.1 - station2.1) * params.inv_wavelength;
    let dw = (station1.2 - station2.2) * params.inv_wavelength;
    let uv_len = f64::hypot(du, dv);
    if uv_len < params.uv_min_lambda || uv_len > params.uv_max_lambda {
        return c64::new(0.0, 0.0);
    }
    let mut sum = c64::new(0.0, 0.0);
    for &((l, m, n), flux, j1, j2) in per_source {
        let t = du * l + dv * m + dw * (n - 1.0);
        let smear = crate::math::sinc(std::f64::consts::PI * params.frac_bandwidth * t);
        sum += j1 * j2.conj() * c64::cis(std::f64::consts::TAU * t) * (flux * smear);
    }
    sum
}

#[test]
fn point_source_at_phase_centre_gives_unit_visibility() {
    let sources = sources_double(&[1.0], &[(0.0, 0.0, 1.0)]);
    let stations = stations_double(&[(0.0, 0.0, 0.0), (120.0, -45.0, 10.0)]);
    let jones = DataArray::from_vec(vec![c64::new(1.0, 0.0); 2]);
    let mut vis = vis_scalar_double(2);

    let n = cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()).unwrap();
    assert_eq!(n, 1);
    assert_abs_diff_eq!(vis.as_slice::<c64>().unwrap()[0], c64::new(1.0, 0.0));
}

#[test]
fn station_jones_gains_multiply_into_the_visibility() {
    let sources = sources_double(&[1.0], &[(0.0, 0.0, 1.0)]);
    let stations = stations_double(&[(0.0, 0.0, 0.0), (120.0, -45.0, 10.0)]);
    let jones = DataArray::from_vec(vec![c64::new(2.0, 0.0), c64::new(3.0, 0.0)]);
    let mut vis = vis_scalar_double(2);

    cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()).unwrap();
    assert_abs_diff_eq!(vis.as_slice::<c64>().unwrap()[0], c64::new(6.0, 0.0));
}

#[test]
fn sources_sum_over_the_source_dimension() {
    let sources = sources_double(&[1.0, 1.0], &[(0.0, 0.0, 1.0), (0.0, 0.0, 1.0)]);
    let stations = stations_double(&[(0.0, 0.0, 0.0), (120.0, -45.0, 10.0)]);
    // Station-major Jones table: 2 stations x 2 sources.
    let jones = DataArray::from_vec(vec![c64::new(1.0, 0.0); 4]);
    let mut vis = vis_scalar_double(2);

    cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()).unwrap();
    assert_abs_diff_eq!(vis.as_slice::<c64>().unwrap()[0], c64::new(2.0, 0.0));
}

#[test]
fn repeated_invocations_accumulate() {
    let sources = sources_double(&[1.0], &[(0.0, 0.0, 1.0)]);
    let stations = stations_double(&[(0.0, 0.0, 0.0), (120.0, -45.0, 10.0)]);
    let jones = DataArray::from_vec(vec![c64::new(1.0, 0.0); 2]);
    let mut vis = vis_scalar_double(2);

    cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()).unwrap();
    cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()).unwrap();
    assert_abs_diff_eq!(vis.as_slice::<c64>().unwrap()[0], c64::new(2.0, 0.0));
}

#[test]
fn gated_baselines_read_exactly_zero() {
    // Big fluxes would leak through as near-zero junk if the gate merely
    // attenuated; it must skip the pair entirely.
    let sources = sources_double(&[1e12], &[(0.1, 0.2, 0.974_679_434_480_896_2)]);
    let stations = stations_double(&[(0.0, 0.0, 0.0), (300.0, 400.0, 10.0)]);
    let jones = DataArray::from_vec(vec![c64::new(1.0, 0.0); 2]);
    let mut vis = vis_scalar_double(2);

    let params = CorrelateParams {
        uv_min_lambda: 0.0,
        uv_max_lambda: 0.0,
        ..open_params()
    };
    cross_correlate(&mut vis, &jones, &sources, &stations, &params).unwrap();
    let out = vis.as_slice::<c64>().unwrap()[0];
    assert_eq!(out.re, 0.0);
    assert_eq!(out.im, 0.0);
}

#[test]
fn uv_cutoff_boundary_is_inclusive() {
    // The baseline length is exactly 5 wavelengths; a [5, 5] window keeps
    // it.
    let sources = sources_double(&[1.0], &[(0.0, 0.0, 1.0)]);
    let stations = stations_double(&[(3.0, 4.0, 0.0), (0.0, 0.0, 0.0)]);
    let jones = DataArray::from_vec(vec![c64::new(1.0, 0.0); 2]);
    let mut vis = vis_scalar_double(2);

    let params = CorrelateParams {
        uv_min_lambda: 5.0,
        uv_max_lambda: 5.0,
        ..open_params()
    };
    cross_correlate(&mut vis, &jones, &sources, &stations, &params).unwrap();
    assert_abs_diff_eq!(vis.as_slice::<c64>().unwrap()[0], c64::new(1.0, 0.0));
}

#[test]
fn zero_fractional_bandwidth_matches_the_phase_only_sum() {
    let lmn = (0.05, -0.03, (1.0_f64 - 0.05 * 0.05 - 0.03 * 0.03).sqrt());
    let s1 = (40.0, -10.0, 3.0);
    let s2 = (-15.0, 25.0, -1.0);
    let j1 = c64::new(0.9, 0.1);
    let j2 = c64::new(1.1, -0.2);

    let sources = sources_double(&[2.0], &[lmn]);
    let stations = stations_double(&[s1, s2]);
    let jones = DataArray::from_vec(vec![j1, j2]);
    let mut vis = vis_scalar_double(2);

    cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()).unwrap();
    let expected = expected_scalar(s1, s2, &[(lmn, 2.0, j1, j2)], &open_params());
    assert_abs_diff_eq!(vis.as_slice::<c64>().unwrap()[0], expected, epsilon = 1e-12);
}

#[test]
fn bandwidth_smearing_attenuates_off_centre_sources() {
    let lmn = (0.05, -0.03, (1.0_f64 - 0.05 * 0.05 - 0.03 * 0.03).sqrt());
    let s1 = (40.0, -10.0, 3.0);
    let s2 = (-15.0, 25.0, -1.0);
    let j = c64::new(1.0, 0.0);

    let sources = sources_double(&[1.0], &[lmn]);
    let stations = stations_double(&[s1, s2]);
    let jones = DataArray::from_vec(vec![j, j]);

    let smeared_params = CorrelateParams {
        frac_bandwidth: 0.2,
        ..open_params()
    };
    let mut smeared = vis_scalar_double(2);
    cross_correlate(&mut smeared, &jones, &sources, &stations, &smeared_params).unwrap();
    let mut unsmeared = vis_scalar_double(2);
    cross_correlate(&mut unsmeared, &jones, &sources, &stations, &open_params()).unwrap();

    let smeared = smeared.as_slice::<c64>().unwrap()[0];
    let unsmeared = unsmeared.as_slice::<c64>().unwrap()[0];
    assert!(smeared.norm() < unsmeared.norm());

    let expected = expected_scalar(s1, s2, &[(lmn, 1.0, j, j)], &smeared_params);
    assert_abs_diff_eq!(smeared, expected, epsilon = 1e-12);
}

#[test]
fn baseline_ordering_is_lower_triangular_over_the_second_station() {
    // Distinct real gains make every pair's product unique: visibilities
    // land at j (j - 1) / 2 + i.
    let gains = [2.0, 3.0, 5.0];
    let sources = sources_double(&[1.0], &[(0.0, 0.0, 1.0)]);
    let stations = stations_double(&[(0.0, 0.0, 0.0), (50.0, 0.0, 0.0), (0.0, 80.0, 0.0)]);
    let jones = DataArray::from_vec(gains.iter().map(|&g| c64::new(g, 0.0)).collect::<Vec<_>>());
    let mut vis = vis_scalar_double(3);

    let n = cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()).unwrap();
    assert_eq!(n, 3);
    let vis = vis.as_slice::<c64>().unwrap();
    for s2 in 0..3 {
        for s1 in 0..s2 {
            assert_abs_diff_eq!(
                vis[baseline_index(s1, s2)],
                c64::new(gains[s1] * gains[s2], 0.0)
            );
        }
    }
}

#[test]
fn identity_jones_reproduces_the_brightness_matrix() {
    let b = Jones::from([
        c64::new(11.0, 0.0),
        c64::new(2.0, 0.5),
        c64::new(2.0, -0.5),
        c64::new(9.0, 0.0),
    ]);
    let sources = SourceArrays {
        brightness: DataArray::from_vec(vec![b]),
        l: DataArray::from_vec(vec![0.0_f64]),
        m: DataArray::from_vec(vec![0.0_f64]),
        n: DataArray::from_vec(vec![1.0_f64]),
    };
    let stations = stations_double(&[(0.0, 0.0, 0.0), (120.0, -45.0, 10.0)]);
    let jones = DataArray::from_vec(vec![Jones::<f64>::identity(); 2]);
    let mut vis =
        DataArray::zeros(ElemType::Matrix, Precision::Double, MemType::Host, 1).unwrap();

    cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()).unwrap();
    assert_abs_diff_eq!(vis.as_slice::<Jones<f64>>().unwrap()[0], b);
}

#[test]
fn scalar_and_matrix_modes_agree_for_unpolarised_sources() {
    let lmn = (0.02, 0.07, (1.0_f64 - 0.02 * 0.02 - 0.07 * 0.07).sqrt());
    let s1 = (40.0, -10.0, 3.0);
    let s2 = (-15.0, 25.0, -1.0);

    let sources = sources_double(&[4.0], &[lmn]);
    let stations = stations_double(&[s1, s2]);
    let jones_scalar = DataArray::from_vec(vec![c64::new(1.0, 0.0); 2]);
    let mut vis_scalar = vis_scalar_double(2);
    cross_correlate(
        &mut vis_scalar,
        &jones_scalar,
        &sources,
        &stations,
        &open_params(),
    )
    .unwrap();

    let sources_pol = SourceArrays {
        brightness: DataArray::from_vec(vec![Jones::<f64>::identity() * 4.0]),
        l: DataArray::from_vec(vec![lmn.0]),
        m: DataArray::from_vec(vec![lmn.1]),
        n: DataArray::from_vec(vec![lmn.2]),
    };
    let jones_matrix = DataArray::from_vec(vec![Jones::<f64>::identity(); 2]);
    let mut vis_matrix =
        DataArray::zeros(ElemType::Matrix, Precision::Double, MemType::Host, 1).unwrap();
    cross_correlate(
        &mut vis_matrix,
        &jones_matrix,
        &sources_pol,
        &stations,
        &open_params(),
    )
    .unwrap();

    let scalar = vis_scalar.as_slice::<c64>().unwrap()[0];
    let matrix = vis_matrix.as_slice::<Jones<f64>>().unwrap()[0];
    assert_abs_diff_eq!(matrix[0], scalar, epsilon = 1e-12);
    assert_abs_diff_eq!(matrix[3], scalar, epsilon = 1e-12);
    assert_abs_diff_eq!(matrix[1], c64::new(0.0, 0.0), epsilon = 1e-12);
    assert_abs_diff_eq!(matrix[2], c64::new(0.0, 0.0), epsilon = 1e-12);
}

#[test]
fn single_precision_runs_the_same_algorithm() {
    let lmns = [
        (0.0, 0.0, 1.0),
        (0.01, -0.02, (1.0_f64 - 0.01 * 0.01 - 0.02 * 0.02).sqrt()),
        (-0.03, 0.015, (1.0_f64 - 0.03 * 0.03 - 0.015 * 0.015).sqrt()),
    ];
    let fluxes = [1.0, 2.5, 0.75];
    let uvws = [(0.0, 0.0, 0.0), (60.0, -20.0, 5.0), (-30.0, 45.0, -2.0)];

    let sources = sources_double(&fluxes, &lmns);
    let stations = stations_double(&uvws);
    let jones = DataArray::from_vec(vec![c64::new(1.0, 0.0); 9]);
    let mut vis = vis_scalar_double(3);
    cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()).unwrap();

    let sources_single = SourceArrays {
        brightness: DataArray::from_vec(fluxes.iter().map(|&x| x as f32).collect::<Vec<_>>()),
        l: DataArray::from_vec(lmns.iter().map(|x| x.0 as f32).collect::<Vec<_>>()),
        m: DataArray::from_vec(lmns.iter().map(|x| x.1 as f32).collect::<Vec<_>>()),
        n: DataArray::from_vec(lmns.iter().map(|x| x.2 as f32).collect::<Vec<_>>()),
    };
    let stations_single = StationArrays {
        u: DataArray::from_vec(uvws.iter().map(|x| x.0 as f32).collect::<Vec<_>>()),
        v: DataArray::from_vec(uvws.iter().map(|x| x.1 as f32).collect::<Vec<_>>()),
        w: DataArray::from_vec(uvws.iter().map(|x| x.2 as f32).collect::<Vec<_>>()),
    };
    let jones_single = DataArray::from_vec(vec![c32::new(1.0, 0.0); 9]);
    let mut vis_single = DataArray::zeros(
        ElemType::Complex,
        Precision::Single,
        MemType::Host,
        num_baselines(3),
    )
    .unwrap();
    cross_correlate(
        &mut vis_single,
        &jones_single,
        &sources_single,
        &stations_single,
        &open_params(),
    )
    .unwrap();

    for (double, single) in vis
        .as_slice::<c64>()
        .unwrap()
        .iter()
        .zip(vis_single.as_slice::<c32>().unwrap())
    {
        assert_abs_diff_eq!(double.re, single.re as f64, epsilon = 1e-4);
        assert_abs_diff_eq!(double.im, single.im as f64, epsilon = 1e-4);
    }
}

#[test]
fn mismatched_precisions_are_rejected() {
    let sources = sources_double(&[1.0], &[(0.0, 0.0, 1.0)]);
    let stations = StationArrays {
        u: DataArray::from_vec(vec![0.0_f32, 100.0]),
        v: DataArray::from_vec(vec![0.0_f32, 0.0]),
        w: DataArray::from_vec(vec![0.0_f32, 0.0]),
    };
    let jones = DataArray::from_vec(vec![c64::new(1.0, 0.0); 2]);
    let mut vis = vis_scalar_double(2);

    assert!(matches!(
        cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()),
        Err(CorrelateError::TypeMismatch)
    ));
}

#[test]
fn incompatible_jones_kind_is_rejected() {
    let sources = sources_double(&[1.0], &[(0.0, 0.0, 1.0)]);
    let stations = stations_double(&[(0.0, 0.0, 0.0), (100.0, 0.0, 0.0)]);
    // A matrix-valued Jones table cannot feed a scalar visibility buffer.
    let jones = DataArray::from_vec(vec![Jones::<f64>::identity(); 2]);
    let mut vis = vis_scalar_double(2);

    assert!(matches!(
        cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()),
        Err(CorrelateError::BadDataType { buffer: "jones", .. })
    ));
}

#[test]
fn real_visibility_buffers_are_rejected() {
    let sources = sources_double(&[1.0], &[(0.0, 0.0, 1.0)]);
    let stations = stations_double(&[(0.0, 0.0, 0.0), (100.0, 0.0, 0.0)]);
    let jones = DataArray::from_vec(vec![c64::new(1.0, 0.0); 2]);
    let mut vis = DataArray::zeros(ElemType::Real, Precision::Double, MemType::Host, 1).unwrap();

    assert!(matches!(
        cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()),
        Err(CorrelateError::BadDataType {
            buffer: "visibility",
            ..
        })
    ));
}

#[test]
fn wrong_visibility_length_is_rejected_without_writing() {
    let sources = sources_double(&[1.0], &[(0.0, 0.0, 1.0)]);
    let stations = stations_double(&[(0.0, 0.0, 0.0), (100.0, 0.0, 0.0), (0.0, 50.0, 0.0)]);
    let jones = DataArray::from_vec(vec![c64::new(1.0, 0.0); 3]);
    // 3 stations need 3 baselines; supply 2.
    let mut vis = DataArray::zeros(ElemType::Complex, Precision::Double, MemType::Host, 2).unwrap();

    assert!(matches!(
        cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()),
        Err(CorrelateError::DimensionMismatch {
            buffer: "visibility",
            expected: 3,
            found: 2,
        })
    ));
    assert!(vis
        .as_slice::<c64>()
        .unwrap()
        .iter()
        .all(|&x| x == c64::new(0.0, 0.0)));
}

#[test]
fn jones_table_length_must_cover_every_station_source_pair() {
    let sources = sources_double(&[1.0, 1.0], &[(0.0, 0.0, 1.0), (0.0, 0.0, 1.0)]);
    let stations = stations_double(&[(0.0, 0.0, 0.0), (100.0, 0.0, 0.0)]);
    let jones = DataArray::from_vec(vec![c64::new(1.0, 0.0); 3]);
    let mut vis = vis_scalar_double(2);

    assert!(matches!(
        cross_correlate(&mut vis, &jones, &sources, &stations, &open_params()),
        Err(CorrelateError::DimensionMismatch {
            buffer: "jones",
            expected: 4,
            found: 3,
        })
    ));
}
