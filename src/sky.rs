// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sky-source inputs for the correlator.
//!
//! The correlator consumes per-source quantities as parallel buffers, one
//! per physical quantity. [`SourceArrays`] groups those buffers, and the
//! constructors here build them from a catalogue of [`SkyComponent`]s,
//! turning sky positions into direction cosines relative to the phase
//! centre.

use marlu::{c32, c64, Jones, RADec, LMN};

use crate::buffer::{DataArray, Precision};

/// Stokes flux densities of one source \[Jy\].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StokesFlux {
    pub i: f64,
    pub q: f64,
    pub u: f64,
    pub v: f64,
}

/// One sky-model source: a position and its flux.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyComponent {
    pub radec: RADec,
    pub flux: StokesFlux,
}

/// Per-source buffers consumed by the correlator: brightness and direction
/// cosines, all sharing the number of sources as their length.
///
/// In scalar mode the brightness buffer holds real Stokes I values; in
/// polarised mode it holds 2x2 brightness matrices. Loaders may fill the
/// fields directly; the correlator validates lengths and tags but does not
/// repair them.
pub struct SourceArrays {
    pub brightness: DataArray,
    pub l: DataArray,
    pub m: DataArray,
    pub n: DataArray,
}

impl SourceArrays {
    pub fn num_sources(&self) -> usize {
        self.l.len()
    }

    /// Build host-resident source buffers for scalar (Stokes I) correlation.
    pub fn unpolarised(
        components: &[SkyComponent],
        phase_centre: RADec,
        precision: Precision,
    ) -> SourceArrays {
        let lmns = lmns(components, phase_centre);
        let brightness: Vec<f64> = components.iter().map(|c| c.flux.i).collect();
        match precision {
            Precision::Double => SourceArrays {
                brightness: DataArray::from_vec(brightness),
                l: DataArray::from_vec(lmns.iter().map(|x| x.l).collect()),
                m: DataArray::from_vec(lmns.iter().map(|x| x.m).collect()),
                n: DataArray::from_vec(lmns.iter().map(|x| x.n).collect()),
            },
            Precision::Single => SourceArrays {
                brightness: DataArray::from_vec(
                    brightness.iter().map(|&x| x as f32).collect::<Vec<_>>(),
                ),
                l: DataArray::from_vec(lmns.iter().map(|x| x.l as f32).collect::<Vec<_>>()),
                m: DataArray::from_vec(lmns.iter().map(|x| x.m as f32).collect::<Vec<_>>()),
                n: DataArray::from_vec(lmns.iter().map(|x| x.n as f32).collect::<Vec<_>>()),
            },
        }
    }

    /// Build host-resident source buffers for polarised (2x2 matrix)
    /// correlation. Stokes parameters become linear-feed brightness
    /// matrices `[[I+Q, U+iV], [U-iV, I-Q]]`.
    pub fn polarised(
        components: &[SkyComponent],
        phase_centre: RADec,
        precision: Precision,
    ) -> SourceArrays {
        let lmns = lmns(components, phase_centre);
        match precision {
            Precision::Double => SourceArrays {
                brightness: DataArray::from_vec(
                    components
                        .iter()
                        .map(|c| brightness_matrix(c.flux))
                        .collect::<Vec<_>>(),
                ),
                l: DataArray::from_vec(lmns.iter().map(|x| x.l).collect()),
                m: DataArray::from_vec(lmns.iter().map(|x| x.m).collect()),
                n: DataArray::from_vec(lmns.iter().map(|x| x.n).collect()),
            },
            Precision::Single => SourceArrays {
                brightness: DataArray::from_vec(
                    components
                        .iter()
                        .map(|c| demote(brightness_matrix(c.flux)))
                        .collect::<Vec<_>>(),
                ),
                l: DataArray::from_vec(lmns.iter().map(|x| x.l as f32).collect::<Vec<_>>()),
                m: DataArray::from_vec(lmns.iter().map(|x| x.m as f32).collect::<Vec<_>>()),
                n: DataArray::from_vec(lmns.iter().map(|x| x.n as f32).collect::<Vec<_>>()),
            },
        }
    }
}

fn lmns(components: &[SkyComponent], phase_centre: RADec) -> Vec<LMN> {
    components
        .iter()
        .map(|c| c.radec.to_lmn(phase_centre))
        .collect()
}

fn brightness_matrix(flux: StokesFlux) -> Jones<f64> {
    let StokesFlux { i, q, u, v } = flux;
    Jones::from([
        c64::new(i + q, 0.0),
        c64::new(u, v),
        c64::new(u, -v),
        c64::new(i - q, 0.0),
    ])
}

fn demote(j: Jones<f64>) -> Jones<f32> {
    Jones::from([
        c32::new(j[0].re as f32, j[0].im as f32),
        c32::new(j[1].re as f32, j[1].im as f32),
        c32::new(j[2].re as f32, j[2].im as f32),
        c32::new(j[3].re as f32, j[3].im as f32),
    ])
}
