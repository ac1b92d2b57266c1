// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Station-coordinate inputs for the correlator.
//!
//! The correlator wants per-station (u, v, w) in metres as parallel
//! buffers; the kernel forms baselines by differencing station pairs and
//! scaling by the inverse wavelength.

use marlu::{HADec, XyzGeodetic, UVW};

use crate::buffer::{DataArray, Precision};

/// Per-station coordinate buffers, all sharing the number of stations as
/// their length.
pub struct StationArrays {
    pub u: DataArray,
    pub v: DataArray,
    pub w: DataArray,
}

impl StationArrays {
    pub fn num_stations(&self) -> usize {
        self.u.len()
    }

    /// Build host-resident station buffers from per-station [`UVW`]s
    /// \[metres\].
    pub fn from_uvws(uvws: &[UVW], precision: Precision) -> StationArrays {
        match precision {
            Precision::Double => StationArrays {
                u: DataArray::from_vec(uvws.iter().map(|x| x.u).collect()),
                v: DataArray::from_vec(uvws.iter().map(|x| x.v).collect()),
                w: DataArray::from_vec(uvws.iter().map(|x| x.w).collect()),
            },
            Precision::Single => StationArrays {
                u: DataArray::from_vec(uvws.iter().map(|x| x.u as f32).collect::<Vec<_>>()),
                v: DataArray::from_vec(uvws.iter().map(|x| x.v as f32).collect::<Vec<_>>()),
                w: DataArray::from_vec(uvws.iter().map(|x| x.w as f32).collect::<Vec<_>>()),
            },
        }
    }

    /// Build host-resident station buffers by projecting geodetic station
    /// positions towards the phase centre.
    pub fn from_xyzs(
        xyzs: &[XyzGeodetic],
        phase_centre: HADec,
        precision: Precision,
    ) -> StationArrays {
        let (s_ha, c_ha) = phase_centre.ha.sin_cos();
        let (s_dec, c_dec) = phase_centre.dec.sin_cos();
        let uvws: Vec<UVW> = xyzs
            .iter()
            .map(|&xyz| UVW::from_xyz_inner(xyz, s_ha, c_ha, s_dec, c_dec))
            .collect();
        StationArrays::from_uvws(&uvws, precision)
    }
}
