// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Visibility simulation engine for radio interferometers.

`fringecast` provides two tightly-coupled subsystems: a typed numeric buffer
([`DataArray`]) that can live in host or device memory in single or double
precision, and a correlation engine ([`correlate::cross_correlate`]) that
consumes such buffers to evaluate the interferometer measurement equation
over all station pairs.

Device-resident buffers and device correlation require the `cuda` or `hip`
feature.
 */

pub mod buffer;
pub mod correlate;
mod error;
pub mod math;
pub mod sky;
pub mod station;

#[cfg(any(feature = "cuda", feature = "hip"))]
pub(crate) mod gpu;

// Re-exports.
pub use buffer::{BufferError, DataArray, ElemType, MemType, Precision};
pub use correlate::{cross_correlate, CorrelateError, CorrelateParams};
pub use error::FringecastError;
pub use sky::{SkyComponent, SourceArrays, StokesFlux};
pub use station::StationArrays;

// External re-exports.
pub use marlu;
pub use marlu::{c32, c64, Jones};
