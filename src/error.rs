// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all fringecast-related errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FringecastError {
    #[error("{0}")]
    Buffer(#[from] crate::buffer::BufferError),

    #[error("{0}")]
    Correlate(#[from] crate::correlate::CorrelateError),
}
