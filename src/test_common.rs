//! Helpers for generating synthetic visibility sets and images, shared
//! by unit tests, integration tests and benchmarks.

use marlu::RADec;

use crate::{
    ndarray::{Array1, Array2, Array3, Array4},
    types::{Image, ImageWcs, Visibility},
    Complex,
};

/// The phase centre every synthetic object is built around.
pub fn test_phase_centre() -> RADec {
    RADec::from_degrees(15.0, -45.0)
}

/// Deterministic pseudo random stream in [-1, 1), good enough for
/// scattering baselines.
fn lcg(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (*state >> 33) as f64 / (1u64 << 30) as f64 - 1.0
}

/// A visibility set with pseudo random baselines up to 20 km, rows
/// grouped four per timestamp, unit weights and smoothly varying
/// amplitudes.
pub fn synthetic_visibility(num_rows: usize, num_chans: usize, num_pols: usize) -> Visibility {
    let mut state = 0x5eed_u64;
    let mut uvw = Array2::zeros((num_rows, 3));
    for mut row in uvw.outer_iter_mut() {
        row[0] = 20_000.0 * lcg(&mut state);
        row[1] = 20_000.0 * lcg(&mut state);
        row[2] = 100.0 * lcg(&mut state);
    }
    let time = Array1::from_shape_fn(num_rows, |row| (row / 4) as f64 * 10.0);
    let antenna1: Vec<usize> = (0..num_rows).map(|row| row % 7).collect();
    let antenna2: Vec<usize> = (0..num_rows).map(|row| (row + 1) % 7).collect();
    let vis = Array3::from_shape_fn((num_rows, num_chans, num_pols), |(row, chan, _)| {
        Complex::new(1.0 + 0.1 * row as f64, 0.05 * row as f64 - 0.02 * chan as f64)
    });
    let weight = Array3::ones((num_rows, num_chans, num_pols));
    let imaging_weight = Array3::ones((num_rows, num_chans, num_pols));
    let frequency = (0..num_chans).map(|chan| 1.5e8 + 1e6 * chan as f64).collect();

    Visibility::new(
        uvw,
        time,
        antenna1,
        antenna2,
        vis,
        weight,
        imaging_weight,
        frequency,
        test_phase_centre(),
        "synthetic".to_string(),
    )
    .expect("synthetic arrays are shape consistent")
}

/// An empty image with a SIN wcs centred on the test phase centre.
/// `cell` is the pixel increment in radians.
pub fn synthetic_image(nchan: usize, npol: usize, ny: usize, nx: usize, cell: f64) -> Image {
    Image {
        data: Array4::zeros((nchan, npol, ny, nx)),
        wcs: ImageWcs {
            crpix: [(nx / 2) as f64, (ny / 2) as f64],
            cdelt: [-cell, cell],
            crval: test_phase_centre(),
            frequencies: (0..nchan).map(|chan| 1.5e8 + 1e6 * chan as f64).collect(),
        },
    }
}

/// A synthetic image with a single point source of the given flux at
/// the centre pixel of every plane.
pub fn centre_point_image(
    nchan: usize,
    npol: usize,
    ny: usize,
    nx: usize,
    cell: f64,
    flux: f64,
) -> Image {
    let mut im = synthetic_image(nchan, npol, ny, nx, cell);
    for chan in 0..nchan {
        for pol in 0..npol {
            im.data[[chan, pol, ny / 2, nx / 2]] = flux;
        }
    }
    im
}
