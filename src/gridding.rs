//! Convolutional gridding and degridding inner loops.

use marlu::{constants::VEL_C, rayon};
use rayon::prelude::*;

use crate::{
    kernel::{ConvKernel, WKernelTable},
    ndarray::{Array2, Array4, ArrayView2, ArrayView3, ArrayViewMut3, Axis},
    Complex,
};

/// The resolved kernel mode, hiding fixed versus variable kernel
/// selection behind a single per-row lookup.
#[derive(Clone, Debug)]
pub enum GridKernel {
    /// one kernel for every row
    Fixed(ConvKernel),
    /// kernel chosen per row by its w in wavelengths
    WProjection(WKernelTable),
    /// the standard kernel per row, conjugated for rows below the
    /// w = 0 plane
    StandardByRow(ConvKernel),
}

impl GridKernel {
    /// Kernel and conjugation flag for one row.
    pub fn select(&self, w_lambda: f64) -> (&ConvKernel, bool) {
        match self {
            GridKernel::Fixed(kernel) => (kernel, false),
            GridKernel::WProjection(table) => table.plane(w_lambda),
            GridKernel::StandardByRow(kernel) => (kernel, w_lambda < 0.0),
        }
    }

    /// The kernel support in grid cells, maximised over planes.
    pub fn max_support(&self) -> usize {
        match self {
            GridKernel::Fixed(kernel) | GridKernel::StandardByRow(kernel) => kernel.support,
            GridKernel::WProjection(table) => {
                table.planes.iter().map(|k| k.support).max().unwrap_or(0)
            }
        }
    }
}

/// Map a scaled baseline coordinate `p` in `[-0.5, 0.5)` of the grid
/// width onto an integer grid cell and an oversampling sub cell.
pub fn frac_coord(npixel: usize, oversampling: usize, p: f64) -> (isize, usize) {
    let x = (npixel / 2) as f64 + p * npixel as f64;
    let mut cell = (x + 0.5 / oversampling as f64).floor();
    let mut frac = ((x - cell) * oversampling as f64).round() as isize;
    // round() rounds half away from zero, so the boundaries of the first
    // and last sub cell need fixing up
    if frac == -1 {
        frac = 0;
    }
    if frac == oversampling as isize {
        cell += 1.0;
        frac = 0;
    }
    (cell as isize, frac as usize)
}

/// Spread weighted visibility values onto a uv grid.
///
/// `grid` is `[chan, pol, ny, nx]`, `values` and `weights` are
/// `[row, chan, pol]`, `uvw` is `[row, 3]` in metres and `uvscale` is
/// `[2, nchan]`. Rows whose kernel footprint falls outside the grid are
/// skipped. Returns the summed weights per `[chan, pol]` over the rows
/// that were gridded.
pub fn grid_visibilities(
    grid: &mut Array4<Complex<f64>>,
    uvw: ArrayView2<f64>,
    uvscale: ArrayView2<f64>,
    values: ArrayView3<Complex<f64>>,
    weights: ArrayView3<f64>,
    kernel: &GridKernel,
    frequency: &[f64],
) -> Array2<f64> {
    let (nchan, npol, ny, nx) = grid.dim();
    let num_rows = uvw.len_of(Axis(0));
    let mut sumwt = Array2::zeros((nchan, npol));

    grid.outer_iter_mut()
        .into_par_iter()
        .zip(sumwt.outer_iter_mut().into_par_iter())
        .enumerate()
        .for_each(|(chan, (mut grid_plane, mut sumwt_row))| {
            for row in 0..num_rows {
                let (y, yf) = frac_coord(ny, kernel_oversampling(kernel), uvscale[[1, chan]] * uvw[[row, 1]]);
                let (x, xf) = frac_coord(nx, kernel_oversampling(kernel), uvscale[[0, chan]] * uvw[[row, 0]]);
                let w_lambda = uvw[[row, 2]] * frequency[chan] / VEL_C;
                let (conv, conjugate) = kernel.select(w_lambda);
                let support = conv.support as isize;
                if y - support < 0
                    || y + support >= ny as isize
                    || x - support < 0
                    || x + support >= nx as isize
                {
                    continue;
                }
                for pol in 0..npol {
                    let weight = weights[[row, chan, pol]];
                    let value = values[[row, chan, pol]] * weight;
                    for j in 0..conv.width() {
                        let gy = (y - support) as usize + j;
                        for i in 0..conv.width() {
                            let gx = (x - support) as usize + i;
                            let tap = conv.data[[yf, xf, j, i]];
                            // grid with the conjugate of the sampling
                            // kernel; degrid uses the kernel itself
                            let tap = if conjugate { tap } else { tap.conj() };
                            grid_plane[[pol, gy, gx]] += tap * value;
                        }
                    }
                    sumwt_row[pol] += weight;
                }
            }
        });

    sumwt
}

/// Interpolate visibility values off a uv grid, overwriting `vis`.
/// Rows whose kernel footprint falls outside the grid get zero.
pub fn degrid_visibilities(
    mut vis: ArrayViewMut3<Complex<f64>>,
    grid: &Array4<Complex<f64>>,
    uvw: ArrayView2<f64>,
    uvscale: ArrayView2<f64>,
    kernel: &GridKernel,
    frequency: &[f64],
) {
    let (_, npol, ny, nx) = grid.dim();
    vis.outer_iter_mut()
        .into_par_iter()
        .enumerate()
        .for_each(|(row, mut row_vis)| {
            for (chan, mut row_chan) in row_vis.outer_iter_mut().enumerate() {
                let (y, yf) = frac_coord(ny, kernel_oversampling(kernel), uvscale[[1, chan]] * uvw[[row, 1]]);
                let (x, xf) = frac_coord(nx, kernel_oversampling(kernel), uvscale[[0, chan]] * uvw[[row, 0]]);
                let w_lambda = uvw[[row, 2]] * frequency[chan] / VEL_C;
                let (conv, conjugate) = kernel.select(w_lambda);
                let support = conv.support as isize;
                if y - support < 0
                    || y + support >= ny as isize
                    || x - support < 0
                    || x + support >= nx as isize
                {
                    row_chan.fill(Complex::new(0.0, 0.0));
                    continue;
                }
                for pol in 0..npol {
                    let mut sum = Complex::new(0.0, 0.0);
                    for j in 0..conv.width() {
                        let gy = (y - support) as usize + j;
                        for i in 0..conv.width() {
                            let gx = (x - support) as usize + i;
                            let tap = conv.data[[yf, xf, j, i]];
                            let tap = if conjugate { tap.conj() } else { tap };
                            sum += tap * grid[[chan, pol, gy, gx]];
                        }
                    }
                    row_chan[pol] = sum;
                }
            }
        });
}

/// Sample density per grid cell, for uniform weighting. Nearest cell
/// accumulation, no convolution.
pub fn density_grid(
    shape: (usize, usize, usize, usize),
    uvw: ArrayView2<f64>,
    uvscale: ArrayView2<f64>,
    weights: ArrayView3<f64>,
) -> Array4<f64> {
    let (nchan, npol, ny, nx) = shape;
    let num_rows = uvw.len_of(Axis(0));
    let mut density = Array4::zeros(shape);
    for chan in 0..nchan {
        for row in 0..num_rows {
            let (y, _) = frac_coord(ny, 1, uvscale[[1, chan]] * uvw[[row, 1]]);
            let (x, _) = frac_coord(nx, 1, uvscale[[0, chan]] * uvw[[row, 0]]);
            if y < 0 || y >= ny as isize || x < 0 || x >= nx as isize {
                continue;
            }
            for pol in 0..npol {
                density[[chan, pol, y as usize, x as usize]] += weights[[row, chan, pol]];
            }
        }
    }
    density
}

fn kernel_oversampling(kernel: &GridKernel) -> usize {
    match kernel {
        GridKernel::Fixed(k) | GridKernel::StandardByRow(k) => k.oversampling,
        GridKernel::WProjection(table) => table.planes[0].oversampling,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        kernel::{KernelProvider, SpheroidalKernels},
        ndarray::{Array3, Array4},
    };

    #[test]
    fn test_frac_coord_centre_and_fractions() {
        // p = 0 lands on the centre cell with no fractional offset
        assert_eq!(frac_coord(64, 8, 0.0), (32, 0));
        // half a cell up: cell 32, sub cell 4
        assert_eq!(frac_coord(64, 8, 0.5 / 64.0), (32, 4));
        // just under the next cell rounds into it
        assert_eq!(frac_coord(64, 8, (1.0 - 0.01) / 64.0), (33, 0));
        // negative offsets walk down through the previous cell
        let (cell, frac) = frac_coord(64, 8, -0.25 / 64.0);
        assert_eq!(cell, 31);
        assert_eq!(frac, 6);
    }

    #[test]
    fn test_frac_coord_oversampling_one() {
        assert_eq!(frac_coord(64, 1, 0.0), (32, 0));
        assert_eq!(frac_coord(64, 1, 0.4 / 64.0), (32, 0));
        assert_eq!(frac_coord(64, 1, 0.6 / 64.0), (33, 0));
    }

    fn fixed_kernel() -> GridKernel {
        let (_, kernel) = SpheroidalKernels.fixed_kernel(64, 64, 8, 3);
        GridKernel::Fixed(kernel)
    }

    #[test]
    fn test_grid_conserves_weighted_sum() {
        let kernel = fixed_kernel();
        let mut grid = Array4::zeros((1, 1, 64, 64));
        let uvw = Array2::from_shape_vec((2, 3), vec![10.0, -5.0, 0.0, -20.0, 15.0, 0.0]).unwrap();
        let uvscale = Array2::from_elem((2, 1), 1e-3);
        let values = Array3::from_elem((2, 1, 1), Complex::new(2.0, 0.0));
        let weights = Array3::from_elem((2, 1, 1), 0.5);
        let sumwt = grid_visibilities(
            &mut grid,
            uvw.view(),
            uvscale.view(),
            values.view(),
            weights.view(),
            &kernel,
            &[1.5e8],
        );
        assert_abs_diff_eq!(sumwt[[0, 0]], 1.0, epsilon = 1e-12);
        let total: Complex<f64> = grid.iter().sum();
        // unit sum kernels: sum of grid equals sum of weight * value
        assert_abs_diff_eq!(total.re, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(total.im, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_grid_skips_out_of_bounds_rows() {
        let kernel = fixed_kernel();
        let mut grid = Array4::zeros((1, 1, 64, 64));
        // scaled coordinate lands on the grid edge, footprint clipped
        let uvw = Array2::from_shape_vec((1, 3), vec![490.0, 0.0, 0.0]).unwrap();
        let uvscale = Array2::from_elem((2, 1), 1e-3);
        let values = Array3::from_elem((1, 1, 1), Complex::new(1.0, 0.0));
        let weights = Array3::from_elem((1, 1, 1), 1.0);
        let sumwt = grid_visibilities(
            &mut grid,
            uvw.view(),
            uvscale.view(),
            values.view(),
            weights.view(),
            &kernel,
            &[1.5e8],
        );
        assert_abs_diff_eq!(sumwt[[0, 0]], 0.0);
        assert!(grid.iter().all(|v| v.norm() == 0.0));
    }

    #[test]
    fn test_degrid_constant_grid_returns_constant() {
        let kernel = fixed_kernel();
        let grid = Array4::from_elem((1, 1, 64, 64), Complex::new(3.0, -1.0));
        let uvw =
            Array2::from_shape_vec((2, 3), vec![12.0, 7.0, 0.0, -31.0, 2.5, 0.0]).unwrap();
        let uvscale = Array2::from_elem((2, 1), 1e-3);
        let mut vis = Array3::zeros((2, 1, 1));
        degrid_visibilities(
            vis.view_mut(),
            &grid,
            uvw.view(),
            uvscale.view(),
            &kernel,
            &[1.5e8],
        );
        for value in vis.iter() {
            // unit sum kernel interpolates a constant exactly
            assert_abs_diff_eq!(value.re, 3.0, epsilon = 1e-9);
            assert_abs_diff_eq!(value.im, -1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_density_grid_accumulates_colocated_rows() {
        let uvw = Array2::zeros((3, 3));
        let uvscale = Array2::from_elem((2, 1), 1e-3);
        let weights = Array3::from_elem((3, 1, 1), 1.0);
        let density = density_grid((1, 1, 16, 16), uvw.view(), uvscale.view(), weights.view());
        assert_abs_diff_eq!(density[[0, 0, 8, 8]], 3.0);
        assert_abs_diff_eq!(density.sum(), 3.0);
    }
}
