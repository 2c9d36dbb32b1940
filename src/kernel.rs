//! Anti-aliasing tapers and oversampled convolution kernels.
//!
//! The gridding engine treats kernel generation as a collaborator behind
//! the [`KernelProvider`] trait. The default provider uses the prolate
//! spheroidal wave function for anti-aliasing, and builds w projection
//! kernels by transforming the Fresnel phase screen
//! `exp(-2 pi i w (sqrt(1 - l^2 - m^2) - 1))` over the field of view.

use std::f64::consts::PI;

use crate::{
    fft::{ifft2, pad_mid},
    ndarray::{s, Array1, Array2, Array4},
    Complex, GridliError,
};

/// Rational approximation to the 0th order prolate spheroidal wave
/// function with m = 6, alpha = 1. Returns the grid correction value and
/// the gridding function value `(1 - nu^2) * correction`; both are zero
/// for `|nu| > 1`.
pub fn grdsf(nu: f64) -> (f64, f64) {
    const P: [[f64; 5]; 2] = [
        [
            8.203343e-2,
            -3.644705e-1,
            6.278660e-1,
            -5.335581e-1,
            2.312756e-1,
        ],
        [
            4.028559e-3,
            -3.697768e-2,
            1.021332e-1,
            -1.201436e-1,
            6.412774e-2,
        ],
    ];
    const Q: [[f64; 3]; 2] = [
        [1.0, 8.212018e-1, 2.078043e-1],
        [1.0, 9.599102e-1, 2.918724e-1],
    ];
    let nu = nu.abs();
    if nu > 1.0 {
        return (0.0, 0.0);
    }
    let (part, nuend) = if nu < 0.75 { (0, 0.75) } else { (1, 1.0) };
    let delnusq = nu * nu - nuend * nuend;
    let mut top = 0.0;
    for &p in P[part].iter().rev() {
        top = top * delnusq + p;
    }
    let mut bot = 0.0;
    for &q in Q[part].iter().rev() {
        bot = bot * delnusq + q;
    }
    let correction = if bot > 0.0 { top / bot } else { 0.0 };
    (correction, correction * (1.0 - nu * nu))
}

/// An oversampled gridding kernel.
///
/// `data[[yf, xf, j, i]]` is the kernel tap for sub cell offset
/// `(yf, xf)` and grid offset `(j - support, i - support)`; every sub
/// cell kernel has width `2 * support + 1` and is normalized to a unit
/// complex sum, so gridding conserves the summed weights exactly.
#[derive(Clone, Debug)]
pub struct ConvKernel {
    /// kernel half width in grid cells
    pub support: usize,
    /// number of sub cells per grid cell, per axis
    pub oversampling: usize,
    /// kernel taps, shape `[oversampling, oversampling, width, width]`
    pub data: Array4<Complex<f64>>,
}

impl ConvKernel {
    /// full kernel width in grid cells
    pub fn width(&self) -> usize {
        2 * self.support + 1
    }

    fn normalize(&mut self) {
        let oversampling = self.oversampling;
        for yf in 0..oversampling {
            for xf in 0..oversampling {
                let sum: Complex<f64> = self.data.slice(s![yf, xf, .., ..]).iter().sum();
                if sum.norm() > 0.0 {
                    self.data
                        .slice_mut(s![yf, xf, .., ..])
                        .mapv_inplace(|v| v / sum);
                }
            }
        }
    }
}

/// A stack of [`ConvKernel`]s indexed by `|w|`, with plane `k` built for
/// `w = k * wstep` wavelengths.
#[derive(Clone, Debug)]
pub struct WKernelTable {
    /// w spacing between adjacent planes, wavelengths
    pub wstep: f64,
    /// kernels for non-negative w, nearest-plane lookup
    pub planes: Vec<ConvKernel>,
}

impl WKernelTable {
    /// Kernel for a row's w in wavelengths, and whether the kernel must
    /// be conjugated (negative w uses the conjugate of the `|w|` plane).
    pub fn plane(&self, w_lambda: f64) -> (&ConvKernel, bool) {
        let index = ((w_lambda.abs() / self.wstep).round() as usize).min(self.planes.len() - 1);
        (&self.planes[index], w_lambda < 0.0)
    }
}

/// Kernel generation collaborator consumed by the geometry resolver.
pub trait KernelProvider {
    /// An anti-aliasing taper over the padded grid and the matching
    /// fixed gridding kernel.
    fn fixed_kernel(
        &self,
        pny: usize,
        pnx: usize,
        oversampling: usize,
        support: usize,
    ) -> (Array2<f64>, ConvKernel);

    /// A w indexed kernel table plus its companion taper.
    #[allow(clippy::too_many_arguments)]
    fn w_kernel_table(
        &self,
        pny: usize,
        pnx: usize,
        fov: f64,
        w_max: f64,
        wstep: f64,
        half_width: usize,
        oversampling: usize,
    ) -> Result<(Array2<f64>, WKernelTable), GridliError>;
}

/// The default provider: prolate spheroidal anti-aliasing and Fresnel
/// screen w kernels.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpheroidalKernels;

/// Grid correction image over a `ny` by `nx` grid, normalized so the
/// centre pixel is 1 and growing towards the edges; pixels where the
/// spheroidal is zero stay zero.
fn grid_correction(ny: usize, nx: usize) -> Array2<f64> {
    let corr_y: Array1<f64> = Array1::from_shape_fn(ny, |y| {
        grdsf(2.0 * (y as f64 - (ny / 2) as f64) / ny as f64).0
    });
    let corr_x: Array1<f64> = Array1::from_shape_fn(nx, |x| {
        grdsf(2.0 * (x as f64 - (nx / 2) as f64) / nx as f64).0
    });
    let mut gcf = Array2::from_shape_fn((ny, nx), |(y, x)| corr_y[y] * corr_x[x]);
    let max = gcf.iter().cloned().fold(0.0, f64::max);
    gcf.mapv_inplace(|v| if v > 0.0 { max / v } else { 0.0 });
    gcf
}

/// The spheroidal gridding kernel, oversampled.
fn spheroidal_kernel(oversampling: usize, support: usize) -> ConvKernel {
    let width = 2 * support + 1;
    // 1D gridding function at tap offset (j - support) - f / oversampling
    // grid cells from the sample, scaled to the kernel support
    let tap = |j: usize, f: usize| -> f64 {
        let offset = (j as f64 - support as f64) - f as f64 / oversampling as f64;
        grdsf(offset / support as f64).1
    };
    let data = Array4::from_shape_fn(
        (oversampling, oversampling, width, width),
        |(yf, xf, j, i)| Complex::new(tap(j, yf) * tap(i, xf), 0.0),
    );
    let mut kernel = ConvKernel {
        support,
        oversampling,
        data,
    };
    kernel.normalize();
    kernel
}

/// Fresnel phase screen for a w term, over `npix` pixels spanning `fov`
/// radians.
fn w_beam(npix: usize, fov: f64, w: f64) -> Array4<Complex<f64>> {
    let mut screen = Array4::zeros((1, 1, npix, npix));
    for y in 0..npix {
        let m = (y as f64 - (npix / 2) as f64) / npix as f64 * fov;
        for x in 0..npix {
            let l = (x as f64 - (npix / 2) as f64) / npix as f64 * fov;
            let r2 = l * l + m * m;
            if r2 < 1.0 {
                let phase = -2.0 * PI * w * ((1.0 - r2).sqrt() - 1.0);
                let (sin_p, cos_p) = phase.sin_cos();
                screen[[0, 0, y, x]] = Complex::new(cos_p, sin_p);
            }
        }
    }
    screen
}

/// Transform a w screen into an oversampled uv kernel. Zero padding the
/// screen by the oversampling factor makes the transform's uv samples
/// land `1 / oversampling` of a grid cell apart.
fn w_kernel(npix_far: usize, fov: f64, w: f64, oversampling: usize, support: usize) -> ConvKernel {
    let screen = w_beam(npix_far, fov, w);
    let fine = npix_far * oversampling;
    let af = ifft2(&pad_mid(&screen, fine, fine));
    let centre = (fine / 2) as isize;
    let width = 2 * support + 1;
    let data = Array4::from_shape_fn(
        (oversampling, oversampling, width, width),
        |(yf, xf, j, i)| {
            let fy = centre + oversampling as isize * (j as isize - support as isize) - yf as isize;
            let fx = centre + oversampling as isize * (i as isize - support as isize) - xf as isize;
            af[[0, 0, fy as usize, fx as usize]]
        },
    );
    let mut kernel = ConvKernel {
        support,
        oversampling,
        data,
    };
    kernel.normalize();
    kernel
}

impl KernelProvider for SpheroidalKernels {
    fn fixed_kernel(
        &self,
        pny: usize,
        pnx: usize,
        oversampling: usize,
        support: usize,
    ) -> (Array2<f64>, ConvKernel) {
        (
            grid_correction(pny, pnx),
            spheroidal_kernel(oversampling, support),
        )
    }

    fn w_kernel_table(
        &self,
        pny: usize,
        pnx: usize,
        fov: f64,
        w_max: f64,
        wstep: f64,
        half_width: usize,
        oversampling: usize,
    ) -> Result<(Array2<f64>, WKernelTable), GridliError> {
        let support = half_width.max(1);
        // the far field must comfortably contain the kernel extraction
        let npix_far = pnx.max(4 * (support + 1));
        let num_planes = (w_max / wstep).ceil() as usize + 1;
        let planes = (0..num_planes)
            .map(|k| w_kernel(npix_far, fov, k as f64 * wstep, oversampling, support))
            .collect();
        Ok((
            grid_correction(pny, pnx),
            WKernelTable { wstep, planes },
        ))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_grdsf_endpoints() {
        let (corr0, grid0) = grdsf(0.0);
        assert_abs_diff_eq!(grid0, corr0, epsilon = 1e-12);
        assert!(corr0 > 0.0);
        let (_, grid1) = grdsf(1.0);
        assert_abs_diff_eq!(grid1, 0.0, epsilon = 1e-12);
        assert_eq!(grdsf(1.5), (0.0, 0.0));
        // symmetric in nu
        assert_abs_diff_eq!(grdsf(-0.3).1, grdsf(0.3).1, epsilon = 1e-15);
    }

    #[test]
    fn test_grid_correction_is_one_at_centre() {
        let gcf = grid_correction(64, 64);
        assert_abs_diff_eq!(gcf[[32, 32]], 1.0, epsilon = 1e-12);
        // correction grows away from the centre
        assert!(gcf[[32, 1]] > 1.0);
        assert!(gcf[[1, 32]] > gcf[[16, 32]]);
    }

    #[test]
    fn test_spheroidal_kernel_sub_cells_sum_to_one() {
        let kernel = spheroidal_kernel(8, 3);
        assert_eq!(kernel.width(), 7);
        for yf in 0..8 {
            for xf in 0..8 {
                let sum: Complex<f64> = kernel.data.slice(s![yf, xf, .., ..]).iter().sum();
                assert_abs_diff_eq!(sum.re, 1.0, epsilon = 1e-12);
                assert_abs_diff_eq!(sum.im, 0.0, epsilon = 1e-12);
            }
        }
        // peak at the central tap for the aligned sub cell
        let peak = kernel.data[[0, 0, 3, 3]].re;
        assert!(peak > kernel.data[[0, 0, 3, 2]].re);
        assert!(peak > kernel.data[[0, 0, 2, 3]].re);
    }

    #[test]
    fn test_w_kernel_at_zero_w_is_compact() {
        let kernel = w_kernel(64, 0.01, 0.0, 4, 3);
        // with no w phase the screen is flat, so the kernel concentrates
        // at the central tap of the aligned sub cell
        let centre = kernel.data[[0, 0, 3, 3]];
        assert!(centre.re > 0.9);
        let sum: Complex<f64> = kernel.data.slice(s![0, 0, .., ..]).iter().sum();
        assert_abs_diff_eq!(sum.re, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_w_kernel_table_plane_lookup() {
        let provider = SpheroidalKernels;
        let (gcf, table) = provider
            .w_kernel_table(64, 64, 0.02, 100.0, 25.0, 3, 4)
            .unwrap();
        assert_eq!(gcf.dim(), (64, 64));
        assert_eq!(table.planes.len(), 5);
        let (_, conj) = table.plane(-30.0);
        assert!(conj);
        let (_, conj) = table.plane(30.0);
        assert!(!conj);
        // beyond the last plane clamps instead of panicking
        let (clamped, _) = table.plane(1e6);
        assert_eq!(
            clamped.data.dim(),
            table.planes.last().unwrap().data.dim()
        );
    }
}
