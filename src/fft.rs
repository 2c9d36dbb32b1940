//! Centred FFT helpers for image cubes.
//!
//! The transforms sandwich the FFT between coordinate shifts so that the
//! image centre pixel `(ny/2, nx/2)` maps to the zero spatial frequency.
//! The inverse transform follows the rustfft convention and is not scaled
//! by `1/N`; callers that need absolute scales normalize by the sum of
//! gridded weights instead.

use marlu::num_traits::Zero;
use rustfft::{FftDirection, FftPlanner};

use crate::{
    ndarray::{s, Array2, Array4, ArrayView2, Zip},
    Complex,
};

/// Roll a 2D array so that index `(sy, sx)` moves to `(0, 0)` when
/// `(sy, sx)` are the shift amounts of an inverse shift.
fn shift2(a: ArrayView2<Complex<f64>>, sy: usize, sx: usize) -> Array2<Complex<f64>> {
    let (ny, nx) = a.dim();
    Array2::from_shape_fn((ny, nx), |(y, x)| a[[(y + sy) % ny, (x + sx) % nx]])
}

fn fftshift(a: ArrayView2<Complex<f64>>) -> Array2<Complex<f64>> {
    let (ny, nx) = a.dim();
    // move index 0 to n/2, i.e. read from (i + ceil(n/2)) % n
    shift2(a, (ny + 1) / 2, (nx + 1) / 2)
}

fn ifftshift(a: ArrayView2<Complex<f64>>) -> Array2<Complex<f64>> {
    let (ny, nx) = a.dim();
    shift2(a, ny / 2, nx / 2)
}

/// 2D FFT of one plane, rows then columns, with the shift sandwich.
fn fft2_plane(
    plane: ArrayView2<Complex<f64>>,
    direction: FftDirection,
    planner: &mut FftPlanner<f64>,
) -> Array2<Complex<f64>> {
    let (ny, nx) = plane.dim();
    let mut work = ifftshift(plane);

    let row_fft = planner.plan_fft(nx, direction);
    for mut row in work.rows_mut() {
        let buffer = row.as_slice_mut().expect("rows of a standard layout array are contiguous");
        row_fft.process(buffer);
    }

    let col_fft = planner.plan_fft(ny, direction);
    let mut buffer = vec![Complex::zero(); ny];
    for x in 0..nx {
        for (y, value) in buffer.iter_mut().enumerate() {
            *value = work[[y, x]];
        }
        col_fft.process(&mut buffer);
        for (y, value) in buffer.iter().enumerate() {
            work[[y, x]] = *value;
        }
    }

    fftshift(work.view())
}

fn fft2_cube(a: &Array4<Complex<f64>>, direction: FftDirection) -> Array4<Complex<f64>> {
    let (nchan, npol, ny, nx) = a.dim();
    let mut planner = FftPlanner::new();
    let mut out = Array4::zeros((nchan, npol, ny, nx));
    for chan in 0..nchan {
        for pol in 0..npol {
            let plane = fft2_plane(a.slice(s![chan, pol, .., ..]), direction, &mut planner);
            out.slice_mut(s![chan, pol, .., ..]).assign(&plane);
        }
    }
    out
}

/// Centred forward FFT over the two trailing axes.
pub fn fft2(a: &Array4<Complex<f64>>) -> Array4<Complex<f64>> {
    fft2_cube(a, FftDirection::Forward)
}

/// Centred inverse FFT over the two trailing axes, unnormalized.
pub fn ifft2(a: &Array4<Complex<f64>>) -> Array4<Complex<f64>> {
    fft2_cube(a, FftDirection::Inverse)
}

/// Insert a cube into the middle of a larger zeroed cube so that the
/// spatial centre pixel stays the centre pixel.
pub fn pad_mid<T: Copy + Zero>(a: &Array4<T>, pny: usize, pnx: usize) -> Array4<T> {
    let (nchan, npol, ny, nx) = a.dim();
    assert!(pny >= ny && pnx >= nx, "padded shape must not shrink the image");
    let oy = (pny - ny) / 2;
    let ox = (pnx - nx) / 2;
    let mut out = Array4::zeros((nchan, npol, pny, pnx));
    out.slice_mut(s![.., .., oy..oy + ny, ox..ox + nx])
        .assign(a);
    out
}

/// Extract the middle of a cube, the inverse of [`pad_mid`].
pub fn extract_mid<T: Copy + Zero>(a: &Array4<T>, ny: usize, nx: usize) -> Array4<T> {
    let (_, _, pny, pnx) = a.dim();
    assert!(pny >= ny && pnx >= nx, "extracted shape must not exceed the image");
    let oy = (pny - ny) / 2;
    let ox = (pnx - nx) / 2;
    a.slice(s![.., .., oy..oy + ny, ox..ox + nx]).to_owned()
}

/// Elementwise complex copy of a real cube.
pub fn to_complex(a: &Array4<f64>) -> Array4<Complex<f64>> {
    a.mapv(|v| Complex::new(v, 0.0))
}

/// Real parts of a complex cube.
pub fn to_real(a: &Array4<Complex<f64>>) -> Array4<f64> {
    let mut out = Array4::zeros(a.dim());
    Zip::from(&mut out).and(a).for_each(|r, c| *r = c.re);
    out
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::ndarray::Array4;

    fn centre_delta(n: usize) -> Array4<Complex<f64>> {
        let mut a = Array4::zeros((1, 1, n, n));
        a[[0, 0, n / 2, n / 2]] = Complex::new(1.0, 0.0);
        a
    }

    #[test]
    fn test_fft2_of_centre_delta_is_flat() {
        let spectrum = fft2(&centre_delta(8));
        for value in spectrum.iter() {
            assert_abs_diff_eq!(value.re, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(value.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ifft2_of_flat_is_scaled_centre_delta() {
        let n = 8;
        let flat = Array4::from_elem((1, 1, n, n), Complex::new(1.0, 0.0));
        let image = ifft2(&flat);
        assert_abs_diff_eq!(image[[0, 0, n / 2, n / 2]].re, (n * n) as f64, epsilon = 1e-9);
        assert_abs_diff_eq!(image[[0, 0, 0, 0]].re, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ifft2_centre_pixel_is_grid_sum() {
        let mut grid = Array4::zeros((1, 1, 16, 16));
        grid[[0, 0, 3, 5]] = Complex::new(0.25, 0.5);
        grid[[0, 0, 12, 1]] = Complex::new(1.5, -0.5);
        grid[[0, 0, 8, 8]] = Complex::new(1.0, 0.0);
        let image = ifft2(&grid);
        let sum: Complex<f64> = grid.iter().sum();
        assert_abs_diff_eq!(image[[0, 0, 8, 8]].re, sum.re, epsilon = 1e-9);
        assert_abs_diff_eq!(image[[0, 0, 8, 8]].im, sum.im, epsilon = 1e-9);
    }

    #[test]
    fn test_pad_extract_round_trip() {
        let a = Array4::from_shape_fn((2, 1, 4, 6), |(c, _, y, x)| {
            (c * 100 + y * 10 + x) as f64
        });
        let padded = pad_mid(&a, 8, 12);
        assert_abs_diff_eq!(padded[[1, 0, 4, 6]], a[[1, 0, 2, 3]]);
        let back = extract_mid(&padded, 4, 6);
        assert_abs_diff_eq!(back, a);
    }

    #[test]
    fn test_fft_ifft_round_trip_scales_by_n() {
        let n = 8;
        let a = Array4::from_shape_fn((1, 1, n, n), |(_, _, y, x)| {
            Complex::new((y * n + x) as f64, (x as f64) - 2.0)
        });
        let back = ifft2(&fft2(&a));
        let scale = (n * n) as f64;
        for (orig, round) in a.iter().zip(back.iter()) {
            assert_abs_diff_eq!(round.re, orig.re * scale, epsilon = 1e-9);
            assert_abs_diff_eq!(round.im, orig.im * scale, epsilon = 1e-9);
        }
    }
}
