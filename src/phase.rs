//! Phase centre rotation and the image/visibility phase shifters.

use std::f64::consts::PI;

use log::{debug, trace};
use marlu::{constants::VEL_C, rayon, RADec};
use rayon::prelude::*;

use crate::{
    types::{Image, Visibility},
    Complex,
};

/// Rotate a baseline vector from the local (u, v, w) frame at hour angle
/// `ha` and declination `dec` into the global (x, y, z) frame.
fn uvw_to_xyz(uvw: [f64; 3], ha: f64, dec: f64) -> [f64; 3] {
    let [u, v, w] = uvw;
    let (sin_ha, cos_ha) = ha.sin_cos();
    let (sin_dec, cos_dec) = dec.sin_cos();
    let v0 = -w * cos_dec + v * sin_dec;
    let z = w * sin_dec + v * cos_dec;
    let x = u * cos_ha + v0 * sin_ha;
    let y = -u * sin_ha + v0 * cos_ha;
    [x, y, z]
}

/// The inverse of [`uvw_to_xyz`].
fn xyz_to_uvw(xyz: [f64; 3], ha: f64, dec: f64) -> [f64; 3] {
    let [x, y, z] = xyz;
    let (sin_ha, cos_ha) = ha.sin_cos();
    let (sin_dec, cos_dec) = dec.sin_cos();
    let u = x * cos_ha - y * sin_ha;
    let v0 = x * sin_ha + y * cos_ha;
    let w = z * sin_dec - v0 * cos_dec;
    let v = z * cos_dec + v0 * sin_dec;
    [u, v, w]
}

/// Rotate a visibility set's phase reference to a new direction, in
/// place.
///
/// If the new direction is within 1e-15 in both tangent plane
/// coordinates of the current centre, the amplitudes are untouched and
/// only the stored centre is restamped. With `tangent` set the baseline
/// vectors stay in the old tangent frame; otherwise they are
/// re-projected through the celestial frame so the set can be combined
/// with others on the new tangent plane without raster discontinuities.
pub fn phase_rotate(vis: &mut Visibility, new_centre: RADec, tangent: bool) {
    trace!("start phase_rotate");
    let lmn = new_centre.to_lmn(vis.phase_centre);
    debug!(
        "phase_rotate: l = {:e}, m = {:e}, tangent = {}",
        lmn.l, lmn.m, tangent
    );

    if lmn.l.abs() > 1e-15 || lmn.m.abs() > 1e-15 {
        let direction = [lmn.l, lmn.m, lmn.n - 1.0];
        let Visibility {
            ref uvw,
            ref frequency,
            vis: ref mut amplitudes,
            ..
        } = *vis;
        amplitudes
            .outer_iter_mut()
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut row_vis)| {
                let path = uvw[[row, 0]] * direction[0]
                    + uvw[[row, 1]] * direction[1]
                    + uvw[[row, 2]] * direction[2];
                for (chan, mut chan_vis) in row_vis.outer_iter_mut().enumerate() {
                    let phase = -2.0 * PI * path * frequency[chan] / VEL_C;
                    let (sin_p, cos_p) = phase.sin_cos();
                    // dividing by a unit phasor is multiplying by its
                    // conjugate
                    let inv_phasor = Complex::new(cos_p, -sin_p);
                    chan_vis.mapv_inplace(|v| v * inv_phasor);
                }
            });

        if !tangent {
            let old_centre = vis.phase_centre;
            for mut row in vis.uvw.outer_iter_mut() {
                let xyz = uvw_to_xyz([row[0], row[1], row[2]], -old_centre.ra, old_centre.dec);
                let uvw_new = xyz_to_uvw(xyz, -new_centre.ra, new_centre.dec);
                row[0] = uvw_new[0];
                row[1] = uvw_new[1];
                row[2] = uvw_new[2];
            }
        }
    }

    vis.phase_centre = new_centre;
    trace!("end phase_rotate");
}

/// Rotate a visibility set onto the image's FFT-native direction, the
/// sky position of pixel `(ny/2, nx/2)`.
///
/// The stored phase centre afterwards is the image's reference
/// direction, without a second rotation: the two differ only when the
/// wcs reference pixel is off centre, and the grids are laid out
/// against the FFT-native pixel.
pub fn shift_vis_to_image(vis: &mut Visibility, im: &Image) {
    let image_centre = im.fft_centre();
    debug!(
        "shift_vis_to_image: shifting from {} to image centre {}",
        vis.phase_centre, image_centre
    );
    phase_rotate(vis, image_centre, true);
    vis.phase_centre = im.wcs.crval;
}

/// The inverse of [`shift_vis_to_image`]: rotate from the image's
/// FFT-native direction back to the set's own phase centre.
pub fn shift_vis_from_image(vis: &mut Visibility, im: &Image) {
    let original_centre = vis.phase_centre;
    vis.phase_centre = im.fft_centre();
    debug!(
        "shift_vis_from_image: shifting from image centre {} back to {}",
        vis.phase_centre, original_centre
    );
    phase_rotate(vis, original_centre, true);
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use marlu::RADec;

    use super::*;
    use crate::test_common::{synthetic_image, synthetic_visibility};

    #[test]
    fn test_uvw_xyz_round_trip() {
        let uvw = [120.5, -45.25, 9.75];
        let xyz = uvw_to_xyz(uvw, 0.3, -0.45);
        let back = xyz_to_uvw(xyz, 0.3, -0.45);
        for axis in 0..3 {
            assert_abs_diff_eq!(back[axis], uvw[axis], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_phase_rotate_noop_below_threshold() {
        let mut vis = synthetic_visibility(6, 2, 1);
        let before = vis.vis.clone();
        let nudged = RADec::from_radians(vis.phase_centre.ra + 1e-18, vis.phase_centre.dec);
        phase_rotate(&mut vis, nudged, true);
        assert_eq!(vis.vis, before);
        assert_abs_diff_eq!(vis.phase_centre.ra, nudged.ra);
    }

    #[test]
    fn test_phase_rotate_round_trip_is_identity() {
        let mut vis = synthetic_visibility(8, 2, 2);
        let before = vis.clone();
        let target = RADec::from_radians(
            vis.phase_centre.ra + 0.02,
            vis.phase_centre.dec - 0.015,
        );
        phase_rotate(&mut vis, target, false);
        phase_rotate(&mut vis, before.phase_centre, false);
        for (rotated, original) in vis.vis.iter().zip(before.vis.iter()) {
            assert_abs_diff_eq!(rotated.re, original.re, epsilon = 1e-9);
            assert_abs_diff_eq!(rotated.im, original.im, epsilon = 1e-9);
        }
        for (rotated, original) in vis.uvw.iter().zip(before.uvw.iter()) {
            assert_abs_diff_eq!(rotated, original, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_phase_rotate_changes_amplitudes() {
        let mut vis = synthetic_visibility(8, 1, 1);
        let before = vis.vis.clone();
        let target = RADec::from_radians(vis.phase_centre.ra + 0.01, vis.phase_centre.dec);
        phase_rotate(&mut vis, target, true);
        let moved = vis
            .vis
            .iter()
            .zip(before.iter())
            .any(|(a, b)| (a - b).norm() > 1e-6);
        assert!(moved);
        // tangent mode leaves the baselines alone
        assert_eq!(vis.uvw, synthetic_visibility(8, 1, 1).uvw);
    }

    #[test]
    fn test_shift_to_image_restamps_to_reference_direction() {
        let mut vis = synthetic_visibility(4, 1, 1);
        let im = synthetic_image(1, 1, 64, 64, 1e-5);
        shift_vis_to_image(&mut vis, &im);
        assert_abs_diff_eq!(vis.phase_centre.ra, im.wcs.crval.ra, epsilon = 1e-15);
        assert_abs_diff_eq!(vis.phase_centre.dec, im.wcs.crval.dec, epsilon = 1e-15);
    }
}
