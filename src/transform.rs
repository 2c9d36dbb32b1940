//! The 2D transform engine: convolutional predict (degridding) and
//! invert (gridding), plus direct prediction of point components.

use std::f64::consts::PI;

use log::trace;
use marlu::{constants::VEL_C, rayon};
use rayon::prelude::*;

use crate::{
    fft::{extract_mid, fft2, ifft2, pad_mid, to_complex, to_real},
    geometry::{GridConfig, GridGeometry},
    gridding::{degrid_visibilities, grid_visibilities},
    kernel::KernelProvider,
    ndarray::{Array2, Array3, Array4, Axis},
    phase::{shift_vis_from_image, shift_vis_to_image},
    types::{Image, SkyComponent, SpectralMode, Visibility},
    Complex, GridliError,
};

/// Predict model visibilities from an image by convolutional
/// degridding, overwriting `vis.vis` in place. Baselines, weights and
/// times are untouched.
///
/// # Errors
///
/// See [`GridGeometry::resolve`].
pub fn predict_2d(
    vis: &mut Visibility,
    model: &Image,
    config: &GridConfig,
    provider: &dyn KernelProvider,
) -> Result<(), GridliError> {
    trace!("start predict_2d");
    let geometry = GridGeometry::resolve(vis, model, config, provider)?;

    let mut padded = to_complex(&pad_mid(
        &model.data,
        geometry.padded_ny,
        geometry.padded_nx,
    ));
    padded *= &geometry.taper.mapv(|t| Complex::new(t, 0.0));
    let uvgrid = fft2(&padded);

    degrid_visibilities(
        vis.vis.view_mut(),
        &uvgrid,
        vis.uvw.view(),
        geometry.uvscale.view(),
        &geometry.kernel,
        &vis.frequency,
    );
    // the forward transform carries the measurement equation sign, so
    // the degridded values are already phased to the image's fft-native
    // direction and only need shifting back to the set's own centre
    shift_vis_from_image(vis, model);

    trace!("end predict_2d");
    Ok(())
}

/// Make a dirty image (or the PSF) from a visibility set by
/// convolutional gridding.
///
/// PSF mode grids unit amplitudes under the same imaging weights as the
/// matching dirty image, so the two are directly comparable. With
/// `normalize` set, each `[chan, pol]` plane is divided by its summed
/// imaging weight; planes with zero weight are left unnormalized.
///
/// Returns the image and the summed weights per `[chan, pol]`.
///
/// # Errors
///
/// See [`GridGeometry::resolve`].
pub fn invert_2d(
    vis: &Visibility,
    template: &Image,
    dopsf: bool,
    normalize: bool,
    config: &GridConfig,
    provider: &dyn KernelProvider,
) -> Result<(Image, Array2<f64>), GridliError> {
    trace!("start invert_2d, dopsf = {dopsf}");
    let geometry = GridGeometry::resolve(vis, template, config, provider)?;

    let mut svis = vis.clone();
    shift_vis_to_image(&mut svis, template);

    let mut grid = Array4::zeros((
        geometry.nchan,
        geometry.npol,
        geometry.padded_ny,
        geometry.padded_nx,
    ));
    let values = if dopsf {
        Array3::from_elem(svis.vis.dim(), Complex::new(1.0, 0.0))
    } else {
        svis.vis.clone()
    };
    let sumwt = grid_visibilities(
        &mut grid,
        svis.uvw.view(),
        geometry.uvscale.view(),
        values.view(),
        svis.imaging_weight.view(),
        &geometry.kernel,
        &svis.frequency,
    );

    let mut dirty = to_real(&ifft2(&grid));
    dirty *= &geometry.taper;
    let mut image = Image::like(template, extract_mid(&dirty, geometry.ny, geometry.nx));
    if normalize {
        normalize_sumwt(&mut image, &sumwt);
    }

    trace!("end invert_2d");
    Ok((image, sumwt))
}

/// Divide each `[chan, pol]` plane of an image by its summed weight.
/// Zero-weight planes are left alone.
pub fn normalize_sumwt(im: &mut Image, sumwt: &Array2<f64>) {
    for ((chan, pol), &weight) in sumwt.indexed_iter() {
        if weight > 0.0 {
            im.data
                .index_axis_mut(Axis(0), chan)
                .index_axis_mut(Axis(0), pol)
                .mapv_inplace(|v| v / weight);
        }
    }
}

/// Accumulate the direct Fourier transform of point components into a
/// visibility set's amplitudes.
///
/// # Errors
///
/// [`GridliError::UnsupportedSpectralMode`] if any component's flux is
/// not per channel.
pub fn predict_sky_component(
    vis: &mut Visibility,
    components: &[SkyComponent],
) -> Result<(), GridliError> {
    for component in components {
        if component.spectral_mode != SpectralMode::Channel {
            return Err(GridliError::UnsupportedSpectralMode {
                mode: format!("{:?}", component.spectral_mode),
            });
        }
        let lmn = component.direction.to_lmn(vis.phase_centre);
        let direction = [lmn.l, lmn.m, lmn.n - 1.0];
        let Visibility {
            ref uvw,
            ref frequency,
            vis: ref mut amplitudes,
            ..
        } = *vis;
        let flux = &component.flux;
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
                    let phasor = Complex::new(cos_p, sin_p);
                    for (pol, value) in chan_vis.iter_mut().enumerate() {
                        *value += phasor * flux[[chan, pol]];
                    }
                }
            });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use marlu::RADec;

    use super::*;
    use crate::{
        kernel::SpheroidalKernels,
        ndarray::Array2,
        test_common::{centre_point_image, synthetic_image, synthetic_visibility},
    };

    #[test]
    fn test_predict_centre_point_source_gives_flux_on_all_rows() {
        let mut vis = synthetic_visibility(10, 1, 1);
        let im = centre_point_image(1, 1, 64, 64, 1e-5, 2.5);
        predict_2d(&mut vis, &im, &GridConfig::default(), &SpheroidalKernels).unwrap();
        for value in vis.vis.iter() {
            assert_abs_diff_eq!(value.re, 2.5, epsilon = 1e-9);
            assert_abs_diff_eq!(value.im, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_invert_psf_peak_is_normalized_to_one() {
        let vis = synthetic_visibility(10, 1, 1);
        let im = synthetic_image(1, 1, 64, 64, 1e-5);
        let (psf, sumwt) =
            invert_2d(&vis, &im, true, true, &GridConfig::default(), &SpheroidalKernels)
                .unwrap();
        assert_abs_diff_eq!(sumwt[[0, 0]], 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(psf.data[[0, 0, 32, 32]], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invert_without_normalize_scales_by_sumwt() {
        let vis = synthetic_visibility(10, 1, 1);
        let im = synthetic_image(1, 1, 64, 64, 1e-5);
        let (psf, sumwt) = invert_2d(
            &vis,
            &im,
            true,
            false,
            &GridConfig::default(),
            &SpheroidalKernels,
        )
        .unwrap();
        assert_abs_diff_eq!(psf.data[[0, 0, 32, 32]], sumwt[[0, 0]], epsilon = 1e-9);
    }

    #[test]
    fn test_predict_sky_component_at_phase_centre() {
        let mut vis = synthetic_visibility(5, 2, 1);
        vis.vis.fill(Complex::new(0.0, 0.0));
        let component = SkyComponent {
            direction: vis.phase_centre,
            flux: Array2::from_elem((2, 1), 3.0),
            spectral_mode: SpectralMode::Channel,
        };
        predict_sky_component(&mut vis, &[component.clone()]).unwrap();
        // accumulation: a second call doubles the amplitudes
        predict_sky_component(&mut vis, &[component]).unwrap();
        for value in vis.vis.iter() {
            assert_abs_diff_eq!(value.re, 6.0, epsilon = 1e-12);
            assert_abs_diff_eq!(value.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_predict_sky_component_rejects_power_law() {
        let mut vis = synthetic_visibility(2, 1, 1);
        let component = SkyComponent {
            direction: RADec::from_radians(0.1, -0.5),
            flux: Array2::ones((1, 1)),
            spectral_mode: SpectralMode::PowerLaw,
        };
        let result = predict_sky_component(&mut vis, &[component]);
        assert!(matches!(
            result,
            Err(GridliError::UnsupportedSpectralMode { .. })
        ));
    }
}
