//! Time-slice imaging: per-slice plane fits of the w term, image plane
//! distortion correction, and the predict/invert orchestrators built on
//! the 2D engine.
//!
//! Within one time slice the array's w term is well approximated by a
//! plane `w = p u + q v`. The slice is then imaged as if coplanar, and
//! the residual effect of the plane shows up as a smooth distortion of
//! the image coordinates, corrected by resampling.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use log::{debug, info, trace};
use marlu::{constants::VEL_C, rayon};
use rayon::prelude::*;

use crate::{
    geometry::GridConfig,
    kernel::KernelProvider,
    ndarray::{Array2, Array4, Axis},
    transform::{invert_2d, normalize_sumwt, predict_2d},
    types::{Image, Visibility},
    Complex, GridliError,
};

/// The best fitting plane `w = p u + q v` for one visibility subset.
#[derive(Clone, Copy, Debug)]
pub struct PlaneFit {
    /// direction cosine along u
    pub p: f64,
    /// direction cosine along v
    pub q: f64,
    /// root mean square w before the fit, in wavelengths at the mean
    /// frequency
    pub rms_before: f64,
    /// root mean square residual w after subtracting the plane
    pub rms_after: f64,
}

/// Fit the plane `w = p u + q v` to a subset's baselines by least
/// squares, leaving the subset untouched.
///
/// # Errors
///
/// [`GridliError::SingularPlaneFit`] when the (u, v) distribution is
/// degenerate or collinear.
pub fn fit_uvw_plane(vis: &Visibility) -> Result<PlaneFit, GridliError> {
    let num_rows = vis.num_rows();
    let (mut su2, mut sv2, mut suv, mut suw, mut svw) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for row in vis.uvw.outer_iter() {
        let (u, v, w) = (row[0], row[1], row[2]);
        su2 += u * u;
        sv2 += v * v;
        suv += u * v;
        suw += u * w;
        svw += v * w;
    }
    let det = su2 * sv2 - suv * suv;
    if !(det.abs() > 1e-12 * su2 * sv2) {
        return Err(GridliError::SingularPlaneFit { det, num_rows });
    }
    let p = (sv2 * suw - suv * svw) / det;
    let q = (su2 * svw - suv * suw) / det;

    let mean_freq = vis.frequency.iter().sum::<f64>() / vis.frequency.len() as f64;
    let to_lambda = mean_freq / VEL_C;
    let (mut sw2, mut sr2) = (0.0, 0.0);
    for row in vis.uvw.outer_iter() {
        let residual = row[2] - p * row[0] - q * row[1];
        sw2 += row[2] * row[2];
        sr2 += residual * residual;
    }
    let rms_before = (sw2 / num_rows as f64).sqrt() * to_lambda;
    let rms_after = (sr2 / num_rows as f64).sqrt() * to_lambda;
    info!(
        "fit_uvw_plane: fit to {num_rows} rows reduces rms w from {rms_before:.1} to {rms_after:.1} wavelengths"
    );

    Ok(PlaneFit {
        p,
        q,
        rms_before,
        rms_after,
    })
}

/// Fit the plane and subtract it from the subset's w column in place.
///
/// # Errors
///
/// See [`fit_uvw_plane`].
pub fn fit_and_remove_uvw_plane(vis: &mut Visibility) -> Result<PlaneFit, GridliError> {
    let fit = fit_uvw_plane(vis)?;
    for mut row in vis.uvw.outer_iter_mut() {
        row[2] -= fit.p * row[0] + fit.q * row[1];
    }
    Ok(fit)
}

/// Nominal and distorted tangent plane coordinate grids for an image
/// under a planar w approximation with direction cosines `(a, b)`:
/// `l' = l + a (sqrt(1 - l^2 - m^2) - 1)` and likewise for `m'`.
///
/// Returns `(l_nominal, m_nominal, l_distorted, m_distorted)`, each
/// shaped `[ny, nx]`.
pub fn lm_distortion(
    im: &Image,
    a: f64,
    b: f64,
) -> (Array2<f64>, Array2<f64>, Array2<f64>, Array2<f64>) {
    let (ny, nx) = im.spatial_shape();
    let (l_nominal, m_nominal) = im.wcs.lm_grids(ny, nx);
    let mut l_distorted = l_nominal.clone();
    let mut m_distorted = m_nominal.clone();
    for iy in 0..ny {
        for ix in 0..nx {
            let l = l_nominal[[iy, ix]];
            let m = m_nominal[[iy, ix]];
            let dn = (1.0 - l * l - m * m).max(0.0).sqrt() - 1.0;
            l_distorted[[iy, ix]] = l + a * dn;
            m_distorted[[iy, ix]] = m + b * dn;
        }
    }
    (l_nominal, m_nominal, l_distorted, m_distorted)
}

/// Catmull-Rom weights for a fractional offset in [0, 1).
fn cubic_weights(f: f64) -> [f64; 4] {
    let f2 = f * f;
    let f3 = f2 * f;
    [
        -0.5 * f3 + f2 - 0.5 * f,
        1.5 * f3 - 2.5 * f2 + 1.0,
        -1.5 * f3 + 2.0 * f2 + 0.5 * f,
        0.5 * f3 - 0.5 * f2,
    ]
}

/// Sample one image plane at a fractional pixel position. Cubic in the
/// interior, bilinear within a pixel of the border, zero outside.
fn sample_plane(
    plane: &crate::ndarray::ArrayView2<f64>,
    ty: f64,
    tx: f64,
) -> f64 {
    let (ny, nx) = plane.dim();
    if ty < 0.0 || tx < 0.0 || ty > (ny - 1) as f64 || tx > (nx - 1) as f64 {
        return 0.0;
    }
    let (iy, ix) = (ty.floor() as usize, tx.floor() as usize);
    let (fy, fx) = (ty - iy as f64, tx - ix as f64);
    if iy >= 1 && ix >= 1 && iy + 2 < ny && ix + 2 < nx {
        let wy = cubic_weights(fy);
        let wx = cubic_weights(fx);
        let mut sum = 0.0;
        for (j, wyj) in wy.iter().enumerate() {
            for (i, wxi) in wx.iter().enumerate() {
                sum += wyj * wxi * plane[[iy + j - 1, ix + i - 1]];
            }
        }
        sum
    } else {
        let iy1 = (iy + 1).min(ny - 1);
        let ix1 = (ix + 1).min(nx - 1);
        plane[[iy, ix]] * (1.0 - fy) * (1.0 - fx)
            + plane[[iy, ix1]] * (1.0 - fy) * fx
            + plane[[iy1, ix]] * fy * (1.0 - fx)
            + plane[[iy1, ix1]] * fy * fx
    }
}

/// Resample an image whose pixel values live at the coordinates in
/// `from` onto the coordinates in `to`.
///
/// The distortion between the `from` grid and the image's own nominal
/// pixel coordinates is small and smooth, so the source position of
/// each output pixel is found by a short fixed point iteration and the
/// value read with cubic interpolation. Output pixels that land outside
/// the source image are zero filled.
pub fn remap_image(
    im: &Image,
    from: (&Array2<f64>, &Array2<f64>),
    to: (&Array2<f64>, &Array2<f64>),
) -> Image {
    let (nchan, npol, ny, nx) = im.data.dim();
    let (cx, cy) = (im.wcs.crpix[0], im.wcs.crpix[1]);
    let (dx, dy) = (im.wcs.cdelt[0], im.wcs.cdelt[1]);

    // fractional source pixel per output pixel, shared across planes
    let mut src_y = Array2::from_elem((ny, nx), -1.0);
    let mut src_x = Array2::from_elem((ny, nx), -1.0);
    for iy in 0..ny {
        for ix in 0..nx {
            let lt = to.0[[iy, ix]];
            let mt = to.1[[iy, ix]];
            let mut tx = lt / dx + cx;
            let mut ty = mt / dy + cy;
            let mut converged = false;
            for _ in 0..5 {
                if tx < 0.0 || ty < 0.0 || tx > (nx - 1) as f64 || ty > (ny - 1) as f64 {
                    break;
                }
                // displacement of the from grid against nominal pixel
                // coordinates
                let delta_l =
                    sample_plane(&from.0.view(), ty, tx) - (tx - cx) * dx;
                let delta_m =
                    sample_plane(&from.1.view(), ty, tx) - (ty - cy) * dy;
                let new_tx = (lt - delta_l) / dx + cx;
                let new_ty = (mt - delta_m) / dy + cy;
                if (new_tx - tx).abs() < 1e-9 && (new_ty - ty).abs() < 1e-9 {
                    converged = true;
                }
                tx = new_tx;
                ty = new_ty;
                if converged {
                    break;
                }
            }
            if tx >= 0.0 && ty >= 0.0 && tx <= (nx - 1) as f64 && ty <= (ny - 1) as f64 {
                src_x[[iy, ix]] = tx;
                src_y[[iy, ix]] = ty;
            }
        }
    }

    let mut out = Image::zeros_like(im);
    for chan in 0..nchan {
        for pol in 0..npol {
            let plane = im.data.index_axis(Axis(0), chan);
            let plane = plane.index_axis(Axis(0), pol);
            for iy in 0..ny {
                for ix in 0..nx {
                    if src_x[[iy, ix]] >= 0.0 {
                        out.data[[chan, pol, iy, ix]] =
                            sample_plane(&plane, src_y[[iy, ix]], src_x[[iy, ix]]);
                    }
                }
            }
        }
    }
    out
}

/// Group rows into time slices: one group of row indices per distinct
/// timestamp, in time order.
pub fn vis_timeslices(vis: &Visibility) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..vis.num_rows()).collect();
    order.sort_by(|&a, &b| {
        vis.time[a]
            .partial_cmp(&vis.time[b])
            .expect("visibility timestamps are finite")
    });
    let groups = order.into_iter().chunk_by(|&row| vis.time[row].to_bits());
    let mut slices = Vec::new();
    for (_, group) in &groups {
        slices.push(group.collect());
    }
    slices
}

fn slice_progress_bar(len: usize, message: &'static str, draw_progress: bool) -> ProgressBar {
    let draw_target = if draw_progress {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let progress = ProgressBar::with_draw_target(Some(len as u64), draw_target);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg:16}: [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent:3}% ({eta:5})")
            .unwrap()
            .progress_chars("=> "),
    );
    progress.set_message(message);
    progress
}

/// Predict model visibilities slice by slice, overwriting `vis.vis`.
///
/// Per slice: fit and remove the w plane, resample the model from
/// nominal onto the distorted coordinates the plane implies, predict
/// with the 2D engine and accumulate the result into the slice's rows.
///
/// # Errors
///
/// See [`fit_uvw_plane`] and [`crate::transform::predict_2d`].
pub fn predict_timeslice(
    vis: &mut Visibility,
    model: &Image,
    config: &GridConfig,
    provider: &dyn KernelProvider,
    draw_progress: bool,
) -> Result<(), GridliError> {
    trace!("start predict_timeslice");
    vis.vis.fill(Complex::new(0.0, 0.0));

    let slices = vis_timeslices(vis);
    debug!("predict_timeslice: {} time slices", slices.len());
    let progress = slice_progress_bar(slices.len(), "predict slices", draw_progress);

    for rows in &slices {
        let mut slice = vis.select_rows(rows);
        let fit = fit_and_remove_uvw_plane(&mut slice)?;

        let (l_nominal, m_nominal, l_distorted, m_distorted) =
            lm_distortion(model, -fit.p, -fit.q);
        let work = remap_image(
            model,
            (&l_nominal, &m_nominal),
            (&l_distorted, &m_distorted),
        );

        predict_2d(&mut slice, &work, config, provider)?;

        for (k, &row) in rows.iter().enumerate() {
            let mut target = vis.vis.index_axis_mut(Axis(0), row);
            target += &slice.vis.index_axis(Axis(0), k);
        }
        progress.inc(1);
    }
    progress.finish();

    trace!("end predict_timeslice");
    Ok(())
}

/// Invert one pre-extracted slice: fit its plane (without removing it),
/// make the slice's dirty image and resample it from the distorted
/// coordinates back onto nominal ones.
fn invert_timeslice_single(
    slice: &Visibility,
    template: &Image,
    dopsf: bool,
    config: &GridConfig,
    provider: &dyn KernelProvider,
) -> Result<(Image, Array2<f64>), GridliError> {
    let fit = fit_uvw_plane(slice)?;
    let (work, sumwt) = invert_2d(slice, template, dopsf, false, config, provider)?;
    let (l_nominal, m_nominal, l_distorted, m_distorted) =
        lm_distortion(template, -fit.p, -fit.q);
    let image = remap_image(
        &work,
        (&l_distorted, &m_distorted),
        (&l_nominal, &m_nominal),
    );
    Ok((image, sumwt))
}

/// Invert a visibility set slice by slice, summing the corrected slice
/// images.
///
/// Slices are pre-extracted and processed by up to `num_workers`
/// parallel workers; each worker accumulates into a private buffer and
/// the buffers are reduced by summation, so worker count does not
/// change the result beyond floating point ordering.
///
/// # Errors
///
/// See [`fit_uvw_plane`] and [`crate::transform::invert_2d`].
#[allow(clippy::too_many_arguments)]
pub fn invert_timeslice(
    vis: &Visibility,
    template: &Image,
    dopsf: bool,
    normalize: bool,
    num_workers: usize,
    config: &GridConfig,
    provider: &(dyn KernelProvider + Sync),
    draw_progress: bool,
) -> Result<(Image, Array2<f64>), GridliError> {
    trace!("start invert_timeslice, dopsf = {dopsf}");
    let slices = vis_timeslices(vis);
    let subsets: Vec<Visibility> = slices.iter().map(|rows| vis.select_rows(rows)).collect();
    debug!(
        "invert_timeslice: {} time slices, {} workers",
        subsets.len(),
        num_workers
    );
    let progress = slice_progress_bar(subsets.len(), "invert slices", draw_progress);

    let (nchan, npol, _, _) = template.data.dim();
    let chunk_size = (subsets.len() + num_workers.max(1) - 1) / num_workers.max(1);
    let zero =
        || -> (Array4<f64>, Array2<f64>) { (Array4::zeros(template.data.dim()), Array2::zeros((nchan, npol))) };

    let (data, sumwt) = subsets
        .par_chunks(chunk_size.max(1))
        .map(|chunk| {
            let (mut acc, mut wt) = zero();
            for slice in chunk {
                let (image, slice_wt) =
                    invert_timeslice_single(slice, template, dopsf, config, provider)?;
                acc += &image.data;
                wt += &slice_wt;
                progress.inc(1);
            }
            Ok::<_, GridliError>((acc, wt))
        })
        .try_reduce(zero, |(data_a, wt_a), (data_b, wt_b)| {
            Ok((data_a + data_b, wt_a + wt_b))
        })?;
    progress.finish();

    let mut image = Image::like(template, data);
    if normalize {
        normalize_sumwt(&mut image, &sumwt);
    }
    trace!("end invert_timeslice");
    Ok((image, sumwt))
}
