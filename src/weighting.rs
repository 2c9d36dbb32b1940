//! Imaging weight computation.

use log::{error, info, trace};

use crate::{
    geometry::{GridConfig, GridGeometry},
    gridding::{density_grid, frac_coord},
    kernel::KernelProvider,
    types::{Image, Visibility},
    GridliError,
};

/// Fill the imaging weight column for the given scheme, in place.
///
/// `"natural"` copies the calibration weights; `"uniform"` divides each
/// weight by the local sample density on the resolved uv grid, giving
/// roughly equal weight per occupied cell. Returns the sum of the
/// imaging weights.
///
/// # Errors
///
/// [`GridliError::UnknownWeighting`] for any other scheme name; the
/// imaging weights are left exactly as they were.
pub fn weight_visibility(
    vis: &mut Visibility,
    template: &Image,
    scheme: &str,
    config: &GridConfig,
    provider: &dyn KernelProvider,
) -> Result<f64, GridliError> {
    trace!("start weight_visibility, scheme = {scheme}");
    match scheme {
        "natural" => {
            let weights = vis.weight.clone();
            vis.imaging_weight.assign(&weights);
        }
        "uniform" => {
            let geometry = GridGeometry::resolve(vis, template, config, provider)?;
            let shape = (
                geometry.nchan,
                geometry.npol,
                geometry.padded_ny,
                geometry.padded_nx,
            );
            let density = density_grid(
                shape,
                vis.uvw.view(),
                geometry.uvscale.view(),
                vis.weight.view(),
            );
            for row in 0..vis.num_rows() {
                for chan in 0..geometry.nchan {
                    let (y, _) = frac_coord(
                        geometry.padded_ny,
                        1,
                        geometry.uvscale[[1, chan]] * vis.uvw[[row, 1]],
                    );
                    let (x, _) = frac_coord(
                        geometry.padded_nx,
                        1,
                        geometry.uvscale[[0, chan]] * vis.uvw[[row, 0]],
                    );
                    let in_bounds = y >= 0
                        && y < geometry.padded_ny as isize
                        && x >= 0
                        && x < geometry.padded_nx as isize;
                    for pol in 0..geometry.npol {
                        vis.imaging_weight[[row, chan, pol]] = if in_bounds {
                            let cell = density[[chan, pol, y as usize, x as usize]];
                            if cell > 0.0 {
                                vis.weight[[row, chan, pol]] / cell
                            } else {
                                0.0
                            }
                        } else {
                            0.0
                        };
                    }
                }
            }
        }
        other => {
            error!("weight_visibility: unknown weighting scheme {other:?}");
            return Err(GridliError::UnknownWeighting {
                scheme: other.to_string(),
            });
        }
    }
    let total = vis.imaging_weight.sum();
    info!("weight_visibility: sum of imaging weights = {total}");
    trace!("end weight_visibility");
    Ok(total)
}
