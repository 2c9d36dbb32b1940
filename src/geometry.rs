//! Grid geometry resolution: everything the transform engine needs to
//! know about shapes, scales and kernels, derived once per operation
//! from a visibility set and a template image.

use derive_builder::Builder;
use log::{debug, info};
use marlu::{constants::VEL_C, io::error::BadArrayShape};

use crate::{
    gridding::GridKernel,
    kernel::KernelProvider,
    ndarray::Array2,
    types::{Image, Visibility},
    GridliError,
};

/// Which gridding kernel family to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KernelChoice {
    /// fixed anti-aliasing kernel, no wide-field correction
    #[default]
    TwoD,
    /// w dependent kernel table
    WProjection,
    /// the standard kernel selected per row
    StandardByRow,
}

/// Options controlling grid geometry and kernel selection. Every field
/// has a default, so callers usually build one with
/// `GridConfig::default()` or override a field or two through
/// [`GridConfigBuilder`].
#[derive(Builder, Debug, Clone)]
pub struct GridConfig {
    /// padding factor applied to each spatial axis of the grid
    #[builder(default = "2")]
    pub padding: usize,

    /// kernel family
    #[builder(default)]
    pub kernel: KernelChoice,

    /// kernel sub cells per grid cell, per axis
    #[builder(default = "8")]
    pub oversampling: usize,

    /// kernel half width in grid cells (fixed kernels)
    #[builder(default = "3")]
    pub support: usize,

    /// w plane spacing in wavelengths; resolved from `wloss` when unset
    #[builder(default)]
    pub wstep: Option<f64>,

    /// acceptable amplitude loss used to recommend a w step
    #[builder(default = "0.02")]
    pub wloss: f64,

    /// w kernel half width in grid cells; resolved from the field of
    /// view when unset
    #[builder(default)]
    pub kernel_width: Option<usize>,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            padding: 2,
            kernel: KernelChoice::default(),
            oversampling: 8,
            support: 3,
            wstep: None,
            wloss: 0.02,
            kernel_width: None,
        }
    }
}

/// Resolved grid geometry for one predict or invert operation.
#[derive(Clone, Debug)]
pub struct GridGeometry {
    /// channel count shared by the visibility set and image
    pub nchan: usize,
    /// polarization count of the image
    pub npol: usize,
    /// unpadded spatial shape
    pub ny: usize,
    /// unpadded spatial shape
    pub nx: usize,
    /// padded spatial shape
    pub padded_ny: usize,
    /// padded spatial shape
    pub padded_nx: usize,
    /// image pixel increment in radians, `[x, y]`, x negative
    pub cellsize: [f64; 2],
    /// padded field of view in radians
    pub fov: f64,
    /// baseline-to-grid scale, `[2, nchan]`, in cycles per metre
    pub uvscale: Array2<f64>,
    /// anti-aliasing grid correction over the padded shape
    pub taper: Array2<f64>,
    /// the resolved gridding kernel
    pub kernel: GridKernel,
}

impl GridGeometry {
    /// Derive the grid geometry and kernel for a visibility/image pair.
    ///
    /// # Errors
    ///
    /// - [`GridliError::BadArrayShape`] if the channel axes disagree.
    /// - [`GridliError::DegenerateUvScale`] if the first channel's uv
    ///   scale factor is zero.
    /// - [`GridliError::ZeroMaxW`] for w projection over a set whose w
    ///   column is identically zero.
    pub fn resolve(
        vis: &Visibility,
        model: &Image,
        config: &GridConfig,
        provider: &dyn KernelProvider,
    ) -> Result<GridGeometry, GridliError> {
        let (nchan, npol, ny, nx) = model.data.dim();
        if vis.num_chans() != nchan {
            return Err(GridliError::BadArrayShape(BadArrayShape {
                argument: "model",
                function: "GridGeometry::resolve",
                expected: format!("nchan = {}", vis.num_chans()),
                received: format!("nchan = {nchan}"),
            }));
        }
        let padded_ny = config.padding * ny;
        let padded_nx = config.padding * nx;
        let cellsize = [model.wcs.cdelt[0], model.wcs.cdelt[1]];
        let fov = config.padding as f64 * nx as f64 * cellsize[0].abs().max(cellsize[1].abs());

        let uvscale = Array2::from_shape_fn((2, nchan), |(axis, chan)| {
            cellsize[axis] * vis.frequency[chan] / VEL_C
        });
        if uvscale[[0, 0]] == 0.0 {
            return Err(GridliError::DegenerateUvScale {
                cellsize,
                frequency: vis.frequency[0],
            });
        }
        debug!(
            "resolve: shape ({padded_ny}, {padded_nx}), fov {fov:e} rad, uvscale[0,0] {:e}",
            uvscale[[0, 0]]
        );

        let (taper, kernel) = match config.kernel {
            KernelChoice::TwoD => {
                info!("resolve: using the calculated spheroidal function");
                let (taper, kernel) = provider.fixed_kernel(
                    padded_ny,
                    padded_nx,
                    config.oversampling,
                    config.support,
                );
                (taper, GridKernel::Fixed(kernel))
            }
            KernelChoice::StandardByRow => {
                info!("resolve: using the calculated spheroidal function by row");
                let (taper, kernel) = provider.fixed_kernel(
                    padded_ny,
                    padded_nx,
                    config.oversampling,
                    config.support,
                );
                (taper, GridKernel::StandardByRow(kernel))
            }
            KernelChoice::WProjection => {
                let w_max_metres = vis
                    .uvw
                    .column(2)
                    .iter()
                    .fold(0.0, |acc: f64, &w| acc.max(w.abs()));
                if w_max_metres == 0.0 {
                    return Err(GridliError::ZeroMaxW {
                        num_rows: vis.num_rows(),
                    });
                }
                let f_max = vis.frequency.iter().fold(0.0, |acc: f64, &f| acc.max(f));
                let w_max = w_max_metres * f_max / VEL_C;

                let fresnel = (fov / 2.0).powi(2) / cellsize[0].abs();
                info!("resolve: Fresnel number = {fresnel}");
                let recommended_wstep =
                    (2.0 * config.wloss).sqrt() / (std::f64::consts::PI * fov * fov);
                info!("resolve: recommended wstep = {recommended_wstep}");
                let wstep = config.wstep.unwrap_or(recommended_wstep);
                info!("resolve: using w projection with wstep = {wstep}");

                let half_width = config
                    .kernel_width
                    .unwrap_or_else(|| ((0.5 * fov).sin() * nx as f64).round() as usize / 2)
                    .max(1);
                info!("resolve: w kernel half width = {half_width} pixels");

                let (taper, table) = provider.w_kernel_table(
                    padded_ny,
                    padded_nx,
                    fov,
                    w_max,
                    wstep,
                    half_width,
                    config.oversampling,
                )?;
                (taper, GridKernel::WProjection(table))
            }
        };

        Ok(GridGeometry {
            nchan,
            npol,
            ny,
            nx,
            padded_ny,
            padded_nx,
            cellsize,
            fov,
            uvscale,
            taper,
            kernel,
        })
    }
}
