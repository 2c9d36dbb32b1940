//! Wide-field imaging transforms for radio interferometry.
//!
//! This crate converts between sky brightness images and interferometer
//! visibilities with convolutional Fourier gridding, including the wide
//! field corrections for sky curvature and array non-coplanarity:
//!
//! - [`transform::predict_2d`] and [`transform::invert_2d`], the base
//!   degridding/gridding engines, with fixed anti-aliasing kernels or
//!   w projection kernel tables ([`kernel`]);
//! - [`timeslice::predict_timeslice`] and
//!   [`timeslice::invert_timeslice`], which fit a planar approximation
//!   of the w term per time slice and correct the matching image plane
//!   distortion;
//! - [`partition`] combinators that drive either engine across image
//!   facets or visibility subsets;
//! - [`weighting::weight_visibility`] and [`phase::phase_rotate`] for
//!   the re-weighting and phase centre shifts the transforms depend on.
//!
//! # Examples
//!
//! Make a normalized point spread function from a synthetic visibility
//! set:
//!
//! ```rust
//! use gridli::{
//!     invert_2d, test_common::{synthetic_image, synthetic_visibility},
//!     GridConfig, SpheroidalKernels,
//! };
//!
//! let vis = synthetic_visibility(16, 1, 1);
//! let template = synthetic_image(1, 1, 64, 64, 1e-5);
//! let (psf, sumwt) = invert_2d(
//!     &vis,
//!     &template,
//!     true,
//!     true,
//!     &GridConfig::default(),
//!     &SpheroidalKernels,
//! )
//! .unwrap();
//! assert!((psf.data[[0, 0, 32, 32]] - 1.0).abs() < 1e-9);
//! assert!((sumwt[[0, 0]] - 16.0).abs() < 1e-9);
//! ```

pub mod error;
pub mod fft;
pub mod geometry;
pub mod gridding;
pub mod kernel;
pub mod partition;
pub mod phase;
pub mod test_common;
pub mod timeslice;
pub mod transform;
pub mod types;
pub mod weighting;

// re-exports of the stack this crate is built on
pub use marlu;
pub use marlu::{ndarray, num_complex, num_complex::Complex, rayon, RADec};

pub use error::GridliError;
pub use geometry::{GridConfig, GridConfigBuilder, GridGeometry, KernelChoice};
pub use kernel::{ConvKernel, KernelProvider, SpheroidalKernels, WKernelTable};
pub use partition::{
    extract_facet, invert_by_image_partitions, invert_by_vis_partitions,
    predict_by_image_partitions, predict_by_vis_partitions, raster_facets, FacetSpec,
};
pub use phase::{phase_rotate, shift_vis_from_image, shift_vis_to_image};
pub use timeslice::{
    fit_and_remove_uvw_plane, fit_uvw_plane, invert_timeslice, lm_distortion, predict_timeslice,
    remap_image, vis_timeslices, PlaneFit,
};
pub use transform::{invert_2d, normalize_sumwt, predict_2d, predict_sky_component};
pub use types::{Image, ImageWcs, SkyComponent, SpectralMode, Visibility};
pub use weighting::weight_visibility;
