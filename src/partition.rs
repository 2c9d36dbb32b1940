//! Partition combinators: apply a predict or invert engine across image
//! facets or visibility subsets and combine the partial results.
//!
//! The engines are injected as closures so the 2D and time-slice
//! variants (or any wrapper around them) plug in interchangeably.

use log::{debug, trace};
use marlu::io::error::BadArrayShape;

use crate::{
    ndarray::{s, Array2},
    types::{Image, Visibility},
    Complex, GridliError,
};

/// One rectangular facet of an image's spatial axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FacetSpec {
    /// first row of the facet
    pub y0: usize,
    /// first column of the facet
    pub x0: usize,
    /// facet height in pixels
    pub ny: usize,
    /// facet width in pixels
    pub nx: usize,
}

/// Split an image into a regular raster of facets.
///
/// # Errors
///
/// [`GridliError::BadArrayShape`] unless both spatial axes divide
/// evenly into the requested facet counts.
pub fn raster_facets(
    im: &Image,
    ny_facets: usize,
    nx_facets: usize,
) -> Result<Vec<FacetSpec>, GridliError> {
    let (ny, nx) = im.spatial_shape();
    if ny_facets == 0 || nx_facets == 0 || ny % ny_facets != 0 || nx % nx_facets != 0 {
        return Err(GridliError::BadArrayShape(BadArrayShape {
            argument: "ny_facets/nx_facets",
            function: "raster_facets",
            expected: format!("divisors of ({ny}, {nx})"),
            received: format!("({ny_facets}, {nx_facets})"),
        }));
    }
    let dy = ny / ny_facets;
    let dx = nx / nx_facets;
    let mut facets = Vec::with_capacity(ny_facets * nx_facets);
    for fy in 0..ny_facets {
        for fx in 0..nx_facets {
            facets.push(FacetSpec {
                y0: fy * dy,
                x0: fx * dx,
                ny: dy,
                nx: dx,
            });
        }
    }
    Ok(facets)
}

/// Cut a facet out of an image, shifting the reference pixel so facet
/// pixels keep their sky directions.
pub fn extract_facet(im: &Image, facet: &FacetSpec) -> Image {
    let data = im
        .data
        .slice(s![
            ..,
            ..,
            facet.y0..facet.y0 + facet.ny,
            facet.x0..facet.x0 + facet.nx
        ])
        .to_owned();
    let mut wcs = im.wcs.clone();
    wcs.crpix[0] -= facet.x0 as f64;
    wcs.crpix[1] -= facet.y0 as f64;
    Image { data, wcs }
}

/// Predict against each image facet in turn and sum the contributions
/// into `vis.vis`.
///
/// # Errors
///
/// Whatever the injected engine returns.
pub fn predict_by_image_partitions<F>(
    vis: &mut Visibility,
    model: &Image,
    facets: &[FacetSpec],
    mut predict: F,
) -> Result<(), GridliError>
where
    F: FnMut(&mut Visibility, &Image) -> Result<(), GridliError>,
{
    trace!("start predict_by_image_partitions over {} facets", facets.len());
    vis.vis.fill(Complex::new(0.0, 0.0));
    let mut work = vis.clone();
    for facet in facets {
        let sub_model = extract_facet(model, facet);
        predict(&mut work, &sub_model)?;
        vis.vis += &work.vis;
    }
    trace!("end predict_by_image_partitions");
    Ok(())
}

/// Invert the full visibility set into each facet's region of a
/// mutable output image.
///
/// Returns the summed weights of the last facet (identical across
/// facets for the engines in this crate, which grid every row each
/// time).
///
/// # Errors
///
/// [`GridliError::EmptyPartition`] if any facet comes back all zero,
/// [`GridliError::EmptyImage`] if the assembled image is all zero, plus
/// whatever the injected engine returns.
pub fn invert_by_image_partitions<F>(
    vis: &Visibility,
    im: &mut Image,
    facets: &[FacetSpec],
    mut invert: F,
) -> Result<Array2<f64>, GridliError>
where
    F: FnMut(&Visibility, &Image) -> Result<(Image, Array2<f64>), GridliError>,
{
    trace!("start invert_by_image_partitions over {} facets", facets.len());
    let mut last_sumwt = None;
    for (index, facet) in facets.iter().enumerate() {
        let template = extract_facet(im, facet);
        let (result, sumwt) = invert(vis, &template)?;
        if result.data.iter().all(|&v| v == 0.0) {
            return Err(GridliError::EmptyPartition { index });
        }
        im.data
            .slice_mut(s![
                ..,
                ..,
                facet.y0..facet.y0 + facet.ny,
                facet.x0..facet.x0 + facet.nx
            ])
            .assign(&result.data);
        last_sumwt = Some(sumwt);
    }
    match last_sumwt {
        Some(sumwt) if !im.data.iter().all(|&v| v == 0.0) => Ok(sumwt),
        Some(_) => Err(GridliError::EmptyImage),
        None => Err(GridliError::EmptyPartition { index: 0 }),
    }
}

/// Predict each visibility subset against the model, writing the
/// subset's rows of `vis.vis`. Subsets must be non-overlapping and
/// collectively exhaustive.
///
/// # Errors
///
/// Whatever the injected engine returns.
pub fn predict_by_vis_partitions<F>(
    vis: &mut Visibility,
    model: &Image,
    partitions: &[Vec<usize>],
    mut predict: F,
) -> Result<(), GridliError>
where
    F: FnMut(&mut Visibility, &Image) -> Result<(), GridliError>,
{
    trace!(
        "start predict_by_vis_partitions over {} subsets",
        partitions.len()
    );
    vis.vis.fill(Complex::new(0.0, 0.0));
    for rows in partitions {
        let mut subset = vis.select_rows(rows);
        predict(&mut subset, model)?;
        for (k, &row) in rows.iter().enumerate() {
            vis.vis
                .slice_mut(s![row, .., ..])
                .assign(&subset.vis.slice(s![k, .., ..]));
        }
    }
    trace!("end predict_by_vis_partitions");
    Ok(())
}

/// Invert each visibility subset in turn, returning the result of the
/// last subset. The injected engine is expected to fold the subsets
/// together itself (for example by accumulating into shared state);
/// this combinator just drives the sequence.
///
/// # Errors
///
/// [`GridliError::EmptyPartition`] for an empty partition sequence,
/// plus whatever the injected engine returns.
pub fn invert_by_vis_partitions<F>(
    vis: &Visibility,
    template: &Image,
    partitions: &[Vec<usize>],
    mut invert: F,
) -> Result<(Image, Array2<f64>), GridliError>
where
    F: FnMut(&Visibility, &Image) -> Result<(Image, Array2<f64>), GridliError>,
{
    debug!(
        "invert_by_vis_partitions over {} subsets",
        partitions.len()
    );
    let mut result = None;
    for rows in partitions {
        let subset = vis.select_rows(rows);
        result = Some(invert(&subset, template)?);
    }
    result.ok_or(GridliError::EmptyPartition { index: 0 })
}
