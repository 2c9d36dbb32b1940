//! Visibility, image and sky component types shared by the transforms.

use marlu::{io::error::BadArrayShape, RADec};

use crate::{
    ndarray::{Array1, Array2, Array3, Array4, Axis},
    Complex, GridliError,
};

/// A set of interferometer samples sharing a frequency and polarization
/// axis.
///
/// Rows are baseline-time samples. A freshly created set has
/// `rows == baselines * timesteps`, but subsets produced by
/// [`Visibility::select_rows`] can be any row selection.
///
/// Amplitudes are mutated in place by prediction, imaging weights by
/// weighting, and `uvw` plus `phase_centre` by phase rotation. The
/// frequency axis and configuration name never change after creation.
#[derive(Clone, Debug)]
pub struct Visibility {
    /// baseline vectors in metres, shape `[rows, 3]`
    pub uvw: Array2<f64>,
    /// timestamp per row in seconds (arbitrary epoch; rows with equal
    /// timestamps form a time slice)
    pub time: Array1<f64>,
    /// first antenna index per row
    pub antenna1: Vec<usize>,
    /// second antenna index per row
    pub antenna2: Vec<usize>,
    /// complex amplitudes, shape `[rows, chans, pols]`
    pub vis: Array3<Complex<f64>>,
    /// calibration weights, shape `[rows, chans, pols]`
    pub weight: Array3<f64>,
    /// imaging weights, shape `[rows, chans, pols]`
    pub imaging_weight: Array3<f64>,
    /// channel centre frequencies in Hz
    pub frequency: Vec<f64>,
    /// the direction the amplitudes are phased to
    pub phase_centre: RADec,
    /// name of the originating antenna configuration
    pub configuration: String,
}

impl Visibility {
    /// Create a visibility set, validating that all row-major arrays
    /// agree on their shapes.
    ///
    /// # Errors
    ///
    /// [`GridliError::BadArrayShape`] if any array disagrees with the
    /// shape of `vis`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        uvw: Array2<f64>,
        time: Array1<f64>,
        antenna1: Vec<usize>,
        antenna2: Vec<usize>,
        vis: Array3<Complex<f64>>,
        weight: Array3<f64>,
        imaging_weight: Array3<f64>,
        frequency: Vec<f64>,
        phase_centre: RADec,
        configuration: String,
    ) -> Result<Visibility, GridliError> {
        let (num_rows, num_chans, _) = vis.dim();
        if uvw.dim() != (num_rows, 3) {
            return Err(GridliError::BadArrayShape(BadArrayShape {
                argument: "uvw",
                function: "Visibility::new",
                expected: format!("({num_rows}, 3)"),
                received: format!("{:?}", uvw.dim()),
            }));
        }
        if time.len() != num_rows || antenna1.len() != num_rows || antenna2.len() != num_rows {
            return Err(GridliError::BadArrayShape(BadArrayShape {
                argument: "time/antenna1/antenna2",
                function: "Visibility::new",
                expected: format!("{num_rows}"),
                received: format!(
                    "({}, {}, {})",
                    time.len(),
                    antenna1.len(),
                    antenna2.len()
                ),
            }));
        }
        if weight.dim() != vis.dim() || imaging_weight.dim() != vis.dim() {
            return Err(GridliError::BadArrayShape(BadArrayShape {
                argument: "weight/imaging_weight",
                function: "Visibility::new",
                expected: format!("{:?}", vis.dim()),
                received: format!("({:?}, {:?})", weight.dim(), imaging_weight.dim()),
            }));
        }
        if frequency.len() != num_chans {
            return Err(GridliError::BadArrayShape(BadArrayShape {
                argument: "frequency",
                function: "Visibility::new",
                expected: format!("{num_chans}"),
                received: format!("{}", frequency.len()),
            }));
        }
        Ok(Visibility {
            uvw,
            time,
            antenna1,
            antenna2,
            vis,
            weight,
            imaging_weight,
            frequency,
            phase_centre,
            configuration,
        })
    }

    /// number of baseline-time rows
    pub fn num_rows(&self) -> usize {
        self.vis.len_of(Axis(0))
    }

    /// number of frequency channels
    pub fn num_chans(&self) -> usize {
        self.vis.len_of(Axis(1))
    }

    /// number of polarizations
    pub fn num_pols(&self) -> usize {
        self.vis.len_of(Axis(2))
    }

    /// Copy the given rows out into a new set. Row order follows the
    /// order of `rows`.
    pub fn select_rows(&self, rows: &[usize]) -> Visibility {
        Visibility {
            uvw: self.uvw.select(Axis(0), rows),
            time: self.time.select(Axis(0), rows),
            antenna1: rows.iter().map(|&r| self.antenna1[r]).collect(),
            antenna2: rows.iter().map(|&r| self.antenna2[r]).collect(),
            vis: self.vis.select(Axis(0), rows),
            weight: self.weight.select(Axis(0), rows),
            imaging_weight: self.imaging_weight.select(Axis(0), rows),
            frequency: self.frequency.clone(),
            phase_centre: self.phase_centre,
            configuration: self.configuration.clone(),
        }
    }
}

/// Orthographic (SIN) world coordinate system for the spatial axes of an
/// [`Image`], with pixel increments in radians. `cdelt[0]` is negative by
/// convention since right ascension increases towards the left of the
/// image.
#[derive(Clone, Debug)]
pub struct ImageWcs {
    /// reference pixel `[x, y]`, zero based
    pub crpix: [f64; 2],
    /// pixel increment `[x, y]` in radians
    pub cdelt: [f64; 2],
    /// sky direction of the reference pixel
    pub crval: RADec,
    /// channel centre frequencies in Hz
    pub frequencies: Vec<f64>,
}

impl ImageWcs {
    /// Sky direction of a (possibly fractional) pixel position.
    pub fn pixel_to_radec(&self, x: f64, y: f64) -> RADec {
        let l = (x - self.crpix[0]) * self.cdelt[0];
        let m = (y - self.crpix[1]) * self.cdelt[1];
        let n = (1.0 - l * l - m * m).max(0.0).sqrt();
        let (sin_dec0, cos_dec0) = self.crval.dec.sin_cos();
        let dec = (m * cos_dec0 + n * sin_dec0).asin();
        let ra = self.crval.ra + l.atan2(n * cos_dec0 - m * sin_dec0);
        RADec::from_radians(ra, dec)
    }

    /// Pixel position of a sky direction.
    pub fn radec_to_pixel(&self, direction: RADec) -> [f64; 2] {
        let lmn = direction.to_lmn(self.crval);
        [
            self.crpix[0] + lmn.l / self.cdelt[0],
            self.crpix[1] + lmn.m / self.cdelt[1],
        ]
    }

    /// Tangent plane coordinate grids `(l, m)` for an `ny` by `nx` image,
    /// each shaped `[ny, nx]`.
    pub fn lm_grids(&self, ny: usize, nx: usize) -> (Array2<f64>, Array2<f64>) {
        let l = Array2::from_shape_fn((ny, nx), |(_, ix)| {
            (ix as f64 - self.crpix[0]) * self.cdelt[0]
        });
        let m = Array2::from_shape_fn((ny, nx), |(iy, _)| {
            (iy as f64 - self.crpix[1]) * self.cdelt[1]
        });
        (l, m)
    }
}

/// A dense image cube indexed `[chan, pol, y, x]` with its coordinate
/// system.
///
/// The FFT-native phase reference of an image is the pixel
/// `(ny / 2, nx / 2)`, which is not necessarily the wcs reference pixel.
#[derive(Clone, Debug)]
pub struct Image {
    /// pixel data, shape `[chans, pols, ny, nx]`
    pub data: Array4<f64>,
    /// spatial coordinate system
    pub wcs: ImageWcs,
}

impl Image {
    /// Wrap an array in the coordinate system of a template image.
    pub fn like(template: &Image, data: Array4<f64>) -> Image {
        Image {
            data,
            wcs: template.wcs.clone(),
        }
    }

    /// A zero image with the template's shape and coordinate system.
    pub fn zeros_like(template: &Image) -> Image {
        Image::like(template, Array4::zeros(template.data.dim()))
    }

    /// spatial shape `(ny, nx)`
    pub fn spatial_shape(&self) -> (usize, usize) {
        let (_, _, ny, nx) = self.data.dim();
        (ny, nx)
    }

    /// Sky direction of the FFT-native reference pixel `(ny/2, nx/2)`.
    pub fn fft_centre(&self) -> RADec {
        let (ny, nx) = self.spatial_shape();
        self.wcs.pixel_to_radec((nx / 2) as f64, (ny / 2) as f64)
    }
}

/// How a component's flux varies with frequency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpectralMode {
    /// one flux value per visibility channel
    Channel,
    /// reserved; prediction rejects this mode
    PowerLaw,
}

/// A point-like sky component.
#[derive(Clone, Debug)]
pub struct SkyComponent {
    /// sky position
    pub direction: RADec,
    /// flux per `[chan, pol]`
    pub flux: Array2<f64>,
    /// flux spectral behaviour
    pub spectral_mode: SpectralMode,
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use marlu::RADec;

    use super::*;
    use crate::test_common::{synthetic_image, synthetic_visibility};

    #[test]
    fn test_visibility_new_rejects_bad_uvw_shape() {
        let vis = synthetic_visibility(4, 2, 1);
        let result = Visibility::new(
            Array2::zeros((3, 3)),
            vis.time.clone(),
            vis.antenna1.clone(),
            vis.antenna2.clone(),
            vis.vis.clone(),
            vis.weight.clone(),
            vis.imaging_weight.clone(),
            vis.frequency.clone(),
            vis.phase_centre,
            vis.configuration.clone(),
        );
        assert!(matches!(result, Err(GridliError::BadArrayShape(_))));
    }

    #[test]
    fn test_select_rows_copies_in_order() {
        let mut vis = synthetic_visibility(5, 2, 1);
        vis.uvw[[3, 0]] = 42.0;
        let sub = vis.select_rows(&[3, 1]);
        assert_eq!(sub.num_rows(), 2);
        assert_abs_diff_eq!(sub.uvw[[0, 0]], 42.0);
        assert_abs_diff_eq!(sub.time[[1]], vis.time[[1]]);
    }

    #[test]
    fn test_pixel_radec_round_trip() {
        let im = synthetic_image(1, 1, 64, 64, std::f64::consts::PI / 180.0 / 3600.0);
        let direction = im.wcs.pixel_to_radec(40.0, 21.0);
        let [x, y] = im.wcs.radec_to_pixel(direction);
        assert_abs_diff_eq!(x, 40.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 21.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fft_centre_matches_crpix_for_centred_wcs() {
        let im = synthetic_image(1, 1, 64, 64, std::f64::consts::PI / 180.0 / 3600.0);
        // synthetic images put crpix at (nx/2, ny/2)
        let centre = im.fft_centre();
        assert_abs_diff_eq!(centre.ra, im.wcs.crval.ra, epsilon = 1e-12);
        assert_abs_diff_eq!(centre.dec, im.wcs.crval.dec, epsilon = 1e-12);
    }

    #[test]
    fn test_lm_grids_sign_convention() {
        let im = synthetic_image(1, 1, 8, 8, 1e-4);
        let (l, m) = im.wcs.lm_grids(8, 8);
        // cdelt x is negative, so l decreases with pixel x
        assert!(l[[0, 7]] < l[[0, 0]]);
        assert!(m[[7, 0]] > m[[0, 0]]);
        assert_abs_diff_eq!(l[[4, 4]], 0.0, epsilon = 1e-18);
        assert_abs_diff_eq!(m[[4, 4]], 0.0, epsilon = 1e-18);
    }

    #[test]
    fn test_radec_to_pixel_of_crval_is_crpix() {
        let im = synthetic_image(1, 1, 32, 32, 1e-5);
        let [x, y] = im.wcs.radec_to_pixel(RADec::from_radians(
            im.wcs.crval.ra,
            im.wcs.crval.dec,
        ));
        assert_abs_diff_eq!(x, im.wcs.crpix[0], epsilon = 1e-9);
        assert_abs_diff_eq!(y, im.wcs.crpix[1], epsilon = 1e-9);
    }
}
