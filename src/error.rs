//! Errors that can occur in gridli

use marlu::io::error::BadArrayShape;
use thiserror::Error;

/// The main error enum for gridli
#[derive(Error, Debug)]
pub enum GridliError {
    #[error(transparent)]
    /// Error for bad array shape in provided argument
    BadArrayShape(#[from] BadArrayShape),

    /// The uv scale factor for the first channel is zero, so baseline
    /// coordinates cannot be mapped to grid pixels.
    #[error("degenerate uv scale: cellsize {cellsize:?} rad with first frequency {frequency} Hz gives a zero scale factor")]
    DegenerateUvScale {
        /// image cell size in radians, both spatial axes
        cellsize: [f64; 2],
        /// first channel frequency in Hz
        frequency: f64,
    },

    /// w projection was requested for a visibility set whose w column is
    /// identically zero.
    #[error("w projection requires a non-zero w range, but max |w| over {num_rows} rows is zero")]
    ZeroMaxW {
        /// number of rows inspected
        num_rows: usize,
    },

    /// The (u, v) distribution of a subset is collinear or degenerate, so
    /// the plane fit normal equations are singular.
    #[error("singular plane fit over {num_rows} rows, determinant {det:e}")]
    SingularPlaneFit {
        /// determinant of the 2x2 normal equation system
        det: f64,
        /// number of rows in the subset
        num_rows: usize,
    },

    /// An unrecognised weighting scheme name.
    #[error("unknown weighting scheme {scheme:?}, expected \"uniform\" or \"natural\"")]
    UnknownWeighting {
        /// the scheme name that was requested
        scheme: String,
    },

    /// Sky component prediction only handles per-channel fluxes.
    #[error("unsupported spectral mode {mode:?}, only per-channel fluxes can be predicted")]
    UnsupportedSpectralMode {
        /// the mode that was requested
        mode: String,
    },

    /// A partitioned invert produced an all-zero partial result.
    #[error("partition {index} produced an all-zero result")]
    EmptyPartition {
        /// index of the offending partition
        index: usize,
    },

    /// A partitioned invert assembled an all-zero image.
    #[error("assembled image is all zero after partitioned invert")]
    EmptyImage,
}
