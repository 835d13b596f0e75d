/// Zero-padding factor applied to real-space maps before the 3D transform.
/// Slice extraction assumes this factor when mapping image frequencies into
/// the oversampled volume.
pub const PADDING_FACTOR: usize = 2;

/// Extra planes added around the centred Fourier volume so trilinear
/// interpolation at the Nyquist shell never indexes outside the array.
pub const VOLUME_BORDER: usize = 3;

/// Default number of outstanding tickets per output stack.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default number of threads for the one-off 3D volume transform.
pub const DEFAULT_FFT_THREADS: usize = 4;

/// Denominators below this are treated as zero in correlation bins.
pub const EPSILON: f64 = 1e-30;

/// Relativistic correction factor used in the electron wavelength (1/V).
pub const WAVELENGTH_RELATIVISTIC: f64 = 0.978466e-6;

/// Electron wavelength numerator, in Å·V^0.5.
pub const WAVELENGTH_NUMERATOR: f64 = 12.2643247;

/// Millimetre to Ångström conversion for spherical aberration.
pub const MM_TO_ANGSTROM: f64 = 1e7;

/// Width of the zero-padded destination index in output image names.
pub const IMAGE_INDEX_WIDTH: usize = 6;

/// Extension used for particle stacks.
pub const STACK_EXTENSION: &str = ".mrcs";
