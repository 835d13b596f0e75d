use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid MRC file: {0}")]
    InvalidMrc(String),

    #[error("Invalid NPY file: {0}")]
    InvalidNpy(String),

    #[error("Invalid STAR file: {0}")]
    Star(String),

    #[error("Missing required column {column} in STAR block '{block}'")]
    MissingColumn { block: String, column: String },

    #[error("Row {row}: invalid value '{value}' for {column}")]
    InvalidField {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Row {row}: malformed image name '{value}' (expected <index>@<stack>)")]
    InvalidImageName { row: usize, value: String },

    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    #[error("Size mismatch: {0}")]
    SizeMismatch(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Image index {index} out of range (total: {total})")]
    ImageIndexOutOfRange { index: usize, total: usize },

    #[error("Worker job failed: {0}")]
    JobFailed(String),

    #[error("Worker job was dropped before producing a result")]
    JobLost,

    #[error("Particle {image}: {source}")]
    Particle {
        image: String,
        #[source]
        source: Box<SubtractError>,
    },

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl SubtractError {
    /// Attach the identifier of the particle being processed.
    pub fn for_particle(self, image: impl Into<String>) -> Self {
        match self {
            already @ Self::Particle { .. } => already,
            other => Self::Particle {
                image: image.into(),
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SubtractError>;
