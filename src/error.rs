use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    // Input errors
    #[error("No input file or compressed stream was given")]
    MissingInput = 1,
    #[error("Exactly one input file argument is expected")]
    InvalidArgumentCount = 2,
    #[error("Input path is longer than the supported maximum")]
    PathTooLong = 3,
    #[error("Input file could not be opened or read")]
    UnreadableFile = 4,
    #[error("Input is shorter than the 12 bytes needed to identify it")]
    InputTooShort = 5,

    // Format detection
    #[error("Unable to determine the JPEG 2000 format of the input")]
    UndeterminedFormat = 10,

    // Segment tables
    #[error("Segment position and length arrays must be non-empty and of equal length")]
    SegmentArrayMismatch = 20,
    #[error("Segment offset or length is negative")]
    InvalidSegment = 21,
    #[error("Segment lies outside the input file")]
    SegmentOutOfRange = 22,

    // Codec errors
    #[error("Not enough memory")]
    NotEnoughMemory = 30,
    #[error("Failed to create the input stream")]
    StreamCreationFailed = 31,
    #[error("No decoder is available for this format")]
    DecoderCreationFailed = 32,
    #[error("Failed to set up the decoder")]
    DecoderSetupFailed = 33,
    #[error("Failed to read the image header")]
    ReadHeaderFailed = 34,
    #[error("Invalid data")]
    InvalidData = 35,
    #[error("Image header has no components")]
    NoComponents = 36,

    // Managed runtime
    #[error("Exception raised by the Java runtime")]
    JavaException = 40,
    #[error("Java runtime call failed")]
    JavaCallFailed = 41,
    #[error("Message callback failed")]
    CallbackFailed = 42,
}

impl HeaderError {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<std::io::Error> for HeaderError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => HeaderError::InvalidData,
            std::io::ErrorKind::OutOfMemory => HeaderError::NotEnoughMemory,
            _ => HeaderError::UnreadableFile,
        }
    }
}
