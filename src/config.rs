use crate::codec::DecoderParameters;
use crate::constants::DEFAULT_MAX_PATH_LENGTH;

/// Names of the fields and methods the JNI adapter binds to on the caller object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaBindings {
    pub compressed_stream: String,
    pub segment_positions: String,
    pub segment_lengths: String,
    pub width: String,
    pub height: String,
    pub bits_per_sample: String,
    pub samples_per_pixel: String,
    /// `void (String)` method receiving error text.
    pub error_method: String,
    /// `void (String)` method receiving info and warning text.
    pub message_method: String,
}

impl Default for JavaBindings {
    fn default() -> Self {
        Self {
            compressed_stream: "compressedStream".to_owned(),
            segment_positions: "segmentPositions".to_owned(),
            segment_lengths: "segmentLengths".to_owned(),
            width: "width".to_owned(),
            height: "height".to_owned(),
            bits_per_sample: "bitsPerSample".to_owned(),
            samples_per_pixel: "samplesPerPixel".to_owned(),
            error_method: "logError".to_owned(),
            message_method: "logMessage".to_owned(),
        }
    }
}

/// Settings for one header read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Path buffer size in bytes, terminator included; paths must be shorter.
    pub max_path_length: usize,
    pub decoder_parameters: DecoderParameters,
    pub java: JavaBindings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            decoder_parameters: DecoderParameters::default(),
            java: JavaBindings::default(),
        }
    }
}

impl BridgeConfig {
    pub fn with_max_path_length(mut self, max_path_length: usize) -> Self {
        self.max_path_length = max_path_length;
        self
    }

    pub fn with_decoder_parameters(mut self, parameters: DecoderParameters) -> Self {
        self.decoder_parameters = parameters;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.max_path_length, 4096);
        assert_eq!(config.decoder_parameters.reduce, 0);
        assert_eq!(config.java.bits_per_sample, "bitsPerSample");
        assert_eq!(config.java.error_method, "logError");
    }
}
