//! One header read, from the caller's inputs to the caller's output fields.
//!
//! [`read_header`] resolves the input (buffer, file, or segmented file),
//! detects the format, drives the codec through a header-only read and copies
//! the four header values back. Everything acquired on the way lives in a
//! [`HeaderCall`], which releases it exactly once.

use crate::HeaderInfo;
use crate::codec::{Codec, ImageDescriptor};
use crate::config::BridgeConfig;
use crate::constants::{FAILURE_RETURN_CODE, SUCCESS_RETURN_CODE};
use crate::error::HeaderError;
use crate::format::detect_format;
use crate::input::{BufferInfo, FileInfo, InputSource};
use crate::messages::Messenger;
use crate::segments::SegmentTable;
use tracing::debug;

/// The object a header read is performed for.
///
/// The JNI adapter implements this over the Java decoder object. Accessors
/// return `None` for fields the caller left unset.
pub trait CallerObject {
    fn compressed_stream(&mut self) -> Result<Option<Vec<u8>>, HeaderError>;
    fn segment_positions(&mut self) -> Result<Option<Vec<i64>>, HeaderError>;
    fn segment_lengths(&mut self) -> Result<Option<Vec<i64>>, HeaderError>;
    fn set_header_fields(&mut self, info: &HeaderInfo) -> Result<(), HeaderError>;
}

/// Picks the input of a call: the caller's buffer if set, otherwise the single
/// file argument, split into segments when the caller supplied them.
pub fn resolve_input<O: CallerObject + ?Sized>(
    caller: &mut O,
    args: &[String],
    config: &BridgeConfig,
) -> Result<InputSource, HeaderError> {
    if let Some(data) = caller.compressed_stream()? {
        debug!(length = data.len(), "reading header from caller buffer");
        return Ok(InputSource::Buffer(BufferInfo::new(data)));
    }

    let path = match args {
        [] => return Err(HeaderError::MissingInput),
        [path] => path,
        _ => return Err(HeaderError::InvalidArgumentCount),
    };

    let segments = match (caller.segment_positions()?, caller.segment_lengths()?) {
        (None, None) => None,
        (Some(positions), Some(lengths)) => Some(SegmentTable::from_arrays(&positions, &lengths)?),
        _ => return Err(HeaderError::SegmentArrayMismatch),
    };

    debug!(%path, segmented = segments.is_some(), "reading header from file");
    Ok(InputSource::File(FileInfo::new(
        path,
        segments,
        config.max_path_length,
    )?))
}

/// Resources held by one header read.
///
/// Members are filled in as they are acquired. [`HeaderCall::release`] drops
/// whatever is held and may be called any number of times; `Drop` calls it too.
pub struct HeaderCall<'c, C: Codec> {
    codec: &'c C,
    messenger: Messenger,
    stream: Option<C::Stream>,
    decoder: Option<C::Decoder>,
    image: Option<C::Image>,
    segments: Option<SegmentTable>,
}

impl<'c, C: Codec> HeaderCall<'c, C> {
    pub fn new(codec: &'c C, messenger: Messenger) -> Self {
        Self {
            codec,
            messenger,
            stream: None,
            decoder: None,
            image: None,
            segments: None,
        }
    }

    /// Detects the format of `input` and reads its header.
    pub fn run(
        &mut self,
        input: InputSource,
        config: &BridgeConfig,
    ) -> Result<HeaderInfo, HeaderError> {
        let leading = input.read_leading()?;
        let format = detect_format(Some(leading.as_slice()), input.path())?;
        debug!(%format, "detected format");

        self.open_stream(input)?;

        let decoder = self.decoder.insert(self.codec.create_decoder(format)?);
        self.codec.set_message_handlers(decoder, &self.messenger)?;
        self.codec
            .setup_decoder(decoder, &config.decoder_parameters)?;

        let stream = self
            .stream
            .as_mut()
            .ok_or(HeaderError::StreamCreationFailed)?;
        let image = self.image.insert(self.codec.read_header(stream, decoder)?);
        image.describe().header_info()
    }

    fn open_stream(&mut self, input: InputSource) -> Result<(), HeaderError> {
        let stream = match input {
            InputSource::Buffer(buffer) => self.codec.stream_from_buffer(buffer)?,
            InputSource::File(FileInfo { path, segments, .. }) => {
                self.segments = segments;
                match &self.segments {
                    Some(table) => self.codec.stream_from_segments(&path, table)?,
                    None => self.codec.stream_from_file(&path)?,
                }
            }
        };
        self.stream = Some(stream);
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
            && self.decoder.is_none()
            && self.image.is_none()
            && self.segments.is_none()
    }

    pub fn release(&mut self) {
        drop(self.stream.take());
        drop(self.decoder.take());
        drop(self.image.take());
        drop(self.segments.take());
    }
}

impl<C: Codec> Drop for HeaderCall<'_, C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reads the header for `caller` and copies the result into its fields.
///
/// The fields are only written when the whole read succeeded. Every failure is
/// reported through `messenger` before it is returned.
pub fn read_header<C: Codec, O: CallerObject + ?Sized>(
    codec: &C,
    caller: &mut O,
    args: &[String],
    messenger: &Messenger,
    config: &BridgeConfig,
) -> Result<HeaderInfo, HeaderError> {
    let result = resolve_input(caller, args, config)
        .and_then(|input| {
            let mut call = HeaderCall::new(codec, messenger.clone());
            let info = call.run(input, config);
            call.release();
            info
        })
        .and_then(|info| {
            caller.set_header_fields(&info)?;
            Ok(info)
        });

    match &result {
        Ok(info) => debug!(?info, "header read"),
        Err(err) => messenger.report_failure(*err),
    }
    result
}

/// [`read_header`] with the result folded into the `0` / `-1` convention.
pub fn read_header_status<C: Codec, O: CallerObject + ?Sized>(
    codec: &C,
    caller: &mut O,
    args: &[String],
    messenger: &Messenger,
    config: &BridgeConfig,
) -> i32 {
    match read_header(codec, caller, args, messenger, config) {
        Ok(_) => SUCCESS_RETURN_CODE,
        Err(_) => FAILURE_RETURN_CODE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::native::parser::tests::codestream;
    use crate::codec::{ComponentHeader, DecoderParameters, ImageHeader, NativeCodec};
    use crate::format::CodecFormat;
    use crate::messages::CollectingHandler;
    use std::cell::Cell;
    use std::io::Write;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::NamedTempFile;

    #[derive(Debug, Default)]
    struct MockCaller {
        stream: Option<Vec<u8>>,
        positions: Option<Vec<i64>>,
        lengths: Option<Vec<i64>>,
        fields: Option<HeaderInfo>,
    }

    impl CallerObject for MockCaller {
        fn compressed_stream(&mut self) -> Result<Option<Vec<u8>>, HeaderError> {
            Ok(self.stream.clone())
        }

        fn segment_positions(&mut self) -> Result<Option<Vec<i64>>, HeaderError> {
            Ok(self.positions.clone())
        }

        fn segment_lengths(&mut self) -> Result<Option<Vec<i64>>, HeaderError> {
            Ok(self.lengths.clone())
        }

        fn set_header_fields(&mut self, info: &HeaderInfo) -> Result<(), HeaderError> {
            self.fields = Some(*info);
            Ok(())
        }
    }

    struct Tracked(Rc<Cell<u32>>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct MockImage {
        _tracked: Tracked,
        header: ImageHeader,
    }

    impl ImageDescriptor for MockImage {
        fn describe(&self) -> ImageHeader {
            self.header.clone()
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Stream,
        CreateDecoder,
        Setup,
        ReadHeader,
    }

    #[derive(Default)]
    struct MockCodec {
        stream_drops: Rc<Cell<u32>>,
        decoder_drops: Rc<Cell<u32>>,
        image_drops: Rc<Cell<u32>>,
        calls: Cell<u32>,
        fail_at: Option<Step>,
        header: ImageHeader,
    }

    impl MockCodec {
        fn returning(header: ImageHeader) -> Self {
            Self {
                header,
                ..Default::default()
            }
        }

        fn failing_at(step: Step) -> Self {
            Self {
                fail_at: Some(step),
                header: gray_header(),
                ..Default::default()
            }
        }

        fn step(&self, step: Step) -> Result<(), HeaderError> {
            self.calls.set(self.calls.get() + 1);
            match self.fail_at {
                Some(failing) if failing == step => Err(HeaderError::ReadHeaderFailed),
                _ => Ok(()),
            }
        }

        fn stream(&self) -> Result<Tracked, HeaderError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail_at == Some(Step::Stream) {
                return Err(HeaderError::StreamCreationFailed);
            }
            Ok(Tracked(self.stream_drops.clone()))
        }

        fn drops(&self) -> (u32, u32, u32) {
            (
                self.stream_drops.get(),
                self.decoder_drops.get(),
                self.image_drops.get(),
            )
        }
    }

    impl Codec for MockCodec {
        type Stream = Tracked;
        type Decoder = Tracked;
        type Image = MockImage;

        fn stream_from_file(&self, _path: &Path) -> Result<Tracked, HeaderError> {
            self.stream()
        }

        fn stream_from_segments(
            &self,
            _path: &Path,
            _segments: &SegmentTable,
        ) -> Result<Tracked, HeaderError> {
            self.stream()
        }

        fn stream_from_buffer(&self, _buffer: BufferInfo) -> Result<Tracked, HeaderError> {
            self.stream()
        }

        fn create_decoder(&self, format: CodecFormat) -> Result<Tracked, HeaderError> {
            self.step(Step::CreateDecoder)?;
            if format == CodecFormat::Jpip {
                return Err(HeaderError::DecoderCreationFailed);
            }
            Ok(Tracked(self.decoder_drops.clone()))
        }

        fn set_message_handlers(
            &self,
            _decoder: &mut Tracked,
            _messenger: &Messenger,
        ) -> Result<(), HeaderError> {
            Ok(())
        }

        fn setup_decoder(
            &self,
            _decoder: &mut Tracked,
            _parameters: &DecoderParameters,
        ) -> Result<(), HeaderError> {
            self.step(Step::Setup)
        }

        fn read_header(
            &self,
            _stream: &mut Tracked,
            _decoder: &mut Tracked,
        ) -> Result<MockImage, HeaderError> {
            self.step(Step::ReadHeader)?;
            Ok(MockImage {
                _tracked: Tracked(self.image_drops.clone()),
                header: self.header.clone(),
            })
        }
    }

    fn gray_header() -> ImageHeader {
        ImageHeader {
            x1: 512,
            y1: 256,
            components: vec![ComponentHeader {
                dx: 1,
                dy: 1,
                w: 512,
                h: 256,
                prec: 12,
                bpp: 12,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn buffer_caller() -> MockCaller {
        MockCaller {
            stream: Some(codestream(16, 16, &[8])),
            ..Default::default()
        }
    }

    fn run(codec: &MockCodec, caller: &mut MockCaller, args: &[String]) -> (i32, Rc<CollectingHandler>) {
        let handler = Rc::new(CollectingHandler::default());
        let messenger = Messenger::new(handler.clone());
        let status = read_header_status(codec, caller, args, &messenger, &BridgeConfig::default());
        (status, handler)
    }

    #[test]
    fn test_success_releases_everything_once() {
        let codec = MockCodec::returning(gray_header());
        let mut caller = buffer_caller();
        let (status, handler) = run(&codec, &mut caller, &[]);
        assert_eq!(status, 0);
        assert_eq!(codec.drops(), (1, 1, 1));
        assert!(handler.errors().is_empty());
        assert_eq!(
            caller.fields,
            Some(HeaderInfo {
                width: 512,
                height: 256,
                bits_per_sample: 12,
                samples_per_pixel: 1,
            })
        );
    }

    #[test]
    fn test_read_header_failure_releases_acquired_resources() {
        let codec = MockCodec::failing_at(Step::ReadHeader);
        let mut caller = buffer_caller();
        let (status, handler) = run(&codec, &mut caller, &[]);
        assert_eq!(status, -1);
        assert_eq!(codec.drops(), (1, 1, 0));
        assert_eq!(caller.fields, None);
        assert_eq!(handler.errors().len(), 1);
    }

    #[test]
    fn test_setup_failure_releases_acquired_resources() {
        let codec = MockCodec::failing_at(Step::Setup);
        let mut caller = buffer_caller();
        let (status, _) = run(&codec, &mut caller, &[]);
        assert_eq!(status, -1);
        assert_eq!(codec.drops(), (1, 1, 0));
    }

    #[test]
    fn test_decoder_creation_failure_releases_stream() {
        let codec = MockCodec::failing_at(Step::CreateDecoder);
        let mut caller = buffer_caller();
        let (status, _) = run(&codec, &mut caller, &[]);
        assert_eq!(status, -1);
        assert_eq!(codec.drops(), (1, 0, 0));
    }

    #[test]
    fn test_stream_failure_acquires_nothing() {
        let codec = MockCodec::failing_at(Step::Stream);
        let mut caller = buffer_caller();
        let (status, handler) = run(&codec, &mut caller, &[]);
        assert_eq!(status, -1);
        assert_eq!(codec.calls.get(), 1);
        assert_eq!(codec.drops(), (0, 0, 0));
        assert_eq!(caller.fields, None);
        assert_eq!(handler.errors().len(), 1);
    }

    #[test]
    fn test_jpt_file_releases_stream_once() {
        let mut file = tempfile::Builder::new().suffix(".jpt").tempfile().unwrap();
        file.write_all(&[0x11; 64]).unwrap();
        file.flush().unwrap();

        let codec = MockCodec::returning(gray_header());
        let mut caller = MockCaller::default();
        let path = file.path().to_string_lossy().into_owned();
        let result = read_header(
            &codec,
            &mut caller,
            &[path],
            &Messenger::silent(),
            &BridgeConfig::default(),
        );
        assert_eq!(result, Err(HeaderError::DecoderCreationFailed));
        assert_eq!(codec.drops(), (1, 0, 0));
        assert_eq!(caller.fields, None);
    }

    #[test]
    fn test_image_without_components_fails_after_release() {
        let codec = MockCodec::returning(ImageHeader::default());
        let mut caller = buffer_caller();
        let handler = Rc::new(CollectingHandler::default());
        let messenger = Messenger::new(handler.clone());
        let result = read_header(&codec, &mut caller, &[], &messenger, &BridgeConfig::default());
        assert_eq!(result, Err(HeaderError::NoComponents));
        assert_eq!(codec.drops(), (1, 1, 1));
        assert_eq!(caller.fields, None);
    }

    #[test]
    fn test_release_is_idempotent() {
        let codec = MockCodec::returning(gray_header());
        let mut call = HeaderCall::new(&codec, Messenger::silent());
        let input = InputSource::Buffer(BufferInfo::new(codestream(16, 16, &[8])));
        call.run(input, &BridgeConfig::default()).unwrap();
        assert!(!call.is_released());
        call.release();
        call.release();
        assert!(call.is_released());
        drop(call);
        assert_eq!(codec.drops(), (1, 1, 1));
    }

    #[test]
    fn test_mismatched_segments_never_reach_the_codec() {
        let codec = MockCodec::returning(gray_header());
        let mut caller = MockCaller {
            positions: Some(vec![0, 100]),
            lengths: Some(vec![100]),
            ..Default::default()
        };
        let (status, handler) = run(&codec, &mut caller, &["image.j2k".to_owned()]);
        assert_eq!(status, -1);
        assert_eq!(codec.calls.get(), 0);
        assert_eq!(caller.fields, None);
        assert_eq!(handler.errors().len(), 1);
    }

    #[test]
    fn test_one_segment_array_only_is_rejected() {
        let mut caller = MockCaller {
            positions: Some(vec![0]),
            ..Default::default()
        };
        let result = resolve_input(&mut caller, &["image.j2k".to_owned()], &BridgeConfig::default());
        assert_eq!(result.unwrap_err(), HeaderError::SegmentArrayMismatch);
    }

    #[test]
    fn test_argument_count() {
        let config = BridgeConfig::default();
        let mut caller = MockCaller::default();
        assert_eq!(
            resolve_input(&mut caller, &[], &config).unwrap_err(),
            HeaderError::MissingInput
        );
        let args = ["a.j2k".to_owned(), "b.j2k".to_owned()];
        assert_eq!(
            resolve_input(&mut caller, &args, &config).unwrap_err(),
            HeaderError::InvalidArgumentCount
        );
    }

    #[test]
    fn test_buffer_takes_precedence_over_arguments() {
        let mut caller = buffer_caller();
        let input = resolve_input(
            &mut caller,
            &["missing.j2k".to_owned()],
            &BridgeConfig::default(),
        )
        .unwrap();
        assert!(matches!(input, InputSource::Buffer(_)));
    }

    #[test]
    fn test_short_buffer_fails_without_fields() {
        let codec = MockCodec::returning(gray_header());
        let mut caller = MockCaller {
            stream: Some(vec![0xFF, 0x4F, 0xFF, 0x51]),
            ..Default::default()
        };
        let (status, _) = run(&codec, &mut caller, &[]);
        assert_eq!(status, -1);
        assert_eq!(caller.fields, None);
        assert_eq!(codec.calls.get(), 0);
    }

    #[test]
    fn test_undetermined_format_fails() {
        let codec = MockCodec::returning(gray_header());
        let mut caller = MockCaller {
            stream: Some(vec![0x42; 32]),
            ..Default::default()
        };
        let (status, handler) = run(&codec, &mut caller, &[]);
        assert_eq!(status, -1);
        assert_eq!(codec.calls.get(), 0);
        assert_eq!(handler.errors().len(), 1);
    }

    #[test]
    fn test_long_path_is_rejected() {
        let config = BridgeConfig::default().with_max_path_length(8);
        let mut caller = MockCaller::default();
        let result = resolve_input(&mut caller, &["/tmp/far/too/long.j2k".to_owned()], &config);
        assert_eq!(result.unwrap_err(), HeaderError::PathTooLong);
    }

    #[test]
    fn test_native_codec_reads_segmented_file() {
        let stream = codestream(300, 150, &[10, 10, 10]);
        let (first, second) = stream.split_at(20);
        let mut content = vec![0u8; 7];
        content.extend_from_slice(first);
        content.extend_from_slice(&[0xEE; 5]);
        content.extend_from_slice(second);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&content).unwrap();
        file.flush().unwrap();

        let mut caller = MockCaller {
            positions: Some(vec![7, 32]),
            lengths: Some(vec![20, second.len() as i64]),
            ..Default::default()
        };
        let path = file.path().to_string_lossy().into_owned();
        let info = read_header(
            &NativeCodec::new(),
            &mut caller,
            &[path],
            &Messenger::silent(),
            &BridgeConfig::default(),
        )
        .unwrap();
        assert_eq!(info.width, 300);
        assert_eq!(info.height, 150);
        assert_eq!(info.bits_per_sample, 10);
        assert_eq!(info.samples_per_pixel, 3);
        assert_eq!(caller.fields, Some(info));
    }
}
