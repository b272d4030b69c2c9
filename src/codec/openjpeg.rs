//! OpenJPEG backend.
//!
//! Every OpenJPEG object is wrapped in an owner whose `Drop` calls the
//! matching destroy function, so a handle is released exactly once.

use super::native::ReadSeek;
use super::{Codec, ColorSpace, ComponentHeader, DecoderParameters, ImageDescriptor, ImageHeader};
use crate::error::HeaderError;
use crate::format::CodecFormat;
use crate::input::BufferInfo;
use crate::messages::{MessageLevel, Messenger};
use crate::segments::{SegmentReader, SegmentTable};
use openjpeg_sys as opj;
use std::ffi::{CStr, c_char, c_void};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::ptr::{self, NonNull};

struct StreamSource {
    source: Box<dyn ReadSeek>,
}

extern "C" fn stream_read_fn(p_buffer: *mut c_void, nb_bytes: usize, p_data: *mut c_void) -> usize {
    if p_buffer.is_null() || nb_bytes == 0 {
        return usize::MAX;
    }
    let data = unsafe { &mut *(p_data as *mut StreamSource) };
    let out = unsafe { std::slice::from_raw_parts_mut(p_buffer as *mut u8, nb_bytes) };
    match data.source.read(out) {
        Ok(0) | Err(_) => usize::MAX,
        Ok(read) => read,
    }
}

extern "C" fn stream_skip_fn(nb_bytes: i64, p_data: *mut c_void) -> i64 {
    let data = unsafe { &mut *(p_data as *mut StreamSource) };
    match data.source.seek(SeekFrom::Current(nb_bytes)) {
        Ok(_) => nb_bytes,
        Err(_) => -1,
    }
}

extern "C" fn stream_seek_fn(nb_bytes: i64, p_data: *mut c_void) -> i32 {
    let Ok(offset) = u64::try_from(nb_bytes) else {
        return 0;
    };
    let data = unsafe { &mut *(p_data as *mut StreamSource) };
    i32::from(data.source.seek(SeekFrom::Start(offset)).is_ok())
}

extern "C" fn stream_free_fn(p_data: *mut c_void) {
    drop(unsafe { Box::from_raw(p_data as *mut StreamSource) })
}

pub struct Stream(NonNull<opj::opj_stream_t>);

impl Drop for Stream {
    fn drop(&mut self) {
        unsafe {
            opj::opj_stream_destroy(self.0.as_ptr());
        }
    }
}

impl Stream {
    fn from_reader(mut source: Box<dyn ReadSeek>) -> Result<Self, HeaderError> {
        let len = source
            .seek(SeekFrom::End(0))
            .and_then(|len| source.seek(SeekFrom::Start(0)).map(|_| len))
            .map_err(|_| HeaderError::StreamCreationFailed)?;

        let stream = NonNull::new(unsafe { opj::opj_stream_default_create(1) })
            .ok_or(HeaderError::StreamCreationFailed)?;
        let data = Box::new(StreamSource { source });

        unsafe {
            let ptr = stream.as_ptr();
            opj::opj_stream_set_read_function(ptr, Some(stream_read_fn));
            opj::opj_stream_set_skip_function(ptr, Some(stream_skip_fn));
            opj::opj_stream_set_seek_function(ptr, Some(stream_seek_fn));
            opj::opj_stream_set_user_data_length(ptr, len);
            opj::opj_stream_set_user_data(
                ptr,
                Box::into_raw(data) as *mut c_void,
                Some(stream_free_fn),
            );
        }
        Ok(Self(stream))
    }

    fn as_ptr(&self) -> *mut opj::opj_stream_t {
        self.0.as_ptr()
    }
}

struct CodecHandle(NonNull<opj::opj_codec_t>);

impl Drop for CodecHandle {
    fn drop(&mut self) {
        unsafe {
            opj::opj_destroy_codec(self.0.as_ptr());
        }
    }
}

/// OpenJPEG decompression codec plus the message context its handlers point at.
pub struct Decoder {
    // Declared first so the codec is destroyed before the context it references.
    codec: CodecHandle,
    _messenger: Option<Box<Messenger>>,
}

impl Decoder {
    fn as_ptr(&self) -> *mut opj::opj_codec_t {
        self.codec.0.as_ptr()
    }
}

pub struct Image(NonNull<opj::opj_image_t>);

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            opj::opj_image_destroy(self.0.as_ptr());
        }
    }
}

impl Image {
    fn inner(&self) -> &opj::opj_image_t {
        unsafe { &*self.0.as_ptr() }
    }

    fn components(&self) -> &[opj::opj_image_comp_t] {
        let img = self.inner();
        if img.comps.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(img.comps, img.numcomps as usize) }
    }
}

impl ImageDescriptor for Image {
    fn describe(&self) -> ImageHeader {
        let img = self.inner();
        let components = self
            .components()
            .iter()
            .map(|c| ComponentHeader {
                dx: c.dx,
                dy: c.dy,
                w: c.w,
                h: c.h,
                x0: c.x0,
                y0: c.y0,
                prec: c.prec,
                bpp: c.prec,
                sgnd: c.sgnd != 0,
            })
            .collect();
        ImageHeader {
            x0: img.x0,
            y0: img.y0,
            x1: img.x1,
            y1: img.y1,
            color_space: ColorSpace::try_from(img.color_space as i32).unwrap_or(ColorSpace::Unknown),
            components,
            icc_profile: None,
        }
    }
}

fn forward_message(level: MessageLevel, msg: *const c_char, client_data: *mut c_void) {
    if msg.is_null() || client_data.is_null() {
        return;
    }
    let messenger = unsafe { &*(client_data as *const Messenger) };
    let text = unsafe { CStr::from_ptr(msg) }.to_string_lossy();
    // Unwinding into C is undefined behaviour.
    if std::panic::catch_unwind(AssertUnwindSafe(|| messenger.deliver(level, &text))).is_err() {
        tracing::error!("panic while delivering codec message");
    }
}

unsafe extern "C" fn info_callback(msg: *const c_char, client_data: *mut c_void) {
    forward_message(MessageLevel::Info, msg, client_data);
}

unsafe extern "C" fn warning_callback(msg: *const c_char, client_data: *mut c_void) {
    forward_message(MessageLevel::Warning, msg, client_data);
}

unsafe extern "C" fn error_callback(msg: *const c_char, client_data: *mut c_void) {
    forward_message(MessageLevel::Error, msg, client_data);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenJpegCodec;

impl OpenJpegCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for OpenJpegCodec {
    type Stream = Stream;
    type Decoder = Decoder;
    type Image = Image;

    fn stream_from_file(&self, path: &Path) -> Result<Stream, HeaderError> {
        let file = File::open(path).map_err(|_| HeaderError::StreamCreationFailed)?;
        Stream::from_reader(Box::new(BufReader::new(file)))
    }

    fn stream_from_segments(
        &self,
        path: &Path,
        segments: &SegmentTable,
    ) -> Result<Stream, HeaderError> {
        let file = File::open(path).map_err(|_| HeaderError::StreamCreationFailed)?;
        Stream::from_reader(Box::new(SegmentReader::new(file, segments)))
    }

    fn stream_from_buffer(&self, buffer: BufferInfo) -> Result<Stream, HeaderError> {
        Stream::from_reader(Box::new(buffer))
    }

    fn create_decoder(&self, format: CodecFormat) -> Result<Decoder, HeaderError> {
        let opj_format = match format {
            CodecFormat::Codestream => opj::OPJ_CODEC_FORMAT::OPJ_CODEC_J2K,
            CodecFormat::Jpip => opj::OPJ_CODEC_FORMAT::OPJ_CODEC_JPT,
            CodecFormat::Jp2 => opj::OPJ_CODEC_FORMAT::OPJ_CODEC_JP2,
        };
        let codec = NonNull::new(unsafe { opj::opj_create_decompress(opj_format) })
            .ok_or(HeaderError::DecoderCreationFailed)?;
        Ok(Decoder {
            codec: CodecHandle(codec),
            _messenger: None,
        })
    }

    fn set_message_handlers(
        &self,
        decoder: &mut Decoder,
        messenger: &Messenger,
    ) -> Result<(), HeaderError> {
        let context = Box::new(messenger.clone());
        let user_data = &*context as *const Messenger as *mut c_void;
        let installed = unsafe {
            opj::opj_set_info_handler(decoder.as_ptr(), Some(info_callback), user_data) == 1
                && opj::opj_set_warning_handler(decoder.as_ptr(), Some(warning_callback), user_data)
                    == 1
                && opj::opj_set_error_handler(decoder.as_ptr(), Some(error_callback), user_data) == 1
        };
        decoder._messenger = Some(context);
        if installed {
            Ok(())
        } else {
            Err(HeaderError::DecoderSetupFailed)
        }
    }

    fn setup_decoder(
        &self,
        decoder: &mut Decoder,
        parameters: &DecoderParameters,
    ) -> Result<(), HeaderError> {
        let mut decode_params = unsafe { std::mem::zeroed::<opj::opj_dparameters>() };
        unsafe { opj::opj_set_default_decoder_parameters(&mut decode_params as *mut _) };
        decode_params.cp_reduce = parameters.reduce;
        decode_params.cp_layer = parameters.layers;

        if unsafe { opj::opj_setup_decoder(decoder.as_ptr(), &mut decode_params) } != 1 {
            return Err(HeaderError::DecoderSetupFailed);
        }
        Ok(())
    }

    fn read_header(&self, stream: &mut Stream, decoder: &mut Decoder) -> Result<Image, HeaderError> {
        let mut img: *mut opj::opj_image_t = ptr::null_mut();
        let result = unsafe { opj::opj_read_header(stream.as_ptr(), decoder.as_ptr(), &mut img) };
        // Take ownership first so the image is destroyed on the failure path too.
        let image = NonNull::new(img).map(Image);
        match (result, image) {
            (1, Some(image)) => Ok(image),
            _ => Err(HeaderError::ReadHeaderFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::native::parser::tests::codestream;
    use crate::messages::CollectingHandler;
    use std::rc::Rc;

    #[test]
    fn test_reads_codestream_header() {
        let codec = OpenJpegCodec::new();
        let handler = Rc::new(CollectingHandler::default());
        let messenger = Messenger::new(handler.clone());
        let mut stream = codec
            .stream_from_buffer(BufferInfo::new(codestream(128, 64, &[8, 8, 8])))
            .unwrap();
        let mut decoder = codec.create_decoder(CodecFormat::Codestream).unwrap();
        codec.set_message_handlers(&mut decoder, &messenger).unwrap();
        codec
            .setup_decoder(&mut decoder, &DecoderParameters::default())
            .unwrap();
        let image = codec.read_header(&mut stream, &mut decoder).unwrap();
        let info = image.describe().header_info().unwrap();
        assert_eq!(info.width, 128);
        assert_eq!(info.height, 64);
        assert_eq!(info.bits_per_sample, 8);
        assert_eq!(info.samples_per_pixel, 3);
    }

    #[test]
    fn test_garbage_fails_to_read() {
        let codec = OpenJpegCodec::new();
        let mut stream = codec
            .stream_from_buffer(BufferInfo::new(vec![0x11; 64]))
            .unwrap();
        let mut decoder = codec.create_decoder(CodecFormat::Codestream).unwrap();
        codec
            .set_message_handlers(&mut decoder, &Messenger::silent())
            .unwrap();
        codec
            .setup_decoder(&mut decoder, &DecoderParameters::default())
            .unwrap();
        assert!(codec.read_header(&mut stream, &mut decoder).is_err());
    }
}
