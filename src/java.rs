//! JNI entry point for `org.openJpeg.OpenJPEGJavaDecoder`.
//!
//! The Java class declares:
//!
//! ```java
//! private native int internalGetHeader(String[] args);
//! byte[] compressedStream;
//! long[] segmentPositions, segmentLengths;
//! int width, height, bitsPerSample, samplesPerPixel;
//! void logError(String msg);
//! void logMessage(String msg);
//! ```

use crate::HeaderInfo;
use crate::bridge::{CallerObject, read_header_status};
use crate::codec::DefaultCodec;
use crate::config::{BridgeConfig, JavaBindings};
use crate::constants::FAILURE_RETURN_CODE;
use crate::error::HeaderError;
use crate::messages::{MessageHandler, Messenger};
use jni::JNIEnv;
use jni::JavaVM;
use jni::objects::{GlobalRef, JByteArray, JLongArray, JObject, JObjectArray, JString, JValue};
use jni::sys::jint;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tracing::{error, warn};

fn jni_error(err: jni::errors::Error) -> HeaderError {
    match err {
        jni::errors::Error::JavaException => HeaderError::JavaException,
        _ => HeaderError::JavaCallFailed,
    }
}

/// Describes and clears a pending Java exception.
fn take_exception(env: &mut JNIEnv) -> Result<(), HeaderError> {
    if env.exception_check().map_err(jni_error)? {
        let _ = env.exception_describe();
        let _ = env.exception_clear();
        return Err(HeaderError::JavaException);
    }
    Ok(())
}

/// Converts the four header values to Java `int`s, failing before any field is written.
fn java_int_fields(info: &HeaderInfo) -> Result<[jint; 4], HeaderError> {
    let convert = |value: u32| jint::try_from(value).map_err(|_| HeaderError::InvalidData);
    Ok([
        convert(info.width)?,
        convert(info.height)?,
        convert(info.bits_per_sample)?,
        convert(info.samples_per_pixel)?,
    ])
}

/// The Java decoder object seen through [`CallerObject`].
pub struct JniCaller<'a, 'local> {
    env: &'a mut JNIEnv<'local>,
    obj: &'a JObject<'local>,
    bindings: &'a JavaBindings,
}

impl<'a, 'local> JniCaller<'a, 'local> {
    pub fn new(env: &'a mut JNIEnv<'local>, obj: &'a JObject<'local>, bindings: &'a JavaBindings) -> Self {
        Self { env, obj, bindings }
    }

    fn object_field(&mut self, name: &str, sig: &str) -> Result<Option<JObject<'local>>, HeaderError> {
        let value = self.env.get_field(self.obj, name, sig);
        take_exception(self.env)?;
        let obj = value.and_then(|v| v.l()).map_err(jni_error)?;
        if obj.is_null() {
            return Ok(None);
        }
        Ok(Some(obj))
    }

    fn long_array_field(&mut self, name: &str) -> Result<Option<Vec<i64>>, HeaderError> {
        let Some(obj) = self.object_field(name, "[J")? else {
            return Ok(None);
        };
        let array = JLongArray::from(obj);
        let length = self.env.get_array_length(&array).map_err(jni_error)?;
        let length = usize::try_from(length).map_err(|_| HeaderError::InvalidSegment)?;

        let mut values = Vec::new();
        values
            .try_reserve_exact(length)
            .map_err(|_| HeaderError::NotEnoughMemory)?;
        values.resize(length, 0i64);
        self.env
            .get_long_array_region(&array, 0, &mut values)
            .map_err(jni_error)?;
        take_exception(self.env)?;
        self.env.delete_local_ref(array).map_err(jni_error)?;
        Ok(Some(values))
    }

    fn set_int_field(&mut self, name: &str, value: jint) -> Result<(), HeaderError> {
        let result = self.env.set_field(self.obj, name, "I", JValue::Int(value));
        take_exception(self.env)?;
        result.map_err(jni_error)
    }
}

impl CallerObject for JniCaller<'_, '_> {
    fn compressed_stream(&mut self) -> Result<Option<Vec<u8>>, HeaderError> {
        let bindings = self.bindings;
        let Some(obj) = self.object_field(&bindings.compressed_stream, "[B")? else {
            return Ok(None);
        };
        let array = JByteArray::from(obj);
        let data = self.env.convert_byte_array(&array).map_err(jni_error)?;
        take_exception(self.env)?;
        self.env.delete_local_ref(array).map_err(jni_error)?;
        Ok(Some(data))
    }

    fn segment_positions(&mut self) -> Result<Option<Vec<i64>>, HeaderError> {
        let bindings = self.bindings;
        self.long_array_field(&bindings.segment_positions)
    }

    fn segment_lengths(&mut self) -> Result<Option<Vec<i64>>, HeaderError> {
        let bindings = self.bindings;
        self.long_array_field(&bindings.segment_lengths)
    }

    fn set_header_fields(&mut self, info: &HeaderInfo) -> Result<(), HeaderError> {
        let bindings = self.bindings;
        let [width, height, bits_per_sample, samples_per_pixel] = java_int_fields(info)?;
        self.set_int_field(&bindings.width, width)?;
        self.set_int_field(&bindings.height, height)?;
        self.set_int_field(&bindings.bits_per_sample, bits_per_sample)?;
        self.set_int_field(&bindings.samples_per_pixel, samples_per_pixel)
    }
}

/// Sends codec messages to `logError` / `logMessage` on the Java object.
pub struct JniMessageHandler {
    vm: JavaVM,
    target: GlobalRef,
    error_method: String,
    message_method: String,
}

impl JniMessageHandler {
    pub fn new(env: &mut JNIEnv, obj: &JObject, bindings: &JavaBindings) -> Result<Self, HeaderError> {
        Ok(Self {
            vm: env.get_java_vm().map_err(jni_error)?,
            target: env.new_global_ref(obj).map_err(jni_error)?,
            error_method: bindings.error_method.clone(),
            message_method: bindings.message_method.clone(),
        })
    }

    fn call(&self, method: &str, message: &str) -> Result<(), HeaderError> {
        let mut env = self.vm.get_env().map_err(jni_error)?;
        let text = env.new_string(message).map_err(jni_error)?;
        let _ = env.exception_clear();
        let result = env.call_method(
            &self.target,
            method,
            "(Ljava/lang/String;)V",
            &[JValue::Object(&text)],
        );
        let pending = take_exception(&mut env);
        let _ = env.delete_local_ref(text);
        pending?;
        result.map(|_| ()).map_err(jni_error)
    }
}

impl MessageHandler for JniMessageHandler {
    fn on_info(&self, message: &str) -> Result<(), HeaderError> {
        self.call(&self.message_method, message)
    }

    fn on_warning(&self, message: &str) -> Result<(), HeaderError> {
        self.call(&self.message_method, message)
    }

    fn on_error(&self, message: &str) -> Result<(), HeaderError> {
        self.call(&self.error_method, message)
    }
}

fn string_arguments(env: &mut JNIEnv, args: &JObjectArray) -> Result<Vec<String>, HeaderError> {
    if args.is_null() {
        return Ok(Vec::new());
    }
    let count = env.get_array_length(args).map_err(jni_error)?;
    let mut arguments = Vec::new();
    for index in 0..count {
        let element = env
            .get_object_array_element(args, index)
            .map_err(jni_error)?;
        if element.is_null() {
            return Err(HeaderError::MissingInput);
        }
        let element = JString::from(element);
        let value: String = env.get_string(&element).map_err(jni_error)?.into();
        env.delete_local_ref(element).map_err(jni_error)?;
        arguments.push(value);
    }
    Ok(arguments)
}

fn get_header<'local>(
    env: &mut JNIEnv<'local>,
    obj: &JObject<'local>,
    args: &JObjectArray<'local>,
) -> jint {
    let config = BridgeConfig::default();
    let messenger = match JniMessageHandler::new(env, obj, &config.java) {
        Ok(handler) => Messenger::new(Rc::new(handler)),
        Err(err) => {
            warn!(%err, "Java message callbacks unavailable");
            Messenger::silent()
        }
    };

    let arguments = match string_arguments(env, args) {
        Ok(arguments) => arguments,
        Err(err) => {
            messenger.report_failure(err);
            return FAILURE_RETURN_CODE;
        }
    };

    let mut caller = JniCaller::new(env, obj, &config.java);
    read_header_status(
        &DefaultCodec::new(),
        &mut caller,
        &arguments,
        &messenger,
        &config,
    )
}

/// `int OpenJPEGJavaDecoder.internalGetHeader(String[] args)`
///
/// Returns 0 after setting `width`, `height`, `bitsPerSample` and
/// `samplesPerPixel`, or -1 with the fields untouched.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub extern "system" fn Java_org_openJpeg_OpenJPEGJavaDecoder_internalGetHeader<'local>(
    mut env: JNIEnv<'local>,
    obj: JObject<'local>,
    args: JObjectArray<'local>,
) -> jint {
    match panic::catch_unwind(AssertUnwindSafe(|| get_header(&mut env, &obj, &args))) {
        Ok(status) => status,
        Err(_) => {
            error!("panic in internalGetHeader");
            FAILURE_RETURN_CODE
        }
    }
}
