// src/native_api.rs
//
// Raw surface of the ONNX Runtime GenAI C API (`Oga*` symbols), resolved at
// runtime with dlopen-style loading. Nothing here is safe to call directly;
// the RAII wrappers live in `runtime_core`.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::Path;

use libloading::Library;

// Opaque handle types. The native layer owns their layout entirely; on the
// Rust side they only exist behind raw pointers.

#[repr(C)]
pub struct OgaResult {
    _private: [u8; 0],
}

#[repr(C)]
pub struct OgaModel {
    _private: [u8; 0],
}

#[repr(C)]
pub struct OgaTokenizer {
    _private: [u8; 0],
}

#[repr(C)]
pub struct OgaTokenizerStream {
    _private: [u8; 0],
}

#[repr(C)]
pub struct OgaGeneratorParams {
    _private: [u8; 0],
}

#[repr(C)]
pub struct OgaGenerator {
    _private: [u8; 0],
}

#[repr(C)]
pub struct OgaSequences {
    _private: [u8; 0],
}

/// Shared library name searched when no `--library` path is given.
#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY: &str = "onnxruntime-genai.dll";
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY: &str = "libonnxruntime-genai.dylib";
#[cfg(all(unix, not(target_os = "macos")))]
pub const DEFAULT_LIBRARY: &str = "libonnxruntime-genai.so";

#[derive(Debug)]
pub enum NativeApiError {
    LibraryLoad(String),
    SymbolMissing(String),
    InvalidPath(String),
    Native(String),
}

impl std::fmt::Display for NativeApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeApiError::LibraryLoad(msg) => write!(f, "Library load error: {}", msg),
            NativeApiError::SymbolMissing(name) => write!(f, "Symbol not found: {}", name),
            NativeApiError::InvalidPath(msg) => write!(f, "Invalid path: {}", msg),
            NativeApiError::Native(msg) => write!(f, "Native runtime error: {}", msg),
        }
    }
}

impl std::error::Error for NativeApiError {}

/// Complete function table of the GenAI C API as consumed by this crate.
///
/// Every symbol is resolved once at load time so a missing or incompatible
/// library fails loudly at startup instead of mid-conversation. The `Library`
/// handle is kept inside the struct; the function pointers stay valid for as
/// long as the table itself is alive.
pub struct GenAiApi {
    pub result_get_error: unsafe extern "C" fn(*const OgaResult) -> *const c_char,
    pub destroy_result: unsafe extern "C" fn(*mut OgaResult),

    pub create_model: unsafe extern "C" fn(*const c_char, *mut *mut OgaModel) -> *mut OgaResult,
    pub destroy_model: unsafe extern "C" fn(*mut OgaModel),

    pub create_tokenizer:
        unsafe extern "C" fn(*const OgaModel, *mut *mut OgaTokenizer) -> *mut OgaResult,
    pub destroy_tokenizer: unsafe extern "C" fn(*mut OgaTokenizer),

    pub create_tokenizer_stream:
        unsafe extern "C" fn(*const OgaTokenizer, *mut *mut OgaTokenizerStream) -> *mut OgaResult,
    pub destroy_tokenizer_stream: unsafe extern "C" fn(*mut OgaTokenizerStream),

    pub create_generator_params:
        unsafe extern "C" fn(*const OgaModel, *mut *mut OgaGeneratorParams) -> *mut OgaResult,
    pub params_set_search_number:
        unsafe extern "C" fn(*mut OgaGeneratorParams, *const c_char, f64) -> *mut OgaResult,
    pub destroy_generator_params: unsafe extern "C" fn(*mut OgaGeneratorParams),

    pub create_generator: unsafe extern "C" fn(
        *const OgaModel,
        *const OgaGeneratorParams,
        *mut *mut OgaGenerator,
    ) -> *mut OgaResult,
    pub destroy_generator: unsafe extern "C" fn(*mut OgaGenerator),

    pub create_sequences: unsafe extern "C" fn(*mut *mut OgaSequences) -> *mut OgaResult,
    pub destroy_sequences: unsafe extern "C" fn(*mut OgaSequences),

    pub tokenizer_encode:
        unsafe extern "C" fn(*const OgaTokenizer, *const c_char, *mut OgaSequences) -> *mut OgaResult,

    pub generator_append_token_sequences:
        unsafe extern "C" fn(*mut OgaGenerator, *const OgaSequences) -> *mut OgaResult,
    pub generator_is_done: unsafe extern "C" fn(*const OgaGenerator) -> bool,
    pub generator_generate_next_token: unsafe extern "C" fn(*mut OgaGenerator) -> *mut OgaResult,
    pub generator_get_sequence_count: unsafe extern "C" fn(*const OgaGenerator, usize) -> usize,
    pub generator_get_sequence_data: unsafe extern "C" fn(*const OgaGenerator, usize) -> *const i32,

    pub tokenizer_stream_decode:
        unsafe extern "C" fn(*mut OgaTokenizerStream, i32, *mut *const c_char) -> *mut OgaResult,

    _lib: Library,
}

fn resolve<T: Copy>(lib: &Library, name: &str) -> Result<T, NativeApiError> {
    unsafe {
        let symbol: libloading::Symbol<T> = lib
            .get(name.as_bytes())
            .map_err(|_| NativeApiError::SymbolMissing(name.to_string()))?;
        Ok(*symbol)
    }
}

impl GenAiApi {
    /// Load the shared library at `path` and resolve every symbol this crate uses.
    pub fn load(path: &Path) -> Result<Self, NativeApiError> {
        let lib = unsafe { Library::new(path) }
            .map_err(|e| NativeApiError::LibraryLoad(format!("{}: {}", path.display(), e)))?;

        Ok(GenAiApi {
            result_get_error: resolve(&lib, "OgaResultGetError")?,
            destroy_result: resolve(&lib, "OgaDestroyResult")?,
            create_model: resolve(&lib, "OgaCreateModel")?,
            destroy_model: resolve(&lib, "OgaDestroyModel")?,
            create_tokenizer: resolve(&lib, "OgaCreateTokenizer")?,
            destroy_tokenizer: resolve(&lib, "OgaDestroyTokenizer")?,
            create_tokenizer_stream: resolve(&lib, "OgaCreateTokenizerStream")?,
            destroy_tokenizer_stream: resolve(&lib, "OgaDestroyTokenizerStream")?,
            create_generator_params: resolve(&lib, "OgaCreateGeneratorParams")?,
            params_set_search_number: resolve(&lib, "OgaGeneratorParamsSetSearchNumber")?,
            destroy_generator_params: resolve(&lib, "OgaDestroyGeneratorParams")?,
            create_generator: resolve(&lib, "OgaCreateGenerator")?,
            destroy_generator: resolve(&lib, "OgaDestroyGenerator")?,
            create_sequences: resolve(&lib, "OgaCreateSequences")?,
            destroy_sequences: resolve(&lib, "OgaDestroySequences")?,
            tokenizer_encode: resolve(&lib, "OgaTokenizerEncode")?,
            generator_append_token_sequences: resolve(&lib, "OgaGenerator_AppendTokenSequences")?,
            generator_is_done: resolve(&lib, "OgaGenerator_IsDone")?,
            generator_generate_next_token: resolve(&lib, "OgaGenerator_GenerateNextToken")?,
            generator_get_sequence_count: resolve(&lib, "OgaGenerator_GetSequenceCount")?,
            generator_get_sequence_data: resolve(&lib, "OgaGenerator_GetSequenceData")?,
            tokenizer_stream_decode: resolve(&lib, "OgaTokenizerStreamDecode")?,
            _lib: lib,
        })
    }

    /// Convert a raw `OgaResult*` into `Result`, consuming the result object.
    ///
    /// A null pointer signals success. A non-null pointer carries an error
    /// message which is copied out before the result object is destroyed, so
    /// the native allocation never outlives this call.
    pub fn check(&self, result: *mut OgaResult) -> Result<(), NativeApiError> {
        if result.is_null() {
            return Ok(());
        }
        let message = unsafe {
            let raw = (self.result_get_error)(result);
            if raw.is_null() {
                "unknown native error".to_string()
            } else {
                CStr::from_ptr(raw).to_string_lossy().into_owned()
            }
        };
        unsafe { (self.destroy_result)(result) };
        Err(NativeApiError::Native(message))
    }
}
