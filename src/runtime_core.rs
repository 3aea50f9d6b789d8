// src/runtime_core.rs
//
// Safe ownership layer over the raw GenAI handles. Each wrapper owns exactly
// one native handle and releases it exactly once in `Drop`; every wrapper
// also holds an `Rc` of the resolved API table, which keeps the shared
// library mapped for as long as any handle is alive. The process is strictly
// single threaded, so `Rc` (not `Arc`) is the right fit.

use std::ffi::CString;
use std::path::Path;
use std::ptr;
use std::rc::Rc;

use crate::native_api::{self, GenAiApi, NativeApiError};

fn to_c_path(path: &Path) -> Result<CString, NativeApiError> {
    let text = path
        .to_str()
        .ok_or_else(|| NativeApiError::InvalidPath("path contains invalid UTF-8".to_string()))?;
    CString::new(text)
        .map_err(|_| NativeApiError::InvalidPath("path contains a null byte".to_string()))
}

fn to_c_string(text: &str) -> Result<CString, NativeApiError> {
    CString::new(text)
        .map_err(|_| NativeApiError::InvalidPath("string contains a null byte".to_string()))
}

/// Entry point to the native runtime: a loaded library plus its symbol table.
///
/// Dropping the `Runtime` unmaps the library only after every handle created
/// from it has been dropped, because each handle shares the `Rc`.
pub struct Runtime {
    api: Rc<GenAiApi>,
}

impl Runtime {
    pub fn load(library_path: &Path) -> Result<Self, NativeApiError> {
        let api = GenAiApi::load(library_path)?;
        Ok(Runtime { api: Rc::new(api) })
    }

    /// Load the library under its platform default name, letting the dynamic
    /// linker search its usual paths.
    pub fn load_default() -> Result<Self, NativeApiError> {
        Runtime::load(Path::new(native_api::DEFAULT_LIBRARY))
    }

    /// Load model weights and execution context from a model directory.
    pub fn create_model(&self, model_dir: &Path) -> Result<Model, NativeApiError> {
        let c_path = to_c_path(model_dir)?;
        let mut raw = ptr::null_mut();
        self.api
            .check(unsafe { (self.api.create_model)(c_path.as_ptr(), &mut raw) })?;
        Ok(Model {
            raw,
            api: Rc::clone(&self.api),
        })
    }
}

pub struct Model {
    raw: *mut native_api::OgaModel,
    api: Rc<GenAiApi>,
}

impl Model {
    pub fn create_tokenizer(&self) -> Result<Tokenizer, NativeApiError> {
        let mut raw = ptr::null_mut();
        self.api
            .check(unsafe { (self.api.create_tokenizer)(self.raw, &mut raw) })?;
        Ok(Tokenizer {
            raw,
            api: Rc::clone(&self.api),
        })
    }

    pub fn create_generator_params(&self) -> Result<GeneratorParams, NativeApiError> {
        let mut raw = ptr::null_mut();
        self.api
            .check(unsafe { (self.api.create_generator_params)(self.raw, &mut raw) })?;
        Ok(GeneratorParams {
            raw,
            api: Rc::clone(&self.api),
        })
    }

    pub fn create_generator(&self, params: &GeneratorParams) -> Result<Generator, NativeApiError> {
        let mut raw = ptr::null_mut();
        self.api
            .check(unsafe { (self.api.create_generator)(self.raw, params.raw, &mut raw) })?;
        Ok(Generator {
            raw,
            api: Rc::clone(&self.api),
        })
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            unsafe { (self.api.destroy_model)(self.raw) };
        }
    }
}

pub struct Tokenizer {
    raw: *mut native_api::OgaTokenizer,
    api: Rc<GenAiApi>,
}

impl Tokenizer {
    pub fn create_stream(&self) -> Result<TokenizerStream, NativeApiError> {
        let mut raw = ptr::null_mut();
        self.api
            .check(unsafe { (self.api.create_tokenizer_stream)(self.raw, &mut raw) })?;
        Ok(TokenizerStream {
            raw,
            api: Rc::clone(&self.api),
        })
    }

    /// Encode `text` into a fresh token-id batch.
    pub fn encode(&self, text: &str) -> Result<Sequences, NativeApiError> {
        let c_text = to_c_string(text)?;
        let mut raw = ptr::null_mut();
        self.api
            .check(unsafe { (self.api.create_sequences)(&mut raw) })?;
        let sequences = Sequences {
            raw,
            api: Rc::clone(&self.api),
        };
        // Encode after wrapping so the container is released even when the
        // encode call itself fails.
        self.api.check(unsafe {
            (self.api.tokenizer_encode)(self.raw, c_text.as_ptr(), sequences.raw)
        })?;
        Ok(sequences)
    }
}

impl Drop for Tokenizer {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            unsafe { (self.api.destroy_tokenizer)(self.raw) };
        }
    }
}

/// Incremental decode state for streaming output.
///
/// The stream buffers partial UTF-8 and partial-subword fragments across
/// calls; a token id must never be decoded outside of it. Decoding is
/// sequential only, so the stream is consumed through `&mut self`.
pub struct TokenizerStream {
    raw: *mut native_api::OgaTokenizerStream,
    api: Rc<GenAiApi>,
}

impl TokenizerStream {
    /// Decode one token id into a text fragment. The fragment may be empty
    /// when the token only completes internal state (e.g. half of a
    /// multi-byte character).
    pub fn decode(&mut self, token: i32) -> Result<String, NativeApiError> {
        let mut raw_text: *const std::os::raw::c_char = ptr::null();
        self.api
            .check(unsafe { (self.api.tokenizer_stream_decode)(self.raw, token, &mut raw_text) })?;
        if raw_text.is_null() {
            return Ok(String::new());
        }
        // The returned buffer is owned by the stream and only valid until the
        // next decode call, so it is copied out immediately.
        let fragment = unsafe { std::ffi::CStr::from_ptr(raw_text) }
            .to_string_lossy()
            .into_owned();
        Ok(fragment)
    }
}

impl Drop for TokenizerStream {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            unsafe { (self.api.destroy_tokenizer_stream)(self.raw) };
        }
    }
}

pub struct GeneratorParams {
    raw: *mut native_api::OgaGeneratorParams,
    api: Rc<GenAiApi>,
}

impl GeneratorParams {
    /// Set a named numeric search option, e.g. `max_length` or `temperature`.
    pub fn set_search_number(&mut self, name: &str, value: f64) -> Result<(), NativeApiError> {
        let c_name = to_c_string(name)?;
        self.api.check(unsafe {
            (self.api.params_set_search_number)(self.raw, c_name.as_ptr(), value)
        })
    }
}

impl Drop for GeneratorParams {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            unsafe { (self.api.destroy_generator_params)(self.raw) };
        }
    }
}

/// Mutable conversation state. Tokens appended or generated here accumulate
/// in the native KV cache turn over turn, which is how the chat keeps its
/// multi-turn memory.
pub struct Generator {
    raw: *mut native_api::OgaGenerator,
    api: Rc<GenAiApi>,
}

impl Generator {
    /// Append an encoded token batch to the running context. The batch
    /// carries no state of its own afterwards and can be dropped right away.
    pub fn append(&mut self, sequences: &Sequences) -> Result<(), NativeApiError> {
        self.api.check(unsafe {
            (self.api.generator_append_token_sequences)(self.raw, sequences.raw)
        })
    }

    /// Whether the native layer considers the current reply finished
    /// (end-of-sequence produced or `max_length` reached).
    pub fn is_done(&self) -> bool {
        unsafe { (self.api.generator_is_done)(self.raw) }
    }

    /// Run one inference step, extending the context by one token.
    pub fn generate_next_token(&mut self) -> Result<(), NativeApiError> {
        self.api
            .check(unsafe { (self.api.generator_generate_next_token)(self.raw) })
    }

    /// Current length of a sequence slot in tokens.
    pub fn sequence_len(&self, index: usize) -> usize {
        unsafe { (self.api.generator_get_sequence_count)(self.raw, index) }
    }

    /// Most recently generated token id of a sequence slot, if any.
    pub fn last_token(&self, index: usize) -> Option<i32> {
        let len = self.sequence_len(index);
        if len == 0 {
            return None;
        }
        let data = unsafe { (self.api.generator_get_sequence_data)(self.raw, index) };
        if data.is_null() {
            return None;
        }
        Some(unsafe { *data.add(len - 1) })
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            unsafe { (self.api.destroy_generator)(self.raw) };
        }
    }
}

/// Transient encoded-token batch for one turn. Never outlives the turn that
/// created it.
pub struct Sequences {
    raw: *mut native_api::OgaSequences,
    api: Rc<GenAiApi>,
}

impl Drop for Sequences {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            unsafe { (self.api.destroy_sequences)(self.raw) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_runtime_load_missing_library_is_error() {
        let result = Runtime::load(&PathBuf::from("/nonexistent/libonnxruntime-genai.so"));
        assert!(result.is_err());
        let message = format!("{}", result.err().unwrap());
        assert!(message.contains("Library load error"), "got: {}", message);
    }

    #[test]
    fn test_to_c_path_rejects_interior_null() {
        let path = PathBuf::from("model\0dir");
        assert!(matches!(
            to_c_path(&path),
            Err(NativeApiError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_to_c_string_accepts_plain_text() {
        assert!(to_c_string("[INST] hello [/INST]").is_ok());
        assert!(to_c_string("bad\0text").is_err());
    }
}
