// src/runtime_interface.rs

use std::error::Error;
use std::io;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;
use log::info;

use crate::chat_session::{self, GenAiEngine, SessionOptions, TurnError};
use crate::native_api::{self, NativeApiError};
use crate::prompt_template::PromptTemplate;
use crate::runtime_core::Runtime;

// 1. Define CLI Arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Interactive chat client for ONNX Runtime GenAI models", long_about = None)]
pub struct CliArgs {
    /// Path to the model directory (weights plus genai_config.json)
    #[clap(value_parser)]
    pub model_path: PathBuf,

    /// Explicit path to the GenAI shared library; by default the platform
    /// library name is resolved through the dynamic linker search path
    #[clap(long, value_parser)]
    pub library: Option<PathBuf>,

    /// Prompt template: instruct, chatml, phi or plain.
    /// Defaults to auto-detection from genai_config.json
    #[clap(long, value_parser)]
    pub template: Option<PromptTemplate>,

    /// Total context budget in tokens
    #[clap(long, value_parser, default_value_t = 2048)]
    pub max_length: usize,

    /// Sampling temperature
    #[clap(long, value_parser, default_value_t = 0.7)]
    pub temperature: f64,
}

// Custom error wrapper to combine the error types of the layers below
#[derive(Debug)]
pub enum RuntimeError {
    NativeApi(NativeApiError),
    Turn(TurnError),
    Io(io::Error),
    Usage(String),
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::NativeApi(e) => write!(f, "Native API error: {}", e),
            RuntimeError::Turn(e) => write!(f, "Session error: {}", e),
            RuntimeError::Io(e) => write!(f, "IO error: {}", e),
            RuntimeError::Usage(s) => write!(f, "Usage error: {}", s),
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RuntimeError::NativeApi(e) => Some(e),
            RuntimeError::Turn(e) => Some(e),
            RuntimeError::Io(e) => Some(e),
            RuntimeError::Usage(_) => None,
        }
    }
}

impl From<NativeApiError> for RuntimeError {
    fn from(err: NativeApiError) -> Self {
        RuntimeError::NativeApi(err)
    }
}
impl From<TurnError> for RuntimeError {
    fn from(err: TurnError) -> Self {
        RuntimeError::Turn(err)
    }
}
impl From<io::Error> for RuntimeError {
    fn from(err: io::Error) -> Self {
        RuntimeError::Io(err)
    }
}

// 2. `run_cli` Function
pub fn run_cli() -> Result<(), RuntimeError> {
    let _ = env_logger::try_init();

    // The reference behaviour pins exit code 1 for a missing model path, so
    // parse errors are mapped to our own error instead of clap's exit(2).
    // Help and version remain normal termination.
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return Ok(());
        }
        Err(e) => {
            let _ = e.print();
            return Err(RuntimeError::Usage(
                "missing or invalid command-line arguments".to_string(),
            ));
        }
    };

    run_chat(&args)
}

fn run_chat(args: &CliArgs) -> Result<(), RuntimeError> {
    let runtime = match &args.library {
        Some(path) => {
            info!("loading GenAI runtime library from {}", path.display());
            Runtime::load(path)?
        }
        None => {
            info!("loading GenAI runtime library '{}'", native_api::DEFAULT_LIBRARY);
            Runtime::load_default()?
        }
    };

    println!("Loading model from: {}...", args.model_path.display());
    let options = SessionOptions {
        max_length: args.max_length,
        temperature: args.temperature,
    };
    let mut engine = GenAiEngine::bootstrap(&runtime, &args.model_path, &options)?;

    let template = args
        .template
        .unwrap_or_else(|| PromptTemplate::detect(&args.model_path));
    info!("using prompt template {:?}", template);

    println!("Model loaded! Type '/exit' to quit.");

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    let mut errors = io::stderr();
    let result =
        chat_session::run_chat_loop(&mut engine, template, &mut input, &mut output, &mut errors);

    // Cleanup happens on every path: `engine` drops its handles in reverse
    // creation order, then `runtime` unmaps the library.
    result.map_err(RuntimeError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parse_positional_and_defaults() {
        let args =
            CliArgs::try_parse_from(["genai_chat_cli", "/models/llama2"]).expect("parse failed");
        assert_eq!(args.model_path, PathBuf::from("/models/llama2"));
        assert_eq!(args.max_length, 2048);
        assert!((args.temperature - 0.7).abs() < f64::EPSILON);
        assert!(args.library.is_none());
        assert!(args.template.is_none());
    }

    #[test]
    fn test_cli_args_parse_all_flags() {
        let args = CliArgs::try_parse_from([
            "genai_chat_cli",
            "/models/phi3",
            "--library",
            "/opt/genai/libonnxruntime-genai.so",
            "--template",
            "phi",
            "--max-length",
            "4096",
            "--temperature",
            "0.2",
        ])
        .expect("parse failed");
        assert_eq!(args.template, Some(PromptTemplate::Phi));
        assert_eq!(args.max_length, 4096);
        assert_eq!(
            args.library,
            Some(PathBuf::from("/opt/genai/libonnxruntime-genai.so"))
        );
    }

    #[test]
    fn test_cli_args_missing_model_path_is_error() {
        assert!(CliArgs::try_parse_from(["genai_chat_cli"]).is_err());
    }

    #[test]
    fn test_cli_args_unknown_template_is_error() {
        let result =
            CliArgs::try_parse_from(["genai_chat_cli", "/models/x", "--template", "mystery"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_runtime_error_display_and_source() {
        let err = RuntimeError::from(NativeApiError::Native("model load failed".to_string()));
        assert!(format!("{}", err).contains("model load failed"));
        assert!(err.source().is_some());

        let usage = RuntimeError::Usage("missing arguments".to_string());
        assert!(usage.source().is_none());
    }
}
