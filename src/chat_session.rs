// src/chat_session.rs
//
// The interactive turn loop: read a line, wrap it in the prompt template,
// push it into the generator, then stream the reply fragment by fragment.
// The loop talks to the model through the `ChatEngine` trait so the control
// flow can be exercised in tests with a scripted engine.

use std::io::{BufRead, Write};
use std::path::Path;

use log::debug;

use crate::native_api::NativeApiError;
use crate::prompt_template::PromptTemplate;
use crate::runtime_core::{Generator, GeneratorParams, Model, Runtime, Tokenizer, TokenizerStream};

/// Failure raised while processing one conversational turn.
///
/// `Recoverable` means the generator's context was not touched: the turn is
/// reported and the session returns to the prompt. `Fatal` means the context
/// may be inconsistent (a partial append, or a failed inference step), so the
/// whole session ends and falls through to cleanup.
#[derive(Debug)]
pub enum TurnError {
    Recoverable(String),
    Fatal(String),
}

impl std::fmt::Display for TurnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnError::Recoverable(msg) => write!(f, "{}", msg),
            TurnError::Fatal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TurnError {}

impl From<std::io::Error> for TurnError {
    fn from(err: std::io::Error) -> TurnError {
        TurnError::Fatal(format!("IO error: {}", err))
    }
}

/// What the turn loop needs from the model side.
pub trait ChatEngine {
    /// Encode a formatted prompt and append it to the running context.
    fn push_prompt(&mut self, prompt: &str) -> Result<(), TurnError>;
    /// Whether the current reply is finished.
    fn is_done(&self) -> bool;
    /// Advance by one token and decode it. The fragment may be empty when the
    /// token only completes internal decode state.
    fn next_fragment(&mut self) -> Result<String, TurnError>;
    /// Accumulated context length in tokens.
    fn context_len(&self) -> usize;
}

/// Numeric generation options applied at bootstrap.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Total context budget in tokens, prompt and replies included.
    pub max_length: usize,
    /// Sampling softness.
    pub temperature: f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            max_length: 2048,
            temperature: 0.7,
        }
    }
}

/// The live session over the native runtime: all five long-lived handles in
/// one place. Field order is drop order, which keeps destruction the exact
/// reverse of creation (generator, params, stream, tokenizer, model).
pub struct GenAiEngine {
    generator: Generator,
    _params: GeneratorParams,
    stream: TokenizerStream,
    tokenizer: Tokenizer,
    _model: Model,
}

impl GenAiEngine {
    /// Create every handle in dependency order. A failure part-way leaves the
    /// already-built wrappers to drop normally, so exactly the handles that
    /// were acquired get released.
    pub fn bootstrap(
        runtime: &Runtime,
        model_dir: &Path,
        options: &SessionOptions,
    ) -> Result<Self, NativeApiError> {
        let model = runtime.create_model(model_dir)?;
        let tokenizer = model.create_tokenizer()?;
        let stream = tokenizer.create_stream()?;
        let mut params = model.create_generator_params()?;
        params.set_search_number("max_length", options.max_length as f64)?;
        params.set_search_number("temperature", options.temperature)?;
        let generator = model.create_generator(&params)?;
        Ok(GenAiEngine {
            generator,
            _params: params,
            stream,
            tokenizer,
            _model: model,
        })
    }
}

impl ChatEngine for GenAiEngine {
    fn push_prompt(&mut self, prompt: &str) -> Result<(), TurnError> {
        // An encode failure has not touched the generator: recoverable.
        let sequences = self
            .tokenizer
            .encode(prompt)
            .map_err(|e| TurnError::Recoverable(e.to_string()))?;
        // A failed append may leave a partial context behind: fatal.
        self.generator
            .append(&sequences)
            .map_err(|e| TurnError::Fatal(e.to_string()))
        // `sequences` drops here; the generator owns its own copy of the tokens.
    }

    fn is_done(&self) -> bool {
        self.generator.is_done()
    }

    fn next_fragment(&mut self) -> Result<String, TurnError> {
        self.generator
            .generate_next_token()
            .map_err(|e| TurnError::Fatal(e.to_string()))?;
        match self.generator.last_token(0) {
            Some(token) => self
                .stream
                .decode(token)
                .map_err(|e| TurnError::Fatal(e.to_string())),
            None => Ok(String::new()),
        }
    }

    fn context_len(&self) -> usize {
        self.generator.sequence_len(0)
    }
}

/// Run the conversation until exit, EOF or a fatal failure.
///
/// Exit conditions, all of them normal termination:
/// - end of input on `input`
/// - the literal lines `/exit` and `exit` (exact, case sensitive)
///
/// Empty lines re-prompt without touching the engine. Recoverable turn
/// failures print one `Error:` line on `errors` and keep the session alive;
/// fatal ones propagate to the caller after current output is flushed.
pub fn run_chat_loop<E: ChatEngine>(
    engine: &mut E,
    template: PromptTemplate,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    errors: &mut dyn Write,
) -> Result<(), TurnError> {
    loop {
        write!(output, "\n>>> User: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            // EOF behaves exactly like an exit command.
            break;
        }
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        if line == "/exit" || line == "exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let prompt = template.format_turn(line);
        match engine.push_prompt(&prompt) {
            Ok(()) => {}
            Err(TurnError::Recoverable(msg)) => {
                writeln!(errors, "Error: {}", msg)?;
                errors.flush()?;
                continue;
            }
            Err(fatal) => return Err(fatal),
        }

        write!(output, ">>> Llama: ")?;
        output.flush()?;

        while !engine.is_done() {
            let fragment = match engine.next_fragment() {
                Ok(fragment) => fragment,
                Err(e) => {
                    // Whatever streamed so far stays on screen; the error
                    // line must come after it.
                    writeln!(output)?;
                    output.flush()?;
                    return Err(e);
                }
            };
            write!(output, "{}", fragment)?;
            output.flush()?;
        }
        writeln!(output)?;
        output.flush()?;

        debug!("context length after turn: {} tokens", engine.context_len());
    }
    Ok(())
}
