// src/prompt_template.rs
//
// Prompt formatting per model family. The conversational wrapping a model
// expects ([INST] tags, ChatML markers, ...) is a property of the model, not
// of this client, so the template is selected from the model directory's
// genai_config.json and can be overridden with --template.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use log::debug;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Llama-2 / Mistral instruction style: `[INST] ... [/INST]`.
    Instruct,
    /// ChatML style markers, used by Qwen and friends.
    ChatMl,
    /// Phi-3 style markers.
    Phi,
    /// No wrapping at all; the raw user text is the prompt.
    Plain,
}

impl PromptTemplate {
    /// Wrap one turn of raw user text into the prompt the model expects.
    pub fn format_turn(&self, user_text: &str) -> String {
        match self {
            PromptTemplate::Instruct => format!("[INST] {} [/INST]", user_text),
            PromptTemplate::ChatMl => format!(
                "<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n",
                user_text
            ),
            PromptTemplate::Phi => format!("<|user|>\n{}<|end|>\n<|assistant|>\n", user_text),
            PromptTemplate::Plain => user_text.to_string(),
        }
    }

    /// Map a genai_config.json `model.type` value to a template.
    pub fn for_model_type(model_type: &str) -> PromptTemplate {
        if model_type.starts_with("phi") {
            return PromptTemplate::Phi;
        }
        match model_type {
            "llama" | "mistral" => PromptTemplate::Instruct,
            "qwen2" | "qwen3" => PromptTemplate::ChatMl,
            _ => PromptTemplate::Instruct,
        }
    }

    /// Pick a template by inspecting `genai_config.json` inside the model
    /// directory. Any failure (missing file, malformed JSON, unknown type)
    /// falls back to `Instruct`, matching the original hard-coded behaviour.
    pub fn detect(model_dir: &Path) -> PromptTemplate {
        let config_path = model_dir.join("genai_config.json");
        match GenAiConfig::load(&config_path) {
            Ok(config) => {
                let model_type = config
                    .model
                    .and_then(|m| m.model_type)
                    .unwrap_or_default();
                let template = PromptTemplate::for_model_type(&model_type);
                debug!(
                    "detected model type '{}' -> template {:?}",
                    model_type, template
                );
                template
            }
            Err(e) => {
                debug!(
                    "could not read {}: {}; falling back to Instruct",
                    config_path.display(),
                    e
                );
                PromptTemplate::Instruct
            }
        }
    }
}

impl FromStr for PromptTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instruct" => Ok(PromptTemplate::Instruct),
            "chatml" => Ok(PromptTemplate::ChatMl),
            "phi" => Ok(PromptTemplate::Phi),
            "plain" => Ok(PromptTemplate::Plain),
            other => Err(format!(
                "unknown template '{}' (expected instruct, chatml, phi or plain)",
                other
            )),
        }
    }
}

// Only the fields this client needs; real genai_config.json files carry much
// more, which serde skips.
#[derive(Deserialize, Debug)]
struct GenAiConfig {
    model: Option<ModelSection>,
}

#[derive(Deserialize, Debug)]
struct ModelSection {
    #[serde(rename = "type")]
    model_type: Option<String>,
}

impl GenAiConfig {
    fn load(config_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let mut file = File::open(config_path)
            .map_err(|e| format!("failed to open {}: {}", config_path.display(), e))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| format!("failed to read {}: {}", config_path.display(), e))?;
        let config: GenAiConfig = serde_json::from_str(&contents)
            .map_err(|e| format!("failed to parse {}: {}", config_path.display(), e))?;
        Ok(config)
    }
}
