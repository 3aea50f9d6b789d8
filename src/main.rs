// src/main.rs
use rust_genai_chat::runtime_interface;
use std::error::Error;

fn main() {
    if let Err(e) = runtime_interface::run_cli() {
        eprintln!("Application error: {}", e);
        let mut current_err: Option<&(dyn std::error::Error + 'static)> = e.source();
        while let Some(source) = current_err {
            eprintln!("Caused by: {}", source);
            current_err = source.source();
        }
        std::process::exit(1);
    }
}
