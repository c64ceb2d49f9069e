use super::{command_line, exit_code_label, run_captured, ToolEnv};
use crate::error::TaskError;
use std::ffi::OsString;
use std::path::Path;

/// Returned when the recognizer produced neither an output file nor stdout.
pub const NO_TEXT_OUTPUT: &str = "No text output.";

/// `-i <image> <text-out> ocr --model <name> --lines <json-in>`
pub fn recognize_args(image: &Path, text_out: &Path, model: &str, json_in: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        image.into(),
        text_out.into(),
        "ocr".into(),
        "--model".into(),
        model.into(),
        "--lines".into(),
        json_in.into(),
    ]
}

/// Recognize `image` using the line segmentation in `json_in`.
///
/// The text comes from `text_out` when the recognizer wrote it, otherwise from stdout.
/// `text_out` is removed afterwards in every case; a failed removal is only logged.
pub fn recognize(
    env: &ToolEnv,
    image: &Path,
    model: &str,
    json_in: &Path,
    text_out: &Path,
) -> Result<String, TaskError> {
    let res = run_recognizer(env, image, model, json_in, text_out);
    discard_output(text_out);
    res
}

fn run_recognizer(
    env: &ToolEnv,
    image: &Path,
    model: &str,
    json_in: &Path,
    text_out: &Path,
) -> Result<String, TaskError> {
    let args = recognize_args(image, text_out, model, json_in);
    tracing::info!(command = %command_line(&env.recognizer, &args), "starting recognition");
    let output = run_captured(&env.recognizer, env.command(&env.recognizer, &args))?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

    if !output.status.success() {
        return Err(TaskError::ProcessFailed {
            step: "OCR",
            code: exit_code_label(&output.status),
            detail: format!(
                "Stderr:\n{}\nStdout:\n{}",
                String::from_utf8_lossy(&output.stderr),
                stdout
            ),
        });
    }

    if text_out.exists() {
        let bytes = std::fs::read(text_out)?;
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }
    if stdout.is_empty() {
        Ok(NO_TEXT_OUTPUT.to_string())
    } else {
        Ok(stdout)
    }
}

fn discard_output(text_out: &Path) {
    if !text_out.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_file(text_out) {
        tracing::warn!(path = %text_out.display(), error = %e, "failed to remove OCR output file");
    }
}
