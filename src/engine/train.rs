use super::{command_line, exit_code_label, spawn_error, ProgressSink, ToolEnv};
use crate::error::TaskError;
use crate::model::TrainingPair;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::process::Stdio;

pub const MODEL_EXTENSION: &str = ".mlmodel";

/// Append the model extension unless the name already carries it.
pub fn normalize_model_name(name: &str) -> String {
    if name.ends_with(MODEL_EXTENSION) {
        name.to_string()
    } else {
        format!("{name}{MODEL_EXTENSION}")
    }
}

/// `train -o <model-out> --epochs <N> -f text <image1> <gt1> ...`
pub fn train_args(output_model: &str, epochs: u32, pairs: &[TrainingPair]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "train".into(),
        "-o".into(),
        output_model.into(),
        "--epochs".into(),
        epochs.to_string().into(),
        "-f".into(),
        "text".into(),
    ];
    for pair in pairs {
        args.push(pair.image.clone().into_os_string());
        args.push(pair.ground_truth.clone().into_os_string());
    }
    args
}

/// Run the trainer, forwarding every line it prints to `progress` as it arrives.
///
/// Standard error shares the standard output pipe, so lines keep the order the
/// trainer wrote them in. The pipe is drained and the child reaped before this
/// returns, so all progress is posted ahead of the terminal notification.
pub fn train(
    env: &ToolEnv,
    output_model: &str,
    epochs: u32,
    pairs: &[TrainingPair],
    progress: &ProgressSink,
) -> Result<(), TaskError> {
    let args = train_args(output_model, epochs, pairs);
    let line = command_line(&env.trainer, &args);
    tracing::info!(command = %line, pairs = pairs.len(), "starting training");
    progress.emit(format!("Executing command: {line}\n\n"));

    let (reader, writer) = std::io::pipe()?;
    // The command (and with it our copies of the write end) is dropped at the end of
    // this statement; otherwise the reader would never see end of file.
    let mut child = env
        .command(&env.trainer, &args)
        .stdout(Stdio::from(writer.try_clone()?))
        .stderr(Stdio::from(writer))
        .spawn()
        .map_err(|e| spawn_error(&env.trainer, e))?;

    let pumped = pump_lines(reader, progress);
    let status = child.wait()?;
    tracing::info!(status = %exit_code_label(&status), "training exited");
    pumped?;

    if !status.success() {
        return Err(TaskError::ProcessFailed {
            step: "Training",
            code: exit_code_label(&status),
            detail: String::new(),
        });
    }
    Ok(())
}

fn pump_lines<R: Read>(reader: R, sink: &ProgressSink) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        sink.emit(String::from_utf8_lossy(&buf).into_owned());
    }
}
