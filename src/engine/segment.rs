use super::{command_line, exit_code_label, run_captured, ToolEnv};
use crate::error::TaskError;
use std::ffi::OsString;
use std::path::Path;

/// `-i <image> <json-out> segment`
pub fn segment_args(image: &Path, json_out: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        image.into(),
        json_out.into(),
        "segment".into(),
    ]
}

/// Run the segmenter, leaving the line polygons in `json_out`.
///
/// A stale file from an earlier run is removed first so a later read never picks up
/// geometry belonging to another image.
pub fn segment(env: &ToolEnv, image: &Path, json_out: &Path) -> Result<(), TaskError> {
    if json_out.exists() {
        if let Err(e) = std::fs::remove_file(json_out) {
            tracing::warn!(path = %json_out.display(), error = %e, "failed to remove stale segmentation file");
        }
    }

    let args = segment_args(image, json_out);
    tracing::info!(command = %command_line(&env.segmenter, &args), "starting segmentation");
    let output = run_captured(&env.segmenter, env.command(&env.segmenter, &args))?;

    if !output.status.success() {
        return Err(TaskError::ProcessFailed {
            step: "Segmentation",
            code: exit_code_label(&output.status),
            detail: format!("Stderr:\n{}", String::from_utf8_lossy(&output.stderr)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn args_follow_command_surface() {
        let args = segment_args(Path::new("page.png"), Path::new("/w/seg.json"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["-i", "page.png", "/w/seg.json", "segment"]);
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_reports_code_and_stderr() {
        use crate::engine::test_support::{install_script, process_lock};
        let _guard = process_lock();
        let bin = tempfile::tempdir().unwrap();
        install_script(bin.path(), "kraken", "echo 'cannot open image' >&2\nexit 4");
        let env = ToolEnv {
            kraken_dir: Some(bin.path().to_path_buf()),
            segmenter: "kraken".into(),
            recognizer: "kraken".into(),
            trainer: "ketos".into(),
        };
        let out = bin.path().join("seg.json");

        let err = segment(&env, &PathBuf::from("missing.png"), &out).unwrap_err();
        let text = err.describe();
        assert!(text.contains("Code: 4"), "{text}");
        assert!(text.contains("cannot open image"), "{text}");
    }

    #[cfg(unix)]
    #[test]
    fn missing_executable_is_not_found() {
        use crate::engine::test_support::process_lock;
        let _guard = process_lock();
        let env = ToolEnv {
            kraken_dir: None,
            segmenter: "kraken-tui-no-such-segmenter".into(),
            recognizer: "kraken".into(),
            trainer: "ketos".into(),
        };
        let dir = tempfile::tempdir().unwrap();
        let err = segment(&env, Path::new("a.png"), &dir.path().join("s.json")).unwrap_err();
        assert!(matches!(err, TaskError::ExecutableNotFound { .. }));
    }
}
