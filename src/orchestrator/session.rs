//! Presentation state shared by the TUI and the headless modes.
//!
//! Every `begin_*` operation validates synchronously and, on success, occupies the
//! task slot and hands back a [`Job`]. The caller submits it; the matching terminal
//! event fed to [`Session::apply_event`] frees the slot again.

use super::runner::{Job, TaskSlot};
use crate::engine::{self, ToolEnv};
use crate::error::ValidationError;
use crate::model::{
    display_name, TaskEvent, TaskKind, TaskOutcome, TaskValue, ToolConfig, TrainingPair,
};
use crate::overlay::{self, Segment};
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// Messages that deserve a blocking popup rather than just the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info { title: String, body: String },
}

/// Rendered geometry of the last successful segmentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preview {
    pub width: u32,
    pub height: u32,
    pub segments: Vec<Segment>,
    pub lines: usize,
}

#[derive(Debug, Default)]
pub struct OcrPanel {
    pub image: Option<PathBuf>,
    pub original: Option<DynamicImage>,
    pub segmented: bool,
    pub model: String,
    pub result: String,
    pub status: String,
    pub overlay: Option<PathBuf>,
    pub preview: Option<Preview>,
}

#[derive(Debug, Default)]
pub struct TrainingPanel {
    pub pairs: Vec<TrainingPair>,
    pub output_model: String,
    pub epochs: String,
    pub log: Vec<String>,
    pub status: String,
    launched_model: Option<String>,
}

impl TrainingPanel {
    /// Append a text fragment, one log entry per line. Carriage-return progress bars
    /// keep only their latest redraw.
    pub fn append_log(&mut self, text: &str) {
        let text = text.strip_suffix('\n').unwrap_or(text);
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let shown = line
                .rsplit('\r')
                .find(|s| !s.is_empty())
                .unwrap_or_default();
            self.log.push(shown.to_string());
        }
    }
}

#[derive(Debug)]
pub struct Session {
    config: ToolConfig,
    /// Raw contents of the executable directory field, read at every launch.
    pub kraken_dir: String,
    pub ocr: OcrPanel,
    pub training: TrainingPanel,
    slot: TaskSlot,
}

impl Session {
    pub fn new(config: ToolConfig) -> Self {
        let kraken_dir = config
            .kraken_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let ocr = OcrPanel {
            model: config.recognition_model.clone(),
            status: "Ready".into(),
            ..Default::default()
        };
        let training = TrainingPanel {
            output_model: config.output_model.clone(),
            epochs: config.epochs.to_string(),
            status: "Ready to add training files.".into(),
            ..Default::default()
        };
        Self {
            config,
            kraken_dir,
            ocr,
            training,
            slot: TaskSlot::default(),
        }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn active_task(&self) -> Option<TaskKind> {
        self.slot.active()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    pub fn can_segment(&self) -> bool {
        !self.is_busy() && self.ocr.image.is_some()
    }

    pub fn can_recognize(&self) -> bool {
        !self.is_busy() && self.ocr.segmented
    }

    pub fn can_train(&self) -> bool {
        !self.is_busy()
    }

    fn tool_env(&self) -> ToolEnv {
        ToolEnv::from_config(&self.config).with_kraken_dir(&self.kraken_dir)
    }

    // ---- OCR ---------------------------------------------------------------

    /// Select a new image. Any previous segmentation is invalidated, even when the
    /// image itself cannot be decoded for display.
    pub fn select_image(&mut self, path: impl Into<PathBuf>) -> Result<(), ValidationError> {
        if let Some(active) = self.slot.active() {
            return Err(ValidationError::Busy(active));
        }
        let path = path.into();
        if !path.is_file() {
            return Err(ValidationError::MissingFile(path));
        }

        self.ocr.image = Some(path.clone());
        self.ocr.segmented = false;
        self.ocr.result.clear();
        self.ocr.overlay = None;
        self.ocr.preview = None;
        self.ocr.status = "Ready".into();

        match image::open(&path) {
            Ok(img) => {
                self.ocr.original = Some(img);
                Ok(())
            }
            Err(e) => {
                self.ocr.original = None;
                Err(ValidationError::UnreadableImage {
                    message: e.to_string(),
                })
            }
        }
    }

    pub fn begin_segmentation(&mut self) -> Result<Job, ValidationError> {
        let image = self.ocr.image.clone().ok_or(ValidationError::NoImage)?;
        if !image.is_file() {
            return Err(ValidationError::MissingFile(image));
        }
        self.slot.occupy(TaskKind::Segmentation)?;

        self.ocr.segmented = false;
        self.ocr.result.clear();
        self.ocr.overlay = None;
        self.ocr.preview = None;
        self.ocr.status = "Segmenting the image, please wait...".into();

        let env = self.tool_env();
        let json_out = self.config.segmentation_json();
        Ok(Job::new(TaskKind::Segmentation, move |_| {
            engine::segment(&env, &image, &json_out)?;
            Ok(TaskValue::Nothing)
        }))
    }

    fn finish_segmentation(&mut self, outcome: TaskOutcome) {
        if let TaskOutcome::Failure(error) = outcome {
            self.ocr.result = error;
            self.ocr.status = "Error while segmenting the image.".into();
            self.ocr.segmented = false;
            return;
        }

        self.ocr.segmented = true;
        self.ocr.status = "Segmentation complete. Ready to extract text.".into();
        if let Err(e) = self.draw_segmentation() {
            tracing::warn!(error = %e, "failed to draw segmented image");
            self.ocr.status = format!("Error drawing the segmented image: {e}");
        }
    }

    fn draw_segmentation(&mut self) -> Result<(), crate::error::OverlayError> {
        let result = overlay::load_segmentation(&self.config.segmentation_json())?;
        let original = self
            .ocr
            .original
            .as_ref()
            .ok_or(crate::error::OverlayError::NoImage)?;
        let out = self.config.overlay_image();
        let lines = overlay::render_overlay(original, &result, &out)?;
        self.ocr.preview = Some(Preview {
            width: original.width(),
            height: original.height(),
            segments: overlay::overlay_segments(&result),
            lines,
        });
        self.ocr.overlay = Some(out);
        Ok(())
    }

    pub fn begin_recognition(&mut self) -> Result<Job, ValidationError> {
        let image = self.ocr.image.clone().ok_or(ValidationError::NotSegmented)?;
        let json_in = self.config.segmentation_json();
        if !self.ocr.segmented || !json_in.exists() {
            return Err(ValidationError::NotSegmented);
        }
        let model = self.ocr.model.trim().to_string();
        if model.is_empty() {
            return Err(ValidationError::EmptyModel);
        }
        self.slot.occupy(TaskKind::Recognition)?;

        self.ocr.result.clear();
        self.ocr.status = "Extracting text (OCR), please wait...".into();

        let env = self.tool_env();
        let text_out = self.config.ocr_output();
        Ok(Job::new(TaskKind::Recognition, move |_| {
            let text = engine::recognize(&env, &image, &model, &json_in, &text_out)?;
            Ok(TaskValue::Text(text))
        }))
    }

    fn finish_recognition(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Success(value) => {
                self.ocr.result = match value {
                    TaskValue::Text(text) => text,
                    TaskValue::Nothing => String::new(),
                };
                self.ocr.status = "Text recognition completed successfully!".into();
            }
            TaskOutcome::Failure(error) => {
                self.ocr.result = error;
                self.ocr.status = "Error during text recognition.".into();
            }
        }
    }

    // ---- Training ------------------------------------------------------------

    pub fn add_pair(
        &mut self,
        image: impl Into<PathBuf>,
        ground_truth: impl Into<PathBuf>,
    ) -> Result<(), ValidationError> {
        let pair = TrainingPair::new(image, ground_truth);
        for p in [&pair.image, &pair.ground_truth] {
            if !p.is_file() {
                return Err(ValidationError::MissingFile(p.clone()));
            }
        }
        self.training.pairs.push(pair);
        self.training.status = format!("Added {} training pair(s).", self.training.pairs.len());
        Ok(())
    }

    /// Out-of-range indexes are ignored.
    pub fn remove_pair(&mut self, index: usize) -> Option<TrainingPair> {
        if index >= self.training.pairs.len() {
            return None;
        }
        let removed = self.training.pairs.remove(index);
        self.training.status = format!(
            "Removed a pair. Total: {}.",
            self.training.pairs.len()
        );
        Some(removed)
    }

    pub fn clear_pairs(&mut self) {
        self.training.pairs.clear();
        self.training.status = "Training file list cleared.".into();
    }

    pub fn begin_training(&mut self) -> Result<Job, ValidationError> {
        if self.training.pairs.is_empty() {
            return Err(ValidationError::EmptyTrainingSet);
        }
        let name = self.training.output_model.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyOutputModel);
        }
        let model = engine::normalize_model_name(name);
        self.training.output_model = model.clone();

        let epochs = parse_epochs(&self.training.epochs)?;
        self.slot.occupy(TaskKind::Training)?;

        let pairs = self.training.pairs.clone();
        self.training.launched_model = Some(model.clone());
        self.training.status = format!("Starting training for model '{model}'...");
        self.training.log.clear();
        self.training
            .append_log(&format!("Starting training for model: {model} with {epochs} epochs.\n"));
        self.training
            .append_log(&format!("Using {} training pairs.\n", pairs.len()));

        let env = self.tool_env();
        Ok(Job::new(TaskKind::Training, move |sink| {
            engine::train(&env, &model, epochs, &pairs, sink)?;
            Ok(TaskValue::Nothing)
        }))
    }

    fn finish_training(&mut self, outcome: TaskOutcome) -> Option<Notice> {
        let model = self
            .training
            .launched_model
            .take()
            .unwrap_or_else(|| self.training.output_model.clone());
        match outcome {
            TaskOutcome::Success(_) => {
                self.training
                    .append_log(&format!("\nTraining completed successfully! Saved model: {model}"));
                self.training.status = format!("Training complete. Model: {model}");
                Some(Notice::Info {
                    title: "Training complete".into(),
                    body: format!(
                        "The model was trained and saved as:\n{model}\nYou can now use it in the OCR tab."
                    ),
                })
            }
            TaskOutcome::Failure(error) => {
                self.training.append_log(&format!("\nTraining failed.\n{error}"));
                self.training.status = "Training failed.".into();
                None
            }
        }
    }

    // ---- Events ------------------------------------------------------------

    /// Apply one event drained from the runner channel.
    pub fn apply_event(&mut self, ev: TaskEvent) -> Option<Notice> {
        match ev {
            TaskEvent::Progress { text, .. } => {
                self.training.append_log(&text);
                None
            }
            TaskEvent::Finished { kind, outcome } => {
                self.slot.release(kind);
                match kind {
                    TaskKind::Segmentation => {
                        self.finish_segmentation(outcome);
                        None
                    }
                    TaskKind::Recognition => {
                        self.finish_recognition(outcome);
                        None
                    }
                    TaskKind::Training => self.finish_training(outcome),
                }
            }
        }
    }

    /// Image currently shown in the OCR tab, for display.
    pub fn image_label(&self) -> String {
        self.ocr
            .image
            .as_deref()
            .map(display_name)
            .unwrap_or_else(|| "No image file selected".into())
    }

    pub fn overlay_path(&self) -> Option<&Path> {
        self.ocr.overlay.as_deref()
    }
}

/// Epoch count from user text: a strictly positive integer.
pub fn parse_epochs(text: &str) -> Result<u32, ValidationError> {
    match text.trim().parse::<i64>() {
        Ok(n) if n > 0 => u32::try_from(n).map_err(|_| ValidationError::InvalidEpochs),
        _ => Err(ValidationError::InvalidEpochs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    struct Fixture {
        dir: tempfile::TempDir,
        session: Session,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let session = Session::new(ToolConfig::with_work_dir(dir.path()));
            Self { dir, session }
        }

        fn image(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            RgbImage::from_pixel(24, 24, Rgb([255, 255, 255]))
                .save(&path)
                .unwrap();
            path
        }

        fn text(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, "ground truth").unwrap();
            path
        }
    }

    fn finished(kind: TaskKind, outcome: TaskOutcome) -> TaskEvent {
        TaskEvent::Finished { kind, outcome }
    }

    fn ok() -> TaskOutcome {
        TaskOutcome::Success(TaskValue::Nothing)
    }

    #[test]
    fn epochs_must_be_positive_integers() {
        assert_eq!(parse_epochs("100"), Ok(100));
        assert_eq!(parse_epochs(" 3 "), Ok(3));
        for bad in ["0", "-4", "", "abc", "1.5", "99999999999"] {
            assert_eq!(parse_epochs(bad), Err(ValidationError::InvalidEpochs), "{bad}");
        }
    }

    #[test]
    fn segmentation_requires_an_image() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.session.begin_segmentation().unwrap_err(),
            ValidationError::NoImage
        );
        assert!(!fx.session.is_busy());
    }

    #[test]
    fn recognition_rejected_before_segmentation() {
        let mut fx = Fixture::new();
        let img = fx.image("a.png");
        fx.session.select_image(&img).unwrap();
        assert!(!fx.session.can_recognize());
        assert_eq!(
            fx.session.begin_recognition().unwrap_err(),
            ValidationError::NotSegmented
        );
        assert!(!fx.session.is_busy());
    }

    #[test]
    fn selecting_new_image_clears_segmentation() {
        let mut fx = Fixture::new();
        let a = fx.image("a.png");
        let b = fx.image("b.png");
        fx.session.select_image(&a).unwrap();

        let _job = fx.session.begin_segmentation().unwrap();
        std::fs::write(
            fx.session.config().segmentation_json(),
            r#"{"lines":[{"baseline":[[0,0],[10,0],[10,10]]}]}"#,
        )
        .unwrap();
        fx.session
            .apply_event(finished(TaskKind::Segmentation, ok()));
        assert!(fx.session.ocr.segmented);
        assert!(fx.session.can_recognize());

        fx.session.select_image(&b).unwrap();
        assert!(!fx.session.ocr.segmented);
        assert!(fx.session.ocr.preview.is_none());
        assert_eq!(
            fx.session.begin_recognition().unwrap_err(),
            ValidationError::NotSegmented
        );
    }

    #[test]
    fn image_selection_refused_while_busy() {
        let mut fx = Fixture::new();
        let a = fx.image("a.png");
        fx.session.select_image(&a).unwrap();
        let _job = fx.session.begin_segmentation().unwrap();
        assert_eq!(
            fx.session.select_image(&a).unwrap_err(),
            ValidationError::Busy(TaskKind::Segmentation)
        );
        assert!(!fx.session.can_segment());
        assert_eq!(
            fx.session.begin_segmentation().unwrap_err(),
            ValidationError::Busy(TaskKind::Segmentation)
        );
    }

    #[test]
    fn unreadable_image_keeps_selection_but_not_original() {
        let mut fx = Fixture::new();
        let bogus = fx.text("not-an-image.png");
        let err = fx.session.select_image(&bogus).unwrap_err();
        assert!(matches!(err, ValidationError::UnreadableImage { .. }));
        assert_eq!(fx.session.ocr.image.as_deref(), Some(bogus.as_path()));
        assert!(fx.session.ocr.original.is_none());
    }

    #[test]
    fn failed_segmentation_reports_error() {
        let mut fx = Fixture::new();
        let a = fx.image("a.png");
        fx.session.select_image(&a).unwrap();
        let _job = fx.session.begin_segmentation().unwrap();
        fx.session.apply_event(finished(
            TaskKind::Segmentation,
            TaskOutcome::Failure("Segmentation failed:\nCode: 1".into()),
        ));
        assert!(!fx.session.ocr.segmented);
        assert!(!fx.session.is_busy());
        assert!(fx.session.ocr.result.contains("Code: 1"));
        assert_eq!(fx.session.ocr.status, "Error while segmenting the image.");
    }

    #[test]
    fn malformed_json_only_degrades_display() {
        let mut fx = Fixture::new();
        let a = fx.image("a.png");
        fx.session.select_image(&a).unwrap();
        let _job = fx.session.begin_segmentation().unwrap();
        std::fs::write(fx.session.config().segmentation_json(), "{oops").unwrap();
        fx.session.apply_event(finished(TaskKind::Segmentation, ok()));

        assert!(fx.session.ocr.segmented);
        assert!(fx.session.ocr.preview.is_none());
        assert!(fx.session.ocr.status.starts_with("Error drawing"));
        assert!(fx.session.can_recognize());
    }

    #[test]
    fn training_validation_rejects_before_launch() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.session.begin_training().unwrap_err(),
            ValidationError::EmptyTrainingSet
        );

        let img = fx.image("p.png");
        let gt = fx.text("p.gt.txt");
        fx.session.add_pair(&img, &gt).unwrap();
        fx.session.add_pair(&img, &gt).unwrap();
        assert_eq!(fx.session.training.pairs.len(), 2);

        fx.session.training.output_model = "  ".into();
        assert_eq!(
            fx.session.begin_training().unwrap_err(),
            ValidationError::EmptyOutputModel
        );

        fx.session.training.output_model = "arabic".into();
        fx.session.training.epochs = "0".into();
        assert_eq!(
            fx.session.begin_training().unwrap_err(),
            ValidationError::InvalidEpochs
        );
        assert!(!fx.session.is_busy());
        assert_eq!(fx.session.training.output_model, "arabic.mlmodel");
    }

    #[test]
    fn training_lifecycle_logs_and_notifies() {
        let mut fx = Fixture::new();
        let img = fx.image("p.png");
        let gt = fx.text("p.gt.txt");
        fx.session.add_pair(&img, &gt).unwrap();
        fx.session.training.output_model = "mine".into();
        fx.session.training.epochs = "5".into();

        let job = fx.session.begin_training().unwrap();
        assert_eq!(job.kind(), TaskKind::Training);
        assert!(!fx.session.can_train());
        assert_eq!(
            fx.session.training.log,
            [
                "Starting training for model: mine.mlmodel with 5 epochs.",
                "Using 1 training pairs."
            ]
        );

        fx.session.apply_event(TaskEvent::Progress {
            kind: TaskKind::Training,
            text: "epoch 1\n".into(),
        });
        let notice = fx.session.apply_event(finished(TaskKind::Training, ok()));
        assert!(matches!(notice, Some(Notice::Info { .. })));
        assert!(fx.session.can_train());
        assert!(fx.session.training.log.contains(&"epoch 1".to_string()));
        assert_eq!(fx.session.training.status, "Training complete. Model: mine.mlmodel");
    }

    #[test]
    fn add_pair_rejects_missing_files() {
        let mut fx = Fixture::new();
        let img = fx.image("p.png");
        let missing = fx.dir.path().join("nope.txt");
        assert_eq!(
            fx.session.add_pair(&img, &missing).unwrap_err(),
            ValidationError::MissingFile(missing)
        );
        assert!(fx.session.training.pairs.is_empty());
    }

    #[test]
    fn remove_and_clear_pairs() {
        let mut fx = Fixture::new();
        let a = fx.image("a.png");
        let b = fx.image("b.png");
        let gt = fx.text("gt.txt");
        fx.session.add_pair(&a, &gt).unwrap();
        fx.session.add_pair(&b, &gt).unwrap();

        assert_eq!(fx.session.remove_pair(5), None);
        let removed = fx.session.remove_pair(0).unwrap();
        assert_eq!(removed.image, a);
        assert_eq!(fx.session.training.pairs[0].image, b);
        assert_eq!(fx.session.training.status, "Removed a pair. Total: 1.");

        fx.session.clear_pairs();
        assert!(fx.session.training.pairs.is_empty());
    }

    #[test]
    fn carriage_return_progress_keeps_last_redraw() {
        let mut panel = TrainingPanel::default();
        panel.append_log("stage 1/3 10%\rstage 1/3 50%\rstage 1/3 100%\n");
        panel.append_log("line a\nline b\n");
        panel.append_log("windows line\r\n");
        assert_eq!(
            panel.log,
            ["stage 1/3 100%", "line a", "line b", "windows line"]
        );
    }
}
