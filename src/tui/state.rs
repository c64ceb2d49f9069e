use crate::error::ValidationError;
use crate::model::{display_name, ToolConfig};
use crate::orchestrator::{Job, Notice, Session};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;
use std::time::Instant;

pub const TAB_OCR: usize = 0;
pub const TAB_TRAINING: usize = 1;
pub const TAB_HELP: usize = 2;
const TAB_COUNT: usize = 3;

/// Lines moved by PgUp/PgDn in the training log.
const LOG_PAGE: usize = 10;

/// Field a one-line prompt writes into when committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    KrakenDir,
    Image,
    Model,
    OutputModel,
    Epochs,
    PairImage,
    PairGroundTruth { image: PathBuf },
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Field::KrakenDir => "Kraken/Ketos directory",
            Field::Image => "Image file",
            Field::Model => "Recognition model",
            Field::OutputModel => "Output model name",
            Field::Epochs => "Epochs",
            Field::PairImage => "Training image",
            Field::PairGroundTruth { .. } => "Ground-truth file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub field: Field,
    pub buffer: String,
}

/// Popups that swallow keys until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Error { title: String, body: String },
    Info { title: String, body: String },
    ConfirmClear,
    ConfirmQuit,
}

/// What the loop must do after a key press.
#[derive(Debug)]
pub enum Action {
    None,
    Launch(Job),
    Copy(String),
    Quit,
}

pub struct UiState {
    pub tab: usize,
    pub info: String,
    pub session: Session,
    pub prompt: Option<Prompt>,
    pub modal: Option<Modal>,
    pub selected_pair: usize,
    /// Lines scrolled up from the bottom of the training log; 0 follows new output.
    pub log_scroll: usize,
    pub task_started: Option<Instant>,
}

impl UiState {
    pub fn new(config: ToolConfig) -> Self {
        Self {
            tab: TAB_OCR,
            info: "Press ? for help.".into(),
            session: Session::new(config),
            prompt: None,
            modal: None,
            selected_pair: 0,
            log_scroll: 0,
            task_started: None,
        }
    }

    /// The `height` log lines on screen: the tail, or `log_scroll` lines above it.
    pub fn visible_log(&self, height: usize) -> &[String] {
        let log = &self.session.training.log;
        let bottom = log.len().saturating_sub(height);
        let top = bottom.saturating_sub(self.log_scroll);
        let end = (top + height).min(log.len());
        &log[top..end]
    }

    pub fn show_notice(&mut self, notice: Notice) {
        match notice {
            Notice::Info { title, body } => self.modal = Some(Modal::Info { title, body }),
        }
    }

    fn warn(&mut self, err: ValidationError) {
        match err {
            ValidationError::Busy(_) => self.info = err.to_string(),
            other => {
                self.modal = Some(Modal::Error {
                    title: "Warning".into(),
                    body: other.to_string(),
                })
            }
        }
    }

    fn launch(&mut self, begun: Result<Job, ValidationError>) -> Action {
        match begun {
            Ok(job) => {
                self.task_started = Some(Instant::now());
                self.log_scroll = 0;
                self.info = format!("Started {}", job.kind());
                Action::Launch(job)
            }
            Err(e) => {
                self.warn(e);
                Action::None
            }
        }
    }

    fn open_prompt(&mut self, field: Field) {
        let buffer = match &field {
            Field::KrakenDir => self.session.kraken_dir.clone(),
            Field::Image => self
                .session
                .ocr
                .image
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            Field::Model => self.session.ocr.model.clone(),
            Field::OutputModel => self.session.training.output_model.clone(),
            Field::Epochs => self.session.training.epochs.clone(),
            Field::PairImage | Field::PairGroundTruth { .. } => String::new(),
        };
        self.prompt = Some(Prompt { field, buffer });
    }

    fn commit_prompt(&mut self, prompt: Prompt) {
        let Prompt { field, buffer } = prompt;
        match field {
            Field::KrakenDir => {
                self.session.kraken_dir = buffer.trim().to_string();
                self.info = if self.session.kraken_dir.is_empty() {
                    "Using executables from PATH".into()
                } else {
                    format!("Kraken/Ketos directory: {}", self.session.kraken_dir)
                };
            }
            Field::Image => {
                let path = expand_path(&buffer);
                match self.session.select_image(&path) {
                    Ok(()) => self.info = format!("Selected {}", display_name(&path)),
                    Err(e @ ValidationError::UnreadableImage { .. }) => {
                        self.modal = Some(Modal::Error {
                            title: "Image error".into(),
                            body: e.to_string(),
                        });
                    }
                    Err(e) => self.warn(e),
                }
            }
            Field::Model => self.session.ocr.model = buffer.trim().to_string(),
            Field::OutputModel => self.session.training.output_model = buffer.trim().to_string(),
            Field::Epochs => self.session.training.epochs = buffer.trim().to_string(),
            Field::PairImage => {
                let image = expand_path(&buffer);
                if image.is_file() {
                    self.open_prompt(Field::PairGroundTruth { image });
                } else {
                    self.warn(ValidationError::MissingFile(image));
                }
            }
            Field::PairGroundTruth { image } => {
                match self.session.add_pair(image, expand_path(&buffer)) {
                    Ok(()) => {
                        self.selected_pair = self.session.training.pairs.len() - 1;
                        self.info = self.session.training.status.clone();
                    }
                    Err(e) => self.warn(e),
                }
            }
        }
    }

    /// Route one key press. Modals first, then an open prompt, then the shortcuts.
    pub fn handle_key(&mut self, k: KeyEvent) -> Action {
        if let Some(modal) = self.modal.take() {
            return self.handle_modal_key(modal, k);
        }
        if let Some(mut prompt) = self.prompt.take() {
            match k.code {
                KeyCode::Enter => self.commit_prompt(prompt),
                KeyCode::Esc => {}
                KeyCode::Backspace => {
                    prompt.buffer.pop();
                    self.prompt = Some(prompt);
                }
                KeyCode::Char(c) if !k.modifiers.contains(KeyModifiers::CONTROL) => {
                    prompt.buffer.push(c);
                    self.prompt = Some(prompt);
                }
                _ => self.prompt = Some(prompt),
            }
            return Action::None;
        }

        match (k.modifiers, k.code) {
            (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                if self.session.is_busy() {
                    self.modal = Some(Modal::ConfirmQuit);
                    return Action::None;
                }
                return Action::Quit;
            }
            (_, KeyCode::Tab) => self.tab = (self.tab + 1) % TAB_COUNT,
            (_, KeyCode::BackTab) => self.tab = (self.tab + TAB_COUNT - 1) % TAB_COUNT,
            (_, KeyCode::Char('?')) => self.tab = TAB_HELP,
            (_, KeyCode::Char('p')) => self.open_prompt(Field::KrakenDir),
            _ => match self.tab {
                TAB_OCR => return self.handle_ocr_key(k),
                TAB_TRAINING => return self.handle_training_key(k),
                _ => {}
            },
        }
        Action::None
    }

    fn handle_modal_key(&mut self, modal: Modal, k: KeyEvent) -> Action {
        match modal {
            Modal::ConfirmQuit => match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => return Action::Quit,
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {}
                _ => self.modal = Some(Modal::ConfirmQuit),
            },
            Modal::ConfirmClear => match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.session.clear_pairs();
                    self.selected_pair = 0;
                    self.info = self.session.training.status.clone();
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {}
                _ => self.modal = Some(Modal::ConfirmClear),
            },
            // Any key dismisses.
            Modal::Error { .. } | Modal::Info { .. } => {}
        }
        Action::None
    }

    fn handle_ocr_key(&mut self, k: KeyEvent) -> Action {
        match k.code {
            KeyCode::Char('i') | KeyCode::Enter => self.open_prompt(Field::Image),
            KeyCode::Char('m') => self.open_prompt(Field::Model),
            KeyCode::Char('s') => {
                let begun = self.session.begin_segmentation();
                return self.launch(begun);
            }
            KeyCode::Char('o') => {
                let begun = self.session.begin_recognition();
                return self.launch(begun);
            }
            KeyCode::Char('y') => {
                let text = self.session.ocr.result.trim();
                if text.is_empty() {
                    self.info = "No recognized text to copy yet.".into();
                } else {
                    return Action::Copy(text.to_string());
                }
            }
            _ => {}
        }
        Action::None
    }

    fn handle_training_key(&mut self, k: KeyEvent) -> Action {
        let pairs = self.session.training.pairs.len();
        let edits_pairs = matches!(
            k.code,
            KeyCode::Char('a') | KeyCode::Char('d') | KeyCode::Delete | KeyCode::Char('c')
        );
        if edits_pairs && self.session.is_busy() {
            self.info = "The training file list is locked while a task is running.".into();
            return Action::None;
        }
        match k.code {
            KeyCode::Char('a') => self.open_prompt(Field::PairImage),
            KeyCode::Char('d') | KeyCode::Delete => {
                if self.session.remove_pair(self.selected_pair).is_some() {
                    self.selected_pair = self
                        .selected_pair
                        .min(self.session.training.pairs.len().saturating_sub(1));
                    self.info = self.session.training.status.clone();
                }
            }
            KeyCode::Char('c') => {
                if pairs > 0 {
                    self.modal = Some(Modal::ConfirmClear);
                }
            }
            KeyCode::Char('n') => self.open_prompt(Field::OutputModel),
            KeyCode::Char('e') => self.open_prompt(Field::Epochs),
            KeyCode::Char('t') => {
                let begun = self.session.begin_training();
                return self.launch(begun);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_pair = self.selected_pair.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected_pair + 1 < pairs {
                    self.selected_pair += 1;
                }
            }
            KeyCode::PageUp => {
                let max = self.session.training.log.len();
                self.log_scroll = (self.log_scroll + LOG_PAGE).min(max);
            }
            KeyCode::PageDown => self.log_scroll = self.log_scroll.saturating_sub(LOG_PAGE),
            _ => {}
        }
        Action::None
    }
}

/// Path typed by the user; a leading `~/` means the home directory.
pub fn expand_path(raw: &str) -> PathBuf {
    let raw = raw.trim();
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}
