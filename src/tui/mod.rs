mod clipboard;
mod help;
mod preview;
mod state;

use crate::model::{TaskEvent, ToolConfig};
use crate::orchestrator::TaskRunner;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{Action, Modal, UiState, TAB_OCR, TAB_TRAINING};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;

pub async fn run(cfg: ToolConfig) -> Result<()> {
    // Unbounded: workers never wait on the UI.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TaskEvent>();
    let runner = TaskRunner::new(tokio::runtime::Handle::current(), event_tx);

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(cfg, runner, event_rx));

    match tokio::task::spawn_blocking(move || ui_handle.join()).await {
        Ok(Ok(res)) => res,
        Ok(Err(_)) => Err(anyhow::anyhow!("TUI thread panicked")),
        Err(e) => Err(anyhow::anyhow!("TUI thread join failed: {e}")),
    }
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    cfg: ToolConfig,
    runner: TaskRunner,
    mut event_rx: UnboundedReceiver<TaskEvent>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; workers talk to it through the channel.
    let mut state = UiState::new(cfg);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain in arrival order so progress always lands before its terminal event.
        while let Ok(ev) = event_rx.try_recv() {
            if let Some(notice) = state.session.apply_event(ev) {
                state.show_notice(notice);
            }
            if !state.session.is_busy() {
                if let Some(started) = state.task_started.take() {
                    state.info = format!("Finished in {}", elapsed(started));
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match state.handle_key(k) {
                    Action::None => {}
                    Action::Launch(job) => {
                        tracing::info!(kind = %job.kind(), "launching task");
                        // Completion arrives as a terminal event; the handle is not needed.
                        let _ = runner.submit(job);
                    }
                    Action::Copy(text) => {
                        state.info = match clipboard::copy_to_clipboard(&text) {
                            Ok(()) => "✓ Copied recognized text to clipboard".into(),
                            Err(e) => format!("Clipboard copy failed: {e:#}"),
                        };
                    }
                    Action::Quit => {
                        if let Some(kind) = state.session.active_task() {
                            tracing::warn!(%kind, "quitting with a task still running");
                        }
                        break Ok(());
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn elapsed(since: Instant) -> String {
    humantime::format_duration(Duration::from_secs(since.elapsed().as_secs())).to_string()
}

fn key_style() -> Style {
    Style::default().fg(Color::Magenta)
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("OCR"),
        Line::from("Training"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title("kraken-tui"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    draw_config_bar(chunks[1], f, state);

    match state.tab {
        TAB_OCR => draw_ocr(chunks[2], f, state),
        TAB_TRAINING => draw_training(chunks[2], f, state),
        _ => help::draw_help(chunks[2], f),
    }

    draw_footer(chunks[3], f, state);

    if let Some(modal) = &state.modal {
        draw_modal(area, f, modal);
    }
}

fn draw_config_bar(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let dir = if state.session.kraken_dir.is_empty() {
        Span::styled("(PATH)", Style::default().fg(Color::Gray))
    } else {
        Span::raw(state.session.kraken_dir.clone())
    };
    let line = Line::from(vec![
        Span::styled("Kraken/Ketos dir: ", Style::default().fg(Color::Gray)),
        dir,
        Span::raw("   "),
        Span::styled("Work dir: ", Style::default().fg(Color::Gray)),
        Span::raw(state.session.config().work_dir.display().to_string()),
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Config (p)"));
    f.render_widget(p, area);
}

/// Bottom bar: an open prompt takes precedence over the status line.
fn draw_footer(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    if let Some(prompt) = &state.prompt {
        let p = Paragraph::new(Line::from(vec![
            Span::raw(prompt.buffer.clone()),
            Span::styled("█", Style::default().fg(Color::Yellow)),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(format!("{} (enter to accept, esc to cancel)", prompt.field.label())),
        );
        f.render_widget(p, area);
        return;
    }

    let mut spans = Vec::new();
    if let (Some(kind), Some(started)) = (state.session.active_task(), state.task_started) {
        spans.push(Span::styled(
            format!("⏳ {kind} running for {}  ", elapsed(started)),
            Style::default().fg(Color::Yellow),
        ));
    }
    spans.push(Span::raw(state.info.clone()));
    let p = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}

fn enabled(label: &str, key: &str, on: bool) -> Vec<Span<'static>> {
    let style = if on {
        key_style()
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let text = if on {
        Style::default()
    } else {
        Style::default().fg(Color::DarkGray)
    };
    vec![
        Span::styled(format!("[{key}]"), style),
        Span::styled(format!(" {label}  "), text),
    ]
}

fn draw_ocr(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)].as_ref())
        .split(area);

    let session = &state.session;
    let title = match &session.ocr.preview {
        Some(p) => format!("Segmentation ({} lines)", p.lines),
        None => "Segmentation".to_string(),
    };
    preview::draw_preview(cols[0], f, session.ocr.preview.as_ref(), &title);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(6),
                Constraint::Length(3),
                Constraint::Min(0),
            ]
            .as_ref(),
        )
        .split(cols[1]);

    let mut actions = Vec::new();
    actions.extend(enabled("image", "i", !session.is_busy()));
    actions.extend(enabled("segment", "s", session.can_segment()));
    actions.extend(enabled("extract text", "o", session.can_recognize()));
    let overlay = session
        .overlay_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".into());
    let details = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Image: ", Style::default().fg(Color::Gray)),
            Span::raw(session.image_label()),
        ]),
        Line::from(vec![
            Span::styled("Model (m): ", Style::default().fg(Color::Gray)),
            Span::raw(session.ocr.model.clone()),
        ]),
        Line::from(vec![
            Span::styled("Overlay: ", Style::default().fg(Color::Gray)),
            Span::raw(overlay),
        ]),
        Line::from(actions),
    ])
    .block(Block::default().borders(Borders::ALL).title("Input"));
    f.render_widget(details, right[0]);

    let status = Paragraph::new(session.ocr.status.clone())
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, right[1]);

    let result = Paragraph::new(session.ocr.result.clone())
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Recognized text (y to copy)"),
        );
    f.render_widget(result, right[2]);
}

fn draw_training(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(6)].as_ref())
        .split(cols[0]);

    let training = &state.session.training;
    let items: Vec<ListItem> = training
        .pairs
        .iter()
        .enumerate()
        .map(|(i, p)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>3}. ", i + 1), Style::default().fg(Color::Gray)),
                Span::raw(crate::model::display_name(&p.image)),
                Span::styled(" ↔ ", Style::default().fg(Color::Gray)),
                Span::raw(crate::model::display_name(&p.ground_truth)),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Training pairs ({})  a add · d remove · c clear", training.pairs.len())),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut list_state = ListState::default();
    if !training.pairs.is_empty() {
        list_state.select(Some(state.selected_pair));
    }
    f.render_stateful_widget(list, left[0], &mut list_state);

    let mut actions = Vec::new();
    actions.extend(enabled("train", "t", state.session.can_train()));
    let settings = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Output model (n): ", Style::default().fg(Color::Gray)),
            Span::raw(training.output_model.clone()),
        ]),
        Line::from(vec![
            Span::styled("Epochs (e): ", Style::default().fg(Color::Gray)),
            Span::raw(training.epochs.clone()),
        ]),
        Line::from(training.status.clone()),
        Line::from(actions),
    ])
    .block(Block::default().borders(Borders::ALL).title("Settings"));
    f.render_widget(settings, left[1]);

    let visible = cols[1].height.saturating_sub(2) as usize;
    let lines: Vec<Line> = state
        .visible_log(visible)
        .iter()
        .map(|l| Line::from(l.as_str()))
        .collect();
    let title = if state.log_scroll > 0 {
        format!("Training log (scrolled up {} lines)", state.log_scroll)
    } else {
        "Training log".to_string()
    };
    let log = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(log, cols[1]);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

fn draw_modal(area: Rect, f: &mut ratatui::Frame, modal: &Modal) {
    let (title, body, color, hint) = match modal {
        Modal::Error { title, body } => (title.as_str(), body.as_str(), Color::Red, "any key to close"),
        Modal::Info { title, body } => (title.as_str(), body.as_str(), Color::Green, "any key to close"),
        Modal::ConfirmClear => (
            "Confirm",
            "Clear all training files from the list?",
            Color::Yellow,
            "y / n",
        ),
        Modal::ConfirmQuit => (
            "Confirm",
            "A task is still running and will not be stopped. Quit anyway?",
            Color::Yellow,
            "y / n",
        ),
    };
    let mut lines: Vec<Line> = body.lines().map(|l| Line::from(l.to_string())).collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(hint, Style::default().fg(Color::Gray))));

    let height = u16::try_from(lines.len() + 4).unwrap_or(u16::MAX);
    let rect = centered(area, area.width.saturating_sub(8).min(72), height);
    f.render_widget(Clear, rect);
    let p = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(title.to_string()),
    );
    f.render_widget(p, rect);
}
