use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn keybind<'a>(keys: &'a str, what: &'a str) -> Line<'a> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{keys:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        keybind("q / Ctrl-C", "Quit (asks first while a task is running)"),
        keybind("tab", "Switch tabs"),
        keybind("?", "Show this help"),
        keybind("p", "Set the Kraken/Ketos directory (empty = use PATH)"),
        Line::from(""),
        Line::from("OCR tab:"),
        keybind("i / enter", "Choose an image file"),
        keybind("s", "Segment the image"),
        keybind("m", "Set the recognition model"),
        keybind("o", "Extract text (needs a successful segmentation)"),
        keybind("y", "Copy the recognized text to the clipboard"),
        Line::from(""),
        Line::from("Training tab:"),
        keybind("a", "Add an image and its ground-truth file"),
        keybind("↑/↓ or j/k", "Select a pair"),
        keybind("d", "Remove the selected pair"),
        keybind("c", "Clear all pairs"),
        keybind("n", "Set the output model name"),
        keybind("e", "Set the number of epochs"),
        keybind("t", "Start training"),
        keybind("PgUp/PgDn", "Scroll the training log"),
        Line::from(""),
        Line::from("Prompts:"),
        keybind("enter", "Accept"),
        keybind("esc", "Cancel"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("~/", Style::default().fg(Color::Magenta)),
            Span::raw(" at the start of a path means your home directory."),
        ]),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
