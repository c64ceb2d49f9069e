use crate::orchestrator::Preview;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    symbols::Marker,
    widgets::canvas::{Canvas, Line as CanvasLine, Rectangle},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn draw_line(
    ctx: &mut ratatui::widgets::canvas::Context,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    color: Color,
) {
    ctx.draw(&CanvasLine {
        x1,
        y1,
        x2,
        y2,
        color,
    });
}

/// Baseline outlines drawn in image coordinates. The canvas origin is bottom-left,
/// so y is flipped against the image height.
pub fn draw_preview(area: Rect, f: &mut Frame, preview: Option<&Preview>, title: &str) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let Some(preview) = preview else {
        let p = Paragraph::new("No segmentation to show yet. Select an image and press s.")
            .style(Style::default().fg(Color::Gray))
            .wrap(Wrap { trim: true })
            .block(block);
        f.render_widget(p, area);
        return;
    };

    let w = f64::from(preview.width.max(1));
    let h = f64::from(preview.height.max(1));
    let segments = preview.segments.clone();
    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, w])
        .y_bounds([0.0, h])
        .paint(move |ctx| {
            ctx.draw(&Rectangle {
                x: 0.0,
                y: 0.0,
                width: w,
                height: h,
                color: Color::DarkGray,
            });
            for &((x1, y1), (x2, y2)) in &segments {
                draw_line(ctx, x1, h - y1, x2, h - y2, Color::Red);
            }
        });
    f.render_widget(canvas, area);
}
