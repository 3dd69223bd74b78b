//! UI rendering and layout utilities

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::constants::meter::HIST_ROWS;
use crate::meter::{MeterFrame, Tier};

/// Application state for UI rendering
#[derive(Clone)]
pub struct UiState {
    pub device_name: String,
    pub raw_percentage: u8,
    pub windowed_percentage: u8,
    pub status: String,
    pub led_status: String,
}

fn attr_span(cell: Option<Tier>) -> Span<'static> {
    match cell {
        Some(tier) => Span::styled(" ", Style::default().bg(tier.color())),
        None => Span::raw(" "),
    }
}

/// Project the two meter planes into terminal lines: the readout row with
/// the level bar, the divider, then the histogram grid.
pub fn meter_lines(frame: &MeterFrame) -> Vec<Line<'static>> {
    let mut lines = Vec::with_capacity(2 + HIST_ROWS);

    let mut readout = vec![Span::raw(frame.glyphs.readout())];
    readout.extend(frame.attrs.bar().iter().map(|cell| attr_span(*cell)));
    lines.push(Line::from(readout));

    lines.push(Line::from(frame.glyphs.divider()));

    for row in frame.attrs.histogram() {
        let spans: Vec<Span<'static>> = row.iter().map(|cell| attr_span(*cell)).collect();
        lines.push(Line::from(spans));
    }

    lines
}

/// Render the complete UI
pub fn render_ui(f: &mut Frame, state: &UiState, frame: &MeterFrame) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(HIST_ROWS as u16 + 4),
        ])
        .split(size);

    // Device and status
    let device_block = Block::default().title("Device").borders(Borders::ALL);
    let device_text = Paragraph::new(state.device_name.as_str()).block(device_block);
    f.render_widget(device_text, chunks[0]);

    // Status
    let status_block = Block::default().title("Status").borders(Borders::ALL);
    let status_text =
        Paragraph::new(format!("{}\n{}", state.status, state.led_status)).block(status_block);
    f.render_widget(status_text, chunks[1]);

    // Meter frame: readout + bar, divider, histogram
    let meter = Paragraph::new(meter_lines(frame)).block(
        Block::default()
            .title(format!(
                "Level: {}% (windowed: {}%)",
                state.raw_percentage, state.windowed_percentage
            ))
            .borders(Borders::ALL),
    );
    f.render_widget(meter, chunks[2]);
}
