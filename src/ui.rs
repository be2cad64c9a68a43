use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};

use gong::{
    session::SessionStatus,
    sound::SoundPlayer,
    trigger::{Permission, TriggerKind},
};

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const BROWN: Color = Color::Rgb(139, 69, 19);

fn clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn checkbox<P: SoundPlayer>(app: &App<P>, kind: TriggerKind, label: &str) -> Line<'static> {
    let denied = app.timer.permission(kind) == Permission::Denied;
    let enabled = app.timer.is_enabled(kind);

    let mark = if enabled { "[x] " } else { "[ ] " };
    let mark_style = if enabled {
        Style::default().fg(BROWN).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let mut spans = vec![
        Span::styled(mark, mark_style),
        Span::raw(label.to_string()),
    ];
    if denied {
        spans.push(Span::styled(
            "  (no permission)",
            Style::default().add_modifier(Modifier::DIM),
        ));
    }
    Line::from(spans)
}

impl<P: SoundPlayer> Widget for &App<P> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let button_style = Style::default().patch(bold_style).fg(BROWN).bg(Color::White);
        let dim_style = Style::default().add_modifier(Modifier::DIM);

        let state = self.timer.state();
        let button = match state.status {
            SessionStatus::Idle => "  Start  ",
            SessionStatus::Running => " Restart ",
        };

        let mut lines = vec![
            Line::from(Span::styled(button, button_style)),
            Line::default(),
            Line::from(vec![
                Span::styled(state.status.to_string(), bold_style),
                Span::raw("  "),
                Span::styled(
                    format!(
                        "{} / {}",
                        clock(state.elapsed_seconds),
                        clock(state.session_length_seconds)
                    ),
                    bold_style,
                ),
                Span::styled(
                    format!("  ({} left)", clock(state.remaining_seconds())),
                    dim_style,
                ),
            ]),
            Line::default(),
            checkbox(self, TriggerKind::Clap, "Clap Trigger"),
            checkbox(self, TriggerKind::Hand, "Hand Trigger"),
            Line::default(),
            Line::from(Span::styled(" Manual Trigger ", button_style)),
            Line::default(),
        ];

        match self.timer.trigger_message(self.now) {
            Some(message) => lines.push(Line::from(Span::styled(
                message.to_string(),
                Style::default().patch(bold_style).fg(Color::Yellow),
            ))),
            None => lines.push(Line::default()),
        }

        if let Some(notice) = &self.notice {
            lines.push(Line::from(Span::styled(
                notice.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC),
            )));
        }

        let body_height = lines.len() as u16 + 1;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(body_height),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[1], buf);

        Paragraph::new(Span::styled(
            "(space) start/restart (s) stop (c) clap (h) hand (m) manual (q) quit",
            Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM),
        ))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(chunks[3], buf);
    }
}
