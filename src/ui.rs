use heatlog::{clock::Clock, time_format::PLACEHOLDER, CaptureMode, FeedbackKey, HeatTimer, TimerPhase};
use itertools::Itertools;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::{HeatScreen, InputState};

const HORIZONTAL_MARGIN: u16 = 2;

pub fn ui<C: Clock>(screen: &HeatScreen, timer: &HeatTimer<C>, f: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    f.render_widget(clock(timer), chunks[0]);

    let body = match timer.mode() {
        CaptureMode::Finish => finish_lines(timer),
        CaptureMode::Laps => lap_lines(screen, timer),
    };
    let title = format!(" {} - {} mode ", timer.config().distance, timer.mode());
    f.render_widget(
        Paragraph::new(body)
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: false }),
        chunks[1],
    );

    f.render_widget(status(screen), chunks[2]);

    let help = match timer.mode() {
        CaptureMode::Finish => "space start/pause  1-9 finish  f feedback  r reset  s save  q quit",
        CaptureMode::Laps => {
            "space start/pause  l lap  [ ] pick lap  1-9 toggle swimmer  f feedback  r reset  s save  q quit"
        }
    };
    f.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC))
            .alignment(Alignment::Center),
        chunks[3],
    );
}

fn clock<C: Clock>(timer: &HeatTimer<C>) -> Paragraph<'static> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let (label, color) = match timer.phase() {
        TimerPhase::Idle => ("ready", Color::Gray),
        TimerPhase::Running => ("running", Color::Green),
        TimerPhase::Paused => ("paused", Color::Yellow),
        TimerPhase::Finalized => ("finalized", Color::Cyan),
    };
    let line = Line::from(vec![
        Span::styled(timer.display(), bold.fg(color)),
        Span::raw("   "),
        Span::styled(label, Style::default().fg(color)),
    ]);
    Paragraph::new(line)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center)
}

fn finish_lines<C: Clock>(timer: &HeatTimer<C>) -> Vec<Line<'static>> {
    let cfg = timer.config();
    let dim = Style::default().add_modifier(Modifier::DIM);
    cfg.roster
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let time = match timer.finish_time(name) {
                Some(time) => Span::styled(time, Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
                None => Span::styled(PLACEHOLDER, dim),
            };
            Line::from(vec![
                Span::styled(format!("{}. ", i + 1), dim),
                Span::raw(format!("{:<16} {:<13} ", name, cfg.stroke_for(name))),
                time,
                Span::raw("  "),
                Span::styled(
                    timer.feedback(&FeedbackKey::swimmer(name)).to_string(),
                    Style::default().add_modifier(Modifier::ITALIC),
                ),
            ])
        })
        .collect()
}

fn lap_lines<C: Clock>(screen: &HeatScreen, timer: &HeatTimer<C>) -> Vec<Line<'static>> {
    let roster = timer
        .config()
        .roster
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}. {}", i + 1, name))
        .join("   ");
    let mut lines = vec![
        Line::styled(roster, Style::default().add_modifier(Modifier::DIM)),
        Line::raw(""),
    ];

    let current = screen.current_lap(timer);
    for (index, lap) in timer.laps().iter().enumerate() {
        let selected = current == Some(index);
        let style = if selected {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(if selected { "> " } else { "  " }, style.fg(Color::Yellow)),
            Span::styled(format!("Lap {} - {}", index + 1, lap.time), style),
            Span::raw("  "),
            Span::styled(lap.swimmers.join(", "), style),
        ]));
        for name in &lap.swimmers {
            let feedback = timer.feedback(&FeedbackKey::lap(index, name));
            if !feedback.is_empty() {
                lines.push(Line::styled(
                    format!("      {}: {}", name, feedback),
                    Style::default().add_modifier(Modifier::ITALIC),
                ));
            }
        }
    }
    lines
}

fn status(screen: &HeatScreen) -> Paragraph<'static> {
    match &screen.input {
        InputState::Typing { key, text } => {
            let who = match key {
                FeedbackKey::Swimmer(name) => name.clone(),
                FeedbackKey::Lap { lap, swimmer } => format!("{} (lap {})", swimmer, lap + 1),
            };
            Paragraph::new(format!("feedback for {}: {}_", who, text)).style(Style::default().fg(Color::Yellow))
        }
        _ => Paragraph::new(screen.status.clone()),
    }
}
