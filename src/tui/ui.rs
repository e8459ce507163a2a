//! UI rendering for the TUI

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Widget},
    Frame,
};

use super::app::{App, Link};
use crate::session::{MediaKind, SessionStatus, StreamStats};
use crate::viewer::{stats_text, time_left_text};

/// Returns status indicator symbol and color for the session status
fn status_indicator(status: SessionStatus) -> (&'static str, Color) {
    match status {
        SessionStatus::Active => ("*", Color::Green),
        SessionStatus::Idle => ("o", Color::Gray),
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let log_height = if app.show_log {
        Constraint::Fill(1)
    } else {
        Constraint::Length(0)
    };
    let [header_area, session_area, streams_area, log_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(6),
        Constraint::Length(4),
        log_height,
        Constraint::Length(1),
    ])
    .areas(area);

    let buf = frame.buffer_mut();
    render_header(header_area, buf, app);
    render_session(session_area, buf, app);
    render_streams(streams_area, buf, app);
    if app.show_log {
        render_log(log_area, buf, app);
    }
    render_status(status_area, buf, app);
}

fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = " camview";
    let (symbol, color) = status_indicator(app.status);
    let right = format!("{}  {} {} ", app.server, symbol, app.status.as_str());
    let padding = area
        .width
        .saturating_sub((title.len() + right.len()) as u16) as usize;

    let line = Line::from(vec![
        Span::styled(
            title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(padding)),
        Span::styled(format!("{}  ", app.server), Style::default().fg(Color::Cyan)),
        Span::styled(
            format!("{} {} ", symbol, app.status.as_str()),
            Style::default().fg(color),
        ),
    ]);

    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_session(area: Rect, buf: &mut Buffer, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Session ");
    let inner = block.inner(area);
    block.render(area, buf);

    let [link_area, size_area, gauge_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(2),
    ])
    .areas(inner);

    let (link_text, link_color) = match &app.link {
        Link::Down => ("not connected".to_string(), Color::Gray),
        Link::Negotiating => ("negotiating...".to_string(), Color::Yellow),
        Link::Connected => ("connected".to_string(), Color::Green),
        Link::Failed(msg) => (format!("failed: {}", msg), Color::Red),
    };
    Paragraph::new(Line::from(Span::styled(
        link_text,
        Style::default().fg(link_color),
    )))
    .render(link_area, buf);

    let size = match app.limits.video_size {
        Some((w, h)) => format!("Limit {}s, camera {}x{}", app.limits.full_seconds(), w, h),
        None => format!("Limit {}s", app.limits.full_seconds()),
    };
    Paragraph::new(size)
        .style(Style::default().fg(Color::Gray))
        .render(size_area, buf);

    let gauge_color = if app.status == SessionStatus::Active {
        Color::Green
    } else {
        Color::DarkGray
    };
    Gauge::default()
        .gauge_style(Style::default().fg(gauge_color))
        .ratio(app.time_ratio())
        .label(time_left_text(app.time_left))
        .render(gauge_area, buf);
}

fn render_streams(area: Rect, buf: &mut Buffer, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Streams ");

    let line = |kind: MediaKind, stats: &StreamStats| {
        let style = if app.status == SessionStatus::Active {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Line::from(Span::styled(stats_text(kind, stats), style))
    };

    Paragraph::new(vec![
        line(MediaKind::Video, &app.video),
        line(MediaKind::Audio, &app.audio),
    ])
    .block(block)
    .render(area, buf);
}

fn render_log(area: Rect, buf: &mut Buffer, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Log ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));

    // Newest lines at the bottom.
    let visible = area.height.saturating_sub(2) as usize;
    let start = app.log_lines.len().saturating_sub(visible);
    let lines: Vec<Line> = app.log_lines[start..]
        .iter()
        .map(|l| Line::from(l.as_str()))
        .collect();

    Paragraph::new(lines).block(block).render(area, buf);
}

fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    let key = Style::default().fg(Color::Yellow);
    let hint = Style::default().fg(Color::Gray);
    let sep = Span::styled(" | ", Style::default().fg(Color::DarkGray));

    let mut spans = Vec::new();
    if app.status == SessionStatus::Idle {
        spans.extend([Span::styled(" s", key), Span::styled(": start", hint)]);
    } else {
        spans.extend([Span::styled(" x", key), Span::styled(": stop", hint)]);
    }
    spans.extend([
        sep.clone(),
        Span::styled("l", key),
        Span::styled(": log", hint),
        sep,
        Span::styled("q", key),
        Span::styled(": quit", hint),
    ]);

    Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionLimits;
    use crate::session::SessionEvent;
    use crate::tui::log_capture::LogBuffer;
    use ratatui::{backend::TestBackend, Terminal};
    use std::time::Duration;

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_idle_screen() {
        let app = App::new(
            "http://cam:8080".into(),
            SessionLimits::fallback(Duration::from_secs(60)),
            LogBuffer::new(),
        );
        let text = screen(&app);
        assert!(text.contains("Streaming time left: 60 seconds"));
        assert!(text.contains("not connected"));
        assert!(text.contains("s: start"));
        assert!(text.contains("video: no stream"));
    }

    #[test]
    fn test_active_screen() {
        let mut app = App::new(
            "http://cam:8080".into(),
            SessionLimits {
                max_duration: Duration::from_secs(30),
                video_size: Some((640, 480)),
            },
            LogBuffer::new(),
        );
        app.apply(SessionEvent::Status(SessionStatus::Active));
        app.apply(SessionEvent::Negotiated);
        app.apply(SessionEvent::Remaining(12));
        app.video = StreamStats {
            stream_id: "cam".into(),
            track_id: "cam-video".into(),
            codec: "video/VP8".into(),
            packets: 10,
            bytes: 9000,
            last_sequence: 10,
            last_timestamp: 30000,
            live: true,
        };

        let text = screen(&app);
        assert!(text.contains("connected"));
        assert!(text.contains("camera 640x480"));
        assert!(text.contains("Streaming time left: 12 seconds"));
        assert!(text.contains("x: stop"));
        assert!(text.contains("video: cam [video/VP8] 10 packets"));
    }
}
