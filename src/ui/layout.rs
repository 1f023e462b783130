use crate::app::App;
use crate::speedtest::{Phase, RunStatus};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

// Color Palette - Elegant & Minimal
const ACCENT: Color = Color::Rgb(100, 149, 237);      // Cornflower blue
const SUCCESS: Color = Color::Rgb(134, 194, 156);     // Soft green
const INFO: Color = Color::Rgb(147, 180, 220);        // Soft blue
const WARN: Color = Color::Rgb(220, 180, 130);        // Soft amber
const ERROR: Color = Color::Rgb(220, 120, 120);
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);
const BORDER_ACTIVE: Color = Color::Rgb(100, 100, 110);

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .split(frame.area());

    draw_header(frame, chunks[0], app);

    let panels = Layout::horizontal([
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
    ])
    .split(chunks[1]);

    let active = app.status.phase();
    draw_metric_panel(
        frame,
        panels[0],
        "Download",
        SUCCESS,
        active == Some(Phase::Download),
        &format_speed(app.result.download_mbps),
        None,
        &app.download_samples,
    );
    draw_metric_panel(
        frame,
        panels[1],
        "Upload",
        INFO,
        active == Some(Phase::Upload),
        &format_speed(app.result.upload_mbps),
        None,
        &app.upload_samples,
    );
    let jitter = if app.result.jitter_ms > 0.0 {
        format!("jitter {:.1} ms", app.result.jitter_ms)
    } else {
        "jitter —".to_string()
    };
    draw_metric_panel(
        frame,
        panels[2],
        "Latency",
        WARN,
        active == Some(Phase::Latency),
        &format_ping(app.result.ping_ms),
        Some(&jitter),
        &app.ping_samples,
    );

    draw_size_selector(frame, chunks[2], app);
    draw_notice(frame, chunks[3], app);
    draw_help(frame, chunks[4], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::horizontal([
        Constraint::Length(12),
        Constraint::Min(10),
        Constraint::Length(20),
    ])
    .split(inner);

    let title = Line::from(vec![
        Span::styled("KSA", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
        Span::styled("test", Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
    ]);
    frame.render_widget(Paragraph::new(title), chunks[0]);

    let (status, color) = match app.status {
        RunStatus::Idle => ("Ready", TEXT_MUTED),
        RunStatus::MeasuringDownload => ("Testing download...", SUCCESS),
        RunStatus::MeasuringUpload => ("Testing upload...", INFO),
        RunStatus::MeasuringLatency => ("Measuring latency...", WARN),
        RunStatus::Finished => ("Results", ACCENT),
        RunStatus::Failed => ("Test failed", ERROR),
    };

    frame.render_widget(
        Paragraph::new(status)
            .style(Style::default().fg(color))
            .alignment(Alignment::Center),
        chunks[1],
    );

    frame.render_widget(
        Paragraph::new(create_phase_text(app.status)).alignment(Alignment::Right),
        chunks[2],
    );
}

fn create_phase_text(status: RunStatus) -> Line<'static> {
    let phases = [
        (Phase::Download, "down"),
        (Phase::Upload, "up"),
        (Phase::Latency, "ping"),
    ];

    let mut spans = Vec::new();

    for (i, (p, label)) in phases.iter().enumerate() {
        let is_active = status.phase() == Some(*p);
        let is_complete = match status {
            RunStatus::MeasuringUpload => *p == Phase::Download,
            RunStatus::MeasuringLatency => *p != Phase::Latency,
            RunStatus::Finished => true,
            _ => false,
        };

        let style = if is_active {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else if is_complete {
            Style::default().fg(TEXT_SECONDARY)
        } else {
            Style::default().fg(TEXT_MUTED)
        };

        spans.push(Span::styled(*label, style));

        if i < phases.len() - 1 {
            spans.push(Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        }
    }

    Line::from(spans)
}

#[allow(clippy::too_many_arguments)]
fn draw_metric_panel(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    color: Color,
    active: bool,
    value: &str,
    detail: Option<&str>,
    samples: &[f64],
) {
    let border_color = if active { BORDER_ACTIVE } else { BORDER };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Span::styled(
            format!(" {} ", title),
            Style::default().fg(if active { color } else { TEXT_SECONDARY }),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    frame.render_widget(
        Paragraph::new(value.to_string())
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        chunks[0],
    );

    if let Some(detail) = detail {
        frame.render_widget(
            Paragraph::new(detail.to_string())
                .style(Style::default().fg(TEXT_MUTED))
                .alignment(Alignment::Center),
            chunks[1],
        );
    }

    if !samples.is_empty() {
        draw_sparkline(frame, chunks[2], samples, color);
    }
}

fn draw_sparkline(frame: &mut Frame, area: Rect, data: &[f64], color: Color) {
    if data.is_empty() || area.width < 4 || area.height < 2 {
        return;
    }

    let (min_val, max_val) = get_data_range(data);
    let range = (max_val - min_val).max(1.0);

    let points: Vec<(f64, f64)> = data
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(&points);

    let chart = Chart::new(vec![dataset])
        .x_axis(Axis::default().bounds([0.0, data.len() as f64]))
        .y_axis(Axis::default().bounds([min_val - range * 0.1, max_val + range * 0.1]));

    frame.render_widget(chart, area);
}

fn draw_size_selector(frame: &mut Frame, area: Rect, app: &App) {
    let locked = app.status.is_measuring();
    let value_style = if locked {
        Style::default().fg(TEXT_MUTED)
    } else {
        Style::default().fg(TEXT_PRIMARY)
    };
    let value = if locked {
        app.size.to_string()
    } else {
        format!("< {} >", app.size)
    };

    let line = Line::from(vec![
        Span::styled("File size  ", Style::default().fg(TEXT_SECONDARY)),
        Span::styled(value, value_style),
    ]);
    frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
}

fn draw_notice(frame: &mut Frame, area: Rect, app: &App) {
    let notice = if let Some(err) = &app.error {
        Some((format!("{} test failed: {}", err.phase, err.message), ERROR))
    } else if app.cancelled {
        Some(("Test cancelled".to_string(), WARN))
    } else {
        None
    };

    if let Some((text, color)) = notice {
        frame.render_widget(
            Paragraph::new(text)
                .style(Style::default().fg(color))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    let help = if app.status.is_measuring() {
        "esc cancel · q quit"
    } else {
        "enter start · ←→ file size · q quit"
    };

    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

// Helpers
fn get_data_range(data: &[f64]) -> (f64, f64) {
    let min = data.iter().cloned().fold(f64::MAX, f64::min);
    let max = data.iter().cloned().fold(f64::MIN, f64::max);
    (if min == f64::MAX { 0.0 } else { min }, if max == f64::MIN { 0.0 } else { max })
}

pub fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.1} Gbps", mbps / 1000.0)
    } else if mbps >= 1.0 {
        format!("{:.1} Mbps", mbps)
    } else if mbps > 0.0 {
        format!("{:.0} Kbps", mbps * 1000.0)
    } else {
        "—".to_string()
    }
}

pub fn format_ping(ms: f64) -> String {
    if ms > 0.0 {
        format!("{:.0} ms", ms)
    } else {
        "—".to_string()
    }
}
