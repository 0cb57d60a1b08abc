//! TUI rendering using ratatui.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use warden_db::HarnessStatus;

use super::app::{App, View};

/// Render the current view.
pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());

    match &app.current_view {
        View::HarnessList => render_harness_list(f, app, chunks[0]),
        View::HarnessDetail(id) => render_harness_detail(f, app, id, chunks[0]),
        View::Help => render_help(f, chunks[0]),
    }

    render_status_bar(f, app, chunks[1]);
}

fn render_harness_list(f: &mut Frame, app: &App, area: Rect) {
    let header_cells = ["Harness", "Agent", "Task", "Status"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow)));
    let header = Row::new(header_cells).height(1);

    let rows = app.rows.iter().enumerate().map(|(i, row)| {
        let style = if i == app.selected {
            Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        Row::new(vec![
            Cell::from(row.harness_id.clone()),
            Cell::from(row.agent_name.clone()),
            Cell::from(row.task_id.clone()),
            status_colored(&row.status).into(),
        ])
        .style(style)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Length(16),
            Constraint::Percentage(30),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(" Harnesses "));

    f.render_widget(table, area);
}

fn render_harness_detail(f: &mut Frame, app: &App, harness_id: &str, area: Rect) {
    let Some(snapshot) = &app.detail else {
        let p = Paragraph::new(format!("No checkpoint found for {harness_id}"))
            .block(Block::default().borders(Borders::ALL).title(" Harness Detail "));
        f.render_widget(p, area);
        return;
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Harness: ", Style::default().fg(Color::Yellow)),
            Span::raw(snapshot.harness_id.clone()),
        ]),
        Line::from(vec![
            Span::styled("Agent: ", Style::default().fg(Color::Yellow)),
            Span::raw(snapshot.agent_name.clone()),
            Span::raw("  Task: "),
            Span::raw(snapshot.task_id.clone()),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Yellow)),
            status_colored(&format!("{:?}", snapshot.status)),
            Span::raw(format!("  Depth: {}", snapshot.depth)),
            Span::raw(format!("  Checkpoints: {}", snapshot.checkpoint_count)),
        ]),
    ];

    if let Some(gate) = &snapshot.pending_gate {
        lines.push(Line::from(vec![
            Span::styled("Pending gate: ", Style::default().fg(Color::Magenta)),
            Span::raw(format!("step {} ({:?})", gate.step_id, gate.status)),
        ]));
    }

    if let Some(reason) = &snapshot.failure_reason {
        lines.push(Line::from(vec![
            Span::styled("Failure: ", Style::default().fg(Color::Red)),
            Span::raw(reason.clone()),
        ]));
    }

    if let Some(plan) = &snapshot.plan {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Steps", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))));
        for step in plan.steps() {
            lines.push(Line::from(format!("  {:<20} {:?}", step.id, step.status)));
        }
    }

    let detail = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Harness Detail "));
    f.render_widget(detail, area);
}

fn render_help(f: &mut Frame, area: Rect) {
    let text = vec![
        Line::from(""),
        Line::from(vec![Span::styled("  Navigation", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))]),
        Line::from("    j/Down    Move down"),
        Line::from("    k/Up      Move up"),
        Line::from("    Enter     Drill into selected harness"),
        Line::from("    Esc/q     Back / Quit"),
        Line::from(""),
        Line::from(vec![Span::styled("  Actions", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))]),
        Line::from("    s         Start the selected harness"),
        Line::from("    p         Pause the selected harness"),
        Line::from("    u         Resume (un-pause) the selected harness"),
        Line::from("    x         Stop the selected harness"),
        Line::from("    a         Approve a pending gate"),
        Line::from("    r         Reject a pending gate"),
        Line::from(""),
        Line::from(vec![Span::styled("  Other", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))]),
        Line::from("    ?         Show this help"),
        Line::from(""),
    ];

    let help = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(" Help "));
    f.render_widget(help, area);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let view_name = match &app.current_view {
        View::HarnessList => "Harnesses",
        View::HarnessDetail(_) => "Harness Detail",
        View::Help => "Help",
    };

    let status_msg = app.status_message.as_deref().unwrap_or("");

    let bar = Line::from(vec![
        Span::styled(format!(" {view_name} "), Style::default().bg(Color::Blue).fg(Color::White)),
        Span::raw("  "),
        Span::styled(status_msg, Style::default().fg(Color::Green)),
        Span::raw("  q:quit  ?:help  s/p/u/x:lifecycle  a/r:gate"),
    ]);

    f.render_widget(Paragraph::new(bar), area);
}

// -- Helpers --

fn status_colored(status: &str) -> Span<'static> {
    let color = match status {
        s if s == format!("{:?}", HarnessStatus::Created) => Color::DarkGray,
        s if s == format!("{:?}", HarnessStatus::Running) => Color::Blue,
        s if s == format!("{:?}", HarnessStatus::Paused) => Color::Yellow,
        s if s == format!("{:?}", HarnessStatus::Completed) => Color::Green,
        s if s == format!("{:?}", HarnessStatus::Failed) => Color::Red,
        _ => Color::White,
    };
    Span::styled(status.to_string(), Style::default().fg(color))
}
