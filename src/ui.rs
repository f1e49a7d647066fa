use std::time::SystemTime;

use chrono::Utc;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Widget, Wrap},
};
use time_humanize::{Accuracy, HumanTime, Tense};
use unicode_width::UnicodeWidthStr;

use codetype::{diff::CharClass, session::SessionState, util::unescape_markup};

use crate::{App, Screen};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;
const TAB_WIDTH: usize = 4;

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim_bold() -> Style {
    bold().add_modifier(Modifier::DIM)
}

fn italic() -> Style {
    Style::default().add_modifier(Modifier::ITALIC)
}

/// How a target character shows up in its own cell
fn glyph(c: char) -> String {
    match c {
        '\t' => " ".repeat(TAB_WIDTH),
        c => c.to_string(),
    }
}

/// Visible stand-in for a mistyped character
fn typed_glyph(c: char) -> String {
    match c {
        ' ' => "·".to_owned(),
        '\t' => format!("→{}", " ".repeat(TAB_WIDTH - 1)),
        '\n' => "⏎".to_owned(),
        c => c.to_string(),
    }
}

/// Snippet lines with every character styled by its diff class
fn snippet_lines(app: &App) -> Vec<Line<'static>> {
    let green_bold_style = bold().fg(Color::Green);
    let red_bold_style = bold().fg(Color::Red);
    let underlined_dim_bold_style = dim_bold().add_modifier(Modifier::UNDERLINED);

    let diff = app.session.diff();
    let typed: Vec<char> = app.session.input().chars().collect();
    let mut lines = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();

    for (idx, (expected, class)) in app
        .session
        .target()
        .chars()
        .zip(diff.classes.iter())
        .enumerate()
    {
        let span = match class {
            CharClass::Correct => Span::styled(glyph(expected), green_bold_style),
            CharClass::Incorrect => Span::styled(
                typed_glyph(typed.get(idx).copied().unwrap_or(expected)),
                red_bold_style,
            ),
            CharClass::Current => Span::styled(
                match expected {
                    '\n' => "⏎".to_owned(),
                    '\t' => typed_glyph('\t'),
                    ' ' => " ".to_owned(),
                    c => c.to_string(),
                },
                underlined_dim_bold_style,
            ),
            CharClass::Untyped => Span::styled(glyph(expected), dim_bold()),
        };

        if expected == '\n' {
            if matches!(class, CharClass::Current | CharClass::Incorrect) {
                spans.push(span);
            }
            lines.push(Line::from(std::mem::take(&mut spans)));
        } else {
            spans.push(span);
        }
    }
    lines.push(Line::from(spans));
    lines
}

fn render_header(app: &App, area: Rect, buf: &mut Buffer) {
    let user = app
        .username()
        .unwrap_or_else(|| "not logged in".to_string());
    let title = match app.screen {
        Screen::Typing | Screen::Results => format!("codetype · {}", app.language.label()),
        Screen::Leaderboard => format!("leaderboard · {}", app.filter),
        Screen::Chat => "chat".to_string(),
        Screen::Login => "login".to_string(),
    };
    let header = Line::from(vec![
        Span::styled(title, bold().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(user, italic()),
    ]);
    Paragraph::new(header)
        .alignment(Alignment::Center)
        .render(area, buf);
}

fn render_snippet(app: &App, area: Rect, buf: &mut Buffer) {
    let lines = snippet_lines(app);
    let height = lines.len() as u16;
    let widest = app
        .session
        .target()
        .replace('\t', &" ".repeat(TAB_WIDTH))
        .lines()
        .map(|l| l.width())
        .max()
        .unwrap_or(0) as u16;

    // center the block, keep the code itself left aligned
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(area.height.saturating_sub(height) / 2),
            Constraint::Min(1),
        ])
        .split(area);
    let left = area.width.saturating_sub(widest) / 2;
    let block_area = Rect {
        x: chunks[1].x + left,
        width: chunks[1].width.saturating_sub(left),
        ..chunks[1]
    };

    Paragraph::new(lines).render(block_area, buf);
}

fn stats_line(app: &App) -> String {
    match app.session.state() {
        SessionState::Idle => "press enter to start".to_string(),
        SessionState::Running => {
            let now = SystemTime::now();
            format!(
                "{} wpm   {}% acc   {} errors   {:.1}s",
                app.session.live_wpm(now),
                app.session.accuracy(),
                app.session.error_count(),
                app.session.elapsed_secs(now)
            )
        }
        SessionState::Completed => match app.session.result() {
            Some(r) => format!(
                "{} wpm   {}% acc   {} errors   {}s   {} mistakes{}",
                r.wpm,
                r.accuracy,
                r.errors,
                r.time_secs,
                r.mistakes,
                if app.saved { "   saved" } else { "" }
            ),
            None => String::new(),
        },
    }
}

fn legend(app: &App) -> &'static str {
    match (app.screen, app.session.state()) {
        (Screen::Typing, SessionState::Running) => "(esc) abandon",
        (Screen::Typing, _) => {
            "(enter) start / (←/→) language / (n)ew / (b)oard / (c)hat / (l)ogin / (esc)ape"
        }
        (Screen::Results, _) => "(s)ave / (r)etry / (n)ew / (b)oard / (c)hat / (l)ogin / (esc)ape",
        (Screen::Leaderboard, _) => "(←/→) language / (b)ack",
        (Screen::Chat, _) => "(enter) send / (esc) back",
        (Screen::Login, _) => "(enter) log in / (esc) back",
    }
}

fn render_leaderboard(app: &App, area: Rect, buf: &mut Buffer) {
    let entries = app.leaderboard.current().cloned().unwrap_or_default();
    if entries.is_empty() {
        Paragraph::new("No scores yet. Finish a test and press (s) to save it!")
            .block(Block::default().borders(Borders::ALL).title("Leaderboard"))
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center)
            .render(area, buf);
        return;
    }

    let me = app.username();
    let header = Row::new(vec!["#", "user", "language", "wpm", "acc", "errors", "time"])
        .style(bold().fg(Color::Yellow));
    let rows: Vec<Row> = entries
        .iter()
        .enumerate()
        .map(|(rank, e)| {
            let style = if me.as_deref() == Some(e.username.as_str()) {
                bold().fg(Color::Green)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from((rank + 1).to_string()),
                Cell::from(e.username.clone()),
                Cell::from(e.language.label()),
                Cell::from(e.wpm.to_string()),
                Cell::from(format!("{}%", e.accuracy)),
                Cell::from(e.errors.to_string()),
                Cell::from(format!("{}s", e.time_secs)),
            ])
            .style(style)
        })
        .collect();

    Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(22),
            Constraint::Length(12),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(7),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Top {} · {}", entries.len(), app.filter)),
    )
    .render(area, buf);
}

fn render_chat(app: &App, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(area);

    let now = Utc::now();
    let messages = app.chat.current().cloned().unwrap_or_default();
    let visible = chunks[0].height.saturating_sub(2) as usize;
    let lines: Vec<Line> = messages
        .iter()
        .skip(messages.len().saturating_sub(visible))
        .map(|m| {
            let age = (now - m.submitted_at).to_std().unwrap_or_default();
            let when = HumanTime::from(age).to_text_en(Accuracy::Rough, Tense::Past);
            Line::from(vec![
                Span::styled(
                    format!("{when:>16} "),
                    Style::default().add_modifier(Modifier::DIM),
                ),
                Span::styled(format!("{}: ", m.username), bold().fg(Color::Cyan)),
                Span::raw(unescape_markup(&m.message)),
            ])
        })
        .collect();

    let body = if lines.is_empty() {
        Paragraph::new("No messages yet. Say hi!").alignment(Alignment::Center)
    } else {
        Paragraph::new(lines).wrap(Wrap { trim: false })
    };
    body.block(Block::default().borders(Borders::ALL).title("Chat"))
        .render(chunks[0], buf);

    render_input(&app.draft, "message", chunks[1], buf);
}

fn render_input(draft: &str, title: &str, area: Rect, buf: &mut Buffer) {
    Paragraph::new(Line::from(vec![
        Span::raw(draft.to_string()),
        Span::styled(" ", Style::default().add_modifier(Modifier::REVERSED)),
    ]))
    .block(Block::default().borders(Borders::ALL).title(title.to_string()))
    .render(area, buf);
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // header
                Constraint::Length(1), // padding
                Constraint::Min(1),    // body
                Constraint::Length(1), // stats
                Constraint::Length(1), // status
                Constraint::Length(1), // legend
            ])
            .split(area);

        render_header(self, chunks[0], buf);

        match self.screen {
            Screen::Typing | Screen::Results => {
                render_snippet(self, chunks[2], buf);
                Paragraph::new(Span::styled(stats_line(self), bold()))
                    .alignment(Alignment::Center)
                    .render(chunks[3], buf);
            }
            Screen::Leaderboard => render_leaderboard(self, chunks[2], buf),
            Screen::Chat => render_chat(self, chunks[2], buf),
            Screen::Login => {
                let login_area = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([
                        Constraint::Length(chunks[2].height.saturating_sub(3) / 2),
                        Constraint::Length(3),
                        Constraint::Min(0),
                    ])
                    .split(chunks[2])[1];
                render_input(&self.draft, "username (3-20 letters, digits, _)", login_area, buf);
            }
        }

        if let Some(status) = &self.status {
            let style = if status.error {
                bold().fg(Color::Red)
            } else {
                italic().fg(Color::Cyan)
            };
            Paragraph::new(Span::styled(status.text.clone(), style))
                .alignment(Alignment::Center)
                .render(chunks[4], buf);
        }

        Paragraph::new(Span::styled(legend(self), italic())).render(chunks[5], buf);
    }
}
