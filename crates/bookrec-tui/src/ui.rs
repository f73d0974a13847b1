use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use bookrec_core::{BookView, SimilarityMode};

use crate::app::{App, Focus};

/// Render the entire UI.
pub fn render(frame: &mut Frame, app: &App) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // inputs
            Constraint::Length(1), // settings
            Constraint::Min(5),    // body
            Constraint::Length(1), // status bar
            Constraint::Length(1), // key hints
        ])
        .split(frame.area());

    render_inputs(frame, app, layout[0]);
    render_settings(frame, app, layout[1]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(layout[2]);
    render_results(frame, app, body[0]);
    render_detail(frame, app, body[1]);

    render_statusbar(frame, app, layout[3]);
    render_hints(frame, app, layout[4]);
}

fn panel<'a>(app: &App, title: &'a str, focused: bool) -> Block<'a> {
    let border = if focused {
        app.theme.active_panel()
    } else {
        app.theme.border()
    };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(app.theme.bg()))
}

fn render_inputs(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    let fields = [
        (" TITLE ", &app.query, Focus::Query, "book you liked"),
        (" GENRE ", &app.genre, Focus::Genre, "any genre"),
    ];
    for ((title, value, focus, placeholder), chunk) in fields.into_iter().zip(chunks.iter()) {
        let focused = app.focus == focus;
        let line = if value.is_empty() && !focused {
            Line::from(Span::styled(placeholder, Style::default().fg(app.theme.muted())))
        } else {
            let mut spans = vec![Span::styled(value.as_str(), Style::default().fg(app.theme.fg_white()))];
            if focused {
                spans.push(Span::styled("▏", Style::default().fg(app.theme.active_panel())));
            }
            Line::from(spans)
        };
        frame.render_widget(Paragraph::new(line).block(panel(app, title, focused)), *chunk);
    }
}

fn render_settings(frame: &mut Frame, app: &App, area: Rect) {
    let label = Style::default().fg(app.theme.muted());
    let value = Style::default().fg(app.theme.active_panel()).add_modifier(Modifier::BOLD);

    let mut spans = vec![Span::styled(" mode ", label)];
    for mode in SimilarityMode::ALL {
        let style = if mode == app.mode {
            Style::default()
                .bg(app.theme.cursor_bg())
                .fg(app.theme.fg_white())
                .add_modifier(Modifier::BOLD)
        } else {
            label
        };
        spans.push(Span::styled(format!(" {mode} "), style));
    }
    spans.push(Span::styled("  top ", label));
    spans.push(Span::styled(app.limit.to_string(), value));
    spans.push(Span::styled("  min rating ", label));
    spans.push(Span::styled(
        app.min_rating().map_or_else(|| "any".to_string(), |r| format!("{r:.1}")),
        value,
    ));

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(app.theme.bg_secondary())),
        area,
    );
}

fn stars(rating: Option<f64>) -> String {
    match rating {
        Some(r) => {
            let full = r.round().clamp(0.0, 5.0) as usize;
            "★".repeat(full) + &"☆".repeat(5 - full)
        }
        None => "☆☆☆☆☆".to_string(),
    }
}

fn render_results(frame: &mut Frame, app: &App, area: Rect) {
    let block = panel(app, " RECOMMENDATIONS ", app.focus == Focus::Results);

    let Some(set) = &app.results else {
        let hint = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "  Enter a title and press Enter",
                Style::default().fg(app.theme.muted()),
            )),
        ])
        .block(block);
        frame.render_widget(hint, area);
        return;
    };

    if set.results.is_empty() {
        let empty = Paragraph::new(Line::from(Span::styled(
            "  Nothing passes the current filters",
            Style::default().fg(app.theme.muted()),
        )))
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = set
        .results
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>2}. ", i + 1), Style::default().fg(app.theme.muted())),
                Span::styled(format!("{:.3} ", rec.score), Style::default().fg(app.theme.success())),
                Span::styled(rec.book.title.clone(), Style::default().fg(app.theme.fg_white())),
                Span::styled(format!("  {}", rec.book.author), Style::default().fg(app.theme.muted())),
            ]))
        })
        .collect();

    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .bg(app.theme.cursor_bg())
            .add_modifier(Modifier::BOLD),
    );
    let mut state = ListState::default().with_selected(Some(app.selected));
    frame.render_stateful_widget(list, area, &mut state);
}

fn field<'a>(app: &App, name: &'a str, value: String) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("  {name:<9}"), Style::default().fg(app.theme.muted())),
        Span::styled(value, Style::default().fg(app.theme.fg())),
    ])
}

fn book_lines<'a>(app: &App, book: &BookView) -> Vec<Line<'a>> {
    let rating = match book.rating {
        Some(r) => format!("{} {r:.2} ({} ratings)", stars(Some(r)), book.rating_count),
        None => stars(None),
    };
    let genres = if book.genres.is_empty() {
        "—".to_string()
    } else {
        book.genres.iter().map(|g| format!("[{g}]")).collect::<Vec<_>>().join(" ")
    };

    vec![
        Line::from(Span::styled(
            format!("  {}", book.title),
            Style::default().fg(app.theme.fg_white()).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(format!("  {}", book.author), Style::default().fg(app.theme.fg()))),
        Line::from(""),
        Line::from(vec![
            Span::styled("  rating   ", Style::default().fg(app.theme.muted())),
            Span::styled(rating, Style::default().fg(app.theme.star_color())),
        ]),
        field(app, "year", book.year.map_or_else(|| "—".to_string(), |y| y.to_string())),
        Line::from(vec![
            Span::styled("  cluster  ", Style::default().fg(app.theme.muted())),
            Span::styled(
                book.cluster.map_or_else(|| "—".to_string(), |c| c.to_string()),
                Style::default().fg(app.theme.cluster_color()),
            ),
        ]),
        field(app, "genres", genres),
        Line::from(vec![
            Span::styled("  link     ", Style::default().fg(app.theme.muted())),
            Span::styled(
                book.source_url.clone().unwrap_or_else(|| "—".to_string()),
                Style::default().fg(app.theme.path_color()),
            ),
        ]),
    ]
}

fn render_detail(frame: &mut Frame, app: &App, area: Rect) {
    let block = panel(app, " DETAILS ", false);
    let (Some(set), Some(rec)) = (&app.results, app.selected_result()) else {
        frame.render_widget(block, area);
        return;
    };

    let mut lines = book_lines(app, &rec.book);
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("  Similarity to \"{}\"", set.query.title),
        Style::default().fg(app.theme.active_panel()),
    )));
    match app.catalog.engine().components(set.query.id, rec.book.id) {
        Ok(c) => {
            lines.push(field(app, set.mode.as_str(), format!("{:.3}", rec.score)));
            for (name, value) in [
                ("title", c.title),
                ("genre", c.genre),
                ("rating", c.rating),
                ("year", c.year),
                ("cluster", c.same_cluster),
            ] {
                lines.push(field(app, name, format!("{value:.3}")));
            }
        }
        Err(e) => lines.push(Line::from(Span::styled(
            format!("  {e}"),
            Style::default().fg(app.theme.danger()),
        ))),
    }

    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn render_statusbar(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(10), Constraint::Length(24)])
        .split(area);

    let left = Line::from(vec![
        Span::styled(
            " bookrec ",
            Style::default().fg(app.theme.active_panel()).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" › ", Style::default().fg(app.theme.muted())),
        Span::styled(app.status_message.as_str(), Style::default().fg(app.theme.fg())),
    ]);
    frame.render_widget(
        Paragraph::new(left).style(Style::default().bg(app.theme.bg_secondary())),
        chunks[0],
    );

    let right = Line::from(Span::styled(
        format!("{} books ", app.catalog.dataset().len()),
        Style::default().fg(app.theme.muted()),
    ));
    frame.render_widget(
        Paragraph::new(right)
            .style(Style::default().bg(app.theme.bg_secondary()))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn render_hints(frame: &mut Frame, app: &App, area: Rect) {
    let hints: &[(&str, &str)] = match app.focus {
        Focus::Results => &[
            ("j/k", "move"),
            ("m", "mode"),
            ("r", "min rating"),
            ("+/-", "top n"),
            ("o", "open"),
            ("/", "title"),
            ("g", "genre"),
            ("R", "reload"),
            ("q", "quit"),
        ],
        Focus::Query | Focus::Genre => &[
            ("Enter", "recommend"),
            ("Tab", "next field"),
            ("^T", "mode"),
            ("^R", "reload"),
            ("Esc", "results"),
            ("^C", "quit"),
        ],
    };

    let mut spans = Vec::new();
    for (key, action) in hints {
        spans.push(Span::styled(
            format!(" {key} "),
            Style::default().fg(app.theme.star_color()).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(format!("{action} "), Style::default().fg(app.theme.muted())));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(app.theme.bg())),
        area,
    );
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyCode;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use tempfile::TempDir;

    use super::*;
    use crate::app::tests::{app, press, type_text};

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_empty_state_shows_hint() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);
        let text = screen(&app);
        assert!(text.contains("Enter a title and press Enter"));
        assert!(text.contains("4 books"));
    }

    #[test]
    fn test_results_and_details_render() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        type_text(&mut app, "hobbit");
        press(&mut app, KeyCode::Enter);

        let text = screen(&app);
        assert!(text.contains("RECOMMENDATIONS"));
        assert!(text.contains("The Silmarillion"));
        assert!(text.contains("Similarity to \"The Hobbit\""));
    }

    #[test]
    fn test_stars() {
        assert_eq!(stars(Some(4.3)), "★★★★☆");
        assert_eq!(stars(None), "☆☆☆☆☆");
        assert_eq!(stars(Some(7.0)), "★★★★★");
    }
}
