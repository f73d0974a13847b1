use bookrec_core::config::UiConfig;
use bookrec_core::{BookQuery, Catalog, RecommendationSet, RecommendationView, SimilarityMode};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{info, warn};

use crate::theme::NordTheme;

/// Minimum-rating filter steps, cycled with `r`.
pub const MIN_RATING_STEPS: [Option<f64>; 5] = [None, Some(3.0), Some(3.5), Some(4.0), Some(4.5)];

/// Which widget receives typed characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Query,
    Genre,
    Results,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Self::Query => Self::Genre,
            Self::Genre => Self::Results,
            Self::Results => Self::Query,
        }
    }
}

pub struct App {
    pub catalog: Catalog,
    pub theme: NordTheme,
    pub focus: Focus,
    pub query: String,
    pub genre: String,
    pub mode: SimilarityMode,
    pub limit: usize,
    pub max_limit: usize,
    min_rating_step: usize,
    pub results: Option<RecommendationSet>,
    pub selected: usize,
    pub status_message: String,
    pub should_quit: bool,
}

impl App {
    pub fn new(catalog: Catalog, ui: &UiConfig) -> Self {
        let status_message = format!(
            "{} books loaded. Type a title and press Enter.",
            catalog.dataset().len()
        );
        Self {
            catalog,
            theme: NordTheme::default(),
            focus: Focus::Query,
            query: String::new(),
            genre: String::new(),
            mode: ui.default_mode,
            limit: ui.default_limit.clamp(1, ui.max_limit.max(1)),
            max_limit: ui.max_limit.max(1),
            min_rating_step: 0,
            results: None,
            selected: 0,
            status_message,
            should_quit: false,
        }
    }

    pub fn min_rating(&self) -> Option<f64> {
        MIN_RATING_STEPS[self.min_rating_step]
    }

    pub fn selected_result(&self) -> Option<&RecommendationView> {
        self.results.as_ref().and_then(|set| set.results.get(self.selected))
    }

    fn book_query(&self) -> BookQuery {
        let mut query = BookQuery::new(self.query.trim())
            .with_mode(self.mode)
            .with_limit(self.limit);
        query.min_rating = self.min_rating();
        let genre = self.genre.trim();
        if !genre.is_empty() {
            query.genre = Some(genre.to_string());
        }
        query
    }

    /// Re-run the current query. Errors land in the status line.
    pub fn refresh(&mut self) {
        if self.query.trim().is_empty() {
            self.results = None;
            self.status_message = "Type a title to get recommendations.".to_string();
            return;
        }
        match self.catalog.recommend_for(&self.book_query()) {
            Ok(set) => {
                self.status_message = format!(
                    "{} {} matches for \"{}\"",
                    set.results.len(),
                    set.mode,
                    set.query.title
                );
                self.selected = self.selected.min(set.results.len().saturating_sub(1));
                self.results = Some(set);
            }
            Err(e) => {
                self.results = None;
                self.selected = 0;
                self.status_message = e.to_string();
            }
        }
    }

    pub fn cycle_mode(&mut self) {
        self.mode = self.mode.next();
        self.refresh();
    }

    pub fn cycle_min_rating(&mut self) {
        self.min_rating_step = (self.min_rating_step + 1) % MIN_RATING_STEPS.len();
        self.refresh();
    }

    pub fn change_limit(&mut self, delta: isize) {
        self.limit = self.limit.saturating_add_signed(delta).clamp(1, self.max_limit);
        self.refresh();
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = self.results.as_ref().map_or(0, |s| s.results.len());
        if len == 0 {
            return;
        }
        self.selected = self.selected.saturating_add_signed(delta).min(len - 1);
    }

    pub fn reload(&mut self) {
        match self.catalog.reload() {
            Ok(()) => {
                info!(books = self.catalog.dataset().len(), "catalog reloaded");
                self.refresh();
                self.status_message = format!("Reloaded {} books", self.catalog.dataset().len());
            }
            Err(e) => {
                warn!(error = %e, "reload failed");
                self.status_message = format!("Reload failed: {e}");
            }
        }
    }

    pub fn open_selected(&mut self) {
        let Some(url) = self.selected_result().and_then(|r| r.book.source_url.clone()) else {
            self.status_message = "No link for this book".to_string();
            return;
        };
        match open::that(&url) {
            Ok(()) => self.status_message = format!("Opened {url}"),
            Err(e) => self.status_message = format!("Failed to open {url}: {e}"),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('q') => self.should_quit = true,
                KeyCode::Char('r') => self.reload(),
                KeyCode::Char('t') => self.cycle_mode(),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::Enter => {
                self.selected = 0;
                self.refresh();
                if self.results.is_some() {
                    self.focus = Focus::Results;
                }
            }
            KeyCode::F(5) => self.reload(),
            KeyCode::Esc => match self.focus {
                Focus::Results => self.should_quit = true,
                _ => self.focus = Focus::Results,
            },
            code => match self.focus {
                Focus::Query => edit(&mut self.query, code),
                Focus::Genre => edit(&mut self.genre, code),
                Focus::Results => self.handle_results_key(code),
            },
        }
    }

    fn handle_results_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Char('m') => self.cycle_mode(),
            KeyCode::Char('r') => self.cycle_min_rating(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.change_limit(1),
            KeyCode::Char('-') => self.change_limit(-1),
            KeyCode::Char('o') => self.open_selected(),
            KeyCode::Char('R') => self.reload(),
            KeyCode::Char('/') | KeyCode::Char('i') => self.focus = Focus::Query,
            KeyCode::Char('g') => self.focus = Focus::Genre,
            _ => {}
        }
    }
}

fn edit(buffer: &mut String, code: KeyCode) {
    match code {
        KeyCode::Char(c) => buffer.push(c),
        KeyCode::Backspace => {
            buffer.pop();
        }
        _ => {}
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bookrec_core::storage::save_dataset;
    use bookrec_core::{AppConfig, BookRecord, Dataset, FeatureMatrix, VectorizerPreset};
    use tempfile::TempDir;

    pub(crate) fn app(dir: &TempDir) -> App {
        let mut books = Vec::new();
        for (title, genres, rating) in [
            ("The Hobbit", vec!["fantasy", "fiction"], 4.3),
            ("The Silmarillion", vec!["fantasy"], 3.9),
            ("Dune", vec!["science fiction"], 4.2),
            ("Emma", vec!["classics", "romance"], 4.0),
        ] {
            let mut b = BookRecord::new(title, "someone");
            b.genres = genres.into_iter().map(String::from).collect();
            b.rating = Some(rating);
            books.push(b);
        }
        let ds = Dataset::new(books).unwrap().with_clusters(&[0, 0, 1, 1]).unwrap();
        let config = AppConfig::default();
        let features = FeatureMatrix::build(&ds, &config.features).unwrap();
        let path = dir.path().join("books.db");
        save_dataset(&path, &ds, &features, Some(2)).unwrap();
        let catalog = Catalog::load(&path, VectorizerPreset::Interactive, &config).unwrap();
        App::new(catalog, &config.ui)
    }

    pub(crate) fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    pub(crate) fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_enter_runs_query_and_focuses_results() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        type_text(&mut app, "hobbit");
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.focus, Focus::Results);
        let set = app.results.as_ref().unwrap();
        assert_eq!(set.query.title, "The Hobbit");
        assert_eq!(set.results.len(), 3);
    }

    #[test]
    fn test_result_keys_adjust_query() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        type_text(&mut app, "hobbit");
        press(&mut app, KeyCode::Enter);

        press(&mut app, KeyCode::Char('m'));
        assert_eq!(app.mode, SimilarityMode::Title);

        press(&mut app, KeyCode::Char('-'));
        assert_eq!(app.results.as_ref().unwrap().results.len(), 3);
        let limit = app.limit;
        for _ in 0..limit {
            press(&mut app, KeyCode::Char('-'));
        }
        assert_eq!(app.limit, 1);
        assert_eq!(app.results.as_ref().unwrap().results.len(), 1);

        press(&mut app, KeyCode::Char('r'));
        assert_eq!(app.min_rating(), Some(3.0));
    }

    #[test]
    fn test_genre_filter_and_selection_bounds() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        type_text(&mut app, "hobbit");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "Fantasy");
        press(&mut app, KeyCode::Enter);

        let set = app.results.as_ref().unwrap();
        assert_eq!(set.results.len(), 1);
        assert_eq!(set.results[0].book.title, "The Silmarillion");

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn test_unknown_title_reports_in_status() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        type_text(&mut app, "qqqzzzxxx");
        press(&mut app, KeyCode::Enter);
        assert!(app.results.is_none());
        assert_eq!(app.focus, Focus::Query);
        assert!(app.status_message.contains("qqqzzzxxx"));
    }

    #[test]
    fn test_quit_keys() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        type_text(&mut app, "q");
        assert!(!app.should_quit);
        assert_eq!(app.query, "q");

        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }
}
