mod ui;

use codetype::{
    app_dirs::AppDirs,
    board::{Board, Fetch, PollCache, PublicChatMessage},
    config::{Config, ConfigStore, FileConfigStore},
    error::SubmitError,
    identity::{Actor, ClientInfo, LocalSession, SessionStore},
    language::{Language, LeaderboardFilter},
    leaderboard::LeaderboardEntry,
    moderation::SubstringFilter,
    runtime::{AppEvent, CrosstermEventSource, RotationCadence, Runner, SessionTicker},
    session::{InputOutcome, SessionState, TypingSession},
    snippets::{self, EmbeddedSnippets},
    store::{Persistence, SqliteStore},
    typing_policy,
    util::unescape_markup,
};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    io::{self, stdin, Write},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// type real source code against the clock and compare on a shared leaderboard
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal typing trainer for source code. Snippets in seven languages, live wpm and accuracy, a shared leaderboard and a chat room backed by a local SQLite board."
)]
pub struct Cli {
    /// language of the snippets to type
    #[clap(short = 'l', long, value_enum)]
    language: Option<Language>,

    /// sign in as this user on start
    #[clap(short = 'u', long)]
    user: Option<String>,

    /// path of the shared board database
    #[clap(long)]
    db: Option<PathBuf>,

    /// seconds between snippet rotations while idle (0 disables rotation)
    #[clap(long)]
    rotate_secs: Option<u64>,

    /// print the leaderboard for a language (or "all") and exit
    #[clap(long, value_name = "FILTER")]
    leaderboard: Option<LeaderboardFilter>,

    /// print the latest chat messages and exit
    #[clap(long)]
    chat: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Typing,
    Results,
    Leaderboard,
    Chat,
    Login,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    pub session: TypingSession,
    pub screen: Screen,
    pub language: Language,
    pub filter: LeaderboardFilter,
    pub leaderboard: PollCache<Vec<LeaderboardEntry>>,
    pub chat: PollCache<Vec<PublicChatMessage>>,
    /// text being composed on the chat or login screen
    pub draft: String,
    pub status: Option<Status>,
    /// the current result has been stored on the board
    pub saved: bool,
    board: Board,
    user: LocalSession,
    client: ClientInfo,
    snippets: EmbeddedSnippets,
    rotation: RotationCadence,
    config: Config,
    config_store: Option<Box<dyn ConfigStore>>,
}

impl App {
    pub fn new(
        board: Board,
        config: Config,
        config_store: Option<Box<dyn ConfigStore>>,
        rotate_every: Duration,
    ) -> Self {
        let snippets = EmbeddedSnippets;
        let language = config.language;
        let snippet = snippets::pick(&snippets, language);
        let remembered = config.username.clone();

        let mut app = Self {
            session: TypingSession::with_snippet(snippet),
            screen: Screen::Typing,
            language,
            filter: LeaderboardFilter::All,
            leaderboard: PollCache::new(),
            chat: PollCache::new(),
            draft: String::new(),
            status: None,
            saved: false,
            board,
            user: LocalSession::new(None),
            client: ClientInfo::local(config.client_address.clone()),
            snippets,
            rotation: RotationCadence::new(rotate_every, Instant::now()),
            config,
            config_store,
        };
        if let Some(name) = remembered {
            app.restore_login(&name);
        }
        app
    }

    /// A remembered name goes through the board like any other login and is
    /// forgotten if the board refuses it.
    fn restore_login(&mut self, name: &str) {
        self.login(name);
        if self.username().is_none() {
            tracing::warn!(username = name, "dropping remembered username");
            self.config.username = None;
            self.save_config();
        }
    }

    pub fn username(&self) -> Option<String> {
        self.user.current_user()
    }

    fn actor(&self) -> Actor {
        Actor::from_session(&self.user, self.client.clone())
    }

    fn info(&mut self, text: impl Into<String>) {
        self.status = Some(Status {
            text: text.into(),
            error: false,
        });
    }

    fn fail(&mut self, err: &SubmitError) {
        let text = match err {
            SubmitError::Unauthenticated => "login required, press (l) to log in".to_string(),
            other => other.to_string(),
        };
        self.status = Some(Status { text, error: true });
    }

    /// Whether the live stats need the fast tick
    pub fn is_live(&self) -> bool {
        self.screen == Screen::Typing && self.session.is_running()
    }

    fn save_config(&self) {
        if let Some(store) = &self.config_store {
            if let Err(e) = store.save(&self.config) {
                tracing::warn!(error = %e, "could not save config");
            }
        }
    }

    pub fn on_tick(&mut self, now: Instant) {
        let idle = self.screen == Screen::Typing && self.session.state() == SessionState::Idle;
        if self.rotation.due(now, idle) {
            let current = self.session.target().to_string();
            let next = snippets::pick_other(&self.snippets, self.language, &current);
            self.session.rotate(next);
        }
        match self.screen {
            Screen::Leaderboard => self.refresh_leaderboard(now),
            Screen::Chat => self.refresh_chat(now),
            _ => {}
        }
    }

    fn refresh_leaderboard(&mut self, now: Instant) {
        let board = &self.board;
        let filter = self.filter;
        self.leaderboard
            .get(now, |etag| board.fetch_leaderboard(filter, etag));
    }

    fn refresh_chat(&mut self, now: Instant) {
        let board = &self.board;
        self.chat.get(now, |etag| board.fetch_chat(etag));
    }

    fn open(&mut self, screen: Screen) {
        self.screen = screen;
        self.draft.clear();
        let now = Instant::now();
        match screen {
            Screen::Leaderboard => self.refresh_leaderboard(now),
            Screen::Chat => self.refresh_chat(now),
            _ => {}
        }
    }

    /// Screen to return to from the board, chat and login views
    fn home(&self) -> Screen {
        if self.session.state() == SessionState::Completed {
            Screen::Results
        } else {
            Screen::Typing
        }
    }

    pub fn change_language(&mut self, language: Language) {
        self.language = language;
        self.session
            .change_language(snippets::pick(&self.snippets, language));
        self.saved = false;
        self.screen = Screen::Typing;
        self.rotation.reset(Instant::now());
        self.config.language = language;
        self.save_config();
    }

    fn new_snippet(&mut self) {
        let current = self.session.target().to_string();
        let next = snippets::pick_other(&self.snippets, self.language, &current);
        self.session.change_language(next);
        self.saved = false;
        self.screen = Screen::Typing;
        self.rotation.reset(Instant::now());
    }

    fn start_test(&mut self) {
        if self.session.start() {
            self.saved = false;
            self.status = None;
            self.screen = Screen::Typing;
        }
    }

    pub fn submit_result(&mut self) {
        if self.saved {
            self.info("result already saved");
            return;
        }
        let Some(result) = self.session.result() else {
            return;
        };
        match self
            .board
            .submit_score(&self.actor(), &result.to_submission())
        {
            Ok(record) => {
                self.saved = true;
                self.leaderboard.invalidate();
                self.info(format!(
                    "saved {} wpm / {}% in {}",
                    record.wpm, record.accuracy, record.language
                ));
            }
            Err(e) => self.fail(&e),
        }
    }

    fn send_chat(&mut self) {
        match self.board.submit_chat(&self.actor(), &self.draft) {
            Ok(_) => {
                self.draft.clear();
                self.status = None;
                self.chat.invalidate();
                self.refresh_chat(Instant::now());
            }
            Err(e) => self.fail(&e),
        }
    }

    pub fn login(&mut self, username: &str) {
        match self.board.login(&self.client, username) {
            Ok(name) => {
                self.user.sign_in(&name);
                self.config.username = Some(name.clone());
                self.save_config();
                self.info(format!("logged in as {name}"));
            }
            Err(e) => self.fail(&e),
        }
    }

    pub fn logout(&mut self) {
        self.board.logout(&self.user);
        self.config.username = None;
        self.save_config();
        self.info("logged out");
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Flow {
        if key.kind != KeyEventKind::Press {
            return Flow::Continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Flow::Quit;
        }

        match self.screen {
            Screen::Typing if self.session.is_running() => self.on_typing_key(key),
            Screen::Typing => return self.on_idle_key(key),
            Screen::Results => return self.on_results_key(key),
            Screen::Leaderboard => self.on_leaderboard_key(key),
            Screen::Chat => self.on_chat_key(key),
            Screen::Login => self.on_login_key(key),
        }
        Flow::Continue
    }

    fn on_typing_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Esc {
            self.session.reset();
            self.info("test abandoned");
            return;
        }
        let Some(edit) = typing_policy::edit_for(&key) else {
            return;
        };
        let buffer = typing_policy::apply_edit(self.session.input(), edit);
        if self.session.apply_input(&buffer) == InputOutcome::Completed {
            self.screen = Screen::Results;
        }
    }

    /// Commands shared by the idle and results screens
    fn on_menu_key(&mut self, key: KeyEvent) -> Flow {
        match key.code {
            KeyCode::Esc => return Flow::Quit,
            KeyCode::Char('n') => self.new_snippet(),
            KeyCode::Char('b') => self.open(Screen::Leaderboard),
            KeyCode::Char('c') => self.open(Screen::Chat),
            KeyCode::Char('l') => {
                if self.username().is_some() {
                    self.logout();
                } else {
                    self.open(Screen::Login);
                }
            }
            _ => {}
        }
        Flow::Continue
    }

    fn on_idle_key(&mut self, key: KeyEvent) -> Flow {
        match key.code {
            KeyCode::Enter => self.start_test(),
            KeyCode::Left => self.change_language(self.language.previous()),
            KeyCode::Right => self.change_language(self.language.next()),
            _ => return self.on_menu_key(key),
        }
        Flow::Continue
    }

    fn on_results_key(&mut self, key: KeyEvent) -> Flow {
        match key.code {
            KeyCode::Char('s') => self.submit_result(),
            KeyCode::Char('r') => self.start_test(),
            _ => return self.on_menu_key(key),
        }
        Flow::Continue
    }

    fn on_leaderboard_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('b') => self.screen = self.home(),
            KeyCode::Left | KeyCode::Right => {
                self.filter = if key.code == KeyCode::Left {
                    self.filter.previous()
                } else {
                    self.filter.next()
                };
                self.leaderboard.invalidate();
                self.refresh_leaderboard(Instant::now());
            }
            _ => {}
        }
    }

    fn on_chat_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.screen = self.home(),
            KeyCode::Enter => self.send_chat(),
            KeyCode::Backspace => {
                self.draft.pop();
            }
            KeyCode::Char(c) => self.draft.push(c),
            _ => {}
        }
    }

    fn on_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.screen = self.home(),
            KeyCode::Enter => {
                let name = std::mem::take(&mut self.draft);
                self.login(&name);
                if self.username().is_some() {
                    self.screen = self.home();
                }
            }
            KeyCode::Backspace => {
                self.draft.pop();
            }
            KeyCode::Char(c) => self.draft.push(c),
            _ => {}
        }
    }
}

fn init_logging() -> Option<WorkerGuard> {
    let log_dir = AppDirs::log_dir()?;
    std::fs::create_dir_all(&log_dir).ok()?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "codetype.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(EnvFilter::try_from_env("CODETYPE_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    Some(guard)
}

fn print_leaderboard<W: Write>(
    out: &mut W,
    board: &Board,
    filter: LeaderboardFilter,
) -> io::Result<()> {
    let entries = match board.fetch_leaderboard(filter, None) {
        Fetch::Fresh(cached) => cached.body,
        Fetch::NotModified => Vec::new(),
    };
    writeln!(out, "leaderboard: {filter}")?;
    if entries.is_empty() {
        return writeln!(out, "no scores yet");
    }
    writeln!(
        out,
        "{:>3}  {:<20} {:<10} {:>4} {:>4} {:>6} {:>6}",
        "#", "user", "language", "wpm", "acc", "errors", "time"
    )?;
    for (rank, e) in entries.iter().enumerate() {
        writeln!(
            out,
            "{:>3}  {:<20} {:<10} {:>4} {:>3}% {:>6} {:>5}s",
            rank + 1,
            e.username,
            e.language,
            e.wpm,
            e.accuracy,
            e.errors,
            e.time_secs
        )?;
    }
    Ok(())
}

fn print_chat<W: Write>(out: &mut W, board: &Board) -> io::Result<()> {
    let messages = match board.fetch_chat(None) {
        Fetch::Fresh(cached) => cached.body,
        Fetch::NotModified => Vec::new(),
    };
    if messages.is_empty() {
        return writeln!(out, "no messages yet");
    }
    for m in messages {
        writeln!(
            out,
            "[{}] {}: {}",
            m.submitted_at.format("%Y-%m-%d %H:%M:%S"),
            m.username,
            unescape_markup(&m.message)
        )?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let _guard = init_logging();

    let config_store = FileConfigStore::new();
    let mut config = config_store.load();
    if let Some(language) = cli.language {
        config.language = language;
    }

    let db_path = cli
        .db
        .clone()
        .or_else(|| config.db_path.clone())
        .or_else(AppDirs::db_path)
        .unwrap_or_else(|| PathBuf::from("codetype.db"));
    let store: Arc<dyn Persistence> = Arc::new(SqliteStore::open(&db_path)?);
    let board = Board::new(store).with_filter(SubstringFilter::new(&config.prohibited_words));

    if let Some(filter) = cli.leaderboard {
        return Ok(print_leaderboard(&mut io::stdout(), &board, filter)?);
    }
    if cli.chat {
        return Ok(print_chat(&mut io::stdout(), &board)?);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    tracing::info!(db = %db_path.display(), language = %config.language, "starting");
    let rotate_every = Duration::from_secs(cli.rotate_secs.unwrap_or(config.rotate_secs));
    if cli.user.is_some() {
        config.username = cli.user.clone();
    }
    let mut app = App::new(board, config, Some(Box::new(config_store)), rotate_every);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(CrosstermEventSource::new(), SessionTicker::default());

    loop {
        terminal.draw(|f| ui(app, f))?;

        match runner.step(app.is_live()) {
            AppEvent::Tick => app.on_tick(Instant::now()),
            AppEvent::Resize => {}
            AppEvent::Key(key) => {
                if app.on_key(key) == Flow::Quit {
                    break;
                }
            }
        }
    }

    tracing::info!("shutting down");
    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}
