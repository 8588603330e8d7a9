use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use maze_pursuit_core::{
    Direction as Heading, Position,
    agent::{Agent, ManualAgent, PlanningAgent},
    config::Config,
    game::{Game, GameStatus, StepOutcome},
    heuristics::HeuristicKind,
    maze::{Cell, Maze},
    planner::Planner,
    rules::TeleportMode,
    state::{Action, State},
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    io::{self, Stdout},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Layout file to load
    #[arg(short, long, value_name = "LAYOUT_FILE", default_value = "layouts/classic.txt")]
    layout: PathBuf,

    /// Who drives the agent
    #[arg(long, value_enum, default_value_t = Mode::Auto)]
    mode: Mode,

    /// Heuristic used by the planner
    #[arg(long, value_name = "KIND")]
    heuristic: Option<HeuristicKind>,

    /// Stop each search after this many expansions
    #[arg(long, value_name = "N")]
    max_expansions: Option<usize>,

    /// Steps between scheduled maze rotations
    #[arg(long, value_name = "N", conflicts_with = "no_rotation")]
    rotation_interval: Option<u32>,

    /// Disable scheduled maze rotation
    #[arg(long)]
    no_rotation: bool,

    /// How teleport corners resolve (defaults to manual when playing by hand)
    #[arg(long, value_name = "MODE")]
    teleport: Option<TeleportMode>,

    /// JSON config file; flags override its values
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Milliseconds between automatic steps
    #[arg(long, value_name = "MS", default_value_t = 250)]
    tick_ms: u64,

    /// Where the TUI writes its log
    #[arg(long, value_name = "LOG_FILE", default_value = "maze_pursuit.log")]
    log_file: PathBuf,

    /// Plan once, print the result and exit without starting the TUI
    #[arg(long)]
    plan_only: bool,

    /// Print the plan-only report as JSON
    #[arg(long, requires = "plan_only")]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Arrow keys move, digits pick teleport destinations
    Manual,
    /// The planner plays
    Auto,
}

impl Args {
    /// Config file (or defaults) with command line overrides applied.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(heuristic) = self.heuristic {
            config.planner.heuristic = heuristic;
        }
        if self.max_expansions.is_some() {
            config.planner.max_expansions = self.max_expansions;
        }
        if self.no_rotation {
            config.rules.rotation_interval = None;
        }
        if let Some(interval) = self.rotation_interval {
            if interval == 0 {
                bail!("--rotation-interval must be positive");
            }
            config.rules.rotation_interval = Some(interval);
        }
        match (self.teleport, self.mode) {
            (Some(teleport), _) => config.rules.teleport_mode = teleport,
            (None, Mode::Manual) => config.rules.teleport_mode = TeleportMode::Manual,
            (None, Mode::Auto) => {}
        }
        Ok(config)
    }
}

/// Installs the global subscriber. The TUI owns the terminal, so its log
/// goes to a file; plan-only runs log to stderr.
fn init_logging(log_file: &Path, to_stderr: bool) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if to_stderr {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
        return Ok(None);
    }

    let directory = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = log_file
        .file_name()
        .with_context(|| format!("log file {} has no file name", log_file.display()))?;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("creating log directory {}", directory.display()))?;
    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false),
        )
        .init();
    Ok(Some(guard))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let _guard = init_logging(&args.log_file, args.plan_only)?;

    let config = args.resolve_config()?;
    let maze = Maze::from_file(&args.layout)
        .with_context(|| format!("loading layout {}", args.layout.display()))?;
    tracing::info!(
        layout = %args.layout.display(),
        rows = maze.rows(),
        cols = maze.cols(),
        heuristic = %config.planner.heuristic,
        teleport = %config.rules.teleport_mode,
        rotation_interval = ?config.rules.rotation_interval,
        "layout loaded"
    );

    if args.plan_only {
        return plan_only(maze, config, args.json);
    }

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Create the application state
    let mut app = App::new(maze, config, args.mode);

    // Run the main application loop, restoring the terminal even on error
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
    restore_terminal(&mut terminal)?;
    result
}

/// Plans from the initial state, prints the report and checks the plan by
/// replaying it through a game session.
fn plan_only(maze: Maze, config: Config, json: bool) -> Result<()> {
    let rules = config.rules;
    let planner = Planner::new(rules, config.planner);
    let mut heuristic = config.planner.heuristic.build();
    let initial = State::initial(&maze);
    let report = planner.search_with_report(
        &maze,
        &initial,
        |state| rules.is_goal(&maze, state),
        heuristic.as_mut(),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let stats = &report.stats;
        println!("heuristic:    {}", config.planner.heuristic);
        println!("expanded:     {}", stats.expanded);
        println!("generated:    {}", stats.generated);
        println!("max frontier: {}", stats.max_frontier);
        println!("elapsed:      {:.3?}", stats.elapsed);
    }

    let Some(plan) = report.into_plan() else {
        bail!("no plan reaches the exit from the initial state");
    };

    let mut game = Game::new(maze, rules);
    for action in &plan.actions {
        game.apply(*action);
    }
    tracing::info!(cost = plan.cost, status = ?game.status(), "plan replayed");

    if !json {
        let steps: Vec<String> = plan.actions.iter().map(ToString::to_string).collect();
        println!("cost:         {}", plan.cost);
        println!("replay:       {:?}", game.status());
        println!("plan:         {}", steps.join(" "));
    }
    if game.status() != GameStatus::Won {
        bail!("replaying the plan ended in {:?}", game.status());
    }
    Ok(())
}

struct App {
    /// The core game session.
    game: Game,
    /// Whoever chooses the actions.
    agent: Box<dyn Agent>,
    config: Config,
    mode: Mode,
    /// Automatic stepping is suspended.
    paused: bool,
    last_outcome: Option<StepOutcome>,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(maze: Maze, config: Config, mode: Mode) -> Self {
        App {
            game: Game::new(maze, config.rules),
            agent: build_agent(mode, config),
            config,
            mode,
            paused: false,
            last_outcome: None,
            should_quit: false,
        }
    }

    /// Handles one automatic step of the simulation.
    fn tick(&mut self) {
        if self.mode != Mode::Auto || self.paused || !self.game.is_running() {
            return;
        }
        if let Some(outcome) = self.game.tick(self.agent.as_mut()) {
            self.last_outcome = Some(outcome);
        }
    }

    fn on_key(&mut self, code: KeyCode) {
        let action = match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.quit();
                return;
            }
            KeyCode::Char('r') => {
                self.reset();
                return;
            }
            KeyCode::Char(' ') => {
                self.paused = !self.paused;
                return;
            }
            KeyCode::Up | KeyCode::Char('w') => Action::Move(Heading::North),
            KeyCode::Down | KeyCode::Char('s') => Action::Move(Heading::South),
            KeyCode::Left | KeyCode::Char('a') => Action::Move(Heading::West),
            KeyCode::Right | KeyCode::Char('d') => Action::Move(Heading::East),
            KeyCode::Char(digit @ '1'..='9') => {
                let index = digit.to_digit(10).map_or(0, |d| d as usize);
                Action::SelectDestination(index)
            }
            _ => return,
        };
        if self.mode == Mode::Manual {
            self.agent.on_input(action);
            self.last_outcome = self.game.tick(self.agent.as_mut());
        }
    }

    fn reset(&mut self) {
        self.game.reset();
        self.agent = build_agent(self.mode, self.config);
        self.last_outcome = None;
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn build_agent(mode: Mode, config: Config) -> Box<dyn Agent> {
    match mode {
        Mode::Manual => Box::new(ManualAgent::new()),
        Mode::Auto => Box::new(PlanningAgent::new(config.rules, config.planner)),
    }
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?; // Put terminal in raw mode
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        // Draw the UI
        terminal.draw(|f| ui(f, app))?;

        // Calculate timeout for event polling
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key.code);
                }
            }
        }

        // Update application state if enough time has passed
        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // Area for the maze
            Constraint::Length(5), // Area for status
            Constraint::Length(2), // Area for help
        ])
        .split(frame.area());

    render_maze(frame, main_layout[0], &app.game);
    render_status(frame, main_layout[1], app);

    let help = match app.mode {
        Mode::Manual => "arrows/wasd move, 1-9 pick a teleport destination, 'r' reset, 'q' quit",
        Mode::Auto => "space pause, 'r' reset, 'q' or 'Esc' quit",
    };
    let help_text = Paragraph::new(help)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let game = &app.game;
    let state = game.state();
    let status = match game.status() {
        GameStatus::Running if app.paused => Span::styled("paused", Style::default().fg(Color::Yellow)),
        GameStatus::Running => Span::raw("running"),
        GameStatus::Won => Span::styled("won", Style::default().fg(Color::Green).bold()),
        GameStatus::Lost => Span::styled("caught", Style::default().fg(Color::Red).bold()),
    };
    let mut lines = vec![
        Line::from(vec![
            Span::raw(format!("Agent: {}  Status: ", app.agent.label())),
            status,
            Span::raw(format!(
                "  Last: {}",
                app.last_outcome
                    .map_or_else(|| "-".to_string(), |o| format!("{o:?}"))
            )),
        ]),
        Line::from(format!(
            "Step: {}  Food left: {}  Power: {}  Rotations: {}",
            state.step_count(),
            state.food_left(),
            state.agent().power_steps,
            game.maze().rotations(),
        )),
    ];
    let destinations = game.pending_destinations();
    if !destinations.is_empty() {
        let choices: Vec<String> = destinations
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}={p}", i + 1))
            .collect();
        lines.push(Line::from(Span::styled(
            format!("Teleport to: {}", choices.join("  ")),
            Style::default().fg(Color::Cyan),
        )));
    }

    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(widget, area);
}

/// Renders the maze onto the frame.
fn render_maze(frame: &mut Frame, area: Rect, game: &Game) {
    let maze = game.maze();
    let state = game.state();
    let destinations = game.pending_destinations();

    let mut lines: Vec<Line> = Vec::with_capacity(maze.rows());
    for row in 0..maze.rows() {
        let mut spans: Vec<Span> = Vec::with_capacity(maze.cols());
        for col in 0..maze.cols() {
            spans.push(cell_span(maze, state, &destinations, Position::new(row, col)));
        }
        lines.push(Line::from(spans));
    }

    let title = format!("Maze Pursuit ({}x{})", maze.rows(), maze.cols());
    let maze_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(maze_paragraph, area);
}

fn cell_span(maze: &Maze, state: &State, destinations: &[Position], position: Position) -> Span<'static> {
    if state.agent().position == position {
        return Span::styled("P", Style::default().fg(Color::Yellow).bold());
    }
    if state.adversaries().iter().any(|a| a.position == position) {
        return Span::styled("G", Style::default().fg(Color::Red).bold());
    }
    if let Some(index) = destinations.iter().position(|d| *d == position) {
        return Span::styled(
            (index + 1).to_string(),
            Style::default().fg(Color::Black).bg(Color::Cyan),
        );
    }
    if state.food().contains(&position) {
        return Span::styled(".", Style::default().fg(Color::White));
    }
    if state.bonus().contains(&position) {
        return Span::styled("0", Style::default().fg(Color::Magenta).bold());
    }
    match maze.cell(position).unwrap_or_default() {
        Cell::Open => Span::raw(" "),
        Cell::Wall => Span::styled("%", Style::default().fg(Color::Blue)),
        Cell::Exit => Span::styled("E", Style::default().fg(Color::Green).bold()),
        Cell::Teleport => Span::styled("T", Style::default().fg(Color::Cyan)),
    }
}
