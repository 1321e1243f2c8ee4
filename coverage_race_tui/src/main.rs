use anyhow::{Context, Result, ensure};
use clap::Parser;
use coverage_race_core::{
    AgentRun, CancelToken, GRID_SIZE_RANGE, GridModel, Position, Race, RaceConfig, RaceReport,
    Status,
};
use rand::{SeedableRng, rngs::StdRng};
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

mod logging;

/// Panel colors, assigned to agents in order.
const AGENT_COLORS: [Color; 4] = [Color::Red, Color::Green, Color::Blue, Color::Magenta];

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Race configuration file (TOML); defaults apply if it does not exist
    #[arg(short, long, value_name = "CONFIG_FILE", default_value = "race.toml")]
    config: PathBuf,

    /// Map file to race on instead of a generated grid
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Side length of generated grids, 4 to 20
    #[arg(long)]
    size: Option<usize>,

    /// Move budget for every agent, 10 to 1000
    #[arg(long)]
    max_moves: Option<u32>,

    /// Obstacle chance for generated grids, 0.1 to 0.3
    #[arg(long)]
    obstacles: Option<f64>,

    /// Seed for grid generation
    #[arg(long)]
    seed: Option<u64>,

    /// Delay between turns in milliseconds
    #[arg(long)]
    pace_ms: Option<u64>,

    /// Run the race without the TUI and print the results; it is paced like
    /// the TUI, so pass `--pace-ms 0` for an instant report
    #[arg(long)]
    headless: bool,

    /// Write logs to this file (the TUI does not log otherwise)
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Loads the config file and applies command line overrides.
    fn race_config(&self) -> Result<RaceConfig> {
        let mut config = RaceConfig::load_from(&self.config)?;
        if let Some(size) = self.size {
            config.grid_size = size;
        }
        if let Some(max_moves) = self.max_moves {
            config.max_moves = max_moves;
        }
        if let Some(chance) = self.obstacles {
            config.obstacle_chance = chance;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(pace_ms) = self.pace_ms {
            config.pace_ms = pace_ms;
        }
        config.validate()?;
        Ok(config)
    }
}

/// What the user asked for when leaving a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Quit,
    NewRace,
}

struct App<'r> {
    race: &'r Race,
    /// One run per agent, ticked together.
    runs: Vec<AgentRun<'r>>,
    seed: u64,
    /// Set once every agent is terminal.
    report: Option<RaceReport>,
    exit: Option<Exit>,
}

impl<'r> App<'r> {
    fn new(race: &'r Race, seed: u64) -> Self {
        App {
            race,
            runs: race.start(),
            seed,
            report: None,
            exit: None,
        }
    }

    /// Advances every running agent by one turn.
    fn tick(&mut self) {
        if self.report.is_some() {
            return;
        }
        for run in &mut self.runs {
            run.step();
        }
        self.collect_report();
    }

    /// Cancels every agent that is still running.
    fn stop(&mut self) {
        for run in &mut self.runs {
            run.cancel();
        }
        self.collect_report();
    }

    fn collect_report(&mut self) {
        self.report = RaceReport::from_runs(&self.runs);
        if let Some(report) = &self.report {
            tracing::info!(outcome = %report.outcome, "race finished");
        }
    }

    fn quit(&mut self) {
        self.exit = Some(Exit::Quit);
    }

    fn new_race(&mut self) {
        self.exit = Some(Exit::NewRace);
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    if args.headless {
        logging::init_stderr();
    } else if let Some(path) = &args.log_file {
        logging::init_file(path)?;
    }

    let config = args.race_config()?;
    let map = args.map.as_deref().map(load_map).transpose()?;
    let seed = config.seed.unwrap_or_else(rand::random);

    if args.headless {
        return run_headless(&config, map.as_ref(), seed);
    }

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run races until the user quits
    let outcome = run_races(&mut terminal, &config, map.as_ref(), seed);

    // Restore the terminal state even if a race failed to start
    restore_terminal(&mut terminal)?;

    outcome
}

fn load_map(path: &Path) -> Result<GridModel> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read map file {}", path.display()))?;
    let grid: GridModel = text
        .parse()
        .with_context(|| format!("Invalid map file {}", path.display()))?;
    ensure!(
        GRID_SIZE_RANGE.contains(&grid.size()),
        "Map file {} is {}x{}; maps must be {} to {} cells per side",
        path.display(),
        grid.size(),
        grid.size(),
        GRID_SIZE_RANGE.start(),
        GRID_SIZE_RANGE.end()
    );
    Ok(grid)
}

/// Builds a race on the loaded map, or on a grid generated from `seed`.
fn build_race(config: &RaceConfig, map: Option<&GridModel>, seed: u64) -> Result<Race> {
    let grid = match map {
        Some(grid) => grid.clone(),
        None => {
            let mut rng = StdRng::seed_from_u64(seed);
            GridModel::generate(config.grid_size, config.obstacle_chance, &mut rng)?
        }
    };
    tracing::info!(seed, size = grid.size(), "grid ready");
    Ok(Race::from_config(grid, config)?)
}

/// Runs every agent concurrently and prints the results.
fn run_headless(config: &RaceConfig, map: Option<&GridModel>, seed: u64) -> Result<()> {
    let race = build_race(config, map, seed)?;
    println!("Seed: {seed}");
    println!("{}", race.grid());

    let report = race.run(&CancelToken::new(), config.pace())?;
    for entry in &report.entries {
        println!(
            "{:<16} {:<22} cells {:>3}/{:<3} moves {:>4}  complete: {}",
            entry.name,
            entry.status.to_string(),
            entry.result.cells_visited,
            entry.result.total_cleanable_cells,
            entry.result.moves,
            entry.result.is_cleaning_complete,
        );
    }
    println!();
    println!("{}", report.outcome);
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
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

fn run_races(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    config: &RaceConfig,
    map: Option<&GridModel>,
    mut seed: u64,
) -> Result<()> {
    let tick_rate = config.pace();
    loop {
        let race = build_race(config, map, seed)?;
        let mut app = App::new(&race, seed);
        match run_app(terminal, &mut app, tick_rate)? {
            Exit::Quit => return Ok(()),
            Exit::NewRace => seed = rand::random(),
        }
    }
}

/// Runs the main loop of one race until the user leaves it.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App<'_>,
    tick_rate: Duration,
) -> Result<Exit> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                        KeyCode::Char('s') => app.stop(),
                        KeyCode::Char('n') => app.new_race(),
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if let Some(exit) = app.exit {
            return Ok(exit);
        }
    }
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App<'_>) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Race header
            Constraint::Min(0),    // Agent panels
            Constraint::Length(2), // Help
        ])
        .split(frame.area());

    render_header(frame, main_layout[0], app);

    let count = app.runs.len().max(1) as u32;
    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(app.runs.iter().map(|_| Constraint::Ratio(1, count)))
        .split(main_layout[1]);
    for (index, (run, area)) in app.runs.iter().zip(panels.iter()).enumerate() {
        let color = AGENT_COLORS[index % AGENT_COLORS.len()];
        render_agent(frame, *area, run, color);
    }

    let help_text = Paragraph::new("'s' stop race   'n' new race   'q'/'Esc' quit")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App<'_>) {
    let grid = app.race.grid();
    let mut lines = vec![Line::from(format!(
        "Seed {}  |  {}x{} grid, {} open cells",
        app.seed,
        grid.size(),
        grid.size(),
        grid.cleanable_count()
    ))];
    if let Some(report) = &app.report {
        lines.push(Line::from(Span::styled(
            report.outcome.to_string(),
            Style::default().fg(Color::Green).bold(),
        )));
    }

    let header = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().title("Coverage Race").borders(Borders::ALL));
    frame.render_widget(header, area);
}

/// Renders one agent's grid, visit counts and progress.
fn render_agent(frame: &mut Frame, area: Rect, run: &AgentRun<'_>, color: Color) {
    let grid = run.grid();
    let mut lines: Vec<Line> = Vec::with_capacity(grid.size() + 5);

    lines.push(Line::from(Span::styled(
        run.strategy().description(),
        Style::default().fg(Color::Gray),
    )));
    let status_style = match run.status() {
        Status::Running => Style::default().fg(Color::Blue),
        Status::Completed => Style::default().fg(Color::Green),
        _ => Style::default().fg(Color::Yellow),
    };
    lines.push(Line::from(vec![
        Span::raw(format!(
            "Moves: {}/{}  Cells: {}/{}  ",
            run.move_count(),
            run.max_moves(),
            run.visits().cells_visited(),
            grid.cleanable_count()
        )),
        Span::styled(run.status().to_string(), status_style),
    ]));
    if !run.blocked_cells().is_empty() {
        let cells: Vec<String> = run.blocked_cells().iter().map(Position::to_string).collect();
        lines.push(Line::from(Span::styled(
            format!("Blocked at: {}", cells.join(", ")),
            Style::default().fg(Color::Red),
        )));
    }
    lines.push(Line::default());

    for row in 0..grid.size() {
        let spans: Vec<Span> = (0..grid.size())
            .map(|col| cell_span(run, Position::new(row, col), color))
            .collect();
        lines.push(Line::from(spans));
    }

    let panel = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .title(run.name())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color)),
    );
    frame.render_widget(panel, area);
}

/// One cell: `@` agent, `#` obstacle, `.` unvisited, otherwise its visit count.
fn cell_span(run: &AgentRun<'_>, pos: Position, color: Color) -> Span<'static> {
    if pos == run.position() {
        return Span::styled("@ ", Style::default().fg(color).bold());
    }
    if !run.grid().is_open(pos) {
        return Span::styled("# ", Style::default().fg(Color::DarkGray));
    }
    match run.visits().visit_count_at(pos) {
        0 => Span::raw(". "),
        count @ 1..=9 => Span::styled(format!("{count} "), Style::default().fg(color)),
        _ => Span::styled("+ ", Style::default().fg(color)),
    }
}
