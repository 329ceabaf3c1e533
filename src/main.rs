mod ui;

use crate::ui::ui;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use heatlog::{
    clock::{Clock, SystemClock},
    config::{Config, ConfigStore, FileConfigStore},
    directory::{MemoryDirectory, RosterProvider, SwimmerDirectory},
    runtime::{CrosstermEventSource, FixedTicker, HeatEvent, Runner},
    session::HeatSession,
    store::{export_csv, HeatDb, HeatSink},
    CaptureMode, FeedbackKey, HeatConfiguration, HeatSetup, HeatTimer, SaveError, StoredHeat,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::File,
    io::{self, stdin, Write},
    path::PathBuf,
    time::Duration,
};

const REDRAW_INTERVAL_MS: u64 = 250;

/// heat timing for swim coaches
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Time practice heats: capture finish times or shared laps, attach feedback per swimmer, and keep every saved heat for swimmers to review."
)]
pub struct Cli {
    /// database file to use instead of the default location
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file to use instead of the default location
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// time a heat interactively
    Time(TimeArgs),
    /// list saved heats
    History {
        /// only heats this swimmer took part in, narrowed to their entries
        #[clap(long)]
        email: Option<String>,
        /// also write the listed heats to a CSV file
        #[clap(long)]
        csv: Option<PathBuf>,
    },
    /// show one saved heat
    Show { id: i64 },
    /// delete a saved heat
    Delete { id: i64 },
    /// manage the swimmer directory
    #[clap(subcommand)]
    Swimmers(SwimmersCommand),
    /// manage saved heat setups
    #[clap(subcommand)]
    Presets(PresetsCommand),
    /// show or change settings
    #[clap(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
struct HeatArgs {
    /// swimmer in the heat (repeat for each swimmer, in lane order);
    /// defaults to every registered swimmer
    #[clap(short = 's', long = "swimmer")]
    swimmers: Vec<String>,

    /// distance label, one of the configured distances
    #[clap(short = 'd', long)]
    distance: Option<String>,

    /// stroke for a swimmer as NAME=STROKE
    #[clap(long = "stroke", value_parser = parse_stroke)]
    strokes: Vec<(String, String)>,
}

#[derive(Args, Debug)]
struct TimeArgs {
    #[clap(flatten)]
    heat: HeatArgs,

    /// load (and consume) a saved preset instead of --swimmer/--distance
    #[clap(long, conflicts_with_all = ["swimmers", "distance", "strokes"])]
    preset: Option<i64>,

    /// capture mode for this heat, overriding the config
    #[clap(short = 'm', long, value_enum)]
    mode: Option<ModeArg>,
}

#[derive(Subcommand, Debug)]
enum SwimmersCommand {
    /// add a swimmer or change their email
    Add { name: String, email: String },
    /// list known swimmers
    List,
}

#[derive(Subcommand, Debug)]
enum PresetsCommand {
    /// save a heat setup for later
    Save(HeatArgs),
    /// list saved presets, newest first
    List,
    /// print a preset and remove it
    Load { id: i64 },
    /// remove a preset without loading it
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// print the active configuration
    Show,
    /// change the default capture mode
    SetMode {
        #[clap(value_enum)]
        mode: ModeArg,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum, strum_macros::Display)]
pub enum ModeArg {
    Finish,
    Laps,
}

impl From<ModeArg> for CaptureMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Finish => CaptureMode::Finish,
            ModeArg::Laps => CaptureMode::Laps,
        }
    }
}

fn parse_stroke(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, stroke)) if !name.trim().is_empty() && !stroke.trim().is_empty() => {
            Ok((name.trim().to_string(), stroke.trim().to_string()))
        }
        _ => Err(format!("expected NAME=STROKE, got '{}'", s)),
    }
}

impl HeatArgs {
    fn to_setup<R: RosterProvider + ?Sized>(&self, config: &Config, roster: &R) -> Result<HeatSetup, Box<dyn Error>> {
        let mut setup = config.heat_setup();
        let swimmers = if self.swimmers.is_empty() {
            roster.roster()
        } else {
            self.swimmers.clone()
        };
        for swimmer in &swimmers {
            if !setup.selected().contains(swimmer) {
                setup.toggle_swimmer(swimmer);
            }
        }
        if let Some(distance) = &self.distance {
            setup.select_distance(distance)?;
        }
        for (swimmer, stroke) in &self.strokes {
            setup.select_stroke(swimmer, stroke)?;
        }
        Ok(setup)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config_store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let config = config_store.load();

    let db_path = cli.db.clone().or_else(|| config.db_path.clone());
    let open_db = || -> Result<HeatDb, Box<dyn Error>> {
        Ok(match &db_path {
            Some(path) => HeatDb::open(path)?,
            None => HeatDb::open_default()?,
        })
    };

    match cli.command {
        Command::Time(args) => {
            if !stdin().is_tty() {
                return Err("stdin must be a tty".into());
            }
            let mut db = open_db()?;
            let heat = match args.preset {
                Some(id) => {
                    let preset = db.take_preset(id)?.ok_or_else(|| format!("no preset {}", id))?;
                    let mut setup = config.heat_setup();
                    setup.load_preset(&preset)?;
                    setup.build()?
                }
                None => args.heat.to_setup(&config, &db)?.build()?,
            };
            let mode = args.mode.map(CaptureMode::from).unwrap_or(config.capture_mode);
            run_heat(heat, mode, &config, &mut db)?;
        }
        Command::History { email, csv } => {
            let db = open_db()?;
            let heats = match &email {
                Some(email) => db.heats_for_email(email)?,
                None => db.list_heats()?,
            };
            let mut out = io::stdout().lock();
            if heats.is_empty() {
                writeln!(out, "no heats found")?;
            }
            for heat in &heats {
                print_heat(&mut out, heat)?;
            }
            if let Some(path) = csv {
                export_csv(&heats, File::create(&path)?)?;
                writeln!(out, "exported {} heats to {}", heats.len(), path.display())?;
            }
        }
        Command::Show { id } => {
            let db = open_db()?;
            let heat = db.get_heat(id)?.ok_or_else(|| format!("no heat {}", id))?;
            print_heat(&mut io::stdout().lock(), &heat)?;
        }
        Command::Delete { id } => {
            if !open_db()?.delete_heat(id)? {
                return Err(format!("no heat {}", id).into());
            }
            println!("deleted heat {}", id);
        }
        Command::Swimmers(SwimmersCommand::Add { name, email }) => {
            open_db()?.register_swimmer(&name, &email)?;
            println!("{} <{}>", name, email);
        }
        Command::Swimmers(SwimmersCommand::List) => {
            for (name, email) in open_db()?.swimmers()? {
                println!("{:<20} {}", name, email);
            }
        }
        Command::Presets(PresetsCommand::Save(args)) => {
            let db = open_db()?;
            let preset = args.to_setup(&config, &db)?.to_preset()?;
            let id = db.save_preset(&preset)?;
            println!("saved preset {}", id);
        }
        Command::Presets(PresetsCommand::List) => {
            for (id, preset) in open_db()?.list_presets()? {
                println!("{:>4}  {:<8} {}", id, preset.distance, preset.swimmers.join(", "));
            }
        }
        Command::Presets(PresetsCommand::Load { id }) => {
            let preset = open_db()?.take_preset(id)?.ok_or_else(|| format!("no preset {}", id))?;
            println!("{}", serde_json::to_string_pretty(&preset)?);
        }
        Command::Presets(PresetsCommand::Delete { id }) => {
            if !open_db()?.delete_preset(id)? {
                return Err(format!("no preset {}", id).into());
            }
            println!("deleted preset {}", id);
        }
        Command::Config(ConfigCommand::Show) => {
            println!("# {}", config_store.path().display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Config(ConfigCommand::SetMode { mode }) => {
            let updated = Config {
                capture_mode: mode.into(),
                ..config
            };
            config_store.save(&updated)?;
            println!("capture mode set to {}", mode.to_string().to_lowercase());
        }
    }

    Ok(())
}

fn print_heat<W: Write>(out: &mut W, heat: &StoredHeat) -> io::Result<()> {
    let local = heat.result.date.with_timezone(&chrono::Local);
    writeln!(
        out,
        "#{}  {}  {}",
        heat.id,
        local.format("%Y-%m-%d %H:%M"),
        heat.result.distance
    )?;
    for entry in &heat.result.entries {
        writeln!(
            out,
            "    {:<16} {:<13} {}  {}",
            entry.name, entry.stroke, entry.time, entry.feedback
        )?;
    }
    Ok(())
}

fn run_heat(heat: HeatConfiguration, mode: CaptureMode, config: &Config, db: &mut HeatDb) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(REDRAW_INTERVAL_MS)),
    );
    let timer = HeatTimer::new(heat, mode, SystemClock::new());
    let mut session = HeatSession::new(
        timer,
        runner.sender(),
        Duration::from_millis(config.tick_interval_ms.max(1)),
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = heat_loop(&mut terminal, &runner, &mut session, db);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    match outcome? {
        Some(id) => {
            if let Some(heat) = db.get_heat(id)? {
                print_heat(&mut io::stdout().lock(), &heat)?;
            }
        }
        None => println!("heat discarded"),
    }
    Ok(())
}

fn heat_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    runner: &Runner<CrosstermEventSource, FixedTicker>,
    session: &mut HeatSession<SystemClock>,
    db: &mut HeatDb,
) -> Result<Option<i64>, Box<dyn Error>> {
    let mut screen = HeatScreen::default();

    loop {
        terminal.draw(|f| ui(&screen, session.timer(), f))?;

        match runner.step() {
            HeatEvent::Tick => {
                session.tick();
            }
            // the next draw picks up the new size
            HeatEvent::Resize => {}
            HeatEvent::Key(key) => {
                // the directory and the sink are the same database here
                let directory = db_directory(db);
                match screen.handle_key(key, session, &directory, db) {
                    Flow::Continue => {}
                    Flow::Saved(id) => return Ok(Some(id)),
                    Flow::Quit => return Ok(None),
                }
            }
        }
    }
}

/// Snapshot of the swimmer directory, so the database can be borrowed
/// mutably as the sink while names are resolved
fn db_directory(db: &HeatDb) -> MemoryDirectory {
    let mut directory = MemoryDirectory::new();
    match db.swimmers() {
        Ok(swimmers) => {
            for (name, email) in swimmers {
                directory.insert(&name, &email);
            }
        }
        Err(e) => log::warn!("could not load swimmer directory - {}", e),
    }
    directory
}

#[derive(Debug, Clone, PartialEq)]
enum Flow {
    Continue,
    Saved(i64),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Default)]
enum InputState {
    #[default]
    Normal,
    /// waiting for the number of the swimmer that gets feedback
    PickSwimmer,
    Typing { key: FeedbackKey, text: String },
}

#[derive(Debug, Default)]
struct HeatScreen {
    input: InputState,
    status: String,
    /// lap that number keys and feedback apply to in laps mode
    lap_cursor: usize,
}

impl HeatScreen {
    /// Lap under the cursor, clamped to the laps taken so far
    fn current_lap<C: Clock>(&self, timer: &HeatTimer<C>) -> Option<usize> {
        let last = timer.laps().len().checked_sub(1)?;
        Some(self.lap_cursor.min(last))
    }

    fn move_lap_cursor<C: Clock>(&mut self, timer: &HeatTimer<C>, up: bool) {
        let Some(current) = self.current_lap(timer) else {
            self.status = "no lap captured yet".to_string();
            return;
        };
        let last = timer.laps().len() - 1;
        self.lap_cursor = if up {
            current.saturating_sub(1)
        } else {
            (current + 1).min(last)
        };
        self.status = format!("lap {} selected", self.lap_cursor + 1);
    }

    fn handle_key<C, D, S>(
        &mut self,
        key: KeyEvent,
        session: &mut HeatSession<C>,
        directory: &D,
        sink: &mut S,
    ) -> Flow
    where
        C: Clock,
        D: SwimmerDirectory + ?Sized,
        S: HeatSink + ?Sized,
    {
        if key.kind == KeyEventKind::Release {
            return Flow::Continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Flow::Quit;
        }

        match std::mem::take(&mut self.input) {
            InputState::Typing { key: fb_key, mut text } => {
                match key.code {
                    KeyCode::Enter => {
                        self.report(session.set_feedback(fb_key, &text).map(|_| "feedback saved".to_string()));
                    }
                    KeyCode::Esc => self.status = "feedback cancelled".to_string(),
                    KeyCode::Backspace => {
                        text.pop();
                        self.input = InputState::Typing { key: fb_key, text };
                    }
                    KeyCode::Char(c) => {
                        text.push(c);
                        self.input = InputState::Typing { key: fb_key, text };
                    }
                    _ => self.input = InputState::Typing { key: fb_key, text },
                }
                Flow::Continue
            }
            InputState::PickSwimmer => {
                if let Some(fb_key) = swimmer_index(key.code).and_then(|i| self.feedback_key(session.timer(), i)) {
                    let text = session.timer().feedback(&fb_key).to_string();
                    self.input = InputState::Typing { key: fb_key, text };
                } else {
                    self.status = "feedback cancelled".to_string();
                }
                Flow::Continue
            }
            InputState::Normal => self.handle_normal_key(key, session, directory, sink),
        }
    }

    fn handle_normal_key<C, D, S>(
        &mut self,
        key: KeyEvent,
        session: &mut HeatSession<C>,
        directory: &D,
        sink: &mut S,
    ) -> Flow
    where
        C: Clock,
        D: SwimmerDirectory + ?Sized,
        S: HeatSink + ?Sized,
    {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return Flow::Quit,
            KeyCode::Char(' ') => {
                session.toggle();
                self.status.clear();
            }
            KeyCode::Char('r') => {
                session.reset();
                self.lap_cursor = 0;
                self.status = "heat reset".to_string();
            }
            KeyCode::Char('l') => match session.capture_lap() {
                Ok(Some(lap)) => {
                    self.lap_cursor = lap;
                    self.status = format!("lap {} captured", lap + 1);
                }
                Ok(None) => self.status = "start the clock to take laps".to_string(),
                Err(e) => self.status = e.to_string(),
            },
            KeyCode::Up | KeyCode::Char('[') => self.move_lap_cursor(session.timer(), true),
            KeyCode::Down | KeyCode::Char(']') => self.move_lap_cursor(session.timer(), false),
            KeyCode::Char('f') => {
                self.input = InputState::PickSwimmer;
                self.status = "feedback for swimmer number?".to_string();
            }
            KeyCode::Char('s') => match session.save(directory, sink) {
                Ok(id) => return Flow::Saved(id),
                Err(SaveError::Heat(e)) => self.status = e.to_string(),
                Err(e) => self.status = format!("{}, press s to retry", e),
            },
            code => {
                if let Some(index) = swimmer_index(code) {
                    self.capture_for(index, session);
                }
            }
        }
        Flow::Continue
    }

    fn capture_for<C: Clock>(&mut self, index: usize, session: &mut HeatSession<C>) {
        let Some(name) = session.timer().config().roster.get(index).cloned() else {
            return;
        };
        match session.timer().mode() {
            CaptureMode::Finish => match session.capture_finish(&name) {
                Ok(Some(split)) => self.status = format!("{} finished in {}", name, split),
                Ok(None) => self.status = format!("{} already has a time", name),
                Err(e) => self.status = e.to_string(),
            },
            CaptureMode::Laps => {
                let Some(lap) = self.current_lap(session.timer()) else {
                    self.status = "no lap captured yet".to_string();
                    return;
                };
                let mut swimmers = session.timer().laps()[lap].swimmers.clone();
                match swimmers.iter().position(|s| *s == name) {
                    Some(pos) => {
                        swimmers.remove(pos);
                    }
                    None => swimmers.push(name),
                }
                self.report(
                    session
                        .assign_swimmers_to_lap(lap, &swimmers)
                        .map(|_| format!("lap {}: {}", lap + 1, swimmers.join(", "))),
                );
            }
        }
    }

    /// Feedback target for the n-th swimmer: their finish, or their slot on the selected lap
    fn feedback_key<C: Clock>(&self, timer: &HeatTimer<C>, index: usize) -> Option<FeedbackKey> {
        let name = timer.config().roster.get(index)?;
        match timer.mode() {
            CaptureMode::Finish => Some(FeedbackKey::swimmer(name)),
            CaptureMode::Laps => Some(FeedbackKey::lap(self.current_lap(timer)?, name)),
        }
    }

    fn report(&mut self, outcome: Result<String, heatlog::HeatError>) {
        self.status = match outcome {
            Ok(msg) => msg,
            Err(e) => e.to_string(),
        };
    }
}

fn swimmer_index(code: KeyCode) -> Option<usize> {
    match code {
        KeyCode::Char(c @ '1'..='9') => c.to_digit(10).map(|d| d as usize - 1),
        _ => None,
    }
}
