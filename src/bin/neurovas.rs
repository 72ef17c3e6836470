//! NeuroVas CLI - Command-line interface for the NeuroVas feedback loop
//!
//! Commands:
//! - session: Run an interactive feedback session on stdin/stdout
//! - score: Score a single measurement
//! - replay: Run a scripted NDJSON event stream through the loop
//! - doctor: Diagnose model, column and config files

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use neurovas_loop::controller::{LoopController, LoopEvent, Transition};
use neurovas_loop::pipeline::{parse_events_ndjson, replay, run_feedback};
use neurovas_loop::types::{Assessment, ComparisonStatus, LogEntry, Phase, RawSignalInput};
use neurovas_loop::{
    ConfigError, EventParseError, FeatureSchema, LinearStageModel, LoopConfig, LoopError, Session,
    NEUROVAS_VERSION, PRODUCER_NAME,
};

/// NeuroVas - biofeedback monitoring loop
#[derive(Parser)]
#[command(name = "neurovas")]
#[command(author = "Synheart AI Inc")]
#[command(version = NEUROVAS_VERSION)]
#[command(about = "Score biosignals and run feedback loops until they improve", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive feedback session
    Session {
        #[command(flatten)]
        model: ModelArgs,

        /// Run the feedback countdown without waiting
        #[arg(long)]
        no_wait: bool,
    },

    /// Score a single measurement
    Score {
        #[command(flatten)]
        model: ModelArgs,

        /// Heart rate variability (ms)
        #[arg(long)]
        hrv: f64,

        /// EMG level (normal, overactive, underactive)
        #[arg(long)]
        emg_level: String,

        /// Posture (aligned, lean_left, lean_right, slouched)
        #[arg(long)]
        posture: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a scripted NDJSON event stream through the loop
    Replay {
        #[command(flatten)]
        model: ModelArgs,

        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output format
        #[arg(long, default_value = "table")]
        format: ReportFormat,

        /// Run feedback countdowns without waiting
        #[arg(long)]
        no_wait: bool,
    },

    /// Diagnose model, column and config files
    Doctor {
        /// Model definition to check
        #[arg(long)]
        model: Option<PathBuf>,

        /// Feature column CSV to check
        #[arg(long)]
        columns: Option<PathBuf>,

        /// Loop config to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Stage model definition (JSON)
    #[arg(long)]
    model: PathBuf,

    /// Feature column list (CSV header); defaults to the standard columns
    #[arg(long)]
    columns: Option<PathBuf>,

    /// Loop config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feedback window length in seconds (overrides the config file)
    #[arg(long)]
    feedback_seconds: Option<u32>,
}

#[derive(Clone, ValueEnum)]
enum ReportFormat {
    /// Plain text session log table
    Table,
    /// JSON session summary
    Json,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), NeurovasCliError> {
    match cli.command {
        Commands::Session { model, no_wait } => cmd_session(&model, no_wait),

        Commands::Score {
            model,
            hrv,
            emg_level,
            posture,
            json,
        } => cmd_score(&model, RawSignalInput::new(hrv, emg_level, posture), json),

        Commands::Replay {
            model,
            input,
            format,
            no_wait,
        } => cmd_replay(&model, &input, format, no_wait),

        Commands::Doctor {
            model,
            columns,
            config,
            json,
        } => cmd_doctor(model.as_deref(), columns.as_deref(), config.as_deref(), json),
    }
}

fn build_controller(args: &ModelArgs) -> Result<LoopController, NeurovasCliError> {
    let schema = match &args.columns {
        Some(path) => FeatureSchema::from_csv_file(path)?,
        None => FeatureSchema::standard(),
    };

    let model = LinearStageModel::from_file(&args.model)?;
    model.check_schema(&schema).map_err(ConfigError::from)?;

    let mut config = match &args.config {
        Some(path) => LoopConfig::from_file(path)?,
        None => LoopConfig::default(),
    };
    if let Some(seconds) = args.feedback_seconds {
        config.feedback_seconds = seconds;
        config.validate()?;
    }

    Ok(LoopController::with_config(Box::new(model), schema, config))
}

fn pace(controller: &LoopController, no_wait: bool) -> Duration {
    if no_wait {
        Duration::ZERO
    } else {
        Duration::from_millis(controller.config().tick_millis)
    }
}

fn cmd_session(args: &ModelArgs, no_wait: bool) -> Result<(), NeurovasCliError> {
    let controller = build_controller(args)?;
    let pace = pace(&controller, no_wait);
    let mut session = Session::new();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stdout = io::stdout();

    println!("NeuroVas Healing Feedback Loop");
    println!("Enter measurements as: <hrv> <emg_level> <posture>");
    println!("Commands: log, new, quit");

    loop {
        let prompt = match session.phase() {
            Phase::FeedbackActive => {
                println!("Begin healing now. Sit straight, breathe calm...");
                run_feedback(&controller, &mut session, pace, |remaining| {
                    print!("\rFeedback time: {remaining:>3} seconds remaining...");
                    let _ = stdout.flush();
                })?;
                println!("\rFeedback session complete.                    ");
                continue;
            }
            Phase::AwaitingInitialInput => {
                format!("[loop {}] initial signal> ", session.loop_number())
            }
            Phase::AwaitingUpdatedInput => {
                format!("[loop {}] updated signal after feedback> ", session.loop_number())
            }
            Phase::Improving | Phase::Terminated => "session finished (new/log/quit)> ".to_string(),
        };

        print!("{prompt}");
        stdout.flush()?;

        let Some(line) = lines.next().transpose()? else {
            println!();
            break;
        };

        let event = match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "log" => {
                print_log(&session);
                continue;
            }
            "new" => LoopEvent::StartNewSession,
            text => match parse_measurement(text) {
                Ok(raw) if session.phase() == Phase::AwaitingInitialInput => {
                    LoopEvent::SubmitInitial(raw)
                }
                Ok(raw) => LoopEvent::SubmitUpdated(raw),
                Err(msg) => {
                    println!("{msg}");
                    continue;
                }
            },
        };

        match controller.handle(&mut session, event) {
            Ok(transition) => print_transition(&transition),
            Err(LoopError::Signal(e)) => {
                println!("Signal quality: {e}");
                println!("Fix input to proceed.");
            }
            Err(e) if e.is_recoverable() => println!("{e}"),
            Err(e) => return Err(e.into()),
        }
    }

    print_log(&session);
    Ok(())
}

fn cmd_score(args: &ModelArgs, raw: RawSignalInput, json: bool) -> Result<(), NeurovasCliError> {
    let controller = build_controller(args)?;
    let (_, assessment) = controller.assess(&raw)?;
    let band = assessment.band();

    if json {
        let report = ScoreReport {
            stage: assessment.stage.value(),
            rpi: assessment.rpi.value(),
            band: band.label().to_string(),
            action: band.action().to_string(),
            healthy: assessment.is_healthy(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_assessment("Stage", &assessment);
        if assessment.is_healthy() {
            println!("Patient is healthy. No healing required.");
        }
    }

    Ok(())
}

fn cmd_replay(
    args: &ModelArgs,
    input: &Path,
    format: ReportFormat,
    no_wait: bool,
) -> Result<(), NeurovasCliError> {
    let controller = build_controller(args)?;

    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let events = parse_events_ndjson(&input_data)?;
    if events.is_empty() {
        return Err(NeurovasCliError::NoEvents);
    }

    let report = replay(&controller, events, pace(&controller, no_wait))?;

    match format {
        ReportFormat::Table => {
            for step in &report.steps {
                match &step.outcome {
                    Ok(transition) => {
                        println!("#{} {}: {}", step.index, step.event, describe(transition))
                    }
                    Err(e) => println!("#{} {}: rejected ({e})", step.index, step.event),
                }
            }
            println!();
            print!("{}", report.session.log().to_table());
            println!(
                "\nPhase: {} | Loop: {} | Rejected events: {}",
                report.session.phase(),
                report.session.loop_number(),
                report.rejected()
            );
        }
        ReportFormat::Json => {
            let summary = ReplaySummary {
                session_id: report.session.id().to_string(),
                phase: report.session.phase(),
                loop_number: report.session.loop_number(),
                rejected_events: report.rejected(),
                log: report.session.log().all().to_vec(),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn cmd_doctor(
    model: Option<&Path>,
    columns: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<(), NeurovasCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "neurovas_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("NeuroVas version {}", NEUROVAS_VERSION),
    });

    let schema = match columns {
        Some(path) => match FeatureSchema::from_csv_file(path) {
            Ok(schema) => {
                checks.push(DoctorCheck {
                    name: "columns".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("{} feature columns", schema.len()),
                });
                Some(schema)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "columns".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot load columns: {}", e),
                });
                None
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "columns".to_string(),
                status: CheckStatus::Warning,
                message: "No columns file given, standard columns in use".to_string(),
            });
            Some(FeatureSchema::standard())
        }
    };

    if let Some(path) = model {
        match LinearStageModel::from_file(path) {
            Ok(model) => {
                checks.push(DoctorCheck {
                    name: "model".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Model valid ({} weighted columns)", model.weights.len()),
                });

                if let Some(schema) = &schema {
                    let check = match model.check_schema(schema) {
                        Ok(()) => DoctorCheck {
                            name: "model_columns".to_string(),
                            status: CheckStatus::Ok,
                            message: "All model columns present in schema".to_string(),
                        },
                        Err(e) => DoctorCheck {
                            name: "model_columns".to_string(),
                            status: CheckStatus::Error,
                            message: e.to_string(),
                        },
                    };
                    checks.push(check);
                }
            }
            Err(e) => checks.push(DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot load model: {}", e),
            }),
        }
    } else {
        checks.push(DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Warning,
            message: "No model file given".to_string(),
        });
    }

    if let Some(path) = config {
        let check = match LoopConfig::from_file(path) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!("Feedback window {}s", config.feedback_seconds),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid config: {}", e),
            },
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive session ready)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: NEUROVAS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("NeuroVas Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(NeurovasCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn parse_measurement(text: &str) -> Result<RawSignalInput, String> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let [hrv, emg_level, posture] = parts.as_slice() else {
        return Err(format!(
            "Expected 3 values (<hrv> <emg_level> <posture>), got {}",
            parts.len()
        ));
    };

    let hrv: f64 = hrv
        .parse()
        .map_err(|_| format!("HRV must be a number, got {hrv:?}"))?;

    Ok(RawSignalInput::new(hrv, *emg_level, *posture))
}

fn print_assessment(label: &str, assessment: &Assessment) {
    println!(
        "{label} {} | RPI {}/100 | {}",
        assessment.stage,
        assessment.rpi,
        assessment.band()
    );
}

fn print_transition(transition: &Transition) {
    match transition {
        Transition::Healthy { assessment } => {
            print_assessment("Initial stage", assessment);
            println!("Patient is healthy. No healing required. Type 'new' to start a new session.");
        }
        Transition::FeedbackStarted { assessment, .. } => {
            print_assessment("Stage", assessment);
        }
        Transition::AwaitingUpdate => {}
        Transition::Compared { entry, .. } => {
            print_comparison(entry);
            match entry.status {
                ComparisonStatus::Improved => {
                    println!("Feedback effective! Signal improved.");
                    println!("Type 'new' to start a new session.");
                }
                ComparisonStatus::NoChange => {
                    println!("Signal remained the same. Repeating feedback...")
                }
                ComparisonStatus::Worsened => {
                    println!("Signals worsened. Repeating feedback loop.")
                }
            }
        }
        Transition::SessionReset => println!("New session started."),
    }
}

fn print_comparison(entry: &LogEntry) {
    let stage_delta = i16::from(entry.stage_after.value()) - i16::from(entry.stage_before.value());
    let rpi_delta = i16::from(entry.rpi_after.value()) - i16::from(entry.rpi_before.value());
    println!(
        "Stage {} -> {} ({stage_delta:+}) | RPI {} -> {} ({rpi_delta:+})",
        entry.stage_before, entry.stage_after, entry.rpi_before, entry.rpi_after
    );
}

fn print_log(session: &Session) {
    println!("\nSession Summary");
    if session.log().is_empty() {
        println!("No session logs yet.");
    } else {
        print!("{}", session.log().to_table());
    }
}

fn describe(transition: &Transition) -> String {
    match transition {
        Transition::Healthy { assessment } => format!(
            "healthy (stage {}, rpi {})",
            assessment.stage, assessment.rpi
        ),
        Transition::FeedbackStarted {
            loop_number,
            assessment,
        } => format!(
            "loop {loop_number} feedback started (stage {}, rpi {}, {})",
            assessment.stage,
            assessment.rpi,
            assessment.band().label()
        ),
        Transition::AwaitingUpdate => "feedback complete".to_string(),
        Transition::Compared {
            entry, next_phase, ..
        } => format!("loop {} {} -> {}", entry.loop_number, entry.status, next_phase),
        Transition::SessionReset => "session reset".to_string(),
    }
}

// Error types

#[derive(Debug)]
enum NeurovasCliError {
    Io(io::Error),
    Config(ConfigError),
    Loop(LoopError),
    Json(serde_json::Error),
    Events(EventParseError),
    NoEvents,
    DoctorFailed,
}

impl From<io::Error> for NeurovasCliError {
    fn from(e: io::Error) -> Self {
        NeurovasCliError::Io(e)
    }
}

impl From<ConfigError> for NeurovasCliError {
    fn from(e: ConfigError) -> Self {
        NeurovasCliError::Config(e)
    }
}

impl From<LoopError> for NeurovasCliError {
    fn from(e: LoopError) -> Self {
        NeurovasCliError::Loop(e)
    }
}

impl From<serde_json::Error> for NeurovasCliError {
    fn from(e: serde_json::Error) -> Self {
        NeurovasCliError::Json(e)
    }
}

impl From<EventParseError> for NeurovasCliError {
    fn from(e: EventParseError) -> Self {
        NeurovasCliError::Events(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<NeurovasCliError> for CliError {
    fn from(e: NeurovasCliError) -> Self {
        match e {
            NeurovasCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            NeurovasCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'neurovas doctor' with the same files".to_string()),
            },
            NeurovasCliError::Loop(LoopError::Signal(e)) => CliError {
                code: "SIGNAL_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("HRV must be 20-120; check EMG level and posture names".to_string()),
            },
            NeurovasCliError::Loop(e) => CliError {
                code: "LOOP_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check that the model matches the feature columns".to_string()),
            },
            NeurovasCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            NeurovasCliError::Events(e) => CliError {
                code: "EVENT_PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(
                    "Each line must be {\"event\": submit_initial|submit_updated|start_new_session, ...}"
                        .to_string(),
                ),
            },
            NeurovasCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            NeurovasCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ScoreReport {
    stage: u8,
    rpi: u8,
    band: String,
    action: String,
    healthy: bool,
}

#[derive(serde::Serialize)]
struct ReplaySummary {
    session_id: String,
    phase: Phase,
    loop_number: u32,
    rejected_events: usize,
    log: Vec<LogEntry>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
