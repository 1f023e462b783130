mod app;
mod settings;
mod speedtest;
mod ui;

use anyhow::{bail, Context, Result};
use app::{poll_event, App, AppAction};
use clap::Parser;
use crossterm::event::Event;
use ratatui::DefaultTerminal;
use settings::Settings;
use speedtest::{resolver::NominalSize, runner::TestRunner, Metric, RunStatus, TestUpdate};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use ui::{draw_ui, format_ping, format_speed};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Measure download, upload and latency against a public speed test endpoint.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Transfer size in MB: 1, 5, 10, 50, 100, 500 or 1000.
    #[arg(short, long)]
    size: Option<NominalSize>,

    /// Run a single test without the terminal UI and print the results.
    #[arg(long)]
    headless: bool,

    /// TOML file overriding endpoints and timing.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs here while the terminal UI is running.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let size = cli.size.unwrap_or(settings.default_size);
    let (runner, updates) = TestRunner::new(settings).context("failed to build HTTP client")?;

    if cli.headless {
        return run_headless(runner, updates, size).await;
    }

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, runner, updates, size).await;

    ratatui::restore();
    result
}

/// Logs go to stderr in headless mode. With the terminal UI they go to
/// `--log-file` or nowhere, since anything printed would tear the screen.
fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if cli.headless {
        builder.with_writer(std::io::stderr).init();
    } else if let Some(path) = &cli.log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    }
    Ok(())
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    runner: TestRunner,
    mut updates: mpsc::UnboundedReceiver<TestUpdate>,
    size: NominalSize,
) -> Result<()> {
    let mut app = App::new(size);

    loop {
        terminal.draw(|frame| draw_ui(frame, &app))?;

        // Handle test updates
        while let Ok(update) = updates.try_recv() {
            app.handle_update(update);
        }

        // Handle input
        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            if let Some(action) = app.handle_key_event(key) {
                match action {
                    AppAction::Quit => {
                        runner.cancel();
                        break;
                    }
                    AppAction::StartTest => {
                        if runner.start(app.size) {
                            app.reset_for_new_test();
                        }
                    }
                    AppAction::CancelTest => {
                        if runner.cancel() {
                            app.mark_cancel_requested();
                        }
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

async fn run_headless(
    runner: TestRunner,
    mut updates: mpsc::UnboundedReceiver<TestUpdate>,
    size: NominalSize,
) -> Result<()> {
    println!("KSAtest · {size}");
    runner.start(size);

    let mut failure = None;
    let mut interrupts = Interrupts::default();
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                match update {
                    TestUpdate::Status(status) => {
                        println!();
                        match status {
                            RunStatus::MeasuringDownload => print!("Download  "),
                            RunStatus::MeasuringUpload => print!("Upload    "),
                            RunStatus::MeasuringLatency => print!("Ping      "),
                            RunStatus::Finished | RunStatus::Idle | RunStatus::Failed => break,
                        }
                    }
                    TestUpdate::Sample(metric, value) => {
                        let text = match metric {
                            Metric::Download | Metric::Upload => format_speed(value),
                            Metric::Ping => format_ping(value),
                        };
                        print!("\r{:<10}{:<16}", metric_label(metric), text);
                    }
                    TestUpdate::Jitter(ms) => print!("jitter {ms:.1} ms"),
                    TestUpdate::Failed(err) => failure = Some(err),
                }
                std::io::stdout().flush()?;
            }
            _ = tokio::signal::ctrl_c() => match interrupts.press() {
                InterruptAction::Cancel => {
                    runner.cancel();
                    println!("\nCancelling, press Ctrl-C again to exit");
                }
                InterruptAction::Exit => bail!("interrupted"),
            },
        }
    }

    if let Some(err) = failure {
        bail!("{err}");
    }
    if runner.status() == RunStatus::Idle {
        println!("Test cancelled");
        return Ok(());
    }

    let result = runner.snapshot();
    println!(
        "\nDownload {} · Upload {} · Ping {} (jitter {:.1} ms)",
        format_speed(result.download_mbps),
        format_speed(result.upload_mbps),
        format_ping(result.ping_ms),
        result.jitter_ms
    );
    Ok(())
}

/// First Ctrl-C cancels the run gracefully, any further one exits at once.
#[derive(Debug, Default)]
struct Interrupts {
    pressed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    Cancel,
    Exit,
}

impl Interrupts {
    fn press(&mut self) -> InterruptAction {
        self.pressed += 1;
        if self.pressed == 1 {
            InterruptAction::Cancel
        } else {
            InterruptAction::Exit
        }
    }
}

fn metric_label(metric: Metric) -> &'static str {
    match metric {
        Metric::Download => "Download",
        Metric::Upload => "Upload",
        Metric::Ping => "Ping",
    }
}
