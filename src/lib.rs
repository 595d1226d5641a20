//! MediAssist
//!
//! Emergency first-aid coaching: the incident session controller, step
//! timers, the CPR metronome and the service client they talk to. The binary
//! drives a session from the terminal.

pub mod api;
pub mod config;
pub mod console;
pub mod contacts;
pub mod dial;
pub mod launch;
pub mod learning;
pub mod metronome;
pub mod permissions;
pub mod session;
pub mod sound;
pub mod speech;
pub mod summary;
pub mod timer;

use anyhow::Context;
use api::{ApiClient, EmergencyApi, TokenStore};
use console::{
    ConfigPermissions, ConsoleDialer, ConsoleInput, ConsolePrompt, ConsoleRecognizer,
    ConsoleSynthesizer, HomeCommand, HOME_HELP,
};
use contacts::ContactBook;
use launch::EmergencyLauncher;
use permissions::PermissionGateway;
use session::{IncidentSession, SessionDeps, SessionHandle, SessionOutcome, SessionSettings};
use speech::Speaker;
use std::sync::Arc;
use summary::SummaryFormat;
use tokio::sync::mpsc;

const HELP: &str = "Commands: speak | type <text> | next | timer | metro | call | end | quit";

/// Set up stdout and file logging (local time for readability)
fn init_logging() {
    use tracing_subscriber::prelude::*;

    /// Format timestamps using the system's local time via chrono
    struct LocalTimer;
    impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
        fn format_time(
            &self,
            w: &mut tracing_subscriber::fmt::format::Writer<'_>,
        ) -> std::fmt::Result {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        }
    }

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    let log_dir = config::get_config_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("mediassist.log"))
        .ok();

    if let Some(file) = log_file {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_timer(LocalTimer)
            .with_ansi(false);
        let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);
        tracing_subscriber::registry()
            .with(filter())
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_timer(LocalTimer)
            .init();
    }
}

/// Entry point for the terminal front-end
pub fn run() -> anyhow::Result<()> {
    init_logging();
    tracing::info!("MediAssist starting");

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run_console())
}

async fn run_console() -> anyhow::Result<()> {
    let cfg = config::get_config().map_err(anyhow::Error::msg)?;

    let tokens = TokenStore::new();
    tokens.set(cfg.api.auth_token.clone());
    let api: Arc<dyn EmergencyApi> = Arc::new(
        ApiClient::from_config(&cfg.api, tokens).context("Failed to create service client")?,
    );

    let gateway = PermissionGateway::new(
        ConfigPermissions::new(&cfg.geolocation),
        cfg.geolocation.options(),
    );
    let launcher = EmergencyLauncher::new(gateway, api.clone());
    let contacts = ContactBook::new(api.clone());
    let (input, mut commands) = ConsoleInput::start();

    // Home screen: manage contacts, show stats, or trigger SOS
    println!("{}", HOME_HELP);
    loop {
        let report = launcher.check_permissions().await;
        if let Some(banner) = report.banner() {
            println!("⚠️  {}", banner.message);
            println!("Press Enter to retry ({}), or type 'quit'.", banner.retry_label);
        } else {
            println!("Press Enter to trigger SOS, or type 'help'.");
        }

        let Some(line) = commands.recv().await else {
            return Ok(());
        };
        match HomeCommand::parse(&line) {
            HomeCommand::Trigger if report.emergency_enabled() => {}
            HomeCommand::Trigger => continue,
            HomeCommand::Quit => return Ok(()),
            HomeCommand::Help => {
                println!("{}", HOME_HELP);
                continue;
            }
            HomeCommand::Stats => {
                println!("{}", console::stats_report(api.as_ref()).await);
                continue;
            }
            HomeCommand::Contacts(command) => {
                let location = cfg.geolocation.fixed_location;
                for line in console::run_contact_command(&contacts, command, location).await {
                    println!("{}", line);
                }
                continue;
            }
            HomeCommand::Unknown(line) => {
                println!("Unknown command {:?}. {}", line, HOME_HELP);
                continue;
            }
        }

        match launcher.trigger().await {
            Ok(launch) => {
                let deps = SessionDeps {
                    api: api.clone(),
                    recognizer: Arc::new(ConsoleRecognizer::new(input.clone())),
                    speaker: Speaker::new(Arc::new(ConsoleSynthesizer), cfg.speech.clone()),
                    dialer: Arc::new(ConsoleDialer),
                    prompt: Arc::new(ConsolePrompt::new(input.clone())),
                    tone: sound::tone_factory(&cfg.metronome),
                };
                let settings = SessionSettings::from_config(&cfg.session, &cfg.metronome);
                let (session, handle) = IncidentSession::new(launch, deps, settings);

                let outcome = drive_session(session, handle, &mut commands).await?;
                if let SessionOutcome::Resolved { incident_id } = outcome {
                    match api.incident_summary(incident_id, SummaryFormat::Json).await {
                        Ok(document) => println!("{}", document.to_display_text()),
                        Err(e) => {
                            tracing::error!("Failed to load incident summary: {}", e);
                            println!("Failed to load incident summary: {}", e);
                        }
                    }
                }
                return Ok(());
            }
            Err(e) => {
                tracing::error!("SOS failed: {}", e);
                println!("⚠️  {}", e);
            }
        }
    }
}

/// Run one session, forwarding console commands until it ends
async fn drive_session(
    session: IncidentSession,
    handle: SessionHandle,
    commands: &mut mpsc::UnboundedReceiver<String>,
) -> anyhow::Result<SessionOutcome> {
    let mut task = tokio::spawn(session.run());

    let mut snapshots = handle.subscribe();
    let renderer = tokio::spawn(async move {
        let mut previous = snapshots.borrow_and_update().clone();
        while snapshots.changed().await.is_ok() {
            let current = snapshots.borrow_and_update().clone();
            for line in console::describe_changes(&previous, &current) {
                println!("{}", line);
            }
            previous = current;
        }
    });

    println!("{}", HELP);
    let mut stdin_open = true;
    let outcome = loop {
        tokio::select! {
            outcome = &mut task => break outcome.context("Session task failed")?,
            line = commands.recv(), if stdin_open => {
                let Some(line) = line else {
                    stdin_open = false;
                    handle.teardown();
                    continue;
                };
                let accepted = match line.as_str() {
                    "" => continue,
                    "speak" => handle.speak_again(),
                    "next" => handle.next_step(),
                    "timer" => handle.start_timer(),
                    "metro" => handle.toggle_metronome(),
                    "call" => handle.call_dispatch(),
                    "end" => handle.end_session(),
                    "quit" => handle.teardown(),
                    "help" => {
                        println!("{}", HELP);
                        continue;
                    }
                    other => match other.strip_prefix("type ") {
                        Some(text) => handle.type_input(text),
                        None => {
                            println!("Unknown command. {}", HELP);
                            continue;
                        }
                    },
                };
                if !accepted {
                    tracing::debug!("Session no longer accepting commands");
                }
            }
        }
    };

    renderer.abort();
    tracing::info!("Session finished: {:?}", outcome);
    Ok(outcome)
}
