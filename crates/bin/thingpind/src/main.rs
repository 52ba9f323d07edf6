//! # thingpind — thingpin daemon
//!
//! Composition root that wires the adapters together and runs the
//! orchestrator until SIGINT/SIGTERM.
//!
//! ## Responsibilities
//! - Parse the command line and load the configuration file
//! - Set up logging (stderr, or a size-rotated file with `--log`)
//! - Pick the line driver (`rpi` or `virtual`) and the publisher (`mqtt` or `log`)
//! - Run [`Thingpin`] and release everything on shutdown
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod log_file;

use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use thingpin_adapter_mqtt::MqttPublisher;
use thingpin_adapter_rpi::RpiDriver;
use thingpin_adapter_virtual::{LogPublisher, VirtualLines};
use thingpin_app::ports::{EdgeWait, LineDriver, Publisher};
use thingpin_app::thingpin::Thingpin;
use thingpin_domain::error::{HardwareError, PublishError};
use thingpin_domain::level::Level;
use thingpin_domain::line::{LineId, PinMode, Resistor};

use crate::config::{Config, DriverKind, NotifierConfig, SAMPLE};
use crate::log_file::RotatingFile;

/// Exit status when `create-config` would overwrite an existing file.
const EXIT_CONFIG_EXISTS: u8 = 2;

/// Publish GPIO input changes to an IoT service.
#[derive(Debug, Parser)]
#[command(name = "thingpind", version, about)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = "thingpin.toml")]
    config: PathBuf,

    /// Append logs to this file instead of writing them to stderr. It is
    /// rotated at 10 MiB, keeping 10 old files.
    #[arg(short, long)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch the configured things and publish their state.
    Run,
    /// Write a commented sample configuration to the config path.
    CreateConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::CreateConfig => create_config(&cli.config),
        Command::Run => start(&cli).await,
    };
    result.unwrap_or_else(|err| {
        eprintln!("error: {}", chain(err.as_ref()));
        ExitCode::FAILURE
    })
}

async fn start(cli: &Cli) -> Result<ExitCode, Box<dyn Error>> {
    let config = Config::load(&cli.config)?;
    init_tracing(&config.log_filter(), cli.log.as_deref())?;
    run(config).await?;
    Ok(ExitCode::SUCCESS)
}

/// Render an error followed by its sources.
fn chain(err: &dyn Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

fn create_config(path: &Path) -> Result<ExitCode, Box<dyn Error>> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            eprintln!("{} already exists, not overwriting it", path.display());
            return Ok(ExitCode::from(EXIT_CONFIG_EXISTS));
        }
        Err(err) => return Err(err.into()),
    };
    file.write_all(SAMPLE.as_bytes())?;
    eprintln!("sample configuration written to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(filter: &str, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_new(filter)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match log_file {
        Some(path) => {
            let file = RotatingFile::open(path, log_file::MAX_BYTES, log_file::BACKUPS)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|err| -> Box<dyn Error> { err })
}

async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let settings = config.settings()?;
    let things = config.things()?;

    let publisher = match config.notifier {
        NotifierConfig::Mqtt(mqtt) => AnyPublisher::Mqtt(MqttPublisher::new(mqtt)),
        NotifierConfig::Log => AnyPublisher::Log(LogPublisher::new()),
    };
    let driver = Arc::new(match config.hardware.driver {
        DriverKind::Rpi => AnyDriver::Rpi(RpiDriver::new()),
        DriverKind::Virtual => AnyDriver::Virtual(VirtualLines::new()),
    });
    tracing::info!(
        things = things.len(),
        driver = ?config.hardware.driver,
        publisher = publisher.kind(),
        "starting thingpin"
    );

    let span = tracing::info_span!("thingpind", pid = std::process::id());
    let mut thingpin = Thingpin::new(publisher, driver, settings, things).with_span(span);
    let result = thingpin.run(shutdown_signal()).await;
    if let Err(err) = &result {
        tracing::error!(error = %err, "thingpin stopped");
    } else {
        tracing::info!("thingpin stopped");
    }
    result.map_err(Into::into)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("interrupted"),
        () = terminate => tracing::info!("terminated"),
    }
}

/// Publisher selected by configuration.
enum AnyPublisher {
    Mqtt(MqttPublisher),
    Log(LogPublisher),
}

impl AnyPublisher {
    fn kind(&self) -> &'static str {
        match self {
            Self::Mqtt(_) => "mqtt",
            Self::Log(_) => "log",
        }
    }
}

impl Publisher for AnyPublisher {
    async fn connect(&self) -> Result<(), PublishError> {
        match self {
            Self::Mqtt(p) => p.connect().await,
            Self::Log(p) => p.connect().await,
        }
    }

    async fn notify(&self, name: &str, payload: &serde_json::Value) -> Result<(), PublishError> {
        match self {
            Self::Mqtt(p) => p.notify(name, payload).await,
            Self::Log(p) => p.notify(name, payload).await,
        }
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        match self {
            Self::Mqtt(p) => p.disconnect().await,
            Self::Log(p) => p.disconnect().await,
        }
    }
}

/// Line driver selected by configuration.
enum AnyDriver {
    Rpi(RpiDriver),
    Virtual(VirtualLines),
}

impl LineDriver for AnyDriver {
    async fn set_numbering(&self, mode: PinMode) -> Result<(), HardwareError> {
        match self {
            Self::Rpi(d) => d.set_numbering(mode).await,
            Self::Virtual(d) => d.set_numbering(mode).await,
        }
    }

    async fn configure(&self, line: LineId, resistor: Resistor) -> Result<(), HardwareError> {
        match self {
            Self::Rpi(d) => d.configure(line, resistor).await,
            Self::Virtual(d) => d.configure(line, resistor).await,
        }
    }

    async fn sample(&self, line: LineId) -> Result<Level, HardwareError> {
        match self {
            Self::Rpi(d) => d.sample(line).await,
            Self::Virtual(d) => d.sample(line).await,
        }
    }

    async fn wait_for_edge(
        &self,
        line: LineId,
        timeout: Option<Duration>,
    ) -> Result<EdgeWait, HardwareError> {
        match self {
            Self::Rpi(d) => d.wait_for_edge(line, timeout).await,
            Self::Virtual(d) => d.wait_for_edge(line, timeout).await,
        }
    }

    async fn release_all(&self) {
        match self {
            Self::Rpi(d) => d.release_all().await,
            Self::Virtual(d) => d.release_all().await,
        }
    }
}
