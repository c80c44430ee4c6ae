//! Activity Report Agent CLI

use activity_report_agent::{
    agent::{Agent, AgentTiming, Collaborators},
    collector::{key_channel, KeySource, NoopClipboard},
    config::Config,
    context::AgentContext,
    crypto::{decrypt_in_place, encrypt_in_place, EncryptionKey},
    dispatch::{DispatchGateway, OutboxGateway},
    report::{DispatchStatus, HostSnapshotProvider, NoScreenshots, ReportAssembler},
    shutdown::StopFlag,
    transparency::{create_shared_log_with_persistence, PersistedStats},
    MONITORING_NOTICE, VERSION,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "activity-agent")]
#[command(version = VERSION)]
#[command(about = "Background activity capture with scheduled report bundles", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start capture and scheduled reporting
    Start,

    /// Run one report cycle without starting capture
    Report,

    /// Decrypt an encrypted artifact in place
    Decrypt {
        file: PathBuf,

        /// Passphrase (defaults to encryption.password)
        #[arg(long)]
        password: Option<String>,

        /// Salt (defaults to encryption.salt)
        #[arg(long)]
        salt: Option<String>,
    },

    /// Encrypt an artifact in place with the configured key
    Encrypt { file: PathBuf },

    /// Show configuration and cumulative statistics
    Status,

    /// Print the effective configuration
    Config,

    /// Write a default configuration with a fresh random salt
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Display the monitoring notice
    Notice,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Start => cmd_start(config_path),
        Commands::Report => cmd_report(config_path),
        Commands::Decrypt {
            file,
            password,
            salt,
        } => cmd_decrypt(config_path, &file, password, salt),
        Commands::Encrypt { file } => cmd_encrypt(config_path, &file),
        Commands::Status => cmd_status(config_path),
        Commands::Config => cmd_config(config_path),
        Commands::Init { force } => cmd_init(config_path, force),
        Commands::Notice => {
            println!("{MONITORING_NOTICE}");
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("failed to load configuration")
}

fn stats_path(config: &Config) -> PathBuf {
    config.data_dir().join("stats.json")
}

fn gateway_for(config: &Config) -> Option<Box<dyn DispatchGateway>> {
    config.email.enabled.then(|| {
        Box::new(OutboxGateway::from_config(&config.email, &config.outbox_dir))
            as Box<dyn DispatchGateway>
    })
}

fn cmd_start(config_path: Option<&Path>) -> Result<()> {
    println!("Activity Report Agent v{VERSION}");
    println!("{MONITORING_NOTICE}");

    let config = load_config(config_path)?;
    let stats = create_shared_log_with_persistence(stats_path(&config));
    let ctx = Arc::new(
        AgentContext::for_capture(config, stats.clone()).context("failed to initialize agent")?,
    );

    let features = &ctx.config.features;
    println!("Starting capture...");
    println!("  Keylog: {:?}", ctx.keylog_path);
    println!("  Keystroke threshold: {}", ctx.config.schedule.keystroke_threshold);
    println!("  Clipboard monitoring: {}", enabled(features.clipboard_monitoring));
    println!("  Screenshots: {}", enabled(features.screenshots));
    println!("  System info: {}", enabled(features.system_info));
    println!("  Encryption: {}", enabled(ctx.key.is_some()));
    println!("  Dispatch: {}", enabled(ctx.config.email.enabled));
    println!("  Report interval: {} min", ctx.config.schedule.interval_minutes);
    println!();
    println!("Press {} or Ctrl+C to stop", ctx.chord);
    println!();

    let stop = StopFlag::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.request_stop())
        .context("failed to install Ctrl+C handler")?;

    let (sender, receiver) = key_channel();
    let mut key_source = KeySource::new(sender);
    if ctx.config.features.keylogging {
        key_source.start()?;
    }

    let collaborators = Collaborators {
        key_events: ctx.config.features.keylogging.then_some(receiver),
        clipboard: Box::new(NoopClipboard),
        screenshots: Box::new(NoScreenshots),
        system_info: Box::new(HostSnapshotProvider),
        gateway: gateway_for(&ctx.config),
    };

    let agent = Agent::start(
        ctx.clone(),
        collaborators,
        AgentTiming::from_context(&ctx),
        stop.clone(),
    )?;

    while !stop.is_stop_requested() {
        std::thread::sleep(Duration::from_millis(200));
    }

    println!();
    println!("Stopping capture...");
    key_source.stop();
    agent.join();

    if let Err(e) = stats.save() {
        tracing::warn!(component = "agent", error = %e, "could not save statistics");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_report(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let stats = create_shared_log_with_persistence(stats_path(&config));
    let ctx = Arc::new(
        AgentContext::for_reporting(config, stats.clone()).context("failed to initialize agent")?,
    );

    let gateway = gateway_for(&ctx.config);
    let assembler = ReportAssembler::new(
        ctx.clone(),
        Box::new(NoScreenshots),
        Box::new(HostSnapshotProvider),
        gateway,
    );

    let outcome = assembler.run_cycle();

    println!("Report cycle {}", outcome.cycle.id);
    if outcome.cycle.bundle_dir.is_dir() {
        println!("  Bundle: {:?}", outcome.cycle.bundle_dir);
    } else {
        println!("  Bundle: removed after dispatch");
    }
    for path in &outcome.attachments {
        let marker = if outcome.encrypted.contains(path) {
            " (encrypted)"
        } else {
            ""
        };
        println!("  - {}{marker}", path.display());
    }
    match &outcome.dispatch {
        DispatchStatus::Sent => println!("Dispatch: sent"),
        DispatchStatus::Disabled => println!("Dispatch: disabled"),
        DispatchStatus::Failed(e) => println!("Dispatch: failed ({e})"),
    }

    if let Err(e) = stats.save() {
        tracing::warn!(component = "agent", error = %e, "could not save statistics");
    }
    Ok(())
}

fn cmd_decrypt(
    config_path: Option<&Path>,
    file: &Path,
    password: Option<String>,
    salt: Option<String>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let password = password.unwrap_or(config.encryption.password);
    let salt = salt.unwrap_or(config.encryption.salt);

    if password.is_empty() {
        println!("Decryption failed: no passphrase configured or given");
        return Ok(());
    }

    let result =
        EncryptionKey::derive(&password, &salt).and_then(|key| decrypt_in_place(file, &key));
    match result {
        Ok(()) => println!("Decrypted {file:?}"),
        Err(e) => println!("Decryption failed: {e}"),
    }
    Ok(())
}

fn cmd_encrypt(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    if config.encryption.password.is_empty() {
        println!("Encryption failed: no passphrase configured");
        return Ok(());
    }

    let result = EncryptionKey::derive(&config.encryption.password, &config.encryption.salt)
        .and_then(|key| encrypt_in_place(file, &key));
    match result {
        Ok(()) => println!("Encrypted {file:?}"),
        Err(e) => println!("Encryption failed: {e}"),
    }
    Ok(())
}

fn cmd_status(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Activity Report Agent Status");
    println!("============================");
    println!();
    println!("Configuration:");
    println!("  Keylogging: {}", enabled(config.features.keylogging));
    println!(
        "  Clipboard monitoring: {}",
        enabled(config.features.clipboard_monitoring)
    );
    println!("  Screenshots: {}", enabled(config.features.screenshots));
    println!("  System info: {}", enabled(config.features.system_info));
    println!("  Encryption: {}", enabled(config.encryption.enabled));
    println!("  Dispatch: {}", enabled(config.email.enabled));
    println!(
        "  Report interval: {} min",
        config.schedule.interval_minutes
    );
    println!(
        "  Keystroke threshold: {}",
        config.schedule.keystroke_threshold
    );
    println!();

    let path = stats_path(&config);
    let persisted = std::fs::read_to_string(&path)
        .ok()
        .and_then(|content| serde_json::from_str::<PersistedStats>(&content).ok());

    match persisted {
        Some(stats) => {
            println!("Cumulative Statistics (as of {}):", stats.last_updated);
            println!("  Keystrokes captured: {}", stats.keystrokes_captured);
            println!(
                "  Keylog flushes: {} ({} failed)",
                stats.flushes, stats.flush_failures
            );
            println!("  Keystrokes dropped: {}", stats.keystrokes_dropped);
            println!("  Clipboard entries: {}", stats.clipboard_entries);
            println!(
                "  Report cycles: {} completed, {} dropped",
                stats.cycles_completed, stats.cycles_dropped
            );
            println!("  Dispatch failures: {}", stats.dispatch_failures);
        }
        None => println!("No previous session data found."),
    }
    Ok(())
}

fn cmd_config(config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if !config.encryption.password.is_empty() {
        config.encryption.password = "********".to_string();
    }
    if !config.email.password.is_empty() {
        config.email.password = "********".to_string();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!(
        "Config file: {:?}",
        config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::config_path)
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let target = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_path);

    if target.exists() && !force {
        println!("Configuration already exists at {target:?} (use --force to overwrite)");
        return Ok(());
    }

    let mut config = Config::default();
    config.encryption.salt = random_salt()?;
    let written = config.save(Some(&target))?;

    println!("Wrote default configuration to {written:?}");
    println!("Set encryption.password and email.recipient before enabling those features.");
    Ok(())
}

fn random_salt() -> Result<String> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes).map_err(|e| anyhow::anyhow!("salt generation failed: {e}"))?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}
