use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use voxrelay::cli::{Cli, Commands, ConfigAction};
use voxrelay::config::Config;
use voxrelay::daemon::run_daemon;
use voxrelay::ipc::client::send_command;
use voxrelay::ipc::protocol::{Command, Response, StatsReport, TranslationResult};
use voxrelay::ipc::server::IpcServer;
use voxrelay::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Daemon { socket } => {
            let config = load_config(cli.config.as_deref())?;
            init_tracing(cli.verbose.max(1), config.log.json);
            run_daemon(config, socket).await?;
        }
        Commands::Submit {
            file,
            source,
            target,
            wait,
            output,
            socket,
        } => {
            init_tracing(cli.verbose, false);
            let audio = read_audio(&file)?;
            let command = Command::submit(&audio, source, target, wait);
            handle_ipc_command(socket, command, output.as_deref(), cli.quiet).await?;
        }
        Commands::Status { id, output, socket } => {
            init_tracing(cli.verbose, false);
            handle_ipc_command(socket, Command::Status { id }, output.as_deref(), cli.quiet)
                .await?;
        }
        Commands::Stats { socket } => {
            init_tracing(cli.verbose, false);
            handle_ipc_command(socket, Command::Stats, None, cli.quiet).await?;
        }
        Commands::Shutdown { socket } => {
            init_tracing(cli.verbose, false);
            handle_ipc_command(socket, Command::Shutdown, None, cli.quiet).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref())?;
                print!("{}", config.to_toml()?);
            }
            ConfigAction::Path => {
                println!("{}", config_path.display());
            }
        },
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "voxrelay", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Load configuration: an explicit path must exist, the default path may not.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    }
    .with_env_overrides();

    config.validate()?;
    Ok(config)
}

/// Read audio from a file, or stdin for "-".
fn read_audio(file: &Path) -> Result<Vec<u8>> {
    let mut audio = Vec::new();
    if file == Path::new("-") {
        std::io::stdin()
            .read_to_end(&mut audio)
            .context("Failed to read audio from stdin")?;
    } else {
        audio = std::fs::read(file)
            .with_context(|| format!("Failed to read audio file {}", file.display()))?;
    }
    Ok(audio)
}

/// Send IPC command to daemon and handle response.
async fn handle_ipc_command(
    socket: Option<PathBuf>,
    command: Command,
    output: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    let response = match send_command(&socket_path, command).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!(
                "{}",
                format!("Failed to communicate with daemon: {}", e).red()
            );
            eprintln!("Is the daemon running? Start it with: voxrelay daemon");
            std::process::exit(1);
        }
    };

    match response {
        Response::Accepted {
            id,
            queue_position,
            eta_ms,
        } => {
            if quiet {
                println!("{}", id);
            } else {
                println!("{} {}", "Accepted:".green(), id);
                println!("  {} {}", "Position:".dimmed(), queue_position);
                println!("  {}      ~{}", "ETA:".dimmed(), format_ms(eta_ms));
            }
        }
        Response::Completed { result } => {
            print_result(&result, quiet);
            if let Some(path) = output {
                let audio = result
                    .audio_bytes()
                    .context("Daemon sent audio that is not valid base64")?;
                std::fs::write(path, &audio)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !quiet {
                    println!("  {}    {}", "Saved:".dimmed(), path.display());
                }
            }
        }
        Response::Processing { id, stage, eta_ms } => {
            println!("{} {} ({})", "Processing:".yellow(), id, stage);
            println!("  {}  ~{}", "ETA:".dimmed(), format_ms(eta_ms));
        }
        Response::Failed { id, reason } => {
            eprintln!("{}", format!("Request {} failed: {}", id, reason).red());
            std::process::exit(1);
        }
        Response::Unknown { id, .. } => {
            eprintln!(
                "{}",
                format!("Unknown request {} (never submitted, already collected, or expired)", id)
                    .yellow()
            );
            std::process::exit(1);
        }
        Response::Rejected { message, retryable } => {
            eprintln!("{}", format!("Rejected: {}", message).red());
            // EX_TEMPFAIL tells scripts a retry may succeed.
            std::process::exit(if retryable { 75 } else { 1 });
        }
        Response::Stats { stats } => print_stats(&stats),
        Response::Ok => {
            if !quiet {
                println!("{}", "OK".green());
            }
        }
        Response::Error { message } => {
            eprintln!("{}", format!("Error: {}", message).red());
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_result(result: &TranslationResult, quiet: bool) {
    if quiet {
        println!("{}", result.translated_text);
        return;
    }
    println!("{} {}", "Completed:".green(), result.id);
    println!(
        "  {}   [{}] {}",
        "Heard:".dimmed(),
        result.detected_language,
        result.original_text
    );
    println!("  {}    {}", "Said:".dimmed(), result.translated_text);
    if let Some(reason) = &result.conversion_error {
        println!(
            "  {}   {}",
            "Voice:".dimmed(),
            format!("conversion skipped ({})", reason).yellow()
        );
    }
    println!(
        "  {} {} preprocessing, {} total",
        "Latency:".dimmed(),
        format_ms(result.preprocessing_ms),
        format_ms(result.total_ms)
    );
}

fn print_stats(stats: &StatsReport) {
    println!("Pipeline:");
    println!(
        "  {}       {}",
        "Running:".dimmed(),
        if stats.running { "yes" } else { "no" }
    );
    println!(
        "  {}     {}/{} queued, {}/{} preprocessing",
        "Admission:".dimmed(),
        stats.admission_depth,
        stats.admission_capacity,
        stats.preprocessing_in_flight,
        stats.preprocess_concurrency
    );
    println!(
        "  {}    {}/{} queued, {}/{} converting",
        "Bottleneck:".dimmed(),
        stats.bottleneck_depth,
        stats.bottleneck_capacity,
        stats.conversions_in_flight,
        stats.bottleneck_concurrency
    );
    println!(
        "  {}      {} live, {} awaiting collection",
        "Requests:".dimmed(),
        stats.live_requests,
        stats.unclaimed_results
    );
    println!(
        "  {}     {} completed, {} average",
        "Completed:".dimmed(),
        stats.completed,
        format_ms(stats.average_latency_ms)
    );
}

fn format_ms(ms: u64) -> String {
    voxrelay::pipeline::format_duration(std::time::Duration::from_millis(ms))
}
