use std::io::IsTerminal;
use std::sync::{Arc, RwLock};

use clap::Parser;
use mpsh::colour::AnsiColour;
use mpsh::{FileStore, Shell, SystemHost};
use mpsh_client::{Device, Evaluator};
use mpsh_config::{LogFormat, MpshConfig};
use tokio::sync::{Mutex, Notify};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod completer;

/// mpsh - Interactive shell for MicroPython boards
#[derive(Parser, Debug)]
#[command(name = "mpsh", version, about)]
struct Args {
    /// Serial port, or tcp:HOST:PORT
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Seconds to wait for the board before giving up
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Path to configuration file
    #[arg(long, env = "MPSH_CONFIG")]
    config: Option<String>,

    /// Soft reset the board after connecting
    #[arg(long)]
    reset: bool,

    /// Do not run the rc file at startup
    #[arg(long)]
    no_rc: bool,

    /// Disable colour output
    #[arg(long)]
    no_colour: bool,

    /// Execute a line and exit
    #[arg(short = 'c')]
    command: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => mpsh_config::load_from_file(path).unwrap_or_else(|e| {
            eprintln!("mpsh: failed to load config from {path}: {e}");
            std::process::exit(1);
        }),
        None => mpsh_config::load().unwrap_or_else(|e| {
            eprintln!("mpsh: failed to load config: {e}, using defaults");
            MpshConfig::default()
        }),
    };
    if let Some(port) = args.port {
        config.device.port = port;
    }
    if let Some(baud) = args.baud {
        config.device.baud = baud;
    }
    if let Some(timeout) = args.timeout {
        config.device.timeout_secs = timeout;
    }
    if let Err(e) = config.validate() {
        eprintln!("mpsh: {e}");
        std::process::exit(1);
    }

    init_logging(&config);

    let port = config.device.port.clone();
    let mut device = match Device::connect(&port, config.device.baud, config.device.timeout()).await {
        Ok(device) => device,
        Err(e) => {
            eprintln!("mpsh: cannot connect to {port}: {e}");
            std::process::exit(1);
        }
    };
    if args.reset || config.device.soft_reset_on_connect {
        if let Err(e) = device.soft_reset().await {
            tracing::warn!(error = %e, "soft reset failed");
        }
    }

    // Ctrl-C while a command runs stops the board, not mpsh.
    let interrupts = Arc::new(Notify::new());
    let forward = interrupts.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            forward.notify_waiters();
        }
    });

    let colour = AnsiColour::from_env(!args.no_colour && std::io::stdout().is_terminal());
    let mut shell = Shell::builder(device)
        .host(SystemHost::new(config.shell.editor()))
        .store(FileStore::new(config.shell.options_path()))
        .colour(colour)
        .chunk_size(config.device.chunk_size)
        .interrupt_on(interrupts)
        .device_name(port.as_str())
        .build();

    let rc_path = (!args.no_rc).then(|| config.shell.rc_path());
    if let Err(e) = shell.startup(rc_path.as_deref()).await {
        eprintln!("mpsh: {e}");
        if e.is_fatal() {
            std::process::exit(1);
        }
    }

    if let Some(command) = args.command {
        match shell.execute(&command).await {
            Ok(report) => std::process::exit(i32::from(!report.all_succeeded())),
            Err(e) => {
                eprintln!("mpsh: {e}");
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = run_repl(shell, &config.shell, &port).await {
        eprintln!("mpsh: {e}");
        std::process::exit(1);
    }
}

fn init_logging(config: &MpshConfig) {
    let filter = if config.logging.filter.is_empty() {
        config.logging.level.as_str().to_string()
    } else {
        config.logging.filter.clone()
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    // Logs go to stderr so they never mix with board output.
    let registry = tracing_subscriber::registry().with(env_filter);
    match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run_repl(
    shell: Shell,
    shell_config: &mpsh_config::ShellConfig,
    port: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    use completer::MpshHelper;
    use rustyline::error::ReadlineError;
    use rustyline::history::DefaultHistory;
    use rustyline::{CompletionType, Config, Editor};

    let rl_config = Config::builder()
        .completion_type(CompletionType::List)
        .max_history_size(shell_config.history.max_entries)?
        .history_ignore_dups(true)?
        .history_ignore_space(true)
        .build();

    let shell = Arc::new(Mutex::new(shell));
    let aliases = Arc::new(RwLock::new(Vec::new()));
    let helper = MpshHelper::new(shell.clone(), aliases.clone());

    let mut rl: Editor<MpshHelper, DefaultHistory> = Editor::with_config(rl_config)?;
    rl.set_helper(Some(helper));

    let history_path = shell_config.history.path();
    if shell_config.history.enabled {
        let _ = rl.load_history(&history_path);
    }

    println!("mpsh {} connected to {port}", env!("CARGO_PKG_VERSION"));
    println!("Python goes to the board. Start a line with % for shell commands, %help for help.");
    println!();

    let mut result = Ok(());
    loop {
        let prompt = {
            let mut shell = shell.lock().await;
            if let Ok(mut names) = aliases.write() {
                *names = shell.alias_names();
            }
            shell.prompt().await
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.as_str());
                }
                let mut shell = shell.lock().await;
                if let Err(e) = shell.execute(&line).await {
                    // Only a lost connection gets here.
                    result = Err(e.into());
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    if shell_config.history.enabled {
        let _ = rl.save_history(&history_path);
    }
    result
}
