use clap::{Parser, Subcommand};
use signbot::config;
use signbot::{GestureDispatcher, GesturePlayer, RelayClient, ReplyDisplay};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "signbot")]
#[command(about = "Signbot CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory with a default config and the bundled gesture mapping.
    Init {
        /// Config file path (default: SIGNBOT_CONFIG_PATH or ~/.signbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Talk to the bot (interactive). Each line is signed locally, sent to the bot, and the replies are shown and signed.
    Chat {
        /// Config file path (default: SIGNBOT_CONFIG_PATH or ~/.signbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Play the gestures for a text without contacting the bot.
    Animate {
        /// Config file path (default: SIGNBOT_CONFIG_PATH or ~/.signbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Text to sign.
        #[arg(long, short)]
        text: String,
    },
}

/// Prints replies as `< text`.
struct TerminalDisplay;

impl ReplyDisplay for TerminalDisplay {
    fn show(&self, text: &str) {
        println!("< {}", text.trim());
    }
}

/// Prints each clip as `[gesture] name`.
struct TerminalGestures;

impl GesturePlayer for TerminalGestures {
    fn play(&self, clip: &str) {
        println!("[gesture] {}", clip);
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("signbot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config }) => {
            if let Err(e) = run_chat(config).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Animate { config, text }) => {
            if let Err(e) = run_animate(config, &text) {
                log::error!("animate failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = signbot::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn gesture_dispatcher(config: &config::Config, config_path: &std::path::Path) -> Arc<GestureDispatcher> {
    Arc::new(GestureDispatcher::new(
        config::resolve_mapping_path(config, config_path),
        Arc::new(TerminalDisplay),
        Arc::new(TerminalGestures),
    ))
}

fn run_animate(config_path: Option<PathBuf>, text: &str) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    let played = gesture_dispatcher(&config, &path).animate(text);
    if played == 0 {
        println!("no gestures for: {}", text);
    }
    Ok(())
}

async fn run_chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, path) = config::load_config(config_path)?;
    let direct_line = config::resolve_direct_line(&config);
    if direct_line.secret.is_none() {
        anyhow::bail!(
            "direct line secret not configured; set SIGNBOT_DIRECT_LINE_SECRET or directLine.secret in {}",
            path.display()
        );
    }
    let gestures = gesture_dispatcher(&config, &path);
    let relay = RelayClient::new(&direct_line, gestures.clone());

    match relay.start_conversation().await {
        Ok(id) => log::info!("conversation {} with {}", id, direct_line.endpoint),
        Err(e) => eprintln!("start conversation failed: {}", e),
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        gestures.animate(input);
        match relay.send_message(input).await {
            Ok(0) => println!("(no reply)"),
            Ok(_) => {}
            Err(e) => eprintln!("chat error: {}", e),
        }
    }

    Ok(())
}
