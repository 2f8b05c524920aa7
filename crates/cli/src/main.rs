use clap::{Parser, Subcommand};
use qnabot::channels::{ChannelHandle, InboundEvent};
use qnabot::relay::Relay;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "qnabot")]
#[command(about = "QnA relay bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: QNABOT_CONFIG_PATH or ~/.qnabot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (HTTP activity endpoint and configured channels).
    Gateway {
        /// Config file path (default: QNABOT_CONFIG_PATH or ~/.qnabot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 3978)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Ask the knowledge base one question and print the reply.
    Ask {
        /// Config file path (default: QNABOT_CONFIG_PATH or ~/.qnabot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Question text.
        question: String,
    },

    /// Ask questions interactively; one turn per line.
    Chat {
        /// Config file path (default: QNABOT_CONFIG_PATH or ~/.qnabot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("qnabot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask { config, question }) => {
            if let Err(e) = run_ask(config, question).await {
                eprintln!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config }) => {
            if let Err(e) = run_chat(config).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Prints relay replies to stdout.
struct ConsoleChannel;

#[async_trait::async_trait]
impl ChannelHandle for ConsoleChannel {
    fn id(&self) -> &str {
        CONSOLE_CHANNEL_ID
    }

    fn stop(&self) {}

    async fn send_message(&self, _conversation_id: &str, text: &str) -> Result<(), String> {
        println!("< {}", text.trim());
        Ok(())
    }
}

const CONSOLE_CHANNEL_ID: &str = "console";

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(qnabot::config::default_config_path);
    let dir = qnabot::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = qnabot::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    qnabot::gateway::run_gateway(config, path).await
}

/// Relay over the configured QnA Maker knowledge base.
fn build_relay(config_path: Option<std::path::PathBuf>) -> anyhow::Result<Relay> {
    let (config, _) = qnabot::config::load_config(config_path)?;
    let client = qnabot::qna::QnaMakerClient::new(
        qnabot::config::resolve_qna_endpoint(&config),
        qnabot::config::resolve_qna_options(&config),
    )?;
    Ok(Relay::new(Arc::new(client))
        .with_fallback(qnabot::config::resolve_fallback_answer(&config)))
}

async fn run_ask(config_path: Option<std::path::PathBuf>, question: String) -> anyhow::Result<()> {
    let relay = build_relay(config_path)?;
    let event = InboundEvent::message(CONSOLE_CHANNEL_ID, "ask", question);
    relay.run_turn(&event, &ConsoleChannel).await?;
    Ok(())
}

async fn run_chat(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let relay = build_relay(config_path)?;
    let conversation_id = format!("chat-{}", std::process::id());
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

        let event = InboundEvent::message(CONSOLE_CHANNEL_ID, conversation_id.as_str(), input);
        if let Err(e) = relay.run_turn(&event, &ConsoleChannel).await {
            eprintln!("chat error: {}", e);
        }
    }

    Ok(())
}
