use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use banter::config::Config;
use banter::generation::{strip_prompt_echo, GenerationClient};
use banter::speech::SpeechSynthesizer;
use banter::transcript::STARTUP_GREETING;

#[derive(Parser)]
#[command(name = "banter")]
#[command(about = "Offline voice & text chat assistant with local models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat window
    #[cfg(feature = "gui")]
    Gui,
    /// Chat from the terminal (no window, replies are still spoken)
    Chat,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .or_else(|| dirs::config_dir().map(|d| d.join("banter/config.toml")))
        .ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

    match cli.command {
        #[cfg(feature = "gui")]
        Some(Commands::Gui) | None => {
            let rt = tokio::runtime::Runtime::new()?;
            let config = rt.block_on(Config::load(&config_path))?;
            drop(rt);
            info!("Starting banter window");
            banter::gui::run_gui(config)?;
        }
        #[cfg(not(feature = "gui"))]
        None => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let config = Config::load(&config_path).await?;
                run_chat_session(config).await
            })?;
        }
        Some(Commands::Chat) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let config = Config::load(&config_path).await?;
                info!("Starting console chat session");
                run_chat_session(config).await
            })?;
        }
    }

    Ok(())
}

/// Minimal console front-end over the same collaborators the window uses.
async fn run_chat_session(config: Config) -> Result<()> {
    let generator = GenerationClient::new(&config.generation)?;
    let synthesizer = SpeechSynthesizer::new(&config.speech, config.audio.temp_dir.clone());

    println!("Bot: {}", STARTUP_GREETING);
    println!("(empty line or Ctrl-D to quit)");

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        let read = std::io::stdin().read_line(&mut line)?;
        let message = line.trim();
        if read == 0 || message.is_empty() {
            break;
        }

        let reply = match generator.generate(message).await {
            Ok(raw) => strip_prompt_echo(message, &raw),
            Err(e) => format!("Error: {}", e),
        };
        println!("Bot: {}", reply);

        if let Err(e) = synthesizer.speak(&reply).await {
            warn!("Speech playback failed: {}", e);
        }
    }

    Ok(())
}
