//! Terminal front end: reads prompts from stdin and sends them through a
//! running codechat proxy. Commands: `/export <file.html>`, `/quit`.

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use codechat::render::{message_to_text, transcript_html};
use codechat::{Conversation, ProxyClient};

const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:3000";
const WELCOME: &str = "Hi! Describe the code you need and I'll write it.";

#[derive(Parser, Debug)]
#[command(name = "chat", version, about = "Chat with a code model through a codechat proxy")]
struct Args {
    /// Base URL of the codechat proxy
    #[arg(env = "CODECHAT_PROXY_URL", default_value = DEFAULT_PROXY_URL)]
    proxy_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let client = ProxyClient::new(&args.proxy_url).context("failed to create proxy client")?;

    match client.health().await {
        Ok(health) => println!(
            "proxy {} ({}) · inference server {} is {}",
            client.base_url(),
            health.version,
            health.upstream.url,
            health.upstream.status
        ),
        Err(e) => eprintln!("warning: proxy at {} is not answering: {e}", client.base_url()),
    }

    let mut conversation = Conversation::new().with_welcome(WELCOME);
    println!("{WELCOME}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let trimmed = line.trim();

        if trimmed == "/quit" || trimmed == "/exit" {
            break;
        }
        if let Some(path) = trimmed.strip_prefix("/export") {
            let path = path.trim();
            if path.is_empty() {
                eprintln!("usage: /export <file.html>");
                continue;
            }
            tokio::fs::write(path, transcript_html(&conversation))
                .await
                .with_context(|| format!("failed to write {path}"))?;
            println!("transcript written to {path}");
            continue;
        }

        if !conversation.set_input(line) {
            eprintln!("a request is still in flight");
            continue;
        }
        if !conversation.can_submit() {
            continue;
        }

        println!("Processing…");
        if let Some(reply) = conversation.send(&client).await {
            println!("{}", message_to_text(reply));
        }
        if let Some(banner) = conversation.banner() {
            eprintln!("! {banner}");
            conversation.dismiss_banner();
        }
    }

    Ok(())
}
