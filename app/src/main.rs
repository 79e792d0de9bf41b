use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use parley::{render_nodes, save_media, Style};
use parley_core::api::{ApiClient, FileAttachment};
use parley_core::auth::{LoginRequest, RegisterRequest};
use parley_core::config::ClientSettings;
use parley_core::format::FormatterEngine;
use parley_core::http::{AuthHttpClient, SessionEvent};
use parley_core::state::ChatSession;
use parley_core::store::SessionStore;
use parley_core::telemetry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Chat with the Parley backend from a terminal")]
struct Cli {
    /// Read settings from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        email: String,
        /// Prompted for on stdin when omitted.
        #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Register {
        #[arg(long)]
        name: String,
        email: String,
        #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Logout,
    Whoami,
    /// Send a single query and print the formatted answer.
    Ask {
        query: String,
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Write image or audio replies into this directory.
        #[arg(long)]
        save_media: Option<PathBuf>,
    },
    /// Line-based conversation. `/quit` leaves.
    Chat,
    /// Format a response offline from a file or stdin.
    Format {
        /// Response-kind hint, as reported in `llm_used`.
        #[arg(long)]
        kind: Option<String>,
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(telemetry::env_filter())?;
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => ClientSettings::load_from(path),
        None => ClientSettings::load(),
    }
    .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    let style = if cli.plain { Style::Plain } else { Style::detect() };
    let formatter = FormatterEngine::new(settings.media.clone());

    match cli.command {
        Command::Format { kind, path } => {
            let text = read_input(path.as_deref()).await?;
            let nodes = formatter.format(&text, kind.as_deref());
            println!("{}", render_nodes(&nodes, style));
        }
        Command::Login { email, password } => {
            let api = connect(&settings)?;
            let password = resolve_password(password).await?;
            let response = api
                .login(&LoginRequest::new(email, password))
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            println!("Logged in as {}", response.user.display_name);
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let api = connect(&settings)?;
            let password = resolve_password(password).await?;
            let response = api
                .register(&RegisterRequest::new(name, email, password))
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            println!("Welcome, {}", response.user.display_name);
        }
        Command::Logout => {
            connect(&settings)?.logout()?;
            println!("Logged out");
        }
        Command::Whoami => match connect(&settings)?.current_user() {
            Some(user) => println!("{} <{}>", user.display_name, user.email),
            None => println!("Not logged in"),
        },
        Command::Ask {
            query,
            files,
            save_media: media_dir,
        } => {
            let api = connect(&settings)?;
            require_login(&api)?;
            let mut attachments = Vec::with_capacity(files.len());
            for path in &files {
                let attachment = FileAttachment::from_path(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                attachments.push(attachment);
            }
            let response = api
                .send_query(&query, &attachments)
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            let nodes = formatter.format(&response.response, response.llm_used.as_deref());
            println!("{}", render_nodes(&nodes, style));
            if let Some(dir) = media_dir {
                for path in save_media(&nodes, &dir)? {
                    println!("saved {}", path.display());
                }
            }
        }
        Command::Chat => {
            let api = connect(&settings)?;
            require_login(&api)?;
            chat_loop(ChatSession::new(api, formatter), style).await?;
        }
    }

    Ok(())
}

/// Opens the stored session and starts listening for its lifecycle events.
fn connect(settings: &ClientSettings) -> anyhow::Result<ApiClient> {
    let store = SessionStore::new(settings.session_dir.clone());
    let (http, events) = AuthHttpClient::new(&settings.api, Arc::new(store))?;
    tokio::spawn(watch_session(events));
    Ok(ApiClient::new(http))
}

async fn watch_session(mut events: UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Invalidated { reason } => {
                eprintln!("Session expired ({reason}). Run `parley login` to sign in again.");
            }
            other => debug!(?other, "session event"),
        }
    }
}

fn require_login(api: &ApiClient) -> anyhow::Result<()> {
    if !api.is_authenticated() {
        bail!("Not logged in. Run `parley login <email>` first.");
    }
    Ok(())
}

async fn resolve_password(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Password: ").await?;
    stdout.flush().await?;
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            Ok(text)
        }
    }
}

async fn chat_loop(session: ChatSession, style: Style) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_error();
                continue;
            }
            _ => {}
        }
        let Some(reply) = session.send_message(&line, &[]).await else {
            continue;
        };
        let rendered = render_nodes(&session.render(&reply), style);
        stdout.write_all(rendered.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        if !session.api().is_authenticated() {
            break;
        }
    }
    Ok(())
}
