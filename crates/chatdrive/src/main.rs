use anyhow::{Context, bail};
use chatdrive_engine::Session;
use chatdrive_engine::config::ConfigLoader;
use chatdrive_engine::recovery::{OperationOutcome, OutcomeStatus};
use chatdrive_engine::session::ConversationRef;
use chatdrive_engine::timeouts::{OperationClass, format_duration};
use chatdrive_h::{CdpView, ConnectMode};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatdrive", version, about = "Drive a chat web UI from the command line")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to ./chatdrive.yaml, then ~/.chatdrive/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// DevTools endpoint of an already running, logged-in browser
    #[arg(long, global = true, default_value = "http://127.0.0.1:9222")]
    connect: String,

    /// Launch a private Chromium instead of attaching
    #[arg(long, global = true)]
    launch: bool,

    /// Launch the browser in visible mode (with --launch)
    #[arg(long, global = true)]
    visible: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Send a prompt and print the answer once generation completes
    Ask {
        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,
        /// Switch to this model first. The wait ceiling follows the model in use.
        #[arg(long)]
        model: Option<String>,
        /// Mode name such as "thinking" or "deep-research"
        #[arg(long)]
        mode: Option<String>,
        /// Override the ceiling, in seconds
        #[arg(long)]
        ceiling_secs: Option<u64>,
        /// Files to attach before sending
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
        /// Start a new conversation first
        #[arg(long)]
        new_chat: bool,
    },
    /// Rewrite an earlier prompt and print the new answer
    Edit {
        /// Zero-based position among your messages
        index: usize,
        /// New prompt text; read from stdin when omitted
        content: Option<String>,
        /// Override the ceiling, in seconds
        #[arg(long)]
        ceiling_secs: Option<u64>,
    },
    /// Print the current model, or switch to the given one
    Model { name: Option<String> },
    /// List conversations in the history sidebar
    Conversations,
    /// Open a conversation by list position or id
    Switch { target: String },
    /// Start a new conversation
    NewChat,
    /// Print the last assistant message
    Last,
    /// Print every turn of the current conversation
    Conversation,
    /// Report session state and how each target currently resolves
    Probe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only answers.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };

    let mode = if args.launch {
        ConnectMode::Launch {
            visible: args.visible,
        }
    } else {
        ConnectMode::Connect {
            endpoint: args.connect.clone(),
        }
    };

    let view = CdpView::open(mode, &config.home_url)
        .await
        .context("failed to open browser")?;
    let session = Session::new(Box::new(view), config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping...");
            on_interrupt.cancel();
        }
    });

    let result = run(&session, args.command, args.json, &cancel).await;

    if let Err(e) = session.close().await {
        tracing::warn!("Error closing browser: {}", e);
    }
    result
}

async fn run(
    session: &Session,
    command: Command,
    as_json: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Command::Ask {
            prompt,
            model,
            mode,
            ceiling_secs,
            attachments,
            new_chat,
        } => {
            let prompt = text_or_stdin(prompt).await?;
            if new_chat {
                finish("new chat", session.new_chat(cancel).await)?;
            }
            let model = match model {
                Some(name) => {
                    let selected = session.select_model(&name, cancel).await;
                    Some(finish("select model", selected)?)
                }
                None => current_model(session).await,
            };
            let class = OperationClass::infer(model.as_deref(), mode.as_deref());
            let ceiling = ceiling_secs.map(Duration::from_secs);
            tracing::info!(
                %class,
                model = model.as_deref().unwrap_or("unknown"),
                ceiling = %format_duration(session.budget(class, ceiling).ceiling),
                "Operation class"
            );

            for path in &attachments {
                finish("attach", session.attach_file(path, cancel).await)?;
            }

            let outcome = session.ask(&prompt, class, ceiling, cancel).await;
            if let Some(err) = &outcome.last_error
                && let Some(partial) = err.partial()
                && outcome.value.is_none()
            {
                eprintln!("Partial response before giving up:");
                println!("{}", partial);
            }
            let answer = finish("ask", outcome)?;
            if as_json {
                println!(
                    "{}",
                    json!({
                        "content": answer.content(),
                        "class": class.to_string(),
                        "polls": answer.report.polls,
                        "elapsed_ms": answer.report.elapsed.as_millis() as u64,
                        "via_enter": answer.receipt.via_enter,
                    })
                );
            } else {
                println!("{}", answer.content());
            }
        }
        Command::Edit {
            index,
            content,
            ceiling_secs,
        } => {
            let content = text_or_stdin(content).await?;
            let class = OperationClass::infer(current_model(session).await.as_deref(), None);
            let ceiling = ceiling_secs.map(Duration::from_secs);
            let outcome = session
                .edit_message(index, &content, class, ceiling, cancel)
                .await;
            let report = finish("edit", outcome)?;
            if as_json {
                println!(
                    "{}",
                    json!({
                        "content": report.content,
                        "class": class.to_string(),
                        "polls": report.polls,
                        "elapsed_ms": report.elapsed.as_millis() as u64,
                    })
                );
            } else {
                println!("{}", report.content);
            }
        }
        Command::Model { name: Some(name) } => {
            let label = finish("select model", session.select_model(&name, cancel).await)?;
            eprintln!("Model is now {}", label);
        }
        Command::Model { name: None } => match session.current_model().await? {
            Some(label) if as_json => println!("{}", json!({ "model": label })),
            Some(label) => println!("{}", label),
            None => bail!("no model picker on the page"),
        },
        Command::Conversations => {
            let entries = session.list_conversations().await?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for (i, entry) in entries.iter().enumerate() {
                    println!("{:>3}  {:<38} {}", i, entry.id, entry.title);
                }
            }
        }
        Command::Switch { target } => {
            let target = ConversationRef::from(target.as_str());
            finish("switch", session.switch_conversation(&target, cancel).await)?;
            eprintln!("Switched to conversation {}", target);
        }
        Command::NewChat => {
            finish("new chat", session.new_chat(cancel).await)?;
            eprintln!("Started a new conversation");
        }
        Command::Last => match session.last_response().await? {
            Some(text) if as_json => println!("{}", json!({ "content": text })),
            Some(text) => println!("{}", text),
            None => bail!("no assistant message on the page"),
        },
        Command::Conversation => {
            let turns = session.conversation().await?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&turns)?);
            } else {
                for turn in turns {
                    println!("[{:?}]\n{}\n", turn.role, turn.content);
                }
            }
        }
        Command::Probe => {
            let state = session.session_state().await?;
            println!("session: {:?}", state);
            if let Some(model) = current_model(session).await {
                println!("model: {}", model);
            }

            let mut names: Vec<String> = session
                .catalog()
                .targets()
                .map(|t| t.as_str().to_string())
                .collect();
            names.sort();
            for name in names {
                match session.resolve_now(&name).await {
                    Ok(found) => println!(
                        "{:<20} #{} {} ({} candidate{})",
                        name,
                        found.descriptor_index,
                        found.descriptor,
                        found.candidates,
                        if found.candidates == 1 { "" } else { "s" }
                    ),
                    Err(e) => println!("{:<20} {}", name, e),
                }
            }
        }
    }
    Ok(())
}

async fn text_or_stdin(text: Option<String>) -> anyhow::Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            Ok(buf)
        }
    }
}

/// The model is only a hint for the ceiling, so a failed read is not fatal.
async fn current_model(session: &Session) -> Option<String> {
    match session.current_model().await {
        Ok(model) => model,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read the current model");
            None
        }
    }
}

fn finish<T>(what: &str, outcome: OperationOutcome<T>) -> anyhow::Result<T> {
    let status = outcome.status;
    let attempts = outcome.attempts;
    match outcome.into_result() {
        Ok(value) => Ok(value),
        Err(err) => match status {
            OutcomeStatus::Cancelled => bail!("{} cancelled", what),
            _ => bail!(
                "{} failed after {} attempt{} ({:?}): {}",
                what,
                attempts,
                if attempts == 1 { "" } else { "s" },
                status,
                err
            ),
        },
    }
}
