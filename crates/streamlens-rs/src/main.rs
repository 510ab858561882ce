//! Command-line client for a Streamlens streams backend.

use std::path::PathBuf;

use anyhow::{Context, ensure};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use log::{debug, info};
use streamlens_rs_config::StreamlensConfig;
use streamlens_rs_core::{
    ChatSession, Dashboard, INDUSTRY_TYPES, NewPrompt, PromptApi, PromptUpdate,
};
use streamlens_rs_protocol::SourceType;

/// Command-line options for the Streamlens client.
#[derive(Parser)]
#[command(name = "streamlens", version)]
struct Cli {
    /// Optional path to a streamlens.json5 config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// User id to act as (defaults to identity.user_id, then $USER)
    #[arg(long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Command,
}

/// Top-level commands.
#[derive(Subcommand)]
enum Command {
    /// Work with the video library
    #[command(subcommand)]
    Videos(VideosCommand),
    /// Resolve an HLS playback URL for a live stream
    Live {
        /// Stream name (defaults to storage.stream_name)
        stream: Option<String>,
    },
    /// Analyze a video source and follow the run to its summary
    Analyze {
        /// Where the frames come from: s3, kvs, or s3_image
        source: SourceType,
        /// Object key, stream name, or image key for the source
        content: String,
    },
    /// Search analyzed frames by keyword
    Search {
        keyword: String,
        /// Lower bound timestamp, e.g. "2024-05-01 00:00:00"
        #[arg(long)]
        from: Option<String>,
        /// Upper bound timestamp
        #[arg(long)]
        to: Option<String>,
    },
    /// Ask a follow-up question about a finished run
    Ask {
        /// Task id printed when the run ended
        task_id: String,
        question: String,
    },
    /// Run a post-processing agent over a finished run
    Agent {
        /// Task id printed when the run ended
        task_id: String,
        prompt: String,
        /// How many rounds the agent may take
        #[arg(long, default_value_t = 1)]
        times: u32,
    },
    /// Manage prompt templates
    #[command(subcommand)]
    Prompts(PromptsCommand),
    /// Delete stored analysis artifacts by age
    Cleanup {
        /// Age cutoff in days; 0 deletes everything
        #[arg(long)]
        period: i64,
    },
}

/// Video library commands.
#[derive(Subcommand)]
enum VideosCommand {
    /// List the shared library and your own videos
    List,
    /// Upload a local video into your library
    Upload {
        /// Path to the video file
        file: PathBuf,
    },
    /// Resolve a presigned playback URL for a stored video
    Url {
        /// Object key from `videos list`
        key: String,
    },
}

/// Prompt template commands.
#[derive(Subcommand)]
enum PromptsCommand {
    /// List templates visible to you
    List,
    /// Create a template
    Create {
        /// Display name, unique per owner
        #[arg(long)]
        topic: String,
        /// Industry grouping: AUTO or MFG
        #[arg(long)]
        industry: String,
        /// System prompt text
        #[arg(long)]
        system: String,
        /// User prompt text
        #[arg(long)]
        user_prompt: String,
    },
    /// Update fields of a template
    Update {
        /// Template to update; ids come from `prompts list`
        #[arg(long)]
        id: String,
        /// Replacement display name
        #[arg(long)]
        topic: Option<String>,
        /// Replacement industry grouping
        #[arg(long)]
        industry: Option<String>,
        /// Replacement system prompt
        #[arg(long)]
        system: Option<String>,
        /// Replacement user prompt
        #[arg(long)]
        user_prompt: Option<String>,
    },
    /// Delete a template
    Delete {
        /// Template to delete; ids come from `prompts list`
        #[arg(long)]
        id: String,
    },
}

/// Entry point for the Streamlens CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    streamlens_rs::init_logging();

    let cli = Cli::parse();
    info!(
        "starting streamlens (config_set={}, user_set={})",
        cli.config.is_some(),
        cli.user.is_some()
    );
    let config = load_config(&cli)?;
    let user_id = resolve_user(cli.user, &config)?;

    match cli.command {
        Command::Videos(command) => videos_command(command, config, user_id).await,
        Command::Live { stream } => live_command(stream, config, user_id).await,
        Command::Analyze { source, content } => {
            analyze_command(source, content, config, user_id).await
        }
        Command::Search { keyword, from, to } => {
            search_command(keyword, from, to, config, user_id).await
        }
        Command::Ask { task_id, question } => ask_command(task_id, question, config, user_id).await,
        Command::Agent {
            task_id,
            prompt,
            times,
        } => agent_command(task_id, prompt, times, config, user_id).await,
        Command::Prompts(command) => prompts_command(command, config, user_id).await,
        Command::Cleanup { period } => cleanup_command(period, config, user_id).await,
    }
}

/// Load the config from an explicit path or discover it layer by layer.
fn load_config(cli: &Cli) -> anyhow::Result<StreamlensConfig> {
    if let Some(path) = cli.config.as_ref() {
        info!("loading config (path={})", path.display());
        return StreamlensConfig::load_from_path(path).context("failed to load config");
    }
    let layered = StreamlensConfig::load_layered().context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

/// Resolve the acting user: the flag wins, then the config, then `$USER`.
fn resolve_user(flag: Option<String>, config: &StreamlensConfig) -> anyhow::Result<String> {
    if let Some(user) = flag {
        return Ok(user);
    }
    if let Some(user) = config.identity.user_id.clone() {
        return Ok(user);
    }
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .context("user id not set; pass --user or set identity.user_id in the config")
}

/// Connect to the backend and wait for the first live session.
async fn connect(config: StreamlensConfig, user_id: String) -> anyhow::Result<Dashboard> {
    let url = config.endpoints.websocket_url.clone();
    let dashboard = Dashboard::new(config, user_id)?;
    ensure!(
        dashboard.wait_connected().await,
        "could not connect to {url}"
    );
    Ok(dashboard)
}

async fn videos_command(
    command: VideosCommand,
    config: StreamlensConfig,
    user_id: String,
) -> anyhow::Result<()> {
    let dashboard = connect(config, user_id).await?;
    match command {
        VideosCommand::List => {
            let videos = dashboard.list_videos().await?;
            if videos.is_empty() {
                println!("no videos");
            }
            for object in &videos {
                println!(
                    "{:<56} {:>10}  {}",
                    object.key,
                    format_size(object.size),
                    format_last_modified(&object.last_modified)
                );
            }
        }
        VideosCommand::Upload { file } => {
            dashboard.upload_video(&file).await?;
            println!("uploaded {}", file.display());
        }
        VideosCommand::Url { key } => {
            let url = dashboard.playback_url(&key).await?;
            println!("{url}");
        }
    }
    dashboard.close().await;
    Ok(())
}

async fn live_command(
    stream: Option<String>,
    config: StreamlensConfig,
    user_id: String,
) -> anyhow::Result<()> {
    let stream = stream
        .or_else(|| config.storage.stream_name.clone())
        .context("no stream name given and storage.stream_name is not configured")?;
    let dashboard = connect(config, user_id).await?;
    let url = dashboard.streaming_url(&stream).await?;
    println!("{url}");
    dashboard.close().await;
    Ok(())
}

/// Start a run and print its frames as they stream in, then the summary.
async fn analyze_command(
    source: SourceType,
    content: String,
    config: StreamlensConfig,
    user_id: String,
) -> anyhow::Result<()> {
    let dashboard = connect(config, user_id).await?;
    let run = dashboard.start_analysis(source, content.as_str())?;
    println!("analyzing {content} (source={source})");

    let mut updates = run.updates();
    let mut printed = 0usize;
    loop {
        let snapshot = run.snapshot();
        for frame in &snapshot.frames[printed..] {
            println!("[{}] {}", frame.timestamp, frame.analysis_result);
        }
        printed = snapshot.frames.len();
        if snapshot.ended {
            break;
        }
        if updates.changed().await.is_err() {
            break;
        }
    }

    if let Some(task_id) = run.task_id() {
        println!("run complete (task {task_id}); waiting for summary");
        if let Some(summary) = run.wait_for_summary().await {
            println!();
            println!("{summary}");
        }
    }
    dashboard.close().await;
    Ok(())
}

async fn search_command(
    keyword: String,
    from: Option<String>,
    to: Option<String>,
    config: StreamlensConfig,
    user_id: String,
) -> anyhow::Result<()> {
    let dashboard = connect(config, user_id).await?;
    let frames = dashboard.search_frames(&keyword, from, to).await?;
    if frames.is_empty() {
        println!("no matches");
    }
    for frame in &frames {
        println!("{:>5.2}  [{}] {}", frame.score, frame.timestamp, frame.description);
        println!("       {}", frame.image_url);
    }
    dashboard.close().await;
    Ok(())
}

async fn ask_command(
    task_id: String,
    question: String,
    config: StreamlensConfig,
    user_id: String,
) -> anyhow::Result<()> {
    let dashboard = connect(config, user_id).await?;
    let mut session = ChatSession::new(task_id);
    let answer = dashboard.ask(&mut session, &question).await?;
    println!("{answer}");
    dashboard.close().await;
    Ok(())
}

async fn agent_command(
    task_id: String,
    prompt: String,
    times: u32,
    config: StreamlensConfig,
    user_id: String,
) -> anyhow::Result<()> {
    let dashboard = connect(config, user_id).await?;
    match dashboard.run_agent(&task_id, &prompt, times).await? {
        Some(result) => println!("{result}"),
        None => println!("agent produced no result"),
    }
    dashboard.close().await;
    Ok(())
}

/// Prompt CRUD goes over plain HTTP; no websocket session is needed.
async fn prompts_command(
    command: PromptsCommand,
    config: StreamlensConfig,
    user_id: String,
) -> anyhow::Result<()> {
    let api = PromptApi::new(&config.endpoints.http_url, &config.http)?;
    match command {
        PromptsCommand::List => {
            let prompts = api.list(&user_id).await?;
            if prompts.is_empty() {
                println!("no prompt templates");
            }
            for prompt in &prompts {
                let origin = if prompt.is_public { "shared" } else { "yours" };
                println!(
                    "{:<40} {:<32} [{}] ({origin})",
                    prompt.prompt_id, prompt.topic_name, prompt.industry_type
                );
            }
        }
        PromptsCommand::Create {
            topic,
            industry,
            system,
            user_prompt,
        } => {
            ensure!(
                INDUSTRY_TYPES.contains(&industry.as_str()),
                "industry must be one of: {}",
                INDUSTRY_TYPES.join(", ")
            );
            let created = api
                .create(&NewPrompt {
                    user_id,
                    topic_name: topic,
                    industry_type: industry,
                    system_prompt: system,
                    user_prompt,
                })
                .await?;
            println!("created prompt {}", created.prompt_id);
        }
        PromptsCommand::Update {
            id,
            topic,
            industry,
            system,
            user_prompt,
        } => {
            ensure!(
                topic.is_some() || industry.is_some() || system.is_some() || user_prompt.is_some(),
                "nothing to update; pass --topic, --industry, --system, or --user-prompt"
            );
            let message = api
                .update(&PromptUpdate {
                    user_id,
                    prompt_id: id,
                    topic_name: topic,
                    industry_type: industry,
                    system_prompt: system,
                    user_prompt,
                })
                .await?;
            println!("{message}");
        }
        PromptsCommand::Delete { id } => {
            let message = api.delete(&user_id, &id).await?;
            println!("{message}");
        }
    }
    Ok(())
}

async fn cleanup_command(
    period: i64,
    config: StreamlensConfig,
    user_id: String,
) -> anyhow::Result<()> {
    let dashboard = connect(config, user_id).await?;
    let message = dashboard.delete_resources(period).await?;
    println!("{message}");
    dashboard.close().await;
    Ok(())
}

/// Render an object size in mebibytes for the listing.
fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!("{:.1} MiB", bytes as f64 / MIB)
}

/// Shorten a listing timestamp; the raw value passes through unparsed shapes.
fn format_last_modified(raw: &str) -> String {
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z")
        .map(|stamp| stamp.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}
