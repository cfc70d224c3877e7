//! CLI for the persona chat assistant.
//!
//! Subcommands:
//!  - `chat`    : interactive session; history and recorded emails live here.
//!  - `ask`     : answer a single message and exit.
//!  - `index`   : embed the corpus and write the index cache.
//!  - `search`  : show which passages a query retrieves, with scores.
//!  - `contact` : look up a recorded contact by email.
//!
//! Configuration comes from an optional JSON file (`--config`), then API keys
//! from the environment, then the flags below.
//!
//! Usage examples:
//!  cargo run -p persona-chat -- index --corpus knowledge/knowledge_base.txt --index-cache index.json
//!  cargo run -p persona-chat -- chat --index-cache index.json

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use persona_chat::embed::{self, Embedder};
use persona_chat::retrieval::{load_index_json, save_index_json, CacheLoad};
use persona_chat::utils::{logging, ProgressCallback};
use persona_chat::{
    build_controller, ChatConfig, ChatController, ContactStore, JsonFileContactStore,
    KnowledgeIndex, RecordedEmails, ReplyOutcome, Retriever,
};

mod session;

use crate::session::{parse_input, Input, Session};

/// CLI entrypoint.
#[derive(Parser)]
#[command(
    name = "persona-chat",
    about = "Chat with a persona grounded in its own knowledge base",
    version
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    Chat,

    /// Answer one message and exit.
    Ask(AskArgs),

    /// Build the retrieval index and write it to the index cache.
    Index,

    /// Show the passages retrieved for a query.
    Search(SearchArgs),

    /// Look up a recorded contact by email.
    Contact(ContactArgs),
}

/// Options shared by every subcommand. Each one overrides the config file.
#[derive(Args, Debug)]
struct GlobalArgs {
    /// JSON configuration file.
    #[arg(long, short = 'c', global = true, env = "PERSONA_CHAT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Name of the person the assistant speaks for.
    #[arg(long, global = true)]
    persona: Option<String>,

    /// Knowledge corpus text file.
    #[arg(long, global = true, value_name = "PATH")]
    corpus: Option<PathBuf>,

    /// Contacts JSON file.
    #[arg(long, global = true, value_name = "PATH")]
    contacts: Option<PathBuf>,

    /// Index cache file; reused when it still matches the corpus.
    #[arg(long, global = true, value_name = "PATH")]
    index_cache: Option<PathBuf>,

    /// Model used to generate replies.
    #[arg(long, global = true, env = "PERSONA_CHAT_GENERATOR_MODEL")]
    generator_model: Option<String>,

    /// Model used to judge replies.
    #[arg(long, global = true, env = "PERSONA_CHAT_JUDGE_MODEL")]
    judge_model: Option<String>,

    /// Revision rounds allowed after a rejected reply.
    #[arg(long, global = true)]
    max_revisions: Option<usize>,

    /// Number of parallel embedding workers.
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Cache size per embedding worker.
    #[arg(long, global = true, default_value = "100")]
    cache_size: usize,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

/// Arguments for the `ask` subcommand.
#[derive(Args, Debug)]
struct AskArgs {
    /// The message to answer.
    message: String,

    /// Output as JSON.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `search` subcommand.
#[derive(Args, Debug)]
struct SearchArgs {
    /// Query string to search for.
    query: String,

    /// Number of top results to return (defaults to the configured top_k).
    #[arg(long)]
    top_k: Option<usize>,

    /// Output as JSON.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `contact` subcommand.
#[derive(Args, Debug)]
struct ContactArgs {
    /// Exact email address to look up.
    email: String,

    /// Output as JSON.
    #[arg(long)]
    json: bool,
}

/// Application entry point.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.global.verbose {
        logging::init_with_default("debug");
    } else {
        logging::init();
    }

    let config = load_config(&cli.global)?;

    match cli.command {
        Commands::Chat => run_chat(&config, &cli.global).await,
        Commands::Ask(args) => run_ask(&config, &cli.global, args).await,
        Commands::Index => run_index(&config, &cli.global),
        Commands::Search(args) => run_search(&config, &cli.global, args),
        Commands::Contact(args) => run_contact(&config, args).await,
    }
}

/// Defaults, then the config file, then flags, then API keys from the environment.
fn load_config(args: &GlobalArgs) -> Result<ChatConfig> {
    let mut config = match &args.config {
        Some(path) => ChatConfig::from_json_file(path)?,
        None => ChatConfig::default(),
    };

    if let Some(persona) = &args.persona {
        config.persona_name = persona.clone();
    }
    if let Some(corpus) = &args.corpus {
        config.corpus_path = corpus.clone();
    }
    if let Some(contacts) = &args.contacts {
        config.contacts_path = contacts.clone();
    }
    if let Some(cache) = &args.index_cache {
        config.index_cache_path = Some(cache.clone());
    }
    if let Some(model) = &args.generator_model {
        config.generator.model = model.clone();
    }
    if let Some(model) = &args.judge_model {
        config.judge.model = model.clone();
    }
    if let Some(max_revisions) = args.max_revisions {
        config.max_revisions = max_revisions;
    }
    if let Some(workers) = args.workers {
        config.embed_workers = workers;
    }

    config.resolve_env();
    config.validate()?;
    Ok(config)
}

/// Progress bar over a 0..1 fraction, when the `progress` feature is on.
struct EmbedProgress {
    #[cfg(feature = "progress")]
    bar: indicatif::ProgressBar,
}

impl EmbedProgress {
    const STEPS: u64 = 100;

    fn start(message: &str) -> Self {
        #[cfg(feature = "progress")]
        {
            let bar = indicatif::ProgressBar::new(Self::STEPS);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
            {
                bar.set_style(style.progress_chars("##-"));
            }
            bar.set_message(message.to_string());
            EmbedProgress { bar }
        }
        #[cfg(not(feature = "progress"))]
        {
            eprintln!("{message}");
            EmbedProgress {}
        }
    }

    fn callback(&self) -> Option<ProgressCallback> {
        #[cfg(feature = "progress")]
        {
            let bar = self.bar.clone();
            Some(Arc::new(move |msg: String, fraction: f32| {
                bar.set_message(msg);
                bar.set_position((fraction * Self::STEPS as f32).floor() as u64);
            }))
        }
        #[cfg(not(feature = "progress"))]
        {
            None
        }
    }

    fn finish(&self, message: String) {
        #[cfg(feature = "progress")]
        self.bar.finish_with_message(message);
        #[cfg(not(feature = "progress"))]
        eprintln!("{message}");
    }
}

/// Build the embedder and release it when the returned guard drops.
fn start_embedder(
    config: &ChatConfig,
    args: &GlobalArgs,
) -> Result<scopeguard::ScopeGuard<Arc<dyn Embedder>, impl FnOnce(Arc<dyn Embedder>)>> {
    let embedder = embed::default_embedder(config.embed_workers, args.cache_size)
        .context("initializing embedder")?;
    info!(embedder = embedder.id(), workers = config.embed_workers, "embedder ready");
    Ok(scopeguard::guard(embedder, |e| {
        if let Err(err) = e.shutdown() {
            warn!(error = %err, "embedder shutdown failed");
        }
    }))
}

/// Use the index cache when it matches the corpus, otherwise build the index
/// and refresh the cache.
fn load_or_build_index(config: &ChatConfig, embedder: Arc<dyn Embedder>) -> Result<KnowledgeIndex> {
    let corpus = std::fs::read_to_string(&config.corpus_path)
        .with_context(|| format!("reading corpus {}", config.corpus_path.display()))?;

    if let Some(cache) = config.index_cache_path.as_deref().filter(|p| p.exists()) {
        match load_index_json(cache, &corpus, embedder.clone(), &config.retrieval) {
            Ok(CacheLoad::Fresh(index)) => {
                info!(path = %cache.display(), passages = index.len(), "index cache loaded");
                return Ok(index);
            }
            Ok(CacheLoad::Stale { reason }) => {
                info!(path = %cache.display(), %reason, "index cache is stale; rebuilding");
            }
            Err(err) => {
                warn!(path = %cache.display(), error = %err, "index cache unreadable; rebuilding");
            }
        }
    }

    let index = build_index(&corpus, config, embedder)?;
    if let Some(cache) = &config.index_cache_path {
        save_cache(&index, cache)?;
    }
    Ok(index)
}

fn build_index(
    corpus: &str,
    config: &ChatConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<KnowledgeIndex> {
    let start = Instant::now();
    let progress = EmbedProgress::start("Embedding corpus...");
    let index = KnowledgeIndex::build(corpus, embedder, &config.retrieval, progress.callback())
        .with_context(|| format!("indexing {}", config.corpus_path.display()))?;
    progress.finish(format!(
        "Indexed {} passages in {:.1?}.",
        index.len(),
        start.elapsed()
    ));
    Ok(index)
}

fn save_cache(index: &KnowledgeIndex, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    save_index_json(index, path).with_context(|| format!("saving index to {}", path.display()))
}

/// Wire the controller: index, contact store, then the two backends.
async fn start_controller(
    config: &ChatConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<ChatController> {
    let index = load_or_build_index(config, embedder)?;
    let retriever: Arc<dyn Retriever> = Arc::new(index);
    let store: Arc<dyn ContactStore> = Arc::new(
        JsonFileContactStore::open(&config.contacts_path)
            .await
            .context("opening contact store")?,
    );
    Ok(build_controller(config, retriever, store)?)
}

/// Run the `chat` subcommand.
///
/// A failed turn prints a short apology and leaves the session as it was, so
/// the user can simply try again.
async fn run_chat(config: &ChatConfig, args: &GlobalArgs) -> Result<()> {
    let embedder = start_embedder(config, args)?;
    let controller = start_controller(config, Arc::clone(&*embedder)).await?;

    println!(
        "Chatting with {}. Type /reset to start over, /quit to leave.",
        config.persona_name
    );

    let mut session = Session::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let message = match parse_input(&line) {
            Input::Quit => break,
            Input::Blank => continue,
            Input::Reset => {
                session.reset();
                println!("(conversation cleared)");
                continue;
            }
            Input::Message(message) => message,
        };

        match controller
            .respond(&message, session.history(), session.recorded_emails())
            .await
        {
            Ok(reply) => {
                println!("\n{}\n", reply.reply);
                session.commit(&message, &reply);
            }
            Err(err) => {
                warn!(error = %err, "turn failed");
                println!("\n{}\n", err.user_message());
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct AskOutput<'a> {
    message: &'a str,
    reply: &'a str,
    outcome: ReplyOutcome,
    recorded_emails: &'a RecordedEmails,
}

/// Run the `ask` subcommand.
async fn run_ask(config: &ChatConfig, args: &GlobalArgs, ask: AskArgs) -> Result<()> {
    let embedder = start_embedder(config, args)?;
    let controller = start_controller(config, Arc::clone(&*embedder)).await?;

    let reply = controller
        .respond(&ask.message, &[], &RecordedEmails::new())
        .await
        .context("answering message")?;

    if ask.json {
        let out = AskOutput {
            message: &ask.message,
            reply: &reply.reply,
            outcome: reply.outcome,
            recorded_emails: &reply.recorded_emails,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", reply.reply);
    }
    Ok(())
}

/// Run the `index` subcommand. Always rebuilds, ignoring any existing cache.
fn run_index(config: &ChatConfig, args: &GlobalArgs) -> Result<()> {
    let cache = config
        .index_cache_path
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--index-cache <path> is required"))?;
    let embedder = start_embedder(config, args)?;

    let corpus = std::fs::read_to_string(&config.corpus_path)
        .with_context(|| format!("reading corpus {}", config.corpus_path.display()))?;
    let index = build_index(&corpus, config, Arc::clone(&*embedder))?;
    save_cache(&index, cache)?;
    println!(
        "Wrote {} passages from {} to {}",
        index.len(),
        config.corpus_path.display(),
        cache.display()
    );
    Ok(())
}

/// Run the `search` subcommand.
fn run_search(config: &ChatConfig, args: &GlobalArgs, search: SearchArgs) -> Result<()> {
    let embedder = start_embedder(config, args)?;
    let index = load_or_build_index(config, Arc::clone(&*embedder))?;
    let top_k = search.top_k.unwrap_or(config.retrieval.top_k);

    let hits = index.retrieve_passages(&search.query, top_k)?;

    if search.json {
        let out = serde_json::json!({
            "query": search.query,
            "top_k": top_k,
            "min_score": config.retrieval.min_score,
            "results": hits,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if hits.is_empty() {
        println!(
            "No passages scored above {} for {:?}.",
            config.retrieval.min_score, search.query
        );
    } else {
        println!("Top {} passages for {:?}:", hits.len(), search.query);
        for (i, hit) in hits.iter().enumerate() {
            let snippet: String = hit.text.chars().take(120).collect();
            let ellipsis = if hit.text.chars().count() > 120 { "..." } else { "" };
            println!(
                "{}. score={:.3} source={} {}{}",
                i + 1,
                hit.score,
                hit.source,
                snippet,
                ellipsis
            );
        }
    }
    Ok(())
}

/// Run the `contact` subcommand.
async fn run_contact(config: &ChatConfig, args: ContactArgs) -> Result<()> {
    let store = JsonFileContactStore::open(&config.contacts_path)
        .await
        .context("opening contact store")?;
    let record = store.get(&args.email).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }
    match record {
        Some(r) => {
            println!("email:       {}", r.email);
            println!("name:        {}", r.name.as_deref().unwrap_or("-"));
            println!("notes:       {}", r.notes.as_deref().unwrap_or("-"));
            println!("recorded at: {}", r.recorded_at.to_rfc3339());
        }
        None => println!("No contact recorded for {}", args.email),
    }
    Ok(())
}
