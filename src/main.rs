use folio::chunking::Chunker;
use folio::cli::{Cli, Commands, ConfigAction};
use folio::config::{expand_tilde, Config, ConfigValidator};
use folio::error::{FolioError, Result};
use folio::extraction::create_extractor;
use folio::server::{IpcClient, Server};
use folio::service::{ProcessState, QueryService};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve { document } => {
            cmd_serve(cli.config, cli.profile, document)?;
        }
        Commands::Ask {
            question,
            local,
            document,
            show_context,
            json,
        } => {
            cmd_ask(
                cli.config,
                cli.profile,
                &question,
                AskMode {
                    local: local || show_context,
                    document,
                    show_context,
                    json,
                },
            )?;
        }
        Commands::Status => {
            cmd_status(cli.config, cli.profile)?;
        }
        Commands::Chunk {
            file,
            size,
            overlap,
            json,
        } => {
            cmd_chunk(cli.config, cli.profile, &file, size, overlap, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "folio=debug" } else { "folio=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| FolioError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn cmd_serve(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    document: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    for missing in ConfigValidator::check_credentials(&config) {
        tracing::warn!("{}: {}", missing.path, missing.message);
    }

    let document = expand_tilde(&document.unwrap_or_else(|| config.document.path.clone()));
    let extractor = create_extractor(&config.document)?;
    let service = Arc::new(QueryService::from_config(&config)?);
    let server = Server::new(Arc::clone(&service), &config.server);

    println!("Serving {} on {}", document.display(), server.socket_path().display());

    runtime()?.block_on(async move {
        // Bind first so status requests work while the document loads
        let loader = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                match service.load(extractor.as_ref(), &document).await {
                    Ok(ProcessState::Ready) => tracing::info!("{}", service.describe().await),
                    Ok(state) => tracing::warn!("Document not loaded, state is {}", state),
                    Err(e) => tracing::error!("{}", e),
                }
            })
        };

        let result = server.run_until_signal().await;
        loader.abort();
        result
    })
}

struct AskMode {
    local: bool,
    document: Option<PathBuf>,
    show_context: bool,
    json: bool,
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    question: &str,
    mode: AskMode,
) -> Result<()> {
    let config = load_config(config_path, profile)?;

    if !mode.local {
        if mode.document.is_some() {
            tracing::warn!("--document is ignored without --local");
        }

        let client = IpcClient::new(expand_tilde(&config.server.socket_path));
        let reply = runtime()?.block_on(client.query(question))?;

        if mode.json {
            println!("{}", to_json(&reply)?);
        } else {
            println!("{}", reply.response);
        }
        return Ok(());
    }

    let document = expand_tilde(&mode.document.unwrap_or_else(|| config.document.path.clone()));
    let extractor = create_extractor(&config.document)?;
    let service = QueryService::from_config(&config)?;

    runtime()?.block_on(async {
        let state = service.load(extractor.as_ref(), &document).await?;
        if state != ProcessState::Ready {
            return Err(FolioError::IndexNotReady(format!(
                "{} could not be loaded",
                document.display()
            )));
        }

        if mode.show_context {
            let results = service.search(question, None).await?;
            if mode.json {
                let rows: Vec<_> = results
                    .iter()
                    .map(|r| serde_json::json!({"score": r.score, "chunk": r.chunk}))
                    .collect();
                println!("{}", to_json(&rows)?);
            } else {
                for (rank, result) in results.iter().enumerate() {
                    println!(
                        "#{} score {:.4} chunk {} (offset {})",
                        rank + 1,
                        result.score,
                        result.chunk.index,
                        result.chunk.start
                    );
                    println!("{}\n", result.chunk.text);
                }
            }
            return Ok(());
        }

        let response = service
            .handle(folio::service::QueryRequest::new(question))
            .await;
        if mode.json {
            println!("{}", to_json(&response)?);
        } else {
            println!("{}", response.response);
        }
        Ok(())
    })
}

fn cmd_status(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let socket_path = expand_tilde(&config.server.socket_path);

    println!("Folio Status");
    println!("============");

    let client = IpcClient::new(socket_path.clone());
    match runtime()?.block_on(client.status()) {
        Ok(reply) => {
            let state = reply
                .state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("\nServer: running on {}", socket_path.display());
            println!("State:  {}", state);
            println!("{}", reply.response);
        }
        Err(e) => {
            tracing::debug!("{}", e);
            println!("\nServer: not running ({})", socket_path.display());
        }
    }

    println!("\nEmbedding: {} ({})", config.embedding.provider, config.embedding.model);
    println!("LLM:       {} ({})", config.llm.provider, config.llm.model);

    Ok(())
}

fn cmd_chunk(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    file: &Path,
    size: Option<usize>,
    overlap: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let chunker = Chunker::with_separators(
        size.unwrap_or(config.chunking.chunk_size),
        overlap.unwrap_or(config.chunking.chunk_overlap),
        &config.chunking.separators,
    )?;

    let extractor = create_extractor(&config.document)?;
    let document = runtime()?.block_on(extractor.extract(file))?;
    let chunks = chunker.split(&document.text);

    if json {
        println!("{}", to_json(&chunks)?);
        return Ok(());
    }

    println!(
        "{}: {} chars, {} chunks (size {}, overlap {})",
        document.id,
        document.char_len(),
        chunks.len(),
        chunker.chunk_size(),
        chunker.chunk_overlap()
    );
    for chunk in &chunks {
        println!("\n--- chunk {} [{}..{}] ---", chunk.index, chunk.start, chunk.end());
        println!("{}", chunk.text);
    }

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| FolioError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    FolioError::Config(format!("Unknown config section: {}", section))
                })?,
                None => value,
            };

            println!("{}", to_json(&shown)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = match profile {
                Some(profile) => Config::load_with_profile(&path, &profile)?,
                None => Config::load(&path)?,
            };

            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            for missing in ConfigValidator::check_credentials(&config) {
                println!("  ! {}: {}", missing.path, missing.message);
            }
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| FolioError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'folio config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| FolioError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}
