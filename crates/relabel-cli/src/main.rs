use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use relabel_core::{
    classify, derive_label, extract_image_reference, has_container_agent, is_declarative, rewrite_all, ImageRef,
    PlaceholderTask, QueueEvent, RewriteMode, ScriptBundle, Task,
};
use relabel_host::{HostError, InMemoryHost};
use relabel_queue::{InterceptorConfig, QueueInterceptor};

#[derive(Parser)]
#[command(name = "relabel", version)]
struct Cli {
    /// Config file (defaults to ~/.config/relabel/relabel.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    AnyScript,
    DeclarativeOnly,
}

impl From<Mode> for RewriteMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::AnyScript => RewriteMode::AnyScript,
            Mode::DeclarativeOnly => RewriteMode::DeclarativeOnly,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Print the agent label derived from an image reference
    Label { image: String },

    /// Report how a pipeline script would be classified
    Check { file: PathBuf },

    /// Rewrite container agents of a pipeline script into label agents
    Rewrite {
        file: PathBuf,
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        /// Write the result back to the file instead of printing it
        #[arg(long)]
        write: bool,
    },

    /// Run one queue interception against an in-memory host
    Simulate {
        #[arg(long)]
        script: Option<PathBuf>,
        /// Loaded script as NAME=PATH; repeatable
        #[arg(long = "loaded", value_name = "NAME=PATH")]
        loaded: Vec<String>,
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        #[arg(long)]
        fail_replay: bool,
        #[arg(long)]
        fail_stop: bool,
        #[arg(long)]
        json: bool,
    },
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<InterceptorConfig> {
    let cfg = match explicit {
        Some(path) => InterceptorConfig::load_from(path),
        None => {
            let path = InterceptorConfig::default_path();
            if path.exists() {
                InterceptorConfig::load_from(&path)
            } else {
                Ok(InterceptorConfig::default())
            }
        }
    }?;
    tracing::debug!(config = ?cfg, "loaded config");
    Ok(cfg)
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relabel=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Init { path } => {
            let path = path.unwrap_or_else(InterceptorConfig::default_path);
            InterceptorConfig::default().save_to(&path)?;
            println!("Wrote {}", path.display());
        }
        Command::Label { image } => {
            let image = ImageRef::new(image)
                .ok_or_else(|| anyhow!("image reference must be non-empty, without quotes, braces or whitespace"))?;
            println!("{}", derive_label(&image));
        }
        Command::Check { file } => {
            let script = read(&file)?;
            println!("kind: {:?}", classify(&script));
            println!("container agent: {}", has_container_agent(&script));
            match extract_image_reference(&script).with_context(|| format!("scan {}", file.display()))? {
                Some(image) => println!("image: {image} -> {}", derive_label(&image)),
                None => println!("image: none"),
            }
        }
        Command::Rewrite { file, mode, write } => {
            let cfg = load_config(cli.config.as_deref())?;
            let mode = mode.map(RewriteMode::from).unwrap_or(cfg.rewrite.mode);
            let script = read(&file)?;
            if mode == RewriteMode::DeclarativeOnly && !is_declarative(&script) {
                eprintln!("{}: scripted pipeline, unchanged", file.display());
                return Ok(());
            }
            let rewrite = rewrite_all(&script).with_context(|| format!("scan {}", file.display()))?;
            if !rewrite.changed() {
                eprintln!("{}: unchanged", file.display());
                if !write {
                    print!("{script}");
                }
                return Ok(());
            }
            if write {
                std::fs::write(&file, &rewrite.script).with_context(|| format!("write {}", file.display()))?;
                eprintln!("{}: {} agent(s) relabeled", file.display(), rewrite.labels.len());
            } else {
                print!("{}", rewrite.script);
            }
        }
        Command::Simulate { script, loaded, mode, fail_replay, fail_stop, json } => {
            let mut cfg = load_config(cli.config.as_deref())?;
            if let Some(mode) = mode {
                cfg.rewrite.mode = mode.into();
            }

            let primary = script.as_deref().map(read).transpose()?;
            let loaded = if loaded.is_empty() {
                None
            } else {
                let mut scripts = BTreeMap::new();
                for entry in &loaded {
                    let (name, path) = entry
                        .split_once('=')
                        .ok_or_else(|| anyhow!("--loaded expects NAME=PATH, got {entry}"))?;
                    scripts.insert(name.to_string(), read(Path::new(path))?);
                }
                Some(scripts)
            };

            let host = Arc::new(InMemoryHost::new());
            let run = host.add_run("simulated#1", "simulated", Some(ScriptBundle::new(primary, loaded)));
            if fail_replay {
                host.fail_replay_with(HostError::Rejected("simulated replay failure".into()));
            }
            if fail_stop {
                host.fail_stop_with(HostError::Internal("simulated stop failure".into()));
            }

            let interceptor = Arc::new(QueueInterceptor::new(host.clone(), cfg));
            let requeued = Arc::new(Mutex::new(Vec::new()));
            {
                let interceptor = Arc::downgrade(&interceptor);
                let requeued = requeued.clone();
                host.on_requeue(Arc::new(move |event: &QueueEvent| {
                    if let Some(interceptor) = interceptor.upgrade() {
                        let disposition = interceptor.intercept(event);
                        if let Ok(mut seen) = requeued.lock() {
                            seen.push(disposition);
                        }
                    }
                }));
            }

            let event = QueueEvent::new(Task::Placeholder(PlaceholderTask { name: "simulated#1".into() }))
                .with_cause("UserIdCause", "Started by relabel simulate");
            let disposition = interceptor.intercept(&event);
            let replacement = host.run(&run.id).and_then(|r| r.replaced_by).and_then(|id| host.run(&id));
            let requeued = requeued.lock().map(|seen| seen.clone()).unwrap_or_default();

            if json {
                let out = serde_json::json!({
                    "disposition": disposition,
                    "requeued": requeued,
                    "replacement_scripts": replacement.as_ref().and_then(|r| r.source.as_ref()),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Disposition: {disposition:?}");
                for d in &requeued {
                    println!("Requeued event: {d:?}");
                }
                for call in host.calls() {
                    println!("- {call:?}");
                }
                if let Some(scripts) = replacement.and_then(|r| r.source) {
                    if let Some(primary) = scripts.primary {
                        println!("--- replacement pipeline script ---\n{primary}");
                    }
                    for (name, script) in scripts.loaded.into_iter().flatten() {
                        println!("--- replacement loaded script {name} ---\n{script}");
                    }
                }
            }
        }
    }

    Ok(())
}
