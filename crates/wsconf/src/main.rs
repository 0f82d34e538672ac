//
// main.rs
//
// wsconf: print a folder's merged workspace configuration, optionally
// following changes
//

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde_json::Value;
use wsconf::parser::strip_json_comments;
use wsconf::{ConfigLoader, DefaultsRegistry, JsonConfigParser, LoaderConfig, LoaderServices};

fn print_usage() {
    println!(
        "wsconf {}, a workspace configuration loader.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: wsconf [OPTIONS]

Available options:

--workspace DIR              Workspace root (default: current directory)
--defaults FILE              JSON file with global default values
--options FILE               JSON file with loader options
--section KEY                Print only the dotted section KEY
--inspect KEY                Print the default, workspace and merged value of KEY
--keys                       Print the flattened keys of each layer
--watch                      Keep running and print each configuration update
--version                    Print the version
--help                       Print this help message

"#
    );
}

#[derive(Debug, Default)]
struct Args {
    workspace: Option<PathBuf>,
    defaults: Option<String>,
    options: Option<String>,
    section: Option<String>,
    inspect: Option<String>,
    keys: bool,
    watch: bool,
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_options(path: &str) -> anyhow::Result<LoaderConfig> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading options file {path}"))?;
    let settings: Value = serde_json::from_str(&strip_json_comments(&text))
        .with_context(|| format!("parsing options file {path}"))?;
    Ok(LoaderConfig::from_settings(&settings))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let mut args = Args::default();
    while let Some(arg) = argv.next() {
        let mut value = |name: &str| {
            argv.next()
                .ok_or_else(|| anyhow!("Missing value for '{name}'"))
        };
        match arg.as_str() {
            "--workspace" => args.workspace = Some(PathBuf::from(value("--workspace")?)),
            "--defaults" => args.defaults = Some(value("--defaults")?),
            "--options" => args.options = Some(value("--options")?),
            "--section" => args.section = Some(value("--section")?),
            "--inspect" => args.inspect = Some(value("--inspect")?),
            "--keys" => args.keys = true,
            "--watch" => args.watch = true,
            "--version" => {
                println!("wsconf {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            other => {
                return Err(anyhow!("Unknown argument: '{other}'"));
            }
        }
    }

    env_logger::init();

    let config = match &args.options {
        Some(path) => read_options(path).await?,
        None => LoaderConfig::default(),
    };

    let registry = Arc::new(DefaultsRegistry::new());
    if let Some(path) = &args.defaults {
        registry
            .load_file(path, &JsonConfigParser::default())
            .await
            .with_context(|| format!("loading defaults from {path}"))?;
    }

    let root = args.workspace.clone().unwrap_or_else(|| PathBuf::from("."));
    let services = LoaderServices::for_folder(&root, registry, args.watch)?;
    let loader = ConfigLoader::new(config, services);
    loader.initialize().await?;

    if !loader.has_workspace_configuration() {
        log::info!(
            "No {} found under {}",
            loader.config().settings_path(),
            root.display()
        );
    }

    if let Some(key) = &args.inspect {
        print_json(&loader.inspect(key)?)?;
    } else if args.keys {
        print_json(&loader.keys()?)?;
    } else {
        print_json(&loader.get_configuration(args.section.as_deref())?)?;
    }

    if !args.watch {
        return Ok(());
    }

    let mut updates = loader.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Some(_) => print_json(&loader.get_configuration(args.section.as_deref())?)?,
                None => break,
            },
        }
    }

    loader.dispose();
    Ok(())
}
