use std::{error::Error, fs, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use log::error;
use profile_server::{config::ServerConfig, profile::ProfileSpec, Document, LocalServer};

#[derive(Parser)]
#[command(
    name = "profile-server",
    about = "profile-server - serve a configuration profile on localhost",
    long_about = r#"
profile-server - serve a configuration profile on localhost

Usage:
    profile-server [OPTIONS] <COMMAND>

Commands:
    serve       Serve an existing profile document
    webclips    Build a web-clip profile from YAML and serve it

Options:
    -h, --help       Print help information
    -c, --config     <CONFIG>
                     Server config file (YAML)
"#
)]
struct Args {
    #[arg(short, long, required = false, help = "Server config file (YAML).")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve an existing profile document
    Serve {
        #[arg(short, long, help = "Document served at /download.")]
        document: PathBuf,
    },
    /// Build a web-clip profile from YAML and serve it
    Webclips {
        #[arg(short, long, help = "Profile description (YAML).")]
        profile: PathBuf,
    },
}

async fn run() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ServerConfig::from_yaml_file(path)?,
        None => ServerConfig::default(),
    };

    let document = match &args.command {
        Command::Serve { document } => Document::from(fs::read(document)?),
        Command::Webclips { profile } => ProfileSpec::load(profile)?.to_document()?,
    };

    LocalServer::new(config)
        .run(document)
        .await?;

    Ok(())
}

fn exit_code(result: Result<(), Box<dyn Error>>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to start server: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    exit_code(run().await)
}
