use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use reginspect::{
    image::Registry,
    registry::{AuthConfig, HttpTransport, RegistryService, Service, Transport},
    ImageName, InspectConfig, ListRemoteTagsConfig,
};
use std::{path::PathBuf, process, sync::Arc};
use url::Url;

/// Inspect container images on remote registries without pulling them
#[derive(Parser, Debug)]
#[command(name = "reginspect", version, about)]
struct Cli {
    /// Default log filter, overridden by RUST_LOG
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Registries to try, in order, for images that don't name one
    #[arg(
        long = "registry",
        env = "REGINSPECT_REGISTRIES",
        value_delimiter = ',',
        default_value = "docker.io"
    )]
    registries: Vec<String>,

    /// Mirror of the official index
    #[arg(long = "mirror")]
    mirrors: Vec<Url>,

    /// Registry that may be reached over plain http or with unverified TLS
    #[arg(long = "insecure-registry")]
    insecure_registries: Vec<Registry>,

    /// Extra trusted root certificate, PEM encoded
    #[arg(long = "ca-cert")]
    ca_certs: Vec<PathBuf>,

    /// Never fall back to the legacy registry protocol
    #[arg(long)]
    disable_legacy_registry: bool,

    #[arg(short, long, env = "REGINSPECT_USERNAME")]
    username: Option<String>,

    #[arg(short, long, env = "REGINSPECT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the configuration and identity of a remote image
    Inspect { image: ImageName },
    /// Print all tags of a remote repository
    Tags { image: ImageName },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut service = Service::builder();
    for mirror in cli.mirrors {
        service = service.mirror(mirror);
    }
    for registry in cli.insecure_registries {
        service = service.insecure_registry(registry);
    }
    for path in &cli.ca_certs {
        service = service.add_root_certificate(std::fs::read(path)?);
    }
    if cli.disable_legacy_registry {
        service = service.disable_legacy_registry();
    }
    let service: Arc<dyn RegistryService> = Arc::new(service.build());
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new());

    let auth_config = cli.username.map(|username| AuthConfig {
        username,
        password: cli.password.unwrap_or_default(),
        registry_token: None,
    });

    let json = match cli.command {
        Command::Inspect { image } => {
            let mut config = InspectConfig::new(service, transport);
            config.registries = cli.registries;
            config.auth_config = auth_config;
            let record = reginspect::inspect(&image, &config).await?;
            serde_json::to_string_pretty(&record)?
        }
        Command::Tags { image } => {
            let mut config = ListRemoteTagsConfig::new(service, transport);
            config.registries = cli.registries;
            config.auth_config = auth_config;
            let list = reginspect::list_remote_tags(&image, &config).await?;
            serde_json::to_string_pretty(&list)?
        }
    };
    println!("{}", json);
    Ok(())
}
