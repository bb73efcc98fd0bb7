//! `cloudfx` command-line front end

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use cloudfx_core::{CloudConfig, Dispatcher, ImageSource, Session};
use cloudfx_transform::{AssetId, Catalog, TransformDescriptor, TransformParams, UrlComposer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let effect = Arg::new("effect")
        .long("effect")
        .required(true)
        .help("Operation name, e.g. resizeFillImage");
    let param = Arg::new("param")
        .long("param")
        .action(ArgAction::Append)
        .value_parser(TransformParams::parse_pair)
        .help("Parameter as name=value, repeatable");
    let wait = Arg::new("wait")
        .long("wait")
        .action(ArgAction::SetTrue)
        .help("Block until the delivery URL renders");
    let file = Arg::new("file")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Image file to upload");

    Command::new("cloudfx")
        .version(cloudfx_core::VERSION)
        .about("Upload images and build transformed delivery URLs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML config file (defaults to CLOUDINARY_* environment variables)"),
        )
        .arg(
            Arg::new("catalog")
                .long("catalog")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML effect catalog replacing the builtin one"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("effects").about("List available effects").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Output as JSON"),
            ),
        )
        .subcommand(
            Command::new("compose")
                .about("Build a delivery URL for an uploaded asset without network access")
                .arg(
                    Arg::new("asset")
                        .long("asset")
                        .required(true)
                        .help("Asset public id"),
                )
                .arg(effect.clone())
                .arg(param.clone()),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload an image as the baseline")
                .arg(file.clone())
                .arg(wait.clone()),
        )
        .subcommand(
            Command::new("apply")
                .about("Upload an image and apply an effect")
                .arg(file)
                .arg(effect)
                .arg(param)
                .arg(wait),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn load_config(args: &ArgMatches) -> Result<CloudConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => {
            CloudConfig::load(path).with_context(|| format!("load config {}", path.display()))
        }
        None => CloudConfig::from_env().context("read config from environment"),
    }
}

fn load_catalog(args: &ArgMatches) -> Result<Catalog> {
    let Some(path) = args.get_one::<PathBuf>("catalog") else {
        return Ok(Catalog::builtin());
    };
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("read catalog {}", path.display()))?;
    Catalog::from_toml_str(&source).with_context(|| format!("parse catalog {}", path.display()))
}

fn params(args: &ArgMatches) -> TransformParams {
    args.get_many::<(String, i64)>("param")
        .into_iter()
        .flatten()
        .cloned()
        .collect()
}

fn print_effects(catalog: &Catalog, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(catalog.list())?);
        return Ok(());
    }

    for effect in catalog.iter() {
        let names: Vec<&str> = effect.parameters().iter().map(|p| p.name.as_str()).collect();
        println!(
            "{:>3}  {:<18} {}{}",
            effect.id,
            effect.operation_name(),
            effect.label,
            if names.is_empty() {
                String::new()
            } else {
                format!(" [{}]", names.join(", "))
            }
        );
    }
    Ok(())
}

fn find_effect<'a>(catalog: &'a Catalog, name: &str) -> Result<&'a TransformDescriptor> {
    match catalog.find_by_operation_name(name) {
        Some(effect) => Ok(effect),
        None => bail!("unknown effect {name:?}, run `cloudfx effects` for the list"),
    }
}

fn compose(args: &ArgMatches, catalog: &Catalog) -> Result<()> {
    let config = load_config(args)?;
    let name = args
        .get_one::<String>("effect")
        .context("missing --effect")?;
    let asset = args.get_one::<String>("asset").context("missing --asset")?;
    let asset = AssetId::new(asset.as_str())?;
    let params = params(args);

    find_effect(catalog, name)?.check_params(&params)?;
    let entry = Dispatcher::resolve(name).context("effect has no dispatch entry")?;
    let composer = UrlComposer::new(&config.delivery_url()?, &config.cloud_name, config.secure)?;

    println!("{}", entry.compose(&composer, &asset, &params)?);
    Ok(())
}

async fn upload(args: &ArgMatches, catalog: Catalog) -> Result<()> {
    let session = Session::new(&load_config(args)?)?.with_catalog(Arc::new(catalog));
    let path = args.get_one::<PathBuf>("file").context("missing file")?;
    let image = ImageSource::from_path(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;

    let url = session.upload_the_image(&image).await?;
    println!("{url}");
    if args.get_flag("wait") {
        session.wait_until_ready().await?;
        tracing::info!(%url, "ready");
    }
    Ok(())
}

async fn apply(args: &ArgMatches, catalog: Catalog) -> Result<()> {
    let session = Session::new(&load_config(args)?)?.with_catalog(Arc::new(catalog));
    let path = args.get_one::<PathBuf>("file").context("missing file")?;
    let name = args
        .get_one::<String>("effect")
        .context("missing --effect")?;
    let image = ImageSource::from_path(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;

    let url = session.invoke(name, &image, &params(args)).await?;
    println!("{url}");
    if args.get_flag("wait") {
        session.wait_until_ready().await?;
        tracing::info!(%url, "ready");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let Some((command, args)) = matches.subcommand() else {
        bail!("no command given");
    };
    init_tracing(args.get_flag("json-logs"));
    let catalog = load_catalog(args)?;

    match command {
        "effects" => print_effects(&catalog, args.get_flag("json")),
        "compose" => compose(args, &catalog),
        "upload" => upload(args, catalog).await,
        "apply" => apply(args, catalog).await,
        other => bail!("unknown command {other}"),
    }
}
