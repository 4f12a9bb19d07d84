use std::io::{self, Write};

use clap::{CommandFactory, Parser};
use ocidist::{
    cli::{effective_platform, AnsiStyles, LayoutSubcommand, OcidistArgs, OcidistSubcommand},
    management::{self, MergeImageConfig},
    merge::{DuplicatePolicy, MergeOptions},
    utils, OcidistResult,
};
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> OcidistResult<()> {
    dotenvy::dotenv().ok();

    let args = OcidistArgs::parse();

    // Logs go to stderr so a tar written to stdout stays intact.
    let default_level = if args.verbose { "debug" } else { "info" };
    fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match args.subcommand {
        Some(OcidistSubcommand::Merge {
            name,
            path,
            target,
            platform,
            arch,
            last_wins,
            verify,
        }) => {
            target.ensure_not_terminal(utils::is_stdout_terminal())?;
            let platform = effective_platform(platform, arch);
            tracing::trace!("merging image: name={name}, path={path:?}, target={target}, platform={platform}, last_wins={last_wins}, verify={verify}");

            let policy = if last_wins {
                DuplicatePolicy::LastWins
            } else {
                DuplicatePolicy::Union
            };

            let config = MergeImageConfig::builder()
                .layout(path)
                .name(name)
                .platform(platform)
                .target(target)
                .options(MergeOptions::builder().duplicate_policy(policy).build())
                .verify(verify)
                .build();

            let summary =
                management::merge_image_interruptible(config, tokio::signal::ctrl_c()).await?;

            tracing::debug!("merge summary: {summary:?}");
        }
        Some(OcidistSubcommand::Layout(LayoutSubcommand::Init { path })) => {
            tracing::trace!("initializing layout: path={path:?}");
            let layout = management::init_layout(path).await?;
            eprintln!(
                "{} {}",
                "initialized".valid(),
                layout.get_root().display().to_string().literal()
            );
        }
        Some(OcidistSubcommand::Layout(LayoutSubcommand::List { path })) => {
            tracing::trace!("listing layout: path={path:?}");
            let entries = management::list_layout(path).await?;
            let mut stdout = io::stdout().lock();
            for entry in entries {
                writeln!(stdout, "{entry}")?;
            }
        }
        Some(OcidistSubcommand::Manifest {
            name,
            path,
            platform,
            format,
            hash,
        }) => {
            let platform = platform.unwrap_or_default();
            tracing::trace!("inspecting manifest: name={name}, path={path:?}, platform={platform}");
            let manifest = management::inspect_manifest(path, name, platform).await?;

            let mut stdout = io::stdout().lock();
            if hash {
                writeln!(stdout, "{}", manifest.descriptor.digest())?;
            }
            writeln!(stdout, "{}", manifest.render(format)?)?;
        }
        Some(OcidistSubcommand::Config {
            name,
            path,
            platform,
        }) => {
            let platform = platform.unwrap_or_default();
            tracing::trace!("inspecting config: name={name}, path={path:?}, platform={platform}");
            let config = management::inspect_config(path, name, platform).await?;
            writeln!(io::stdout().lock(), "{}", config.render(true)?)?;
        }
        Some(OcidistSubcommand::Blob {
            digest,
            path,
            target,
        }) => {
            target.ensure_not_terminal(utils::is_stdout_terminal())?;
            tracing::trace!("copying blob: digest={digest}, path={path:?}, target={target}");
            management::copy_blob(path, digest, target).await?;
        }
        None => {
            OcidistArgs::command().print_help()?;
        }
    }

    Ok(())
}
