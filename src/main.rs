use std::error::Error;

use clap::Parser;
use depchain::{
    cli::args::{CliArgs, Command},
    model::ModuleRevisionId,
    Depchain, PublishOptions,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = CliArgs::parse();

    let mut depchain = Depchain::builder().module_file_name(&cli_args.module_location);
    if let Some(settings_location) = &cli_args.settings_location {
        depchain = depchain.settings_file_name(settings_location);
    }
    if let Some(cache_directory) = &cli_args.cache_directory {
        depchain = depchain.cache_directory(cache_directory);
    }
    let depchain = depchain.try_build()?;

    match cli_args.cmd {
        Command::Resolve {
            confs,
            module,
            check_modified,
            intransitive,
            no_download,
        } => {
            let defaults = depchain.resolve_options();
            let options = defaults
                .clone()
                .with_confs(confs)
                .with_check_modified(check_modified || defaults.check_modified)
                .with_transitive(!intransitive)
                .with_download(!no_download);
            match module {
                Some(module) => {
                    let module: ModuleRevisionId = module.parse()?;
                    depchain.resolve_module(&module, &options)?;
                }
                None => {
                    depchain.resolve(&options)?;
                }
            }
            Ok(())
        }
        Command::Retrieve {
            confs,
            pattern,
            use_origin,
        } => {
            let options = depchain
                .resolve_options()
                .with_confs(confs)
                .with_use_origin(use_origin);
            depchain.retrieve(&options, pattern)?;
            Ok(())
        }
        Command::Publish {
            artifacts_directory,
            revision,
            status,
            resolver,
            overwrite,
        } => {
            let options = PublishOptions {
                resolver,
                revision,
                status,
                overwrite,
            };
            depchain.publish(artifacts_directory, &options)?;
            Ok(())
        }
        Command::List {
            organisation,
            module,
            resolver,
        } => {
            for entry in depchain.list(resolver.as_deref(), organisation.as_deref(), module.as_deref())? {
                println!("{entry}");
            }
            Ok(())
        }
        Command::ClearCache => depchain.clear_cache(),
    }
}
