use clap::Parser;

/// Dependency resolution over chains of module repositories.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Location of the module descriptor, relative to the current directory
    #[clap(short, long, default_value = "module.toml")]
    pub module_location: String,
    /// Resolver settings; a single file system repository under
    /// `repository/` when absent
    #[clap(short, long)]
    pub settings_location: Option<String>,
    /// Location of the repository cache [default: $HOME/.depchain/cache]
    #[clap(short, long)]
    pub cache_directory: Option<String>,
}

#[derive(Debug, Parser)]
pub enum Command {
    ///Resolves the dependencies of the module descriptor
    Resolve {
        /// Configurations to resolve, `*` for every public one
        #[clap(short = 'C', long, value_delimiter = ',', default_value = "*")]
        confs: Vec<String>,
        /// Resolve this module (`org#name;revision`) instead of the descriptor
        #[clap(long)]
        module: Option<String>,
        /// Ask repositories whether cached descriptors changed
        #[clap(long)]
        check_modified: bool,
        /// Only resolve direct dependencies
        #[clap(long)]
        intransitive: bool,
        /// Resolve the graph without downloading artifacts
        #[clap(long)]
        no_download: bool,
    },
    ///Resolves, then copies artifacts into the project
    Retrieve {
        #[clap(short = 'C', long, value_delimiter = ',', default_value = "*")]
        confs: Vec<String>,
        /// Destination of each artifact, relative to the current directory
        #[clap(short, long, default_value = crate::retrieve::DEFAULT_RETRIEVE_PATTERN)]
        pattern: String,
        /// Point the cache at local repository files instead of copying them
        #[clap(long)]
        use_origin: bool,
    },
    ///Publishes the module's artifacts to a repository
    Publish {
        /// Directory holding the artifacts to publish
        #[clap(default_value = "build")]
        artifacts_directory: String,
        /// Revision to publish, overriding the descriptor's
        #[clap(short, long)]
        revision: Option<String>,
        /// Status to publish with
        #[clap(long)]
        status: Option<String>,
        /// Target resolver [default: the settings' default resolver]
        #[clap(long, env = "DEPCHAIN_PUBLISH_RESOLVER")]
        resolver: Option<String>,
        #[clap(long)]
        overwrite: bool,
    },
    ///Lists organisations, modules of an organisation, or revisions of a module
    List {
        organisation: Option<String>,
        module: Option<String>,
        #[clap(long)]
        resolver: Option<String>,
    },
    ///Clears the repository cache
    ClearCache,
}
