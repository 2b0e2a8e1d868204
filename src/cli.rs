//! CLI argument parsing for box creation and retention.
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "boxman",
    version,
    about = "Create and manage customised versions of standard Vagrant boxes",
    after_help = "Examples:\n  boxman create ubuntu/trusty64 base.sh acme/trusty64 3f2c1ab\n  boxman prune acme/trusty64 3\n  boxman list acme/trusty64 --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// JSON config file (defaults to $BOXMAN_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding boxes/ and build_templates/
    #[arg(long, global = true, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// URL prefix under which boxes/ is served
    #[arg(long, global = true, value_name = "URL")]
    pub public_url: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Create(CreateArgs),
    Prune(PruneArgs),
    List(ListArgs),
}

#[derive(Parser, Debug)]
#[command(
    about = "Create/update a box",
    long_about = "Create a Vagrant box from an existing standard box with the specified \
                  provisioning script applied. Also create/update a JSON file describing \
                  the box version, suitable for use with 'vagrant box add'."
)]
pub struct CreateArgs {
    /// Source box on which to base the new box (e.g. ubuntu/precise64)
    pub source_box: String,

    /// Provisioning script applied to the source box (must exist in build_templates/)
    pub provision_script: String,

    /// Name of the box that will be created (e.g. foocorp/precise64)
    pub target_box: String,

    /// Unique identifier for the created box (e.g. a commit hash)
    pub box_id: String,

    /// Emit the create report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Prune all but the latest n versions of a box")]
pub struct PruneArgs {
    /// Name of the box to prune (e.g. foocorp/precise64)
    #[arg(value_name = "BOX")]
    pub target_box: String,

    /// Number of most recent versions to keep
    pub n: usize,

    /// Emit the prune report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "List published versions of a box and any store drift")]
pub struct ListArgs {
    /// Name of the box to list (e.g. foocorp/precise64)
    #[arg(value_name = "BOX")]
    pub target_box: String,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
