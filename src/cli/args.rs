// src/cli/args.rs

use clap::Args;
use std::path::PathBuf;

/// Flags shared by every command working on a source/build directory pair.
#[derive(Args, Debug, Default, Clone)]
pub struct ProjectArgs {
    /// The project's source directory (the one holding the top-level meson.build).
    #[arg(long, short = 's', default_value = ".")]
    pub source_dir: PathBuf,

    /// The build directory. Defaults to `<source-dir>/build`.
    #[arg(long, short = 'b')]
    pub build_dir: Option<PathBuf>,

    /// plain, debug, debugoptimized, release, minsize or custom.
    #[arg(long, default_value = "debug")]
    pub buildtype: String,

    /// Extra arguments for `meson setup`/`configure`, as one shell-quoted string.
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub params: String,

    /// Machine file handed to Meson as `--native-file`.
    #[arg(long)]
    pub native_file: Option<PathBuf>,
}
