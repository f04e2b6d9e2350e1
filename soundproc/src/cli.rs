use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};
use soundproc_core::ConverterRegistry;

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Apply scripted mute, gain, crop and mix edits to WAV files")
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(ConverterRegistry::with_defaults().help())
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("CONFIG")
                .help("Edit script with one converter command per line")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("Replace the output file if it already exists")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Validate the script and print the stages without writing files")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("buffer-samples")
                .long("buffer-samples")
                .value_name("SAMPLES")
                .help("Number of samples processed per read")
                .value_parser(value_parser!(NonZeroUsize)),
        )
        .arg(
            Arg::new("files")
                .value_name("FILES")
                .help("Output file, input file, then extra inputs referenced as $2, $3, ...")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
}
