use std::path::PathBuf;

use crate::object::DType;
use crate::ops::BackendKind;
use crate::serialize::Kind;

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "tick-array", version, about)]
pub struct Cli {
    /// Vector backend for numeric kernels [naive, unrolled]
    #[arg(short, long)]
    pub backend: Option<BackendKind>,

    /// Worker threads for parallel work, 0 for one per core
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Log more, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, clap::Subcommand)]
pub enum Command {
    /// Print the kind, element type and shape of a record
    Inspect { file: PathBuf },

    /// Write a record filled with random values
    Gen(GenArgs),

    /// Print summary statistics of a record
    Stats { file: PathBuf },
}

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct GenArgs {
    /// Record kind [dense1d, dense2d, sparse1d, sparse2d]
    #[arg(long, default_value_t = Kind::Dense1d)]
    pub kind: Kind,

    /// Number of rows, or the size of a 1D record
    #[arg(long, default_value_t = 10)]
    pub rows: usize,

    /// Number of columns, ignored for 1D records
    #[arg(long, default_value_t = 10)]
    pub cols: usize,

    /// Fraction of entries stored in a sparse record
    #[arg(long, default_value_t = 0.1)]
    pub density: f64,

    /// Distribution of values [uniform, normal]; integer types scale by 100
    #[arg(long, default_value_t = Distribution::Uniform)]
    pub dist: Distribution,

    /// Element type
    #[arg(long, default_value_t = DType::F64)]
    pub dtype: DType,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Distribution {
    #[default]
    Uniform,
    Normal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_global_options_and_gen() {
        let cli = Cli::try_parse_from([
            "tick-array", "-vv", "--backend", "unrolled", "--threads", "3", "gen", "--kind",
            "sparse2d", "--dtype", "f32", "--dist", "normal", "-o", "out.bin",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.backend, Some(BackendKind::Unrolled));
        assert_eq!(cli.threads, 3);
        match cli.command {
            Command::Gen(args) => {
                assert_eq!(args.kind, Kind::Sparse2d);
                assert_eq!(args.dtype, DType::F32);
                assert_eq!(args.dist, Distribution::Normal);
                assert_eq!(args.rows, 10);
                assert_eq!(args.output, PathBuf::from("out.bin"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_values() {
        assert!(Cli::try_parse_from(["tick-array", "--backend", "mkl", "stats", "x"]).is_err());
        assert!(Cli::try_parse_from(["tick-array", "gen", "--dtype", "f16", "-o", "x"]).is_err());
    }
}
