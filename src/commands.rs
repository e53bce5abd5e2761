//! Subcommands of the `tick-array` binary
//!
//! Each command returns its report as a string for the caller to print.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::cli::{Command, Distribution, GenArgs};
use crate::lang::ArrayResult;
use crate::object::{
    Array, Array2d, DType, Dense, Element, SharedArray, SharedArray2d, SharedSparseArray,
    SharedSparseArray2d, SparseArray, SparseArray2d, checked_len, to_index,
};
use crate::parallel::Pool;
use crate::serialize::{self, Kind, RecordInfo};
use crate::session::Session;

/// Number of per-row values printed before eliding the rest
const MAX_ROWS_SHOWN: usize = 8;

/// Call a function generic over the element type with the type `$dtype`
/// names
macro_rules! with_dtype {
    ( $dtype:expr, $f:ident ( $( $arg:expr ),* ) ) => {
        match $dtype {
            DType::F64 => $f::<f64>( $( $arg ),* ),
            DType::F32 => $f::<f32>( $( $arg ),* ),
            DType::I64 => $f::<i64>( $( $arg ),* ),
            DType::U64 => $f::<u64>( $( $arg ),* ),
            DType::I32 => $f::<i32>( $( $arg ),* ),
            DType::U32 => $f::<u32>( $( $arg ),* ),
            DType::I16 => $f::<i16>( $( $arg ),* ),
            DType::U16 => $f::<u16>( $( $arg ),* ),
        }
    };
}

pub fn run(session: &Session, command: &Command) -> ArrayResult<String> {
    match command {
        Command::Inspect { file } => inspect(file),
        Command::Gen(args) => generate(args),
        Command::Stats { file } => stats(session, file),
    }
}

pub fn inspect(path: &Path) -> ArrayResult<String> {
    let bytes = std::fs::read(path)?;
    Ok(serialize::inspect(&bytes)?.to_string())
}

pub fn generate(args: &GenArgs) -> ArrayResult<String> {
    if !(0.0..=1.0).contains(&args.density) {
        return err!(format!("density must be within [0, 1], got {}", args.density));
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let bytes = with_dtype!(args.dtype, generate_record(args, &mut rng))?;
    std::fs::write(&args.output, &bytes)?;

    let info = serialize::inspect(&bytes)?;
    log::info!("generated {info}");
    Ok(format!("wrote {info} to {}", args.output.display()))
}

fn sample<T: Element>(dist: Distribution, rng: &mut StdRng) -> T {
    let x: f64 = match dist {
        Distribution::Uniform => rng.gen(),
        Distribution::Normal => rng.sample(StandardNormal),
    };
    if T::DTYPE.is_float() {
        T::from_f64(x)
    } else {
        T::from_f64(x * 100.0)
    }
}

fn generate_record<T: Element>(args: &GenArgs, rng: &mut StdRng) -> ArrayResult<Vec<u8>> {
    let bytes = match args.kind {
        Kind::Dense1d => {
            let x: Array<T> = (0..args.rows).map(|_| sample(args.dist, rng)).collect();
            serialize::serialize(&x)
        }
        Kind::Dense2d => {
            let data = (0..checked_len(args.rows, args.cols)?)
                .map(|_| sample(args.dist, rng))
                .collect();
            serialize::serialize(&Array2d::<T>::from_vec(args.rows, args.cols, data)?)
        }
        Kind::Sparse1d => {
            let mut indices = vec![];
            let mut values = vec![];
            for j in 0..args.rows {
                if rng.gen_bool(args.density) {
                    indices.push(to_index(j)?);
                    values.push(sample::<T>(args.dist, rng));
                }
            }
            serialize::serialize(&SparseArray::new(args.rows, indices, values)?)
        }
        Kind::Sparse2d => {
            let mut triplets = vec![];
            for i in 0..args.rows {
                for j in 0..args.cols {
                    if rng.gen_bool(args.density) {
                        triplets.push((i, j, sample(args.dist, rng)));
                    }
                }
            }
            serialize::serialize(&SparseArray2d::<T>::from_triplets(
                args.rows, args.cols, &triplets,
            )?)
        }
    };
    Ok(bytes)
}

pub fn stats(session: &Session, path: &Path) -> ArrayResult<String> {
    let bytes = std::fs::read(path)?;
    let info = serialize::inspect(&bytes)?;
    let pool = session.pool();

    let stats = match info.kind {
        Kind::Dense1d => with_dtype!(info.dtype, dense1d_stats(&bytes)),
        Kind::Dense2d => with_dtype!(info.dtype, dense2d_stats(&bytes, &pool)),
        Kind::Sparse1d => with_dtype!(info.dtype, sparse1d_stats(&bytes)),
        Kind::Sparse2d => with_dtype!(info.dtype, sparse2d_stats(&bytes, &pool)),
    }?;

    Ok(report(&info, &stats))
}

/// Named values printed after the record description
type Stats = Vec<(&'static str, String)>;

fn summary<T: Element, D: Dense<T>>(x: &D) -> Stats {
    vec![
        ("sum", x.sum().to_string()),
        ("abs_sum", x.abs_sum().to_string()),
        ("norm_sq", x.norm_sq().to_string()),
    ]
}

fn dense1d_stats<T: Element>(bytes: &[u8]) -> ArrayResult<Stats> {
    let x: SharedArray<T> = serialize::deserialize(bytes)?;
    Ok(summary(&x))
}

fn dense2d_stats<T: Element>(bytes: &[u8], pool: &Pool) -> ArrayResult<Stats> {
    let x: SharedArray2d<T> = serialize::deserialize(bytes)?;
    let row_sums = pool.map_array(x.n_rows(), |i| Ok(x.view_row(i)?.sum()))?;

    let mut stats = summary(&x);
    stats.push(("row_sums", preview(&row_sums)));
    Ok(stats)
}

fn sparse1d_stats<T: Element>(bytes: &[u8]) -> ArrayResult<Stats> {
    let x: SharedSparseArray<T> = serialize::deserialize(bytes)?;
    Ok(summary(x.values()))
}

fn sparse2d_stats<T: Element>(bytes: &[u8], pool: &Pool) -> ArrayResult<Stats> {
    let x: SharedSparseArray2d<T> = serialize::deserialize(bytes)?;
    let row_sums = pool.map_array(x.n_rows(), |i| Ok(x.view_row(i)?.values().sum()))?;

    let mut stats = summary(x.values());
    stats.push(("row_sums", preview(&row_sums)));
    Ok(stats)
}

fn preview<T: Element>(x: &SharedArray<T>) -> String {
    x.with_slice(|x| {
        let mut shown: Vec<String> = x.iter().take(MAX_ROWS_SHOWN).map(|v| v.to_string()).collect();
        if x.len() > MAX_ROWS_SHOWN {
            shown.push(format!("... {} more", x.len() - MAX_ROWS_SHOWN));
        }
        format!("[{}]", shown.join(", "))
    })
}

fn report(info: &RecordInfo, stats: &Stats) -> String {
    std::iter::once(info.to_string())
        .chain(stats.iter().map(|(name, value)| format!("{name:<9}{value}")))
        .collect::<Vec<_>>()
        .join("\n")
}
