use clap::Parser;
use hc2l::algo::contraction_index::ContractionIndex;
use hc2l::datastr::graph::INFINITY;
use hc2l::engine::Error;
use hc2l::import::csv::read_od_pairs;
use hc2l::report::*;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

/// Run origin-destination queries against a persisted index.
#[derive(Parser, Debug)]
#[command(name = "hc2l_query_od")]
struct Args {
    /// persisted index file produced by hc2l_build
    #[arg(long, value_name = "INDEX.BIN")]
    index: PathBuf,
    /// CSV with `source,target` pairs (header required)
    #[arg(long, value_name = "OD_PAIRS.CSV")]
    od: PathBuf,
    /// result file
    #[arg(long, value_name = "RESULTS.CSV", default_value = "results.csv")]
    out: PathBuf,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::from(1);
        }
    };

    let _reporting = enable_reporting("hc2l_query_od");
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    let file = File::open(&args.index)?;
    let index = ContractionIndex::read_from(&mut BufReader::new(file))?;
    let num_nodes = index.num_nodes();
    eprintln!("index loaded, max valid node id: {}", num_nodes);

    let pairs = read_od_pairs(&args.od)?;
    eprintln!("loaded {} od pairs", pairs.len());
    hc2l::report!("num_queries", pairs.len());

    let mut writer = csv::Writer::from_path(&args.out).map_err(|e| Error::Input(e.to_string()))?;
    writer
        .write_record(["source", "target", "distance", "time_microseconds", "disconnected"])
        .map_err(|e| Error::Input(e.to_string()))?;

    let mut total_micros: u128 = 0;
    let mut disconnected_count = 0usize;
    let (result, loop_time) = measure(|| -> Result<(), Error> {
        let mut queries_ctx = push_collection_context("queries");
        for &(source, target) in &pairs {
            let valid = source != 0 && target != 0 && source as usize <= num_nodes && target as usize <= num_nodes;
            let timer = Timer::new();
            let distance = if valid { index.distance(source, target) } else { INFINITY };
            let micros = timer.get_passed_micros();
            total_micros += micros;

            let disconnected = distance >= INFINITY;
            if disconnected {
                disconnected_count += 1;
            }

            {
                let _query_ctx = queries_ctx.push_collection_item();
                hc2l::report!("source", source);
                hc2l::report!("target", target);
                hc2l::report!("distance", if disconnected { -1 } else { distance as i64 });
                hc2l::report!("micros", micros as u64);
            }

            let distance_field = if disconnected { "-1".to_string() } else { distance.to_string() };
            writer
                .write_record([
                    source.to_string(),
                    target.to_string(),
                    distance_field,
                    micros.to_string(),
                    disconnected.to_string(),
                ])
                .map_err(|e| Error::Input(e.to_string()))?;
        }
        Ok(())
    });
    result?;
    hc2l::report!("running_time_ms", loop_time.as_secs_f64() * 1000.0);
    writer.flush()?;

    if !pairs.is_empty() {
        let avg_micros = total_micros as f64 / pairs.len() as f64;
        hc2l::report!("avg_query_micros", avg_micros);
        hc2l::report!("disconnected_pairs", disconnected_count);
        eprintln!("queried {} od pairs, avg {:.2}us", pairs.len(), avg_micros);
    }

    Ok(())
}
