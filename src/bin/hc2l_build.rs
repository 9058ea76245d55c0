use clap::Parser;
use hc2l::algo::build_index;
use hc2l::datastr::graph::Graph;
use hc2l::engine::Error;
use hc2l::import::dimacs::read_graph_file;
use hc2l::report::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

/// Build the cut labelling for a graph and persist it.
#[derive(Parser, Debug)]
#[command(name = "hc2l_build")]
struct Args {
    /// input graph in DIMACS `p sp` format
    #[arg(long = "in", value_name = "GRAPH.GR")]
    input: PathBuf,
    /// output index file
    #[arg(long = "out", value_name = "INDEX.BIN")]
    output: PathBuf,
    /// separator balance parameter
    #[arg(long, default_value_t = 0.5)]
    balance: f64,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::from(1);
        }
    };

    let _reporting = enable_reporting("hc2l_build");
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    if !(0.0..1.0).contains(&args.balance) || args.balance == 0.0 {
        return Err(Error::Input(format!("balance must be in (0, 1), got {}", args.balance)));
    }

    let graph = report_time("graph parsing", || read_graph_file(&args.input))?;
    hc2l::report!("graph", { "num_nodes": graph.num_nodes(), "num_edges": graph.num_edges() });

    let index = report_time_with_key("index construction", "construction_time_ms", || build_index(&graph, args.balance));

    let stats = index.stats();
    hc2l::report!("index", {
        "size_bytes": stats.size_bytes,
        "label_count": stats.label_count,
        "height": stats.height,
        "avg_cut_size": stats.avg_cut_size,
        "max_cut_size": stats.max_cut_size,
        "avg_label_size": stats.avg_label_size,
        "num_shortcuts": stats.num_shortcuts,
        "num_folded": stats.num_folded,
    });
    eprintln!("labeling size: {:.2} MB", stats.size_bytes as f64 / (1024.0 * 1024.0));
    eprintln!("shortcuts used: {}", stats.num_shortcuts);

    let file = File::create(&args.output)?;
    let mut writer = BufWriter::new(file);
    index.write_to(&mut writer)?;

    Ok(())
}
