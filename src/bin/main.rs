use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use regex::bytes::Regex;
use tracing::info;

use sip_trace_pcap::{convert, ConvertOptions, ParseOptions, PcapSink};

#[derive(Parser)]
#[command(
    name = "sip-trace-pcap",
    about = "Convert pipe-delimited SIP trace logs into Ethernet pcap captures"
)]
struct Cli {
    /// SIP trace log to convert (- for stdin)
    input: String,

    /// Output pcap file (- for stdout, default: input with .pcap extension)
    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    /// Stamp frames with the conversion time instead of the logged time
    #[arg(long)]
    ignore_timestamps: bool,

    /// Only convert lines matching REGEX
    #[arg(short, long, value_name = "REGEX")]
    grep: Option<String>,

    /// Print a conversion summary to stderr
    #[arg(long)]
    stats: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with_writer(io::stderr)
        .init();
}

/// `trace.log` becomes `trace.pcap`; a name without extension gains one.
fn default_output(input: &str) -> PathBuf {
    Path::new(input).with_extension("pcap")
}

fn open_input(path: &str) -> Box<dyn Read> {
    if path == "-" {
        return Box::new(io::stdin().lock());
    }
    match File::open(path) {
        Ok(f) => Box::new(f),
        Err(e) => {
            eprintln!("{path}: {e}");
            process::exit(1);
        }
    }
}

fn open_output(cli: &Cli) -> (String, Box<dyn Write>) {
    let path = match (&cli.output, cli.input.as_str()) {
        (Some(path), _) => path.clone(),
        (None, "-") => {
            eprintln!("--output is required when reading from stdin");
            process::exit(2);
        }
        (None, input) => default_output(input).to_string_lossy().into_owned(),
    };
    if path == "-" {
        return (path, Box::new(BufWriter::new(io::stdout().lock())));
    }
    match File::create(&path) {
        Ok(f) => (path, Box::new(BufWriter::new(f))),
        Err(e) => {
            eprintln!("{path}: {e}");
            process::exit(1);
        }
    }
}

fn build_options(cli: &Cli) -> ConvertOptions {
    let filter = cli.grep.as_ref().map(|pattern| match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            eprintln!("invalid grep regex '{pattern}': {e}");
            process::exit(2);
        }
    });
    ConvertOptions {
        parse: ParseOptions {
            use_line_timestamps: !cli.ignore_timestamps,
        },
        filter,
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = build_options(&cli);
    let reader = open_input(&cli.input);
    let (output_path, writer) = open_output(&cli);

    let mut sink = match PcapSink::new(writer) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("{output_path}: {e}");
            process::exit(1);
        }
    };

    let result = convert(reader, &mut sink, &options);
    // Keep whatever was written before a failure.
    let flushed = sink.finish();

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("{}: {e}", cli.input);
            process::exit(1);
        }
    };
    if let Err(e) = flushed {
        eprintln!("{output_path}: {e}");
        process::exit(1);
    }

    info!(output = %output_path, "capture written");
    if cli.stats {
        eprintln!("{stats}");
    }
}
