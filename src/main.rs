use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use ext_uniq::buffer::mem::MemoryLimitedBufferBuilder;
use ext_uniq::{ChunkBufferBuilder, CountError, CountSummary, DistinctCounterBuilder, LineLimitedBufferBuilder};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let input = arg_parser.value_of("input").expect("value has a default");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));

    let result = if let Some(chunk_memory) = arg_parser.value_of("chunk_memory") {
        let limit = chunk_memory.parse::<ByteSize>().expect("value is pre-validated").as_u64();
        count(input, tmp_dir, threads, MemoryLimitedBufferBuilder::new(limit))
    } else {
        let chunk_lines: usize = arg_parser.value_of_t_or_exit("chunk_lines");
        count(input, tmp_dir, threads, LineLimitedBufferBuilder::new(chunk_lines, false))
    };

    match result {
        Ok(summary) => println!("Number of unique IP addresses: {}", summary.unique),
        Err(err) => {
            log::error!("{}", err);
            process::exit(1);
        }
    }
}

fn count<B: ChunkBufferBuilder>(
    input: &str,
    tmp_dir: Option<&str>,
    threads: Option<usize>,
    buffer_builder: B,
) -> Result<CountSummary, CountError> {
    let mut counter_builder = DistinctCounterBuilder::new().with_buffer(buffer_builder);
    if let Some(threads) = threads {
        counter_builder = counter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        counter_builder = counter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let counter = counter_builder.build()?;

    counter.count_file(path::Path::new(input))
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-uniq")
        .about("counts unique IP addresses (or any distinct lines) of files larger than memory")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file with one address per line")
                .takes_value(true)
                .default_value("large_ip_file.txt"),
        )
        .arg(
            clap::Arg::new("chunk_lines")
                .short('c')
                .long("chunk-lines")
                .help("number of lines sorted in memory at once")
                .takes_value(true)
                .default_value("1000000")
                .validator(|v| match v.parse::<usize>() {
                    Ok(0) => Err("Chunk must hold at least one line".to_string()),
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Chunk lines format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("chunk_memory")
                .short('m')
                .long("chunk-memory")
                .help("memory sorted at once, replaces --chunk-lines (e.g. 64MB)")
                .takes_value(true)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(size) if size.as_u64() == 0 => Err("Chunk memory must be positive".to_string()),
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Chunk memory format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store spill files")
                .takes_value(true),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
