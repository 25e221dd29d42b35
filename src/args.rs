use clap::Parser;

#[derive(Parser, Clone)]
#[command(
    display_name = "pairrank",
    long_about = "Runs a simulated pairwise ranking session against a synthetic catalog"
)]
pub struct Args {
    /// Number of entities in the synthetic catalog
    #[arg(short, long, default_value_t = 200)]
    pub entities: usize,

    /// Number of comparisons to simulate
    #[arg(short, long, default_value_t = 500)]
    pub comparisons: u32,

    /// Comparison group size (2 or 3)
    #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(2..=3))]
    pub group_size: u8,

    /// RNG seed; the run is fully reproducible for a given seed
    #[arg(short, long, default_value_t = 42)]
    pub seed: u64,

    /// Active tier size (top-N)
    #[arg(short, long, default_value_t = 40)]
    pub tier_size: u32,

    /// Directory for persisted session state. Omit to run in memory only
    #[arg(short, long)]
    pub data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "RUST_LOG",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
        help = "Sets the logging verbosity"
    )]
    pub log_level: String
}
