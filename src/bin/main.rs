//! kmsvm Command Line Interface
//!
//! Inspect the device layouts of a LibSVM dataset and compute kernel
//! columns through the host accelerator.

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use kmsvm::core::{EvaluatorConfig, Result, SVMError};
use kmsvm::{DeviceKernel, Format, HostAccelerator, KernelSpec, LibSVMDataset, SlicedLayout};
use log::{error, info};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kmsvm")]
#[command(about = "SVM kernel evaluation over sliced sparse layouts")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the device layout of a dataset
    Layout(LayoutArgs),
    /// Compute one kernel column on the host accelerator
    Products(ProductsArgs),
}

#[derive(Args)]
struct LayoutOptions {
    /// Evaluator configuration as JSON; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device layout
    #[arg(long, value_enum)]
    format: Option<CliFormat>,

    /// Threads cooperating on one vector
    #[arg(short = 't', long)]
    threads_per_row: Option<usize>,

    /// Vectors per slice
    #[arg(short = 's', long)]
    slice_size: Option<usize>,

    /// Nonzeros per thread per step (SERTILP)
    #[arg(short = 'p', long)]
    prefetch_size: Option<usize>,
}

#[derive(Args)]
struct LayoutArgs {
    /// Dataset in LibSVM format
    #[arg(long)]
    data: PathBuf,

    #[command(flatten)]
    layout: LayoutOptions,
}

#[derive(Args)]
struct ProductsArgs {
    /// Dataset in LibSVM format
    #[arg(long)]
    data: PathBuf,

    /// Kernel function
    #[arg(short, long, value_enum)]
    kernel: CliKernel,

    /// Kernel width for rbf and exp-chi2
    #[arg(short, long, default_value = "1.0")]
    gamma: f32,

    /// Element the column is computed against (0-based)
    #[arg(short, long)]
    index: usize,

    /// Print only the N largest values
    #[arg(long)]
    top: Option<usize>,

    #[command(flatten)]
    layout: LayoutOptions,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliFormat {
    SlicedEllpack,
    Sertilp,
}

impl From<CliFormat> for Format {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::SlicedEllpack => Format::SlicedEllpack,
            CliFormat::Sertilp => Format::Sertilp,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliKernel {
    Linear,
    Rbf,
    Chi2,
    #[value(name = "nchi2")]
    NormChi2,
    ExpChi2,
}

impl CliKernel {
    fn spec(self, gamma: f32) -> KernelSpec {
        match self {
            CliKernel::Linear => KernelSpec::Linear,
            CliKernel::Rbf => KernelSpec::Rbf { gamma },
            CliKernel::Chi2 => KernelSpec::ChiSquared,
            CliKernel::NormChi2 => KernelSpec::NormChiSquared,
            CliKernel::ExpChi2 => KernelSpec::ExpChiSquared { gamma },
        }
    }
}

impl LayoutOptions {
    fn config(&self) -> Result<EvaluatorConfig> {
        let mut config = match &self.config {
            Some(path) => EvaluatorConfig::from_json_file(path)?,
            None => EvaluatorConfig::default(),
        };
        if let Some(format) = self.format {
            config.format = format.into();
        }
        if let Some(t) = self.threads_per_row {
            config.threads_per_row = t;
        }
        if let Some(s) = self.slice_size {
            config.slice_size = s;
        }
        if let Some(p) = self.prefetch_size {
            config.prefetch_size = p;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Layout(args) => layout_command(args),
        Commands::Products(args) => products_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn layout_command(args: LayoutArgs) -> Result<()> {
    let config = args.layout.config()?;
    info!("Loading data from: {:?}", args.data);
    let dataset = LibSVMDataset::from_file(&args.data)?;

    let layout = SlicedLayout::build(
        dataset.problem().elements(),
        config.format,
        config.threads_per_row,
        config.slice_size,
        config.prefetch_size,
    )?;
    let stats = layout.stats();

    println!("Layout:          {}", layout.format());
    println!("Vectors:         {}", stats.vectors);
    println!("Dimension:       {}", dataset.dim());
    println!("Threads per row: {}", layout.threads_per_row());
    println!("Slice size:      {}", layout.slice_size());
    if layout.format() == Format::Sertilp {
        println!("Prefetch size:   {}", layout.prefetch_size());
    }
    println!("Slices:          {}", stats.slices);
    println!("Nonzeros:        {}", stats.nonzeros);
    println!("Stored entries:  {}", stats.stored);
    println!("Padding ratio:   {:.4}", stats.padding_ratio());
    println!("Block align:     {}", layout.align());

    Ok(())
}

fn products_command(args: ProductsArgs) -> Result<()> {
    let config = args.layout.config()?;
    let spec = args.kernel.spec(args.gamma);
    info!("Loading data from: {:?}", args.data);
    let problem = Arc::new(LibSVMDataset::from_file(&args.data)?.into_problem());

    if args.index >= problem.len() {
        return Err(SVMError::IndexOutOfRange {
            index: args.index,
            len: problem.len(),
        });
    }

    let mut kernel =
        DeviceKernel::init(problem, spec, &config, Arc::new(HostAccelerator::new()))?;
    let column = kernel.products_for(args.index)?;

    let mut rows: Vec<(usize, f32)> = column.iter().copied().enumerate().collect();
    if let Some(top) = args.top {
        rows.sort_by(|a, b| b.1.total_cmp(&a.1));
        rows.truncate(top);
    }

    println!("# {} against element {}", spec, args.index);
    for (i, value) in rows {
        println!("{} {:.6}", i, value);
    }

    Ok(())
}
