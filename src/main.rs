use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

mod error;
mod events;
mod expr;
mod files;
mod model;
mod render;
mod spec;

use events::NdjsonLoader;
use events::kinematics::DIMUON_MASS_FIELD;
use files::{DEFAULT_CACHE_DIR, FileResolver, GLOBAL_REDIRECTOR, StorageConfig};
use model::{Binning, Histogram2DRequest, HistogramRequest, LoadContext, ParseOptions, Tree};
use render::{ComparisonPlot, PlotStyle};

pub type Result<T> = anyhow::Result<T>;

/// Opposite-sign dimuon preselection.
const DIMUON_CUT: &str = "nMuon > 1 && Muon_charge[0]*Muon_charge[1] < 0.0";

#[derive(Parser)]
#[command(name = "galapago")]
#[command(about = "NanoAOD sample bookkeeping, weighting and histogramming", long_about = None)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    cmd: Commands,
}

/// Options shared by every command that builds sample trees.
#[derive(clap::Args)]
struct TreeArgs {
    /// Sample definitions file.
    #[arg(long, default_value = "dat/Samples_DAS_Muon_Run3.dat")]
    dat: PathBuf,

    /// Test mode: only read `--nfiles` files per sample.
    #[arg(long)]
    test: bool,

    #[arg(long, default_value_t = 1)]
    nfiles: usize,

    /// Derived-variable definitions (JSON).
    #[arg(long)]
    definitions: Option<PathBuf>,

    /// Directory for cached catalog answers.
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Redirector for catalog and /store/ files.
    #[arg(long, default_value = GLOBAL_REDIRECTOR)]
    redirector: String,

    /// Fail on malformed definition lines instead of skipping them.
    #[arg(long)]
    strict: bool,

    /// Data samples to use (default: every data sample).
    #[arg(long = "data-sample")]
    data_samples: Vec<String>,

    /// Simulated samples to use (default: every simulated sample).
    #[arg(long = "mc-sample")]
    mc_samples: Vec<String>,

    /// Add the dimuon invariant mass field before selecting.
    #[arg(long)]
    dimuon: bool,
}

/// Rendering switches of the comparison commands.
#[derive(clap::Args)]
struct ReportArgs {
    /// Integrated luminosity (fb^-1).
    #[arg(long, default_value_t = 35.9)]
    lumi: f64,

    #[arg(short = 'o', long, default_value = "plots")]
    output: PathBuf,

    /// Year shown in the plot header.
    #[arg(long, default_value = "2024")]
    year: String,

    /// Show the ratio panel (default).
    #[arg(long, overrides_with = "no_ratio")]
    ratio: bool,

    /// Hide the ratio panel.
    #[arg(long, overrides_with = "ratio")]
    no_ratio: bool,

    /// Logarithmic y axis.
    #[arg(long)]
    log_y: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Dimuon mass data/simulation comparison.
    Harvest {
        #[command(flatten)]
        trees: TreeArgs,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Data/simulation comparison of any variable.
    Histogram {
        #[command(flatten)]
        trees: TreeArgs,

        #[command(flatten)]
        report: ReportArgs,

        /// Variable expression to histogram.
        #[arg(long)]
        var: String,

        /// Histogram and output file name (default: the variable).
        #[arg(long)]
        name: Option<String>,

        /// Axis label (default: the variable).
        #[arg(long)]
        x_label: Option<String>,

        #[arg(long, default_value_t = 50)]
        bins: usize,

        #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
        range: Vec<f64>,

        /// Variable bin edges, comma separated; replaces --bins/--range.
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        edges: Vec<f64>,

        /// Selection applied to every sample; repeat to AND several.
        #[arg(long)]
        cut: Vec<String>,

        /// Per-event weight expression replacing the normalized weight.
        #[arg(long)]
        weight: Option<String>,
    },

    /// Two variables against each other, per tree, dumped as JSON.
    Histogram2d {
        #[command(flatten)]
        trees: TreeArgs,

        #[arg(long, default_value_t = 35.9)]
        lumi: f64,

        #[arg(short = 'o', long, default_value = "plots")]
        output: PathBuf,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        x: String,

        #[arg(long, default_value_t = 50)]
        x_bins: usize,

        #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
        x_range: Vec<f64>,

        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        x_edges: Vec<f64>,

        #[arg(long)]
        y: String,

        #[arg(long, default_value_t = 50)]
        y_bins: usize,

        #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
        y_range: Vec<f64>,

        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        y_edges: Vec<f64>,

        #[arg(long)]
        cut: Vec<String>,

        #[arg(long)]
        weight: Option<String>,
    },

    /// Per-block yield table for the data and simulation trees.
    Yields {
        #[command(flatten)]
        trees: TreeArgs,

        #[arg(long, default_value_t = 35.9)]
        lumi: f64,

        /// Selection applied to every sample; repeat to AND several.
        #[arg(long)]
        cut: Vec<String>,

        /// Also print each total with one cut removed at a time.
        #[arg(long)]
        n_minus_one: bool,
    },

    /// Describe the samples of a definitions file.
    Info {
        #[command(flatten)]
        trees: TreeArgs,
    },

    /// Print the files a locator resolves to.
    Resolve {
        locator: String,

        /// Maximum number of files (0 = all).
        #[arg(long, default_value_t = 0)]
        limit: usize,

        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,

        #[arg(long, default_value = GLOBAL_REDIRECTOR)]
        redirector: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Commands::Harvest { mut trees, report } => {
            trees.dimuon = true;
            let resolver = trees.resolver();
            let (data, mc) = trees.load_comparison(&trees.context(&resolver))?;

            println!("Dat file:    {}", trees.dat.display());
            println!("Luminosity:  {} fb^-1", report.lumi);
            println!("Output:      {}", report.output.display());
            println!("Test mode:   {}", trees.test);

            let request = HistogramRequest::new(
                DIMUON_MASS_FIELD,
                DIMUON_MASS_FIELD,
                Binning::regular(100, 40.0, 150.0)?,
            )
            .with_cut(DIMUON_CUT);
            println!("\nYields in mass window [40, 150] GeV:");
            let style = PlotStyle {
                title: "Dimuon mass".to_string(),
                x_label: "Dimuon mass (GeV)".to_string(),
                y_label: "Events / bin".to_string(),
                ..report.style()
            };
            compare(&data, &mc, &request, &report, &style)?;
        }

        Commands::Histogram {
            trees,
            report,
            var,
            name,
            x_label,
            bins,
            range,
            edges,
            cut,
            weight,
        } => {
            let resolver = trees.resolver();
            let (mut data, mut mc) = trees.load_comparison(&trees.context(&resolver))?;
            for tree in [&mut data, &mut mc] {
                for c in &cut {
                    tree.set_selection(c);
                }
            }

            let name = name.unwrap_or_else(|| file_stem(&var));
            let mut request = HistogramRequest::new(&name, &var, binning(bins, &range, &edges)?);
            if let Some(w) = weight {
                request = request.with_weight(w);
            }
            println!("Yields of {}:", var);
            let style = PlotStyle {
                title: name.clone(),
                x_label: x_label.unwrap_or_else(|| var.clone()),
                ..report.style()
            };
            compare(&data, &mc, &request, &report, &style)?;
        }

        Commands::Histogram2d {
            trees,
            lumi,
            output,
            name,
            x,
            x_bins,
            x_range,
            x_edges,
            y,
            y_bins,
            y_range,
            y_edges,
            cut,
            weight,
        } => {
            let resolver = trees.resolver();
            let ctx = trees.context(&resolver);
            let name = name.unwrap_or_else(|| format!("{}_vs_{}", file_stem(&y), file_stem(&x)));
            let mut request = Histogram2DRequest::new(
                &name,
                &x,
                binning(x_bins, &x_range, &x_edges).context("x binning")?,
                &y,
                binning(y_bins, &y_range, &y_edges).context("y binning")?,
            );
            if !cut.is_empty() {
                let joined = cut.iter().map(|c| format!("({})", c)).collect::<Vec<_>>();
                request = request.with_cut(joined.join(" && "));
            }
            if let Some(w) = weight {
                request = request.with_weight(w);
            }

            println!("{} vs {}:", y, x);
            let mut histograms = Vec::new();
            for (tree_name, is_data, names) in trees.split()? {
                let tree = trees.load(tree_name, is_data, names, &ctx)?;
                let h = tree.histogram_2d(&request, lumi)?;
                let total = h.total();
                println!(
                    "  {:<6} {:>14.3} +- {:<12.3} {} entries",
                    h.label(),
                    total.value(),
                    total.uncertainty(),
                    h.entries()
                );
                if let Some((i, j)) = h.peak() {
                    let (xe, ye) = (h.x_edges(), h.y_edges());
                    println!(
                        "         peak [{}, {}) x [{}, {}): {:.3} +- {:.3}",
                        xe[i],
                        xe[i + 1],
                        ye[j],
                        ye[j + 1],
                        h.content(i, j),
                        h.error(i, j)
                    );
                }
                histograms.push(h);
            }
            let path = render::write_histograms_2d(&output, &name, &histograms)
                .with_context(|| format!("write {} to {}", name, output.display()))?;
            println!("Wrote {}", path.display());
        }

        Commands::Yields {
            trees,
            lumi,
            cut,
            n_minus_one,
        } => {
            let resolver = trees.resolver();
            let ctx = trees.context(&resolver);

            for (name, is_data, names) in trees.split()? {
                let mut tree = trees.load(name, is_data, names, &ctx)?;
                println!("{}", name);

                if n_minus_one && cut.len() > 1 {
                    for (skip, dropped) in cut.iter().enumerate() {
                        tree.clear_selections();
                        for (i, c) in cut.iter().enumerate() {
                            if i != skip {
                                tree.set_selection(c);
                            }
                        }
                        let y = tree.event_yield(lumi)?;
                        println!("  without {:<32} {:>14.3} +- {:<12.3}", dropped, y.value(), y.uncertainty());
                    }
                    tree.clear_selections();
                }

                for c in &cut {
                    tree.set_selection(c);
                }
                for (block, y) in tree.block_yields(lumi)? {
                    println!("  {:<24} {:>14.3} +- {:<12.3}", block, y.value(), y.uncertainty());
                }
                let total = tree.event_yield(lumi)?;
                println!("  {:<24} {:>14.3} +- {:<12.3}", "total", total.value(), total.uncertainty());
            }
        }

        Commands::Info { trees } => {
            let resolver = trees.resolver();
            let ctx = trees.context(&resolver);
            for (name, is_data, names) in trees.split()? {
                let tree = trees.load(name, is_data, names, &ctx)?;
                print!("{}", tree.summary());
            }
        }

        Commands::Resolve {
            locator,
            limit,
            cache_dir,
            redirector,
        } => {
            let resolver = FileResolver::new(&cache_dir).with_storage(StorageConfig::with_redirector(&redirector));
            let files = resolver
                .resolve(&locator, limit)
                .with_context(|| format!("resolve {}", locator))?;
            for file in files {
                println!("{}", file);
            }
        }
    }

    Ok(())
}

impl TreeArgs {
    fn resolver(&self) -> FileResolver {
        FileResolver::new(&self.cache_dir).with_storage(StorageConfig::with_redirector(&self.redirector))
    }

    fn context<'a>(&self, resolver: &'a FileResolver) -> LoadContext<'a> {
        LoadContext {
            resolver,
            loader: &NdjsonLoader,
            file_limit: if self.test { self.nfiles } else { 0 },
        }
    }

    /// The DATA and MC trees to build, skipping one with no samples.
    fn split(&self) -> Result<Vec<(&'static str, bool, Vec<String>)>> {
        let (data, mc) = sample_names(&self.dat, self.data_samples.clone(), self.mc_samples.clone())?;
        Ok([("DATA", true, data), ("MC", false, mc)]
            .into_iter()
            .filter(|(_, _, names)| !names.is_empty())
            .collect())
    }

    /// Parse one tree, then add the derived fields requested on the
    /// command line.
    fn load(&self, name: &str, is_data: bool, only: Vec<String>, ctx: &LoadContext<'_>) -> Result<Tree> {
        let options = ParseOptions {
            strict: self.strict,
            only,
        };
        let mut tree = Tree::parse(&self.dat, name, is_data, ctx, &options)
            .with_context(|| format!("build tree {} from {}", name, self.dat.display()))?;
        info!(tree = name, blocks = tree.blocks().len(), "loaded");

        if self.dimuon {
            tree.define_dimuon_mass()
                .with_context(|| format!("compute {} for tree {}", DIMUON_MASS_FIELD, name))?;
        }
        if let Some(path) = &self.definitions {
            let config = spec::VariableConfig::load(path)
                .with_context(|| format!("read definitions {}", path.display()))?;
            tree.set_definitions(&config)
                .with_context(|| format!("apply definitions {} to tree {}", path.display(), name))?;
        }
        debug!("\n{}", tree.summary());
        Ok(tree)
    }

    /// Both trees; comparisons need at least one sample on each side.
    fn load_comparison(&self, ctx: &LoadContext<'_>) -> Result<(Tree, Tree)> {
        let (data, mc) = sample_names(&self.dat, self.data_samples.clone(), self.mc_samples.clone())?;
        if data.is_empty() || mc.is_empty() {
            bail!("{} needs at least one data and one simulated sample", self.dat.display());
        }
        Ok((self.load("DATA", true, data, ctx)?, self.load("MC", false, mc, ctx)?))
    }
}

impl ReportArgs {
    fn style(&self) -> PlotStyle {
        PlotStyle {
            lumi: Some(self.lumi),
            year: Some(self.year.clone()),
            ratio: self.ratio || !self.no_ratio,
            log_y: self.log_y,
            ..Default::default()
        }
    }
}

/// Fill data and the simulation stack, print their yields and write the
/// report.
fn compare(data: &Tree, mc: &Tree, request: &HistogramRequest, report: &ReportArgs, style: &PlotStyle) -> Result<()> {
    let histo_data = data.histogram(request, report.lumi)?;
    let stack = mc.stack(request, report.lumi)?;
    let histo_mc = stack.total()?;

    println!("  Data: {:.0} events", histo_data.integral());
    println!("  MC:   {:.1} events (scaled to {} fb^-1)", histo_mc.integral(), report.lumi);

    let plot = ComparisonPlot::new(&histo_data, &stack)?;
    let (html, json) = render::write_report(&report.output, &plot, style)
        .with_context(|| format!("write report to {}", report.output.display()))?;
    println!("Wrote {}", html.display());
    println!("Wrote {}", json.display());
    Ok(())
}

/// Binning from explicit edges when given, else `bins` over `range`.
fn binning(bins: usize, range: &[f64], edges: &[f64]) -> Result<Binning> {
    if !edges.is_empty() {
        return Ok(Binning::variable(edges.to_vec())?);
    }
    let &[lo, hi] = range else {
        bail!("need a range (LO HI) or bin edges");
    };
    Ok(Binning::regular(bins, lo, hi)?)
}

/// A file-name friendly version of an expression.
fn file_stem(expr: &str) -> String {
    expr.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Data and simulation sample names to load. Explicit lists win; otherwise
/// every sample of the definitions file is split by its is-data flag.
fn sample_names(dat: &Path, data: Vec<String>, mc: Vec<String>) -> Result<(Vec<String>, Vec<String>)> {
    if !data.is_empty() && !mc.is_empty() {
        return Ok((data, mc));
    }
    let defs = spec::read_definitions(dat).with_context(|| format!("read {}", dat.display()))?;
    let names = |want: bool| -> Vec<String> {
        defs.samples
            .iter()
            .filter(|s| s.is_data == want)
            .map(|s| s.name.clone())
            .collect()
    };
    let data = if data.is_empty() { names(true) } else { data };
    let mc = if mc.is_empty() { names(false) } else { mc };
    Ok((data, mc))
}
