use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod output;

use cheminsight_core::{Config, RateLimiters, SearchRequest, config_file, run_search};
use cheminsight_reporting::{ExportFormat, export_results};
use output::ColorMode;

/// CheMinsight - Search PubMed for articles linking compounds to genes
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a compound literature search
    Search {
        /// Compound names or CAS registry numbers
        #[arg(required = true)]
        compounds: Vec<String>,

        /// Gene/target symbols ANDed into every query
        #[arg(short, long, value_delimiter = ',')]
        genes: Vec<String>,

        /// Free-text keywords ANDed into every query
        #[arg(short, long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Start of the publication-year window
        #[arg(long)]
        from: Option<u16>,

        /// End of the publication-year window (defaults to the current year)
        #[arg(long)]
        to: Option<u16>,

        /// Synonyms per compound on top of the original name
        #[arg(long)]
        max_synonyms: Option<usize>,

        /// Maximum articles per query expression
        #[arg(long)]
        max_results: Option<usize>,

        /// NCBI API key (raises the PubMed rate limit)
        #[arg(long)]
        ncbi_api_key: Option<String>,

        /// Contact email forwarded to the E-utilities API
        #[arg(long)]
        email: Option<String>,

        /// Concurrent compound pipelines
        #[arg(long)]
        concurrency: Option<usize>,

        /// Output file; format is inferred from the extension
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export format: csv, json or markdown
        #[arg(long)]
        format: Option<ExportFormat>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Write the current settings to the platform config file
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::InitConfig => init_config(),
        Command::Search {
            compounds,
            genes,
            keywords,
            from,
            to,
            max_synonyms,
            max_results,
            ncbi_api_key,
            email,
            concurrency,
            output,
            format,
            no_color,
        } => {
            search(SearchArgs {
                compounds,
                genes,
                keywords,
                from,
                to,
                max_synonyms,
                max_results,
                ncbi_api_key,
                email,
                concurrency,
                output,
                format,
                no_color,
            })
            .await
        }
    }
}

struct SearchArgs {
    compounds: Vec<String>,
    genes: Vec<String>,
    keywords: Vec<String>,
    from: Option<u16>,
    to: Option<u16>,
    max_synonyms: Option<usize>,
    max_results: Option<usize>,
    ncbi_api_key: Option<String>,
    email: Option<String>,
    concurrency: Option<usize>,
    output: Option<PathBuf>,
    format: Option<ExportFormat>,
    no_color: bool,
}

async fn search(args: SearchArgs) -> anyhow::Result<()> {
    // Resolve configuration: CLI flags > env vars > config file > defaults
    let file = config_file::load_config();
    let mut config = Config::default();
    file.apply_to(&mut config);

    if let Some(key) = args
        .ncbi_api_key
        .or_else(|| std::env::var("NCBI_API_KEY").ok())
    {
        config.ncbi_api_key = Some(key);
    }
    if let Some(email) = args.email.or_else(|| std::env::var("ENTREZ_EMAIL").ok()) {
        config.entrez_email = Some(email);
    }
    if let Some(n) = args.max_synonyms {
        config.max_synonyms = n;
    }
    if let Some(n) = args.max_results {
        config.max_results_per_query = n;
    }
    if let Some(n) = args.concurrency {
        config.concurrency_limit = n;
    }
    // The PubMed rate depends on whether an API key is present
    config.rate_limiters = Arc::new(RateLimiters::new(config.ncbi_api_key.is_some()));

    let file_search = file.search.as_ref();
    let date_from = args
        .from
        .or_else(|| file_search.and_then(|s| s.date_from))
        .unwrap_or(2000);
    let date_to = args
        .to
        .or_else(|| file_search.and_then(|s| s.date_to))
        .unwrap_or_else(current_year);

    let request = SearchRequest {
        compounds: args.compounds,
        genes: args.genes,
        keywords: args.keywords,
        date_from,
        date_to,
    };

    let use_color = !args.no_color;
    let color = ColorMode(use_color);

    output::print_run_header(&request, color)?;

    // Ctrl-C cancels: new requests stop, in-flight ones finish or time out
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling search; partial results will be kept...");
                cancel.cancel();
            }
        });
    }

    let outcome = run_search(
        request,
        config,
        move |event| {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            let _ = output::print_progress(&mut lock, &event, color);
        },
        cancel,
    )
    .await;

    {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        output::print_summary(&mut lock, &outcome, color)?;
    }

    if let Some(ref path) = args.output {
        let format = args
            .format
            .unwrap_or_else(|| ExportFormat::from_path(path));
        export_results(&outcome, format, path).map_err(|e| anyhow::anyhow!(e))?;
        println!("Results written to {}", path.display());
    }

    if !outcome.any_success() {
        anyhow::bail!("no compound produced results");
    }
    Ok(())
}

fn init_config() -> anyhow::Result<()> {
    let file = config_file::load_config();
    let path = config_file::save_config(&file).map_err(|e| anyhow::anyhow!(e))?;
    println!("Config written to {}", path.display());
    Ok(())
}

/// Current calendar year, close enough for a default date window bound.
fn current_year() -> u16 {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    (1970 + secs / 31_557_600) as u16
}
