use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bookrec_collect::{CollectError, Collector};
use bookrec_core::storage::{load_raw, save_raw};
use bookrec_core::{
    AppConfig, BookQuery, BookrecError, Catalog, KMeans, SimilarityMode, VectorizerPreset, build_dataset,
};
use bookrec_tui::App;

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "bookrec",
    about = "Content-based book recommendations from a scraped catalog",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output in JSON format. Also enabled by setting BOOKREC_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Vectorizer preset: `analysis` (large vocabulary) or `interactive`.
    #[arg(long, global = true)]
    preset: Option<VectorizerPreset>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the listing and enrich it from the metadata APIs.
    Collect {
        #[arg(long)]
        pages: Option<u32>,
        /// Skip fetching individual book pages.
        #[arg(long)]
        no_details: bool,
        /// Where to write raw records (defaults to the data dir).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Clean, featurize and cluster raw records into the dataset file.
    Build {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Override the configured cluster count.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Search the catalog by title, author or genre.
    Search {
        query: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Recommend books similar to a title.
    Recommend {
        title: String,
        #[arg(long, short)]
        mode: Option<SimilarityMode>,
        #[arg(long, short = 'n')]
        limit: Option<usize>,
        #[arg(long)]
        min_rating: Option<f64>,
        #[arg(long, short)]
        genre: Option<String>,
    },

    /// Show cluster sizes and their dominant genres.
    Clusters {
        /// Score every k in a range, e.g. `2..10`, instead.
        #[arg(long, value_parser = parse_k_range)]
        evaluate: Option<RangeInclusive<usize>>,
    },

    /// Show dataset statistics.
    Stats,

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path.
    Path,
    /// Print the effective config as TOML.
    Show,
    /// Write the default config file if none exists.
    Init {
        #[arg(long)]
        force: bool,
    },
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    let json_output = cli.json || std::env::var("BOOKREC_JSON").as_deref() == Ok("1");

    if let Err(err) = run(cli, json_output) {
        let code = exit_code(&err);
        if json_output {
            let body = serde_json::json!({
                "status": "error",
                "code": code,
                "message": format!("{err:#}"),
            });
            println!("{body}");
        } else {
            eprintln!("error: {err:#}");
        }
        std::process::exit(code);
    }
}

fn run(cli: Cli, json_output: bool) -> Result<()> {
    let start = Instant::now();
    let mut config = AppConfig::load()?;
    if let Some(preset) = cli.preset {
        config.features = config.features.with_preset(preset);
    }

    let Some(command) = cli.command else {
        init_file_logging(&config)?;
        let catalog = open_catalog(&config, VectorizerPreset::Interactive)?;
        let mut app = App::new(catalog, &config.ui);
        return bookrec_tui::run_tui(&mut app);
    };
    init_logging();

    match command {
        // ── Collect ────────────────────────────────────────────────────────
        Commands::Collect {
            pages,
            no_details,
            output,
        } => {
            if no_details {
                config.collect.fetch_details = false;
            }
            let mut collector = Collector::from_config(&config.collect, &config.cache_dir())?;
            if let Some(pages) = pages {
                collector = collector.with_pages(pages);
            }

            let runtime = tokio::runtime::Runtime::new()?;
            let out = runtime.block_on(collector.run());
            let path = output.unwrap_or_else(|| config.raw_path());
            save_raw(&path, &out.records)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "report": out.report, "path": path },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                let r = &out.report;
                println!("Collected {} raw records → {}", r.records, path.display());
                println!("  Listing pages:  {} ok, {} failed", r.pages_fetched, r.pages_failed);
                println!("  Listing rows:   {} ({} unparsed)", r.listing_rows, r.rows_unparsed);
                println!("  Book pages:     {} ok, {} failed", r.details_fetched, r.details_failed);
                println!(
                    "  API lookups:    {} matched, {} missed, {} failed",
                    r.lookups_matched, r.lookups_missed, r.lookups_failed
                );
            }
        }

        // ── Build ──────────────────────────────────────────────────────────
        Commands::Build { input, k } => {
            if let Some(k) = k {
                config.clustering.k = k;
                config.validate()?;
            }
            let input = input.unwrap_or_else(|| config.raw_path());
            let raw = load_raw(&input)?;
            let (_, report) = build_dataset(&raw, &config, &config.dataset_path())?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": report,
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                let c = &report.clean;
                println!("Built {} books → {}", report.books, report.path.display());
                println!(
                    "  Rows:      {} in, {} merged, {} skipped",
                    c.input_rows,
                    c.duplicates_merged,
                    c.skipped()
                );
                println!("  Terms:     {} ({} preset)", report.terms, report.preset);
                println!("  Genres:    {}", report.genres.join(", "));
                println!("  Clusters:  k={} inertia={:.3}", report.k, report.inertia);
                for (label, size) in report.cluster_sizes.iter().enumerate() {
                    println!("    {label}: {size} books");
                }
            }
        }

        // ── Search ─────────────────────────────────────────────────────────
        Commands::Search { query, limit } => {
            let catalog = open_catalog(&config, config.features.preset)?;
            let hits = catalog.search(&query);
            let total = hits.len();
            let mut items = Vec::new();
            for hit in hits.into_iter().take(limit) {
                items.push((catalog.view(hit.book)?, hit));
            }
            let dur = start.elapsed().as_millis();

            if json_output {
                let items: Vec<_> = items
                    .iter()
                    .map(|(book, hit)| serde_json::json!({"book": book, "score": hit.score, "fuzzy": hit.fuzzy}))
                    .collect();
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": items, "total": total, "query": query },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if items.is_empty() {
                println!("No books match \"{query}\".");
            } else {
                for (book, hit) in &items {
                    let rating = book.rating.map(|r| format!("{r:.2}")).unwrap_or_default();
                    let marker = if hit.fuzzy { "~" } else { " " };
                    println!("{marker} {title:<45}  {author:<25}  {rating}", title = book.title, author = book.author);
                }
                if total > items.len() {
                    println!("… {} more", total - items.len());
                }
            }
        }

        // ── Recommend ──────────────────────────────────────────────────────
        Commands::Recommend {
            title,
            mode,
            limit,
            min_rating,
            genre,
        } => {
            let catalog = open_catalog(&config, config.features.preset)?;
            let mut query = BookQuery::new(title)
                .with_mode(mode.unwrap_or(config.ui.default_mode))
                .with_limit(limit.unwrap_or(config.ui.default_limit));
            query.min_rating = min_rating;
            query.genre = genre;
            let set = catalog.recommend_for(&query)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": set,
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!(
                    "Books like \"{}\" by {} ({} similarity):",
                    set.query.title, set.query.author, set.mode
                );
                if set.results.is_empty() {
                    println!("  nothing passes the filters");
                }
                for (i, rec) in set.results.iter().enumerate() {
                    let year = rec.book.year.map(|y| y.to_string()).unwrap_or_default();
                    let rating = rec.book.rating.map(|r| format!("{r:.2}")).unwrap_or_default();
                    println!(
                        "{rank:>3}. {score:.3}  {title:<40}  {author:<22}  {rating:>4}  {year}",
                        rank = i + 1,
                        score = rec.score,
                        title = rec.book.title,
                        author = rec.book.author,
                    );
                }
            }
        }

        // ── Clusters ───────────────────────────────────────────────────────
        Commands::Clusters { evaluate } => {
            let catalog = open_catalog(&config, config.features.preset)?;
            if let Some(range) = evaluate {
                let kmeans = KMeans::from_config(&config.clustering);
                let scores = kmeans.evaluate(&catalog.features().combined_dense(), range)?;
                let dur = start.elapsed().as_millis();
                if json_output {
                    print_json(&serde_json::json!({
                        "status": "ok",
                        "data": { "scores": scores },
                        "meta": { "duration_ms": dur }
                    }))?;
                } else {
                    println!("{:>3}  {:>12}  {:>10}", "k", "inertia", "silhouette");
                    for s in &scores {
                        let sil = s.silhouette.map(|v| format!("{v:.4}")).unwrap_or_else(|| "—".into());
                        println!("{:>3}  {:>12.3}  {:>10}", s.k, s.inertia, sil);
                    }
                }
            } else {
                let profiles = cluster_profiles(&catalog);
                let dur = start.elapsed().as_millis();
                if json_output {
                    let items: Vec<_> = profiles
                        .iter()
                        .map(|(label, size, genres)| {
                            serde_json::json!({"cluster": label, "books": size, "top_genres": genres})
                        })
                        .collect();
                    print_json(&serde_json::json!({
                        "status": "ok",
                        "data": { "k": catalog.meta().k, "clusters": items },
                        "meta": { "duration_ms": dur }
                    }))?;
                } else if profiles.is_empty() {
                    println!("Dataset has no cluster labels. Run `bookrec build` first.");
                } else {
                    for (label, size, genres) in &profiles {
                        println!("cluster {label}: {size:>4} books  {}", genres.join(", "));
                    }
                }
            }
        }

        // ── Stats ──────────────────────────────────────────────────────────
        Commands::Stats => {
            let catalog = open_catalog(&config, config.features.preset)?;
            let stats = catalog.stats();
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": stats,
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("Dataset statistics ({}):", catalog.path().display());
                println!("  Books:           {}", stats.books);
                println!("  With rating:     {}", stats.rated);
                println!("  With year:       {}", stats.with_year);
                println!("  Genre columns:   {}", stats.vocabulary.len());
                if let Some(created) = stats.meta.created_at {
                    println!("  Built:           {}", created.format("%Y-%m-%d %H:%M UTC"));
                }
                println!("  Top genres:");
                for (genre, count) in stats.top_genres.iter().take(10) {
                    println!("    {genre:<24} {count}");
                }
            }
        }

        // ── Config ─────────────────────────────────────────────────────────
        Commands::Config { action } => {
            let path = AppConfig::config_path();
            match action {
                ConfigAction::Path => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":path,"exists":path.exists()}}))?;
                    } else {
                        println!("{}", path.display());
                    }
                }
                ConfigAction::Show => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":config}))?;
                    } else {
                        print!("{}", toml::to_string_pretty(&config)?);
                    }
                }
                ConfigAction::Init { force } => {
                    if path.exists() && !force {
                        anyhow::bail!(BookrecError::ConfigError(format!(
                            "{} already exists (use --force to overwrite)",
                            path.display()
                        )));
                    }
                    AppConfig::default().save_to(&path)?;
                    info!(path = %path.display(), "wrote default config");
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":path}}))?;
                    } else {
                        println!("Wrote {}", path.display());
                    }
                }
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn open_catalog(config: &AppConfig, preset: VectorizerPreset) -> Result<Catalog> {
    let path = config.dataset_path();
    Catalog::load(&path, preset, config)
        .with_context(|| format!("loading dataset {} (run `bookrec build` first)", path.display()))
}

/// `(label, size, top genres)` for every cluster present in the dataset.
fn cluster_profiles(catalog: &Catalog) -> Vec<(usize, usize, Vec<String>)> {
    let mut groups: HashMap<usize, (usize, HashMap<&str, usize>)> = HashMap::new();
    for book in catalog.dataset().books() {
        let Some(label) = book.cluster else { continue };
        let (size, genres) = groups.entry(label).or_default();
        *size += 1;
        for genre in &book.genres {
            *genres.entry(genre.as_str()).or_default() += 1;
        }
    }

    let mut profiles: Vec<_> = groups
        .into_iter()
        .map(|(label, (size, genres))| {
            let mut genres: Vec<_> = genres.into_iter().collect();
            genres.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
            let top = genres.into_iter().take(3).map(|(g, _)| g.to_string()).collect();
            (label, size, top)
        })
        .collect();
    profiles.sort_by_key(|(label, ..)| *label);
    profiles
}

fn parse_k_range(input: &str) -> std::result::Result<RangeInclusive<usize>, String> {
    let (lo, hi) = input
        .split_once("..=")
        .or_else(|| input.split_once(".."))
        .or_else(|| input.split_once('-'))
        .ok_or_else(|| format!("expected MIN..MAX, got {input:?}"))?;
    let lo: usize = lo.trim().parse().map_err(|e| format!("bad lower bound: {e}"))?;
    let hi: usize = hi.trim().parse().map_err(|e| format!("bad upper bound: {e}"))?;
    if lo == 0 || lo > hi {
        return Err(format!("range must satisfy 1 <= MIN <= MAX, got {lo}..{hi}"));
    }
    Ok(lo..=hi)
}

fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<BookrecError>() {
            return e.exit_code() as i32;
        }
        if let Some(e) = cause.downcast_ref::<CollectError>() {
            return e.exit_code() as i32;
        }
    }
    1
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("BOOKREC_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// The TUI owns the terminal, so logs go to a file in the data dir.
fn init_file_logging(config: &AppConfig) -> Result<()> {
    let path = config.log_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
