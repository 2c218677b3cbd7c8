use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod bench;
mod cli;
mod config;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use cli::{Command, OutputArgs};
use config::Config;
use semantic::{
    CategoryModel, EmbeddingModel, Exploration, Explorer, Level, SimilarityEngine,
};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // also routes `log` records into the subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Load the model and wire up the explorer. Model loading blocks, so this
/// runs before the runtime is entered.
fn build_explorer(config: &Config) -> anyhow::Result<Explorer> {
    let categories = config.category_model()?;

    let model = EmbeddingModel::new(
        &config.embedding.model,
        config.base_path().into(),
        Some(Duration::from_secs(config.embedding.download_timeout_secs)),
    )?;
    let engine = SimilarityEngine::probe(&config.compute);

    Ok(Explorer::new(
        Arc::new(model),
        engine,
        Arc::new(categories),
        config,
    ))
}

fn print_exploration(exploration: &Exploration, output: &OutputArgs) -> anyhow::Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(exploration)?);
        return Ok(());
    }

    if exploration.results.is_empty() {
        println!("no results for '{}'", exploration.query);
        return Ok(());
    }

    if exploration.relaxed {
        println!("(no strong matches, showing weaker ones)");
    }

    for (idx, candidate) in exploration.results.iter().enumerate() {
        println!(
            "{:>2}. {:<20} {:>6.3}  (raw {:.3})  {}",
            idx + 1,
            candidate.word,
            candidate.adjusted_similarity,
            candidate.raw_similarity,
            candidate.category
        );
    }

    if let Some(graph) = &exploration.graph {
        println!();
        println!("{}", exploration.query);
        for first in graph.nodes_at(Level::First) {
            println!("├─ {} ({:.3})", first.id, first.similarity);
            for second in graph
                .nodes_at(Level::Second)
                .filter(|n| n.parent.as_deref() == Some(first.id.as_str()))
            {
                println!("│  └─ {} ({:.3})", second.id, second.similarity);
            }
        }
    }

    Ok(())
}

fn print_categories(categories: &CategoryModel, json: bool) -> anyhow::Result<()> {
    let stats = categories.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    for stat in &stats.categories {
        println!(
            "{:<12} weight {:.1}  {:>3} words  {:>3} related  {:>3} total",
            stat.name, stat.weight, stat.words, stat.related, stat.total
        );
    }
    println!("{} words in {} categories", stats.total_words, stats.categories.len());

    Ok(())
}

fn print_bench(report: &bench::BenchReport, options: &bench::BenchOptions) {
    println!(
        "{} candidates x {} dimensions, {} iterations",
        options.count, options.dimensions, options.iterations
    );
    println!(
        "sequential   avg {:?}  min {:?}  max {:?}",
        report.sequential.avg, report.sequential.min, report.sequential.max
    );

    match (&report.accelerated, report.backend) {
        (Some(timing), Some(backend)) => {
            println!(
                "{backend:<12} avg {:?}  min {:?}  max {:?}",
                timing.avg, timing.min, timing.max
            );
            if let Some(speedup) = report.speedup() {
                println!("speedup {speedup:.2}x");
            }
            println!("max difference {:.2e}", report.max_difference);
        }
        _ => println!("no accelerated backend available, sequential only"),
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();

    match args.command {
        #[cfg(feature = "markdown-docs")]
        Command::MarkdownDocs {} => {
            clap_markdown::print_help_markdown::<cli::Args>();
            Ok(())
        }

        Command::Categories { json } => {
            let config = Config::load();
            print_categories(&config.category_model()?, json)
        }

        Command::Bench {
            dimensions,
            count,
            iterations,
            backend,
        } => {
            let config = Config::load();
            let mut compute = config.compute.clone();
            if let Some(backend) = backend {
                compute.backend = backend;
            }

            let options = bench::BenchOptions {
                dimensions,
                count,
                iterations: iterations.max(1),
            };
            let engine = SimilarityEngine::probe(&compute);
            let report = runtime()?.block_on(bench::run(&engine, options))?;
            print_bench(&report, &options);

            if report.accelerated.is_some() && !report.agrees() {
                anyhow::bail!(
                    "accelerated and sequential results differ by {:.2e}",
                    report.max_difference
                );
            }
            Ok(())
        }

        Command::Search { word, output } => {
            let config = Config::load();
            let explorer = build_explorer(&config)?;
            let exploration = runtime()?.block_on(explorer.search(&word, output.graph))?;
            print_exploration(&exploration, &output)
        }

        Command::Compute { expression, output } => {
            let config = Config::load();
            let explorer = build_explorer(&config)?;
            let expression = expression.join(" ");
            let exploration = runtime()?.block_on(explorer.compute(&expression, output.graph))?;
            print_exploration(&exploration, &output)
        }

        Command::Daemon { listen } => {
            let config = Config::load();
            let explorer = Arc::new(build_explorer(&config)?);
            let listen = listen.unwrap_or_else(|| config.daemon.listen.clone());
            runtime()?.block_on(web::serve(explorer, &listen))
        }
    }
}
