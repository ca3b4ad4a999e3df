use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use cover_gallery::cli::Args;
use cover_gallery::report;
use cover_gallery::server::run_server;
use cover_gallery::Gallery;

/// `RUST_LOG` wins; otherwise `info`, or `debug` with --verbose
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    args.load_and_merge_config()?;
    init_tracing(args.verbose);

    // Print banner
    println!("{}", style("Cover Gallery").bold().blue());
    println!("{}", style("Pick covers, keep track of what you used").dim());
    println!();

    args.validate().map_err(|e| anyhow::anyhow!(e))?;
    let folder = args
        .dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve folder: {}", args.dir.display()))?;

    let gallery = Gallery::open(&folder, &args.used_file, Box::new(args.converter()));
    if let Some(err) = gallery.with_store(|store| store.load_error().map(str::to_string)) {
        println!(
            "{} could not load {} ({}), starting with no used flags",
            style("Warning:").yellow().bold(),
            args.used_file,
            err
        );
    }

    if !args.serve_mode() {
        return run_one_shot(&args, &gallery);
    }

    let config = args.server_config();
    println!(
        "Serving {} at {}",
        style(folder.display()).bold(),
        style(config.url()).cyan().underlined()
    );
    println!("{}", style("Press Ctrl-C to stop").dim());
    println!();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run_server(config, Arc::new(gallery)))
}

/// `--list` or `--rename`: print a table and exit
fn run_one_shot(args: &Args, gallery: &Gallery) -> Result<()> {
    if args.list {
        let images = gallery.list_images(args.only_unused)?;
        report::print_image_list(gallery.folder(), &images);
        return Ok(());
    }

    let start_time = Instant::now();
    let rename_report = gallery.rename_all(args.dry_run)?;
    report::print_rename_report(&rename_report);
    println!(
        "\n{}",
        style(format!("Done in {:.2?}", start_time.elapsed())).dim()
    );
    Ok(())
}
