//! pipeworks - word frequency demo
//!
//! Reads text from stdin, runs it through a four-stage pipeline
//! (normalize → tokenize → drop short words → stem plurals) and prints the
//! most frequent words.
//!
//! Usage: `pipeworks [CONFIG_FILE] < input.txt`

use anyhow::Context;
use pipeworks::pipeline::filters;
use pipeworks::{Pipeline, PipelineConfig, ThreadPool};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How many words to print
const TOP_N: usize = 10;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pipeworks=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            PipelineConfig::load(&path).with_context(|| format!("loading config {}", path))?
        }
        None => PipelineConfig::default(),
    };
    tracing::info!("Starting word count with {:?}", config);

    let pool = ThreadPool::new(&config.pool);
    let lines = BufReader::new(std::io::stdin())
        .lines()
        .map(|line| line.context("reading stdin"));

    let words = Pipeline::builder(&pool)
        .config(&config)
        .from_fallible_iter("stdin", lines)?
        .then(filters::map("normalize", |line: String| line.to_lowercase()))?
        .then(filters::named("tokenize", tokenize))?
        .then(filters::retain("min-length", |word: &String| word.chars().count() > 2))?
        .then(filters::map("stem", stem))?
        .into_source();

    let mut counts: HashMap<String, u64> = HashMap::new();
    for word in words {
        *counts.entry(word?).or_default() += 1;
    }

    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (word, count) in ranked.iter().take(TOP_N) {
        println!("{:>8}  {}", count, word);
    }

    tracing::info!("Done: {} distinct words", ranked.len());
    pool.shutdown();
    Ok(())
}

fn tokenize(lines: Vec<String>) -> anyhow::Result<Vec<String>> {
    Ok(lines
        .iter()
        .flat_map(|line| line.split(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect())
}

fn stem(word: String) -> String {
    match word.strip_suffix('s') {
        Some(base) if !base.ends_with('s') && base.chars().count() > 2 => base.to_string(),
        _ => word,
    }
}
