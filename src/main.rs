//! ESGF Search - command line entry point
//!
//! `esgf-search project=CMIP5 experiment!=historical model=A,B`

use anyhow::Context as _;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use esgf_search::config::Settings;
use esgf_search::metrics::init_metrics;
use esgf_search::{Constraints, ContextOptions, ResultRecord, SearchConnection, SearchOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default of info for esgf_search, warn for everything else
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,esgf_search=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();

    let settings = Settings::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}, using defaults", e);
        Settings::default()
    });

    let mut constraints = Constraints::new();
    for arg in std::env::args().skip(1) {
        let (key, value) = Constraints::parse_arg(&arg)?;
        constraints.push(key, value);
    }

    info!("esgf-search v{} querying {}", esgf_search::VERSION, settings.connection.url);
    init_metrics();

    let connection = SearchConnection::builder(settings.connection.url.clone())
        .distrib(settings.connection.distrib)
        .timeout(Duration::from_secs(settings.connection.timeout_sec))
        .search_type(settings.connection.search_type)
        .facets_star_warning(settings.connection.facets_star_warning)
        .build()
        .context("Failed to create connection")?;

    let mut options = ContextOptions::new();
    options.facets = settings.search.facets().map(str::to_string);
    let search_options = SearchOptions::from(&settings.search);

    connection
        .scoped(|conn| async move {
            let mut context = conn.new_context_with(options, constraints)?;

            let hits = context.hit_count().await.context("Search failed")?;
            println!("{} {} records found", hits, context.search_type());

            for (facet, values) in context.get_facet_options().await? {
                let rendered: Vec<String> = values.iter().map(|(v, c)| format!("{} ({})", v, c)).collect();
                println!("  {}: {}", facet, rendered.join(", "));
            }

            let mut results = context.search_with(search_options).await?;
            let shown = results.len().min(results.batch_size());
            for index in 0..shown {
                let record = results.get(index).await?;
                println!("{}", record.id().unwrap_or_default());
            }
            if results.len() > shown {
                println!("... {} more", results.len() - shown);
            }

            Ok::<(), anyhow::Error>(())
        })
        .await
}
