//! Pull plain-HTTP links out of a batch of crawled feeds.
//!
//! The feeds come from an in-memory stand-in for a database query. Run with
//! `RUST_LOG=chainflow=debug` to see chunk dispatch.

use chainflow::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Feed {
    id: u32,
    title: String,
    link: Option<String>,
}

fn query_feeds() -> anyhow::Result<Vec<Feed>> {
    Ok((0..100)
        .map(|id| Feed {
            id,
            title: format!("feed #{id}"),
            link: match id % 4 {
                0 => None,
                1 => Some(format!("https://news.example.com/{id}")),
                _ => Some(format!("http://blog.example.org/{id}")),
            },
        })
        .collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ParallelConfig::new()
        .num_workers(10)
        .chunk_size(5)
        .timeout(Duration::from_secs(10));

    let links = from_fn("hncrawler.feeds", query_feeds)
        .parallel(config)?
        .map(|f: &Feed| f.link.clone())
        .filter(|link: &Option<String>| link.as_deref().is_some_and(|l| l.starts_with("http://")))
        .map(|link: &Option<String>| link.clone().unwrap_or_default());

    match links.collect_async().await {
        Ok(found) => {
            println!("{} plain-http links", found.len());
            for link in found.iter().take(5) {
                println!("  {link}");
            }
        }
        Err(e) => tracing::error!(error = %e, "stream processing failed"),
    }

    links.stats().print();
    Ok(())
}
