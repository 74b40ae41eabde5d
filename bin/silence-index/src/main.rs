// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{AppConfig, SourceKind};
use llm_contracts::TextCompleter;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use steel::{OllamaClient, QdrantSource};
use stele::analytics::SEARCH_LIMIT;
use stele::{demographics_slice, route, AnalyticsContext, DemographicSlice, SpecResolver};
use tally::{
    cross_tabulate, field_breakdown, temporal_buckets, Field, MemorySource, Metric,
    RecordSource, RecordStore,
};
use tracing::{info, warn};

#[derive(Parser, Debug, Clone)]
#[command(name = "silence-index", about = "Civic complaint silence analytics")]
struct Cli {
    /// TOML configuration file; defaults to config/silence-index.toml when present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Route a message to the analytics tools and print every result.
    Ask { message: String },
    /// Show which tools a message would run, without running them.
    Route { message: String },
    /// Group every record by one field.
    Breakdown {
        field: String,
        #[arg(long, default_value = "avg_silence")]
        metric: String,
        /// Keep only the first N buckets; 0 keeps all.
        #[arg(long, default_value_t = 0)]
        top: usize,
    },
    /// Cross-tabulate two fields.
    Crosstab {
        field_a: String,
        field_b: String,
        #[arg(long, default_value = "avg_silence")]
        metric: String,
    },
    /// Resolve a filtered breakdown from a message and run it.
    Filtered { message: String },
    /// Resolve a chart request and print the chart configuration.
    Chart { message: String },
    /// Silence by days-in-system bucket.
    Temporal,
    /// Silence by gender, caste and income bracket.
    Demographics {
        /// Only one slice: gender, caste or income.
        #[arg(long)]
        slice: Option<String>,
    },
    /// Semantic search over complaint text; needs embeddings enabled.
    Search {
        query: String,
        #[arg(long, default_value_t = SEARCH_LIMIT)]
        top: usize,
        /// Only complaints whose silence score is strictly above this.
        #[arg(long, value_name = "SCORE")]
        min_silence: Option<f64>,
    },
    /// Check that the configured Ollama endpoint answers.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.cmd {
        Command::Route { message } => print_json(&route(&message)),
        Command::Health => {
            let client = OllamaClient::new(config.llm.ollama.clone())?;
            let models = client.health_check().await?;
            print_json(&models)
        }
        Command::Ask { message } => {
            let context = build_context(&config)?;
            print_json(&context.ask(&message).await)
        }
        Command::Filtered { message } => {
            let context = build_context(&config)?;
            print_json(&context.filtered(&message).await?)
        }
        Command::Chart { message } => {
            let context = build_context(&config)?;
            print_json(&context.chart(&message).await?)
        }
        Command::Breakdown { field, metric, top } => {
            let metric = parse_metric(&metric)?;
            warn_unsupported(&[&field]);
            let snapshot = build_context(&config)?.snapshot().await?;
            print_json(&field_breakdown(snapshot.records(), &field, metric, top))
        }
        Command::Crosstab {
            field_a,
            field_b,
            metric,
        } => {
            let metric = parse_metric(&metric)?;
            warn_unsupported(&[&field_a, &field_b]);
            let snapshot = build_context(&config)?.snapshot().await?;
            print_json(&cross_tabulate(snapshot.records(), &field_a, &field_b, metric))
        }
        Command::Temporal => {
            let snapshot = build_context(&config)?.snapshot().await?;
            print_json(&temporal_buckets(snapshot.records()))
        }
        Command::Demographics { slice } => {
            let slice = slice
                .as_deref()
                .map(str::parse::<DemographicSlice>)
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let snapshot = build_context(&config)?.snapshot().await?;
            print_json(&demographics_slice(snapshot.records(), slice))
        }
        Command::Search {
            query,
            top,
            min_silence,
        } => {
            let context = build_context(&config)?;
            print_json(&context.search(&query, top, min_silence).await?)
        }
    }
}

fn build_source(config: &AppConfig) -> Result<Arc<dyn RecordSource>> {
    Ok(match config.source.kind {
        SourceKind::Json => {
            let path = &config.source.path;
            let source = MemorySource::from_path(path)
                .with_context(|| format!("loading records from {}", path.display()))?;
            info!(records = source.len(), path = %path.display(), "Loaded JSON record source");
            Arc::new(source)
        }
        SourceKind::Qdrant => {
            info!(
                url = %config.source.qdrant.url,
                collection = %config.source.qdrant.collection,
                "Using Qdrant record source"
            );
            Arc::new(QdrantSource::new(config.source.qdrant.clone())?)
        }
    })
}

fn build_context(config: &AppConfig) -> Result<AnalyticsContext> {
    let store = Arc::new(RecordStore::new(build_source(config)?, config.store.clone()));
    let ollama = if config.llm.enabled || config.embedding.enabled {
        Some(Arc::new(OllamaClient::new(config.llm.ollama.clone())?))
    } else {
        None
    };

    let completer: Option<Arc<dyn TextCompleter>> = match &ollama {
        Some(client) if config.llm.enabled => Some(client.clone()),
        _ => None,
    };
    if completer.is_none() {
        info!("LLM disabled, specs come from keyword parsing");
    }
    let mut context =
        AnalyticsContext::new(store, SpecResolver::new(completer, config.resolver.clone()));
    if let Some(client) = ollama.filter(|_| config.embedding.enabled) {
        context = context.with_embedder(client);
    }
    Ok(context)
}

fn parse_metric(raw: &str) -> Result<Metric> {
    raw.parse::<Metric>().map_err(anyhow::Error::msg)
}

fn warn_unsupported(fields: &[&str]) {
    for field in fields {
        if field.parse::<Field>().is_err() {
            warn!(field, "Unsupported field, the result will be empty");
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
