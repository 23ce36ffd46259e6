use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use searchable_core::{Query, RelationWeights, Schema, SearchJson, SearchOptions, Weights};
use searchable_storage::{InMemoryStore, Storage};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "searchable")]
#[command(about="Compose and evaluate substring searches", long_about=None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the SQL, bindings and registered weights for one search.
    Compose(SearchArgs),
    /// Run one search against rows loaded from a JSON file.
    Search {
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long)]
        data: String,
    },
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    schema: String,
    #[arg(long)]
    entity: String,
    #[arg(long)]
    property: String,
    #[arg(long)]
    term: String,
    #[arg(long, default_value_t = searchable_core::DEFAULT_WEIGHT)]
    weight: u32,
    /// Overrides SEARCHABLE_IGNORE_KEYS.
    #[arg(long)]
    ignore_keys: bool,
    /// Overrides SEARCHABLE_RELATION_WEIGHTS with `register`.
    #[arg(long)]
    relation_weights: bool,
}

impl SearchArgs {
    fn options(&self) -> SearchOptions {
        let mut opts = SearchOptions::from_env();
        if self.ignore_keys {
            opts.ignore_keys = true;
        }
        if self.relation_weights {
            opts.relation_weights = RelationWeights::Register;
        }
        opts
    }

    fn compose<'s>(&self, schema: &'s Schema) -> Result<(Query<'s>, Weights)> {
        let composer = SearchJson::with_options(self.options());
        let mut query = Query::new(schema, &self.entity)?;
        let mut weights = Weights::new();
        let trail = composer.apply(
            &mut query,
            &mut weights,
            &self.property,
            &self.term,
            self.weight,
        )?;
        info!(
            entity = %self.entity,
            property = %self.property,
            relations = trail.columns().len(),
            "search composed"
        );
        Ok((query, weights))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Compose(args) => {
            let schema = Schema::load(&args.schema)?;
            let (query, weights) = args.compose(&schema)?;
            let (sql, bindings) = query.to_sql();
            let report = serde_json::json!({
                "sql": sql,
                "bindings": bindings,
                "weights": weights,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Cmd::Search { search, data } => {
            let schema = Schema::load(&search.schema)?;
            let store = InMemoryStore::load(&data)?;
            let (query, weights) = search.compose(&schema)?;
            let rows = store.query(&query)?;
            info!(matched = rows.len(), "search evaluated");
            let report = serde_json::json!({
                "rows": rows,
                "weights": weights,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
