use anyhow::Result;
use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand};
use recipe_search::commands::{
    EmbedRole, embed_request_for, embed_texts, ingest_file, init_config, list_recipes,
    load_config, search_recipes, show_config, show_health, show_recipe, similar_recipes,
};
use recipe_search::config::{HOME_ENV_VAR, resolve_data_dir};
use recipe_search::embeddings::EmbedRequest;
use std::path::PathBuf;

/// Result counts accepted on the command line, same bounds as `[search]` limits
fn limit_parser() -> RangedU64ValueParser<usize> {
    RangedU64ValueParser::<usize>::new().range(1..=100)
}

#[derive(Parser)]
#[command(name = "recipe-search")]
#[command(about = "Semantic recipe retrieval over a relational store and a vector index")]
#[command(version)]
struct Cli {
    /// Data directory holding config.toml, recipes.db and the vector index
    #[arg(long, global = true, env = HOME_ENV_VAR)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(long, conflicts_with = "init")]
        show: bool,
        /// Write a default config.toml if none exists
        #[arg(long)]
        init: bool,
    },
    /// Store and index recipes from a JSON file (one object or an array)
    Ingest {
        file: PathBuf,
    },
    /// Print one recipe with its steps
    Show {
        id: i64,
    },
    /// List stored recipes by popularity
    List {
        #[arg(long, default_value_t = 20, value_parser = limit_parser())]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Recipes most similar to a stored recipe
    Similar {
        id: i64,
        /// Number of results, defaults to `search.similar_limit`
        #[arg(long, value_parser = limit_parser())]
        limit: Option<usize>,
    },
    /// Free-text search
    Search {
        text: String,
        /// Number of results, defaults to `search.search_limit`
        #[arg(long, value_parser = limit_parser())]
        limit: Option<usize>,
        /// Case-insensitive title containment instead of the configured strategy
        #[arg(long)]
        titles: bool,
    },
    /// Encode texts with the configured backend
    Embed {
        #[arg(required_unless_present = "request", conflicts_with = "request")]
        texts: Vec<String>,
        /// Apply the query prefix instead of the passage prefix
        #[arg(long, conflicts_with = "raw")]
        query: bool,
        /// Apply no prefix at all
        #[arg(long)]
        raw: bool,
        /// Raw `/embed` request body, e.g. '{"texts": ["soup"], "prefix": "query:"}'
        #[arg(long)]
        request: Option<String>,
    },
    /// Show encoding backend, store and index status
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir.as_deref())?;

    if let Commands::Config { init: true, .. } = cli.command {
        return init_config(&data_dir);
    }

    let config = load_config(&data_dir)?;

    match cli.command {
        Commands::Config { .. } => {
            show_config(&config)?;
        }
        Commands::Ingest { file } => {
            ingest_file(&config, &file).await?;
        }
        Commands::Show { id } => {
            show_recipe(&config, id).await?;
        }
        Commands::List { limit, offset } => {
            list_recipes(&config, limit, offset).await?;
        }
        Commands::Similar { id, limit } => {
            let limit = limit.unwrap_or(config.search.similar_limit);
            similar_recipes(&config, id, limit).await?;
        }
        Commands::Search {
            text,
            limit,
            titles,
        } => {
            let limit = limit.unwrap_or(config.search.search_limit);
            search_recipes(&config, &text, limit, titles).await?;
        }
        Commands::Embed {
            texts,
            query,
            raw,
            request,
        } => {
            let request = match request {
                Some(json) => EmbedRequest::from_json(&json)?,
                None => {
                    let role = if raw {
                        EmbedRole::Raw
                    } else if query {
                        EmbedRole::Query
                    } else {
                        EmbedRole::Passage
                    };
                    embed_request_for(&config, texts, role)
                }
            };
            embed_texts(&config, request).await?;
        }
        Commands::Health => {
            show_health(&config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["recipe-search", "health"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Health));
        }
    }

    #[test]
    fn similar_command_with_limit() {
        let cli = Cli::try_parse_from(["recipe-search", "similar", "7", "--limit", "3"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Similar { id, limit } = parsed.command {
                assert_eq!(id, 7);
                assert_eq!(limit, Some(3));
            }
        }
    }

    #[test]
    fn search_command_defaults() {
        let cli = Cli::try_parse_from(["recipe-search", "search", "tomato soup"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                text,
                limit,
                titles,
            } = parsed.command
            {
                assert_eq!(text, "tomato soup");
                assert_eq!(limit, None);
                assert!(!titles);
            }
        }
    }

    #[test]
    fn global_data_dir_after_subcommand() {
        let cli = Cli::try_parse_from(["recipe-search", "list", "--data-dir", "/tmp/recipes"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.data_dir, Some(PathBuf::from("/tmp/recipes")));
            if let Commands::List { limit, offset } = parsed.command {
                assert_eq!(limit, 20);
                assert_eq!(offset, 0);
            }
        }
    }

    #[test]
    fn embed_requires_texts_or_request() {
        let cli = Cli::try_parse_from(["recipe-search", "embed"]);
        assert!(cli.is_err());

        let cli = Cli::try_parse_from([
            "recipe-search",
            "embed",
            "--request",
            r#"{"texts": ["soup"]}"#,
        ]);
        assert!(cli.is_ok());
    }

    #[test]
    fn embed_query_and_raw_conflict() {
        let cli = Cli::try_parse_from(["recipe-search", "embed", "--query", "--raw", "soup"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        }
    }

    #[test]
    fn config_flags_conflict() {
        let cli = Cli::try_parse_from(["recipe-search", "config", "--show", "--init"]);
        assert!(cli.is_err());
    }

    #[test]
    fn limits_outside_range_are_rejected() {
        let cases: [&[&str]; 4] = [
            &["recipe-search", "similar", "7", "--limit", "0"],
            &["recipe-search", "similar", "7", "--limit", "101"],
            &["recipe-search", "search", "soup", "--limit", "100000"],
            &["recipe-search", "list", "--limit", "500", "--offset", "0"],
        ];
        for args in cases {
            let cli = Cli::try_parse_from(args);
            assert!(cli.is_err(), "{:?} should be rejected", args);

            if let Err(err) = cli {
                assert_eq!(err.kind(), ErrorKind::ValueValidation);
            }
        }

        let cli = Cli::try_parse_from(["recipe-search", "search", "soup", "--limit", "100"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["recipe-search", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["recipe-search", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
