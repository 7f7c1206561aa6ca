//! CLI layer: argument parsing, command dispatch, output rendering, exit
//! codes (§6).

pub mod args;

use std::fmt::Debug;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use serde_json::Value;

use crate::engine::{Engine, QueryOptions, QueryResult};
use crate::error::Error;
use crate::expansion::VectorMode;
use crate::scorer::ClusterMode;

pub use args::{Cli, Commands, OutputFormat};

/// One rendering strategy per `OutputFormat` (§4.13): adding a new format
/// means adding a new impl here, nothing in `dispatch` changes.
trait Renderer {
    fn render_stats(&self, json: Value, debug: String);
    fn render_results(&self, results: &[QueryResult]);
}

fn renderer_for(format: OutputFormat) -> Box<dyn Renderer> {
    match format {
        OutputFormat::Human => Box::new(HumanRenderer),
        OutputFormat::Grep => Box::new(GrepRenderer),
        OutputFormat::Json => Box::new(JsonRenderer { pretty: true }),
        OutputFormat::Jsonl => Box::new(JsonRenderer { pretty: false }),
    }
}

struct HumanRenderer;
struct GrepRenderer;
struct JsonRenderer {
    pretty: bool,
}

impl Renderer for HumanRenderer {
    fn render_stats(&self, _json: Value, debug: String) {
        println!("{debug}");
    }

    fn render_results(&self, results: &[QueryResult]) {
        for r in results {
            println!("{} ({:.3})  {}:{}-{}", r.result_id, r.score, r.file_path, r.line_start, r.line_end);
            if let Some(header) = &r.header_text
                && !r.snippet.lines().next().is_some_and(|l| l == header) {
                    println!("  {header}");
                }
            if let Some(warn) = &r.warn {
                println!("  [warn: {warn}]");
            } else {
                for line in r.snippet.lines() {
                    println!("  {line}");
                }
            }
            println!();
        }
    }
}

impl Renderer for GrepRenderer {
    fn render_stats(&self, _json: Value, debug: String) {
        println!("{debug}");
    }

    fn render_results(&self, results: &[QueryResult]) {
        for r in results {
            println!("{}:{}: {}", r.file_path, r.line_start, r.header_text.clone().unwrap_or_default());
        }
    }
}

impl Renderer for JsonRenderer {
    fn render_stats(&self, json: Value, _debug: String) {
        if self.pretty {
            println!("{}", serde_json::to_string_pretty(&json).unwrap());
        } else {
            println!("{}", serde_json::to_string(&json).unwrap());
        }
    }

    fn render_results(&self, results: &[QueryResult]) {
        if self.pretty {
            println!("{}", serde_json::to_string_pretty(results).unwrap());
        } else {
            for r in results {
                println!("{}", serde_json::to_string(r).unwrap());
            }
        }
    }
}

fn render_stats<T: Serialize + Debug>(renderer: &dyn Renderer, stats: &T) {
    renderer.render_stats(serde_json::to_value(stats).unwrap(), format!("{stats:?}"));
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

fn dispatch(cli: &Cli) -> Result<ExitCode, Error> {
    let root = Path::new(&cli.root);
    let engine = Engine::open(root)?;

    let cancel = engine.cancellation_token();
    let _ = ctrlc::set_handler(move || cancel.cancel());

    let renderer = renderer_for(cli.format);

    match &cli.command {
        Commands::Index(a) => {
            let stats = engine.index(a.rebuild, a.train, a.hidden, a.no_ignore)?;
            render_stats(renderer.as_ref(), &stats);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Train(a) => {
            let target = match a.model {
                args::TrainTarget::Line => "line",
                args::TrainTarget::Scope => "scope",
                args::TrainTarget::All => "all",
            };
            let stats = engine.train(target)?;
            render_stats(renderer.as_ref(), &stats);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Query(a) => {
            let mut opts = QueryOptions::default();
            opts.top_k = a.top_k;
            opts.raw_vectors = a.raw_vectors;
            opts.min_similarity = a.min_similarity;
            opts.max_df_percent = a.max_df_percent;
            opts.expansion_top_k = a.expansion_top_k;
            opts.explain = a.explain;
            opts.vector_mode = match a.vector_mode {
                Some(args::VectorModeArg::None) | None => VectorMode::None,
                Some(args::VectorModeArg::Line) => VectorMode::Line,
                Some(args::VectorModeArg::Block) => VectorMode::Block,
                Some(args::VectorModeArg::All) => VectorMode::All,
            };
            opts.cluster_mode = a.cluster_mode.map(|m| match m {
                args::ClusterModeArg::Centroid => ClusterMode::Centroid,
                args::ClusterModeArg::Concentration => ClusterMode::Concentration,
            });

            let results = engine.query(&a.text, &opts)?;
            renderer.render_results(&results);
            if results.is_empty() {
                Ok(ExitCode::from(2))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Commands::Terms(a) => {
            let model = match a.model {
                args::VectorModeArg::Block => crate::train::SCOPE_MODEL,
                _ => crate::train::LINE_MODEL,
            };
            let Some((token_id, _kind)) = engine.store().find_token(&a.token)? else {
                println!("unknown token: {}", a.token);
                return Ok(ExitCode::from(2));
            };
            let model_id = engine.store().model_id(model)?;
            let neighbors = engine.store().neighbors(model_id, token_id, a.top)?;
            for (id, sim) in neighbors {
                let key = engine.store().token_key(id)?.unwrap_or_default();
                println!("{key}\t{:.4}", sim as f64 / 65535.0);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Outline(a) => {
            render_outline(&engine, a)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Mark(a) => {
            let verdict = if a.useful {
                "useful"
            } else if a.not_useful {
                "not_useful"
            } else if a.promising {
                "promising"
            } else {
                return Err(Error::InvalidOption("mark requires one of --useful, --not-useful, --promising".into()));
            };
            engine.mark(&a.result_id, verdict, a.note.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Keywords(a) => {
            let keywords = engine.keywords(a.top, a.min_count)?;
            for (key, df) in keywords {
                println!("{key}\t{df}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn render_outline(engine: &Engine, a: &args::OutlineArgs) -> Result<(), Error> {
    for (file_id, path) in engine.store().all_file_paths()? {
        if let Some(glob) = &a.file
            && !path.contains(glob.as_str()) {
                continue;
            }
        println!("{path}");
        for block in engine.store().blocks_for_file(file_id)? {
            if let Some(max_level) = a.level
                && block.level as u32 > max_level {
                    continue;
                }
            let indent = "  ".repeat(block.level as usize);
            println!("{indent}{}:{}-{}", block.kind, block.line_start, block.line_end);
        }
    }
    Ok(())
}

