use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;

use app_router::config::load_manifest;
use app_router::resolve::{ParamValue, Params, RequestPath, SegmentResolver};
use app_router::tree::RouteTree;

#[derive(Parser)]
#[command(name = "route-cli")]
#[command(about = "Inspect and validate app router manifests", long_about = None)]
struct Cli {
    /// Route manifest (TOML)
    #[arg(short, long, default_value = "routes.toml")]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the built route tree and its URL-visible routes
    Tree,
    /// Resolve a request path and print the match chain
    Resolve { path: String },
    /// Build the tree and report conflicts
    Check,
    /// Build a URL from a route pattern, e.g. `href /blog/[slug] slug=hello`
    Href {
        pattern: String,
        /// name=value pairs
        params: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let manifest = load_manifest(&cli.manifest)?;

    if let Commands::Check = cli.command {
        return Ok(match manifest.build() {
            Ok(tree) => {
                println!("ok: {} nodes, {} routes", tree.len(), tree.routes().len());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("invalid manifest: {}", e);
                ExitCode::FAILURE
            }
        });
    }

    let tree = manifest.build()?;
    match cli.command {
        Commands::Tree => {
            print!("{}", tree.outline());
            println!();
            for route in tree.routes() {
                println!("{:<32} {} ({})", route.pattern, route.folder, route.slot);
            }
        }
        Commands::Resolve { path } => print_resolution(&tree, &path)?,
        Commands::Href { pattern, params } => println!("{}", tree.href(&pattern, &parse_params(&pattern, &params)?)?),
        Commands::Check => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn print_resolution(tree: &RouteTree, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = SegmentResolver::new(tree);
    let (matched, chain) = match resolver.resolve(&RequestPath::parse(path)) {
        Ok(chain) => (true, chain),
        Err(e) => (false, e.attempted),
    };

    let links: Vec<_> = chain
        .links()
        .iter()
        .map(|link| {
            let node = tree.node(link.node);
            json!({
                "folder": node.folder,
                "segment": node.kind.to_string(),
                "slots": node.slots.kinds().map(|k| k.to_string()).collect::<Vec<_>>(),
                "params": link.params,
            })
        })
        .collect();
    let not_found = resolver
        .not_found_boundary(&chain)
        .filter(|_| !matched)
        .map(|id| tree.node(id).folder.clone());

    let out = json!({
        "matched": matched,
        "pattern": matched.then(|| chain.pattern().to_string()),
        "params": chain.params(),
        "chain": links,
        "not_found_boundary": not_found,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Catch-all values are `/`-separated: `path=a/b/c`.
fn parse_params(pattern: &str, raw: &[String]) -> Result<Params, String> {
    let mut params = Params::new();
    for item in raw {
        let (name, value) = item
            .split_once('=')
            .ok_or_else(|| format!("expected name=value, got '{}'", item))?;
        let catch_all = pattern.contains(&format!("[...{}]", name));
        let value = if catch_all {
            ParamValue::Multi(value.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect())
        } else {
            ParamValue::Single(value.to_string())
        };
        params.insert(name.to_string(), value);
    }
    Ok(params)
}
