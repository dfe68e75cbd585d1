use std::{
    cell::RefCell,
    collections::HashMap,
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use thread_local::ThreadLocal;
use tracing::{debug, warn};

use rulematch::{
    enhancer::{ExceptionData, FrameContext, MatchFrame},
    ownership::{
        codeowners::{convert_codeowners_syntax, CodeMapping},
        resolver::{create_schema_from_issue_owners, Directory},
        schema::convert_schema_to_rules_text,
    },
    dump_schema, load_schema, parse_rules, MatchCache, MatchPolicy, MatcherList, MatcherRegistry,
    RuleResolver,
};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse ownership rule text and print its JSON schema
    Parse { rules: PathBuf },

    /// Print a JSON schema as ownership rule text
    Render { schema: PathBuf },

    /// Convert a CODEOWNERS file into ownership rule text
    ConvertCodeowners {
        codeowners: PathBuf,

        /// JSON object mapping CODEOWNERS owners to owner names
        #[arg(short = 'a', long)]
        associations: PathBuf,

        #[arg(long, default_value = "")]
        source_root: String,

        #[arg(long, default_value = "")]
        stack_root: String,
    },

    /// Print the owners of event payloads
    Owners {
        #[arg(short = 'r', long)]
        rules: PathBuf,

        /// Read the rules as a JSON schema rather than rule text
        #[arg(long)]
        schema: bool,

        #[arg(long, default_value_t = MatchPolicy::AllMatches)]
        policy: MatchPolicy,

        /// JSON user and team directory used to resolve owners
        #[arg(short = 'd', long)]
        directory: Option<PathBuf>,

        /// Event files, or directories searched for `*.json` files
        paths: Vec<PathBuf>,
    },

    /// Print the indices of the frames matched by enhancer matchers
    Frames {
        /// Matcher expressions, e.g. `app:yes [ function:main ] |`
        #[arg(short = 'm', long)]
        matchers: String,

        /// Event files, or directories searched for `*.json` files
        paths: Vec<PathBuf>,
    },

    /// Check that every owner in a rule file resolves and print its schema
    Validate {
        rules: PathBuf,

        #[arg(short = 'd', long)]
        directory: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Parse { rules } => {
            let rules = parse_rules(&read_to_string(&rules)?)
                .with_context(|| format!("failed to parse {}", rules.display()))?;
            println!("{}", serde_json::to_string_pretty(&dump_schema(&rules))?);
        }
        Command::Render { schema } => {
            print!("{}", convert_schema_to_rules_text(&read_json(&schema)?)?);
        }
        Command::ConvertCodeowners {
            codeowners,
            associations,
            source_root,
            stack_root,
        } => {
            let associations: HashMap<String, String> =
                serde_json::from_value(read_json(&associations)?)
                    .context("associations must be a JSON object of strings")?;
            let mapping = CodeMapping::new(source_root, stack_root);
            let text = read_to_string(&codeowners)?;
            print!("{}", convert_codeowners_syntax(&text, &associations, &mapping));
        }
        Command::Owners {
            rules,
            schema,
            policy,
            directory,
            paths,
        } => {
            let rules = if schema {
                load_schema(&read_json(&rules)?)?
            } else {
                parse_rules(&read_to_string(&rules)?)
                    .with_context(|| format!("failed to parse {}", rules.display()))?
            };
            let directory = directory.as_deref().map(read_directory).transpose()?;
            print_owners(&RuleResolver::new(rules, policy), directory.as_ref(), &paths);
        }
        Command::Frames { matchers, paths } => {
            let registry = MatcherRegistry::new();
            let matchers = MatcherList::parse(&matchers, &registry)
                .with_context(|| format!("invalid matchers `{matchers}`"))?;
            debug!(matchers = %matchers, compiled = registry.len(), "compiled matchers");
            print_matching_frames(&matchers, &paths);
        }
        Command::Validate { rules, directory } => {
            let directory = read_directory(&directory)?;
            let schema = create_schema_from_issue_owners(&read_to_string(&rules)?, &directory)
                .with_context(|| format!("invalid rules in {}", rules.display()))?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

fn print_owners(resolver: &RuleResolver, directory: Option<&Directory>, paths: &[PathBuf]) {
    let results = map_events(&event_paths(paths), |event| {
        let Some(directory) = directory else {
            let owners = resolver.owners(event);
            if owners.is_empty() {
                return "(unowned)".to_owned();
            }
            return join(owners);
        };

        let resolution = resolver.resolve(event, directory);
        if !resolution.unresolved.is_empty() {
            warn!(unresolved = %join(&resolution.unresolved), "owners missing from directory");
        }
        if resolution.actors.is_empty() {
            return "(unowned)".to_owned();
        }
        join(&resolution.actors)
    });
    print_results(results);
}

fn print_matching_frames(matchers: &MatcherList, paths: &[PathBuf]) {
    let caches = ThreadLocal::new();
    let results = map_events(&event_paths(paths), |event| {
        let frames = MatchFrame::from_event(event);
        let exception = ExceptionData::from_event(event);
        let ctx = FrameContext {
            frames: &frames,
            platform: event.get("platform").and_then(Value::as_str).unwrap_or("other"),
            exception: &exception,
        };

        // Each event is its own matching pass; the cache is only reused to
        // keep its allocation.
        let mut cache = caches
            .get_or(|| RefCell::new(MatchCache::new()))
            .borrow_mut();
        cache.clear();
        let indices = matchers.matching_frames(&ctx, &mut cache);
        if indices.is_empty() {
            return "(no frames)".to_owned();
        }
        join(indices)
    });
    print_results(results);
}

fn print_results(results: Vec<(PathBuf, Result<String>)>) {
    for (path, result) in results {
        match result {
            Ok(line) => println!("{:<70}  {}", path.display().to_string(), line),
            Err(err) => eprintln!("error: {}: {:#}", path.display(), err),
        }
    }
}

// Events are loaded and evaluated in parallel when the `rayon` feature is
// enabled. Results keep the order of `paths`.
fn map_events<F>(paths: &[PathBuf], f: F) -> Vec<(PathBuf, Result<String>)>
where
    F: Fn(&Value) -> String + Sync + Send,
{
    let evaluate = |path: &PathBuf| {
        let result = read_json(path).map(|event| f(&event));
        (path.clone(), result)
    };

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        paths.par_iter().map(evaluate).collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        paths.iter().map(evaluate).collect()
    }
}

fn event_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let roots = if paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        paths.to_vec()
    };

    let mut events = Vec::new();
    for root in roots {
        if !root.exists() {
            eprintln!("error: path does not exist: {}", root.display());
        } else if root.is_dir() {
            events.extend(walk_files(&root).map(|entry| entry.into_path()));
        } else {
            events.push(root);
        }
    }
    events
}

fn walk_files(root: impl AsRef<Path>) -> impl Iterator<Item = walkdir::DirEntry> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| !entry.file_type().is_dir())
        .filter(|entry| !entry.path().components().any(|c| c.as_os_str() == ".git"))
        .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "json"))
}

fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("invalid JSON in {}", path.display()))
}

fn read_directory(path: &Path) -> Result<Directory> {
    serde_json::from_value(read_json(path)?)
        .with_context(|| format!("invalid directory in {}", path.display()))
}
