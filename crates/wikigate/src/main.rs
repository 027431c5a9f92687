use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use wikigate_core::config::{WikiConfig, WikiConfigPatch, load_config, patch_wiki_config};
use wikigate_core::links::ArticleLinker;
use wikigate_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, init_layout, resolve_paths,
};
use wikigate_core::title::{
    TitleParts, base_name, decompose, path_to_subpage, subpage, uri_to_wiki, wiki_to_uri,
};

#[derive(Debug, Parser)]
#[command(
    name = "wikigate",
    version,
    about = "Normalize MediaWiki page titles and build article URLs"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Root page of each title (namespace included)")]
    Base(TitlesArgs),
    #[command(about = "Parent path of each subpage; empty line when there is none")]
    Parent(TitlesArgs),
    #[command(about = "Leaf segment of each title")]
    Subpage(TitlesArgs),
    #[command(name = "to-uri", about = "Convert wiki-form titles to URL form")]
    ToUri(TitlesArgs),
    #[command(name = "to-wiki", about = "Convert URL-form titles to wiki form")]
    ToWiki(TitlesArgs),
    #[command(about = "Show every view of each title")]
    Inspect(InspectArgs),
    #[command(about = "Article URL of each title on the configured wiki")]
    Url(TitlesArgs),
    #[command(name = "from-url", about = "Recover titles from article URLs")]
    FromUrl(UrlsArgs),
    #[command(about = "Create .wikigate/config.toml")]
    Init(InitArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct TitlesArgs {
    #[arg(value_name = "TITLE", help = "Titles to convert; read from stdin when omitted")]
    titles: Vec<String>,
}

#[derive(Debug, Args)]
struct InspectArgs {
    #[arg(long, help = "Emit JSON instead of key/value lines")]
    json: bool,
    #[arg(value_name = "TITLE", help = "Titles to inspect; read from stdin when omitted")]
    titles: Vec<String>,
}

#[derive(Debug, Args)]
struct UrlsArgs {
    #[arg(value_name = "URL", help = "Article URLs; read from stdin when omitted")]
    urls: Vec<String>,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    #[command(about = "Print resolved wiki settings")]
    Show,
    #[command(about = "Update keys under [wiki] in the config file")]
    Set(ConfigSetArgs),
}

#[derive(Debug, Args)]
struct ConfigSetArgs {
    #[arg(long, value_name = "URL")]
    url: Option<String>,
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,
    #[arg(long, value_name = "PATH", help = "Article path containing $1, e.g. /wiki/$1")]
    article_path: Option<String>,
    #[arg(long, value_name = "TEXT")]
    summary: Option<String>,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Base(args)) => print_each(args.titles, |title| base_name(title).to_string()),
        Some(Commands::Parent(args)) => print_each(args.titles, |title| {
            path_to_subpage(title).unwrap_or_default().to_string()
        }),
        Some(Commands::Subpage(args)) => print_each(args.titles, |title| subpage(title).to_string()),
        Some(Commands::ToUri(args)) => print_each(args.titles, |title| wiki_to_uri(title)),
        Some(Commands::ToWiki(args)) => print_each(args.titles, uri_to_wiki),
        Some(Commands::Inspect(args)) => run_inspect(args),
        Some(Commands::Url(args)) => run_url(&runtime, args),
        Some(Commands::FromUrl(args)) => run_from_url(&runtime, args),
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Config(ConfigArgs { command })) => match command {
            ConfigSubcommand::Show => run_config_show(&runtime),
            ConfigSubcommand::Set(args) => run_config_set(&runtime, args),
        },
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("WIKIGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn print_each<F>(values: Vec<String>, convert: F) -> Result<()>
where
    F: Fn(&str) -> String,
{
    for value in collect_inputs(values)? {
        println!("{}", convert(&value));
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let titles = collect_inputs(args.titles)?;
    let parts = titles
        .iter()
        .map(|title| decompose(title))
        .collect::<Vec<_>>();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&parts)?);
        return Ok(());
    }
    for (index, item) in parts.iter().enumerate() {
        if index > 0 {
            println!();
        }
        print_title_parts(item);
    }
    Ok(())
}

fn print_title_parts(parts: &TitleParts<'_>) {
    println!("title: {}", parts.title);
    println!("namespace: {}", parts.namespace.unwrap_or("<none>"));
    println!("name: {}", parts.name);
    println!("legal: {}", format_flag(parts.legal));
    println!("base: {}", parts.base);
    println!("parent: {}", parts.parent.unwrap_or("<none>"));
    println!("subpage: {}", parts.subpage);
    println!("uri: {}", parts.uri);
}

fn run_url(runtime: &RuntimeOptions, args: TitlesArgs) -> Result<()> {
    let (paths, linker) = load_linker(runtime)?;
    for title in collect_inputs(args.titles)? {
        println!("{}", linker.article_url(&title)?);
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_from_url(runtime: &RuntimeOptions, args: UrlsArgs) -> Result<()> {
    let (paths, linker) = load_linker(runtime)?;
    let mut rejected = Vec::new();
    for url in collect_inputs(args.urls)? {
        match linker.title_from_url(&url) {
            Some(title) => println!("{title}"),
            None => rejected.push(url),
        }
    }
    print_diagnostics(runtime, &paths);

    if !rejected.is_empty() {
        bail!(
            "{} URL(s) are not article URLs of {} (article path {}):\n  - {}",
            rejected.len(),
            linker.base_url(),
            linker.article_path(),
            rejected.join("\n  - ")
        );
    }
    Ok(())
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, &InitOptions { force: args.force })?;

    println!("Initialized wikigate layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    if report.wrote_config {
        println!("wrote_config: yes");
    } else {
        println!("wrote_config: no (already exists; use --force to overwrite)");
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_config_show(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;

    println!(
        "config_path: {} ({})",
        normalize_path(&paths.config_path),
        if paths.config_path.exists() {
            "found"
        } else {
            "missing"
        }
    );
    println!("wiki_url: {}", display_optional(config.wiki_url()));
    println!("api_url: {}", display_optional(config.api_url_owned()));
    println!("article_path: {}", config.article_path_owned());
    println!("user_agent: {}", config.user_agent());
    println!("summary: {}", config.summary());
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_config_set(runtime: &RuntimeOptions, args: ConfigSetArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let patch = WikiConfigPatch {
        set_url: args.url,
        set_api_url: args.api_url,
        set_article_path: args.article_path,
        set_summary: args.summary,
    };
    let wrote = patch_wiki_config(&paths.config_path, &patch)?;
    if wrote {
        println!("Updated {}", normalize_path(&paths.config_path));
    } else {
        println!("No changes to {}", normalize_path(&paths.config_path));
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn load_linker(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, ArticleLinker)> {
    let paths = resolve_runtime_paths(runtime)?;
    let config: WikiConfig = load_config(&paths.config_path)?;
    let linker = ArticleLinker::from_config(&config).with_context(|| {
        format!(
            "cannot build article URLs (config: {})",
            normalize_path(&paths.config_path)
        )
    })?;
    debug!(
        base_url = linker.base_url(),
        article_path = linker.article_path(),
        "article linker ready"
    );
    Ok((paths, linker))
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn collect_inputs(values: Vec<String>) -> Result<Vec<String>> {
    if !values.is_empty() {
        return Ok(values);
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read input from stdin")?;
    Ok(split_input_lines(&buffer))
}

fn split_input_lines(buffer: &str) -> Vec<String> {
    buffer.lines().map(ToString::to_string).collect()
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn display_optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "<unset>".to_string())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_titles_and_global_flags() {
        let cli = Cli::try_parse_from([
            "wikigate",
            "to-uri",
            "Getting there & away",
            "Namespace:Foo/Bar",
            "--diagnostics",
        ])
        .expect("parse");
        assert!(cli.diagnostics);
        match cli.command {
            Some(Commands::ToUri(args)) => assert_eq!(args.titles.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_config_set() {
        let cli = Cli::try_parse_from([
            "wikigate",
            "config",
            "set",
            "--url",
            "https://w.example",
            "--article-path",
            "/wiki/$1",
        ])
        .expect("parse");
        match cli.command {
            Some(Commands::Config(ConfigArgs {
                command: ConfigSubcommand::Set(args),
            })) => {
                assert_eq!(args.url.as_deref(), Some("https://w.example"));
                assert_eq!(args.article_path.as_deref(), Some("/wiki/$1"));
                assert!(args.summary.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn legality_flag_renders_as_yes_no() {
        assert_eq!(format_flag(decompose("Main Page").legal), "yes");
        assert_eq!(format_flag(decompose("Foo|Bar").legal), "no");
    }

    #[test]
    fn stdin_lines_keep_blank_entries() {
        assert_eq!(
            split_input_lines("Foo bar\r\n\nBaz/Qux\n"),
            vec!["Foo bar", "", "Baz/Qux"]
        );
    }
}
