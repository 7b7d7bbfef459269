//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use newsdesk_core::{
    CancellationToken, IngestOptions, Ingestor, ProgressReporter, RunSummary, SourceReport,
    preferences, query,
};
use newsdesk_shared::{
    AppConfig, ArticleQuery, ArticleView, CanonicalArticle, DEFAULT_PER_PAGE, NewsSource,
    PreferenceItem, UserPreference, init_config, load_config,
};
use newsdesk_sources::{AdapterRegistry, build_http_client};
use newsdesk_storage::Storage;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Newsdesk: aggregate articles from news APIs into a local store.
#[derive(Parser)]
#[command(
    name = "newsdesk",
    version,
    about = "Aggregate articles from NewsAPI, The Guardian and The New York Times into a local store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database file (overrides `defaults.database_path`).
    #[arg(long, env = "NEWSDESK_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch articles from one source or every active source.
    Fetch {
        /// Only fetch from the source with this slug.
        #[arg(long)]
        source: Option<String>,

        /// Fetch and report without storing anything.
        #[arg(long)]
        dry_run: bool,

        /// Print every fetched article and every per-article error.
        #[arg(long)]
        logged: bool,

        /// Sources processed at once (overrides `ingest.concurrency`).
        #[arg(long)]
        concurrency: Option<u32>,
    },

    /// Manage configured news sources.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Browse stored articles.
    Articles {
        #[command(subcommand)]
        action: ArticlesAction,
    },

    /// Show store totals and the most recent articles.
    Status {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Manage a user's feed preferences.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Source subcommands.
#[derive(Subcommand)]
pub(crate) enum SourcesAction {
    /// List sources known to the store.
    List,
    /// Write every `[[sources]]` entry from the config into the store.
    Seed,
}

/// Article subcommands.
#[derive(Subcommand)]
pub(crate) enum ArticlesAction {
    /// List articles, newest first.
    List(ListArgs),
    /// Show one article by id.
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// The ten most recently published articles.
    Latest {
        #[arg(long)]
        json: bool,
    },
    /// Distinct categories.
    Categories,
    /// Distinct authors.
    Authors,
}

/// Filters for `articles list`.
#[derive(Args)]
pub(crate) struct ListArgs {
    /// Substring match over title, description and content.
    #[arg(long)]
    search: Option<String>,

    /// Exact category.
    #[arg(long)]
    category: Option<String>,

    /// Substring match on author.
    #[arg(long)]
    author: Option<String>,

    /// Source id.
    #[arg(long)]
    source_id: Option<i64>,

    /// Earliest publication date (YYYY-MM-DD or RFC 3339).
    #[arg(long)]
    from: Option<String>,

    /// Latest publication date (YYYY-MM-DD or RFC 3339). A bare date covers the whole day.
    #[arg(long)]
    to: Option<String>,

    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u32,

    /// Apply this user's preferences.
    #[arg(long)]
    user: Option<String>,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

/// Preference subcommands.
#[derive(Subcommand)]
pub(crate) enum PrefsAction {
    /// Show a user's preferences.
    Show {
        #[arg(long, env = "NEWSDESK_USER", default_value = "default")]
        user: String,
    },
    /// Replace every preference list for a user.
    Set(SetPrefsArgs),
    /// Add one selected source, category or author.
    Add {
        #[arg(long, env = "NEWSDESK_USER", default_value = "default")]
        user: String,
        #[command(flatten)]
        target: PreferenceTarget,
    },
    /// Remove one selected source, category or author.
    Remove {
        #[arg(long, env = "NEWSDESK_USER", default_value = "default")]
        user: String,
        #[command(flatten)]
        target: PreferenceTarget,
    },
}

/// Arguments for `prefs set`. Omitted lists are cleared.
#[derive(Args)]
pub(crate) struct SetPrefsArgs {
    #[arg(long, env = "NEWSDESK_USER", default_value = "default")]
    user: String,
    #[arg(long, value_delimiter = ',')]
    sources: Vec<i64>,
    #[arg(long, value_delimiter = ',')]
    exclude_sources: Vec<i64>,
    #[arg(long, value_delimiter = ',')]
    categories: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    exclude_categories: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    authors: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    exclude_authors: Vec<String>,
}

/// Exactly one of source, category or author.
#[derive(Args)]
#[group(required = true, multiple = false)]
pub(crate) struct PreferenceTarget {
    #[arg(long)]
    source: Option<i64>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    author: Option<String>,
}

impl PreferenceTarget {
    fn into_item(self) -> Result<PreferenceItem> {
        match (self.source, self.category, self.author) {
            (Some(id), None, None) => Ok(PreferenceItem::Source(id)),
            (None, Some(category), None) => Ok(PreferenceItem::Category(category)),
            (None, None, Some(author)) => Ok(PreferenceItem::Author(author)),
            _ => Err(eyre!("pass exactly one of --source, --category or --author")),
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "newsdesk=info",
        1 => "newsdesk=debug",
        _ => "newsdesk=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let Cli { db, command, .. } = cli;
    // Config commands run without loading the config or opening a database.
    let ctx = move || Context::load(db);

    match command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
        Command::Fetch {
            source,
            dry_run,
            logged,
            concurrency,
        } => cmd_fetch(&ctx()?, source.as_deref(), dry_run, logged, concurrency).await,
        Command::Sources { action } => {
            let ctx = ctx()?;
            match action {
                SourcesAction::List => cmd_sources_list(&ctx).await,
                SourcesAction::Seed => cmd_sources_seed(&ctx).await,
            }
        }
        Command::Articles { action } => {
            let ctx = ctx()?;
            match action {
                ArticlesAction::List(args) => cmd_articles_list(&ctx, args).await,
                ArticlesAction::Show { id, json } => cmd_articles_show(&ctx, &id, json).await,
                ArticlesAction::Latest { json } => cmd_articles_latest(&ctx, json).await,
                ArticlesAction::Categories => {
                    print_values(&query::categories(&ctx.readonly_storage().await?).await?);
                    Ok(())
                }
                ArticlesAction::Authors => {
                    print_values(&query::authors(&ctx.readonly_storage().await?).await?);
                    Ok(())
                }
            }
        }
        Command::Status { json } => cmd_status(&ctx()?, json).await,
        Command::Prefs { action } => cmd_prefs(&ctx()?, action).await,
    }
}

/// Loaded configuration plus the resolved database location.
struct Context {
    config: AppConfig,
    db_path: PathBuf,
}

impl Context {
    fn load(db_override: Option<PathBuf>) -> Result<Self> {
        let config = load_config()?;
        let db_path = match db_override {
            Some(path) => path,
            None => config.database_path()?,
        };
        Ok(Self { config, db_path })
    }

    async fn storage(&self) -> Result<Storage> {
        Ok(Storage::open(&self.db_path).await?)
    }

    async fn readonly_storage(&self) -> Result<Storage> {
        Storage::open_readonly(&self.db_path).await.map_err(|e| {
            eyre!("{e}. Run `newsdesk sources seed` to create the database first")
        })
    }
}

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

async fn cmd_fetch(
    ctx: &Context,
    source: Option<&str>,
    dry_run: bool,
    logged: bool,
    concurrency: Option<u32>,
) -> Result<()> {
    // A dry run never writes, so it can share the database with a live run.
    let storage = Arc::new(if dry_run {
        ctx.readonly_storage().await?
    } else {
        ctx.storage().await?
    });
    let client = build_http_client(&ctx.config.http)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current article");
            on_interrupt.cancel();
        }
    });

    let options = IngestOptions {
        dry_run,
        concurrency: concurrency.unwrap_or(ctx.config.ingest.concurrency).max(1) as usize,
    };
    let ingestor = Ingestor::new(
        storage.clone(),
        storage.clone(),
        AdapterRegistry::global(),
        client,
    )
    .with_options(options)
    .with_cancellation(cancel);

    if dry_run {
        println!("DRY RUN MODE - no articles will be stored");
    }
    println!("Starting news aggregation...");
    info!(source = source.unwrap_or("all"), dry_run, "starting fetch");

    let reporter = Arc::new(CliProgress::new(logged));
    let result = match source {
        Some(slug) => {
            println!("Fetching from source: {slug}");
            ingestor.run_source(slug, reporter.clone()).await
        }
        None => {
            println!("Fetching from all active sources...");
            ingestor.run_all(reporter.clone()).await
        }
    };

    match result {
        Ok(summary) => {
            if summary.sources_processed == 0 && !summary.cancelled {
                println!("No active news sources found");
            }
            print_summary(&summary);
            if summary.cancelled {
                println!("Run interrupted; articles stored so far were kept.");
            } else {
                println!("News aggregation completed.");
            }
            Ok(())
        }
        Err(e) => {
            reporter.clear();
            error!(error = %e, "news aggregation failed");
            print_summary(&RunSummary::empty(dry_run));
            Err(eyre!("news aggregation failed: {e}"))
        }
    }
}

fn print_summary(summary: &RunSummary) {
    let created_label = if summary.dry_run {
        "Would create"
    } else {
        "Created"
    };
    println!();
    println!("  Summary");
    println!("  Sources processed: {}", summary.sources_processed);
    println!("  Articles fetched:  {}", summary.total_articles_fetched);
    println!("  {created_label:<18} {}", summary.total_articles_created);
    println!("  Updated:           {}", summary.total_articles_updated);
    println!("  Errors:            {}", summary.total_errors);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter: an indicatif spinner plus per-source lines.
struct CliProgress {
    spinner: ProgressBar,
    logged: bool,
}

impl CliProgress {
    fn new(logged: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner, logged }
    }

    /// Print above the spinner. Still prints when stdout is not a terminal.
    fn line(&self, text: String) {
        self.spinner.suspend(|| println!("{text}"));
    }

    fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn run_started(&self, sources: usize, _dry_run: bool) {
        self.spinner
            .set_message(format!("Processing {sources} source(s)"));
    }

    fn source_started(&self, source: &NewsSource) {
        self.line(format!("Processing: {} ({})", source.name, source.slug));
        self.spinner
            .set_message(format!("Fetching articles from {}", source.name));
    }

    fn articles_fetched(&self, source: &NewsSource, articles: &[CanonicalArticle]) {
        if articles.is_empty() {
            self.line(format!("  No articles fetched from {}", source.name));
            return;
        }
        self.line(format!(
            "  Fetched {} articles from {}",
            articles.len(),
            source.name
        ));
        if self.logged {
            for article in articles {
                self.line(format!("    - {}", article.display_title()));
            }
        }
    }

    fn source_finished(&self, report: &SourceReport) {
        self.line(format!(
            "  {}: created {}, updated {}, errors {} ({:.1}s)",
            report.source_name,
            report.articles_created,
            report.articles_updated,
            report.errors.len(),
            report.elapsed.as_secs_f64()
        ));
        if self.logged {
            for item in &report.errors {
                self.line(format!("    ! {}: {}", item.title, item.error));
            }
        }
    }

    fn run_finished(&self, _summary: &RunSummary) {
        self.clear();
    }
}

// ---------------------------------------------------------------------------
// sources
// ---------------------------------------------------------------------------

async fn cmd_sources_list(ctx: &Context) -> Result<()> {
    let storage = ctx.readonly_storage().await?;
    let sources = storage.list_sources().await?;
    if sources.is_empty() {
        println!("No sources in the store. Run `newsdesk sources seed`.");
        return Ok(());
    }

    println!("  {:>4}  {:<12} {:<28} ACTIVE", "ID", "SLUG", "NAME");
    for source in sources {
        println!(
            "  {:>4}  {:<12} {:<28} {}",
            source.id,
            source.slug,
            source.name,
            if source.is_active { "yes" } else { "no" }
        );
    }
    Ok(())
}

async fn cmd_sources_seed(ctx: &Context) -> Result<()> {
    let storage = ctx.storage().await?;
    for entry in &ctx.config.sources {
        let api_key = entry.resolve_api_key();
        let source = storage.upsert_source(entry, &api_key).await?;
        info!(slug = %source.slug, id = source.id, "seeded source");
        println!(
            "  {:<12} id={:<4} key={}",
            source.slug,
            source.id,
            if api_key.is_empty() { "missing" } else { "set" }
        );
    }
    println!("Seeded {} source(s) into {}", ctx.config.sources.len(), ctx.db_path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// articles / status
// ---------------------------------------------------------------------------

async fn cmd_articles_list(ctx: &Context, args: ListArgs) -> Result<()> {
    let article_query = ArticleQuery {
        search: args.search,
        category: args.category,
        author: args.author,
        source_id: args.source_id,
        start_date: args
            .from
            .as_deref()
            .map(|v| parse_date_bound(v, false))
            .transpose()?,
        end_date: args
            .to
            .as_deref()
            .map(|v| parse_date_bound(v, true))
            .transpose()?,
        page: args.page,
        per_page: args.per_page,
    };

    let storage = ctx.readonly_storage().await?;
    let page = query::list_articles(&storage, &article_query, args.user.as_deref()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    for view in &page.data {
        print_article_line(view);
    }
    match (page.from, page.to) {
        (Some(from), Some(to)) => println!(
            "\n  {from}-{to} of {} (page {}/{})",
            page.total, page.current_page, page.last_page
        ),
        _ => println!("  No articles match."),
    }
    Ok(())
}

async fn cmd_articles_show(ctx: &Context, id: &str, json: bool) -> Result<()> {
    let storage = ctx.readonly_storage().await?;
    let view = query::show_article(&storage, id)
        .await?
        .ok_or_else(|| eyre!("article '{id}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let article = &view.article;
    println!();
    println!("  {}", article.title);
    println!("  ID:        {}", article.id);
    if let Some(source) = &view.news_source {
        println!("  Source:    {} ({})", source.name, source.slug);
    }
    println!("  Published: {}", article.published_at.format("%Y-%m-%d %H:%M UTC"));
    if let Some(author) = &article.author {
        println!("  Author:    {author}");
    }
    if let Some(category) = &article.category {
        println!("  Category:  {category}");
    }
    if !article.tags.is_empty() {
        println!("  Tags:      {}", article.tags.join(", "));
    }
    if let Some(url) = &article.url {
        println!("  URL:       {url}");
    }
    println!();
    println!("  {}", article.description);
    println!();
    Ok(())
}

async fn cmd_articles_latest(ctx: &Context, json: bool) -> Result<()> {
    let storage = ctx.readonly_storage().await?;
    let latest = query::latest_articles(&storage).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&latest)?);
    } else {
        latest.iter().for_each(print_article_line);
    }
    Ok(())
}

async fn cmd_status(ctx: &Context, json: bool) -> Result<()> {
    let storage = ctx.readonly_storage().await?;
    let report = query::status(&storage).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  Database:       {}", ctx.db_path.display());
    println!("  Articles:       {}", report.total_articles);
    println!("  Active sources: {}", report.active_sources);
    for count in &report.articles_per_source {
        println!("    {:<28} {}", count.source.name, count.articles);
    }
    if !report.recent_articles.is_empty() {
        println!();
        println!("  Recent articles");
        report.recent_articles.iter().for_each(print_article_line);
    }
    println!();
    Ok(())
}

fn print_article_line(view: &ArticleView) {
    let source = view
        .news_source
        .as_ref()
        .map(|s| s.name.as_str())
        .unwrap_or("unknown source");
    println!(
        "  {}  {}  [{}]",
        view.article.published_at.format("%Y-%m-%d %H:%M"),
        view.article.title,
        source
    );
    println!("      {}", view.article.id);
}

fn print_values(values: &[String]) {
    for value in values {
        println!("  {value}");
    }
}

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp. A bare date is widened to the
/// start or end of that day (UTC).
fn parse_date_bound(value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| eyre!("invalid date '{value}': {e}"))?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| eyre!("invalid time of day"))?;
    Ok(date.and_time(time).and_utc())
}

// ---------------------------------------------------------------------------
// prefs
// ---------------------------------------------------------------------------

async fn cmd_prefs(ctx: &Context, action: PrefsAction) -> Result<()> {
    let prefs = match action {
        PrefsAction::Show { user } => {
            let storage = ctx.readonly_storage().await?;
            preferences::show(&storage, &user).await?
        }
        PrefsAction::Set(args) => {
            let storage = ctx.storage().await?;
            let prefs = UserPreference {
                selected_sources: args.sources,
                excluded_sources: args.exclude_sources,
                selected_categories: args.categories,
                excluded_categories: args.exclude_categories,
                selected_authors: args.authors,
                excluded_authors: args.exclude_authors,
                ..UserPreference::new(args.user)
            };
            preferences::replace(&storage, &prefs).await?
        }
        PrefsAction::Add { user, target } => {
            let storage = ctx.storage().await?;
            preferences::add(&storage, &user, target.into_item()?).await?
        }
        PrefsAction::Remove { user, target } => {
            let storage = ctx.storage().await?;
            preferences::remove(&storage, &user, target.into_item()?).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&prefs)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
