//! chatbot-admin - command-line console for the chatbot backend.
//!
//! # Usage
//!
//! ```bash
//! # Store the admin token once
//! chatbot-admin token set "$ADMIN_TOKEN"
//!
//! # List customers, filtered by name or id
//! chatbot-admin customers list --query acme
//!
//! # Change widget branding
//! chatbot-admin widget set cust_123 --bot-name "Max" --header-color "#112233"
//!
//! # Usage statistics for the last 30 days
//! chatbot-admin stats --days 30 --customer cust_123
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;

use chatbot_admin::answers::AnswersQuery;
use chatbot_admin::auth::CredentialProvider;
use chatbot_admin::branding::{clamp_hex_color, TextColorMode, WidgetSettings};
use chatbot_admin::config::{ClientOptions, BACKEND_BASE_KEY};
use chatbot_admin::customers::{parse_limit, CustomerDirectory, CustomerDraft, DeleteOptions};
use chatbot_admin::error::Error;
use chatbot_admin::ingest::{CrawlRequest, DomainCrawlRequest, IngestRequest, PurgeRequest};
use chatbot_admin::prefs::{FilePreferences, MemoryPreferences, PreferenceStore};
use chatbot_admin::stats::StatsQuery;
use chatbot_admin::ChatbotAdmin;

#[derive(Parser)]
#[command(name = "chatbot-admin")]
#[command(author, version, about = "Admin console for the chatbot backend")]
struct Cli {
    /// Backend base URL (persisted once accepted)
    #[arg(long, global = true, env = "CHATBOT_ADMIN_BACKEND")]
    backend: Option<String>,

    /// Launch link carrying backend_base/api_base/backend and admin_token
    #[arg(long, global = true, conflicts_with = "backend")]
    link: Option<Url>,

    /// Preference file (defaults to ~/.config/chatbot-admin/prefs.json)
    #[arg(long, global = true, env = "CHATBOT_ADMIN_PREFS")]
    prefs: Option<PathBuf>,

    /// Admin token to store before running the command
    #[arg(long, global = true, env = "CHATBOT_ADMIN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved configuration
    Config,
    /// Manage the stored admin token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Manage customers
    Customers {
        #[command(subcommand)]
        action: CustomerAction,
    },
    /// Customize the chat widget
    Widget {
        #[command(subcommand)]
        action: WidgetAction,
    },
    /// Show interaction totals and daily counts
    Stats {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Show recent questions and answers
    Answers {
        #[command(flatten)]
        window: WindowArgs,

        /// Maximum number of records
        #[arg(long, default_value_t = chatbot_admin::answers::DEFAULT_LIMIT)]
        limit: u32,

        /// Free-text search
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Upload text content for a customer
    Ingest {
        customer_id: String,

        /// Content to upload
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,

        /// Read the content from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Metadata as a JSON object
        #[arg(long, default_value = "")]
        metadata: String,

        /// Upload even if identical content was uploaded recently
        #[arg(long)]
        force: bool,
    },
    /// Crawl a single page
    Crawl { customer_id: String, url: String },
    /// Crawl a whole site from a start page
    CrawlDomain {
        customer_id: String,
        start_url: String,

        /// Maximum pages (1-250)
        #[arg(long)]
        max_pages: Option<i64>,

        /// Maximum link depth (1-6)
        #[arg(long)]
        max_depth: Option<i64>,

        /// Delay between fetches in milliseconds (0-5000)
        #[arg(long)]
        delay_ms: Option<i64>,

        /// Follow links to other origins
        #[arg(long)]
        any_origin: bool,

        /// Ignore robots.txt
        #[arg(long)]
        ignore_robots: bool,
    },
    /// Delete a customer's stored documents
    Purge {
        customer_id: String,

        /// Only documents whose source starts with this prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Only report how many documents would be deleted
        #[arg(long)]
        dry_run: bool,

        /// Confirm deleting all documents when no prefix is given
        #[arg(long)]
        all: bool,
    },
}

#[derive(Args)]
struct WindowArgs {
    /// Reporting window in days
    #[arg(long, default_value_t = chatbot_admin::stats::DEFAULT_DAYS)]
    days: u32,

    /// Restrict to one customer
    #[arg(short, long)]
    customer: Option<String>,
}

impl WindowArgs {
    fn query(&self) -> StatsQuery {
        StatsQuery::new(self.days).with_customer(self.customer.as_deref())
    }
}

#[derive(Subcommand)]
enum TokenAction {
    /// Store a token
    Set { token: String },
    /// Forget the stored token
    Clear,
    /// Tell whether a token is stored
    Status,
}

#[derive(Args)]
struct CustomerFields {
    #[arg(long)]
    name: Option<String>,

    /// Plan (`standard`, `pro`, ...)
    #[arg(long)]
    plan: Option<String>,

    /// Model override; empty clears it
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    system_prompt: Option<String>,

    /// Allowed embedding domain; repeat for several
    #[arg(long = "domain")]
    domains: Vec<String>,

    /// Monthly message limit; empty clears it
    #[arg(long)]
    monthly_limit: Option<String>,

    /// Requests per minute limit; empty clears it
    #[arg(long)]
    rpm_limit: Option<String>,
}

impl CustomerFields {
    fn apply(&self, mut draft: CustomerDraft) -> CustomerDraft {
        if let Some(v) = &self.name {
            draft = draft.with_name(v);
        }
        if let Some(v) = &self.plan {
            draft = draft.with_plan(v);
        }
        if let Some(v) = &self.model {
            draft = draft.with_model(v);
        }
        if let Some(v) = &self.system_prompt {
            draft = draft.with_system_prompt(v);
        }
        if !self.domains.is_empty() {
            draft = draft.with_allowed_domains_text(&self.domains.join("\n"));
        }
        if let Some(v) = &self.monthly_limit {
            draft = draft.with_monthly_message_limit(parse_limit(v));
        }
        if let Some(v) = &self.rpm_limit {
            draft = draft.with_ask_rpm_limit(parse_limit(v));
        }
        draft
    }
}

#[derive(Subcommand)]
enum CustomerAction {
    /// List customers
    List {
        /// Filter by name or id
        #[arg(short, long, default_value = "")]
        query: String,
    },
    /// Show one customer in full
    Show { id: String },
    /// Create a customer
    Create {
        #[command(flatten)]
        fields: CustomerFields,
    },
    /// Update a customer's fields
    Update {
        id: String,

        #[command(flatten)]
        fields: CustomerFields,
    },
    /// Delete a customer
    Delete {
        id: String,

        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,

        /// Also delete the customer's documents
        #[arg(long)]
        documents: bool,

        /// Also delete the customer's interactions
        #[arg(long)]
        interactions: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Issue a new widget key; the old key stops working
    RegenerateKey {
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum WidgetAction {
    /// Show current widget settings and the embed snippet
    Show { id: String },
    /// Change widget settings
    Set {
        id: String,

        /// Start from the defaults instead of the stored settings
        #[arg(long)]
        reset: bool,

        #[arg(long)]
        bot_name: Option<String>,

        #[arg(long)]
        user_label: Option<String>,

        /// Text on the launcher button
        #[arg(long)]
        greeting_text: Option<String>,

        /// First message in a new chat
        #[arg(long)]
        first_message: Option<String>,

        /// Header color as #rrggbb
        #[arg(long)]
        header_color: Option<String>,

        /// Accent color as #rrggbb
        #[arg(long)]
        accent_color: Option<String>,

        /// `auto`, `light` or `dark`
        #[arg(long)]
        text_color_mode: Option<String>,
    },
    /// Upload an image as the bot avatar
    AvatarUpload { id: String, file: PathBuf },
    /// Remove the bot avatar
    AvatarDelete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the embed snippet
    Snippet { id: String },
}

/// Asks for the admin token on the terminal
struct PromptCredentials;

#[async_trait]
impl CredentialProvider for PromptCredentials {
    async fn acquire(&self) -> Option<String> {
        let answer = tokio::task::spawn_blocking(|| read_line("Admin token: "))
            .await
            .ok()
            .flatten()?;
        let answer = answer.trim().to_string();
        (!answer.is_empty()).then_some(answer)
    }
}

fn read_line(prompt: &str) -> Option<String> {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "{}", prompt);
    let _ = stderr.flush();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

fn confirm(question: &str, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }
    read_line(&format!("{} [y/N] ", question))
        .map(|a| matches!(a.trim().to_lowercase().as_str(), "y" | "yes" | "j" | "ja"))
        .unwrap_or(false)
}

fn open_prefs(path: Option<PathBuf>) -> Arc<dyn PreferenceStore> {
    match path.or_else(FilePreferences::default_path) {
        Some(path) => Arc::new(FilePreferences::new(path)),
        None => {
            tracing::warn!("no preference file location, settings will not persist");
            Arc::new(MemoryPreferences::new())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Build the client from a launch link when one is given, else from the
/// backend flag
fn connect(
    link: Option<&Url>,
    backend: Option<&str>,
    prefs: Arc<dyn PreferenceStore>,
    provider: Arc<dyn CredentialProvider>,
) -> Result<ChatbotAdmin, Error> {
    match link {
        Some(link) => {
            let (admin, scrubbed) =
                ChatbotAdmin::from_launch_link(link, prefs, provider, ClientOptions::default())?;
            tracing::debug!(link = %scrubbed, "launch link applied");
            Ok(admin)
        }
        None => ChatbotAdmin::new_with_options(backend, prefs, provider, ClientOptions::default()),
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let prefs_path = cli.prefs.clone().or_else(FilePreferences::default_path);
    let prefs = open_prefs(cli.prefs);

    let admin = connect(
        cli.link.as_ref(),
        cli.backend.as_deref(),
        prefs.clone(),
        Arc::new(PromptCredentials),
    )?;
    if let Some(token) = &cli.token {
        admin.tokens().set(token);
    }

    let mut directory = CustomerDirectory::new();

    match cli.command {
        Commands::Config => {
            println!("backend:      {}", admin.base);
            println!(
                "stored base:  {}",
                prefs.get(BACKEND_BASE_KEY).unwrap_or_else(|| "-".into())
            );
            println!(
                "preferences:  {}",
                prefs_path.map_or_else(|| "(memory)".into(), |p| p.display().to_string())
            );
            println!(
                "admin token:  {}",
                if admin.tokens().get().is_some() { "set" } else { "not set" }
            );
        }
        Commands::Token { action } => match action {
            TokenAction::Set { token } => {
                if !admin.tokens().set(&token) {
                    return Err(Error::validation("token must not be blank"));
                }
                println!("Token stored.");
            }
            TokenAction::Clear => {
                admin.tokens().clear();
                println!("Token removed.");
            }
            TokenAction::Status => {
                let state = if admin.tokens().get().is_some() { "set" } else { "not set" };
                println!("Admin token {}.", state);
            }
        },
        Commands::Customers { action } => customers(&admin, &mut directory, action).await?,
        Commands::Widget { action } => widget(&admin, &mut directory, action).await?,
        Commands::Stats { window } => stats(&admin, window.query()).await?,
        Commands::Answers {
            window,
            limit,
            query,
        } => {
            let query = AnswersQuery::new(window.query())
                .with_limit(limit)
                .with_text(query.as_deref());
            answers(&admin, &query).await?;
        }
        Commands::Ingest {
            customer_id,
            content,
            file,
            metadata,
            force,
        } => {
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(path)) => tokio::fs::read_to_string(path).await?,
                (None, None) => String::new(),
            };
            let request = IngestRequest::new(&customer_id, &content, &metadata)?;
            let ingest = admin.ingest();
            if ingest.is_recent_duplicate(&request)
                && !force
                && !confirm("Identical content was uploaded recently. Upload again?", false)
            {
                println!("Skipped.");
                return Ok(());
            }
            println!("{}", ingest.ingest(&request).await?);
        }
        Commands::Crawl { customer_id, url } => {
            let outcome = admin.ingest().crawl(&CrawlRequest::new(&customer_id, &url)?).await?;
            println!("{}", outcome);
        }
        Commands::CrawlDomain {
            customer_id,
            start_url,
            max_pages,
            max_depth,
            delay_ms,
            any_origin,
            ignore_robots,
        } => {
            let request = DomainCrawlRequest::new(&customer_id, &start_url)?
                .with_max_pages(max_pages)
                .with_max_depth(max_depth)
                .with_delay_ms(delay_ms)
                .with_same_origin(!any_origin)
                .with_respect_robots(!ignore_robots);
            eprintln!(
                "Crawling up to {} pages, depth {} ...",
                request.max_pages, request.max_depth
            );
            let stats = admin.ingest().crawl_domain(&request).await?;
            println!("Domain crawl finished. {}", stats);
        }
        Commands::Purge {
            customer_id,
            prefix,
            dry_run,
            all,
        } => {
            let request = PurgeRequest::new(&customer_id)?
                .with_source_prefix(prefix.as_deref())
                .with_dry_run(dry_run)
                .with_confirm_all(all);
            let outcome = admin.ingest().purge(&request).await?;
            if outcome.dry_run {
                println!("Dry run: would delete {} document(s).", outcome.documents);
            } else {
                println!("Deleted {} document(s).", outcome.documents);
            }
        }
    }

    Ok(())
}

async fn customers(
    admin: &ChatbotAdmin,
    directory: &mut CustomerDirectory,
    action: CustomerAction,
) -> Result<(), Error> {
    let client = admin.customers();

    match action {
        CustomerAction::List { query } => {
            let total = client.list(directory).await?;
            let picker = directory.picker_options(&query, None);
            for option in &picker.options {
                println!("{}", option.label);
            }
            if query.trim().is_empty() {
                println!("{} customer(s).", total);
            } else {
                println!("{} / {} customer(s) (filtered).", picker.options.len(), total);
            }
        }
        CustomerAction::Show { id } => {
            let customer = client.get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&customer.to_value())?);
            let plan_default = customer.plan.as_ref().and_then(|p| p.default_model());
            println!(
                "plan default model: {} · effective model: {}",
                plan_default.unwrap_or("—"),
                customer.effective_model().unwrap_or("—")
            );
        }
        CustomerAction::Create { fields } => {
            let draft = fields.apply(CustomerDraft::new());
            let created = client.create(directory, &draft).await?;
            println!("Customer created: {}", created.label());
        }
        CustomerAction::Update { id, fields } => {
            let current = client
                .ensure_full(directory, &id)
                .await
                .ok_or_else(|| Error::general(format!("customer {} could not be loaded", id)))?;
            let draft = fields.apply(CustomerDraft::from_customer(&current));
            let updated = client.update(directory, &id, &draft).await?;
            println!("Saved: {}", updated.label());
        }
        CustomerAction::Delete {
            id,
            dry_run,
            documents,
            interactions,
            yes,
        } => {
            let confirmed = dry_run
                || confirm(
                    &format!("Really delete customer {}? This cannot be undone.", id),
                    yes,
                );
            if !confirmed {
                println!("Aborted.");
                return Ok(());
            }
            let options = DeleteOptions {
                dry_run,
                delete_documents: documents,
                delete_interactions: interactions,
                confirmed,
            };
            let outcome = client.delete(directory, &id, options).await?;
            if outcome.dry_run {
                println!("Dry run: would delete {}", outcome.counts);
            } else {
                println!("Deleted {}", outcome.counts);
            }
        }
        CustomerAction::RegenerateKey { id, yes } => {
            if !confirm(
                "Regenerate the widget key? The old key stops working.",
                yes,
            ) {
                println!("Aborted.");
                return Ok(());
            }
            let updated = client.regenerate_widget_key(directory, &id).await?;
            println!(
                "New widget key: {}",
                updated.widget_key.as_deref().unwrap_or("—")
            );
            if let Some(snippet) = admin
                .widget()
                .widget_snippet(updated.widget_key.as_deref().unwrap_or_default())
            {
                println!("{}", snippet);
            }
        }
    }
    Ok(())
}

async fn widget(
    admin: &ChatbotAdmin,
    directory: &mut CustomerDirectory,
    action: WidgetAction,
) -> Result<(), Error> {
    let client = admin.widget();

    match action {
        WidgetAction::Show { id } => {
            let (customer, settings) = client.load_settings(directory, &id).await?;
            println!("{}", serde_json::to_string_pretty(&settings.preview_json())?);
            match client.widget_snippet(customer.widget_key.as_deref().unwrap_or_default()) {
                Some(snippet) => println!("\n{}", snippet),
                None => println!("\nNo widget key yet."),
            }
        }
        WidgetAction::Set {
            id,
            reset,
            bot_name,
            user_label,
            greeting_text,
            first_message,
            header_color,
            accent_color,
            text_color_mode,
        } => {
            let (_, stored) = client.load_settings(directory, &id).await?;
            let mut settings = if reset {
                WidgetSettings {
                    avatar_url: stored.avatar_url,
                    ..WidgetSettings::default()
                }
            } else {
                stored
            };

            if let Some(v) = bot_name {
                settings.bot_name = v;
            }
            if let Some(v) = user_label {
                settings.user_label = v;
            }
            if let Some(v) = greeting_text {
                settings.greeting_text = v;
            }
            if let Some(v) = first_message {
                settings.first_message = v;
            }
            if let Some(v) = header_color {
                settings.header_color = clamp_hex_color(&v, &settings.header_color);
            }
            if let Some(v) = accent_color {
                settings.accent_color = clamp_hex_color(&v, &settings.accent_color);
            }
            if let Some(v) = text_color_mode {
                settings.text_color_mode = TextColorMode::parse_lenient(&v);
            }

            let saved = client.save_settings(directory, &id, &settings).await?;
            println!("Widget settings saved.");
            println!("{}", serde_json::to_string_pretty(&saved.preview_json())?);
        }
        WidgetAction::AvatarUpload { id, file } => {
            let upload = client.upload_avatar(&id, &file).await?;
            println!("Avatar uploaded: {}", upload.url);

            let mut settings = match upload.widget_settings {
                Some(settings) => settings,
                None => client.load_settings(directory, &id).await?.1,
            };
            settings.avatar_url = Some(upload.url);
            client.save_settings(directory, &id, &settings).await?;
            println!("Widget settings saved.");
        }
        WidgetAction::AvatarDelete { id, yes } => {
            if !confirm("Really remove the avatar?", yes) {
                println!("Aborted.");
                return Ok(());
            }
            if client.delete_avatar(&id).await?.is_none() {
                let (_, mut settings) = client.load_settings(directory, &id).await?;
                settings.avatar_url = None;
                client.save_settings(directory, &id, &settings).await?;
            }
            println!("Avatar removed.");
        }
        WidgetAction::Snippet { id } => {
            let customer = admin
                .customers()
                .ensure_full(directory, &id)
                .await
                .ok_or_else(|| Error::general(format!("customer {} could not be loaded", id)))?;
            let snippet = client
                .widget_snippet(customer.widget_key.as_deref().unwrap_or_default())
                .ok_or_else(|| Error::general("customer has no widget key yet"))?;
            println!("{}", snippet);
        }
    }
    Ok(())
}

async fn stats(admin: &ChatbotAdmin, query: StatsQuery) -> Result<(), Error> {
    let client = admin.stats();
    let show = |v: Option<u64>| v.map_or_else(|| "–".to_string(), |n| n.to_string());

    // Totals and daily rows load independently; one failing does not hide the other
    match client.totals(&query).await {
        Ok(report) => {
            println!("Totals (via {})", report.via);
            println!(
                "  total: {}  allowed: {}  blocked: {}",
                show(report.data.total),
                show(report.data.allowed),
                show(report.data.blocked)
            );
        }
        Err(e) => eprintln!("Could not load totals: {}", e),
    }

    let report = client.daily(&query).await?;
    println!("\nDaily (via {})", report.via);
    if report.data.is_empty() {
        println!("  No data.");
    }
    println!("  {:<12} {:>8} {:>8} {:>8}", "date", "total", "allowed", "blocked");
    for row in &report.data {
        println!(
            "  {:<12} {:>8} {:>8} {:>8}",
            row.date, row.total, row.allowed, row.blocked
        );
    }
    Ok(())
}

async fn answers(admin: &ChatbotAdmin, query: &AnswersQuery) -> Result<(), Error> {
    let report = admin.answers().list(query).await?;
    println!("{} record(s) (via {})", report.data.len(), report.via);
    for record in &report.data {
        println!(
            "\n[{}] {} · {}",
            record.display_time(),
            record.customer,
            record.status
        );
        println!("  Q: {}", record.question);
        println!("  A: {}", record.answer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbot_admin::auth::NoCredentials;

    #[test]
    fn test_connect_applies_launch_link() {
        let prefs: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferences::new());
        let link =
            Url::parse("https://admin.example.com/?api_base=https://api.example.com/&admin_token=tok")
                .unwrap();

        let admin = connect(Some(&link), None, prefs.clone(), Arc::new(NoCredentials)).unwrap();

        assert_eq!(admin.base.as_str(), "https://api.example.com");
        assert_eq!(admin.tokens().get().as_deref(), Some("tok"));
        assert_eq!(
            prefs.get(BACKEND_BASE_KEY).as_deref(),
            Some("https://api.example.com")
        );
    }

    #[test]
    fn test_connect_without_link_uses_backend_flag() {
        let prefs: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferences::new());

        let admin = connect(
            None,
            Some("https://other.example.com/"),
            prefs,
            Arc::new(NoCredentials),
        )
        .unwrap();

        assert_eq!(admin.base.as_str(), "https://other.example.com");
        assert_eq!(admin.tokens().get(), None);
    }
}
