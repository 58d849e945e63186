use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use storefront_admin::api::ApiClient;
use storefront_admin::config::{self, Config};
use storefront_admin::loader::{
    ChannelSink, Dispatch, ListLoader, LoaderOptions, ResourceFetch, ViewEvent,
};
use storefront_admin::model::{
    Category, ListQuery, Order, OrderStatus, Payout, PayoutStatus, Product, Report, ReportKind,
    ReportRequest, Resource, Tag,
};
use storefront_admin::wizard::{Advance, ProductDraft, ProductWizard};

#[derive(Debug, Parser)]
#[command(author, version, about = "Storefront admin console")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch one page of a resource list
    List {
        resource: Resource,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Read search terms from stdin, one per line, and show the list as it follows them
    Browse {
        resource: Resource,
        #[arg(long)]
        status: Option<String>,
    },
    /// Pending orders, pending payouts and recent reports at a glance
    Summary,
    SetOrderStatus { id: String, status: OrderStatus },
    SetPayoutStatus { id: String, status: PayoutStatus },
    GenerateReport {
        kind: ReportKind,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Run the product wizard over a YAML draft
    CheckDraft { file: PathBuf },
    /// Print an example config.yaml
    ExampleConfig,
}

trait Row {
    fn row(&self) -> String;
}

impl Row for Order {
    fn row(&self) -> String {
        format!(
            "{:<12} {:<24} {:<10} {:>10.2} {} {}",
            self.number,
            self.customer,
            self.status,
            self.total,
            self.currency,
            self.placed_at.format("%Y-%m-%d %H:%M")
        )
    }
}

impl Row for Payout {
    fn row(&self) -> String {
        format!(
            "{:<12} {:<16} {:<9} {:>10.2} {}",
            self.id, self.vendor_id, self.status, self.amount, self.currency
        )
    }
}

impl Row for Category {
    fn row(&self) -> String {
        format!(
            "{:<12} {:<24} {:<20} {}",
            self.id,
            self.name,
            self.slug,
            if self.active { "active" } else { "hidden" }
        )
    }
}

impl Row for Tag {
    fn row(&self) -> String {
        format!("{:<12} {:<24} {}", self.id, self.name, self.slug)
    }
}

impl Row for Report {
    fn row(&self) -> String {
        format!(
            "{:<12} {:<10} {:<10} {} {}",
            self.id,
            self.kind,
            self.status,
            self.created_at.format("%Y-%m-%d"),
            self.download_url.as_deref().unwrap_or("-")
        )
    }
}

impl Row for Product {
    fn row(&self) -> String {
        format!(
            "{:<14} {:<30} {:>10.2} {} {}",
            self.sku, self.name, self.price, self.currency, self.status
        )
    }
}

fn loader_options(cfg: &Config) -> LoaderOptions {
    LoaderOptions {
        debounce: cfg.app.search_debounce(),
        timeout: Some(cfg.app.request_timeout()),
    }
}

fn print_event<T: Row>(event: ViewEvent<T>) {
    match event {
        ViewEvent::Loading(true) => eprintln!("loading..."),
        ViewEvent::Loading(false) => {}
        ViewEvent::Items(items) => {
            if items.is_empty() {
                println!("(no results)");
            }
            for item in &items {
                println!("{}", item.row());
            }
        }
        ViewEvent::Error(message) => eprintln!("error: {}", message),
    }
}

async fn list<T>(client: ApiClient, resource: Resource, query: ListQuery, options: LoaderOptions) -> Result<()>
where
    T: Row + DeserializeOwned + Clone + Send + 'static,
{
    let (sink, mut rx) = ChannelSink::<T>::new();
    let loader: ListLoader<ListQuery, T> =
        ListLoader::mount(ResourceFetch::new(client, resource), sink, LoaderOptions { debounce: Default::default(), ..options });
    let handle = loader
        .request(query)
        .into_handle()
        .context("list request was not started")?;
    handle.settled().await;
    drop(loader);
    while let Ok(event) = rx.try_recv() {
        print_event(event);
    }
    Ok(())
}

async fn browse<T>(client: ApiClient, resource: Resource, base: ListQuery, options: LoaderOptions) -> Result<()>
where
    T: Row + DeserializeOwned + Clone + Send + 'static,
{
    let (sink, mut rx) = ChannelSink::<T>::new();
    let loader: ListLoader<ListQuery, T> =
        ListLoader::mount(ResourceFetch::new(client, resource), sink, options);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last = loader.request(base.clone()).into_handle();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(text) => match loader.request(base.clone().with_search(&text)) {
                        Dispatch::Started(handle) => {
                            debug!(generation = handle.generation(), search = %text.trim(), "search dispatched");
                            last = Some(handle);
                        }
                        Dispatch::Suppressed => info!(search = %text.trim(), "same search already loading"),
                        Dispatch::Detached => break,
                    },
                    None => break,
                }
            }
            Some(event) = rx.recv() => print_event(event),
        }
    }

    if let Some(handle) = last {
        handle.settled().await;
    }
    drop(loader);
    while let Ok(event) = rx.try_recv() {
        print_event(event);
    }
    Ok(())
}

async fn summary(client: &ApiClient, per_page: u32) -> Result<()> {
    let cancel = CancellationToken::new();
    let pending_orders = ListQuery::new(per_page).with_status(OrderStatus::Pending.as_str());
    let pending_payouts = ListQuery::new(per_page).with_status(PayoutStatus::Pending.as_str());
    let recent_reports = ListQuery::new(5);
    let (orders, payouts, reports) = futures::try_join!(
        client.list_orders(&pending_orders, &cancel),
        client.list_payouts(&pending_payouts, &cancel),
        client.list_reports(&recent_reports, &cancel),
    )?;

    println!("Pending orders: {}", orders.len());
    for order in &orders {
        println!("  {}", order.row());
    }
    println!("Pending payouts: {}", payouts.len());
    for payout in &payouts {
        println!("  {}", payout.row());
    }
    println!("Recent reports:");
    for report in &reports {
        println!("  {}", report.row());
    }
    Ok(())
}

async fn check_draft(cfg: &Config, file: &Path) -> Result<bool> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read draft: {}", file.display()))?;
    let draft: ProductDraft = serde_yaml::from_str(&raw).context("invalid draft YAML")?;
    let mut wizard = ProductWizard::new(draft, cfg.currency_table());

    loop {
        let stage = wizard.stage();
        match wizard.next() {
            Ok(Advance::Moved(_)) => println!("[ok] {}", stage),
            Ok(Advance::Finished) => {
                println!("[ok] {}", stage);
                break;
            }
            Err(err) => {
                println!("[blocked] {}", err);
                for field in &err.errors {
                    println!("    {}", field);
                }
                break;
            }
        }
    }

    let remaining = wizard.validate_all();
    match wizard.base_price() {
        Some(price) => println!("Base price: {:.2} {}", price, cfg.currency.base),
        None => println!("Base price: n/a"),
    }
    Ok(remaining.is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ExampleConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    let client = ApiClient::from_config(&cfg)?;
    let options = loader_options(&cfg);
    let per_page = cfg.app.page_size;

    match args.command {
        Command::List {
            resource,
            status,
            search,
            page,
            from,
            to,
        } => {
            let mut query = ListQuery::new(per_page)
                .with_search(search.as_deref().unwrap_or_default())
                .with_range(from, to)
                .with_page(page);
            if let Some(status) = status {
                query = query.with_status(status);
            }
            info!(resource = resource.path(), %query, "listing");
            match resource {
                Resource::Orders => list::<Order>(client, resource, query, options).await?,
                Resource::Payouts => list::<Payout>(client, resource, query, options).await?,
                Resource::Categories => list::<Category>(client, resource, query, options).await?,
                Resource::Tags => list::<Tag>(client, resource, query, options).await?,
                Resource::Reports => list::<Report>(client, resource, query, options).await?,
                Resource::Products(_) => list::<Product>(client, resource, query, options).await?,
            }
        }
        Command::Browse { resource, status } => {
            let mut base = ListQuery::new(per_page);
            if let Some(status) = status {
                base = base.with_status(status);
            }
            match resource {
                Resource::Orders => browse::<Order>(client, resource, base, options).await?,
                Resource::Payouts => browse::<Payout>(client, resource, base, options).await?,
                Resource::Categories => browse::<Category>(client, resource, base, options).await?,
                Resource::Tags => browse::<Tag>(client, resource, base, options).await?,
                Resource::Reports => browse::<Report>(client, resource, base, options).await?,
                Resource::Products(_) => browse::<Product>(client, resource, base, options).await?,
            }
        }
        Command::Summary => summary(&client, per_page).await?,
        Command::SetOrderStatus { id, status } => {
            let order = client.update_order_status(&id, status).await?;
            println!("{}", order.row());
        }
        Command::SetPayoutStatus { id, status } => {
            let payout = client.update_payout_status(&id, status).await?;
            println!("{}", payout.row());
        }
        Command::GenerateReport { kind, from, to } => {
            let report = client
                .generate_report(&ReportRequest { kind, from, to })
                .await?;
            println!("{}", report.row());
        }
        Command::CheckDraft { file } => {
            if !check_draft(&cfg, &file).await? {
                warn!(file = %file.display(), "draft is incomplete");
                std::process::exit(1);
            }
        }
        Command::ExampleConfig => {}
    }

    Ok(())
}
