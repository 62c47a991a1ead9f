use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;

use folio::config::Config;
use folio::content::{CredentialFilter, InsightFilter, PageRequest, SortOrder};
use folio::error::ServiceResponse;
use folio::service::ContentServices;
use folio::{api, logging};

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Credentials and insights content service")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./folio.yaml, then $XDG_CONFIG_HOME/folio/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the HTTP API
  Serve {
    /// Address to listen on (overrides the config file)
    #[arg(short, long)]
    bind: Option<SocketAddr>,
  },
  /// Query credentials
  #[command(subcommand)]
  Credentials(CredentialCommand),
  /// Query and publish insights
  #[command(subcommand)]
  Insights(InsightCommand),
}

#[derive(ClapArgs, Debug)]
struct PageArgs {
  #[arg(long, default_value_t = 1)]
  page: i64,
  #[arg(long, default_value_t = 10)]
  page_size: i64,
}

impl PageArgs {
  fn request(&self) -> PageRequest {
    PageRequest::new(self.page, self.page_size)
  }
}

#[derive(Subcommand, Debug)]
enum CredentialCommand {
  /// List credentials
  List {
    #[arg(long = "service-tag")]
    service_tags: Vec<String>,
    #[arg(long = "industry-tag")]
    industry_tags: Vec<String>,
    /// Only active credentials
    #[arg(long)]
    active: bool,
    #[arg(long)]
    search: Option<String>,
    #[command(flatten)]
    page: PageArgs,
  },
  /// Show one credential
  Get { id: String },
  /// Show or hide a credential
  SetActive {
    id: String,
    #[arg(action = clap::ArgAction::Set)]
    active: bool,
  },
}

#[derive(Subcommand, Debug)]
enum InsightCommand {
  /// List insights
  List {
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Only published insights
    #[arg(long)]
    published: bool,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    sort_by: Option<String>,
    #[arg(long)]
    ascending: bool,
    #[command(flatten)]
    page: PageArgs,
  },
  /// Show one insight by slug
  Get { slug: String },
  /// Search published insights
  Search {
    term: String,
    #[command(flatten)]
    page: PageArgs,
  },
  /// Publish an insight
  Publish { id: String },
  /// Return an insight to draft
  Unpublish { id: String },
  /// Published insights sharing tags with one insight
  Related {
    slug: String,
    #[arg(long, default_value_t = 3)]
    limit: u64,
  },
  /// Tags in use across published insights
  Tags,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  let services = ContentServices::build(&config)?;

  match args.command {
    Command::Serve { bind } => {
      let bind = bind.unwrap_or(config.server.bind);
      api::serve(services, bind).await
    }
    Command::Credentials(command) => run_credentials(&services, command).await,
    Command::Insights(command) => run_insights(&services, command).await,
  }
}

async fn run_credentials(services: &ContentServices, command: CredentialCommand) -> Result<()> {
  let service = &services.credentials;
  match command {
    CredentialCommand::List {
      service_tags,
      industry_tags,
      active,
      search,
      page,
    } => {
      let filter = CredentialFilter {
        service_tags: non_empty(service_tags),
        industry_tags: non_empty(industry_tags),
        is_active: active.then_some(true),
        search,
        ..Default::default()
      };
      print(service.list(&filter, &page.request()).await)
    }
    CredentialCommand::Get { id } => print(service.get_by_id(&id).await),
    CredentialCommand::SetActive { id, active } => print(service.set_active(&id, active).await),
  }
}

async fn run_insights(services: &ContentServices, command: InsightCommand) -> Result<()> {
  let service = &services.insights;
  match command {
    InsightCommand::List {
      tags,
      published,
      author,
      sort_by,
      ascending,
      page,
    } => {
      let filter = InsightFilter {
        tags: non_empty(tags),
        is_published: published.then_some(true),
        author,
        ..Default::default()
      };
      let request = PageRequest {
        sort_by,
        sort_order: ascending.then_some(SortOrder::Asc),
        ..page.request()
      };
      print(service.list(&filter, &request).await)
    }
    InsightCommand::Get { slug } => print(service.get_by_slug(&slug).await),
    InsightCommand::Search { term, page } => print(service.search(&term, &page.request()).await),
    InsightCommand::Publish { id } => print(service.publish(&id).await),
    InsightCommand::Unpublish { id } => print(service.unpublish(&id).await),
    InsightCommand::Related { slug, limit } => print(service.get_related(&slug, limit).await),
    InsightCommand::Tags => print(service.list_tags().await),
  }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
  (!values.is_empty()).then_some(values)
}

/// Print the response as JSON; a response error becomes the exit error.
fn print<T: Serialize>(response: ServiceResponse<T>) -> Result<()> {
  let json = serde_json::to_string_pretty(&response)
    .map_err(|e| eyre!("Failed to encode response: {}", e))?;
  println!("{}", json);

  match response.error_message() {
    Some(message) => Err(eyre!(message)),
    None => Ok(()),
  }
}
