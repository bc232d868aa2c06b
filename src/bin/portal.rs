use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use client_portal::content::{ContentRow, ContentService, ContentScreen, Screen};
use client_portal::format::{
    format_date, format_duration, format_optional_size, progress_percent, status_label,
};
use client_portal::logging::init_logging;
use client_portal::models::{Certificate, Document, Video};
use client_portal::progress::sync_once;
use client_portal::router::Navigation;
use client_portal::upload::{ContentKind, FileSelection, UploadForm, UploadProgress};
use client_portal::viewer::{RendererKind, ViewerModal};
use client_portal::{Portal, PortalConfig};

#[derive(Parser, Debug)]
#[clap(name = "portal", version)]
#[clap(about = "Client portal: videos, documents and certificates over a Supabase backend", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Account email; without credentials the portal runs signed out
    #[clap(long, env = "PORTAL_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[clap(long, env = "PORTAL_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// Read from the admin screens instead of the client dashboard
    #[clap(long, global = true)]
    admin: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Video,
    Document,
    Certificate,
}

impl From<Kind> for ContentKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Video => ContentKind::Video,
            Kind::Document => ContentKind::Document,
            Kind::Certificate => ContentKind::Certificate,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a path for the signed-in user
    Route { path: String },
    /// Dashboard counters
    Overview,
    /// List videos with watch progress
    Videos {
        #[clap(long)]
        search: Option<String>,
    },
    /// List documents
    Documents {
        #[clap(long)]
        search: Option<String>,
    },
    /// List certificates
    Certificates {
        #[clap(long)]
        search: Option<String>,
    },
    /// List client profiles (admin)
    Clients {
        #[clap(long)]
        search: Option<String>,
    },
    /// Publish or hide a row (admin)
    Publish {
        #[clap(value_enum)]
        kind: Kind,
        id: Uuid,
        /// Hide instead of publishing
        #[clap(long)]
        hide: bool,
    },
    /// Delete a row (admin); needs --yes to go through
    Delete {
        #[clap(value_enum)]
        kind: Kind,
        id: Uuid,
        #[clap(long)]
        yes: bool,
    },
    /// Upload a file and create its row (admin)
    Upload {
        #[clap(value_enum)]
        kind: Kind,
        file: PathBuf,
        #[clap(long)]
        title: String,
        #[clap(long)]
        category: Option<String>,
        #[clap(long)]
        description: Option<String>,
        /// Video duration in seconds
        #[clap(long)]
        duration: Option<i32>,
        /// Owning client of a certificate
        #[clap(long)]
        client: Option<Uuid>,
        #[clap(long)]
        thumbnail: Option<PathBuf>,
        #[clap(long)]
        publish: bool,
    },
    /// Show how a document or certificate would be previewed
    Preview {
        #[clap(value_enum)]
        kind: Kind,
        id: Uuid,
    },
    /// Record a document download and print its URL
    Download { id: Uuid },
    /// Report playback progress for a video
    Watch {
        id: Uuid,
        /// Elapsed playback seconds
        #[clap(long)]
        seconds: f64,
    },
}

async fn run() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = PortalConfig::from_env().context("Failed to load portal configuration")?;
    init_logging(&config.log_level)?;

    let portal = Portal::start(config).await?;

    if let (Some(email), Some(password)) = (&cli.email, &cli.password) {
        portal
            .session()
            .sign_in(email, password)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;
    }

    let content = portal.content();
    let screen = if cli.admin { Screen::Admin } else { Screen::Dashboard };

    match cli.command {
        Commands::Route { path } => match portal.navigate(&path) {
            Navigation::Loading => println!("loading"),
            Navigation::Render(route) => println!("render {}", route),
            Navigation::Redirect(target) => println!("redirect {}", target),
        },
        Commands::Overview => {
            let overview = content.overview(screen).await?;
            println!("videos:       {}", overview.videos);
            println!("documents:    {}", overview.documents);
            println!("certificates: {}", overview.certificates);
            if let Some(clients) = overview.clients {
                println!("clients:      {}", clients);
            }
        }
        Commands::Videos { search } => {
            let listing = searched::<Video>(content, screen, search).await;
            let views = content.list_video_progress().await;
            for video in listing.visible() {
                let progress = views
                    .iter()
                    .find(|view| view.video_id == video.id)
                    .map(|view| {
                        let percent = progress_percent(view.progress_seconds, video.duration_seconds);
                        if view.completed {
                            format!("{}% completed", percent)
                        } else {
                            format!("{}%", percent)
                        }
                    })
                    .unwrap_or_default();
                println!(
                    "{}  {}  {}  {}  {}  {}",
                    video.id,
                    video.title,
                    video.category.as_deref().unwrap_or("-"),
                    video
                        .duration_seconds
                        .map(|secs| format_duration(i64::from(secs)))
                        .unwrap_or_else(|| "-".to_string()),
                    status_label(video.is_published),
                    progress
                );
            }
        }
        Commands::Documents { search } => {
            let listing = searched::<Document>(content, screen, search).await;
            for document in listing.visible() {
                println!(
                    "{}  {}  {}  {}  {}  {}",
                    document.id,
                    document.title,
                    document.file_type.as_deref().unwrap_or("-"),
                    format_optional_size(document.file_size),
                    status_label(document.is_published),
                    format_date(&document.created_at)
                );
            }
        }
        Commands::Certificates { search } => {
            let listing = searched::<Certificate>(content, screen, search).await;
            for certificate in listing.visible() {
                let owner = certificate
                    .client
                    .as_ref()
                    .and_then(|owner| owner.company_name.clone().or_else(|| owner.full_name.clone()))
                    .unwrap_or_else(|| certificate.client_id.to_string());
                println!(
                    "{}  {}  {}  {}  {}",
                    certificate.id,
                    certificate.title,
                    owner,
                    status_label(certificate.is_published),
                    format_date(&certificate.created_at)
                );
            }
        }
        Commands::Clients { search } => {
            let mut listing = ContentScreen::new(content.try_list_clients().await?);
            if let Some(query) = search {
                listing.set_query(&query);
            }
            for profile in listing.visible() {
                println!(
                    "{}  {}  {}  {}",
                    profile.id,
                    profile.display_name(),
                    profile.company_name.as_deref().unwrap_or("-"),
                    if profile.is_active { "active" } else { "inactive" }
                );
            }
        }
        Commands::Publish { kind, id, hide } => {
            let published = !hide;
            let remaining = match kind {
                Kind::Video => content.set_published::<Video>(id, published).await?.len(),
                Kind::Document => content.set_published::<Document>(id, published).await?.len(),
                Kind::Certificate => content.set_published::<Certificate>(id, published).await?.len(),
            };
            println!("{} {} ({} rows listed)", status_label(published), id, remaining);
        }
        Commands::Delete { kind, id, yes } => match kind {
            Kind::Video => delete::<Video>(content, id, yes).await?,
            Kind::Document => delete::<Document>(content, id, yes).await?,
            Kind::Certificate => delete::<Certificate>(content, id, yes).await?,
        },
        Commands::Upload {
            kind,
            file,
            title,
            category,
            description,
            duration,
            client,
            thumbnail,
            publish,
        } => {
            let mut form = UploadForm::create(kind.into())
                .with_title(&title)
                .with_published(publish)
                .with_file(FileSelection::from_path(&file).await?);
            form.category = category;
            form.description = description;
            form.duration_seconds = duration;
            form.client_id = client;
            if let Some(thumbnail) = thumbnail {
                form = form.with_thumbnail(FileSelection::from_path(&thumbnail).await?);
            }

            let progress = UploadProgress::new();
            let mut updates = progress.subscribe();
            let reporter = tokio::spawn(async move {
                while updates.changed().await.is_ok() {
                    let percent = *updates.borrow();
                    eprintln!("upload {}%", percent);
                }
            });

            let result = form.submit(portal.backend(), &progress).await;
            reporter.abort();
            let id = result.map_err(|e| anyhow!(e.user_message()))?;
            println!("created {}", id);
        }
        Commands::Preview { kind, id } => {
            let (title, file_name, file_type, file_url) = match kind {
                Kind::Document => {
                    let document = find::<Document>(content, screen, id).await?;
                    (document.title, document.file_name, document.file_type, document.file_url)
                }
                Kind::Certificate => {
                    let certificate = find::<Certificate>(content, screen, id).await?;
                    (
                        certificate.title,
                        certificate.file_name,
                        certificate.file_type,
                        certificate.file_url,
                    )
                }
                Kind::Video => return Err(anyhow!("Videos open in the player, not the viewer")),
            };
            let modal = ViewerModal::open(
                portal.backend().config(),
                &title,
                &file_name,
                file_type.as_deref(),
                &file_url,
            );
            match &modal.renderer {
                RendererKind::Pdf { src } => println!("pdf {}", src),
                RendererKind::Office { src } => println!("office {}", src),
                RendererKind::Image { src } => println!("image {}", src),
                RendererKind::Unsupported { download_url } => {
                    println!("preview unavailable; download {}", download_url)
                }
            }
        }
        Commands::Download { id } => {
            let document = find::<Document>(content, Screen::Dashboard, id).await?;
            let url = content.record_download(&document).await?;
            println!("{}", url);
        }
        Commands::Watch { id, seconds } => {
            let video = content
                .get_video(Screen::Dashboard, id)
                .await?
                .ok_or_else(|| anyhow!("Video {} not found", id))?;
            let synced = sync_once(portal.backend(), video.id, video.duration_seconds, seconds).await?;
            println!("{}", if synced { "progress saved" } else { "nothing to save" });
        }
    }

    Ok(())
}

async fn searched<T: ContentRow>(
    content: &ContentService,
    screen: Screen,
    search: Option<String>,
) -> ContentScreen<T> {
    let mut listing = content.load::<T>(screen).await;
    if let Some(query) = search {
        listing.set_query(&query);
    }
    listing
}

async fn find<T: ContentRow>(content: &ContentService, screen: Screen, id: Uuid) -> anyhow::Result<T> {
    content
        .try_list::<T>(screen)
        .await?
        .into_iter()
        .find(|row| row.id() == id)
        .ok_or_else(|| anyhow!("{} {} not found", T::TABLE, id))
}

async fn delete<T: ContentRow>(content: &ContentService, id: Uuid, confirmed: bool) -> anyhow::Result<()> {
    let row = find::<T>(content, Screen::Admin, id).await?;
    let pending = content.request_delete(&row);
    if !confirmed {
        println!("Delete \"{}\"? This cannot be undone. Re-run with --yes to confirm.", pending.title);
        return Ok(());
    }
    let title = pending.title.clone();
    let remaining = content.confirm_delete(pending).await?;
    println!("Deleted \"{}\" ({} rows left)", title, remaining.len());
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
