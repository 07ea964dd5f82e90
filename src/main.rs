//! libris CLI: library catalog and finding-aid research workbench.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use libris::analysis::{AnalysisClient, OpenAiBackend};
use libris::config::{self, LibrisConfig};
use libris::extract::{PdfTextExtractor, TextExtractor};
use libris::model::{Book, EducationLevel, Publication};
use libris::paths::LibrisPaths;
use libris::project::ProjectUpdate;
use libris::search::{self, ScholarSearch};
use libris::secret;
use libris::workbench::{Upload, Workbench};

#[derive(Parser)]
#[command(
    name = "libris",
    version,
    about = "Library catalog and finding-aid research workbench"
)]
struct Cli {
    /// Data directory for persistent storage (overrides config and LIBRIS_DATA_DIR).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file to load instead of the XDG default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directories and write a default config file.
    Init,

    /// Print a fresh random secret key (64 hex characters).
    SecretKey,

    /// Show record counts.
    Status,

    /// Print the effective configuration as TOML.
    Config,

    /// Extract and print the text of a PDF, page by page.
    Extract {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// Analyze text with the language model, without storing anything.
    Analyze {
        /// Text to analyze. Use --file to read a PDF instead.
        text: Option<String>,

        /// Extract the text to analyze from this PDF.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Audience the analysis is framed for.
        #[arg(long, default_value = "undergraduate")]
        level: EducationLevel,
    },

    /// Search for scholarly publications.
    Search {
        /// Search query.
        query: String,

        /// Maximum number of results.
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Book catalog management.
    Books {
        #[command(subcommand)]
        action: BookAction,
    },

    /// Research project management.
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Finding-aid analysis management.
    Analyses {
        #[command(subcommand)]
        action: AnalysisAction,
    },

    /// Resize an image into one or more preset sizes (WebP output).
    Image {
        /// Path to the source image (png, jpg, jpeg, webp).
        file: PathBuf,

        /// Title used to name the output files.
        #[arg(long)]
        title: String,

        /// Preset size such as 1200x630. Repeat for several renditions.
        #[arg(long = "size", required = true)]
        sizes: Vec<String>,
    },
}

#[derive(Subcommand)]
enum BookAction {
    /// List every book.
    List,
    /// Show a single book.
    Show { id: String },
    /// Add a book to the catalog.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        isbn: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        genre: String,
    },
    /// Delete a book.
    Delete { id: String },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// List every project.
    List,
    /// Create a project.
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "undergraduate")]
        level: EducationLevel,
    },
    /// Show a project with its finding aids.
    Show { id: String },
    /// Edit a project's fields.
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        level: Option<EducationLevel>,
    },
    /// Delete a project and the finding aids only it references.
    Delete { id: String },
    /// Upload a PDF finding aid into a project.
    Upload {
        /// Project ID.
        id: String,
        /// Path to the PDF file.
        file: PathBuf,
        #[arg(long, default_value = "undergraduate")]
        level: EducationLevel,
    },
    /// Link an existing finding-aid file to a project.
    Attach { id: String, file_id: String },
    /// Unlink a finding-aid file from a project.
    Detach { id: String, file_id: String },
    /// Search publications and store the results on the project.
    Search { id: String, query: String },
}

#[derive(Subcommand)]
enum AnalysisAction {
    /// Show an analysis record.
    Show {
        id: String,
        /// Also print the extracted page texts.
        #[arg(long)]
        pages: bool,
    },
    /// Analyze the full extracted text of a finding aid and store the result.
    Run { id: String },
    /// Delete an analysis, unlinking and removing its file.
    Delete { id: String },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::SecretKey => {
            println!("{}", secret::generate_secret_key());
        }

        Commands::Extract { file } => {
            let pages = PdfTextExtractor.extract_file(&file)?;
            for (i, page) in pages.iter().enumerate() {
                println!("--- page {} ---", i + 1);
                println!("{page}");
            }
        }

        Commands::Config => {
            let (mut config, _) = load(&cli.config, &cli.data_dir)?;
            if config.openai.api_key.is_some() {
                config.openai.api_key = Some("<redacted>".to_string());
            }
            print!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
        }

        Commands::Init => {
            let existing = cli.config.clone().filter(|p| p.exists());
            let (_, paths) = load(&existing, &cli.data_dir)?;
            paths.ensure_dirs()?;
            let config_file = cli.config.clone().unwrap_or_else(|| paths.config_file());
            if config_file.exists() {
                println!("Config already exists: {}", config_file.display());
            } else {
                LibrisConfig::default().save(&config_file)?;
                println!("Wrote {}", config_file.display());
            }
            println!("Data directory: {}", paths.data_dir.display());
        }

        Commands::Analyze { text, file, level } => {
            let (config, _) = load(&cli.config, &cli.data_dir)?;
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(file)) => PdfTextExtractor.extract_file(&file)?.join("\n"),
                (None, None) => miette::bail!("provide TEXT or --file <PDF>"),
            };
            let client = AnalysisClient::new(
                OpenAiBackend::new(config.openai.clone()),
                config.analysis.clone(),
            );
            let analysis = client.analyze(&text, level)?;
            println!("Summary:\n  {}", analysis.summary);
            println!("Research topics:");
            for topic in &analysis.research_topics {
                println!("  - {topic}");
            }
        }

        Commands::Search { query, limit } => {
            let (config, _) = load(&cli.config, &cli.data_dir)?;
            let provider = ScholarSearch::new(config.search.clone());
            let results = search::search_or_empty(&provider, &query, limit);
            print_publications(&results);
        }

        Commands::Status => {
            let workbench = open(&cli.config, &cli.data_dir)?;
            let status = workbench.status()?;
            println!("Data directory: {}", workbench.paths().data_dir.display());
            println!("Books:          {}", status.books);
            println!("Projects:       {}", status.projects);
            println!("Finding aids:   {}", status.finding_aids);
            println!("Analyses:       {}", status.analyses);
        }

        Commands::Books { action } => {
            let workbench = open(&cli.config, &cli.data_dir)?;
            run_books(&workbench, action)?;
        }

        Commands::Projects { action } => {
            let workbench = open(&cli.config, &cli.data_dir)?;
            run_projects(&workbench, action)?;
        }

        Commands::Analyses { action } => {
            let workbench = open(&cli.config, &cli.data_dir)?;
            run_analyses(&workbench, action)?;
        }

        Commands::Image { file, title, sizes } => {
            let workbench = open(&cli.config, &cli.data_dir)?;
            let data = std::fs::read(&file).into_diagnostic()?;
            let filename = file_name(&file);
            for line in workbench.process_image(&title, &filename, &data, &sizes)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn load(
    config_file: &Option<PathBuf>,
    data_dir: &Option<PathBuf>,
) -> Result<(LibrisConfig, LibrisPaths)> {
    let (mut config, paths) = config::load_environment(config_file.as_deref())?;
    match data_dir {
        Some(dir) => {
            config.data_dir = Some(dir.clone());
            let paths = paths.apply_config(&config);
            Ok((config, paths))
        }
        None => Ok((config, paths)),
    }
}

fn open(config_file: &Option<PathBuf>, data_dir: &Option<PathBuf>) -> Result<Workbench> {
    let (config, paths) = load(config_file, data_dir)?;
    Ok(Workbench::open(&config, paths)?)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn run_books(workbench: &Workbench, action: BookAction) -> Result<()> {
    match action {
        BookAction::List => {
            let books = workbench.list_books()?;
            if books.is_empty() {
                println!("No books.");
            }
            for book in books {
                println!(
                    "{}  {} by {} ({}, {})",
                    book.id, book.doc.title, book.doc.author, book.doc.published_year, book.doc.genre
                );
            }
        }
        BookAction::Show { id } => {
            let book = workbench.book(&id)?;
            println!("{}", serde_json::to_string_pretty(&book).into_diagnostic()?);
        }
        BookAction::Add {
            title,
            author,
            isbn,
            year,
            genre,
        } => {
            let id = workbench.create_book(&Book {
                title,
                author,
                isbn,
                published_year: year,
                genre,
            })?;
            println!("Added book {id}");
        }
        BookAction::Delete { id } => {
            workbench.delete_book(&id)?;
            println!("Deleted book {id}");
        }
    }
    Ok(())
}

fn run_projects(workbench: &Workbench, action: ProjectAction) -> Result<()> {
    match action {
        ProjectAction::List => {
            let projects = workbench.list_projects()?;
            if projects.is_empty() {
                println!("No projects.");
            }
            for project in projects {
                println!(
                    "{}  {} [{}] ({} finding aids)",
                    project.id,
                    project.doc.title,
                    project.doc.education_level,
                    project.doc.finding_aid_ids.len()
                );
            }
        }
        ProjectAction::Create {
            title,
            description,
            level,
        } => {
            let id = workbench.create_project(&title, &description, level)?;
            println!("Created project {id}");
        }
        ProjectAction::Show { id } => {
            let overview = workbench.project_overview(&id)?;
            let project = &overview.project.doc;
            println!("{}  {}", overview.project.id, project.title);
            println!("Level: {}", project.education_level);
            if !project.description.is_empty() {
                println!("{}", project.description);
            }
            println!("Finding aids:");
            for entry in &overview.finding_aids {
                let state = entry
                    .analysis
                    .as_ref()
                    .map(|a| a.doc.state().to_string())
                    .unwrap_or_else(|| "no analysis".to_string());
                println!("  {}  {} ({state})", entry.file.id, entry.file.doc.filename);
            }
            if !project.search_results.is_empty() {
                println!("Search results:");
                print_publications(&project.search_results);
            }
        }
        ProjectAction::Update {
            id,
            title,
            description,
            level,
        } => {
            let current = workbench.project(&id)?.doc;
            let updated = workbench.update_project(
                &id,
                &ProjectUpdate {
                    title: title.unwrap_or(current.title),
                    description: description.unwrap_or(current.description),
                    education_level: level.unwrap_or(current.education_level),
                },
            )?;
            println!("Updated project {}", updated.id);
        }
        ProjectAction::Delete { id } => {
            let report = workbench.delete_project(&id)?;
            println!(
                "Deleted project {id}: {} analyses removed, {} unlinked, {} files removed",
                report.analyses_deleted, report.analyses_unlinked, report.files_deleted
            );
        }
        ProjectAction::Upload { id, file, level } => {
            let data = std::fs::read(&file).into_diagnostic()?;
            let filename = file_name(&file);
            let receipt = workbench.upload_finding_aid(Upload {
                filename: &filename,
                data: &data,
                education_level: level,
                project_id: &id,
            })?;
            println!(
                "Uploaded {} ({} pages): file {}, analysis {}",
                receipt.filename, receipt.pages, receipt.file_id, receipt.analysis_id
            );
        }
        ProjectAction::Attach { id, file_id } => {
            if workbench.attach_finding_aid(&id, &file_id)? {
                println!("Attached {file_id} to project {id}");
            } else {
                println!("{file_id} is already attached to project {id}");
            }
        }
        ProjectAction::Detach { id, file_id } => {
            workbench.remove_finding_aid(&id, &file_id)?;
            println!("Detached {file_id} from project {id}");
        }
        ProjectAction::Search { id, query } => {
            let results = workbench.search_for_project(&id, &query)?;
            println!("Added {} search results to the project", results.len());
            print_publications(&results);
        }
    }
    Ok(())
}

fn run_analyses(workbench: &Workbench, action: AnalysisAction) -> Result<()> {
    match action {
        AnalysisAction::Show { id, pages } => {
            let record = workbench.analysis(&id)?;
            let analysis = &record.doc;
            println!("{}  file {} [{}]", record.id, analysis.file_id, analysis.state());
            println!("Level: {}", analysis.education_level);
            if let Some(summary) = &analysis.summary {
                println!("Summary:\n  {summary}");
            }
            if let Some(topics) = &analysis.research_topics {
                println!("Research topics:");
                for topic in topics {
                    println!("  - {topic}");
                }
            }
            if pages {
                for (i, page) in analysis.extracted_text_pages.iter().enumerate() {
                    println!("--- page {} ---", i + 1);
                    println!("{page}");
                }
            }
        }
        AnalysisAction::Run { id } => {
            let analysis = workbench.analyze_full(&id)?;
            println!("Summary:\n  {}", analysis.summary);
            println!("Research topics:");
            for topic in &analysis.research_topics {
                println!("  - {topic}");
            }
        }
        AnalysisAction::Delete { id } => {
            workbench.delete_analysis(&id)?;
            println!("Deleted analysis {id}");
        }
    }
    Ok(())
}

fn print_publications(results: &[Publication]) {
    if results.is_empty() {
        println!("No results.");
    }
    for (i, publication) in results.iter().enumerate() {
        println!(
            "{:>3}. {} ({}, {})",
            i + 1,
            publication.title,
            publication.author,
            publication.year
        );
        if publication.url != "N/A" {
            println!("     {}", publication.url);
        }
    }
}
