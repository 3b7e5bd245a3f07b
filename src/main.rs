use catalog_images::config::{self, ImagingConfig};
use catalog_images::context::Context;
use catalog_images::imaging::RustBackend;
use catalog_images::ingest::{self, SizeRequest, UploadRequest};
use catalog_images::repository::FileRepository;
use catalog_images::security::SignatureScanner;
use catalog_images::{manage, output, rename};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Repository state file inside the storage root.
const CATALOG_FILE: &str = ".catalog.json";

#[derive(Parser)]
#[command(name = "catalog-images")]
#[command(about = "Product image storage: upload, thumbnails, derivatives, renames")]
#[command(long_about = "\
Product image storage: upload, thumbnails, derivatives, renames

Files live under one directory per product:

  images/
  ├── .catalog.json        # Content, data resource and association records
  └── P1/
      ├── photo.JPG        # Original (name(1).ext on collision)
      ├── photo-100.jpg    # 100x100 thumbnail from the upload
      └── photo-200.JPG    # Extra thumbnail added with `thumbnail --width 200`

Set RUST_LOG=debug to trace each pipeline stage.
Run 'catalog-images gen-config' to generate a documented catalog-images.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./catalog-images.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload an image for a product
    Ingest {
        /// Image file to upload
        file: PathBuf,
        #[arg(long)]
        product: String,
        /// Stored filename (default: the file's own name)
        #[arg(long)]
        name: Option<String>,
        /// Content type as a browser would report it (default: from extension)
        #[arg(long)]
        content_type: Option<String>,
        /// Generate one derivative: preset name or WxH
        #[arg(long, conflicts_with = "all_sizes")]
        resize: Option<String>,
        /// Generate every size in derivatives.size_list
        #[arg(long)]
        all_sizes: bool,
    },
    /// Rename a product image and every thumbnail linked to it
    Rename {
        #[arg(long)]
        product: String,
        #[arg(long)]
        content: String,
        /// New filename; the extension must stay the same type
        #[arg(long)]
        name: String,
    },
    /// Delete a stored file
    Remove {
        #[arg(long)]
        product: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        name: String,
    },
    /// Add a square thumbnail size to an existing image
    Thumbnail {
        #[arg(long)]
        product: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        width: u32,
    },
    /// Fit a stored image into a square box, overwriting it
    Resize {
        #[arg(long)]
        product: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        width: u32,
    },
    /// Print a stock catalog-images.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(cli.config.as_deref())?;
    let repo = open_repository(&config)?;
    let backend = RustBackend::new();
    let ctx = Context::new(&config, &backend, &repo);

    match cli.command {
        Command::Ingest {
            file,
            product,
            name,
            content_type,
            resize,
            all_sizes,
        } => {
            let bytes = std::fs::read(&file)?;
            let filename = match name {
                Some(n) => n,
                None => file_name(&file)?,
            };
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&file));
            let resize = match (resize, all_sizes) {
                (Some(label), _) => Some(SizeRequest::Single(label)),
                (None, true) => Some(SizeRequest::Configured),
                (None, false) => None,
            };
            let outcome = ingest::ingest(
                &ctx,
                &SignatureScanner::new(),
                &UploadRequest {
                    product_id: &product,
                    filename: &filename,
                    content_type: &content_type,
                    bytes: &bytes,
                    resize,
                },
            )?;
            output::print_ingest_output(&outcome);
        }
        Command::Rename {
            product,
            content,
            name,
        } => {
            let outcome = rename::rename_primary(&ctx, &product, &content, &name)?;
            output::print_rename_output(&outcome);
        }
        Command::Remove {
            product,
            content,
            name,
        } => {
            let removed = manage::remove_image_file(&config, &product, &content, &name)?;
            println!("{}", output::format_remove_output(&name, removed));
        }
        Command::Thumbnail {
            product,
            content,
            name,
            width,
        } => {
            let added = manage::create_new_thumbnail(&ctx, &product, &content, &name, width)?;
            for line in output::format_thumbnail_output(&added) {
                println!("{line}");
            }
        }
        Command::Resize {
            product,
            name,
            width,
        } => {
            let dims = manage::resize_in_place(&ctx, &product, &name, width)?;
            println!("{}", output::format_resize_output(&name, dims));
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Log to stderr so command output on stdout stays clean.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_repository(config: &ImagingConfig) -> Result<FileRepository, Box<dyn std::error::Error>> {
    let root = Path::new(&config.storage_root);
    std::fs::create_dir_all(root)?;
    let path = root.join(CATALOG_FILE);
    debug!(path = %path.display(), "opening catalog");
    Ok(FileRepository::open(&path)?)
}

fn file_name(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("{} has no file name", path.display()).into())
}

fn guess_content_type(path: &Path) -> String {
    image::ImageFormat::from_path(path)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}
