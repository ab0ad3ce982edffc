//! `copy-image`: diagnose copying an image asset between two directories.

mod copy;

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use crate::copy::CopyError;

#[derive(Parser, Debug)]
#[command(name = "copy-image", about = "Copy an image asset and report every step")]
struct Cli {
    /// Directory to search for the image.
    #[arg(long, env = "COPY_IMAGE_SRC_DIR", default_value = "src/assets")]
    src_dir: PathBuf,

    /// Directory to copy the image into.
    #[arg(long, env = "COPY_IMAGE_DEST_DIR", default_value = "public")]
    dest_dir: PathBuf,

    /// File name to look for (trimmed, case-insensitive).
    #[arg(default_value = "TechVault_img.png")]
    file: String,

    /// Name of the copy inside the destination directory.
    #[arg(long, default_value = "techvault.png")]
    dest_name: String,

    /// Also copy this destination-directory file to `<stem>_copy.<ext>`.
    #[arg(long)]
    self_test: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CopyError> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    info!("diagnostics start");
    let copied = copy::copy_image(&cli.src_dir, &cli.dest_dir, &cli.file, &cli.dest_name).await;
    match &copied {
        Ok(report) => info!(dest = %report.dest.display(), bytes = report.bytes, "copy finished"),
        Err(err) => error!(%err, "copy failed"),
    }

    let tested = match cli.self_test.as_deref() {
        Some(file) => copy::self_test(&cli.dest_dir, file).await.map(|_| ()),
        None => Ok(()),
    };
    if let Err(err) = &tested {
        error!(%err, "test copy failed");
    }
    info!("diagnostics end");

    copied.map(|_| ()).and(tested)
}
