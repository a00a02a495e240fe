use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};

use rawcull::{
    CullConfig, CullState, FolderScanner, PreviewCache, RawPreviewDecoder, SortPrompt, Sorter,
};

const USAGE: &str = "usage: rawcull <folder> [--keep-edited] [--sort]";

struct Args {
    folder: PathBuf,
    keep_edited: bool,
    sort: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut folder = None;
    let mut keep_edited = false;
    let mut sort = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--keep-edited" => keep_edited = true,
            "--sort" => sort = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
            path if folder.is_none() => folder = Some(PathBuf::from(path)),
            extra => bail!("unexpected argument {}\n{}", extra, USAGE),
        }
    }

    let folder = folder.with_context(|| USAGE.to_string())?;
    Ok(Args {
        folder,
        keep_edited,
        sort,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("rawcull=info".parse()?),
        )
        .init();

    let args = parse_args()?;
    let config = CullConfig::from_env().validate()?;

    let scan = FolderScanner::new(config.clone())
        .scan_async(args.folder.clone())
        .await?;
    let edited: Vec<PathBuf> = scan.edited().into_iter().map(PathBuf::from).collect();
    let mut state = CullState::from_scan(scan)?;

    if args.keep_edited && !edited.is_empty() {
        let kept = state.auto_keep(edited.iter().map(PathBuf::as_path));
        info!(kept, "Auto-kept edited images");
    }

    if let Some(index) = state.first_unmarked(0) {
        state.go_to(index);
    }
    info!(summary = %state.summary(), current = %state.current().file_name(), "Session ready");

    // Warm the preview window around the starting image.
    let decoder = Arc::new(RawPreviewDecoder::new(config.decode_timeout)?);
    let cache = PreviewCache::new(state.paths(), decoder, &config)?;
    let preview = cache.get(state.current_index());
    if preview.is_placeholder() {
        warn!(file = %state.current().file_name(), "No preview available");
    } else {
        let (width, height) = preview.dimensions();
        info!(width, height, "Decoded starting preview");
    }

    if args.sort {
        match state.sort_prompt() {
            SortPrompt::NothingToSort => {
                println!("No images marked for sorting.");
            }
            prompt => {
                if prompt.offers_review() {
                    info!(deletes = state.summary().delete, "Sorting without delete review");
                }
                let plan = state.skip_review()?;
                let report = Sorter::new(state.root(), &config).execute(&plan)?;
                println!("{}", report.summary_message());
            }
        }
    } else {
        println!("{}", state.summary());
    }

    cache.shutdown();
    Ok(())
}
