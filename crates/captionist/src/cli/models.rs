//! The `captionist models` command for managing the captioning model.

use captionist_core::{BlipModel, Config};
use clap::{Args, Subcommand};
use std::path::Path;

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download the BLIP vision encoder, text decoder and tokenizer
    Download,

    /// List installed model files
    List,

    /// Show model directory path
    Path,
}

/// Hugging Face repository with the ONNX export of BLIP base.
const BLIP_REPO: &str = "Xenova/blip-image-captioning-base";

/// Remote paths, in the same order as [`BlipModel::model_files`].
const REMOTE_FILES: [(&str, &str); 3] = [
    ("vision encoder", "onnx/vision_model.onnx"),
    ("text decoder", "onnx/text_decoder_model.onnx"),
    ("tokenizer", "tokenizer.json"),
];

/// Execute the models command.
pub async fn execute(args: ModelsArgs) -> anyhow::Result<()> {
    let config = Config::load()?;

    match args.command {
        ModelsCommand::Download => {
            let client = reqwest::Client::new();
            download_blip(&config, &client).await?;
            tracing::info!("All downloads complete.");
        }

        ModelsCommand::List => {
            let model_dir = config.caption_model_dir();

            if !model_dir.exists() {
                println!("No models installed.");
                println!("Run `captionist models download` to download the captioning model.");
                return Ok(());
            }

            println!("Installed models:");
            println!("  Directory: {}\n", model_dir.display());
            println!("  {} (device: {}):", config.caption.model, config.caption.device);

            for path in BlipModel::model_files(&model_dir) {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let status = if path.exists() { "ready" } else { "not installed" };
                println!("    - {:30} {}", name, status);
            }

            if !BlipModel::model_exists(&model_dir) {
                println!("\n  Incomplete. Run `captionist models download` to fetch the missing files.");
            }
        }

        ModelsCommand::Path => {
            println!("{}", config.caption_model_dir().display());
        }
    }

    Ok(())
}

/// Download every missing BLIP file into the configured model directory.
pub async fn download_blip(config: &Config, client: &reqwest::Client) -> anyhow::Result<()> {
    let model_dir = config.caption_model_dir();
    std::fs::create_dir_all(&model_dir)?;

    for (dest, (label, remote)) in BlipModel::model_files(&model_dir).iter().zip(REMOTE_FILES) {
        if dest.exists() {
            tracing::info!("BLIP {} already exists at {:?}", label, dest);
            continue;
        }

        let url = format!("https://huggingface.co/{BLIP_REPO}/resolve/main/{remote}");
        tracing::info!("Downloading BLIP {}...", label);
        tracing::info!("  Source: {}", url);
        tracing::info!("  Destination: {:?}", dest);

        download_file(client, &url, dest).await?;

        let file_size = std::fs::metadata(dest)?.len();
        tracing::info!(
            "  BLIP {} complete ({:.1} MB)",
            label,
            file_size as f64 / (1024.0 * 1024.0)
        );
    }

    Ok(())
}

/// Stream `url` to `dest` with a progress bar.
///
/// Writes to a `.part` file and renames on success so an interrupted
/// download is never mistaken for an installed model.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    let pb = create_progress_bar(response.content_length());
    let partial = partial_path(dest);

    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);
    pb.finish_and_clear();

    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}

fn partial_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn create_progress_bar(total: Option<u64>) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let Some(total) = total else {
        return ProgressBar::new_spinner();
    };

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path() {
        let dest = Path::new("/models/blip/vision_model.onnx");
        assert_eq!(
            partial_path(dest),
            Path::new("/models/blip/vision_model.onnx.part")
        );
    }

    #[test]
    fn test_remote_files_match_local_names() {
        let local = BlipModel::model_files(Path::new("/m"));
        for (path, (_, remote)) in local.iter().zip(REMOTE_FILES) {
            let local_name = path.file_name().unwrap().to_str().unwrap();
            assert!(remote.ends_with(local_name), "{remote} vs {local_name}");
        }
    }
}
