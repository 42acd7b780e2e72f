//! The `captionist caption` command: caption one local image.

use std::path::PathBuf;

use anyhow::Context;
use captionist_core::enhance::DEFAULT_PURPOSE;
use captionist_core::{
    CaptionEnhancer, CaptionGenerator, CaptionRecord, Config, EnhanceError,
};
use clap::{Args, ValueEnum};

/// Arguments for the `caption` command.
#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Image file to caption
    pub image: PathBuf,

    /// Steering prompt, e.g. "a photograph of"
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Purpose used when refining the caption
    #[arg(long, default_value = DEFAULT_PURPOSE)]
    pub purpose: String,

    /// Skip refinement even when the enhancer is configured
    #[arg(long)]
    pub no_refine: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for the caption command.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// The caption on one line
    Text,
    /// A JSON record
    Json,
}

/// Execute the caption command.
pub async fn execute(args: CaptionArgs) -> anyhow::Result<()> {
    let config = Config::load()?;

    let generator = CaptionGenerator::load(&config)?;
    let enhancer = if args.no_refine {
        CaptionEnhancer::disabled()
    } else {
        CaptionEnhancer::from_env(&config.enhancer)
    };

    let image = args.image.clone();
    let prompt = args.prompt.clone();
    let caption = tokio::task::spawn_blocking(move || {
        generator.generate_caption(&image, prompt.as_deref())
    })
    .await
    .context("Caption task panicked")??;

    let record = refine(&enhancer, caption, &args).await;

    match args.format {
        OutputFormat::Text => {
            if let Some(notice) = &record.notice {
                eprintln!("{notice}");
            }
            println!("{}", record.caption);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
    }

    Ok(())
}

async fn refine(enhancer: &CaptionEnhancer, caption: String, args: &CaptionArgs) -> CaptionRecord {
    let mut record = CaptionRecord {
        image: args.image.display().to_string(),
        caption,
        original_caption: None,
        purpose: None,
        notice: None,
    };

    if !enhancer.is_configured() {
        if !args.no_refine {
            record.notice = Some(EnhanceError::NotConfigured.to_string());
        }
        return record;
    }

    record.purpose = Some(args.purpose.clone());
    match enhancer.refine_caption(&record.caption, &args.purpose).await {
        Ok(refined) if refined != record.caption => {
            record.original_caption = Some(std::mem::replace(&mut record.caption, refined));
        }
        Ok(_) => {}
        Err(err) => record.notice = Some(err.to_string()),
    }

    record
}
