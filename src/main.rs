mod cli;

use streamvault::{config, inspect};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "streamvault=trace,streamvault_media=trace,streamvault_common=debug".to_string()
        } else {
            "streamvault=info,streamvault_media=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(inspect_file(&file, json))
        }
        Commands::Verify { file } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(verify_file(&file))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("streamvault {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn inspect_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let report = inspect::inspect_file(file)
        .await
        .with_context(|| format!("Failed to read recording: {:?}", file))?;

    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", report.path.display());
    println!("Size: {} bytes", report.file_size);
    println!(
        "Streams: {}{}",
        if report.has_audio { "audio " } else { "" },
        if report.has_video { "video" } else { "" }
    );
    match report.duration_secs {
        Some(duration) => println!("Duration: {:.3} s", duration),
        None => println!("Duration: (no metadata)"),
    }
    println!("Last timestamp: {} ms", report.last_timestamp_ms);
    println!(
        "\nTags: {} audio, {} video ({} key frames), {} script",
        report.audio_tags, report.video_tags, report.key_frames, report.script_tags
    );

    if let Some(props) = report.metadata.as_ref().and_then(|m| m.properties()) {
        println!("\nMetadata:");
        for (key, value) in props {
            if key == "keyframes" {
                continue;
            }
            println!("  {}: {:?}", key, value);
        }
    }

    println!("\nKeyframe index: {} entries", report.keyframes.len());
    for (i, entry) in report.keyframes.iter().enumerate() {
        println!("  [{}] {:>10.3} s  @ {}", i, entry.time_secs, entry.position);
    }

    Ok(())
}

async fn verify_file(file: &Path) -> Result<()> {
    let check = inspect::verify_keyframes(file)
        .await
        .with_context(|| format!("Failed to read recording: {:?}", file))?;

    if check.checked == 0 {
        println!("No keyframe index in {:?}", file);
        return Ok(());
    }

    for mismatch in &check.mismatches {
        println!(
            "✗ {:.3} s @ {}: {}",
            mismatch.entry.time_secs, mismatch.entry.position, mismatch.reason
        );
    }

    if check.is_ok() {
        println!("✓ All {} keyframe entries point at video key frames", check.checked);
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} keyframe entries are invalid",
            check.mismatches.len(),
            check.checked
        )
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            print_config(&config::Config::default());
        }
    }

    Ok(())
}

fn print_config(config: &config::Config) {
    println!("  Record dir: {}", config.storage.record_dir.display());
    println!("  Extension: {}", config.storage.extension);
    let types: Vec<&str> = config
        .publish
        .allowed_types
        .iter()
        .map(|t| t.as_str())
        .collect();
    println!("  Publishing types: {}", types.join(", "));
    println!("  Window ack size: {}", config.playback.window_ack_size);
    match config.playback.default_buffer_ms {
        Some(ms) => println!("  Default buffer: {} ms", ms),
        None => println!("  Default buffer: none"),
    }
}
