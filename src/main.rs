use bitrate_analyzer::{
    logging,
    orchestrator,
    report,
};
use bitrate_analyzer_config::{
    Args,
    Config,
    StreamTarget,
};
use clap::Parser;
use color_eyre::Result;
use eyre::{
    bail,
    Context as _,
};
use tracing::{
    info,
    warn,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    logging::init_logging(args.verbose)?;

    let config = Config::new(&args).wrap_err("failed to load configuration")?;
    config.validate()?;

    let mut targets = Vec::new();
    if let Some(path) = &config.streams_file {
        targets.extend(bitrate_analyzer_config::load_targets(path)?);
    }
    for raw in &args.urls {
        match StreamTarget::from_url_str(raw) {
            Ok(target) => targets.push(target),
            Err(err) => warn!(url = %raw, error = %err, "skipping invalid stream URL"),
        }
    }
    if targets.is_empty() {
        bail!("no streams to analyze; pass stream URLs or --streams <file>");
    }

    // One backend decision for the whole run, before any network activity.
    let backend = bitrate_analyzer_capture::probe().await?;

    let analysis = orchestrator::run(&targets, &config, backend).await;

    println!("{}", report::format_summary(&analysis));

    tokio::fs::create_dir_all(&config.output_directory)
        .await
        .wrap_err_with(|| format!("failed to create output directory {}", config.output_directory.display()))?;
    let csv_path = config.output_directory.join("bitrate-report.csv");
    report::write_csv(&analysis, &csv_path)?;
    let json_path = config.output_directory.join("bitrate-report.json");
    report::write_json(&analysis, &json_path).await?;
    info!(csv = %csv_path.display(), json = %json_path.display(), "reports written");

    Ok(())
}
