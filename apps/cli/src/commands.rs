//! CLI command implementations

use crate::output::{print_output, print_tasks};
use crate::progress::TaskProgress;
use crate::{ConfigAction, OutputFormat};
use anyhow::{anyhow, Result};
use console::style;
use mediadl_core::{
    apply_setting, get_setting, normalize_input, ConfigStore, Engine, StaticResolver,
};
use mediadl_types::{MediaVariant, ResolvedMedia, TaskStatus};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// Simulated page-load time of the built-in resolver
const RESOLVE_LATENCY: Duration = Duration::from_millis(300);

const DEMO_TITLES: &[(&str, &str)] = &[
    ("Amazing Cat Tricks 2024", "720p"),
    ("Top 10 Travel Destinations", "1080p"),
    ("Lo-fi Beats to Study To", "Audio"),
    ("Street Food Tour", "720p"),
    ("Mountain Bike Downhill", "1080p"),
];

// ============================================================================
// Download Commands
// ============================================================================

pub async fn grab(
    store: &ConfigStore,
    inputs: Vec<String>,
    variant: Option<String>,
    yes: bool,
    format: OutputFormat,
) -> Result<()> {
    let engine = Engine::new(store.load().await?)?;
    let resolver = StaticResolver::with_latency(RESOLVE_LATENCY);
    let interactive = !yes && console::Term::stderr().is_term();

    for input in inputs {
        let url = normalize_input(&input);
        let Some(media) = engine.resolve_offer(&resolver, &url).await else {
            eprintln!(
                "{} Nothing to download at {}",
                style("!").yellow().bold(),
                style(&url).dim()
            );
            continue;
        };

        let chosen = choose_variant(&media, variant.as_deref(), interactive)?;
        let id = engine.enqueue_variant(&media, chosen);
        debug!(task_id = %id, source = %media.source, "Queued from CLI");
    }

    watch(&engine, format).await
}

pub async fn demo(
    store: &ConfigStore,
    count: usize,
    cancel: usize,
    format: OutputFormat,
) -> Result<()> {
    let engine = Engine::new(store.load().await?)?;
    let variants = StaticResolver::default_variants();

    let ids: Vec<_> = (0..count)
        .map(|i| {
            let (title, label) = DEMO_TITLES[i % DEMO_TITLES.len()];
            let size = variants
                .iter()
                .find(|v| v.label == label)
                .map(|v| v.size.clone())
                .unwrap_or_default();
            engine.enqueue(
                title,
                format!("https://picsum.photos/seed/{}/400/225", i + 100),
                label,
                size,
            )
        })
        .collect();

    // Cancelled inside the connection window, so these never start
    debug!(
        cancel,
        connect_delay_ms = engine.config().connect_delay_ms,
        "Cancelling demo tasks before they connect"
    );
    for id in ids.iter().take(cancel) {
        engine.cancel(*id);
    }

    watch(&engine, format).await
}

pub async fn probe(inputs: Vec<String>, format: OutputFormat) -> Result<()> {
    let engine = Engine::new(Default::default())?;
    let resolver = StaticResolver::with_latency(RESOLVE_LATENCY);

    let mut found: Vec<ResolvedMedia> = Vec::new();
    for input in inputs {
        let url = normalize_input(&input);
        match engine.resolve_offer(&resolver, &url).await {
            Some(media) => found.push(media),
            None => {
                if let OutputFormat::Human | OutputFormat::Table = format {
                    println!("{} {}", style("✗").red(), style(&url).dim());
                }
            }
        }
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&found)?),
        OutputFormat::Human | OutputFormat::Table => {
            for media in &found {
                println!(
                    "{} {} {}",
                    style("✓").green().bold(),
                    style(&media.title).bold(),
                    style(format!("({})", media.source)).dim()
                );
                for variant in &media.variants {
                    println!("    {:<8} {:>8}  .{}", variant.label, variant.size, variant.ext);
                }
            }
        }
    }

    Ok(())
}

fn choose_variant<'a>(
    media: &'a ResolvedMedia,
    wanted: Option<&str>,
    interactive: bool,
) -> Result<&'a MediaVariant> {
    if let Some(label) = wanted {
        return media.variant(label).ok_or_else(|| {
            let available: Vec<_> = media.variants.iter().map(|v| v.label.as_str()).collect();
            anyhow!(
                "No variant '{}' for {} (available: {})",
                label,
                media.title,
                available.join(", ")
            )
        });
    }

    if interactive {
        let items: Vec<String> = media
            .variants
            .iter()
            .map(|v| format!("{:<8} {:>8}  .{}", v.label, v.size, v.ext))
            .collect();
        let index = dialoguer::Select::new()
            .with_prompt(format!("Download \"{}\"", media.title))
            .items(&items)
            .default(0)
            .interact()?;
        return media
            .variants
            .get(index)
            .ok_or_else(|| anyhow!("Invalid selection"));
    }

    media
        .variants
        .first()
        .ok_or_else(|| anyhow!("No variants for {}", media.title))
}

/// Render live progress until every task settles; Ctrl-C cancels what is left
async fn watch(engine: &Engine, format: OutputFormat) -> Result<()> {
    let live = matches!(format, OutputFormat::Human);
    let progress = TaskProgress::new();

    // Subscribe before snapshotting so nothing falls between the two
    let mut rx = engine.subscribe();
    if live {
        let mut tasks = engine.snapshot();
        tasks.reverse();
        progress.sync(&tasks).await;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while engine.active_count() > 0 {
        tokio::select! {
            _ = &mut ctrl_c => {
                for task in engine.snapshot().iter().filter(|t| t.is_active()) {
                    engine.cancel(task.id);
                }
                eprintln!("{} Cancelled remaining downloads", style("○").dim());
                break;
            }
            received = rx.recv() => match received {
                Ok(event) if live => progress.handle_event(&event).await,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Progress view lagged, resyncing");
                    if live {
                        progress.sync(&engine.snapshot()).await;
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.shutdown().await;

    let tasks = engine.snapshot();
    print_tasks(&tasks, format)?;

    let failed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .count();
    if failed > 0 {
        return Err(anyhow!("{} download(s) failed", failed));
    }

    Ok(())
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn config_action(
    store: &ConfigStore,
    action: Option<ConfigAction>,
    format: OutputFormat,
) -> Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Get { key } => {
            let config = store.load().await?;
            let value = get_setting(&config, &key)?;
            print_output(&value, format)?;
        }

        ConfigAction::Set { key, value } => {
            let config = store.load().await?;
            let updated = apply_setting(&config, &key, &value)?;
            store.save(&updated).await?;
            println!(
                "{} {} = {}",
                style("✓").green().bold(),
                key,
                get_setting(&updated, &key)?
            );
        }

        ConfigAction::Show => {
            let config = store.load().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                OutputFormat::Human | OutputFormat::Table => {
                    println!("Data dir: {}", style(store.data_dir().display()).dim());
                    println!("{}", style(store.path().display()).dim());
                    println!("  connect_delay_ms: {}", config.connect_delay_ms);
                    println!("  tick_interval_ms: {}", config.tick_interval_ms);
                    println!("  min_speed:        {}", config.min_speed);
                    println!("  max_speed:        {}", config.max_speed);
                    println!("  max_step:         {}", config.max_step);
                    println!("  speed_unit:       {}", config.speed_unit);
                    println!("  failure_rate:     {}", config.failure_rate);
                    println!("  event_capacity:   {}", config.event_capacity);
                }
            }
        }

        ConfigAction::Reset => {
            store.reset().await?;
            println!("{} Config reset to defaults", style("✓").green().bold());
        }
    }

    Ok(())
}
