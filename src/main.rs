use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use wdk_filter::data::distribution::summarize;
use wdk_filter::data::loader::load_file;
use wdk_filter::data::tree::{count_leaves, leaves};
use wdk_filter::{ClientSideBackend, FilterParam, ServiceConfig};

const USAGE: &str = "usage: wdk-filter <dataset.json|dataset.csv> [previous-value.json]";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args_os().skip(1);
    let Some(dataset_path) = args.next().map(PathBuf::from) else {
        bail!(USAGE);
    };
    let previous = match args.next() {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", PathBuf::from(&path).display()))?,
        ),
        None => None,
    };

    let attrs = load_file(&dataset_path)
        .with_context(|| format!("loading {}", dataset_path.display()))?;
    let backend = ClientSideBackend::new(
        Arc::new(attrs.data.clone()),
        attrs.field_metadata_map.clone(),
    );
    let param = FilterParam::mount(
        "filter",
        backend,
        attrs,
        previous.as_deref(),
        ServiceConfig::from_env(),
    );
    let subscription = param
        .service()
        .add_listener(|| log::debug!("filter state changed"));

    param.restore().await.context("restoring previous value")?;

    let state = param.service().state();
    if state.selected_field.is_none() {
        if let Some(first) = leaves(&state.fields).first() {
            param.service().select_field(first).await?;
        }
    }
    subscription.remove();

    report(&param);
    Ok(())
}

fn report(param: &FilterParam<ClientSideBackend>) {
    let state = param.service().state();

    println!(
        "{} field(s), {} leaf field(s)",
        state.field_map.len(),
        count_leaves(&state.fields)
    );
    println!("Filters:");
    for display in param.filter_displays() {
        println!("  - {display}");
    }
    let invalid = param.invalid_filter_displays();
    if !invalid.is_empty() {
        println!("No longer available:");
        for display in invalid {
            println!("  - {display}");
        }
    }
    println!(
        "{} of {} selected",
        state.filtered_not_ignored().len(),
        state.data.len()
    );

    if let Some(field) = &state.selected_field {
        if let Some(distribution) = state.distribution(&field.term) {
            println!("{}:", field.display);
            for entry in distribution.iter() {
                println!(
                    "  {:<24} {:>6} {:>6}",
                    entry.value.to_string(),
                    entry.filtered_count,
                    entry.count
                );
            }
            if !field.is_membership() {
                let summary = summarize(distribution);
                if let (Some(min), Some(max)) = (&summary.min, &summary.max) {
                    println!("  min {min}, max {max}, unknown {}", summary.unknown_count);
                }
                if let Some(avg) = summary.average {
                    println!("  avg {avg:.2}");
                }
            }
        }
    }

    match param.value_json() {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("Failed to serialize value: {e:#}"),
    }
}
