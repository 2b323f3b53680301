//! Index verification: `verify` for local files, `verify-index` for any
//! location the index source can fetch.

use std::path::{Path, PathBuf};

use anyhow::Context;
use pecs_registry::registry::load_index;
use pecs_registry::{decode_index, validate_index, IndexError, RegistryError};

use crate::cli_config::CliConfig;
use crate::commands::index_source;
use crate::output;

pub(crate) fn handle_verify_command(paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut failed = 0;
    for path in paths {
        match verify_file(path) {
            Ok(plugins) => {
                output::status_icon(true, format!("{} ({plugins} plugins)", path.display()));
            }
            Err(e) => {
                output::status_icon(false, path.display());
                match e.downcast_ref::<IndexError>() {
                    Some(index_err) => report(index_err),
                    None => output::dim(format!("    {e:#}")),
                }
                failed += 1;
            }
        }
    }
    summarize(failed, paths.len())
}

fn verify_file(path: &Path) -> anyhow::Result<usize> {
    let bytes = std::fs::read(path).context("failed to open index file")?;
    let index = decode_index(path, &bytes)?;
    validate_index(&index).map_err(IndexError::from)?;
    Ok(index.plugins.len())
}

pub(crate) async fn handle_verify_index_command(
    locations: &[String],
    cli_config: &CliConfig,
) -> anyhow::Result<()> {
    let source = index_source(cli_config);

    let mut failed = 0;
    for location in locations {
        match load_index(&source, location).await {
            Ok(index) => {
                output::status_icon(
                    true,
                    format!("{location} ({} plugins)", index.plugins.len()),
                );
            }
            Err(RegistryError::Index { source, .. }) => {
                output::status_icon(false, location);
                report(&source);
                failed += 1;
            }
            Err(e) => {
                output::status_icon(false, location);
                output::dim(format!("    {e}"));
                failed += 1;
            }
        }
    }
    summarize(failed, locations.len())
}

/// Print each validation problem on its own line.
fn report(err: &IndexError) {
    match err {
        IndexError::Invalid(errors) => {
            for msg in errors.errors() {
                output::dim(format!("    {msg}"));
            }
        }
        other => output::dim(format!("    {other}")),
    }
}

fn summarize(failed: usize, total: usize) -> anyhow::Result<()> {
    if failed > 0 {
        anyhow::bail!("{failed} of {total} index files failed verification");
    }
    Ok(())
}
