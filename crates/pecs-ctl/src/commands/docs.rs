//! Documentation site configuration: render and check.

use std::path::{Path, PathBuf};

use anyhow::Context;
use pecs_registry::docs::{render_vuepress_config, SiteConfig};

use crate::output;
use crate::DocsCommands;

pub(crate) fn handle_docs_command(cmd: DocsCommands) -> anyhow::Result<()> {
    match cmd {
        DocsCommands::Config {
            output: output_file,
            site,
        } => render_config(site.as_deref(), output_file.as_deref()),
        DocsCommands::Check { site } => check_config(site.as_deref()),
    }
}

fn load_site(site: Option<&Path>) -> anyhow::Result<SiteConfig> {
    match site {
        Some(path) => Ok(SiteConfig::load(path)?),
        None => Ok(SiteConfig::default()),
    }
}

fn render_config(site: Option<&Path>, output_file: Option<&Path>) -> anyhow::Result<()> {
    let config = load_site(site)?;

    let errors = config.validate();
    if !errors.is_empty() {
        report(&errors);
        anyhow::bail!("site configuration is invalid");
    }

    let rendered = render_vuepress_config(&config)?;
    match output_file {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            output::success(format!("Wrote {}", path.display()));
        }
        None => output::plain(rendered.trim_end_matches('\n')),
    }
    Ok(())
}

fn check_config(site: Option<&Path>) -> anyhow::Result<()> {
    let config = load_site(site)?;
    let source = site.map_or_else(|| PathBuf::from("(built-in)"), Path::to_path_buf);

    let errors = config.validate();
    if !errors.is_empty() {
        output::status_icon(false, source.display());
        report(&errors);
        anyhow::bail!("site configuration has {} problems", errors.len());
    }

    output::status_icon(true, source.display());
    output::label("    Title", &config.title);
    output::label("    Repository", &config.theme.repo);
    output::label("    Navbar entries", config.theme.navbar.len());
    Ok(())
}

fn report(errors: &[String]) {
    for err in errors {
        output::dim(format!("    {err}"));
    }
}
