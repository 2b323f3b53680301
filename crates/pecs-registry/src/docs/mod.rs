//! Configuration of the PECS documentation site.
//!
//! The documentation is built by VuePress; this module owns the site
//! configuration record and renders the `config.ts` the framework consumes.

mod site;

pub use site::{render_vuepress_config, DocsError, NavbarEntry, SiteConfig, ThemeConfig};
