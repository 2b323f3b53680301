use std::path::{Path, PathBuf};

use askama::Template;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Navbar labels of the built-in configuration, in display order.
const NAVBAR_ORDER: [&str; 4] = ["Get Started", "Publish", "Developer docs", "Report an issue"];

const EDIT_LINK_PLACEHOLDERS: [&str; 3] = [":repo", ":branch", ":path"];

#[derive(Debug, Error)]
pub enum DocsError {
    #[error("failed to read site config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse site config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("template rendering failed: {0}")]
    Render(#[from] askama::Error),
}

/// Site-wide settings of the documentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Locale identifier, e.g. `en-US`.
    pub lang: String,
    pub title: String,
    pub description: String,
    pub theme: ThemeConfig,
}

/// Settings of the VuePress default theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ThemeConfig {
    /// Repository identifier in `owner/name` form.
    pub repo: String,
    /// Absolute URL of the repository hosting the docs sources.
    pub docs_repo: String,
    pub docs_branch: String,
    /// Directory of the docs sources inside `docs_repo`.
    pub docs_dir: String,
    /// Template for "edit this page" links with `:repo`, `:branch` and `:path`.
    pub edit_link_pattern: String,
    #[serde(default)]
    pub navbar: Vec<NavbarEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavbarEntry {
    pub text: String,
    /// Relative documentation path or absolute external URL.
    pub link: String,
}

impl NavbarEntry {
    fn new(text: &str, link: &str) -> Self {
        Self {
            text: text.to_string(),
            link: link.to_string(),
        }
    }

    pub fn is_external(&self) -> bool {
        is_absolute_url(&self.link)
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            lang: "en-US".to_string(),
            title: "PECS".to_string(),
            description: "An easy way to manage your third-party Portmaster Plugins".to_string(),
            theme: ThemeConfig {
                repo: "ppacher/portmaster-plugin-registry".to_string(),
                docs_repo: "https://github.com/ppacher/portmaster-plugin-registry".to_string(),
                docs_branch: "main".to_string(),
                docs_dir: "docs".to_string(),
                edit_link_pattern: ":repo/-/edit/:branch/:path".to_string(),
                navbar: vec![
                    NavbarEntry::new("Get Started", "/guide/getting-started"),
                    NavbarEntry::new("Publish", "publish"),
                    NavbarEntry::new("Developer docs", "devdocs"),
                    NavbarEntry::new(
                        "Report an issue",
                        "https://github.com/ppacher/portmaster-plugin-registry/issues",
                    ),
                ],
            },
        }
    }
}

impl SiteConfig {
    /// Read a site configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, DocsError> {
        let content = std::fs::read_to_string(path).map_err(|source| DocsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| DocsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the configuration and return every violation found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("title must not be empty".to_string());
        }
        if self.description.trim().is_empty() {
            errors.push("description must not be empty".to_string());
        }

        let theme = &self.theme;
        if !is_repo_identifier(&theme.repo) {
            errors.push(format!(
                "repo {:?} is not a valid owner/name identifier",
                theme.repo
            ));
        }
        if !is_absolute_url(&theme.docs_repo) {
            errors.push(format!(
                "docs-repo {:?} is not an absolute URL",
                theme.docs_repo
            ));
        }

        for placeholder in EDIT_LINK_PLACEHOLDERS {
            let count = theme.edit_link_pattern.matches(placeholder).count();
            if count != 1 {
                errors.push(format!(
                    "edit-link-pattern must contain {placeholder} exactly once (found {count})"
                ));
            }
        }

        if theme.navbar.len() != NAVBAR_ORDER.len() {
            errors.push(format!(
                "navbar must have exactly {} entries (found {})",
                NAVBAR_ORDER.len(),
                theme.navbar.len()
            ));
        }
        for (idx, entry) in theme.navbar.iter().enumerate() {
            if entry.text.trim().is_empty() {
                errors.push(format!("navbar entry {}: text must not be empty", idx + 1));
            }
            if entry.link.trim().is_empty() {
                errors.push(format!("navbar entry {}: link must not be empty", idx + 1));
            }
            if let Some(expected) = NAVBAR_ORDER.get(idx) {
                if entry.text != *expected {
                    errors.push(format!(
                        "navbar entry {}: expected {expected:?}, found {:?}",
                        idx + 1,
                        entry.text
                    ));
                }
            }
        }

        errors
    }
}

impl ThemeConfig {
    /// Expand the edit link pattern for a page at `path` (relative to `docs_dir`).
    pub fn edit_link(&self, path: &str) -> String {
        let full_path = format!(
            "{}/{}",
            self.docs_dir.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.edit_link_pattern
            .replace(":repo", &self.docs_repo)
            .replace(":branch", &self.docs_branch)
            .replace(":path", &full_path)
    }
}

fn is_absolute_url(value: &str) -> bool {
    url::Url::parse(value).is_ok_and(|url| url.has_host())
}

fn is_repo_identifier(value: &str) -> bool {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part != "."
            && part != ".."
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    matches!(value.split_once('/'), Some((owner, name)) if valid_part(owner) && valid_part(name))
}

/// Quote a value as a single-quoted JavaScript string literal.
fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

struct NavbarLiteral {
    text: String,
    link: String,
}

/// Askama template for the VuePress `config.ts`. Values are pre-quoted.
#[derive(Template)]
#[template(path = "vuepress-config.ts", escape = "none")]
struct VuepressConfigTemplate {
    lang: String,
    title: String,
    description: String,
    repo: String,
    docs_repo: String,
    docs_branch: String,
    docs_dir: String,
    edit_link_pattern: String,
    navbar: Vec<NavbarLiteral>,
}

/// Render `config` as the VuePress `config.ts`.
pub fn render_vuepress_config(config: &SiteConfig) -> Result<String, DocsError> {
    let theme = &config.theme;
    let template = VuepressConfigTemplate {
        lang: js_string(&config.lang),
        title: js_string(&config.title),
        description: js_string(&config.description),
        repo: js_string(&theme.repo),
        docs_repo: js_string(&theme.docs_repo),
        docs_branch: js_string(&theme.docs_branch),
        docs_dir: js_string(&theme.docs_dir),
        edit_link_pattern: js_string(&theme.edit_link_pattern),
        navbar: theme
            .navbar
            .iter()
            .map(|entry| NavbarLiteral {
                text: js_string(&entry.text),
                link: js_string(&entry.link),
            })
            .collect(),
    };

    let mut rendered = template.render()?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}
