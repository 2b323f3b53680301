//! Repository management commands: list, add, remove.
//!
//! `add` and `remove` edit the `[[repository]]` tables of the repositories
//! file with `toml_edit` so comments and formatting survive.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use pecs_registry::repositories::{load_repositories, DEFAULT_REPOSITORY_NAME};
use pecs_registry::IndexCache;

use crate::cli_config::CliConfig;
use crate::output;
use crate::RepoCommands;

const REPOSITORY_KEY: &str = "repository";

pub(crate) fn handle_repo_command(cmd: RepoCommands, cli_config: &CliConfig) -> anyhow::Result<()> {
    let path = cli_config.repositories_file();
    match cmd {
        RepoCommands::List => list_repositories(&path, cli_config),
        RepoCommands::Add {
            name,
            url,
            priority,
        } => {
            add_repository(&path, &name, &url, priority)?;
            output::success(format!("Added repository '{}'", name));
            output::label("Repositories file", path.display());
            Ok(())
        }
        RepoCommands::Remove { name } => {
            remove_repository(&path, &name)?;
            output::success(format!("Removed repository '{}'", name));
            Ok(())
        }
    }
}

fn list_repositories(path: &Path, cli_config: &CliConfig) -> anyhow::Result<()> {
    let mut repos = load_repositories(path)
        .with_context(|| format!("failed to load repositories from {}", path.display()))?;
    repos.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));

    if !path.exists() {
        output::dim(format!(
            "{} does not exist, using the built-in '{}' repository.",
            path.display(),
            DEFAULT_REPOSITORY_NAME
        ));
        output::blank();
    }

    let cache = IndexCache::from_env(cli_config.cache_max_age_hours).ok();

    output::header("Configured repositories:");
    output::blank();
    for repo in &repos {
        let remote = repo.url.starts_with("http://") || repo.url.starts_with("https://");
        let status = if !remote {
            "local".to_string()
        } else {
            match cache.as_ref().and_then(|c| c.last_fetch_time(&repo.url)) {
                Some(fetched) => match fetched.elapsed() {
                    Ok(age) => format!("cached (last fetched {})", format_duration(age)),
                    Err(_) => "cached (unknown age)".to_string(),
                },
                None => "not cached".to_string(),
            }
        };

        output::success(format!("{} [{}]", repo.name, status));
        output::label("    URL", &repo.url);
        output::label("    Priority", repo.priority);
        output::blank();
    }
    Ok(())
}

fn read_document(path: &Path) -> anyhow::Result<toml_edit::DocumentMut> {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hcl"))
    {
        anyhow::bail!(
            "{} is an HCL file; only TOML repositories files can be edited",
            path.display()
        );
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    contents
        .parse()
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn write_document(path: &Path, doc: &toml_edit::DocumentMut) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, doc.to_string())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn add_repository(path: &Path, name: &str, url: &str, priority: i64) -> anyhow::Result<()> {
    let mut doc = read_document(path)?;

    if let Some(repos) = doc.get(REPOSITORY_KEY).and_then(|v| v.as_array_of_tables()) {
        if repos
            .iter()
            .any(|r| r.get("name").and_then(|v| v.as_str()) == Some(name))
        {
            anyhow::bail!("repository '{}' already exists in {}", name, path.display());
        }
    }

    let mut table = toml_edit::Table::new();
    table.insert("name", toml_edit::value(name));
    table.insert("url", toml_edit::value(url));
    if priority != 0 {
        table.insert("priority", toml_edit::value(priority));
    }

    if doc.get(REPOSITORY_KEY).is_none() {
        doc.insert(
            REPOSITORY_KEY,
            toml_edit::Item::ArrayOfTables(toml_edit::ArrayOfTables::new()),
        );
    }
    match doc
        .get_mut(REPOSITORY_KEY)
        .and_then(|v| v.as_array_of_tables_mut())
    {
        Some(repos) => repos.push(table),
        None => anyhow::bail!(
            "'{}' in {} is not an array of tables",
            REPOSITORY_KEY,
            path.display()
        ),
    }

    write_document(path, &doc)
}

fn remove_repository(path: &Path, name: &str) -> anyhow::Result<()> {
    let mut doc = read_document(path)?;

    let mut found = false;
    if let Some(repos) = doc
        .get_mut(REPOSITORY_KEY)
        .and_then(|v| v.as_array_of_tables_mut())
    {
        let before = repos.len();
        repos.retain(|r| r.get("name").and_then(|v| v.as_str()) != Some(name));
        found = repos.len() != before;

        if repos.is_empty() {
            doc.remove(REPOSITORY_KEY);
        }
    }

    if !found {
        anyhow::bail!("repository '{}' not found in {}", name, path.display());
    }
    write_document(path, &doc)
}

/// Format a duration as a human-readable "X ago" string.
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("repositories.toml");

        add_repository(&path, "community", "https://example.com/index.yaml", 5).unwrap();

        let repos = load_repositories(&path).unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "community");
        assert_eq!(repos[0].priority, 5);
    }

    #[test]
    fn test_add_preserves_comments_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.toml");
        std::fs::write(
            &path,
            "# my repositories\n[[repository]]\nname = \"main\"\nurl = \"https://example.com/main.toml\"\n",
        )
        .unwrap();

        add_repository(&path, "local", "/srv/index.yaml", 0).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# my repositories\n"));
        assert!(!contents.contains("priority"));

        let err = add_repository(&path, "main", "https://other.example.com", 0).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(load_repositories(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_repository() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.toml");
        add_repository(&path, "a", "https://example.com/a.yaml", 0).unwrap();
        add_repository(&path, "b", "https://example.com/b.yaml", 0).unwrap();

        remove_repository(&path, "a").unwrap();
        let repos = load_repositories(&path).unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "b");

        remove_repository(&path, "b").unwrap();
        assert!(!std::fs::read_to_string(&path).unwrap().contains("repository"));

        let err = remove_repository(&path, "b").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_hcl_file_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.hcl");
        std::fs::write(&path, "repository \"main\" {\n  url = \"https://example.com/a.hcl\"\n}\n")
            .unwrap();

        let err = add_repository(&path, "local", "/srv/index.yaml", 0).unwrap_err();
        assert!(err.to_string().contains("only TOML repositories files can be edited"));
        assert_eq!(load_repositories(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s ago");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m ago");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h ago");
        assert_eq!(format_duration(Duration::from_secs(172800)), "2d ago");
    }
}
