//! Project scaffolding and canonical file layout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::io::git::Git;
use crate::io::task_store::save_tasks;
use crate::tasks::{TaskList, seed_task};

const INIT_SCRIPT: &str = "#!/bin/sh\n# Project health check: exit 0 when the project is in a workable state.\nexit 0\n";
const GITIGNORE_ENTRIES: &[&str] = &["events.jsonl", "run_log.jsonl"];

/// Canonical project-relative paths the harness reads and writes.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub tasks: PathBuf,
    pub config: PathBuf,
    pub progress: PathBuf,
    pub init_script: PathBuf,
    pub events: PathBuf,
    pub run_log: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            tasks: root.join("tasks.json"),
            config: root.join("autoloop.toml"),
            progress: root.join("progress.md"),
            init_script: root.join("init.sh"),
            events: root.join("events.jsonl"),
            run_log: root.join("run_log.jsonl"),
            root,
        }
    }

    /// Fail unless the directory looks like an initialized project.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.tasks.is_file() {
            return Err(anyhow!(
                "{} is not an initialized project (missing tasks.json); run `autoloop init` first",
                self.root.display()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Overwrite an existing tasks.json.
    pub force: bool,
}

/// Scaffold a project directory: seed task list, progress narrative, precheck
/// script, config, gitignore entries; git-init and commit when possible.
#[instrument(skip_all, fields(root = %paths.root.display()))]
pub fn init_project(
    paths: &ProjectPaths,
    project_name: &str,
    spec: &str,
    options: &InitOptions,
) -> Result<()> {
    if paths.tasks.exists() && !options.force {
        return Err(anyhow!(
            "{} already initialized (pass --force to overwrite)",
            paths.root.display()
        ));
    }
    fs::create_dir_all(&paths.root)
        .with_context(|| format!("create project dir {}", paths.root.display()))?;

    let mut list = TaskList::new(project_name);
    list.tasks.push(seed_task(project_name));
    save_tasks(&paths.tasks, &list)?;

    crate::io::progress::init_progress(&paths.root, project_name, spec)?;

    if !paths.init_script.exists() {
        fs::write(&paths.init_script, INIT_SCRIPT)
            .with_context(|| format!("write {}", paths.init_script.display()))?;
        make_executable(&paths.init_script)?;
    }

    if !paths.config.exists() {
        crate::io::config::write_config(&paths.config, &crate::io::config::HarnessConfig::default())?;
    }

    ensure_gitignore(&paths.root)?;

    // Scaffold commit is best-effort: a host without git identity configured
    // still gets a usable project.
    let git = Git::new(&paths.root);
    if !git.is_repo()
        && let Err(e) = git.init_repo()
    {
        tracing::warn!(err = %e, "git init failed, continuing without checkpoints");
    }
    if git.is_repo() {
        if let Err(e) = git
            .add_all()
            .and_then(|()| git.commit_staged(&format!("chore: initialize {project_name}")))
        {
            tracing::warn!(err = %e, "scaffold commit failed");
        }
    }

    info!(project = project_name, "project initialized");
    Ok(())
}

fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms)
            .with_context(|| format!("chmod {}", path.display()))?;
    }
    Ok(())
}

fn ensure_gitignore(root: &Path) -> Result<()> {
    let path = root.join(".gitignore");
    let existing = fs::read_to_string(&path).unwrap_or_default();
    let mut additions = Vec::new();
    for entry in GITIGNORE_ENTRIES {
        if !existing.lines().any(|line| line.trim() == *entry) {
            additions.push(*entry);
        }
    }
    if additions.is_empty() {
        return Ok(());
    }
    let mut contents = existing;
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    for entry in additions {
        contents.push_str(entry);
        contents.push('\n');
    }
    debug!("updating .gitignore");
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::task_store::load_tasks;

    #[test]
    fn init_scaffolds_all_files_and_commits() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        init_project(&paths, "demo", "Build a demo", &InitOptions::default()).expect("init");

        assert!(paths.tasks.is_file());
        assert!(paths.progress.is_file());
        assert!(paths.init_script.is_file());
        assert!(paths.config.is_file());

        let list = load_tasks(&paths.tasks).expect("load");
        assert_eq!(list.project_name, "demo");
        assert_eq!(list.tasks.len(), 1);

        let gitignore = fs::read_to_string(temp.path().join(".gitignore")).expect("gitignore");
        assert!(gitignore.contains("events.jsonl"));

        let git = Git::new(temp.path());
        assert!(git.is_repo());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        init_project(&paths, "demo", "spec", &InitOptions::default()).expect("init");
        let err = init_project(&paths, "demo", "spec", &InitOptions::default())
            .expect_err("second init must fail");
        assert!(err.to_string().contains("already initialized"));

        init_project(&paths, "demo", "spec", &InitOptions { force: true }).expect("force init");
    }

    #[test]
    fn ensure_initialized_rejects_bare_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        assert!(paths.ensure_initialized().is_err());
    }
}
