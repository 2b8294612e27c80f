//! Built-in tool handlers.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::{fs, process::Command};
use walkdir::WalkDir;

use super::{path::is_ignored_dir, ParamKind, ToolContext, ToolError, ToolHandler, ToolParams, ToolSpec};
use crate::process::{run_with_timeout, ProcessOutput};

const DEFAULT_SEARCH_RESULTS: u64 = 50;
const MAX_SEARCH_RESULTS: u64 = 500;
/// Files larger than this are not searched.
const SEARCH_FILE_LIMIT: u64 = 1024 * 1024;

/// All built-in handlers in catalogue order.
pub fn all() -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(ReadFile::new()),
        Arc::new(WriteFile::new()),
        Arc::new(DeleteFile::new()),
        Arc::new(CreateDirectory::new()),
        Arc::new(ListDirectory::new()),
        Arc::new(SearchCode::new()),
        Arc::new(RunCommand::new()),
        Arc::new(ApplyEdit::new()),
        Arc::new(InstallDependency::new()),
    ]
}

fn relative(ctx: &ToolContext, path: &Path) -> String {
    path.strip_prefix(&ctx.root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

struct ReadFile {
    spec: ToolSpec,
}

impl ReadFile {
    fn new() -> Self {
        Self {
            spec: ToolSpec::new("read_file", "Read a UTF-8 text file")
                .required("path", ParamKind::Path, "File to read"),
        }
    }
}

#[async_trait]
impl ToolHandler for ReadFile {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, ctx: &ToolContext, params: ToolParams<'_>) -> Result<Value, ToolError> {
        let path = ctx.resolve(params.str("path")?)?;
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::io(&path, &e))?;
        Ok(json!({ "path": relative(ctx, &path), "content": content }))
    }
}

struct WriteFile {
    spec: ToolSpec,
}

impl WriteFile {
    fn new() -> Self {
        Self {
            spec: ToolSpec::new(
                "write_file",
                "Create or overwrite a file, creating parent directories",
            )
            .required("path", ParamKind::Path, "File to write")
            .required("content", ParamKind::String, "Full file content"),
        }
    }
}

#[async_trait]
impl ToolHandler for WriteFile {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, ctx: &ToolContext, params: ToolParams<'_>) -> Result<Value, ToolError> {
        let path = ctx.resolve(params.str("path")?)?;
        let content = params.str("content")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::io(parent, &e))?;
        }
        fs::write(&path, content)
            .await
            .map_err(|e| ToolError::io(&path, &e))?;

        Ok(json!({ "path": relative(ctx, &path), "bytes": content.len() }))
    }
}

struct DeleteFile {
    spec: ToolSpec,
}

impl DeleteFile {
    fn new() -> Self {
        Self {
            spec: ToolSpec::new("delete_file", "Delete a single file")
                .required("path", ParamKind::Path, "File to delete"),
        }
    }
}

#[async_trait]
impl ToolHandler for DeleteFile {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, ctx: &ToolContext, params: ToolParams<'_>) -> Result<Value, ToolError> {
        let path = ctx.resolve(params.str("path")?)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| ToolError::io(&path, &e))?;
        if metadata.is_dir() {
            return Err(ToolError::InvalidParameters(format!(
                "{} is a directory",
                relative(ctx, &path)
            )));
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| ToolError::io(&path, &e))?;
        Ok(json!({ "path": relative(ctx, &path), "deleted": true }))
    }
}

struct CreateDirectory {
    spec: ToolSpec,
}

impl CreateDirectory {
    fn new() -> Self {
        Self {
            spec: ToolSpec::new("create_directory", "Create a directory and its parents")
                .required("path", ParamKind::Path, "Directory to create"),
        }
    }
}

#[async_trait]
impl ToolHandler for CreateDirectory {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, ctx: &ToolContext, params: ToolParams<'_>) -> Result<Value, ToolError> {
        let path = ctx.resolve(params.str("path")?)?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| ToolError::io(&path, &e))?;
        Ok(json!({ "path": relative(ctx, &path), "created": true }))
    }
}

struct ListDirectory {
    spec: ToolSpec,
}

impl ListDirectory {
    fn new() -> Self {
        Self {
            spec: ToolSpec::new("list_directory", "List the entries of a directory")
                .optional("path", ParamKind::Path, "Directory to list, defaults to the root"),
        }
    }
}

#[async_trait]
impl ToolHandler for ListDirectory {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, ctx: &ToolContext, params: ToolParams<'_>) -> Result<Value, ToolError> {
        let path = match params.opt_str("path") {
            Some(raw) => ctx.resolve(raw)?,
            None => ctx.root.clone(),
        };

        let mut reader = fs::read_dir(&path)
            .await
            .map_err(|e| ToolError::io(&path, &e))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::io(&path, &e))?
        {
            let kind = match entry.file_type().await {
                Ok(t) if t.is_dir() => "directory",
                Ok(t) if t.is_symlink() => "symlink",
                _ => "file",
            };
            entries.push((entry.file_name().to_string_lossy().into_owned(), kind));
        }
        entries.sort();

        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, kind)| json!({ "name": name, "kind": kind }))
            .collect();
        Ok(json!({ "path": relative(ctx, &path), "entries": entries }))
    }
}

struct SearchCode {
    spec: ToolSpec,
}

impl SearchCode {
    fn new() -> Self {
        Self {
            spec: ToolSpec::new(
                "search_code",
                "Search text files with a regular expression, skipping dependency and build directories",
            )
            .required("pattern", ParamKind::String, "Regular expression")
            .optional("path", ParamKind::Path, "Directory or file to search, defaults to the root")
            .optional("max_results", ParamKind::Integer, "Maximum matches to return (default 50)"),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchCode {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, ctx: &ToolContext, params: ToolParams<'_>) -> Result<Value, ToolError> {
        let regex = Regex::new(params.str("pattern")?)
            .map_err(|e| ToolError::Syntax(e.to_string()))?;
        let start = match params.opt_str("path") {
            Some(raw) => ctx.resolve(raw)?,
            None => ctx.root.clone(),
        };
        if !start.exists() {
            return Err(ToolError::NotFound(relative(ctx, &start)));
        }
        let limit = params
            .opt_u64("max_results")
            .unwrap_or(DEFAULT_SEARCH_RESULTS)
            .clamp(1, MAX_SEARCH_RESULTS) as usize;
        let root = ctx.root.clone();

        tokio::task::spawn_blocking(move || search(&root, &start, &regex, limit))
            .await
            .map_err(|e| ToolError::Io(format!("search task failed: {e}")))
    }
}

fn search(root: &Path, start: &Path, regex: &Regex, limit: usize) -> Value {
    let mut matches = Vec::new();
    let mut truncated = false;

    let walker = WalkDir::new(start)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && is_ignored_dir(&entry.file_name().to_string_lossy()))
        });

    'files: for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let too_large = entry
            .metadata()
            .map(|m| m.len() > SEARCH_FILE_LIMIT)
            .unwrap_or(true);
        if too_large {
            continue;
        }
        // Binary and non-UTF-8 files fail here and are skipped
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };

        let file = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        for (index, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                if matches.len() == limit {
                    truncated = true;
                    break 'files;
                }
                matches.push(json!({
                    "file": file,
                    "line": index + 1,
                    "text": line.trim(),
                }));
            }
        }
    }

    json!({ "matches": matches, "truncated": truncated })
}

struct RunCommand {
    spec: ToolSpec,
}

impl RunCommand {
    fn new() -> Self {
        Self {
            spec: ToolSpec::new("run_command", "Run a shell command in the project root")
                .required("command", ParamKind::String, "Command line passed to sh -c")
                .optional("timeout_secs", ParamKind::Integer, "Timeout in seconds"),
        }
    }
}

#[async_trait]
impl ToolHandler for RunCommand {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, ctx: &ToolContext, params: ToolParams<'_>) -> Result<Value, ToolError> {
        let command = params.str("command")?;
        if command.trim().is_empty() {
            return Err(ToolError::InvalidParameters("command must not be empty".to_string()));
        }
        let timeout = params
            .opt_u64("timeout_secs")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(ctx.command_timeout);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&ctx.root);
        execute(cmd, command, timeout).await
    }
}

/// Runs a prepared command and maps its outcome onto the tool error
/// categories.
async fn execute(cmd: Command, label: &str, timeout: Duration) -> Result<Value, ToolError> {
    log::debug!("Running `{label}` (timeout {}s)", timeout.as_secs());
    let output = run_with_timeout(cmd, None, timeout)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound(format!("{label}: {e}")),
            std::io::ErrorKind::PermissionDenied => {
                ToolError::PermissionDenied(format!("{label}: {e}"))
            }
            _ => ToolError::Io(format!("{label}: {e}")),
        })?;

    if output.timed_out {
        return Err(ToolError::TimedOut(format!(
            "`{label}` exceeded {}s",
            timeout.as_secs()
        )));
    }
    if !output.success {
        return Err(ToolError::CommandFailed(describe_failure(label, &output)));
    }

    Ok(json!({
        "exit_code": output.exit_code,
        "stdout": output.stdout,
        "stderr": output.stderr,
    }))
}

fn describe_failure(label: &str, output: &ProcessOutput) -> String {
    let status = output
        .exit_code
        .map(|code| format!("exit code {code}"))
        .unwrap_or_else(|| "terminated by signal".to_string());
    let tail = output.tail(10);
    if tail.is_empty() {
        format!("`{label}` failed with {status}")
    } else {
        format!("`{label}` failed with {status}\n{tail}")
    }
}

struct ApplyEdit {
    spec: ToolSpec,
}

impl ApplyEdit {
    fn new() -> Self {
        Self {
            spec: ToolSpec::new(
                "apply_edit",
                "Replace exactly one occurrence of a text fragment in a file",
            )
            .required("path", ParamKind::Path, "File to edit")
            .required("search", ParamKind::String, "Exact text to find; must occur once")
            .required("replace", ParamKind::String, "Replacement text"),
        }
    }
}

#[async_trait]
impl ToolHandler for ApplyEdit {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, ctx: &ToolContext, params: ToolParams<'_>) -> Result<Value, ToolError> {
        let path = ctx.resolve(params.str("path")?)?;
        let search = params.str("search")?;
        let replace = params.str("replace")?;
        if search.is_empty() {
            return Err(ToolError::InvalidParameters("search must not be empty".to_string()));
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::io(&path, &e))?;
        let name = relative(ctx, &path);
        match content.matches(search).count() {
            0 => return Err(ToolError::NotFound(format!("search text in {name}"))),
            1 => {}
            n => {
                return Err(ToolError::InvalidParameters(format!(
                    "search text occurs {n} times in {name}; it must be unique"
                )))
            }
        }

        let updated = content.replacen(search, replace, 1);
        fs::write(&path, &updated)
            .await
            .map_err(|e| ToolError::io(&path, &e))?;
        Ok(json!({ "path": name, "replaced": 1 }))
    }
}

/// Package manager detected from the project's manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Cargo,
    Pip,
    Go,
}

impl PackageManager {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "npm" => Some(Self::Npm),
            "yarn" => Some(Self::Yarn),
            "pnpm" => Some(Self::Pnpm),
            "cargo" => Some(Self::Cargo),
            "pip" => Some(Self::Pip),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Picks the manager from lock files and manifests in `root`.
    pub fn detect(root: &Path) -> Option<Self> {
        let has = |file: &str| root.join(file).is_file();
        if has("package.json") {
            if has("pnpm-lock.yaml") {
                Some(Self::Pnpm)
            } else if has("yarn.lock") {
                Some(Self::Yarn)
            } else {
                Some(Self::Npm)
            }
        } else if has("Cargo.toml") {
            Some(Self::Cargo)
        } else if has("pyproject.toml") || has("requirements.txt") {
            Some(Self::Pip)
        } else if has("go.mod") {
            Some(Self::Go)
        } else {
            None
        }
    }

    /// Program and arguments that add `package`.
    pub fn install_args(&self, package: &str, dev: bool) -> (&'static str, Vec<String>) {
        let mut args: Vec<String> = match self {
            Self::Npm => vec!["install".into()],
            Self::Yarn | Self::Pnpm | Self::Cargo => vec!["add".into()],
            Self::Pip => vec!["install".into()],
            Self::Go => vec!["get".into()],
        };
        if dev {
            match self {
                Self::Npm => args.push("--save-dev".into()),
                Self::Yarn | Self::Cargo => args.push("--dev".into()),
                Self::Pnpm => args.push("-D".into()),
                Self::Pip | Self::Go => {}
            }
        }
        args.push(package.to_string());

        let program = match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
            Self::Cargo => "cargo",
            Self::Pip => "pip",
            Self::Go => "go",
        };
        (program, args)
    }
}

struct InstallDependency {
    spec: ToolSpec,
}

impl InstallDependency {
    fn new() -> Self {
        Self {
            spec: ToolSpec::new(
                "install_dependency",
                "Add a package with the project's package manager",
            )
            .required("package", ParamKind::String, "Package name, optionally with a version")
            .optional(
                "manager",
                ParamKind::String,
                "npm, yarn, pnpm, cargo, pip or go; detected from the manifest when omitted",
            )
            .optional("dev", ParamKind::Boolean, "Install as a development dependency"),
        }
    }
}

#[async_trait]
impl ToolHandler for InstallDependency {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, ctx: &ToolContext, params: ToolParams<'_>) -> Result<Value, ToolError> {
        let package = params.str("package")?.trim();
        if package.is_empty() || package.starts_with('-') || package.contains(char::is_whitespace)
        {
            return Err(ToolError::InvalidParameters(format!(
                "'{package}' is not a package name"
            )));
        }

        let manager = match params.opt_str("manager") {
            Some(name) => PackageManager::parse(name).ok_or_else(|| {
                ToolError::InvalidParameters(format!("unsupported package manager '{name}'"))
            })?,
            None => PackageManager::detect(&ctx.root).ok_or_else(|| {
                ToolError::NotFound("no package manifest in the project root".to_string())
            })?,
        };

        let (program, args) = manager.install_args(package, params.bool_or("dev", false));
        let label = format!("{program} {}", args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(&args).current_dir(&ctx.root);
        execute(cmd, &label, ctx.command_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use tempfile::TempDir;

    use super::*;

    fn context(dir: &TempDir) -> ToolContext {
        ToolContext::new(dir.path(), Duration::from_secs(5))
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn test_write_then_read_file() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let bag = params(json!({"path": "src/app.txt", "content": "hello"}));
        WriteFile::new().call(&ctx, ToolParams::new(&bag)).await.unwrap();

        let bag = params(json!({"path": "src/app.txt"}));
        let out = ReadFile::new().call(&ctx, ToolParams::new(&bag)).await.unwrap();
        assert_eq!(out["content"], "hello");
        assert_eq!(out["path"], "src/app.txt");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let bag = params(json!({"path": "missing.txt"}));
        let err = ReadFile::new()
            .call(&context(&dir), ToolParams::new(&bag))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_apply_edit_requires_unique_match() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        std::fs::write(dir.path().join("a.txt"), "one two two").unwrap();

        let bag = params(json!({"path": "a.txt", "search": "two", "replace": "2"}));
        let err = ApplyEdit::new().call(&ctx, ToolParams::new(&bag)).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));

        let bag = params(json!({"path": "a.txt", "search": "one", "replace": "1"}));
        ApplyEdit::new().call(&ctx, ToolParams::new(&bag)).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "1 two two");

        let bag = params(json!({"path": "a.txt", "search": "three", "replace": "3"}));
        let err = ApplyEdit::new().call(&ctx, ToolParams::new(&bag)).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_search_code_skips_dependency_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("src/form.js"), "export function ContactForm() {}\n").unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "ContactForm\n").unwrap();

        let bag = params(json!({"pattern": "ContactForm"}));
        let out = SearchCode::new()
            .call(&context(&dir), ToolParams::new(&bag))
            .await
            .unwrap();
        let matches = out["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["file"], "src/form.js");
        assert_eq!(matches[0]["line"], 1);
    }

    #[tokio::test]
    async fn test_search_code_reports_bad_regex_as_syntax_error() {
        let dir = TempDir::new().unwrap();
        let bag = params(json!({"pattern": "(unclosed"}));
        let err = SearchCode::new()
            .call(&context(&dir), ToolParams::new(&bag))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Syntax error:"));
    }

    #[tokio::test]
    async fn test_run_command_failure_and_timeout() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let bag = params(json!({"command": "echo broken >&2; exit 2"}));
        let err = RunCommand::new().call(&ctx, ToolParams::new(&bag)).await.unwrap_err();
        assert!(matches!(err, ToolError::CommandFailed(ref m) if m.contains("broken")));

        let bag = params(json!({"command": "sleep 5", "timeout_secs": 1}));
        let err = RunCommand::new().call(&ctx, ToolParams::new(&bag)).await.unwrap_err();
        assert!(matches!(err, ToolError::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_run_command_runs_in_project_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let bag = params(json!({"command": "ls"}));
        let out = RunCommand::new()
            .call(&context(&dir), ToolParams::new(&bag))
            .await
            .unwrap();
        assert!(out["stdout"].as_str().unwrap().contains("marker"));
    }

    #[test]
    fn test_package_manager_detection() {
        let dir = TempDir::new().unwrap();
        assert_eq!(PackageManager::detect(dir.path()), None);

        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(PackageManager::detect(dir.path()), Some(PackageManager::Npm));

        std::fs::write(dir.path().join("yarn.lock"), "").unwrap();
        assert_eq!(PackageManager::detect(dir.path()), Some(PackageManager::Yarn));

        let (program, args) = PackageManager::Yarn.install_args("zod", true);
        assert_eq!(program, "yarn");
        assert_eq!(args, vec!["add", "--dev", "zod"]);
    }

    #[tokio::test]
    async fn test_delete_file_rejects_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let bag = params(json!({"path": "src"}));
        let err = DeleteFile::new()
            .call(&context(&dir), ToolParams::new(&bag))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
