//! Project modeler: a compact, cached summary of the target project used as
//! planning context.
//!
//! The first request for a project scans its tree, asks the completion
//! service to classify the digest and caches the result at
//! `<root>/.lantern/project-summary.json`. Later requests return the cached
//! summary unchanged. When the service fails or answers nonsense, a
//! heuristic summary built from the digest alone is cached instead; this
//! path never fails.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::Value;
use walkdir::WalkDir;

use crate::{
    completion::{extract_payload, CompletionRequest, CompletionService, CompletionTask},
    models::{ProjectSummary, SummarySource},
    tools::path::is_ignored_dir,
};

/// Directory, relative to the project root, holding engine state.
pub const STATE_DIR: &str = ".lantern";
const SUMMARY_FILE: &str = "project-summary.json";

/// Files listed verbatim in the classification prompt.
const DIGEST_FILE_LISTING: usize = 150;

const MANIFESTS: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Gemfile",
    "composer.json",
];

const ENTRY_POINT_STEMS: &[&str] = &["main", "index", "app", "lib", "server", "page", "layout"];

const CLASSIFY_INSTRUCTIONS: &str = "You classify software projects. Reply with one JSON object: \
{\"kind\": string, \"framework\": string, \"languages\": [string], \"key_files\": [string], \
\"notes\": string}. Use \"unknown\" when unsure.";

/// Shallow structural digest of a project tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDigest {
    /// Relative file paths, in walk order
    pub files: Vec<String>,
    /// True if the scan stopped at the file limit
    pub truncated: bool,
    /// Languages by descending file count
    pub languages: Vec<String>,
    /// Top-level directories
    pub areas: Vec<String>,
    /// Manifests present at the root
    pub manifests: Vec<String>,
}

impl ProjectDigest {
    /// Walks `root`, skipping dependency and build directories, stopping
    /// after `limit` files.
    pub fn scan(root: &Path, limit: usize) -> Self {
        let mut digest = ProjectDigest::default();
        let mut language_counts: HashMap<&'static str, usize> = HashMap::new();
        let mut areas = BTreeSet::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !(entry.file_type().is_dir()
                        && is_ignored_dir(&entry.file_name().to_string_lossy()))
            });

        for entry in walker.filter_map(|e| e.ok()) {
            if entry.depth() == 0 {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().is_dir() {
                if entry.depth() == 1 && !name.starts_with('.') {
                    areas.insert(name);
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            if digest.files.len() == limit {
                digest.truncated = true;
                break;
            }

            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            if entry.depth() == 1 && MANIFESTS.contains(&name.as_str()) {
                digest.manifests.push(name.clone());
            }
            if let Some(language) = entry
                .path()
                .extension()
                .and_then(|ext| language_for_extension(&ext.to_string_lossy()))
            {
                *language_counts.entry(language).or_default() += 1;
            }
            digest.files.push(relative);
        }

        let mut languages: Vec<(&str, usize)> = language_counts.into_iter().collect();
        languages.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        digest.languages = languages.into_iter().map(|(l, _)| l.to_string()).collect();
        digest.areas = areas.into_iter().collect();
        digest
    }

    /// Text block sent to the completion service.
    pub fn to_prompt(&self) -> String {
        let mut out = format!(
            "Files scanned: {}{}\nManifests: {}\nLanguages by file count: {}\nTop-level directories: {}\nFiles:\n",
            self.files.len(),
            if self.truncated { " (truncated)" } else { "" },
            list_or_none(&self.manifests),
            list_or_none(&self.languages),
            list_or_none(&self.areas),
        );
        for file in self.files.iter().take(DIGEST_FILE_LISTING) {
            out.push_str("- ");
            out.push_str(file);
            out.push('\n');
        }
        if self.files.len() > DIGEST_FILE_LISTING {
            out.push_str(&format!(
                "... and {} more\n",
                self.files.len() - DIGEST_FILE_LISTING
            ));
        }
        out
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

fn language_for_extension(ext: &str) -> Option<&'static str> {
    let language = match ext.to_lowercase().as_str() {
        "rs" => "Rust",
        "ts" | "tsx" => "TypeScript",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "py" => "Python",
        "go" => "Go",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "rb" => "Ruby",
        "php" => "PHP",
        "cs" => "C#",
        "c" | "h" => "C",
        "cpp" | "cc" | "hpp" => "C++",
        "swift" => "Swift",
        "vue" => "Vue",
        "svelte" => "Svelte",
        "html" | "htm" => "HTML",
        "css" | "scss" | "sass" => "CSS",
        _ => return None,
    };
    Some(language)
}

/// Builds and caches project summaries.
#[derive(Clone)]
pub struct ProjectModeler {
    completion: Arc<dyn CompletionService>,
    scan_limit: usize,
}

impl ProjectModeler {
    pub fn new(completion: Arc<dyn CompletionService>, scan_limit: usize) -> Self {
        Self {
            completion,
            scan_limit,
        }
    }

    /// Location of the cached summary for `root`.
    pub fn cache_path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(SUMMARY_FILE)
    }

    /// Returns the project summary, from cache when one exists.
    pub async fn summarize(&self, root: &Path, request: &str) -> ProjectSummary {
        let cache = Self::cache_path(root);
        if let Some(cached) = load_cached(&cache).await {
            log::debug!("Using cached project summary {}", cache.display());
            return cached;
        }

        let scan_root = root.to_path_buf();
        let limit = self.scan_limit;
        let digest = tokio::task::spawn_blocking(move || ProjectDigest::scan(&scan_root, limit))
            .await
            .unwrap_or_else(|e| {
                log::warn!("Project scan failed: {e}");
                ProjectDigest::default()
            });

        let summary = match self.classify(&digest, request).await {
            Some(summary) => summary,
            None => {
                log::warn!("Falling back to a heuristic summary for {}", root.display());
                heuristic_summary(root, &digest)
            }
        };

        if let Err(e) = store_cached(&cache, &summary).await {
            log::warn!("Could not cache project summary at {}: {e}", cache.display());
        }
        summary
    }

    async fn classify(&self, digest: &ProjectDigest, request: &str) -> Option<ProjectSummary> {
        let prompt = format!("User request: {request}\n\n{}", digest.to_prompt());
        let completion = CompletionRequest::new(CompletionTask::Classify, CLASSIFY_INSTRUCTIONS)
            .user(prompt);

        let reply = match self.completion.complete(&completion).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("Project classification failed: {e}");
                return None;
            }
        };

        let payload = extract_payload(&reply).filter(Value::is_object)?;
        let mut summary: ProjectSummary = serde_json::from_value(payload)
            .map_err(|e| log::warn!("Unusable classification payload: {e}"))
            .ok()?;

        if summary.languages.is_empty() {
            summary.languages = digest.languages.clone();
        }
        if summary.areas.is_empty() {
            summary.areas = digest.areas.clone();
        }
        summary.source = SummarySource::Model;
        Some(summary)
    }
}

async fn load_cached(path: &Path) -> Option<ProjectSummary> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&raw) {
        Ok(summary) => Some(summary),
        Err(e) => {
            log::warn!("Ignoring unreadable summary cache {}: {e}", path.display());
            None
        }
    }
}

async fn store_cached(path: &Path, summary: &ProjectSummary) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(summary).map_err(std::io::Error::other)?;
    tokio::fs::write(path, json).await
}

/// Summary inferred from the digest and root manifests only.
pub fn heuristic_summary(root: &Path, digest: &ProjectDigest) -> ProjectSummary {
    let framework = detect_framework(root, &digest.manifests);
    let has = |name: &str| digest.manifests.iter().any(|m| m == name);

    let kind = if has("package.json") {
        if framework == "unknown" {
            "node-project"
        } else {
            "web-app"
        }
    } else if has("Cargo.toml") {
        "rust-crate"
    } else if has("pyproject.toml") || has("requirements.txt") {
        "python-project"
    } else if has("go.mod") {
        "go-module"
    } else if digest.files.is_empty() {
        "empty"
    } else {
        "unknown"
    };

    let mut key_files: Vec<String> = digest.manifests.clone();
    key_files.extend(
        digest
            .files
            .iter()
            .filter(|file| {
                let path = Path::new(file.as_str());
                let shallow = path.components().count() <= 3;
                let readme = file.eq_ignore_ascii_case("README.md");
                let entry = path
                    .file_stem()
                    .map(|stem| ENTRY_POINT_STEMS.contains(&&*stem.to_string_lossy()))
                    .unwrap_or(false);
                shallow && (readme || entry)
            })
            .take(10)
            .cloned(),
    );

    ProjectSummary {
        kind: kind.to_string(),
        framework,
        languages: digest.languages.clone(),
        key_files,
        areas: digest.areas.clone(),
        notes: format!(
            "Heuristic summary from {} scanned files{}",
            digest.files.len(),
            if digest.truncated { " (scan truncated)" } else { "" }
        ),
        source: SummarySource::Heuristic,
    }
}

fn detect_framework(root: &Path, manifests: &[String]) -> String {
    const NODE: &[(&str, &str)] = &[
        ("next", "next.js"),
        ("nuxt", "nuxt"),
        ("@angular/core", "angular"),
        ("svelte", "svelte"),
        ("vue", "vue"),
        ("react", "react"),
        ("express", "express"),
    ];
    const TEXT: &[(&str, &str, &str)] = &[
        ("Cargo.toml", "axum", "axum"),
        ("Cargo.toml", "actix-web", "actix-web"),
        ("Cargo.toml", "rocket", "rocket"),
        ("pyproject.toml", "django", "django"),
        ("pyproject.toml", "fastapi", "fastapi"),
        ("pyproject.toml", "flask", "flask"),
        ("requirements.txt", "django", "django"),
        ("requirements.txt", "fastapi", "fastapi"),
        ("requirements.txt", "flask", "flask"),
    ];

    if manifests.iter().any(|m| m == "package.json") {
        let deps = std::fs::read_to_string(root.join("package.json"))
            .ok()
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .map(|pkg| {
                ["dependencies", "devDependencies"]
                    .iter()
                    .filter_map(|section| pkg.get(section).and_then(Value::as_object))
                    .flat_map(|section| section.keys().cloned())
                    .collect::<BTreeSet<_>>()
            })
            .unwrap_or_default();
        if let Some((_, name)) = NODE.iter().find(|(dep, _)| deps.contains(*dep)) {
            return name.to_string();
        }
    }

    for (manifest, needle, name) in TEXT {
        if !manifests.iter().any(|m| m == manifest) {
            continue;
        }
        let found = std::fs::read_to_string(root.join(manifest))
            .map(|text| text.to_lowercase().contains(needle))
            .unwrap_or(false);
        if found {
            return name.to_string();
        }
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::completion::ScriptedCompletion;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/components")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/react")).unwrap();
        std::fs::write(
            root.join("package.json"),
            r#"{"dependencies": {"react": "^18.0.0"}}"#,
        )
        .unwrap();
        std::fs::write(root.join("src/index.tsx"), "export {}").unwrap();
        std::fs::write(root.join("src/components/Form.tsx"), "export {}").unwrap();
        std::fs::write(root.join("node_modules/react/index.js"), "").unwrap();
        dir
    }

    #[test]
    fn test_scan_skips_dependencies() {
        let dir = project();
        let digest = ProjectDigest::scan(dir.path(), 100);
        assert!(digest.files.iter().all(|f| !f.starts_with("node_modules")));
        assert_eq!(digest.languages, vec!["TypeScript"]);
        assert_eq!(digest.areas, vec!["src"]);
        assert_eq!(digest.manifests, vec!["package.json"]);
    }

    #[test]
    fn test_scan_limit_truncates() {
        let dir = project();
        let digest = ProjectDigest::scan(dir.path(), 1);
        assert_eq!(digest.files.len(), 1);
        assert!(digest.truncated);
    }

    #[test]
    fn test_heuristic_detects_framework() {
        let dir = project();
        let digest = ProjectDigest::scan(dir.path(), 100);
        let summary = heuristic_summary(dir.path(), &digest);
        assert_eq!(summary.kind, "web-app");
        assert_eq!(summary.framework, "react");
        assert_eq!(summary.source, SummarySource::Heuristic);
        assert!(summary.key_files.contains(&"package.json".to_string()));
        assert!(summary.key_files.contains(&"src/index.tsx".to_string()));
    }

    #[tokio::test]
    async fn test_model_summary_is_cached() {
        let dir = project();
        let service = Arc::new(ScriptedCompletion::new().reply(
            CompletionTask::Classify,
            r#"{"kind": "web-app", "framework": "react", "notes": "SPA"}"#,
        ));
        let modeler = ProjectModeler::new(service.clone(), 100);

        let first = modeler.summarize(dir.path(), "add a contact form").await;
        assert_eq!(first.framework, "react");
        assert_eq!(first.source, SummarySource::Model);
        assert_eq!(first.languages, vec!["TypeScript"]);
        assert!(ProjectModeler::cache_path(dir.path()).is_file());

        let second = modeler.summarize(dir.path(), "something else").await;
        assert_eq!(first, second);
        assert_eq!(service.calls(CompletionTask::Classify), 1);
    }

    #[tokio::test]
    async fn test_service_failure_degrades_to_heuristic() {
        let dir = project();
        let service = Arc::new(ScriptedCompletion::new().fail(CompletionTask::Classify, "offline"));
        let modeler = ProjectModeler::new(service, 100);

        let summary = modeler.summarize(dir.path(), "add a contact form").await;
        assert_eq!(summary.source, SummarySource::Heuristic);
        assert_eq!(summary.framework, "react");
    }
}
