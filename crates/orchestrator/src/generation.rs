use appforge_core::{FileMap, RequirementsDocument};
use chrono::{SecondsFormat, Utc};
use llm::GenerationBackend;
use regex::Regex;
use tracing::{info, warn};

const DEFAULT_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Generated App</title>
    <link href="https://cdn.jsdelivr.net/npm/tailwindcss@2.2.19/dist/tailwind.min.css" rel="stylesheet">
    <link rel="icon" href="data:,">
    <style>body{min-height:100vh}</style>

    <!-- Bootstrap 5 (commonly required by tasks) -->
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css" rel="stylesheet">
</head>
<body class="p-4">
    <div id="app" class="container">
        <h1 class="display-6 mb-3">Welcome to Your App</h1>
        <p>This is a default template. The app will be generated here.</p>
        <div id="total-sales" class="fw-bold"></div>
    </div>
    <script src="app.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/js/bootstrap.bundle.min.js"></script>
</body>
</html>"#;

const DEFAULT_APP_JS: &str =
    "// Your application JavaScript code will be generated here\nconsole.log('App initialized');";

const DEFAULT_README: &str = "# Generated App\n\n\
This is an automatically generated application.\n\n\
## Setup\n\n\
1. Clone this repository\n\
2. Open `index.html` in a web browser\n\n\
## Usage\n\n\
Edit the files to customize your application.";

/// Files produced for one round, and whether they came from the fallback set.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFiles {
    pub files: FileMap,
    pub used_fallback: bool,
}

/// Minimal landing page, script stub and README committed when generation fails.
pub fn default_file_set() -> FileMap {
    let mut files = FileMap::new();
    files.insert("index.html".to_string(), DEFAULT_INDEX_HTML.to_string());
    files.insert("app.js".to_string(), DEFAULT_APP_JS.to_string());
    files.insert("README.md".to_string(), DEFAULT_README.to_string());
    files
}

/// Parses model output as a path → content object, either bare or inside a
/// fenced code block. Empty objects are rejected.
pub fn parse_file_map(raw: &str) -> Option<FileMap> {
    let files = match serde_json::from_str::<FileMap>(raw.trim()) {
        Ok(files) => files,
        Err(_) => {
            let re = Regex::new(r"(?s)```(?:json)?\n(.*?)\n```").ok()?;
            let block = re.captures(raw)?.get(1)?.as_str();
            serde_json::from_str::<FileMap>(block).ok()?
        }
    };

    if files.is_empty() {
        return None;
    }
    Some(files)
}

/// Asks the backend for files, falling back to [`default_file_set`] on any
/// backend error or unparseable output.
pub async fn generate_files(
    backend: &dyn GenerationBackend,
    requirements: &RequirementsDocument,
) -> GeneratedFiles {
    let raw = match backend.generate(requirements).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(backend = backend.name(), error = %e, "Generation failed, using default files");
            return fallback();
        }
    };

    match parse_file_map(&raw) {
        Some(files) => {
            info!(backend = backend.name(), files = files.len(), "Generated files");
            GeneratedFiles {
                files,
                used_fallback: false,
            }
        }
        None => {
            warn!(
                backend = backend.name(),
                response_len = raw.len(),
                "Generation output is not a file map, using default files"
            );
            fallback()
        }
    }
}

fn fallback() -> GeneratedFiles {
    GeneratedFiles {
        files: default_file_set(),
        used_fallback: true,
    }
}

/// Appends the generation timestamp to `README.md`, if there is one.
pub fn stamp_readme(files: &mut FileMap) {
    if let Some(readme) = files.get_mut("README.md") {
        readme.push_str(&format!(
            "\n\n---\n*Generated on {}*",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
}
