//! Doctor command - verify services and configuration.

use crate::cli::preflight;
use crate::cli::Output;
use crate::config::Settings;
use crate::llm::ModelSpec;
use crate::vector_store::{BackendKind, SqliteVectorStore, LOCAL_DB_FILE};
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Plotline Doctor");
    println!();
    println!("Checking services and configuration...\n");

    let mut checks = Vec::new();
    let mut section = |title: &str, results: Vec<CheckResult>| {
        println!("{}", style(title).bold());
        for check in &results {
            check.print();
        }
        println!();
        checks.extend(results);
    };

    section("Model Runtime", vec![check_ollama(settings).await, check_openai(settings)]);
    section("Vector Store", check_vector_store(settings).await);
    section("Evaluation", vec![check_evaluation_files(settings)]);
    section("Configuration", vec![check_config_file()]);

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Plotline.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Plotline is ready to use.");
    }

    Ok(())
}

async fn check_ollama(settings: &Settings) -> CheckResult {
    let url = &settings.llm.ollama_url;
    match preflight::check_ollama(url).await {
        Ok(()) => CheckResult::ok("Ollama", url),
        Err(e) => CheckResult::error("Ollama", &e.to_string(), "Start it with: ollama serve"),
    }
}

/// Only needed when a configured judge runs on OpenAI.
fn check_openai(settings: &Settings) -> CheckResult {
    let uses_openai = [
        &settings.evaluation.judge_model,
        &settings.evaluation.pairwise_judge_model,
    ]
    .iter()
    .any(|selector| matches!(selector.parse::<ModelSpec>(), Ok(ModelSpec::OpenAI(_))));

    match (preflight::check_api_key(settings), uses_openai) {
        (Ok(()), _) => {
            let key = settings.llm.openai_api_key.as_deref().unwrap_or_default();
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", mask_key(key)))
        }
        (Err(_), true) => CheckResult::warning(
            "OPENAI_API_KEY",
            "not set",
            "The pairwise judge needs it: export OPENAI_API_KEY='sk-...'",
        ),
        (Err(_), false) => CheckResult::ok("OPENAI_API_KEY", "not needed"),
    }
}

async fn check_vector_store(settings: &Settings) -> Vec<CheckResult> {
    let backend: BackendKind = match settings.vector_store.backend.parse() {
        Ok(backend) => backend,
        Err(e) => {
            return vec![CheckResult::error(
                "Backend",
                &e.to_string(),
                "Use one of: local, chromadb, qdrant",
            )]
        }
    };

    let mut results = vec![CheckResult::ok("Backend", &backend.to_string())];
    results.push(match backend {
        BackendKind::Local => {
            let path = settings.local_store_dir().join(LOCAL_DB_FILE);
            if path.exists() {
                match SqliteVectorStore::new(&path, &settings.vector_store.collection)
                    .and_then(|store| store.collections())
                {
                    Ok(collections) => CheckResult::ok(
                        "Local store",
                        &format!("{} ({} collections)", path.display(), collections.len()),
                    ),
                    Err(e) => CheckResult::error("Local store", &e.to_string(), "Re-run plotline ingest"),
                }
            } else {
                CheckResult::warning(
                    "Local store",
                    &format!("{} (not created yet)", path.display()),
                    "Create it with: plotline ingest <movies.json> --backend local",
                )
            }
        }
        BackendKind::Qdrant => {
            let url = settings.vector_store.qdrant_url();
            match preflight::check_qdrant(&url).await {
                Ok(()) => CheckResult::ok("Qdrant", &url),
                Err(e) => CheckResult::error(
                    "Qdrant",
                    &e.to_string(),
                    "Start it with: docker run -p 6333:6333 qdrant/qdrant",
                ),
            }
        }
        BackendKind::Chromadb => {
            let url = &settings.vector_store.chroma_url;
            match preflight::check_chroma(url).await {
                Ok(()) => CheckResult::ok("Chroma", url),
                Err(e) => CheckResult::error(
                    "Chroma",
                    &e.to_string(),
                    "Start it with: docker run -p 8000:8000 chromadb/chroma",
                ),
            }
        }
    });

    results
}

fn check_evaluation_files(settings: &Settings) -> CheckResult {
    let db_path = settings.evaluation_db_path();
    if db_path.exists() {
        let size = std::fs::metadata(&db_path)
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|_| "unknown size".to_string());
        CheckResult::ok("Database", &format!("{} ({})", db_path.display(), size))
    } else {
        CheckResult::warning(
            "Database",
            &format!("{} (not created yet)", db_path.display()),
            "Create it with: plotline eval init",
        )
    }
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Print the defaults with: plotline config show",
        )
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 11 {
        return "***".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_error() {
        let result = CheckResult::error("test", "failed", "fix it");
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.hint, Some("fix it".to_string()));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdefghijklmnop"), "sk-abcd...mnop");
        assert_eq!(mask_key("short"), "***");
    }

    #[test]
    fn test_openai_only_needed_for_openai_judges() {
        let mut settings = Settings::default();
        assert_eq!(check_openai(&settings).status, CheckStatus::Warning);

        settings.evaluation.pairwise_judge_model = "oll_llama3_instruct".to_string();
        assert_eq!(check_openai(&settings).status, CheckStatus::Ok);
    }

    #[tokio::test]
    async fn test_local_store_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.general.root_dir = dir.path().display().to_string();
        settings.vector_store.backend = "local".to_string();

        let results = check_vector_store(&settings).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].status, CheckStatus::Warning);

        settings.vector_store.backend = "pinecone".to_string();
        let results = check_vector_store(&settings).await;
        assert_eq!(results[0].status, CheckStatus::Error);
    }
}
