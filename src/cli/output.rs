//! CLI output formatting utilities.

use crate::evaluation::EvaluationResult;
use crate::rag::ContextChunk;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a retrieved node.
    pub fn source_node(chunk: &ContextChunk) {
        let year = chunk
            .metadata
            .get("release_year")
            .map(crate::loading::display_value);
        let title = match year {
            Some(year) => format!("{} ({})", chunk.title.as_deref().unwrap_or("Untitled"), year),
            None => chunk.title.as_deref().unwrap_or("Untitled").to_string(),
        };

        println!(
            "\n{} {} (score: {:.2})",
            style(">>").green(),
            style(title).bold(),
            chunk.score
        );
        println!("   {}", content_preview(&chunk.text, 200));
    }

    /// Print a judge's verdict.
    pub fn evaluation(result: &EvaluationResult) {
        if result.invalid_result {
            Output::warning(&format!(
                "Invalid judge output: {}",
                result.invalid_reason.as_deref().unwrap_or("unknown reason")
            ));
        }

        let score = result
            .score
            .map(|s| format!("{:.3}", s))
            .unwrap_or_else(|| "-".to_string());
        Output::kv("Score", &score);

        let passing = match result.passing {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        };
        Output::kv("Passing", passing);

        Output::header("Feedback");
        println!("{}", result.feedback.trim());
    }

    /// Create a progress bar.
    pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(msg.to_string());
        pb
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Single-line preview, cut at a char boundary.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview() {
        assert_eq!(content_preview("short\ntext", 20), "short text");
        assert_eq!(content_preview("Amélie wins", 6), "Amélie...");
    }
}
