use std::io::Write;
use std::path::Path;

use cheminsight_core::{CompoundOutcome, CompoundStatus, SearchOutcome};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Markdown,
}

impl ExportFormat {
    /// Guess the format from a file extension; defaults to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ExportFormat::Json,
            Some("md") | Some("markdown") => ExportFormat::Markdown,
            _ => ExportFormat::Csv,
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// Render a search outcome in the given format.
pub fn render(outcome: &SearchOutcome, format: ExportFormat) -> String {
    match format {
        ExportFormat::Csv => render_csv(outcome),
        ExportFormat::Json => render_json(outcome),
        ExportFormat::Markdown => render_markdown(outcome),
    }
}

/// Export a search outcome to the given path.
pub fn export_results(
    outcome: &SearchOutcome,
    format: ExportFormat,
    path: &Path,
) -> Result<(), String> {
    let content = render(outcome, format);
    let mut file =
        std::fs::File::create(path).map_err(|e| format!("Failed to create file: {}", e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| format!("Failed to write: {}", e))?;
    Ok(())
}

fn status_str(s: CompoundStatus) -> &'static str {
    match s {
        CompoundStatus::Success => "success",
        CompoundStatus::Partial => "partial",
        CompoundStatus::Failed => "failed",
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn render_csv(outcome: &SearchOutcome) -> String {
    let mut out = String::from("PMID,Title,Authors,Journal,Year,Abstract,Compound,SourceTerms\n");
    for compound in &outcome.compounds {
        for record in &compound.articles {
            let authors = record.authors.join("; ");
            let year = record.year.map(|y| y.to_string()).unwrap_or_default();
            let abstract_text = record.abstract_text.as_deref().unwrap_or("");
            let terms: Vec<&str> = record.source_terms.iter().map(String::as_str).collect();
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                csv_escape(&record.pmid),
                csv_escape(&record.title),
                csv_escape(&authors),
                csv_escape(&record.journal),
                year,
                csv_escape(abstract_text),
                csv_escape(&compound.compound),
                csv_escape(&terms.join("; ")),
            ));
        }
    }
    out
}

fn render_json(outcome: &SearchOutcome) -> String {
    serde_json::to_string_pretty(outcome).unwrap_or_else(|_| "{}".to_string())
}

fn md_escape(s: &str) -> String {
    s.replace('|', "\\|")
}

fn render_markdown(outcome: &SearchOutcome) -> String {
    let mut out = String::from("# CheMinsight Results\n\n");

    for compound in &outcome.compounds {
        render_markdown_compound(&mut out, compound);
    }

    out.push_str(&format!(
        "## Combined ({} unique articles)\n\n",
        outcome.combined.len()
    ));
    render_markdown_table(&mut out, &outcome.combined);
    out
}

fn render_markdown_compound(out: &mut String, compound: &CompoundOutcome) {
    out.push_str(&format!(
        "## {} — {}\n\n",
        md_escape(&compound.compound),
        status_str(compound.status)
    ));
    if let Some(ref reason) = compound.reason {
        out.push_str(&format!("> {}\n\n", md_escape(reason)));
    }
    if !compound.synonyms_used.is_empty() {
        out.push_str(&format!(
            "Synonyms: {}\n\n",
            md_escape(&compound.synonyms_used.join(", "))
        ));
    }
    render_markdown_table(out, &compound.articles);
}

fn render_markdown_table(out: &mut String, articles: &[cheminsight_core::ArticleRecord]) {
    if articles.is_empty() {
        out.push_str("_No articles._\n\n");
        return;
    }
    out.push_str("| PMID | Title | Journal | Year |\n");
    out.push_str("|------|-------|---------|------|\n");
    for record in articles {
        let year = record.year.map(|y| y.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "| [{}]({}) | {} | {} | {} |\n",
            record.pmid,
            record.url,
            md_escape(&record.title),
            md_escape(&record.journal),
            year
        ));
    }
    out.push('\n');
}
