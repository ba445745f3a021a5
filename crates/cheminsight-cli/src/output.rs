use std::io::Write;

use cheminsight_core::{CompoundStatus, ProgressEvent, SearchOutcome, SearchRequest};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the run header before the search starts.
pub fn print_run_header(request: &SearchRequest, _color: ColorMode) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut w = stdout.lock();
    writeln!(
        w,
        "Searching {} compound(s), {}-{}",
        request.compounds.len(),
        request.date_from,
        request.date_to
    )?;
    if !request.genes.is_empty() {
        writeln!(w, "Genes: {}", request.genes.join(", "))?;
    }
    if !request.keywords.is_empty() {
        writeln!(w, "Keywords: {}", request.keywords.join(", "))?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Resolving {
            index,
            total,
            compound,
        } => {
            writeln!(w, "[{}/{}] {}", index + 1, total, compound)?;
        }
        ProgressEvent::SynonymsResolved {
            compound,
            synonyms,
            ..
        } => {
            let line = if synonyms.is_empty() {
                format!("  {}: no synonyms, searching by name only", compound)
            } else {
                format!("  {}: synonyms {}", compound, synonyms.join(", "))
            };
            if color.enabled() {
                writeln!(w, "{}", line.dimmed())?;
            } else {
                writeln!(w, "{}", line)?;
            }
        }
        ProgressEvent::Fetching {
            compound,
            expression,
            expression_count,
            ..
        } => {
            let line = format!(
                "  {}: fetching query {}/{}",
                compound,
                expression + 1,
                expression_count
            );
            if color.enabled() {
                writeln!(w, "{}", line.dimmed())?;
            } else {
                writeln!(w, "{}", line)?;
            }
        }
        ProgressEvent::ExpressionComplete {
            compound,
            expression,
            articles,
            elapsed,
            ..
        } => {
            let line = format!(
                "  {}: query {} returned {} article(s) in {:.1}s",
                compound,
                expression + 1,
                articles,
                elapsed.as_secs_f64()
            );
            if color.enabled() {
                writeln!(w, "{}", line.dimmed())?;
            } else {
                writeln!(w, "{}", line)?;
            }
        }
        ProgressEvent::Warning {
            compound, message, ..
        } => {
            let line = format!("  {}: {}", compound, message);
            if color.enabled() {
                writeln!(w, "{}", line.yellow())?;
            } else {
                writeln!(w, "warning: {}", line)?;
            }
        }
        ProgressEvent::CompoundComplete {
            compound,
            status,
            articles,
            ..
        } => match status {
            CompoundStatus::Success => {
                let line = format!("✓ {} — {} article(s)", compound, articles);
                if color.enabled() {
                    writeln!(w, "{}", line.green())?;
                } else {
                    writeln!(w, "{}", line)?;
                }
            }
            CompoundStatus::Partial => {
                let line = format!("~ {} — {} article(s), partial", compound, articles);
                if color.enabled() {
                    writeln!(w, "{}", line.yellow())?;
                } else {
                    writeln!(w, "{}", line)?;
                }
            }
            CompoundStatus::Failed => {
                let line = format!("✗ {} — failed", compound);
                if color.enabled() {
                    writeln!(w, "{}", line.red())?;
                } else {
                    writeln!(w, "{}", line)?;
                }
            }
        },
    }
    Ok(())
}

/// Print the final per-compound summary and combined count.
pub fn print_summary(
    w: &mut dyn Write,
    outcome: &SearchOutcome,
    color: ColorMode,
) -> std::io::Result<()> {
    let succeeded = outcome
        .compounds
        .iter()
        .filter(|c| c.status == CompoundStatus::Success)
        .count();
    let partial = outcome
        .compounds
        .iter()
        .filter(|c| c.status == CompoundStatus::Partial)
        .count();
    let failed = outcome
        .compounds
        .iter()
        .filter(|c| c.status == CompoundStatus::Failed)
        .count();

    writeln!(w)?;
    writeln!(
        w,
        "Done: {} succeeded, {} partial, {} failed — {} unique article(s)",
        succeeded,
        partial,
        failed,
        outcome.combined.len()
    )?;

    for compound in &outcome.compounds {
        if let Some(ref reason) = compound.reason {
            let line = format!("  {}: {}", compound.compound, reason);
            match compound.status {
                CompoundStatus::Failed if color.enabled() => writeln!(w, "{}", line.red())?,
                _ if color.enabled() => writeln!(w, "{}", line.yellow())?,
                _ => writeln!(w, "{}", line)?,
            }
        }
    }
    Ok(())
}
