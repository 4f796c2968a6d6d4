//! Interface de terminal do pressline: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`PhaseProgress`] acompanha visualmente uma
//! fase do pipeline no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::PipelineError;
use crate::orchestrator::{AmendReport, PendingReview, PublishReport, ReviewReady, RunOutcome};
use crate::publish::AttemptOutcome;
use crate::state_machine::short_id;

/// Indicador visual de progresso para uma fase (run, approve, amend).
///
/// Exibe um spinner animado durante o processamento e mensagens
/// coloridas para sucesso (verde), falha (vermelho) e avisos (amarelo).
pub struct PhaseProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl PhaseProgress {
    /// Inicia o spinner com a descrição da fase.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        // Template fixo; se falhar, mantém o estilo padrão do indicatif.
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(description.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Finaliza o spinner e exibe o resultado de um `run`.
    pub fn run_finished(&self, outcome: &RunOutcome) {
        self.pb.finish_and_clear();
        match outcome {
            RunOutcome::ReadyForReview(ready) => self.print_review(ready),
            RunOutcome::Duplicate(dup) => {
                println!("  {} {}", self.yellow.apply_to("●"), dup.message);
            }
            RunOutcome::Failed(failure) => {
                println!("  {} Run failed: {}", self.red.apply_to("✗"), failure.error);
            }
        }
    }

    fn print_review(&self, ready: &ReviewReady) {
        let short = short_id(&ready.job_id);
        println!("  {} Ready for review: {}", self.green.apply_to("✓"), ready.title);
        println!("    draft    {}", ready.draft_url);
        println!(
            "    metrics  {} words, score {:.1}, {} lookups, {} QA cycles, ${:.4}",
            ready.metrics.word_count,
            ready.metrics.quality_score,
            ready.metrics.lookups_used,
            ready.metrics.qa_cycles,
            ready.metrics.cost_usd
        );
        println!("    {}", self.dim.apply_to(format!("approve with: pressline approve {short}")));
    }

    /// Finaliza o spinner e exibe o relatório de publicação.
    pub fn publish_finished(&self, report: &PublishReport) {
        self.pb.finish_and_clear();
        let mark = if report.succeeded() > 0 {
            self.green.apply_to("✓")
        } else {
            self.yellow.apply_to("●")
        };
        println!("  {mark} {}", report.message());
        for result in &report.results {
            let (sign, detail) = match &result.outcome {
                AttemptOutcome::Succeeded(r) => (self.green.apply_to("✓"), r.as_str()),
                AttemptOutcome::Failed(e) => (self.red.apply_to("✗"), e.as_str()),
                AttemptOutcome::Skipped(why) => (self.dim.apply_to("-"), why.as_str()),
            };
            println!("    {sign} {:<16} {detail}", result.kind.to_string());
        }
    }

    pub fn amend_finished(&self, report: &AmendReport) {
        self.pb.finish_and_clear();
        println!(
            "  {} Added {} blocks to {} ({} words)",
            self.green.apply_to("✓"),
            report.blocks_added,
            report.title,
            report.word_count
        );
        println!("    draft    {}", report.draft_url);
    }

    /// Finaliza o spinner com uma mensagem de erro.
    pub fn failed(&self, err: &PipelineError) {
        self.pb.finish_and_clear();
        println!("  {} {err} [{}]", self.red.apply_to("✗"), err.code());
    }
}

/// Imprime a lista de jobs aguardando revisão.
pub fn print_pending(pending: &[PendingReview]) {
    let header = Style::new().bold();
    if pending.is_empty() {
        println!("No jobs awaiting review.");
        return;
    }
    println!("{}", header.apply_to("─── Awaiting review ───"));
    for item in pending {
        let origin = if item.reconstructed { " (from store)" } else { "" };
        println!(
            "  {}  {}  {}{origin}",
            short_id(&item.job_id),
            item.stored_at.format("%Y-%m-%d %H:%M"),
            item.title
        );
    }
}
