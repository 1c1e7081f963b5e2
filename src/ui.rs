//! Interface de terminal do TATKAL — spinners por sessão e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`FleetProgress`] acompanha cada sessão da
//! frota com uma linha própria.

use std::collections::BTreeMap;
use std::time::Duration;

use console::Style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use tatkal::orchestrator::FleetReport;
use tatkal::state_machine::{LogEntry, State};
use tatkal::status::StatusUpdate;

/// Indicador visual de progresso de uma frota no terminal.
///
/// Cada sessão ganha um spinner com o estado atual; erros são impressos
/// em vermelho acima dos spinners.
pub struct FleetProgress {
    multi: MultiProgress,
    // Um spinner por sessão, criado na primeira atualização.
    bars: BTreeMap<u32, ProgressBar>,
    green: Style,
    red: Style,
    yellow: Style,
}

impl Default for FleetProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: BTreeMap::new(),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    fn bar(&mut self, instance_id: u32) -> &ProgressBar {
        let multi = &self.multi;
        self.bars.entry(instance_id).or_insert_with(|| {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {prefix:.bold} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_prefix(format!("[bot {instance_id}]"));
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        })
    }

    /// Atualiza o spinner da sessão com o estado e a última mensagem.
    pub fn update(&mut self, update: &StatusUpdate) {
        let state_style = self.style_for(update.state).clone();
        let red = self.red.clone();
        let pb = self.bar(update.instance_id);
        let message = update
            .latest
            .as_ref()
            .map(|entry| entry.message.as_str())
            .unwrap_or_default();
        pb.set_message(format!("{:<26} {message}", state_style.apply_to(update.state)));

        if let Some(entry) = update.latest.as_ref().filter(|e| e.is_error) {
            pb.println(format!(
                "  {} bot {}: {}",
                red.apply_to("✗"),
                update.instance_id,
                entry.message
            ));
        }
    }

    fn style_for(&self, state: State) -> &Style {
        match state {
            State::BookingConfirmed => &self.green,
            State::BookingFailed | State::FatalError | State::LoginFailed => &self.red,
            _ => &self.yellow,
        }
    }

    /// Finaliza os spinners e exibe o resumo da frota.
    pub fn finish(&self, report: &FleetReport) {
        for pb in self.bars.values() {
            pb.finish_and_clear();
        }
        println!();
        if let Some(diagnostic) = &report.diagnostic {
            println!("  {} {diagnostic}", self.yellow.apply_to("!"));
            return;
        }
        for instance_id in &report.skipped {
            println!(
                "  {} bot {instance_id}: skipped (incomplete credentials)",
                self.yellow.apply_to("-")
            );
        }
        for instance_id in &report.not_started {
            println!(
                "  {} bot {instance_id}: not started (fleet stopped)",
                self.yellow.apply_to("-")
            );
        }
        for session in &report.sessions {
            let (mark, style) = if session.succeeded() {
                ("✓", &self.green)
            } else {
                ("✗", &self.red)
            };
            println!(
                "  {} bot {} ({}): {}",
                style.apply_to(mark),
                session.instance_id,
                session.username,
                style.apply_to(session.final_state)
            );
        }
        println!(
            "\n  {} of {} session(s) confirmed a booking",
            report.confirmed(),
            report.sessions.len()
        );
    }

    /// Imprime o log de uma sessão, do mais antigo ao mais recente.
    pub fn print_log(&self, instance_id: u32, entries: &[LogEntry]) {
        let latest = entries.last().map(|e| e.state).unwrap_or(State::Unknown);
        println!(
            "{} {}",
            Style::new().bold().apply_to(format!("bot {instance_id}")),
            self.style_for(latest).apply_to(latest)
        );
        for entry in entries {
            let time = entry.timestamp.format("%H:%M:%S");
            if entry.is_error {
                println!("  [{time}] {}", self.red.apply_to(&entry.message));
            } else if entry.is_state_change {
                println!("  [{time}] {}", self.yellow.apply_to(&entry.message));
            } else {
                println!("  [{time}] {}", entry.message);
            }
        }
    }
}
