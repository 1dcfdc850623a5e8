use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use potfit_core::ProgressSink;

const SPINNER_TICK_MS: u64 = 80;

/// Cómo se reporta el progreso de `fill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Off,
    /// Barra indicatif (stderr es una terminal).
    Bar,
    /// Contador plano de `CounterPrinter` (stderr redirigido).
    Counter,
}

impl ProgressMode {
    pub fn select(no_progress: bool, stderr_is_terminal: bool) -> Self {
        match (no_progress, stderr_is_terminal) {
            (true, _) => ProgressMode::Off,
            (false, true) => ProgressMode::Bar,
            (false, false) => ProgressMode::Counter,
        }
    }
}

/// Barra de progreso de la corrida: con `--count` muestra una barra
/// acotada, sin él un contador con spinner.
pub struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    pub fn new(total: Option<usize>) -> Self {
        let pb = match total {
            Some(n) => ProgressBar::new(n as u64).with_style(Self::bar_style()),
            None => {
                let pb = ProgressBar::new_spinner().with_style(Self::spinner_style());
                pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                pb
            }
        };
        pb.set_draw_target(ProgressDrawTarget::stderr());
        Self { pb }
    }

    /// Barra que no dibuja nada (redirecciones, tests).
    pub fn hidden() -> Self {
        Self { pb: ProgressBar::hidden() }
    }

    pub fn position(&self) -> u64 {
        self.pb.position()
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{elapsed_precise} [{bar:40.cyan/blue}] {pos}/{len} calculations ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner} {elapsed_precise} {pos} calculations")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl ProgressSink for BarProgress {
    fn on_progress(&mut self, processed: u64) {
        self.pb.set_position(processed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_depends_on_flag_and_terminal() {
        assert_eq!(ProgressMode::select(true, true), ProgressMode::Off);
        assert_eq!(ProgressMode::select(true, false), ProgressMode::Off);
        assert_eq!(ProgressMode::select(false, true), ProgressMode::Bar);
        assert_eq!(ProgressMode::select(false, false), ProgressMode::Counter);
    }

    #[test]
    fn position_follows_the_runner_counter() {
        let mut bar = BarProgress::hidden();
        for n in 1..=5 {
            bar.on_progress(n);
        }
        assert_eq!(bar.position(), 5);
        bar.finish();
    }
}
