//! Sumideros de progreso: reciben un contador monótono, una vez por fila
//! procesada, independiente del resultado de la fila.

use std::io::Write;

pub trait ProgressSink {
    fn on_progress(&mut self, processed: u64);
}

impl<F: FnMut(u64)> ProgressSink for F {
    fn on_progress(&mut self, processed: u64) {
        self(processed)
    }
}

/// Descarta el progreso.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _processed: u64) {}
}

/// Imprime el contador con ancho fijo de 6, diez por línea. Pensado para
/// salidas que no son una terminal (logs, pipes).
pub struct CounterPrinter<W: Write> {
    out: W,
    last: u64,
}

impl<W: Write> CounterPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: 0 }
    }

    /// Cierra la última línea si quedó incompleta y devuelve el writer.
    pub fn finish(mut self) -> W {
        if self.last % 10 != 0 {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
        }
        self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressSink for CounterPrinter<W> {
    fn on_progress(&mut self, processed: u64) {
        self.last = processed;
        let sep = if processed % 10 == 0 { "\n" } else { "" };
        // El progreso es sólo informativo: un fallo de escritura no detiene la corrida.
        let _ = write!(self.out, "{processed:6}{sep}");
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_printer_breaks_line_every_ten() {
        let mut p = CounterPrinter::new(Vec::new());
        for i in 1..=11 {
            p.on_progress(i);
        }
        let text = String::from_utf8(p.into_inner()).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 60);
        assert_eq!(lines[1], "    11");
    }

    #[test]
    fn finish_closes_an_incomplete_line_only() {
        let mut p = CounterPrinter::new(Vec::new());
        for i in 1..=3 {
            p.on_progress(i);
        }
        assert_eq!(String::from_utf8(p.finish()).unwrap(), "     1     2     3\n");

        let mut full = CounterPrinter::new(Vec::new());
        for i in 1..=10 {
            full.on_progress(i);
        }
        assert!(String::from_utf8(full.finish()).unwrap().ends_with("    10\n"));
        assert!(CounterPrinter::new(Vec::new()).finish().is_empty());
    }

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |n: u64| seen.push(n);
            sink.on_progress(1);
            sink.on_progress(2);
        }
        assert_eq!(seen, vec![1, 2]);
    }
}
