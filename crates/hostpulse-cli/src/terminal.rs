use std::io::Write;
use std::sync::Arc;

use hostpulse_core::{now_ms, rows, Snapshot};
use hostpulse_services::DisplaySink;

use crate::OutputFormat;

/// Renders each snapshot to a writer, either as a redrawn table or as one
/// JSON object per line.
pub struct TerminalSink<W: Write + Send> {
    out: W,
    format: OutputFormat,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    fn write_table(&mut self, snapshot: &Snapshot) -> std::io::Result<()> {
        // Clear screen and home the cursor
        write!(self.out, "\x1B[2J\x1B[1;1H")?;
        writeln!(self.out, "System Monitor")?;
        writeln!(self.out, "{:-<40}", "")?;
        for (label, value) in rows(Some(snapshot)) {
            writeln!(self.out, "  {:<12} {}", label, value)?;
        }
        writeln!(self.out, "{:-<40}", "")?;
        writeln!(
            self.out,
            "  Updated {} ms ago. Ctrl+C to quit.",
            now_ms().saturating_sub(snapshot.captured_at_ms)
        )?;
        self.out.flush()
    }

    fn write_json(&mut self, snapshot: &Snapshot) -> hostpulse_core::Result<()> {
        writeln!(self.out, "{}", snapshot.to_json()?)?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> DisplaySink for TerminalSink<W> {
    fn render(&mut self, snapshot: Arc<Snapshot>) -> hostpulse_core::Result<()> {
        match self.format {
            OutputFormat::Table => self.write_table(&snapshot)?,
            OutputFormat::Json => self.write_json(&snapshot)?,
        }
        Ok(())
    }
}
