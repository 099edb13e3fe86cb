//! Colored terminal output for packaging runs

use crate::bundler::DistributionArtifact;
use std::io::Write;
use termcolor::{Buffer, BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Output manager for consistent colored terminal output
#[derive(Debug)]
pub struct OutputManager {
    bufwtr: BufferWriter,
    verbose: bool,
    quiet: bool,
}

impl Clone for OutputManager {
    fn clone(&self) -> Self {
        Self::new(self.verbose, self.quiet)
    }
}

impl OutputManager {
    /// Create a new output manager
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            bufwtr: BufferWriter::stdout(ColorChoice::Auto),
            verbose,
            quiet,
        }
    }

    /// Print a progress message
    pub fn progress(&self, message: &str) {
        self.marked(Color::Magenta, false, "⋯", message);
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        self.marked(Color::Green, true, "✓", message);
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        self.marked(Color::Yellow, true, "⚠", message);
    }

    /// Print an error message (always shown, on stderr)
    pub fn error(&self, message: &str) {
        let bufwtr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        write_marked(&mut buffer, Color::Red, true, "✗", message);
        if bufwtr.print(&buffer).is_err() {
            eprintln!("✗ {message}");
        }
    }

    /// Print a detail line (only in verbose mode)
    pub fn verbose(&self, message: &str) {
        if self.verbose {
            self.marked(Color::Blue, false, "→", message);
        }
    }

    /// Print indented text (for sub-items)
    pub fn indent(&self, message: &str) {
        self.plain(&format!("    {message}"));
    }

    /// Print a plain message (respects quiet mode)
    pub fn println(&self, message: &str) {
        self.plain(message);
    }

    /// Print a finished artifact with its size and checksum
    pub fn artifact(&self, artifact: &DistributionArtifact) {
        self.success(&format!(
            "{} ({})",
            artifact.path.display(),
            human_size(artifact.size)
        ));
        self.indent(&format!("sha256 {}", artifact.checksum));
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    fn marked(&self, color: Color, bold: bool, mark: &str, message: &str) {
        if self.quiet {
            return;
        }
        let mut buffer = self.bufwtr.buffer();
        write_marked(&mut buffer, color, bold, mark, message);
        let _ = self.bufwtr.print(&buffer);
    }

    fn plain(&self, message: &str) {
        if self.quiet {
            return;
        }
        let mut buffer = self.bufwtr.buffer();
        let _ = writeln!(&mut buffer, "{message}");
        let _ = self.bufwtr.print(&buffer);
    }
}

fn write_marked(buffer: &mut Buffer, color: Color, bold: bool, mark: &str, message: &str) {
    let _ = buffer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
    let _ = write!(buffer, "{mark}");
    let _ = buffer.reset();
    let _ = writeln!(buffer, " {message}");
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
