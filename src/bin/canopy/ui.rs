//! Terminal rendering for the text output format.

use std::fmt::Display;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use canopy::{
    admin::{VerifyFinding, VerifySeverity},
    ListEntry, Node,
};
use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};

/// When to emit ANSI colors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ColorMode {
    /// Color only when stdout is a terminal.
    Auto,
    Always,
    Never,
}

pub struct Ui {
    palette: Palette,
    interactive: bool,
}

impl Ui {
    pub fn new(mode: ColorMode) -> Self {
        let interactive = std::io::stdout().is_terminal();
        let paint = match mode {
            ColorMode::Auto => interactive,
            ColorMode::Always => true,
            ColorMode::Never => false,
        };

        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        Self {
            palette: if paint {
                Palette::colored()
            } else {
                Palette::default()
            },
            interactive,
        }
    }

    /// Aligned `key: value` rows under a heading.
    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(&str, String)> = rows
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        for (key, value) in rows {
            let key = format!("{key:>width$}:");
            println!("  {} {value}", self.palette.key.paint(key));
        }
    }

    /// Column-aligned rows under a heading; numbers are right-aligned.
    pub fn table(&self, title: &str, header: &[&str], rows: &[Vec<String>]) {
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let widths: Vec<usize> = header
            .iter()
            .enumerate()
            .map(|(col, name)| {
                rows.iter()
                    .filter_map(|row| row.get(col))
                    .map(String::len)
                    .fold(name.len(), usize::max)
            })
            .collect();
        let names: Vec<String> = header
            .iter()
            .zip(&widths)
            .map(|(name, &width)| format!("{name:>width$}"))
            .collect();
        println!("  {}", self.palette.key.paint(names.join("  ")));
        for row in rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{cell:>width$}"))
                .collect();
            println!("  {}", cells.join("  "));
        }
    }

    /// Structural fields of one row after a headline.
    pub fn node(&self, headline: &str, node: &Node) {
        self.success(headline);
        self.section(
            "Node",
            [
                ("id", node.id.to_string()),
                ("parent", dash(node.parent)),
                ("bounds", bounds(node)),
                ("root", dash(node.root)),
                ("level", dash(node.level)),
            ],
        );
    }

    /// Renders a flattened listing with guide lines derived from entry depth.
    pub fn tree(&self, entries: &[ListEntry]) {
        if entries.is_empty() {
            println!("  (empty)");
            return;
        }
        // `more[d]` holds while a later sibling at depth `d + 1` is still to come.
        let mut more: Vec<bool> = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            let depth = entry.depth;
            let mut line = String::new();
            if depth == 0 {
                more.clear();
            } else {
                let last = entries[i + 1..]
                    .iter()
                    .map(|next| next.depth)
                    .find(|&d| d <= depth)
                    .map_or(true, |d| d < depth);
                more.truncate(depth - 1);
                for &open in &more {
                    line.push_str(if open { "│  " } else { "   " });
                }
                line.push_str(if last { "└─ " } else { "├─ " });
                more.push(!last);
            }
            println!(
                "{}{} {}",
                self.palette.guide.paint(line),
                self.palette.id.paint(entry.node.id.to_string()),
                self.palette.muted.paint(bounds(&entry.node))
            );
        }
    }

    /// One line per finding, tagged with its severity.
    pub fn findings(&self, findings: &[VerifyFinding]) {
        if findings.is_empty() {
            return;
        }
        self.heading("Findings");
        for finding in findings {
            let (tag, style) = match finding.severity {
                VerifySeverity::Info => ("info", self.palette.muted),
                VerifySeverity::Warning => ("warning", self.palette.warn),
                VerifySeverity::Error => ("error", self.palette.error),
            };
            let subject = finding
                .node
                .map(|id| format!("node {id}: "))
                .unwrap_or_default();
            println!(
                "  {} {subject}{}",
                style.paint(format!("{tag:>7}")),
                finding.message
            );
        }
    }

    pub fn success(&self, message: &str) {
        println!("{} {message}", self.palette.ok.paint("✔"));
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{} {message}", self.palette.warn.paint("⚠"));
    }

    /// Spinner on stderr while a long operation runs; silent off a terminal.
    pub fn spinner(&self, label: impl Into<String>) -> Spinner {
        let bar = self.interactive.then(|| {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar.set_message(label.into());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        Spinner {
            bar,
            start: Instant::now(),
        }
    }

    fn heading(&self, title: &str) {
        println!("{}", self.palette.heading.paint(title));
    }
}

pub struct Spinner {
    bar: Option<ProgressBar>,
    start: Instant,
}

impl Spinner {
    pub fn stop(self) -> Duration {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        self.start.elapsed()
    }
}

pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_secs_f64() * 1_000.0;
    if ms >= 1_000.0 {
        format!("{:.2}s", ms / 1_000.0)
    } else {
        format!("{ms:.1}ms")
    }
}

pub fn dash<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn bounds(node: &Node) -> String {
    match node.bounds() {
        Some((left, right)) => format!("[{left}, {right}]"),
        None => "unplaced".to_string(),
    }
}

#[derive(Default)]
struct Palette {
    heading: Style,
    key: Style,
    id: Style,
    guide: Style,
    muted: Style,
    ok: Style,
    warn: Style,
    error: Style,
}

impl Palette {
    fn colored() -> Self {
        Self {
            heading: Style::new().bold().underline(),
            key: Style::new().fg(Color::Cyan),
            id: Style::new().bold(),
            guide: Style::new().fg(Color::DarkGray),
            muted: Style::new().dimmed(),
            ok: Style::new().fg(Color::Green).bold(),
            warn: Style::new().fg(Color::Yellow).bold(),
            error: Style::new().fg(Color::Red).bold(),
        }
    }
}
