use indicatif::{ProgressBar, ProgressStyle};
use lineage::hierarchy::{Forest, ForestNode};
use lineage::Status;
use nu_ansi_term::{Color, Style};
use std::fmt::Display;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

pub struct Ui {
    palette: Palette,
    paint: bool,
    spinner_style: ProgressStyle,
}

impl Ui {
    pub fn new() -> Self {
        let paint = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();

        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        let palette = if paint {
            Palette::dark()
        } else {
            Palette::plain()
        };
        let spinner_style = ProgressStyle::with_template("{prefix} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

        Self {
            palette,
            paint,
            spinner_style,
        }
    }

    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(String, String)> = rows
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        if rows.is_empty() {
            return;
        }

        self.heading(title);
        let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            println!(
                "  {} {}",
                self.palette.key.paint(format!("{key:>key_width$}:")),
                self.palette.value.paint(value)
            );
        }
    }

    pub fn list<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        let entries: Vec<String> = entries.into_iter().collect();
        if entries.is_empty() {
            return;
        }
        self.heading(title);
        for entry in entries {
            if self.paint {
                println!("  {} {entry}", self.palette.bullet.paint("•"));
            } else {
                println!("  - {entry}");
            }
        }
    }

    pub fn success(&self, message: &str) {
        println!("{} {message}", self.palette.success.paint(SUCCESS_ICON));
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{} {message}", self.palette.warn.paint(WARNING_ICON));
    }

    /// Renders the forest as an indented tree, clubs as leaves.
    pub fn tree(&self, forest: &Forest) {
        if forest.root_count() == 0 {
            println!("(empty forest)");
        }
        for (depth, node) in forest.walk() {
            let indent = "  ".repeat(depth);
            println!("{indent}{}", self.describe(node));
            for club in &node.clubs {
                println!(
                    "{indent}  {} {} {}",
                    self.palette.bullet.paint("◦"),
                    club.id,
                    self.palette.muted.paint(&club.name)
                );
            }
        }
        let detached: Vec<String> = forest.detached.iter().map(ToString::to_string).collect();
        self.list("Detached (parent cycle)", detached);
        let orphans: Vec<String> = forest.orphan_clubs.iter().map(ToString::to_string).collect();
        self.list("Orphan clubs", orphans);
    }

    fn describe(&self, node: &ForestNode) -> String {
        let association = &node.association;
        let label = format!("{} [{}] {}", association.id, association.code, association.name);
        match association.status {
            Status::Active => self.palette.heading.paint(label).to_string(),
            status => format!(
                "{} {}",
                self.palette.muted.paint(label),
                self.palette.warn.paint(format!("({status})"))
            ),
        }
    }

    pub fn task<'a>(&'a self, label: impl Into<String>) -> TaskGuard<'a> {
        let label = label.into();
        let pb = ProgressBar::new_spinner();
        pb.set_style(self.spinner_style.clone());
        pb.set_prefix(self.palette.info.paint(PROGRESS_ICON).to_string());
        pb.set_message(label.clone());
        pb.enable_steady_tick(Duration::from_millis(120));
        TaskGuard {
            ui: self,
            label,
            start: Instant::now(),
            finished: false,
            pb: Some(pb),
        }
    }

    fn heading(&self, title: &str) {
        println!(
            "{}",
            self.palette.heading.paint(format!("{HEADING_ICON} {title}"))
        );
    }
}

pub struct TaskGuard<'a> {
    ui: &'a Ui,
    label: String,
    start: Instant,
    finished: bool,
    pb: Option<ProgressBar>,
}

impl TaskGuard<'_> {
    pub fn finish(mut self) -> Duration {
        self.finished = true;
        let elapsed = self.start.elapsed();
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
        elapsed
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let elapsed = format_duration(self.start.elapsed());
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
        self.ui
            .warn(&format!("{} interrupted after {elapsed}", self.label));
    }
}

pub fn format_duration(duration: Duration) -> String {
    if duration.as_secs_f64() >= 1.0 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{:.0}ms", duration.as_secs_f64() * 1_000.0)
    }
}

struct Palette {
    heading: Style,
    key: Style,
    value: Style,
    muted: Style,
    bullet: Style,
    info: Style,
    success: Style,
    warn: Style,
}

impl Palette {
    fn dark() -> Self {
        Self {
            heading: Style::new().fg(Color::Purple).bold(),
            key: Style::new().fg(Color::LightBlue).bold(),
            value: Style::new().fg(Color::White),
            muted: Style::new().fg(Color::DarkGray),
            bullet: Style::new().fg(Color::LightBlue),
            info: Style::new().fg(Color::LightCyan),
            success: Style::new().fg(Color::LightGreen).bold(),
            warn: Style::new().fg(Color::Yellow).bold(),
        }
    }

    fn plain() -> Self {
        Self {
            heading: Style::new(),
            key: Style::new(),
            value: Style::new(),
            muted: Style::new(),
            bullet: Style::new(),
            info: Style::new(),
            success: Style::new(),
            warn: Style::new(),
        }
    }
}

const HEADING_ICON: &str = "▸";
const SUCCESS_ICON: &str = "✔";
const WARNING_ICON: &str = "⚠";
const PROGRESS_ICON: &str = "▶";
