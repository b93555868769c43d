use colored::{ColoredString, Colorize};
use declarative::{Change, Outcome};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Change and outcome styling
// ============================================================================

/// Colored symbol for a planned change
pub fn change_symbol(change: Change) -> ColoredString {
    match change {
        Change::Create => change.symbol().green(),
        Change::Update => change.symbol().yellow(),
        Change::Replace => change.symbol().magenta(),
        Change::Delete => change.symbol().red(),
        Change::NoChange => change.symbol().dimmed(),
    }
}

/// Colored status marker for an operation outcome
pub fn outcome_symbol(outcome: &Outcome) -> ColoredString {
    match outcome {
        Outcome::Applied { .. } => "✓".green(),
        Outcome::Unchanged => "=".dimmed(),
        Outcome::Planned { change } => change_symbol(*change),
        Outcome::Failed { .. } => "✗".red(),
        Outcome::Skipped { .. } => "○".yellow(),
    }
}

/// Colored label for an operation outcome
pub fn outcome_label(outcome: &Outcome) -> ColoredString {
    let label = outcome.label();
    match outcome {
        Outcome::Applied { .. } => label.green(),
        Outcome::Unchanged => label.dimmed(),
        Outcome::Planned { .. } => label.cyan(),
        Outcome::Failed { .. } => label.red(),
        Outcome::Skipped { .. } => label.yellow(),
    }
}

/// Shorten `text` to `max_len` characters, keeping both ends
pub fn truncate_middle(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len {
        return text.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let keep = max_len - 3;
    let head = keep / 2;
    let tail = keep - head;
    let start: String = text.chars().take(head).collect();
    let end: String = text.chars().skip(len - tail).collect();
    format!("{start}...{end}")
}

// ============================================================================
// Tests
// ============================================================================
