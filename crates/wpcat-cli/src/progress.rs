//! Console progress for a reconciliation run.

use colored::Colorize;
use wpcat_core::{Post, ReconcileObserver, ReconcileReport, WpcatError};

pub struct ConsoleProgress {
    quiet: bool,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ReconcileObserver for ConsoleProgress {
    fn batch_started(&mut self, pass: usize, titles: usize) {
        if self.quiet {
            return;
        }
        println!();
        if pass > 1 {
            println!("Classifying {} titles (retry pass {})...", titles, pass);
        } else {
            println!("Classifying {} titles...", titles);
        }
    }

    fn post_matched(&mut self, post: &Post) {
        if self.quiet {
            return;
        }
        let labels: Vec<&str> = post.categories.iter().map(|c| c.label.as_str()).collect();
        println!("  {} {} → {}", "✓".green(), post.title, labels.join(", ").cyan());
    }

    fn batch_failed(&mut self, error: &WpcatError) {
        eprintln!("  {} Batch failed, will retry: {}", "[WARN]".yellow(), error);
    }

    fn post_given_up(&mut self, post: &Post, attempts: u32) {
        eprintln!(
            "  {} Gave up on \"{}\" after {} attempts",
            "[WARN]".yellow(),
            post.title,
            attempts
        );
    }
}

pub fn print_summary(report: &ReconcileReport) {
    println!();
    println!("{}", "Summary".bold());
    println!("  Categorized:      {}", report.resolved.to_string().green());
    if !report.given_up.is_empty() {
        println!(
            "  Gave up:          {} ({})",
            report.given_up.len().to_string().red(),
            report.given_up.join(", ")
        );
    }
    println!("  Classifier calls: {}", report.calls);
    if report.failed_calls > 0 {
        println!("  Failed calls:     {}", report.failed_calls.to_string().yellow());
    }
    if report.discarded_entries > 0 {
        println!("  Ignored answers:  {}", report.discarded_entries);
    }
}
