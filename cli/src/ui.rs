// Terminal output helpers for human-readable command output.
// Status lines go to stdout, errors to stderr.

use colored::Colorize;

const HEADER_WIDTH: usize = 60;

pub fn print_header(title: &str) {
    let rule = "═".repeat(HEADER_WIDTH);
    println!();
    println!("{}", format!("╔{}╗", rule).bright_blue());
    println!("{}", format!("║  {:<width$}║", title, width = HEADER_WIDTH - 2).bright_blue());
    println!("{}", format!("╚{}╝", rule).bright_blue());
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", format!("❌ {}", message).bright_red().bold());
}

pub fn print_info(message: &str) {
    println!("{}", format!("ℹ️  {}", message).bright_cyan());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}
