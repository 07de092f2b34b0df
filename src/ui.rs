use colored::Colorize;

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

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Shorten `text` to `max_len` characters, keeping the end
pub fn truncate(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = text.chars().skip(len - (max_len - 3)).collect();
        format!("...{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short() {
        assert_eq!(truncate("short.txt", 20), "short.txt");
        assert_eq!(truncate("exact", 5), "exact");
    }

    #[test]
    fn test_truncate_long_keeps_end() {
        assert_eq!(truncate("/very/long/path/to/file.txt", 15), ".../to/file.txt");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("remote_file[/opt/çà/ü.tgz]", 10), ".../ü.tgz]");
        assert_eq!(truncate("test", 2), "...");
    }
}
