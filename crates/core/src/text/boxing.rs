//! Boxed text formatting utilities
//!
//! Provides functions to create boxed text sections with Unicode borders
//! for CLI output formatting.

/// Create a boxed text section with a title
///
/// # Arguments
/// * `title` - The title to display in the box header
/// * `content` - The content to display inside the box
///
/// # Returns
/// A formatted string with Unicode box drawing characters
///
/// # Examples
/// ```
/// use deacon_core::text::boxing::boxed_section;
///
/// let content = "This is some content\nwith multiple lines";
/// let boxed = boxed_section("Example", content);
/// println!("{}", boxed);
/// ```
pub fn boxed_section(title: &str, content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let max_line_len = lines.iter().map(|line| line.len()).max().unwrap_or(0);
    let box_width = std::cmp::max(max_line_len, title.len() + 4); // +4 for padding

    let top_border = format!("┌{}┐", "─".repeat(box_width + 2));
    let title_line = format!("│ {:^width$} │", title, width = box_width);
    let title_border = format!("├{}┤", "─".repeat(box_width + 2));
    let bottom_border = format!("└{}┘", "─".repeat(box_width + 2));

    let mut result = vec![top_border, title_line, title_border];

    for line in lines {
        let padded_line = format!("│ {:<width$} │", line, width = box_width);
        result.push(padded_line);
    }

    result.push(bottom_border);
    result.join("\n")
}
