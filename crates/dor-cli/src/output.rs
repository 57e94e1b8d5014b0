use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_yaml<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(value)?;
    print!("{yaml}");
    Ok(())
}

fn join_padded<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(c, &w)| format!("{c:w$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Left-aligned columns separated by two spaces.
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(join_padded(headers.iter().copied(), &widths));
    out.push(join_padded(rule.iter().map(String::as_str), &widths));
    for row in rows {
        out.push(join_padded(row.iter().map(String::as_str), &widths));
    }
    out
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    for line in format_table(headers, rows) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_padded_to_widest_cell() {
        let rows = vec![
            vec!["SHOP-1".to_string(), "Ready".to_string()],
            vec!["B-22".to_string(), "Needs Refinement".to_string()],
        ];
        let lines = format_table(&["ID", "STATUS"], &rows);
        assert_eq!(lines[0], "ID      STATUS");
        assert_eq!(lines[1], "------  ----------------");
        assert_eq!(lines[2], "SHOP-1  Ready");
        assert_eq!(lines[3], "B-22    Needs Refinement");
    }
}
