use crate::domain::model::{AnalysisResult, TableGrid};
use std::fmt::Write;

fn pad_row(out: &mut String, row: &[String], widths: &[usize]) {
    let cells: Vec<String> = row
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
        .collect();
    let _ = writeln!(out, "  | {} |", cells.join(" | "));
}

pub fn render_grid(grid: &TableGrid, column_count: usize) -> String {
    let headers: Vec<String> = grid
        .headers
        .clone()
        .unwrap_or_else(|| (0..column_count).map(|i| i.to_string()).collect());

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &grid.rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    pad_row(&mut out, &headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "  |-{}-|", rule.join("-|-"));
    for row in &grid.rows {
        pad_row(&mut out, row, &widths);
    }
    out
}

/// OCR words laid out per page under a `### Page N:` heading.
pub fn render_pages_markdown(result: &AnalysisResult) -> String {
    let mut out = String::new();
    for (idx, page) in result.pages.iter().enumerate() {
        let number = if page.page_number > 0 {
            page.page_number
        } else {
            idx as u32 + 1
        };
        let words: Vec<&str> = page.words.iter().map(|w| w.content.as_str()).collect();
        let _ = write!(out, "\n### Page {}:\n{}\n", number, words.join(" "));
    }
    out
}

/// Text rendering of an analysis result, section by section.
pub fn render_result(result: &AnalysisResult, title: &str, include_raw: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== Analysis Results ==");

    if !result.documents.is_empty() {
        let _ = writeln!(out, "\n📄 Extracted Fields ({})", title);
        for (idx, doc) in result.documents.iter().enumerate() {
            let _ = writeln!(
                out,
                "-- Document {} (Type: {}, Confidence: {:.2})",
                idx + 1,
                doc.doc_type,
                doc.confidence
            );
            if !doc.pages.is_empty() {
                let _ = writeln!(out, "   Pages: {:?}", doc.pages);
            }
            if doc.fields.is_empty() {
                let _ = writeln!(out, "   No fields extracted in this section.");
            }
            for (name, field) in &doc.fields {
                let _ = writeln!(out, "   {}: {}", name, field.display_value());
            }
        }
    }

    if !result.key_value_pairs.is_empty() {
        let _ = writeln!(out, "\n🔑 Key-Value Pairs");
        for (i, kvp) in result.key_value_pairs.iter().enumerate() {
            let key = kvp.key.clone().unwrap_or_else(|| format!("NK_{}", i));
            let value = kvp.value.as_deref().unwrap_or("N/A");
            let _ = writeln!(out, "   {}: {}", key, value);
        }
    }

    if !result.tables.is_empty() {
        let _ = writeln!(out, "\n📊 Tables");
        for (i, table) in result.tables.iter().enumerate() {
            let _ = writeln!(
                out,
                "Table {} ({}x{})",
                i + 1,
                table.row_count,
                table.column_count
            );
            if !table.pages.is_empty() {
                let _ = writeln!(out, "  Pages: {:?}", table.pages);
            }
            out.push_str(&render_grid(&table.to_grid(), table.column_count));
        }
    }

    if !result.content.is_empty() {
        let _ = writeln!(out, "\n📝 Full Text (OCR)");
        let _ = writeln!(out, "{}", result.content);
    }

    if result.documents.is_empty()
        && result.key_value_pairs.is_empty()
        && result.tables.is_empty()
        && result.content.is_empty()
    {
        let _ = writeln!(out, "\nNo text, fields or tables were detected.");
    }

    if include_raw {
        let _ = writeln!(out, "\n⚙️ Raw JSON Result");
        match serde_json::to_string_pretty(&result.raw) {
            Ok(json) => {
                let _ = writeln!(out, "{}", json);
            }
            Err(e) => {
                let _ = writeln!(out, "JSON serialization error: {}", e);
            }
        }
    }

    out
}
