use model::table::OperationTablePart;

/// Renders per-part progress as a plain text table.
pub fn print_parts(state: &str, parts: &[OperationTablePart]) {
    println!("operation state: {state}");
    if parts.is_empty() {
        println!("no tracked parts");
        return;
    }
    println!("{:<40} {:>12} {:>12} {:>6}", "part", "rows", "eta", "done");
    for part in parts {
        println!(
            "{:<40} {:>12} {:>12} {:>6}",
            part.to_string(),
            part.completed_rows,
            part.eta_rows,
            if part.completed { "yes" } else { "no" },
        );
    }
}
