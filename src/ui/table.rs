use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct CountRow<'a> {
    #[tabled(rename = "Table")]
    table: &'a str,
    #[tabled(rename = "Rows")]
    rows: usize,
}

/// Render any `Tabled` rows with the shared style
pub fn render<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Table name / row count pairs; empty input renders nothing
pub fn counts(pairs: &[(String, usize)]) -> String {
    if pairs.is_empty() {
        return String::new();
    }
    let rows: Vec<CountRow<'_>> = pairs
        .iter()
        .map(|(table, rows)| CountRow { table, rows: *rows })
        .collect();
    render(&rows)
}
