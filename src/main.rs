//! Interactive driver: reads statements line by line and runs them against a
//! storage directory, printing aligned tables for query output.

use anyhow::Result;
use pagedb::parser::{self, Statement};
use pagedb::StorageManager;
use std::collections::HashMap;
use std::io::{BufRead, Write};

fn main() -> Result<()> {
    env_logger::init();
    let base_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "storage".to_string());
    let mut manager = StorageManager::open(&base_path)?;

    let stdin = std::io::stdin();
    loop {
        print!("db> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let statement = line.trim();
        if statement.is_empty() {
            continue;
        }
        if statement.eq_ignore_ascii_case("exit") {
            break;
        }
        if let Err(e) = run_statement(&mut manager, statement) {
            println!("error: {}", e);
        }
    }
    Ok(())
}

fn run_statement(manager: &mut StorageManager, statement: &str) -> Result<()> {
    match parser::parse_statement(statement)? {
        Statement::Create { table, schema } => {
            manager.create_table(&table, schema)?;
            println!("{} created", table);
        }
        Statement::Select {
            table,
            columns,
            condition,
        } => {
            let rows = manager.get_table_data(&table, condition.as_ref(), &columns)?;
            let headers = if columns.is_empty() {
                manager.get_table_schema(&table)?.attribute_names()
            } else {
                columns
            };
            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect())
                .collect();
            print_table(&headers, &cells);
        }
        Statement::Insert { table, rows } => {
            let schema = manager.get_table_schema(&table)?.clone();
            let mut records = Vec::with_capacity(rows.len());
            for row in &rows {
                records.push(parser::typed_row(&schema, row)?);
            }
            let inserted = manager.insert_into_table(&table, records)?;
            println!("{} rows inserted", inserted);
        }
        Statement::Update {
            table,
            assignments,
            condition,
        } => {
            let assignments: HashMap<String, String> = assignments.into_iter().collect();
            let affected = manager.update_table(&table, &assignments, condition.as_ref())?;
            println!("{} rows updated", affected);
        }
        Statement::Delete { table, condition } => {
            let deleted = manager.delete_table_record(&table, condition.as_ref())?;
            println!("{} rows deleted", deleted);
        }
        Statement::Schema { table } => {
            let schema = manager.get_table_schema(&table)?;
            let headers = vec![
                "Name".to_string(),
                "Type".to_string(),
                "Size".to_string(),
            ];
            let cells: Vec<Vec<String>> = schema
                .attributes
                .iter()
                .map(|a| vec![a.name.clone(), a.dtype.to_string(), a.size.to_string()])
                .collect();
            print_table(&headers, &cells);
        }
        Statement::Stats => {
            println!("{}", serde_json::to_string_pretty(&manager.get_stats()?)?);
        }
    }
    Ok(())
}

fn print_table(headers: &[String], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let render = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<String>>()
            .join(" | ")
    };
    println!("{}", render(headers));
    println!(
        "{}",
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<String>>()
            .join("-+-")
    );
    for row in rows {
        println!("{}", render(row));
    }
}
