use console::style;
use serde::Serialize;
use std::fmt::Display;
use tabled::{settings::Style, Table, Tabled};

/// Output format mode
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Human,
    Json,
}

pub struct OutputWriter {
    format: OutputFormat,
}

/// Pretty JSON of a value, or an error document when it cannot be serialized
fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"status\": \"error\", \"message\": \"{}\"}}", e))
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Human
            },
        }
    }

    fn status(&self, status: &str, message: impl Display) -> String {
        to_json(&serde_json::json!({
            "status": status,
            "message": message.to_string(),
        }))
    }

    pub fn success(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => println!("{} {}", style("✓").green().bold(), message),
            OutputFormat::Json => println!("{}", self.status("success", message)),
        }
    }

    pub fn info(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => println!("{} {}", style("ℹ").blue().bold(), message),
            OutputFormat::Json => println!("{}", self.status("info", message)),
        }
    }

    pub fn warning(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => eprintln!("{} {}", style("⚠").yellow().bold(), message),
            OutputFormat::Json => eprintln!("{}", self.status("warning", message)),
        }
    }

    pub fn table<T: Tabled + Serialize>(&self, data: Vec<T>) {
        match self.format {
            OutputFormat::Human => {
                if data.is_empty() {
                    println!("{}", style("(no data)").dim());
                } else {
                    let mut table = Table::new(data);
                    table.with(Style::rounded());
                    println!("{}", table);
                }
            }
            OutputFormat::Json => {
                println!("{}", to_json(&serde_json::json!({ "status": "success", "data": data })));
            }
        }
    }

    pub fn result<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        let json_str = match self.format {
            OutputFormat::Human => serde_json::to_string_pretty(&data)?,
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "status": "success",
                "data": data,
            }))?,
        };
        println!("{}", json_str);
        Ok(())
    }

    pub fn kv(&self, key: impl Display, value: impl Display) {
        match self.format {
            OutputFormat::Human => println!("{}: {}", style(key).bold(), value),
            OutputFormat::Json => println!("{}", to_json(&serde_json::json!({ key.to_string(): value.to_string() }))),
        }
    }

    pub fn section(&self, title: impl Display) {
        match self.format {
            OutputFormat::Human => println!("\n{}", style(title).bold().underlined()),
            OutputFormat::Json => {}
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }
}
