//! JSON output for CLI
//!
//! - Output: single JSON object on stdout
//! - Errors: `{"status":"error","code":..,"message":..}`

use std::io::{self, Write};

use serde_json::Value;

use super::errors::CliResult;

fn write_line(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, response)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_line(&serde_json::json!({
        "status": "ok",
        "data": data
    }))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_line(&serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    }))
}
