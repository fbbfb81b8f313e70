//! Byte-array literal rendering for generated Rust sources

use crate::error::{AppError, AppResult};

fn decode(hex_str: &str) -> AppResult<Vec<u8>> {
    hex::decode(hex_str).map_err(|e| AppError::Format(format!("invalid hex {:?}: {}", hex_str, e)))
}

/// Number of bytes encoded by a hex string
pub fn byte_len(hex_str: &str) -> AppResult<usize> {
    Ok(decode(hex_str)?.len())
}

/// Render a hex string as a Rust array literal, e.g. `[ 171u8, 205u8 ]`
pub fn render_byte_array(hex_str: &str) -> AppResult<String> {
    let bytes = decode(hex_str)?;
    if bytes.is_empty() {
        return Ok("[]".to_string());
    }

    let items: Vec<String> = bytes.iter().map(|b| format!("{}u8", b)).collect();
    Ok(format!("[ {} ]", items.join(", ")))
}

/// Render a fixed-size array binding, e.g. `let input: [u8; 2] = [ 171u8, 205u8 ];`
pub fn render_let_binding(ident: &str, hex_str: &str) -> AppResult<String> {
    let len = byte_len(hex_str)?;
    Ok(format!(
        "let {}: [u8; {}] = {};",
        ident,
        len,
        render_byte_array(hex_str)?
    ))
}
